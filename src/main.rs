use std::env;
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use restyle::handlers::assets::AssetServer;
use restyle::handlers::rephrase::rephrase;
use restyle::handlers::response::{empty, status_response};
use restyle::rephraser::service::RephraseService;
use restyle::utils::tracing::init_tracing;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

const BIND_ADDRESS: &str = "0.0.0.0:5000";
const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
const DEFAULT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_ASSETS_DIR: &str = "./frontend";
const REPHRASE_PATH: &str = "/api/rephrase";

fn preflight() -> Response<BoxBody<Bytes, hyper::Error>> {
    let mut response = Response::new(empty());
    *response.status_mut() = StatusCode::NO_CONTENT;
    response
        .headers_mut()
        .insert("Access-Control-Allow-Origin", "*".parse().unwrap());
    response
        .headers_mut()
        .insert("Access-Control-Allow-Headers", "Content-Type".parse().unwrap());
    response
        .headers_mut()
        .insert("Access-Control-Allow-Methods", "POST, OPTIONS".parse().unwrap());
    response
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| BIND_ADDRESS.to_string());
    let api_key = env::var("OPENAI_API_KEY").expect("OPENAI_API_KEY must be set");
    let base_url =
        env::var("OPENAI_BASE_URL").unwrap_or_else(|_| DEFAULT_OPENAI_BASE_URL.to_string());
    let model = env::var("REPHRASE_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
    let assets_dir =
        env::var("STATIC_ASSETS_DIR").unwrap_or_else(|_| DEFAULT_ASSETS_DIR.to_string());

    info!(
        address = %bind_address,
        model = %model,
        assets = %assets_dir,
        "starting server"
    );

    let rephrase_service = Arc::new(RephraseService::new(base_url, api_key, model));
    let asset_server = Arc::new(AssetServer::new(&assets_dir));

    let listener = TcpListener::bind(&bind_address).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        // A socket error on one connection must not take the server down.
        let peer_addr = match stream.peer_addr() {
            Ok(addr) => addr,
            Err(err) => {
                warn!(error = ?err, "failed to read peer address, dropping connection");
                continue;
            }
        };
        let io = TokioIo::new(stream);

        let rephrase_service = Arc::clone(&rephrase_service);
        let asset_server = Arc::clone(&asset_server);

        let service = service_fn(move |req: Request<hyper::body::Incoming>| {
            let rephrase_service = Arc::clone(&rephrase_service);
            let asset_server = Arc::clone(&asset_server);

            async move {
                match (req.method(), req.uri().path()) {
                    (&Method::POST, REPHRASE_PATH) => rephrase(req, rephrase_service).await,
                    (&Method::OPTIONS, REPHRASE_PATH) => Ok(preflight()),
                    (&Method::GET, path) => Ok(asset_server.serve(path).await),
                    _ => {
                        debug!(method = %req.method(), path = %req.uri().path(), "no route found");
                        Ok(status_response(StatusCode::NOT_FOUND))
                    }
                }
            }
        });

        tokio::task::spawn(async move {
            debug!(peer = ?peer_addr, "accepted connection");
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!(error = ?err, "error serving connection");
            }
        });
    }
}
