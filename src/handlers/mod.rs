pub mod assets;
pub mod rephrase;
pub mod response;
