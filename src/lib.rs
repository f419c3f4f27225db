pub mod apis;
pub mod handlers;
pub mod rephraser;
pub mod utils;
