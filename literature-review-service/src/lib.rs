pub mod config;
pub mod llm;
pub mod models;
pub mod prompts;
pub mod search;
pub mod service;

pub use config::{SearchBackend, ServiceConfig};
pub use service::{AppState, build_router, create_app};
pub use models::*;
