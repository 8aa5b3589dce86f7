pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod openapi;
pub mod rate_limit;
pub mod repo;
pub mod routes;
pub mod search;
pub mod security;
pub mod storage; // filesystem or S3 image blobs
pub mod validate;

// Re-export commonly used items for tests / the binary
pub use engine::{ClaimEngine, EnginePolicy};
pub use routes::{config, AppState};
pub use security::SecurityHeaders;
