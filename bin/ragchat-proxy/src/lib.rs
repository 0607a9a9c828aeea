//! ragchat-proxy: rate-limited streaming proxy in front of a RAG webhook.
//!
//! The binary in `main.rs` wires these modules together; they are exposed as a
//! library so other crates can mount the router in tests.

pub mod config;
pub mod error;
pub mod limiter;
pub mod middleware;
pub mod normalize;
pub mod routes;
pub mod state;
pub mod upstream;

pub use config::Config;
pub use error::ProxyError;
pub use state::AppState;
