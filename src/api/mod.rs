//! HTTP API.
//!
//! Routes are nested under `/api/` and protected by a middleware stack:
//! Rate Limit → Auth → Audit → Handler.
//!
//! `api_router()` returns a `Router` that can be mounted on any axum
//! server instance; `start_server()` binds and serves it.

pub mod endpoints;
pub mod error;
pub mod extract;
pub mod middleware;
pub mod router;
pub mod server;
pub mod types;

pub use router::api_router;
pub use server::{start_server, ApiServer};
pub use types::ApiContext;
