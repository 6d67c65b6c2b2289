//! talkface HTTP front end: form page, upload endpoint, status and static
//! results over axum.
//!
//! - [`routes`]: [`AppState`] and the [`router`]
//! - [`pages`]: Tera pages with user overrides
//! - [`runtime`]: tokio bootstrap and graceful shutdown

pub mod error;
pub mod pages;
pub mod routes;
pub mod runtime;

pub use error::ServerError;
pub use routes::{router, AppState};
pub use runtime::{init_tracing, serve, start_blocking};
