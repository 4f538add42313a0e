//! HTTP API layer for stackit.
//!
//! This crate exposes the ledger and its surrounding services over HTTP:
//!
//! - **Endpoints**: accounts, questions, answers, votes, social, admin, AI
//! - **Extractors**: bearer-token sessions
//! - **Middleware**: authentication and request metrics
//! - **SSE**: live question and notification streams
//!
//! Built on Axum 0.8 with Tower middleware stack.

pub mod dto;
pub mod endpoints;
pub mod extractors;
pub mod middleware;
pub mod response;
pub mod sse;

pub use endpoints::router;
pub use middleware::AppState;
