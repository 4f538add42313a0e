//! Core business logic for stackit.
//!
//! The reputation and voting ledger ([`VoteService`], [`KarmaService`],
//! [`ContentCounters`], [`AcceptanceService`]) plus the content, account,
//! social and notification services built around it.

pub mod services;
pub mod session;

pub use services::*;
pub use session::Session;
