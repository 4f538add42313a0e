//! Repositories.
//!
//! Writes and reads that take part in a unit of work are associated
//! functions over any [`sea_orm::ConnectionTrait`], so they run unchanged on
//! a pooled connection or inside a transaction. Listing reads that never
//! join a transaction are methods on the repository.

mod answer;
mod bookmark;
mod follow;
mod karma;
mod notification;
mod question;
mod tag;
mod user;
mod vote;

pub use answer::AnswerRepository;
pub use bookmark::BookmarkRepository;
pub use follow::FollowRepository;
pub use karma::KarmaRepository;
pub use notification::NotificationRepository;
pub use question::QuestionRepository;
pub use tag::TagRepository;
pub use user::{UserCounter, UserRepository};
pub use vote::VoteRepository;
