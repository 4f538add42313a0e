//! Database entities.

#![allow(missing_docs)]

pub mod answer;
pub mod bookmark;
pub mod follow;
pub mod karma_history;
pub mod notification;
pub mod question;
pub mod question_tag;
pub mod tag;
pub mod user;
pub mod vote;

pub use answer::Entity as Answer;
pub use bookmark::Entity as Bookmark;
pub use follow::Entity as Follow;
pub use karma_history::Entity as KarmaHistory;
pub use notification::Entity as Notification;
pub use question::Entity as Question;
pub use question_tag::Entity as QuestionTag;
pub use tag::Entity as Tag;
pub use user::Entity as User;
pub use vote::Entity as Vote;
