//! Business logic services.

#![allow(missing_docs)]

pub mod acceptance;
pub mod account;
pub mod admin;
pub mod ai;
pub mod answer;
pub mod bookmark;
pub mod counters;
pub mod event_bus;
pub mod follow;
pub mod karma;
pub mod notification;
pub mod question;
pub mod tag;
pub mod user;
pub mod vote;

pub use acceptance::{AcceptanceOutcome, AcceptanceService, AcceptanceState};
pub use account::{AccountService, SignInInput, SignUpInput, SignedIn};
pub use admin::{AdminService, UserPage};
pub use ai::{
    AiService, ChatReply, EnhanceKind, OpenAiCompatibleGenerator, ProviderError, TextGenerator,
};
pub use answer::{AnswerInput, AnswerService};
pub use bookmark::BookmarkService;
pub use counters::{ContentCounters, QuestionCounts, RecountSummary, UserCounts};
pub use event_bus::{
    EventBus, EventFilter, LedgerEvent, RefreshHandle, Subscription, spawn_refresh,
};
pub use follow::FollowService;
pub use karma::{KarmaAccount, KarmaAward, KarmaEvent, KarmaService};
pub use notification::{NewNotification, NotificationService};
pub use question::{
    AskQuestionInput, DeletedQuestion, QuestionDetail, QuestionService, UpdateQuestionInput,
};
pub use tag::TagService;
pub use user::{
    AnswerWithQuestion, Leaderboard, LeaderboardEntry, UpdateProfileInput, UserService, UserStats,
};
pub use vote::{VoteOutcome, VoteService, VoteTransition};
