//! In-process event bus.
//!
//! Services publish a [`LedgerEvent`] after their transaction commits, so a
//! subscriber never observes a write that was rolled back. Subscriptions and
//! periodic refresh tasks both end when their handle is cancelled or dropped.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use stackit_db::entities::{notification::NotificationType, vote::TargetType};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_stream::{Stream, StreamExt, wrappers::BroadcastStream};

/// Default number of events buffered per subscriber.
pub const DEFAULT_CAPACITY: usize = 256;

/// A committed ledger change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum LedgerEvent {
    /// A question was asked.
    QuestionCreated {
        question_id: String,
        author_id: String,
    },
    /// An answer was posted.
    AnswerPosted {
        question_id: String,
        answer_id: String,
        author_id: String,
    },
    /// An answer became the accepted one.
    AnswerAccepted {
        question_id: String,
        answer_id: String,
        previous_answer_id: Option<String>,
    },
    /// Vote counters of a question or answer changed.
    VoteChanged {
        question_id: String,
        target_id: String,
        target_type: TargetType,
        upvotes: i32,
        downvotes: i32,
        score: i32,
    },
    /// A notification was delivered.
    NotificationCreated {
        notification_id: String,
        user_id: String,
        notification_type: NotificationType,
    },
}

impl LedgerEvent {
    /// The question this event concerns, if any.
    #[must_use]
    pub fn question_id(&self) -> Option<&str> {
        match self {
            Self::QuestionCreated { question_id, .. }
            | Self::AnswerPosted { question_id, .. }
            | Self::AnswerAccepted { question_id, .. }
            | Self::VoteChanged { question_id, .. } => Some(question_id),
            Self::NotificationCreated { .. } => None,
        }
    }

    /// Event name used on the wire.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::QuestionCreated { .. } => "questionCreated",
            Self::AnswerPosted { .. } => "answerPosted",
            Self::AnswerAccepted { .. } => "answerAccepted",
            Self::VoteChanged { .. } => "voteChanged",
            Self::NotificationCreated { .. } => "notificationCreated",
        }
    }
}

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventFilter {
    /// Every event.
    All,
    /// Events about one question.
    Question(String),
    /// Notifications delivered to one user.
    Recipient(String),
}

impl EventFilter {
    /// Whether `event` passes this filter.
    #[must_use]
    pub fn matches(&self, event: &LedgerEvent) -> bool {
        match self {
            Self::All => true,
            Self::Question(id) => event.question_id() == Some(id.as_str()),
            Self::Recipient(id) => matches!(
                event,
                LedgerEvent::NotificationCreated { user_id, .. } if user_id == id
            ),
        }
    }
}

/// Broadcast bus for ledger events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<LedgerEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Create a bus buffering `capacity` events per subscriber.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publish an event. Returns how many subscribers were live.
    pub fn publish(&self, event: LedgerEvent) -> usize {
        let name = event.name();
        match self.sender.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                tracing::trace!(event = name, "No subscribers for event");
                0
            }
        }
    }

    /// Subscribe to events passing `filter`.
    #[must_use]
    pub fn subscribe(&self, filter: EventFilter) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
            filter,
        }
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscription {
    receiver: broadcast::Receiver<LedgerEvent>,
    filter: EventFilter,
}

impl Subscription {
    /// Wait for the next matching event.
    ///
    /// Returns `None` once the bus is gone. Events missed by a slow
    /// subscriber are skipped.
    pub async fn recv(&mut self) -> Option<LedgerEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if self.filter.matches(&event) => return Some(event),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Unsubscribe.
    pub fn cancel(self) {
        drop(self);
    }

    /// Turn the subscription into a stream of matching events.
    pub fn into_stream(self) -> impl Stream<Item = LedgerEvent> + Send + 'static {
        let filter = self.filter;
        BroadcastStream::new(self.receiver).filter_map(move |item| match item {
            Ok(event) if filter.matches(&event) => Some(event),
            _ => None,
        })
    }
}

/// Handle to a periodic refresh task. Dropping it stops the task.
pub struct RefreshHandle {
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop the refresh.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the task has stopped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Run `task` every `interval` until the returned handle is cancelled or dropped.
///
/// The first run happens immediately.
pub fn spawn_refresh<F, Fut>(interval: Duration, mut task: F) -> RefreshHandle
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = interval.max(Duration::from_millis(1));
    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            task().await;
        }
    });
    RefreshHandle { task: handle }
}
