//! Server-Sent Events (SSE) for real-time updates.
//!
//! Two streams sit on top of the ledger [`EventBus`](stackit_core::EventBus):
//! one per question (votes, answers, acceptance) and one per signed-in user
//! (notifications). Each stream also owns a periodic refresh that re-sends a
//! snapshot, so a client that missed events converges anyway.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, KeepAlive, KeepAliveStream, Sse},
    routing::get,
};
use futures::stream::{self, Stream};
use serde::Serialize;
use serde_json::json;
use stackit_common::{AppResult, get_metrics};
use stackit_core::{EventFilter, LedgerEvent, RefreshHandle, spawn_refresh};
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;

use crate::{
    dto::QuestionResponse,
    extractors::{AuthSession, MaybeSession},
    middleware::AppState,
};

/// How often a question stream re-sends the question.
const QUESTION_REFRESH: Duration = Duration::from_secs(15);
/// How often a notification stream re-sends the unread count.
const UNREAD_REFRESH: Duration = Duration::from_secs(30);

type EventStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Counts an open SSE connection until dropped.
struct ConnectionGuard;

impl ConnectionGuard {
    fn open() -> Self {
        get_metrics().sse_opened();
        Self
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        get_metrics().sse_closed();
    }
}

/// An SSE stream that keeps its refresh task and connection count alive
/// until the client goes away.
pub struct LiveStream {
    inner: EventStream,
    _refresh: RefreshHandle,
    _connection: ConnectionGuard,
}

impl Stream for LiveStream {
    type Item = Result<Event, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}

fn json_event<T: Serialize>(name: &str, payload: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|_| Event::default().event(name).data("error"))
}

fn ledger_event(event: &LedgerEvent) -> Event {
    json_event(event.name(), event)
}

fn with_keep_alive(stream: LiveStream) -> Sse<KeepAliveStream<LiveStream>> {
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Live updates of one question.
async fn question_stream(
    MaybeSession(viewer): MaybeSession,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Sse<KeepAliveStream<LiveStream>>> {
    state.question_service.get(&id).await?;

    let events = state
        .event_bus
        .subscribe(EventFilter::Question(id.clone()))
        .into_stream()
        .map(|event| Ok::<_, Infallible>(ledger_event(&event)));

    let (tx, rx) = mpsc::channel::<Event>(4);
    let service = state.question_service.clone();
    let question_id = id.clone();
    let refresh = spawn_refresh(QUESTION_REFRESH, move || {
        let service = service.clone();
        let viewer = viewer.clone();
        let question_id = question_id.clone();
        let tx = tx.clone();
        async move {
            match service.get(&question_id).await {
                Ok(detail) => {
                    let snapshot = QuestionResponse::for_viewer(detail, viewer.as_ref());
                    let _ = tx.send(json_event("question", &snapshot)).await;
                }
                Err(e) => {
                    tracing::debug!(question_id = %question_id, error = %e, "Question refresh failed");
                }
            }
        }
    });
    let snapshots = ReceiverStream::new(rx).map(Ok::<_, Infallible>);

    let initial = stream::once(async move {
        Ok::<_, Infallible>(json_event("connected", &json!({ "questionId": id })))
    });

    Ok(with_keep_alive(LiveStream {
        inner: Box::pin(initial.chain(events.merge(snapshots))),
        _refresh: refresh,
        _connection: ConnectionGuard::open(),
    }))
}

/// Notifications of the signed-in user.
async fn notification_stream(
    AuthSession(session): AuthSession,
    State(state): State<AppState>,
) -> Sse<KeepAliveStream<LiveStream>> {
    let events = state
        .event_bus
        .subscribe(EventFilter::Recipient(session.user_id.clone()))
        .into_stream()
        .map(|event| Ok::<_, Infallible>(ledger_event(&event)));

    let (tx, rx) = mpsc::channel::<Event>(4);
    let service = state.notification_service.clone();
    let refresh_session = session.clone();
    let refresh = spawn_refresh(UNREAD_REFRESH, move || {
        let service = service.clone();
        let session = refresh_session.clone();
        let tx = tx.clone();
        async move {
            match service.unread_count(&session).await {
                Ok(count) => {
                    let _ = tx.send(json_event("unreadCount", &json!({ "count": count }))).await;
                }
                Err(e) => {
                    tracing::debug!(user_id = %session.user_id, error = %e, "Unread count refresh failed");
                }
            }
        }
    });
    let counts = ReceiverStream::new(rx).map(Ok::<_, Infallible>);

    let user_id = session.user_id;
    let initial = stream::once(async move {
        Ok::<_, Infallible>(json_event("connected", &json!({ "userId": user_id })))
    });

    with_keep_alive(LiveStream {
        inner: Box::pin(initial.chain(events.merge(counts))),
        _refresh: refresh,
        _connection: ConnectionGuard::open(),
    })
}

/// Create SSE router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/questions/{id}", get(question_stream))
        .route("/notifications", get(notification_stream))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use stackit_db::entities::notification::NotificationType;

    #[test]
    fn test_connection_guard_counts() {
        let before = get_metrics().snapshot().sse_connections_active;
        let guard = ConnectionGuard::open();
        assert!(get_metrics().snapshot().sse_connections_active > before);
        drop(guard);
    }

    #[test]
    fn test_ledger_event_serialization() {
        let event = LedgerEvent::NotificationCreated {
            notification_id: "n1".to_string(),
            user_id: "u1".to_string(),
            notification_type: NotificationType::Answer,
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"notificationCreated\""));
        assert!(json.contains("\"notificationId\":\"n1\""));
    }
}
