//! Notification service.

use std::sync::Arc;

use chrono::Utc;
use sea_orm::{DatabaseConnection, Set};
use stackit_common::{AppError, AppResult, IdGenerator, get_metrics};
use stackit_db::{
    entities::notification::{self, NotificationType},
    repositories::NotificationRepository,
};

use crate::services::event_bus::{EventBus, LedgerEvent};
use crate::session::Session;

/// How many notifications a listing returns.
pub const NOTIFICATION_PAGE: u64 = 20;

/// A notification to deliver.
#[derive(Debug, Clone)]
pub struct NewNotification {
    pub recipient_id: String,
    pub notification_type: NotificationType,
    pub message: String,
    pub question_id: Option<String>,
    pub actor_id: Option<String>,
}

/// Notification service for business logic.
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
    notification_repo: NotificationRepository,
    event_bus: Option<EventBus>,
    id_gen: IdGenerator,
}

impl NotificationService {
    /// Create a new notification service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            notification_repo: NotificationRepository::new(db.clone()),
            db,
            event_bus: None,
            id_gen: IdGenerator::new(),
        }
    }

    /// Set the event bus.
    pub fn set_event_bus(&mut self, event_bus: EventBus) {
        self.event_bus = Some(event_bus);
    }

    /// Store a notification and publish it.
    pub async fn notify(&self, new: NewNotification) -> AppResult<notification::Model> {
        let model = notification::ActiveModel {
            id: Set(self.id_gen.generate()),
            user_id: Set(new.recipient_id),
            notification_type: Set(new.notification_type),
            message: Set(new.message),
            question_id: Set(new.question_id),
            actor_id: Set(new.actor_id),
            is_read: Set(false),
            created_at: Set(Utc::now().into()),
        };
        let created = NotificationRepository::create(self.db.as_ref(), model).await?;

        if let Some(ref bus) = self.event_bus {
            bus.publish(LedgerEvent::NotificationCreated {
                notification_id: created.id.clone(),
                user_id: created.user_id.clone(),
                notification_type: created.notification_type,
            });
        }
        Ok(created)
    }

    /// Deliver a notification whose failure must not fail the caller.
    pub async fn notify_after_commit(&self, new: NewNotification) {
        let recipient_id = new.recipient_id.clone();
        let kind = new.notification_type;
        if let Err(e) = self.notify(new).await {
            get_metrics().record_bookkeeping_failure();
            tracing::warn!(
                error = %e,
                recipient_id = %recipient_id,
                notification_type = ?kind,
                "Failed to create notification"
            );
        }
    }

    /// Newest notifications of the caller.
    pub async fn list(&self, session: &Session) -> AppResult<Vec<notification::Model>> {
        self.notification_repo
            .find_by_user(&session.user_id, NOTIFICATION_PAGE)
            .await
    }

    /// Unread notifications of the caller.
    pub async fn unread_count(&self, session: &Session) -> AppResult<u64> {
        self.notification_repo.count_unread(&session.user_id).await
    }

    /// Mark one of the caller's notifications as read.
    pub async fn mark_read(&self, session: &Session, id: &str) -> AppResult<()> {
        let notification = self
            .notification_repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Notification {id}")))?;

        if notification.user_id != session.user_id {
            return Err(AppError::Forbidden(
                "Not the recipient of this notification".to_string(),
            ));
        }
        if !notification.is_read {
            self.notification_repo.mark_read(id).await?;
        }
        Ok(())
    }

    /// Mark all of the caller's notifications as read.
    pub async fn mark_all_read(&self, session: &Session) -> AppResult<u64> {
        self.notification_repo.mark_all_read(&session.user_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::event_bus::EventFilter;
    use sea_orm::{DatabaseBackend, MockDatabase};
    use stackit_db::entities::user::Role;

    fn session(user_id: &str) -> Session {
        Session {
            user_id: user_id.to_string(),
            username: "alice".to_string(),
            role: Role::User,
            is_banned: false,
        }
    }

    fn notification(id: &str, user_id: &str) -> notification::Model {
        notification::Model {
            id: id.to_string(),
            user_id: user_id.to_string(),
            notification_type: NotificationType::Answer,
            message: "bob answered your question: Borrowing".to_string(),
            question_id: Some("q1".to_string()),
            actor_id: Some("u2".to_string()),
            is_read: false,
            created_at: Utc::now().into(),
        }
    }

    #[tokio::test]
    async fn test_mark_read_rejects_other_recipient() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[notification("n1", "u1")]])
                .into_connection(),
        );
        let service = NotificationService::new(db);

        let err = service.mark_read(&session("u2"), "n1").await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn test_mark_read_missing_is_not_found() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<notification::Model>::new()])
                .into_connection(),
        );
        let service = NotificationService::new(db);

        let err = service.mark_read(&session("u1"), "n9").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_notify_publishes_event() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[notification("n1", "u1")]])
                .into_connection(),
        );
        let bus = EventBus::default();
        let mut sub = bus.subscribe(EventFilter::Recipient("u1".to_string()));
        let mut service = NotificationService::new(db);
        service.set_event_bus(bus);

        let created = service
            .notify(NewNotification {
                recipient_id: "u1".to_string(),
                notification_type: NotificationType::Answer,
                message: "bob answered your question: Borrowing".to_string(),
                question_id: Some("q1".to_string()),
                actor_id: Some("u2".to_string()),
            })
            .await
            .unwrap();

        assert_eq!(created.id, "n1");
        assert_eq!(
            sub.recv().await.unwrap(),
            LedgerEvent::NotificationCreated {
                notification_id: "n1".to_string(),
                user_id: "u1".to_string(),
                notification_type: NotificationType::Answer,
            }
        );
    }
}
