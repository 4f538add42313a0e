//! API middleware and shared state.

#![allow(missing_docs)]

use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use sea_orm::DatabaseConnection;
use stackit_common::{Timer, get_metrics};
use stackit_core::{
    AcceptanceService, AccountService, AdminService, AiService, AnswerService, BookmarkService,
    ContentCounters, EventBus, FollowService, KarmaService, NotificationService, QuestionService,
    TagService, UserService, VoteService,
};
use stackit_db::{RetryPolicy, repositories::TagRepository};

/// Application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub account_service: AccountService,
    pub question_service: QuestionService,
    pub answer_service: AnswerService,
    pub acceptance_service: AcceptanceService,
    pub vote_service: VoteService,
    pub karma_service: KarmaService,
    pub follow_service: FollowService,
    pub bookmark_service: BookmarkService,
    pub user_service: UserService,
    pub notification_service: NotificationService,
    pub tag_service: TagService,
    pub admin_service: AdminService,
    pub ai_service: AiService,
    pub event_bus: EventBus,
}

impl AppState {
    /// Wire every service onto one connection pool and a shared event bus.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, policy: RetryPolicy, ai_service: AiService) -> Self {
        let event_bus = EventBus::default();

        let karma_service = KarmaService::new(db.clone(), policy);
        let mut notification_service = NotificationService::new(db.clone());
        notification_service.set_event_bus(event_bus.clone());

        let mut question_service = QuestionService::new(db.clone(), policy, karma_service.clone());
        question_service.set_event_bus(event_bus.clone());

        let mut answer_service = AnswerService::new(
            db.clone(),
            policy,
            karma_service.clone(),
            notification_service.clone(),
        );
        answer_service.set_event_bus(event_bus.clone());

        let mut acceptance_service =
            AcceptanceService::new(db.clone(), policy, notification_service.clone());
        acceptance_service.set_event_bus(event_bus.clone());

        let mut vote_service = VoteService::new(db.clone(), policy);
        vote_service.set_event_bus(event_bus.clone());

        let counters = ContentCounters::new(db.clone(), policy);

        Self {
            account_service: AccountService::new(db.clone(), policy),
            follow_service: FollowService::new(db.clone(), policy, notification_service.clone()),
            bookmark_service: BookmarkService::new(db.clone(), policy, question_service.clone()),
            user_service: UserService::new(db.clone()),
            tag_service: TagService::new(TagRepository::new(db.clone())),
            admin_service: AdminService::new(db.clone(), counters),
            question_service,
            answer_service,
            acceptance_service,
            vote_service,
            karma_service,
            notification_service,
            ai_service,
            event_bus,
            db,
        }
    }
}

/// Raw bearer token of the current request, kept for sign-out.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

/// Authentication middleware.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> Response {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(ToString::to_string);

    if let Some(token) = token {
        match state.account_service.authenticate(&token).await {
            Ok(session) => {
                req.extensions_mut().insert(session);
                req.extensions_mut().insert(BearerToken(token));
            }
            Err(e) => tracing::debug!(error = %e, "Bearer token rejected"),
        }
    }

    next.run(req).await
}

/// Request counting and latency middleware.
pub async fn metrics_middleware(req: Request<Body>, next: Next) -> Response {
    let metrics = get_metrics();
    let timer = Timer::start();
    metrics.start_request();

    let response = next.run(req).await;

    metrics.end_request();
    metrics.record_http_request(response.status().as_u16(), timer.elapsed());
    response
}
