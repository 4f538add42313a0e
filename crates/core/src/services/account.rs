//! Account service: sign-up, sign-in and session tokens.

use std::sync::{Arc, LazyLock};

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use sea_orm::{DatabaseConnection, DatabaseTransaction, Set};
use serde::Deserialize;
use stackit_common::{AppError, AppResult, IdGenerator, Metrics, get_metrics};
use stackit_db::{
    RetryPolicy, UnitOfWork,
    entities::user::{self, Role},
    repositories::UserRepository,
    run_atomic,
};
use validator::Validate;

use crate::session::Session;

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("username pattern is valid"));

/// Input for creating an account.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignUpInput {
    #[validate(length(min = 3, max = 30), regex(path = *USERNAME_RE))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

/// Input for signing in with an email address or username.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SignInInput {
    #[validate(length(min = 1))]
    pub login: String,
    #[validate(length(min = 1))]
    pub password: String,
}

/// A signed-in user and the token for their session.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: user::Model,
    pub token: String,
}

/// Hash a password with Argon2id.
pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))
}

/// Check a password against a stored hash.
#[must_use]
pub fn verify_password(password: &str, hash: &str) -> bool {
    PasswordHash::new(hash).is_ok_and(|parsed| {
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok()
    })
}

struct CreateAccount<'a> {
    username: &'a str,
    email: &'a str,
    password_hash: &'a str,
    token: &'a str,
    id_gen: &'a IdGenerator,
}

#[async_trait]
impl<'a> UnitOfWork for CreateAccount<'a> {
    type Output = user::Model;

    async fn run(&self, txn: &DatabaseTransaction) -> AppResult<user::Model> {
        if UserRepository::find_by_username(txn, self.username)
            .await?
            .is_some()
        {
            return Err(AppError::InvalidArgument(
                "Username is already taken".to_string(),
            ));
        }
        if UserRepository::find_by_email(txn, self.email).await?.is_some() {
            return Err(AppError::InvalidArgument(
                "Email is already registered".to_string(),
            ));
        }

        let model = user::ActiveModel {
            id: Set(self.id_gen.generate()),
            username: Set(self.username.to_string()),
            username_lower: Set(self.username.to_lowercase()),
            email: Set(self.email.to_string()),
            token: Set(Some(self.token.to_string())),
            password_hash: Set(self.password_hash.to_string()),
            avatar_url: Set(None),
            bio: Set(None),
            role: Set(Role::User),
            karma: Set(0),
            badges: Set(user::json_list(Vec::<String>::new())),
            is_banned: Set(false),
            follower_count: Set(0),
            following_count: Set(0),
            questions_count: Set(0),
            answers_count: Set(0),
            accepted_answers: Set(0),
            question_ids: Set(user::json_list(Vec::<String>::new())),
            answer_ids: Set(user::json_list(Vec::<String>::new())),
            created_at: Set(Utc::now().into()),
            updated_at: Set(None),
        };
        UserRepository::create(txn, model).await
    }
}

/// Account service for business logic.
#[derive(Clone)]
pub struct AccountService {
    db: Arc<DatabaseConnection>,
    policy: RetryPolicy,
    user_repo: UserRepository,
    id_gen: IdGenerator,
}

impl AccountService {
    /// Create a new account service.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>, policy: RetryPolicy) -> Self {
        Self {
            user_repo: UserRepository::new(db.clone()),
            db,
            policy,
            id_gen: IdGenerator::new(),
        }
    }

    /// Create an account and sign it in.
    pub async fn sign_up(&self, input: SignUpInput) -> AppResult<SignedIn> {
        input.validate()?;

        let email = input.email.trim().to_lowercase();
        let password_hash = hash_password(&input.password)?;
        let token = self.id_gen.generate_token();

        let work = CreateAccount {
            username: input.username.trim(),
            email: &email,
            password_hash: &password_hash,
            token: &token,
            id_gen: &self.id_gen,
        };
        let user = run_atomic(&self.db, &self.policy, &work).await?;

        Metrics::incr(&get_metrics().users_registered);
        tracing::info!(user_id = %user.id, username = %user.username, "User registered");
        Ok(SignedIn { user, token })
    }

    /// Sign in with an email address or username.
    pub async fn sign_in(&self, input: SignInInput) -> AppResult<SignedIn> {
        input.validate()?;

        let login = input.login.trim();
        let found = if login.contains('@') {
            UserRepository::find_by_email(self.db.as_ref(), login).await?
        } else {
            UserRepository::find_by_username(self.db.as_ref(), login).await?
        };
        let Some(user) = found else {
            return Err(AppError::Unauthorized);
        };
        if !verify_password(&input.password, &user.password_hash) {
            tracing::debug!(user_id = %user.id, "Rejected sign-in with wrong password");
            return Err(AppError::Unauthorized);
        }

        if let Some(token) = user.token.clone() {
            return Ok(SignedIn { user, token });
        }

        let token = self.id_gen.generate_token();
        let mut active: user::ActiveModel = user.into();
        active.token = Set(Some(token.clone()));
        let user = UserRepository::update(self.db.as_ref(), active).await?;
        Ok(SignedIn { user, token })
    }

    /// End every session using `token` by rotating it.
    pub async fn sign_out(&self, token: &str) -> AppResult<()> {
        let user = self
            .user_repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)?;

        let mut active: user::ActiveModel = user.into();
        active.token = Set(Some(self.id_gen.generate_token()));
        UserRepository::update(self.db.as_ref(), active).await?;
        Ok(())
    }

    /// Resolve a bearer token to a session.
    pub async fn authenticate(&self, token: &str) -> AppResult<Session> {
        let user = self
            .user_repo
            .find_by_token(token)
            .await?
            .ok_or(AppError::Unauthorized)?;
        Ok(Session::from_user(&user))
    }

    /// The signed-in user's row.
    pub async fn current_user(&self, session: &Session) -> AppResult<user::Model> {
        UserRepository::get_by_id(self.db.as_ref(), &session.user_id).await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase};

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("correct horse battery").unwrap();
        assert!(verify_password("correct horse battery", &hash));
        assert!(!verify_password("wrong", &hash));
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_sign_up_validation() {
        let valid = SignUpInput {
            username: "alice_01".to_string(),
            email: "alice@example.com".to_string(),
            password: "longenough".to_string(),
        };
        assert!(valid.validate().is_ok());

        let bad_username = SignUpInput {
            username: "al ice".to_string(),
            ..valid.clone()
        };
        assert!(bad_username.validate().is_err());

        let short_password = SignUpInput {
            password: "short".to_string(),
            ..valid.clone()
        };
        assert!(short_password.validate().is_err());

        let bad_email = SignUpInput {
            email: "not-an-email".to_string(),
            ..valid
        };
        assert!(bad_email.validate().is_err());
    }

    #[tokio::test]
    async fn test_authenticate_unknown_token_is_unauthorized() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([Vec::<user::Model>::new()])
                .into_connection(),
        );
        let service = AccountService::new(db, RetryPolicy::default());

        let err = service.authenticate("nope").await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized));
    }
}
