use std::sync::Arc;

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand_core::OsRng;
use tracing::info;
use uuid::Uuid;

use city_db::Database;
use city_db::queries::users;
use city_types::api::{Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::ApiError;
use crate::subscriptions::SubscriptionPolicy;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub subscriptions: SubscriptionPolicy,
    /// Upper bound for `limit` on mail pages.
    pub mail_page_limit: u32,
}

pub fn register(db: &Database, secret: &str, req: RegisterRequest) -> Result<RegisterResponse, ApiError> {
    let username = req.username.trim();
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::invalid("username must be 3-32 characters"));
    }
    if req.password.len() < 8 {
        return Err(ApiError::invalid("password must be at least 8 characters"));
    }
    let email = non_blank(req.email);
    let nickname = non_blank(req.nickname);

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();

    let user_id = Uuid::new_v4();
    db.with_tx(|tx| {
        if users::get_user_row_by_username(tx, username)?.is_some() {
            return Err(ApiError::Conflict("username already taken".into()));
        }
        users::insert_user(
            tx,
            user_id,
            username,
            &password_hash,
            email.as_deref(),
            nickname.as_deref(),
            Utc::now(),
        )?;
        Ok(())
    })?;

    let claims = claims_for(user_id, username, email, nickname);
    let token = create_token(secret, &claims)?;
    info!("Registered user {} ({})", username, user_id);

    Ok(RegisterResponse { user_id, token })
}

pub fn login(db: &Database, secret: &str, req: LoginRequest) -> Result<LoginResponse, ApiError> {
    let user = db
        .with_conn(|conn| users::get_user_row_by_username(conn, req.username.trim()))?
        .ok_or(ApiError::Unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password)
        .map_err(|e| anyhow::anyhow!("Stored password hash is corrupt: {}", e))?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::Unauthorized)?;

    let user_id: Uuid = user
        .id
        .parse()
        .map_err(|e| anyhow::anyhow!("Corrupt user id '{}': {}", user.id, e))?;

    let claims = claims_for(user_id, &user.username, user.email, user.nickname);
    let token = create_token(secret, &claims)?;

    Ok(LoginResponse {
        user_id,
        username: user.username,
        token,
    })
}

pub fn create_token(secret: &str, claims: &Claims) -> anyhow::Result<String> {
    let token = encode(
        &Header::default(),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, ApiError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|_| ApiError::Unauthorized)
}

/// Claims for a fresh 30-day token.
pub fn claims_for(
    user_id: Uuid,
    username: &str,
    email: Option<String>,
    nickname: Option<String>,
) -> Claims {
    Claims {
        sub: user_id,
        username: username.to_string(),
        email,
        nickname,
        exp: (Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    fn register_req(username: &str, password: &str) -> RegisterRequest {
        RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            email: Some("ann@example.com".to_string()),
            nickname: Some("  ".to_string()),
        }
    }

    #[test]
    fn register_then_login() {
        let db = Database::open_in_memory().unwrap();
        let registered = register(&db, SECRET, register_req("ann", "correct horse")).unwrap();

        let claims = verify_token(SECRET, &registered.token).unwrap();
        assert_eq!(claims.sub, registered.user_id);
        assert_eq!(claims.email.as_deref(), Some("ann@example.com"));
        assert_eq!(claims.nickname, None);

        let logged_in = login(
            &db,
            SECRET,
            LoginRequest {
                username: "ann".to_string(),
                password: "correct horse".to_string(),
            },
        )
        .unwrap();
        assert_eq!(logged_in.user_id, registered.user_id);
    }

    #[test]
    fn wrong_password_is_unauthorized() {
        let db = Database::open_in_memory().unwrap();
        register(&db, SECRET, register_req("ann", "correct horse")).unwrap();
        let err = login(
            &db,
            SECRET,
            LoginRequest {
                username: "ann".to_string(),
                password: "battery staple".to_string(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized));
    }

    #[test]
    fn duplicate_username_conflicts() {
        let db = Database::open_in_memory().unwrap();
        register(&db, SECRET, register_req("ann", "correct horse")).unwrap();
        let err = register(&db, SECRET, register_req("ann", "another pass")).unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let claims = claims_for(Uuid::new_v4(), "ann", None, None);
        let token = create_token("other", &claims).unwrap();
        assert!(matches!(verify_token(SECRET, &token), Err(ApiError::Unauthorized)));
    }
}
