use std::sync::OnceLock;

use argon2::{
    Argon2, PasswordHasher,
    password_hash::{PasswordHash, PasswordVerifier, SaltString},
};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use password_hash::rand_core::{OsRng, RngCore};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QuerySelect, Set,
    TransactionTrait,
    sea_query::{Expr, LockType},
};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    audit,
    config::AppConfig,
    dto::auth::{
        Claims, ForgotPasswordRequest, LoginRequest, RefreshRequest, RegisterRequest,
        ResetPasswordRequest, TokenResponse,
    },
    entity::{
        password_resets::{self, Entity as PasswordResets},
        refresh_tokens::{self, Entity as RefreshTokens},
        users::{self, Entity as Users},
    },
    enums::Role,
    error::{AppError, AppResult},
    integrations::mailer::Email,
    middleware::auth::AuthUser,
    models::User,
    response::{ApiResponse, Meta},
    state::AppState,
    validation::{Validator, clean_optional, normalize_email},
};

pub const MIN_PASSWORD_LEN: usize = 8;
const RESET_TOKEN_TTL_MINUTES: i64 = 60;
const FORGOT_PASSWORD_MESSAGE: &str = "If the account exists, a reset link has been sent";

pub fn hash_password(password: &str) -> AppResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

pub fn verify_password(hash: &str, password: &str) -> AppResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Invalid password hash")))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

/// Hash checked when no account matches, so unknown emails still pay for
/// an Argon2 verification.
fn decoy_hash() -> Option<&'static str> {
    static DECOY: OnceLock<Option<String>> = OnceLock::new();
    DECOY
        .get_or_init(|| hash_password(&generate_token()).ok())
        .as_deref()
}

/// 32 random bytes, hex encoded. Only the SHA-256 of it is stored.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.trim().as_bytes()))
}

pub fn encode_access_token(config: &AppConfig, user: &users::Model) -> AppResult<String> {
    let expiration = Utc::now()
        .checked_add_signed(Duration::minutes(config.jwt.access_ttl_minutes))
        .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to set expiration")))?;

    let claims = Claims {
        sub: user.id.to_string(),
        role: user.role.clone(),
        currency: user.preferred_currency.clone(),
        exp: expiration.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt.secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(anyhow::anyhow!(e.to_string())))
}

async fn issue_tokens<C: ConnectionTrait>(
    conn: &C,
    config: &AppConfig,
    user: &users::Model,
) -> AppResult<TokenResponse> {
    let access_token = encode_access_token(config, user)?;
    let refresh_token = generate_token();

    refresh_tokens::ActiveModel {
        id: Set(Uuid::new_v4()),
        user_id: Set(user.id),
        token_hash: Set(hash_token(&refresh_token)),
        expires_at: Set((Utc::now() + Duration::days(config.jwt.refresh_ttl_days)).into()),
        revoked_at: Set(None),
        created_at: Set(Utc::now().into()),
    }
    .insert(conn)
    .await?;

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: config.jwt.access_ttl_minutes * 60,
    })
}

pub async fn register_user(
    state: &AppState,
    payload: RegisterRequest,
) -> AppResult<ApiResponse<User>> {
    let email = normalize_email(&payload.email);
    let full_name = payload.full_name.trim().to_string();
    Validator::new()
        .email(&email, "email")
        .min_len(&payload.password, MIN_PASSWORD_LEN, "password")
        .finish()?;

    let exist = Users::find()
        .filter(users::Column::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    if exist.is_some() {
        return Err(AppError::Conflict("Email is already taken".to_string()));
    }

    let now = Utc::now();
    let user = users::ActiveModel {
        id: Set(Uuid::new_v4()),
        email: Set(email),
        password_hash: Set(hash_password(&payload.password)?),
        full_name: Set(full_name),
        phone: Set(clean_optional(payload.phone)),
        role: Set(Role::User.into()),
        preferred_currency: Set(None),
        is_active: Set(true),
        created_at: Set(now.into()),
        updated_at: Set(now.into()),
    }
    .insert(&state.orm)
    .await?;

    audit::record(
        &state.orm,
        Some(user.id),
        "user_register",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;
    tracing::info!(user_id = %user.id, "user registered");

    Ok(ApiResponse::success("User created", user.into(), None))
}

pub async fn login_user(
    state: &AppState,
    payload: LoginRequest,
) -> AppResult<ApiResponse<TokenResponse>> {
    let invalid = || AppError::Unauthorized("Invalid email or password".into());
    let email = normalize_email(&payload.email);
    let user = Users::find()
        .filter(users::Column::Email.eq(email.as_str()))
        .one(&state.orm)
        .await?;
    let Some(user) = user else {
        if let Some(hash) = decoy_hash() {
            let _ = verify_password(hash, &payload.password);
        }
        return Err(invalid());
    };

    if !verify_password(&user.password_hash, &payload.password)? || !user.is_active {
        return Err(invalid());
    }

    let tokens = issue_tokens(&state.orm, &state.config, &user).await?;

    audit::record(
        &state.orm,
        Some(user.id),
        "user_login",
        "users",
        serde_json::json!({ "user_id": user.id }),
    )
    .await;

    Ok(ApiResponse::success("Logged in", tokens, Some(Meta::empty())))
}

/// Rotates a refresh token: the presented one is revoked and a new pair issued.
pub async fn refresh_token(
    state: &AppState,
    payload: RefreshRequest,
) -> AppResult<ApiResponse<TokenResponse>> {
    let invalid = || AppError::Unauthorized("Invalid or expired refresh token".into());
    let txn = state.orm.begin().await?;

    let stored = RefreshTokens::find()
        .filter(refresh_tokens::Column::TokenHash.eq(hash_token(&payload.refresh_token)))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(invalid)?;

    let now = Utc::now();
    if stored.revoked_at.is_some() || stored.expires_at < now {
        return Err(invalid());
    }

    let user = Users::find_by_id(stored.user_id)
        .one(&txn)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(invalid)?;

    let mut active: refresh_tokens::ActiveModel = stored.into();
    active.revoked_at = Set(Some(now.into()));
    active.update(&txn).await?;

    let tokens = issue_tokens(&txn, &state.config, &user).await?;
    txn.commit().await?;

    Ok(ApiResponse::success("Token refreshed", tokens, Some(Meta::empty())))
}

pub async fn logout(
    state: &AppState,
    payload: RefreshRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let now: DateTime<FixedOffset> = Utc::now().into();
    let result = RefreshTokens::update_many()
        .col_expr(refresh_tokens::Column::RevokedAt, Expr::value(Some(now)))
        .filter(refresh_tokens::Column::TokenHash.eq(hash_token(&payload.refresh_token)))
        .filter(refresh_tokens::Column::RevokedAt.is_null())
        .exec(&state.orm)
        .await?;
    tracing::debug!(revoked = result.rows_affected, "logout");

    Ok(ApiResponse::success(
        "Logged out",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn forgot_password(
    state: &AppState,
    payload: ForgotPasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    let email = normalize_email(&payload.email);
    let user = Users::find()
        .filter(users::Column::Email.eq(email.as_str()))
        .filter(users::Column::IsActive.eq(true))
        .one(&state.orm)
        .await?;

    if let Some(user) = user {
        let token = generate_token();
        password_resets::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user.id),
            token_hash: Set(hash_token(&token)),
            expires_at: Set((Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES)).into()),
            used_at: Set(None),
            created_at: Set(Utc::now().into()),
        }
        .insert(&state.orm)
        .await?;

        let link = format!(
            "{}/reset-password?token={}",
            state.config.frontend_url.trim_end_matches('/'),
            token
        );
        let email = Email {
            to: user.email.clone(),
            subject: "Reset your password".to_string(),
            text: format!(
                "Hi {},\n\nUse the link below to choose a new password. It expires in one hour.\n\n{}\n",
                user.full_name, link
            ),
        };
        if let Err(err) = state.mailer.send(&email).await {
            tracing::warn!(user_id = %user.id, error = %err, "password reset email failed");
        }

        audit::record(
            &state.orm,
            Some(user.id),
            "password_reset_requested",
            "users",
            serde_json::json!({ "user_id": user.id }),
        )
        .await;
    }

    Ok(ApiResponse::success(
        FORGOT_PASSWORD_MESSAGE,
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn reset_password(
    state: &AppState,
    payload: ResetPasswordRequest,
) -> AppResult<ApiResponse<serde_json::Value>> {
    Validator::new()
        .min_len(&payload.new_password, MIN_PASSWORD_LEN, "new_password")
        .finish()?;

    let invalid = || AppError::BadRequest("Invalid or expired reset token".into());
    let txn = state.orm.begin().await?;

    let reset = PasswordResets::find()
        .filter(password_resets::Column::TokenHash.eq(hash_token(&payload.token)))
        .lock(LockType::Update)
        .one(&txn)
        .await?
        .ok_or_else(invalid)?;
    let now = Utc::now();
    if reset.used_at.is_some() || reset.expires_at < now {
        return Err(invalid());
    }

    let user = Users::find_by_id(reset.user_id)
        .one(&txn)
        .await?
        .ok_or(AppError::NotFound)?;
    let user_id = user.id;

    let mut active_user: users::ActiveModel = user.into();
    active_user.password_hash = Set(hash_password(&payload.new_password)?);
    active_user.updated_at = Set(now.into());
    active_user.update(&txn).await?;

    let mut active_reset: password_resets::ActiveModel = reset.into();
    active_reset.used_at = Set(Some(now.into()));
    active_reset.update(&txn).await?;

    revoke_all_refresh_tokens(&txn, user_id).await?;
    txn.commit().await?;

    audit::record(
        &state.orm,
        Some(user_id),
        "password_reset",
        "users",
        serde_json::json!({ "user_id": user_id }),
    )
    .await;

    Ok(ApiResponse::success(
        "Password updated",
        serde_json::json!({}),
        Some(Meta::empty()),
    ))
}

pub async fn revoke_all_refresh_tokens<C: ConnectionTrait>(conn: &C, user_id: Uuid) -> AppResult<u64> {
    let now: DateTime<FixedOffset> = Utc::now().into();
    let result = RefreshTokens::update_many()
        .col_expr(refresh_tokens::Column::RevokedAt, Expr::value(Some(now)))
        .filter(refresh_tokens::Column::UserId.eq(user_id))
        .filter(refresh_tokens::Column::RevokedAt.is_null())
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}

pub async fn me(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<User>> {
    let model = Users::find_by_id(user.user_id)
        .one(&state.orm)
        .await?
        .ok_or(AppError::NotFound)?;
    Ok(ApiResponse::success("OK", model.into(), Some(Meta::empty())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decoy_hash_never_matches() {
        let hash = decoy_hash().expect("decoy hash");
        assert!(!verify_password(hash, "password123").unwrap());
        assert_eq!(decoy_hash(), Some(hash));
    }

    #[test]
    fn tokens_are_random_and_hash_deterministically() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(hash_token(&a), hash_token(&a));
        assert_ne!(hash_token(&a), a);
    }

    #[test]
    fn password_hash_round_trip() {
        let hash = hash_password("correct horse").unwrap();
        assert!(verify_password(&hash, "correct horse").unwrap());
        assert!(!verify_password(&hash, "wrong horse").unwrap());
    }
}
