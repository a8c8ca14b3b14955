use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    Json, RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::error::{AppError, AppResult};
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    pub is_admin: bool,
    /// Distinguishes access tokens (short-lived) from refresh tokens (long-lived).
    /// AuthUser rejects refresh tokens so they cannot be used as bearer tokens.
    pub token_type: TokenType,
}

impl Claims {
    fn new(user_id: i64, is_admin: bool, expiration_minutes: i64, token_type: TokenType) -> Self {
        let now = Utc::now();
        let exp = now + Duration::minutes(expiration_minutes);

        Claims {
            sub: user_id.to_string(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            is_admin,
            token_type,
        }
    }

    pub fn user_id(&self) -> AppResult<i64> {
        self.sub
            .parse()
            .map_err(|_| AppError::Unauthenticated("Invalid user ID in token".into()))
    }
}

// ============================================================================
// JWT Operations
// ============================================================================

pub fn create_access_token(
    user_id: i64,
    is_admin: bool,
    secret: &str,
    ttl_minutes: i64,
) -> AppResult<String> {
    let claims = Claims::new(user_id, is_admin, ttl_minutes, TokenType::Access);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = ?e, "Failed to create access token");
        AppError::Internal
    })
}

pub fn create_refresh_token(
    user_id: i64,
    is_admin: bool,
    secret: &str,
    ttl_minutes: i64,
) -> AppResult<String> {
    let claims = Claims::new(user_id, is_admin, ttl_minutes, TokenType::Refresh);

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| {
        tracing::error!(error = ?e, "Failed to create refresh token");
        AppError::Internal
    })
}

pub fn validate_token(token: &str, secret: &str) -> AppResult<Claims> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!(error = ?e, "Token validation failed");
        AppError::Unauthenticated("Invalid or expired token".into())
    })
}

// ============================================================================
// Refresh Token Hashing
// ============================================================================

/// Hash a refresh token with SHA-256 for deterministic storage and lookup.
/// bcrypt is intentionally NOT used here because it is non-deterministic —
/// the same input produces different hashes on every call, making DB lookups
/// by hash impossible without scanning all rows.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// Password Hashing
// ============================================================================

pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, 12).map_err(|e| {
        tracing::error!(error = ?e, "Failed to hash password");
        AppError::Internal
    })
}

pub fn verify_password(password: &str, hash: &str) -> AppResult<bool> {
    bcrypt::verify(password, hash).map_err(|e| {
        tracing::error!(error = ?e, "Failed to verify password");
        AppError::Internal
    })
}

// ============================================================================
// Auth Middleware
// ============================================================================

/// Authenticated user extracted from a valid access-token bearer header.
///
/// Fields are private: the only valid constructor is the `FromRequestParts`
/// impl, preventing callers from forging an `AuthUser` via struct literal.
pub struct AuthUser {
    user_id: i64,
    is_admin: bool,
}

impl AuthUser {
    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }
}

type AuthRejection = (StatusCode, Json<serde_json::Value>);

fn auth_error(message: &str) -> AuthRejection {
    (StatusCode::UNAUTHORIZED, Json(json!({ "error": message })))
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AuthRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| auth_error("Missing or invalid Authorization header"))?;

        let claims = validate_token(bearer.token(), &state.jwt_secret)
            .map_err(|_| auth_error("Invalid or expired token"))?;

        // Reject refresh tokens used as access tokens.
        if claims.token_type != TokenType::Access {
            return Err(auth_error("Invalid token type"));
        }

        let user_id = claims
            .user_id()
            .map_err(|_| auth_error("Invalid token subject"))?;

        Ok(AuthUser {
            user_id,
            is_admin: claims.is_admin,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SECRET: &str = "test-secret-min-32-characters-long!!";

    #[test]
    fn hash_refresh_token_is_64_char_hex() {
        let hash = hash_refresh_token("some-random-token");
        assert_eq!(hash.len(), 64, "SHA-256 hex output must be 64 characters");
        assert!(
            hash.chars().all(|c| c.is_ascii_hexdigit()),
            "Output must be lowercase hex"
        );
    }

    #[test]
    fn hash_refresh_token_is_deterministic() {
        let token = "deterministic-test-token";
        assert_eq!(hash_refresh_token(token), hash_refresh_token(token));
    }

    #[test]
    fn hash_refresh_token_differs_on_different_inputs() {
        assert_ne!(
            hash_refresh_token("token-alpha"),
            hash_refresh_token("token-beta")
        );
    }

    #[test]
    fn access_token_roundtrip_happy_path() {
        let token =
            create_access_token(7, false, TEST_SECRET, 15).expect("token creation should succeed");

        let claims = validate_token(&token, TEST_SECRET).expect("validation should succeed");

        assert_eq!(claims.sub, "7");
        assert_eq!(claims.token_type, TokenType::Access);
        assert!(!claims.is_admin);
    }

    #[test]
    fn refresh_token_roundtrip_happy_path() {
        let token = create_refresh_token(9, true, TEST_SECRET, 43200)
            .expect("token creation should succeed");

        let claims = validate_token(&token, TEST_SECRET).expect("validation should succeed");

        assert_eq!(claims.sub, "9");
        assert_eq!(claims.token_type, TokenType::Refresh);
        assert!(claims.is_admin);
    }

    #[test]
    fn access_and_refresh_tokens_are_distinguishable() {
        let access = create_access_token(3, false, TEST_SECRET, 15).unwrap();
        let refresh = create_refresh_token(3, false, TEST_SECRET, 10080).unwrap();

        let access_claims = validate_token(&access, TEST_SECRET).unwrap();
        let refresh_claims = validate_token(&refresh, TEST_SECRET).unwrap();

        assert_ne!(access_claims.token_type, refresh_claims.token_type);
    }

    #[test]
    fn validate_token_rejects_wrong_secret() {
        let token = create_access_token(4, false, TEST_SECRET, 15).unwrap();
        let result = validate_token(&token, "completely-different-secret-value!!");
        assert!(result.is_err());
    }

    #[test]
    fn validate_token_rejects_malformed_string() {
        assert!(validate_token("this.is.not.a.valid.jwt", TEST_SECRET).is_err());
    }

    #[test]
    fn validate_token_rejects_empty_string() {
        assert!(validate_token("", TEST_SECRET).is_err());
    }

    #[test]
    fn password_hash_verify_roundtrip_correct_password() {
        let password = "super-secure-password-123!";
        let hash = hash_password(password).unwrap();
        assert!(verify_password(password, &hash).unwrap());
    }

    #[test]
    fn password_hash_verify_roundtrip_wrong_password() {
        let hash = hash_password("correct-password").unwrap();
        assert!(!verify_password("wrong-password", &hash).unwrap());
    }

    #[test]
    fn claims_user_id_parses_valid_i64() {
        let token = create_access_token(42, false, TEST_SECRET, 15).unwrap();
        let claims = validate_token(&token, TEST_SECRET).unwrap();
        assert_eq!(claims.user_id().unwrap(), 42);
    }

    #[test]
    fn claims_user_id_rejects_invalid_sub() {
        let claims = Claims {
            sub: "not-a-number".to_string(),
            exp: 9999999999,
            iat: 0,
            is_admin: false,
            token_type: TokenType::Access,
        };
        assert!(claims.user_id().is_err());
    }
}
