//! Authentication utilities
//!
//! Provides:
//! - Password hashing (Argon2)
//! - JWT token generation and validation
//! - Authenticated user extraction for handlers

use crate::errors::{AppError, Result};
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Header carrying the session token
pub const AUTH_TOKEN_HEADER: &str = "x-auth-token";

/// The authenticated caller, available to handlers as an extractor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: Uuid,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    /// The user the token was issued to
    pub user: ClaimsUser,

    /// Expiration time (Unix timestamp)
    pub exp: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClaimsUser {
    pub id: String,
}

/// JWT token manager
pub struct JwtManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    expiration_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager with the given secret
    pub fn new(secret: &str, expiration_secs: u64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            expiration_secs: expiration_secs as i64,
        }
    }

    /// Generate a new JWT token for a user
    pub fn generate_token(&self, user_id: Uuid) -> Result<String> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.expiration_secs);

        let claims = JwtClaims {
            user: ClaimsUser { id: user_id.to_string() },
            exp: exp.timestamp(),
            iat: now.timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal {
                message: format!("Failed to generate token: {}", e)
            })
    }

    /// Validate and decode a JWT token
    pub fn validate_token(&self, token: &str) -> Result<JwtClaims> {
        decode::<JwtClaims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                        AppError::ExpiredToken
                    }
                    _ => AppError::InvalidToken,
                }
            })
    }

    /// Validate a token and resolve the user it was issued to
    pub fn authenticate(&self, token: &str) -> Result<AuthUser> {
        let claims = self.validate_token(token)?;
        let id = Uuid::parse_str(&claims.user.id).map_err(|_| AppError::InvalidToken)?;
        Ok(AuthUser { id })
    }
}

/// Hash a password for storage
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::Internal {
            message: format!("Failed to hash password: {}", e),
        })
}

/// Check a password against a stored hash
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            false
        }
    }
}

/// Extract a bearer token from an Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header.strip_prefix("Bearer ").map(str::trim).filter(|t| !t.is_empty())
}

/// Read the session token from `x-auth-token`, falling back to `Authorization: Bearer`
fn token_from_parts(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTH_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| {
            parts
                .headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .and_then(extract_bearer_token)
        })
}

/// Axum extractor for AuthUser
impl<S> FromRequestParts<S> for AuthUser
where
    Arc<JwtManager>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self> {
        let token = token_from_parts(parts).ok_or_else(|| AppError::Unauthorized {
            message: "No token, authorization denied".to_string(),
        })?;

        let jwt = Arc::<JwtManager>::from_ref(state);
        let user = jwt.authenticate(token)?;

        tracing::debug!(user_id = %user.id, "Request authenticated");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[test]
    fn test_password_roundtrip() {
        let hash = hash_password("correct horse").unwrap();
        assert_ne!(hash, "correct horse");
        assert!(verify_password("correct horse", &hash));
        assert!(!verify_password("wrong horse", &hash));
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("Bearer "), None);
        assert_eq!(extract_bearer_token("abc.def"), None);
        assert_eq!(extract_bearer_token("Basic abc"), None);
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test_secret", 3600);
        let user_id = Uuid::new_v4();

        let token = manager.generate_token(user_id).unwrap();
        let claims = manager.validate_token(&token).unwrap();

        assert_eq!(claims.user.id, user_id.to_string());
        assert!(claims.exp > claims.iat);
        assert_eq!(manager.authenticate(&token).unwrap().id, user_id);
    }

    #[test]
    fn test_jwt_wrong_secret() {
        let issuer = JwtManager::new("secret-a", 3600);
        let verifier = JwtManager::new("secret-b", 3600);
        let token = issuer.generate_token(Uuid::new_v4()).unwrap();

        assert!(matches!(verifier.validate_token(&token), Err(AppError::InvalidToken)));
    }

    #[test]
    fn test_jwt_expired() {
        // Well past the default 60s leeway
        let manager = JwtManager::new("test_secret", 0);
        let claims = JwtClaims {
            user: ClaimsUser { id: Uuid::new_v4().to_string() },
            exp: Utc::now().timestamp() - 600,
            iat: Utc::now().timestamp() - 4200,
        };
        let token = encode(&Header::default(), &claims, &manager.encoding_key).unwrap();

        assert!(matches!(manager.validate_token(&token), Err(AppError::ExpiredToken)));
    }

    #[test]
    fn test_token_header_precedence() {
        let req = Request::builder()
            .header(AUTH_TOKEN_HEADER, "from-header")
            .header("authorization", "Bearer from-bearer")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(token_from_parts(&parts), Some("from-header"));

        let req = Request::builder()
            .header("authorization", "Bearer from-bearer")
            .body(())
            .unwrap();
        let (parts, _) = req.into_parts();
        assert_eq!(token_from_parts(&parts), Some("from-bearer"));
    }

    #[tokio::test]
    async fn test_extractor_rejects_missing_token() {
        let jwt = Arc::new(JwtManager::new("test_secret", 3600));
        let (mut parts, _) = Request::builder().body(()).unwrap().into_parts();

        let result = AuthUser::from_request_parts(&mut parts, &jwt).await;
        assert!(matches!(result, Err(AppError::Unauthorized { .. })));
    }

    #[tokio::test]
    async fn test_extractor_accepts_valid_token() {
        let jwt = Arc::new(JwtManager::new("test_secret", 3600));
        let user_id = Uuid::new_v4();
        let token = jwt.generate_token(user_id).unwrap();
        let (mut parts, _) = Request::builder()
            .header(AUTH_TOKEN_HEADER, token)
            .body(())
            .unwrap()
            .into_parts();

        let user = AuthUser::from_request_parts(&mut parts, &jwt).await.unwrap();
        assert_eq!(user.id, user_id);
    }
}
