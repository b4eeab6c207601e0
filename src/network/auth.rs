//! Admin Authentication
//!
//! Gates the administrative surface. An operator presents either the static
//! admin token or an HS256 JWT whose `role` claim is `admin`.
//! The server does NOT issue tokens - only validates them.

use jsonwebtoken::{decode, DecodingKey, Validation, Algorithm, TokenData};
use serde::{Deserialize, Serialize};
use sha2::{Sha256, Digest};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Role claim value that grants admin access.
pub const ADMIN_ROLE: &str = "admin";

/// Authentication configuration.
#[derive(Clone, Debug, Default)]
pub struct AuthConfig {
    /// Static admin bearer token.
    pub admin_token: Option<String>,
    /// HS256 secret for admin JWTs.
    pub jwt_secret: Option<String>,
    /// Expected issuer claim ("iss"). If None, any issuer accepted.
    pub issuer: Option<String>,
}

impl AuthConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            admin_token: non_empty_env("ADMIN_TOKEN"),
            jwt_secret: non_empty_env("ADMIN_JWT_SECRET"),
            issuer: non_empty_env("ADMIN_JWT_ISSUER"),
        }
    }

    /// Check if any admin credential is configured.
    pub fn is_configured(&self) -> bool {
        self.admin_token.is_some() || self.jwt_secret.is_some()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Claims expected in an admin JWT.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminClaims {
    /// Subject - the operator's identity.
    pub sub: String,
    /// Role; must be `admin`.
    #[serde(default)]
    pub role: String,
    /// Expiry timestamp (Unix seconds).
    #[serde(default)]
    pub exp: u64,
    /// Issued at timestamp.
    #[serde(default)]
    pub iat: u64,
    /// Issuer.
    #[serde(default)]
    pub iss: Option<String>,
}

/// Who performed an admin operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminIdentity {
    /// Holder of the static token.
    StaticToken,
    /// JWT subject.
    Operator(String),
}

impl AdminIdentity {
    /// Short, non-reversible label for logs.
    pub fn log_label(&self) -> String {
        match self {
            AdminIdentity::StaticToken => "static-token".to_string(),
            AdminIdentity::Operator(sub) => {
                let mut hasher = Sha256::new();
                hasher.update(b"pusher-slot-admin:");
                hasher.update(sub.as_bytes());
                format!("op-{}", hex::encode(&hasher.finalize()[..4]))
            }
        }
    }
}

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No admin credential configured on server.
    #[error("admin access not configured")]
    NotConfigured,
    /// No credential presented.
    #[error("missing admin credential")]
    Missing,
    /// Token format is invalid.
    #[error("invalid token format")]
    InvalidFormat,
    /// Token signature verification failed.
    #[error("invalid signature")]
    InvalidSignature,
    /// Token has expired.
    #[error("token expired")]
    Expired,
    /// Issuer claim doesn't match expected value.
    #[error("invalid issuer")]
    InvalidIssuer,
    /// Token is valid but does not carry the admin role.
    #[error("role {0:?} is not admin")]
    NotAdmin(String),
    /// JWT decoding error.
    #[error("decode error: {0}")]
    DecodeError(String),
}

/// Authorize an admin credential.
pub fn authorize_admin(token: &str, config: &AuthConfig) -> Result<AdminIdentity, AuthError> {
    if !config.is_configured() {
        return Err(AuthError::NotConfigured);
    }

    let token = token.trim();
    let token = token.strip_prefix("Bearer ").unwrap_or(token);
    if token.is_empty() {
        return Err(AuthError::Missing);
    }

    if let Some(ref expected) = config.admin_token {
        if constant_time_eq(token.as_bytes(), expected.as_bytes()) {
            return Ok(AdminIdentity::StaticToken);
        }
    }

    if config.jwt_secret.is_none() {
        return Err(AuthError::InvalidSignature);
    }

    let claims = validate_admin_jwt(token, config)?;
    Ok(AdminIdentity::Operator(claims.sub))
}

/// Validate an admin JWT and extract claims.
pub fn validate_admin_jwt(token: &str, config: &AuthConfig) -> Result<AdminClaims, AuthError> {
    let secret = config.jwt_secret.as_ref().ok_or(AuthError::NotConfigured)?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.required_spec_claims = std::collections::HashSet::new();
    validation.validate_aud = false;
    if let Some(ref issuer) = config.issuer {
        validation.set_issuer(&[issuer]);
    }

    let key = DecodingKey::from_secret(secret.as_bytes());
    let token_data: TokenData<AdminClaims> =
        decode(token, &key, &validation).map_err(map_jwt_error)?;
    let claims = token_data.claims;

    // exp is optional in the claims, so check it by hand when present
    if claims.exp > 0 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if now > claims.exp {
            return Err(AuthError::Expired);
        }
    }

    if claims.role != ADMIN_ROLE {
        return Err(AuthError::NotAdmin(claims.role));
    }

    Ok(claims)
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Map JWT library errors to our error type.
fn map_jwt_error(err: jsonwebtoken::errors::Error) -> AuthError {
    use jsonwebtoken::errors::ErrorKind;
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
        ErrorKind::InvalidToken | ErrorKind::Base64(_) => AuthError::InvalidFormat,
        _ => AuthError::DecodeError(err.to_string()),
    }
}

// =============================================================================
// TESTS
// =============================================================================
