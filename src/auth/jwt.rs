//! JWT token handling
//!
//! Access and refresh tokens are HS256 JWTs. Both embed the user's
//! `token_version`; bumping it on the user record (logout, password change)
//! invalidates every token issued before.

use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::auth::Role;
use crate::types::ApiError;

/// Which purpose a token was issued for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

/// Payload stored in JWT token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User ID
    pub sub: String,
    pub email: String,
    pub role: Role,
    /// Must match the user's current token_version
    pub token_version: i32,
    pub kind: TokenKind,
    /// Unique token id
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Input for creating a new token
#[derive(Debug, Clone)]
pub struct TokenInput {
    pub user_id: String,
    pub email: String,
    pub role: Role,
    pub token_version: i32,
}

/// An issued access/refresh pair
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    pub expires_in: u64,
    pub expires_at: u64,
}

/// JWT validator and generator
#[derive(Clone)]
pub struct JwtValidator {
    secret: String,
    expiry_seconds: u64,
    refresh_expiry_seconds: u64,
}

fn now_secs() -> Result<u64, ApiError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|e| ApiError::Auth(format!("System time error: {}", e)))
}

impl JwtValidator {
    /// Create a new JWT validator
    ///
    /// Returns an error if the secret is empty or too short
    pub fn new(secret: String, expiry_seconds: u64, refresh_expiry_seconds: u64) -> Result<Self, ApiError> {
        if secret.is_empty() {
            return Err(ApiError::Config("JWT_SECRET is required in production mode".into()));
        }

        if secret.len() < 32 {
            return Err(ApiError::Config("JWT_SECRET must be at least 32 characters".into()));
        }

        Ok(Self {
            secret,
            expiry_seconds,
            refresh_expiry_seconds,
        })
    }

    fn issue(&self, input: &TokenInput, kind: TokenKind, lifetime: u64) -> Result<(String, u64), ApiError> {
        let now = now_secs()?;
        let claims = Claims {
            sub: input.user_id.clone(),
            email: input.email.clone(),
            role: input.role,
            token_version: input.token_version,
            kind,
            jti: uuid::Uuid::new_v4().to_string(),
            iat: now,
            exp: now + lifetime,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::Auth(format!("Failed to generate token: {}", e)))?;

        Ok((token, claims.exp))
    }

    /// Generate an access token
    pub fn generate_token(&self, input: &TokenInput) -> Result<String, ApiError> {
        self.issue(input, TokenKind::Access, self.expiry_seconds)
            .map(|(token, _)| token)
    }

    /// Generate an access + refresh token pair
    pub fn generate_pair(&self, input: &TokenInput) -> Result<TokenPair, ApiError> {
        let (access_token, expires_at) = self.issue(input, TokenKind::Access, self.expiry_seconds)?;
        let (refresh_token, _) = self.issue(input, TokenKind::Refresh, self.refresh_expiry_seconds)?;

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer",
            expires_in: self.expiry_seconds,
            expires_at,
        })
    }

    /// Verify and decode a JWT token of the expected kind
    pub fn verify(&self, token: &str, expected: TokenKind) -> Result<Claims, ApiError> {
        let validation = Validation::default();

        let claims = match decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &validation,
        ) {
            Ok(data) => data.claims,
            Err(err) => {
                use jsonwebtoken::errors::ErrorKind;
                let msg = match err.kind() {
                    ErrorKind::ExpiredSignature => "Το διακριτικό έχει λήξει.",
                    ErrorKind::InvalidSignature => "Μη έγκυρη υπογραφή διακριτικού.",
                    _ => "Μη έγκυρο διακριτικό.",
                };
                return Err(ApiError::Unauthorized(msg.into()));
            }
        };

        if claims.kind != expected {
            return Err(ApiError::Unauthorized("Λάθος τύπος διακριτικού.".into()));
        }

        Ok(claims)
    }
}

/// Extract token from Authorization header.
/// Supports "Bearer <token>" format.
pub fn extract_token_from_header(auth_header: Option<&str>) -> Option<&str> {
    let token = auth_header?.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_validator() -> JwtValidator {
        JwtValidator::new(
            "test-secret-that-is-at-least-32-characters-long".into(),
            3600,
            86400,
        )
        .unwrap()
    }

    fn input() -> TokenInput {
        TokenInput {
            user_id: "user-123".into(),
            email: "test@example.org".into(),
            role: Role::ShiftLeader,
            token_version: 3,
        }
    }

    #[test]
    fn test_generate_and_verify_token() {
        let validator = test_validator();
        let token = validator.generate_token(&input()).unwrap();

        let claims = validator.verify(&token, TokenKind::Access).unwrap();
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.role, Role::ShiftLeader);
        assert_eq!(claims.token_version, 3);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn test_refresh_token_is_not_an_access_token() {
        let validator = test_validator();
        let pair = validator.generate_pair(&input()).unwrap();

        assert!(validator.verify(&pair.refresh_token, TokenKind::Access).is_err());
        assert!(validator.verify(&pair.refresh_token, TokenKind::Refresh).is_ok());
        assert!(validator.verify(&pair.access_token, TokenKind::Refresh).is_err());
        assert_eq!(pair.token_type, "Bearer");
    }

    #[test]
    fn test_wrong_secret() {
        let other = JwtValidator::new(
            "different-secret-that-is-at-least-32-characters".into(),
            3600,
            86400,
        )
        .unwrap();
        let token = test_validator().generate_token(&input()).unwrap();
        assert!(matches!(
            other.verify(&token, TokenKind::Access),
            Err(ApiError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_garbage_token() {
        assert!(test_validator().verify("invalid-token", TokenKind::Access).is_err());
    }

    #[test]
    fn test_extract_token_from_header() {
        assert_eq!(extract_token_from_header(Some("Bearer abc123")), Some("abc123"));
        assert_eq!(extract_token_from_header(None), None);
        assert_eq!(extract_token_from_header(Some("")), None);
        assert_eq!(extract_token_from_header(Some("Bearer ")), None);
        assert_eq!(extract_token_from_header(Some("Basic abc123")), None);
    }

    #[test]
    fn test_secret_validation() {
        assert!(JwtValidator::new("short".into(), 3600, 60).is_err());
        assert!(JwtValidator::new("".into(), 3600, 60).is_err());
        assert!(JwtValidator::new("this-secret-is-at-least-32-chars-long".into(), 3600, 60).is_ok());
    }
}
