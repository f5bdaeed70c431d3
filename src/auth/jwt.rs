//! JWT validation for staff access tokens

use jsonwebtoken::{decode, errors::ErrorKind, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

const ACCESS_TOKEN: &str = "access";

/// JWT-related errors
#[derive(Error, Debug, PartialEq)]
pub enum JwtError {
    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Expected an access token, got {0}")]
    WrongTokenType(String),

    #[error("Token subject is not a staff id")]
    InvalidSubject,
}

/// JWT claims for staff access tokens
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (staff user ID)
    pub sub: String,
    /// Staff role, e.g. `loan_officer`
    pub role: String,
    /// JWT ID
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// Token type (access or refresh)
    pub token_type: String,
}

/// Verified identity carried by a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaffIdentity {
    pub user_id: Uuid,
    pub role: String,
    pub jti: String,
}

/// Checks tokens signed with the shared secret
pub struct TokenVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        validation.validate_exp = true;

        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Verify and decode an access token
    pub fn verify(&self, token: &str) -> Result<StaffIdentity, JwtError> {
        let claims = decode::<Claims>(token, &self.key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => JwtError::TokenExpired,
                _ => JwtError::InvalidToken(e.to_string()),
            })?
            .claims;

        if claims.token_type != ACCESS_TOKEN {
            return Err(JwtError::WrongTokenType(claims.token_type));
        }

        let user_id = Uuid::parse_str(&claims.sub).map_err(|_| JwtError::InvalidSubject)?;

        Ok(StaffIdentity {
            user_id,
            role: claims.role,
            jti: claims.jti,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn sign(sub: &str, token_type: &str, ttl_seconds: i64, secret: &str) -> String {
        let now = Utc::now();
        let claims = Claims {
            sub: sub.to_string(),
            role: "loan_officer".to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(ttl_seconds)).timestamp(),
            token_type: token_type.to_string(),
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_access_token() {
        let user_id = Uuid::new_v4();
        let verifier = TokenVerifier::new("test-secret-key");
        let identity = verifier
            .verify(&sign(&user_id.to_string(), "access", 900, "test-secret-key"))
            .unwrap();

        assert_eq!(identity.user_id, user_id);
        assert_eq!(identity.role, "loan_officer");
    }

    #[test]
    fn test_refresh_token_is_rejected() {
        let verifier = TokenVerifier::new("test-secret-key");
        let token = sign(&Uuid::new_v4().to_string(), "refresh", 900, "test-secret-key");
        assert_eq!(
            verifier.verify(&token),
            Err(JwtError::WrongTokenType("refresh".to_string()))
        );
    }

    #[test]
    fn test_expired_token() {
        let verifier = TokenVerifier::new("test-secret-key");
        let token = sign(&Uuid::new_v4().to_string(), "access", -3600, "test-secret-key");
        assert_eq!(verifier.verify(&token), Err(JwtError::TokenExpired));
    }

    #[test]
    fn test_wrong_secret() {
        let verifier = TokenVerifier::new("secret2");
        let token = sign(&Uuid::new_v4().to_string(), "access", 900, "secret1");
        assert!(matches!(verifier.verify(&token), Err(JwtError::InvalidToken(_))));
    }

    #[test]
    fn test_subject_must_be_uuid() {
        let verifier = TokenVerifier::new("test-secret-key");
        let token = sign("not-a-uuid", "access", 900, "test-secret-key");
        assert_eq!(verifier.verify(&token), Err(JwtError::InvalidSubject));
    }

    #[test]
    fn test_garbage_token() {
        let verifier = TokenVerifier::new("test-secret-key");
        assert!(verifier.verify("invalid.token.here").is_err());
    }
}
