//! Authentication and authorization
//!
//! Bearer JWTs identify the user behind every request. The subject is the
//! user id recorded as the actor of audit entries.

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use core_kernel::UserId;
use domain_billing::Actor;

/// JWT claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Display name, copied into audit entries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub roles: Vec<String>,
    /// Expiration timestamp
    pub exp: i64,
    /// Issued at timestamp
    pub iat: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<UserId, AuthError> {
        self.sub.parse().map_err(|_| AuthError::InvalidSubject(self.sub.clone()))
    }

    /// The audit actor for this user
    pub fn actor(&self) -> Result<Actor, AuthError> {
        let user_id = self.user_id()?;
        Ok(match &self.name {
            Some(name) => Actor::named(user_id, name.clone()),
            None => Actor::new(user_id),
        })
    }
}

/// Auth errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Token expired")]
    TokenExpired,
    #[error("Token subject is not a user id: {0}")]
    InvalidSubject(String),
    #[error("Missing permission: {0}")]
    MissingPermission(String),
}

/// Creates a signed token
///
/// # Arguments
///
/// * `user_id` - User identifier, becomes the `sub` claim
/// * `name` - Optional display name
/// * `roles` - Granted permissions or `admin`
/// * `secret` - JWT secret key
/// * `expiration_secs` - Token validity in seconds
pub fn create_token(
    user_id: UserId,
    name: Option<&str>,
    roles: Vec<String>,
    secret: &str,
    expiration_secs: u64,
) -> Result<String, AuthError> {
    let now = Utc::now();
    let exp = now + Duration::seconds(expiration_secs as i64);

    let claims = Claims {
        sub: user_id.as_uuid().to_string(),
        name: name.map(str::to_string),
        roles,
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
        .map_err(|_| AuthError::InvalidToken)
}

/// Validates a token and returns its claims
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, AuthError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        JwtErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::InvalidToken,
    })?;

    Ok(token_data.claims)
}

/// Checks if user has required role
pub fn has_role(claims: &Claims, required_role: &str) -> bool {
    claims.roles.iter().any(|r| r == required_role || r == "admin")
}

/// Fails with `MissingPermission` unless the user holds `permission`
pub fn require(claims: &Claims, permission: &str) -> Result<(), AuthError> {
    if has_role(claims, permission) {
        Ok(())
    } else {
        Err(AuthError::MissingPermission(permission.to_string()))
    }
}

/// Permission definitions
pub mod permissions {
    pub const BILL_READ: &str = "bill:read";
    pub const BILL_WRITE: &str = "bill:write";
    pub const DEBT_READ: &str = "debt:read";
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_token_round_trip_yields_actor() {
        let user = UserId::new();
        let token = create_token(user, Some("Chị Lan"), vec!["bill:write".into()], SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();

        let actor = claims.actor().unwrap();
        assert_eq!(actor.user_id, user);
        assert_eq!(actor.display_name.as_deref(), Some("Chị Lan"));
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = create_token(UserId::new(), None, vec![], SECRET, 60).unwrap();
        assert!(matches!(validate_token(&token, "other"), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn test_admin_holds_every_permission() {
        let token = create_token(UserId::new(), None, vec!["admin".into()], SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert!(require(&claims, permissions::DEBT_READ).is_ok());
    }

    #[test]
    fn test_missing_permission() {
        let token = create_token(UserId::new(), None, vec![permissions::BILL_READ.into()], SECRET, 60).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert!(matches!(
            require(&claims, permissions::BILL_WRITE),
            Err(AuthError::MissingPermission(_))
        ));
    }

    #[test]
    fn test_non_uuid_subject_has_no_actor() {
        let claims = Claims {
            sub: "landlord".into(),
            name: None,
            roles: vec![],
            exp: 0,
            iat: 0,
        };
        assert!(matches!(claims.actor(), Err(AuthError::InvalidSubject(_))));
    }
}
