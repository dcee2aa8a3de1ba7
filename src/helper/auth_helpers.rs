use crate::models::User;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub username: String,
    pub role: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn for_user(user: &User, expiry_hours: i64) -> Self {
        let now = Utc::now();
        Claims {
            sub: user.id.to_string(),
            username: user.username.clone(),
            role: user.role.as_str().to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::hours(expiry_hours)).timestamp(),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.sub.parse().ok()
    }
}

pub fn generate_token(user: &User, secret: &str, expiry_hours: i64) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims::for_user(user, expiry_hours);
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))
}

/// Verifies the signature and expiry of a bearer token.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &Validation::default())?;
    Ok(token_data.claims)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    const SECRET: &str = "test-secret-key-for-testing-purposes-only";

    fn user() -> User {
        User {
            id: 42,
            username: "editor".to_string(),
            role: Role::Admin,
            crud_access: false,
            is_active: true,
            last_login_at: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn generate_and_validate_token() {
        let token = generate_token(&user(), SECRET, 1).unwrap();
        let claims = validate_token(&token, SECRET).unwrap();
        assert_eq!(claims.user_id(), Some(42));
        assert_eq!(claims.username, "editor");
        assert_eq!(claims.role, "admin");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = generate_token(&user(), SECRET, 1).unwrap();
        assert!(validate_token(&token, "another-secret-key-that-is-long-enough").is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = generate_token(&user(), SECRET, -2).unwrap();
        assert!(validate_token(&token, SECRET).is_err());
    }
}
