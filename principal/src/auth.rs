use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

pub const ACCESS_TOKEN_EXPIRE_MINUTES: i64 = 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("invalid credentials")]
    BadCredentials,
    #[error("token expired")]
    Expired,
    #[error("invalid token")]
    Invalid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
}

/// Issues and validates HMAC-signed bearer tokens. The algorithm identifier
/// travels in the token header; expiry is checked with zero leeway.
#[derive(Clone)]
pub struct TokenAuthority {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl TokenAuthority {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::default();
        validation.leeway = 0;
        TokenAuthority {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Sign a token for `username`, valid for thirty minutes.
    pub fn issue(&self, username: &str) -> Result<String, AuthError> {
        let exp = (Utc::now() + Duration::minutes(ACCESS_TOKEN_EXPIRE_MINUTES)).timestamp();
        let claims = Claims {
            sub: username.to_string(),
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding).map_err(|_| AuthError::Invalid)
    }

    /// Verify signature and expiry, returning the subject.
    pub fn verify(&self, token: &str) -> Result<String, AuthError> {
        match decode::<Claims>(token, &self.decoding, &self.validation) {
            Ok(data) => Ok(data.claims.sub),
            Err(err) => match err.kind() {
                ErrorKind::ExpiredSignature => Err(AuthError::Expired),
                _ => Err(AuthError::Invalid),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issued_tokens_verify() {
        let authority = TokenAuthority::new("k");
        let token = authority.issue("admin").unwrap();
        assert_eq!(authority.verify(&token).unwrap(), "admin");
    }

    #[test]
    fn expired_tokens_are_rejected_as_expired() {
        let authority = TokenAuthority::new("k");
        let claims = Claims {
            sub: "admin".to_string(),
            exp: (Utc::now() - Duration::minutes(31)).timestamp(),
        };
        let token = encode(&Header::default(), &claims, &authority.encoding).unwrap();
        assert_eq!(authority.verify(&token), Err(AuthError::Expired));
    }

    #[test]
    fn wrong_secret_is_invalid_not_expired() {
        let authority = TokenAuthority::new("k");
        let other = TokenAuthority::new("not-k");
        let token = other.issue("admin").unwrap();
        assert_eq!(authority.verify(&token), Err(AuthError::Invalid));
    }

    #[test]
    fn garbage_tokens_are_invalid() {
        let authority = TokenAuthority::new("k");
        assert_eq!(authority.verify("not.a.token"), Err(AuthError::Invalid));
    }
}
