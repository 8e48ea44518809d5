use axum::http;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::AuthError;

const ROOM_TOKEN_TYPE: &str = "room";
const USER_TOKEN_TYPE: &str = "user";

/// Who may join which room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomClaims {
    pub doc_id: String,
    pub user_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct RoomTokenClaims {
    sub: String,
    doc: String,
    #[serde(rename = "type")]
    token_type: String,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct UserTokenClaims {
    sub: String,
    #[serde(rename = "type", default)]
    token_type: Option<String>,
}

/// HS256 signing and validation for user and room tokens.
#[derive(Clone)]
pub struct RoomAuth {
    secret: String,
}

impl RoomAuth {
    pub fn new(secret: impl Into<String>) -> Self {
        Self { secret: secret.into() }
    }

    /// Build from the configured secret, failing when none is set.
    pub fn from_secret(secret: Option<&str>) -> Result<Self, AuthError> {
        secret.map(Self::new).ok_or(AuthError::MissingSecret)
    }

    /// Mint a room token valid for `ttl`
    pub fn sign_room_token(&self, claims: &RoomClaims, ttl: Duration) -> Result<String, AuthError> {
        let exp = chrono::Utc::now().timestamp().max(0) as u64 + ttl.as_secs();
        let token_claims = RoomTokenClaims {
            sub: claims.user_id.clone(),
            doc: claims.doc_id.clone(),
            token_type: ROOM_TOKEN_TYPE.to_string(),
            exp,
        };
        let key = EncodingKey::from_secret(self.secret.as_bytes());
        Ok(encode(&Header::new(Algorithm::HS256), &token_claims, &key)?)
    }

    pub fn verify_room_token(&self, token: &str) -> Result<RoomClaims, AuthError> {
        let claims: RoomTokenClaims = self.validate_jwt(token)?;
        if claims.token_type != ROOM_TOKEN_TYPE {
            return Err(AuthError::WrongTokenType {
                expected: ROOM_TOKEN_TYPE.to_string(),
                actual: claims.token_type,
            });
        }
        debug!("Room token validated for user {} on doc {}", claims.sub, claims.doc);
        Ok(RoomClaims {
            doc_id: claims.doc,
            user_id: claims.sub,
        })
    }

    /// Validate a user session token and return its user id.
    pub fn validate_user_token(&self, token: &str) -> Result<String, AuthError> {
        let claims: UserTokenClaims = self.validate_jwt(token)?;
        match claims.token_type.as_deref() {
            Some(USER_TOKEN_TYPE) => {
                info!("JWT token validated successfully for user: {}", claims.sub);
                Ok(claims.sub)
            }
            other => Err(AuthError::WrongTokenType {
                expected: USER_TOKEN_TYPE.to_string(),
                actual: other.unwrap_or("none").to_string(),
            }),
        }
    }

    fn validate_jwt<T: serde::de::DeserializeOwned>(&self, token: &str) -> Result<T, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        let decoding_key = DecodingKey::from_secret(self.secret.as_bytes());
        Ok(decode::<T>(token, &decoding_key, &validation)?.claims)
    }
}

// Get the auth token from a request
pub fn get_auth_token<B>(req: &http::Request<B>) -> Result<String, AuthError> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = req.headers().get(http::header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| AuthError::MissingToken("Invalid Authorization header".to_string()))?;
        return Ok(auth_str.strip_prefix("Bearer ").unwrap_or(auth_str).to_string());
    }

    // 2. Try to get token from cookies
    let cookie_header = req
        .headers()
        .get(http::header::COOKIE)
        .ok_or_else(|| AuthError::MissingToken("Missing Authorization header or Cookie".to_string()))?
        .to_str()
        .map_err(|_| AuthError::MissingToken("Invalid Cookie header".to_string()))?;

    cookie::Cookie::split_parse(cookie_header)
        .flatten()
        .find(|c| c.name() == "auth_token")
        .map(|c| c.value().to_string())
        .ok_or_else(|| AuthError::MissingToken("auth_token cookie not found".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "test-secret";

    fn user_token(token_type: &str) -> String {
        let claims = json!({
            "sub": "user-1",
            "type": token_type,
            "exp": chrono::Utc::now().timestamp() + 3600,
        });
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn room_token_round_trip() {
        let auth = RoomAuth::new(SECRET);
        let claims = RoomClaims {
            doc_id: "doc-1".to_string(),
            user_id: "user-1".to_string(),
        };
        let token = auth.sign_room_token(&claims, Duration::from_secs(60)).unwrap();
        assert_eq!(auth.verify_room_token(&token).unwrap(), claims);
    }

    #[test]
    fn room_token_from_other_secret_is_rejected() {
        let claims = RoomClaims {
            doc_id: "doc-1".to_string(),
            user_id: "user-1".to_string(),
        };
        let token = RoomAuth::new("other")
            .sign_room_token(&claims, Duration::from_secs(60))
            .unwrap();
        assert!(matches!(
            RoomAuth::new(SECRET).verify_room_token(&token),
            Err(AuthError::Jwt(_))
        ));
    }

    #[test]
    fn token_types_are_not_interchangeable() {
        let auth = RoomAuth::new(SECRET);
        assert_eq!(auth.validate_user_token(&user_token("user")).unwrap(), "user-1");
        assert!(matches!(
            auth.verify_room_token(&user_token("user")),
            Err(AuthError::Jwt(_)) | Err(AuthError::WrongTokenType { .. })
        ));
        assert!(matches!(
            auth.validate_user_token(&user_token("room")),
            Err(AuthError::WrongTokenType { .. })
        ));
    }

    #[test]
    fn token_is_read_from_header_or_cookie() {
        let req = http::Request::builder()
            .header(http::header::AUTHORIZATION, "Bearer abc")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "abc");

        let req = http::Request::builder()
            .header(http::header::COOKIE, "theme=dark; auth_token=xyz")
            .body(())
            .unwrap();
        assert_eq!(get_auth_token(&req).unwrap(), "xyz");

        let req = http::Request::builder().body(()).unwrap();
        assert!(get_auth_token(&req).is_err());
    }
}
