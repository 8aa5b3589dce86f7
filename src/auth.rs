use actix_web::{dev::Payload, web, FromRequest, HttpRequest};
use actix_web_httpauth::extractors::bearer::BearerAuth;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::config::Settings;
use crate::error::ApiError;
use crate::models::UserSummary;

const TOKEN_TTL_HOURS: i64 = 24 * 7;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error(transparent)]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// HS256 signing material. Built once from the validated settings and
/// registered as app data; the `Auth` extractor reads it from there.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtKeys {
    pub fn new(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(&settings.jwt_secret)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Stable user id.
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl Claims {
    /// Display form used when the user is denormalized onto a record.
    pub fn summary(&self) -> UserSummary {
        let name = if self.name.trim().is_empty() { self.sub.clone() } else { self.name.clone() };
        UserSummary { id: self.sub.clone(), name }
    }
}

/// Resolve a bearer credential to the caller's identity.
pub fn resolve_identity(keys: &JwtKeys, token: &str) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(token, &keys.decoding, &validation)?;
    Ok(data.claims)
}

/// Extractor yielding validated `Claims`.
pub struct Auth(pub Claims);

impl Auth {
    pub fn user_id(&self) -> &str {
        &self.0.sub
    }
}

impl FromRequest for Auth {
    type Error = ApiError;
    type Future = Ready<Result<Self, ApiError>>;

    fn from_request(req: &HttpRequest, pl: &mut Payload) -> Self::Future {
        let Some(keys) = req.app_data::<web::Data<JwtKeys>>() else {
            tracing::error!("JwtKeys missing from app data; rejecting bearer token");
            return ready(Err(ApiError::Unauthenticated));
        };
        let Ok(bearer) = BearerAuth::from_request(req, pl).into_inner() else {
            return ready(Err(ApiError::Unauthenticated));
        };
        ready(match resolve_identity(keys, bearer.token()) {
            Ok(claims) => Ok(Auth(claims)),
            Err(e) => {
                tracing::debug!("rejected bearer token: {e}");
                Err(ApiError::Unauthenticated)
            }
        })
    }
}

/// Issue a token for a user.
pub fn create_jwt(keys: &JwtKeys, user_id: &str, name: &str, email: &str) -> Result<String, AuthError> {
    let expiration = (chrono::Utc::now() + chrono::Duration::hours(TOKEN_TTL_HOURS)).timestamp() as usize;

    let claims = Claims {
        sub: user_id.to_string(),
        exp: expiration,
        name: name.to_string(),
        email: email.to_string(),
    };

    Ok(encode(&Header::default(), &claims, &keys.encoding)?)
}
