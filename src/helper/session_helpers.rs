//! Stateless login sessions carried in the `auth` cookie.
//!
//! The payload `{id, email}` is signed with the hash key and, unless
//! disabled in config, then encrypted with the block key. Decoding fails
//! closed: anything that does not verify is treated as "no session".

use crate::config::COOKIE_KEY_LEN;
use crate::models::User;
use actix_web::cookie::{time::Duration, Cookie, CookieJar, Key, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const AUTH_COOKIE: &str = "auth";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionClaims {
    pub id: Uuid,
    pub email: String,
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Cookie keys must be exactly 32 bytes each")]
    KeyLength,
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
    #[error("Cookie jar did not produce a sealed value")]
    Seal,
}

#[derive(Clone)]
pub struct SessionCodec {
    key: Key,
    encrypt: bool,
    ttl_days: i64,
    secure: bool,
}

impl SessionCodec {
    pub fn new(hash_key: &[u8], block_key: &[u8], encrypt: bool) -> Result<Self, SessionError> {
        if hash_key.len() != COOKIE_KEY_LEN || block_key.len() != COOKIE_KEY_LEN {
            return Err(SessionError::KeyLength);
        }
        let mut master = Vec::with_capacity(COOKIE_KEY_LEN * 2);
        master.extend_from_slice(hash_key);
        master.extend_from_slice(block_key);
        let key = Key::try_from(master.as_slice()).map_err(|_| SessionError::KeyLength)?;
        Ok(SessionCodec { key, encrypt, ttl_days: 84, secure: false })
    }

    pub fn with_cookie_options(mut self, ttl_days: i64, secure: bool) -> Self {
        self.ttl_days = ttl_days;
        self.secure = secure;
        self
    }

    fn seal_signed(&self, value: String) -> Result<String, SessionError> {
        let mut jar = CookieJar::new();
        jar.signed_mut(&self.key).add(Cookie::new(AUTH_COOKIE, value));
        jar.get(AUTH_COOKIE).map(|c| c.value().to_string()).ok_or(SessionError::Seal)
    }

    fn seal_private(&self, value: String) -> Result<String, SessionError> {
        let mut jar = CookieJar::new();
        jar.private_mut(&self.key).add(Cookie::new(AUTH_COOKIE, value));
        jar.get(AUTH_COOKIE).map(|c| c.value().to_string()).ok_or(SessionError::Seal)
    }

    fn open_signed(&self, value: &str) -> Option<String> {
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(AUTH_COOKIE, value.to_string()));
        let cookie = jar.signed(&self.key).get(AUTH_COOKIE)?;
        Some(cookie.value().to_string())
    }

    fn open_private(&self, value: &str) -> Option<String> {
        let mut jar = CookieJar::new();
        jar.add_original(Cookie::new(AUTH_COOKIE, value.to_string()));
        let cookie = jar.private(&self.key).get(AUTH_COOKIE)?;
        Some(cookie.value().to_string())
    }

    /// The cookie value for `claims`.
    pub fn encode(&self, claims: &SessionClaims) -> Result<String, SessionError> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let signed = self.seal_signed(payload)?;
        if self.encrypt {
            self.seal_private(signed)
        } else {
            Ok(signed)
        }
    }

    /// Authenticates a cookie value. Tampering, wrong keys or garbage all
    /// yield `None`.
    pub fn resolve(&self, value: &str) -> Option<SessionClaims> {
        let signed = if self.encrypt {
            self.open_private(value)?
        } else {
            value.to_string()
        };
        let payload = self.open_signed(&signed)?;
        let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
        serde_json::from_slice(&json).ok()
    }

    pub fn issue(&self, user: &User) -> Result<Cookie<'static>, SessionError> {
        let value = self.encode(&SessionClaims { id: user.id, email: user.email.clone() })?;
        Ok(Cookie::build(AUTH_COOKIE, value)
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .max_age(Duration::days(self.ttl_days))
            .finish())
    }

    pub fn logout_cookie(&self) -> Cookie<'static> {
        let mut cookie = Cookie::build(AUTH_COOKIE, "")
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .finish();
        cookie.make_removal();
        cookie
    }
}
