use crate::cookies::CookieJar;
use anyhow::{Context, Error};
use chrono::Utc;
use cookie::time::{Duration, OffsetDateTime};
use cookie::Cookie;
use log::warn;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

pub const TOKEN_COOKIE: &str = "spotify_access_token";

const DEFAULT_TTL_DAYS: i64 = 7;

/// Cookie payload: the bearer token plus its expiry as Unix epoch
/// milliseconds.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct StoredToken {
    token: String,
    expiry: i64,
}

/// Expiry-aware access token storage on top of the cookie jar.
pub struct TokenManager {
    jar: CookieJar,
}

impl TokenManager {
    pub fn new(jar: CookieJar) -> TokenManager {
        TokenManager { jar }
    }

    /// Persists a token. `expires_in` is the lifetime in seconds advertised
    /// by the authorization server; without one the token is kept for seven
    /// days.
    pub fn save(&self, token: &str, expires_in: Option<u64>) -> Result<(), Error> {
        let now_ms = Utc::now().timestamp_millis();
        let expiry = match expires_in {
            Some(secs) => now_ms + (secs as i64) * 1000,
            None => now_ms + DEFAULT_TTL_DAYS * 24 * 60 * 60 * 1000,
        };
        let payload = StoredToken {
            token: token.to_string(),
            expiry,
        };
        let value = serde_json::to_string(&payload).context("json serialize token")?;

        let mut c = Cookie::new(TOKEN_COOKIE, value);
        c.set_expires(OffsetDateTime::now_utc() + Duration::days(DEFAULT_TTL_DAYS));
        self.jar.set(c)
    }

    /// Returns the stored token if it is present and not past its expiry.
    /// Expired and undecodable entries are cleared.
    pub fn valid_token(&self) -> Result<Option<String>, Error> {
        let c = match self.jar.get(TOKEN_COOKIE)? {
            Some(c) => c,
            None => return Ok(None),
        };

        let stored: StoredToken = match serde_json::from_str(c.value()) {
            Ok(s) => s,
            Err(e) => {
                warn!("clearing undecodable token cookie: {}", e);
                self.clear()?;
                return Ok(None);
            }
        };

        if Utc::now().timestamp_millis() >= stored.expiry {
            self.clear()?;
            return Ok(None);
        }

        Ok(Some(stored.token))
    }

    pub fn clear(&self) -> Result<(), Error> {
        self.jar.delete(TOKEN_COOKIE)?;
        Ok(())
    }
}

/// Asks the API whether the token still authorizes requests. Any transport
/// error counts as invalid.
pub async fn validate(c: &HttpClient, token: &str) -> bool {
    let req = match c.get(crate::api::ME_URL).bearer_auth(token).build() {
        Ok(r) => r,
        Err(_) => return false,
    };
    match c.execute(req).await {
        Ok(rsp) => rsp.status().is_success(),
        Err(_) => false,
    }
}
