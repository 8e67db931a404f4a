//! Session credentials for the tracked identity
//!
//! Credentials are the browser cookies of a logged-in session, stored in the
//! same JSON shape browser extensions export them in.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One authentication cookie
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub name: String,
    pub value: String,
    pub domain: String,
    #[serde(default = "default_path")]
    pub path: String,
    /// Expiry as seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_only: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secure: Option<bool>,
    #[serde(default = "default_same_site")]
    pub same_site: String,
}

impl Credential {
    /// Returns true if the cookie carries an expiry that has passed
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiration_date {
            Some(expires) => expires < now.timestamp() as f64,
            None => false,
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

fn default_same_site() -> String {
    "Lax".to_string()
}

/// Persisted authentication state of one tracked identity
#[derive(Debug, Clone, PartialEq)]
pub struct SessionCredential {
    pub username: String,
    pub credential_data: Vec<Credential>,
    pub last_update: DateTime<Utc>,
}

impl SessionCredential {
    pub fn new(username: impl Into<String>, credential_data: Vec<Credential>) -> Self {
        Self {
            username: username.into(),
            credential_data,
            last_update: Utc::now(),
        }
    }

    /// Drops cookies whose expiry has passed
    pub fn without_expired(mut self, now: DateTime<Utc>) -> Self {
        self.credential_data.retain(|c| !c.is_expired(now));
        self
    }
}
