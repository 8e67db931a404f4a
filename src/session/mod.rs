//! Authentication state of the tracked identity
//!
//! The [`SessionManager`] loads the stored cookies of one identity, installs
//! them in a page driver before any navigation, recognizes when the site
//! answers with a login wall instead of content, and saves rotated cookies
//! back after a successful pass.

use crate::browser::{PageDriver, PageSnapshot};
use crate::model::{Credential, SessionCredential};
use crate::storage::{self, SharedStorage, Storage};
use crate::{HarvestError, Result};
use chrono::Utc;
use std::path::Path;

/// URL fragments the site redirects to when a session is not accepted
const LOGIN_PATHS: [&str; 3] = ["/login", "/i/flow/login", "/account/access"];

/// Elements only rendered on logged-out pages
const LOGIN_MARKERS: &str = r#"[data-testid="loginButton"], [data-testid="login"], form[action*="/sessions"], input[name="session[username_or_email]"], input[autocomplete="username"]"#;

/// Loads, applies and refreshes the session of one identity
pub struct SessionManager {
    storage: SharedStorage,
    identity: String,
}

impl SessionManager {
    pub fn new(storage: SharedStorage, identity: impl Into<String>) -> Self {
        Self {
            storage,
            identity: identity.into(),
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Loads the stored session, or `None` if there is no live credential
    pub fn load(&self) -> Result<Option<SessionCredential>> {
        let stored = storage::lock(&self.storage)?.load_credential(&self.identity)?;

        Ok(stored
            .map(|session| session.without_expired(Utc::now()))
            .filter(|session| !session.credential_data.is_empty()))
    }

    /// Loads the stored session, failing fast when there is none
    pub fn require(&self) -> Result<SessionCredential> {
        self.load()?.ok_or_else(|| {
            HarvestError::Authentication(format!(
                "no stored session for @{}; import cookies first",
                self.identity
            ))
        })
    }

    /// Installs `session` in the driver; must precede any navigation
    pub async fn apply(&self, driver: &mut dyn PageDriver, session: &SessionCredential) -> Result<()> {
        driver.apply_credentials(&session.credential_data).await?;
        tracing::debug!(
            "Applied {} credential(s) for @{}",
            session.credential_data.len(),
            self.identity
        );
        Ok(())
    }

    /// Loads the stored session and installs it in the driver
    pub async fn authenticate(&self, driver: &mut dyn PageDriver) -> Result<SessionCredential> {
        let session = self.require()?;
        self.apply(driver, &session).await?;
        Ok(session)
    }

    /// Returns true if `snapshot` is a login wall rather than the requested page
    pub fn detect_invalidated(snapshot: &PageSnapshot) -> bool {
        let on_login_path = url::Url::parse(&snapshot.url)
            .map(|u| LOGIN_PATHS.iter().any(|p| is_under(u.path(), p)))
            .unwrap_or(false);

        on_login_path || snapshot.has_element(LOGIN_MARKERS)
    }

    /// Saves the cookies the driver currently holds, keeping rotated values
    pub fn refresh(&self, driver: &dyn PageDriver) -> Result<()> {
        let cookies = driver.credentials();
        if cookies.is_empty() {
            return Ok(());
        }

        let session = SessionCredential::new(&self.identity, cookies);
        storage::lock(&self.storage)?.save_credential(&session)?;
        tracing::debug!("Refreshed stored session for @{}", self.identity);
        Ok(())
    }

    /// Imports an exported cookie JSON array as this identity's session
    ///
    /// Returns the number of live credentials stored.
    pub fn import_file(&self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)?;
        let cookies: Vec<Credential> = serde_json::from_str(&content)?;

        let session = SessionCredential::new(&self.identity, cookies).without_expired(Utc::now());
        if session.credential_data.is_empty() {
            return Err(HarvestError::Authentication(format!(
                "{} holds no unexpired credential",
                path.display()
            )));
        }

        storage::lock(&self.storage)?.save_credential(&session)?;
        tracing::info!(
            "Imported {} credential(s) for @{}",
            session.credential_data.len(),
            self.identity
        );
        Ok(session.credential_data.len())
    }
}

/// True if `path` is `prefix` or below it (`/login` but not `/login_fan`)
fn is_under(path: &str, prefix: &str) -> bool {
    path.strip_prefix(prefix)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
