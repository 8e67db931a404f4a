//! Shared fixtures: a scripted page driver, config and storage builders

use async_trait::async_trait;
use follow_harvester::browser::{html_has_element, DriverError, DriverResult, PageDriver, PageSnapshot};
use follow_harvester::config::{parse_config, Config};
use follow_harvester::events::{ChannelSink, HarvestEvent};
use follow_harvester::model::{Account, Credential, SessionCredential};
use follow_harvester::storage::{self, SharedStorage, SqliteStorage, Storage};
use follow_harvester::Orchestrator;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

pub const OWNER: &str = "tracked";

/// One scripted page: successive frames are revealed by scrolling
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub status: Option<u16>,
    /// URL reported after navigation, when the site redirects
    pub final_url: Option<String>,
    pub frames: Vec<String>,
}

impl ScriptedPage {
    pub fn frames(frames: Vec<String>) -> Self {
        Self {
            frames,
            ..Self::default()
        }
    }

    pub fn single(html: String) -> Self {
        Self::frames(vec![html])
    }
}

/// Page driver replaying canned markup; unknown URLs time out
pub struct ScriptedDriver {
    pages: HashMap<String, ScriptedPage>,
    current: Option<String>,
    depth: usize,
    cookies: Vec<Credential>,
    rotated_value: Option<String>,
    visits: Arc<Mutex<Vec<String>>>,
}

impl ScriptedDriver {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            current: None,
            depth: 0,
            cookies: Vec::new(),
            rotated_value: None,
            visits: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn page(mut self, url: &str, page: ScriptedPage) -> Self {
        self.pages.insert(url.to_string(), page);
        self
    }

    /// Makes the session report a rotated cookie value after navigation
    pub fn rotating_to(mut self, value: &str) -> Self {
        self.rotated_value = Some(value.to_string());
        self
    }

    /// Handle to the list of navigated URLs
    pub fn visits(&self) -> Arc<Mutex<Vec<String>>> {
        self.visits.clone()
    }

    fn render(&self) -> DriverResult<PageSnapshot> {
        let url = self.current.clone().ok_or(DriverError::NoPage)?;
        let page = self
            .pages
            .get(&url)
            .ok_or_else(|| DriverError::Timeout { url: url.clone() })?;
        let frame = page.frames[self.depth.min(page.frames.len() - 1)].clone();

        Ok(PageSnapshot {
            url: page.final_url.clone().unwrap_or(url),
            status: page.status,
            html: frame,
        })
    }
}

#[async_trait]
impl PageDriver for ScriptedDriver {
    async fn apply_credentials(&mut self, credentials: &[Credential]) -> DriverResult<()> {
        self.cookies = credentials.to_vec();
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> DriverResult<PageSnapshot> {
        self.visits.lock().unwrap().push(url.to_string());
        self.current = Some(url.to_string());
        self.depth = 0;
        self.render()
    }

    async fn wait_for_selector(&mut self, selector: &str, _: Duration) -> DriverResult<Option<PageSnapshot>> {
        let snapshot = self.render()?;
        Ok(html_has_element(&snapshot.html, selector).then_some(snapshot))
    }

    async fn reveal_more(&mut self) -> DriverResult<()> {
        self.depth += 1;
        Ok(())
    }

    async fn snapshot(&mut self) -> DriverResult<PageSnapshot> {
        self.render()
    }

    fn credentials(&self) -> Vec<Credential> {
        let mut cookies = self.cookies.clone();
        if let Some(value) = &self.rotated_value {
            for cookie in &mut cookies {
                cookie.value = value.clone();
            }
        }
        cookies
    }
}

/// Configuration tuned for fast tests; `min_hours` controls re-crawl eligibility
pub fn test_config(min_hours: f64, max_accounts_per_cycle: usize) -> Config {
    parse_config(&format!(
        r#"
[target]
username = "{OWNER}"

[limits]
max-posts-per-account = 20
max-accounts-per-cycle = {max_accounts_per_cycle}
max-scroll-attempts = 5
max-accounts = 100
min-hours-between-updates = {min_hours:.1}

[intervals]
following-update-ms = 86400000
content-fetch-ms = 3600000

[browser]
endpoint = "http://127.0.0.1:3000"
content-wait-ms = 10
settle-ms = 1

[retry]
max-attempts = 1
delay-ms = 0

[output]
database-path = ":memory:"
"#
    ))
    .expect("test config parses")
}

pub fn memory_storage() -> SharedStorage {
    Arc::new(Mutex::new(SqliteStorage::new_in_memory().unwrap()))
}

pub fn auth_cookie() -> Credential {
    serde_json::from_str(r#"{"name":"auth_token","value":"secret","domain":".x.com"}"#).unwrap()
}

pub fn store_session(storage: &SharedStorage) {
    let session = SessionCredential::new(OWNER, vec![auth_cookie()]);
    storage::lock(storage).unwrap().save_credential(&session).unwrap();
}

pub fn seed_roster(storage: &SharedStorage, usernames: &[&str]) {
    let mut store = storage::lock(storage).unwrap();
    for name in usernames {
        store
            .upsert_account(OWNER, &Account::discovered(*name, None, None))
            .unwrap();
    }
}

pub fn account(storage: &SharedStorage, username: &str) -> Account {
    storage::lock(storage)
        .unwrap()
        .get_account(OWNER, username)
        .unwrap()
        .expect("account on roster")
}

pub fn orchestrator(
    config: Config,
    storage: &SharedStorage,
    driver: impl PageDriver + 'static,
) -> (Orchestrator, UnboundedReceiver<HarvestEvent>) {
    let (sink, events) = ChannelSink::new();
    let orchestrator = Orchestrator::new(config, storage.clone(), Box::new(driver), Arc::new(sink));
    (orchestrator, events)
}

pub fn drain(events: &mut UnboundedReceiver<HarvestEvent>) -> Vec<HarvestEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}

/// A timeline with one post per id
pub fn timeline(username: &str, ids: &[u64]) -> String {
    let posts: String = ids
        .iter()
        .map(|id| {
            format!(
                r#"<div data-testid="cellInnerDiv"><article data-testid="tweet">
                    <div data-testid="User-Name"><a href="/{username}"><span>{username}</span></a>
                        <a href="/{username}/status/{id}"><time datetime="2024-05-01T12:00:00.000Z">1h</time></a></div>
                    <div data-testid="tweetText">Post {id} from {username}</div>
                    <div role="group"><button data-testid="reply"><span></span></button>
                        <button data-testid="like"><span>1.2K</span></button></div>
                </article></div>"#
            )
        })
        .collect();
    format!("<html><body><main>{}</main></body></html>", posts)
}

/// A following list with one cell per username
pub fn following(usernames: &[&str]) -> String {
    let cells: String = usernames
        .iter()
        .map(|name| {
            format!(
                r#"<div data-testid="UserCell"><a href="/{name}"><span>{name} display</span></a>
                    <a href="/{name}"><span>@{name}</span></a></div>"#
            )
        })
        .collect();
    format!("<html><body>{}</body></html>", cells)
}
