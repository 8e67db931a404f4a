//! Browserless render-service driver
//!
//! Every snapshot is one `POST /content` call: the service opens the current
//! URL with the session cookies, optionally runs a scroll script to the
//! current reveal depth, waits for the page to settle and returns the DOM.
//! Reveal state therefore lives in the driver (`scroll_depth`) rather than in
//! a long-lived remote tab.
//!
//! Cookies the site sets while rendering come back as `Set-Cookie` headers
//! and replace the matching session cookies, so rotated tokens survive.

use crate::browser::{html_has_element, DriverError, DriverResult, PageDriver, PageSnapshot};
use crate::config::BrowserConfig;
use crate::model::Credential;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::json;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use url::Url;

/// Extra time granted to the render service beyond the page's own budget
const REQUEST_MARGIN: Duration = Duration::from_secs(10);

/// Driver backed by a Browserless-compatible `/content` endpoint
pub struct BrowserlessDriver {
    client: Client,
    endpoint: Url,
    navigation_timeout: Duration,
    settle: Duration,
    cookies: Vec<Credential>,
    cookie_domain: String,
    current_url: Option<String>,
    scroll_depth: u32,
}

/// Cookie shape accepted by the render service
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServiceCookie<'a> {
    name: &'a str,
    value: &'a str,
    domain: &'a str,
    path: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    http_only: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    secure: Option<bool>,
    same_site: &'a str,
}

impl<'a> From<&'a Credential> for ServiceCookie<'a> {
    fn from(c: &'a Credential) -> Self {
        Self {
            name: &c.name,
            value: &c.value,
            domain: &c.domain,
            path: &c.path,
            expires: c.expiration_date,
            http_only: c.http_only,
            secure: c.secure,
            same_site: &c.same_site,
        }
    }
}

impl BrowserlessDriver {
    /// Builds a driver from the browser configuration
    pub fn new(config: &BrowserConfig) -> DriverResult<Self> {
        let mut endpoint = Url::parse(&config.endpoint)
            .and_then(|base| directory(base).join("content"))
            .map_err(|e| DriverError::Network(format!("invalid render endpoint: {}", e)))?;

        let launch = json!({
            "headless": config.headless,
            "slowMo": config.slow_mo_ms.unwrap_or(0),
        });

        {
            let mut query = endpoint.query_pairs_mut();
            if let Some(token) = &config.token {
                query.append_pair("token", token);
            }
            query.append_pair("launch", &launch.to_string());
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            endpoint,
            navigation_timeout: Duration::from_millis(config.navigation_timeout_ms),
            settle: Duration::from_millis(config.settle_ms),
            cookies: Vec::new(),
            cookie_domain: cookie_domain(&config.site_url),
            current_url: None,
            scroll_depth: 0,
        })
    }

    /// Script that scrolls to the bottom `depth` times, one step per settle period
    fn scroll_script(&self, depth: u32) -> String {
        format!(
            "(() => {{ let n = 0; const t = setInterval(() => {{ \
             window.scrollTo(0, document.body.scrollHeight); \
             if (++n >= {depth}) clearInterval(t); }}, {interval}); }})();",
            depth = depth,
            interval = self.settle.as_millis()
        )
    }

    fn request_body(&self, url: &str, wait_for: Option<(&str, Duration)>) -> serde_json::Value {
        let cookies: Vec<ServiceCookie<'_>> = self.cookies.iter().map(ServiceCookie::from).collect();

        let mut body = json!({
            "url": url,
            "cookies": cookies,
            "gotoOptions": {
                "timeout": self.navigation_timeout.as_millis() as u64,
                "waitUntil": "networkidle2",
            },
        });

        if self.scroll_depth > 0 {
            body["addScriptTag"] = json!([{ "content": self.scroll_script(self.scroll_depth) }]);
            let settle_total = self.settle * (self.scroll_depth + 1);
            body["waitForTimeout"] = json!(settle_total.as_millis() as u64);
        }

        if let Some((selector, timeout)) = wait_for {
            body["waitForSelector"] = json!({
                "selector": selector,
                "timeout": timeout.as_millis() as u64,
            });
        }

        body
    }

    fn request_timeout(&self, wait: Option<Duration>) -> Duration {
        self.navigation_timeout
            + self.settle * (self.scroll_depth + 1)
            + wait.unwrap_or_default()
            + REQUEST_MARGIN
    }

    /// Renders `url` through the service
    ///
    /// Returns `Ok(None)` when the service reports that a `waitForSelector`
    /// condition timed out.
    async fn render(
        &mut self,
        url: &str,
        wait_for: Option<(&str, Duration)>,
    ) -> DriverResult<Option<PageSnapshot>> {
        let body = self.request_body(url, wait_for);
        let timeout = self.request_timeout(wait_for.map(|(_, t)| t));

        tracing::debug!(url, depth = self.scroll_depth, "Rendering page");

        let resp = self
            .client
            .post(self.endpoint.clone())
            .timeout(timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DriverError::Timeout {
                        url: url.to_string(),
                    }
                } else {
                    DriverError::from(e)
                }
            })?;

        let status = resp.status();
        if status == StatusCode::REQUEST_TIMEOUT {
            if wait_for.is_some() {
                return Ok(None);
            }
            return Err(DriverError::Timeout {
                url: url.to_string(),
            });
        }

        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(DriverError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let page_status = resp
            .headers()
            .get("x-response-code")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u16>().ok());

        let final_url = resp
            .headers()
            .get("x-response-url")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| url.to_string());

        let rotated: Vec<Credential> = resp
            .cookies()
            .map(|cookie| self.credential_from(&cookie))
            .collect();
        self.merge_rotated(rotated);

        let html = resp.text().await?;

        Ok(Some(PageSnapshot {
            url: final_url,
            status: page_status,
            html,
        }))
    }

    fn credential_from(&self, cookie: &reqwest::cookie::Cookie<'_>) -> Credential {
        let expires = cookie
            .expires()
            .or_else(|| cookie.max_age().map(|age| SystemTime::now() + age))
            .map(|at| match at.duration_since(UNIX_EPOCH) {
                Ok(since) => since.as_secs_f64(),
                Err(_) => 0.0,
            });

        let same_site = if cookie.same_site_strict() {
            "Strict"
        } else if cookie.same_site_lax() {
            "Lax"
        } else {
            "None"
        };

        Credential {
            name: cookie.name().to_string(),
            value: cookie.value().to_string(),
            domain: cookie
                .domain()
                .map(str::to_string)
                .unwrap_or_else(|| self.cookie_domain.clone()),
            path: cookie.path().unwrap_or("/").to_string(),
            expiration_date: expires,
            http_only: Some(cookie.http_only()),
            secure: Some(cookie.secure()),
            same_site: same_site.to_string(),
        }
    }

    /// Replaces session cookies the site rotated; expired ones are dropped
    fn merge_rotated(&mut self, rotated: Vec<Credential>) {
        let now = chrono::Utc::now();

        for cookie in rotated {
            self.cookies.retain(|held| held.name != cookie.name);
            if cookie.is_expired(now) {
                tracing::debug!(name = %cookie.name, "Session cookie cleared by site");
                continue;
            }
            tracing::debug!(name = %cookie.name, "Session cookie rotated");
            self.cookies.push(cookie);
        }
    }

    fn current_url(&self) -> DriverResult<String> {
        self.current_url.clone().ok_or(DriverError::NoPage)
    }
}

/// Makes `base` a directory URL so `join` appends instead of replacing
fn directory(mut base: Url) -> Url {
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base
}

/// Domain given to rotated cookies that do not name one
fn cookie_domain(site_url: &str) -> String {
    Url::parse(site_url)
        .ok()
        .and_then(|u| u.host_str().map(|host| format!(".{}", host)))
        .unwrap_or_default()
}

#[async_trait]
impl PageDriver for BrowserlessDriver {
    async fn apply_credentials(&mut self, credentials: &[Credential]) -> DriverResult<()> {
        self.cookies = credentials.to_vec();
        Ok(())
    }

    async fn navigate(&mut self, url: &str) -> DriverResult<PageSnapshot> {
        self.current_url = Some(url.to_string());
        self.scroll_depth = 0;

        self.render(url, None).await?.ok_or(DriverError::Timeout {
            url: url.to_string(),
        })
    }

    async fn wait_for_selector(
        &mut self,
        selector: &str,
        timeout: Duration,
    ) -> DriverResult<Option<PageSnapshot>> {
        let url = self.current_url()?;
        let snapshot = self.render(&url, Some((selector, timeout))).await?;

        // The service may return the page anyway once its own budget runs out
        Ok(snapshot.filter(|s| html_has_element(&s.html, selector)))
    }

    async fn reveal_more(&mut self) -> DriverResult<()> {
        self.current_url()?;
        self.scroll_depth += 1;
        Ok(())
    }

    async fn snapshot(&mut self) -> DriverResult<PageSnapshot> {
        let url = self.current_url()?;
        self.render(&url, None)
            .await?
            .ok_or(DriverError::Timeout { url })
    }

    fn credentials(&self) -> Vec<Credential> {
        self.cookies.clone()
    }
}
