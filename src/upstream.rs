//! Upstream REST API - error shape, token refresh, paginated listings

use crate::config::Config;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::time::Duration;

/// Fields requested from `tasks.task.list`, in both naming schemes
pub const TASK_SELECT: &[&str] = &[
    "ID",
    "TITLE",
    "DESCRIPTION",
    "STATUS",
    "RESPONSIBLE_ID",
    "CREATED_DATE",
    "DEADLINE",
    "START_DATE_PLAN",
    "END_DATE_PLAN",
    "CLOSED_DATE",
    "GROUP_ID",
    "PARENT_ID",
    "description",
    "responsibleId",
    "startDatePlan",
    "endDatePlan",
    "createdDate",
    "deadline",
];

/// A failed upstream call: HTTP status plus the response body
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamFailure {
    pub status: u16,
    pub body: Value,
}

impl UpstreamFailure {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Failure without an HTTP response (DNS, TLS, timeout, bad payload)
    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::new(500, Value::String(message.to_string()))
    }

    /// The body's `error` field equals the expiry sentinel
    pub fn is_token_expired(&self, sentinel: &str) -> bool {
        self.body.get("error").and_then(Value::as_str) == Some(sentinel)
    }

    /// Read status and body from a non-success response
    pub async fn from_response(response: reqwest::Response) -> Self {
        let status = response.status().as_u16();
        let text = response.text().await.unwrap_or_default();
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Self::new(status, body)
    }
}

impl std::fmt::Display for UpstreamFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "HTTP {}: {}", self.status, self.body)
    }
}

impl From<reqwest::Error> for UpstreamFailure {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::new(status.as_u16(), Value::String(err.to_string())),
            None => Self::transport(err),
        }
    }
}

/// Access/refresh pair returned by the token endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

impl TokenPair {
    /// Parse a token endpoint response; a missing access token is a failure
    pub fn from_body(body: &Value) -> Result<Self, UpstreamFailure> {
        #[derive(Deserialize)]
        struct RefreshResponse {
            access_token: Option<String>,
            refresh_token: Option<String>,
        }

        let parsed: RefreshResponse = serde_json::from_value(body.clone())
            .map_err(|e| UpstreamFailure::transport(format!("parse refresh response: {}", e)))?;
        match parsed.access_token.filter(|t| !t.is_empty()) {
            Some(access_token) => Ok(Self {
                access_token,
                refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()),
            }),
            None => Err(UpstreamFailure::new(
                500,
                json!({ "error": "missing access_token in refresh response" }),
            )),
        }
    }
}

/// Exchanges a refresh token for a new token pair
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, UpstreamFailure>;
}

/// Form-encoded `grant_type=refresh_token` exchange against the OAuth server
pub struct OAuthRefresher {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl OAuthRefresher {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }
}

#[async_trait]
impl TokenRefresher for OAuthRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, UpstreamFailure> {
        let form = [
            ("grant_type", "refresh_token"),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("refresh_token", refresh_token),
        ];
        let response = self.http.post(&self.token_url).form(&form).send().await?;
        if !response.status().is_success() {
            return Err(UpstreamFailure::from_response(response).await);
        }
        let body: Value = response.json().await?;
        TokenPair::from_body(&body)
    }
}

/// One page of `tasks.task.list`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPage {
    pub tasks: Vec<Value>,
    pub next: Option<u64>,
    pub total: Option<u64>,
}

impl TaskPage {
    /// Tasks come from `result.tasks` or a bare `result` array
    pub fn from_body(body: &Value) -> Self {
        let result = body.get("result");
        let tasks = result
            .and_then(|r| r.get("tasks"))
            .and_then(Value::as_array)
            .or_else(|| result.and_then(Value::as_array))
            .cloned()
            .unwrap_or_default();

        Self {
            tasks,
            next: body.get("next").and_then(as_cursor),
            total: body.get("total").and_then(Value::as_u64),
        }
    }
}

fn as_cursor(value: &Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

/// All pages of one logical listing
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskListing {
    pub tasks: Vec<Value>,
    pub total: Option<u64>,
}

/// Follow `next` cursors, fetching at most `max_pages` pages
pub async fn paginate<F, Fut>(
    start: u64,
    max_pages: u32,
    mut fetch: F,
) -> Result<TaskListing, UpstreamFailure>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<TaskPage, UpstreamFailure>>,
{
    let mut listing = TaskListing::default();
    let mut cursor = start;

    for page_number in 0..max_pages {
        let page = fetch(cursor).await?;
        listing.tasks.extend(page.tasks);
        if listing.total.is_none() {
            listing.total = page.total;
        }

        match page.next {
            Some(next) if page_number + 1 < max_pages => cursor = next,
            Some(_) => {
                log::warn!(
                    "Stopped task listing at {} pages ({} tasks fetched)",
                    max_pages,
                    listing.tasks.len()
                );
            }
            None => break,
        }
    }

    Ok(listing)
}

/// REST client for the upstream project-tracking service
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    http: reqwest::Client,
    page_limit: u32,
    max_pages: u32,
}

impl UpstreamClient {
    pub fn new(http: reqwest::Client, config: &Config) -> Self {
        Self {
            http,
            page_limit: config.page_limit,
            max_pages: config.max_pages,
        }
    }

    /// Shared HTTP client honoring the configured timeout
    pub fn http_client(config: &Config) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
    }

    /// REST endpoint URL; bare domains are served over https
    pub fn endpoint(domain: &str, method: &str) -> String {
        let base = if domain.starts_with("http://") || domain.starts_with("https://") {
            domain.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", domain.trim_end_matches('/'))
        };
        format!("{}/rest/{}.json", base, method)
    }

    /// Fetch every task page into one listing
    pub async fn list_tasks(&self, domain: &str, token: &str) -> Result<TaskListing, UpstreamFailure> {
        let url = Self::endpoint(domain, "tasks.task.list");
        let listing = paginate(0, self.max_pages, |start| {
            let request = self.http.post(&url).json(&json!({
                "auth": token,
                "filter": {},
                "select": TASK_SELECT,
                "start": start,
                "limit": self.page_limit,
            }));
            async move {
                let response = request.send().await?;
                if !response.status().is_success() {
                    return Err(UpstreamFailure::from_response(response).await);
                }
                let body: Value = response.json().await?;
                Ok(TaskPage::from_body(&body))
            }
        })
        .await?;

        log::info!(
            "Fetched {} tasks from {} (total reported: {:?})",
            listing.tasks.len(),
            domain,
            listing.total
        );
        Ok(listing)
    }

    pub async fn list_users(&self, domain: &str, token: &str, start: u64) -> Result<Vec<Value>, UpstreamFailure> {
        let url = Self::endpoint(domain, "user.get");
        let start = start.to_string();
        self.get_result(&url, &[("auth", token), ("start", start.as_str())]).await
    }

    pub async fn list_departments(&self, domain: &str, token: &str) -> Result<Vec<Value>, UpstreamFailure> {
        let url = Self::endpoint(domain, "department.get");
        self.get_result(&url, &[("auth", token)]).await
    }

    async fn get_result(&self, url: &str, query: &[(&str, &str)]) -> Result<Vec<Value>, UpstreamFailure> {
        let response = self.http.get(url).query(query).send().await?;
        if !response.status().is_success() {
            return Err(UpstreamFailure::from_response(response).await);
        }
        let body: Value = response.json().await?;
        Ok(body
            .get("result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}
