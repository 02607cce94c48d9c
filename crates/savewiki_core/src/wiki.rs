use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::SavewikiConfig;
use crate::template::{TemplateNode, parse_templates};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryMember {
    pub page_id: u64,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WikiPage {
    pub title: String,
    pub page_id: u64,
    pub revision_id: Option<u64>,
    pub content: String,
}

impl WikiPage {
    pub fn templates(&self) -> Vec<TemplateNode> {
        parse_templates(&self.content)
    }
}

pub trait WikiReadApi {
    fn get_category_members(&mut self, category: &str) -> Result<Vec<CategoryMember>>;
    /// Latest revision of `title`, or `None` when the page does not exist.
    fn get_page(&mut self, title: &str) -> Result<Option<WikiPage>>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &SavewikiConfig) -> Self {
        Self {
            api_url: config.api_url(),
            user_agent: config.user_agent(),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
}

impl MediaWikiClient {
    pub fn from_config(config: &SavewikiConfig) -> Result<Self> {
        Self::new(MediaWikiClientConfig::from_config(config))
    }

    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
        })
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", self.config.api_url))?;

        let mut pairs = Vec::with_capacity(params.len() + 2);
        pairs.push(("format".to_string(), "json".to_string()));
        pairs.push(("formatversion".to_string(), "2".to_string()));
        for (key, value) in params {
            if !value.is_empty() {
                pairs.push(((*key).to_string(), value.clone()));
            }
        }

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit();
            let response = self
                .client
                .get(base_url.clone())
                .header("User-Agent", self.config.user_agent.clone())
                .query(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            debug!(%status, attempt, "retrying MediaWiki request");
                            self.wait_before_retry(attempt);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    check_api_error(&payload)?;
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        debug!(error = %error, attempt, "retrying MediaWiki request");
                        self.wait_before_retry(attempt);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn apply_rate_limit(&mut self) {
        let delay = Duration::from_millis(self.config.rate_limit_read_ms);
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        sleep(Duration::from_millis(base.saturating_add(jitter)));
    }
}

impl WikiReadApi for MediaWikiClient {
    fn get_category_members(&mut self, category: &str) -> Result<Vec<CategoryMember>> {
        let mut members = Vec::new();
        let mut continue_token: Option<String> = None;
        let category_title = if category.starts_with("Category:") {
            category.to_string()
        } else {
            format!("Category:{category}")
        };

        loop {
            let mut params = vec![
                ("action", "query".to_string()),
                ("list", "categorymembers".to_string()),
                ("cmtitle", category_title.clone()),
                ("cmtype", "page".to_string()),
                ("cmprop", "ids|title".to_string()),
                ("cmlimit", "500".to_string()),
            ];
            if let Some(token) = &continue_token {
                params.push(("cmcontinue", token.clone()));
            }

            let response = self.request_json_get(&params)?;
            let (batch, next) = category_members_from_response(response)?;
            members.extend(batch);

            continue_token = next;
            if continue_token.is_none() {
                break;
            }
        }

        Ok(members)
    }

    fn get_page(&mut self, title: &str) -> Result<Option<WikiPage>> {
        let params = vec![
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "ids|content".to_string()),
            ("rvslots", "main".to_string()),
        ];
        let response = self.request_json_get(&params)?;
        page_from_response(response).with_context(|| format!("failed to fetch page {title}"))
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn check_api_error(payload: &Value) -> Result<()> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(())
}

fn category_members_from_response(
    response: Value,
) -> Result<(Vec<CategoryMember>, Option<String>)> {
    let parsed: QueryResponse = serde_json::from_value(response)
        .context("failed to decode categorymembers API response")?;
    let members = parsed
        .query
        .categorymembers
        .into_iter()
        .map(|item| CategoryMember {
            page_id: item.pageid,
            title: item.title,
        })
        .collect();
    Ok((members, parsed.continuation.and_then(|cont| cont.cmcontinue)))
}

fn page_from_response(response: Value) -> Result<Option<WikiPage>> {
    let parsed: QueryResponse =
        serde_json::from_value(response).context("failed to decode page content API response")?;

    let Some(page) = parsed.query.pages.into_iter().next() else {
        return Ok(None);
    };
    if page.missing.unwrap_or(false) || page.invalid.unwrap_or(false) {
        return Ok(None);
    }
    let Some(page_id) = page.pageid else {
        return Ok(None);
    };

    let revision = page.revisions.into_iter().next();
    let revision_id = revision.as_ref().and_then(|revision| revision.revid);
    let content = revision
        .and_then(|revision| revision.slots)
        .and_then(|slots| slots.main)
        .map(|slot| slot.content)
        .unwrap_or_default();

    Ok(Some(WikiPage {
        title: page.title,
        page_id,
        revision_id,
        content,
    }))
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    categorymembers: Vec<CategoryMemberItem>,
    #[serde(default)]
    pages: Vec<PageQueryItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    cmcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CategoryMemberItem {
    pageid: u64,
    title: String,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    pageid: Option<u64>,
    title: String,
    missing: Option<bool>,
    invalid: Option<bool>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    revid: Option<u64>,
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_category_members_and_continuation() {
        let (members, next) = category_members_from_response(json!({
            "continue": { "cmcontinue": "page|ABC|123", "continue": "-||" },
            "query": {
                "categorymembers": [
                    { "pageid": 10, "ns": 0, "title": "Alpha" },
                    { "pageid": 11, "ns": 0, "title": "Beta" }
                ]
            }
        }))
        .expect("decode");
        assert_eq!(
            members,
            vec![
                CategoryMember {
                    page_id: 10,
                    title: "Alpha".to_string(),
                },
                CategoryMember {
                    page_id: 11,
                    title: "Beta".to_string(),
                },
            ]
        );
        assert_eq!(next.as_deref(), Some("page|ABC|123"));
    }

    #[test]
    fn decodes_page_with_revision_and_templates() {
        let page = page_from_response(json!({
            "query": {
                "pages": [{
                    "pageid": 42,
                    "ns": 0,
                    "title": "Alpha",
                    "revisions": [{
                        "revid": 777,
                        "parentid": 700,
                        "slots": { "main": {
                            "contentmodel": "wikitext",
                            "content": "{{Game data/saves|Steam|{{P|game}}/save.dat}}"
                        }}
                    }]
                }]
            }
        }))
        .expect("decode")
        .expect("page");
        assert_eq!(page.page_id, 42);
        assert_eq!(page.revision_id, Some(777));
        let templates = page.templates();
        assert_eq!(templates[0].name, "Game data/saves");
    }

    #[test]
    fn missing_page_decodes_to_none() {
        let page = page_from_response(json!({
            "query": { "pages": [{ "ns": 0, "title": "Nope", "missing": true }] }
        }))
        .expect("decode");
        assert!(page.is_none());
    }

    #[test]
    fn api_error_payload_is_reported() {
        let error = check_api_error(&json!({
            "error": { "code": "badtitle", "info": "Bad title \"\"." }
        }))
        .expect_err("must fail");
        assert!(error.to_string().contains("badtitle"));
    }
}
