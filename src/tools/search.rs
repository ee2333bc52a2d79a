//! Web search with an ordered provider chain
//!
//! The keyed Google Custom Search provider is tried first when both of its
//! credentials are present. Anything short of a non-empty answer from it
//! drops through to the unkeyed chain (DuckDuckGo Instant Answer, then
//! Wikipedia), whose hits are merged in order and capped at the limit.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, info, warn};

use super::error::ProviderError;
use super::registry::{SEARCH_LIMIT_DEFAULT, SEARCH_LIMIT_MAX, SEARCH_LIMIT_MIN};
use super::result::{SearchHit, SearchResults};
use crate::config::Credentials;
use crate::metrics::SEARCH_RESULTS;

/// Provider tag reported for hits merged from the unkeyed chain
pub const FALLBACK_PROVIDER: &str = "fallback";

const GOOGLE_CSE_ENDPOINT: &str = "https://www.googleapis.com/customsearch/v1";
const DUCKDUCKGO_ENDPOINT: &str = "https://api.duckduckgo.com/";
const WIKIPEDIA_ENDPOINT: &str = "https://en.wikipedia.org/w/api.php";
const WIKIPEDIA_ARTICLE_BASE: &str = "https://en.wikipedia.org/wiki/";

/// Related-topic titles are cut to this many characters
const TOPIC_TITLE_CHARS: usize = 60;

lazy_static! {
    static ref SPAN_TAG: Regex = Regex::new(r"</?span[^>]*>").expect("valid span regex");
}

/// A source of search hits
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Stable identifier, also used in logs
    fn name(&self) -> &'static str;

    /// Return at most `limit` hits for `query`
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError>;
}

/// Clamp a raw `limit` argument to `[1, 10]`
///
/// Integers and numeric strings are honored (fractions truncate). Zero, an
/// empty string and anything non-numeric count as "not given" and fall back
/// to the default of 5; negative values clamp up to 1.
pub fn clamp_limit(raw: Option<&Value>) -> usize {
    let requested = match raw {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().map(|f| f.trunc() as i64),
        _ => None,
    };
    match requested.filter(|n| *n != 0) {
        Some(n) => n.clamp(SEARCH_LIMIT_MIN as i64, SEARCH_LIMIT_MAX as i64) as usize,
        None => SEARCH_LIMIT_DEFAULT,
    }
}

async fn get_json(
    client: &reqwest::Client,
    provider: &'static str,
    url: &str,
    query: &[(&str, &str)],
) -> Result<Value, ProviderError> {
    let response = client.get(url).query(query).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status {
            provider,
            status: status.as_u16(),
        });
    }
    // DuckDuckGo answers with a javascript content type, so parse the text
    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}

fn str_field<'a>(value: &'a Value, key: &str) -> &'a str {
    value.get(key).and_then(Value::as_str).unwrap_or_default()
}

/// Google Custom Search JSON API
pub struct GoogleCse {
    client: reqwest::Client,
    api_key: String,
    cse_id: String,
    endpoint: String,
}

impl GoogleCse {
    pub fn new(client: reqwest::Client, api_key: impl Into<String>, cse_id: impl Into<String>) -> Self {
        Self {
            client,
            api_key: api_key.into(),
            cse_id: cse_id.into(),
            endpoint: GOOGLE_CSE_ENDPOINT.to_string(),
        }
    }
}

/// Hits from a Custom Search response (`items[].{title, link, snippet}`)
pub fn parse_google_items(body: &Value, limit: usize) -> Vec<SearchHit> {
    body.get("items")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .take(limit)
                .map(|item| SearchHit {
                    title: str_field(item, "title").to_string(),
                    link: str_field(item, "link").to_string(),
                    snippet: str_field(item, "snippet").to_string(),
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchProvider for GoogleCse {
    fn name(&self) -> &'static str {
        "google-cse"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let params = [("key", self.api_key.as_str()), ("cx", self.cse_id.as_str()), ("q", query)];
        let body = get_json(&self.client, self.name(), &self.endpoint, &params).await?;
        Ok(parse_google_items(&body, limit))
    }
}

/// DuckDuckGo Instant Answer API
pub struct DuckDuckGo {
    client: reqwest::Client,
    endpoint: String,
}

impl DuckDuckGo {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: DUCKDUCKGO_ENDPOINT.to_string(),
        }
    }
}

/// Hits from an Instant Answer: the abstract first, then related topics
pub fn parse_instant_answer(body: &Value, limit: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    let abstract_text = str_field(body, "AbstractText");
    if !abstract_text.is_empty() {
        let heading = str_field(body, "Heading");
        hits.push(SearchHit {
            title: if heading.is_empty() { "DuckDuckGo" } else { heading }.to_string(),
            link: str_field(body, "AbstractURL").to_string(),
            snippet: abstract_text.to_string(),
        });
    }

    if let Some(topics) = body.get("RelatedTopics").and_then(Value::as_array) {
        for topic in topics {
            if hits.len() >= limit {
                break;
            }
            let text = str_field(topic, "Text");
            if text.is_empty() {
                continue;
            }
            hits.push(SearchHit {
                title: text.chars().take(TOPIC_TITLE_CHARS).collect(),
                link: str_field(topic, "FirstURL").to_string(),
                snippet: text.to_string(),
            });
        }
    }

    hits.truncate(limit);
    hits
}

#[async_trait]
impl SearchProvider for DuckDuckGo {
    fn name(&self) -> &'static str {
        "duckduckgo"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let params = [
            ("q", query),
            ("format", "json"),
            ("no_redirect", "1"),
            ("no_html", "1"),
        ];
        let body = get_json(&self.client, self.name(), &self.endpoint, &params).await?;
        Ok(parse_instant_answer(&body, limit))
    }
}

/// Wikipedia full-text search (`action=query&list=search`)
pub struct Wikipedia {
    client: reqwest::Client,
    endpoint: String,
}

impl Wikipedia {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: WIKIPEDIA_ENDPOINT.to_string(),
        }
    }
}

/// `https://en.wikipedia.org/wiki/<Title_With_Underscores>`, percent-encoded
pub fn wikipedia_link(title: &str) -> String {
    let slug: String = title
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    format!("{}{}", WIKIPEDIA_ARTICLE_BASE, urlencoding::encode(&slug))
}

/// Drop the match-highlighting `<span>` tags and decode `&quot;`
pub fn clean_snippet(snippet: &str) -> String {
    SPAN_TAG.replace_all(snippet, "").replace("&quot;", "\"")
}

pub fn parse_wikipedia(body: &Value, limit: usize) -> Vec<SearchHit> {
    body.pointer("/query/search")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .take(limit)
                .map(|entry| {
                    let title = str_field(entry, "title");
                    SearchHit {
                        title: title.to_string(),
                        link: wikipedia_link(title),
                        snippet: clean_snippet(str_field(entry, "snippet")),
                    }
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl SearchProvider for Wikipedia {
    fn name(&self) -> &'static str {
        "wikipedia"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>, ProviderError> {
        let params = [
            ("action", "query"),
            ("list", "search"),
            ("srsearch", query),
            ("format", "json"),
            ("origin", "*"),
        ];
        let body = get_json(&self.client, self.name(), &self.endpoint, &params).await?;
        Ok(parse_wikipedia(&body, limit))
    }
}

/// Primary provider plus the ordered fallback chain
pub struct SearchChain {
    primary: Option<Box<dyn SearchProvider>>,
    fallbacks: Vec<Box<dyn SearchProvider>>,
}

impl SearchChain {
    pub fn new(
        primary: Option<Box<dyn SearchProvider>>,
        fallbacks: Vec<Box<dyn SearchProvider>>,
    ) -> Self {
        Self { primary, fallbacks }
    }

    /// Google CSE when both credentials are set, then DuckDuckGo and Wikipedia
    pub fn from_credentials(credentials: &Credentials, client: reqwest::Client) -> Self {
        let primary = credentials.google_cse().map(|(key, cx)| {
            Box::new(GoogleCse::new(client.clone(), key, cx)) as Box<dyn SearchProvider>
        });
        let fallbacks: Vec<Box<dyn SearchProvider>> = vec![
            Box::new(DuckDuckGo::new(client.clone())),
            Box::new(Wikipedia::new(client)),
        ];
        Self::new(primary, fallbacks)
    }

    /// Provider names in the order they are consulted
    pub fn provider_order(&self) -> Vec<&'static str> {
        self.primary
            .iter()
            .chain(self.fallbacks.iter())
            .map(|p| p.name())
            .collect()
    }

    /// Run the chain. Never fails; no hits at all is an empty fallback result.
    pub async fn run(&self, query: &str, limit: usize) -> SearchResults {
        self.run_with_warnings(query, limit).await.0
    }

    /// Like [`run`](Self::run), also returning one message per provider that
    /// failed along the way
    pub async fn run_with_warnings(&self, query: &str, limit: usize) -> (SearchResults, Vec<String>) {
        let limit = limit.clamp(SEARCH_LIMIT_MIN, SEARCH_LIMIT_MAX);
        let mut warnings = Vec::new();

        if let Some(primary) = &self.primary {
            match primary.search(query, limit).await {
                Ok(mut hits) if !hits.is_empty() => {
                    hits.truncate(limit);
                    info!(provider = primary.name(), hits = hits.len(), "Search answered by primary provider");
                    SEARCH_RESULTS
                        .with_label_values(&[primary.name()])
                        .inc_by(hits.len() as u64);
                    let results = SearchResults {
                        provider: primary.name().to_string(),
                        query: query.to_string(),
                        results: hits,
                    };
                    return (results, warnings);
                }
                Ok(_) => debug!(provider = primary.name(), "Primary search returned nothing"),
                Err(e) => {
                    warn!(provider = primary.name(), error = %e, "Primary search failed");
                    warnings.push(format!("{} search failed: {}", primary.name(), e));
                }
            }
        }

        let mut results: Vec<SearchHit> = Vec::new();
        for provider in &self.fallbacks {
            let remaining = limit.saturating_sub(results.len());
            if remaining == 0 {
                break;
            }
            match provider.search(query, remaining).await {
                Ok(hits) => {
                    debug!(provider = provider.name(), hits = hits.len(), "Fallback provider answered");
                    results.extend(hits.into_iter().take(remaining));
                }
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "Fallback provider failed");
                    warnings.push(format!("{} search failed: {}", provider.name(), e));
                }
            }
        }

        SEARCH_RESULTS
            .with_label_values(&[FALLBACK_PROVIDER])
            .inc_by(results.len() as u64);
        let results = SearchResults {
            provider: FALLBACK_PROVIDER.to_string(),
            query: query.to_string(),
            results,
        };
        (results, warnings)
    }
}
