//! Confluence REST client for the document search tool.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, RETRY_AFTER};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::backend::http::{bearer_headers, shared_client};
use crate::error::BotError;
use crate::tools::{DocumentPage, DocumentSource};

#[derive(Debug, Deserialize)]
struct ContentResponse {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    body: Option<ContentBody>,
}

#[derive(Debug, Deserialize)]
struct ContentBody {
    storage: Option<Storage>,
}

#[derive(Debug, Deserialize)]
struct Storage {
    value: String,
}

/// Loads a fixed set of pages with a personal access token.
pub struct ConfluenceClient {
    base_url: String,
    api_token: String,
    page_urls: Vec<String>,
}

impl std::fmt::Debug for ConfluenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfluenceClient")
            .field("base_url", &self.base_url)
            .field("page_urls", &self.page_urls)
            .finish_non_exhaustive()
    }
}

impl ConfluenceClient {
    pub fn new(
        base_url: impl Into<String>,
        api_token: impl Into<String>,
        page_urls: Vec<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: api_token.into(),
            page_urls,
        }
    }

    /// Fetch one page. Pages that are missing, forbidden or lack a storage
    /// body yield `None`; a rejected token or a server-side failure is an
    /// error.
    pub async fn fetch_page(
        &self,
        page_id: &str,
        source_url: &str,
    ) -> Result<Option<DocumentPage>, BotError> {
        let url = format!(
            "{}/rest/api/content/{page_id}?expand=body.storage,version,space,history",
            self.base_url
        );
        debug!(page_id, "fetching Confluence page");
        let resp = shared_client()
            .get(&url)
            .headers(bearer_headers(&self.api_token))
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        let status = resp.status().as_u16();
        match status {
            200..=299 => {}
            401 => {
                return Err(BotError::Authentication(
                    "Confluence rejected the API token".to_string(),
                ))
            }
            403 | 404 => {
                warn!(page_id, status, "Confluence page unavailable; skipping");
                return Ok(None);
            }
            429 | 500..=599 => {
                let retry_after_ms = resp
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .map(|secs| secs.saturating_mul(1000));
                return Err(BotError::Transport {
                    message: format!("Confluence page {page_id} returned HTTP {status}"),
                    retry_after_ms,
                });
            }
            _ => {
                warn!(page_id, status, "unexpected Confluence response; skipping page");
                return Ok(None);
            }
        }

        let content: ContentResponse = resp.json().await?;
        let Some(storage) = content.body.and_then(|b| b.storage) else {
            warn!(page_id, "Confluence page has no storage body; skipping");
            return Ok(None);
        };
        Ok(Some(DocumentPage {
            id: page_id.to_string(),
            title: content
                .title
                .unwrap_or_else(|| format!("Page {page_id}")),
            source_url: source_url.to_string(),
            text: storage_to_text(&storage.value),
        }))
    }
}

#[async_trait]
impl DocumentSource for ConfluenceClient {
    async fn load_pages(&self) -> Result<Vec<DocumentPage>, BotError> {
        let mut pages = Vec::with_capacity(self.page_urls.len());
        for url in &self.page_urls {
            let Some(page_id) = extract_page_id(url) else {
                warn!(url = %url, "no page id in Confluence URL; skipping");
                continue;
            };
            if let Some(page) = self.fetch_page(page_id, url).await? {
                pages.push(page);
            }
        }
        info!(requested = self.page_urls.len(), loaded = pages.len(), "loaded Confluence pages");
        Ok(pages)
    }
}

/// Numeric page id from a page URL, either `/pages/<id>/…` or
/// `viewpage.action?pageId=<id>`.
pub fn extract_page_id(url: &str) -> Option<&str> {
    let digits = |s: &str| -> Option<usize> {
        let len = s.bytes().take_while(u8::is_ascii_digit).count();
        (len > 0).then_some(len)
    };

    if let Some((_, rest)) = url.split_once("/pages/") {
        if let Some(len) = digits(rest) {
            let after = &rest[len..];
            if after.is_empty() || after.starts_with(['/', '?', '#']) {
                return Some(&rest[..len]);
            }
        }
    }
    let (_, rest) = url.split_once("pageId=")?;
    digits(rest).map(|len| &rest[..len])
}

/// Plain text of a storage-format (XHTML) body; entities are decoded and
/// whitespace collapsed.
pub fn storage_to_text(storage: &str) -> String {
    let fragment = scraper::Html::parse_fragment(storage);
    fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}
