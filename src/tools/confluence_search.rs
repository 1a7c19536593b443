//! `confluence_document_search`: find passages in configured Confluence pages.
//!
//! Pages are split into overlapping sections and ranked like channel
//! history. The loaded sections are cached for a while.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::info;

use super::arguments::ToolArguments;
use super::builtin::truncate_utf8;
use super::ranking::{rank_by_terms, Ties};
use super::tool::{Tool, ToolContext};
use super::types::{ParameterBuilder, ToolSpec};
use crate::error::BotError;

pub const TOOL_NAME: &str = "confluence_document_search";
const MAX_RESULTS: usize = 3;
const SECTION_CHARS: usize = 1000;
const SECTION_OVERLAP: usize = 150;
const MAX_OUTPUT_BYTES: usize = 16_384;

/// A Confluence page reduced to plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentPage {
    pub id: String,
    pub title: String,
    /// Link shown to users; the configured page URL.
    pub source_url: String,
    pub text: String,
}

/// Where pages come from; implemented by the Confluence REST client.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn load_pages(&self) -> Result<Vec<DocumentPage>, BotError>;
}

#[derive(Debug)]
struct Section {
    title: String,
    source_url: String,
    text: String,
}

struct CachedSections {
    loaded_at: Instant,
    sections: Arc<Vec<Section>>,
}

pub struct ConfluenceSearchTool {
    spec: ToolSpec,
    source: Arc<dyn DocumentSource>,
    cache: RwLock<Option<CachedSections>>,
    cache_ttl: Duration,
}

impl ConfluenceSearchTool {
    pub fn new(source: Arc<dyn DocumentSource>) -> Self {
        let spec = ToolSpec::new(
            TOOL_NAME,
            "Searches the Confluence documentation for relevant information, procedures, or \
             explanations. Use this when the user asks a question that is likely answered in \
             the official documentation or knowledge base. Requires only the 'query'.",
            ParameterBuilder::new()
                .string("query", "What to search for in the Confluence documents.", true)
                .build(),
        )
        .idempotent(true);
        Self {
            spec,
            source,
            cache: RwLock::new(None),
            cache_ttl: Duration::from_secs(1800),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    async fn sections(&self) -> Result<Arc<Vec<Section>>, BotError> {
        if let Some(cached) = self.cache.read().await.as_ref() {
            if cached.loaded_at.elapsed() < self.cache_ttl {
                return Ok(cached.sections.clone());
            }
        }
        let pages = self.source.load_pages().await?;
        let sections: Vec<Section> = pages
            .iter()
            .flat_map(|page| {
                split_sections(&page.text, SECTION_CHARS, SECTION_OVERLAP)
                    .into_iter()
                    .map(|text| Section {
                        title: page.title.clone(),
                        source_url: page.source_url.clone(),
                        text,
                    })
            })
            .collect();
        info!(pages = pages.len(), sections = sections.len(), "indexed Confluence pages");

        let sections = Arc::new(sections);
        *self.cache.write().await = Some(CachedSections {
            loaded_at: Instant::now(),
            sections: sections.clone(),
        });
        Ok(sections)
    }
}

#[async_trait]
impl Tool for ConfluenceSearchTool {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    async fn execute(
        &self,
        args: &ToolArguments,
        _ctx: &ToolContext,
    ) -> Result<serde_json::Value, BotError> {
        let query = args.get_str("query")?;
        info!(query, "searching Confluence documents");

        let sections = self.sections().await?;
        let hits = rank_by_terms(sections.as_slice(), query, |s| s.text.as_str(), Ties::Earlier);

        let text = if hits.is_empty() {
            format!("No relevant information found in the indexed Confluence documents for query: '{query}'")
        } else {
            let blocks: Vec<String> = hits.iter().take(MAX_RESULTS).map(|s| format_section(s)).collect();
            let mut text = format!(
                "Found relevant information in Confluence documentation:\n\n{}",
                blocks.join("\n---\n")
            );
            if hits.len() > MAX_RESULTS {
                text.push_str(&format!("\n\n...(found {} relevant sections in total)", hits.len()));
            }
            text
        };
        Ok(serde_json::Value::String(truncate_utf8(&text, MAX_OUTPUT_BYTES)))
    }
}

fn format_section(section: &Section) -> String {
    let link = if section.source_url.is_empty() {
        section.title.clone()
    } else {
        format!("<{}|{}>", section.source_url, section.title)
    };
    format!(
        "Source Document: {link}\nRelevant Content: ...{}...",
        section.text
    )
}

/// Windows of `size` characters, each starting `size - overlap` after the
/// previous one. Blank windows are dropped.
fn split_sections(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = size.max(1);
    let step = size.saturating_sub(overlap).max(1);
    let mut sections = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + size).min(chars.len());
        let section: String = chars[start..end].iter().collect();
        let section = section.trim();
        if !section.is_empty() {
            sections.push(section.to_string());
        }
        if end == chars.len() {
            break;
        }
        start += step;
    }
    sections
}
