//! Record extraction from fetched HTML pages
//!
//! [`Extractor`] is the seam between the harvesting pipeline and the markup of a
//! particular catalog. [`HtmlExtractor`] is the default implementation: it reads
//! payload URLs from meta tags and everything else from configurable CSS selectors.

use crate::config::ExtractionConfig;
use crate::error::{Error, Result};
use crate::types::Record;
use chrono::Utc;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeSet;
use url::Url;

/// Parses listing and item pages
pub trait Extractor: Send + Sync {
    /// Build a [`Record`] from an item page; `None` when the page has no payload reference
    fn extract(&self, page: &[u8], item_id: &str) -> Option<Record>;

    /// Item identifiers linked from a listing page (deduplicated)
    fn enumerate_links(&self, page: &[u8]) -> BTreeSet<String>;

    /// Highest page index advertised by the listing's pagination control (at least 1)
    fn max_page_index(&self, page: &[u8]) -> u32;
}

/// Default [`Extractor`] driven by [`ExtractionConfig`]
pub struct HtmlExtractor {
    base_url: Url,
    item_link_prefix: String,
    anchors: Selector,
    pagination: Selector,
    payload_meta: Vec<Selector>,
    description: Selector,
    related: Selector,
    categories: Selector,
    page_number: Regex,
}

impl HtmlExtractor {
    /// Compile the configured selectors; links are resolved against `base_url`
    pub fn new(config: &ExtractionConfig, base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| Error::config("base_url", format!("invalid base_url: {e}")))?;

        let payload_meta = config
            .payload_meta
            .iter()
            .map(|s| parse_selector("extraction.payload_meta", s))
            .collect::<Result<Vec<_>>>()?;

        let page_number = Regex::new(r"(\d+)/?$")
            .map_err(|e| Error::Other(format!("page number pattern: {e}")))?;

        Ok(Self {
            base_url,
            item_link_prefix: config.item_link_prefix.clone(),
            anchors: parse_selector("extraction", "a[href]")?,
            pagination: parse_selector(
                "extraction.pagination_selector",
                &config.pagination_selector,
            )?,
            payload_meta,
            description: parse_selector(
                "extraction.description_selector",
                &config.description_selector,
            )?,
            related: parse_selector("extraction.related_selector", &config.related_selector)?,
            categories: parse_selector(
                "extraction.categories_selector",
                &config.categories_selector,
            )?,
            page_number,
        })
    }

    /// Item id for an href, if it points at an item page on the catalog host
    fn item_id_from_href(&self, href: &str) -> Option<String> {
        let resolved = self.base_url.join(href).ok()?;
        if resolved.host_str() != self.base_url.host_str() {
            return None;
        }
        let id = resolved
            .path()
            .strip_prefix(&self.item_link_prefix)?
            .trim_matches('/');
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }

    fn resolve(&self, href: &str) -> Option<String> {
        self.base_url.join(href).ok().map(String::from)
    }
}

fn parse_selector(key: &str, selector: &str) -> Result<Selector> {
    Selector::parse(selector)
        .map_err(|e| Error::config(key, format!("invalid selector '{selector}': {e:?}")))
}

fn parse_page(page: &[u8]) -> Html {
    Html::parse_document(&String::from_utf8_lossy(page))
}

/// `content` for meta tags, trimmed text for everything else
fn element_value(el: ElementRef<'_>) -> Option<String> {
    let value = if el.value().name() == "meta" {
        el.value().attr("content")?.trim().to_string()
    } else {
        el.text().collect::<String>().trim().to_string()
    };
    if value.is_empty() { None } else { Some(value) }
}

fn element_texts(document: &Html, selector: &Selector) -> Vec<String> {
    document
        .select(selector)
        .filter_map(|el| {
            let text = el.text().collect::<String>().trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .collect()
}

impl Extractor for HtmlExtractor {
    fn extract(&self, page: &[u8], item_id: &str) -> Option<Record> {
        let document = parse_page(page);

        let payload_url = self.payload_meta.iter().find_map(|selector| {
            document
                .select(selector)
                .filter_map(|el| el.value().attr("content"))
                .map(str::trim)
                .find(|c| !c.is_empty())
                .and_then(|c| self.resolve(c))
        })?;

        let description = document
            .select(&self.description)
            .find_map(element_value);

        Some(Record {
            item_id: item_id.to_string(),
            payload_url,
            description,
            related_ids: element_texts(&document, &self.related),
            categories: element_texts(&document, &self.categories),
            discovered_at: Utc::now(),
        })
    }

    fn enumerate_links(&self, page: &[u8]) -> BTreeSet<String> {
        let document = parse_page(page);
        document
            .select(&self.anchors)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| self.item_id_from_href(href))
            .collect()
    }

    fn max_page_index(&self, page: &[u8]) -> u32 {
        let document = parse_page(page);
        document
            .select(&self.pagination)
            .filter_map(|a| a.value().attr("href"))
            .filter_map(|href| self.base_url.join(href).ok())
            .filter_map(|url| {
                self.page_number
                    .captures(url.path())
                    .and_then(|c| c.get(1))
                    .and_then(|m| m.as_str().parse::<u32>().ok())
            })
            .fold(1, u32::max)
    }
}
