//! Taichung City law database (`law.taichung.gov.tw`).
//!
//! Categories are listed on `LawCategoryMain.aspx`; each category's result
//! table is paged with a `page` query parameter.

use std::collections::HashSet;

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, info};
use url::Url;

use super::cms::{self, ListingPage};
use super::html::{dedup_items, link_target, select_all, select_first, text_of};
use super::{DiscoveryContext, LawSource, MAX_LISTING_PAGES, SourceKind};
use crate::crawl::{DiscoveryError, ParseError};
use crate::document::{LawDocument, WorkItem};

const CATEGORY_MAIN: &str = "LawCategoryMain.aspx";

/// Adapter for the Taichung City database.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaichungSource;

impl TaichungSource {
    /// Creates the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn categories(body: &str, page_url: &Url) -> Vec<(Url, String)> {
    let doc = Html::parse_document(body);
    let mut seen = HashSet::new();
    select_all(doc.root_element(), "a[href*='LawCategoryMain.aspx?CategoryID=']")
        .into_iter()
        .filter_map(|link| Some((link_target(page_url, link)?, text_of(link))))
        .filter(|(url, _)| seen.insert(url.to_string()))
        .collect()
}

/// `url` with its `page` parameter set to `page`.
fn with_page(url: &Url, page: usize) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    let mut paged = url.clone();
    paged
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs)
        .append_pair("page", &page.to_string());
    paged
}

/// One category result page and whether it links to the following page.
fn category_page(body: &str, page_url: &Url, page: usize) -> (ListingPage, bool) {
    let listing = cms::parse_listing(body, page_url, false);
    let doc = Html::parse_document(body);
    let next_selector = format!("a[href*='page={}']", page + 1);
    let has_next = select_first(doc.root_element(), &next_selector).is_some();
    (listing, has_next)
}

#[async_trait]
impl LawSource for TaichungSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Taichung
    }

    async fn discover_urls(&self, ctx: &DiscoveryContext<'_>) -> Result<Vec<WorkItem>, DiscoveryError> {
        let root_url = ctx.resolve(CATEGORY_MAIN)?;
        let body = ctx.fetch_listing(&root_url).await?;
        let categories = categories(&body, &root_url);
        info!(categories = categories.len(), "found categories");

        let mut items = Vec::new();
        for (category_url, category) in categories {
            let before = items.len();
            for page in 1..=MAX_LISTING_PAGES {
                let page_url = with_page(&category_url, page);
                let Some(body) = ctx.fetch_listing_or_skip(&page_url).await? else {
                    break;
                };
                let (listing, has_next) = category_page(&body, &page_url, page);
                if !listing.has_rows {
                    break;
                }
                items.extend(
                    listing
                        .items
                        .into_iter()
                        .map(|item| item.with_category_hint(category.as_str())),
                );
                if !has_next {
                    break;
                }
            }
            debug!(url = %category_url, found = items.len() - before, "category processed");
        }

        let items = dedup_items(items);
        info!(found = items.len(), "taichung discovery finished");
        Ok(items)
    }

    fn parse_document(&self, body: &[u8], item: &WorkItem) -> Result<LawDocument, ParseError> {
        cms::parse_document(body, item)
    }
}
