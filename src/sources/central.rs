//! National Laws & Regulations Database (`law.moj.gov.tw`).
//!
//! Discovery walks the category tree on `LawSearchLaw.aspx`; every current
//! category page lists `LawAll.aspx?PCODE=` documents.

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, info};
use url::Url;

use super::html::{dedup_items, dedup_urls, digits_only, link_target, parse_body, select_all, select_first, text_at, text_of};
use super::{DiscoveryContext, LawSource, SourceKind};
use crate::crawl::{DiscoveryError, ParseError};
use crate::document::{Article, LawDocument, WorkItem};

const SEARCH_PAGE: &str = "LawSearchLaw.aspx";

/// Adapter for the national database.
#[derive(Debug, Default, Clone, Copy)]
pub struct CentralSource;

impl CentralSource {
    /// Creates the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Category page links from the root tree, plus the announced law count.
fn category_links(body: &str, page_url: &Url) -> Result<(Vec<Url>, u64), DiscoveryError> {
    let doc = Html::parse_document(body);
    let root = doc.root_element();
    let Some(tree) = select_first(root, "ul#tree") else {
        return Err(DiscoveryError::listing(page_url.as_str(), "category tree `ul#tree` not found"));
    };

    let links = select_all(tree, "a[href]")
        .into_iter()
        .filter(|link| {
            link.value()
                .attr("href")
                .is_some_and(|href| href.contains("LawSearchLaw.aspx?TY="))
        })
        .filter_map(|link| link_target(page_url, link))
        .filter(|url| !url.as_str().contains("fei=1"))
        .collect();

    let estimated = select_all(root, "span.badge")
        .into_iter()
        .filter_map(|badge| text_of(badge).parse::<u64>().ok())
        .sum();
    Ok((dedup_urls(links), estimated))
}

fn law_links(body: &str, page_url: &Url) -> Vec<WorkItem> {
    let doc = Html::parse_document(body);
    select_all(doc.root_element(), "table.tab-list a[href*='LawAll.aspx?PCODE=']")
        .into_iter()
        .filter_map(|link| {
            let target = link_target(page_url, link)?;
            Some(WorkItem::new(target.as_str()).with_name_hint(text_of(link)))
        })
        .collect()
}

#[async_trait]
impl LawSource for CentralSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Central
    }

    async fn discover_urls(&self, ctx: &DiscoveryContext<'_>) -> Result<Vec<WorkItem>, DiscoveryError> {
        let root_url = ctx.resolve(SEARCH_PAGE)?;
        let body = ctx.fetch_listing(&root_url).await?;
        let (categories, estimated) = category_links(&body, &root_url)?;
        info!(categories = categories.len(), estimated, "found category links");

        let mut items = Vec::new();
        for category in categories {
            let Some(body) = ctx.fetch_listing_or_skip(&category).await? else {
                continue;
            };
            let found = law_links(&body, &category);
            debug!(url = %category, found = found.len(), "category processed");
            items.extend(found);
        }

        let items = dedup_items(items);
        info!(found = items.len(), "central discovery finished");
        Ok(items)
    }

    fn parse_document(&self, body: &[u8], item: &WorkItem) -> Result<LawDocument, ParseError> {
        let doc = parse_body(body);
        let root = doc.root_element();

        let name = text_at(root, "#hlLawName");
        if name.is_empty() {
            return Err(ParseError::missing_name(item.url()));
        }
        let category = text_at(root, ".table tr:nth-child(3) td");
        let date_text = select_first(root, "#trLNNDate td")
            .or_else(|| select_first(root, "#trLNODate td"))
            .map(text_of)
            .unwrap_or_default();

        let articles = select_all(root, ".row")
            .into_iter()
            .filter_map(|row| {
                let number = select_first(row, ".col-no a")?;
                let content = select_first(row, ".law-article")?;
                Some(Article::new(
                    format!("{name}, {}", text_of(number)),
                    text_of(content),
                ))
            })
            .collect();

        LawDocument::new(name, category, digits_only(&date_text), articles, item.url())
    }
}
