//! Taipei City law database (`www.laws.taipei.gov.tw`).
//!
//! The category result list is paginated; its pager announces the page
//! count. Each listed law is identified by an `FL<code>` path segment and
//! fetched from its article-content page.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, info};
use url::Url;

use super::html::{dedup_items, parse_body, select_all, select_first, text_at, text_of};
use super::{DiscoveryContext, LawSource, MAX_LISTING_PAGES, SourceKind};
use crate::crawl::{DiscoveryError, ParseError};
use crate::document::{Article, LawDocument, WorkItem};

const CATEGORY_RESULT: &str = "Law/LawCategory/LawCategoryResult?categoryid=001";
const ARTICLE_CONTENT: &str = "Law/LawSearch/LawArticleContent/";

#[allow(clippy::expect_used)]
static ENUMERATED_ARTICLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([一二三四五六七八九十]+、)(.*)$").expect("valid enumerated article regex")
});

/// Adapter for the Taipei City database.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaipeiSource;

impl TaipeiSource {
    /// Creates the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn page_path(page: usize) -> String {
    format!("{CATEGORY_RESULT}&page={page}")
}

/// Page count announced by the pager, if present.
fn total_pages(body: &str) -> Option<usize> {
    let doc = Html::parse_document(body);
    let counter = select_first(doc.root_element(), "div.paging-counts em:nth-of-type(2)")?;
    text_of(counter).parse().ok()
}

/// `FL` code of a law link, e.g. `FL000123` from `/Law/LawSearch/LawInformation/FL000123?x=1`.
fn fl_code(href: &str) -> Option<&str> {
    let (_, rest) = href.split_once("/FL")?;
    let code = rest
        .split(['?', '#', '/'])
        .next()
        .filter(|code| !code.is_empty())?;
    Some(code)
}

fn law_links(body: &str, base: &Url) -> Vec<WorkItem> {
    let doc = Html::parse_document(body);
    select_all(doc.root_element(), "table.table-tab td a[href]")
        .into_iter()
        .filter_map(|link| {
            let code = fl_code(link.value().attr("href")?)?;
            let target = base.join(&format!("{ARTICLE_CONTENT}FL{code}")).ok()?;
            Some(WorkItem::new(target.as_str()).with_name_hint(text_of(link)))
        })
        .collect()
}

/// Amendment date shown next to the `修正日期` label.
fn modified_date(root: ElementRef<'_>) -> Option<String> {
    select_all(root, "div.col-label")
        .into_iter()
        .filter(|label| text_of(*label).contains("修正日期"))
        .find_map(|label| {
            let input = label.next_siblings().find_map(ElementRef::wrap)?;
            select_first(input, "dfn").map(text_of).or_else(|| Some(text_of(input)))
        })
        .filter(|date| !date.is_empty())
}

fn articles(list: ElementRef<'_>) -> Vec<Article> {
    let mut chapter: Option<String> = None;
    let mut articles = Vec::new();
    for entry in select_all(list, "li") {
        let Some(body) = select_first(entry, "div.law-articlepre") else {
            let heading = text_of(entry);
            if !heading.is_empty() {
                chapter = Some(heading);
            }
            continue;
        };

        let text = text_of(body);
        let (number, content) = match ENUMERATED_ARTICLE.captures(&text) {
            Some(caps) => (
                caps.get(1).map_or("", |m| m.as_str()).to_string(),
                caps.get(2).map_or("", |m| m.as_str()).trim().to_string(),
            ),
            None => (text_at(entry, "div.col-no"), text.clone()),
        };
        if content.is_empty() {
            continue;
        }
        let article = Article::new(number, content);
        articles.push(match &chapter {
            Some(chapter) => article.with_chapter(chapter.clone()),
            None => article,
        });
    }
    articles
}

#[async_trait]
impl LawSource for TaipeiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Taipei
    }

    async fn discover_urls(&self, ctx: &DiscoveryContext<'_>) -> Result<Vec<WorkItem>, DiscoveryError> {
        let base = ctx.config().base_url().clone();
        let first_url = ctx.resolve(&page_path(1))?;
        let first = ctx.fetch_listing(&first_url).await?;

        let pages = total_pages(&first).unwrap_or(1).clamp(1, MAX_LISTING_PAGES);
        info!(pages, "category result pages");

        let mut items = law_links(&first, &base);
        for page in 2..=pages {
            let url = ctx.resolve(&page_path(page))?;
            let Some(body) = ctx.fetch_listing_or_skip(&url).await? else {
                continue;
            };
            let found = law_links(&body, &base);
            debug!(page, pages, found = found.len(), "processed result page");
            items.extend(found);
        }

        let items = dedup_items(items);
        info!(found = items.len(), "taipei discovery finished");
        Ok(items)
    }

    fn parse_document(&self, body: &[u8], item: &WorkItem) -> Result<LawDocument, ParseError> {
        let doc = parse_body(body);
        let root = doc.root_element();
        let url = item.url();

        let Some(list) = select_first(root, "ul.law.law-content") else {
            return Err(ParseError::malformed_articles(url, "article list `ul.law.law-content` not found"));
        };

        let name = item
            .name_hint()
            .map(str::to_string)
            .unwrap_or_else(|| text_at(root, "div.col-input a.law-link"));
        let date = modified_date(root)
            .or_else(|| item.date_hint().map(str::to_string))
            .unwrap_or_default();
        let category = item.category_hint().unwrap_or_default();

        LawDocument::new(name, category, date, articles(list), url)
    }
}
