//! Shared handling for the `LawContent.aspx` CMS run by several city
//! governments (Taichung, Taoyuan, Kaohsiung).
//!
//! Listing pages render results in `table.table-hover` rows with a
//! `LawContent.aspx` link; document pages carry an info table
//! (`table.table-bordered`) and either an article table (`table.tab-law`) or
//! a free-form content block.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html};
use tracing::{debug, info};
use url::Url;

use super::html::{dedup_items, link_target, parse_body, select_all, select_first, stripped_text, text_of};
use super::{DiscoveryContext, MAX_LISTING_PAGES};
use crate::crawl::{DiscoveryError, ParseError};
use crate::document::{Article, LawDocument, WorkItem};

/// Query of the "all current laws" result list.
pub const ALL_LAWS_LISTING: &str = "LawResultList.aspx?NLawTypeID=all&GroupID=&CategoryID=1%2c01%2c02%2c03%2c04%2c05%2c06%2c07%2c08%2c09%2c10%2c11%2c12%2c13%2c14%2c15%2c16%2c17%2c18%2c19%2c20%2c21%2c22%2c23%2c24%2c25%2c26%2c27%2c28%2c29%2c30%2c31%2c33%2c34%2c35%2c36%2c32%2cb01%2cb02%2cb03%2cb04%2cb05%2cb06%2cb07%2cb08%2cb09%2cb10%2cb11%2cb12%2c&KW=&name=1&content=1&StartDate=&EndDate=&LNumber=&now=1&fei=1";

/// Article number recorded for chapter heading rows.
pub const CHAPTER_MARKER: &str = "章節";

#[allow(clippy::expect_used)]
static ARTICLE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^第\s*(?:[一二三四五六七八九十百千]+|\d+)\s*條").expect("valid article heading regex")
});

#[allow(clippy::expect_used)]
static TOTAL_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"共\s*(\d+)\s*筆").expect("valid total count regex"));

/// One parsed result-list page.
#[derive(Debug, Default)]
pub struct ListingPage {
    /// Current laws found on the page.
    pub items: Vec<WorkItem>,
    /// Whether any result rows were present at all.
    pub has_rows: bool,
    /// Pager link to the following page, if enabled.
    pub next: Option<Url>,
    /// Total count announced by the pager, if shown.
    pub total: Option<usize>,
}

/// Extracts work items and pager state from a result-list page.
///
/// Rows flagged as abolished (`.label-fei`) are skipped. When `with_dates`
/// is set the second cell of each row becomes the item's date hint.
#[must_use]
pub fn parse_listing(body: &str, page_url: &Url, with_dates: bool) -> ListingPage {
    let doc = Html::parse_document(body);
    let root = doc.root_element();
    let rows = select_all(root, "table.table-hover tr");

    let mut page = ListingPage {
        has_rows: !rows.is_empty(),
        ..ListingPage::default()
    };
    for row in rows {
        if select_first(row, ".label-fei").is_some() {
            continue;
        }
        let Some(link) = select_first(row, "a[href*='LawContent.aspx']") else {
            continue;
        };
        let Some(target) = link_target(page_url, link) else {
            continue;
        };
        let mut item = WorkItem::new(target.as_str()).with_name_hint(text_of(link));
        if with_dates && let Some(cell) = select_first(row, "td:nth-of-type(2)") {
            item = item.with_date_hint(text_of(cell));
        }
        page.items.push(item);
    }

    page.next = select_first(root, "a[id$='_hlNext']").and_then(|next| {
        let disabled = next
            .value()
            .attr("class")
            .is_some_and(|class| class.contains("disabled"));
        if disabled { None } else { link_target(page_url, next) }
    });

    page.total = select_first(root, ".pageinfo").and_then(|info| {
        TOTAL_COUNT
            .captures(&text_of(info))
            .and_then(|caps| caps.get(1))
            .and_then(|count| count.as_str().parse().ok())
    });
    page
}

/// Walks a result list from `start` through its pager's next links.
///
/// The first page must load; a later page that fails ends the walk with
/// what was collected so far. Revisiting a page or reaching
/// [`MAX_LISTING_PAGES`] also ends it.
///
/// # Errors
///
/// Returns [`DiscoveryError`] if the first page cannot be fetched or the
/// crawl is cancelled.
pub async fn discover_result_list(
    ctx: &DiscoveryContext<'_>,
    start: Url,
) -> Result<Vec<WorkItem>, DiscoveryError> {
    let first = ctx.fetch_listing(&start).await?;
    let mut page = parse_listing(&first, &start, true);
    if let Some(total) = page.total {
        info!(total, "result list announces laws");
    }

    let mut visited = HashSet::from([start.to_string()]);
    let mut items = Vec::new();
    let mut page_number = 1;
    loop {
        debug!(page = page_number, found = page.items.len(), "processed result page");
        items.append(&mut page.items);

        let Some(next) = page.next.take() else { break };
        if page_number >= MAX_LISTING_PAGES || !visited.insert(next.to_string()) {
            debug!(url = %next, "stopping pager walk");
            break;
        }
        let Some(body) = ctx.fetch_listing_or_skip(&next).await? else {
            break;
        };
        page = parse_listing(&body, &next, true);
        page_number += 1;
    }

    let items = dedup_items(items);
    info!(pages = page_number, found = items.len(), "result list walked");
    Ok(items)
}

/// Parses a `LawContent.aspx` document page.
///
/// Name, category and date come from the info table, falling back to the
/// listing hints. Articles come from the article table, else from the
/// content block split on `第 N 條` headings, else the whole block as a
/// single unnumbered article.
///
/// # Errors
///
/// Returns [`ParseError::MissingName`] without a name and
/// [`ParseError::MalformedArticles`] when no article source exists.
pub fn parse_document(body: &[u8], item: &WorkItem) -> Result<LawDocument, ParseError> {
    let doc = parse_body(body);
    let root = doc.root_element();
    let url = item.url();

    let info = InfoTable::from_page(root);
    let name = info
        .name
        .filter(|name| !name.is_empty())
        .or_else(|| item.name_hint().map(str::to_string))
        .unwrap_or_default();
    let category = info
        .category
        .or_else(|| item.category_hint().map(str::to_string))
        .unwrap_or_default();
    let date = info
        .modified
        .or(info.published)
        .filter(|date| !date.is_empty())
        .or_else(|| item.date_hint().map(str::to_string))
        .unwrap_or_default();

    let mut articles = table_articles(root);
    if articles.is_empty() {
        articles = block_articles(root);
    }
    if articles.is_empty() {
        return Err(ParseError::malformed_articles(url, "no article table or content block"));
    }

    LawDocument::new(name, category, date, articles, url)
}

#[derive(Debug, Default)]
struct InfoTable {
    name: Option<String>,
    category: Option<String>,
    published: Option<String>,
    modified: Option<String>,
}

impl InfoTable {
    fn from_page(root: ElementRef<'_>) -> Self {
        let mut info = Self::default();
        let Some(table) = select_first(root, "table.table-bordered") else {
            return info;
        };
        for row in select_all(table, "tr") {
            let (Some(th), Some(td)) = (select_first(row, "th"), select_first(row, "td")) else {
                continue;
            };
            let label = text_of(th);
            let value = text_of(td);
            if label.contains("法規名稱") {
                info.name = Some(value);
            } else if label.contains("法規體系") {
                info.category = Some(value);
            } else if label.contains("公發布日") {
                info.published = Some(value);
            } else if label.contains("修正日期") {
                info.modified = Some(value);
            }
        }
        info
    }
}

fn table_articles(root: ElementRef<'_>) -> Vec<Article> {
    let Some(table) = select_first(root, "table.tab-law") else {
        return Vec::new();
    };
    let mut articles = Vec::new();
    for row in select_all(table, "tr") {
        let cells = select_all(row, "td");
        match cells.as_slice() {
            [number, content, ..] => {
                let content = text_of(*content);
                if !content.is_empty() {
                    articles.push(Article::new(text_of(*number), content));
                }
            }
            [only] => {
                let heading = text_of(*only);
                if heading.contains('章') {
                    articles.push(Article::new(CHAPTER_MARKER, heading));
                }
            }
            [] => {}
        }
    }
    articles
}

fn block_articles(root: ElementRef<'_>) -> Vec<Article> {
    let Some(block) = select_first(root, ".law-reg-content")
        .or_else(|| select_first(root, "div[id*='divLawContent']"))
    else {
        return Vec::new();
    };

    let mut articles = Vec::new();
    let mut current: Option<(String, Vec<String>)> = None;
    for span in select_all(block, "span") {
        let text = stripped_text(span);
        if text.is_empty() {
            continue;
        }
        if let Some(heading) = ARTICLE_HEADING.find(&text) {
            if let Some((number, parts)) = current.take()
                && !parts.is_empty()
            {
                articles.push(Article::new(number, parts.join(" ")));
            }
            let rest = text[heading.end()..].trim();
            let parts = if rest.is_empty() { Vec::new() } else { vec![rest.to_string()] };
            current = Some((heading.as_str().to_string(), parts));
        } else if let Some((_, parts)) = current.as_mut() {
            parts.push(text);
        }
    }
    if let Some((number, parts)) = current
        && !parts.is_empty()
    {
        articles.push(Article::new(number, parts.join(" ")));
    }

    if articles.is_empty() {
        let whole = stripped_text(block);
        if !whole.is_empty() {
            articles.push(Article::new("", whole));
        }
    }
    articles
}
