//! New Taipei City law database (`web.law.ntpc.gov.tw`).
//!
//! Categories hang off `Level.aspx`; each category page lists laws by
//! `lncode`, which maps to the `fcode` of the printable article page.

use async_trait::async_trait;
use scraper::Html;
use tracing::{debug, info};
use url::Url;

use super::html::{dedup_items, enclosing_row, link_target, parse_body, select_all, select_first, text_of};
use super::{DiscoveryContext, LawSource, SourceKind};
use crate::crawl::{DiscoveryError, ParseError};
use crate::document::{Article, LawDocument, WorkItem};

const LEVEL_PAGE: &str = "Level.aspx";
const ARTICLE_PAGE: &str = "Scripts/FLAWDAT0202.aspx";

/// Adapter for the New Taipei City database.
#[derive(Debug, Default, Clone, Copy)]
pub struct NewTaipeiSource;

impl NewTaipeiSource {
    /// Creates the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Category pages with their display names.
fn categories(body: &str, page_url: &Url) -> Vec<(Url, String)> {
    let doc = Html::parse_document(body);
    let mut seen = std::collections::HashSet::new();
    select_all(doc.root_element(), "ul.level a[href*='Query2.aspx?no=C']")
        .into_iter()
        .filter_map(|link| Some((link_target(page_url, link)?, text_of(link))))
        .filter(|(url, _)| seen.insert(url.to_string()))
        .collect()
}

/// Rewrites a listing `lncode` into the `fcode` the article page expects.
fn fcode_from_href(href: &str) -> Option<String> {
    let (_, rest) = href.split_once("lncode=")?;
    let lncode = rest.split('&').next().filter(|code| !code.is_empty())?;
    Some(lncode.replace("1C", "C"))
}

fn law_links(body: &str, base: &Url, category: &str) -> Vec<WorkItem> {
    let doc = Html::parse_document(body);
    let mut items = Vec::new();
    for link in select_all(doc.root_element(), "table.tab-list a[href*='FLAWDAT01.aspx']") {
        let abolished = enclosing_row(link)
            .and_then(|row| select_first(row, "img[src*='fei.gif']"))
            .is_some();
        if abolished {
            continue;
        }
        let Some(fcode) = link.value().attr("href").and_then(fcode_from_href) else {
            continue;
        };
        let Ok(mut target) = base.join(ARTICLE_PAGE) else {
            continue;
        };
        target.query_pairs_mut().append_pair("fcode", &fcode);

        let mut item = WorkItem::new(target.as_str()).with_name_hint(text_of(link));
        if !category.is_empty() {
            item = item.with_category_hint(category);
        }
        items.push(item);
    }
    items
}

/// Text between the first pair of ASCII or full-width parentheses.
fn parenthesized(text: &str) -> Option<&str> {
    let open = text.find(['(', '（'])?;
    let after = &text[open..];
    let inner_start = open + after.chars().next()?.len_utf8();
    let close = text[inner_start..].find([')', '）'])?;
    Some(text[inner_start..inner_start + close].trim())
}

#[async_trait]
impl LawSource for NewTaipeiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::NewTaipei
    }

    async fn discover_urls(&self, ctx: &DiscoveryContext<'_>) -> Result<Vec<WorkItem>, DiscoveryError> {
        let base = ctx.config().base_url().clone();
        let root_url = ctx.resolve(LEVEL_PAGE)?;
        let body = ctx.fetch_listing(&root_url).await?;
        let categories = categories(&body, &root_url);
        info!(categories = categories.len(), "found categories");

        let mut items = Vec::new();
        for (category_url, category) in categories {
            let Some(body) = ctx.fetch_listing_or_skip(&category_url).await? else {
                continue;
            };
            let found = law_links(&body, &base, &category);
            debug!(url = %category_url, found = found.len(), "category processed");
            items.extend(found);
        }

        let items = dedup_items(items);
        info!(found = items.len(), "new taipei discovery finished");
        Ok(items)
    }

    fn parse_document(&self, body: &[u8], item: &WorkItem) -> Result<LawDocument, ParseError> {
        let doc = parse_body(body);
        let root = doc.root_element();
        let url = item.url();

        let mut rows = select_all(root, "table.tab-law01 tr");
        if rows.is_empty() {
            rows = select_all(root, "table.tab-law tr");
        }
        if rows.is_empty() {
            return Err(ParseError::malformed_articles(url, "no article table"));
        }

        let articles: Vec<Article> = rows
            .into_iter()
            .filter_map(|row| {
                let number = select_first(row, ".col-th")?;
                let content = select_first(row, ".col-td pre")?;
                Some(Article::new(text_of(number), text_of(content)))
            })
            .collect();
        if articles.is_empty() {
            return Err(ParseError::malformed_articles(url, "article table has no articles"));
        }

        let header = select_first(root, "#cph_content_lawheader_law").map(text_of);
        let date = header
            .as_deref()
            .and_then(parenthesized)
            .map(str::to_string)
            .or_else(|| item.date_hint().map(str::to_string))
            .unwrap_or_default();
        let name = item.name_hint().map(str::to_string).unwrap_or_else(|| {
            header
                .as_deref()
                .map(|text| text.split(['(', '（']).next().unwrap_or_default().trim().to_string())
                .unwrap_or_default()
        });
        let category = item.category_hint().unwrap_or_default();

        LawDocument::new(name, category, date, articles, url)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const LEVEL: &str = r#"
        <ul class="level">
          <li><a href="Query2.aspx?no=C01">民政類</a></li>
          <li><a href="/Query2.aspx?no=C02">財政類</a></li>
          <li><a href="Query2.aspx?no=C01">民政類</a></li>
          <li><a href="Query1.aspx">全部</a></li>
        </ul>
    "#;

    const CATEGORY: &str = r#"
        <table class="tab-list">
          <tr><td></td><td><a href="FLAWDAT01.aspx?lsid=FL000001&lncode=1C01000001">新北市區公所組織自治條例</a></td></tr>
          <tr><td><img src="/images/fei.gif"></td><td><a href="FLAWDAT01.aspx?lncode=1C01000002">已廢止規則</a></td></tr>
          <tr><td></td><td><a href="FLAWDAT01.aspx?lncode=1C01000003&x=1">新北市里長辦公處設置規則</a></td></tr>
          <tr><td></td><td><a href="FLAWDAT01.aspx?id=4">無代碼</a></td></tr>
        </table>
    "#;

    const DOCUMENT: &str = r#"
        <html><body>
          <span id="cph_content_lawheader_law">新北市區公所組織自治條例（民國 112 年 12 月 29 日）</span>
          <table class="tab-law01">
            <tr><td class="col-th">第 1 條</td><td class="col-td"><pre>本自治條例依地方制度法制定之。</pre></td></tr>
            <tr><td class="col-th">第 2 條</td><td class="col-td"><pre>區公所置區長一人。</pre></td></tr>
            <tr><td colspan="2">附件</td></tr>
          </table>
        </body></html>
    "#;

    #[test]
    fn test_categories_are_deduplicated_with_names() {
        let page = Url::parse("https://web.law.ntpc.gov.tw/Level.aspx").unwrap();
        let found = categories(LEVEL, &page);
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].0.as_str(), "https://web.law.ntpc.gov.tw/Query2.aspx?no=C01");
        assert_eq!(found[0].1, "民政類");
        assert_eq!(found[1].1, "財政類");
    }

    #[test]
    fn test_fcode_rewrite() {
        assert_eq!(fcode_from_href("FLAWDAT01.aspx?lncode=1C01000001").as_deref(), Some("C01000001"));
        assert_eq!(fcode_from_href("FLAWDAT01.aspx?lncode=1C02&x=1").as_deref(), Some("C02"));
        assert_eq!(fcode_from_href("FLAWDAT01.aspx?id=4"), None);
        assert_eq!(fcode_from_href("FLAWDAT01.aspx?lncode="), None);
    }

    #[test]
    fn test_law_links_skip_abolished_rows() {
        let base = Url::parse("https://web.law.ntpc.gov.tw/").unwrap();
        let items = law_links(CATEGORY, &base, "民政類");
        assert_eq!(items.len(), 2);
        assert_eq!(
            items[0].url(),
            "https://web.law.ntpc.gov.tw/Scripts/FLAWDAT0202.aspx?fcode=C01000001"
        );
        assert_eq!(items[0].name_hint(), Some("新北市區公所組織自治條例"));
        assert_eq!(items[0].category_hint(), Some("民政類"));
        assert_eq!(
            items[1].url(),
            "https://web.law.ntpc.gov.tw/Scripts/FLAWDAT0202.aspx?fcode=C01000003"
        );
    }

    #[test]
    fn test_parenthesized_handles_both_widths() {
        assert_eq!(parenthesized("甲法 (2020-01-01)"), Some("2020-01-01"));
        assert_eq!(parenthesized("乙法（民國 99 年）"), Some("民國 99 年"));
        assert_eq!(parenthesized("丙法"), None);
    }

    #[test]
    fn test_parse_document_extracts_articles_and_date() {
        let item = WorkItem::new("https://web.law.ntpc.gov.tw/Scripts/FLAWDAT0202.aspx?fcode=C01000001")
            .with_name_hint("新北市區公所組織自治條例")
            .with_category_hint("民政類");
        let doc = NewTaipeiSource::new().parse_document(DOCUMENT.as_bytes(), &item).unwrap();
        assert_eq!(doc.name, "新北市區公所組織自治條例");
        assert_eq!(doc.category, "民政類");
        assert_eq!(doc.modified_date, "民國 112 年 12 月 29 日");
        assert_eq!(doc.articles.len(), 2);
        assert_eq!(doc.articles[1], Article::new("第 2 條", "區公所置區長一人。"));
    }

    #[test]
    fn test_parse_document_name_falls_back_to_header() {
        let item = WorkItem::new("https://web.law.ntpc.gov.tw/Scripts/FLAWDAT0202.aspx?fcode=C01000001");
        let doc = NewTaipeiSource::new().parse_document(DOCUMENT.as_bytes(), &item).unwrap();
        assert_eq!(doc.name, "新北市區公所組織自治條例");
    }

    #[test]
    fn test_parse_document_without_articles_is_malformed() {
        let item = WorkItem::new("https://web.law.ntpc.gov.tw/x").with_name_hint("甲");
        let empty_table = r#"<table class="tab-law"><tr><td>附件</td></tr></table>"#;
        assert!(matches!(
            NewTaipeiSource::new().parse_document(empty_table.as_bytes(), &item),
            Err(ParseError::MalformedArticles { .. })
        ));
        assert!(matches!(
            NewTaipeiSource::new().parse_document(b"<p>none</p>", &item),
            Err(ParseError::MalformedArticles { .. })
        ));
    }
}
