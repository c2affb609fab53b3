//! End-to-end crawls of individual sources against mock sites.
//!
//! Each test points a source at a wiremock server through the config base
//! URL, runs discovery plus the batch through [`LawCrawler`], and checks the
//! files that land in a temporary output directory.

use std::path::Path;
use std::time::Duration;

use lawcrawler_core::{
    DiscoveryError, FailureKind, LawCrawler, LawDocument, ProcessExit, SourceConfig, SourceKind,
    build_source, determine_exit_outcome,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

mod support;
use support::socket_guard::{socket_skip_return, start_mock_server_or_skip};

macro_rules! require_mock_server {
    () => {{
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return socket_skip_return();
        };
        mock_server
    }};
}

const CENTRAL_ROOT: &str = r#"
<html><body>
  <ul id="tree">
    <li><a href="LawSearchLaw.aspx?TY=04001001">總統府 <span class="badge">2</span></a></li>
    <li><a href="LawSearchLaw.aspx?TY=04001002&fei=1">廢止 <span class="badge">9</span></a></li>
  </ul>
</body></html>
"#;

const CENTRAL_CATEGORY: &str = r#"
<table class="table table-hover tab-list">
  <tr><td><a href="/LawClass/LawAll.aspx?PCODE=A0000001">中華民國憲法</a></td></tr>
  <tr><td><a href="/LawClass/LawAll.aspx?PCODE=A0000002">空白頁</a></td></tr>
</table>
"#;

const CENTRAL_DOCUMENT: &str = r#"
<html><body>
  <table class="table">
    <tr><th>法規名稱</th><td><a id="hlLawName">中華民國憲法</a></td></tr>
    <tr id="trLNNDate"><th>修正日期</th><td>民國 36 年 01 月 01 日</td></tr>
    <tr><th>法規類別</th><td>憲法</td></tr>
  </table>
  <div class="row"><div class="col-no"><a>第 1 條</a></div><div class="law-article">中華民國基於三民主義，為民有民治民享之民主共和國。</div></div>
  <div class="row"><div class="col-no"><a>第 2 條</a></div><div class="law-article">中華民國之主權屬於國民全體。</div></div>
</body></html>
"#;

fn cms_listing(rows: &[(&str, &str, &str)], next: Option<&str>) -> String {
    let rows: String = rows
        .iter()
        .map(|(href, name, date)| {
            format!(r#"<tr><td><a href="{href}">{name}</a></td><td>{date}</td></tr>"#)
        })
        .collect();
    let next = next
        .map(|href| format!(r#"<a id="ctl00_cp_PagerButtom_hlNext" href="{href}">下一頁</a>"#))
        .unwrap_or_default();
    format!(
        r#"<html><body><table class="table table-hover"><tr><th>名稱</th><th>日期</th></tr>{rows}</table>{next}</body></html>"#
    )
}

fn cms_document(name: &str, article: &str) -> String {
    format!(
        r#"<html><body>
          <table class="table table-bordered">
            <tr><th>法規名稱：</th><td>{name}</td></tr>
            <tr><th>法規體系：</th><td>民政類</td></tr>
          </table>
          <table class="tab-law">
            <tr><td>第 1 條</td><td>{article}</td></tr>
          </table>
        </body></html>"#
    )
}

fn mock_config(kind: SourceKind, base_url: String, output_dir: &Path) -> SourceConfig {
    SourceConfig::defaults_for(kind)
        .base_url(base_url)
        .output_dir(output_dir)
        .max_workers(2)
        .delay(Duration::ZERO, Duration::ZERO)
        .max_retries(1)
        .backoff_base(Duration::ZERO)
        .build()
        .unwrap()
}

fn html(body: impl Into<String>) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("content-type", "text/html; charset=utf-8")
        .set_body_string(body.into())
}

async fn mount_central_site(mock_server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/Law/LawSearchLaw.aspx"))
        .and(query_param("TY", "04001001"))
        .respond_with(html(CENTRAL_CATEGORY))
        .with_priority(1)
        .expect(1)
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Law/LawSearchLaw.aspx"))
        .respond_with(html(CENTRAL_ROOT))
        .expect(1)
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/LawClass/LawAll.aspx"))
        .and(query_param("PCODE", "A0000001"))
        .respond_with(html(CENTRAL_DOCUMENT))
        .expect(1)
        .mount(mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/LawClass/LawAll.aspx"))
        .and(query_param("PCODE", "A0000002"))
        .respond_with(html("<html><body><p>查無資料</p></body></html>"))
        .expect(1)
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_central_crawl_writes_documents() {
    let mock_server = require_mock_server!();
    mount_central_site(&mock_server).await;

    let temp = TempDir::new().unwrap();
    let config = mock_config(
        SourceKind::Central,
        format!("{}/Law/", mock_server.uri()),
        temp.path(),
    );
    let crawler = LawCrawler::new(config).unwrap();
    let report = crawler
        .crawl(build_source(SourceKind::Central), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.source, SourceKind::Central);
    assert_eq!(report.discovered, 2);
    assert_eq!(report.result.total(), 2);
    assert_eq!(report.result.succeeded(), 1);
    assert_eq!(report.result.failed(), 1);
    let failure = &report.result.failures()[0];
    assert_eq!(failure.kind, FailureKind::Parse);
    assert!(failure.url.ends_with("PCODE=A0000002"));

    let written = temp.path().join("中華民國憲法.json");
    let doc: LawDocument =
        serde_json::from_str(&std::fs::read_to_string(&written).unwrap()).unwrap();
    assert_eq!(doc.name, "中華民國憲法");
    assert_eq!(doc.category, "憲法");
    assert_eq!(doc.modified_date, "360101");
    assert_eq!(doc.articles.len(), 2);
    assert_eq!(doc.articles[0].number, "中華民國憲法, 第 1 條");
    assert!(doc.url.ends_with("PCODE=A0000001"));

    assert_eq!(determine_exit_outcome(&[report]), ProcessExit::Success);
}

#[tokio::test]
async fn test_central_root_listing_failure_is_discovery_error() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/Law/LawSearchLaw.aspx"))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp = TempDir::new().unwrap();
    let config = mock_config(
        SourceKind::Central,
        format!("{}/Law/", mock_server.uri()),
        temp.path(),
    );
    let crawler = LawCrawler::new(config).unwrap();
    let error = crawler
        .crawl(build_source(SourceKind::Central), &CancellationToken::new())
        .await
        .unwrap_err();

    match error {
        DiscoveryError::Fetch { url, attempts, .. } => {
            assert!(url.ends_with("/Law/LawSearchLaw.aspx"), "url: {url}");
            assert_eq!(attempts, 1);
        }
        other => panic!("expected fetch error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_kaohsiung_crawl_follows_pager() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/LawResultList.aspx"))
        .and(query_param("page", "2"))
        .respond_with(html(cms_listing(
            &[("LawContent.aspx?id=GL000003", "高雄市第三條例", "2024-03-01")],
            Some("LawResultList.aspx?page=2"),
        )))
        .with_priority(1)
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/LawResultList.aspx"))
        .and(query_param("NLawTypeID", "all"))
        .respond_with(html(cms_listing(
            &[
                ("LawContent.aspx?id=GL000001", "高雄市第一條例", "2024-01-01"),
                ("LawContent.aspx?id=GL000002", "高雄市第二條例", "2024-02-01"),
            ],
            Some("LawResultList.aspx?page=2"),
        )))
        .expect(1)
        .mount(&mock_server)
        .await;
    for (id, name) in [
        ("GL000001", "高雄市第一條例"),
        ("GL000002", "高雄市第二條例"),
        ("GL000003", "高雄市第三條例"),
    ] {
        Mock::given(method("GET"))
            .and(path("/LawContent.aspx"))
            .and(query_param("id", id))
            .respond_with(html(cms_document(name, "本條例自公布日施行。")))
            .expect(1)
            .mount(&mock_server)
            .await;
    }

    let temp = TempDir::new().unwrap();
    let config = mock_config(
        SourceKind::Kaohsiung,
        format!("{}/", mock_server.uri()),
        temp.path(),
    );
    let report = LawCrawler::new(config)
        .unwrap()
        .crawl(build_source(SourceKind::Kaohsiung), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.discovered, 3);
    assert_eq!(report.result.succeeded(), 3);
    assert!(report.is_success());
    for name in ["高雄市第一條例", "高雄市第二條例", "高雄市第三條例"] {
        let path = temp.path().join(format!("{name}.json"));
        let doc: LawDocument =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc.category, "民政類");
        assert_eq!(doc.articles[0].content, "本條例自公布日施行。");
    }
}

#[tokio::test]
async fn test_limit_caps_processed_documents() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .and(path("/Law/LawSearchLaw.aspx"))
        .and(query_param("TY", "04001001"))
        .respond_with(html(CENTRAL_CATEGORY))
        .with_priority(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/Law/LawSearchLaw.aspx"))
        .respond_with(html(CENTRAL_ROOT))
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/LawClass/LawAll.aspx"))
        .respond_with(html(CENTRAL_DOCUMENT))
        .expect(1)
        .mount(&mock_server)
        .await;

    let temp = TempDir::new().unwrap();
    let config = SourceConfig::defaults_for(SourceKind::Central)
        .base_url(format!("{}/Law/", mock_server.uri()))
        .output_dir(temp.path())
        .delay(Duration::ZERO, Duration::ZERO)
        .limit(Some(1))
        .build()
        .unwrap();
    let report = LawCrawler::new(config)
        .unwrap()
        .crawl(build_source(SourceKind::Central), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.discovered, 2);
    assert_eq!(report.result.total(), 1);
    assert_eq!(report.result.succeeded(), 1);
}

#[tokio::test]
async fn test_cancelled_crawl_reports_cancellation() {
    let mock_server = require_mock_server!();
    Mock::given(method("GET"))
        .respond_with(html(CENTRAL_ROOT))
        .expect(0)
        .mount(&mock_server)
        .await;

    let temp = TempDir::new().unwrap();
    let config = mock_config(
        SourceKind::Central,
        format!("{}/Law/", mock_server.uri()),
        temp.path(),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();
    let error = LawCrawler::new(config)
        .unwrap()
        .crawl(build_source(SourceKind::Central), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(error, DiscoveryError::Cancelled));
}
