//! Kaohsiung City law database (`outlaw.kcg.gov.tw`).

use async_trait::async_trait;

use super::cms::{self, ALL_LAWS_LISTING};
use super::{DiscoveryContext, LawSource, SourceKind};
use crate::crawl::{DiscoveryError, ParseError};
use crate::document::{LawDocument, WorkItem};

/// Adapter for the Kaohsiung City database.
///
/// Same CMS as Taoyuan; listing rows also carry the promulgation date,
/// which backs up a document page without one.
#[derive(Debug, Default, Clone, Copy)]
pub struct KaohsiungSource;

impl KaohsiungSource {
    /// Creates the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LawSource for KaohsiungSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Kaohsiung
    }

    async fn discover_urls(&self, ctx: &DiscoveryContext<'_>) -> Result<Vec<WorkItem>, DiscoveryError> {
        let start = ctx.resolve(ALL_LAWS_LISTING)?;
        cms::discover_result_list(ctx, start).await
    }

    fn parse_document(&self, body: &[u8], item: &WorkItem) -> Result<LawDocument, ParseError> {
        cms::parse_document(body, item)
    }
}
