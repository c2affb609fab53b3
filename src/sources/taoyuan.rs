//! Taoyuan City law database (`law.tycg.gov.tw`).

use async_trait::async_trait;

use super::cms::{self, ALL_LAWS_LISTING};
use super::{DiscoveryContext, LawSource, SourceKind};
use crate::crawl::{DiscoveryError, ParseError};
use crate::document::{LawDocument, WorkItem};

/// Adapter for the Taoyuan City database.
///
/// Walks the "all current laws" result list through its pager.
#[derive(Debug, Default, Clone, Copy)]
pub struct TaoyuanSource;

impl TaoyuanSource {
    /// Creates the adapter.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LawSource for TaoyuanSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Taoyuan
    }

    async fn discover_urls(&self, ctx: &DiscoveryContext<'_>) -> Result<Vec<WorkItem>, DiscoveryError> {
        let start = ctx.resolve(ALL_LAWS_LISTING)?;
        cms::discover_result_list(ctx, start).await
    }

    fn parse_document(&self, body: &[u8], item: &WorkItem) -> Result<LawDocument, ParseError> {
        cms::parse_document(body, item)
    }
}
