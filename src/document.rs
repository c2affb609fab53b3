//! Work items and normalized law documents.
//!
//! A [`WorkItem`] is produced by a source's discovery step and names one
//! document to fetch. A [`LawDocument`] is what the source's parser turns the
//! fetched page into, and is the unit persisted by the result writer. The
//! serialized field names are the stable artifact format consumed downstream.

use serde::{Deserialize, Serialize};

use crate::crawl::ParseError;

/// One document to fetch, plus hints the parser may use.
///
/// Hints come from the listing page (a row's title, category or date) and
/// fill in fields the document page itself does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkItem {
    url: String,
    name_hint: Option<String>,
    category_hint: Option<String>,
    date_hint: Option<String>,
}

impl WorkItem {
    /// Creates a work item for `url` with no hints.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name_hint: None,
            category_hint: None,
            date_hint: None,
        }
    }

    /// Attaches the law name seen on the listing page.
    #[must_use]
    pub fn with_name_hint(mut self, name: impl Into<String>) -> Self {
        self.name_hint = non_empty(name.into());
        self
    }

    /// Attaches the category the listing page filed the law under.
    #[must_use]
    pub fn with_category_hint(mut self, category: impl Into<String>) -> Self {
        self.category_hint = non_empty(category.into());
        self
    }

    /// Attaches the modification date shown on the listing page.
    #[must_use]
    pub fn with_date_hint(mut self, date: impl Into<String>) -> Self {
        self.date_hint = non_empty(date.into());
        self
    }

    /// Returns the URL to fetch.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the listing name hint, if any.
    #[must_use]
    pub fn name_hint(&self) -> Option<&str> {
        self.name_hint.as_deref()
    }

    /// Returns the listing category hint, if any.
    #[must_use]
    pub fn category_hint(&self) -> Option<&str> {
        self.category_hint.as_deref()
    }

    /// Returns the listing date hint, if any.
    #[must_use]
    pub fn date_hint(&self) -> Option<&str> {
        self.date_hint.as_deref()
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// One article of a law, in source order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    /// Article number as printed by the source (e.g. `第 1 條`).
    #[serde(rename = "ArticleNo")]
    pub number: String,

    /// Article text.
    #[serde(rename = "ArticleContent")]
    pub content: String,

    /// Enclosing chapter heading, for sources that report one.
    #[serde(rename = "Chapter", default, skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
}

impl Article {
    /// Creates an article without a chapter.
    #[must_use]
    pub fn new(number: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            number: number.into(),
            content: content.into(),
            chapter: None,
        }
    }

    /// Sets the enclosing chapter.
    #[must_use]
    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.chapter = Some(chapter.into());
        self
    }
}

/// A normalized law document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LawDocument {
    /// Law title. Never empty.
    #[serde(rename = "LawName")]
    pub name: String,

    /// Category or legal system the law is filed under.
    #[serde(rename = "LawCategory")]
    pub category: String,

    /// Last modification (or promulgation) date as printed by the source.
    #[serde(rename = "LawModifiedDate")]
    pub modified_date: String,

    /// Articles in source order.
    #[serde(rename = "LawArticles")]
    pub articles: Vec<Article>,

    /// Page the document was fetched from.
    #[serde(rename = "LawURL")]
    pub url: String,
}

impl LawDocument {
    /// Assembles a document, rejecting an empty name.
    ///
    /// Surrounding whitespace is trimmed from the name.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::MissingName`] if `name` is blank.
    pub fn new(
        name: impl Into<String>,
        category: impl Into<String>,
        modified_date: impl Into<String>,
        articles: Vec<Article>,
        url: impl Into<String>,
    ) -> Result<Self, ParseError> {
        let url = url.into();
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ParseError::missing_name(url));
        }
        Ok(Self {
            name,
            category: category.into(),
            modified_date: modified_date.into(),
            articles,
            url,
        })
    }
}
