use serde::{Deserialize, Serialize};

use crate::inline_complete::InlineCompletion;
use crate::model::{AutoCompleteResult, ResultEntry, SearchStatus};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchRequest {
    pub query: String,
    /// Enables switch-to-tab results.
    #[serde(default)]
    pub actions: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenPageRequest {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutofillRequest {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResultDto {
    pub url: String,
    pub title: String,
    pub favicon: String,
    pub style: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchResponse {
    pub status: SearchStatus,
    pub results: Vec<SearchResultDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OpenPageResponse {
    pub url: String,
    pub open_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AutofillResponse {
    pub completion: Option<String>,
    pub untrimmed: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload")]
pub enum CoreRequest {
    Search(SearchRequest),
    RegisterOpenPage(OpenPageRequest),
    UnregisterOpenPage(OpenPageRequest),
    Autofill(AutofillRequest),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "payload")]
pub enum CoreResponse {
    Search(SearchResponse),
    RegisterOpenPage(OpenPageResponse),
    UnregisterOpenPage(OpenPageResponse),
    Autofill(AutofillResponse),
}

impl From<ResultEntry> for SearchResultDto {
    fn from(value: ResultEntry) -> Self {
        Self {
            url: value.url,
            title: value.title,
            favicon: value.favicon,
            style: value.style,
        }
    }
}

impl From<AutoCompleteResult> for SearchResponse {
    fn from(value: AutoCompleteResult) -> Self {
        Self {
            status: value.status,
            results: value.entries.into_iter().map(SearchResultDto::from).collect(),
        }
    }
}

impl From<Option<InlineCompletion>> for AutofillResponse {
    fn from(value: Option<InlineCompletion>) -> Self {
        match value {
            Some(completion) => Self {
                completion: Some(completion.value),
                untrimmed: completion.untrimmed,
            },
            None => Self {
                completion: None,
                untrimmed: None,
            },
        }
    }
}
