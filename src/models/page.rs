//! Result records and assembled pages.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// One result produced by a remote worker: an opaque payload plus its
/// sequence id within the query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub sequence: u64,
    pub payload: Value,
}

impl ResultRecord {
    pub fn new(sequence: u64, payload: Value) -> Self {
        Self { sequence, payload }
    }
}

/// One page of results assembled by a next call, with the paging metadata a
/// response layer exposes as headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultsPage {
    pub query_id: Uuid,
    /// 1-based page number of this delivery.
    pub page_number: u64,
    pub results: Vec<ResultRecord>,
    /// True when the page was cut short because the query was canceled
    /// mid-drain.
    pub partial_results: bool,
    /// True when the workers have produced their final record and this page
    /// carries the remainder.
    pub last_page: bool,
    /// Server-side time spent assembling this page.
    pub operation_time_ms: u64,
}

impl ResultsPage {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}
