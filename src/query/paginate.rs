//! Cursor-driven pagination over the search endpoint.
//!
//! The driver keeps fetching while the page says it is not the last one OR
//! while it hands back a continuation token. Either signal alone is enough to
//! continue; the endpoint has been seen to get one of them wrong.

use crate::error::Result;
use crate::melt::{FieldRegistry, FieldSpec, IssueMelter, RegistryConfig};
use crate::query::transport::{SearchPage, SearchRequest, SearchTransport};
use crate::value::DynamicRecord;
use std::fmt;
use tracing::{debug, info, instrument, warn};

/// Largest page the tracker serves
pub const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
pub struct QueryOptions {
    pub page_size: u32,
    /// Stop once this many records are collected
    pub max_results: Option<usize>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        QueryOptions {
            page_size: DEFAULT_PAGE_SIZE,
            max_results: None,
        }
    }
}

/// Non-fatal conditions noticed while paginating.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryWarning {
    /// A page carried no last-page flag; paging stopped there.
    MissingLastPageFlag { page: usize },
    /// More results exist than were fetched.
    Truncated { fetched: usize, available: Option<u64> },
    /// An entry in `issues` was not an object and was skipped.
    SkippedIssue { page: usize, index: usize },
}

impl fmt::Display for QueryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryWarning::MissingLastPageFlag { page } => write!(
                f,
                "page {page} had no last-page flag; results may be incomplete"
            ),
            QueryWarning::Truncated { fetched, available: Some(total) } => {
                write!(f, "fetched {fetched} of {total} available results")
            }
            QueryWarning::Truncated { fetched, available: None } => {
                write!(f, "fetched {fetched} results but more were available")
            }
            QueryWarning::SkippedIssue { page, index } => {
                write!(f, "skipped malformed issue {index} on page {page}")
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryOutcome {
    pub records: Vec<DynamicRecord>,
    pub pages: usize,
    pub warnings: Vec<QueryWarning>,
}

#[derive(Debug, Clone, PartialEq)]
enum PageState {
    Fetching {
        cursor: Option<String>,
        start_at: Option<usize>,
    },
    Done,
}

/// Runs paginated queries against a search transport.
///
/// The engine holds no per-query state: every call builds its own registry,
/// cursor and accumulator, so one engine can serve concurrent queries.
pub struct QueryEngine<T> {
    transport: T,
    registry_config: RegistryConfig,
    options: QueryOptions,
}

impl<T: SearchTransport> QueryEngine<T> {
    pub fn new(transport: T) -> Self {
        QueryEngine {
            transport,
            registry_config: RegistryConfig::default(),
            options: QueryOptions::default(),
        }
    }

    pub fn with_registry_config(mut self, config: RegistryConfig) -> Self {
        self.registry_config = config;
        self
    }

    pub fn with_options(mut self, options: QueryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run a query to completion and return the flattened records.
    pub async fn run_query(&self, jql: &str, fields: &[FieldSpec]) -> Result<Vec<DynamicRecord>> {
        Ok(self.run_query_detailed(jql, fields).await?.records)
    }

    /// Run a query to completion, also reporting page count and warnings.
    ///
    /// The first failed request aborts the query; nothing is retried.
    #[instrument(skip(self, fields), fields(field_count = fields.len()))]
    pub async fn run_query_detailed(&self, jql: &str, fields: &[FieldSpec]) -> Result<QueryOutcome> {
        let registry = FieldRegistry::build(fields, self.registry_config.clone())?;
        let melter = IssueMelter::new(&registry);
        let wire_fields = registry.wire_names();

        let mut outcome = QueryOutcome::default();
        // Issues seen so far, skipped ones included
        let mut consumed = 0;
        let mut state = PageState::Fetching {
            cursor: None,
            start_at: None,
        };

        while let PageState::Fetching { cursor, start_at } =
            std::mem::replace(&mut state, PageState::Done)
        {
            let request = SearchRequest {
                jql: jql.to_string(),
                fields: wire_fields.clone(),
                max_results: self.options.page_size,
                next_page_token: cursor,
                start_at,
            };

            let page = self.transport.search(&request).await?;
            outcome.pages += 1;
            debug!(
                page = outcome.pages,
                issues = page.issues.len(),
                is_last = ?page.is_last,
                has_cursor = page.next_page_token.is_some(),
                "fetched page"
            );

            for (index, issue) in page.issues.iter().enumerate() {
                match melter.melt(issue) {
                    Ok(record) => outcome.records.push(record),
                    Err(e) => {
                        warn!(page = outcome.pages, index, error = %e, "skipping malformed issue");
                        outcome.warnings.push(QueryWarning::SkippedIssue {
                            page: outcome.pages,
                            index,
                        });
                    }
                }
            }

            consumed += page.issues.len();
            state = self.advance(&page, consumed, &mut outcome);
        }

        info!(
            records = outcome.records.len(),
            pages = outcome.pages,
            warnings = outcome.warnings.len(),
            "query complete"
        );

        Ok(outcome)
    }

    /// Decide the next state from the page just consumed.
    fn advance(&self, page: &SearchPage, consumed: usize, outcome: &mut QueryOutcome) -> PageState {
        let fetched = outcome.records.len();
        let continues = page.is_last == Some(false) || page.next_page_token.is_some();

        // The cap applies to every page, the last one included
        if let Some(max) = self.options.max_results {
            if fetched > max || (fetched == max && continues) {
                outcome.records.truncate(max);
                warn!(fetched = max, "result cap reached before the last result");
                outcome.warnings.push(QueryWarning::Truncated {
                    fetched: max,
                    available: page.total,
                });
                return PageState::Done;
            }
        }

        let is_last = match page.is_last {
            Some(is_last) => is_last,
            None => {
                warn!(page = outcome.pages, "search response has no last-page flag, stopping");
                outcome.warnings.push(QueryWarning::MissingLastPageFlag { page: outcome.pages });
                self.check_total(page, outcome);
                return PageState::Done;
            }
        };

        if is_last && page.next_page_token.is_none() {
            self.check_total(page, outcome);
            return PageState::Done;
        }

        match &page.next_page_token {
            Some(token) => PageState::Fetching {
                cursor: Some(token.clone()),
                start_at: None,
            },
            // Told to continue without a cursor: fall back to an offset, unless
            // this page made no progress
            None if page.issues.is_empty() => {
                warn!(fetched, "empty page without a cursor, stopping");
                outcome.warnings.push(QueryWarning::Truncated {
                    fetched,
                    available: page.total,
                });
                PageState::Done
            }
            None => PageState::Fetching {
                cursor: None,
                start_at: Some(consumed),
            },
        }
    }

    fn check_total(&self, page: &SearchPage, outcome: &mut QueryOutcome) {
        let fetched = outcome.records.len();
        if let Some(total) = page.total {
            if (fetched as u64) < total {
                warn!(fetched, total, "fewer results fetched than reported available");
                outcome.warnings.push(QueryWarning::Truncated {
                    fetched,
                    available: Some(total),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::query::transport::StaticPages;
    use crate::value::DynamicValue;
    use serde_json::{json, Value};
    use tracing_test::traced_test;

    fn issue(key: &str) -> Value {
        json!({"key": key, "fields": {"summary": format!("summary of {key}")}})
    }

    fn page(keys: &[&str], is_last: Option<bool>, token: Option<&str>) -> SearchPage {
        SearchPage {
            issues: keys.iter().map(|k| issue(k)).collect(),
            is_last,
            next_page_token: token.map(str::to_string),
            total: None,
        }
    }

    fn fields() -> Vec<FieldSpec> {
        vec![FieldSpec::new("summary").alias("Summary")]
    }

    fn keys(records: &[DynamicRecord]) -> Vec<String> {
        records
            .iter()
            .filter_map(|r| r.get("key").and_then(DynamicValue::as_str).map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_terminates_on_first_page_with_both_done_signals() {
        let engine = QueryEngine::new(StaticPages::new(vec![
            page(&["P-1", "P-2"], Some(false), Some("t2")),
            page(&["P-3"], Some(false), Some("t3")),
            page(&["P-4"], Some(true), None),
            page(&["never"], Some(true), None),
        ]));

        let outcome = engine.run_query_detailed("project = P", &fields()).await.unwrap();

        assert_eq!(outcome.pages, 3);
        assert_eq!(keys(&outcome.records), vec!["P-1", "P-2", "P-3", "P-4"]);
        assert!(outcome.warnings.is_empty());

        let requests = engine.transport().requests();
        assert_eq!(requests[0].next_page_token, None);
        assert_eq!(requests[1].next_page_token.as_deref(), Some("t2"));
        assert_eq!(requests[2].next_page_token.as_deref(), Some("t3"));
        assert_eq!(requests[0].fields, vec!["summary"]);
    }

    #[tokio::test]
    async fn test_token_alone_keeps_paging() {
        let engine = QueryEngine::new(StaticPages::new(vec![
            page(&["P-1"], Some(true), Some("t2")),
            page(&["P-2"], Some(true), None),
        ]));

        let records = engine.run_query("project = P", &fields()).await.unwrap();

        assert_eq!(keys(&records), vec!["P-1", "P-2"]);
        assert_eq!(engine.transport().requests().len(), 2);
    }

    #[tokio::test]
    async fn test_not_last_without_token_falls_back_to_offset() {
        let engine = QueryEngine::new(StaticPages::new(vec![
            page(&["P-1", "P-2"], Some(false), None),
            page(&["P-3"], Some(true), None),
        ]));

        let records = engine.run_query("project = P", &fields()).await.unwrap();

        assert_eq!(records.len(), 3);
        let requests = engine.transport().requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].start_at, Some(2));
        assert_eq!(requests[1].next_page_token, None);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_missing_last_page_flag_stops_after_one_page() {
        let engine = QueryEngine::new(StaticPages::new(vec![
            page(&["P-1"], None, Some("t2")),
            page(&["P-2"], Some(true), None),
        ]));

        let outcome = engine.run_query_detailed("project = P", &fields()).await.unwrap();

        assert_eq!(outcome.pages, 1);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.warnings, vec![QueryWarning::MissingLastPageFlag { page: 1 }]);
        assert!(logs_contain("no last-page flag"));
    }

    #[tokio::test]
    async fn test_request_failure_aborts_query() {
        let engine = QueryEngine::new(
            StaticPages::new(vec![page(&["P-1"], Some(false), Some("t2"))]).then_fail(502, "bad gateway"),
        );

        let err = engine.run_query("project = P", &fields()).await.unwrap_err();

        match err {
            Error::RequestFailed { query, status, .. } => {
                assert_eq!(query, "project = P");
                assert_eq!(status, 502);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn test_result_cap_truncates_with_warning() {
        let mut first = page(&["P-1", "P-2", "P-3"], Some(false), Some("t2"));
        first.total = Some(10);
        let engine = QueryEngine::new(StaticPages::new(vec![first]))
            .with_options(QueryOptions { page_size: 3, max_results: Some(2) });

        let outcome = engine.run_query_detailed("project = P", &fields()).await.unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(
            outcome.warnings,
            vec![QueryWarning::Truncated { fetched: 2, available: Some(10) }]
        );
        assert_eq!(engine.transport().requests()[0].max_results, 3);
        assert!(logs_contain("result cap reached"));
    }

    #[tokio::test]
    async fn test_result_cap_applies_to_last_page() {
        let only = page(&["P-1", "P-2", "P-3"], Some(true), None);
        let engine = QueryEngine::new(StaticPages::new(vec![only]))
            .with_options(QueryOptions { page_size: 100, max_results: Some(2) });

        let outcome = engine.run_query_detailed("project = P", &fields()).await.unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert_eq!(
            outcome.warnings,
            vec![QueryWarning::Truncated { fetched: 2, available: None }]
        );
        assert_eq!(engine.transport().requests().len(), 1);
    }

    #[tokio::test]
    async fn test_result_cap_exactly_met_on_last_page_is_silent() {
        let only = page(&["P-1", "P-2"], Some(true), None);
        let engine = QueryEngine::new(StaticPages::new(vec![only]))
            .with_options(QueryOptions { page_size: 100, max_results: Some(2) });

        let outcome = engine.run_query_detailed("project = P", &fields()).await.unwrap();

        assert_eq!(outcome.records.len(), 2);
        assert!(outcome.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_result_cap_applies_without_last_page_flag() {
        let only = page(&["P-1", "P-2", "P-3"], None, None);
        let engine = QueryEngine::new(StaticPages::new(vec![only]))
            .with_options(QueryOptions { page_size: 100, max_results: Some(1) });

        let outcome = engine.run_query_detailed("project = P", &fields()).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.warnings,
            vec![QueryWarning::Truncated { fetched: 1, available: None }]
        );
    }

    #[tokio::test]
    async fn test_reported_total_above_fetched_warns() {
        let mut only = page(&["P-1"], Some(true), None);
        only.total = Some(5);
        let engine = QueryEngine::new(StaticPages::new(vec![only]));

        let outcome = engine.run_query_detailed("project = P", &fields()).await.unwrap();

        assert_eq!(
            outcome.warnings,
            vec![QueryWarning::Truncated { fetched: 1, available: Some(5) }]
        );
    }

    #[tokio::test]
    async fn test_empty_page_without_cursor_does_not_loop() {
        let engine = QueryEngine::new(StaticPages::new(vec![
            page(&["P-1"], Some(false), None),
            page(&[], Some(false), None),
        ]));

        let outcome = engine.run_query_detailed("project = P", &fields()).await.unwrap();

        assert_eq!(outcome.pages, 2);
        assert_eq!(outcome.records.len(), 1);
        assert!(matches!(outcome.warnings[0], QueryWarning::Truncated { fetched: 1, .. }));
    }

    #[tokio::test]
    async fn test_malformed_issue_is_skipped() {
        let mut only = page(&["P-1"], Some(true), None);
        only.issues.push(json!("garbage"));
        let engine = QueryEngine::new(StaticPages::new(vec![only]));

        let outcome = engine.run_query_detailed("project = P", &fields()).await.unwrap();

        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.warnings, vec![QueryWarning::SkippedIssue { page: 1, index: 1 }]);
    }

    #[tokio::test]
    async fn test_concurrent_queries_share_nothing() {
        let a = QueryEngine::new(StaticPages::new(vec![page(&["A-1"], Some(true), None)]));
        let b = QueryEngine::new(StaticPages::new(vec![page(&["B-1"], Some(true), None)]));
        let fields = fields();

        let (ra, rb) = tokio::join!(a.run_query("project = A", &fields), b.run_query("project = B", &fields));

        assert_eq!(keys(&ra.unwrap()), vec!["A-1"]);
        assert_eq!(keys(&rb.unwrap()), vec!["B-1"]);
    }
}
