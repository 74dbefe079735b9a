//! Viewer-facing queries: filters, distinct mode, sorting and paging.

use super::predicate::{Predicate, SortColumn, SortDirection, SortSpec};
use crate::error::Result;
use crate::store::LogTable;
use crate::types::LogRecord;
use serde::{Deserialize, Serialize};

/// Rows per page when the viewer does not ask for a size.
pub const DEFAULT_PAGE_SIZE: usize = 42;

/// Everything a viewer can ask for when browsing the log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ViewQuery {
    /// Case-insensitive substring of the message. Empty means no constraint.
    pub message_filter: Option<String>,
    /// Case-insensitive substring of the sender. Empty means no constraint.
    pub sender_filter: Option<String>,
    /// Only the latest record(s) per source address.
    pub distinct: bool,
    pub sort: SortSpec,
    pub offset: usize,
    pub limit: usize,
}

impl Default for ViewQuery {
    fn default() -> Self {
        Self {
            message_filter: None,
            sender_filter: None,
            distinct: false,
            sort: SortSpec::default(),
            offset: 0,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl ViewQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn message_filter(mut self, filter: impl Into<String>) -> Self {
        self.message_filter = Some(filter.into());
        self
    }

    pub fn sender_filter(mut self, filter: impl Into<String>) -> Self {
        self.sender_filter = Some(filter.into());
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn sort_by(mut self, column: SortColumn, direction: SortDirection) -> Self {
        self.sort = SortSpec::new(column, direction);
        self
    }

    pub fn page(mut self, offset: usize, limit: usize) -> Self {
        self.offset = offset;
        self.limit = limit;
        self
    }

    /// The store predicate this query stands for.
    pub fn predicate(&self) -> Predicate {
        let mut predicate = Predicate::All;

        if let Some(filter) = non_empty(&self.message_filter) {
            predicate = predicate.and(Predicate::message_contains(filter));
        }
        if let Some(filter) = non_empty(&self.sender_filter) {
            predicate = predicate.and(Predicate::sender_contains(filter));
        }
        if self.distinct {
            predicate = predicate.latest_per_source();
        }

        predicate
    }
}

fn non_empty(filter: &Option<String>) -> Option<&str> {
    filter.as_deref().filter(|f| !f.is_empty())
}

/// One page of a view.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    pub records: Vec<LogRecord>,
    /// Size of the whole filtered set, before paging.
    pub total_count: usize,
    pub offset: usize,
}

impl LogPage {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Run `query` against `table`.
pub fn build_view(table: &dyn LogTable, query: &ViewQuery) -> Result<LogPage> {
    table.query(&query.predicate(), query.sort, query.offset, Some(query.limit))
}

/// Column caption showing the active filter, e.g. `Sender : pico`.
pub fn filter_title(label: &str, filter: Option<&str>) -> String {
    match filter {
        Some(f) if !f.is_empty() => format!("{label} : {f}"),
        _ => label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_query_is_unconstrained() {
        assert_eq!(ViewQuery::new().predicate(), Predicate::All);
        assert_eq!(
            ViewQuery::new().message_filter("").sender_filter("").predicate(),
            Predicate::All
        );
    }

    #[test]
    fn test_filters_and_together() {
        let query = ViewQuery::new().message_filter("Pump").sender_filter("Boiler");
        assert_eq!(
            query.predicate(),
            Predicate::And(
                Box::new(Predicate::MessageContains("pump".into())),
                Box::new(Predicate::SenderContains("boiler".into())),
            )
        );
    }

    #[test]
    fn test_distinct_wraps_filters() {
        let query = ViewQuery::new().message_filter("temp").distinct(true);
        assert_eq!(
            query.predicate(),
            Predicate::LatestPerSource(Box::new(Predicate::MessageContains("temp".into())))
        );
    }

    #[test]
    fn test_filter_title() {
        assert_eq!(filter_title("Sender", Some("pico")), "Sender : pico");
        assert_eq!(filter_title("Sender", Some("")), "Sender");
        assert_eq!(filter_title("Message", None), "Message");
    }

    #[test]
    fn test_query_from_json_uses_defaults() {
        let query: ViewQuery = serde_json::from_str(r#"{"distinct": true}"#).unwrap();
        assert!(query.distinct);
        assert_eq!(query.limit, DEFAULT_PAGE_SIZE);
        assert_eq!(query.sort, SortSpec::default());
    }

    #[test]
    fn test_unknown_sort_column_falls_back() {
        let query: ViewQuery = serde_json::from_str(
            r#"{"sort": {"column": "bogus", "direction": "ascending"}}"#,
        )
        .unwrap();
        assert_eq!(query.sort, SortSpec::default());
    }

    #[test]
    fn test_sort_from_json_is_case_insensitive() {
        let query: ViewQuery =
            serde_json::from_str(r#"{"sort": {"column": "IpAdress", "direction": "DESC"}}"#)
                .unwrap();
        assert_eq!(
            query.sort,
            SortSpec::new(SortColumn::SourceAddress, SortDirection::Descending)
        );

        let query: ViewQuery = serde_json::from_str(r#"{"sort": {"column": "sender"}}"#).unwrap();
        assert_eq!(
            query.sort,
            SortSpec::new(SortColumn::Sender, SortDirection::Ascending)
        );
    }

    #[test]
    fn test_query_survives_json_round_trip() {
        let query = ViewQuery::new()
            .sender_filter("pico")
            .sort_by(SortColumn::LogType, SortDirection::Descending)
            .page(42, 10);
        let json = serde_json::to_string(&query).unwrap();
        assert_eq!(serde_json::from_str::<ViewQuery>(&json).unwrap(), query);
    }
}
