//! Predicates and sort orders evaluated inside the store.

use crate::types::{LogRecord, Timestamp};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Row filter understood by every [`LogTable`](crate::LogTable).
///
/// Text predicates hold their needle already lowercased; build them with
/// [`Predicate::message_contains`] and [`Predicate::sender_contains`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// Every record.
    All,
    /// Case-insensitive substring of `message`.
    MessageContains(String),
    /// Case-insensitive substring of `sender`. Records without a sender never match.
    SenderContains(String),
    /// Both sides match.
    And(Box<Predicate>, Box<Predicate>),
    /// Records matching the inner predicate whose `log_date` equals the
    /// greatest `log_date` among matching records with the same
    /// `source_address`. Ties are all kept.
    LatestPerSource(Box<Predicate>),
}

impl Predicate {
    pub fn message_contains(needle: &str) -> Self {
        Predicate::MessageContains(needle.to_lowercase())
    }

    pub fn sender_contains(needle: &str) -> Self {
        Predicate::SenderContains(needle.to_lowercase())
    }

    pub fn and(self, other: Predicate) -> Self {
        match (self, other) {
            (Predicate::All, p) | (p, Predicate::All) => p,
            (a, b) => Predicate::And(Box::new(a), Box::new(b)),
        }
    }

    pub fn latest_per_source(self) -> Self {
        Predicate::LatestPerSource(Box::new(self))
    }

    /// Narrow `rows` to the ones this predicate selects, keeping their order.
    pub fn select<'a>(&self, rows: Vec<&'a LogRecord>) -> Vec<&'a LogRecord> {
        match self {
            Predicate::All => rows,
            Predicate::MessageContains(needle) => rows
                .into_iter()
                .filter(|r| contains_folded(&r.message, needle))
                .collect(),
            Predicate::SenderContains(needle) => rows
                .into_iter()
                .filter(|r| r.sender.as_deref().is_some_and(|s| contains_folded(s, needle)))
                .collect(),
            Predicate::And(a, b) => b.select(a.select(rows)),
            Predicate::LatestPerSource(inner) => {
                let matching = inner.select(rows);

                let mut latest: HashMap<&str, Timestamp> = HashMap::new();
                for r in &matching {
                    latest
                        .entry(r.source_address.as_str())
                        .and_modify(|max| *max = (*max).max(r.log_date))
                        .or_insert(r.log_date);
                }

                matching
                    .into_iter()
                    .filter(|r| latest.get(r.source_address.as_str()) == Some(&r.log_date))
                    .collect()
            }
        }
    }
}

fn contains_folded(haystack: &str, folded_needle: &str) -> bool {
    folded_needle.is_empty() || haystack.to_lowercase().contains(folded_needle)
}

/// Column a view can be sorted by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortColumn {
    #[default]
    LogDate,
    SourceAddress,
    LogType,
    Sender,
    Message,
}

impl SortColumn {
    /// Match a column name case-insensitively. `ipAdress` is an alias for
    /// `sourceAddress`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "logdate" => Some(SortColumn::LogDate),
            "sourceaddress" | "ipadress" => Some(SortColumn::SourceAddress),
            "logtype" => Some(SortColumn::LogType),
            "sender" => Some(SortColumn::Sender),
            "message" => Some(SortColumn::Message),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Some(SortDirection::Ascending),
            "desc" | "descending" => Some(SortDirection::Descending),
            _ => None,
        }
    }
}

/// Single-column sort. Defaults to newest first.
///
/// Deserializes leniently through [`SortSpec::parse`], so unknown names fall
/// back instead of failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "LooseSortSpec")]
pub struct SortSpec {
    pub column: SortColumn,
    pub direction: SortDirection,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            column: SortColumn::LogDate,
            direction: SortDirection::Descending,
        }
    }
}

/// Sort as it arrives from a client: any strings, possibly missing.
#[derive(Deserialize, Default)]
#[serde(default)]
struct LooseSortSpec {
    column: Option<String>,
    direction: Option<String>,
}

impl From<LooseSortSpec> for SortSpec {
    fn from(loose: LooseSortSpec) -> Self {
        SortSpec::parse(loose.column.as_deref(), loose.direction.as_deref())
    }
}

impl SortSpec {
    pub fn new(column: SortColumn, direction: SortDirection) -> Self {
        Self { column, direction }
    }

    /// Build a sort from loosely specified input.
    ///
    /// An unknown or missing column gives the default sort. A known column
    /// with no recognisable direction sorts ascending.
    pub fn parse(column: Option<&str>, direction: Option<&str>) -> Self {
        match column.and_then(SortColumn::parse) {
            Some(column) => Self {
                column,
                direction: direction
                    .and_then(SortDirection::parse)
                    .unwrap_or(SortDirection::Ascending),
            },
            None => Self::default(),
        }
    }

    /// Total order over records: the sort column, then record id, both in
    /// the requested direction.
    pub fn compare(&self, a: &LogRecord, b: &LogRecord) -> Ordering {
        let by_column = match self.column {
            SortColumn::LogDate => a.log_date.cmp(&b.log_date),
            SortColumn::SourceAddress => a.source_address.cmp(&b.source_address),
            SortColumn::LogType => a.log_type.cmp(&b.log_type),
            SortColumn::Sender => a.sender.cmp(&b.sender),
            SortColumn::Message => a.message.cmp(&b.message),
        };
        let ordering = by_column.then(a.id.cmp(&b.id));

        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Filter, sort and slice `rows`. Returns the page and the size of the full
/// filtered set.
pub fn evaluate<'a>(
    rows: impl IntoIterator<Item = &'a LogRecord>,
    predicate: &Predicate,
    sort: SortSpec,
    offset: usize,
    limit: Option<usize>,
) -> (Vec<LogRecord>, usize) {
    let mut matching = predicate.select(rows.into_iter().collect());
    let total = matching.len();

    matching.sort_by(|a, b| sort.compare(a, b));

    let page = matching
        .into_iter()
        .skip(offset)
        .take(limit.unwrap_or(usize::MAX))
        .cloned()
        .collect();

    (page, total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::RecordId;

    fn rec(id: u64, source: &str, date: i64, message: &str, sender: Option<&str>) -> LogRecord {
        LogRecord {
            id: RecordId(id),
            message: message.to_string(),
            log_date: Timestamp(date),
            source_address: source.to_string(),
            sender: sender.map(str::to_string),
            log_type: "Info".to_string(),
        }
    }

    fn ids(records: &[LogRecord]) -> Vec<u64> {
        records.iter().map(|r| r.id.0).collect()
    }

    #[test]
    fn test_text_filters_ignore_case() {
        let rows = vec![
            rec(1, "a", 1, "Pump STARTED", Some("Boiler")),
            rec(2, "a", 2, "pump stopped", None),
            rec(3, "b", 3, "fan started", Some("attic")),
        ];

        let p = Predicate::message_contains("started");
        let (page, total) = evaluate(&rows, &p, SortSpec::default(), 0, None);
        assert_eq!(total, 2);
        assert_eq!(ids(&page), vec![3, 1]);

        let p = Predicate::message_contains("PUMP").and(Predicate::sender_contains("boil"));
        let (page, _) = evaluate(&rows, &p, SortSpec::default(), 0, None);
        assert_eq!(ids(&page), vec![1]);
    }

    #[test]
    fn test_sender_filter_skips_missing_sender() {
        let rows = vec![rec(1, "a", 1, "m", None)];
        let p = Predicate::sender_contains("x");
        assert_eq!(evaluate(&rows, &p, SortSpec::default(), 0, None).1, 0);
    }

    #[test]
    fn test_latest_per_source_keeps_ties() {
        let rows = vec![
            rec(1, "10.0.0.5", 100, "old", None),
            rec(2, "10.0.0.5", 300, "tie-a", None),
            rec(3, "10.0.0.5", 300, "tie-b", None),
            rec(4, "10.0.0.6", 200, "only", None),
        ];

        let p = Predicate::All.latest_per_source();
        let sort = SortSpec::new(SortColumn::LogDate, SortDirection::Ascending);
        let (page, total) = evaluate(&rows, &p, sort, 0, None);
        assert_eq!(total, 3);
        assert_eq!(ids(&page), vec![4, 2, 3]);
    }

    #[test]
    fn test_latest_per_source_uses_filtered_max() {
        let rows = vec![
            rec(1, "10.0.0.5", 100, "temp 20", None),
            rec(2, "10.0.0.5", 200, "door open", None),
        ];

        let p = Predicate::message_contains("temp").latest_per_source();
        let (page, _) = evaluate(&rows, &p, SortSpec::default(), 0, None);
        assert_eq!(ids(&page), vec![1]);
    }

    #[test]
    fn test_sort_parse_defaults() {
        assert_eq!(SortSpec::parse(None, None), SortSpec::default());
        assert_eq!(SortSpec::parse(Some("bogus"), Some("asc")), SortSpec::default());
        assert_eq!(
            SortSpec::parse(Some("SENDER"), Some("desc")),
            SortSpec::new(SortColumn::Sender, SortDirection::Descending)
        );
        assert_eq!(
            SortSpec::parse(Some("message"), None),
            SortSpec::new(SortColumn::Message, SortDirection::Ascending)
        );
    }

    #[test]
    fn test_pagination_slices_after_sort() {
        let rows: Vec<_> = (1..=10).map(|i| rec(i, "a", i as i64, "m", None)).collect();
        let (page, total) = evaluate(&rows, &Predicate::All, SortSpec::default(), 3, Some(4));
        assert_eq!(total, 10);
        assert_eq!(ids(&page), vec![7, 6, 5, 4]);

        let (page, _) = evaluate(&rows, &Predicate::All, SortSpec::default(), 12, Some(4));
        assert!(page.is_empty());
    }
}
