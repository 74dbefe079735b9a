//! The viewer side: something that re-reads the store when told to.

use crate::query::{build_view, LogPage, ViewQuery};
use crate::store::LogTable;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Re-read whatever is on display.
///
/// Called from the subscriber's background thread, so it must not assume
/// any particular thread.
pub trait Refresh: Send + Sync {
    fn refresh(&self);
}

impl<F> Refresh for F
where
    F: Fn() + Send + Sync,
{
    fn refresh(&self) {
        self()
    }
}

/// Holds the page a viewer currently shows and rebuilds it on refresh.
pub struct LogViewer {
    table: Arc<dyn LogTable>,
    query: RwLock<ViewQuery>,
    page: RwLock<Option<LogPage>>,
    refreshes: AtomicU64,
}

impl LogViewer {
    pub fn new(table: Arc<dyn LogTable>, query: ViewQuery) -> Self {
        Self {
            table,
            query: RwLock::new(query),
            page: RwLock::new(None),
            refreshes: AtomicU64::new(0),
        }
    }

    /// The last page successfully read, if any.
    pub fn page(&self) -> Option<LogPage> {
        self.page.read().clone()
    }

    pub fn query(&self) -> ViewQuery {
        self.query.read().clone()
    }

    /// Replace the query and refresh immediately.
    pub fn set_query(&self, query: ViewQuery) {
        *self.query.write() = query;
        self.refresh();
    }

    /// Flip distinct mode and refresh.
    pub fn toggle_distinct(&self) {
        {
            let mut query = self.query.write();
            query.distinct = !query.distinct;
        }
        self.refresh();
    }

    /// Refresh attempts so far, successful or not.
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::SeqCst)
    }
}

impl Refresh for LogViewer {
    fn refresh(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        let query = self.query();

        match build_view(self.table.as_ref(), &query) {
            Ok(page) => {
                debug!(rows = page.len(), total = page.total_count, "viewer refreshed");
                *self.page.write() = Some(page);
            }
            // Keep showing the previous page.
            Err(e) => warn!(error = %e, "viewer refresh failed"),
        }
    }
}
