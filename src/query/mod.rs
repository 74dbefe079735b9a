//! Query engine for browsing stored records.
//!
//! A [`ViewQuery`] describes what a viewer wants to see. It is lowered to a
//! [`Predicate`] plus [`SortSpec`] and handed to the store, which evaluates
//! it in one pass over a consistent snapshot and returns the page together
//! with the size of the whole filtered set.
//!
//! # Example
//!
//! ```ignore
//! let page = build_view(&store, &ViewQuery::new().sender_filter("pico").distinct(true))?;
//! println!("showing {} of {}", page.len(), page.total_count);
//! ```

mod predicate;
mod view;

pub use predicate::{evaluate, Predicate, SortColumn, SortDirection, SortSpec};
pub use view::{build_view, filter_title, LogPage, ViewQuery, DEFAULT_PAGE_SIZE};
