//! Paginated query layer
//!
//! Reads a finalized store with the index-then-fetch pattern:
//!
//! - **criteria**: sort specs, filters, record kinds and `Page<T>`
//! - **executor**: `ReportQuery`, list and lookup operations
//! - **error**: Error types
//!
//! # Examples
//!
//! ```rust,ignore
//! use scanstore::query::{Filter, ListOptions, ReportQuery, SortSpec};
//!
//! let query = ReportQuery::new(store);
//!
//! // Most critical failures on one path, 20 per page
//! let options = ListOptions::default()
//!     .sorted(SortSpec::desc("criticality"))
//!     .filter(Filter::parse("path=/pets/{id}")?);
//! let page = query.get_tests(0, 20, &options).await?;
//!
//! println!("page {} of {} ({} tests)", page.current + 1, page.pages, page.total);
//! ```

mod criteria;
mod error;
mod executor;

pub use criteria::{dictionary_for, Filter, FilterValue, Operator, Page, RecordKind, SortSpec};
pub use error::{QueryError, QueryResult};
pub use executor::{HappyPathView, ListOptions, OperationView, ReportQuery, TestView};
