//! Sparse, on-demand row cache for virtualized data grids
//!
//! A grid showing a table of unbounded length only needs the rows on screen.
//! This crate loads such a table in fixed-size batches as the visible range
//! moves, keeps what it loaded, and never requests the same batch twice.
//!
//! - [`source`]: where rows come from ([`RowSource`], [`HttpRowSource`],
//!   [`MemoryRowSource`]) and the NDJSON stream format.
//! - [`cache`]: the sparse, index-addressed row store and batch arithmetic.
//! - [`fetch`]: deduplicated, cancellable batch requests with retry.
//! - [`viewport`]: visible range plus overscan to batch requests.
//! - [`session`]: [`TableSession`], tying the above together per table.
//! - [`registry`]: [`SessionRegistry`], one session per open table.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use rowcache_lib::{HttpRowSource, SessionConfig, SessionRegistry};
//!
//! # async fn example() -> Result<(), rowcache_lib::Error> {
//! let source = HttpRowSource::builder()
//!     .url("http://localhost:3000")
//!     .project("demo")
//!     .build()?;
//! let registry = SessionRegistry::new(Arc::new(source), SessionConfig::default());
//!
//! let session = registry.open("orders").await?;
//! session.set_visible_range(0, 40);
//!
//! let mut changes = session.subscribe();
//! while changes.changed().await.is_ok() {
//!     let state = session.load_state();
//!     println!("{}/{} rows", state.loaded_rows, state.total);
//!     if state.in_flight.is_empty() {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod fetch;
pub mod model;
pub mod registry;
pub mod selection;
pub mod session;
pub mod source;
pub mod viewport;

pub use cache::BatchLayout;
pub use cache::BatchState;
pub use cache::SparseRowCache;
pub use config::SessionConfig;
pub use error::Error;
pub use error::FieldError;
pub use error::SourceError;
pub use fetch::FetchPlan;
pub use fetch::RetryConfig;
pub use model::CellKind;
pub use model::Column;
pub use model::Row;
pub use model::Value;
pub use registry::SessionRegistry;
pub use selection::ColumnSelection;
pub use session::LoadState;
pub use session::TableSession;
pub use source::HttpRowSource;
pub use source::MemoryRowSource;
pub use source::RowPage;
pub use source::RowSource;
pub use source::StreamMessage;
pub use source::TableId;
pub use viewport::Viewport;
