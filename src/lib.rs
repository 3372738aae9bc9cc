//! searchlab - small full-text search applications built on
//! [Tantivy](https://github.com/quickwit-oss/tantivy).
//!
//! Three independent programs share one index layer:
//!
//! - [`lines`] indexes every line of a directory of text files into an
//!   on-disk index and runs keyword, wildcard and line-number searches.
//! - [`symbols`] parses Rust sources, indexes the items they declare in
//!   memory and searches them by name or module path.
//! - [`timezones`] indexes the IANA time zone catalog with facets, and
//!   [`server`] exposes it over HTTP.
//!
//! # Quick start
//!
//! ```no_run
//! use searchlab::timezones::{SearchRequest, TimeZoneSearchSystem};
//!
//! let system = TimeZoneSearchSystem::init().unwrap();
//! let results = system.search(&SearchRequest::new("chicago")).unwrap();
//! for hit in &results.hits {
//!     println!("{} ({})", hit.display_name, hit.offset);
//! }
//! ```

pub mod data_dir;
pub mod error;
pub mod lines;
pub mod query;
pub mod server;
pub mod symbols;
pub mod tantivy_index;
pub mod timezones;
pub mod walker;

pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use tantivy_index::SearchIndex;
