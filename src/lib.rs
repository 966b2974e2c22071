//! flatq: a SQL query engine for delimited text files.
//!
//! Files (CSV, TSV, fixed-width, LTSV, JSON) are materialized as in-memory
//! [`view::View`]s; SQL statements run relational operators over them in
//! written order, and DML buffers changes in the view cache until COMMIT
//! re-encodes and atomically rewrites the files that actually changed.
//!
//! The typical embedding:
//!
//! ```no_run
//! use flatq::config::SessionFlags;
//! use flatq::session::Session;
//!
//! let session = Session::new(SessionFlags::default()).unwrap();
//! let code = flatq::driver::run_program(&session, "SELECT b, a FROM t;").unwrap();
//! for result in flatq::driver::take_results(&session) {
//!     println!("{}", result.log);
//! }
//! assert_eq!(code, 0);
//! ```

pub mod cache;
pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod eval;
pub mod file;
pub mod format;
pub mod parallel;
pub mod record;
pub mod session;
pub mod sql;
pub mod transaction;
pub mod value;
pub mod view;

pub use error::FlatqError;
