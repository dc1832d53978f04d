//! Expression engine for computed metrics.
//!
//! Configuration can define metrics whose value is derived from one or more
//! raw collector values, e.g.
//!
//! ```text
//! 100 - average(time_total.core@.mode@idle)
//! ```
//!
//! An expression string is compiled once at configuration-load time into an
//! [`Expression`], which caches the list of free variables it references.
//! Each scrape binds those variables to raw values (scalars or per-instance
//! sequences) and evaluates to a single number.
//!
//! Variable identifiers follow the dotted variable-name form decoded by
//! `hostex_core::varname`, so `.` and `@` are identifier characters here.
#![deny(missing_docs)]

mod error;
pub use self::error::ExpressionError;

mod expr;
pub use self::expr::{Bindings, Expression};

mod functions;
pub use self::functions::Function;

mod parser;
