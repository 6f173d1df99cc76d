//! Route and rewrite kernel of the database mesh.
//!
//! A parsed statement is bound into a [`SQLStatementContext`](sql::analyse::SQLStatementContext),
//! routed by the rule engines into a [`RouteContext`](sql::route::RouteContext) and
//! rewritten into one SQL text and parameter list per route unit.

#[macro_use]
extern crate bitflags;
#[macro_use]
extern crate lazy_static;

pub mod kernel;
pub mod metadata;
pub mod rule;
pub mod sql;

#[cfg(test)]
pub(crate) mod fixtures;

pub use kernel::{ExecutionContext, ExecutionUnit, QueryContext, SQLKernel};
