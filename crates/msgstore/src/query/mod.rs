//! Message list queries.
//!
//! [`plan`] turns a filter into index streams, [`cursor`] pages through
//! them, and [`merge`] combines the streams into the result order, using
//! the frontier logic in [`intersect`].

mod cursor;
mod intersect;
mod merge;
mod plan;

pub(crate) use cursor::run;
pub(crate) use merge::QueryState;
pub(crate) use plan::{QueryPlan, SourceId};

#[cfg(test)]
pub(crate) use plan::Part;
