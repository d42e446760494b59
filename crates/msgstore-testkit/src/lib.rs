//! # msgstore Testkit
//!
//! Testing utilities for msgstore.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a memory-backed database with a fixed telephony context
//! - **Generators**: Proptest strategies for messages, operation sequences,
//!   and filters
//! - **Reference model**: a naive in-memory mirror that recomputes thread
//!   rollups and list results from scratch
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use msgstore_testkit::generators::{filter, ops};
//!
//! proptest! {
//!     #[test]
//!     fn lists_match_the_model(ops in ops(20), filter in filter()) {
//!         // replay `ops` on a TestFixture and a ReferenceModel, then
//!         // compare the list for `filter` with `model.matching(&filter, false)`
//!     }
//! }
//! ```
//!
//! ## Test Fixtures
//!
//! ```rust,no_run
//! use msgstore_testkit::fixtures::TestFixture;
//!
//! async fn example() -> msgstore::Result<()> {
//!     let fixture = TestFixture::new();
//!     let id = fixture.receive("+1555", "hello", 100).await?;
//!     let all = fixture.collect_ids(msgstore::MessageFilter::new(), false).await?;
//!     assert_eq!(all, vec![id]);
//!     Ok(())
//! }
//! ```

pub mod fixtures;
pub mod generators;
pub mod model;

pub use fixtures::{TestFixture, OWN_NUMBER};
pub use generators::Op;
pub use model::{ExpectedThread, ReferenceModel};
