// Allow pre-existing clippy lints across the codebase
#![allow(
    clippy::collapsible_if,
    clippy::too_many_arguments,
    clippy::needless_lifetimes
)]

/// mimalloc for allocation-heavy index builds and binary-search lookups —
/// same rationale the teacher coreutils crate uses it for `sort`/`uniq`.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod common;
pub mod db;
pub mod error;
pub mod format;
pub mod index;
pub mod mergesort;
pub mod path;
pub mod sqlite_schema;

pub use db::{open, CallbackControl, HashDb, HashInfo, LookupMode, LookupOutcome, OpenFlags};
pub use error::{HdbError, HdbResult};
pub use format::HashKind;
