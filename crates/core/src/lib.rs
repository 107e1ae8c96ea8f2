//! Domain types for the generation job relay.
//!
//! Holds the [`job::Job`] model with its monotonic status machine, the
//! in-memory [`job_table::JobTable`], and the shared [`error::CoreError`].

pub mod error;
pub mod job;
pub mod job_table;
pub mod types;
