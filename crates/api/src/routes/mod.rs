//! Route tree.
//!
//! ```text
//! GET    /health           health (ws flag, queue depth)
//! POST   /run              submit a workflow
//! GET    /status/{id}      poll a job
//! ```

pub mod health;
pub mod jobs;
