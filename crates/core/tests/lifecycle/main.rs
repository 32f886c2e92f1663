//! Lifecycle integration tests for virtrun-core.
//!
//! Every scenario drives a real [`ExecutionPipeline`](virtrun_core::ExecutionPipeline)
//! against an on-disk environment in a temporary directory, with mock
//! collaborators that record what was called and in which order.
//!
//! # Test Structure
//!
//! - `helpers/` -- counting store, recording env process, mock resources
//! - `scenarios/` -- one file per lifecycle concern
//!
//! # Running
//!
//! ```bash
//! cargo test -p virtrun-core --test lifecycle
//! ```

mod scenarios;
