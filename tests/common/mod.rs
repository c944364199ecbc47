//! Shared test utilities for logrelay integration harnesses.
//!
//! Import everything you need via `mod common; use common::*;` at the top of
//! each harness file. Time-dependent helpers work with
//! `#[tokio::test(start_paused = true)]`.

pub mod assertions;
pub mod builders;
pub mod fakes;
pub mod ws;

pub use assertions::*;
pub use builders::*;
pub use fakes::*;
pub use ws::*;
