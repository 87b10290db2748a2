//! Persona simulation engine.
//!
//! A run presents a sequence of product stimuli to a roster of synthetic
//! personas, collects schema-validated responses, evolves each persona's trust
//! state turn by turn and finishes with an evaluation report. The architecture
//! keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (domain types, trust heuristics,
//!   routing, run-state snapshots, transcript replay). No I/O.
//! - **[`io`]**: Side-effecting collaborators (config, prompts, model process,
//!   structured output validation, persistence). Isolated behind traits so
//!   tests can script them.
//!
//! Orchestration modules ([`turn`], [`machine`], [`service`]) coordinate core
//! logic with I/O to implement the CLI commands.

pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod machine;
pub mod service;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod turn;
