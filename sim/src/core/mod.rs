//! Deterministic, pure logic shared by the simulation runner.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod heuristics;
pub mod message;
pub mod replay;
pub mod response;
pub mod routing;
pub mod state;
pub mod transcript;
pub mod types;
