//! Side-effecting collaborators: configuration, prompts, model access and persistence.

pub mod config;
pub mod model;
pub mod process;
pub mod prompt;
pub mod request;
pub mod responder;
pub mod store;
pub mod structured;
