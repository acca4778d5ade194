//! Bridge between the input loop and the async backend worker.

pub mod commands;
pub mod runtime;
