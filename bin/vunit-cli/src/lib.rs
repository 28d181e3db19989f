//! Collaborators and commands of the `vunit` CLI.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]

/// Argument groups and concrete collaborators shared by the commands
pub mod common;
/// Offline bytecode composition
pub mod compose;
/// Interactive session over stdin/stdout
pub mod session;

mod cmd;
pub use cmd::*;
