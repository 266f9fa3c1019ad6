//! Core type definitions for the agent sandbox.
//!
//! Broken down into submodules: sandbox lifecycle, command execution and
//! tool-call safety.

pub mod exec;
pub mod sandbox;
pub mod tool;

pub use exec::*;
pub use sandbox::*;
pub use tool::*;
