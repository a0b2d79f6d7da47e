//! ui
//!
//! User interaction utilities.
//!
//! # Modules
//!
//! - [`output`] - Output formatting and display
//!
//! # Design
//!
//! All user-facing messages go through this module so `--quiet` and
//! `--debug` behave the same in every command. Library diagnostics use
//! `tracing` instead.

pub mod output;
