//! Centralized constants for the quotient project.
//!
//! All project-wide constant values live here.
//! Change a value in one place and it applies everywhere.

pub mod meta;
pub mod state;
