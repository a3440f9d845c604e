//! rsjobs: expands parameterized templates into concrete items.
//!
//! Layers, innermost first:
//! - [`domain`]: value model, formatter, matrix axes and parameter resolution
//! - [`application`]: project loading and template instantiation services
//! - [`infrastructure`]: I/O traits and service wiring
//! - [`cli`]: argument parsing and command dispatch

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
