//! Utility crate for the metabase object-storage metadata engine:
//! error taxonomy, core data primitives, configuration, and time helpers.
//!
//! Plays the same role in this workspace that `garage_util` plays in
//! Garage: every other crate depends on it and nothing else.

#[macro_use]
extern crate tracing;

pub mod config;
pub mod data;
pub mod error;
pub mod time;

pub use error::{Error, Result};
