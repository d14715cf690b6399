//! Shared helpers for the hbnb workspace binaries and crates.

pub mod utils;
