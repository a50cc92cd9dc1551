//! Shared helpers.

pub mod checksum;
pub mod fs;
pub mod http;
