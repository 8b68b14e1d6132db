//! CLI command implementations

pub mod common;
pub mod engage;
pub mod feed;
pub mod post;
