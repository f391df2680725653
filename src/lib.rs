pub mod cache;
pub mod cargo_index;
pub mod client;
pub mod config;
pub mod credential;
pub mod dispatch;
pub mod error;
pub mod glob;
pub mod http_types;
pub mod rewrite;
pub mod time_util;
