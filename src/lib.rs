#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod cli;
pub mod comments;
pub mod config;
pub mod data;
pub mod feed;
pub mod logging;
pub mod model;
pub mod player;
pub mod profile;
pub mod session;
pub mod storage;
pub mod task;
pub mod ui;
pub mod upload;
pub mod validate;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
