pub mod app;
pub mod cli;
pub mod config;
pub mod downloader;
pub mod preferences;

pub use app::run;
