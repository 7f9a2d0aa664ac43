pub mod browser;
pub mod config;
pub mod crawler;
pub mod links;
pub mod media;
pub mod persist;
pub mod pipeline;
pub mod report;
pub mod result;
pub mod setup;
pub mod versions;
pub mod webpage;
