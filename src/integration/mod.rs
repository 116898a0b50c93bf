//! Integration layer: client configuration shared by every component

pub mod config;

pub use config::ClientConfig;
