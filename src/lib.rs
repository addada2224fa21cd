pub mod cache;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod geometry;
pub mod jobs;
pub mod metadata;
pub mod models;
pub mod pipeline;
pub mod runner;
pub mod server;
pub mod service;

// Main entry point
pub mod cli_main;

// Re-export commonly used items
pub use error::{Result, SliceMapError};
pub use fingerprint::{compute_fingerprint, Fingerprint};
pub use service::{MapParameters, RequestService};
