// Per-client token-bucket admission control
pub mod rate_limit;

// Configuration loading
pub mod config;

// HTTP dispatch layer
pub mod api;
