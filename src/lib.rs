pub mod breakdown;
pub mod config;
pub mod criteria;
pub mod output;
pub mod poller;
pub mod preferences;
pub mod provider;
pub mod ranking;
pub mod server;
pub mod types;
