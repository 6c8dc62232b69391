// Configuration (TOML file + environment)
pub mod config;

// Error taxonomy shared by every component
pub mod error;

// Vehicle identity, readings and snapshots
pub mod vehicle;

// TeslaMate database access and snapshot reader
pub mod store;

// MQTT client integration
pub mod mqtt;

// Home Assistant discovery
pub mod discovery;

// Last-published cache and state publishing
pub mod state;

// Inbound commands and upstream APIs
pub mod command;

// Polling scheduler
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;
