pub mod config;
pub mod controller;
pub mod probe;
pub mod recovery;
pub mod snapshot;
pub mod types;
pub mod uptime;
