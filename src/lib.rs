//! SOS Alert Library
//!
//! Core modules for the SOS Alert personal safety server.

pub mod audit;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod location;
pub mod provider;
pub mod server;
pub mod session;
pub mod settings;
pub mod siren;
pub mod state;
pub mod voice;
