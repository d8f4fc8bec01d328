pub mod address;
pub mod address_parser;
pub mod audit;
pub mod config;
pub mod context;
pub mod controller;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod message;
pub mod mime;
pub mod status;
pub mod traits;

pub use domain::Domain;
pub use tracing;

/// Broadcast on the shared shutdown channel: `Shutdown` asks every listener/session to wind
/// down; `Finalised` is sent once they have.
#[derive(Debug, Clone, Copy)]
pub enum Signal {
    Shutdown,
    Finalised,
}
