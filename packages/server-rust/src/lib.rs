//! Crossbar Server — HTTP and in-process pub/sub transports over the
//! crossbar dispatch engine, plus lifecycle, configuration, and the demo
//! `hello` operation.

pub mod bus;
pub mod demo;
pub mod network;

pub use bus::{Bus, BusListener};
pub use network::{ServerConfig, ServerModule, ShutdownController, TlsConfig};
