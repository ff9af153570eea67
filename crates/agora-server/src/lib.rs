//! # agora-server
//!
//! HTTP and WebSocket surface of the debate orchestrator: the participant
//! and observer sockets, the admin REST routes, health and metrics.

#![deny(unsafe_code)]

pub mod admin;
pub mod client;
pub mod config;
pub mod health;
mod observer;
mod participant;
pub mod server;
pub mod shutdown;

pub use config::ServerConfig;
pub use server::{build_router, start, AppState, ServerHandle};
pub use shutdown::ShutdownCoordinator;
