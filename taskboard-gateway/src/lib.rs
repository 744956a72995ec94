//! `Taskboard` gateway library.
//!
//! Mediates between interactive board clients and a replicated two-node
//! task-store backend reachable only over a private binary protocol.
//! Exposes the backend session with sticky primary/standby failover, the
//! mutation gateway, and the real-time event broadcaster with its
//! WebSocket server.

pub mod backend;
pub mod config;
pub mod events;
pub mod failover;
pub mod gateway;
pub mod server;
