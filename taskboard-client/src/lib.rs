//! Consumer-side core for a `Taskboard` gateway.
//!
//! Keeps a local mirror of one board and reconciles three input streams
//! through a single ordered processing path: optimistic local edits,
//! authoritative gateway responses, and board events pushed over a
//! WebSocket. A reconnect supervisor re-establishes the event stream with
//! exponential backoff and resyncs the mirror after every reconnect.

pub mod api;
pub mod board;
pub mod client;
pub mod reconnect;
pub mod subscription;
