//! Shared protocol definitions for the `Taskboard` backend wire format
//! and the consumer-facing event channel.

pub mod codec;
pub mod event;
pub mod task;
