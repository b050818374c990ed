//! Chat domain services

pub(crate) mod access;
pub mod broadcaster;
pub mod directory;
pub mod error;
pub mod events;
pub mod message_log;
pub mod models;
pub mod participants;
pub mod read_tracker;
pub mod traits;
