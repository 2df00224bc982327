//! Synchronizer registry and remote-call wrappers.
//!
//! - [`Synchronizer`]: value object plus its durable JSON record
//! - [`SynchronizerClient`]: typed calls (`assignPipeline`, `revokePipeline`,
//!   `registerSubscriber`, `unregisterSubscriber`) over a [`Transport`](crate::transport::Transport)
//! - [`SynchronizerManager`]: join/leave, boot recovery, load queries

pub mod client;
pub mod manager;
pub mod record;

pub use client::SynchronizerClient;
pub use manager::{SynchronizerManager, SYNCHRONIZER_COLUMN};
pub use record::Synchronizer;
