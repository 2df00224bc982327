//! Request/reply transport to synchronizer nodes.
//!
//! The coordinator only needs one primitive: send an encoded request to a
//! named synchronizer and wait for an encoded reply or a timeout.
//! [`SynchronizerClient`](crate::synchronizer::SynchronizerClient) builds the
//! typed calls on top of it.
//!
//! - [`GrpcTransport`]: production binding over tonic channels
//! - anything else implementing [`Transport`] (tests use scripted fakes)

pub mod grpc;
pub mod messages;

use std::time::Duration;

use crate::error::Result;

pub use grpc::GrpcTransport;

pub const METHOD_ASSIGN_PIPELINE: &str = "assignPipeline";
pub const METHOD_REVOKE_PIPELINE: &str = "revokePipeline";
pub const METHOD_REGISTER_SUBSCRIBER: &str = "registerSubscriber";
pub const METHOD_UNREGISTER_SUBSCRIBER: &str = "unregisterSubscriber";

#[tonic::async_trait]
pub trait Transport: Send + Sync {
    /// Deliver `payload` to `method` on synchronizer `target`.
    ///
    /// Implementations must return [`ControllerError::Timeout`](crate::error::ControllerError::Timeout)
    /// once `timeout` elapses; callers treat it like any other remote failure.
    async fn call(
        &self,
        target: &str,
        method: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>>;
}
