//! Wire schemas for requests sent to synchronizers.
//!
//! Hand-declared prost messages; field tags are part of the wire contract
//! with deployed synchronizers and must not be renumbered.

/// Request for `assignPipeline` and `revokePipeline`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct PipelineRequest {
    #[prost(string, tag = "1")]
    pub client_id: String,
    #[prost(uint64, tag = "2")]
    pub pipeline_id: u64,
}

/// Request for `registerSubscriber` and `unregisterSubscriber`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct SubscriberRequest {
    #[prost(string, tag = "1")]
    pub subscriber_id: String,
}

/// Reply shared by every synchronizer method.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Reply {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub reason: String,
}

impl Reply {
    pub fn ok() -> Self {
        Self {
            success: true,
            reason: String::new(),
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            reason: reason.into(),
        }
    }
}

/// Envelope used by the gRPC binding: one unary method carries every call.
#[derive(Clone, PartialEq, prost::Message)]
pub struct CallRequest {
    #[prost(string, tag = "1")]
    pub method: String,
    #[prost(bytes = "vec", tag = "2")]
    pub payload: Vec<u8>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CallReply {
    #[prost(bytes = "vec", tag = "1")]
    pub payload: Vec<u8>,
}
