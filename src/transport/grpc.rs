use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::Mutex;
use tonic::client::Grpc;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};
use tonic::Code;

use crate::error::{ControllerError, Result};
use crate::transport::messages::{CallReply, CallRequest};
use crate::transport::Transport;

/// Unary method every synchronizer serves; the envelope names the real method.
const CALL_PATH: &str = "/gravity.synchronizer.Synchronizer/Call";

/// [`Transport`] that reaches synchronizers over gRPC.
///
/// Synchronizer IDs are turned into endpoints with a template such as
/// `http://{id}:7100`, which fits deployments where the ID is a resolvable
/// pod or host name. Channels are created lazily and pooled per target.
pub struct GrpcTransport {
    endpoint_template: String,
    connect_timeout: Duration,
    channels: Mutex<HashMap<String, Channel>>,
}

impl GrpcTransport {
    pub fn new(endpoint_template: impl Into<String>) -> Self {
        Self {
            endpoint_template: endpoint_template.into(),
            connect_timeout: Duration::from_secs(5),
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn endpoint_for(&self, target: &str) -> String {
        self.endpoint_template.replace("{id}", target)
    }

    async fn channel(&self, target: &str) -> Result<Channel> {
        let mut channels = self.channels.lock().await;
        if let Some(channel) = channels.get(target) {
            return Ok(channel.clone());
        }

        let addr = self.endpoint_for(target);
        let endpoint = Endpoint::from_shared(addr.clone())
            .map_err(|e| ControllerError::Transport(format!("invalid endpoint {}: {}", addr, e)))?
            .connect_timeout(self.connect_timeout);
        let channel = endpoint.connect_lazy();

        tracing::debug!(synchronizer_id = target, addr = %addr, "Created synchronizer channel");
        channels.insert(target.to_string(), channel.clone());
        Ok(channel)
    }
}

#[tonic::async_trait]
impl Transport for GrpcTransport {
    async fn call(
        &self,
        target: &str,
        method: &str,
        payload: Vec<u8>,
        timeout: Duration,
    ) -> Result<Vec<u8>> {
        let channel = self.channel(target).await?;
        let envelope = CallRequest {
            method: method.to_string(),
            payload,
        };

        let exchange = async move {
            let mut grpc = Grpc::new(channel);
            grpc.ready()
                .await
                .map_err(|e| tonic::Status::unavailable(format!("synchronizer not ready: {}", e)))?;

            let mut request = tonic::Request::new(envelope);
            request.set_timeout(timeout);

            let codec: ProstCodec<CallRequest, CallReply> = ProstCodec::default();
            let response = grpc
                .unary(request, PathAndQuery::from_static(CALL_PATH), codec)
                .await?;
            Ok::<Vec<u8>, tonic::Status>(response.into_inner().payload)
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(status)) if status.code() == Code::DeadlineExceeded => {
                Err(ControllerError::Timeout {
                    synchronizer: target.to_string(),
                    method: method.to_string(),
                })
            }
            Ok(Err(status)) => Err(ControllerError::Transport(format!(
                "{} on {}: {}",
                method,
                target,
                status.message()
            ))),
            Err(_) => Err(ControllerError::Timeout {
                synchronizer: target.to_string(),
                method: method.to_string(),
            }),
        }
    }
}
