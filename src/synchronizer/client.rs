use std::sync::Arc;
use std::time::Duration;

use prost::Message;

use crate::error::{ControllerError, Result};
use crate::transport::messages::{PipelineRequest, Reply, SubscriberRequest};
use crate::transport::{
    Transport, METHOD_ASSIGN_PIPELINE, METHOD_REGISTER_SUBSCRIBER, METHOD_REVOKE_PIPELINE,
    METHOD_UNREGISTER_SUBSCRIBER,
};

/// Remote-call wrapper for one synchronizer.
///
/// Every call is a single request/reply round trip. A transport error, a
/// timeout, an undecodable reply and `success = false` all come back as
/// errors; none of them touch coordinator state.
#[derive(Clone)]
pub struct SynchronizerClient {
    id: String,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl SynchronizerClient {
    pub fn new(id: impl Into<String>, transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            transport,
            timeout,
        }
    }

    pub async fn assign_pipeline(&self, pipeline_id: u64) -> Result<()> {
        let request = PipelineRequest {
            client_id: self.id.clone(),
            pipeline_id,
        };
        self.request(METHOD_ASSIGN_PIPELINE, &request).await
    }

    pub async fn revoke_pipeline(&self, pipeline_id: u64) -> Result<()> {
        let request = PipelineRequest {
            client_id: self.id.clone(),
            pipeline_id,
        };
        self.request(METHOD_REVOKE_PIPELINE, &request).await
    }

    pub async fn register_subscriber(&self, subscriber_id: &str) -> Result<()> {
        let request = SubscriberRequest {
            subscriber_id: subscriber_id.to_string(),
        };
        self.request(METHOD_REGISTER_SUBSCRIBER, &request).await
    }

    pub async fn unregister_subscriber(&self, subscriber_id: &str) -> Result<()> {
        let request = SubscriberRequest {
            subscriber_id: subscriber_id.to_string(),
        };
        self.request(METHOD_UNREGISTER_SUBSCRIBER, &request).await
    }

    async fn request<M: Message>(&self, method: &str, request: &M) -> Result<()> {
        let data = self
            .transport
            .call(&self.id, method, request.encode_to_vec(), self.timeout)
            .await?;

        let reply = Reply::decode(data.as_slice())?;
        if !reply.success {
            return Err(ControllerError::RemoteFailure {
                synchronizer: self.id.clone(),
                method: method.to_string(),
                reason: reply.reason,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records the last call and answers with a fixed reply.
    struct StaticTransport {
        reply: Result<Reply>,
        last_call: Mutex<Option<(String, String, Vec<u8>)>>,
    }

    impl StaticTransport {
        fn replying(reply: Reply) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply),
                last_call: Mutex::new(None),
            })
        }

        fn timing_out() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(ControllerError::Timeout {
                    synchronizer: "node-a".into(),
                    method: "assignPipeline".into(),
                }),
                last_call: Mutex::new(None),
            })
        }
    }

    #[tonic::async_trait]
    impl Transport for StaticTransport {
        async fn call(
            &self,
            target: &str,
            method: &str,
            payload: Vec<u8>,
            _timeout: Duration,
        ) -> Result<Vec<u8>> {
            *self.last_call.lock().unwrap() = Some((target.into(), method.into(), payload));
            match &self.reply {
                Ok(reply) => Ok(reply.encode_to_vec()),
                Err(_) => Err(ControllerError::Timeout {
                    synchronizer: target.into(),
                    method: method.into(),
                }),
            }
        }
    }

    fn client(transport: Arc<StaticTransport>) -> SynchronizerClient {
        SynchronizerClient::new("node-a", transport, Duration::from_secs(1))
    }

    #[tokio::test]
    async fn assign_sends_client_and_pipeline_id() {
        let transport = StaticTransport::replying(Reply::ok());
        client(transport.clone()).assign_pipeline(9).await.unwrap();

        let (target, method, payload) = transport.last_call.lock().unwrap().clone().unwrap();
        assert_eq!(target, "node-a");
        assert_eq!(method, METHOD_ASSIGN_PIPELINE);
        let req = PipelineRequest::decode(payload.as_slice()).unwrap();
        assert_eq!(req.client_id, "node-a");
        assert_eq!(req.pipeline_id, 9);
    }

    #[tokio::test]
    async fn rejected_reply_is_remote_failure() {
        let transport = StaticTransport::replying(Reply::rejected("busy"));
        let err = client(transport).revoke_pipeline(1).await.unwrap_err();
        match err {
            ControllerError::RemoteFailure { method, reason, .. } => {
                assert_eq!(method, METHOD_REVOKE_PIPELINE);
                assert_eq!(reason, "busy");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_propagates() {
        let err = client(StaticTransport::timing_out())
            .assign_pipeline(1)
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::Timeout { .. }));
    }

    #[tokio::test]
    async fn subscriber_calls_use_subscriber_schema() {
        let transport = StaticTransport::replying(Reply::ok());
        let c = client(transport.clone());

        c.register_subscriber("sub-1").await.unwrap();
        let (_, method, payload) = transport.last_call.lock().unwrap().clone().unwrap();
        assert_eq!(method, METHOD_REGISTER_SUBSCRIBER);
        assert_eq!(
            SubscriberRequest::decode(payload.as_slice())
                .unwrap()
                .subscriber_id,
            "sub-1"
        );

        c.unregister_subscriber("sub-1").await.unwrap();
        let (_, method, _) = transport.last_call.lock().unwrap().clone().unwrap();
        assert_eq!(method, METHOD_UNREGISTER_SUBSCRIBER);
    }
}
