//! Implementations for the service the app needs.
//!

use crate::core::dispatcher::{BacklogStatus, Method};
use crate::core::error::LlmServiceError;
use crate::core::traits::LlmService;
use crate::infrastructure::backend::LlmBackend;
use crate::infrastructure::entities::{
    ChatMetaData, LlmRequestData, LlmResponse, MetaData, ModerationVerdict, ReportUserRequest,
    SearchRequest, ServerRules,
};
use async_trait::async_trait;
use di::{Ref, injectable};
use serde::Serialize;
use serde::de::DeserializeOwned;

const QUERY: &str = "/query";
const SEARCH: &str = "/chat";
const REPORT_USER: &str = "/report_user";
const SET_SERVER_RULES: &str = "/set_server_rules";

/// LLM service that routes every backend call through the shared dispatcher.
#[injectable(LlmService)]
pub struct QueuedLlmService {
    backend: Ref<LlmBackend>,
}

impl QueuedLlmService {
    pub fn with_backend(backend: Ref<LlmBackend>) -> Self {
        Self { backend }
    }

    async fn post<B, R>(&self, address: &'static str, body: &B) -> Result<R, LlmServiceError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let payload = serde_json::to_value(body).map_err(LlmServiceError::Encode)?;
        let pending = self.backend.submit(Method::Post, address, payload).await?;

        // A late reply still completes the task; it is simply dropped.
        let value = match self.backend.reply_timeout() {
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| LlmServiceError::Timeout(limit))??,
            None => pending.await?,
        };

        serde_json::from_value(value).map_err(LlmServiceError::Decode)
    }
}

#[async_trait]
impl LlmService for QueuedLlmService {
    async fn chat(
        &self,
        request: LlmRequestData<ChatMetaData>,
    ) -> Result<LlmResponse, LlmServiceError> {
        self.post(QUERY, &request).await
    }

    async fn query(
        &self,
        request: LlmRequestData<MetaData>,
    ) -> Result<LlmResponse, LlmServiceError> {
        self.post(QUERY, &request).await
    }

    async fn search(&self, request: SearchRequest) -> Result<LlmResponse, LlmServiceError> {
        if request.query.trim().is_empty() {
            return Err(LlmServiceError::InvalidRequest(
                "no query specified".to_owned(),
            ));
        }
        self.post(SEARCH, &request).await
    }

    async fn report_user(
        &self,
        report: ReportUserRequest,
    ) -> Result<ModerationVerdict, LlmServiceError> {
        report.validate().map_err(LlmServiceError::InvalidRequest)?;
        self.post(REPORT_USER, &report).await
    }

    async fn set_server_rules(&self, rules: ServerRules) -> Result<LlmResponse, LlmServiceError> {
        self.post(SET_SERVER_RULES, &rules).await
    }

    fn backlog_status(&self) -> BacklogStatus {
        self.backend.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dispatcher::{BackpressurePolicy, Dispatcher, DispatcherConfig};
    use crate::core::error::{DispatchError, TransportError};
    use crate::core::traits::Transport;
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Records every call and answers from a fixed reply.
    struct Recorder {
        calls: Mutex<Vec<(Method, String, Value)>>,
        reply: Value,
        delay: Duration,
    }

    #[async_trait]
    impl Transport for Recorder {
        async fn execute(
            &self,
            method: Method,
            address: &str,
            payload: &Value,
        ) -> Result<Value, TransportError> {
            self.calls
                .lock()
                .unwrap()
                .push((method, address.to_owned(), payload.clone()));
            tokio::time::sleep(self.delay).await;
            Ok(self.reply.clone())
        }
    }

    fn service(
        reply: Value,
        delay: Duration,
        timeout: Option<Duration>,
    ) -> (QueuedLlmService, Arc<Recorder>) {
        let recorder = Arc::new(Recorder {
            calls: Mutex::new(Vec::new()),
            reply,
            delay,
        });
        let dispatcher = Dispatcher::new(
            recorder.clone(),
            DispatcherConfig {
                capacity: 8,
                policy: BackpressurePolicy::Reject,
            },
        );
        dispatcher.start();

        (
            QueuedLlmService::with_backend(Ref::new(LlmBackend::new(dispatcher, timeout))),
            recorder,
        )
    }

    #[tokio::test]
    async fn test_chat_posts_to_query_endpoint() {
        let (service, recorder) = service(json!({ "message": "hi!" }), Duration::ZERO, None);

        let response = service
            .chat(LlmRequestData::new("hello", ChatMetaData::default()))
            .await
            .unwrap();

        assert_eq!(response.message, "hi!");
        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, Method::Post);
        assert_eq!(calls[0].1, "/query");
        assert_eq!(calls[0].2["query"], "hello");
    }

    #[tokio::test]
    async fn test_search_uses_chat_endpoint() {
        let (service, recorder) = service(json!({ "message": "sunny" }), Duration::ZERO, None);

        service
            .search(SearchRequest {
                query: "weather".to_string(),
                max_iterations: 2,
            })
            .await
            .unwrap();

        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0].1, "/chat");
        assert_eq!(calls[0].2["max_iterations"], 2);
    }

    #[tokio::test]
    async fn test_invalid_report_never_reaches_backend() {
        let (service, recorder) = service(json!({}), Duration::ZERO, None);

        let result = service
            .report_user(ReportUserRequest {
                model: "mistral".to_string(),
                context: "bob: hi".to_string(),
                reason: "spam".to_string(),
                reported_user: "bob".to_string(),
                affected_user: "bob".to_string(),
            })
            .await;

        assert!(matches!(result, Err(LlmServiceError::InvalidRequest(_))));
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unexpected_reply_is_a_decode_error() {
        let (service, _) = service(json!({ "error": "No namespace" }), Duration::ZERO, None);

        let result = service
            .query(LlmRequestData::new("hello", MetaData::default()))
            .await;

        assert!(matches!(result, Err(LlmServiceError::Decode(_))));
    }

    #[tokio::test]
    async fn test_reply_timeout_discards_late_result() {
        let (service, recorder) = service(
            json!({ "message": "too late" }),
            Duration::from_millis(200),
            Some(Duration::from_millis(20)),
        );

        let result = service
            .query(LlmRequestData::new("slow", MetaData::default()))
            .await;
        assert!(matches!(result, Err(LlmServiceError::Timeout(_))));

        // The abandoned task still runs to completion.
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(recorder.calls.lock().unwrap().len(), 1);
        assert_eq!(service.backlog_status().occupancy, 0);
    }

    #[tokio::test]
    async fn test_set_server_rules_posts_rules_document() {
        let (service, recorder) = service(
            json!({ "message": "Rules updated successfully" }),
            Duration::ZERO,
            None,
        );

        let response = service
            .set_server_rules(ServerRules {
                server_id: "1".to_string(),
                rules: "be nice".to_string(),
                namespace: "abcd".to_string(),
                document: "server_rules".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(response.message, "Rules updated successfully");
        let calls = recorder.calls.lock().unwrap();
        assert_eq!(calls[0].1, "/set_server_rules");
        assert_eq!(calls[0].2["serverId"], "1");
    }

    #[tokio::test]
    async fn test_queue_full_surfaces_as_dispatch_error() {
        let recorder = Arc::new(Recorder {
            calls: Mutex::new(Vec::new()),
            reply: json!({ "message": "ok" }),
            delay: Duration::ZERO,
        });
        // Never started, so the single slot stays taken.
        let dispatcher = Dispatcher::new(
            recorder,
            DispatcherConfig {
                capacity: 1,
                policy: BackpressurePolicy::Reject,
            },
        );
        let _occupied = dispatcher
            .submit(Method::Post, "/query", Value::Null)
            .await
            .unwrap();
        let service =
            QueuedLlmService::with_backend(Ref::new(LlmBackend::new(dispatcher, None)));

        let result = service
            .query(LlmRequestData::new("hello", MetaData::default()))
            .await;

        assert!(matches!(
            result,
            Err(LlmServiceError::Dispatch(DispatchError::QueueFull { capacity: 1 }))
        ));
    }
}
