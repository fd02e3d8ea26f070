//! DI "Interfaces"

use crate::core::dispatcher::{BacklogStatus, Method};
use crate::core::error::{LlmServiceError, TransportError};
use crate::infrastructure::entities::{
    ChatMetaData, LlmRequestData, LlmResponse, MetaData, ModerationVerdict, ReportUserRequest,
    SearchRequest, ServerRules,
};
use async_trait::async_trait;
use serde_json::Value;

/// Performs one outbound call to the LLM backend.
///
/// The dispatcher never calls this concurrently with itself.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(
        &self,
        method: Method,
        address: &str,
        payload: &Value,
    ) -> Result<Value, TransportError>;
}

#[async_trait]
pub trait LlmService: Send + Sync {
    /// Continues a chat, sending the previous turns along in `meta.chat`.
    async fn chat(
        &self,
        request: LlmRequestData<ChatMetaData>,
    ) -> Result<LlmResponse, LlmServiceError>;

    /// Asks a single RAG question.
    async fn query(&self, request: LlmRequestData<MetaData>)
    -> Result<LlmResponse, LlmServiceError>;

    /// Answers a question with the backend's internet search agent.
    async fn search(&self, request: SearchRequest) -> Result<LlmResponse, LlmServiceError>;

    /// Asks the backend for a moderation verdict on a user report.
    ///
    /// Returns `Err` without queueing anything if the report is incomplete or the reported and
    /// affected users are the same person.
    async fn report_user(
        &self,
        report: ReportUserRequest,
    ) -> Result<ModerationVerdict, LlmServiceError>;

    /// Replaces the rules document of a server in the backend's vector store.
    async fn set_server_rules(&self, rules: ServerRules) -> Result<LlmResponse, LlmServiceError>;

    /// Current state of the request backlog.
    fn backlog_status(&self) -> BacklogStatus;
}
