//! Wire entities exchanged with the RAG/LLM backend

use serde::{Deserialize, Serialize};

fn none() -> String {
    "none".to_owned()
}

/// Body of a RAG query. Fields the caller leaves out default to `"none"`, which the backend
/// reads as "use the default".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LlmRequestData<M> {
    pub query: String,
    #[serde(default = "none")]
    pub model: String,
    #[serde(default = "none")]
    pub rag_type: String,
    #[serde(default = "none")]
    pub namespace: String,
    #[serde(default = "none")]
    pub prompt: String,
    pub meta: M,
}

impl<M> LlmRequestData<M> {
    pub fn new(query: impl Into<String>, meta: M) -> Self {
        Self {
            query: query.into(),
            model: none(),
            rag_type: none(),
            namespace: none(),
            prompt: none(),
            meta,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaData {
    #[serde(default)]
    pub user_id: String,
    pub guild_id: Option<String>,
}

/// Request metadata carrying the earlier turns of a chat as `(speaker, text)` pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMetaData {
    #[serde(default)]
    pub user_id: String,
    pub guild_id: Option<String>,
    #[serde(default)]
    pub chat: Vec<(String, String)>,
}

/// Request metadata that records which Discord user the request is for.
pub trait UserMeta {
    fn set_user_id(&mut self, user_id: String);
}

impl UserMeta for MetaData {
    fn set_user_id(&mut self, user_id: String) {
        self.user_id = user_id;
    }
}

impl UserMeta for ChatMetaData {
    fn set_user_id(&mut self, user_id: String) {
        self.user_id = user_id;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponse {
    pub message: String,
}

/// Body of the internet search agent endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_report_model() -> String {
    "mistral".to_owned()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportUserRequest {
    #[serde(default = "default_report_model")]
    pub model: String,
    /// Recent channel history, one `author: content` line per message.
    pub context: String,
    pub reason: String,
    pub reported_user: String,
    pub affected_user: String,
}

impl ReportUserRequest {
    /// Checks the report the same way the backend does, so a bad report never takes a slot in
    /// the queue.
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("model", &self.model),
            ("context", &self.context),
            ("reason", &self.reason),
            ("reported user", &self.reported_user),
            ("affected user", &self.affected_user),
        ];
        if let Some((name, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(format!("no {name} specified"));
        }
        if self.reported_user == self.affected_user {
            return Err("reported user and affected user are the same".to_owned());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModerationVerdict {
    pub person_to_punishment: String,
    pub reason: String,
    pub punishment: String,
    pub time: String,
    pub summary: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerRules {
    pub server_id: String,
    pub rules: String,
    pub namespace: String,
    pub document: String,
}
