//! LLM endpoints

use crate::api::ExtractUser;
use crate::core::dispatcher::BacklogStatus;
use crate::core::error::LlmServiceError;
use crate::core::traits::LlmService;
use crate::infrastructure::entities::{
    ChatMetaData, LlmRequestData, LlmResponse, MetaData, ModerationVerdict, ReportUserRequest,
    SearchRequest, ServerRules, UserMeta,
};
use axum::routing::{get, post};
use axum::{Json, Router};
use di_axum::Inject;
use log::info;
use std::time::Instant;

pub fn router() -> Router {
    Router::new()
        .route("/chat", post(chat))
        .route("/query", post(query))
        .route("/search", post(search))
        .route("/report", post(report_user))
        .route("/rules", post(set_server_rules))
        .route("/status", get(status))
}

/// Callers may not speak for another user, so the header wins over the body.
fn with_user<M: UserMeta>(mut request: LlmRequestData<M>, user: u64) -> LlmRequestData<M> {
    request.meta.set_user_id(user.to_string());
    request
}

async fn chat(
    Inject(llm): Inject<dyn LlmService>,
    ExtractUser(current_user): ExtractUser,
    Json(request): Json<LlmRequestData<ChatMetaData>>,
) -> Result<Json<LlmResponse>, LlmServiceError> {
    let start = Instant::now();
    let response = llm.chat(with_user(request, current_user)).await?;
    info!("chat for {current_user} answered in {:?}", start.elapsed());

    Ok(Json(response))
}

async fn query(
    Inject(llm): Inject<dyn LlmService>,
    ExtractUser(current_user): ExtractUser,
    Json(request): Json<LlmRequestData<MetaData>>,
) -> Result<Json<LlmResponse>, LlmServiceError> {
    let start = Instant::now();
    let response = llm.query(with_user(request, current_user)).await?;
    info!("query for {current_user} answered in {:?}", start.elapsed());

    Ok(Json(response))
}

async fn search(
    Inject(llm): Inject<dyn LlmService>,
    ExtractUser(_): ExtractUser,
    Json(request): Json<SearchRequest>,
) -> Result<Json<LlmResponse>, LlmServiceError> {
    Ok(Json(llm.search(request).await?))
}

async fn report_user(
    Inject(llm): Inject<dyn LlmService>,
    ExtractUser(current_user): ExtractUser,
    Json(report): Json<ReportUserRequest>,
) -> Result<Json<ModerationVerdict>, LlmServiceError> {
    let verdict = llm.report_user(report).await?;
    info!(
        "report by {current_user}: {} -> {}",
        verdict.person_to_punishment, verdict.punishment
    );

    Ok(Json(verdict))
}

async fn set_server_rules(
    Inject(llm): Inject<dyn LlmService>,
    ExtractUser(_): ExtractUser,
    Json(rules): Json<ServerRules>,
) -> Result<Json<LlmResponse>, LlmServiceError> {
    Ok(Json(llm.set_server_rules(rules).await?))
}

async fn status(
    Inject(llm): Inject<dyn LlmService>,
    ExtractUser(_): ExtractUser,
) -> Json<BacklogStatus> {
    Json(llm.backlog_status())
}
