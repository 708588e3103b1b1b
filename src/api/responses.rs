//! `/responses`: members answer check-ins and read back their own answers.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::Utc;
use serde::Deserialize;
use tracing::{debug, info};

use super::AppState;
use super::model::{Answer, ResponseEntry, SubmitError};
use crate::ApiError;
use crate::auth::VerifiedIdentity;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct CreateResponseRequest {
    check_in_id: Option<String>,
    answers: Option<Vec<AnswerInput>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct AnswerInput {
    question_id: Option<String>,
    answer: Option<String>,
}

/// POST /responses (member)
pub(crate) async fn create_handler(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    payload: Result<Json<CreateResponseRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ResponseEntry>), ApiError> {
    let Json(body) = payload?;
    let mut problems = Vec::new();

    let check_in_id = body.check_in_id.unwrap_or_default();
    if check_in_id.is_empty() {
        problems.push("checkInId is required".to_string());
    }

    let answers: Vec<Answer> = body
        .answers
        .unwrap_or_default()
        .into_iter()
        .map(|a| Answer {
            question_id: a.question_id.unwrap_or_default(),
            answer: a.answer.unwrap_or_default(),
        })
        .collect();
    if answers.is_empty() {
        problems.push("answers must have at least one item".to_string());
    }
    if answers.iter().any(|a| a.question_id.is_empty()) {
        problems.push("questionId is required".to_string());
    }
    if answers.iter().any(|a| a.answer.is_empty()) {
        problems.push("answer cannot be empty".to_string());
    }

    if !problems.is_empty() {
        return Err(ApiError::Validation {
            message: "Validation failed".to_string(),
            details: problems,
        });
    }

    let entry = ResponseEntry {
        id: uuid::Uuid::new_v4().to_string(),
        check_in_id,
        user_id: identity.subject,
        created_at: Utc::now(),
        answers,
    };

    let entry = state.board.submit(entry).map_err(|e| {
        debug!(reason = %e, "Response refused");
        match e {
            SubmitError::UnknownCheckIn => ApiError::NotFound(e.to_string()),
            SubmitError::AlreadySubmitted => ApiError::AlreadySubmitted,
        }
    })?;

    info!(response_id = %entry.id, check_in_id = %entry.check_in_id, "Response submitted");
    Ok((StatusCode::CREATED, Json(entry)))
}

/// GET /responses/me (member)
pub(crate) async fn mine_handler(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
) -> Json<Vec<ResponseEntry>> {
    Json(state.board.responses_by_user(&identity.subject))
}
