//! `/checkins`: managers create check-ins, everyone signed in lists them.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::Deserialize;
use tracing::info;

use super::AppState;
use super::model::{CheckIn, Question};
use crate::ApiError;
use crate::auth::VerifiedIdentity;

const MIN_TEXT_LEN: usize = 3;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub(crate) struct CreateCheckInRequest {
    title: Option<String>,
    due_date: Option<String>,
    questions: Option<Vec<QuestionInput>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct QuestionInput {
    text: Option<String>,
}

/// POST /checkins (manager)
pub(crate) async fn create_handler(
    State(state): State<AppState>,
    identity: VerifiedIdentity,
    payload: Result<Json<CreateCheckInRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckIn>), ApiError> {
    let Json(body) = payload?;
    let mut problems = Vec::new();

    let title = body.title.unwrap_or_default();
    if title.chars().count() < MIN_TEXT_LEN {
        problems.push("Title must be at least 3 characters long".to_string());
    }

    let due_date = match body.due_date.as_deref().map(parse_due_date) {
        Some(Some(date)) => Some(date),
        Some(None) => {
            problems.push("dueDate must be a valid date".to_string());
            None
        }
        None => {
            problems.push("dueDate is required".to_string());
            None
        }
    };

    let questions = body.questions.unwrap_or_default();
    if questions.is_empty() {
        problems.push("questions must have at least one item".to_string());
    }
    let texts: Vec<String> = questions
        .into_iter()
        .map(|q| q.text.unwrap_or_default())
        .collect();
    if texts.iter().any(|t| t.chars().count() < MIN_TEXT_LEN) {
        problems.push("Question text must be at least 3 characters long".to_string());
    }

    let Some(due_date) = due_date.filter(|_| problems.is_empty()) else {
        return Err(ApiError::Validation {
            message: "Validation failed".to_string(),
            details: problems,
        });
    };

    let check_in = CheckIn {
        id: uuid::Uuid::new_v4().to_string(),
        title,
        due_date,
        created_by: identity.subject,
        created_at: Utc::now(),
        questions: texts
            .into_iter()
            .map(|text| Question {
                id: uuid::Uuid::new_v4().to_string(),
                text,
            })
            .collect(),
    };

    info!(
        check_in_id = %check_in.id,
        created_by = %check_in.created_by,
        due = %check_in.due_date.to_rfc3339_opts(SecondsFormat::Secs, true),
        "Check-in created"
    );
    state.board.add_check_in(check_in.clone());
    Ok((StatusCode::CREATED, Json(check_in)))
}

/// GET /checkins (any role)
pub(crate) async fn list_handler(State(state): State<AppState>) -> Json<Vec<CheckIn>> {
    Json(state.board.check_ins())
}

/// RFC 3339 timestamp, or a bare `YYYY-MM-DD` taken as midnight UTC
fn parse_due_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_date_accepts_rfc3339_and_plain_dates() {
        let ts = parse_due_date("2030-05-01T12:30:00+02:00").unwrap();
        assert_eq!(ts.to_rfc3339(), "2030-05-01T10:30:00+00:00");

        let day = parse_due_date("2030-05-01").unwrap();
        assert_eq!(day.to_rfc3339(), "2030-05-01T00:00:00+00:00");

        assert!(parse_due_date("next friday").is_none());
        assert!(parse_due_date("2030-13-01").is_none());
    }
}
