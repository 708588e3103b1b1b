//! `/reports`: manager views over submitted responses.

use axum::{
    Json,
    extract::{Path, State},
};
use serde::Serialize;

use super::AppState;
use super::model::{CheckIn, ResponseEntry};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CheckInReport {
    check_in_id: String,
    count: usize,
    responses: Vec<ResponseEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct UserReport {
    user_id: String,
    count: usize,
    responses: Vec<ResponseEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct SummaryEntry {
    check_in: CheckIn,
    count: usize,
    responses: Vec<ResponseEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Summary {
    total_check_ins: usize,
    summary: Vec<SummaryEntry>,
}

/// GET /reports/checkin/{check_in_id}
pub(crate) async fn by_check_in_handler(
    State(state): State<AppState>,
    Path(check_in_id): Path<String>,
) -> Json<CheckInReport> {
    let responses = state.board.responses_for_check_in(&check_in_id);
    Json(CheckInReport {
        check_in_id,
        count: responses.len(),
        responses,
    })
}

/// GET /reports/checkin/user/{user_id}
pub(crate) async fn by_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<UserReport> {
    let responses = state.board.responses_by_user(&user_id);
    Json(UserReport {
        user_id,
        count: responses.len(),
        responses,
    })
}

/// GET /reports/summary
pub(crate) async fn summary_handler(State(state): State<AppState>) -> Json<Summary> {
    let summary: Vec<SummaryEntry> = state
        .board
        .summary()
        .into_iter()
        .map(|(check_in, responses)| SummaryEntry {
            check_in,
            count: responses.len(),
            responses,
        })
        .collect();

    Json(Summary {
        total_check_ins: summary.len(),
        summary,
    })
}
