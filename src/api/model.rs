//! Check-ins, responses and the in-memory board holding them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// A question within a check-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// Question id
    pub id: String,
    /// Question text
    pub text: String,
}

/// A set of questions members answer by a due date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckIn {
    /// Check-in id
    pub id: String,
    /// Title
    pub title: String,
    /// Due date
    pub due_date: DateTime<Utc>,
    /// Subject of the manager who created it
    pub created_by: String,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Questions, in order
    pub questions: Vec<Question>,
}

/// One answer to one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    /// Question being answered
    pub question_id: String,
    /// Answer text
    pub answer: String,
}

/// A member's answers to a check-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEntry {
    /// Response id
    pub id: String,
    /// Check-in answered
    pub check_in_id: String,
    /// Subject of the responding member
    pub user_id: String,
    /// Submission time
    pub created_at: DateTime<Utc>,
    /// Answers
    pub answers: Vec<Answer>,
}

/// Why a response was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SubmitError {
    /// No check-in with that id
    #[error("Check-in not found")]
    UnknownCheckIn,
    /// This member already answered this check-in
    #[error("Response already submitted for this check-in")]
    AlreadySubmitted,
}

/// Process-local storage for check-ins and responses
#[derive(Debug, Default)]
pub struct CheckinBoard {
    check_ins: RwLock<Vec<CheckIn>>,
    responses: RwLock<Vec<ResponseEntry>>,
}

impl CheckinBoard {
    /// Empty board
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a new check-in
    pub fn add_check_in(&self, check_in: CheckIn) {
        self.check_ins.write().push(check_in);
    }

    /// All check-ins, oldest first
    #[must_use]
    pub fn check_ins(&self) -> Vec<CheckIn> {
        self.check_ins.read().clone()
    }

    /// Record `entry` unless its author already answered the check-in.
    ///
    /// # Errors
    ///
    /// [`SubmitError::UnknownCheckIn`] or [`SubmitError::AlreadySubmitted`].
    pub fn submit(&self, entry: ResponseEntry) -> Result<ResponseEntry, SubmitError> {
        if !self
            .check_ins
            .read()
            .iter()
            .any(|c| c.id == entry.check_in_id)
        {
            return Err(SubmitError::UnknownCheckIn);
        }

        // Check and insert under one write lock
        let mut responses = self.responses.write();
        if responses
            .iter()
            .any(|r| r.user_id == entry.user_id && r.check_in_id == entry.check_in_id)
        {
            return Err(SubmitError::AlreadySubmitted);
        }
        responses.push(entry.clone());
        Ok(entry)
    }

    /// Responses to one check-in
    #[must_use]
    pub fn responses_for_check_in(&self, check_in_id: &str) -> Vec<ResponseEntry> {
        self.filter_responses(|r| r.check_in_id == check_in_id)
    }

    /// Responses by one member
    #[must_use]
    pub fn responses_by_user(&self, user_id: &str) -> Vec<ResponseEntry> {
        self.filter_responses(|r| r.user_id == user_id)
    }

    /// Every check-in with its responses
    #[must_use]
    pub fn summary(&self) -> Vec<(CheckIn, Vec<ResponseEntry>)> {
        let check_ins = self.check_ins();
        let responses = self.responses.read();
        check_ins
            .into_iter()
            .map(|check_in| {
                let answered = responses
                    .iter()
                    .filter(|r| r.check_in_id == check_in.id)
                    .cloned()
                    .collect();
                (check_in, answered)
            })
            .collect()
    }

    fn filter_responses(&self, keep: impl Fn(&ResponseEntry) -> bool) -> Vec<ResponseEntry> {
        self.responses
            .read()
            .iter()
            .filter(|r| keep(r))
            .cloned()
            .collect()
    }
}
