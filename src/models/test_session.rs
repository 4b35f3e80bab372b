use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::question::UNATTEMPTED;
use crate::models::test::Test;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum SessionStatus {
    InProgress,
    Completed,
    AutoSubmitted,
    Abandoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Submit,
    Timeout,
    Abandon,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::InProgress => "in-progress",
            SessionStatus::Completed => "completed",
            SessionStatus::AutoSubmitted => "auto-submitted",
            SessionStatus::Abandoned => "abandoned",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, SessionStatus::InProgress)
    }

    /// Sessions that went through the scoring algorithm.
    pub fn is_scored(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::AutoSubmitted)
    }

    pub fn next(self, event: SessionEvent) -> Result<SessionStatus> {
        match (self, event) {
            (SessionStatus::InProgress, SessionEvent::Submit) => Ok(SessionStatus::Completed),
            (SessionStatus::InProgress, SessionEvent::Timeout) => Ok(SessionStatus::AutoSubmitted),
            (SessionStatus::InProgress, SessionEvent::Abandon) => Ok(SessionStatus::Abandoned),
            (terminal, _) => Err(Error::Conflict(format!(
                "Test session is already {}",
                terminal
            ))),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "in-progress" => Ok(SessionStatus::InProgress),
            "completed" => Ok(SessionStatus::Completed),
            "auto-submitted" => Ok(SessionStatus::AutoSubmitted),
            "abandoned" => Ok(SessionStatus::Abandoned),
            other => Err(Error::Internal(format!("unknown session status '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum ReviewStatus {
    #[serde(rename = "Pending Review")]
    PendingReview,
    #[serde(rename = "Reviewed")]
    Reviewed,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::PendingReview => "Pending Review",
            ReviewStatus::Reviewed => "Reviewed",
        }
    }
}

impl FromStr for ReviewStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Pending Review" => Ok(ReviewStatus::PendingReview),
            "Reviewed" => Ok(ReviewStatus::Reviewed),
            other => Err(Error::Internal(format!("unknown review status '{}'", other))),
        }
    }
}

/// One candidate answer. `is_correct` and `score_earned` stay empty until the
/// session is finalized and are never rewritten afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub question_id: Uuid,
    pub chosen_option_index: i32,
    #[serde(default)]
    pub remark: String,
    #[serde(default)]
    pub is_correct: Option<bool>,
    #[serde(default)]
    pub score_earned: Option<Decimal>,
}

impl Answer {
    pub fn new(question_id: Uuid, chosen_option_index: i32, remark: impl Into<String>) -> Self {
        Self {
            question_id,
            chosen_option_index,
            remark: remark.into(),
            is_correct: None,
            score_earned: None,
        }
    }

    pub fn unattempted(question_id: Uuid) -> Self {
        Self::new(question_id, UNATTEMPTED, "")
    }

    pub fn is_unattempted(&self) -> bool {
        self.chosen_option_index == UNATTEMPTED
    }
}

/// Final answers and totals written when a session leaves `in-progress`.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub answers: Vec<Answer>,
    pub score: Decimal,
    pub percentage: Decimal,
}

impl Outcome {
    /// Abandoned attempts keep their raw answers and earn nothing.
    pub fn forfeit(answers: Vec<Answer>) -> Self {
        Self {
            answers,
            score: Decimal::ZERO,
            percentage: Decimal::ZERO,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSession {
    pub id: Uuid,
    pub candidate_id: Uuid,
    pub test_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub answers: Vec<Answer>,
    pub score: Decimal,
    pub max_score: i32,
    pub percentage: Decimal,
    pub status: SessionStatus,
    pub review_status: ReviewStatus,
    pub current_question_index: i32,
    pub remaining_time_seconds: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TestSession {
    /// Opens an attempt on the server clock; the deadline is fixed here and never
    /// taken from the client.
    pub fn start(test: &Test, candidate_id: Uuid, now: DateTime<Utc>) -> Self {
        let expires_at = now + Duration::minutes(test.time_limit as i64);
        Self {
            id: Uuid::new_v4(),
            candidate_id,
            test_id: test.id,
            started_at: now,
            expires_at,
            ended_at: None,
            submitted_at: None,
            answers: Vec::new(),
            score: Decimal::ZERO,
            max_score: test.max_score(),
            percentage: Decimal::ZERO,
            status: SessionStatus::InProgress,
            review_status: ReviewStatus::PendingReview,
            current_question_index: 0,
            remaining_time_seconds: (test.time_limit as i64 * 60).clamp(0, i32::MAX as i64) as i32,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> i32 {
        (self.expires_at - now).num_seconds().clamp(0, i32::MAX as i64) as i32
    }

    /// True once the deadline plus the grace window has passed.
    pub fn is_overdue(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        !self.status.is_terminal() && now > self.expires_at + grace
    }

    /// Upserts answers by question id and moves the resume cursor.
    pub fn record_progress(
        &mut self,
        answers: Vec<Answer>,
        current_question_index: Option<i32>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.status.is_terminal() {
            return Err(Error::Conflict(format!(
                "Test session is already {}",
                self.status
            )));
        }

        for incoming in answers {
            let raw = Answer::new(
                incoming.question_id,
                incoming.chosen_option_index,
                incoming.remark,
            );
            match self
                .answers
                .iter_mut()
                .find(|a| a.question_id == raw.question_id)
            {
                Some(existing) => *existing = raw,
                None => self.answers.push(raw),
            }
        }

        if let Some(index) = current_question_index {
            self.current_question_index = index.clamp(0, (self.max_score - 1).max(0));
        }
        self.remaining_time_seconds = self.remaining_seconds(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn finalize(
        &mut self,
        event: SessionEvent,
        outcome: Outcome,
        ended_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let next = self.status.next(event)?;
        self.status = next;
        self.answers = outcome.answers;
        self.score = outcome.score;
        self.percentage = outcome.percentage;
        self.ended_at = Some(ended_at);
        self.submitted_at = Some(now);
        self.remaining_time_seconds = self.remaining_seconds(ended_at);
        self.updated_at = now;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Question;
    use crate::models::test::NewTest;

    fn sample_test(time_limit: i32) -> Test {
        let questions = (0..3)
            .map(|i| {
                Question::new(format!("Q{}", i), vec!["a".into(), "b".into()], 0).unwrap()
            })
            .collect();
        Test::create(
            NewTest {
                name: "Sample".into(),
                description: None,
                created_by: Uuid::new_v4(),
                notes_content: String::new(),
                time_limit,
                negative_marking_ratio: Decimal::ZERO,
                cutoff_mark: Decimal::ZERO,
                questions,
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn transitions_out_of_in_progress_only() {
        let s = SessionStatus::InProgress;
        assert_eq!(s.next(SessionEvent::Submit).unwrap(), SessionStatus::Completed);
        assert_eq!(s.next(SessionEvent::Timeout).unwrap(), SessionStatus::AutoSubmitted);
        assert_eq!(s.next(SessionEvent::Abandon).unwrap(), SessionStatus::Abandoned);

        for terminal in [
            SessionStatus::Completed,
            SessionStatus::AutoSubmitted,
            SessionStatus::Abandoned,
        ] {
            for event in [SessionEvent::Submit, SessionEvent::Timeout, SessionEvent::Abandon] {
                assert!(matches!(terminal.next(event), Err(Error::Conflict(_))));
            }
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [
            SessionStatus::InProgress,
            SessionStatus::Completed,
            SessionStatus::AutoSubmitted,
            SessionStatus::Abandoned,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>().unwrap(), status);
            assert_eq!(
                serde_json::to_value(status).unwrap(),
                serde_json::json!(status.as_str())
            );
        }
        assert_eq!(
            serde_json::to_value(ReviewStatus::PendingReview).unwrap(),
            serde_json::json!("Pending Review")
        );
    }

    #[test]
    fn deadline_comes_from_server_clock() {
        let test = sample_test(10);
        let now = Utc::now();
        let session = TestSession::start(&test, Uuid::new_v4(), now);
        assert_eq!(session.expires_at, now + Duration::minutes(10));
        assert_eq!(session.remaining_time_seconds, 600);
        assert_eq!(session.remaining_seconds(now + Duration::minutes(4)), 360);
        assert_eq!(session.remaining_seconds(now + Duration::minutes(11)), 0);

        let grace = Duration::seconds(30);
        assert!(!session.is_overdue(now + Duration::minutes(10) + Duration::seconds(20), grace));
        assert!(session.is_overdue(now + Duration::minutes(11), grace));
    }

    #[test]
    fn huge_stored_time_limit_does_not_overflow_the_resume_clock() {
        let mut test = sample_test(10);
        test.time_limit = 40_000_000;
        let session = TestSession::start(&test, Uuid::new_v4(), Utc::now());
        assert_eq!(session.remaining_time_seconds, i32::MAX);
        assert!(session.expires_at > session.started_at);
    }

    #[test]
    fn progress_upserts_by_question_and_strips_grading() {
        let test = sample_test(10);
        let now = Utc::now();
        let mut session = TestSession::start(&test, Uuid::new_v4(), now);
        let q0 = test.questions[0].id;
        let q1 = test.questions[1].id;

        session
            .record_progress(vec![Answer::new(q0, 1, ""), Answer::new(q1, 0, "")], Some(1), now)
            .unwrap();
        let mut forged = Answer::new(q0, 0, "changed my mind");
        forged.is_correct = Some(true);
        forged.score_earned = Some(Decimal::ONE);
        session
            .record_progress(vec![forged], Some(99), now + Duration::minutes(1))
            .unwrap();

        assert_eq!(session.answers.len(), 2);
        assert_eq!(session.answers[0].chosen_option_index, 0);
        assert_eq!(session.answers[0].remark, "changed my mind");
        assert_eq!(session.answers[0].is_correct, None);
        assert_eq!(session.answers[0].score_earned, None);
        assert_eq!(session.current_question_index, 2);
        assert_eq!(session.remaining_time_seconds, 540);
    }

    #[test]
    fn finalized_session_rejects_progress_and_second_finalize() {
        let test = sample_test(10);
        let now = Utc::now();
        let mut session = TestSession::start(&test, Uuid::new_v4(), now);
        session
            .finalize(SessionEvent::Submit, Outcome::forfeit(vec![]), now, now)
            .unwrap();
        assert_eq!(session.status, SessionStatus::Completed);
        assert!(session.record_progress(vec![], None, now).is_err());
        assert!(session
            .finalize(SessionEvent::Timeout, Outcome::forfeit(vec![]), now, now)
            .is_err());
    }
}
