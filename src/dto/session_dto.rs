use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::dto::test_dto::CandidateTestView;
use crate::models::test_session::{Answer, ReviewStatus, SessionStatus, TestSession};

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AnswerPayload {
    pub question_id: Uuid,
    #[validate(range(min = -1, message = "Chosen option index must be -1 or a valid option"))]
    pub chosen_option_index: i32,
    #[serde(default)]
    #[validate(length(max = 2000))]
    pub remark: String,
}

impl From<&AnswerPayload> for Answer {
    fn from(payload: &AnswerPayload) -> Self {
        Answer::new(
            payload.question_id,
            payload.chosen_option_index,
            payload.remark.clone(),
        )
    }
}

pub fn to_answers(payloads: &[AnswerPayload]) -> Vec<Answer> {
    payloads.iter().map(Answer::from).collect()
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SavedAnswerView {
    pub question_id: Uuid,
    pub chosen_option_index: i32,
    pub remark: String,
}

impl From<&Answer> for SavedAnswerView {
    fn from(a: &Answer) -> Self {
        Self {
            question_id: a.question_id,
            chosen_option_index: a.chosen_option_index,
            remark: a.remark.clone(),
        }
    }
}

/// Everything a client needs to resume an attempt after a reload.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartSessionResponse {
    pub session_id: Uuid,
    pub test_id: Uuid,
    pub status: SessionStatus,
    pub resumed: bool,
    pub time_limit: i32,
    pub started_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub current_question_index: i32,
    pub remaining_time_seconds: i32,
    pub answers: Vec<SavedAnswerView>,
    pub test: CandidateTestView,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressRequest {
    #[serde(default)]
    #[validate(nested)]
    pub answers: Vec<AnswerPayload>,
    #[validate(range(min = 0, message = "Question index cannot be negative"))]
    pub current_question_index: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SaveProgressResponse {
    pub session_id: Uuid,
    pub saved_answers: usize,
    pub current_question_index: i32,
    pub remaining_time_seconds: i32,
}

/// `startTime` / `endTime` are accepted from older clients and only logged;
/// timing is taken from the server clock.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSessionRequest {
    #[serde(default)]
    #[validate(nested)]
    pub answers: Vec<AnswerPayload>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub auto_submitted: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmitSessionResponse {
    pub message: String,
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub score: Decimal,
    pub max_score: i32,
    pub percentage: Decimal,
    pub correct_answers: i32,
    pub wrong_answers: i32,
    pub unattempted: i32,
    pub cutoff_mark: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResultQuestionView {
    pub id: Uuid,
    pub question_text: String,
    pub options: Vec<String>,
    pub user_answer: i32,
    pub correct_answer: i32,
    pub is_correct: bool,
    pub remark: String,
    pub score_earned: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionResultResponse {
    pub id: Uuid,
    pub test_name: String,
    pub candidate_name: String,
    pub candidate_email: String,
    pub status: SessionStatus,
    pub score: Decimal,
    pub max_score: i32,
    pub percentage: Decimal,
    pub total_questions: i32,
    pub correct_answers: i32,
    pub wrong_answers: i32,
    pub unattempted: i32,
    pub negative_marks_ratio: Decimal,
    pub questions: Vec<ResultQuestionView>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub review_status: ReviewStatus,
    pub cutoff_mark: Decimal,
    pub qualification_percentage: Decimal,
    pub qualified: bool,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatusPayload {
    pub review_status: ReviewStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReviewStatusResponse {
    pub message: String,
    pub session_id: Uuid,
    pub review_status: ReviewStatus,
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct SessionListQuery {
    pub test_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub id: Uuid,
    pub test_id: Uuid,
    pub test_name: String,
    pub candidate_id: Uuid,
    pub candidate_name: String,
    pub candidate_email: String,
    pub status: SessionStatus,
    pub score: Decimal,
    pub max_score: i32,
    pub percentage: Decimal,
    pub review_status: ReviewStatus,
    pub started_at: DateTime<Utc>,
    pub submitted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatusResponse {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub score: Decimal,
    pub percentage: Decimal,
}

impl From<&TestSession> for SessionStatusResponse {
    fn from(session: &TestSession) -> Self {
        Self {
            session_id: session.id,
            status: session.status,
            score: session.score,
            percentage: session.percentage,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecentTestEntry {
    pub id: Uuid,
    pub test_id: Uuid,
    pub name: String,
    pub date: Option<NaiveDate>,
    pub status: SessionStatus,
    pub score: String,
    pub percentage: Decimal,
    pub review_status: ReviewStatus,
    pub cutoff_mark: Decimal,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpcomingTestEntry {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub time_limit: i32,
    pub num_questions: i32,
    pub cutoff_mark: Decimal,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSummary {
    pub total_tests: i64,
    pub average_score: Decimal,
    pub tests_completed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateDashboardResponse {
    pub recent_tests: Vec<RecentTestEntry>,
    pub upcoming_tests: Vec<UpcomingTestEntry>,
    pub performance_summary: PerformanceSummary,
}
