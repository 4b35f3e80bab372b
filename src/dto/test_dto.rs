use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::question::Question;
use crate::models::test::Test;
use crate::models::user::AuthUser;
use crate::services::access_policy::is_test_owner;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionPayload {
    #[validate(length(min = 1, message = "Question text cannot be empty"))]
    pub question_text: String,
    #[validate(length(min = 2, message = "A question needs at least two options"))]
    pub options: Vec<String>,
    pub correct_option_index: i32,
}

/// Either `questions` or `notesContent` + `numQuestions` must be supplied.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestPayload {
    #[validate(length(min = 1, max = 200, message = "Test name cannot be empty"))]
    pub name: String,
    pub description: Option<String>,
    pub notes_content: Option<String>,
    #[validate(range(min = 1, message = "Number of questions must be at least 1"))]
    pub num_questions: Option<i32>,
    #[validate(range(min = 1, max = 1440, message = "Time limit must be between 1 and 1440 minutes"))]
    pub time_limit: i32,
    #[validate(range(min = 0.0, max = 1.0, message = "Negative marking ratio must be between 0 and 1"))]
    pub negative_marking_ratio: Option<f64>,
    #[validate(range(min = 0.0, max = 100.0, message = "Cut-off mark must be between 0 and 100"))]
    pub cutoff_mark: Option<f64>,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTestResponse {
    pub message: String,
    pub test_id: Uuid,
    pub test_name: String,
    pub num_questions: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSchedulePayload {
    #[validate(range(min = 0.0, max = 100.0, message = "Cut-off mark must be between 0 and 100"))]
    pub cutoff_mark: Option<f64>,
    pub scheduled_date: Option<NaiveDate>,
    pub scheduled_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignTestPayload {
    pub candidate_id: Uuid,
    pub test_id: Uuid,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignTestResponse {
    pub message: String,
    pub test_id: Uuid,
    pub candidate_id: Uuid,
    pub assigned_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleResponse {
    pub message: String,
    pub test_id: Uuid,
    pub cutoff_mark: Decimal,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
}

/// A question with the answer key removed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub id: Uuid,
    pub question_text: String,
    pub options: Vec<String>,
}

impl From<&Question> for QuestionView {
    fn from(q: &Question) -> Self {
        Self {
            id: q.id,
            question_text: q.question_text.clone(),
            options: q.options.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CandidateTestView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub num_questions: i32,
    pub time_limit: i32,
    pub negative_marking_ratio: Decimal,
    pub cutoff_mark: Decimal,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
    pub questions: Vec<QuestionView>,
}

impl From<&Test> for CandidateTestView {
    fn from(test: &Test) -> Self {
        Self {
            id: test.id,
            name: test.name.clone(),
            description: test.description.clone(),
            num_questions: test.num_questions,
            time_limit: test.time_limit,
            negative_marking_ratio: test.negative_marking_ratio,
            cutoff_mark: test.cutoff_mark,
            scheduled_date: test.scheduled_date,
            scheduled_time: test.scheduled_time.clone(),
            questions: test.questions.iter().map(QuestionView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FullTestView {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_by: Uuid,
    pub notes_content: String,
    pub num_questions: i32,
    pub time_limit: i32,
    pub negative_marking_ratio: Decimal,
    pub cutoff_mark: Decimal,
    pub scheduled_date: NaiveDate,
    pub scheduled_time: String,
    pub questions: Vec<Question>,
    pub assigned_to: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Test> for FullTestView {
    fn from(test: &Test) -> Self {
        Self {
            id: test.id,
            name: test.name.clone(),
            description: test.description.clone(),
            created_by: test.created_by,
            notes_content: test.notes_content.clone(),
            num_questions: test.num_questions,
            time_limit: test.time_limit,
            negative_marking_ratio: test.negative_marking_ratio,
            cutoff_mark: test.cutoff_mark,
            scheduled_date: test.scheduled_date,
            scheduled_time: test.scheduled_time.clone(),
            questions: test.questions.clone(),
            assigned_to: test.assigned_to.clone(),
            created_at: test.created_at,
            updated_at: test.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(untagged)]
pub enum TestView {
    Full(FullTestView),
    Redacted(CandidateTestView),
}

impl TestView {
    /// The answer key and source notes reach only the administrator who created the test.
    pub fn for_viewer(test: &Test, viewer: &AuthUser) -> Self {
        if is_test_owner(viewer, test) {
            TestView::Full(FullTestView::from(test))
        } else {
            TestView::Redacted(CandidateTestView::from(test))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test::NewTest;
    use crate::models::user::Role;

    fn sample(created_by: Uuid) -> Test {
        Test::create(
            NewTest {
                name: "Redaction".into(),
                description: Some("desc".into()),
                created_by,
                notes_content: "secret notes".into(),
                time_limit: 15,
                negative_marking_ratio: Decimal::ZERO,
                cutoff_mark: Decimal::ONE,
                questions: vec![Question::new(
                    "Capital of France?",
                    vec!["Berlin".into(), "Paris".into()],
                    1,
                )
                .unwrap()],
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn redacted_view_never_serializes_the_answer_key() {
        let creator = AuthUser {
            id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let test = sample(creator.id);

        let viewers = [
            AuthUser {
                id: Uuid::new_v4(),
                role: Role::Candidate,
            },
            AuthUser {
                id: Uuid::new_v4(),
                role: Role::Admin,
            },
        ];
        for viewer in viewers {
            let body = serde_json::to_string(&TestView::for_viewer(&test, &viewer)).unwrap();
            assert!(!body.contains("correctOptionIndex"));
            assert!(!body.contains("secret notes"));
            assert!(!body.contains("notesContent"));
            assert!(body.contains("Capital of France?"));
        }

        let body = serde_json::to_value(TestView::for_viewer(&test, &creator)).unwrap();
        assert_eq!(body["questions"][0]["correctOptionIndex"], 1);
        assert_eq!(body["notesContent"], "secret notes");
    }

    #[test]
    fn create_payload_rejects_out_of_range_values() {
        let payload: CreateTestPayload = serde_json::from_value(serde_json::json!({
            "name": "Physics",
            "timeLimit": 0,
            "negativeMarkingRatio": 1.5,
            "cutoffMark": 120,
            "questions": [{ "questionText": "", "options": ["a"], "correctOptionIndex": 0 }]
        }))
        .unwrap();
        let errors = payload.validate().unwrap_err();
        let fields = errors.errors();
        assert!(fields.contains_key("time_limit"));
        assert!(fields.contains_key("negative_marking_ratio"));
        assert!(fields.contains_key("cutoff_mark"));
        assert!(fields.contains_key("questions"));
    }
}
