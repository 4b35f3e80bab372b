use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use crate::database::Store;
use crate::dto::test_dto::{CreateTestPayload, TestView, UpdateSchedulePayload};
use crate::error::{Error, Result};
use crate::models::question::Question;
use crate::models::test::{NewTest, ScheduleUpdate, Test};
use crate::models::user::{AuthUser, Role};
use crate::services::ai_service::QuestionGenerator;
use crate::utils::time::{now, parse_hhmm};

#[derive(Clone)]
pub struct TestService {
    store: Arc<dyn Store>,
    generator: Arc<dyn QuestionGenerator>,
    generation_timeout: Duration,
    max_generated_questions: usize,
}

impl TestService {
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn QuestionGenerator>,
        generation_timeout: Duration,
        max_generated_questions: usize,
    ) -> Self {
        Self {
            store,
            generator,
            generation_timeout,
            max_generated_questions,
        }
    }

    /// Builds the complete question list first; nothing is written unless
    /// generation succeeded in full.
    pub async fn create_test(&self, creator: &AuthUser, payload: CreateTestPayload) -> Result<Test> {
        let notes_content = payload.notes_content.clone().unwrap_or_default();
        let questions = if !payload.questions.is_empty() {
            payload
                .questions
                .iter()
                .map(|q| Question::new(q.question_text.trim(), q.options.clone(), q.correct_option_index))
                .collect::<Result<Vec<_>>>()?
        } else {
            let desired = payload.num_questions.ok_or_else(|| {
                Error::Validation(
                    "Provide either questions or notesContent with numQuestions".to_string(),
                )
            })? as usize;
            if notes_content.trim().is_empty() {
                return Err(Error::Validation(
                    "Notes content is required to generate questions".to_string(),
                ));
            }
            if desired > self.max_generated_questions {
                return Err(Error::Validation(format!(
                    "At most {} questions can be generated at once",
                    self.max_generated_questions
                )));
            }
            self.generate(&notes_content, desired).await?
        };

        let draft = NewTest {
            name: payload.name,
            description: payload.description,
            created_by: creator.id,
            notes_content,
            time_limit: payload.time_limit,
            negative_marking_ratio: to_decimal(
                payload.negative_marking_ratio.unwrap_or(0.0),
                4,
                "negative marking ratio",
            )?,
            cutoff_mark: to_decimal(payload.cutoff_mark.unwrap_or(0.0), 2, "cut-off mark")?,
            questions,
        };
        let test = Test::create(draft, now())?;

        if test.cutoff_mark > Decimal::from(test.max_score()) {
            tracing::warn!(
                test_id = %test.id,
                cutoff_mark = %test.cutoff_mark,
                max_score = test.max_score(),
                "cut-off mark exceeds the maximum score; nobody can qualify"
            );
        }

        self.store.insert_test(&test).await?;
        tracing::info!(
            test_id = %test.id,
            created_by = %creator.id,
            num_questions = test.num_questions,
            "test created"
        );
        Ok(test)
    }

    async fn generate(&self, notes: &str, desired: usize) -> Result<Vec<Question>> {
        let generated =
            tokio::time::timeout(self.generation_timeout, self.generator.generate_questions(notes, desired))
                .await
                .map_err(|_| {
                    tracing::error!(
                        timeout_secs = self.generation_timeout.as_secs(),
                        "question generation timed out"
                    );
                    Error::UpstreamGeneration("Question generation timed out".to_string())
                })?
                .map_err(|e| match e {
                    Error::UpstreamGeneration(msg) => Error::UpstreamGeneration(msg),
                    other => Error::UpstreamGeneration(other.to_string()),
                })?;

        if generated.is_empty() {
            return Err(Error::UpstreamGeneration(
                "Question generation produced no questions".to_string(),
            ));
        }
        if generated.len() < desired {
            tracing::info!(
                requested = desired,
                generated = generated.len(),
                "generator returned fewer questions than requested"
            );
        }
        let mut generated = generated;
        generated.truncate(desired);
        Ok(generated)
    }

    pub async fn list_tests(&self, viewer: &AuthUser) -> Result<Vec<TestView>> {
        let tests = self.store.list_tests().await?;
        Ok(tests
            .iter()
            .map(|t| TestView::for_viewer(t, viewer))
            .collect())
    }

    pub async fn get_test(&self, viewer: &AuthUser, test_id: Uuid) -> Result<TestView> {
        let test = self.find(test_id).await?;
        if viewer.role == Role::Candidate && !test.is_assigned_to(viewer.id) {
            return Err(Error::Forbidden(
                "This test has not been assigned to you".to_string(),
            ));
        }
        Ok(TestView::for_viewer(&test, viewer))
    }

    pub async fn assign_to_candidate(&self, test_id: Uuid, candidate_id: Uuid) -> Result<Test> {
        match self.store.find_user(candidate_id).await? {
            Some(user) if user.role == Role::Candidate => {}
            _ => {
                return Err(Error::NotFound(
                    "Candidate not found or is not a candidate user".to_string(),
                ))
            }
        }
        self.find(test_id).await?;

        if !self.store.add_to_roster(test_id, candidate_id, now()).await? {
            return Err(Error::Conflict(
                "Test already assigned to this candidate".to_string(),
            ));
        }
        tracing::info!(test_id = %test_id, candidate_id = %candidate_id, "test assigned");
        self.find(test_id).await
    }

    pub async fn update_schedule(&self, test_id: Uuid, payload: UpdateSchedulePayload) -> Result<Test> {
        let schedule = match (payload.scheduled_date, payload.scheduled_time) {
            (Some(date), Some(time)) => {
                parse_hhmm(&time)?;
                Some((date, time))
            }
            (None, None) => None,
            _ => {
                return Err(Error::Validation(
                    "Scheduled date and time must be provided together".to_string(),
                ))
            }
        };
        let cutoff_mark = payload
            .cutoff_mark
            .map(|c| to_decimal(c, 2, "cut-off mark"))
            .transpose()?;

        let mut test = self.find(test_id).await?;
        test.apply_schedule(
            ScheduleUpdate {
                cutoff_mark,
                schedule,
            },
            now(),
        )?;
        self.store.save_test(&test).await?;
        tracing::info!(
            test_id = %test.id,
            cutoff_mark = %test.cutoff_mark,
            scheduled_date = %test.scheduled_date,
            scheduled_time = %test.scheduled_time,
            "test schedule updated"
        );
        Ok(test)
    }

    async fn find(&self, test_id: Uuid) -> Result<Test> {
        self.store
            .find_test_by_id(test_id)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))
    }
}

fn to_decimal(value: f64, dp: u32, field: &str) -> Result<Decimal> {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(dp))
        .ok_or_else(|| Error::Validation(format!("Invalid {}", field)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::dto::test_dto::QuestionPayload;
    use crate::models::user::User;
    use crate::services::ai_service::MockQuestionGenerator;

    fn admin() -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role: Role::Admin,
        }
    }

    fn generated(n: usize) -> Vec<Question> {
        (0..n)
            .map(|i| {
                Question::new(
                    format!("Generated {}", i),
                    vec!["a".into(), "b".into(), "c".into(), "d".into()],
                    (i % 4) as i32,
                )
                .unwrap()
            })
            .collect()
    }

    fn payload_from_notes(num_questions: i32) -> CreateTestPayload {
        CreateTestPayload {
            name: "Biology".into(),
            description: None,
            notes_content: Some("Mitochondria produce energy.".into()),
            num_questions: Some(num_questions),
            time_limit: 30,
            negative_marking_ratio: Some(0.25),
            cutoff_mark: Some(3.0),
            questions: vec![],
        }
    }

    fn service(store: Arc<MemoryStore>, generator: MockQuestionGenerator) -> TestService {
        TestService::new(store, Arc::new(generator), Duration::from_millis(200), 50)
    }

    #[tokio::test]
    async fn stores_the_count_actually_generated() {
        let store = Arc::new(MemoryStore::new());
        let mut generator = MockQuestionGenerator::new();
        generator
            .expect_generate_questions()
            .times(1)
            .returning(|_, _| Ok(generated(3)));

        let svc = service(store.clone(), generator);
        let test = svc.create_test(&admin(), payload_from_notes(5)).await.unwrap();
        assert_eq!(test.num_questions, 3);
        assert_eq!(test.negative_marking_ratio, "0.25".parse::<Decimal>().unwrap());
        assert!(store.find_test_by_id(test.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn generation_failure_persists_nothing() {
        let store = Arc::new(MemoryStore::new());
        let mut generator = MockQuestionGenerator::new();
        generator
            .expect_generate_questions()
            .returning(|_, _| Err(Error::UpstreamGeneration("malformed".into())));

        let svc = service(store.clone(), generator);
        let err = svc.create_test(&admin(), payload_from_notes(5)).await.unwrap_err();
        assert!(matches!(err, Error::UpstreamGeneration(_)));
        assert!(store.list_tests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn explicit_questions_skip_generation() {
        let store = Arc::new(MemoryStore::new());
        let generator = MockQuestionGenerator::new();
        let svc = service(store, generator);

        let mut payload = payload_from_notes(1);
        payload.notes_content = None;
        payload.num_questions = None;
        payload.questions = vec![QuestionPayload {
            question_text: "2 + 2?".into(),
            options: vec!["3".into(), "4".into()],
            correct_option_index: 1,
        }];
        let test = svc.create_test(&admin(), payload).await.unwrap();
        assert_eq!(test.num_questions, 1);
        assert_eq!(test.notes_content, "");
    }

    #[tokio::test]
    async fn schedule_requires_date_and_time_together() {
        let store = Arc::new(MemoryStore::new());
        let mut generator = MockQuestionGenerator::new();
        generator
            .expect_generate_questions()
            .returning(|_, _| Ok(generated(2)));
        let svc = service(store, generator);
        let test = svc.create_test(&admin(), payload_from_notes(2)).await.unwrap();

        let only_time = UpdateSchedulePayload {
            cutoff_mark: None,
            scheduled_date: None,
            scheduled_time: Some("10:30".into()),
        };
        assert!(matches!(
            svc.update_schedule(test.id, only_time).await,
            Err(Error::Validation(_))
        ));

        let bad_time = UpdateSchedulePayload {
            cutoff_mark: None,
            scheduled_date: chrono::NaiveDate::from_ymd_opt(2025, 6, 1),
            scheduled_time: Some("25:00".into()),
        };
        assert!(svc.update_schedule(test.id, bad_time).await.is_err());

        let ok = UpdateSchedulePayload {
            cutoff_mark: Some(1.5),
            scheduled_date: chrono::NaiveDate::from_ymd_opt(2025, 6, 1),
            scheduled_time: Some("10:30".into()),
        };
        let updated = svc.update_schedule(test.id, ok).await.unwrap();
        assert_eq!(updated.scheduled_time, "10:30");
        assert_eq!(updated.cutoff_mark, "1.5".parse::<Decimal>().unwrap());
    }

    #[tokio::test]
    async fn assignment_checks_candidate_and_duplicates() {
        let store = Arc::new(MemoryStore::new());
        let mut generator = MockQuestionGenerator::new();
        generator
            .expect_generate_questions()
            .returning(|_, _| Ok(generated(1)));
        let svc = service(store.clone(), generator);
        let creator = admin();
        let test = svc.create_test(&creator, payload_from_notes(1)).await.unwrap();

        let candidate = User {
            id: Uuid::new_v4(),
            name: "Asha".into(),
            email: "asha@example.com".into(),
            role: Role::Candidate,
        };
        store.insert_user(candidate.clone()).await;

        assert!(matches!(
            svc.assign_to_candidate(test.id, creator.id).await,
            Err(Error::NotFound(_))
        ));
        let assigned = svc.assign_to_candidate(test.id, candidate.id).await.unwrap();
        assert_eq!(assigned.assigned_to, vec![candidate.id]);
        assert!(matches!(
            svc.assign_to_candidate(test.id, candidate.id).await,
            Err(Error::Conflict(_))
        ));
    }
}
