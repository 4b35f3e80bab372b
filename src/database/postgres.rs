use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::database::store::Store;
use crate::error::{Error, Result};
use crate::models::question::Question;
use crate::models::test::Test;
use crate::models::test_session::{Answer, ReviewStatus, SessionStatus, TestSession};
use crate::models::user::User;

const TEST_COLUMNS: &str = "id, name, description, created_by, notes_content, num_questions, \
    time_limit, negative_marking_ratio, cutoff_mark, scheduled_date, scheduled_time, questions, \
    assigned_to, created_at, updated_at";

const SESSION_COLUMNS: &str = "id, candidate_id, test_id, started_at, expires_at, ended_at, \
    submitted_at, answers, score, max_score, percentage, status, review_status, \
    current_question_index, remaining_time_seconds, created_at, updated_at";

#[derive(Debug, FromRow)]
struct TestRow {
    id: Uuid,
    name: String,
    description: Option<String>,
    created_by: Uuid,
    notes_content: String,
    num_questions: i32,
    time_limit: i32,
    negative_marking_ratio: Decimal,
    cutoff_mark: Decimal,
    scheduled_date: NaiveDate,
    scheduled_time: String,
    questions: Json<Vec<Question>>,
    assigned_to: Vec<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TestRow> for Test {
    fn from(row: TestRow) -> Self {
        Test {
            id: row.id,
            name: row.name,
            description: row.description,
            created_by: row.created_by,
            notes_content: row.notes_content,
            num_questions: row.num_questions,
            time_limit: row.time_limit,
            negative_marking_ratio: row.negative_marking_ratio,
            cutoff_mark: row.cutoff_mark,
            scheduled_date: row.scheduled_date,
            scheduled_time: row.scheduled_time,
            questions: row.questions.0,
            assigned_to: row.assigned_to,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct SessionRow {
    id: Uuid,
    candidate_id: Uuid,
    test_id: Uuid,
    started_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    submitted_at: Option<DateTime<Utc>>,
    answers: Json<Vec<Answer>>,
    score: Decimal,
    max_score: i32,
    percentage: Decimal,
    status: String,
    review_status: String,
    current_question_index: i32,
    remaining_time_seconds: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for TestSession {
    type Error = Error;

    fn try_from(row: SessionRow) -> Result<Self> {
        Ok(TestSession {
            id: row.id,
            candidate_id: row.candidate_id,
            test_id: row.test_id,
            started_at: row.started_at,
            expires_at: row.expires_at,
            ended_at: row.ended_at,
            submitted_at: row.submitted_at,
            answers: row.answers.0,
            score: row.score,
            max_score: row.max_score,
            percentage: row.percentage,
            status: row.status.parse::<SessionStatus>()?,
            review_status: row.review_status.parse::<ReviewStatus>()?,
            current_question_index: row.current_question_index,
            remaining_time_seconds: row.remaining_time_seconds,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    role: String,
}

impl TryFrom<UserRow> for User {
    type Error = Error;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(User {
            id: row.id,
            name: row.name,
            email: row.email,
            role: row.role.parse().map_err(Error::Internal)?,
        })
    }
}

fn into_sessions(rows: Vec<SessionRow>) -> Result<Vec<TestSession>> {
    rows.into_iter().map(TestSession::try_from).collect()
}

/// Postgres-backed store. Queries are built at runtime so the crate compiles
/// without a live database.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn find_test_by_id(&self, id: Uuid) -> Result<Option<Test>> {
        let row = sqlx::query_as::<_, TestRow>(&format!(
            "SELECT {} FROM tests WHERE id = $1",
            TEST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Test::from))
    }

    async fn list_tests(&self) -> Result<Vec<Test>> {
        let rows = sqlx::query_as::<_, TestRow>(&format!(
            "SELECT {} FROM tests ORDER BY created_at DESC",
            TEST_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Test::from).collect())
    }

    async fn list_tests_assigned_to(&self, candidate_id: Uuid) -> Result<Vec<Test>> {
        let rows = sqlx::query_as::<_, TestRow>(&format!(
            "SELECT {} FROM tests WHERE $1 = ANY(assigned_to) ORDER BY scheduled_date, scheduled_time",
            TEST_COLUMNS
        ))
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Test::from).collect())
    }

    async fn insert_test(&self, test: &Test) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tests (
                id, name, description, created_by, notes_content, num_questions, time_limit,
                negative_marking_ratio, cutoff_mark, scheduled_date, scheduled_time, questions,
                assigned_to, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(test.id)
        .bind(&test.name)
        .bind(&test.description)
        .bind(test.created_by)
        .bind(&test.notes_content)
        .bind(test.num_questions)
        .bind(test.time_limit)
        .bind(test.negative_marking_ratio)
        .bind(test.cutoff_mark)
        .bind(test.scheduled_date)
        .bind(&test.scheduled_time)
        .bind(Json(&test.questions))
        .bind(&test.assigned_to)
        .bind(test.created_at)
        .bind(test.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn save_test(&self, test: &Test) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tests
            SET cutoff_mark = $2, scheduled_date = $3, scheduled_time = $4, updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(test.id)
        .bind(test.cutoff_mark)
        .bind(test.scheduled_date)
        .bind(&test.scheduled_time)
        .bind(test.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound("Test not found".to_string()));
        }
        Ok(())
    }

    async fn add_to_roster(
        &self,
        test_id: Uuid,
        candidate_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE tests
            SET assigned_to = array_append(assigned_to, $2), updated_at = $3
            WHERE id = $1 AND NOT ($2 = ANY(assigned_to))
            "#,
        )
        .bind(test_id)
        .bind(candidate_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>("SELECT id, name, email, role FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(User::try_from).transpose()
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<TestSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM test_sessions WHERE id = $1",
            SESSION_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TestSession::try_from).transpose()
    }

    async fn find_attempt(
        &self,
        candidate_id: Uuid,
        test_id: Uuid,
    ) -> Result<Option<TestSession>> {
        let row = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM test_sessions WHERE candidate_id = $1 AND test_id = $2",
            SESSION_COLUMNS
        ))
        .bind(candidate_id)
        .bind(test_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(TestSession::try_from).transpose()
    }

    async fn insert_session(&self, session: &TestSession) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO test_sessions (
                id, candidate_id, test_id, started_at, expires_at, ended_at, submitted_at,
                answers, score, max_score, percentage, status, review_status,
                current_question_index, remaining_time_seconds, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            ON CONFLICT (candidate_id, test_id) DO NOTHING
            "#,
        )
        .bind(session.id)
        .bind(session.candidate_id)
        .bind(session.test_id)
        .bind(session.started_at)
        .bind(session.expires_at)
        .bind(session.ended_at)
        .bind(session.submitted_at)
        .bind(Json(&session.answers))
        .bind(session.score)
        .bind(session.max_score)
        .bind(session.percentage)
        .bind(session.status.as_str())
        .bind(session.review_status.as_str())
        .bind(session.current_question_index)
        .bind(session.remaining_time_seconds)
        .bind(session.created_at)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn save_progress(&self, session: &TestSession) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE test_sessions
            SET answers = $2, current_question_index = $3, remaining_time_seconds = $4,
                updated_at = $5
            WHERE id = $1 AND status = 'in-progress'
            "#,
        )
        .bind(session.id)
        .bind(Json(&session.answers))
        .bind(session.current_question_index)
        .bind(session.remaining_time_seconds)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn finalize_session(&self, session: &TestSession) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE test_sessions
            SET answers = $2, score = $3, percentage = $4, status = $5, ended_at = $6,
                submitted_at = $7, remaining_time_seconds = $8, updated_at = $9
            WHERE id = $1 AND status = 'in-progress'
            "#,
        )
        .bind(session.id)
        .bind(Json(&session.answers))
        .bind(session.score)
        .bind(session.percentage)
        .bind(session.status.as_str())
        .bind(session.ended_at)
        .bind(session.submitted_at)
        .bind(session.remaining_time_seconds)
        .bind(session.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_review_status(
        &self,
        session_id: Uuid,
        review_status: ReviewStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE test_sessions SET review_status = $2, updated_at = $3 WHERE id = $1",
        )
        .bind(session_id)
        .bind(review_status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_sessions_by_candidate(&self, candidate_id: Uuid) -> Result<Vec<TestSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM test_sessions WHERE candidate_id = $1 ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))
        .bind(candidate_id)
        .fetch_all(&self.pool)
        .await?;
        into_sessions(rows)
    }

    async fn count_sessions_by_candidate(&self, candidate_id: Uuid) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM test_sessions WHERE candidate_id = $1")
                .bind(candidate_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn list_sessions(&self, test_id: Option<Uuid>) -> Result<Vec<TestSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM test_sessions WHERE ($1::uuid IS NULL OR test_id = $1) \
             ORDER BY created_at DESC",
            SESSION_COLUMNS
        ))
        .bind(test_id)
        .fetch_all(&self.pool)
        .await?;
        into_sessions(rows)
    }

    async fn list_overdue_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<TestSession>> {
        let rows = sqlx::query_as::<_, SessionRow>(&format!(
            "SELECT {} FROM test_sessions WHERE status = 'in-progress' AND expires_at < $1 \
             ORDER BY expires_at",
            SESSION_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        into_sessions(rows)
    }
}
