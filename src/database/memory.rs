use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::database::store::Store;
use crate::error::{Error, Result};
use crate::models::test::Test;
use crate::models::test_session::{ReviewStatus, SessionStatus, TestSession};
use crate::models::user::User;

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    tests: HashMap<Uuid, Test>,
    sessions: HashMap<Uuid, TestSession>,
}

/// In-process store with the same atomicity guarantees as the Postgres one:
/// each call holds the lock for its whole read-check-write.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Users are owned by the identity service; this seeds them for local runs and tests.
    pub async fn insert_user(&self, user: User) {
        self.tables.write().await.users.insert(user.id, user);
    }

    /// Writes a session row as-is, bypassing the attempt and status checks.
    pub async fn put_session(&self, session: TestSession) {
        self.tables.write().await.sessions.insert(session.id, session);
    }
}

fn newest_first(mut sessions: Vec<TestSession>) -> Vec<TestSession> {
    sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    sessions
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_test_by_id(&self, id: Uuid) -> Result<Option<Test>> {
        Ok(self.tables.read().await.tests.get(&id).cloned())
    }

    async fn list_tests(&self) -> Result<Vec<Test>> {
        let mut tests: Vec<Test> = self.tables.read().await.tests.values().cloned().collect();
        tests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tests)
    }

    async fn list_tests_assigned_to(&self, candidate_id: Uuid) -> Result<Vec<Test>> {
        let mut tests: Vec<Test> = self
            .tables
            .read()
            .await
            .tests
            .values()
            .filter(|t| t.is_assigned_to(candidate_id))
            .cloned()
            .collect();
        tests.sort_by(|a, b| {
            (a.scheduled_date, &a.scheduled_time).cmp(&(b.scheduled_date, &b.scheduled_time))
        });
        Ok(tests)
    }

    async fn insert_test(&self, test: &Test) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.tests.contains_key(&test.id) {
            return Err(Error::Conflict(format!("Test {} already exists", test.id)));
        }
        tables.tests.insert(test.id, test.clone());
        Ok(())
    }

    async fn save_test(&self, test: &Test) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .tests
            .get_mut(&test.id)
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))?;
        stored.cutoff_mark = test.cutoff_mark;
        stored.scheduled_date = test.scheduled_date;
        stored.scheduled_time = test.scheduled_time.clone();
        stored.updated_at = test.updated_at;
        Ok(())
    }

    async fn add_to_roster(
        &self,
        test_id: Uuid,
        candidate_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.tests.get_mut(&test_id) {
            Some(test) => Ok(test.assign(candidate_id, now).is_ok()),
            None => Ok(false),
        }
    }

    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_session(&self, id: Uuid) -> Result<Option<TestSession>> {
        Ok(self.tables.read().await.sessions.get(&id).cloned())
    }

    async fn find_attempt(
        &self,
        candidate_id: Uuid,
        test_id: Uuid,
    ) -> Result<Option<TestSession>> {
        Ok(self
            .tables
            .read()
            .await
            .sessions
            .values()
            .find(|s| s.candidate_id == candidate_id && s.test_id == test_id)
            .cloned())
    }

    async fn insert_session(&self, session: &TestSession) -> Result<bool> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .sessions
            .values()
            .any(|s| s.candidate_id == session.candidate_id && s.test_id == session.test_id);
        if taken {
            return Ok(false);
        }
        tables.sessions.insert(session.id, session.clone());
        Ok(true)
    }

    async fn save_progress(&self, session: &TestSession) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(&session.id) {
            Some(stored) if stored.status == SessionStatus::InProgress => {
                stored.answers = session.answers.clone();
                stored.current_question_index = session.current_question_index;
                stored.remaining_time_seconds = session.remaining_time_seconds;
                stored.updated_at = session.updated_at;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finalize_session(&self, session: &TestSession) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(&session.id) {
            Some(stored) if stored.status == SessionStatus::InProgress => {
                *stored = session.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_review_status(
        &self,
        session_id: Uuid,
        review_status: ReviewStatus,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.sessions.get_mut(&session_id) {
            Some(stored) => {
                stored.review_status = review_status;
                stored.updated_at = now;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn find_sessions_by_candidate(&self, candidate_id: Uuid) -> Result<Vec<TestSession>> {
        let sessions = self
            .tables
            .read()
            .await
            .sessions
            .values()
            .filter(|s| s.candidate_id == candidate_id)
            .cloned()
            .collect();
        Ok(newest_first(sessions))
    }

    async fn count_sessions_by_candidate(&self, candidate_id: Uuid) -> Result<i64> {
        Ok(self
            .tables
            .read()
            .await
            .sessions
            .values()
            .filter(|s| s.candidate_id == candidate_id)
            .count() as i64)
    }

    async fn list_sessions(&self, test_id: Option<Uuid>) -> Result<Vec<TestSession>> {
        let sessions = self
            .tables
            .read()
            .await
            .sessions
            .values()
            .filter(|s| test_id.map_or(true, |id| s.test_id == id))
            .cloned()
            .collect();
        Ok(newest_first(sessions))
    }

    async fn list_overdue_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<TestSession>> {
        let mut sessions: Vec<TestSession> = self
            .tables
            .read()
            .await
            .sessions
            .values()
            .filter(|s| s.status == SessionStatus::InProgress && s.expires_at < cutoff)
            .cloned()
            .collect();
        sessions.sort_by_key(|s| s.expires_at);
        Ok(sessions)
    }
}
