use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::test::Test;
use crate::models::test_session::{ReviewStatus, TestSession};
use crate::models::user::User;

/// Persistence consumed by the services. Every method is a single atomic
/// statement; nothing here spans more than one record.
#[async_trait]
pub trait Store: Send + Sync {
    async fn find_test_by_id(&self, id: Uuid) -> Result<Option<Test>>;

    async fn list_tests(&self) -> Result<Vec<Test>>;

    async fn list_tests_assigned_to(&self, candidate_id: Uuid) -> Result<Vec<Test>>;

    async fn insert_test(&self, test: &Test) -> Result<()>;

    /// Persists schedule and cut-off changes. Questions and roster are left untouched.
    async fn save_test(&self, test: &Test) -> Result<()>;

    /// Appends to the roster unless already present. Returns `false` on a duplicate.
    async fn add_to_roster(
        &self,
        test_id: Uuid,
        candidate_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_session(&self, id: Uuid) -> Result<Option<TestSession>>;

    async fn find_attempt(&self, candidate_id: Uuid, test_id: Uuid)
        -> Result<Option<TestSession>>;

    /// Returns `false` when the candidate already has a session for this test.
    async fn insert_session(&self, session: &TestSession) -> Result<bool>;

    /// Writes answers and resume cursor while the stored session is still in progress.
    async fn save_progress(&self, session: &TestSession) -> Result<bool>;

    /// Compare-and-set from `in-progress` to the session's final state.
    async fn finalize_session(&self, session: &TestSession) -> Result<bool>;

    async fn update_review_status(
        &self,
        session_id: Uuid,
        review_status: ReviewStatus,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Newest first.
    async fn find_sessions_by_candidate(&self, candidate_id: Uuid) -> Result<Vec<TestSession>>;

    async fn count_sessions_by_candidate(&self, candidate_id: Uuid) -> Result<i64>;

    /// Newest first, optionally restricted to one test.
    async fn list_sessions(&self, test_id: Option<Uuid>) -> Result<Vec<TestSession>>;

    /// In-progress sessions whose deadline is before `cutoff`.
    async fn list_overdue_sessions(&self, cutoff: DateTime<Utc>) -> Result<Vec<TestSession>>;
}
