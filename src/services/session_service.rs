use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::database::Store;
use crate::dto::session_dto::{
    to_answers, CandidateDashboardResponse, PerformanceSummary, RecentTestEntry,
    ResultQuestionView, ReviewStatusResponse, SaveProgressRequest, SaveProgressResponse,
    SavedAnswerView, SessionResultResponse, SessionSummary, StartSessionResponse,
    SubmitSessionRequest, SubmitSessionResponse, UpcomingTestEntry,
};
use crate::dto::test_dto::CandidateTestView;
use crate::error::{Error, Result};
use crate::models::question::UNATTEMPTED;
use crate::models::test::Test;
use crate::models::test_session::{Outcome, ReviewStatus, SessionEvent, SessionStatus, TestSession};
use crate::models::user::{AuthUser, User};
use crate::services::access_policy::ensure_can_view_session;
use crate::services::grading_service::{round2, AnswerTally, GradingService};
use crate::utils::time::now;

const RECENT_TESTS_LIMIT: usize = 5;

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn Store>,
    grace: Duration,
}

impl SessionService {
    pub fn new(store: Arc<dyn Store>, submit_grace_secs: i64) -> Self {
        Self {
            store,
            grace: Duration::seconds(submit_grace_secs.max(0)),
        }
    }

    /// Opens the candidate's single attempt, or hands back the one already in progress.
    pub async fn start_session(
        &self,
        candidate: &AuthUser,
        test_id: Uuid,
    ) -> Result<StartSessionResponse> {
        let test = self.find_test(test_id).await?;
        if !test.is_assigned_to(candidate.id) {
            return Err(Error::Forbidden(
                "This test has not been assigned to you".to_string(),
            ));
        }

        let now = now();
        if let Some(existing) = self.store.find_attempt(candidate.id, test_id).await? {
            return self.resume(existing, &test, now).await;
        }

        let session = TestSession::start(&test, candidate.id, now);
        if !self.store.insert_session(&session).await? {
            // a concurrent start won the insert
            let existing = self
                .store
                .find_attempt(candidate.id, test_id)
                .await?
                .ok_or_else(|| Error::Internal("session vanished after conflicting insert".to_string()))?;
            return self.resume(existing, &test, now).await;
        }

        tracing::info!(
            session_id = %session.id,
            test_id = %test.id,
            candidate_id = %candidate.id,
            expires_at = %session.expires_at,
            "test session started"
        );
        Ok(start_response(&session, &test, false))
    }

    async fn resume(
        &self,
        mut session: TestSession,
        test: &Test,
        now: DateTime<Utc>,
    ) -> Result<StartSessionResponse> {
        match session.status {
            SessionStatus::InProgress if session.is_overdue(now, self.grace) => {
                self.finalize_timeout(session, test, now).await?;
                Err(Error::Conflict(
                    "The time limit for this test has elapsed; it was submitted automatically"
                        .to_string(),
                ))
            }
            SessionStatus::InProgress => {
                session.remaining_time_seconds = session.remaining_seconds(now);
                tracing::info!(session_id = %session.id, "test session resumed");
                Ok(start_response(&session, test, true))
            }
            status => Err(Error::Conflict(format!(
                "You have already taken this test (status: {})",
                status
            ))),
        }
    }

    pub async fn save_progress(
        &self,
        candidate: &AuthUser,
        test_id: Uuid,
        req: SaveProgressRequest,
    ) -> Result<SaveProgressResponse> {
        let mut session = self.find_attempt(candidate, test_id).await?;
        let now = now();

        if session.is_overdue(now, self.grace) {
            let test = self.find_test(test_id).await?;
            self.finalize_timeout(session, &test, now).await?;
            return Err(Error::Conflict(
                "The time limit for this test has elapsed; it was submitted automatically"
                    .to_string(),
            ));
        }

        session.record_progress(to_answers(&req.answers), req.current_question_index, now)?;
        if !self.store.save_progress(&session).await? {
            return Err(Error::Conflict(
                "Test session is no longer in progress".to_string(),
            ));
        }

        tracing::debug!(
            session_id = %session.id,
            saved_answers = session.answers.len(),
            current_question_index = session.current_question_index,
            "progress saved"
        );
        Ok(SaveProgressResponse {
            session_id: session.id,
            saved_answers: session.answers.len(),
            current_question_index: session.current_question_index,
            remaining_time_seconds: session.remaining_time_seconds,
        })
    }

    /// Scores the attempt exactly once. Submissions past the deadline plus
    /// grace are clamped to the answers saved before it.
    pub async fn submit_session(
        &self,
        candidate: &AuthUser,
        test_id: Uuid,
        req: SubmitSessionRequest,
    ) -> Result<SubmitSessionResponse> {
        let test = self.find_test(test_id).await?;
        let mut session = self.find_attempt(candidate, test_id).await?;
        if session.status.is_terminal() {
            return Err(Error::Conflict(
                "This test has already been submitted".to_string(),
            ));
        }

        if req.start_time.is_some() || req.end_time.is_some() {
            tracing::debug!(
                session_id = %session.id,
                client_start = ?req.start_time,
                client_end = ?req.end_time,
                server_start = %session.started_at,
                "client-reported timing ignored"
            );
        }

        let now = now();
        let (event, ended_at) = if session.is_overdue(now, self.grace) {
            tracing::warn!(
                session_id = %session.id,
                expires_at = %session.expires_at,
                received_at = %now,
                discarded_answers = req.answers.len(),
                "late submission clamped to the server deadline"
            );
            (SessionEvent::Timeout, session.expires_at)
        } else {
            session.record_progress(to_answers(&req.answers), None, now)?;
            let event = if req.auto_submitted {
                SessionEvent::Timeout
            } else {
                SessionEvent::Submit
            };
            (event, now.min(session.expires_at))
        };

        let sheet = GradingService::grade(&test, &session.answers);
        let tally = sheet.tally;
        session.finalize(event, sheet.into_outcome(), ended_at, now)?;
        if !self.store.finalize_session(&session).await? {
            return Err(Error::Conflict(
                "This test has already been submitted".to_string(),
            ));
        }

        tracing::info!(
            session_id = %session.id,
            test_id = %test.id,
            candidate_id = %candidate.id,
            status = %session.status,
            score = %session.score,
            percentage = %session.percentage,
            "test session finalized"
        );
        Ok(SubmitSessionResponse {
            message: "Test submitted successfully".to_string(),
            session_id: session.id,
            status: session.status,
            score: session.score,
            max_score: session.max_score,
            percentage: session.percentage,
            correct_answers: tally.correct_answers,
            wrong_answers: tally.wrong_answers,
            unattempted: tally.unattempted,
            cutoff_mark: test.cutoff_mark,
        })
    }

    pub async fn abandon_session(&self, session_id: Uuid) -> Result<TestSession> {
        let mut session = self.find_session(session_id).await?;
        let now = now();
        let answers = session.answers.clone();
        session.finalize(SessionEvent::Abandon, Outcome::forfeit(answers), now, now)?;
        if !self.store.finalize_session(&session).await? {
            return Err(Error::Conflict(
                "Test session is no longer in progress".to_string(),
            ));
        }
        tracing::info!(session_id = %session.id, "test session abandoned");
        Ok(session)
    }

    /// Auto-submits every in-progress session past its deadline plus grace.
    /// Returns how many sessions this call finalized.
    pub async fn expire_overdue_sessions(&self, now: DateTime<Utc>) -> Result<usize> {
        let overdue = self.store.list_overdue_sessions(now - self.grace).await?;
        let mut tests: HashMap<Uuid, Test> = HashMap::new();
        let mut finalized = 0;

        for session in overdue {
            if !tests.contains_key(&session.test_id) {
                match self.store.find_test_by_id(session.test_id).await? {
                    Some(test) => {
                        tests.insert(test.id, test);
                    }
                    None => {
                        tracing::warn!(
                            session_id = %session.id,
                            test_id = %session.test_id,
                            "overdue session references a missing test"
                        );
                        continue;
                    }
                }
            }
            let Some(test) = tests.get(&session.test_id) else {
                continue;
            };
            let session_id = session.id;
            match self.finalize_timeout(session, test, now).await {
                Ok(true) => finalized += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::error!(session_id = %session_id, error = %e, "failed to auto-submit session")
                }
            }
        }

        if finalized > 0 {
            tracing::info!(finalized, "overdue sessions auto-submitted");
        }
        Ok(finalized)
    }

    async fn finalize_timeout(
        &self,
        mut session: TestSession,
        test: &Test,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let sheet = GradingService::grade(test, &session.answers);
        let ended_at = session.expires_at;
        session.finalize(SessionEvent::Timeout, sheet.into_outcome(), ended_at, now)?;
        let won = self.store.finalize_session(&session).await?;
        if won {
            tracing::info!(
                session_id = %session.id,
                score = %session.score,
                "test session auto-submitted at deadline"
            );
        }
        Ok(won)
    }

    pub async fn get_result(
        &self,
        viewer: &AuthUser,
        session_id: Uuid,
    ) -> Result<SessionResultResponse> {
        let session = self.find_session(session_id).await?;
        ensure_can_view_session(viewer, &session)?;
        if !session.status.is_terminal() {
            return Err(Error::Conflict(
                "Test session is still in progress".to_string(),
            ));
        }
        let test = self.find_test(session.test_id).await?;

        let (candidate_name, candidate_email) = match self.store.find_user(session.candidate_id).await? {
            Some(User { name, email, .. }) => (name, email),
            None => {
                tracing::warn!(
                    session_id = %session.id,
                    candidate_id = %session.candidate_id,
                    "result requested for a session whose candidate no longer exists"
                );
                (String::new(), String::new())
            }
        };

        let tally = AnswerTally::from_answers(&test, &session.answers);
        let questions = test
            .questions
            .iter()
            .map(|q| {
                let answer = session.answers.iter().find(|a| a.question_id == q.id);
                ResultQuestionView {
                    id: q.id,
                    question_text: q.question_text.clone(),
                    options: q.options.clone(),
                    user_answer: answer.map_or(UNATTEMPTED, |a| a.chosen_option_index),
                    correct_answer: q.correct_option_index,
                    is_correct: answer.and_then(|a| a.is_correct).unwrap_or(false),
                    remark: answer.map(|a| a.remark.clone()).unwrap_or_default(),
                    score_earned: answer.and_then(|a| a.score_earned).unwrap_or(Decimal::ZERO),
                }
            })
            .collect();

        let qualification_percentage =
            GradingService::qualification_threshold(test.cutoff_mark, session.max_score);
        Ok(SessionResultResponse {
            id: session.id,
            test_name: test.name.clone(),
            candidate_name,
            candidate_email,
            status: session.status,
            score: session.score,
            max_score: session.max_score,
            percentage: session.percentage,
            total_questions: test.num_questions,
            correct_answers: tally.correct_answers,
            wrong_answers: tally.wrong_answers,
            unattempted: tally.unattempted,
            negative_marks_ratio: test.negative_marking_ratio,
            questions,
            submitted_at: session.submitted_at,
            review_status: session.review_status,
            cutoff_mark: test.cutoff_mark,
            qualification_percentage,
            qualified: session.status.is_scored() && session.percentage >= qualification_percentage,
            scheduled_date: test.scheduled_date,
            scheduled_time: test.scheduled_time.clone(),
        })
    }

    pub async fn list_sessions(&self, test_id: Option<Uuid>) -> Result<Vec<SessionSummary>> {
        let sessions = self.store.list_sessions(test_id).await?;
        let mut test_names: HashMap<Uuid, String> = HashMap::new();
        let mut users: HashMap<Uuid, Option<User>> = HashMap::new();
        let mut summaries = Vec::with_capacity(sessions.len());

        for session in sessions {
            if !test_names.contains_key(&session.test_id) {
                let name = self
                    .store
                    .find_test_by_id(session.test_id)
                    .await?
                    .map(|t| t.name)
                    .unwrap_or_default();
                test_names.insert(session.test_id, name);
            }
            if !users.contains_key(&session.candidate_id) {
                let user = self.store.find_user(session.candidate_id).await?;
                users.insert(session.candidate_id, user);
            }
            let user = users.get(&session.candidate_id).and_then(|u| u.as_ref());

            summaries.push(SessionSummary {
                id: session.id,
                test_id: session.test_id,
                test_name: test_names.get(&session.test_id).cloned().unwrap_or_default(),
                candidate_id: session.candidate_id,
                candidate_name: user.map(|u| u.name.clone()).unwrap_or_default(),
                candidate_email: user.map(|u| u.email.clone()).unwrap_or_default(),
                status: session.status,
                score: session.score,
                max_score: session.max_score,
                percentage: session.percentage,
                review_status: session.review_status,
                started_at: session.started_at,
                submitted_at: session.submitted_at,
            });
        }
        Ok(summaries)
    }

    pub async fn update_review_status(
        &self,
        session_id: Uuid,
        review_status: ReviewStatus,
    ) -> Result<ReviewStatusResponse> {
        if !self
            .store
            .update_review_status(session_id, review_status, now())
            .await?
        {
            return Err(Error::NotFound("Test session not found".to_string()));
        }
        tracing::info!(session_id = %session_id, review_status = review_status.as_str(), "review status updated");
        Ok(ReviewStatusResponse {
            message: "Review status updated".to_string(),
            session_id,
            review_status,
        })
    }

    pub async fn candidate_dashboard(
        &self,
        candidate: &AuthUser,
    ) -> Result<CandidateDashboardResponse> {
        let sessions = self.store.find_sessions_by_candidate(candidate.id).await?;
        let assigned = self.store.list_tests_assigned_to(candidate.id).await?;
        let total_tests = self.store.count_sessions_by_candidate(candidate.id).await?;
        let tests: HashMap<Uuid, &Test> = assigned.iter().map(|t| (t.id, t)).collect();

        let mut scored: Vec<&TestSession> = sessions.iter().filter(|s| s.status.is_scored()).collect();
        scored.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));

        let mut recent_tests = Vec::with_capacity(RECENT_TESTS_LIMIT);
        for session in scored.iter().take(RECENT_TESTS_LIMIT) {
            let test = match tests.get(&session.test_id) {
                Some(t) => (*t).clone(),
                None => self.find_test(session.test_id).await?,
            };
            recent_tests.push(RecentTestEntry {
                id: session.id,
                test_id: test.id,
                name: test.name.clone(),
                date: session.submitted_at.map(|d| d.date_naive()),
                status: session.status,
                score: format!("{}/{}", session.score.normalize(), session.max_score),
                percentage: session.percentage,
                review_status: session.review_status,
                cutoff_mark: test.cutoff_mark,
                scheduled_date: test.scheduled_date,
                scheduled_time: test.scheduled_time.clone(),
            });
        }

        let upcoming_tests = assigned
            .iter()
            .filter(|t| {
                !sessions
                    .iter()
                    .any(|s| s.test_id == t.id && s.status.is_terminal())
            })
            .map(|t| UpcomingTestEntry {
                id: t.id,
                name: t.name.clone(),
                description: t.description.clone(),
                time_limit: t.time_limit,
                num_questions: t.num_questions,
                cutoff_mark: t.cutoff_mark,
                scheduled_date: t.scheduled_date,
                scheduled_time: t.scheduled_time.clone(),
            })
            .collect();

        let score_sum: Decimal = scored.iter().map(|s| s.score).sum();
        let max_sum: i64 = scored.iter().map(|s| s.max_score as i64).sum();
        let average_score = if max_sum > 0 {
            round2(score_sum / Decimal::from(max_sum) * Decimal::ONE_HUNDRED)
        } else {
            Decimal::ZERO
        };

        Ok(CandidateDashboardResponse {
            recent_tests,
            upcoming_tests,
            performance_summary: PerformanceSummary {
                total_tests,
                average_score,
                tests_completed: scored.len() as i64,
            },
        })
    }

    async fn find_test(&self, test_id: Uuid) -> Result<Test> {
        self.store
            .find_test_by_id(test_id)
            .await?
            .ok_or_else(|| Error::NotFound("Test not found".to_string()))
    }

    async fn find_session(&self, session_id: Uuid) -> Result<TestSession> {
        self.store
            .find_session(session_id)
            .await?
            .ok_or_else(|| Error::NotFound("Test session not found".to_string()))
    }

    async fn find_attempt(&self, candidate: &AuthUser, test_id: Uuid) -> Result<TestSession> {
        self.store
            .find_attempt(candidate.id, test_id)
            .await?
            .ok_or_else(|| {
                Error::NotFound("No session found for this test; start the test first".to_string())
            })
    }
}

fn start_response(session: &TestSession, test: &Test, resumed: bool) -> StartSessionResponse {
    StartSessionResponse {
        session_id: session.id,
        test_id: test.id,
        status: session.status,
        resumed,
        time_limit: test.time_limit,
        started_at: session.started_at,
        expires_at: session.expires_at,
        current_question_index: session.current_question_index,
        remaining_time_seconds: session.remaining_time_seconds,
        answers: session.answers.iter().map(SavedAnswerView::from).collect(),
        test: CandidateTestView::from(test),
    }
}
