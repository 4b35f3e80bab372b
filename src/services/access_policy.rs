use crate::error::{Error, Result};
use crate::models::test::Test;
use crate::models::test_session::TestSession;
use crate::models::user::{AuthUser, Role};

pub const ADMIN_ONLY: &[Role] = &[Role::Admin];
pub const CANDIDATE_ONLY: &[Role] = &[Role::Candidate];
pub const ANY_ROLE: &[Role] = &[Role::Candidate, Role::Admin];

/// Route-level rule: the caller's role must be on the allow-list.
pub fn ensure_role(user: &AuthUser, allowed: &[Role]) -> Result<()> {
    if allowed.contains(&user.role) {
        Ok(())
    } else {
        Err(Error::Forbidden(format!(
            "Role '{}' is not allowed to perform this action",
            user.role
        )))
    }
}

/// Resource-level rule for session reads.
pub fn ensure_can_view_session(user: &AuthUser, session: &TestSession) -> Result<()> {
    match user.role {
        Role::Admin => Ok(()),
        Role::Candidate if session.candidate_id == user.id => Ok(()),
        Role::Candidate => Err(Error::Forbidden(
            "You can only view your own test results".to_string(),
        )),
    }
}

/// Only the administrator who created a test sees its answer key and notes.
pub fn is_test_owner(user: &AuthUser, test: &Test) -> bool {
    user.role == Role::Admin && test.created_by == user.id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::question::Question;
    use crate::models::test::NewTest;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn user(role: Role) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            role,
        }
    }

    fn test_by(created_by: Uuid) -> Test {
        Test::create(
            NewTest {
                name: "Policy".into(),
                description: None,
                created_by,
                notes_content: String::new(),
                time_limit: 5,
                negative_marking_ratio: Decimal::ZERO,
                cutoff_mark: Decimal::ZERO,
                questions: vec![Question::new("q", vec!["a".into(), "b".into()], 1).unwrap()],
            },
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn allow_lists_gate_by_role() {
        assert!(ensure_role(&user(Role::Admin), ADMIN_ONLY).is_ok());
        assert!(matches!(
            ensure_role(&user(Role::Candidate), ADMIN_ONLY),
            Err(Error::Forbidden(_))
        ));
        assert!(ensure_role(&user(Role::Candidate), ANY_ROLE).is_ok());
        assert!(ensure_role(&user(Role::Admin), CANDIDATE_ONLY).is_err());
    }

    #[test]
    fn candidates_read_only_their_own_sessions() {
        let owner = user(Role::Candidate);
        let stranger = user(Role::Candidate);
        let admin = user(Role::Admin);
        let test = test_by(admin.id);
        let session = TestSession::start(&test, owner.id, Utc::now());

        assert!(ensure_can_view_session(&owner, &session).is_ok());
        assert!(matches!(
            ensure_can_view_session(&stranger, &session),
            Err(Error::Forbidden(_))
        ));
        assert!(ensure_can_view_session(&admin, &session).is_ok());
    }

    #[test]
    fn only_the_creating_admin_owns_a_test() {
        let admin = user(Role::Admin);
        let other_admin = user(Role::Admin);
        let test = test_by(admin.id);
        assert!(is_test_owner(&admin, &test));
        assert!(!is_test_owner(&other_admin, &test));

        let impostor = AuthUser {
            id: admin.id,
            role: Role::Candidate,
        };
        assert!(!is_test_owner(&impostor, &test));
    }
}
