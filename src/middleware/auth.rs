use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::user::{AuthUser, Role};
use crate::services::access_policy::ensure_role;
use crate::AppState;

/// Claims issued by the identity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
    pub role: Option<String>,
}

impl Claims {
    /// A role outside the closed set makes the whole credential invalid.
    pub fn auth_user(&self) -> Result<AuthUser> {
        let id = Uuid::parse_str(&self.sub)
            .map_err(|_| Error::Unauthenticated("invalid_token".to_string()))?;
        let role = self
            .role
            .as_deref()
            .ok_or_else(|| Error::Unauthenticated("invalid_token".to_string()))?
            .parse::<Role>()
            .map_err(|_| Error::Unauthenticated("invalid_token".to_string()))?;
        Ok(AuthUser { id, role })
    }
}

pub fn authenticate(headers: &HeaderMap, jwt_secret: &str) -> Result<AuthUser> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| Error::Unauthenticated("missing_authorization".to_string()))?;
    let auth_str = auth_header
        .to_str()
        .map_err(|_| Error::Unauthenticated("bad_authorization".to_string()))?;
    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or_else(|| Error::Unauthenticated("unsupported_scheme".to_string()))?;

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(jwt_secret.as_bytes()),
        &validation,
    )
    .map_err(|_| Error::Unauthenticated("invalid_token".to_string()))?;

    data.claims.auth_user()
}

pub async fn require_bearer_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Response {
    match authenticate(req.headers(), &state.jwt_secret) {
        Ok(user) => {
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(e) => {
            tracing::debug!(path = %req.uri().path(), reason = %e, "rejected unauthenticated request");
            e.into_response()
        }
    }
}

/// Runs after `require_bearer_auth`; the caller's role must be on `allowed`.
pub async fn require_roles(req: Request, next: Next, allowed: &'static [Role]) -> Response {
    let Some(user) = req.extensions().get::<AuthUser>().copied() else {
        return Error::Unauthenticated("missing_authorization".to_string()).into_response();
    };
    if let Err(e) = ensure_role(&user, allowed) {
        tracing::warn!(
            user_id = %user.id,
            role = %user.role,
            path = %req.uri().path(),
            "role not allowed for route"
        );
        return e.into_response();
    }
    next.run(req).await
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        parts
            .extensions
            .get::<AuthUser>()
            .copied()
            .ok_or_else(|| Error::Unauthenticated("missing_authorization".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    const SECRET: &str = "unit-secret";

    fn token(sub: &str, role: Option<&str>, exp_offset: i64) -> String {
        let claims = Claims {
            sub: sub.to_string(),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
            role: role.map(str::to_string),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    fn headers(value: &str) -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(header::AUTHORIZATION, value.parse().unwrap());
        h
    }

    #[test]
    fn valid_token_yields_identity() {
        let id = Uuid::new_v4();
        let t = token(&id.to_string(), Some("admin"), 3600);
        let user = authenticate(&headers(&format!("Bearer {}", t)), SECRET).unwrap();
        assert_eq!(user, AuthUser { id, role: Role::Admin });
    }

    #[test]
    fn rejects_missing_expired_and_foreign_credentials() {
        assert!(matches!(
            authenticate(&HeaderMap::new(), SECRET),
            Err(Error::Unauthenticated(_))
        ));
        let id = Uuid::new_v4().to_string();
        let expired = token(&id, Some("candidate"), -3600);
        assert!(authenticate(&headers(&format!("Bearer {}", expired)), SECRET).is_err());
        let basic = token(&id, Some("candidate"), 3600);
        assert!(authenticate(&headers(&format!("Basic {}", basic)), SECRET).is_err());
        assert!(authenticate(&headers(&format!("Bearer {}", basic)), "other-secret").is_err());
    }

    #[test]
    fn unknown_role_is_an_invalid_credential() {
        let id = Uuid::new_v4().to_string();
        for role in [Some("hr"), Some("Admin"), None] {
            let t = token(&id, role, 3600);
            assert!(matches!(
                authenticate(&headers(&format!("Bearer {}", t)), SECRET),
                Err(Error::Unauthenticated(_))
            ));
        }
    }
}
