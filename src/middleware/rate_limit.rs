use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use uuid::Uuid;

use crate::models::user::AuthUser;

const WINDOW: Duration = Duration::from_secs(1);

#[derive(Debug)]
struct WindowState {
    start: Instant,
    count: u32,
}

/// Fixed one-second window per authenticated subject. Requests that reach the
/// limiter without an identity share the nil-uuid bucket.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    rps: u32,
    windows: Arc<Mutex<HashMap<Uuid, WindowState>>>,
}

impl RateLimiter {
    pub fn new(rps: u32) -> Self {
        Self {
            rps: rps.max(1),
            windows: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn allow(&self, subject: Uuid, now: Instant) -> bool {
        let mut windows = self.windows.lock().unwrap_or_else(|p| p.into_inner());
        // drop idle buckets so the map tracks only active subjects
        if windows.len() > 1024 {
            windows.retain(|_, w| now.duration_since(w.start) < WINDOW);
        }
        let window = windows.entry(subject).or_insert(WindowState {
            start: now,
            count: 0,
        });
        if now.duration_since(window.start) >= WINDOW {
            window.start = now;
            window.count = 0;
        }
        if window.count < self.rps {
            window.count += 1;
            true
        } else {
            false
        }
    }
}

pub async fn rps_middleware(
    State(limiter): State<RateLimiter>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let subject = req
        .extensions()
        .get::<AuthUser>()
        .map(|u| u.id)
        .unwrap_or_else(Uuid::nil);
    if !limiter.allow(subject, Instant::now()) {
        tracing::warn!(subject = %subject, "rate limit exceeded");
        let body = Json(json!({
            "error": "rate_limited",
            "message": "Too many requests",
        }));
        return (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    }
    next.run(req).await
}
