//! Cross-origin headers and preflight handling.

use crate::state::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::Response,
};

pub const ALLOWED_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
pub const ALLOWED_HEADERS: &str = "Content-Type, Authorization, Content-Length, X-Requested-With";
const PREFLIGHT_MAX_AGE: &str = "86400";

#[derive(Clone, Debug)]
pub struct CorsSettings {
    pub allowed_origins: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            allowed_origins: vec!["*".into()],
        }
    }
}

impl CorsSettings {
    /// Parse a comma-separated allow-list. An empty list means `*`.
    pub fn from_list(list: &str) -> Self {
        let allowed_origins: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(String::from)
            .collect();
        if allowed_origins.is_empty() {
            Self::default()
        } else {
            Self { allowed_origins }
        }
    }

    fn allows(&self, origin: Option<&str>) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
            || origin.is_some_and(|origin| self.allowed_origins.iter().any(|o| o == origin))
    }

    /// Headers attached to every response for a request from `origin`.
    ///
    /// Allowed origins are reflected with credentials; anything else gets
    /// `*` without credentials. Either way the answer depends on `Origin`,
    /// so `Vary: Origin` is always included.
    pub fn headers_for(&self, origin: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::VARY, HeaderValue::from_static("Origin"));
        if self.allows(origin) {
            let value = origin
                .and_then(|o| HeaderValue::from_str(o).ok())
                .unwrap_or_else(|| HeaderValue::from_static("*"));
            headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, value);
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_METHODS,
                HeaderValue::from_static(ALLOWED_METHODS),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_HEADERS,
                HeaderValue::from_static(ALLOWED_HEADERS),
            );
        } else {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_ORIGIN,
                HeaderValue::from_static("*"),
            );
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("false"),
            );
        }
        headers
    }

    /// 204 answer to an `OPTIONS` preflight.
    pub fn preflight(&self, origin: Option<&str>) -> Response {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::NO_CONTENT;
        let headers = response.headers_mut();
        headers.extend(self.headers_for(origin));
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            HeaderValue::from_static(ALLOWED_METHODS),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            HeaderValue::from_static(ALLOWED_HEADERS),
        );
        headers.insert(
            header::ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE),
        );
        response
    }
}

/// Answers preflights directly and decorates every other response.
pub async fn cors(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if request.method() == Method::OPTIONS {
        return state.cors.preflight(origin.as_deref());
    }

    let mut response = next.run(request).await;
    let extra = state.cors.headers_for(origin.as_deref());
    let headers = response.headers_mut();
    for (name, value) in extra.iter() {
        if *name == header::VARY {
            headers.append(header::VARY, value.clone());
        } else {
            insert_if_absent(headers, name, value);
        }
    }
    response
}

fn insert_if_absent(headers: &mut HeaderMap, name: &HeaderName, value: &HeaderValue) {
    if !headers.contains_key(name) {
        headers.insert(name.clone(), value.clone());
    }
}
