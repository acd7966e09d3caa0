//! Request span maker for `TraceLayer`
//!
//! Records method, URI and version. Values of token and credential query
//! parameters are replaced before the URI is recorded.

use axum::http::{Request, Uri};
use tower_http::trace::MakeSpan;
use tracing::Span;

/// Query parameter names whose values are redacted
const SENSITIVE_PARAMS: &[&str] = &[
    "access_token",
    "refresh_token",
    "id_token_hint",
    "token",
    "password",
    "client_secret",
    "code",
];

#[derive(Clone, Debug, Default)]
pub struct SanitizedMakeSpan;

impl<B> MakeSpan<B> for SanitizedMakeSpan {
    fn make_span(&mut self, request: &Request<B>) -> Span {
        tracing::info_span!(
            "request",
            method = %request.method(),
            uri = %sanitize_uri(request.uri()),
            version = ?request.version(),
        )
    }
}

fn is_sensitive(key: &str) -> bool {
    SENSITIVE_PARAMS
        .iter()
        .any(|s| key.eq_ignore_ascii_case(s))
}

/// Path plus query with sensitive values replaced by `[REDACTED]`
fn sanitize_uri(uri: &Uri) -> String {
    let Some(query) = uri.query() else {
        return uri.path().to_string();
    };

    let pairs: Vec<String> = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if is_sensitive(key) => format!("{key}=[REDACTED]"),
            _ => pair.to_string(),
        })
        .collect();

    format!("{}?{}", uri.path(), pairs.join("&"))
}
