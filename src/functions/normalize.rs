//! # Invocation Error Normalization
//!
//! Runtimes fail in different shapes: native errors raised inside the
//! handler process, errors already serialized across a process boundary,
//! or plain strings. All of them are folded into [`InvocationError`] and
//! turned into a 500 response.

use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, Response, StatusCode};
use serde::{Deserialize, Serialize};

/// Error code raised when CommonJS code requires an ES module
pub const REQUIRE_ESM_CODE: &str = "ERR_REQUIRE_ESM";

/// Message substituted for [`REQUIRE_ESM_CODE`] failures
pub const REQUIRE_ESM_MESSAGE: &str = "a CommonJS file cannot import ES modules. Consider switching your function to ES modules. For more information, refer to https://ntl.fyi/functions-runtime.";

/// Error raised natively by the executing runtime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeError {
    pub name: String,
    pub message: String,
    pub stack: Option<String>,
    pub code: Option<String>,
}

impl NativeError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Canonical error shape
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationError {
    pub error_type: String,
    pub error_message: String,
    #[serde(default)]
    pub stack_trace: Vec<String>,
}

/// Anything a runtime may fail with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawError {
    Native(NativeError),
    Structured(InvocationError),
    Message(String),
}

impl From<NativeError> for RawError {
    fn from(error: NativeError) -> Self {
        RawError::Native(error)
    }
}

impl From<InvocationError> for RawError {
    fn from(error: InvocationError) -> Self {
        RawError::Structured(error)
    }
}

impl From<String> for RawError {
    fn from(message: String) -> Self {
        RawError::Message(message)
    }
}

impl From<&str> for RawError {
    fn from(message: &str) -> Self {
        RawError::Message(message.to_string())
    }
}

/// Fold any runtime failure into an [`InvocationError`]
pub fn normalize_error(raw: &RawError) -> InvocationError {
    match raw {
        RawError::Native(error) => {
            let stack_trace = error
                .stack
                .as_deref()
                .map(|stack| stack.split('\n').map(str::to_string).collect())
                .unwrap_or_default();

            let error_message = if error.code.as_deref() == Some(REQUIRE_ESM_CODE) {
                REQUIRE_ESM_MESSAGE.to_string()
            } else {
                error.message.clone()
            };

            InvocationError {
                error_type: error.name.clone(),
                error_message,
                stack_trace,
            }
        }
        RawError::Structured(error) => InvocationError {
            error_type: error.error_type.clone(),
            error_message: error.error_message.clone(),
            stack_trace: error
                .stack_trace
                .iter()
                .map(|line| format!("    at {}", line))
                .collect(),
        },
        RawError::Message(message) => InvocationError {
            error_type: "Error".to_string(),
            error_message: message.clone(),
            stack_trace: Vec::new(),
        },
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HtmlErrorPayload<'a> {
    error_type: &'a str,
    error_message: &'a str,
    trace: &'a [String],
}

/// Serialize a failure for the client
///
/// HTML clients get JSON with the stack under `trace`; everyone else gets
/// `"<type>: <message>\n <stack>"`.
pub fn format_error(raw: &RawError, accepts_html: bool) -> String {
    let error = normalize_error(raw);

    if accepts_html {
        let payload = HtmlErrorPayload {
            error_type: &error.error_type,
            error_message: &error.error_message,
            trace: &error.stack_trace,
        };
        return serde_json::to_string(&payload)
            .unwrap_or_else(|_| format!("{}: {}", error.error_type, error.error_message));
    }

    format!(
        "{}: {}\n {}",
        error.error_type,
        error.error_message,
        error.stack_trace.join("\n")
    )
}

/// Whether the `Accept` header asks for HTML
pub fn accepts_html(headers: &HeaderMap) -> bool {
    headers
        .get_all(ACCEPT)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.contains("text/html"))
}

/// Renders an error string into an HTML page
pub trait ErrorPageRenderer: Send + Sync {
    fn render(&self, error: &str) -> String;
}

/// Minimal built-in error page
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlErrorPage;

impl ErrorPageRenderer for HtmlErrorPage {
    fn render(&self, error: &str) -> String {
        format!(
            "<!DOCTYPE html>\n<html>\n<head><meta charset=\"utf-8\"><title>Function error</title></head>\n<body>\n<h1>Function invocation failed</h1>\n<pre>{}</pre>\n</body>\n</html>\n",
            escape_html(error)
        )
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}

/// Turn a runtime failure into a 500 response
///
/// Plain strings are used verbatim; other errors go through
/// [`format_error`].
pub fn handle_error(
    raw: &RawError,
    accepts_html: bool,
    renderer: &dyn ErrorPageRenderer,
) -> Response<Vec<u8>> {
    let error_string = match raw {
        RawError::Message(message) => message.clone(),
        other => format_error(other, accepts_html),
    };

    let (body, content_type) = if accepts_html {
        (renderer.render(&error_string), "text/html; charset=utf-8")
    } else {
        (error_string, "text/plain; charset=utf-8")
    };

    let mut response = Response::new(body.into_bytes());
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_with_stack() {
        let raw = RawError::from(
            NativeError::new("TypeError", "x is undefined")
                .with_stack("TypeError: x is undefined\n    at handler (/fns/a.js:3:9)"),
        );

        let error = normalize_error(&raw);
        assert_eq!(error.error_type, "TypeError");
        assert_eq!(error.error_message, "x is undefined");
        assert_eq!(error.stack_trace.len(), 2);
        assert_eq!(error.stack_trace[1], "    at handler (/fns/a.js:3:9)");
    }

    #[test]
    fn test_native_error_without_stack() {
        let error = normalize_error(&NativeError::new("Error", "boom").into());
        assert!(error.stack_trace.is_empty());
    }

    #[test]
    fn test_require_esm_is_rewritten() {
        let raw = RawError::from(
            NativeError::new("Error", "require() of ES Module not supported")
                .with_code(REQUIRE_ESM_CODE)
                .with_stack("Error [ERR_REQUIRE_ESM]\n    at x"),
        );

        let error = normalize_error(&raw);
        assert_eq!(error.error_message, REQUIRE_ESM_MESSAGE);
        assert!(error.error_message.contains("https://ntl.fyi/functions-runtime"));
        assert_eq!(error.error_type, "Error");
        assert_eq!(error.stack_trace.len(), 2);
    }

    #[test]
    fn test_structured_error_is_prefixed() {
        let raw = RawError::from(InvocationError {
            error_type: "Runtime.HandlerNotFound".into(),
            error_message: "index.handler is undefined".into(),
            stack_trace: vec!["Module.load (loader.js:1:1)".into()],
        });

        let error = normalize_error(&raw);
        assert_eq!(error.stack_trace, vec!["    at Module.load (loader.js:1:1)"]);
        assert_eq!(error.error_type, "Runtime.HandlerNotFound");
    }

    #[test]
    fn test_format_plain_text() {
        let raw = RawError::from(NativeError::new("Error", "boom").with_stack("a\nb"));
        assert_eq!(format_error(&raw, false), "Error: boom\n a\nb");
    }

    #[test]
    fn test_format_html_carries_trace() {
        let raw = RawError::from(NativeError::new("Error", "boom").with_stack("a\nb"));
        let formatted = format_error(&raw, true);

        let parsed: serde_json::Value = serde_json::from_str(&formatted).unwrap();
        assert_eq!(parsed["errorType"], "Error");
        assert_eq!(parsed["errorMessage"], "boom");
        assert_eq!(parsed["trace"], serde_json::json!(["a", "b"]));
        assert!(parsed.get("stackTrace").is_none());
    }

    #[test]
    fn test_handle_error_plain_string_is_verbatim() {
        let response = handle_error(&"function timed out".into(), false, &HtmlErrorPage);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), b"function timed out");
        assert_eq!(
            response.headers()[CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
    }

    #[test]
    fn test_handle_error_html() {
        let raw = RawError::from(NativeError::new("Error", "<boom>"));
        let response = handle_error(&raw, true, &HtmlErrorPage);

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        let body = String::from_utf8(response.body().clone()).unwrap();
        assert!(body.contains("&lt;boom&gt;"));
        assert!(!body.contains("<boom>"));
    }

    #[test]
    fn test_accepts_html() {
        let mut headers = HeaderMap::new();
        assert!(!accepts_html(&headers));

        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        assert!(!accepts_html(&headers));

        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        assert!(accepts_html(&headers));
    }
}
