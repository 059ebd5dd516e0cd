//! # Function Invoker
//!
//! Runs a built function against one request. Build failures are returned
//! to the caller; anything the runtime raises while executing is turned
//! into a 500 response.

use std::path::PathBuf;
use std::time::Instant;

use axum::http::{HeaderName, HeaderValue};
use serde_json::Value;
use uuid::Uuid;

use super::build::BuildCache;
use super::errors::{FunctionError, FunctionResult};
use super::function::Function;
use super::normalize::{accepts_html, handle_error, normalize_error, RawError};
use super::route::Route;
use super::runtime::{FunctionRequest, FunctionResponse, Invocation};
use super::storage::STORAGE_CONTEXT_HEADER;
use crate::observability::{log_event_with_fields, Event};

/// Options for a single invocation
#[derive(Debug)]
pub struct InvokeOptions {
    /// Passed through to the runtime when a build is forced
    pub build_cache: BuildCache,

    /// Build into this directory before invoking, instead of waiting on the
    /// shared build
    pub build_directory: Option<PathBuf>,

    /// Client context forwarded to the handler
    pub client_context: Option<Value>,

    pub request: FunctionRequest,

    /// Route the request matched, if any
    pub route: Option<Route>,
}

impl InvokeOptions {
    pub fn new(request: FunctionRequest) -> Self {
        Self {
            build_cache: BuildCache::default(),
            build_directory: None,
            client_context: None,
            request,
            route: None,
        }
    }

    pub fn with_build_cache(mut self, cache: BuildCache) -> Self {
        self.build_cache = cache;
        self
    }

    pub fn with_build_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.build_directory = Some(directory.into());
        self
    }

    pub fn with_client_context(mut self, context: Value) -> Self {
        self.client_context = Some(context);
        self
    }

    pub fn with_route(mut self, route: Route) -> Self {
        self.route = Some(route);
        self
    }
}

impl Function {
    /// Invoke the function
    ///
    /// Returns `Err` only when the build the invocation waited on failed.
    /// Execution failures come back as 500 responses.
    pub async fn invoke(&self, options: InvokeOptions) -> FunctionResult<FunctionResponse> {
        let InvokeOptions {
            build_cache,
            build_directory,
            client_context,
            mut request,
            route,
        } = options;

        let snapshot = match build_directory {
            Some(directory) => {
                // The outcome is read back from the snapshot below
                let _ = self.force_build(Some(directory), build_cache).await;
                self.snapshot()
            }
            None => self.wait_for_build().await,
        };

        if let Some(error) = &snapshot.build_error {
            log_event_with_fields(
                Event::InvocationRejected,
                &[
                    ("function", self.name()),
                    ("error", error.to_string().as_str()),
                    ("status", error.status_code().to_string().as_str()),
                ],
            );
            return Err(error.clone());
        }

        let html = accepts_html(request.headers());

        if let Some(context) = self.storage_context() {
            let header = context.encode().and_then(|encoded| {
                HeaderValue::from_str(&encoded).map_err(|e| {
                    FunctionError::Internal(format!("Invalid storage context header: {}", e))
                })
            });
            match header {
                Ok(value) => {
                    request
                        .headers_mut()
                        .insert(HeaderName::from_static(STORAGE_CONTEXT_HEADER), value);
                }
                Err(e) => {
                    return Ok(handle_error(
                        &RawError::Message(e.to_string()),
                        html,
                        self.error_page(),
                    ))
                }
            }
        }

        let invocation_id = Uuid::new_v4().to_string();
        let timeout = self.definition().timeout();
        log_event_with_fields(
            Event::InvocationStart,
            &[
                ("function", self.name()),
                ("invocation_id", invocation_id.as_str()),
                ("path", request.uri().path()),
                ("timeout_s", timeout.as_secs().to_string().as_str()),
            ],
        );

        let invocation = Invocation {
            context: client_context,
            environment: self.environment_variables().clone(),
            function: self.definition().clone(),
            request,
            route,
            timeout,
        };

        let start = Instant::now();
        let outcome = self.runtime().invoke_function(invocation).await;
        let duration_ms = start.elapsed().as_millis().to_string();

        match outcome {
            Ok(response) => {
                log_event_with_fields(
                    Event::InvocationComplete,
                    &[
                        ("function", self.name()),
                        ("invocation_id", invocation_id.as_str()),
                        ("status", response.status().as_str()),
                        ("duration_ms", duration_ms.as_str()),
                    ],
                );
                Ok(response)
            }
            Err(raw) => {
                let normalized = normalize_error(&raw);
                log_event_with_fields(
                    Event::InvocationFailed,
                    &[
                        ("function", self.name()),
                        ("invocation_id", invocation_id.as_str()),
                        ("error_type", normalized.error_type.as_str()),
                        ("error_message", normalized.error_message.as_str()),
                        ("duration_ms", duration_ms.as_str()),
                    ],
                );
                Ok(handle_error(&raw, html, self.error_page()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::http::header::{ACCEPT, CONTENT_TYPE};
    use axum::http::{Method, Request, StatusCode};

    use crate::functions::build::BuildResult;
    use crate::functions::environment::ExecutionEnvironment;
    use crate::functions::function::FunctionDefinition;
    use crate::functions::normalize::{InvocationError, NativeError, REQUIRE_ESM_MESSAGE};
    use crate::functions::runtime::{StubBuild, StubInvocation, StubRuntime};
    use crate::functions::storage::{decode_payload, StorageContext};

    fn request(path: &str) -> FunctionRequest {
        Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Vec::new())
            .unwrap()
    }

    fn function(runtime: Arc<StubRuntime>, name: &str) -> Function {
        Function::new(
            FunctionDefinition::new(name, format!("/p/{name}.js")),
            runtime,
            ExecutionEnvironment::new("v20.11.0"),
        )
    }

    #[tokio::test]
    async fn test_invoke_after_build() {
        let runtime = Arc::new(StubRuntime::succeeding(BuildResult::new("/p/echo.js")));
        let func = function(runtime.clone(), "echo");
        func.build(None, BuildCache::new()).await.unwrap();

        let response = func.invoke(InvokeOptions::new(request("/echo"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let recorded = runtime.last_invocation().unwrap();
        assert_eq!(recorded.timeout, Duration::from_secs(30));
        assert!(recorded.headers.get(STORAGE_CONTEXT_HEADER).is_none());
    }

    #[tokio::test]
    async fn test_invoke_rejects_broken_build() {
        let runtime = Arc::new(StubRuntime::new(StubBuild::Fail("syntax".into())));
        let func = function(runtime.clone(), "broken");
        let _ = func.build(None, BuildCache::new()).await;

        let err = func.invoke(InvokeOptions::new(request("/"))).await.unwrap_err();
        assert_eq!(err, FunctionError::Build("syntax".into()));
        assert_eq!(err.status_code(), 500);
        assert_eq!(runtime.invoke_calls(), 0);
    }

    #[tokio::test]
    async fn test_background_timeout_selected() {
        let runtime = Arc::new(StubRuntime::succeeding(BuildResult::new("/p/job-background.js")));
        let func = function(runtime.clone(), "job-background");

        func.invoke(InvokeOptions::new(request("/"))).await.unwrap();
        assert_eq!(
            runtime.last_invocation().unwrap().timeout,
            Duration::from_secs(900)
        );
    }

    #[tokio::test]
    async fn test_configured_timeouts_reach_runtime() {
        let config: crate::config::FunctionsConfig =
            serde_json::from_str(r#"{"timeouts":{"synchronous":10,"background":60}}"#).unwrap();
        let config = Arc::new(config);

        let runtime = Arc::new(StubRuntime::succeeding(BuildResult::new("/p/quick.js")));
        let func = function(runtime.clone(), "quick").with_config(config.clone());
        func.invoke(InvokeOptions::new(request("/"))).await.unwrap();
        assert_eq!(
            runtime.last_invocation().unwrap().timeout,
            Duration::from_secs(10)
        );

        let func = function(runtime.clone(), "slow-background").with_config(config);
        func.invoke(InvokeOptions::new(request("/"))).await.unwrap();
        assert_eq!(
            runtime.last_invocation().unwrap().timeout,
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_storage_context_header() {
        let runtime = Arc::new(StubRuntime::succeeding(BuildResult::new("/p/blob.js")));
        let context = StorageContext::new("http://localhost:9999", "tok").with_primary_region("eu");
        let func = function(runtime.clone(), "blob").with_storage_context(context.clone());

        func.invoke(InvokeOptions::new(request("/"))).await.unwrap();

        let recorded = runtime.last_invocation().unwrap();
        let header = recorded.headers[STORAGE_CONTEXT_HEADER].to_str().unwrap().to_string();
        assert_eq!(decode_payload(&header).unwrap(), context.payload());
    }

    #[tokio::test]
    async fn test_build_directory_forces_build() {
        let runtime = Arc::new(StubRuntime::succeeding(BuildResult::new("/p/edge.js")));
        let func = function(runtime.clone(), "edge");
        func.build(None, BuildCache::new()).await.unwrap();

        func.invoke(InvokeOptions::new(request("/")).with_build_directory("/tmp/isolated"))
            .await
            .unwrap();

        assert_eq!(runtime.build_calls(), 2);
        assert_eq!(
            runtime.last_build_request().unwrap().target_directory,
            Some(PathBuf::from("/tmp/isolated"))
        );
    }

    #[tokio::test]
    async fn test_native_error_becomes_500() {
        let runtime = Arc::new(
            StubRuntime::succeeding(BuildResult::new("/p/fail.js")).with_invocation(
                StubInvocation::Fail(
                    NativeError::new("Error", "require() of ES Module")
                        .with_code("ERR_REQUIRE_ESM")
                        .into(),
                ),
            ),
        );
        let func = function(runtime, "fail");

        let response = func.invoke(InvokeOptions::new(request("/"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = String::from_utf8(response.body().clone()).unwrap();
        assert_eq!(body, format!("Error: {}\n ", REQUIRE_ESM_MESSAGE));
    }

    #[tokio::test]
    async fn test_structured_error_html_response() {
        let runtime = Arc::new(
            StubRuntime::succeeding(BuildResult::new("/p/fail.js")).with_invocation(
                StubInvocation::Fail(RawError::Structured(InvocationError {
                    error_type: "TypeError".into(),
                    error_message: "nope".into(),
                    stack_trace: vec!["handler (fail.js:1:1)".into()],
                })),
            ),
        );
        let func = function(runtime, "fail");

        let mut req = request("/");
        req.headers_mut()
            .insert(ACCEPT, HeaderValue::from_static("text/html"));

        let response = func.invoke(InvokeOptions::new(req)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.headers()[CONTENT_TYPE], "text/html; charset=utf-8");
        let body = String::from_utf8(response.body().clone()).unwrap();
        assert!(body.contains("TypeError"));
        assert!(body.contains("    at handler (fail.js:1:1)"));
    }

    #[tokio::test]
    async fn test_string_error_is_verbatim() {
        let runtime = Arc::new(
            StubRuntime::succeeding(BuildResult::new("/p/slow.js"))
                .with_invocation(StubInvocation::Fail("Task timed out after 30.00 seconds".into())),
        );
        let func = function(runtime, "slow");

        let response = func.invoke(InvokeOptions::new(request("/"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body(), b"Task timed out after 30.00 seconds");
    }

    #[tokio::test]
    async fn test_route_and_context_forwarded() {
        let runtime = Arc::new(StubRuntime::succeeding(BuildResult::new("/p/api.js")));
        let func = function(runtime.clone(), "api");

        let options = InvokeOptions::new(request("/api/items"))
            .with_route(Route::expression("^/api/.*"))
            .with_client_context(serde_json::json!({"identity": {"url": "x"}}));
        func.invoke(options).await.unwrap();

        let recorded = runtime.last_invocation().unwrap();
        assert_eq!(recorded.route, Some(Route::expression("^/api/.*")));
        assert_eq!(recorded.context.unwrap()["identity"]["url"], "x");
    }
}
