//! # Function Runtime
//!
//! The runtime compiles function sources and executes the result. The
//! orchestrator only drives it through the [`Runtime`] trait; a stubbed
//! implementation is provided for tests and local experiments.

use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use axum::http::{HeaderMap, Method, Request, Response, StatusCode};
use serde_json::{json, Value};

use super::build::{BuildCache, BuildResult};
use super::errors::{FunctionError, FunctionResult};
use super::function::FunctionDefinition;
use super::normalize::RawError;
use super::route::Route;
use crate::config::FunctionsConfig;

/// Boxed future returned by runtime operations
pub type RuntimeFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Request handed to a function
pub type FunctionRequest = Request<Vec<u8>>;

/// Response produced by a function
pub type FunctionResponse = Response<Vec<u8>>;

/// Compiles a function given a build cache; `Ok(None)` means the runtime
/// produced nothing
pub type BuildFunction =
    Box<dyn FnOnce(BuildCache) -> RuntimeFuture<'static, FunctionResult<Option<BuildResult>>> + Send>;

/// Everything a runtime needs to prepare a build
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub function: Arc<FunctionDefinition>,
    pub config: Arc<FunctionsConfig>,
    /// Source directory of the function
    pub directory: PathBuf,
    pub project_root: PathBuf,
    /// Output directory; the runtime picks one when absent
    pub target_directory: Option<PathBuf>,
}

/// A single execution of a built function
#[derive(Debug)]
pub struct Invocation {
    /// Client context forwarded to the handler
    pub context: Option<Value>,
    pub environment: HashMap<String, String>,
    pub function: Arc<FunctionDefinition>,
    pub request: FunctionRequest,
    pub route: Option<Route>,
    pub timeout: Duration,
}

/// Trait for function runtime implementations
pub trait Runtime: Send + Sync {
    /// Prepare a build function for `request`
    fn get_build_function(&self, request: BuildRequest) -> RuntimeFuture<'_, FunctionResult<BuildFunction>>;

    /// Execute the built function; timeouts are enforced here
    fn invoke_function(
        &self,
        invocation: Invocation,
    ) -> RuntimeFuture<'_, Result<FunctionResponse, RawError>>;

    /// Get runtime name for logging
    fn name(&self) -> &'static str;
}

/// What the stub does when asked to build
#[derive(Debug, Clone)]
pub enum StubBuild {
    Succeed(BuildResult),
    Fail(String),
    Empty,
}

/// What the stub does when invoked
#[derive(Debug, Clone)]
pub enum StubInvocation {
    /// Reply 200 with a JSON description of the request
    Echo,
    Respond { status: StatusCode, body: String },
    Fail(RawError),
}

/// Observed details of the last invocation
#[derive(Debug, Clone)]
pub struct RecordedInvocation {
    pub function: String,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub route: Option<Route>,
    pub timeout: Duration,
    pub context: Option<Value>,
}

/// Stubbed runtime (no actual compilation or execution)
#[derive(Debug)]
pub struct StubRuntime {
    build: RwLock<StubBuild>,
    build_delay: Duration,
    invocation: RwLock<StubInvocation>,
    build_calls: Arc<AtomicUsize>,
    invoke_calls: AtomicUsize,
    last_build_request: Mutex<Option<BuildRequest>>,
    last_invocation: Mutex<Option<RecordedInvocation>>,
}

impl Default for StubRuntime {
    fn default() -> Self {
        Self::new(StubBuild::Empty)
    }
}

impl StubRuntime {
    pub fn new(build: StubBuild) -> Self {
        Self {
            build: RwLock::new(build),
            build_delay: Duration::ZERO,
            invocation: RwLock::new(StubInvocation::Echo),
            build_calls: Arc::new(AtomicUsize::new(0)),
            invoke_calls: AtomicUsize::new(0),
            last_build_request: Mutex::new(None),
            last_invocation: Mutex::new(None),
        }
    }

    /// Stub that always builds `result`
    pub fn succeeding(result: BuildResult) -> Self {
        Self::new(StubBuild::Succeed(result))
    }

    /// Hold every build for `delay` before resolving
    pub fn with_build_delay(mut self, delay: Duration) -> Self {
        self.build_delay = delay;
        self
    }

    pub fn with_invocation(self, invocation: StubInvocation) -> Self {
        self.set_invocation(invocation);
        self
    }

    pub fn set_build(&self, build: StubBuild) {
        if let Ok(mut current) = self.build.write() {
            *current = build;
        }
    }

    pub fn set_invocation(&self, invocation: StubInvocation) {
        if let Ok(mut current) = self.invocation.write() {
            *current = invocation;
        }
    }

    /// Number of compilations actually started
    pub fn build_calls(&self) -> usize {
        self.build_calls.load(Ordering::SeqCst)
    }

    pub fn invoke_calls(&self) -> usize {
        self.invoke_calls.load(Ordering::SeqCst)
    }

    pub fn last_build_request(&self) -> Option<BuildRequest> {
        self.last_build_request.lock().ok().and_then(|r| r.clone())
    }

    pub fn last_invocation(&self) -> Option<RecordedInvocation> {
        self.last_invocation.lock().ok().and_then(|r| r.clone())
    }

    fn current_build(&self) -> FunctionResult<StubBuild> {
        self.build
            .read()
            .map(|b| b.clone())
            .map_err(|_| FunctionError::Internal("Lock poisoned".into()))
    }
}

impl Runtime for StubRuntime {
    fn get_build_function(&self, request: BuildRequest) -> RuntimeFuture<'_, FunctionResult<BuildFunction>> {
        Box::pin(async move {
            let outcome = self.current_build()?;
            let fingerprint = request.function.name.clone();
            if let Ok(mut last) = self.last_build_request.lock() {
                *last = Some(request);
            }

            let calls = Arc::clone(&self.build_calls);
            let delay = self.build_delay;

            let build: BuildFunction = Box::new(move |cache: BuildCache| {
                Box::pin(async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    match outcome {
                        StubBuild::Succeed(result) => {
                            cache.insert(fingerprint, result.clone());
                            Ok(Some(result))
                        }
                        StubBuild::Fail(message) => Err(FunctionError::Build(message)),
                        StubBuild::Empty => Ok(None),
                    }
                }) as RuntimeFuture<'static, _>
            });

            Ok(build)
        })
    }

    fn invoke_function(
        &self,
        invocation: Invocation,
    ) -> RuntimeFuture<'_, Result<FunctionResponse, RawError>> {
        Box::pin(async move {
            self.invoke_calls.fetch_add(1, Ordering::SeqCst);

            let recorded = RecordedInvocation {
                function: invocation.function.name.clone(),
                method: invocation.request.method().clone(),
                path: invocation.request.uri().path().to_string(),
                headers: invocation.request.headers().clone(),
                route: invocation.route.clone(),
                timeout: invocation.timeout,
                context: invocation.context.clone(),
            };
            if let Ok(mut last) = self.last_invocation.lock() {
                *last = Some(recorded.clone());
            }

            let behavior = self
                .invocation
                .read()
                .map(|b| b.clone())
                .map_err(|_| RawError::Message("Lock poisoned".into()))?;

            match behavior {
                StubInvocation::Echo => {
                    let body = json!({
                        "function": recorded.function,
                        "method": recorded.method.as_str(),
                        "path": recorded.path,
                    });
                    Ok(Response::new(body.to_string().into_bytes()))
                }
                StubInvocation::Respond { status, body } => {
                    let mut response = Response::new(body.into_bytes());
                    *response.status_mut() = status;
                    Ok(response)
                }
                StubInvocation::Fail(error) => Err(error),
            }
        })
    }

    fn name(&self) -> &'static str {
        "stub"
    }
}
