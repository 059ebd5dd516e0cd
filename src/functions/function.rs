//! # Function Descriptor
//!
//! A [`Function`] owns everything the orchestrator knows about one
//! deployable function: its identity, the runtime that builds and runs it,
//! and the state derived from the last build.
//!
//! Build-derived state lives in an immutable [`BuildSnapshot`]. A build
//! commits by swapping in a whole new snapshot, so readers always see the
//! fields of exactly one build. At most one build is in flight per
//! function; callers arriving while it runs share its outcome.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;

use axum::http::Method;
use chrono::{DateTime, Utc};
use futures_util::future::{FutureExt, Shared};
use serde::{Deserialize, Serialize};

use super::build::{extension_of, BuildCache, BuildData, BuildResult, BuildSummary, ModuleFormat, SrcFilesDiff};
use super::environment::{ExecutionEnvironment, V2_MIN_RUNTIME_VERSION};
use super::errors::{FunctionError, FunctionResult};
use super::normalize::{ErrorPageRenderer, HtmlErrorPage};
use super::route::{Route, RouteTable};
use super::runtime::{BuildRequest, Runtime, RuntimeFuture};
use super::schedule;
use super::storage::StorageContext;
use crate::config::{FunctionsConfig, ServerSettings, TimeoutSettings};
use crate::observability::{log_event_with_fields, Event};

/// Name suffix marking a background function
pub const BACKGROUND_FUNCTION_SUFFIX: &str = "-background";

/// Entry file extensions treated as TypeScript
pub const TYPESCRIPT_EXTENSIONS: [&str; 3] = [".ts", ".mts", ".cts"];

/// Path prefix under which every function is reachable by name
pub const FUNCTIONS_URL_PREFIX: &str = "/.netlify/functions/";

/// Outcome of a build, shared by every caller that joined it
pub type BuildOutcome = FunctionResult<BuildSummary>;

type PendingBuild = Shared<RuntimeFuture<'static, BuildOutcome>>;

/// Immutable identity of a function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub display_name: String,
    pub main_file: PathBuf,
    /// Source directory
    pub directory: PathBuf,
    pub project_root: PathBuf,
    /// Seconds
    pub timeout_synchronous: u64,
    /// Seconds
    pub timeout_background: u64,
}

impl FunctionDefinition {
    /// Create a definition; the source directory defaults to the parent of
    /// `main_file`
    pub fn new(name: impl Into<String>, main_file: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let main_file = main_file.into();
        let directory = main_file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let timeouts = TimeoutSettings::default();

        Self {
            display_name: name.clone(),
            name,
            main_file,
            project_root: directory.clone(),
            directory,
            timeout_synchronous: timeouts.synchronous,
            timeout_background: timeouts.background,
        }
    }

    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_project_root(mut self, project_root: impl Into<PathBuf>) -> Self {
        self.project_root = project_root.into();
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutSettings) -> Self {
        self.apply_timeouts(timeouts);
        self
    }

    fn apply_timeouts(&mut self, timeouts: TimeoutSettings) {
        self.timeout_synchronous = timeouts.synchronous;
        self.timeout_background = timeouts.background;
    }

    /// Background functions are recognized by their name suffix
    pub fn is_background(&self) -> bool {
        self.name.ends_with(BACKGROUND_FUNCTION_SUFFIX)
    }

    /// Name matches `^[A-Za-z0-9_-]+$`
    pub fn has_valid_name(&self) -> bool {
        !self.name.is_empty()
            && self
                .name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    }

    /// Timeout applied to an invocation of this function
    pub fn timeout(&self) -> Duration {
        if self.is_background() {
            Duration::from_secs(self.timeout_background)
        } else {
            Duration::from_secs(self.timeout_synchronous)
        }
    }
}

/// State committed by the most recent build attempt
#[derive(Debug, Clone, Default)]
pub struct BuildSnapshot {
    /// Last successful build
    pub build_data: Option<BuildData>,
    /// Failure of the most recent attempt
    pub build_error: Option<FunctionError>,
    /// Source files of the last successful build
    pub src_files: BTreeSet<PathBuf>,
    pub routes: RouteTable,
    pub schedule: Option<String>,
}

/// A deployable function and its build lifecycle
pub struct Function {
    definition: Arc<FunctionDefinition>,
    config: Arc<FunctionsConfig>,
    runtime: Arc<dyn Runtime>,
    environment: ExecutionEnvironment,
    storage_context: Option<StorageContext>,
    environment_variables: HashMap<String, String>,
    error_page: Arc<dyn ErrorPageRenderer>,
    state: Arc<RwLock<Arc<BuildSnapshot>>>,
    build_queue: Mutex<Option<PendingBuild>>,
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("definition", &self.definition)
            .field("runtime", &self.runtime.name())
            .field("environment", &self.environment)
            .finish_non_exhaustive()
    }
}

impl Function {
    /// Create a function with no build yet
    pub fn new(
        definition: FunctionDefinition,
        runtime: Arc<dyn Runtime>,
        environment: ExecutionEnvironment,
    ) -> Self {
        Self {
            definition: Arc::new(definition),
            config: Arc::new(FunctionsConfig::default()),
            runtime,
            environment,
            storage_context: None,
            environment_variables: HashMap::new(),
            error_page: Arc::new(HtmlErrorPage),
            state: Arc::new(RwLock::new(Arc::new(BuildSnapshot::default()))),
            build_queue: Mutex::new(None),
        }
    }

    /// Attach project configuration; picks up the configured schedule and
    /// timeouts
    pub fn with_config(mut self, config: Arc<FunctionsConfig>) -> Self {
        let schedule = config
            .schedule_for(&self.definition.name)
            .map(str::to_string);
        Arc::make_mut(&mut self.definition).apply_timeouts(config.timeouts);
        self.config = config;
        self.replace_snapshot(|snapshot| snapshot.schedule = schedule);
        self
    }

    /// Routes declared before any build
    pub fn with_routes(self, routes: Vec<Route>, excluded_routes: Vec<Route>) -> Self {
        self.replace_snapshot(|snapshot| snapshot.routes = RouteTable::new(routes, excluded_routes));
        self
    }

    pub fn with_storage_context(mut self, context: StorageContext) -> Self {
        self.storage_context = Some(context);
        self
    }

    /// Variables exposed to the handler at invocation
    pub fn with_environment_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.environment_variables = variables;
        self
    }

    pub fn with_error_page(mut self, renderer: Arc<dyn ErrorPageRenderer>) -> Self {
        self.error_page = renderer;
        self
    }

    // ==================
    // Identity
    // ==================

    pub fn definition(&self) -> &Arc<FunctionDefinition> {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn display_name(&self) -> &str {
        &self.definition.display_name
    }

    pub fn is_background(&self) -> bool {
        self.definition.is_background()
    }

    pub fn has_valid_name(&self) -> bool {
        self.definition.has_valid_name()
    }

    pub fn environment(&self) -> &ExecutionEnvironment {
        &self.environment
    }

    /// Local URL the function is served under by default
    pub fn url(&self) -> String {
        url_for(&self.config.server, &self.definition.name)
    }

    pub(crate) fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    pub(crate) fn storage_context(&self) -> Option<&StorageContext> {
        self.storage_context.as_ref()
    }

    pub(crate) fn environment_variables(&self) -> &HashMap<String, String> {
        &self.environment_variables
    }

    pub(crate) fn error_page(&self) -> &dyn ErrorPageRenderer {
        self.error_page.as_ref()
    }

    // ==================
    // Snapshot access
    // ==================

    /// Currently committed state, without waiting for a build in flight
    pub fn snapshot(&self) -> Arc<BuildSnapshot> {
        match self.state.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    fn replace_snapshot(&self, update: impl FnOnce(&mut BuildSnapshot)) {
        let mut guard = write_state(&self.state);
        let mut next = BuildSnapshot::clone(&guard);
        update(&mut next);
        *guard = Arc::new(next);
    }

    pub fn build_error(&self) -> Option<FunctionError> {
        self.snapshot().build_error.clone()
    }

    pub fn src_files(&self) -> BTreeSet<PathBuf> {
        self.snapshot().src_files.clone()
    }

    pub fn routes(&self) -> Vec<Route> {
        self.snapshot().routes.routes()
    }

    pub fn excluded_routes(&self) -> Vec<Route> {
        self.snapshot().routes.excluded_routes()
    }

    /// Source files added and removed relative to the committed build
    pub fn src_files_diff(&self, next: &BTreeSet<PathBuf>) -> SrcFilesDiff {
        SrcFilesDiff::between(&self.snapshot().src_files, next)
    }

    /// Replace routes after a build
    pub fn set_routes(&self, routes: Vec<Route>, excluded_routes: Vec<Route>) -> FunctionResult<()> {
        for route in routes.iter().chain(excluded_routes.iter()) {
            route.validate()?;
        }
        let count = routes.len().to_string();
        self.replace_snapshot(|snapshot| snapshot.routes = RouteTable::new(routes, excluded_routes));
        log_event_with_fields(
            Event::RoutesUpdated,
            &[("function", self.name()), ("routes", count.as_str())],
        );
        Ok(())
    }

    /// First declared route serving `raw_path`, unless excluded
    pub fn match_url_path(&self, raw_path: &str, method: &Method) -> Option<Route> {
        self.snapshot()
            .routes
            .match_url_path(raw_path, method)
            .cloned()
    }

    // ==================
    // Build coordination
    // ==================

    /// Build the function, or join the build already in flight
    pub async fn build(&self, target_directory: Option<PathBuf>, cache: BuildCache) -> BuildOutcome {
        self.enqueue_build(target_directory, cache, false).await
    }

    /// Start a new build even if one is in flight
    ///
    /// The new build takes over the queue slot. Callers must not force two
    /// builds of the same function concurrently.
    pub async fn force_build(&self, target_directory: Option<PathBuf>, cache: BuildCache) -> BuildOutcome {
        self.enqueue_build(target_directory, cache, true).await
    }

    /// Wait for the build in flight, if any, and return the committed state
    pub async fn wait_for_build(&self) -> Arc<BuildSnapshot> {
        let pending = self.lock_queue().clone();
        if let Some(pending) = pending {
            // The outcome is also recorded in the snapshot
            let _ = pending.await;
        }
        self.snapshot()
    }

    /// Committed build data once any build in flight has finished
    pub async fn build_data(&self) -> Option<BuildData> {
        self.wait_for_build().await.build_data.clone()
    }

    fn lock_queue(&self) -> MutexGuard<'_, Option<PendingBuild>> {
        match self.build_queue.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn enqueue_build(&self, target_directory: Option<PathBuf>, cache: BuildCache, force: bool) -> PendingBuild {
        let mut queue = self.lock_queue();

        if !force {
            if let Some(pending) = queue.as_ref() {
                if pending.peek().is_none() {
                    log_event_with_fields(Event::BuildJoined, &[("function", self.name())]);
                    return pending.clone();
                }
            }
        }

        let pending = self.start_build(target_directory, cache).shared();
        *queue = Some(pending.clone());
        pending
    }

    fn start_build(&self, target_directory: Option<PathBuf>, cache: BuildCache) -> RuntimeFuture<'static, BuildOutcome> {
        let request = BuildRequest {
            function: Arc::clone(&self.definition),
            config: Arc::clone(&self.config),
            directory: self.definition.directory.clone(),
            project_root: self.definition.project_root.clone(),
            target_directory,
        };
        let runtime = Arc::clone(&self.runtime);
        let state = Arc::clone(&self.state);
        let environment = self.environment.clone();

        Box::pin(async move {
            let name = request.function.name.clone();
            log_event_with_fields(
                Event::BuildStart,
                &[("function", name.as_str()), ("runtime", runtime.name())],
            );

            let result = run_build(runtime, request, cache).await;
            commit_build(&state, &environment, &name, result)
        })
    }

    // ==================
    // Derived accessors
    // ==================

    /// Whether a schedule is configured, once any build in flight is done
    pub async fn is_scheduled(&self) -> bool {
        self.wait_for_build().await.schedule.is_some()
    }

    /// Next trigger time in UTC, if scheduled
    pub async fn next_run(&self) -> FunctionResult<Option<DateTime<Utc>>> {
        let snapshot = self.wait_for_build().await;
        match &snapshot.schedule {
            Some(expression) => schedule::next_run(expression).map(Some),
            None => Ok(None),
        }
    }

    /// False only for API version 2 builds on a too-old runtime
    pub fn is_supported(&self) -> bool {
        self.snapshot()
            .build_data
            .as_ref()
            .map(|data| self.environment.supports_api_version(data.runtime_api_version))
            .unwrap_or(true)
    }

    /// Handler API version of the committed build, 1 before any build
    pub fn runtime_api_version(&self) -> u32 {
        self.snapshot()
            .build_data
            .as_ref()
            .map(|data| data.runtime_api_version)
            .unwrap_or(1)
    }

    /// File name of the committed entry file
    pub fn filename(&self) -> Option<String> {
        self.snapshot()
            .build_data
            .as_ref()
            .and_then(|data| data.main_file.file_name())
            .map(|name| name.to_string_lossy().into_owned())
    }

    pub fn is_typescript(&self) -> bool {
        self.snapshot()
            .build_data
            .as_ref()
            .and_then(BuildData::extension)
            .map(|ext| TYPESCRIPT_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// Extension that would let an API version 2 function load as ESM
    pub fn recommended_extension(&self) -> Option<&'static str> {
        let snapshot = self.snapshot();
        let data = snapshot.build_data.as_ref()?;

        if data.runtime_api_version != 2 || data.output_module_format == ModuleFormat::Esm {
            return None;
        }

        match extension_of(&data.main_file).as_deref() {
            Some(".ts") => Some(".mts"),
            Some(".js") => Some(".mjs"),
            _ => None,
        }
    }
}

pub(crate) fn url_for(server: &ServerSettings, name: &str) -> String {
    format!("{}{}{}", server.base_url(), FUNCTIONS_URL_PREFIX, name)
}

fn write_state(
    state: &RwLock<Arc<BuildSnapshot>>,
) -> std::sync::RwLockWriteGuard<'_, Arc<BuildSnapshot>> {
    match state.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

async fn run_build(
    runtime: Arc<dyn Runtime>,
    request: BuildRequest,
    cache: BuildCache,
) -> FunctionResult<BuildResult> {
    let name = request.function.name.clone();
    let build = runtime.get_build_function(request).await?;
    build(cache)
        .await?
        .ok_or(FunctionError::MissingBuildResult(name))
}

/// Swap in the snapshot produced by one build attempt
fn commit_build(
    state: &RwLock<Arc<BuildSnapshot>>,
    environment: &ExecutionEnvironment,
    name: &str,
    result: FunctionResult<BuildResult>,
) -> BuildOutcome {
    let mut guard = write_state(state);
    let previous = Arc::clone(&guard);

    let result = match result {
        Ok(result) => result,
        Err(error) => {
            let mut next = BuildSnapshot::clone(&previous);
            next.build_error = Some(error.clone());
            *guard = Arc::new(next);
            drop(guard);

            log_event_with_fields(
                Event::BuildFailed,
                &[("function", name), ("error", error.to_string().as_str())],
            );
            return Err(error);
        }
    };

    let data = BuildData::from(&result);
    let src_files_diff = SrcFilesDiff::between(&previous.src_files, &data.src_files);

    // Routes declared by the build replace the table; otherwise keep it
    let routes = match result.routes {
        Some(routes) => RouteTable::new(routes, result.excluded_routes.unwrap_or_default()),
        None => previous.routes.clone(),
    };

    let build_error = if environment.supports_api_version(data.runtime_api_version) {
        None
    } else {
        Some(FunctionError::UnsupportedRuntime {
            required: V2_MIN_RUNTIME_VERSION.to_string(),
            installed: environment.version().to_string(),
        })
    };

    let summary = BuildSummary {
        included_files: data.included_files.clone(),
        src_files_diff,
    };

    *guard = Arc::new(BuildSnapshot {
        schedule: result.schedule.or_else(|| previous.schedule.clone()),
        src_files: data.src_files.clone(),
        build_data: Some(data),
        build_error: build_error.clone(),
        routes,
    });
    drop(guard);

    match build_error {
        Some(error) => {
            log_event_with_fields(
                Event::BuildUnsupported,
                &[("function", name), ("error", error.to_string().as_str())],
            );
            Err(error)
        }
        None => {
            log_event_with_fields(
                Event::BuildComplete,
                &[
                    ("function", name),
                    ("added", summary.src_files_diff.added.len().to_string().as_str()),
                    ("deleted", summary.src_files_diff.deleted.len().to_string().as_str()),
                ],
            );
            Ok(summary)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::runtime::{StubBuild, StubRuntime};

    fn env(version: &str) -> ExecutionEnvironment {
        ExecutionEnvironment::new(version)
    }

    fn function_with(runtime: Arc<StubRuntime>, name: &str, version: &str) -> Function {
        Function::new(
            FunctionDefinition::new(name, format!("/project/functions/{name}/{name}.js"))
                .with_project_root("/project"),
            runtime,
            env(version),
        )
    }

    fn result_for(main_file: &str, src_files: &[&str]) -> BuildResult {
        BuildResult {
            src_files: src_files.iter().map(PathBuf::from).collect(),
            ..BuildResult::new(main_file)
        }
    }

    #[test]
    fn test_definition_defaults() {
        let def = FunctionDefinition::new("hello", "/project/functions/hello/index.js");
        assert_eq!(def.directory, PathBuf::from("/project/functions/hello"));
        assert_eq!(def.display_name, "hello");
        assert!(!def.is_background());
        assert_eq!(def.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_background_timeout() {
        let def = FunctionDefinition::new("hello-background", "/f/hello-background.js")
            .with_timeouts(TimeoutSettings { synchronous: 10, background: 600 });
        assert!(def.is_background());
        assert_eq!(def.timeout(), Duration::from_secs(600));
    }

    #[test]
    fn test_valid_names() {
        assert!(FunctionDefinition::new("hello_World-2", "/f/a.js").has_valid_name());
        assert!(!FunctionDefinition::new("hello world", "/f/a.js").has_valid_name());
        assert!(!FunctionDefinition::new("héllo", "/f/a.js").has_valid_name());
        assert!(!FunctionDefinition::new("", "/f/a.js").has_valid_name());
    }

    #[test]
    fn test_url() {
        let runtime = Arc::new(StubRuntime::default());
        let mut config = FunctionsConfig::default();
        config.server = ServerSettings::with_port(8888);

        let func = function_with(runtime, "hello", "20.0.0").with_config(Arc::new(config));
        assert_eq!(func.url(), "http://localhost:8888/.netlify/functions/hello");
    }

    #[tokio::test]
    async fn test_build_commits_snapshot() {
        let runtime = Arc::new(StubRuntime::succeeding(result_for(
            "/project/functions/hello/hello.ts",
            &["/project/functions/hello/hello.ts", "/project/lib/util.ts"],
        )));
        let func = function_with(runtime.clone(), "hello", "20.0.0");

        let summary = func.build(None, BuildCache::new()).await.unwrap();
        assert_eq!(summary.src_files_diff.added.len(), 2);
        assert!(summary.src_files_diff.deleted.is_empty());

        assert_eq!(func.filename().as_deref(), Some("hello.ts"));
        assert!(func.is_typescript());
        assert_eq!(func.src_files().len(), 2);
        assert!(func.build_error().is_none());
        assert_eq!(runtime.build_calls(), 1);

        let request = runtime.last_build_request().unwrap();
        assert_eq!(request.directory, PathBuf::from("/project/functions/hello"));
        assert_eq!(request.project_root, PathBuf::from("/project"));
    }

    #[tokio::test]
    async fn test_diff_after_commit_is_empty() {
        let files = ["/p/a.js", "/p/b.js"];
        let runtime = Arc::new(StubRuntime::succeeding(result_for("/p/a.js", &files)));
        let func = function_with(runtime, "a", "20.0.0");
        func.build(None, BuildCache::new()).await.unwrap();

        let same: BTreeSet<PathBuf> = files.iter().map(PathBuf::from).collect();
        assert!(func.src_files_diff(&same).is_empty());
        assert!(func.src_files_diff(&same).is_empty());
    }

    #[tokio::test]
    async fn test_failed_build_keeps_previous_state() {
        let mut result = result_for("/p/a.js", &["/p/a.js"]);
        result.routes = Some(vec![Route::literal("/a")]);
        let runtime = Arc::new(StubRuntime::succeeding(result));
        let func = function_with(runtime.clone(), "a", "20.0.0");
        func.build(None, BuildCache::new()).await.unwrap();

        runtime.set_build(StubBuild::Fail("unexpected token".into()));
        let err = func.build(None, BuildCache::new()).await.unwrap_err();
        assert_eq!(err, FunctionError::Build("unexpected token".into()));

        let snapshot = func.snapshot();
        assert_eq!(snapshot.build_error, Some(err));
        assert!(snapshot.build_data.is_some());
        assert_eq!(func.src_files().len(), 1);
        assert_eq!(func.routes(), vec![Route::literal("/a")]);
    }

    #[tokio::test]
    async fn test_success_clears_build_error() {
        let runtime = Arc::new(StubRuntime::new(StubBuild::Fail("boom".into())));
        let func = function_with(runtime.clone(), "a", "20.0.0");
        assert!(func.build(None, BuildCache::new()).await.is_err());
        assert!(func.build_error().is_some());
        assert!(func.snapshot().build_data.is_none());

        runtime.set_build(StubBuild::Succeed(BuildResult::new("/p/a.js")));
        func.build(None, BuildCache::new()).await.unwrap();
        assert!(func.build_error().is_none());
    }

    #[tokio::test]
    async fn test_missing_build_result() {
        let runtime = Arc::new(StubRuntime::new(StubBuild::Empty));
        let func = function_with(runtime, "empty", "20.0.0");

        let err = func.build(None, BuildCache::new()).await.unwrap_err();
        assert_eq!(err, FunctionError::MissingBuildResult("empty".into()));
        assert_eq!(func.build_error(), Some(err));
    }

    #[tokio::test]
    async fn test_unsupported_runtime_version() {
        let mut result = BuildResult::new("/p/v2.js");
        result.runtime_api_version = 2;
        let runtime = Arc::new(StubRuntime::succeeding(result));
        let func = function_with(runtime, "v2", "v16.20.0");

        assert!(func.is_supported());
        let err = func.build(None, BuildCache::new()).await.unwrap_err();
        assert!(matches!(err, FunctionError::UnsupportedRuntime { .. }));
        assert!(!func.is_supported());
        assert_eq!(func.runtime_api_version(), 2);
        assert!(func.build_error().is_some());
    }

    #[tokio::test]
    async fn test_schedule_precedence() {
        let mut config = FunctionsConfig::default();
        config.functions.insert(
            "cron".into(),
            crate::config::FunctionSettings { schedule: Some("@daily".into()) },
        );

        let runtime = Arc::new(StubRuntime::succeeding(BuildResult::new("/p/cron.js")));
        let func = function_with(runtime.clone(), "cron", "20.0.0").with_config(Arc::new(config));
        assert!(func.is_scheduled().await);

        func.build(None, BuildCache::new()).await.unwrap();
        assert_eq!(func.snapshot().schedule.as_deref(), Some("@daily"));

        let mut declared = BuildResult::new("/p/cron.js");
        declared.schedule = Some("0 * * * *".into());
        runtime.set_build(StubBuild::Succeed(declared));
        func.build(None, BuildCache::new()).await.unwrap();
        assert_eq!(func.snapshot().schedule.as_deref(), Some("0 * * * *"));
        assert!(func.next_run().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_recommended_extension() {
        let cases = [
            ("/p/f.ts", 2, ModuleFormat::Cjs, Some(".mts")),
            ("/p/f.js", 2, ModuleFormat::Cjs, Some(".mjs")),
            ("/p/f.mjs", 2, ModuleFormat::Cjs, None),
            ("/p/f.ts", 2, ModuleFormat::Esm, None),
            ("/p/f.ts", 1, ModuleFormat::Cjs, None),
        ];

        for (main_file, version, format, expected) in cases {
            let mut result = BuildResult::new(main_file);
            result.runtime_api_version = version;
            result.output_module_format = format;
            let func = function_with(Arc::new(StubRuntime::succeeding(result)), "f", "20.0.0");
            func.build(None, BuildCache::new()).await.unwrap();
            assert_eq!(func.recommended_extension(), expected, "{main_file} v{version}");
        }
    }

    #[tokio::test]
    async fn test_build_routes_replace_declared_routes() {
        let runtime = Arc::new(StubRuntime::succeeding(BuildResult::new("/p/r.js")));
        let func = function_with(runtime.clone(), "r", "20.0.0")
            .with_routes(vec![Route::literal("/initial")], vec![]);

        // No routes in the build result: declared routes survive
        func.build(None, BuildCache::new()).await.unwrap();
        assert!(func.match_url_path("/initial", &Method::GET).is_some());

        let mut result = BuildResult::new("/p/r.js");
        result.routes = Some(vec![Route::literal("/built")]);
        runtime.set_build(StubBuild::Succeed(result));
        func.build(None, BuildCache::new()).await.unwrap();

        assert!(func.match_url_path("/initial", &Method::GET).is_none());
        assert!(func.match_url_path("/built/", &Method::GET).is_some());
    }

    #[test]
    fn test_set_routes_validates() {
        let func = function_with(Arc::new(StubRuntime::default()), "r", "20.0.0");
        assert!(func
            .set_routes(vec![Route::expression("(")], vec![])
            .is_err());
        assert!(func.routes().is_empty());

        func.set_routes(vec![Route::literal("/x")], vec![Route::literal("/x")])
            .unwrap();
        assert!(func.match_url_path("/x", &Method::GET).is_none());
    }
}
