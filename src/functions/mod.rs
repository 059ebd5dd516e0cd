//! # Functions
//!
//! Local build and invocation of serverless functions: one [`Function`]
//! per deployable function, built through a pluggable [`Runtime`],
//! invoked with per-request routing and normalized error responses.

pub mod build;
pub mod environment;
pub mod errors;
pub mod function;
pub mod invoker;
pub mod normalize;
pub mod registry;
pub mod route;
pub mod runtime;
pub mod schedule;
pub mod storage;

pub use build::{BuildCache, BuildData, BuildResult, BuildSummary, ModuleFormat, SrcFilesDiff};
pub use environment::{ExecutionEnvironment, V2_MIN_RUNTIME_VERSION};
pub use errors::{FunctionError, FunctionResult};
pub use function::{BuildOutcome, BuildSnapshot, Function, FunctionDefinition};
pub use invoker::InvokeOptions;
pub use normalize::{
    format_error, handle_error, normalize_error, ErrorPageRenderer, HtmlErrorPage,
    InvocationError, NativeError, RawError,
};
pub use registry::{FunctionRegistry, RouteMatch};
pub use route::{Route, RouteTable};
pub use runtime::{
    BuildFunction, BuildRequest, FunctionRequest, FunctionResponse, Invocation, Runtime,
    RuntimeFuture, StubBuild, StubInvocation, StubRuntime,
};
pub use storage::{StorageContext, STORAGE_CONTEXT_HEADER};
