//! # Execution Environment
//!
//! Version of the runtime that will execute built functions. Passed in
//! explicitly so support checks do not depend on process state.

use semver::Version;

/// Lowest runtime version able to run API version 2 handlers
pub const V2_MIN_RUNTIME_VERSION: &str = "18.14.0";

/// The environment functions execute in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionEnvironment {
    version: String,
}

impl ExecutionEnvironment {
    /// Create from a version string; a leading `v` is accepted
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }

    /// Version as reported, without a leading `v`
    pub fn version(&self) -> &str {
        self.version.strip_prefix('v').unwrap_or(&self.version)
    }

    /// Whether the environment is at least `minimum`
    ///
    /// Compared with semantic-version ordering. A version that does not
    /// parse satisfies nothing.
    pub fn satisfies(&self, minimum: &str) -> bool {
        match (Version::parse(self.version()), Version::parse(minimum)) {
            (Ok(actual), Ok(min)) => actual >= min,
            _ => false,
        }
    }

    /// Whether a build with the given handler API version can run here
    pub fn supports_api_version(&self, runtime_api_version: u32) -> bool {
        runtime_api_version != 2 || self.satisfies(V2_MIN_RUNTIME_VERSION)
    }
}
