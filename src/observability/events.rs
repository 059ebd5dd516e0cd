//! Observable events of the function orchestrator
//!
//! Events are explicit and typed. Each one maps to a stable uppercase
//! identifier that appears as the `event` key of a log line.

use std::fmt;

use super::logger::Severity;

/// Observable lifecycle events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Configuration
    /// Functions configuration loaded from disk
    ConfigLoaded,

    // Registry
    /// Function added to the registry
    FunctionRegistered,
    /// Function removed from the registry
    FunctionRemoved,

    // Builds
    /// A new build was started for a function
    BuildStart,
    /// A caller attached to a build already in flight
    BuildJoined,
    /// Build committed successfully
    BuildComplete,
    /// Build failed, previous artifact kept
    BuildFailed,
    /// Build committed but targets an unsupported runtime
    BuildUnsupported,

    // Routing
    /// Routes replaced after a build
    RoutesUpdated,
    /// A route expression could not be compiled
    RouteExpressionInvalid,

    // Invocations
    /// Invocation handed to the runtime
    InvocationStart,
    /// Runtime returned a response
    InvocationComplete,
    /// Invocation refused because the last build failed
    InvocationRejected,
    /// Runtime raised an error, converted to a 500 response
    InvocationFailed,
}

impl Event {
    /// Returns the string representation of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "FUNCTIONS_CONFIG_LOADED",

            Event::FunctionRegistered => "FUNCTION_REGISTERED",
            Event::FunctionRemoved => "FUNCTION_REMOVED",

            Event::BuildStart => "BUILD_BEGIN",
            Event::BuildJoined => "BUILD_JOINED",
            Event::BuildComplete => "BUILD_COMPLETE",
            Event::BuildFailed => "BUILD_FAILED",
            Event::BuildUnsupported => "BUILD_UNSUPPORTED_RUNTIME",

            Event::RoutesUpdated => "ROUTES_UPDATED",
            Event::RouteExpressionInvalid => "ROUTE_EXPRESSION_INVALID",

            Event::InvocationStart => "INVOCATION_BEGIN",
            Event::InvocationComplete => "INVOCATION_COMPLETE",
            Event::InvocationRejected => "INVOCATION_REJECTED",
            Event::InvocationFailed => "INVOCATION_FAILED",
        }
    }

    /// Severity the event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::BuildFailed | Event::BuildUnsupported | Event::InvocationFailed => {
                Severity::Error
            }
            Event::RouteExpressionInvalid | Event::InvocationRejected => Severity::Warn,
            Event::BuildJoined | Event::InvocationStart | Event::InvocationComplete => {
                Severity::Trace
            }
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
