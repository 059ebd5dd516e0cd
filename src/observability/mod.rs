//! Observability for the function orchestrator
//!
//! Structured JSON logging of build and invocation lifecycle events.
//!
//! ```ignore
//! use fnhost::observability::{log_event_with_fields, Event};
//!
//! log_event_with_fields(Event::BuildStart, &[("function", "hello")]);
//! ```

mod events;
mod logger;

pub use events::Event;
pub use logger::{Logger, Severity};

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(event.severity(), event.as_str(), fields);
}
