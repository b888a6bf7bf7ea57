//! Observability: tracing subscriber setup and span macros

pub mod logging;

pub use logging::{init_default_logging, init_logging, parse_level, LogFormat};

pub use logging::{retry_span, task_span, workflow_span};
