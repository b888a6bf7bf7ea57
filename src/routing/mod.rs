//! Routing infrastructure
//!
//! - [`pipeline`]: the canonical stage order and order validation
//! - [`options`]: typed per-stage option parsing at the routing boundary
//! - [`router`]: [`TaskRouter`], which binds validated tasks to agents

pub mod options;
pub mod pipeline;
pub mod router;

pub use options::{TaskOptions, UPSTREAM_KEY};
pub use pipeline::{PipelineOrder, Stage, DEFAULT_PIPELINE};
pub use router::{RoutedTask, TaskRouter};
