//! tcpush core
//!
//! Shared vocabulary for turning a repository push into task submissions:
//! the error taxonomy, slug identifiers, relative time expressions, the
//! validated push context, task definitions and the traits implemented by
//! external collaborators (queue, pushlog, graph fetcher).

pub mod context;
pub mod error;
pub mod events;
pub mod graph;
pub mod ids;
pub mod ports;
pub mod task;
pub mod time;

pub use context::{Level, PushContext, TemplateVariables, normalize_owner};
pub use error::{Error, Result};
pub use graph::RenderedGraph;
pub use ids::{SlugCache, SlugId};
pub use task::TaskDefinition;
pub use time::{RelativeOffset, parse_time, relative_time};
