//! Template expansion for SQL fragments embedded in spec files.
//!
//! Fields such as `enrollment_query` or a metric's `select_expression` may
//! contain `{{ ... }}` blocks. A block holds either a dotted attribute path
//! (`experiment.experimenter_slug`) or a call to an allow-listed macro
//! (`agg_histogram_mean('payload.histograms.foo')`).

pub mod context;
pub mod functions;
pub mod parser;
pub mod renderer;

pub use context::{ContextValue, ExperimentContext};
pub use renderer::{render, TemplateRenderer};
