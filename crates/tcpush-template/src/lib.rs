//! Graph template instantiation.
//!
//! Templates use a small mustache dialect: `{{name}}` (HTML escaped),
//! `{{{name}}}` and `{{& name}}` (verbatim), plain sections over context
//! fields, and three transform sections:
//!
//! - `{{#from_now}}1 day{{/from_now}}` - timestamp relative to render start
//! - `{{#as_slugid}}label{{/as_slugid}}` - stable slug id for a label
//! - `{{#shellquote}}{{{comment}}}{{/shellquote}}` - shell-quoted text,
//!   quotes included
//!
//! The rendered text is parsed as YAML.

pub mod instantiate;
pub mod mustache;
pub mod shell;
pub mod transforms;

pub use instantiate::{Instantiator, instantiate, render_context};
pub use mustache::{RenderScope, Template, render_fields};
pub use shell::quote;
pub use transforms::{Transform, TransformTable};
