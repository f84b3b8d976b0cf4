//! Instantiating graph templates for a push.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tcpush_core::time::format_timestamp;
use tcpush_core::{PushContext, RenderedGraph, Result, SlugCache, TemplateVariables};
use tracing::debug;

use crate::mustache::RenderScope;
use crate::transforms::TransformTable;

/// Fields exposed to templates, keyed by the names templates use.
pub fn render_context(ctx: &PushContext, now: DateTime<Utc>) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("now".into(), json!(format_timestamp(now)));
    map.insert("owner".into(), json!(ctx.owner));
    map.insert("source".into(), json!(ctx.source));
    map.insert("revision".into(), json!(ctx.revision));
    map.insert("comment".into(), json!(ctx.comment));
    map.insert("level".into(), ctx.level.to_value());
    map.insert("project".into(), json!(ctx.project));
    map.insert("revision_hash".into(), json!(ctx.revision_hash));
    map.insert("pushlog_id".into(), json!(ctx.pushlog_id));
    map.insert("url".into(), json!(ctx.url));
    map.insert("pushdate".into(), json!(ctx.pushdate));
    map.insert("error".into(), json!(ctx.error));
    map
}

/// Renders templates with a fixed transform table.
pub struct Instantiator {
    transforms: TransformTable,
}

impl Default for Instantiator {
    fn default() -> Self {
        Self::new()
    }
}

impl Instantiator {
    pub fn new() -> Self {
        Self::with_transforms(TransformTable::standard())
    }

    pub fn with_transforms(transforms: TransformTable) -> Self {
        Self { transforms }
    }

    /// Render `template` to text. `now` is used for every time reference.
    pub fn render(
        &self,
        template: &str,
        ctx: &PushContext,
        slugs: &mut SlugCache,
        now: DateTime<Utc>,
    ) -> Result<String> {
        let context = render_context(ctx, now);
        let mut scope = RenderScope::new(&context, &self.transforms, slugs, now);
        scope.render(template)
    }

    /// Render `template` and parse the result as YAML.
    pub fn instantiate_value(
        &self,
        template: &str,
        ctx: &PushContext,
        slugs: &mut SlugCache,
        now: DateTime<Utc>,
    ) -> Result<Value> {
        let rendered = self.render(template, ctx, slugs, now)?;
        debug!(
            project = %ctx.project,
            revision = %ctx.revision,
            bytes = rendered.len(),
            "Rendered graph template"
        );
        Ok(serde_yaml::from_str(&rendered)?)
    }

    /// Render, parse and interpret `template` as a graph.
    pub fn instantiate(
        &self,
        template: &str,
        ctx: &PushContext,
        slugs: &mut SlugCache,
        now: DateTime<Utc>,
    ) -> Result<RenderedGraph> {
        RenderedGraph::from_value(self.instantiate_value(template, ctx, slugs, now)?)
    }
}

/// Instantiate `template` for loosely typed variables.
///
/// Variables are validated first; invalid variables fail with
/// [`tcpush_core::Error::InvalidContext`] before anything is rendered.
pub fn instantiate(template: &str, vars: &TemplateVariables) -> Result<RenderedGraph> {
    let ctx = PushContext::from_variables(vars)?;
    let mut slugs = SlugCache::new();
    Instantiator::new().instantiate(template, &ctx, &mut slugs, Utc::now())
}
