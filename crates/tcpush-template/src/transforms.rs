//! Section transforms available to templates.
//!
//! A transform receives the unrendered text enclosed by its section and the
//! render scope, and returns the final text for the section.

use std::collections::BTreeMap;
use tcpush_core::time::format_timestamp;
use tcpush_core::{Error, Result, parse_time, relative_time};

use crate::mustache::RenderScope;
use crate::shell;

pub trait Transform: Send + Sync {
    fn apply(&self, raw: &str, scope: &mut RenderScope<'_>) -> Result<String>;
}

/// `{{#from_now}}1 day{{/from_now}}`: timestamp relative to render start.
pub struct FromNow;

impl Transform for FromNow {
    fn apply(&self, raw: &str, scope: &mut RenderScope<'_>) -> Result<String> {
        let offset = parse_time(raw)?;
        let at = relative_time(offset, scope.now())
            .ok_or_else(|| Error::MalformedTimeExpression(raw.to_string()))?;
        Ok(format_timestamp(at))
    }
}

/// `{{#as_slugid}}label{{/as_slugid}}`: the slug id cached for a label.
pub struct AsSlugId;

impl Transform for AsSlugId {
    fn apply(&self, raw: &str, scope: &mut RenderScope<'_>) -> Result<String> {
        Ok(scope.slugs().resolve(raw).into_string())
    }
}

/// `{{#shellquote}}...{{/shellquote}}`: render the body, then quote it as a
/// single shell word. The quotes are part of the output.
pub struct ShellQuote;

impl Transform for ShellQuote {
    fn apply(&self, raw: &str, scope: &mut RenderScope<'_>) -> Result<String> {
        let rendered = scope.render(raw)?;
        Ok(shell::quote(&rendered))
    }
}

/// Named transforms, looked up by section name.
#[derive(Default)]
pub struct TransformTable {
    entries: BTreeMap<String, Box<dyn Transform>>,
}

impl TransformTable {
    /// An empty table: every section is a plain section.
    pub fn new() -> Self {
        Self::default()
    }

    /// The `from_now`, `as_slugid` and `shellquote` transforms.
    pub fn standard() -> Self {
        let mut table = Self::new();
        table.register("from_now", FromNow);
        table.register("as_slugid", AsSlugId);
        table.register("shellquote", ShellQuote);
        table
    }

    pub fn register(&mut self, name: impl Into<String>, transform: impl Transform + 'static) {
        self.entries.insert(name.into(), Box::new(transform));
    }

    pub fn get(&self, name: &str) -> Option<&dyn Transform> {
        self.entries.get(name).map(|t| t.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::{Map, Value, json};
    use tcpush_core::{Error, SlugCache};

    fn context() -> Map<String, Value> {
        json!({"comment": "comment with stuff in it", "owner": "it's me"})
            .as_object()
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_from_now_uses_render_start() {
        let ctx = context();
        let table = TransformTable::standard();
        let mut slugs = SlugCache::new();
        let now = Utc.with_ymd_and_hms(2017, 7, 11, 20, 0, 0).unwrap();
        let mut scope = RenderScope::new(&ctx, &table, &mut slugs, now);

        let out = scope
            .render("{{#from_now}}1 day 2 hours{{/from_now}}|{{#from_now}}{{/from_now}}")
            .unwrap();
        assert_eq!(out, "2017-07-12T22:00:00.000Z|2017-07-11T20:00:00.000Z");
    }

    #[test]
    fn test_from_now_rejects_bad_expression() {
        let ctx = context();
        let table = TransformTable::standard();
        let mut slugs = SlugCache::new();
        let mut scope = RenderScope::new(&ctx, &table, &mut slugs, Utc::now());
        assert!(matches!(
            scope.render("{{#from_now}}3x{{/from_now}}"),
            Err(Error::MalformedTimeExpression(s)) if s == "3x"
        ));
    }

    #[test]
    fn test_from_now_out_of_range() {
        let ctx = context();
        let table = TransformTable::standard();
        let mut slugs = SlugCache::new();
        let mut scope = RenderScope::new(&ctx, &table, &mut slugs, Utc::now());
        assert!(matches!(
            scope.render("{{#from_now}}100000000 days{{/from_now}}"),
            Err(Error::MalformedTimeExpression(s)) if s == "100000000 days"
        ));
    }

    #[test]
    fn test_as_slugid_is_stable_per_label() {
        let ctx = context();
        let table = TransformTable::standard();
        let mut slugs = SlugCache::new();
        let mut scope = RenderScope::new(&ctx, &table, &mut slugs, Utc::now());

        let out = scope
            .render("{{#as_slugid}}decision{{/as_slugid}} {{#as_slugid}}decision{{/as_slugid}} {{#as_slugid}}build{{/as_slugid}}")
            .unwrap();
        let ids: Vec<&str> = out.split(' ').collect();
        assert_eq!(ids[0], ids[1]);
        assert_ne!(ids[0], ids[2]);
        assert_eq!(slugs.len(), 2);
    }

    #[test]
    fn test_shellquote_renders_body_first() {
        let ctx = context();
        let table = TransformTable::standard();
        let mut slugs = SlugCache::new();
        let mut scope = RenderScope::new(&ctx, &table, &mut slugs, Utc::now());

        assert_eq!(
            scope.render("--message={{#shellquote}}{{{comment}}}{{/shellquote}}").unwrap(),
            "--message='comment with stuff in it'"
        );
        assert_eq!(
            scope.render("{{#shellquote}}{{{owner}}}{{/shellquote}}").unwrap(),
            "\"it's me\""
        );
    }

    #[test]
    fn test_transform_as_variable_is_an_error() {
        let ctx = context();
        let table = TransformTable::standard();
        let mut slugs = SlugCache::new();
        let mut scope = RenderScope::new(&ctx, &table, &mut slugs, Utc::now());
        assert!(matches!(scope.render("{{shellquote}}"), Err(Error::Render(_))));
    }

    #[test]
    fn test_standard_names() {
        let table = TransformTable::standard();
        let names: Vec<&str> = table.names().collect();
        assert_eq!(names, vec!["as_slugid", "from_now", "shellquote"]);
    }
}
