//! The expression language of version 1 graphs.

mod ast;
mod document;
mod eval;
mod lexer;
mod parser;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use eval::{BUILTINS, Env, Evaluator, is_truthy};
pub use parser::{parse_embedded, parse_expression};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use tcpush_core::PushContext;
use tcpush_core::time::format_timestamp;

/// The environment version 1 graphs are evaluated in: `push`, `repo` and
/// `now`. Builtins such as `as_slugid` are always available.
pub fn push_env(ctx: &PushContext, now: DateTime<Utc>) -> Env {
    let mut vars = Map::new();
    vars.insert(
        "push".into(),
        json!({
            "pushlog_id": ctx.pushlog_id,
            "revision": ctx.revision,
            "comment": ctx.comment,
            "pushdate": ctx.pushdate,
            "owner": ctx.owner,
        }),
    );
    vars.insert(
        "repo".into(),
        json!({
            "url": ctx.url,
            "project": ctx.project,
            "level": ctx.level.to_value(),
        }),
    );
    vars.insert("now".into(), Value::String(format_timestamp(now)));
    Env::new(vars)
}
