//! Rendering of expression documents.
//!
//! A document is plain structured data in which some objects are operators
//! (`$let`, `$if`, `$eval`, `$fromNow`) and strings may contain `${expr}`
//! interpolations. Rendering walks the document and replaces each operator by
//! its result.

use serde_json::{Map, Value};
use tcpush_core::{Error, Result};

use super::eval::{Env, Evaluator, is_truthy, to_text, type_name};
use super::parser::{parse_embedded, parse_expression};

impl Evaluator<'_> {
    /// Render `doc` in `env`.
    ///
    /// Returns `None` when the document renders to nothing, which happens for
    /// an `$if` whose selected branch is absent. Such values are dropped from
    /// the enclosing object or array.
    pub fn render(&mut self, doc: &Value, env: &Env) -> Result<Option<Value>> {
        match doc {
            Value::String(s) => Ok(Some(Value::String(self.interpolate(s, env)?))),
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    if let Some(value) = self.render(item, env)? {
                        out.push(value);
                    }
                }
                Ok(Some(Value::Array(out)))
            }
            Value::Object(map) => self.render_object(map, env),
            other => Ok(Some(other.clone())),
        }
    }

    /// Replace `${expr}` with the text of its value; `$${` yields `${`.
    /// A null value interpolates as the empty string.
    pub fn interpolate(&mut self, text: &str, env: &Env) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(at) = rest.find('$') {
            out.push_str(&rest[..at]);
            let tail = &rest[at..];

            if tail.starts_with("$${") {
                out.push_str("${");
                rest = &tail[3..];
            } else if let Some(expr_src) = tail.strip_prefix("${") {
                let (expr, consumed) = parse_embedded(expr_src)?;
                let value = self.eval(&expr, env)?;
                match value {
                    Value::Array(_) | Value::Object(_) => {
                        return Err(Error::Expression(format!(
                            "interpolation of '{}' produced an {}",
                            expr_src[..consumed - 1].trim(),
                            type_name(&value)
                        )));
                    }
                    Value::Null => {}
                    other => out.push_str(&to_text(&other)?),
                }
                rest = &expr_src[consumed..];
            } else {
                out.push('$');
                rest = &tail[1..];
            }
        }

        out.push_str(rest);
        Ok(out)
    }

    fn render_object(&mut self, map: &Map<String, Value>, env: &Env) -> Result<Option<Value>> {
        if map.contains_key("$let") {
            return self.render_let(map, env);
        }
        if let Some(condition) = map.get("$if") {
            return self.render_if(condition, map, env);
        }
        if let Some(source) = map.get("$eval") {
            only_keys(map, "$eval", &["$eval"])?;
            let source = source.as_str().ok_or_else(|| {
                Error::Expression("$eval must be given a string expression".to_string())
            })?;
            return Ok(Some(self.eval(&parse_expression(source)?, env)?));
        }
        if let Some(text) = map.get("$fromNow") {
            return self.render_from_now(text, map, env).map(Some);
        }

        let mut out = Map::new();
        for (key, value) in map {
            let key = if let Some(escaped) = key.strip_prefix("$$") {
                format!("${}", escaped)
            } else if key.starts_with('$') {
                return Err(Error::Expression(format!("{} is not a valid operator", key)));
            } else {
                self.interpolate(key, env)?
            };
            if let Some(value) = self.render(value, env)? {
                out.insert(key, value);
            }
        }
        Ok(Some(Value::Object(out)))
    }

    fn render_let(&mut self, map: &Map<String, Value>, env: &Env) -> Result<Option<Value>> {
        only_keys(map, "$let", &["$let", "in"])?;
        let body = map
            .get("in")
            .ok_or_else(|| Error::Expression("$let operator requires an in clause".to_string()))?;

        let bindings = match map.get("$let").map(|b| self.render(b, env)).transpose()? {
            Some(Some(Value::Object(bindings))) => bindings,
            _ => {
                return Err(Error::Expression(
                    "$let value must evaluate to an object".to_string(),
                ));
            }
        };
        if let Some(bad) = bindings.keys().find(|k| !is_identifier(k)) {
            return Err(Error::Expression(format!(
                "top level keys of $let must be identifiers, got '{}'",
                bad
            )));
        }

        let child = env.extend(bindings);
        self.render(body, &child)
    }

    fn render_if(
        &mut self,
        condition: &Value,
        map: &Map<String, Value>,
        env: &Env,
    ) -> Result<Option<Value>> {
        only_keys(map, "$if", &["$if", "then", "else"])?;
        let source = condition.as_str().ok_or_else(|| {
            Error::Expression("$if must be given a string expression".to_string())
        })?;

        let branch = if is_truthy(&self.eval(&parse_expression(source)?, env)?) {
            map.get("then")
        } else {
            map.get("else")
        };
        match branch {
            Some(branch) => self.render(branch, env),
            None => Ok(None),
        }
    }

    fn render_from_now(
        &mut self,
        text: &Value,
        map: &Map<String, Value>,
        env: &Env,
    ) -> Result<Value> {
        only_keys(map, "$fromNow", &["$fromNow", "from"])?;
        let text = self.render_string(text, env, "$fromNow")?;
        let from = map
            .get("from")
            .map(|from| self.render_string(from, env, "from"))
            .transpose()?;
        self.from_now(&text, from.as_deref())
    }

    fn render_string(&mut self, value: &Value, env: &Env, what: &str) -> Result<String> {
        match self.render(value, env)? {
            Some(Value::String(s)) => Ok(s),
            _ => Err(Error::Expression(format!("{} expects a string", what))),
        }
    }
}

fn only_keys(map: &Map<String, Value>, operator: &str, allowed: &[&str]) -> Result<()> {
    match map.keys().find(|k| !allowed.contains(&k.as_str())) {
        Some(extra) => Err(Error::Expression(format!(
            "{} has undefined properties: {}",
            operator, extra
        ))),
        None => Ok(()),
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tcpush_core::SlugCache;

    fn env() -> Env {
        let vars = json!({
            "push": {"owner": "ffxbld", "revision": "abc", "comment": "try: -b o"},
            "repo": {"url": "https://hg.mozilla.org/myrepo", "level": 7},
        });
        Env::new(vars.as_object().cloned().unwrap())
    }

    fn render(doc: Value) -> Result<Option<Value>> {
        let mut slugs = SlugCache::new();
        let now = Utc.with_ymd_and_hms(2017, 7, 11, 20, 0, 0).unwrap();
        Evaluator::new(&mut slugs, now).render(&doc, &env())
    }

    #[test]
    fn test_interpolation() {
        assert_eq!(
            render(json!("${repo.url}/raw-file/${push.revision}/.taskcluster.yml")).unwrap(),
            Some(json!("https://hg.mozilla.org/myrepo/raw-file/abc/.taskcluster.yml"))
        );
        assert_eq!(
            render(json!("level-${repo.level}")).unwrap(),
            Some(json!("level-7"))
        );
        assert_eq!(
            render(json!("--message=$GECKO_COMMIT_MSG costs $5")).unwrap(),
            Some(json!("--message=$GECKO_COMMIT_MSG costs $5"))
        );
        assert_eq!(render(json!("$${push.owner}")).unwrap(), Some(json!("${push.owner}")));
    }

    #[test]
    fn test_interpolated_keys() {
        assert_eq!(
            render(json!({"level-${repo.level}-checkouts": "/home/worker/checkouts"})).unwrap(),
            Some(json!({"level-7-checkouts": "/home/worker/checkouts"}))
        );
        assert_eq!(
            render(json!({"$$literal": 1})).unwrap(),
            Some(json!({"$literal": 1}))
        );
    }

    #[test]
    fn test_interpolating_structures_fails() {
        assert!(matches!(render(json!("${repo}")), Err(Error::Expression(_))));
        assert!(matches!(render(json!("${push.owner")), Err(Error::Expression(_))));
    }

    #[test]
    fn test_let_and_if() {
        let doc = json!({
            "$let": {
                "ownerEmail": {
                    "$if": "\"@\" in push.owner",
                    "then": "${push.owner}",
                    "else": "${push.owner}@noreply.mozilla.org"
                }
            },
            "in": {"createdForUser": "${ownerEmail}"}
        });
        assert_eq!(
            render(doc).unwrap(),
            Some(json!({"createdForUser": "ffxbld@noreply.mozilla.org"}))
        );
    }

    #[test]
    fn test_if_without_branch_is_dropped() {
        let doc = json!({
            "keep": 1,
            "drop": {"$if": "repo.level < 3", "then": "x"},
            "list": [1, {"$if": "false", "then": 2}, 3]
        });
        assert_eq!(
            render(doc).unwrap(),
            Some(json!({"keep": 1, "list": [1, 3]}))
        );
        assert_eq!(render(json!({"$if": "false", "then": 1})).unwrap(), None);
    }

    #[test]
    fn test_eval_keeps_types() {
        assert_eq!(
            render(json!({"$eval": "[repo.level, push.owner]"})).unwrap(),
            Some(json!([7, "ffxbld"]))
        );
    }

    #[test]
    fn test_eval_shares_slug_cache() {
        let mut slugs = SlugCache::new();
        let doc = json!({
            "taskId": {"$eval": "as_slugid('decision')"},
            "taskGroupId": {"$eval": "as_slugid(\"decision\")"}
        });
        let out = Evaluator::new(&mut slugs, Utc::now())
            .render(&doc, &env())
            .unwrap()
            .unwrap();
        assert_eq!(out["taskId"], out["taskGroupId"]);
        assert_eq!(slugs.len(), 1);
    }

    #[test]
    fn test_from_now() {
        assert_eq!(
            render(json!({"$fromNow": ""})).unwrap(),
            Some(json!("2017-07-11T20:00:00.000Z"))
        );
        assert_eq!(
            render(json!({"$fromNow": "1 year"})).unwrap(),
            Some(json!("2018-07-11T20:00:00.000Z"))
        );
        assert_eq!(
            render(json!({"$fromNow": "1 day", "from": "2020-02-28T00:00:00.000Z"})).unwrap(),
            Some(json!("2020-02-29T00:00:00.000Z"))
        );
        assert!(matches!(
            render(json!({"$fromNow": "whenever"})),
            Err(Error::MalformedTimeExpression(_))
        ));
    }

    #[test]
    fn test_operator_errors() {
        assert!(render(json!({"$let": {"a": 1}})).is_err());
        assert!(render(json!({"$let": [1], "in": 1})).is_err());
        assert!(render(json!({"$let": {"not valid": 1}, "in": 1})).is_err());
        assert!(render(json!({"$if": "true", "then": 1, "other": 2})).is_err());
        assert!(render(json!({"$eval": 1})).is_err());
        assert!(render(json!({"$unknown": 1})).is_err());
    }
}
