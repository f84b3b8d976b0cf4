//! The push job: from a push event to a scheduled task group.

use serde_json::{Map, Value, json};
use std::sync::Arc;
use tcpush_core::events::PushEvent;
use tcpush_core::ports::{GraphFetcher, PushlogClient, QueueClient};
use tcpush_core::{Error, Result, TemplateVariables, normalize_owner};
use tcpush_template::render_fields;
use tracing::{info, warn};
use url::Url;

use crate::config::TryConfig;
use crate::scheduler::{SchedulerOptions, TaskGroupReport, TaskGroupScheduler};

/// Everything gathered for a push before scheduling.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedPush {
    pub project: String,
    /// Url the graph was fetched from.
    pub graph_url: String,
    pub graph_text: String,
    pub variables: TemplateVariables,
    pub scopes: Vec<String>,
}

pub struct PushJob {
    config: Arc<TryConfig>,
    pushlog: Arc<dyn PushlogClient>,
    fetcher: Arc<dyn GraphFetcher>,
    queue: Arc<dyn QueueClient>,
    scheduler: TaskGroupScheduler,
}

impl PushJob {
    pub fn new(
        config: Arc<TryConfig>,
        pushlog: Arc<dyn PushlogClient>,
        fetcher: Arc<dyn GraphFetcher>,
        queue: Arc<dyn QueueClient>,
    ) -> Self {
        let scheduler = TaskGroupScheduler::new(config.error_task.clone());
        Self {
            config,
            pushlog,
            fetcher,
            queue,
            scheduler,
        }
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.scheduler = self.scheduler.with_options(options);
        self
    }

    /// Handle one push event.
    pub async fn work(&self, event: &PushEvent) -> Result<TaskGroupReport> {
        let prepared = self.prepare(event).await?;
        self.scheduler
            .schedule(
                self.queue.as_ref(),
                &prepared.project,
                &prepared.graph_text,
                &prepared.variables,
                &prepared.scopes,
            )
            .await
    }

    /// Resolve the project, read the push and fetch its graph.
    pub async fn prepare(&self, event: &PushEvent) -> Result<PreparedPush> {
        let alias = event.repo.alias.as_str();
        let project = self.config.project(alias)?;

        let host = repository_host(&event.repo.url)?;
        let repo_url =
            render_config_template("project url", &project.url, json!({ "host": host }))?;

        let push = self.pushlog.get_one(&repo_url, event.pushref.id).await?;
        let tip = push
            .tip()
            .ok_or_else(|| Error::Pushlog(format!("push {} has no changesets", push.id)))?;

        let url_fields = json!({
            "url": repo_url,
            "revision": tip.node,
            "project": alias,
        });
        let graph_url =
            render_config_template("tcYamlUrl", &self.config.tc_yaml_url, url_fields.clone())?;

        let (graph_url, graph_text) = match self.fetcher.fetch_graph(&graph_url).await {
            Ok(text) => (graph_url, text),
            Err(Error::GraphNotFound(missing)) => {
                let default_url =
                    render_config_template("defaultUrl", &self.config.default_url, url_fields)?;
                warn!(
                    project = alias,
                    missing = %missing,
                    default = %default_url,
                    "Repository has no graph, using the default graph"
                );
                let text = self.fetcher.fetch_graph(&default_url).await?;
                (default_url, text)
            }
            Err(e) => return Err(e),
        };

        let mut variables = TemplateVariables::new()
            .set("owner", push.user.as_str())
            .set("source", graph_url.as_str())
            .set("revision", tip.node.as_str())
            .set("project", alias)
            .set("level", project.level.to_value())
            .set("revision_hash", event.revision_hash.as_str())
            .set("comment", tip.desc.as_str())
            .set("pushlog_id", event.pushref.id.to_string())
            .set("url", repo_url.as_str());
        if let Some(date) = push.date {
            variables.insert("pushdate", date);
        }

        let owner = normalize_owner(&push.user);
        let local_part = owner.split('@').next().unwrap_or(&owner);
        let mut scopes = project.scopes.clone();
        scopes.push(format!("queue:route:notify.email.{}.*", local_part));

        info!(
            project = alias,
            revision = %tip.node,
            pushlog_id = event.pushref.id,
            graph_url = %graph_url,
            "Prepared push"
        );

        Ok(PreparedPush {
            project: alias.to_string(),
            graph_url,
            graph_text,
            variables,
            scopes,
        })
    }
}

/// Scheme and host of a repository url, e.g. `https://hg.mozilla.org`.
fn repository_host(repo_url: &str) -> Result<String> {
    let url = Url::parse(repo_url)
        .map_err(|e| Error::Config(format!("invalid repository url {}: {}", repo_url, e)))?;
    let origin = url.origin();
    if !origin.is_tuple() {
        return Err(Error::Config(format!(
            "repository url {} has no host",
            repo_url
        )));
    }
    Ok(origin.ascii_serialization())
}

fn render_config_template(name: &str, template: &str, fields: Value) -> Result<String> {
    let fields = match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    render_fields(template, &fields).map_err(|e| Error::Config(format!("{}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_host() {
        assert_eq!(
            repository_host("https://hg.mozilla.org/myrepo").unwrap(),
            "https://hg.mozilla.org"
        );
        assert_eq!(
            repository_host("http://localhost:8000/a/b").unwrap(),
            "http://localhost:8000"
        );
        assert!(matches!(repository_host("not a url"), Err(Error::Config(_))));
    }

    #[test]
    fn test_render_config_template() {
        assert_eq!(
            render_config_template(
                "tcYamlUrl",
                "{{{url}}}/raw-file/{{revision}}/.taskcluster.yml",
                json!({"url": "https://hg.mozilla.org/myrepo", "revision": "abc"}),
            )
            .unwrap(),
            "https://hg.mozilla.org/myrepo/raw-file/abc/.taskcluster.yml"
        );
        assert!(matches!(
            render_config_template("tcYamlUrl", "{{#open}}", json!({})),
            Err(Error::Config(_))
        ));
    }
}
