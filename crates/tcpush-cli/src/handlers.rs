//! Command handlers.

use crate::client::{HgPushlogClient, HttpGraphFetcher};
use crate::config::CliConfig;
use chrono::Utc;
use console::style;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tcpush_core::events::{PushEvent, PushRef, RepoRef};
use tcpush_core::ports::GraphFetcher;
use tcpush_core::{PushContext, SlugCache, TaskDefinition, TemplateVariables};
use tcpush_scheduler::{
    MemoryQueue, PushJob, SchedulerOptions, TaskGroupReport, TaskGroupScheduler, TryConfig,
};
use tcpush_template::Instantiator;

type HandlerResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Render a graph template and print it.
pub fn render(graph: &Path, vars: &Path) -> HandlerResult {
    let template = std::fs::read_to_string(graph)?;
    let ctx = PushContext::from_variables(&read_variables(vars)?)?;

    let mut slugs = SlugCache::new();
    let value = Instantiator::new().instantiate_value(&template, &ctx, &mut slugs, Utc::now())?;

    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}

/// Schedule a graph against an in-memory queue.
pub async fn schedule(
    config: &CliConfig,
    try_config: Option<&Path>,
    graph: &str,
    vars: &Path,
    project: &str,
    scopes: &[String],
) -> HandlerResult {
    let try_config = load_try_config(config, try_config)?;
    let graph_text = read_graph(config, graph).await?;
    let variables = read_variables(vars)?;

    let queue = MemoryQueue::new();
    let scheduler = TaskGroupScheduler::new(try_config.error_task)
        .with_options(scheduler_options(config));
    let report = scheduler
        .schedule(&queue, project, &graph_text, &variables, scopes)
        .await?;

    print_submissions(&queue)?;
    print_report(&report);
    Ok(())
}

/// Run the push job for one push, submitting to an in-memory queue.
pub async fn push(
    config: &CliConfig,
    try_config: Option<&Path>,
    alias: &str,
    repo_url: &str,
    pushlog_id: u64,
    revision_hash: &str,
) -> HandlerResult {
    let try_config = Arc::new(load_try_config(config, try_config)?);
    let timeout = Duration::from_secs(config.http_timeout_secs);
    let queue = Arc::new(MemoryQueue::new());

    let job = PushJob::new(
        try_config,
        Arc::new(HgPushlogClient::new(timeout)?),
        Arc::new(HttpGraphFetcher::new(timeout)?),
        queue.clone(),
    )
    .with_options(scheduler_options(config));

    let event = PushEvent {
        revision_hash: revision_hash.to_string(),
        pushref: PushRef { id: pushlog_id },
        repo: RepoRef {
            alias: alias.to_string(),
            url: repo_url.to_string(),
        },
    };

    println!(
        "{} Handling push {} on {}",
        style("▶").cyan(),
        style(pushlog_id).bold(),
        style(alias).dim()
    );
    let report = job.work(&event).await?;

    print_submissions(&queue)?;
    print_report(&report);
    Ok(())
}

/// Print the task definition schema.
pub fn schema() -> HandlerResult {
    let schema = schemars::schema_for!(TaskDefinition);
    println!("{}", serde_json::to_string_pretty(&schema)?);
    Ok(())
}

/// Validate a try configuration.
pub fn validate_config(config: &CliConfig, path: Option<&Path>) -> HandlerResult {
    let try_config = load_try_config(config, path)?;
    try_config.validate()?;

    println!("{} Configuration is valid", style("✓").green());
    println!("  Projects: {}", try_config.projects.len());
    for (alias, project) in &try_config.projects {
        println!("    - {} (level {})", alias, project.level);
    }
    Ok(())
}

/// Show configuration.
pub fn show_config(config: &CliConfig) -> HandlerResult {
    println!("Current configuration:");
    println!("  log_format: {:?}", config.log_format);
    println!(
        "  try_config: {}",
        config
            .try_config
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "(built-in)".to_string())
    );
    println!("  http_timeout_secs: {}", config.http_timeout_secs);
    println!(
        "  max_concurrent_submissions: {}",
        config.max_concurrent_submissions
    );

    if let Ok(path) = CliConfig::config_path() {
        println!("\nConfig file: {}", path.display());
    }

    Ok(())
}

/// Set configuration.
pub fn set_config(key: &str, value: &str) -> HandlerResult {
    let mut config = CliConfig::load().unwrap_or_default();
    config.set(key, value)?;
    config.save()?;

    println!("{} Set {} = {}", style("✓").green(), key, value);
    Ok(())
}

fn scheduler_options(config: &CliConfig) -> SchedulerOptions {
    SchedulerOptions {
        max_concurrent_submissions: config.max_concurrent_submissions,
    }
}

/// The try configuration at `path`, the configured one, or the built-in one.
pub(crate) fn load_try_config(config: &CliConfig, path: Option<&Path>) -> HandlerResult<TryConfig> {
    match path.or(config.try_config.as_deref()) {
        Some(path) => Ok(TryConfig::from_file(path)?),
        None => Ok(TryConfig::builtin()?),
    }
}

pub(crate) fn read_variables(path: &Path) -> HandlerResult<TemplateVariables> {
    let text = std::fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&text)?)
}

async fn read_graph(config: &CliConfig, source: &str) -> HandlerResult<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let fetcher = HttpGraphFetcher::new(Duration::from_secs(config.http_timeout_secs))?;
        Ok(fetcher.fetch_graph(source).await?)
    } else {
        Ok(tokio::fs::read_to_string(source).await?)
    }
}

fn print_submissions(queue: &MemoryQueue) -> HandlerResult {
    for task in queue.created() {
        let entry = serde_json::json!({
            "taskId": task.task_id.as_str(),
            "task": task.definition,
        });
        println!("{}", serde_json::to_string_pretty(&entry)?);
    }
    Ok(())
}

fn print_report(report: &TaskGroupReport) {
    if let Some(error) = &report.error {
        println!("{} Graph failed, error task scheduled", style("!").yellow());
        println!("  {}", error);
    }

    match &report.task_group_id {
        Some(id) => println!(
            "{} Task group {}: {} submitted",
            style("✓").green(),
            style(id).bold(),
            report.submitted().len()
        ),
        None => println!("{} No tasks to schedule", style("i").blue()),
    }

    for failure in report.failures() {
        if let Err(e) = &failure.result {
            println!("{} {}: {}", style("✗").red(), failure.task_id, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn test_read_variables() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "owner: ffxbld\nlevel: 7\npushlog_id: '9999'").unwrap();

        let vars = read_variables(file.path()).unwrap();
        assert_eq!(vars.get("owner"), Some(&serde_json::json!("ffxbld")));
        assert_eq!(vars.get("level"), Some(&serde_json::json!(7)));
        assert_eq!(vars.get("pushlog_id"), Some(&serde_json::json!("9999")));
    }

    #[test]
    fn test_load_try_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "projects:\n  mine:\n    url: '{{{{{{host}}}}}}/myrepo'\n    level: 3"
        )
        .unwrap();

        let config = CliConfig::default();
        let try_config = load_try_config(&config, Some(file.path())).unwrap();
        assert_eq!(try_config.project("mine").unwrap().url, "{{{host}}}/myrepo");

        let builtin = load_try_config(&config, None).unwrap();
        assert!(builtin.projects.is_empty());
        assert!(!builtin.error_task.is_empty());
    }
}
