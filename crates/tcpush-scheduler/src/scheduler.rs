//! Task group scheduling.
//!
//! A graph is turned into concrete task definitions in one synchronous pass,
//! then every task is submitted to the queue. When the graph cannot be
//! rendered or interpreted, the error task is submitted in its place.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use tcpush_core::graph::{RenderedGraph, declared_version};
use tcpush_core::ports::QueueClient;
use tcpush_core::{
    Error, PushContext, Result, SlugCache, SlugId, TaskDefinition, TemplateVariables,
};
use tcpush_template::Instantiator;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error_task::build_error_task;
use crate::expr::{Evaluator, push_env};

/// Tunables for a [`TaskGroupScheduler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerOptions {
    /// Upper bound on queue submissions in flight for one task group.
    pub max_concurrent_submissions: usize,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_submissions: 8,
        }
    }
}

/// Tasks ready for submission.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskGroup {
    pub tasks: Vec<(SlugId, TaskDefinition)>,
    /// Set when the graph failed and `tasks` holds the error task.
    pub error: Option<String>,
}

impl TaskGroup {
    /// Id of the first task, which roots the group.
    pub fn task_group_id(&self) -> Option<&SlugId> {
        self.tasks.first().map(|(id, _)| id)
    }

    pub fn is_error_task(&self) -> bool {
        self.error.is_some()
    }
}

/// Result of one queue submission.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub task_id: SlugId,
    pub result: Result<()>,
}

/// Outcome of scheduling a task group. Every task is attempted; failures do
/// not undo earlier submissions.
#[derive(Debug)]
pub struct TaskGroupReport {
    pub task_group_id: Option<SlugId>,
    /// Set when the error task was submitted instead of the graph.
    pub error: Option<String>,
    pub outcomes: Vec<SubmissionOutcome>,
}

impl TaskGroupReport {
    pub fn is_error_task(&self) -> bool {
        self.error.is_some()
    }

    /// Ids of the tasks the queue accepted.
    pub fn submitted(&self) -> Vec<&SlugId> {
        self.outcomes
            .iter()
            .filter(|o| o.result.is_ok())
            .map(|o| &o.task_id)
            .collect()
    }

    pub fn failures(&self) -> impl Iterator<Item = &SubmissionOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }

    /// All submitted ids, or the first submission failure.
    pub fn into_result(self) -> Result<Vec<SlugId>> {
        let mut ids = Vec::with_capacity(self.outcomes.len());
        for outcome in self.outcomes {
            outcome.result?;
            ids.push(outcome.task_id);
        }
        Ok(ids)
    }
}

/// Turns graph templates into task submissions.
pub struct TaskGroupScheduler {
    instantiator: Instantiator,
    error_task: String,
    options: SchedulerOptions,
}

impl TaskGroupScheduler {
    /// `error_task` is the version 0 template used when a graph fails.
    pub fn new(error_task: impl Into<String>) -> Self {
        Self {
            instantiator: Instantiator::new(),
            error_task: error_task.into(),
            options: SchedulerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SchedulerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Validate `vars`, build the task group and submit it.
    ///
    /// Invalid variables fail before anything is submitted. Graph failures
    /// are replaced by the error task and reported through
    /// [`TaskGroupReport::error`]. Submission failures are reported per task.
    pub async fn schedule(
        &self,
        queue: &dyn QueueClient,
        project_alias: &str,
        graph_text: &str,
        vars: &TemplateVariables,
        base_scopes: &[String],
    ) -> Result<TaskGroupReport> {
        let span = info_span!("task_group.schedule", project = %project_alias);

        async {
            let ctx = PushContext::from_variables(vars)?;
            let group = self.build(graph_text, &ctx, base_scopes, Utc::now())?;
            info!(
                revision = %ctx.revision,
                tasks = group.tasks.len(),
                error_task = group.is_error_task(),
                "Submitting task group"
            );
            Ok::<_, Error>(self.submit(queue, group).await)
        }
        .instrument(span)
        .await
    }

    /// Build the task group for a graph.
    ///
    /// One label cache and one `now` serve the whole pass, including the
    /// error task when it is needed.
    pub fn build(
        &self,
        graph_text: &str,
        ctx: &PushContext,
        base_scopes: &[String],
        now: DateTime<Utc>,
    ) -> Result<TaskGroup> {
        let mut slugs = SlugCache::new();

        match self.build_tasks(graph_text, ctx, base_scopes, &mut slugs, now) {
            Ok(tasks) => Ok(TaskGroup { tasks, error: None }),
            Err(e) if e.is_graph_error() => {
                let message = e.to_string();
                warn!(
                    project = %ctx.project,
                    revision = %ctx.revision,
                    error = %message,
                    "Graph could not be built, falling back to the error task"
                );
                let task = build_error_task(
                    &self.instantiator,
                    &self.error_task,
                    ctx,
                    &message,
                    &mut slugs,
                    now,
                )?;
                Ok(TaskGroup {
                    tasks: vec![task],
                    error: Some(message),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Submit every task, at most `max_concurrent_submissions` at a time.
    pub async fn submit(&self, queue: &dyn QueueClient, group: TaskGroup) -> TaskGroupReport {
        let task_group_id = group.task_group_id().cloned();
        let limit = self.options.max_concurrent_submissions.max(1);

        let outcomes = stream::iter(group.tasks)
            .map(|(task_id, definition)| async move {
                let result = queue.create_task(&task_id, &definition).await;
                match &result {
                    Ok(()) => debug!(task_id = %task_id, "Task created"),
                    Err(e) => error!(task_id = %task_id, error = %e, "Task submission failed"),
                }
                SubmissionOutcome { task_id, result }
            })
            .buffered(limit)
            .collect::<Vec<_>>()
            .await;

        TaskGroupReport {
            task_group_id,
            error: group.error,
            outcomes,
        }
    }

    fn build_tasks(
        &self,
        graph_text: &str,
        ctx: &PushContext,
        base_scopes: &[String],
        slugs: &mut SlugCache,
        now: DateTime<Utc>,
    ) -> Result<Vec<(SlugId, TaskDefinition)>> {
        let (entries, graph_scopes) = match self.load_graph(graph_text, ctx, slugs, now)? {
            RenderedGraph::V0(graph) => {
                let entries = graph
                    .tasks
                    .into_iter()
                    .map(|entry| (entry.task_id, entry.task))
                    .collect::<Vec<_>>();
                (entries, graph.scopes)
            }
            RenderedGraph::V1(graph) => {
                let env = push_env(ctx, now);
                let tasks = Evaluator::new(slugs, now).render(&graph.tasks, &env)?;
                (version_one_entries(tasks)?, Vec::new())
            }
        };
        debug!(tasks = entries.len(), "Graph interpreted");

        let mut tasks = Vec::with_capacity(entries.len());
        let mut root: Option<SlugId> = None;

        for (task_id, body) in entries {
            let task_id = match task_id {
                Some(id) => id.parse::<SlugId>()?,
                None => SlugId::nice(),
            };
            let mut task = TaskDefinition::from_value(Value::Object(body))?;

            match &root {
                None => {
                    task.task_group_id = Some(task_id.to_string());
                    root = Some(task_id.clone());
                }
                Some(root) => {
                    task.task_group_id.get_or_insert_with(|| root.to_string());
                }
            }
            task.scheduler_id = Some(ctx.scheduler_id());

            let own_scopes = std::mem::take(&mut task.scopes);
            task.merge_scopes(base_scopes);
            task.merge_scopes(&graph_scopes);
            task.merge_scopes(&own_scopes);

            tasks.push((task_id, task));
        }

        Ok(tasks)
    }

    /// Version 1 documents are not templates: their `${...}` syntax must reach
    /// the expression evaluator untouched, so they are recognised before any
    /// template rendering.
    fn load_graph(
        &self,
        graph_text: &str,
        ctx: &PushContext,
        slugs: &mut SlugCache,
        now: DateTime<Utc>,
    ) -> Result<RenderedGraph> {
        if let Ok(raw) = serde_yaml::from_str::<Value>(graph_text)
            && declared_version(&raw) == Some(1)
        {
            return RenderedGraph::from_value(raw);
        }
        self.instantiator.instantiate(graph_text, ctx, slugs, now)
    }
}

/// Split evaluated version 1 tasks into an optional id and the definition.
fn version_one_entries(tasks: Option<Value>) -> Result<Vec<(Option<String>, Map<String, Value>)>> {
    let Some(Value::Array(items)) = tasks else {
        return Err(Error::Expression(
            "tasks must evaluate to an array of tasks".to_string(),
        ));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(mut task) => match task.remove("taskId") {
                None => Ok((None, task)),
                Some(Value::String(id)) => Ok((Some(id), task)),
                Some(_) => Err(Error::InvalidTask("taskId must be a string".to_string())),
            },
            _ => Err(Error::InvalidTask("each task must be an object".to_string())),
        })
        .collect()
}

/// Build and submit a task group with default options.
pub async fn schedule_task_group(
    queue: &dyn QueueClient,
    project_alias: &str,
    graph_text: &str,
    vars: &TemplateVariables,
    base_scopes: &[String],
    error_task: &str,
) -> Result<TaskGroupReport> {
    TaskGroupScheduler::new(error_task)
        .schedule(queue, project_alias, graph_text, vars, base_scopes)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TryConfig;
    use crate::queue::MemoryQueue;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn variables() -> TemplateVariables {
        TemplateVariables::new()
            .set("owner", "ffxbld")
            .set("source", "https://hg.mozilla.org/myrepo/raw-file/abc/.taskcluster.yml")
            .set("revision", "abc")
            .set("project", "mine")
            .set("level", 3)
            .set("revision_hash", "abc")
            .set("pushlog_id", "1")
            .set("url", "https://hg.mozilla.org/myrepo")
    }

    fn scheduler() -> TaskGroupScheduler {
        TaskGroupScheduler::new(TryConfig::builtin().unwrap().error_task)
    }

    fn context() -> PushContext {
        PushContext::from_variables(&variables()).unwrap()
    }

    const TWO_TASKS: &str = r#"
version: 0
scopes: [graph-scope, base-scope]
tasks:
  - taskId: '{{#as_slugid}}decision{{/as_slugid}}'
    task:
      created: '{{now}}'
      deadline: '{{#from_now}}1 day{{/from_now}}'
      scopes: [own-scope, graph-scope]
  - taskId: '{{#as_slugid}}build{{/as_slugid}}'
    task:
      created: '{{now}}'
      deadline: '{{#from_now}}1 day{{/from_now}}'
      dependencies: ['{{#as_slugid}}decision{{/as_slugid}}']
"#;

    #[test]
    fn test_group_and_scopes() {
        let base = vec!["base-scope".to_string()];
        let group = scheduler()
            .build(TWO_TASKS, &context(), &base, Utc::now())
            .unwrap();

        assert!(!group.is_error_task());
        let (decision_id, decision) = &group.tasks[0];
        let (_, build) = &group.tasks[1];

        assert_eq!(decision.task_group_id.as_deref(), Some(decision_id.as_str()));
        assert_eq!(build.task_group_id.as_deref(), Some(decision_id.as_str()));
        assert_eq!(build.dependencies, vec![decision_id.to_string()]);
        assert_eq!(decision.scheduler_id.as_deref(), Some("gecko-level-3"));
        assert_eq!(decision.scopes, vec!["base-scope", "graph-scope", "own-scope"]);
        assert_eq!(build.scopes, vec!["base-scope", "graph-scope"]);
    }

    #[test]
    fn test_missing_task_id_is_generated() {
        let graph = "version: 0\ntasks:\n- task: {created: '{{now}}', deadline: '{{now}}'}\n";
        let group = scheduler().build(graph, &context(), &[], Utc::now()).unwrap();
        assert_eq!(group.tasks.len(), 1);
        assert!(SlugId::is_valid(group.tasks[0].0.as_str()));
    }

    #[test]
    fn test_version_one_tasks() {
        let graph = json!({
            "version": 1,
            "tasks": [
                {
                    "taskId": {"$eval": "as_slugid('a')"},
                    "created": {"$fromNow": ""},
                    "deadline": {"$fromNow": "1 day"},
                    "routes": ["index.${repo.project}.${push.revision}"]
                },
                {"$if": "repo.level > 5", "then": {"created": "x", "deadline": "y"}}
            ]
        })
        .to_string();
        let group = scheduler().build(&graph, &context(), &[], Utc::now()).unwrap();

        assert!(!group.is_error_task());
        assert_eq!(group.tasks.len(), 1);
        assert_eq!(group.tasks[0].1.routes, vec!["index.mine.abc"]);
    }

    #[test]
    fn test_graph_errors_become_error_task() {
        let cases = [
            "version: 0\nIN-VALID: true",
            "version: 2\ntasks: []",
            "tasks: []",
            ":\n:",
            "version: 0\ntasks:\n- task: {deadline: '{{#from_now}}soon{{/from_now}}'}",
            "version: 0\ntasks:\n- task: {created: nope, deadline: nope}",
            "version: 0\ntasks:\n- taskId: not a slug\n  task: {}",
            r#"{"version": 1, "tasks": {"$eval": "missing"}}"#,
            r#"{"version": 1, "tasks": {"$eval": "42"}}"#,
        ];
        for graph in cases {
            let group = scheduler().build(graph, &context(), &[], Utc::now()).unwrap();
            assert!(group.is_error_task(), "{}", graph);
            assert_eq!(group.tasks.len(), 1, "{}", graph);
            let env = group.tasks[0].1.payload.env.clone().unwrap();
            assert!(!env["ERROR_MSG"].as_str().unwrap().is_empty());
        }
    }

    #[test]
    fn test_broken_error_task_propagates() {
        let scheduler = TaskGroupScheduler::new("version: 0\ntasks: []");
        let result = scheduler.build("version: 9", &context(), &[], Utc::now());
        assert!(matches!(result, Err(Error::ErrorTask(_))));
    }

    #[tokio::test]
    async fn test_invalid_variables_propagate() {
        let queue = MemoryQueue::new();
        let mut vars = variables();
        vars.remove("revision");
        let result = scheduler()
            .schedule(&queue, "mine", TWO_TASKS, &vars, &[])
            .await;
        assert!(matches!(result, Err(Error::InvalidContext(_))));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_failed_submission_does_not_stop_others() {
        let queue = MemoryQueue::new();
        let ctx = context();
        let scheduler = scheduler().with_options(SchedulerOptions {
            max_concurrent_submissions: 1,
        });
        let group = scheduler.build(TWO_TASKS, &ctx, &[], Utc::now()).unwrap();
        let rejected = group.tasks[0].0.clone();
        queue.reject(rejected.as_str());

        let report = scheduler.submit(&queue, group).await;
        assert_eq!(report.outcomes.len(), 2);
        assert_eq!(report.submitted().len(), 1);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(queue.len(), 1);
        assert!(matches!(
            report.into_result(),
            Err(Error::Queue { task_id, .. }) if task_id == rejected.as_str()
        ));
    }

    #[tokio::test]
    async fn test_schedule_task_group_submits_all() {
        let queue = MemoryQueue::new();
        let error_task = TryConfig::builtin().unwrap().error_task;
        let report = schedule_task_group(&queue, "mine", TWO_TASKS, &variables(), &[], &error_task)
            .await
            .unwrap();

        assert_eq!(queue.len(), 2);
        let ids = report.into_result().unwrap();
        assert_eq!(ids.len(), 2);
    }
}
