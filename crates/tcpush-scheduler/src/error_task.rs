//! The task submitted in place of a graph that could not be built.

use chrono::{DateTime, Utc};
use tcpush_core::graph::RenderedGraph;
use tcpush_core::{Error, PushContext, Result, SlugCache, SlugId, TaskDefinition};
use tcpush_template::Instantiator;

/// Environment variable carrying the failure text.
pub const ERROR_MSG_ENV: &str = "ERROR_MSG";

/// Build the error task from `template`, a version 0 graph template.
///
/// The first task of the rendered graph is used. It gets `message` in its
/// environment, no scopes, the push owner and source as metadata when the
/// template leaves them out, and the scheduler id of the push. Any failure is
/// reported as [`Error::ErrorTask`].
pub fn build_error_task(
    instantiator: &Instantiator,
    template: &str,
    ctx: &PushContext,
    message: &str,
    slugs: &mut SlugCache,
    now: DateTime<Utc>,
) -> Result<(SlugId, TaskDefinition)> {
    let ctx = ctx.with_error(message);
    let graph = instantiator
        .instantiate(template, &ctx, slugs, now)
        .map_err(|e| Error::ErrorTask(e.to_string()))?;

    let RenderedGraph::V0(graph) = graph else {
        return Err(Error::ErrorTask(
            "error task template must be a version 0 graph".to_string(),
        ));
    };
    let entry = graph
        .tasks
        .into_iter()
        .next()
        .ok_or_else(|| Error::ErrorTask("error task template has no tasks".to_string()))?;

    let task_id = match entry.task_id {
        Some(id) => id
            .parse::<SlugId>()
            .map_err(|e| Error::ErrorTask(e.to_string()))?,
        None => SlugId::nice(),
    };
    let mut task = TaskDefinition::from_value(entry.task.into())
        .map_err(|e| Error::ErrorTask(e.to_string()))?;

    task.set_env(ERROR_MSG_ENV, message);
    task.scopes.clear();
    task.metadata.owner.get_or_insert_with(|| ctx.owner.clone());
    task.metadata.source.get_or_insert_with(|| ctx.source.clone());
    task.scheduler_id = Some(ctx.scheduler_id());
    task.task_group_id = Some(task_id.to_string());

    Ok((task_id, task))
}
