use crate::context::Context;
use crate::descriptor::TaskDescriptor;
use crate::util::{revision_key, stream_paginated};
use anyhow::{Context as _, Ok, Result, anyhow};
use aws_sdk_ecs::Client;
use aws_sdk_ecs::types::Task;
use comfy_table::Table;
use futures::TryStreamExt;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// `startedBy` tag on tasks launched by `run`.
pub const STARTED_BY: &str = "ecsman";

const LATEST: &str = "latest";

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    cluster: String,
    task_definition: String,
}

#[derive(clap::Args, Debug)]
pub struct RegisterArgs {
    /// JSON file describing the task definition
    task_file: PathBuf,
}

#[derive(clap::Args, Debug)]
pub struct DefsArgs {
    /// Task definition family
    family: Option<String>,

    /// Revision number, or `latest`
    #[clap(requires = "family")]
    revision: Option<String>,
}

impl RunArgs {
    pub async fn run(self, ctx: &Context) -> Result<()> {
        println!("Running one instance of task {}", self.task_definition);
        let resp = ctx
            .ecs()
            .run_task()
            .cluster(&self.cluster)
            .task_definition(&self.task_definition)
            .count(1)
            .started_by(STARTED_BY)
            .send()
            .await
            .context("running task")?;

        for failure in resp.failures() {
            println!("  FAILED Task: {}", failure.arn().unwrap_or_default());
            println!("  - Error: {}", failure.reason().unwrap_or_default());
        }
        for task in resp.tasks() {
            let containers: Vec<&str> = task
                .containers()
                .iter()
                .filter_map(|c| c.name())
                .collect();
            println!(
                "  Running task definition: {}",
                task.task_definition_arn().unwrap_or_default()
            );
            println!("  - Task Running on container(s) {containers:?}");
            println!(
                "  - Last known status: {}",
                task.last_status().unwrap_or_default()
            );
        }
        Ok(())
    }
}

impl RegisterArgs {
    pub async fn run(self, ctx: &Context) -> Result<()> {
        let descriptor = TaskDescriptor::load(&self.task_file)?;
        println!("Registering Task Definition...\n");

        let (family, container) = descriptor.into_parts();
        let resp = ctx
            .ecs()
            .register_task_definition()
            .family(family)
            .container_definitions(container)
            .send()
            .await
            .context("registering task definition")?;
        let registered = resp
            .task_definition()
            .ok_or_else(|| anyhow!("register returned no task definition"))?;

        println!("Registered new Task Definition:");
        println!("  - Family: {}", registered.family().unwrap_or_default());
        println!("  - Revision: {}", registered.revision());
        println!(
            "  - Status: {}",
            registered.status().map(|s| s.as_str()).unwrap_or_default()
        );
        Ok(())
    }
}

impl DefsArgs {
    pub async fn run(self, ctx: &Context) -> Result<()> {
        let client = ctx.ecs();
        let arns = list_task_definitions(&client, self.family.clone()).await?;

        let Some(family) = self.family else {
            let mut table = Table::new();
            table.set_header(vec!["Family", "Latest Revision"]);
            for (family, revision) in latest_by_family(&arns) {
                table.add_row(vec![family, revision]);
            }
            println!("Task Definition families:");
            println!("{table}");
            return Ok(());
        };

        for arn in select_task_definitions(&arns, &family, self.revision.as_deref()) {
            print_task_definition(&client, arn, true).await?;
        }
        Ok(())
    }
}

async fn list_task_definitions(client: &Client, family: Option<String>) -> Result<Vec<String>> {
    debug!(?family, "listing task definitions");
    let s = stream_paginated(client.clone(), family, |client, family, token| async move {
        let resp = client
            .list_task_definitions()
            .set_family_prefix(family.clone())
            .set_next_token(token)
            .send()
            .await
            .context("fetching task definitions list")?;
        Ok((resp.task_definition_arns.unwrap_or_default(), family, resp.next_token))
    });
    s.try_concat().await
}

/// Positional: the last ARN listed for a family wins, revisions are not
/// compared numerically.
pub fn latest_by_family(arns: &[String]) -> BTreeMap<&str, &str> {
    let mut families = BTreeMap::new();
    for arn in arns {
        if let Some((family, revision)) = revision_key(arn).split_once(':') {
            families.insert(family, revision);
        }
    }
    families
}

pub fn select_task_definitions<'a>(
    arns: &'a [String],
    family: &str,
    selector: Option<&str>,
) -> Vec<&'a str> {
    match selector.filter(|s| !s.is_empty()) {
        None => arns.iter().map(String::as_str).collect(),
        Some(LATEST) => arns.last().map(String::as_str).into_iter().collect(),
        Some(revision) => {
            let wanted = format!("{family}:{revision}");
            arns.iter()
                .map(String::as_str)
                .filter(|arn| revision_key(arn) == wanted)
                .collect()
        }
    }
}

pub async fn service_tasks(client: &Client, cluster: &str, service: &str) -> Result<Vec<Task>> {
    debug!(cluster, service, "listing service tasks");
    let s = stream_paginated(
        client.clone(),
        (cluster.to_string(), service.to_string()),
        |client, (cluster, service), token| async move {
            let resp = client
                .list_tasks()
                .cluster(&cluster)
                .service_name(&service)
                .set_next_token(token)
                .send()
                .await
                .context("fetching task list for service")?;

            let arns = resp.task_arns.unwrap_or_default();
            let tasks = if arns.is_empty() {
                Vec::new()
            } else {
                client
                    .describe_tasks()
                    .cluster(&cluster)
                    .set_tasks(Some(arns))
                    .send()
                    .await
                    .context("fetching task data for service")?
                    .tasks
                    .unwrap_or_default()
            };

            Ok((tasks, (cluster, service), resp.next_token))
        },
    );
    s.try_concat().await
}

pub fn print_service_tasks(tasks: &[Task], service_revision: &str) {
    for task in tasks {
        let task_definition = task.task_definition_arn().unwrap_or_default();
        println!("  - Task {}", task.task_arn().unwrap_or_default());
        println!("    Task Def: {task_definition}");
        println!(
            "    Desired status {} - Last status {}",
            task.desired_status().unwrap_or_default(),
            task.last_status().unwrap_or_default()
        );
        if revision_key(task_definition) != service_revision {
            println!(
                "    *** WARNING: task does not have the same task/revision as the service definition ***"
            );
        }
    }
}

pub async fn print_task_definition(client: &Client, arn: &str, verbose: bool) -> Result<()> {
    let resp = client
        .describe_task_definition()
        .task_definition(arn)
        .send()
        .await
        .with_context(|| format!("fetching task definition for {arn}"))?;
    let def = resp
        .task_definition()
        .ok_or_else(|| anyhow!("no task definition returned for {arn}"))?;

    println!("  - Task Definition: {arn}");
    println!("    - Family: {}", def.family().unwrap_or_default());
    for container in def.container_definitions() {
        println!("    - Container Definition:");
        println!("      - Image: {}", container.image().unwrap_or_default());
        if verbose {
            println!("      - CPU: {}", container.cpu());
            let memory = container
                .memory()
                .map(|m| m.to_string())
                .unwrap_or_default();
            println!("      - Memory: {memory}");
        }
        for mapping in container.port_mappings() {
            println!(
                "      - Container Port {} : Host Port {}",
                mapping.container_port().unwrap_or_default(),
                mapping.host_port().unwrap_or_default()
            );
        }
        if !container.command().is_empty() {
            println!("      - Command: {:?}", container.command());
        }
        if !container.entry_point().is_empty() {
            println!("      - Entry Point: {:?}", container.entry_point());
        }
        if verbose && !container.environment().is_empty() {
            println!("      - Environment:");
            for var in container.environment() {
                println!(
                    "        {} = {}",
                    var.name().unwrap_or_default(),
                    var.value().unwrap_or_default()
                );
            }
        }
    }
    Ok(())
}
