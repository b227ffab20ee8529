use crate::context::Context;
use crate::util::revision_key;
use crate::{elb, service, task};
use anyhow::Result;
use aws_sdk_ecs::types::Task;
use tracing::debug;

const RUNNING: &str = "RUNNING";

#[derive(clap::Args, Debug)]
pub struct Args {
    cluster: String,
    service: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TaskCheck {
    pub lines: Vec<String>,
    pub running: usize,
}

impl Args {
    pub async fn run(self, ctx: &Context) -> Result<()> {
        let client = ctx.ecs();
        let service = service::describe_service(&client, &self.cluster, &self.service).await?;
        let service_revision = revision_key(service.task_definition().unwrap_or_default());
        debug!(service = %self.service, %service_revision, "checking service");

        let tasks = task::service_tasks(&client, &self.cluster, &self.service).await?;
        let report = check_tasks(service_revision, &tasks, ctx.verbose);
        for line in &report.lines {
            println!("{line}");
        }

        let names = service
            .load_balancers()
            .iter()
            .filter_map(|lb| lb.load_balancer_name().map(str::to_string))
            .collect();
        let balancers = elb::describe_load_balancers(ctx, names).await?;
        let instances = elb::registered_instances(&balancers);
        if let Some(warning) = check_instance_count(instances, report.running) {
            println!("{warning}");
        }
        Ok(())
    }
}

pub fn check_tasks(service_revision: &str, tasks: &[Task], verbose: bool) -> TaskCheck {
    let mut report = TaskCheck::default();
    for task in tasks {
        let task_definition = task.task_definition_arn().unwrap_or_default();
        let last_status = task.last_status().unwrap_or_default();
        if verbose {
            report
                .lines
                .push(format!("  - Task {}", task.task_arn().unwrap_or_default()));
            report.lines.push(format!("    Task Def: {task_definition}"));
            report.lines.push(format!(
                "    Desired status {} - Last status {last_status}",
                task.desired_status().unwrap_or_default()
            ));
        }
        if last_status == RUNNING {
            report.running += 1;
        }
        let task_revision = revision_key(task_definition);
        if task_revision != service_revision {
            report.lines.push(format!(
                "WARNING: task uses {task_revision} but service definition is {service_revision}"
            ));
        }
    }
    if report.running == 0 {
        report
            .lines
            .push("WARNING: No tasks in RUNNING state for the service".to_string());
    }
    report
}

/// Advisory: registration and task state can lag each other briefly.
pub fn check_instance_count(instances: usize, running: usize) -> Option<String> {
    (instances != running).then(|| {
        format!(
            "WARNING: ELB instance count of {instances} is different from number of running tasks {running}"
        )
    })
}
