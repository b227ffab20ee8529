use crate::context::Context;
use crate::task::{print_service_tasks, print_task_definition, service_tasks};
use crate::util::{format_timestamp, print_separator, revision_key, stream_paginated};
use crate::{cluster, elb};
use anyhow::{Context as _, Ok, Result, anyhow, bail};
use aws_sdk_ecs::Client;
use aws_sdk_ecs::operation::register_task_definition::builders::RegisterTaskDefinitionFluentBuilder;
use aws_sdk_ecs::types::{ContainerDefinition, Service, TaskDefinition};
use futures::TryStreamExt;
use tracing::debug;

const TASK_MARKER: &str = "(task ";

#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Cluster to list services of; all clusters when omitted
    cluster: Option<String>,

    /// Only show this service
    #[clap(requires = "cluster")]
    service: Option<String>,
}

#[derive(clap::Args, Debug)]
pub struct UpdateArgs {
    cluster: String,
    service: String,

    /// New image URL, or `:tag` to keep the current repository
    image: String,
}

impl ListArgs {
    pub async fn run(self, ctx: &Context, events: usize, show_elbs: bool) -> Result<()> {
        let Some(cluster) = self.cluster else {
            return cluster::list_clusters(ctx).await;
        };
        let balancers = print_services(ctx, &cluster, self.service.as_deref(), events).await?;
        if show_elbs {
            elb::print_load_balancers(ctx, balancers).await?;
        }
        Ok(())
    }
}

impl UpdateArgs {
    pub async fn run(self, ctx: &Context) -> Result<()> {
        let image = ImageRef::parse(&self.image)?;

        println!("Updating service {}", self.service);
        let client = ctx.ecs();
        let service = describe_service(&client, &self.cluster, &self.service).await?;
        let current_arn = service
            .task_definition()
            .ok_or_else(|| anyhow!("service {} has no task definition", self.service))?;

        let resp = client
            .describe_task_definition()
            .task_definition(current_arn)
            .send()
            .await
            .with_context(|| format!("fetching task definition for {current_arn}"))?;
        let current = resp
            .task_definition()
            .ok_or_else(|| anyhow!("no task definition returned for {current_arn}"))?;

        let mut container = single_container(current)?.clone();
        let current_image = container.image().unwrap_or_default().to_string();
        let new_image = image.resolve(&current_image)?;

        println!(
            "  - Task Definition: {}",
            current.family().unwrap_or_default()
        );
        println!("  - Current image: {current_image}");
        println!("  - Updating to: {new_image}");
        container.image = Some(new_image);

        let resp = next_revision(client.register_task_definition(), current, container)
            .send()
            .await
            .context("registering updated task definition")?;
        let registered = resp
            .task_definition()
            .ok_or_else(|| anyhow!("register returned no task definition"))?;
        println!(
            "  -> Task definition updated, registered as revision {}",
            registered.revision()
        );

        let resp = client
            .update_service()
            .cluster(&self.cluster)
            .service(&self.service)
            .set_task_definition(registered.task_definition_arn.clone())
            .send()
            .await
            .context("updating service with new task definition")?;
        let updated = resp
            .service()
            .ok_or_else(|| anyhow!("update returned no service"))?;

        println!("  -> Service updated with new task definition:");
        println!("     - Desired count: {}", updated.desired_count());
        println!("     - Pending count: {}", updated.pending_count());
        println!("     - Running count: {}", updated.running_count());
        println!(
            "     - Service status: {}",
            updated.status().unwrap_or_default()
        );
        Ok(())
    }
}

/// Same family and task-level settings as `current`, with `container` swapped in.
pub fn next_revision(
    req: RegisterTaskDefinitionFluentBuilder,
    current: &TaskDefinition,
    container: ContainerDefinition,
) -> RegisterTaskDefinitionFluentBuilder {
    req.set_family(current.family.clone())
        .container_definitions(container)
        .set_task_role_arn(current.task_role_arn.clone())
        .set_execution_role_arn(current.execution_role_arn.clone())
        .set_network_mode(current.network_mode.clone())
        .set_volumes(current.volumes.clone())
        .set_placement_constraints(current.placement_constraints.clone())
        .set_requires_compatibilities(current.requires_compatibilities.clone())
        .set_cpu(current.cpu.clone())
        .set_memory(current.memory.clone())
        .set_pid_mode(current.pid_mode.clone())
        .set_ipc_mode(current.ipc_mode.clone())
        .set_proxy_configuration(current.proxy_configuration.clone())
        .set_inference_accelerators(current.inference_accelerators.clone())
        .set_ephemeral_storage(current.ephemeral_storage.clone())
        .set_runtime_platform(current.runtime_platform.clone())
        .set_enable_fault_injection(current.enable_fault_injection)
}

pub async fn describe_service(client: &Client, cluster: &str, service: &str) -> Result<Service> {
    debug!(cluster, service, "describing service");
    let resp = client
        .describe_services()
        .cluster(cluster)
        .services(service)
        .send()
        .await
        .with_context(|| format!("fetching service data for service {service}"))?;
    first_service(resp.services.unwrap_or_default(), cluster, service)
}

/// An empty describe answer means the service does not exist.
fn first_service(services: Vec<Service>, cluster: &str, service: &str) -> Result<Service> {
    services
        .into_iter()
        .next()
        .ok_or_else(|| anyhow!("service {service} not found in cluster {cluster}"))
}

pub async fn list_services(client: &Client, cluster: &str) -> Result<Vec<Service>> {
    debug!(cluster, "listing services");
    let s = stream_paginated(
        client.clone(),
        cluster.to_string(),
        |client, cluster, token| async move {
            let resp = client
                .list_services()
                .cluster(&cluster)
                .max_results(10)
                .set_next_token(token)
                .send()
                .await
                .with_context(|| format!("finding services for cluster {cluster}"))?;

            let arns = resp.service_arns.unwrap_or_default();
            let services = if arns.is_empty() {
                Vec::new()
            } else {
                client
                    .describe_services()
                    .cluster(&cluster)
                    .set_services(Some(arns))
                    .send()
                    .await
                    .with_context(|| format!("fetching service data for cluster {cluster}"))?
                    .services
                    .unwrap_or_default()
            };

            Ok((services, cluster, resp.next_token))
        },
    );
    s.try_concat().await
}

pub async fn print_services(
    ctx: &Context,
    cluster: &str,
    filter: Option<&str>,
    events: usize,
) -> Result<Vec<String>> {
    let client = ctx.ecs();
    let services = list_services(&client, cluster).await?;
    println!("{} Services in cluster {cluster}", services.len());

    let mut balancers = Vec::new();
    if services.is_empty() {
        println!("  No services to describe.");
    }

    let selected = select_services(&services, filter);
    for service in &selected {
        let name = service.service_name().unwrap_or_default();
        print_separator();
        println!("  Service: {name}");
        println!("  - Running Count: {}", service.running_count());
        println!("  - Status: {}", service.status().unwrap_or_default());
        for lb in service.load_balancers() {
            let lb_name = lb.load_balancer_name().unwrap_or_default();
            balancers.push(lb_name.to_string());
            println!(
                "  - Load Balancer: {lb_name} Port: {}",
                lb.container_port()
                    .map(|p| p.to_string())
                    .unwrap_or_default()
            );
            println!(
                "    Container Name: {}",
                lb.container_name().unwrap_or_default()
            );
        }
        for deployment in service.deployments() {
            println!(
                "  - Deployment: {} Status: {}",
                deployment.id().unwrap_or_default(),
                deployment.status().unwrap_or_default()
            );
            println!("    Running instances: {}", deployment.running_count());
        }

        let task_definition = service.task_definition().unwrap_or_default();
        let tasks = service_tasks(&client, cluster, name).await?;
        print_service_tasks(&tasks, revision_key(task_definition));

        if events > 0 && !service.events().is_empty() {
            print_events(&client, cluster, service, events).await?;
        }

        if !task_definition.is_empty() {
            print_task_definition(&client, task_definition, ctx.verbose).await?;
        }
    }

    if let Some(filter) = filter.filter(|_| selected.is_empty()) {
        println!("  Service {filter} not found.");
    }
    Ok(balancers)
}

pub fn select_services<'a>(services: &'a [Service], filter: Option<&str>) -> Vec<&'a Service> {
    services
        .iter()
        .filter(|s| filter.is_none_or(|f| s.service_name() == Some(f)))
        .collect()
}

async fn print_events(
    client: &Client,
    cluster: &str,
    service: &Service,
    limit: usize,
) -> Result<()> {
    let events = service.events();
    println!("  - Events (most recent {}):", limit.min(events.len()));
    for event in events.iter().take(limit) {
        let message = event.message().unwrap_or_default();
        let at = event.created_at().map(format_timestamp).unwrap_or_default();
        println!("    At {at}: {message}");

        let Some(task_id) = event_task_id(message) else {
            continue;
        };
        let resp = client
            .describe_tasks()
            .cluster(cluster)
            .tasks(task_id)
            .send()
            .await
            .with_context(|| format!("getting task data for {task_id}"))?;
        match resp.tasks().first() {
            Some(task) => {
                println!(
                    "      Task: {}",
                    task.task_definition_arn().unwrap_or_default()
                );
                println!(
                    "      Last known status: {}",
                    task.last_status().unwrap_or_default()
                );
            }
            None => println!("      Request for task data returned no results."),
        }
    }
    Ok(())
}

/// Task id in messages such as `(service web) has started 1 tasks: (task 1234abcd).`:
/// the text between `(task ` and the final two characters.
pub fn event_task_id(message: &str) -> Option<&str> {
    let start = message.find(TASK_MARKER)? + TASK_MARKER.len();
    let end = message.len().checked_sub(2)?;
    message.get(start..end).filter(|id| !id.is_empty())
}

pub fn single_container(def: &TaskDefinition) -> Result<&ContainerDefinition> {
    match def.container_definitions() {
        [container] => Ok(container),
        [] => bail!("task definition has no container definition"),
        _ => bail!(
            "this service has multiple containers, only a single container definition is supported"
        ),
    }
}

/// `:tag` keeps the current repository.
#[derive(Debug, PartialEq, Eq)]
pub enum ImageRef {
    Full(String),
    Tag(String),
}

impl ImageRef {
    pub fn parse(requested: &str) -> Result<Self> {
        if requested.is_empty() {
            bail!("you must specify a new image URL to update the image");
        }
        if requested.starts_with(':') {
            Ok(Self::Tag(requested.to_string()))
        } else {
            Ok(Self::Full(requested.to_string()))
        }
    }

    pub fn resolve(&self, current: &str) -> Result<String> {
        match self {
            Self::Full(image) => Ok(image.clone()),
            Self::Tag(tag) => {
                let parts: Vec<&str> = current.split(':').collect();
                if parts.len() > 2 {
                    bail!(
                        "split on colon found more than two elements in current image URL {current}"
                    );
                }
                Ok(format!("{}{tag}", parts[0]))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_sdk_ecs::config::{BehaviorVersion, Region};
    use aws_sdk_ecs::types::{
        Compatibility, CpuArchitecture, IpcMode, NetworkMode, OsFamily, PidMode, RuntimePlatform,
        Volume,
    };

    fn service(name: &str) -> Service {
        Service::builder().service_name(name).build()
    }

    fn offline_client() -> Client {
        let config = aws_sdk_ecs::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-west-2"))
            .build();
        Client::from_conf(config)
    }

    #[test]
    fn tag_shorthand_replaces_tag() {
        let image = ImageRef::parse(":new").unwrap();
        assert_eq!(image, ImageRef::Tag(":new".to_string()));
        assert_eq!(image.resolve("repo/img:old").unwrap(), "repo/img:new");
    }

    #[test]
    fn tag_shorthand_appends_to_untagged_image() {
        let image = ImageRef::parse(":v2").unwrap();
        assert_eq!(image.resolve("repo/img").unwrap(), "repo/img:v2");
    }

    #[test]
    fn tag_shorthand_rejects_ambiguous_image() {
        let err = ImageRef::parse(":new")
            .unwrap()
            .resolve("registry:5000/img:old")
            .unwrap_err();
        assert!(err.to_string().contains("more than two elements"), "{err}");
    }

    #[test]
    fn full_image_is_used_verbatim() {
        let image = ImageRef::parse("other/img:1.0").unwrap();
        assert_eq!(image.resolve("registry:5000/img:old").unwrap(), "other/img:1.0");
    }

    #[test]
    fn empty_image_is_rejected() {
        let err = ImageRef::parse("").unwrap_err();
        assert!(err.to_string().contains("new image URL"), "{err}");
    }

    #[test]
    fn single_container_enforced() {
        let one = TaskDefinition::builder()
            .container_definitions(ContainerDefinition::builder().image("repo/a:1").build())
            .build();
        assert_eq!(single_container(&one).unwrap().image(), Some("repo/a:1"));

        let two = TaskDefinition::builder()
            .container_definitions(ContainerDefinition::builder().name("a").build())
            .container_definitions(ContainerDefinition::builder().name("b").build())
            .build();
        let err = single_container(&two).unwrap_err();
        assert!(err.to_string().contains("multiple containers"), "{err}");

        assert!(single_container(&TaskDefinition::builder().build()).is_err());
    }

    #[test]
    fn next_revision_keeps_task_settings() {
        let platform = RuntimePlatform::builder()
            .cpu_architecture(CpuArchitecture::Arm64)
            .operating_system_family(OsFamily::Linux)
            .build();
        let current = TaskDefinition::builder()
            .family("web")
            .network_mode(NetworkMode::Awsvpc)
            .requires_compatibilities(Compatibility::Fargate)
            .cpu("256")
            .memory("512")
            .pid_mode(PidMode::Task)
            .ipc_mode(IpcMode::Task)
            .runtime_platform(platform.clone())
            .volumes(Volume::builder().name("data").build())
            .execution_role_arn("arn:aws:iam::123456789012:role/exec")
            .container_definitions(ContainerDefinition::builder().image("repo/web:1").build())
            .build();
        let container = ContainerDefinition::builder().image("repo/web:2").build();

        let req = next_revision(
            offline_client().register_task_definition(),
            &current,
            container,
        );
        let input = req.as_input();

        assert_eq!(input.get_family().as_deref(), Some("web"));
        assert_eq!(input.get_runtime_platform(), &Some(platform));
        assert_eq!(input.get_network_mode(), &Some(NetworkMode::Awsvpc));
        assert_eq!(
            input.get_requires_compatibilities(),
            &Some(vec![Compatibility::Fargate])
        );
        assert_eq!(input.get_cpu().as_deref(), Some("256"));
        assert_eq!(input.get_memory().as_deref(), Some("512"));
        assert_eq!(input.get_pid_mode(), &Some(PidMode::Task));
        assert_eq!(input.get_ipc_mode(), &Some(IpcMode::Task));
        assert_eq!(input.get_volumes().as_ref().map(Vec::len), Some(1));
        assert_eq!(
            input.get_execution_role_arn().as_deref(),
            Some("arn:aws:iam::123456789012:role/exec")
        );

        let containers = input.get_container_definitions().as_ref().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0].image(), Some("repo/web:2"));
    }

    #[test]
    fn unknown_service_is_not_found() {
        let err = first_service(Vec::new(), "prod", "ghost").unwrap_err();
        assert_eq!(err.to_string(), "service ghost not found in cluster prod");

        let found = first_service(vec![service("web")], "prod", "web").unwrap();
        assert_eq!(found.service_name(), Some("web"));
    }

    #[test]
    fn select_services_by_name() {
        let services = vec![service("web"), service("worker"), service("api")];

        let all = select_services(&services, None);
        assert_eq!(all.len(), 3);

        let one = select_services(&services, Some("worker"));
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].service_name(), Some("worker"));

        assert!(select_services(&services, Some("ghost")).is_empty());
        assert!(select_services(&[], Some("web")).is_empty());
    }

    #[test]
    fn extracts_task_id_from_event() {
        assert_eq!(
            event_task_id("(service web) has started 1 tasks: (task 1a2b3c4d-5e6f)."),
            Some("1a2b3c4d-5e6f")
        );
        assert_eq!(
            event_task_id("(service web) has stopped 1 running tasks: (task abc)."),
            Some("abc")
        );
    }

    #[test]
    fn task_id_runs_to_two_characters_before_the_end() {
        // the id is not terminated at the closing parenthesis
        assert_eq!(
            event_task_id("(service web) (task 1234) failed health checks."),
            Some("1234) failed health check")
        );
    }

    #[test]
    fn events_without_task_marker_have_no_id() {
        assert_eq!(event_task_id("(service web) has reached a steady state."), None);
        assert_eq!(event_task_id("(task )."), None);
        assert_eq!(event_task_id("(task x"), None);
    }
}
