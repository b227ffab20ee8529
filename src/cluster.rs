use crate::context::Context;
use crate::service::list_services;
use crate::util::{print_separator, stream_paginated};
use anyhow::{Context as _, Ok, Result};
use comfy_table::Table;
use futures::{StreamExt, pin_mut};
use tracing::debug;

pub async fn list_clusters(ctx: &Context) -> Result<()> {
    let client = ctx.ecs();
    let s = stream_paginated(client.clone(), (), |client, _, token| async move {
        let resp = client
            .list_clusters()
            .set_next_token(token)
            .send()
            .await
            .context("fetching clusters list")?;
        let arns = resp.cluster_arns.unwrap_or_default();
        // an empty describe falls back to the `default` cluster
        if arns.is_empty() {
            return Ok((Vec::new(), (), resp.next_token));
        }
        let clusters = client
            .describe_clusters()
            .set_clusters(Some(arns))
            .send()
            .await
            .context("fetching cluster data")?;
        Ok((clusters.clusters.unwrap_or_default(), (), resp.next_token))
    });

    pin_mut!(s);

    while let Some(clusters) = s.next().await.transpose()? {
        for cluster in clusters {
            let name = cluster.cluster_name().unwrap_or_default();
            let arn = cluster.cluster_arn().unwrap_or(name);
            debug!(cluster = name, "describing cluster");

            print_separator();
            println!(
                "Cluster: {name} ({})",
                cluster.status().unwrap_or_default()
            );
            println!(
                "  {} services active, {} containers",
                cluster.active_services_count(),
                cluster.registered_container_instances_count()
            );
            println!(
                "  Tasks: {} running, {} pending",
                cluster.running_tasks_count(),
                cluster.pending_tasks_count()
            );

            let services = list_services(&client, arn).await?;
            if services.is_empty() {
                continue;
            }

            let mut table = Table::new();
            table.set_header(vec!["Service", "Status", "Running", "Desired", "Pending"]);
            for service in services {
                table.add_row(vec![
                    service.service_name().unwrap_or_default().to_string(),
                    service.status().unwrap_or_default().to_string(),
                    service.running_count().to_string(),
                    service.desired_count().to_string(),
                    service.pending_count().to_string(),
                ]);
            }
            println!("{table}");
        }
    }
    Ok(())
}
