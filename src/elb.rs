use crate::context::Context;
use crate::util::print_separator;
use anyhow::{Context as _, Result};
use aws_sdk_elasticloadbalancing::types::LoadBalancerDescription;
use tracing::debug;

/// Describes the named load balancers. No names means no call: the API would
/// otherwise describe every load balancer in the region.
pub async fn describe_load_balancers(
    ctx: &Context,
    names: Vec<String>,
) -> Result<Vec<LoadBalancerDescription>> {
    if names.is_empty() {
        return Ok(Vec::new());
    }
    debug!(?names, "describing load balancers");
    let resp = ctx
        .elb()
        .describe_load_balancers()
        .set_load_balancer_names(Some(names))
        .send()
        .await
        .context("fetching load balancer data")?;
    Ok(resp.load_balancer_descriptions.unwrap_or_default())
}

pub fn registered_instances(balancers: &[LoadBalancerDescription]) -> usize {
    balancers.iter().map(|b| b.instances().len()).sum()
}

pub async fn print_load_balancers(ctx: &Context, names: Vec<String>) -> Result<()> {
    if names.is_empty() {
        return Ok(());
    }
    println!();
    print_separator();
    for balancer in describe_load_balancers(ctx, names).await? {
        println!(
            "  Load Balancer: {}",
            balancer.load_balancer_name().unwrap_or_default()
        );
        println!("  - DNSName: {}", balancer.dns_name().unwrap_or_default());
        for instance in balancer.instances() {
            println!("  - Instance: {}", instance.instance_id().unwrap_or_default());
        }
        for backend in balancer.backend_server_descriptions() {
            let port = backend
                .instance_port()
                .map(|p| p.to_string())
                .unwrap_or_default();
            println!("  - Backend server port: {port}");
            println!("  - Backend server: {backend:?}");
        }
    }
    Ok(())
}
