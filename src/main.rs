mod check;
mod cluster;
mod context;
mod descriptor;
mod elb;
mod service;
mod task;
mod util;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use context::{CREDENTIAL_ENV, Context, DEFAULT_REGION, resolve_credentials};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Inspect and update ECS clusters, services, tasks and task definitions.
#[derive(Parser, Debug)]
#[command(name = "ecsman")]
#[command(bin_name = "ecsman")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    op: Option<Op>,

    /// Verbose listings with more details
    #[clap(short, long, global = true)]
    verbose: bool,

    /// AWS region
    #[clap(long, global = true, default_value = DEFAULT_REGION)]
    region: String,

    /// Print ELB information after listing services
    #[clap(long, global = true)]
    elb: bool,

    /// AWS credential profile name, or `env` for environment variables
    /// (defaults to $ECSCREDENTIAL, then `default`)
    #[clap(long, global = true)]
    cred: Option<String>,

    /// Number of events to list for each service
    #[clap(long, global = true, default_value_t = 0)]
    events: usize,
}

#[derive(Subcommand, Debug)]
enum Op {
    /// List clusters, the services of a cluster, or a single service
    Ls(service::ListArgs),
    /// Check that a service's tasks and load balancers agree with it
    Check(check::Args),
    /// Deploy a new image to a service
    Update(service::UpdateArgs),
    /// Register a task definition from a JSON file
    Register(task::RegisterArgs),
    /// Run one instance of a task definition
    Run(task::RunArgs),
    /// List task definition families, or describe a family's revisions
    Taskdefs(task::DefsArgs),
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let Some(op) = args.op else {
        Args::command().print_help()?;
        return Ok(());
    };

    let env_profile = std::env::var(CREDENTIAL_ENV).ok();
    let credentials = resolve_credentials(args.cred.as_deref(), env_profile.as_deref());
    let ctx = Context::load(args.region, credentials, args.verbose).await;

    match op {
        Op::Ls(ls) => ls.run(&ctx, args.events, args.elb).await,
        Op::Check(check) => check.run(&ctx).await,
        Op::Update(update) => update.run(&ctx).await,
        Op::Register(register) => register.run(&ctx).await,
        Op::Run(run) => run.run(&ctx).await,
        Op::Taskdefs(defs) => defs.run(&ctx).await,
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose { "ecsman=debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .init();
}
