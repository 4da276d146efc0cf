use anyhow::{Context, Result};
use kolla_aio::cli::output::*;
use kolla_aio::cli::Cli;
use kolla_aio::core::config::DeployConfig;
use kolla_aio::execution::{CommandExecutor, PipelineRunner};
use kolla_aio::stages::{build_pipeline, DeployContext};
use kolla_aio::PipelineOutcome;
use std::error::Error as _;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over -v
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let mut config = match &cli.config {
        Some(path) => DeployConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => DeployConfig::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    let settings = cli.settings();
    let executor = CommandExecutor::system(settings).with_default_timeout(config.command_timeout());
    let helm_version = config.versions.helm.clone();
    let ctx = Arc::new(DeployContext::new(
        executor,
        config,
        cli.target(),
        cli.options(),
    ));
    let mut pipeline = build_pipeline(ctx).context("Failed to build deployment pipeline")?;

    if cli.plan {
        let plan = pipeline.plan();
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        } else {
            print!("{}", format_plan(&pipeline.name, &plan));
        }
        return Ok(());
    }

    println!(
        "{} Management interface {}, management IP {}, neutron interface {}",
        INFO,
        style(&cli.mgmt_int).bold(),
        style(&cli.mgmt_ip).bold(),
        style(&cli.neutron_int).bold()
    );
    println!("{} Helm version {}", INFO, style(&helm_version).bold());
    println!("{}", style(separator()).dim());

    let mut runner = PipelineRunner::new(settings);
    let renderer = Arc::new(ProgressRenderer::new());
    runner.add_event_handler(move |event| renderer.handle(event));

    let result = runner.run(&mut pipeline).await;
    println!("{}", style(separator()).dim());
    println!("{} {}", INFO, format_summary(&pipeline.state));

    if cli.verbose {
        for record in &pipeline.state.steps {
            println!("  {:<32} {}", record.name, format_step_state(&record.state));
        }
    }

    match result {
        Ok(PipelineOutcome::Completed { .. }) => {
            println!(
                "\n{} {} completed {}",
                CHECK,
                style(&pipeline.name).bold(),
                style("successfully").green()
            );
            Ok(())
        }
        Ok(PipelineOutcome::Stopped { step, reason }) => {
            println!(
                "\n{} {} stopped at {}: {}",
                WARN,
                style(&pipeline.name).bold(),
                style(step).yellow(),
                reason
            );
            std::process::exit(1);
        }
        Err(e) => {
            println!(
                "\n{} {} {}",
                CROSS,
                style(&pipeline.name).bold(),
                style("failed").red()
            );
            error!("{}", e);
            let mut source = e.source();
            while let Some(cause) = source {
                println!("  {} {}", style("caused by:").dim(), cause);
                source = cause.source();
            }
            std::process::exit(1);
        }
    }
}
