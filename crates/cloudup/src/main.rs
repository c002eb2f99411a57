use clap::Parser;
use cloudup::{Cli, CreateCluster, version};
use cloudup_core::{RunReport, TargetKind};
use colored::Colorize;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();

    match run(cli).await {
        Ok(report) => {
            print_report(&report);
            Ok(())
        }
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<RunReport> {
    let mut config = cli.cluster_config()?;

    let version = match config.kubernetes_version.take() {
        Some(version) => version,
        None => version::fetch_stable_version(version::STABLE_RELEASE_URL).await?,
    };
    config.kubernetes_version = Some(version::normalize(&version));

    let command = CreateCluster {
        config,
        target: cli.target_kind(),
        models: cli.model.clone(),
        node_model: Some(cli.nodemodel.clone()),
        state_dir: cli.state.clone(),
        ssh_public_key: cli.ssh_public_key_path(),
        jobs: cli.jobs,
    };
    command.run().await
}

fn print_report(report: &RunReport) {
    match report.target {
        TargetKind::DryRun => {
            print!("{}", report.plan.render());
            println!();
            println!("{}", format!("Plan: {}", report.plan.summary()).cyan().bold());
            println!("{}", "✓ Dry run complete, nothing was changed".green());
        }
        TargetKind::Terraform => {
            let dir = report
                .output_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default();
            println!(
                "{}",
                format!("✓ Terraform configuration written to {dir}").green().bold()
            );
            println!("  {} resources rendered", report.executed.len());
        }
        TargetKind::Direct => {
            println!("{}", "✓ Cluster is up to date".green().bold());
            println!("  {}", report.plan.summary());
        }
    }
}
