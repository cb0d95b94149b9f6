//! aio_dashboard service entry point.
//!
//! ```text
//! aio-dashboard [--env dev|fat|uat|pro] [--config FILE] [INSTRUCTION]
//!
//!   INSTRUCTION   install | uninstall | start | stop
//!                 anything else (or nothing) serves in the foreground
//! ```

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;

use aio_dashboard::config::constants::PROJECT_DESCRIPTION;
use aio_dashboard::config::{default_config_path, load_config, Environment, Settings};
use aio_dashboard::depends::Dependency;
use aio_dashboard::lifecycle::{DashboardService, Instruction, ServiceManager, Systemd};
use aio_dashboard::observability::{init_logging, metrics};

#[derive(Parser, Debug)]
#[command(name = "aio-dashboard", version, about = PROJECT_DESCRIPTION, long_about = None)]
struct Cli {
    /// Runtime environment: dev, fat, uat or pro. Defaults to fat.
    #[arg(long)]
    env: Option<String>,

    /// Settings file. Defaults to configs/<env>_configs.toml.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// install, uninstall, start or stop. Anything else runs the service.
    instruction: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let (env, fell_back) = Environment::resolve(cli.env.as_deref());
    if fell_back {
        eprintln!(
            "Warning: '--env' cannot be found, or it is illegal. The default '{}' will be used.",
            env.value()
        );
    }

    let config_path = cli.config.unwrap_or_else(|| default_config_path(env));
    let settings = match load_config(&config_path) {
        Ok(settings) => Arc::new(settings),
        Err(e) => {
            eprintln!("Failed to load {}: {e}", config_path.display());
            return ExitCode::FAILURE;
        }
    };

    let guards = match init_logging(Path::new(&settings.basic.global_log_path), &settings.log, env) {
        Ok(guards) => guards,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            return ExitCode::FAILURE;
        }
    };
    let root = guards.root_span().clone();

    let instruction = Instruction::parse(cli.instruction.as_deref());
    tracing::info!(
        parent: &root,
        version = %settings.basic.version,
        config = %config_path.display(),
        instruction = %instruction,
        "aio_dashboard starting"
    );

    let code = match instruction {
        Instruction::Run => serve(settings, env, root).await,
        control => manage(&settings, env, control),
    };

    // Flush both log sinks before the process exits.
    drop(guards);
    code
}

async fn serve(settings: Arc<Settings>, env: Environment, root: tracing::Span) -> ExitCode {
    if settings.metrics.enabled {
        match settings.metrics.socket_addr().map(metrics::init_metrics) {
            Some(Ok(())) => {}
            Some(Err(e)) => tracing::error!(parent: &root, error = %e, "Failed to start metrics exporter"),
            None => tracing::error!(
                parent: &root,
                metrics_address = %settings.metrics.address,
                "Failed to parse metrics address"
            ),
        }
    }

    let service = DashboardService::new(settings, env, Dependency::in_memory()).with_parent_span(root.clone());
    match service.run().await {
        Ok(()) => {
            tracing::info!(parent: &root, "Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(parent: &root, error = %e, "Service failed");
            ExitCode::FAILURE
        }
    }
}

fn manage(settings: &Settings, env: Environment, instruction: Instruction) -> ExitCode {
    let result = Systemd::for_current_exe(&settings.basic, env).and_then(|systemd| match instruction {
        Instruction::Install => systemd.install(),
        Instruction::Uninstall => systemd.uninstall(),
        Instruction::Start => systemd.start(),
        Instruction::Stop => systemd.stop(),
        Instruction::Run => Ok(()),
    });
    match result {
        Ok(()) => {
            println!("{} {instruction}: ok", settings.basic.name);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(instruction = %instruction, error = %e, "Service control failed");
            eprintln!("{} {instruction}: {e}", settings.basic.name);
            ExitCode::FAILURE
        }
    }
}
