use std::ffi::OsStr;

use anyhow::{Context, Result, anyhow, bail};
use civic_config::{config_path, ensure_root_config, validate_config};
use civic_infer::load_provider;
use civicd::CivicService;
use civicd::cli::{Cli, Commands};
use civicd::http::serve;
use civicd::logging::init_tracing;
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = parse_cli();
    init_tracing(cli.log_format).map_err(|err| anyhow!("failed to initialize logging: {err}"))?;
    run(cli).await
}

fn parse_cli() -> Cli {
    let mut args: Vec<_> = std::env::args_os().collect();
    if args.get(1).is_some_and(|arg| arg == OsStr::new("--")) {
        args.remove(1);
    }

    Cli::parse_from(args)
}

async fn run(cli: Cli) -> Result<()> {
    std::fs::create_dir_all(&cli.root)
        .with_context(|| format!("failed to create data root {}", cli.root.display()))?;
    let root = cli
        .root
        .canonicalize()
        .with_context(|| format!("failed to resolve data root {}", cli.root.display()))?;

    let config = ensure_root_config(&root).with_context(|| {
        format!(
            "failed to load or create config at {}",
            config_path(&root).display()
        )
    })?;
    for warning in validate_config(&config) {
        warn!(code = warning.code, "{}", warning.message);
    }

    let assistant = load_provider(&config.inference, cli.provider_overrides())
        .context("failed to load assistant provider")?;
    info!(
        provider = %assistant.provider_name,
        model = %assistant.model_name,
        "assistant provider ready"
    );

    let bind = config.server.bind.clone();
    let service = CivicService::new(&root, config, assistant)
        .with_context(|| format!("failed to open store under {}", root.display()))?;

    match cli.command {
        Commands::Serve(args) => {
            let bind = args.bind.unwrap_or(bind);
            serve(service, &bind).await
        }
        Commands::Report(args) => {
            let view = service
                .department_report(args.department, args.insights)
                .await?;
            print_json(&view)
        }
        Commands::AdminReport => print_json(&service.admin_report()?),
        Commands::Leaderboard(args) => print_json(&service.leaderboard(Some(args.limit))?),
        Commands::Track(args) => print_json(&service.track_issue(&args.issue_id).await?),
        Commands::SetStatus(args) => {
            let Some(change) = service.update_status(&args.issue_id, args.status, &args.admin)?
            else {
                bail!("issue '{}' not found", args.issue_id);
            };
            print_json(&change)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("failed to render JSON output")?;
    println!("{rendered}");
    Ok(())
}
