// SPDX-License-Identifier: MIT
// Copyright (c) 2026 StarTuz

use anyhow::{Context, Result};
use clap::Parser;
use ecoschool_core::config::AppConfig;
use ecoschool_core::directory::SchoolDirectory;
use ecoschool_core::energy::EnergyDataset;
use ecoschool_core::export::capture::BrowserLauncher;
use ecoschool_core::export::{CaptureSettings, Capturer, ChromeLauncher};
use ecoschool_core::schoolinfo::{CachedSource, Reconciler, SchoolInfoClient, SchoolInfoSource};
use ecoschool_server::{router, AppState};
use log::{info, warn, LevelFilter};
use simplelog::{ColorChoice, ConfigBuilder, TermLogger, TerminalMode};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about = "EcoSchool HTTP API", long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "ECOSCHOOL_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Directory holding seoul-schools.json and seoul-schools-with-energy.json
    #[arg(long, env = "ECOSCHOOL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// schoolinfo.go.kr OpenAPI key
    #[arg(long, env = "SCHOOLINFO_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    #[arg(long, env = "SCHOOLINFO_ACCOUNT")]
    account: Option<String>,

    /// Replay and record upstream responses in this directory
    #[arg(long, env = "ECOSCHOOL_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Extra hosts the capture endpoint may render, comma separated
    #[arg(long, env = "ECOSCHOOL_ALLOWED_HOSTS", default_value = "")]
    allowed_hosts: String,

    /// Hide error details in responses
    #[arg(long, env = "ECOSCHOOL_PRODUCTION")]
    production: bool,

    /// Chrome/Chromium executable; auto-detected when omitted
    #[arg(long, env = "CHROME_PATH")]
    chrome_path: Option<PathBuf>,

    /// TTF font with Hangul glyphs for the report PDF
    #[arg(long, env = "ECOSCHOOL_REPORT_FONT")]
    report_font: Option<PathBuf>,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let config = ConfigBuilder::new()
        .add_filter_allow_str("ecoschool")
        .build();
    if let Err(e) = TermLogger::init(level, config, TerminalMode::Mixed, ColorChoice::Auto) {
        eprintln!("Logger already initialized: {}", e);
    }
}

fn build_state(args: &Args) -> Result<AppState> {
    let mut config = AppConfig::default().with_account(args.account.clone());
    if let Some(dir) = &args.data_dir {
        config.data_dir = dir.clone();
    }
    config.api_key = args.api_key.clone().filter(|k| !k.trim().is_empty());

    let directory = SchoolDirectory::load(config.schools_path()).with_context(|| {
        format!(
            "Failed to load school directory from {}",
            config.schools_path().display()
        )
    })?;
    let energy = EnergyDataset::load(config.energy_path()).with_context(|| {
        format!(
            "Failed to load energy dataset from {}",
            config.energy_path().display()
        )
    })?;

    let reconciler = match config.api_key.as_deref() {
        Some(_) => {
            let client = SchoolInfoClient::from_config(&config)?;
            let source: Box<dyn SchoolInfoSource> = match &args.cache_dir {
                Some(dir) => Box::new(
                    CachedSource::new(client, dir)
                        .with_context(|| format!("Failed to create cache dir {}", dir.display()))?,
                ),
                None => Box::new(client),
            };
            Some(Reconciler::new(source))
        }
        None => {
            warn!("SCHOOLINFO_API_KEY is not set; /api/schoolinfo/basic will answer 500");
            None
        }
    };

    let settings = CaptureSettings {
        production: args.production,
        ..CaptureSettings::default()
    }
    .with_extra_hosts(&args.allowed_hosts);
    let launcher: Arc<dyn BrowserLauncher> =
        Arc::new(ChromeLauncher::new(args.chrome_path.clone()));

    Ok(AppState {
        directory,
        energy,
        reconciler,
        capturer: Capturer::new(launcher, settings),
        report_font: args.report_font.clone(),
        fixed_year: None,
    })
}

async fn serve(bind: SocketAddr, state: Arc<AppState>) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Listening — addr={}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("Server error")
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    // the blocking schoolinfo client must be created outside the runtime
    let state = Arc::new(build_state(&args)?);
    info!(
        "Datasets ready — schools={} energy={} schoolinfo={}",
        state.directory.len(),
        state.energy.len(),
        state.reconciler.is_some()
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the async runtime")?;
    runtime.block_on(serve(args.bind, Arc::clone(&state)))
}
