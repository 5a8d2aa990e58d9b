use std::path::{Path, PathBuf};
use std::time::Duration;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use tokio_util::sync::CancellationToken;
use tunefetch::{AppConfig, DownloadOutcome, OutcomeStatus, Session};

#[derive(Parser, Debug)]
#[command(name = "tunefetch", version, about = "Fetch music from links or free-text searches")]
struct Cli {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve and download a link or a search
    Get {
        query: String,
        /// flac, mp3, m4a, wav or image-gag
        #[arg(short, long)]
        format: Option<String>,
        #[arg(long)]
        no_cover: bool,
        /// Output directory (defaults to the configured download path)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Print the outcome as JSON
        #[arg(long)]
        json: bool,
    },
    /// Store the Deezer ARL token
    SetArl,
    /// Show the config file location and effective settings
    Config,
}

fn load_config(path: Option<&PathBuf>) -> Result<(AppConfig, PathBuf)> {
    match path {
        Some(path) => Ok((AppConfig::load_from(path)?, path.clone())),
        None => Ok((AppConfig::load()?, AppConfig::get_config_path()?)),
    }
}

fn spinner(query: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar.set_message(format!("Fetching {}", query));
    bar
}

fn print_outcome(outcome: &DownloadOutcome, depth: usize) {
    let indent = "  ".repeat(depth);
    let title = outcome.title.as_deref().unwrap_or("(untitled)");
    match outcome.status {
        OutcomeStatus::Success => println!("{}✅ {}", indent, title),
        OutcomeStatus::Error => println!(
            "{}❌ {:?}: {}",
            indent,
            outcome.kind,
            outcome.message.as_deref().unwrap_or("unknown error")
        ),
        OutcomeStatus::Cancelled => println!("{}🛑 cancelled", indent),
    }
    if outcome.is_playlist {
        for child in &outcome.children {
            print_outcome(child, depth + 1);
        }
    } else {
        for path in &outcome.produced_file_paths {
            println!("{}   {}", indent, path.display());
        }
    }
}

async fn run_get(
    config: &AppConfig,
    query: String,
    format: Option<String>,
    no_cover: bool,
    output: Option<PathBuf>,
    json: bool,
) -> Result<bool> {
    let session = Session::from_config(config).context("Failed to set up the dispatcher")?;
    if let Some(dir) = output {
        session.select_output_dir(dir).await?;
    }
    let format = format.unwrap_or_else(|| config.preferred_format.to_string());
    let no_cover = no_cover || !config.embed_cover;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("🛑 Ctrl-C received, cancelling");
            ctrl_c_token.cancel();
        }
    });

    let bar = (!json).then(|| spinner(&query));
    let outcome = session.submit(&query, no_cover, &format, &cancel).await;
    if let Some(bar) = bar {
        bar.finish_and_clear();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        print_outcome(&outcome, 0);
    }
    Ok(outcome.is_success())
}

fn run_set_arl(mut config: AppConfig, path: &Path) -> Result<()> {
    let arl = rpassword::prompt_password("Deezer ARL: ").context("Failed to read the token")?;
    let arl = arl.trim();
    config.deezer_arl = if arl.is_empty() { None } else { Some(arl.to_string()) };
    config.save_to(path)?;
    println!("Saved to {}", path.display());
    Ok(())
}

fn run_config(config: &AppConfig, path: &Path) -> Result<()> {
    let mut shown = config.clone();
    if shown.deezer_arl.is_some() {
        shown.deezer_arl = Some("********".to_string());
    }
    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(&shown)?);

    let session = Session::from_config(config)?;
    println!("# backend order");
    for (id, available) in session.dispatcher().backend_order() {
        println!("{} {}", if available { "✅" } else { "⚠️ " }, id);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG overrides the info default; --verbose overrides both
    let mut logger = env_logger::Builder::new();
    logger.filter_level(log::LevelFilter::Info).parse_default_env();
    if cli.verbose {
        logger.filter_level(log::LevelFilter::Debug);
    }
    logger.init();

    let (config, config_path) = load_config(cli.config.as_ref())?;
    info!("Configuration loaded from {}", config_path.display());

    match cli.command {
        Command::Get {
            query,
            format,
            no_cover,
            output,
            json,
        } => {
            let succeeded = run_get(&config, query, format, no_cover, output, json).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        Command::SetArl => run_set_arl(config, &config_path)?,
        Command::Config => run_config(&config, &config_path)?,
    }

    Ok(())
}
