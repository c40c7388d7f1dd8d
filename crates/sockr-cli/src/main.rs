use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use sockr_config::{CliOverrides, EnvConfig, Settings, load_file_config, resolve_settings};
use sockr_core::{Server, ServerOptions, client};
use sockr_engine::{BoaEngine, Execution, run_captured};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "sockr", version, about = "Remote JavaScript execution over raw TCP")]
struct Cli {
    /// Path to a sockr.json config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve payloads one connection at a time until one contains "quit".
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        /// Size of the single read that forms a request.
        #[arg(long)]
        buffer_size: Option<usize>,
        /// Log level (trace, debug, info, warn, error).
        #[arg(long)]
        log_level: Option<String>,
    },
    /// Send a payload to a running server and print the reply.
    Send {
        code: String,
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run a payload locally and print what it writes.
    Eval { code: String },
}

fn settings(config: Option<&Path>, cli: &CliOverrides) -> Result<Settings> {
    let cwd = std::env::current_dir().context("failed reading current directory")?;
    let file_cfg = load_file_config(config, &cwd)?;
    let env_cfg = EnvConfig::from_current_env();
    Ok(resolve_settings(cli, &env_cfg, file_cfg.as_ref()))
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

fn write_stdout(text: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .context("failed writing to stdout")
}

fn serve_command(settings: Settings) -> Result<()> {
    info!(
        host = %settings.host,
        port = settings.port,
        buffer_size = settings.buffer_size,
        "starting sockr server"
    );

    let server = Server::bind(&ServerOptions {
        host: settings.host,
        port: settings.port,
        buffer_size: settings.buffer_size,
    })?;
    let mut engine = BoaEngine::new();
    server.serve(&mut engine)?;
    Ok(())
}

fn send_command(settings: Settings, code: &str) -> Result<()> {
    let reply = client::send((settings.host.as_str(), settings.port), code)
        .with_context(|| format!("failed sending to {}:{}", settings.host, settings.port))?;
    write_stdout(&reply)
}

fn eval_command(code: &str) -> Result<()> {
    let mut engine = BoaEngine::new();
    let captured = run_captured(&mut engine, code)?;
    write_stdout(&captured.output)?;
    if captured.value == Execution::Failed {
        bail!("payload failed");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = cli.config.as_deref();

    match cli.command {
        Commands::Serve {
            host,
            port,
            buffer_size,
            log_level,
        } => {
            let settings = settings(
                config,
                &CliOverrides {
                    host,
                    port,
                    buffer_size,
                    log_level,
                },
            )?;
            init_tracing(&settings.log_level);
            serve_command(settings)
        }
        Commands::Send { code, host, port } => {
            let settings = settings(
                config,
                &CliOverrides {
                    host,
                    port,
                    ..CliOverrides::default()
                },
            )?;
            init_tracing(&settings.log_level);
            send_command(settings, &code)
        }
        Commands::Eval { code } => {
            let settings = settings(config, &CliOverrides::default())?;
            init_tracing(&settings.log_level);
            eval_command(&code)
        }
    }
}
