mod cli;

use std::path::Path;

use af_av::ToolRegistry;
use af_core::config::Config;
use af_engine::{ConversionRequest, ConversionService, Outcome};
use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::io::AsyncWriteExt;
use cli::{Cli, Commands};

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "audioforge=trace,af_engine=trace,af_av=trace,af_server=debug,af_core=debug,tower_http=debug".to_string()
        } else {
            "audioforge=info,af_engine=info,af_av=info,af_server=info,af_core=info,tower_http=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Start { host, port } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(start_server(host, port, cli.config.as_deref()))
        }
        Commands::Convert { input, format } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(convert_file(&input, format, cli.config.as_deref()))
        }
        Commands::Fetch { url, format } => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(fetch_url(url, format, cli.config.as_deref()))
        }
        Commands::CheckTools => check_tools(cli.config.as_deref()),
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
        Commands::Version => {
            println!("audioforge {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

async fn start_server(
    host: Option<String>,
    port: Option<u16>,
    config_path: Option<&Path>,
) -> Result<()> {
    let mut config = Config::load_or_default(config_path);

    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    tracing::info!(
        "Server will listen on {}:{}",
        config.server.host,
        config.server.port
    );

    af_server::start(config).await?;
    Ok(())
}

fn build_service(config_path: Option<&Path>) -> Result<ConversionService> {
    let config = Config::load_or_default(config_path);
    for warning in config.validate() {
        tracing::warn!("Config warning: {warning}");
    }
    let tools = ToolRegistry::discover(&config.tools);
    ConversionService::from_tools(&config, &tools).context("cannot start the conversion engine")
}

async fn convert_file(input: &Path, format: Option<String>, config_path: Option<&Path>) -> Result<()> {
    let service = build_service(config_path)?;

    // The engine deletes its input, so hand it a copy inside the staging dir.
    let staged = service.staging_path(input.file_name().and_then(|n| n.to_str()));
    let bytes = stage_input(input, &staged).await?;
    tracing::debug!(bytes, "input staged");

    let outcome = service
        .submit(ConversionRequest::local(&staged, format))
        .await;
    if outcome.job_id().is_none() {
        discard_staged(&staged).await;
    }
    report(&service, outcome)
}

/// Copy `input` to `staged`. A partial copy is removed on failure.
async fn stage_input(input: &Path, staged: &Path) -> Result<u64> {
    let copy = async {
        let mut src = tokio::fs::File::open(input).await?;
        let mut dst = tokio::fs::File::create(staged).await?;
        let bytes = tokio::io::copy(&mut src, &mut dst).await?;
        dst.flush().await?;
        Ok::<_, std::io::Error>(bytes)
    };

    match copy.await {
        Ok(bytes) => Ok(bytes),
        Err(e) => {
            discard_staged(staged).await;
            Err(e).with_context(|| format!("cannot stage {}", input.display()))
        }
    }
}

async fn discard_staged(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            let err = af_core::Error::cleanup(path, e);
            tracing::warn!(error_kind = %err.kind(), "{err}");
        }
    }
}

async fn fetch_url(url: String, format: Option<String>, config_path: Option<&Path>) -> Result<()> {
    let service = build_service(config_path)?;
    let outcome = service.submit(ConversionRequest::remote(url, format)).await;
    report(&service, outcome)
}

fn report(service: &ConversionService, outcome: Outcome) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    match outcome {
        Outcome::Succeeded { download, .. } => {
            let file_name = download.rsplit('/').next().unwrap_or_default();
            eprintln!("Wrote {}", service.output_dir().join(file_name).display());
            Ok(())
        }
        Outcome::Failed { error_kind, .. } => bail!("conversion failed ({error_kind})"),
    }
}

fn check_tools(config_path: Option<&Path>) -> Result<()> {
    println!("Checking external tools...\n");

    let config = Config::load_or_default(config_path);
    let tools = ToolRegistry::discover(&config.tools).check_all();
    let mut all_ok = true;

    for tool in &tools {
        let status = if tool.available {
            "✓"
        } else {
            all_ok = false;
            "✗"
        };

        print!("{} {}", status, tool.name);

        if let Some(ref version) = tool.version {
            print!(" ({})", version.lines().next().unwrap_or(""));
        }

        if let Some(ref path) = tool.path {
            print!(" - {}", path.display());
        }

        println!();
    }

    println!();
    if all_ok {
        println!("All required tools are available!");
    } else {
        println!("Some tools are missing. ffmpeg is required; yt-dlp enables remote URLs.");
    }

    Ok(())
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    let config = match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let contents = std::fs::read_to_string(p)
                .with_context(|| format!("cannot read {}", p.display()))?;
            let config = Config::from_json(&contents)?;
            println!("✓ Configuration is valid");
            config
        }
        None => {
            println!("No config file specified, using defaults");
            Config::default()
        }
    };

    println!("  Server: {}:{}", config.server.host, config.server.port);
    println!("  Staging dir: {}", config.storage.staging_dir.display());
    println!("  Output dir: {}", config.storage.output_dir.display());
    println!(
        "  Workers: {} (timeout {}s)",
        config.conversion.worker_slots(),
        config.conversion.job_timeout_secs
    );
    if config.remote.allowed_hosts.is_empty() {
        println!("  Remote hosts: any");
    } else {
        println!("  Remote hosts: {}", config.remote.allowed_hosts.join(", "));
    }

    for warning in config.validate() {
        println!("  ⚠ {warning}");
    }

    Ok(())
}
