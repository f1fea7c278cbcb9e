use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use reqwest::Method;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use parcel_gateway::config::Config;
use parcel_gateway::event::EventHandler;
use parcel_gateway::gateway::SqliteGateway;
use parcel_gateway::http::{GatewayRequest, HttpTransport};
use parcel_gateway::{logging, sync};

#[derive(Parser, Debug)]
#[command(name = "parcel-gateway")]
#[command(about = "Offline cache and background sync gateway for the parcel-delivery client")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/parcel-gateway/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Upstream origin to use instead of the configured one
  #[arg(short, long)]
  origin: Option<Url>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Cache the static asset list, then activate the configured version
  Install,
  /// Add URLs to the active version's static cache
  Precache {
    /// Paths or absolute URLs
    #[arg(required = true)]
    urls: Vec<String>,
  },
  /// Delete caches of every other version
  Activate {
    /// Version to activate (default: the configured version)
    version: Option<String>,
  },
  /// Send one request through the gateway
  Fetch {
    /// Path or absolute URL
    target: String,
    /// Treat as a page navigation
    #[arg(long)]
    navigate: bool,
    #[arg(short = 'X', long, default_value = "GET")]
    method: String,
    /// Header as NAME:VALUE, repeatable
    #[arg(short = 'H', long = "header")]
    headers: Vec<String>,
    /// Request body
    #[arg(short, long)]
    data: Option<String>,
  },
  /// Replay queued requests once
  Sync,
  /// List queued requests
  Queue,
  /// Show cache namespaces and queue length
  Status,
  /// Watch connectivity and replay queued requests when online
  Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // Load configuration
  let config = Config::load(args.config.as_deref())?;

  // Override origin if specified on command line
  let config = if let Some(origin) = args.origin {
    Config { origin, ..config }
  } else {
    config
  };

  let _log_guard = logging::init(&config.log)?;

  let transport = HttpTransport::new(config.request_timeout_secs.map(Duration::from_secs))?;
  let gateway = SqliteGateway::open(&config, transport)?;

  match args.command {
    Command::Install => {
      let count = gateway.install(&config.cache.static_assets).await?;
      gateway.activate(&config.cache.version)?;
      println!("Installed {} asset(s) for {}", count, config.cache.version);
    }
    Command::Precache { urls } => {
      let count = gateway.precache(&urls).await?;
      println!("Cached {} URL(s)", count);
    }
    Command::Activate { version } => {
      let version = version.unwrap_or_else(|| config.cache.version.clone());
      let deleted = gateway.activate(&version)?;
      println!("Activated {} ({} old cache(s) deleted)", version, deleted.len());
      for name in deleted {
        println!("  deleted {}", name);
      }
    }
    Command::Fetch {
      target,
      navigate,
      method,
      headers,
      data,
    } => {
      let url = gateway.resolve(&target)?;
      let method = Method::from_bytes(method.to_uppercase().as_bytes())
        .map_err(|e| eyre!("Invalid method '{}': {}", method, e))?;

      let mut request = if navigate {
        GatewayRequest::navigate(url)
      } else {
        GatewayRequest::new(method, url)
      };
      for header in &headers {
        let (name, value) = header
          .split_once(':')
          .ok_or_else(|| eyre!("Header must be NAME:VALUE, got '{}'", header))?;
        request = request.with_header(name, value);
      }
      if let Some(data) = data {
        request = request.with_body(data);
      }

      let response = gateway.handle(request).await?;
      println!("{} ({})", response.status, response.source);
      println!("{}", response.text());
    }
    Command::Sync => {
      let report = gateway.reconcile().await?;
      println!(
        "{} replayed, {} failed, {} dropped, {} remaining",
        report.replayed, report.failed, report.dropped, report.remaining
      );
      if report.unremoved > 0 {
        println!("{} replayed request(s) could not be removed from the queue", report.unremoved);
      }
    }
    Command::Queue => {
      let pending = gateway.pending()?;
      if pending.is_empty() {
        println!("No pending requests");
      }
      for entry in pending {
        println!(
          "#{} {} {} {} ({} bytes, {} attempts)",
          entry.id,
          entry.created_at.format("%Y-%m-%d %H:%M:%S"),
          entry.method,
          entry.url,
          entry.body.len(),
          entry.attempts
        );
      }
    }
    Command::Status => {
      let status = gateway.status()?;
      println!("Active version: {}", status.active_version);
      for ns in &status.namespaces {
        println!("  {} ({} entries)", ns.name, ns.entries);
      }
      println!("Pending requests: {}", status.pending);
    }
    Command::Watch => {
      let probe_url = gateway.resolve(&config.sync.probe_path)?;
      let events = EventHandler::new(
        gateway.transport(),
        probe_url,
        Duration::from_secs(config.sync.probe_interval_secs),
        Duration::from_secs(config.sync.interval_secs),
      );
      sync::run(&gateway, events).await?;
    }
  }

  Ok(())
}
