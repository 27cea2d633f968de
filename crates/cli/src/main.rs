mod config;
mod serve;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use pygmalion_core::RandomAssigner;
use pygmalion_storage::{MemorySink, ResponseSink, SinkError, SupabaseConfig, SupabaseSink};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::{SinkKind, SinkSettings};

/// Environment override for the per-IP request budget.
const RATE_LIMIT_ENV: &str = "PYGMALION_RATE_LIMIT";

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Pygmalion effect survey for live seminar demonstrations.
#[derive(Parser)]
#[command(name = "pygmalion", version, about = "Pygmalion effect survey server")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the survey HTTP server
    Serve {
        /// Port to listen on (default 8080, or the config file's value)
        #[arg(long)]
        port: Option<u16>,
        /// Path to a pygmalion.toml configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Keep responses in memory instead of writing to Supabase
        #[arg(long)]
        memory_sink: bool,
        /// Directory served under /images
        #[arg(long)]
        assets: Option<PathBuf>,
        /// Path to TLS certificate PEM file (requires --tls-key)
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key PEM file (requires --tls-cert)
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },

    /// List the scenario catalog
    Scenarios {
        /// Path to a pygmalion.toml configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate a configuration file and its scenario catalog
    Check {
        /// Path to the configuration file
        file: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    match cli.command {
        Commands::Serve {
            port,
            config,
            memory_sink,
            assets,
            tls_cert,
            tls_key,
        } => {
            // Validate TLS flags: both must be provided or neither
            if tls_cert.is_some() != tls_key.is_some() {
                report_error(
                    "--tls-cert and --tls-key must both be provided",
                    cli.output,
                    cli.quiet,
                );
                process::exit(1);
            }
            cmd_serve(
                ServeArgs {
                    port,
                    config,
                    memory_sink,
                    assets,
                    tls_cert,
                    tls_key,
                },
                cli.output,
                cli.quiet,
            );
        }
        Commands::Scenarios { config } => {
            cmd_scenarios(config.as_deref(), cli.output, cli.quiet);
        }
        Commands::Check { file } => {
            cmd_check(&file, cli.output, cli.quiet);
        }
    }
}

/// Log to stderr so `--output json` on stdout stays machine readable.
/// `RUST_LOG` overrides the default filter.
fn init_tracing(quiet: bool) {
    let default_filter = if quiet {
        "pygmalion=warn,tower_http=warn"
    } else {
        "pygmalion=info,tower_http=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

// ── serve ─────────────────────────────────────────────────────────────────────

struct ServeArgs {
    port: Option<u16>,
    config: Option<PathBuf>,
    memory_sink: bool,
    assets: Option<PathBuf>,
    tls_cert: Option<PathBuf>,
    tls_key: Option<PathBuf>,
}

fn cmd_serve(args: ServeArgs, output: OutputFormat, quiet: bool) {
    let (file, catalog) = match config::load(args.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };

    let sink = match build_sink(args.memory_sink, &file.sink) {
        Ok(sink) => sink,
        Err(e) => {
            report_error(&format!("response sink: {}", e), output, quiet);
            process::exit(1);
        }
    };

    let rate_limit = std::env::var(RATE_LIMIT_ENV)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(file.server.rate_limit);

    let options = serve::ServeOptions {
        port: args.port.unwrap_or(file.server.port),
        catalog,
        sink,
        assigner: Arc::new(RandomAssigner),
        rate_limit,
        flow_ttl: Duration::from_secs(file.server.flow_ttl_secs),
        assets: args.assets,
        tls_cert: args.tls_cert,
        tls_key: args.tls_key,
    };

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(&format!("failed to create tokio runtime: {}", e), output, quiet);
            process::exit(1);
        }
    };
    if let Err(e) = rt.block_on(serve::start_server(options)) {
        report_error(&format!("server error: {}", e), output, quiet);
        process::exit(1);
    }
}

/// Pick the response sink. `--memory-sink` wins over the config file; a
/// Supabase sink without credentials is an error, never a silent fallback.
fn build_sink(memory: bool, settings: &SinkSettings) -> Result<Arc<dyn ResponseSink>, SinkError> {
    if memory || settings.kind == SinkKind::Memory {
        tracing::warn!("using the in-memory sink; responses are lost on shutdown");
        return Ok(Arc::new(MemorySink::new()));
    }

    let sink: Arc<dyn ResponseSink> = match &settings.table {
        Some(table) => Arc::new(SupabaseSink::new(
            SupabaseConfig::from_env()?.with_table(table.clone()),
        )),
        None => SupabaseSink::shared()?,
    };
    Ok(sink)
}

// ── scenarios ─────────────────────────────────────────────────────────────────

fn cmd_scenarios(config_path: Option<&Path>, output: OutputFormat, quiet: bool) {
    let catalog = match config::load(config_path) {
        Ok((_, catalog)) => catalog,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };

    match output {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&catalog)
                .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
            println!("{}", json);
        }
        OutputFormat::Text => {
            if quiet {
                return;
            }
            for (i, scenario) in catalog.scenarios().iter().enumerate() {
                println!(
                    "{}. {:<11} {:>2}..{:<2} (start {:>2})  {}",
                    i + 1,
                    scenario.id.as_str(),
                    scenario.min_value,
                    scenario.max_value,
                    scenario.default_rating(),
                    scenario.title
                );
            }
        }
    }
}

// ── check ─────────────────────────────────────────────────────────────────────

fn cmd_check(file: &Path, output: OutputFormat, quiet: bool) {
    let (config, catalog) = match config::load(Some(file)) {
        Ok(loaded) => loaded,
        Err(e) => {
            report_error(&e.to_string(), output, quiet);
            process::exit(1);
        }
    };

    let sink = match config.sink.kind {
        SinkKind::Supabase => "supabase",
        SinkKind::Memory => "memory",
    };
    let custom_catalog = !config.scenarios.is_empty();

    match output {
        OutputFormat::Json => {
            let result = serde_json::json!({
                "valid": true,
                "port": config.server.port,
                "sink": sink,
                "scenarios": catalog.len(),
                "custom_catalog": custom_catalog,
            });
            println!(
                "{}",
                serde_json::to_string_pretty(&result).unwrap_or_default()
            );
        }
        OutputFormat::Text => {
            if !quiet {
                println!(
                    "{}: ok ({} scenarios{}, sink {}, port {})",
                    file.display(),
                    catalog.len(),
                    if custom_catalog { ", custom catalog" } else { "" },
                    sink,
                    config.server.port
                );
            }
        }
    }
}

// ── Output helpers ────────────────────────────────────────────────────────────

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{{\"error\": \"{}\"}}", msg.replace('"', "\\\""));
        }
    }
}
