use std::{env, io, path::PathBuf};

use anyhow::Result;
use clap::Parser;

use visitlog_server::config::{self, CliOverrides};

#[derive(Parser, Debug)]
#[command(name = "visitlogd", version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Append-only visit logging service")]
struct Args {
    /// Host binding for the HTTP listener
    #[arg(long = "host", value_name = "HOST")]
    host: Option<String>,

    /// Port binding (overrides the PORT environment variable)
    #[arg(long = "port", value_name = "PORT")]
    port: Option<u16>,

    /// Directory holding the visit log file
    #[arg(long = "data-dir", value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Directory of static assets served at the root
    #[arg(long = "assets-dir", value_name = "PATH")]
    assets_dir: Option<PathBuf>,

    /// Explicit path to the service configuration (visitlog.toml)
    #[arg(long = "config", value_name = "FILE")]
    config_path: Option<PathBuf>,

    /// Optional log filter (e.g. info, debug)
    #[arg(long = "log-level", value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args);

    let file_config = config::load_file_config(args.config_path.as_deref())?;
    let overrides = CliOverrides {
        host: args.host,
        port: args.port,
        data_dir: args.data_dir,
        assets_dir: args.assets_dir,
    };
    let config = config::resolve(&overrides, file_config.as_ref(), config::env_port());

    visitlog_server::serve(config).await
}

fn init_tracing(args: &Args) {
    if let Some(level) = &args.log_level {
        env::set_var("RUST_LOG", level);
    }

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(io::stderr);

    let _ = builder.try_init();
}
