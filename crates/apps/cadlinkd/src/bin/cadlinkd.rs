#[path = "cadlinkd/bootstrap.rs"]
mod bootstrap;

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "cadlinkd", about = "Bridges line-protocol clients to a CAD application plugin")]
struct Args {
    /// TOML file with `[cad]` and `[transport]` tables.
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    cad_host: Option<String>,
    #[arg(long)]
    cad_port: Option<u16>,
    /// stdio, sse, http or streamable-http.
    #[arg(long)]
    transport: Option<String>,
    #[arg(long)]
    listen_host: Option<String>,
    #[arg(long)]
    listen_port: Option<u16>,
    /// Emit a scripted event stream instead of the application's events.
    #[arg(long)]
    demo_events: bool,
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    let default_filter = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    match bootstrap::run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("cadlinkd: {err:#}");
            ExitCode::FAILURE
        }
    }
}
