use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use url::Url;

/// Terminal dashboard client for a remote proxy-pool service.
#[derive(Parser)]
#[command(name = "pool-console", version)]
struct Cli {
    /// Base URL of the proxy-pool backend.
    #[arg(long, env = "POOL_CONSOLE_URL", default_value = "http://localhost:8080")]
    url: Url,

    /// HTTP request timeout in seconds.
    #[arg(long, env = "POOL_CONSOLE_TIMEOUT", default_value_t = 30)]
    timeout: u64,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    match pool_console::run(cli.url, Duration::from_secs(cli.timeout)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}
