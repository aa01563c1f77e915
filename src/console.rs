use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use url::Url;

use crate::allocation::AllocationTracker;
use crate::api::{PoolClient, ProxyRecord, ProxyStatsRecord};
use crate::error::ApiError;
use crate::gate::{route, GateState, View};
use crate::session::SessionStore;
use crate::store::{PolledStore, QueryState};
use crate::POLL_INTERVAL;

enum AuthOutcome {
    SignedIn,
    Quit,
}

enum DashboardOutcome {
    SignedOut,
    Quit,
}

type Input = Lines<BufReader<Stdin>>;

/// Drive the console. The gate decides whether the auth view or the
/// dashboard runs; both return here whenever the session state changes.
pub async fn run(base_url: Url, timeout: Duration) -> Result<(), ApiError> {
    let session = Arc::new(SessionStore::open(&base_url)?);
    let client = Arc::new(PoolClient::new(base_url, session.clone(), timeout));
    let mut input = BufReader::new(tokio::io::stdin()).lines();

    tracing::info!("pool backend: {}", client.base_url());

    loop {
        match route(View::Proxies, GateState::of(&session)) {
            View::Auth => match auth_view(&client, &session, &mut input).await? {
                AuthOutcome::SignedIn => {}
                AuthOutcome::Quit => return Ok(()),
            },
            _ => match dashboard(client.clone(), &session, &mut input).await? {
                DashboardOutcome::SignedOut => {}
                DashboardOutcome::Quit => return Ok(()),
            },
        }
    }
}

async fn auth_view(
    client: &PoolClient,
    session: &SessionStore,
    input: &mut Input,
) -> Result<AuthOutcome, ApiError> {
    println!("not signed in: (l)ogin, (r)egister, (q)uit");
    loop {
        prompt("> ")?;
        let Some(line) = input.next_line().await? else {
            return Ok(AuthOutcome::Quit);
        };
        match line.trim() {
            choice @ ("l" | "login" | "r" | "register") => {
                let username = read_field(input, "username: ").await?;
                let password = read_password().await?;
                let result = if choice.starts_with('r') {
                    // Registration chains straight into a login.
                    match client.register(&username, &password).await {
                        Ok(()) => client.login(&username, &password).await,
                        Err(err) => Err(err),
                    }
                } else {
                    client.login(&username, &password).await
                };
                match result {
                    Ok(resp) => {
                        session.set(&resp.token)?;
                        println!("signed in");
                        return Ok(AuthOutcome::SignedIn);
                    }
                    Err(err) => println!("error: {err}"),
                }
            }
            "q" | "quit" => return Ok(AuthOutcome::Quit),
            "" => {}
            other => println!("unknown choice: {other}"),
        }
    }
}

async fn dashboard(
    client: Arc<PoolClient>,
    session: &SessionStore,
    input: &mut Input,
) -> Result<DashboardOutcome, ApiError> {
    let proxies = {
        let client = client.clone();
        PolledStore::spawn(POLL_INTERVAL, move || {
            let client = client.clone();
            async move { client.list_proxies().await }
        })
    };
    let stats = {
        let client = client.clone();
        PolledStore::spawn(POLL_INTERVAL, move || {
            let client = client.clone();
            async move { client.stats().await }
        })
    };
    let tracker = AllocationTracker::attach(client, &proxies);

    println!("commands: p proxies, h history, a allocate, c clear, r refresh, l logout, q quit");
    let mut view = View::Proxies;
    loop {
        render(view, &proxies, &stats, &tracker);
        prompt("> ")?;
        let Some(line) = input.next_line().await? else {
            return Ok(DashboardOutcome::Quit);
        };
        match line.trim() {
            "p" | "proxies" => view = View::Proxies,
            "h" | "history" => view = View::History,
            "a" | "allocate" => match tracker.allocate().await {
                Ok(url) => println!("allocated {url}"),
                Err(err) => println!("allocation failed: {err}"),
            },
            "c" | "clear" => tracker.clear(),
            "r" | "refresh" => {
                proxies.invalidate();
                stats.invalidate();
            }
            "l" | "logout" => {
                session.clear()?;
                println!("signed out");
                return Ok(DashboardOutcome::SignedOut);
            }
            "q" | "quit" => return Ok(DashboardOutcome::Quit),
            "" => {}
            other => println!("unknown command: {other}"),
        }
    }
}

fn render(
    view: View,
    proxies: &PolledStore<Vec<ProxyRecord>>,
    stats: &PolledStore<Vec<ProxyStatsRecord>>,
    tracker: &AllocationTracker,
) {
    match view {
        View::History => render_stats(&stats.state()),
        _ => render_proxies(&proxies.state(), tracker.current()),
    }
}

fn render_proxies(state: &QueryState<Vec<ProxyRecord>>, allocated: Option<String>) {
    println!();
    if state.is_loading {
        println!("loading proxies...");
        return;
    }
    if let Some(err) = &state.error {
        println!("! last refresh failed: {err}");
    }
    match &state.data {
        Some(pool) if pool.is_empty() => println!("no alive proxies in the pool"),
        Some(pool) => {
            println!("{:<40} {:<6} {:<10}", "URL", "ALIVE", "LAST TEST");
            for p in pool {
                println!(
                    "{:<40} {:<6} {:<10}",
                    p.url,
                    if p.alive { "yes" } else { "no" },
                    p.last_test
                );
            }
        }
        None => println!("no data yet"),
    }
    if let Some(at) = state.updated_at {
        println!("as of {}", at.format("%H:%M:%S"));
    }
    if let Some(url) = allocated {
        println!("allocated: {url}");
    }
}

fn render_stats(state: &QueryState<Vec<ProxyStatsRecord>>) {
    println!();
    if state.is_loading {
        println!("loading stats...");
        return;
    }
    if let Some(err) = &state.error {
        println!("! last refresh failed: {err}");
    }
    match &state.data {
        Some(stats) if stats.is_empty() => println!("no stats recorded"),
        Some(stats) => {
            println!(
                "{:<40} {:>6} {:>6} {:>8} {:>6} {:>9} {:<10} {:<5}",
                "URL", "SCORE", "USAGE", "SUCCESS", "FAIL", "LATENCY", "LAST TEST", "ALIVE"
            );
            for s in stats {
                println!(
                    "{:<40} {:>6.2} {:>6} {:>8} {:>6} {:>7}ms {:<10} {:<5}",
                    s.url,
                    s.score,
                    s.usage_count,
                    s.success_count,
                    s.fail_count,
                    s.latency_ms,
                    s.last_test,
                    if s.alive { "yes" } else { "no" }
                );
            }
        }
        None => println!("no data yet"),
    }
    if let Some(at) = state.updated_at {
        println!("as of {}", at.format("%H:%M:%S"));
    }
}

async fn read_field(input: &mut Input, label: &str) -> Result<String, ApiError> {
    prompt(label)?;
    let line = input.next_line().await?.unwrap_or_default();
    Ok(line.trim().to_string())
}

async fn read_password() -> Result<String, ApiError> {
    let password = tokio::task::spawn_blocking(|| rpassword::prompt_password("password: "))
        .await
        .map_err(|e| ApiError::Internal(format!("password prompt failed: {e}")))?;
    Ok(password?)
}

fn prompt(label: &str) -> Result<(), ApiError> {
    print!("{label}");
    std::io::stdout().flush()?;
    Ok(())
}
