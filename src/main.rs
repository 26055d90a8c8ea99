use clap::Parser;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use redcache::{cli, Context, Options, Provider, Reply, Store, StoreOptions};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "redcache")]
#[command(about = "Run Redis commands against a SQLite database file")]
struct Args {
    /// Database file path
    #[arg(short, long, default_value = "redcache.db")]
    db: String,

    /// Key prefix isolating this session's keys
    #[arg(short, long, default_value = "")]
    prefix: String,

    /// Per-command deadline in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// How long to wait on a locked database, in milliseconds
    #[arg(long, default_value_t = 5000)]
    busy_timeout_ms: u64,

    /// Print replies in RESP wire format
    #[arg(long)]
    resp: bool,

    /// Command to run; without one, commands are read from stdin, one per line
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let store_opts = StoreOptions::default().busy_timeout(Duration::from_millis(args.busy_timeout_ms));
    let store = Arc::new(Store::open_with(&args.db, &store_opts)?);
    tracing::info!("Opened database: {}", args.db);

    let provider = Arc::new(Provider::with_options(store, &Options::new().prefix(&args.prefix)));
    let timeout = args.timeout_ms.map(Duration::from_millis);

    if !args.command.is_empty() {
        let reply = run(provider, args.command.clone(), timeout).await?;
        print_reply(&reply, args.resp)?;
        if reply.is_error() {
            std::process::exit(1);
        }
        return Ok(());
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let words = match cli::split_line(&line) {
            Ok(words) if words.is_empty() => continue,
            Ok(words) => words,
            Err(e) => {
                print_reply(&Reply::from(e), args.resp)?;
                continue;
            }
        };
        let reply = run(provider.clone(), words, timeout).await?;
        print_reply(&reply, args.resp)?;
    }
    Ok(())
}

/// Runs one command off the async runtime. Ctrl-C cancels it.
async fn run(provider: Arc<Provider>, words: Vec<String>, timeout: Option<Duration>) -> anyhow::Result<Reply> {
    let ctx = match timeout {
        Some(t) => Context::with_timeout(t),
        None => Context::background(),
    };
    let task_ctx = ctx.clone();
    let mut task = tokio::task::spawn_blocking(move || cli::execute(provider.as_ref(), &task_ctx, &words));

    tokio::select! {
        reply = &mut task => return Ok(reply?),
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("interrupted, cancelling command");
            ctx.cancel();
        }
    }
    Ok(task.await?)
}

fn print_reply(reply: &Reply, resp: bool) -> anyhow::Result<()> {
    let mut out = std::io::stdout().lock();
    if resp {
        out.write_all(&reply.encode())?;
    } else {
        writeln!(out, "{}", reply)?;
    }
    out.flush()?;
    Ok(())
}
