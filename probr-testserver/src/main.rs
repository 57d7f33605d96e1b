use std::net::SocketAddr;

use anyhow::Context as _;
use tokio::net::TcpListener;

const USAGE: &str = "probr-testserver

USAGE:
  probr-testserver [--bind 127.0.0.1:0] [--user USER --pass PASS]

Serves a stand-in of the measurement API. With --user/--pass every route requires
HTTP Basic auth. Prints HTTP_URL=<url> to stdout once ready.";

#[derive(Debug)]
struct Args {
    bind: SocketAddr,
    credentials: Option<(String, String)>,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> anyhow::Result<Option<Args>> {
    let mut bind: SocketAddr = "127.0.0.1:0".parse()?;
    let mut user = None;
    let mut pass = None;

    while let Some(arg) = args.next() {
        let mut value = |flag: &str| args.next().with_context(|| format!("{flag} requires a value"));
        match arg.as_str() {
            "--bind" => bind = value("--bind")?.parse().context("invalid --bind address")?,
            "--user" => user = Some(value("--user")?),
            "--pass" => pass = Some(value("--pass")?),
            "-h" | "--help" => return Ok(None),
            other => anyhow::bail!("unknown argument: {other}"),
        }
    }

    let credentials = match (user, pass) {
        (Some(user), Some(pass)) => Some((user, pass)),
        (None, None) => None,
        _ => anyhow::bail!("--user and --pass must be given together"),
    };
    Ok(Some(Args { bind, credentials }))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let Some(args) = parse_args(std::env::args().skip(1))? else {
        eprintln!("{USAGE}");
        return Ok(());
    };

    let listener = TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("failed to bind {}", args.bind))?;
    let addr = listener.local_addr()?;

    let stats = probr_testserver::TestServerStats::default();
    let app = match &args.credentials {
        Some((user, pass)) => probr_testserver::router_with_basic_auth(stats, user, pass),
        None => probr_testserver::router(stats),
    };

    println!("HTTP_URL=http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;
    Ok(())
}
