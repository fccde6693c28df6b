//! Command line interface for operating the relay. Supports writing a default
//! configuration, serving the HTTP/WebSocket endpoints, and checking event
//! files against the relay's admission rules.

mod config;
mod event;
mod filter;
mod hub;
mod message;
mod server;
mod session;
mod validate;
mod ws;

use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use config::Settings;
use tracing::{info, warn};
use validate::Validator;

/// Command line interface entry point.
#[derive(Parser)]
#[command(
    name = "flare",
    author,
    version,
    about = "In-memory Nostr relay for ephemeral events"
)]
struct Cli {
    /// Path to the `.env` configuration file.
    #[arg(long, default_value = ".env")]
    env: String,
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Write a default `.env` file if none exists.
    Init,
    /// Launch HTTP and WebSocket services.
    Serve,
    /// Run event files through the relay's admission checks.
    Check {
        /// Paths to JSON event files.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

/// Execute the selected CLI subcommand.
async fn run(cli: Cli) -> anyhow::Result<()> {
    ensure_env_file(&cli.env)?;
    let cfg = Settings::from_env(&cli.env)?;
    match cli.command {
        Commands::Init => {
            // `ensure_env_file` already did the work.
            info!("configuration at {}", cli.env);
        }
        Commands::Serve => {
            let http_addr: SocketAddr = cfg
                .bind_http
                .parse()
                .with_context(|| format!("invalid BIND_HTTP {:?}", cfg.bind_http))?;
            let ws_addr: SocketAddr = cfg
                .bind_ws
                .parse()
                .with_context(|| format!("invalid BIND_WS {:?}", cfg.bind_ws))?;
            if !cfg.verify_sig {
                warn!("signature verification is disabled");
            }
            let relay = Arc::new(ws::Relay::new(Validator::from_flag(cfg.verify_sig)));
            tokio::try_join!(
                server::serve_http(
                    http_addr,
                    relay.clone(),
                    cfg.relay_name.clone(),
                    cfg.relay_description.clone(),
                    std::future::pending()
                ),
                ws::serve_ws(ws_addr, relay, std::future::pending())
            )?;
        }
        Commands::Check { files } => {
            let failed = check_files(&files, &Validator::from_flag(cfg.verify_sig));
            if failed > 0 {
                bail!("{failed} of {} events rejected", files.len());
            }
        }
    }
    Ok(())
}

/// Validate each file, printing one line per file. Returns the failure count.
fn check_files(files: &[PathBuf], validator: &Validator) -> usize {
    let mut failed = 0;
    for f in files {
        let res = fs::read_to_string(f)
            .context("reading event file")
            .and_then(|data| {
                serde_json::from_str::<serde_json::Value>(&data).context("parsing JSON")
            })
            .and_then(|raw| validator.validate(&raw).map_err(anyhow::Error::from));
        match res {
            Ok(ev) => println!("ok {}", ev.id),
            Err(e) => {
                println!("{}: {e:#}", f.display());
                failed += 1;
            }
        }
    }
    failed
}

/// Create a default `.env` file if one is not already present at `path`.
fn ensure_env_file(path: &str) -> anyhow::Result<()> {
    let env_path = Path::new(path);
    if env_path.exists() {
        return Ok(());
    }
    if let Some(parent) = env_path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    fs::write(env_path, config::default_env())?;
    Ok(())
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    use tracing_subscriber::EnvFilter;

    // Log to stdout; override the level with `RUST_LOG=debug`.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    let cli = Cli::parse();
    run(cli).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::tests::{clear_env, ENV_MUTEX},
        event::Tag,
        validate::tests::signed_event,
    };
    use std::{fs, time::Duration};
    use tempfile::TempDir;
    use tokio::{net::TcpListener, task};

    async fn free_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn init_creates_default_env() {
        let _g = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join("nested").join(".env");
        run(Cli {
            env: env_path.to_string_lossy().into_owned(),
            command: Commands::Init,
        })
        .await
        .unwrap();

        let data = fs::read_to_string(&env_path).unwrap();
        assert!(data.contains("BIND_HTTP=127.0.0.1:7777"));
        assert!(data.contains("BIND_WS=127.0.0.1:7778"));
        assert!(data.contains("VERIFY_SIG=1"));
    }

    #[tokio::test]
    async fn init_keeps_existing_env() {
        let _g = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join(".env");
        let content = "BIND_HTTP=127.0.0.1:1\nBIND_WS=127.0.0.1:2\n";
        fs::write(&env_path, content).unwrap();
        run(Cli {
            env: env_path.to_string_lossy().into_owned(),
            command: Commands::Init,
        })
        .await
        .unwrap();
        assert_eq!(fs::read_to_string(&env_path).unwrap(), content);
    }

    #[test]
    fn check_files_counts_failures() {
        let dir = TempDir::new().unwrap();
        let good = dir.path().join("good.json");
        let blocked = dir.path().join("blocked.json");
        let broken = dir.path().join("broken.json");
        let missing = dir.path().join("missing.json");
        let ev = signed_event(1, 20001, vec![Tag(vec!["t".into(), "x".into()])]);
        fs::write(&good, serde_json::to_string(&ev).unwrap()).unwrap();
        let ev = signed_event(1, 1, vec![]);
        fs::write(&blocked, serde_json::to_string(&ev).unwrap()).unwrap();
        fs::write(&broken, "{").unwrap();

        let v = Validator::from_flag(true);
        assert_eq!(check_files(&[good.clone()], &v), 0);
        assert_eq!(check_files(&[good, blocked, broken, missing], &v), 3);
    }

    #[tokio::test]
    async fn run_serve_starts_http() {
        let _g = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let dir = TempDir::new().unwrap();
        let http_port = free_port().await;
        let ws_port = free_port().await;
        let env_path = dir.path().join(".env");
        let content = format!(
            "BIND_HTTP=127.0.0.1:{}\nBIND_WS=127.0.0.1:{}\nVERIFY_SIG=1\n",
            http_port, ws_port
        );
        fs::write(&env_path, content).unwrap();

        let handle = task::spawn(run(Cli {
            env: env_path.to_str().unwrap().to_string(),
            command: Commands::Serve,
        }));
        tokio::time::sleep(Duration::from_millis(200)).await;
        let url = format!("http://127.0.0.1:{}/healthz", http_port);
        let resp = reqwest::get(url).await.unwrap();
        assert!(resp.status().is_success());
        handle.abort();
    }

    #[tokio::test]
    async fn run_serve_rejects_bad_address() {
        let _g = ENV_MUTEX.lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let dir = TempDir::new().unwrap();
        let env_path = dir.path().join(".env");
        fs::write(&env_path, "BIND_HTTP=nowhere\nBIND_WS=127.0.0.1:0\n").unwrap();
        let err = run(Cli {
            env: env_path.to_str().unwrap().to_string(),
            command: Commands::Serve,
        })
        .await
        .unwrap_err();
        assert!(err.to_string().contains("BIND_HTTP"));
    }
}
