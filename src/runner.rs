// MIT License
// Copyright (c) 2024 Graham King

use std::net::SocketAddr;
use std::path;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::api;
use crate::interactions;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_DB_PATH: &str = "comments.db";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub db_path: path::PathBuf,
    pub addr: String,
}

/// The interaction API, already accepting connections
pub struct RunningService {
    local_addr: SocketAddr,
    task: JoinHandle<std::io::Result<()>>,
}

impl RunningService {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Resolves when the server stops, which it only does on error
    pub async fn wait(self) -> anyhow::Result<()> {
        self.task
            .await
            .context("interaction service task died")?
            .context("interaction service stopped")
    }
}

/// Create the schema, bind the listener, then start serving in the background.
/// Nothing is accepted until both the database and the socket are ready.
pub async fn start(cfg: &ServiceConfig) -> anyhow::Result<RunningService> {
    let db_path = cfg.db_path.clone();
    let store = tokio::task::spawn_blocking(move || interactions::initialize(&db_path))
        .await?
        .with_context(|| format!("initializing database {}", cfg.db_path.display()))?;
    tracing::info!(db_path = %cfg.db_path.display(), "database initialized");

    let listener = TcpListener::bind(&cfg.addr)
        .await
        .with_context(|| format!("binding {}", cfg.addr))?;
    let local_addr = listener.local_addr()?;
    tracing::info!(%local_addr, "interaction API listening");

    let app = api::router(Arc::new(store));
    let task = tokio::spawn(async move { axum::serve(listener, app).await });
    Ok(RunningService { local_addr, task })
}

/// Serve in the foreground. Any failure, including at startup, is returned.
pub async fn serve(cfg: &ServiceConfig) -> anyhow::Result<()> {
    start(cfg).await?.wait().await
}

/// Run the interaction API next to a host program (e.g. `hugo server`).
///
/// The two are supervised separately: if the API can't start or dies later we
/// log it and leave the host alone. Returns the host's exit code.
pub async fn run_with_host(
    cfg: &ServiceConfig,
    program: &str,
    args: &[String],
) -> anyhow::Result<i32> {
    match start(cfg).await {
        Ok(service) => {
            let local_addr = service.local_addr();
            tokio::spawn(async move {
                if let Err(err) = service.wait().await {
                    tracing::error!(%local_addr, "{err:#}");
                }
            });
        }
        Err(err) => {
            tracing::error!("interaction service not started, host continues: {err:#}");
        }
    }

    let mut host = tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .spawn()
        .with_context(|| format!("launching {program}"))?;
    tracing::info!(program, pid = host.id(), "host program started");

    let status = host
        .wait()
        .await
        .with_context(|| format!("waiting for {program}"))?;
    tracing::info!(program, %status, "host program exited");
    // Killed by a signal has no code
    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scratch_config(dir: &tempfile::TempDir) -> ServiceConfig {
        ServiceConfig {
            db_path: dir.path().join("comments.db"),
            addr: "127.0.0.1:0".to_string(),
        }
    }

    #[tokio::test]
    async fn serves_over_tcp() {
        let dir = tempfile::tempdir().unwrap();
        let service = start(&scratch_config(&dir)).await.unwrap();
        let base = format!("http://{}", service.local_addr());
        let client = reqwest::Client::new();

        let res = client
            .post(format!("{base}{}", api::ADD_LIKE_PATH))
            .json(&serde_json::json!({"title": "post-1", "user": "alice"}))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), http::StatusCode::CREATED);

        let res = client
            .post(format!("{base}{}", api::ADD_COMMENT_PATH))
            .json(&serde_json::json!({
                "title": "post-1",
                "user": "bob",
                "email": "bob@example.com",
                "comment": "Thanks!",
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), http::StatusCode::CREATED);

        let res = client
            .get(format!("{base}{}?title=post-1", api::INTERACTIONS_PATH))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), http::StatusCode::OK);
        assert_eq!(res.headers()["access-control-allow-origin"], "*");
        let got: serde_json::Value = res.json().await.unwrap();
        assert_eq!(
            got,
            serde_json::json!({
                "like_count": 1,
                "comments": [{"user": "bob", "comment": "Thanks!"}],
            })
        );
    }

    #[tokio::test]
    async fn data_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = scratch_config(&dir);

        let first = start(&cfg).await.unwrap();
        let res = reqwest::Client::new()
            .post(format!("http://{}{}", first.local_addr(), api::ADD_LIKE_PATH))
            .body(r#"{"title":"post-1","user":"alice"}"#)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), http::StatusCode::CREATED);

        let second = start(&cfg).await.unwrap();
        let got: serde_json::Value = reqwest::get(format!(
            "http://{}{}?title=post-1",
            second.local_addr(),
            api::INTERACTIONS_PATH
        ))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
        assert_eq!(got["like_count"], 1);
    }

    #[tokio::test]
    async fn bad_database_fails_before_binding() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServiceConfig {
            // A directory is not a database file
            db_path: dir.path().to_path_buf(),
            ..scratch_config(&dir)
        };
        let err = start(&cfg).await.err().unwrap();
        assert!(format!("{err:#}").contains("initializing database"));
    }

    #[tokio::test]
    async fn address_in_use_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let cfg = ServiceConfig {
            addr: taken.local_addr().unwrap().to_string(),
            ..scratch_config(&dir)
        };
        let err = start(&cfg).await.err().unwrap();
        assert!(format!("{err:#}").contains("binding"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn host_exit_code_is_passed_through() {
        let dir = tempfile::tempdir().unwrap();
        let code = run_with_host(
            &scratch_config(&dir),
            "sh",
            &["-c".to_string(), "exit 3".to_string()],
        )
        .await
        .unwrap();
        assert_eq!(code, 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn host_runs_when_service_cannot_start() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = ServiceConfig {
            db_path: dir.path().to_path_buf(),
            ..scratch_config(&dir)
        };
        let code = run_with_host(&cfg, "true", &[]).await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn missing_host_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = run_with_host(
            &scratch_config(&dir),
            "surely-not-an-installed-program-9f3a",
            &[],
        )
        .await;
        assert!(res.is_err());
    }
}
