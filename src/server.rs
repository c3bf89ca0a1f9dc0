//! Newline-delimited JSON-RPC over stdio.
//!
//! Every request is one JSON object per line; every reply is one line on
//! stdout. Logging goes to stderr so it never interleaves with replies.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{debug, warn};

use crate::index::{ProjectIndex, ReloadOutcome};
use crate::workspace::Workspace;

const INVALID_PARAMS: i64 = -32602;
const METHOD_NOT_FOUND: i64 = -32601;
const NO_PROJECTS: i64 = -32001;
const RELOAD_FAILED: i64 = -32002;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct InitializeParams {
    workspace_folders: Vec<PathBuf>,
    models_dir: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CursorParams {
    path: PathBuf,
    /// Full text of the line the cursor is on.
    line_text: String,
    /// UTF-16 column of the cursor within `line_text`.
    character: u32,
}

#[derive(Debug, Deserialize)]
struct FileParams {
    path: PathBuf,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelParams {
    #[serde(default)]
    root: Option<PathBuf>,
    namespace: String,
}

fn reply(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": { "code": code, "message": message.into() } })
}

fn params<T: DeserializeOwned>(msg: &Value) -> std::result::Result<T, String> {
    let raw = msg
        .get("params")
        .filter(|p| !p.is_null())
        .cloned()
        .unwrap_or(json!({}));
    serde_json::from_value(raw).map_err(|e| format!("invalid params: {e}"))
}

fn outcome_json(outcome: Option<ReloadOutcome>) -> Value {
    match outcome {
        Some(ReloadOutcome::Updated { namespace }) => json!({ "updated": true, "namespace": namespace }),
        Some(ReloadOutcome::Unchanged { reason }) => json!({ "updated": false, "reason": reason }),
        None => json!({ "updated": false }),
    }
}

#[derive(Debug, Default)]
pub struct ServerState {
    workspace: Workspace,
    shutdown: bool,
}

impl ServerState {
    pub fn is_shut_down(&self) -> bool {
        self.shutdown
    }

    /// Relative paths are taken against the first workspace folder.
    fn resolve_path(&self, p: &Path) -> PathBuf {
        match self.workspace.folders().first() {
            Some(root) if !p.is_absolute() => root.join(p),
            _ => p.to_path_buf(),
        }
    }

    fn project_for(&self, path: &Path) -> Option<&ProjectIndex> {
        self.workspace.project_for_path(path)
    }

    /// Handle one decoded message. Returns `None` for notifications.
    pub async fn handle(&mut self, msg: &Value) -> Option<Value> {
        // Notifications have no "id" and never get a reply.
        let id = msg.get("id").cloned()?;
        let method = msg.get("method").and_then(|m| m.as_str()).unwrap_or("");
        debug!(%method, "request");

        let out = match method {
            "initialize" => match params::<InitializeParams>(msg) {
                Ok(p) => {
                    self.workspace = Workspace::new(p.workspace_folders).with_models_dir(p.models_dir);
                    let projects = self.workspace.rescan().await;
                    reply(
                        id,
                        json!({
                            "serverInfo": { "name": env!("CARGO_PKG_NAME"), "version": env!("CARGO_PKG_VERSION") },
                            "projects": projects
                        }),
                    )
                }
                Err(e) => error(id, INVALID_PARAMS, e),
            },
            "ping" => reply(id, json!({})),
            "rescan" => {
                let projects = self.workspace.rescan().await;
                if projects == 0 {
                    warn!("rescan found no model project");
                    error(id, NO_PROJECTS, "no workspace folder contains a models directory")
                } else {
                    reply(id, json!({ "projects": projects }))
                }
            }
            "models/list" => {
                let projects: Vec<Value> = self
                    .workspace
                    .model_names()
                    .into_iter()
                    .map(|(root, models)| json!({ "root": root, "models": models }))
                    .collect();
                reply(id, json!({ "projects": projects }))
            }
            "models/get" => match params::<ModelParams>(msg) {
                Ok(p) => {
                    let found = match p.root {
                        Some(root) => self
                            .workspace
                            .project(&self.resolve_path(&root))
                            .and_then(|proj| proj.find_by_name(&p.namespace)),
                        None => self.workspace.projects().find_map(|proj| proj.find_by_name(&p.namespace)),
                    };
                    reply(id, json!(found))
                }
                Err(e) => error(id, INVALID_PARAMS, e),
            },
            "models/report" => {
                let reports: Vec<Value> = self
                    .workspace
                    .projects()
                    .map(|p| json!({ "root": p.root(), "report": p.report() }))
                    .collect();
                reply(id, json!({ "projects": reports }))
            }
            "file/changed" => match params::<FileParams>(msg) {
                Ok(p) => {
                    let path = self.resolve_path(&p.path);
                    match self.workspace.file_changed(&path).await {
                        Ok(outcome) => reply(id, outcome_json(outcome)),
                        Err(e) => error(id, RELOAD_FAILED, format!("{e:#}")),
                    }
                }
                Err(e) => error(id, INVALID_PARAMS, e),
            },
            "file/edited" => match params::<FileParams>(msg) {
                Ok(FileParams { path, text: Some(text) }) => {
                    let path = self.resolve_path(&path);
                    match self.workspace.file_edited(&path, &text).await {
                        Ok(outcome) => reply(id, outcome_json(outcome)),
                        Err(e) => error(id, RELOAD_FAILED, format!("{e:#}")),
                    }
                }
                Ok(_) => error(id, INVALID_PARAMS, "missing text"),
                Err(e) => error(id, INVALID_PARAMS, e),
            },
            "textDocument/definition" => match params::<CursorParams>(msg) {
                Ok(p) => {
                    let path = self.resolve_path(&p.path);
                    let found = self
                        .project_for(&path)
                        .and_then(|proj| proj.definition(&path, &p.line_text, p.character));
                    reply(id, json!(found))
                }
                Err(e) => error(id, INVALID_PARAMS, e),
            },
            "textDocument/completion" => match params::<CursorParams>(msg) {
                Ok(p) => {
                    let path = self.resolve_path(&p.path);
                    let items = self
                        .project_for(&path)
                        .map(|proj| proj.completions(&path, &p.line_text, p.character))
                        .unwrap_or_default();
                    reply(id, json!({ "items": items }))
                }
                Err(e) => error(id, INVALID_PARAMS, e),
            },
            "shutdown" => {
                self.shutdown = true;
                reply(id, Value::Null)
            }
            _ => error(id, METHOD_NOT_FOUND, format!("Method not found: {method}")),
        };
        Some(out)
    }
}

pub async fn run_stdio_server() -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    let mut state = ServerState::default();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let msg: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "dropping malformed message");
                continue;
            }
        };

        if let Some(reply) = state.handle(&msg).await {
            stdout.write_all(format!("{reply}\n").as_bytes()).await?;
            stdout.flush().await?;
        }

        if state.is_shut_down() {
            break;
        }
    }

    Ok(())
}
