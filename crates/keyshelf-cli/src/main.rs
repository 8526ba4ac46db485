//! `KeyShelf` CLI: command-line client for the `KeyShelf` server.
//!
//! Talks to the server over its JSON API. `generate-secret` runs locally.

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Value, json};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// KeyShelf: a personal API-key manager.
#[derive(Parser)]
#[command(
    name = "keyshelf",
    version,
    about = "KeyShelf CLI: manage API keys and projects on a KeyShelf server",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         KEYSHELF_ADDR       Server address (default: http://127.0.0.1:5000)\n  \
         KEYSHELF_PASSWORD   Password for encrypt/decrypt/export\n\n\
         {DIM}Examples:{RESET}\n  \
         keyshelf projects add web\n  \
         keyshelf keys add STRIPE_KEY sk_live_123 --project 1\n  \
         keyshelf import .env --project 1\n  \
         keyshelf export --format yaml --output keys.yaml"
    ),
)]
struct Cli {
    /// KeyShelf server address.
    #[arg(long, env = "KEYSHELF_ADDR", default_value = "http://127.0.0.1:5000")]
    addr: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show server health and key encryption counts.
    Status,
    /// Key operations.
    Keys {
        #[command(subcommand)]
        action: KeyCommands,
    },
    /// Project operations.
    Projects {
        #[command(subcommand)]
        action: ProjectCommands,
    },
    /// Import a .env, .json, or .yaml file into a project.
    Import {
        /// File to upload.
        file: String,
        /// Target project id.
        #[arg(long)]
        project: i64,
    },
    /// Export keys as env, json, or yaml.
    Export {
        /// Output format: env, json, or yaml.
        #[arg(long, default_value = "env")]
        format: String,
        /// Only export this project.
        #[arg(long)]
        project: Option<i64>,
        /// Password for encrypted keys.
        #[arg(long, env = "KEYSHELF_PASSWORD", hide_env_values = true)]
        password: Option<String>,
        /// Write to this file instead of stdout.
        #[arg(long, short)]
        output: Option<String>,
    },
    /// Encrypt plaintext keys with a password.
    Encrypt {
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Decrypt encrypted keys with a password.
    Decrypt {
        #[command(flatten)]
        batch: BatchArgs,
    },
    /// Download a copy of the whole database.
    Backup {
        /// Output path (default: the server-suggested filename).
        #[arg(long, short)]
        output: Option<String>,
    },
    /// Upload a database file, replacing or merging into the current one.
    Restore {
        /// SQLite file to upload.
        file: String,
        /// `overwrite` replaces everything; `merge` adds next to existing keys.
        #[arg(long, default_value = "overwrite")]
        mode: String,
    },
    /// Print a random 32-byte secret, URL-safe base64 encoded.
    #[command(name = "generate-secret")]
    GenerateSecret,
}

#[derive(Subcommand)]
enum KeyCommands {
    /// List keys, optionally of one project or only the unassigned ones.
    List {
        #[arg(long, conflicts_with = "unassigned")]
        project: Option<i64>,
        #[arg(long)]
        unassigned: bool,
    },
    /// Show one key.
    Get { id: i64 },
    /// Add a key.
    Add {
        name: String,
        value: String,
        #[arg(long)]
        project: Option<i64>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        used_with: Option<String>,
    },
    /// Delete a key, or every key with `--all`.
    Rm {
        #[arg(required_unless_present = "all")]
        id: Option<i64>,
        #[arg(long, conflicts_with = "id")]
        all: bool,
    },
    /// Move or copy a key to the end of a project (`none` for unassigned).
    Mv {
        id: i64,
        #[arg(long, value_parser = parse_target)]
        to: Target,
        #[arg(long)]
        copy: bool,
        /// Required when the key is encrypted.
        #[arg(long, env = "KEYSHELF_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },
    /// Move a key to a position, optionally in another project.
    Reorder {
        id: i64,
        position: i64,
        #[arg(long, value_parser = parse_target)]
        project: Option<Target>,
    },
}

#[derive(Subcommand)]
enum ProjectCommands {
    /// List projects in display order.
    List,
    /// Create a project.
    Add { name: String },
    /// Rename a project.
    Rename { id: i64, name: String },
    /// Delete a project. Its keys become unassigned unless `--delete-keys`.
    Rm {
        id: i64,
        #[arg(long)]
        delete_keys: bool,
    },
    /// Move a project to a position.
    Reorder { id: i64, position: i64 },
}

#[derive(clap::Args)]
struct BatchArgs {
    #[arg(long, env = "KEYSHELF_PASSWORD", hide_env_values = true)]
    password: String,
    /// Only keys of this project.
    #[arg(long)]
    project: Option<i64>,
    /// Only these key ids.
    #[arg(long = "key")]
    keys: Vec<i64>,
}

/// A project id, or the unassigned scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Target(Option<i64>);

fn parse_target(raw: &str) -> Result<Target, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "none" | "unassigned" => Ok(Target(None)),
        other => other
            .parse()
            .map(|id| Target(Some(id)))
            .map_err(|_| format!("expected a project id or 'none', got '{raw}'")),
    }
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(title: &str) {
    println!("{BOLD}{CYAN}{title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

fn str_field<'a>(value: &'a Value, field: &str) -> &'a str {
    value.get(field).and_then(Value::as_str).unwrap_or("")
}

fn int_field(value: &Value, field: &str) -> i64 {
    value.get(field).and_then(Value::as_i64).unwrap_or(0)
}

fn print_keys(keys: &Value) {
    let Some(keys) = keys.as_array() else {
        return;
    };
    if keys.is_empty() {
        println!("  {DIM}no keys{RESET}");
        return;
    }
    for key in keys {
        let project = key
            .get("project_id")
            .and_then(Value::as_i64)
            .map_or_else(|| "-".to_owned(), |id| id.to_string());
        let lock = if key.get("encrypted").and_then(Value::as_bool) == Some(true) {
            "🔒"
        } else {
            "  "
        };
        println!(
            "  {DIM}#{:<5}{RESET} {lock} {BOLD}{:<32}{RESET} {DIM}project {project:<5} pos {}{RESET}",
            int_field(key, "id"),
            str_field(key, "name"),
            int_field(key, "position"),
        );
    }
}

fn print_key(key: &Value) {
    kv_line("id", &int_field(key, "id").to_string());
    kv_line("name", str_field(key, "name"));
    kv_line("key", str_field(key, "key"));
    kv_line(
        "encrypted",
        &key.get("encrypted")
            .and_then(Value::as_bool)
            .unwrap_or(false)
            .to_string(),
    );
    kv_line("description", str_field(key, "description"));
    kv_line("used with", str_field(key, "used_with"));
    kv_line(
        "project",
        &key.get("project_id")
            .and_then(Value::as_i64)
            .map_or_else(|| "-".to_owned(), |id| id.to_string()),
    );
    kv_line("position", &int_field(key, "position").to_string());
}

fn print_projects(projects: &Value) {
    let Some(projects) = projects.as_array() else {
        return;
    };
    if projects.is_empty() {
        println!("  {DIM}no projects{RESET}");
        return;
    }
    for project in projects {
        println!(
            "  {DIM}#{:<5}{RESET} {BOLD}{:<32}{RESET} {DIM}pos {}{RESET}",
            int_field(project, "id"),
            str_field(project, "name"),
            int_field(project, "position"),
        );
    }
}

fn print_batch(resp: &Value) {
    success(str_field(resp, "message"));
    if let Some(failed) = resp.get("failed_keys").and_then(Value::as_array) {
        for f in failed {
            warning(&format!(
                "#{} {}: {}",
                int_field(f, "id"),
                str_field(f, "name"),
                str_field(f, "error")
            ));
        }
    }
}

// ── HTTP client ──────────────────────────────────────────────────────

struct Client {
    http: reqwest::Client,
    addr: String,
}

/// A downloaded attachment.
struct Download {
    filename: Option<String>,
    bytes: Vec<u8>,
}

impl Client {
    fn new(addr: String) -> Self {
        let http = reqwest::Client::new();
        let addr = addr.trim_end_matches('/').to_owned();
        Self { http, addr }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.addr)
    }

    async fn get(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn send_json(&self, method: reqwest::Method, path: &str, body: &Value) -> Result<Value> {
        let resp = self
            .http
            .request(method, self.url(path))
            .json(body)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value> {
        self.send_json(reqwest::Method::POST, path, body).await
    }

    async fn delete(&self, path: &str) -> Result<Value> {
        let resp = self
            .http
            .delete(self.url(path))
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn upload(&self, path: &str, form: reqwest::multipart::Form) -> Result<Value> {
        let resp = self
            .http
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .context("request failed")?;
        handle_response(resp).await
    }

    async fn download(&self, path: &str) -> Result<Download> {
        let resp = self
            .http
            .get(self.url(path))
            .send()
            .await
            .context("request failed")?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!("{}", error_message(status, &body));
        }
        let filename = resp
            .headers()
            .get(reqwest::header::CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename);
        let bytes = resp.bytes().await.context("failed to read download")?;
        Ok(Download {
            filename,
            bytes: bytes.to_vec(),
        })
    }
}

/// Pull `name` out of `attachment; filename="name"`.
fn attachment_filename(disposition: &str) -> Option<String> {
    let (_, rest) = disposition.split_once("filename=")?;
    let name = rest.trim().trim_matches('"');
    (!name.is_empty()).then(|| name.to_owned())
}

fn error_message(status: reqwest::StatusCode, body: &str) -> String {
    match serde_json::from_str::<Value>(body) {
        Ok(v) if v.get("message").is_some() => {
            format!("{} ({status})", str_field(&v, "message"))
        }
        _ => format!("server returned {status}: {body}"),
    }
}

async fn handle_response(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status();
    let body = resp.text().await.context("failed to read response body")?;
    if !status.is_success() {
        bail!("{}", error_message(status, &body));
    }
    if body.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&body).context("failed to parse response JSON")
}

fn project_query(project: Option<i64>) -> String {
    project.map_or_else(String::new, |id| format!("?project_id={id}"))
}

// ── Command dispatch ─────────────────────────────────────────────────

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let client = Client::new(cli.addr);

    match run(client, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{RED}{BOLD}✗ Error:{RESET} {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(client: Client, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Status => cmd_status(&client).await,
        Commands::Keys { action } => cmd_keys(&client, action).await,
        Commands::Projects { action } => cmd_projects(&client, action).await,
        Commands::Import { file, project } => cmd_import(&client, &file, project).await,
        Commands::Export {
            format,
            project,
            password,
            output,
        } => cmd_export(&client, &format, project, password.as_deref(), output.as_deref()).await,
        Commands::Encrypt { batch } => cmd_batch(&client, "/keys/encrypt", batch).await,
        Commands::Decrypt { batch } => cmd_batch(&client, "/keys/decrypt", batch).await,
        Commands::Backup { output } => cmd_backup(&client, output.as_deref()).await,
        Commands::Restore { file, mode } => cmd_restore(&client, &file, &mode).await,
        Commands::GenerateSecret => {
            println!("{}", keyshelf_core::crypto::generate_secret());
            Ok(())
        }
    }
}

async fn cmd_status(client: &Client) -> Result<()> {
    let health = client.get("/health").await?;
    let counts = client.get("/keys/status").await?;

    header("KeyShelf");
    kv_line("server", &client.addr);
    kv_line("status", str_field(&health, "status"));
    kv_line("version", str_field(&health, "version"));
    kv_line("keys", &int_field(&counts, "total").to_string());
    kv_line("encrypted", &int_field(&counts, "encrypted").to_string());
    kv_line("unencrypted", &int_field(&counts, "unencrypted").to_string());
    Ok(())
}

async fn cmd_keys(client: &Client, action: KeyCommands) -> Result<()> {
    match action {
        KeyCommands::List {
            project,
            unassigned,
        } => {
            let query = if unassigned {
                "?unassigned=true".to_owned()
            } else {
                project_query(project)
            };
            let keys = client.get(&format!("/keys{query}")).await?;
            print_keys(&keys);
        }
        KeyCommands::Get { id } => {
            print_key(&client.get(&format!("/keys/{id}")).await?);
        }
        KeyCommands::Add {
            name,
            value,
            project,
            description,
            used_with,
        } => {
            let body = json!({
                "name": name,
                "key": value,
                "project_id": project,
                "description": description,
                "used_with": used_with,
            });
            let key = client.post("/keys", &body).await?;
            success(&format!(
                "Added {BOLD}{}{RESET} (#{})",
                str_field(&key, "name"),
                int_field(&key, "id")
            ));
        }
        KeyCommands::Rm { id, all } => {
            let resp = match (id, all) {
                (_, true) => client.delete("/keys").await?,
                (Some(id), false) => client.delete(&format!("/keys/{id}")).await?,
                (None, false) => bail!("give a key id or --all"),
            };
            success(str_field(&resp, "message"));
        }
        KeyCommands::Mv {
            id,
            to,
            copy,
            password,
        } => {
            let body = json!({
                "key_id": id,
                "target_project_id": to.0,
                "is_copy": copy,
                "password": password,
            });
            let resp = client.post("/api/keys/move", &body).await?;
            let key = resp.get("key").cloned().unwrap_or(Value::Null);
            success(&format!(
                "{}: {BOLD}{}{RESET} at position {}",
                str_field(&resp, "message"),
                str_field(&key, "name"),
                int_field(&key, "position")
            ));
        }
        KeyCommands::Reorder {
            id,
            position,
            project,
        } => {
            let mut body = json!({ "new_position": position });
            if let Some(Target(target)) = project {
                body["project_id"] = json!(target);
            }
            let key = client
                .send_json(reqwest::Method::PATCH, &format!("/keys/{id}/reorder"), &body)
                .await?;
            success(&format!(
                "{BOLD}{}{RESET} now at position {}",
                str_field(&key, "name"),
                int_field(&key, "position")
            ));
        }
    }
    Ok(())
}

async fn cmd_projects(client: &Client, action: ProjectCommands) -> Result<()> {
    match action {
        ProjectCommands::List => print_projects(&client.get("/projects").await?),
        ProjectCommands::Add { name } => {
            let project = client.post("/projects", &json!({ "name": name })).await?;
            success(&format!(
                "Created project {BOLD}{}{RESET} (#{})",
                str_field(&project, "name"),
                int_field(&project, "id")
            ));
        }
        ProjectCommands::Rename { id, name } => {
            let project = client
                .send_json(
                    reqwest::Method::PUT,
                    &format!("/projects/{id}"),
                    &json!({ "name": name }),
                )
                .await?;
            success(&format!("Renamed to {BOLD}{}{RESET}", str_field(&project, "name")));
        }
        ProjectCommands::Rm { id, delete_keys } => {
            let resp = client
                .delete(&format!("/projects/{id}?delete_keys={delete_keys}"))
                .await?;
            success(str_field(&resp, "message"));
        }
        ProjectCommands::Reorder { id, position } => {
            let project = client
                .send_json(
                    reqwest::Method::PATCH,
                    &format!("/projects/{id}/reorder"),
                    &json!({ "new_position": position }),
                )
                .await?;
            success(&format!(
                "{BOLD}{}{RESET} now at position {}",
                str_field(&project, "name"),
                int_field(&project, "position")
            ));
        }
    }
    Ok(())
}

fn file_part(path: &str, bytes: Vec<u8>) -> reqwest::multipart::Part {
    let filename = Path::new(path)
        .file_name()
        .map_or_else(|| path.to_owned(), |n| n.to_string_lossy().into_owned());
    reqwest::multipart::Part::bytes(bytes).file_name(filename)
}

async fn cmd_import(client: &Client, file: &str, project: i64) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {file}"))?;
    let form = reqwest::multipart::Form::new().part("file", file_part(file, bytes));
    let resp = client
        .upload(&format!("/projects/{project}/import-env"), form)
        .await?;
    success(str_field(&resp, "message"));
    if let Some(names) = resp.get("names").and_then(Value::as_array) {
        for name in names.iter().filter_map(Value::as_str) {
            println!("  {DIM}+{RESET} {name}");
        }
    }
    if let Some(skipped) = resp.get("skipped").and_then(Value::as_array) {
        for entry in skipped {
            warning(&format!(
                "skipped '{}': {}",
                str_field(entry, "name"),
                str_field(entry, "reason")
            ));
        }
    }
    Ok(())
}

async fn cmd_export(
    client: &Client,
    format: &str,
    project: Option<i64>,
    password: Option<&str>,
    output: Option<&str>,
) -> Result<()> {
    let mut url = reqwest::Url::parse(&client.url("/export")).context("invalid server address")?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("format", format);
        if let Some(id) = project {
            query.append_pair("project_id", &id.to_string());
        }
        if let Some(password) = password {
            query.append_pair("password", password);
        }
    }
    let path = format!("/export?{}", url.query().unwrap_or_default());
    let download = client.download(&path).await?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &download.bytes)
                .await
                .with_context(|| format!("failed to write {path}"))?;
            success(&format!("Exported to {BOLD}{path}{RESET}"));
        }
        None => print!("{}", String::from_utf8_lossy(&download.bytes)),
    }
    Ok(())
}

async fn cmd_batch(client: &Client, path: &str, batch: BatchArgs) -> Result<()> {
    let key_ids = (!batch.keys.is_empty()).then_some(batch.keys);
    let body = json!({
        "password": batch.password,
        "project_id": batch.project,
        "key_ids": key_ids,
    });
    let resp = client.post(path, &body).await?;
    print_batch(&resp);
    Ok(())
}

async fn cmd_backup(client: &Client, output: Option<&str>) -> Result<()> {
    let download = client.download("/download-db").await?;
    let path = output
        .map(str::to_owned)
        .or(download.filename)
        .unwrap_or_else(|| "keyshelf_backup.db".to_owned());
    tokio::fs::write(&path, &download.bytes)
        .await
        .with_context(|| format!("failed to write backup to {path}"))?;
    success(&format!(
        "Backup saved to {BOLD}{path}{RESET} ({} bytes)",
        download.bytes.len()
    ));
    println!("  {YELLOW}⚠  Encrypted keys stay encrypted; everything else is plaintext. Keep it safe.{RESET}");
    Ok(())
}

async fn cmd_restore(client: &Client, file: &str, mode: &str) -> Result<()> {
    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read backup file: {file}"))?;
    if mode == "overwrite" {
        warning("This replaces every project and key on the server.");
    }
    let form = reqwest::multipart::Form::new()
        .text("import-mode", mode.to_owned())
        .part("file", file_part(file, bytes));
    let resp = client.upload("/import-db", form).await?;
    success(str_field(&resp, "message"));
    Ok(())
}
