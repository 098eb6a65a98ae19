use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rtdb_client::{AuthConfig, DatabaseConfig, RtdbClient};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "rtdb-mgmt")]
#[command(about = "Realtime database maintenance CLI", long_about = None)]
pub struct Cli {
    /// TOML or JSON client configuration.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Database root URL; overrides the configuration file.
    #[arg(short, long, env = "RTDB_URL")]
    pub url: Option<String>,

    /// Fixed credential; overrides the configured auth mode.
    #[arg(short, long, env = "RTDB_TOKEN")]
    pub token: Option<String>,

    /// Debug-level logging.
    #[arg(short, long)]
    pub verbose: bool,

    /// JSON log lines on stderr.
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read a node.
    Get {
        path: String,
        /// Only list the immediate child keys.
        #[arg(long)]
        shallow: bool,
    },
    /// Overwrite a node with a JSON document.
    Put { path: String, json: String },
    /// Append a JSON document under a generated push key.
    Post { path: String, json: String },
    /// Merge a JSON object into a node.
    Patch { path: String, json: String },
    /// Delete a node and everything below it.
    Delete { path: String },
    /// Keep only the newest MAX_DAYS children of ROOT.
    TrimDays { root: String, max_days: usize },
    /// Remove the BATCH oldest push-key children of ROOT.
    TrimOldest { root: String, batch: usize },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let config = self.resolve_config()?;
        let client = RtdbClient::connect(&config)
            .await
            .context("failed to initialise database client")?;
        let output = self.execute(&client).await?;
        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }

    /// Merge the configuration file with command-line overrides.
    pub fn resolve_config(&self) -> Result<DatabaseConfig> {
        let mut config = match (&self.config, &self.url) {
            (Some(path), _) => DatabaseConfig::from_file(path)
                .with_context(|| format!("loading {}", path.display()))?,
            (None, Some(url)) => DatabaseConfig::new(url.clone()),
            (None, None) => anyhow::bail!("either --config or --url is required"),
        };
        if let Some(url) = &self.url {
            config.database_url = url.clone();
        }
        if let Some(token) = &self.token {
            config.auth = AuthConfig::Static {
                token: token.clone(),
            };
        }
        config.validate()?;
        Ok(config)
    }

    /// Run the subcommand and return what should be printed.
    pub async fn execute(&self, client: &RtdbClient) -> Result<Value> {
        match &self.command {
            Command::Get { path, shallow: false } => Ok(client.store().get(path).await?),
            Command::Get { path, shallow: true } => {
                let keys = client.store().get_shallow(path).await?;
                Ok(keys.map(|k| json!(k.sorted())).unwrap_or(Value::Null))
            }
            Command::Put { path, json } => {
                client.store().put(path, &parse_document(json)?).await?;
                Ok(json!({ "path": path, "status": "ok" }))
            }
            Command::Post { path, json } => {
                let name = client.store().post(path, &parse_document(json)?).await?;
                Ok(json!({ "name": name }))
            }
            Command::Patch { path, json } => {
                let document = parse_document(json)?;
                if !document.is_object() {
                    anyhow::bail!("patch document must be a JSON object");
                }
                client.store().patch(path, &document).await?;
                Ok(json!({ "path": path, "status": "ok" }))
            }
            Command::Delete { path } => {
                client.store().delete(path).await?;
                Ok(json!({ "deleted": path }))
            }
            Command::TrimDays { root, max_days } => {
                let summary = client.retention().trim_days(root, *max_days).await?;
                Ok(serde_json::to_value(summary)?)
            }
            Command::TrimOldest { root, batch } => {
                match client.retention().trim_oldest_batch(root, *batch).await {
                    Ok(removed) => Ok(json!({ "removed": removed })),
                    Err(e) => anyhow::bail!("{} (code {})", e, e.sentinel()),
                }
            }
        }
    }
}

fn parse_document(json: &str) -> Result<Value> {
    serde_json::from_str(json).context("argument is not valid JSON")
}
