use std::path::PathBuf;

use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "stackctl")]
#[command(about = "Management CLI for the trading stack control plane", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, default_value = "CHANGE_ME_IN_PRODUCTION")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show stack status and broker reachability
    Status,
    /// Print the current configuration snapshot
    Config,
    /// Save a TOML document and roll it out to every worker
    Apply {
        /// Path to the new configuration document
        file: PathBuf,
    },
    /// Show the result of the last save-and-apply
    Last,
    /// List configuration backups
    Backups,
    /// Back up the current configuration file
    Backup,
    /// Restore a backup through a full save-and-apply
    Restore {
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", cli.key))?,
    );

    let (method, path, body) = match cli.command {
        Commands::Status => (Method::GET, "/admin/status".to_string(), None),
        Commands::Config => (Method::GET, "/admin/config".to_string(), None),
        Commands::Apply { file } => {
            let text = std::fs::read_to_string(&file)?;
            let document: toml::Value = toml::from_str(&text)?;
            (Method::PUT, "/admin/config".to_string(), Some(serde_json::to_value(document)?))
        }
        Commands::Last => (Method::GET, "/admin/apply/last".to_string(), None),
        Commands::Backups => (Method::GET, "/admin/backups".to_string(), None),
        Commands::Backup => (Method::POST, "/admin/backups".to_string(), None),
        Commands::Restore { name } => (Method::POST, format!("/admin/backups/{name}/restore"), None),
    };

    let mut request = client
        .request(method, format!("{}{}", cli.url.trim_end_matches('/'), path))
        .headers(headers);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let ok = print_response(request.send().await?).await?;
    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn print_response(res: reqwest::Response) -> Result<bool, Box<dyn std::error::Error>> {
    let status = res.status();
    let text = res.text().await?;
    let rendered = match serde_json::from_str::<Value>(&text) {
        Ok(json) => serde_json::to_string_pretty(&json)?,
        Err(_) => text,
    };

    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        eprintln!("{}", rendered);
        return Ok(false);
    }

    println!("{}", rendered);
    Ok(true)
}
