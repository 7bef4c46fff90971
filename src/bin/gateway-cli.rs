use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;

#[derive(Parser)]
#[command(name = "gateway-cli")]
#[command(about = "Management CLI for arr-gateway", long_about = None)]
struct Cli {
    /// Gateway base URL.
    #[arg(short, long, env = "GATEWAY_URL", default_value = "http://localhost:8080")]
    url: String,

    /// Admin API key.
    #[arg(short, long, env = "GATEWAY_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show gateway status and the published table generation
    Status,
    /// Reload templates and routes now
    Reload,
    /// List published routes (credentials redacted)
    Routes,
    /// List loaded templates
    Templates,
    /// Show one template
    Template {
        /// Template id
        id: String,
    },
}

impl Commands {
    fn request(&self) -> (Method, String) {
        match self {
            Commands::Status => (Method::GET, "status".into()),
            Commands::Reload => (Method::POST, "reload".into()),
            Commands::Routes => (Method::GET, "routes".into()),
            Commands::Templates => (Method::GET, "templates".into()),
            Commands::Template { id } => (Method::GET, format!("templates/{id}")),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {}", cli.key))?);

    let (method, path) = cli.command.request();
    let url = format!("{}/admin/v1/{path}", cli.url.trim_end_matches('/'));
    let res = client.request(method, url).headers(headers).send().await?;

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        std::process::exit(1);
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
