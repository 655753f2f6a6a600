use clap::{Parser, Subcommand};
use serde_json::Value;

#[derive(Parser)]
#[command(name = "mesh-cli")]
#[command(about = "Inspection CLI for the mesh gateway", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8080")]
    url: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the full service directory
    Services,
    /// List the operations of one service
    Operations {
        /// Service name, e.g. /userService
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    let res = client
        .get(format!("{}/serviceInfo", cli.url))
        .send()
        .await?;
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: gateway returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }
    let directory: Value = res.json().await?;

    match cli.command {
        Commands::Services => {
            println!("{}", serde_json::to_string_pretty(&directory)?);
        }
        Commands::Operations { name } => {
            let found = directory["services"]
                .as_array()
                .into_iter()
                .flatten()
                .find(|s| s["service_name"] == name.as_str());
            match found {
                Some(service) => {
                    println!("{}", serde_json::to_string_pretty(&service["operations"])?)
                }
                None => eprintln!("Error: no service named {}", name),
            }
        }
    }

    Ok(())
}
