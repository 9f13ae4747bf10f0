use clap::{Parser, Subcommand};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::{json, Value};

#[derive(Parser)]
#[command(name = "monitor-cli")]
#[command(about = "Management CLI for the payment monitor", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://localhost:8081")]
    url: String,

    #[arg(short, long, env = "MONITOR_ADMIN_KEY")]
    key: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check engine status
    Status,
    /// List wallet listeners
    Listeners,
    /// Start monitoring a campaign wallet
    Start {
        campaign_id: String,
        wallet: String,
    },
    /// Stop monitoring a campaign wallet
    Stop { campaign_id: String },
    /// Verify a payment transaction
    Verify {
        #[arg(long, default_value = "ethereum")]
        network: String,
        #[arg(long)]
        tx_hash: String,
        /// Expected amount in token units, e.g. 50 or 12.5
        #[arg(long)]
        amount: String,
        /// Token contract; omit for the native asset
        #[arg(long, default_value = "")]
        token: String,
        #[arg(long, default_value_t = 18)]
        decimals: u8,
        #[arg(long)]
        recipient: String,
    },
    /// Verify an activation fee payment
    Activation {
        #[arg(long, default_value = "ethereum")]
        network: String,
        #[arg(long)]
        tx_hash: String,
    },
    /// Show recorded donation totals
    Donations,
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

    let res = match cli.command {
        Commands::Status => {
            client.get(format!("{}/admin/status", cli.url)).headers(headers).send().await?
        }
        Commands::Listeners => {
            client.get(format!("{}/admin/listeners", cli.url)).headers(headers).send().await?
        }
        Commands::Start { campaign_id, wallet } => {
            client
                .post(format!("{}/admin/listeners", cli.url))
                .headers(headers)
                .json(&json!({ "campaign_id": campaign_id, "wallet": wallet }))
                .send()
                .await?
        }
        Commands::Stop { campaign_id } => {
            client
                .delete(format!("{}/admin/listeners/{}", cli.url, campaign_id))
                .headers(headers)
                .send()
                .await?
        }
        Commands::Verify {
            network,
            tx_hash,
            amount,
            token,
            decimals,
            recipient,
        } => {
            client
                .post(format!("{}/admin/verify", cli.url))
                .headers(headers)
                .json(&json!({
                    "network": network,
                    "tx_hash": tx_hash,
                    "expected_amount": amount,
                    "token_address": token,
                    "decimals": decimals,
                    "recipient": recipient,
                }))
                .send()
                .await?
        }
        Commands::Activation { network, tx_hash } => {
            client
                .post(format!("{}/admin/verify/activation", cli.url))
                .headers(headers)
                .json(&json!({ "network": network, "tx_hash": tx_hash }))
                .send()
                .await?
        }
        Commands::Donations => {
            client.get(format!("{}/admin/donations", cli.url)).headers(headers).send().await?
        }
    };

    print_response(res).await
}

async fn print_response(res: reqwest::Response) -> Result<(), Box<dyn std::error::Error>> {
    let status = res.status();
    if !status.is_success() {
        eprintln!("Error: Admin API returned status {}", status);
        if let Ok(text) = res.text().await {
            eprintln!("Response: {}", text);
        }
        return Ok(());
    }

    let json: Value = res.json().await?;
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
