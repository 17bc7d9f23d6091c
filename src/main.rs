use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use iapkit::catalog::Catalog;
use iapkit::config::Config;
use iapkit::error::{IapError, Result};
use iapkit::gateway::{SandboxGateway, event_channel};
use iapkit::ledger::{SqliteLedger, owns_product};
use iapkit::models::{RawReceiptEnvelope, Store};
use iapkit::orchestrator::{Collaborators, OrchestratorService, PurchaseOrchestrator};
use iapkit::rewards::TracingRewardSink;
use iapkit::signals::TracingSignals;
use iapkit::validator::signing::{ReceiptSigner, generate_keypair};
use iapkit::validator::{CrossPlatformValidator, ReceiptValidator, StoreKeys};

#[derive(Parser, Debug)]
#[command(name = "iapkit")]
#[command(about = "In-app purchase integration layer: receipt tooling and store sandbox")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an Ed25519 key pair for signing sandbox receipts
    Keygen,

    /// Validate a receipt envelope with the configured store keys
    Validate {
        /// File containing the unified receipt JSON
        file: String,
    },

    /// Run purchases and a restore against the sandbox store (dev mode only)
    Simulate {
        /// Catalog product IDs to buy, in order
        #[arg(required = true)]
        products: Vec<String>,

        /// Store whose receipt format the sandbox issues
        #[arg(long, default_value = "GooglePlay")]
        store: Store,
    },

    /// Report whether the ledger holds a receipt for a product
    Owned {
        product_id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "iapkit=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }

    let result = match cli.command {
        Command::Keygen => {
            keygen();
            Ok(())
        }
        Command::Validate { file } => validate(&config, &file),
        Command::Simulate { products, store } => simulate(&config, &products, store).await,
        Command::Owned { product_id } => owned(&config, &product_id),
    };

    if let Err(e) = result {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

fn keygen() {
    let (private_key, public_key) = generate_keypair();

    println!("Store signing key pair");
    println!("======================");
    println!("Private key (keep secret): {}", STANDARD.encode(private_key));
    println!("Public key:                {}", public_key);
    println!();
    println!("Set IAP_GOOGLE_PUBLIC_KEY / IAP_APPLE_PUBLIC_KEY to the public key.");
}

fn validate(config: &Config, file: &str) -> Result<()> {
    let raw = std::fs::read_to_string(file)
        .map_err(|e| IapError::Internal(format!("Failed to read {}: {}", file, e)))?;

    let validator = CrossPlatformValidator::new(&config.store_keys, &config.app_identifier)?;
    let receipts = validator.validate(&RawReceiptEnvelope::new(raw))?;

    println!("{}", serde_json::to_string_pretty(&receipts)?);
    Ok(())
}

async fn simulate(config: &Config, products: &[String], store: Store) -> Result<()> {
    if !config.dev_mode {
        return Err(IapError::Internal(
            "simulate is only available in dev mode (set IAP_ENV=dev)".into(),
        ));
    }

    let catalog = Catalog::load_path(&config.catalog_path)?;
    let ledger = Arc::new(SqliteLedger::open(&config.ledger_path)?);

    let (events_tx, events_rx) = event_channel();
    let gateway = Arc::new(SandboxGateway::new(
        events_tx,
        ReceiptSigner::generate(),
        store,
        &config.app_identifier,
    ));

    // The sandbox signs with a fresh key, so trust it for both stores.
    let sandbox_key = gateway.public_key_base64();
    let validator = CrossPlatformValidator::new(
        &StoreKeys {
            google: Some(sandbox_key.clone()),
            apple: Some(sandbox_key),
        },
        &config.app_identifier,
    )?;

    let orchestrator = PurchaseOrchestrator::new(
        catalog,
        Collaborators {
            gateway: gateway.clone(),
            validator: Arc::new(validator),
            ledger,
            rewards: Arc::new(TracingRewardSink),
            signals: Arc::new(TracingSignals),
        },
    )
    .with_gateway_timeout(config.gateway_timeout);

    let (handle, task) = OrchestratorService::spawn(orchestrator, events_rx);

    handle.initialize().await?;
    tracing::info!("Store state: {}", handle.state().await?.as_ref());

    for product_id in products {
        match handle.purchase(product_id).await {
            Ok(token) => tracing::info!("Purchase of {} submitted ({})", product_id, token),
            Err(e) => tracing::warn!("Purchase of {} rejected: {}", product_id, e),
        }
        let price = handle.price_label(product_id).await?;
        let owned = handle.already_purchased(product_id).await?;
        println!(
            "{}: price {}, owned {}",
            product_id,
            price.as_deref().unwrap_or("n/a"),
            owned
        );
    }

    if let Err(e) = handle.restore().await {
        tracing::warn!("Restore rejected: {}", e);
    }
    // Round-trip so the restore's events are handled before shutdown.
    handle.state().await?;

    handle.shutdown().await?;
    task.await
        .map_err(|e| IapError::Internal(format!("Orchestrator task failed: {}", e)))?;

    println!(
        "Acknowledged transactions: {}",
        gateway.finished_transactions().join(", ")
    );
    Ok(())
}

fn owned(config: &Config, product_id: &str) -> Result<()> {
    let catalog = Catalog::load_path(&config.catalog_path)?;
    let Some(product) = catalog.lookup_by_product_id(product_id) else {
        println!("{}: unknown product", product_id);
        return Ok(());
    };

    let ledger = SqliteLedger::open(&config.ledger_path)?;
    println!("{}: owned {}", product_id, owns_product(&ledger, product)?);
    Ok(())
}
