use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::ChronoLocal;

use comprei::models::{Invoice, SpendingTotal};
use comprei::{AppState, Config, ConnectivityMonitor, WriteOutcome, config, spawn_auto_sync};

#[derive(Parser)]
#[command(name = "comprei", version, about = "Offline-first NFC-e receipt cache")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan a receipt from its QR code URL or access key
    Scan { qr: String },
    /// Add an invoice from a JSON file
    Add { file: PathBuf },
    /// List cached invoices
    List,
    /// Show one invoice with its items
    Show { id: String },
    /// Delete an invoice
    Delete { id: String },
    /// Replay the sync queue now
    Sync,
    /// Show connectivity and pending uploads
    Status,
    /// Keep running and sync whenever the server becomes reachable
    Watch,
    /// List categories
    Categories {
        /// Fetch the latest categories from the server first
        #[arg(long)]
        refresh: bool,
    },
    /// Spending per month and per category from the local cache
    Spending,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = config::init()?;

    let app = AppState::new(config).await?;

    run(&app, cli.command).await
}

async fn run(app: &AppState, command: Command) -> Result<()> {
    match command {
        Command::Scan { qr } => {
            let invoice = app.invoices.scan(&qr).await?;
            print_invoice(&invoice);
        }
        Command::Add { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("could not read {}", file.display()))?;
            let draft: Invoice = serde_json::from_str(&content)
                .with_context(|| format!("{} is not a valid invoice", file.display()))?;

            let (invoice, outcome) = app.invoices.create(draft).await?;
            match outcome {
                WriteOutcome::Synced => println!("Invoice {} saved", invoice.id),
                _ => println!("Invoice {} saved locally, it will upload when online", invoice.id),
            }
        }
        Command::List => {
            let invoices = app.invoices.list().await?;
            if invoices.is_empty() {
                println!("No invoices yet");
            }
            for invoice in invoices {
                println!(
                    "{}  {}  {:<32}  R$ {:>9.2}{}",
                    invoice.id,
                    invoice.date.format("%d/%m/%Y"),
                    invoice.establishment_name,
                    invoice.total_value,
                    if invoice.synced { "" } else { "  (pending)" }
                );
            }
        }
        Command::Show { id } => {
            let invoice = app.invoices.get(&id).await?;
            print_invoice(&invoice);
        }
        Command::Delete { id } => match app.invoices.delete(&id).await? {
            WriteOutcome::Synced => println!("Invoice {id} deleted"),
            WriteOutcome::Queued => println!("Invoice {id} deleted locally, the server will follow"),
            WriteOutcome::Discarded => println!("Invoice {id} discarded before upload"),
        },
        Command::Sync => {
            let report = app.sync.drain().await?;
            println!("{report}");
        }
        Command::Status => print_status(app).await?,
        Command::Watch => watch(app).await?,
        Command::Categories { refresh } => {
            for category in app.invoices.categories(refresh).await? {
                println!(
                    "{} {:<24} {}",
                    category.emoji,
                    category.name,
                    category.keywords.join(", ")
                );
            }
        }
        Command::Spending => {
            println!("By month");
            print_totals(&app.db.monthly_spending().await?);
            println!();
            println!("By category");
            print_totals(&app.db.category_spending().await?);
        }
    }

    Ok(())
}

async fn print_status(app: &AppState) -> Result<()> {
    let reachability = app.probe.probe().await;
    println!("Server:   {} ({:?})", app.config.api_url, reachability);
    println!("Unsynced: {} invoice(s)", app.db.unsynced_count().await?);

    let queue = app.db.get_sync_queue().await?;
    println!(
        "Queue:    {} {}",
        queue.len(),
        if queue.len() == 1 { "entry" } else { "entries" }
    );
    for entry in queue {
        println!(
            "  #{:<4} {:<15} {:<8} {}  retries {}{}",
            entry.id,
            entry.operation,
            entry.entity_type,
            entry.entity_id,
            entry.retry_count,
            entry
                .last_error
                .map(|e| format!("  last error: {e}"))
                .unwrap_or_default()
        );
    }

    Ok(())
}

async fn watch(app: &AppState) -> Result<()> {
    let config: &Config = &app.config;

    info!(interval = ?config.connectivity_interval(), "watching connectivity");
    let monitor = ConnectivityMonitor::spawn(app.probe.clone(), config.connectivity_interval());
    let auto_sync = spawn_auto_sync(app.sync.clone(), monitor.subscribe());

    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    auto_sync.abort();
    monitor.stop();

    Ok(())
}

fn print_invoice(invoice: &Invoice) {
    println!("{}", invoice.establishment_name);
    println!("Date:   {}", invoice.date.format("%d/%m/%Y %H:%M"));
    if let Some(key) = &invoice.access_key {
        println!("Key:    {key}");
    }
    println!("Status: {}", if invoice.synced { "synced" } else { "pending upload" });
    println!();
    for item in &invoice.items {
        println!(
            "  {:<36} {:>8.3} {:<3} x {:>8.2} = {:>9.2}",
            item.display_name(),
            item.quantity,
            item.unit,
            item.unit_price,
            item.total_price
        );
    }
    println!("{:>74}", format!("Total R$ {:.2}", invoice.total_value));
}

fn print_totals(totals: &[SpendingTotal]) {
    if totals.is_empty() {
        println!("  nothing yet");
    }
    for total in totals {
        println!("  {:<24} R$ {:>10.2}  ({})", total.label, total.total, total.count);
    }
}
