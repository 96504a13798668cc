use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use inventory_ledger::{
    config::{self, AppConfig},
    db::{self, DbPool},
    events::EventSender,
    services::{
        inventory::{InventoryFilter, InventoryItemDetails, InventoryService, ItemLookup},
        reservation_sweeper::ReservationSweeper,
    },
};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Migrate => handle_migrate(&context).await?,
        Commands::Sweep => handle_sweep(&context, cli.json).await?,
        Commands::ShowItem(args) => handle_show_item(&context, args, cli.json).await?,
        Commands::LowStock(args) => handle_low_stock(&context, args, cli.json).await?,
        Commands::Verify(args) => handle_verify(&context, args).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "ledger-cli", about = "Maintenance commands for the inventory ledger", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Expire overdue pending reservations once
    Sweep,
    /// Print an item with its warehouse locations
    ShowItem(ItemArgs),
    /// List items at or below their reorder point
    LowStock(LowStockArgs),
    /// Check the counter invariants of an item
    Verify(VerifyArgs),
}

#[derive(Args)]
struct ItemArgs {
    #[arg(long, conflicts_with = "sku", help = "Inventory item ID")]
    id: Option<Uuid>,
    #[arg(long, help = "Item SKU")]
    sku: Option<String>,
}

#[derive(Args)]
struct LowStockArgs {
    #[arg(long, help = "Only items stocked in this warehouse")]
    warehouse: Option<Uuid>,
    #[arg(long, default_value_t = 50)]
    limit: u64,
}

#[derive(Args)]
struct VerifyArgs {
    #[arg(long, help = "Inventory item ID")]
    id: Uuid,
}

struct CliContext {
    config: AppConfig,
    db: Arc<DbPool>,
    event_sender: EventSender,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let db_pool = db::establish_connection_from_app_config(&config)
            .await
            .context("failed to connect to database")?;

        let (event_sender, mut event_rx) = EventSender::channel(config.event_channel_capacity);
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                debug!(target: "ledger_cli", event = ?event, "received async event");
            }
        });

        Ok(Self {
            config,
            db: Arc::new(db_pool),
            event_sender,
        })
    }

    fn inventory_service(&self) -> InventoryService {
        InventoryService::new(self.db.clone(), self.event_sender.clone())
    }

    fn sweeper(&self) -> ReservationSweeper {
        ReservationSweeper::from_config(self.db.clone(), self.event_sender.clone(), &self.config)
    }
}

async fn handle_migrate(context: &CliContext) -> Result<()> {
    db::run_migrations(&context.db)
        .await
        .context("failed to run migrations")?;
    println!("Migrations applied");
    Ok(())
}

async fn handle_sweep(context: &CliContext, json: bool) -> Result<()> {
    let report = context
        .sweeper()
        .run_once()
        .await
        .context("reservation sweep failed")?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "Examined {} • expired {} • failed {}",
            report.examined, report.expired, report.failed
        );
    }
    Ok(())
}

async fn handle_show_item(context: &CliContext, args: ItemArgs, json: bool) -> Result<()> {
    let lookup = match (args.id, args.sku) {
        (Some(id), _) => ItemLookup::Id(id),
        (None, Some(sku)) => ItemLookup::Sku(sku),
        (None, None) => bail!("either --id or --sku is required"),
    };

    let details = context
        .inventory_service()
        .get_item(lookup)
        .await
        .context("failed to load inventory item")?;

    if json {
        print_json(&details)?;
    } else {
        render_item(&details);
    }
    Ok(())
}

async fn handle_low_stock(context: &CliContext, args: LowStockArgs, json: bool) -> Result<()> {
    let filter = InventoryFilter {
        warehouse_id: args.warehouse,
        low_stock_only: true,
        ..Default::default()
    };
    let (items, total) = context
        .inventory_service()
        .list_items(&filter, 1, args.limit.max(1))
        .await
        .context("failed to list inventory items")?;

    if json {
        print_json(&items)?;
        return Ok(());
    }

    println!("{} item(s) at or below reorder point", total);
    for item in items {
        println!(
            "- {} • {} • available {} • reorder point {}",
            item.sku, item.status, item.available_quantity, item.reorder_point
        );
    }
    Ok(())
}

async fn handle_verify(context: &CliContext, args: VerifyArgs) -> Result<()> {
    let balanced = context
        .inventory_service()
        .verify_item(args.id)
        .await
        .context("failed to verify inventory item")?;

    if !balanced {
        bail!("inventory item {} has unbalanced counters", args.id);
    }
    println!("Inventory item {} is balanced", args.id);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_item(details: &InventoryItemDetails) {
    let item = &details.item;
    println!(
        "Item {} ({}) • status {}",
        item.sku, item.id, item.status
    );
    println!(
        "  total {} • available {} • reserved {} • reorder point {}",
        item.total_quantity, item.available_quantity, item.reserved_quantity, item.reorder_point
    );
    for location in &details.locations {
        println!(
            "  - warehouse {} • on hand {} • available {} • reserved {}",
            location.warehouse_id,
            location.quantity,
            location.available_quantity,
            location.reserved_quantity
        );
    }
}
