//! stockledger CLI
//!
//! Operates directly on a data directory and prints results as JSON.

use clap::{Args as ClapArgs, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use tracing_subscriber::{fmt, EnvFilter};

use stockledger::{Config, Store, TransactionRecord, TransactionType};

/// stockledger
#[derive(Parser, Debug)]
#[command(name = "stockledger")]
#[command(about = "Append-only inventory transaction ledger")]
#[command(version)]
struct Args {
    /// Data directory
    #[arg(short, long, global = true, default_value = "./stockledger_data")]
    data_dir: String,

    /// Seal the active WAL once it grows past this many MB
    #[arg(long, global = true, default_value = "16")]
    wal_rotation_mb: u64,

    /// Take a snapshot once this many MB of WAL have accumulated
    #[arg(long, global = true, default_value = "100")]
    snapshot_threshold_mb: u64,

    /// Skip the snapshot normally taken on exit
    #[arg(long, global = true)]
    no_final_snapshot: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ClapArgs, Debug)]
struct PartitionArg {
    /// Partition (tenant) id
    #[arg(short, long)]
    partition: String,
}

#[derive(ClapArgs, Debug)]
struct TimeRange {
    /// Inclusive lower bound (ISO-8601)
    #[arg(long)]
    from: Option<String>,

    /// Inclusive upper bound (ISO-8601)
    #[arg(long)]
    to: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Append one stock movement
    Append {
        #[command(flatten)]
        partition: PartitionArg,

        /// Item id
        #[arg(long)]
        item: String,

        /// Movement direction: in or out
        #[arg(long = "type")]
        kind: TransactionType,

        #[arg(long)]
        quantity: i64,

        #[arg(long, default_value = "0")]
        price: f64,

        /// Transaction id (generated when omitted)
        #[arg(long)]
        trans_id: Option<String>,

        #[arg(long, default_value = "")]
        item_name: String,

        #[arg(long, default_value = "")]
        category: String,

        #[arg(long, default_value = "")]
        model: String,

        #[arg(long, default_value = "")]
        unit: String,

        #[arg(long, default_value = "")]
        partner_id: String,

        #[arg(long, default_value = "")]
        partner_name: String,

        #[arg(long, default_value = "")]
        warehouse: String,

        #[arg(long)]
        document: Option<String>,

        /// ISO-8601 timestamp (now when omitted)
        #[arg(long)]
        timestamp: Option<String>,

        #[arg(long, default_value = "")]
        note: String,
    },

    /// List transactions, optionally filtered
    List {
        #[command(flatten)]
        partition: PartitionArg,

        #[arg(long)]
        item: Option<String>,

        #[arg(long)]
        document: Option<String>,

        #[arg(long)]
        partner: Option<String>,

        #[command(flatten)]
        range: TimeRange,
    },

    /// Stock per warehouse and item
    Inventory {
        #[command(flatten)]
        partition: PartitionArg,
    },

    /// Items currently in stock
    Items {
        #[command(flatten)]
        partition: PartitionArg,
    },

    /// Document summaries
    Documents {
        #[command(flatten)]
        partition: PartitionArg,
    },

    /// Item count, in/out totals and stock by category
    Stats {
        #[command(flatten)]
        partition: PartitionArg,

        #[command(flatten)]
        range: TimeRange,
    },

    /// Take a snapshot now
    Snapshot,

    /// Store status and on-disk footprint
    Status,

    /// Load two sample movements
    Demo {
        #[arg(short, long, default_value = "manager001")]
        partition: String,
    },
}

fn main() {
    // Logs go to stderr so stdout stays valid JSON
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,stockledger=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    tracing::debug!("stockledger v{}", stockledger::VERSION);
    tracing::debug!("Data directory: {}", args.data_dir);

    let config = Config::builder()
        .data_dir(&args.data_dir)
        .wal_rotation_bytes(args.wal_rotation_mb * 1024 * 1024)
        .snapshot_threshold_bytes(args.snapshot_threshold_mb * 1024 * 1024)
        .snapshot_on_shutdown(!args.no_final_snapshot)
        .build();

    let store = match Store::open(config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            std::process::exit(1);
        }
    };

    let outcome = run(&store, args.command);

    if let Err(e) = store.close() {
        tracing::error!("Failed to close store: {}", e);
        std::process::exit(1);
    }
    if let Err(e) = outcome {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(store: &Store, command: Commands) -> stockledger::Result<()> {
    match command {
        Commands::Append {
            partition,
            item,
            kind,
            quantity,
            price,
            trans_id,
            item_name,
            category,
            model,
            unit,
            partner_id,
            partner_name,
            warehouse,
            document,
            timestamp,
            note,
        } => {
            let trans_id = trans_id.unwrap_or_else(|| store.generate_transaction_id());
            let mut record = TransactionRecord::new(trans_id.as_str(), item, kind, quantity, price)
                .with_item_name(item_name)
                .with_attributes(category, model, unit)
                .with_partner(partner_id, partner_name)
                .with_warehouse(warehouse)
                .with_note(note);
            if let Some(document) = document {
                record = record.with_document(document);
            }
            if let Some(timestamp) = timestamp {
                record = record.with_timestamp(timestamp);
            }

            let position = store.append_transaction(&partition.partition, record)?;
            print_json(&json!({ "trans_id": trans_id, "position": position }));
        }

        Commands::List {
            partition,
            item,
            document,
            partner,
            range,
        } => {
            let p = partition.partition.as_str();
            let mut records = match (item, document, partner) {
                (Some(item), _, _) => store.get_transactions_by_item(p, &item),
                (None, Some(document), _) => store.get_transactions_by_document(p, &document),
                (None, None, Some(partner)) => store.get_transactions_by_partner(p, &partner),
                (None, None, None) => store.get_transactions(p),
            };
            if range.from.is_some() || range.to.is_some() {
                let (from, to) = range.bounds();
                records.retain(|r| stockledger::views::is_time_in_range(&r.timestamp, from, to));
            }
            print_json(&records);
        }

        Commands::Inventory { partition } => {
            print_json(&store.calculate_inventory(&partition.partition));
        }

        Commands::Items { partition } => {
            print_json(&store.get_current_items(&partition.partition));
        }

        Commands::Documents { partition } => {
            print_json(&store.get_documents(&partition.partition));
        }

        Commands::Stats { partition, range } => {
            let p = partition.partition.as_str();
            let (from, to) = range.bounds();
            print_json(&json!({
                "partition_id": p,
                "transactions": store.get_transaction_count(p),
                "item_types": store.get_item_type_count(p),
                "in_out": store.get_in_out_summary(p, from, to),
                "inventory_by_category": store.get_inventory_by_category(p),
            }));
        }

        Commands::Snapshot => {
            print_json(&store.create_snapshot()?);
        }

        Commands::Status => {
            print_json(&json!({
                "version": stockledger::VERSION,
                "status": store.status(),
                "storage": store.storage_info()?,
                "recovery": store.recovery_report(),
                "partitions": store.partition_ids(),
            }));
        }

        Commands::Demo { partition } => {
            let mut writer = store.writer(&partition)?;
            let demo = [
                TransactionRecord::new(
                    store.generate_transaction_id(),
                    "ITEM001",
                    TransactionType::In,
                    100,
                    25.50,
                )
                .with_item_name("Test item A")
                .with_attributes("Electronics", "Model A1", "pcs")
                .with_partner("SUPPLIER001", "Supplier A")
                .with_warehouse("WH001")
                .with_document("DOC20240115001")
                .with_timestamp("2024-01-15T10:30:00")
                .with_note("First inbound batch"),
                TransactionRecord::new(
                    store.generate_transaction_id(),
                    "ITEM002",
                    TransactionType::In,
                    50,
                    12.80,
                )
                .with_item_name("Test item B")
                .with_attributes("Office supplies", "Model B2", "box")
                .with_partner("SUPPLIER002", "Supplier B")
                .with_warehouse("WH001")
                .with_document("DOC20240115002")
                .with_timestamp("2024-01-15T11:00:00")
                .with_note("Office supplies restock"),
            ];

            let mut positions = Vec::with_capacity(demo.len());
            for record in demo {
                positions.push(writer.append(record)?);
            }
            tracing::info!(partition = %partition, "demo data added");
            print_json(&json!({ "partition_id": partition, "positions": positions }));
        }
    }

    Ok(())
}

impl TimeRange {
    /// Open ends become the widest possible bounds
    fn bounds(&self) -> (&str, &str) {
        (
            self.from.as_deref().unwrap_or(""),
            self.to.as_deref().unwrap_or("\u{10FFFF}"),
        )
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => tracing::error!("Failed to serialize output: {}", e),
    }
}
