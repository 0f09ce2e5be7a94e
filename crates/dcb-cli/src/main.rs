mod cmd_append;
mod cmd_delete_store;
mod cmd_init;
mod cmd_read;
mod parse;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "dcb", version, about = "File-backed DCB event store")]
struct Cli {
    /// Absolute root directory holding one or more stores
    #[arg(long, global = true)]
    root: std::path::PathBuf,
    /// Store name under `--root`
    #[arg(long, global = true)]
    store: String,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the store's on-disk layout (idempotent)
    Store {
        #[command(subcommand)]
        cmd: StoreCmd,
    },
    /// Append one event
    Append {
        /// Event type
        #[arg(long = "type")]
        event_type: String,
        /// Tag in `key=value` form (repeatable); `key` alone means an absent value
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// JSON payload value
        #[arg(long)]
        payload: String,
        /// Payload type discriminator
        #[arg(long = "payload-type", default_value = "event.v1")]
        payload_type: String,
        /// Fail the append if any event of this type already exists
        #[arg(long = "if-none-match-type")]
        if_none_match_type: Option<String>,
        /// Bound the append-condition query to positions after this one
        #[arg(long)]
        after: Option<u64>,
    },
    /// Read matching events as JSON lines
    Read {
        /// Restrict to these event types (repeatable; OR'd together)
        #[arg(long = "type")]
        event_types: Vec<String>,
        /// Restrict to events carrying all of these tags (repeatable; `key=value`)
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Reverse the result order
        #[arg(long)]
        desc: bool,
        /// Only return positions greater than this one
        #[arg(long)]
        from: Option<u64>,
    },
    /// Delete the store's directory tree
    DeleteStore,
}

#[derive(Subcommand)]
enum StoreCmd {
    /// Create the store layout if absent
    Init,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = dcb_core::config::EngineConfig::builder()
        .root_path(&cli.root)
        .store_name(&cli.store)
        .build()?;
    let engine = dcb_engine::Engine::new(config);
    let cancel = tokio_util::sync::CancellationToken::new();

    match cli.cmd {
        Command::Store { cmd: StoreCmd::Init } => cmd_init::execute(&engine).await,
        Command::Append {
            event_type,
            tags,
            payload,
            payload_type,
            if_none_match_type,
            after,
        } => {
            cmd_append::execute(
                &engine,
                &event_type,
                &tags,
                &payload,
                &payload_type,
                if_none_match_type.as_deref(),
                after,
                &cancel,
            )
            .await
        }
        Command::Read {
            event_types,
            tags,
            desc,
            from,
        } => cmd_read::execute(&engine, &event_types, &tags, desc, from, &cancel).await,
        Command::DeleteStore => cmd_delete_store::execute(&engine, &cancel).await,
    }
}
