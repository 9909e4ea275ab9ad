use anyhow::Context;
use backups::BackupDir;
use clap::{
    ArgGroup,
    Parser,
};
use draw_sync::app::{
    App,
    RunState,
    actix_control_api::ActixControlApi,
    document_store::DocumentStore,
    in_memory_document_store::InMemoryDocumentStore,
    init_tracing,
    sled_document_store::{
        DEFAULT_DOCUMENT_KEY,
        SledDocumentStore,
    },
    sync_engine::{
        SyncConfig,
        SyncEngine,
    },
};
use std::{
    fs,
    path::PathBuf,
    time::Duration,
};

#[derive(Parser, Debug)]
#[command(
    version,
    about,
    long_about = None,
    group(
        ArgGroup::new("storage")
            .args(["data_dir", "in_memory"])
            .required(true)
    )
)]
struct Args {
    /// sled directory holding the shared document
    #[arg(long)]
    data_dir: Option<PathBuf>,

    #[arg(long)]
    in_memory: bool,

    #[arg(long, default_value = DEFAULT_DOCUMENT_KEY)]
    document: String,

    #[arg(short, long)]
    port: Option<u16>,

    #[arg(long, default_value_t = 10)]
    watchdog_secs: u64,

    /// write a final backup here on shutdown
    #[arg(long)]
    backup_dir: Option<PathBuf>,

    #[arg(short, long, default_value = "false")]
    tracing: bool,
}

async fn handle_interupt() {
    let res = tokio::signal::ctrl_c().await;
    match res {
        Ok(_) => {
            tracing::info!("Received interrupt, exiting");
        }
        Err(_) => {
            tracing::warn!("Received interrupt error, exiting anyway");
        }
    }
}

async fn serve<Store: DocumentStore>(store: Store, args: &Args) -> anyhow::Result<()> {
    let config = SyncConfig {
        watchdog_interval: Duration::from_secs(args.watchdog_secs),
    };
    let api = ActixControlApi::new(args.port).await?;
    let mut app = App::new(SyncEngine::new(store, config), api);
    if let Some(dir) = &args.backup_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("create backup directory {}", dir.display()))?;
        tracing::info!("Final backup will be written to {}", dir.display());
        app = app.with_backup_dir(BackupDir::new(dir));
    }
    app.start()?;

    tracing::info!("Starting draw sync service");
    loop {
        let interrupt = handle_interupt();
        match app.run(interrupt).await? {
            RunState::Continue => continue,
            RunState::Exit => {
                tracing::info!("Exiting draw sync service");
                return Ok(());
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    if args.tracing {
        init_tracing();
    }
    match &args.data_dir {
        Some(path) => {
            fs::create_dir_all(path)?;
            tracing::info!(
                "Using sled storage directory {} for document {}",
                path.display(),
                args.document
            );
            let store = SledDocumentStore::open(path, &args.document)?;
            serve(store, &args).await
        }
        None => {
            tracing::info!("Using in-memory document {}", args.document);
            serve(InMemoryDocumentStore::new(), &args).await
        }
    }
}
