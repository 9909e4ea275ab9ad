mod control_client;
mod draw;

use backups::BackupDir;
use chrono::{
    DateTime,
    Utc,
};
use clap::Parser;
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use draw_sync::{
    app::control_api::StatusReport,
    backup,
    state::HistoryEntry,
};
use std::{
    fs,
    path::PathBuf,
};
use url::Url;

use crate::control_client::ControlClient;

const DEFAULT_CONTROL_URL: &str = "http://127.0.0.1:8080/";

#[derive(Parser, Debug)]
#[command(
    name = "draw-cli",
    about = "Operate a running draw-sync service (status, history, backups, draws)",
    version
)]
struct Args {
    /// Base URL of the draw-sync control API
    #[arg(long, default_value = DEFAULT_CONTROL_URL)]
    url: Url,

    /// Which action to perform (defaults to status)
    #[arg(short, long, value_enum, default_value = "status")]
    action: Action,

    /// Backup file to write (export) or read (import)
    #[arg(long)]
    file: Option<PathBuf>,

    /// Directory of timestamped backups, used when --file is not given
    #[arg(long, default_value = ".")]
    backup_dir: PathBuf,

    /// Prize id to draw for (draw only)
    #[arg(long)]
    prize: Option<String>,

    /// Participant id to award; repeat for a batch. Omit to pick at random
    #[arg(long)]
    participant: Vec<String>,

    /// Number of random winners when no --participant is given
    #[arg(long, default_value_t = 1)]
    count: usize,

    /// Confirm destructive actions (import, clear-history)
    #[arg(long)]
    yes: bool,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum Action {
    Status,
    History,
    Export,
    Import,
    ClearHistory,
    Draw,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let client = ControlClient::new(args.url.clone())?;

    match args.action {
        Action::Status => {
            let report = client.status().await?;
            print_status(&report);
        }
        Action::History => {
            let history = client.history().await?;
            print_history(&history);
        }
        Action::Export => {
            let document = client.export_backup().await?;
            let path = match &args.file {
                Some(path) => {
                    fs::write(path, &document)
                        .wrap_err_with(|| format!("writing backup to {}", path.display()))?;
                    path.clone()
                }
                None => BackupDir::new(&args.backup_dir)
                    .save(&document, Utc::now())
                    .map_err(|e| eyre!(e))?,
            };
            println!("Backup written to {}", path.display());
        }
        Action::Import => {
            let path = match &args.file {
                Some(path) => path.clone(),
                None => {
                    BackupDir::new(&args.backup_dir)
                        .latest()
                        .map_err(|e| eyre!(e))?
                        .ok_or_else(|| {
                            eyre!("no backups found in {}", args.backup_dir.display())
                        })?
                        .path
                }
            };
            let document = fs::read_to_string(&path)
                .wrap_err_with(|| format!("reading backup {}", path.display()))?;
            let state = backup::decode_for_import(&document)
                .wrap_err_with(|| format!("{} cannot be imported", path.display()))?;
            println!(
                "Importing {} ({} participants, {} prizes, {} winners)",
                path.display(),
                state.participants.len(),
                state.prizes.len(),
                state.winners.len()
            );
            client.import_backup(document, args.yes).await?;
            println!("Remote document replaced");
        }
        Action::ClearHistory => {
            client.clear_history(args.yes).await?;
            println!("Draw history cleared");
        }
        Action::Draw => {
            let prize_id = args
                .prize
                .as_deref()
                .ok_or_else(|| eyre!("--prize <id> is required for draw action"))?;
            let model = client
                .status()
                .await?
                .model
                .ok_or_else(|| eyre!("the service has not loaded the document yet"))?;
            let state = model.into_state();
            let timestamp = Utc::now().timestamp_millis();
            let batch = if args.participant.is_empty() {
                draw::random_batch(
                    &state,
                    prize_id,
                    args.count,
                    timestamp,
                    &mut rand::rng(),
                )?
            } else {
                draw::named_batch(&state, prize_id, &args.participant, timestamp)?
            };
            client.draw(&batch).await?;
            for winner in &batch {
                let name = state
                    .participant(&winner.participant_id)
                    .map(|p| p.name.as_str())
                    .unwrap_or(winner.participant_id.as_str());
                println!("{name} wins prize {prize_id}");
            }
        }
    }
    Ok(())
}

fn print_status(report: &StatusReport) {
    println!("Connection: {:?}", report.connection);
    let Some(model) = &report.model else {
        println!("Document not loaded yet");
        return;
    };
    println!(
        "{} / {}",
        model.site_config.brand_name, model.site_config.event_name
    );
    println!(
        "Participants: {} ({} still in the pool)",
        model.participants.len(),
        model.available_pool_count
    );
    println!("Prizes:");
    for prize in &model.prizes {
        println!(
            "  [{}] {} {}: {}/{} drawn",
            prize.id, prize.image, prize.name, prize.drawn_count, prize.count
        );
    }
    println!("Winners: {}", model.winners.len());
}

fn print_history(history: &[HistoryEntry]) {
    if history.is_empty() {
        println!("No winners yet");
        return;
    }
    for entry in history {
        let when = DateTime::<Utc>::from_timestamp_millis(entry.timestamp)
            .map(|at| at.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| entry.timestamp.to_string());
        println!(
            "{when}  {:<20} {:<10} {:<12} {}",
            entry.participant_name, entry.participant_code, entry.department, entry.prize_name
        );
    }
}
