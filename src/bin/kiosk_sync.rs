use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use kiosk_sync::api::HttpContentApi;
use kiosk_sync::bus::{Signal, SignalBus};
use kiosk_sync::config::ConfigLoader;
use kiosk_sync::domain::{GlobalId, Sku};
use kiosk_sync::error::SyncError;
use kiosk_sync::pipeline::SyncService;
use kiosk_sync::store::Database;
use kiosk_sync::tracker::DownloadTracker;

#[derive(Parser)]
#[command(name = "kiosk-sync")]
#[command(about = "Sync magazine volumes, issues and articles into a local content store")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Fetch an entity tree and cache its assets")]
    Sync(SyncArgs),
    #[command(about = "List issues in the local store")]
    Issues,
    #[command(about = "Delete a volume and everything under it")]
    Remove(RemoveArgs),
}

#[derive(Args)]
struct SyncArgs {
    #[command(subcommand)]
    target: SyncTarget,
}

#[derive(Subcommand)]
enum SyncTarget {
    #[command(about = "Sync a volume with its issues, articles and media")]
    Volume(TargetArgs),
    #[command(about = "Sync a single issue")]
    Issue(TargetArgs),
    #[command(about = "Sync a single article")]
    Article(TargetArgs),
}

#[derive(Args)]
struct RemoveArgs {
    identifier: String,
}

#[derive(Args)]
struct TargetArgs {
    /// Global id of the entity, or its SKU with --sku.
    identifier: String,

    #[arg(long)]
    sku: bool,
}

fn main() -> ExitCode {
    match run() {
        Ok(clean) => {
            if clean {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(3)
            }
        }
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(sync) = report.downcast_ref::<SyncError>() {
                return ExitCode::from(map_exit_code(sync));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &SyncError) -> u8 {
    match error {
        SyncError::MissingConfig | SyncError::NotFound(_) | SyncError::MissingEntity(_) => 2,
        SyncError::Http(_) | SyncError::ApiStatus { .. } | SyncError::DataShape(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<bool> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ConfigLoader::resolve(cli.config.as_deref()).into_diagnostic()?;
    let db = Database::open(config.storage_folder.clone()).into_diagnostic()?;

    match cli.command {
        Commands::Sync(args) => {
            let bus = SignalBus::new();
            let signals = bus.subscribe();
            let tracker = Arc::new(DownloadTracker::new(bus.clone()));
            let api = Arc::new(HttpContentApi::new(&config).into_diagnostic()?);
            let service = SyncService::new(api, db, tracker, bus, config);

            let parent = start_sync(&service, args.target).into_diagnostic()?;

            // Stream signals until the parent's sync settles.
            let mut clean = true;
            for signal in signals.iter() {
                println!(
                    "{}",
                    serde_json::to_string(&signal).into_diagnostic()?
                );
                if let Signal::DownloadComplete { parent_id, outcome } = &signal {
                    if *parent_id == parent {
                        clean = outcome.is_clean();
                        break;
                    }
                }
            }
            Ok(clean)
        }
        Commands::Issues => {
            let repo = kiosk_sync::repository::Repository::new(db);
            for issue in repo.all_issues() {
                println!(
                    "{}",
                    serde_json::to_string(&issue).into_diagnostic()?
                );
            }
            Ok(true)
        }
        Commands::Remove(args) => {
            let volume_id: GlobalId = args.identifier.parse().into_diagnostic()?;
            let repo = kiosk_sync::repository::Repository::new(db);
            if repo.get_volume(&volume_id).is_none() {
                return Err(SyncError::MissingEntity(format!("volume {volume_id}")))
                    .into_diagnostic();
            }
            repo.delete_volume(&volume_id).into_diagnostic()?;
            Ok(true)
        }
    }
}

fn start_sync(service: &SyncService, target: SyncTarget) -> Result<GlobalId, SyncError> {
    match target {
        SyncTarget::Volume(args) => {
            if args.sku {
                let sku: Sku = args.identifier.parse()?;
                service.sync_volume_by_sku(&sku)
            } else {
                let id: GlobalId = args.identifier.parse()?;
                service.sync_volume(&id);
                Ok(id)
            }
        }
        SyncTarget::Issue(args) => {
            if args.sku {
                let sku: Sku = args.identifier.parse()?;
                service.sync_issue_by_sku(&sku)
            } else {
                let id: GlobalId = args.identifier.parse()?;
                service.sync_issue(&id);
                Ok(id)
            }
        }
        SyncTarget::Article(args) => {
            if args.sku {
                let sku: Sku = args.identifier.parse()?;
                service.sync_article_by_sku(&sku)
            } else {
                let id: GlobalId = args.identifier.parse()?;
                service.sync_article(&id);
                Ok(id)
            }
        }
    }
}
