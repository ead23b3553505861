//! picsort-faces - photo ingestion and face identity command line
//!
//! Runs the face pipeline against the configured SQLite database, Amazon
//! Rekognition and Amazon S3. Results are printed as JSON.

use anyhow::{Context, Result};
use aws_config::meta::region::RegionProviderChain;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Region;
use clap::{Parser, Subcommand};
use picsort_common::config::{load_config, TomlConfig};
use picsort_faces::clients::{RekognitionOracle, S3ObjectStore};
use picsort_faces::services::{
    BatchCoordinator, EventCleanup, FaceMatcher, PersonGallery, UploadPresigner, UploadRequest,
};
use picsort_faces::{AppContext, FaceSettings};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "picsort-faces", version, about = "Event photo ingestion and face identity resolution")]
struct Cli {
    /// Config file (defaults to $PICSORT_CONFIG, then the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an event to upload photos into
    CreateEvent { name: String },
    /// Presign upload URLs; each upload is FILENAME:CONTENT_TYPE
    PresignUpload {
        #[arg(long)]
        event: Uuid,
        #[arg(required = true)]
        uploads: Vec<String>,
    },
    /// Ingest uploaded photos and resolve the faces in them
    Ingest {
        #[arg(long)]
        event: Uuid,
        #[arg(long)]
        uploader: Uuid,
        #[arg(required = true)]
        storage_keys: Vec<String>,
    },
    /// Identify the person in a single-face reference image
    FindFace {
        #[arg(long)]
        event: Uuid,
        reference_key: String,
    },
    /// List the persons of an event
    People {
        #[arg(long)]
        event: Uuid,
    },
    /// Download links for every photo of a person
    Gallery { person: Uuid },
    /// Download links for every photo of an event
    EventPhotos { event: Uuid },
    /// Rename a person
    RenamePerson { person: Uuid, name: String },
    /// Delete one photo
    DeletePhoto { photo: Uuid },
    /// Delete an event and everything in it
    DeleteEvent { event: Uuid },
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(config: &TomlConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn parse_upload(arg: &str) -> Result<UploadRequest> {
    let (filename, content_type) = arg
        .rsplit_once(':')
        .with_context(|| format!("expected FILENAME:CONTENT_TYPE, got '{}'", arg))?;
    Ok(UploadRequest {
        filename: filename.to_string(),
        content_type: content_type.to_string(),
    })
}

async fn build_context(config: &TomlConfig) -> Result<AppContext> {
    let db_path = config.database_path();
    info!("Database: {}", db_path.display());
    let db = picsort_common::db::init_database(&db_path).await?;

    let region = RegionProviderChain::first_try(config.storage.region.clone().map(Region::new)).or_default_provider();
    let sdk_config = aws_config::defaults(BehaviorVersion::latest()).region(region).load().await;

    Ok(AppContext::new(
        db,
        Arc::new(RekognitionOracle::from_sdk_config(&sdk_config)),
        Arc::new(S3ObjectStore::from_sdk_config(&sdk_config)),
        FaceSettings::resolve(config),
    ))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config);

    info!("Starting picsort-faces {}", env!("CARGO_PKG_VERSION"));

    let ctx = build_context(&config).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupt received, cancelling");
            on_interrupt.cancel();
        }
    });

    match cli.command {
        Command::CreateEvent { name } => {
            let mut conn = ctx.db.acquire().await?;
            let event = picsort_faces::db::events::create_event(&mut conn, &name).await?;
            print_json(&serde_json::json!({ "event_id": event.guid, "name": event.name }))?;
        }
        Command::PresignUpload { event, uploads } => {
            let requests = uploads.iter().map(|s| parse_upload(s)).collect::<Result<Vec<_>>>()?;
            let presigned = UploadPresigner::new(ctx).presign_uploads(event, &requests, &cancel).await?;
            print_json(&presigned)?;
        }
        Command::Ingest {
            event,
            uploader,
            storage_keys,
        } => {
            let photo_ids = BatchCoordinator::new(ctx)
                .ingest_batch(&storage_keys, uploader, event, &cancel)
                .await?;
            print_json(&photo_ids)?;
        }
        Command::FindFace { event, reference_key } => {
            let outcome = FaceMatcher::new(ctx).find_person(&reference_key, event, &cancel).await?;
            print_json(&outcome)?;
        }
        Command::People { event } => {
            let people = PersonGallery::new(ctx).list_people(event).await?;
            let listing: Vec<_> = people
                .iter()
                .map(|p| {
                    serde_json::json!({
                        "person_id": p.person.guid,
                        "name": p.person.name,
                        "cover_photo_id": p.cover_photo_id,
                        "cover_storage_key": p.cover_storage_key,
                    })
                })
                .collect();
            print_json(&listing)?;
        }
        Command::Gallery { person } => {
            let links = PersonGallery::new(ctx).photo_links(person, &cancel).await?;
            print_json(&links)?;
        }
        Command::EventPhotos { event } => {
            let links = PersonGallery::new(ctx).event_photo_links(event, &cancel).await?;
            print_json(&links)?;
        }
        Command::RenamePerson { person, name } => {
            let renamed = PersonGallery::new(ctx).rename(person, &name).await?;
            print_json(&serde_json::json!({ "person_id": renamed.guid, "name": renamed.name }))?;
        }
        Command::DeletePhoto { photo } => {
            EventCleanup::new(ctx).delete_photo(photo, &cancel).await?;
            print_json(&serde_json::json!({ "deleted": photo }))?;
        }
        Command::DeleteEvent { event } => {
            let deletion = EventCleanup::new(ctx).delete_event(event, &cancel).await?;
            print_json(&deletion)?;
        }
    }

    Ok(())
}
