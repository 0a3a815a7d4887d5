use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use firebase_rest::{FirebaseRestBackend, InMemoryBackend};
use serde::Serialize;
use shared::domain::{ImageBlob, NewUpload, UploadId};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use upload_store::{
    AuthService, Datastore, ObjectStorage, StoreEvent, StoreOptions, UploadStore,
};

mod config;

use config::load_settings;

#[derive(Parser, Debug)]
#[command(about = "Browse and create file uploads on a Firebase-style backend")]
struct Args {
    #[arg(long, default_value = "uploads.toml")]
    config: PathBuf,
    /// Run against an in-process backend; nothing outlives the command.
    #[arg(long)]
    memory: bool,
    /// Sign in with this email before running the command.
    #[arg(long, requires = "login_password", conflicts_with = "uid")]
    login: Option<String>,
    #[arg(long, requires = "login")]
    login_password: Option<String>,
    /// Restore a session for a uid the auth provider already issued.
    #[arg(long)]
    uid: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every upload in the collection.
    List,
    /// Show the featured (first few) uploads.
    Featured,
    Show {
        id: String,
    },
    /// Create an upload from a local file.
    Upload {
        #[arg(long = "type")]
        kind: String,
        #[arg(long, default_value = "")]
        description: String,
        /// RFC 3339 timestamp; defaults to now.
        #[arg(long)]
        date: Option<DateTime<Utc>>,
        file: PathBuf,
    },
    SignUp {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    SignIn {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    SignOut,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
    let args = Args::parse();

    let settings = load_settings(&args.config);
    let store = if args.memory {
        info!("console: using in-memory backend");
        build_store(Arc::new(InMemoryBackend::new()), settings.store_options())
    } else {
        info!(
            "console: using database={} bucket={}",
            settings.database_url, settings.storage_bucket
        );
        build_store(
            Arc::new(FirebaseRestBackend::new(settings.firebase_config())),
            settings.store_options(),
        )
    };
    spawn_event_logger(&store);
    debug!(
        "console: collection={} storage_path_policy={:?}",
        store.options().uploads_collection,
        store.options().storage_path_policy
    );

    if let Some(uid) = args.uid {
        store.auto_sign_in(uid).await;
    }
    if let (Some(email), Some(password)) = (&args.login, &args.login_password) {
        store.sign_in(email, password).await?;
    }

    match args.command {
        Command::List => {
            store.list_uploads().await?;
            print_json(&store.all_uploads().await)
        }
        Command::Featured => {
            store.list_uploads().await?;
            print_json(&store.featured_uploads().await)
        }
        Command::Show { id } => {
            store.list_uploads().await?;
            let upload = store
                .upload_by_id(&UploadId(id.clone()))
                .await
                .ok_or_else(|| anyhow!("no upload with id {id}"))?;
            print_json(&upload)
        }
        Command::Upload {
            kind,
            description,
            date,
            file,
        } => {
            let image = read_image(&file).await?;
            let record = store
                .create_upload(NewUpload {
                    kind,
                    description,
                    date: date.unwrap_or_else(Utc::now),
                    image,
                })
                .await?;
            print_json(&record)
        }
        Command::SignUp { email, password } => {
            let user = store.sign_up(&email, &password).await?;
            print_json(&user)
        }
        Command::SignIn { email, password } => {
            let user = store.sign_in(&email, &password).await?;
            print_json(&user)
        }
        Command::SignOut => {
            store.logout().await;
            print_json(&store.current_user().await)
        }
    }
}

fn build_store<B>(backend: Arc<B>, options: StoreOptions) -> Arc<UploadStore>
where
    B: Datastore + ObjectStorage + AuthService + 'static,
{
    UploadStore::new_with_options(backend.clone(), backend.clone(), backend, options)
}

fn spawn_event_logger(store: &UploadStore) {
    let mut events = store.subscribe_events();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(StoreEvent::Committed(kind)) => debug!("store: committed {kind:?}"),
                Err(RecvError::Lagged(skipped)) => debug!("store: event logger skipped={skipped}"),
                Err(RecvError::Closed) => break,
            }
        }
    });
}

async fn read_image(path: &Path) -> Result<ImageBlob> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("{} has no usable file name", path.display()))?
        .to_string();

    let blob = ImageBlob::new(name, bytes);
    Ok(match mime_guess::from_path(path).first() {
        Some(mime) => blob.with_content_type(mime.essence_str()),
        None => blob,
    })
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
