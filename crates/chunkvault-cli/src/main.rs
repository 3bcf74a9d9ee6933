//! Chunkvault CLI: operator tool for chunked uploads.
//!
//! Reads DATABASE_URL, STORAGE_BACKEND and LOCAL_STORAGE_PATH (see `Config`).
//! Every command acts on behalf of the owner given by --owner or CHUNKVAULT_OWNER_ID.

use anyhow::Context;
use chrono::{DateTime, Utc};
use chunkvault_cli::{format_size, init_tracing, plan_chunks};
use chunkvault_core::models::{CreateFileRequest, FileFilter, UpdateFileRequest};
use chunkvault_core::{Config, FileStatus};
use chunkvault_db::{connect, run_migrations, PgFileRepository, PgUploadRepository};
use chunkvault_services::{create_storage, FileService};
use chunkvault_storage::traits::ByteReader;
use clap::{Parser, Subcommand};
use futures::{StreamExt, TryStreamExt};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "chunkvault", about = "Chunked upload engine CLI")]
struct Cli {
    /// Owner on whose behalf commands run
    #[arg(long, env = "CHUNKVAULT_OWNER_ID", global = true)]
    owner: Option<Uuid>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,
    /// Declare a new file with a fixed number of chunks
    Create {
        /// File name, unique per owner
        #[arg(long)]
        name: String,
        /// Number of chunks the file will be sent in
        #[arg(long)]
        chunks: i32,
        #[arg(long)]
        checksum: Option<String>,
        /// RFC 3339 timestamp; defaults to now
        #[arg(long)]
        create_datetime: Option<DateTime<Utc>>,
    },
    /// Upload one chunk from a local file
    PutChunk {
        file_id: Uuid,
        chunk_number: i32,
        /// Path to the chunk payload
        path: PathBuf,
    },
    /// Split a local file into chunks and upload them concurrently
    Upload {
        path: PathBuf,
        /// Name to store the file under; defaults to the local file name
        #[arg(long)]
        name: Option<String>,
        /// Chunk size in MiB
        #[arg(long, default_value = "8")]
        chunk_size_mb: u64,
        /// Chunks in flight at once
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },
    /// Show a file with its per-chunk status
    Status { file_id: Uuid },
    /// List files
    List {
        /// Case-insensitive name substring
        #[arg(long)]
        name: Option<String>,
        /// in_progress, completed or failed
        #[arg(long, value_parser = parse_status)]
        status: Option<FileStatus>,
        #[arg(long, default_value = "50")]
        limit: i64,
        #[arg(long, default_value = "0")]
        offset: i64,
        /// Print a table instead of JSON
        #[arg(long)]
        table: bool,
    },
    /// Edit metadata of a file that is not completed
    Update {
        file_id: Uuid,
        #[arg(long)]
        name: Option<String>,
        /// An empty value clears the checksum
        #[arg(long)]
        checksum: Option<String>,
        #[arg(long)]
        create_datetime: Option<DateTime<Utc>>,
    },
    /// Re-run reassembly of a file whose chunks are all uploaded
    Retry { file_id: Uuid },
    /// Write the assembled content of a completed file
    Download { file_id: Uuid, output: PathBuf },
    /// Delete a file with all of its chunks
    Delete { file_id: Uuid },
}

fn parse_status(value: &str) -> Result<FileStatus, String> {
    value.parse().map_err(|e: anyhow::Error| e.to_string())
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let out = serde_json::to_string_pretty(value).context("Serialize response")?;
    println!("{}", out);
    Ok(())
}

async fn build_service(config: &Config) -> anyhow::Result<FileService> {
    let pool = connect(config).await?;
    let storage = create_storage(config)
        .await
        .context("Failed to initialize blob storage")?;

    Ok(FileService::new(
        Arc::new(PgFileRepository::new(pool.clone())),
        Arc::new(PgUploadRepository::new(pool)),
        storage,
        config.upload_limits().clone(),
    ))
}

async fn open_range(path: &Path, offset: u64, len: u64) -> anyhow::Result<ByteReader> {
    let mut file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.seek(std::io::SeekFrom::Start(offset)).await?;
    Ok(Box::pin(file.take(len)))
}

async fn upload_file(
    service: &FileService,
    owner: Uuid,
    path: &Path,
    name: Option<String>,
    chunk_size_mb: u64,
    concurrency: usize,
) -> anyhow::Result<()> {
    let file_len = tokio::fs::metadata(path)
        .await
        .with_context(|| format!("Failed to stat {}", path.display()))?
        .len();
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("Path has no file name; pass --name")?,
    };
    let spans = plan_chunks(file_len, chunk_size_mb.saturating_mul(1024 * 1024));

    let details = service
        .create_file(
            owner,
            CreateFileRequest {
                name,
                expected_chunk_count: spans.len() as i32,
                checksum: None,
                create_datetime: None,
            },
        )
        .await?;
    let file_id = details.file.id;
    tracing::info!(file_id = %file_id, chunks = spans.len(), "Uploading file");

    let outcomes: Vec<_> = futures::stream::iter(spans)
        .map(|span| async move {
            let payload = open_range(path, span.offset, span.len).await?;
            let outcome = service
                .upload_chunk(owner, file_id, span.chunk_number, payload)
                .await?;
            Ok::<_, anyhow::Error>(outcome)
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await?;

    let completed = outcomes.iter().any(|o| o.file_status.is_completed());
    tracing::info!(file_id = %file_id, completed, "Upload finished");

    print_json(&service.get_file(owner, file_id).await?)
}

async fn download_file(
    service: &FileService,
    owner: Uuid,
    file_id: Uuid,
    output: &Path,
) -> anyhow::Result<()> {
    let (file, mut stream) = service.open_file(owner, file_id).await?;
    let mut out = tokio::fs::File::create(output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let mut written = 0u64;
    while let Some(piece) = stream.try_next().await? {
        out.write_all(&piece).await?;
        written += piece.len() as u64;
    }
    out.flush().await?;

    print_json(&serde_json::json!({
        "file_id": file.id,
        "name": file.name,
        "output": output.display().to_string(),
        "size_bytes": written,
    }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    if let Commands::Migrate = cli.command {
        let pool = connect(&config).await?;
        run_migrations(&pool).await?;
        return print_json(&serde_json::json!({ "success": true }));
    }

    let owner = cli
        .owner
        .context("Owner required. Pass --owner or set CHUNKVAULT_OWNER_ID")?;
    let service = build_service(&config).await?;

    match cli.command {
        Commands::Migrate => {}
        Commands::Create {
            name,
            chunks,
            checksum,
            create_datetime,
        } => {
            let details = service
                .create_file(
                    owner,
                    CreateFileRequest {
                        name,
                        expected_chunk_count: chunks,
                        checksum,
                        create_datetime,
                    },
                )
                .await?;
            print_json(&details)?;
        }
        Commands::PutChunk {
            file_id,
            chunk_number,
            path,
        } => {
            let len = tokio::fs::metadata(&path)
                .await
                .with_context(|| format!("Failed to stat {}", path.display()))?
                .len();
            let payload = open_range(&path, 0, len).await?;
            let outcome = service
                .upload_chunk(owner, file_id, chunk_number, payload)
                .await?;
            print_json(&outcome)?;
        }
        Commands::Upload {
            path,
            name,
            chunk_size_mb,
            concurrency,
        } => {
            upload_file(&service, owner, &path, name, chunk_size_mb, concurrency).await?;
        }
        Commands::Status { file_id } => {
            print_json(&service.get_file(owner, file_id).await?)?;
        }
        Commands::List {
            name,
            status,
            limit,
            offset,
            table,
        } => {
            let files = service
                .list_files(
                    owner,
                    &FileFilter {
                        name_contains: name,
                        status,
                        limit,
                        offset,
                    },
                )
                .await?;
            if table {
                println!("{:<36}  {:<11}  {:>6}  {:>10}  NAME", "ID", "STATUS", "CHUNKS", "SIZE");
                for file in &files {
                    println!(
                        "{:<36}  {:<11}  {:>6}  {:>10}  {}",
                        file.id,
                        file.status,
                        file.expected_chunk_count,
                        file.size_bytes.map(format_size).unwrap_or_else(|| "-".to_string()),
                        file.name
                    );
                }
            } else {
                print_json(&files)?;
            }
        }
        Commands::Update {
            file_id,
            name,
            checksum,
            create_datetime,
        } => {
            let details = service
                .update_file(
                    owner,
                    file_id,
                    UpdateFileRequest {
                        name,
                        checksum,
                        create_datetime,
                    },
                )
                .await?;
            print_json(&details)?;
        }
        Commands::Retry { file_id } => {
            print_json(&service.retry_reassembly(owner, file_id).await?)?;
        }
        Commands::Download { file_id, output } => {
            download_file(&service, owner, file_id, &output).await?;
        }
        Commands::Delete { file_id } => {
            service.delete_file(owner, file_id).await?;
            print_json(
                &serde_json::json!({ "success": true, "message": format!("File {} deleted", file_id) }),
            )?;
        }
    }

    Ok(())
}
