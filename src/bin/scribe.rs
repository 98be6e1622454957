//! scribe CLI — operator interface to the transcription pipeline.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use scribe_rs::config::Config;
use scribe_rs::db::{Db, PgObjectStore, PgStatusStore, PgmqQueue};
use scribe_rs::model::JobId;
use scribe_rs::pipeline::{Intake, Submitted, Worker, WorkerConfig};
use scribe_rs::queue::WorkQueue;
use scribe_rs::status::StatusStore;
use scribe_rs::store::ObjectStore;
use scribe_rs::stt::{TranscriptionEngine, WhisperHttpEngine, audio_mime};
use scribe_rs::telemetry::{TelemetryConfig, init_telemetry};
use secrecy::ExposeSecret;
use tracing::Instrument;

#[derive(Parser)]
#[command(name = "scribe", about = "Queue-driven audio transcription pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the worker daemon
    Serve {
        /// Number of concurrent workers
        #[arg(long, default_value_t = 1)]
        workers: usize,
    },
    /// Upload an audio file and enqueue it for transcription
    Upload {
        /// Path of the file to upload
        file: PathBuf,
        /// Object key (defaults to the file name)
        #[arg(long)]
        key: Option<String>,
    },
    /// Show a job's status
    Status {
        /// Job ID (file stem of the uploaded key)
        job_id: String,
        /// Show the full status timeline
        #[arg(long)]
        history: bool,
    },
    /// List dead-lettered messages
    Dlq,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { workers } => cmd_serve(workers).await,
        Command::Upload { file, key } => cmd_upload(file, key).await,
        Command::Status { job_id, history } => cmd_status(job_id, history).await,
        Command::Dlq => cmd_dlq().await,
    }
}

async fn cmd_serve(workers: usize) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "scribe".to_string(),
    })?;

    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;

    let pgmq = PgmqQueue::from_config(Arc::clone(&db), &config)?;
    pgmq.ensure().await?;

    let queue: Arc<dyn WorkQueue> = Arc::new(pgmq);
    let store: Arc<dyn ObjectStore> = Arc::new(PgObjectStore::new(Arc::clone(&db)));
    let status: Arc<dyn StatusStore> = Arc::new(PgStatusStore::new(Arc::clone(&db)));
    let engine: Arc<dyn TranscriptionEngine> = Arc::new(WhisperHttpEngine::from_config(&config)?);

    let worker_config = WorkerConfig::from_config(&config);
    let mut handles = Vec::new();
    let mut joins = Vec::new();
    for i in 0..workers.max(1) {
        let worker = Worker::new(
            Arc::clone(&queue),
            Arc::clone(&store),
            Arc::clone(&status),
            Arc::clone(&engine),
            worker_config.clone(),
        );
        handles.push(worker.clone());
        let span = tracing::info_span!("worker", id = i);
        joins.push(tokio::spawn(
            async move { worker.run().await }.instrument(span),
        ));
    }

    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        for handle in &handles {
            handle.shutdown();
        }
    });

    for join in joins {
        join.await??;
    }
    Ok(())
}

async fn cmd_upload(file: PathBuf, key: Option<String>) -> anyhow::Result<()> {
    let config = Config::from_env()?;

    let bytes = tokio::fs::read(&file).await?;
    let size = bytes.len();
    let key = match key {
        Some(k) => k,
        None => file
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("cannot derive a key from {}", file.display()))?,
    };

    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;
    let pgmq = PgmqQueue::from_config(Arc::clone(&db), &config)?;
    pgmq.ensure().await?;

    let intake = Intake::new(
        Arc::new(PgObjectStore::new(Arc::clone(&db))),
        Arc::new(pgmq),
        config.audio_suffixes.clone(),
        &config.source_bucket,
    );

    match intake.submit(&key, bytes, audio_mime(&key)).await? {
        Submitted::Queued { message_id, job_id } => {
            println!("Uploaded: {key} ({size} bytes)");
            match job_id {
                Some(id) => println!("Queued as job {id} (message {message_id})"),
                None => {
                    println!("Queued (message {message_id}), but no job id derivable from key")
                }
            }
        }
        Submitted::Filtered => {
            println!("Uploaded: {key} ({size} bytes)");
            println!("Not an audio file the pipeline transcribes — no job queued.");
        }
    }
    Ok(())
}

async fn cmd_status(job_id: String, history: bool) -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;
    let status = PgStatusStore::new(Arc::clone(&db));
    let id = JobId::from(job_id.as_str());

    if history {
        let records = status.history(&id).await?;
        if records.is_empty() {
            println!("No status recorded for job '{job_id}'.");
            return Ok(());
        }

        println!("{:<24}  {:<13}  DETAIL", "TIMESTAMP", "STATE");
        println!("{}", "-".repeat(72));
        for record in &records {
            println!(
                "{:<24}  {:<13}  {}",
                format_ts(record.timestamp_ms),
                record.state.to_string(),
                record.detail
            );
        }
        println!("\n{} row(s)", records.len());
    } else {
        match status.latest_status(&id).await? {
            Some(record) => {
                println!("Job:     {job_id}");
                println!("State:   {}", record.state);
                println!("At:      {}", format_ts(record.timestamp_ms));
                if !record.detail.is_empty() {
                    println!("Detail:  {}", record.detail);
                }
            }
            None => println!("No status recorded for job '{job_id}'."),
        }
    }
    Ok(())
}

async fn cmd_dlq() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    let db = Arc::new(Db::connect(config.database_url.expose_secret()).await?);
    db.migrate().await?;
    let pgmq = PgmqQueue::from_config(Arc::clone(&db), &config)?;
    pgmq.ensure().await?;

    let dead = pgmq.dead_letters().await?;
    if dead.is_empty() {
        println!("Dead-letter queue is empty.");
        return Ok(());
    }

    println!("{:<8}  {:<20}  BODY", "MSG_ID", "ENQUEUED");
    println!("{}", "-".repeat(96));
    for delivery in &dead {
        println!(
            "{:<8}  {:<20}  {}",
            delivery.id.to_string(),
            delivery.enqueued_at.format("%Y-%m-%d %H:%M:%S"),
            truncate(&delivery.body, 60)
        );
    }
    println!("\n{} message(s)", dead.len());
    Ok(())
}

fn format_ts(ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| ms.to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}...")
    }
}
