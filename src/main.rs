use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use screen_recorder::client::RecordingsClient;
use screen_recorder::config::ServerConfig;
use screen_recorder::recordings::{ListQuery, SortKey, SortOrder};
use screen_recorder::serve::serve_recordings;
use screen_recorder::upload::{upload_with_retry, RetryPolicy, UploadJob, UploadRequest};

#[derive(Parser, Debug)]
#[command(author, version, about = "Store, stream and manage screen recordings")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the recordings HTTP server
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// SQLite database file (overrides config file)
        #[arg(short, long)]
        database: Option<PathBuf>,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Upload a recording file to a server
    Upload {
        /// Video file to upload
        file: PathBuf,

        /// Server base URL
        #[arg(short, long, default_value = "http://localhost:3000")]
        server: String,

        /// Title shown in the library (default: server-generated)
        #[arg(short, long)]
        title: Option<String>,

        /// Recording length in seconds
        #[arg(short, long, default_value = "0")]
        duration: u32,

        /// Content type (default: guessed from the file extension)
        #[arg(long)]
        content_type: Option<String>,
    },
    /// List recordings on a server
    List {
        #[arg(short, long, default_value = "http://localhost:3000")]
        server: String,

        #[arg(long, value_enum, default_value_t = SortKey::CreatedAt)]
        sort: SortKey,

        #[arg(long, value_enum, default_value_t = SortOrder::Desc)]
        order: SortOrder,

        /// Only titles containing this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Delete one or more recordings
    Delete {
        /// Recording ids
        #[arg(required = true)]
        ids: Vec<i64>,

        #[arg(short, long, default_value = "http://localhost:3000")]
        server: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Command::Serve {
            config,
            database,
            port,
        } => serve(config, database, port),
        Command::Upload {
            file,
            server,
            title,
            duration,
            content_type,
        } => upload(&file, &server, title, duration, content_type),
        Command::List {
            server,
            sort,
            order,
            search,
        } => list(&server, ListQuery { sort, order, search }),
        Command::Delete { ids, server } => delete(&server, &ids),
    }
}

fn serve(
    config_path: Option<PathBuf>,
    database: Option<PathBuf>,
    port: Option<u16>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = match (config_path, database.as_ref()) {
        (Some(path), _) => ServerConfig::load(&path)?,
        (None, Some(db)) => ServerConfig::with_database(db),
        (None, None) => return Err("Either --config or --database is required".into()),
    };
    if let Some(db) = database {
        config.database_path = db;
    }
    if let Some(port) = port {
        config.port = port;
    }
    serve_recordings(config)
}

/// Content type for a recording file, from its extension
fn guess_content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("mkv") => "video/x-matroska",
        _ => "video/webm",
    }
}

fn upload(
    file: &Path,
    server: &str,
    title: Option<String>,
    duration: u32,
    content_type: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(file)
        .map_err(|e| format!("Failed to read '{}': {}", file.display(), e))?;
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("recording.webm")
        .to_string();

    let request = UploadRequest {
        data: data.into(),
        title: title.unwrap_or_default(),
        duration_secs: duration,
        content_type: content_type.unwrap_or_else(|| guess_content_type(file).to_string()),
        file_name,
    };
    println!(
        "Uploading {} ({} bytes) to {}",
        file.display(),
        request.size(),
        server
    );

    let client = RecordingsClient::new(server)?;
    let mut job = UploadJob::new(request);
    let progress = Arc::new(|percent: f64| {
        log::debug!("Upload progress: {:.1}%", percent);
    });

    let rt = tokio::runtime::Runtime::new()?;
    let receipt = rt.block_on(upload_with_retry(
        &client,
        &mut job,
        &RetryPolicy::default(),
        progress,
    ))?;

    println!("{} (id {}, {})", receipt.message, receipt.id, receipt.url);
    Ok(())
}

fn list(server: &str, query: ListQuery) -> Result<(), Box<dyn std::error::Error>> {
    let client = RecordingsClient::new(server)?;
    let rt = tokio::runtime::Runtime::new()?;
    let recordings = rt.block_on(client.list(&query))?;

    if recordings.is_empty() {
        println!("No recordings");
        return Ok(());
    }
    for r in recordings {
        println!(
            "{:>6}  {:<40}  {:>10} bytes  {:>4}s  {}",
            r.id, r.title, r.size, r.duration, r.created_at
        );
    }
    Ok(())
}

fn delete(server: &str, ids: &[i64]) -> Result<(), Box<dyn std::error::Error>> {
    let client = RecordingsClient::new(server)?;
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(client.delete_many(ids));

    for id in &report.succeeded {
        println!("Deleted recording {}", id);
    }
    for (id, e) in &report.failed {
        eprintln!("Failed to delete recording {}: {}", id, e);
    }
    if !report.failed.is_empty() {
        return Err(format!("{} of {} deletions failed", report.failed.len(), ids.len()).into());
    }
    Ok(())
}
