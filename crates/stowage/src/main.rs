use std::fs::File;
use std::io::Read;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use stowage_client::{
    CatalogClient, FolderTree, HttpTransport, TreeNode, UploadFile, UploadQueue, Uploader,
};
use stowage_core::{PartPolicy, StorageService};
use stowage_http::Stowage;

mod config;
use crate::config::Config;

const MIB: u64 = 1024 * 1024;

#[derive(Parser)]
#[command(version, about = "Multipart uploads to S3-compatible object storage")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ClientArgs {
    /// Base URL of a running `stowage serve`.
    #[arg(long, default_value = "http://localhost:13030")]
    endpoint: String,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the upload, folder and download API.
    Serve {
        #[arg(short, long)]
        config_file: Option<PathBuf>,
    },
    /// Upload files one after another.
    Upload {
        #[command(flatten)]
        client: ClientArgs,
        #[arg(long, default_value_t = 500)]
        part_size_mib: u64,
        /// Folder to upload into, e.g. `public/videos/`.
        #[arg(long, default_value = "")]
        prefix: String,
        #[arg(long)]
        content_type: Option<String>,
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// List a folder.
    Ls {
        #[command(flatten)]
        client: ClientArgs,
        /// List every file below the folder instead of one level.
        #[arg(long)]
        flat: bool,
        #[arg(default_value = "")]
        prefix: String,
    },
    /// Create a folder.
    Mkdir {
        #[command(flatten)]
        client: ClientArgs,
        key: String,
    },
    /// Resolve how a file is downloaded.
    DownloadInfo {
        #[command(flatten)]
        client: ClientArgs,
        key: String,
    },
}

async fn serve(config_file: Option<PathBuf>) -> Result<()> {
    // load configuration
    let mut dev_config = File::open(config_file.unwrap_or("./dev-config.yml".into()))?;
    let mut s = String::new();
    dev_config.read_to_string(&mut s)?;
    let config: Config = serde_yaml::from_str(&s)?;

    // initialize storage backend
    let backend = config.backend.new_backend().await?;
    let service = StorageService::new(backend, config.multipart, config.downloads);

    let router = match Stowage::new(service).router() {
        Err(e) => return Err(e.into()),
        Ok(r) => r,
    };

    // run HTTP server
    tracing::info!("listening on {}", config.listen);
    axum::Server::bind(&config.listen.parse()?)
        .serve(router.into_make_service())
        .await?;

    Ok(())
}

async fn upload(
    client: ClientArgs,
    part_size_mib: u64,
    prefix: String,
    content_type: Option<String>,
    files: Vec<PathBuf>,
) -> Result<()> {
    let transport = HttpTransport::new(&client.endpoint)?;
    let policy = PartPolicy::with_part_size(part_size_mib * MIB);
    let queue = UploadQueue::new(Uploader::with_policy(transport, policy));

    for path in files {
        let mut file = UploadFile::from_path(&path).await?.with_prefix(&prefix);
        if let Some(content_type) = &content_type {
            file = file.with_content_type(content_type.as_str());
        }
        queue.enqueue(file);
    }

    let run = queue.run();
    tokio::pin!(run);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    let mut interrupted = false;
    loop {
        tokio::select! {
            _ = &mut run => break,
            _ = ticker.tick() => {
                if let Some(percent) = queue.progress().overall() {
                    eprintln!("uploading: {percent}%");
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                interrupted = true;
                tracing::warn!("interrupted, cancelling uploads");
                for id in queue.progress().snapshot().keys() {
                    queue.cancel(id);
                }
            }
        }
    }

    for done in queue.completed() {
        println!("{} -> {}", done.file_name, done.location);
    }
    let failed = queue.failed();
    for failure in &failed {
        eprintln!("{} failed: {}", failure.file_name, failure.message);
    }
    if !failed.is_empty() {
        anyhow::bail!("{} of the uploads failed", failed.len());
    }

    Ok(())
}

async fn ls(client: ClientArgs, flat: bool, prefix: String) -> Result<()> {
    let transport = HttpTransport::new(&client.endpoint)?;
    if flat {
        for entry in transport.list_flat(&prefix).await?.files {
            println!("{:>14}  {}", entry.size, entry.key);
        }
        return Ok(());
    }

    let tree = FolderTree::new(transport);
    tree.prefetch_counts(&prefix).await;
    for node in tree.children(&prefix).await {
        match node {
            TreeNode::Folder {
                key, child_count, ..
            } => {
                let count = child_count.map(|c| c.to_string()).unwrap_or_default();
                println!("{count:>14}  {key}");
            }
            TreeNode::File { entry, .. } => println!("{:>14}  {}", entry.size, entry.key),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    match cli.command {
        Command::Serve { config_file } => serve(config_file).await,
        Command::Upload {
            client,
            part_size_mib,
            prefix,
            content_type,
            files,
        } => upload(client, part_size_mib, prefix, content_type, files).await,
        Command::Ls {
            client,
            flat,
            prefix,
        } => ls(client, flat, prefix).await,
        Command::Mkdir { client, key } => {
            let transport = HttpTransport::new(&client.endpoint)?;
            println!("{}", transport.create_folder(&key).await?);
            Ok(())
        }
        Command::DownloadInfo { client, key } => {
            let transport = HttpTransport::new(&client.endpoint)?;
            let info = transport.download_info(&key).await?;
            println!("{}", serde_json::to_string_pretty(&info)?);
            Ok(())
        }
    }
}
