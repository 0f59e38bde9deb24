use std::fs::File;
use std::io::Read;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use parcel_core::{FileSource, Orchestrator};
use parcel_objectstore::Key;

mod config;
use crate::config::Config;

/// Upload a file to an object store as a multipart upload.
#[derive(Parser)]
struct Cli {
    #[arg(short, long)]
    config_file: Option<PathBuf>,

    /// Object key; a random key under the configured prefix when omitted.
    #[arg(short, long)]
    key: Option<String>,

    #[arg(long)]
    content_type: Option<String>,

    /// Overrides `upload.concurrency` from the config file.
    #[arg(long)]
    concurrency: Option<usize>,

    file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(true)
        .compact()
        .init();

    // load configuration
    let mut config_file = File::open(cli.config_file.unwrap_or("./parcel.yml".into()))?;
    let mut s = String::new();
    config_file.read_to_string(&mut s)?;
    let config: Config = serde_yaml::from_str(&s)?;

    let key = match &cli.key {
        Some(k) => Key::try_from(k.as_str())?,
        None => config.generate_key()?,
    };
    let content_type = config.content_type(cli.content_type.as_deref()).to_string();

    let mut upload = config.upload.clone();
    if let Some(concurrency) = cli.concurrency {
        upload.concurrency = concurrency;
    }

    let objects = config.objects.new_objects().await?;
    let source = FileSource::open(&cli.file).await?;
    tracing::info!(
        "uploading {} to {key} as {content_type}",
        source.path().display()
    );

    let orchestrator = Orchestrator::new(objects, upload);
    let descriptor = orchestrator
        .run(&source, key, &content_type)
        .await?
        .into_result()?;

    println!("{descriptor}");
    Ok(())
}
