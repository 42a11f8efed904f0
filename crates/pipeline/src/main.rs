use anyhow::Context;
use clap::Parser;
use common::{TelemetryGuard, setup_logging};
use inference::{ClassifierService, DirectoryFetcher};
use pipeline::{CancelToken, DirectoryStore, PipelineConfig, UploadPipeline, UploadSession};
use schema::FileRef;
use std::path::PathBuf;
use std::sync::Arc;

/// Analyze clothing photos: dominant color, garment type and wardrobe category.
#[derive(Parser, Debug)]
#[command(name = "wardrobe-analyze", version)]
struct Args {
    /// Owner of the uploaded items.
    #[arg(long)]
    user: String,

    /// Print drafts without persisting them.
    #[arg(long)]
    dry_run: bool,

    /// Image files to analyze.
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

async fn read_files(paths: &[PathBuf]) -> anyhow::Result<Vec<FileRef>> {
    let mut files = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(FileRef::new(name, bytes));
    }
    Ok(files)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = PipelineConfig::from_env();

    // TelemetryGuard installs the subscriber itself; only set up plain logging without it.
    let _telemetry = match config.otel_endpoint.as_deref() {
        Some(endpoint) => Some(TelemetryGuard::init(
            "wardrobe-analyze",
            endpoint,
            config.environment,
        )?),
        None => {
            setup_logging(config.environment);
            None
        }
    };

    tracing::info!(
        environment = config.environment.as_str(),
        files = args.files.len(),
        dry_run = args.dry_run,
        "wardrobe-analyze starting with config: {:?}",
        config
    );

    let files = read_files(&args.files).await?;

    let classifier = Arc::new(ClassifierService::new(config.classifier.clone()));
    let fetcher = Arc::new(DirectoryFetcher::new(&config.model_dir));
    let state = classifier.initialize(fetcher).await?;
    tracing::info!(state = %state, "Classifier ready");

    let cancel = CancelToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling batch");
            on_signal.cancel();
        }
    });

    let pipeline = UploadPipeline::new(Arc::clone(&classifier), &config);
    let outcome = pipeline.process(files, &cancel).await;

    for draft in outcome.drafts.iter().chain(&outcome.aborted) {
        println!("{}", serde_json::to_string(draft)?);
    }

    let mut session = UploadSession::new(args.user);
    match session.stage(outcome) {
        Ok(_) if args.dry_run => {
            tracing::info!(drafts = session.clear(), "Dry run, nothing persisted");
        }
        Ok(_) => {
            let store = DirectoryStore::new(&config.output_dir);
            let records = session.commit(&store)?;
            tracing::info!(
                records = records.len(),
                output_dir = %config.output_dir.display(),
                "Wardrobe items persisted"
            );
        }
        Err(e) => tracing::warn!(error = %e, "Batch not persisted"),
    }

    classifier.dispose();
    Ok(())
}
