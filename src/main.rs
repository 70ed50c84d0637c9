use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use dedupe_lib::{
    pipeline::{DocumentOutcome, PipelineOrchestrator},
    services::{ModelServiceConfig, ModelServices, ParaphraseConfig},
    storage::{CommentRepository, PgCommentRepository},
    utils::{
        config::PipelineConfig,
        db_connect::{connect, get_pool_status},
        env::load_env,
        get_memory_usage,
        progress_config::ProgressConfig,
    },
};
use futures::stream::{FuturesUnordered, StreamExt};
use log::{error, info, warn};
use tokio::sync::Semaphore;
use uuid::Uuid;

/// Clusters public comments per document and stores representative comments,
/// form letters and topics.
#[derive(Parser, Debug)]
#[command(name = "comment_pipeline", version)]
struct Args {
    /// Reprocess every document instead of only those with enough new comments
    #[arg(long)]
    refresh: bool,

    /// Process a single document
    #[arg(long)]
    document: Option<String>,

    /// Documents processed at the same time (overrides PIPELINE_CONCURRENCY)
    #[arg(long)]
    concurrency: Option<usize>,
}

#[derive(Debug, Default)]
struct BatchSummary {
    documents: usize,
    too_small: usize,
    comments: u64,
    unique_comments: u64,
    representatives: usize,
    form_letter_clusters: usize,
    topic_retries: usize,
    without_topics: usize,
    panicked: usize,
}

impl BatchSummary {
    fn record(&mut self, outcome: &DocumentOutcome) {
        let rep = &outcome.rep_comments;
        self.documents += 1;
        if outcome.stats.total_comments < 2 {
            self.too_small += 1;
        }
        self.comments += rep.total_comment_count;
        self.unique_comments += rep.unique_comment_count;
        self.representatives += rep.num_representative_comments();
        self.form_letter_clusters += outcome.stats.form_letter_clusters;
        if outcome.stats.topic_attempts > 1 {
            self.topic_retries += 1;
        }
        if rep.topics.is_empty() {
            self.without_topics += 1;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    env_logger::init();
    info!("Starting comment clustering pipeline");
    load_env();
    let args = Args::parse();

    let mut config = PipelineConfig::from_env();
    config.refresh = args.refresh;
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency.max(1);
    }
    config.log_config();

    let model_config = ModelServiceConfig::from_env();
    model_config.log_config();
    let services = ModelServices::http(&model_config, ParaphraseConfig::from_env())
        .context("Failed to set up model services")?;

    let progress_config = ProgressConfig::from_env();
    info!(
        "Progress tracking: enabled={}, detailed={}",
        progress_config.enabled, progress_config.detailed
    );

    let pool = connect().await.context("Failed to connect to database")?;
    info!("Successfully connected to the database");
    let repository = Arc::new(PgCommentRepository::new(pool.clone()));

    let run_id = Uuid::new_v4().to_string();
    let start = Instant::now();
    info!("Pipeline run {} (refresh: {})", run_id, args.refresh);

    let documents = match args.document {
        Some(document_id) => vec![document_id],
        None => repository
            .documents_to_update(args.refresh, config.min_document_comments)
            .await
            .context("Failed to select documents to process")?,
    };
    if documents.is_empty() {
        info!("Run {}: no documents need processing", run_id);
        return Ok(());
    }
    info!("Run {}: {} documents to process", run_id, documents.len());

    let multi_progress = progress_config.create_multi_progress();
    let progress_bar = multi_progress
        .as_ref()
        .map(|mp| progress_config.document_bar(mp, documents.len() as u64));

    let concurrency = config.concurrency;
    let orchestrator = Arc::new(PipelineOrchestrator::new(services, config));
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = FuturesUnordered::new();

    info!("Spawning {} document tasks ({} at a time)", documents.len(), concurrency);
    for document_id in documents {
        let orchestrator = orchestrator.clone();
        let repository = repository.clone();
        let semaphore = semaphore.clone();
        let multi_progress = multi_progress.clone();
        let progress_config = progress_config.clone();
        let task_document_id = document_id.clone();

        let handle = tokio::spawn(async move {
            let permit = semaphore
                .acquire_owned()
                .await
                .context("Failed to acquire semaphore permit")?;
            let _permit_guard = permit;

            let spinner = multi_progress
                .as_ref()
                .and_then(|mp| progress_config.document_spinner(mp, &task_document_id));
            let result = orchestrator.run(repository.as_ref(), &task_document_id).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }
            result
        });
        tasks.push(async move { (document_id, handle.await) });
    }

    let mut summary = BatchSummary::default();
    while let Some((document_id, joined)) = tasks.next().await {
        match joined {
            Ok(Ok(outcome)) => summary.record(&outcome),
            Ok(Err(e)) => {
                error!("Run {}: document {} failed: {:?}", run_id, document_id, e);
                semaphore.close();
                if let Some(pb) = &progress_bar {
                    pb.abandon_with_message(format!("Failed on {}", document_id));
                }
                return Err(e.context(format!("Run {} aborted", run_id)));
            }
            Err(join_error) => {
                error!(
                    "Run {}: task for document {} panicked or was cancelled: {:?}",
                    run_id, document_id, join_error
                );
                summary.panicked += 1;
            }
        }

        if let Some(pb) = &progress_bar {
            pb.inc(1);
            let mut parts = vec![document_id];
            if progress_config.should_show_memory() {
                parts.push(format!("Memory: {} MB", get_memory_usage().await));
            }
            if progress_config.should_show_db_connection_stats() {
                let (connections, idle) = get_pool_status(&pool);
                parts.push(format!("DB: {}/{} (used/total)", connections - idle, connections));
            }
            pb.set_message(parts.join(", "));
        }
    }

    if let Some(pb) = &progress_bar {
        pb.finish_with_message("All documents processed");
    }

    info!("Run {} finished in {:.2?}", run_id, start.elapsed());
    info!(
        "   Documents: {} ({} with fewer than 2 comments)",
        summary.documents, summary.too_small
    );
    info!(
        "   Comments: {} total, {} unique, {} representatives, {} form letter clusters",
        summary.comments, summary.unique_comments, summary.representatives, summary.form_letter_clusters
    );
    info!(
        "   Topics: {} documents needed the full-corpus retry, {} ended without topics",
        summary.topic_retries, summary.without_topics
    );
    if summary.panicked > 0 {
        warn!("   {} document tasks panicked and were skipped", summary.panicked);
    }
    Ok(())
}
