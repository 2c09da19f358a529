use anyhow::Context;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::{info, warn};
use visprobe::cli::Args;
use visprobe::config::EngineSettings;
use visprobe::engine::{BatchConfig, BatchProgress, BatchRunner};
use visprobe::provider::ProviderFactory;
use visprobe::BatchAnalyzer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "visprobe=info".into()),
        )
        .init();

    let args = Args::parse();

    let settings = EngineSettings::load(args.config.as_deref())
        .context("failed to load configuration")?;

    let provider_kind = args.provider.into();
    let provider = ProviderFactory::create(provider_kind, &settings, args.model.clone())
        .with_context(|| format!("failed to create {} provider", provider_kind))?;

    let config = BatchConfig {
        iterations: args.iterations.unwrap_or(settings.default_iterations),
        concurrency: args.concurrency.unwrap_or(settings.default_concurrency),
        temperature: args.temperature.map(|t| t as f32).unwrap_or(0.7),
        top_p: args.top_p,
        max_tokens: args.max_tokens,
        model: args.model.clone(),
        system_prompt: args.system_prompt.clone(),
    };

    info!(
        provider = %provider_kind,
        iterations = config.iterations,
        concurrency = config.concurrency,
        "starting batch"
    );

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<BatchProgress>();
    let progress_task = tokio::spawn(async move {
        while let Some(update) = progress_rx.recv().await {
            info!(
                batch_id = %update.batch_id,
                completed = update.completed,
                total = update.total,
                succeeded = update.succeeded,
                failed = update.failed,
                "progress"
            );
        }
    });

    let runner = BatchRunner::new(settings).with_progress(progress_tx);
    let batch = runner
        .run_batch(provider.clone(), &args.prompt, config)
        .await
        .context("batch execution failed")?;
    provider.shutdown().await;

    // The sender inside the runner is dropped with it, so this finishes
    // once every update is drained.
    drop(runner);
    if let Err(e) = progress_task.await {
        warn!(error = %e, "progress task failed");
    }

    info!(
        batch_id = %batch.batch_id,
        succeeded = batch.successful_iterations,
        failed = batch.failed_iterations,
        total_tokens = batch.total_tokens,
        "batch complete"
    );

    if batch.successful_iterations == 0 {
        warn!("no successful responses; analysis will be empty");
    }

    let analyzer = BatchAnalyzer::new();
    let analysis = analyzer
        .analyze_batch(&batch, &args.brands(), args.domain_whitelist())
        .context("analysis failed")?;

    if args.dump_batch {
        eprintln!("{}", serde_json::to_string_pretty(&batch)?);
    }

    let rendered = serde_json::to_string_pretty(&analysis)?;
    match &args.output {
        Some(path) => {
            std::fs::write(path, &rendered)
                .with_context(|| format!("failed to write {}", path.display()))?;
            info!(path = %path.display(), "analysis written");
        }
        None => println!("{rendered}"),
    }

    Ok(())
}
