use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};

use etlflow::pipeline::{PipelineEngine, PipelineFile, RunOptions, RunOutcome};
use etlflow::registry::ComponentRegistry;

/// Execute the `run` command on an already parsed pipeline file.
///
/// Errors only under `on_failure: abort`; skipped and warned runs print
/// their report and succeed.
pub async fn execute(
    registry: Arc<ComponentRegistry>,
    pipeline_path: &Path,
    file: &PipelineFile,
    full_refresh: bool,
) -> Result<()> {
    let engine = PipelineEngine::new(registry);
    let options = RunOptions::new().with_full_refresh(full_refresh);
    tracing::debug!(
        path = %pipeline_path.display(),
        pipeline = %file.pipeline.name,
        full_refresh,
        "Starting pipeline"
    );

    let report = engine
        .run(file, options)
        .await
        .with_context(|| format!("Pipeline failed: {}", pipeline_path.display()))?;

    match report.outcome {
        RunOutcome::Succeeded => {
            println!("Pipeline '{}' completed successfully.", report.pipeline);
        }
        RunOutcome::Skipped | RunOutcome::Warned => {
            println!(
                "Pipeline '{}' failed in {} ({}): {}",
                report.pipeline,
                report.failed_in.map_or_else(|| "-".to_string(), |s| s.to_string()),
                report.outcome,
                report.error.as_deref().unwrap_or("unknown error"),
            );
        }
    }
    println!("  Run id:          {}", report.run_id);
    println!("  Rows extracted:  {}", report.rows_extracted);
    println!("  Rows loaded:     {}", report.rows_loaded);
    if let Some(cursor) = &report.new_cursor {
        println!("  Cursor:          {cursor}");
    }
    println!("  Duration:        {:.2}s", report.duration.as_secs_f64());
    Ok(())
}
