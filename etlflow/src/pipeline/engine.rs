//! The pipeline engine: resolve, extract, transform, load, commit.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

use super::lifecycle::{RunLifecycle, RunState};
use super::report::{RunOutcome, RunReport};
use super::retry::{with_retry, RetryExhausted};
use super::spec::{FailurePolicy, IncrementalSpec, PipelineFile, RunSettings};
use crate::components::{Extractor, Loader, Transformer};
use crate::config::{compose_stage_config, load_pipeline};
use crate::dataset::Dataset;
use crate::errors::{EtlflowError, Result};
use crate::registry::{Category, ComponentRegistry};
use crate::state::{CursorStore, CursorValue};

/// Log target for failures tolerated under `on_failure: warn`.
///
/// Logging setups keep this target at `warn` or finer whatever the
/// configured level.
pub const FAILURE_TARGET: &str = "etlflow::failure";

/// Per-run switches that are not part of the pipeline file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Ignore the stored cursor and start from `initial_value`.
    pub full_refresh: bool,
}

impl RunOptions {
    /// Creates default options.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            full_refresh: false,
        }
    }

    /// Sets full refresh.
    #[must_use]
    pub const fn with_full_refresh(mut self, full_refresh: bool) -> Self {
        self.full_refresh = full_refresh;
        self
    }
}

/// Runs pipelines against a shared, read-only component registry.
#[derive(Debug, Clone)]
pub struct PipelineEngine {
    registry: Arc<ComponentRegistry>,
}

/// Facts gathered while a run progresses, kept for the report.
#[derive(Debug, Default)]
struct Progress {
    rows_extracted: usize,
    rows_loaded: usize,
    previous_cursor: Option<CursorValue>,
    new_cursor: Option<CursorValue>,
}

impl PipelineEngine {
    /// Creates an engine.
    #[must_use]
    pub const fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the registry.
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Loads a pipeline file and runs it.
    ///
    /// # Errors
    ///
    /// Returns [`EtlflowError::Config`] for an invalid file, otherwise as
    /// [`run`](Self::run).
    pub async fn run_file(&self, path: &Path, options: RunOptions) -> Result<RunReport> {
        let file = load_pipeline(path)?;
        self.run(&file, options).await
    }

    /// Runs one pipeline to completion.
    ///
    /// Under `on_failure: skip` or `warn` a failed run still returns `Ok`
    /// with a report that loaded nothing.
    ///
    /// # Errors
    ///
    /// Under `on_failure: abort`, returns the error of the failing stage.
    pub async fn run(&self, file: &PipelineFile, options: RunOptions) -> Result<RunReport> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "pipeline_run",
            pipeline = %file.pipeline.name,
            run_id = %run_id,
        );
        self.execute(file, options, run_id).instrument(span).await
    }

    async fn execute(
        &self,
        file: &PipelineFile,
        options: RunOptions,
        run_id: Uuid,
    ) -> Result<RunReport> {
        let started = Instant::now();
        let mut lifecycle = RunLifecycle::new();
        let mut progress = Progress::default();

        tracing::info!(
            full_refresh = options.full_refresh,
            on_failure = %file.settings.on_failure,
            "Pipeline started"
        );

        match self.drive(file, options, &mut lifecycle, &mut progress).await {
            Ok(()) => {
                tracing::info!(
                    rows = progress.rows_loaded,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "Pipeline finished successfully"
                );
                Ok(RunReport {
                    run_id,
                    pipeline: file.pipeline.name.clone(),
                    outcome: RunOutcome::Succeeded,
                    final_state: lifecycle.state(),
                    failed_in: None,
                    rows_extracted: progress.rows_extracted,
                    rows_loaded: progress.rows_loaded,
                    previous_cursor: progress.previous_cursor,
                    new_cursor: progress.new_cursor,
                    duration: started.elapsed(),
                    error: None,
                    error_kind: None,
                })
            }
            Err(error) => {
                let failed_in = lifecycle.state();
                lifecycle.fail();
                let stage = failed_in.label();

                let outcome = match file.settings.on_failure {
                    FailurePolicy::Abort => {
                        tracing::error!(stage, error = %error, "Pipeline failed");
                        return Err(error);
                    }
                    FailurePolicy::Skip => {
                        tracing::info!(stage, error = %error, "Pipeline failed, skipping");
                        RunOutcome::Skipped
                    }
                    FailurePolicy::Warn => {
                        tracing::warn!(
                            target: FAILURE_TARGET,
                            pipeline = %file.pipeline.name,
                            stage,
                            error = %error,
                            "Pipeline failed, continuing"
                        );
                        RunOutcome::Warned
                    }
                };

                Ok(RunReport {
                    run_id,
                    pipeline: file.pipeline.name.clone(),
                    outcome,
                    final_state: lifecycle.state(),
                    failed_in: Some(failed_in),
                    rows_extracted: 0,
                    rows_loaded: 0,
                    previous_cursor: progress.previous_cursor,
                    new_cursor: None,
                    duration: started.elapsed(),
                    error: Some(error.to_string()),
                    error_kind: Some(error.kind()),
                })
            }
        }
    }

    async fn drive(
        &self,
        file: &PipelineFile,
        options: RunOptions,
        lifecycle: &mut RunLifecycle,
        progress: &mut Progress,
    ) -> Result<()> {
        let spec = &file.pipeline;
        let settings = &file.settings;

        // Resolve every key before building anything.
        let extractor_type = self.registry.resolve(Category::Extractor, &spec.extract.source)?;
        let transformer_types = spec
            .transform
            .iter()
            .map(|step| {
                self.registry
                    .resolve(Category::Transformer, &step.name)
                    .map(|ty| (step, ty))
            })
            .collect::<Result<Vec<_>>>()?;
        let loader_type = self.registry.resolve(Category::Loader, &spec.load.destination)?;

        tracing::info!(
            extractor = extractor_type.type_name(),
            transformers = transformer_types.len(),
            loader = loader_type.type_name(),
            "Resolved components"
        );

        let mut extract_config = compose_stage_config(&spec.extract)?;
        let transformers = transformer_types
            .into_iter()
            .map(|(step, ty)| ty.build_transformer(compose_stage_config(step)?))
            .collect::<Result<Vec<_>>>()?;
        let loader = loader_type.build_loader(compose_stage_config(&spec.load)?)?;

        let store = CursorStore::new(&settings.state_file);
        if let Some(inc) = &spec.incremental {
            let cursor = effective_cursor(inc, options, &store, &spec.name);
            if !cursor.is_null() {
                extract_config.set_path(&spec.extract.source, &inc.cursor_param, cursor.clone())?;
            }
            progress.previous_cursor = Some(cursor);
        }
        let extractor = extractor_type.build_extractor(extract_config)?;

        lifecycle.advance(RunState::Extracting)?;
        let mut dataset = run_extract(extractor, settings).await?;
        progress.rows_extracted = dataset.row_count();
        tracing::info!(
            stage = "extract",
            rows = dataset.row_count(),
            columns = dataset.column_count(),
            "Extract complete"
        );

        lifecycle.advance(RunState::Transforming)?;
        for transformer in &transformers {
            dataset = run_transform(transformer.as_ref(), dataset)?;
        }
        let new_cursor = match &spec.incremental {
            Some(inc) => compute_cursor(&dataset, inc)?,
            None => None,
        };

        lifecycle.advance(RunState::Loading)?;
        let dataset = Arc::new(dataset);
        run_load(loader, dataset.clone(), settings).await?;
        progress.rows_loaded = dataset.row_count();
        tracing::info!(stage = "load", rows = dataset.row_count(), "Load complete");

        lifecycle.advance(RunState::Committing)?;
        match new_cursor {
            Some(cursor) => {
                store.commit(&spec.name, cursor.clone())?;
                tracing::info!(stage = "commit", cursor = %cursor, "Cursor committed");
                progress.new_cursor = Some(cursor);
            }
            None if spec.incremental.is_some() => {
                tracing::info!(stage = "commit", "No new cursor value, state left unchanged");
            }
            None => {}
        }

        lifecycle.advance(RunState::Done)?;
        Ok(())
    }
}

/// Stored cursor, else `initial_value`. Full refresh never reads the store.
fn effective_cursor(
    inc: &IncrementalSpec,
    options: RunOptions,
    store: &CursorStore,
    pipeline: &str,
) -> CursorValue {
    if options.full_refresh {
        tracing::info!(
            cursor = %inc.initial_value,
            "Full refresh requested, ignoring stored cursor"
        );
        return inc.initial_value.clone();
    }

    let cursor = store
        .load(pipeline)
        .filter(|c| !c.is_null())
        .unwrap_or_else(|| inc.initial_value.clone());
    tracing::info!(
        cursor_field = %inc.cursor_field,
        cursor_param = %inc.cursor_param,
        cursor = %cursor,
        "Incremental mode"
    );
    cursor
}

/// Maximum non-null cursor column value, or `None` when nothing advances.
fn compute_cursor(dataset: &Dataset, inc: &IncrementalSpec) -> Result<Option<CursorValue>> {
    if dataset.is_empty() {
        return Ok(None);
    }
    let column = dataset.column(&inc.cursor_field).ok_or_else(|| {
        EtlflowError::transform(
            "incremental",
            format!(
                "cursor_field '{}' not found in columns {:?}",
                inc.cursor_field,
                dataset.column_names()
            ),
        )
    })?;
    let max = column
        .max()
        .map_err(|e| EtlflowError::transform("incremental", e.to_string()))?;
    Ok(max.map(crate::dataset::Value::to_json))
}

async fn run_extract(
    extractor: Box<dyn Extractor>,
    settings: &RunSettings,
) -> Result<Dataset> {
    let name = extractor.name().to_string();
    let extractor = Arc::new(Mutex::new(extractor));

    with_retry(&settings.retry, &name, || {
        let extractor = extractor.clone();
        async move {
            let mut guard = extractor.lock().await;
            extract_once(guard.as_mut()).await
        }
    })
    .await
    .map_err(|RetryExhausted { attempts, error }| EtlflowError::Extraction {
        component: name.clone(),
        attempts,
        message: error.to_string(),
    })
}

/// One `connect → extract → disconnect` attempt. `disconnect` always runs.
async fn extract_once(extractor: &mut dyn Extractor) -> Result<Dataset> {
    let result = match extractor.connect().await {
        Ok(()) => extractor.extract().await,
        Err(e) => Err(e),
    };
    finish(result, extractor.disconnect().await, extractor.name())
}

async fn run_load(
    loader: Box<dyn Loader>,
    dataset: Arc<Dataset>,
    settings: &RunSettings,
) -> Result<()> {
    let name = loader.name().to_string();
    let loader = Arc::new(Mutex::new(loader));

    with_retry(&settings.retry, &name, || {
        let loader = loader.clone();
        let dataset = dataset.clone();
        async move {
            let mut guard = loader.lock().await;
            load_once(guard.as_mut(), &dataset).await
        }
    })
    .await
    .map_err(|RetryExhausted { attempts, error }| EtlflowError::Load {
        component: name.clone(),
        attempts,
        message: error.to_string(),
    })
}

/// One `connect → load → disconnect` attempt. `disconnect` always runs.
async fn load_once(loader: &mut dyn Loader, dataset: &Dataset) -> Result<()> {
    let result = match loader.connect().await {
        Ok(()) => loader.load(dataset).await,
        Err(e) => Err(e),
    };
    finish(result, loader.disconnect().await, loader.name())
}

fn finish<T>(result: Result<T>, disconnected: Result<()>, name: &str) -> Result<T> {
    match (result, disconnected) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(e)) => Err(e),
        (Err(e), Err(close)) => {
            tracing::warn!(component = name, error = %close, "Disconnect failed after error");
            Err(e)
        }
        (Err(e), Ok(())) => Err(e),
    }
}

fn run_transform(transformer: &dyn Transformer, dataset: Dataset) -> Result<Dataset> {
    let name = transformer.name().to_string();
    let rows_in = dataset.row_count();
    let as_transform_error = |e: EtlflowError| match e {
        EtlflowError::Transform { .. } => e,
        other => EtlflowError::transform(&name, other.to_string()),
    };

    transformer.validate(&dataset).map_err(as_transform_error)?;
    let out = transformer.transform(dataset).map_err(as_transform_error)?;

    tracing::info!(
        stage = "transform",
        transformer = %name,
        rows_in,
        rows = out.row_count(),
        "Transform complete"
    );
    Ok(out)
}
