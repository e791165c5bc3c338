//! Batch audit runner
//!
//! Sites are independent: each is fetched, decoded, detected, evaluated and
//! upserted on its own. A failing site is recorded in the run and skipped;
//! the batch itself never aborts. The cancellation token is checked before
//! each site is started, so a cancelled run finishes the sites in flight and
//! schedules no new ones.
//!
//! Only sites without a record, or whose record is NOT_VERIFIABLE, take a
//! machine verdict. Every other record is left as the reviewers set it and
//! the site is reported as `UNDER_REVIEW`.

use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use surya_common::config::{ImageryConfig, IntakeConfig};
use surya_common::{Error, SiteRecord};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::models::{BatchRun, SiteError};
use crate::services::coordinate_intake::{CoordinateTable, SiteLocation, NOTE_FALLBACK_COORDINATES};
use crate::services::detector::Detector;
use crate::services::image_source::{ImageSource, SiteRequest};
use crate::services::overlay::OverlayRenderer;
use crate::services::record_store::{validate_sample_id, RecordStore};
use crate::services::report::{write_report, ReportSink};
use crate::workflow::pipeline::{apply_evaluation, image_metadata_now, SitePipeline};

/// Default number of sites in flight
pub const DEFAULT_CONCURRENCY: usize = 4;

/// One scheduled site
#[derive(Debug, Clone, PartialEq)]
pub struct SiteJob {
    pub sample_id: String,
    pub lat: f64,
    pub lon: f64,
    /// Coordinates are the configured fallback
    pub fallback: bool,
}

impl SiteJob {
    pub fn location(&self) -> SiteLocation {
        SiteLocation {
            lat: self.lat,
            lon: self.lon,
            fallback: self.fallback,
        }
    }
}

/// Resolve coordinates for each sample id
///
/// Sites that already have a record keep their stored coordinates, unless
/// those are the fallback location: such sites are resolved again so a row
/// added to the table since can correct them. Sites rejected by the
/// missing-coordinate policy or carrying an unusable id are returned as skip
/// errors.
pub fn plan_jobs<I>(
    sample_ids: I,
    table: &CoordinateTable,
    intake: &IntakeConfig,
    store: &RecordStore,
) -> (Vec<SiteJob>, Vec<SiteError>)
where
    I: IntoIterator<Item = String>,
{
    let mut jobs = Vec::new();
    let mut errors = Vec::new();

    for sample_id in sample_ids {
        if let Err(e) = validate_sample_id(&sample_id) {
            warn!(sample_id = %sample_id, "Skipping unusable sample id");
            errors.push(SiteError::skip(&sample_id, "INVALID_SAMPLE_ID", e.to_string()));
            continue;
        }

        match store.try_load(&sample_id) {
            Ok(Some(record)) if !record.coordinates_fallback => {
                jobs.push(SiteJob {
                    sample_id,
                    lat: record.lat,
                    lon: record.lon,
                    fallback: false,
                });
                continue;
            }
            Ok(_) => {}
            // the upsert reports it properly
            Err(e) => warn!(sample_id = %sample_id, error = %e, "Existing record unreadable"),
        }

        match table.resolve(&sample_id, intake) {
            Ok(location) => jobs.push(SiteJob {
                sample_id,
                lat: location.lat,
                lon: location.lon,
                fallback: location.fallback,
            }),
            Err(e) => {
                warn!(sample_id = %sample_id, error = %e, "Site rejected by coordinate policy");
                errors.push(SiteError::skip(&sample_id, "MISSING_COORDINATES", e.to_string()));
            }
        }
    }

    (jobs, errors)
}

/// Result of auditing one site that did not fail
#[derive(Debug, Clone)]
pub enum SiteOutcome {
    /// A machine verdict was stored
    Written {
        record: SiteRecord,
        warnings: Vec<SiteError>,
    },
    /// The stored record awaits or carries a human decision and was left alone
    Held {
        record: SiteRecord,
        warnings: Vec<SiteError>,
    },
}

impl SiteOutcome {
    pub fn record(&self) -> &SiteRecord {
        match self {
            SiteOutcome::Written { record, .. } | SiteOutcome::Held { record, .. } => record,
        }
    }

    pub fn warnings(&self) -> &[SiteError] {
        match self {
            SiteOutcome::Written { warnings, .. } | SiteOutcome::Held { warnings, .. } => warnings,
        }
    }
}

#[derive(Clone)]
struct ReportTarget {
    sink: Arc<dyn ReportSink>,
    dir: PathBuf,
}

#[derive(Clone)]
struct OverlayTarget {
    renderer: Arc<OverlayRenderer>,
    dir: PathBuf,
}

/// Drives a set of [`SiteJob`]s through the pipeline into the store
pub struct BatchRunner {
    store: Arc<RecordStore>,
    source: Arc<dyn ImageSource>,
    detector: Arc<dyn Detector>,
    pipeline: Arc<SitePipeline>,
    imagery: ImageryConfig,
    reports: Option<ReportTarget>,
    overlays: Option<OverlayTarget>,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(
        store: Arc<RecordStore>,
        source: Arc<dyn ImageSource>,
        detector: Arc<dyn Detector>,
        pipeline: SitePipeline,
        imagery: ImageryConfig,
    ) -> Self {
        Self {
            store,
            source,
            detector,
            pipeline: Arc::new(pipeline),
            imagery,
            reports: None,
            overlays: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Regenerate each written record's report into `dir`
    pub fn with_reports(mut self, sink: Arc<dyn ReportSink>, dir: impl Into<PathBuf>) -> Self {
        self.reports = Some(ReportTarget {
            sink,
            dir: dir.into(),
        });
        self
    }

    /// Write an annotated `<id>_audit.jpg` for each written record into `dir`
    pub fn with_overlays(mut self, renderer: OverlayRenderer, dir: impl Into<PathBuf>) -> Self {
        self.overlays = Some(OverlayTarget {
            renderer: Arc::new(renderer),
            dir: dir.into(),
        });
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run(&self, jobs: Vec<SiteJob>, cancel: CancellationToken) -> BatchRun {
        let mut run = BatchRun::new(jobs.len());
        info!(
            run_id = %run.run_id,
            sites = jobs.len(),
            source = self.source.name(),
            detector = self.detector.name(),
            concurrency = self.concurrency,
            "Batch run started"
        );

        let mut outcomes = stream::iter(jobs)
            .map(|job| {
                let cancel = cancel.clone();
                async move {
                    if cancel.is_cancelled() {
                        return None;
                    }
                    Some(self.process_site(job).await)
                }
            })
            .buffer_unordered(self.concurrency);

        while let Some(outcome) = outcomes.next().await {
            match outcome {
                None => {}
                Some(Ok(SiteOutcome::Written { record, warnings })) => {
                    for warning in warnings {
                        run.add_error(warning);
                    }
                    run.record_success(record.is_certified());
                }
                Some(Ok(SiteOutcome::Held { warnings, .. })) => {
                    for warning in warnings {
                        run.add_error(warning);
                    }
                    run.record_unchanged();
                }
                Some(Err(error)) => run.record_failure(error),
            }

            let attempted = run.progress.attempted;
            if attempted > 0 && (attempted % 10 == 0 || attempted == run.progress.total) {
                info!(
                    run_id = %run.run_id,
                    progress = format!("{}/{}", attempted, run.progress.total),
                    "Batch progress"
                );
            }
        }

        let cancelled = cancel.is_cancelled() && run.not_attempted() > 0;
        run.finish(cancelled);

        info!(
            run_id = %run.run_id,
            state = ?run.state,
            succeeded = run.progress.succeeded,
            failed = run.progress.failed,
            unchanged = run.progress.unchanged,
            solar_confirmed = run.progress.solar_confirmed,
            not_attempted = run.not_attempted(),
            "Batch run finished"
        );
        run
    }

    /// Audit a single site outside of a batch
    pub async fn audit_site(&self, job: SiteJob) -> Result<SiteOutcome, SiteError> {
        validate_sample_id(&job.sample_id)
            .map_err(|e| SiteError::skip(&job.sample_id, "INVALID_SAMPLE_ID", e.to_string()))?;
        self.process_site(job).await
    }

    async fn process_site(&self, job: SiteJob) -> Result<SiteOutcome, SiteError> {
        // held sites are not fetched at all; the upsert re-checks under the lock
        if let Ok(Some(record)) = self.store.try_load(&job.sample_id) {
            if !record.qc_status.accepts_machine_verdict() {
                let warnings = held_warnings(&record, &job);
                return Ok(SiteOutcome::Held { record, warnings });
            }
        }

        let request = SiteRequest::new(
            &job.sample_id,
            job.lat,
            job.lon,
            self.pipeline.zoom(),
            &self.imagery,
        );

        let bytes = self.source.fetch(&request).await.map_err(|e| {
            warn!(sample_id = %job.sample_id, error = %e, "Image fetch failed, skipping site");
            SiteError::skip(&job.sample_id, "FETCH_ERROR", e.to_string())
        })?;

        let metadata = image_metadata_now(self.source.name());
        let store = Arc::clone(&self.store);
        let pipeline = Arc::clone(&self.pipeline);
        let detector = Arc::clone(&self.detector);
        let artifacts = Artifacts {
            reports: self.reports.clone(),
            overlays: self.overlays.clone(),
        };
        let sample_id = job.sample_id.clone();

        tokio::task::spawn_blocking(move || {
            evaluate_and_store(&store, &pipeline, detector.as_ref(), &artifacts, &job, &bytes, metadata)
        })
        .await
        .map_err(|e| SiteError::skip(&sample_id, "INTERNAL_ERROR", e.to_string()))?
    }
}

struct Artifacts {
    reports: Option<ReportTarget>,
    overlays: Option<OverlayTarget>,
}

fn fallback_warning(job: &SiteJob) -> SiteError {
    SiteError::warning(
        &job.sample_id,
        "FALLBACK_COORDINATES",
        format!("evaluated at fallback location {}, {}", job.lat, job.lon),
    )
}

fn held_warnings(record: &SiteRecord, job: &SiteJob) -> Vec<SiteError> {
    let mut message = format!("{} record left unchanged", record.qc_status);
    if record.coordinates_fallback && !job.fallback {
        message.push_str("; coordinates stay at the fallback location until the site is re-opened");
    }
    info!(sample_id = %job.sample_id, status = %record.qc_status, "Site under review, not re-evaluated");

    let mut warnings = vec![SiteError::warning(&job.sample_id, "UNDER_REVIEW", message)];
    if record.coordinates_fallback && job.fallback {
        warnings.push(fallback_warning(job));
    }
    warnings
}

fn evaluate_and_store(
    store: &RecordStore,
    pipeline: &SitePipeline,
    detector: &dyn Detector,
    artifacts: &Artifacts,
    job: &SiteJob,
    bytes: &[u8],
    metadata: surya_common::ImageMetadata,
) -> Result<SiteOutcome, SiteError> {
    let id = job.sample_id.as_str();

    let image = image::load_from_memory(bytes).map_err(|e| {
        warn!(sample_id = %id, error = %e, "Image decode failed, skipping site");
        SiteError::skip(id, "DECODE_ERROR", e.to_string())
    })?;

    let evaluation = pipeline.run(id, &image, detector, job.lat).map_err(|e| {
        warn!(sample_id = %id, error = %e, "Detector failed, skipping site");
        SiteError::skip(id, "DETECTOR_ERROR", e.to_string())
    })?;

    let mut extra_notes = Vec::new();
    let mut warnings = Vec::new();
    if job.fallback {
        extra_notes.push(NOTE_FALLBACK_COORDINATES.to_string());
        warnings.push(fallback_warning(job));
    }

    let location = job.location();
    let mut held = None;
    let written = store
        .upsert(id, |existing| match existing {
            Some(record) if !record.qc_status.accepts_machine_verdict() => {
                held = Some(record);
                Ok(None)
            }
            existing => Ok(Some(apply_evaluation(
                existing,
                id,
                &location,
                &evaluation,
                &extra_notes,
                Some(metadata),
            ))),
        })
        .map_err(|e| {
            warn!(sample_id = %id, error = %e, "Record write failed, skipping site");
            SiteError::skip(id, store_error_code(&e), e.to_string())
        })?;

    let Some(record) = written else {
        let record = held.ok_or_else(|| {
            SiteError::skip(id, "INTERNAL_ERROR", "record neither written nor held")
        })?;
        let warnings = held_warnings(&record, job);
        return Ok(SiteOutcome::Held { record, warnings });
    };

    if let Some(target) = &artifacts.reports {
        if let Err(e) = write_report(target.sink.as_ref(), &record, &target.dir) {
            warn!(sample_id = %id, error = %e, "Report generation failed");
            warnings.push(SiteError::warning(id, "REPORT_ERROR", e.to_string()));
        }
    }
    if let Some(target) = &artifacts.overlays {
        let written = target.renderer.write(
            id,
            &image,
            &evaluation.candidates,
            evaluation.scale,
            &evaluation.verdict,
            &target.dir,
        );
        if let Err(e) = written {
            warn!(sample_id = %id, error = %e, "Overlay generation failed");
            warnings.push(SiteError::warning(id, "OVERLAY_ERROR", e.to_string()));
        }
    }

    info!(
        sample_id = %id,
        status = %record.qc_status,
        has_solar = record.has_solar,
        zone = %record.buffer_zone,
        revision = record.revision,
        "Site audited"
    );
    Ok(SiteOutcome::Written { record, warnings })
}

fn store_error_code(error: &Error) -> &'static str {
    match error {
        Error::Integrity { .. } => "INTEGRITY_ERROR",
        Error::RevisionConflict { .. } => "REVISION_CONFLICT",
        _ => "STORE_ERROR",
    }
}
