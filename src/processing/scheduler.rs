// src/processing/scheduler.rs
use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;

use crate::error::PipelineError;
use crate::plot::PlotDescriptor;
use crate::processing::BandAlgebraEngine;
use crate::quality::{CloudMaskResult, MaskState, QualityFilter};
use crate::selection::{select_dates, DateSelectorParams, SearchCache};
use crate::services::{
    ImageryDownload, ImagerySearch, OutputWriter, RateLimiter, SceneRef, SearchResult,
};
use crate::store::{ProcessingRecordStore, ProcessingStats};
use crate::utils::retry::{run_with_retry, RetryPolicy};

/// Terminal state of one (plot, date) processing attempt.
#[derive(Debug)]
pub enum DateOutcome {
    Processed,
    /// Already committed in a previous run.
    SkippedExisting,
    /// Another worker holds the reservation right now.
    SkippedConflict,
    /// Scene downloaded but below quality thresholds. Not an error: the
    /// date stays retryable and is reported with its coverage figures.
    QualityRejected {
        cloud_coverage_pct: f64,
        data_coverage_pct: f64,
    },
    Failed(PipelineError),
}

/// Per-plot processing report, one entry per selected date.
#[derive(Debug)]
pub struct PlotReport {
    pub plot_id: String,
    pub candidate_dates: usize,
    pub selected_dates: usize,
    pub outcomes: Vec<(NaiveDate, DateOutcome)>,
}

impl PlotReport {
    pub fn processed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, DateOutcome::Processed))
            .count()
    }

    pub fn rejected(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, DateOutcome::QualityRejected { .. }))
            .count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, DateOutcome::Failed(_)))
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| {
                matches!(o, DateOutcome::SkippedExisting | DateOutcome::SkippedConflict)
            })
            .count()
    }
}

/// Drives one plot through search, date selection and per-date scene
/// processing. Shared by all batch workers; every collaborator behind it
/// is thread safe.
pub struct AcquisitionScheduler {
    search: Arc<dyn ImagerySearch>,
    download: Arc<dyn ImageryDownload>,
    writer: Arc<dyn OutputWriter>,
    store: Arc<dyn ProcessingRecordStore>,
    cache: Arc<SearchCache>,
    limiter: Arc<RateLimiter>,
    engine: BandAlgebraEngine,
    quality: QualityFilter,
    selector: DateSelectorParams,
    retry: RetryPolicy,
}

impl AcquisitionScheduler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        search: Arc<dyn ImagerySearch>,
        download: Arc<dyn ImageryDownload>,
        writer: Arc<dyn OutputWriter>,
        store: Arc<dyn ProcessingRecordStore>,
        cache: Arc<SearchCache>,
        limiter: Arc<RateLimiter>,
        engine: BandAlgebraEngine,
        quality: QualityFilter,
        selector: DateSelectorParams,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            search,
            download,
            writer,
            store,
            cache,
            limiter,
            engine,
            quality,
            selector,
            retry,
        }
    }

    /// Search the season window for the plot, serving from the cache when
    /// a fresh entry exists.
    pub fn available_dates(&self, plot: &PlotDescriptor) -> Result<SearchResult, PipelineError> {
        let (start, end) = plot.search_window();
        let ring = plot.closed_ring();
        let max_cloud = self.selector.max_cloud_pct;

        if let Some(cached) = self.cache.lookup(&ring, start, end, max_cloud) {
            return Ok(cached);
        }

        let result = run_with_retry(&self.retry, "catalogue search", || {
            let _permit = self.limiter.acquire();
            self.search.search(&ring, start, end, max_cloud)
        })?;
        self.cache.store(&ring, start, end, max_cloud, result.clone());
        Ok(result)
    }

    /// Select the dates worth processing for this plot's season.
    pub fn plan(&self, plot: &PlotDescriptor) -> Result<Vec<NaiveDate>, PipelineError> {
        plot.validate()?;
        let candidates = self.available_dates(plot)?;
        Ok(select_dates(
            &candidates,
            &plot.growth_stage_anchors(),
            &self.selector,
        ))
    }

    /// Process every selected date of one plot, chronologically. Per-date
    /// failures are recorded in the report and never abort the plot.
    pub fn process_plot(&self, plot: &PlotDescriptor) -> Result<PlotReport, PipelineError> {
        plot.validate()?;
        let candidates = self.available_dates(plot)?;
        let selected = select_dates(&candidates, &plot.growth_stage_anchors(), &self.selector);
        tracing::info!(
            plot = %plot.id,
            candidates = candidates.len(),
            selected = selected.len(),
            "processing plot"
        );

        let mut outcomes = Vec::with_capacity(selected.len());
        for date in &selected {
            let scene = &candidates[date];
            let outcome = self.process_date(plot, *date, scene);
            if let DateOutcome::Failed(err) = &outcome {
                tracing::error!(plot = %plot.id, %date, error = %err, "date processing failed");
            }
            outcomes.push((*date, outcome));
        }

        Ok(PlotReport {
            plot_id: plot.id.clone(),
            candidate_dates: candidates.len(),
            selected_dates: selected.len(),
            outcomes,
        })
    }

    /// Download, mask, derive and persist one scene. The store reservation
    /// is committed only on full success; rejection and failure release it
    /// so a later run can retry the date.
    pub fn process_date(
        &self,
        plot: &PlotDescriptor,
        date: NaiveDate,
        scene: &SceneRef,
    ) -> DateOutcome {
        if self.store.exists(&plot.id, date) {
            tracing::debug!(plot = %plot.id, %date, "already processed, skipping");
            return DateOutcome::SkippedExisting;
        }
        if !self.store.try_reserve(&plot.id, date) {
            tracing::debug!(plot = %plot.id, %date, "reserved by another worker, skipping");
            return DateOutcome::SkippedConflict;
        }

        let started = Instant::now();
        match self.process_reserved(plot, date, scene, started) {
            Ok((stats, quality)) => {
                debug_assert_eq!(quality.state, MaskState::Accepted);
                self.store.commit(&plot.id, date, stats);
                DateOutcome::Processed
            }
            Err(RejectOrFail::Rejected(mask)) => {
                self.store.release(&plot.id, date);
                tracing::info!(
                    plot = %plot.id,
                    %date,
                    cloud = mask.cloud_coverage_pct,
                    data = mask.data_coverage_pct,
                    "scene rejected by quality filter"
                );
                DateOutcome::QualityRejected {
                    cloud_coverage_pct: mask.cloud_coverage_pct,
                    data_coverage_pct: mask.data_coverage_pct,
                }
            }
            Err(RejectOrFail::Failed(err)) => {
                self.store.release(&plot.id, date);
                DateOutcome::Failed(err)
            }
        }
    }

    fn process_reserved(
        &self,
        plot: &PlotDescriptor,
        date: NaiveDate,
        scene: &SceneRef,
        started: Instant,
    ) -> Result<(ProcessingStats, CloudMaskResult), RejectOrFail> {
        let bands = self.engine.required_bands(true);
        let ring = plot.closed_ring();
        let mut band_set = run_with_retry(&self.retry, "scene download", || {
            let _permit = self.limiter.acquire();
            self.download.fetch(scene, &ring, date, &bands)
        })
        .map_err(RejectOrFail::Failed)?;

        let mask = self
            .quality
            .evaluate(&band_set)
            .map_err(RejectOrFail::Failed)?;
        if mask.state == MaskState::Rejected {
            return Err(RejectOrFail::Rejected(mask));
        }
        self.quality.apply(&mut band_set, &mask);

        let (results, failures) = self.engine.compute(&band_set);
        if results.is_empty() {
            let err = failures.into_iter().next().unwrap_or_else(|| {
                PipelineError::DataFormat("no index produced output".to_string())
            });
            return Err(RejectOrFail::Failed(err));
        }

        let elapsed = started.elapsed().as_secs_f64();
        let output_path = self
            .writer
            .write(plot, date, &results, &mask, elapsed)
            .map_err(RejectOrFail::Failed)?;

        let stats = ProcessingStats {
            satellite_date: date,
            indices: results.iter().map(|r| r.name.clone()).collect(),
            cloud_coverage_pct: mask.cloud_coverage_pct,
            data_coverage_pct: mask.data_coverage_pct,
            elapsed_secs: elapsed,
            output_path: output_path.map(|p| p.display().to_string()),
        };
        Ok((stats, mask))
    }
}

enum RejectOrFail {
    Rejected(CloudMaskResult),
    Failed(PipelineError),
}
