// tests/pipeline_tests.rs
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;

use agro_scout::error::PipelineError;
use agro_scout::io::sidecar_metadata;
use agro_scout::plot::PlotDescriptor;
use agro_scout::processing::indices::IndexKind;
use agro_scout::processing::{AcquisitionScheduler, BandAlgebraEngine, DateOutcome};
use agro_scout::quality::{CloudMaskResult, QualityFilter, QualityThresholds};
use agro_scout::selection::{DateSelectorParams, SearchCache};
use agro_scout::services::{
    ImageryDownload, ImagerySearch, OutputWriter, RateLimiter, SceneRef, SearchResult,
};
use agro_scout::store::{InMemoryRecordStore, ProcessingRecordStore};
use agro_scout::raster::{BandId, BandSet, Raster};
use agro_scout::utils::retry::{run_with_retry, RetryPolicy};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn test_plot() -> PlotDescriptor {
    PlotDescriptor {
        id: "plot-a".to_string(),
        ring: vec![
            (13.0, 45.0),
            (13.01, 45.0),
            (13.01, 45.01),
            (13.0, 45.01),
            (13.0, 45.0),
        ],
        planting: date(2024, 1, 8),
        harvest: date(2024, 3, 25),
    }
}

/// Fixed availability: one scene every `step` days across the window.
struct FixedSearch {
    dates: Vec<NaiveDate>,
    cloud_pct: f64,
    calls: AtomicUsize,
}

impl FixedSearch {
    fn every_three_days(start: NaiveDate, count: usize) -> Self {
        Self {
            dates: (0..count)
                .map(|i| start + chrono::Duration::days(3 * i as i64))
                .collect(),
            cloud_pct: 5.0,
            calls: AtomicUsize::new(0),
        }
    }
}

impl ImagerySearch for FixedSearch {
    fn search(
        &self,
        _ring: &[(f64, f64)],
        _start: NaiveDate,
        _end: NaiveDate,
        _max_cloud_pct: f64,
    ) -> Result<SearchResult, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .dates
            .iter()
            .enumerate()
            .map(|(i, &d)| {
                (
                    d,
                    SceneRef {
                        scene_id: format!("S2-{i}"),
                        cloud_pct: self.cloud_pct,
                    },
                )
            })
            .collect())
    }
}

/// Synthesizes a scene in memory; SCL class is configurable so tests can
/// force acceptance or rejection.
struct SyntheticDownload {
    scl_class: u8,
    calls: AtomicUsize,
    fail_with_network: bool,
}

impl SyntheticDownload {
    fn clear_scenes() -> Self {
        Self {
            scl_class: 4,
            calls: AtomicUsize::new(0),
            fail_with_network: false,
        }
    }

    fn cloudy_scenes() -> Self {
        Self {
            scl_class: 9,
            calls: AtomicUsize::new(0),
            fail_with_network: false,
        }
    }

    fn failing() -> Self {
        Self {
            scl_class: 4,
            calls: AtomicUsize::new(0),
            fail_with_network: true,
        }
    }
}

impl ImageryDownload for SyntheticDownload {
    fn fetch(
        &self,
        _scene: &SceneRef,
        _ring: &[(f64, f64)],
        _date: NaiveDate,
        bands: &[BandId],
    ) -> Result<BandSet, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_with_network {
            return Err(PipelineError::Network("connection reset".to_string()));
        }
        let (w, h) = (8, 8);
        let mut set = BandSet::new(w, h);
        for &band in bands {
            if band == BandId::Scl {
                set.insert_scl(Raster::new(w, h, vec![self.scl_class; w * h])?)?;
            } else {
                let dn = match band {
                    BandId::B08 => 4000.0,
                    _ => 800.0,
                };
                set.insert(band, Raster::filled(w, h, dn))?;
            }
        }
        Ok(set)
    }
}

/// Records writes without touching the filesystem.
#[derive(Default)]
struct RecordingWriter {
    calls: AtomicUsize,
}

impl OutputWriter for RecordingWriter {
    fn write(
        &self,
        plot: &PlotDescriptor,
        d: NaiveDate,
        _results: &[agro_scout::processing::IndexResult],
        _quality: &CloudMaskResult,
        _elapsed_secs: f64,
    ) -> Result<Option<std::path::PathBuf>, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(
            std::path::PathBuf::from("out").join(&plot.id).join(d.to_string()),
        ))
    }
}

struct Harness {
    scheduler: AcquisitionScheduler,
    search: Arc<FixedSearch>,
    download: Arc<SyntheticDownload>,
    writer: Arc<RecordingWriter>,
    store: Arc<InMemoryRecordStore>,
}

fn harness(search: FixedSearch, download: SyntheticDownload) -> Harness {
    let search = Arc::new(search);
    let download = Arc::new(download);
    let writer = Arc::new(RecordingWriter::default());
    let store = Arc::new(InMemoryRecordStore::new());
    let scheduler = AcquisitionScheduler::new(
        search.clone(),
        download.clone(),
        writer.clone(),
        store.clone(),
        Arc::new(SearchCache::new(24)),
        Arc::new(RateLimiter::new(2, Duration::ZERO)),
        BandAlgebraEngine::new(vec![IndexKind::Ndvi, IndexKind::Ndre]),
        QualityFilter::new(QualityThresholds::default()),
        DateSelectorParams {
            growth_stage_bias: false,
            ..DateSelectorParams::default()
        },
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        },
    );
    Harness {
        scheduler,
        search,
        download,
        writer,
        store,
    }
}

#[test]
fn end_to_end_processes_spaced_dates() {
    let h = harness(
        FixedSearch::every_three_days(date(2024, 1, 2), 10),
        SyntheticDownload::clear_scenes(),
    );
    let plot = test_plot();
    let report = h.scheduler.process_plot(&plot).unwrap();

    assert_eq!(report.candidate_dates, 10);
    assert!(report.selected_dates >= 2);
    assert_eq!(report.processed(), report.selected_dates);
    assert_eq!(report.failed(), 0);

    // Selected dates honor the 7-day spacing.
    let dates: Vec<NaiveDate> = report.outcomes.iter().map(|(d, _)| *d).collect();
    for pair in dates.windows(2) {
        assert!((pair[1] - pair[0]).num_days() >= 7);
    }

    assert_eq!(h.writer.calls.load(Ordering::SeqCst), report.processed());
    assert_eq!(h.store.committed_count(), report.processed());
    assert_eq!(h.search.calls.load(Ordering::SeqCst), 1);

    let first = dates[0];
    let stats = h.store.stats_for(&plot.id, first).unwrap();
    assert_eq!(stats.indices, vec!["NDVI".to_string(), "NDRE".to_string()]);
    assert!(stats.output_path.is_some());
}

#[test]
fn second_run_skips_committed_dates() {
    let h = harness(
        FixedSearch::every_three_days(date(2024, 1, 2), 10),
        SyntheticDownload::clear_scenes(),
    );
    let plot = test_plot();
    let first = h.scheduler.process_plot(&plot).unwrap();
    let downloads_after_first = h.download.calls.load(Ordering::SeqCst);

    let second = h.scheduler.process_plot(&plot).unwrap();
    assert_eq!(h.download.calls.load(Ordering::SeqCst), downloads_after_first);
    assert_eq!(second.processed(), 0);
    assert_eq!(second.skipped(), first.processed());
    assert!(second
        .outcomes
        .iter()
        .all(|(_, o)| matches!(o, DateOutcome::SkippedExisting)));
}

#[test]
fn search_results_are_cached_across_calls() {
    let h = harness(
        FixedSearch::every_three_days(date(2024, 1, 2), 4),
        SyntheticDownload::clear_scenes(),
    );
    let plot = test_plot();
    h.scheduler.available_dates(&plot).unwrap();
    h.scheduler.available_dates(&plot).unwrap();
    assert_eq!(h.search.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn rejected_scene_is_not_committed_and_stays_retryable() {
    let h = harness(
        FixedSearch::every_three_days(date(2024, 1, 2), 4),
        SyntheticDownload::cloudy_scenes(),
    );
    let plot = test_plot();
    let report = h.scheduler.process_plot(&plot).unwrap();

    assert_eq!(report.processed(), 0);
    assert_eq!(report.rejected(), report.selected_dates);
    assert_eq!(h.store.committed_count(), 0);
    assert_eq!(h.writer.calls.load(Ordering::SeqCst), 0);

    // Rejection reports coverage figures and releases the reservation.
    let (d, outcome) = &report.outcomes[0];
    match outcome {
        DateOutcome::QualityRejected {
            cloud_coverage_pct, ..
        } => assert!(*cloud_coverage_pct > 20.0),
        other => panic!("expected QualityRejected, got {other:?}"),
    }
    assert!(h.store.try_reserve(&plot.id, *d));
}

#[test]
fn failed_download_is_retried_then_reported() {
    let h = harness(
        FixedSearch::every_three_days(date(2024, 1, 2), 1),
        SyntheticDownload::failing(),
    );
    let plot = test_plot();
    let report = h.scheduler.process_plot(&plot).unwrap();

    assert_eq!(report.selected_dates, 1);
    assert_eq!(report.failed(), 1);
    // Network errors are retryable, so the download is attempted
    // max_attempts times before giving up.
    assert_eq!(h.download.calls.load(Ordering::SeqCst), 3);
    assert_eq!(h.store.committed_count(), 0);
    assert!(h.store.try_reserve(&plot.id, report.outcomes[0].0));
}

#[test]
fn try_reserve_admits_exactly_one_worker() {
    let store = Arc::new(InMemoryRecordStore::new());
    let d = date(2024, 2, 1);
    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = store.clone();
        handles.push(std::thread::spawn(move || store.try_reserve("plot-a", d)));
    }
    let wins: usize = handles
        .into_iter()
        .map(|h| h.join().unwrap() as usize)
        .sum();
    assert_eq!(wins, 1);
}

#[test]
fn released_reservation_can_be_claimed_again() {
    let store = InMemoryRecordStore::new();
    let d = date(2024, 2, 1);
    assert!(store.try_reserve("plot-a", d));
    assert!(!store.try_reserve("plot-a", d));
    store.release("plot-a", d);
    assert!(store.try_reserve("plot-a", d));
}

#[test]
fn commit_is_permanent() {
    let store = InMemoryRecordStore::new();
    let d = date(2024, 2, 1);
    assert!(store.try_reserve("plot-a", d));
    store.commit(
        "plot-a",
        d,
        agro_scout::store::ProcessingStats {
            satellite_date: d,
            indices: vec!["NDVI".to_string()],
            cloud_coverage_pct: 1.0,
            data_coverage_pct: 99.0,
            elapsed_secs: 0.1,
            output_path: None,
        },
    );
    assert!(store.exists("plot-a", d));
    // Release after commit must not reopen the key.
    store.release("plot-a", d);
    assert!(store.exists("plot-a", d));
    assert!(!store.try_reserve("plot-a", d));
}

#[test]
fn rate_limiter_spaces_admissions() {
    let limiter = RateLimiter::new(2, Duration::from_millis(40));
    let start = Instant::now();
    drop(limiter.acquire());
    drop(limiter.acquire());
    drop(limiter.acquire());
    // Three admissions need at least two spacing gaps.
    assert!(start.elapsed() >= Duration::from_millis(80));
}

#[test]
fn rate_limiter_caps_concurrency() {
    let limiter = Arc::new(RateLimiter::new(1, Duration::ZERO));
    let permit = limiter.acquire();
    let limiter2 = limiter.clone();
    let handle = std::thread::spawn(move || {
        let start = Instant::now();
        drop(limiter2.acquire());
        start.elapsed()
    });
    std::thread::sleep(Duration::from_millis(50));
    drop(permit);
    let waited = handle.join().unwrap();
    assert!(waited >= Duration::from_millis(40));
}

#[test]
fn retry_stops_after_max_attempts() {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    };
    let attempts = AtomicUsize::new(0);
    let result: Result<(), _> = run_with_retry(&policy, "test op", || {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::Network("boom".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn retry_does_not_repeat_permanent_errors() {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    };
    let attempts = AtomicUsize::new(0);
    let result: Result<(), _> = run_with_retry(&policy, "test op", || {
        attempts.fetch_add(1, Ordering::SeqCst);
        Err(PipelineError::DataFormat("bad tiff".to_string()))
    });
    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn retry_recovers_after_transient_failure() {
    let policy = RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
    };
    let attempts = AtomicUsize::new(0);
    let result = run_with_retry(&policy, "test op", || {
        if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(PipelineError::Network("boom".to_string()))
        } else {
            Ok(42)
        }
    });
    assert_eq!(result.unwrap(), 42);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}

#[test]
fn sidecar_metadata_describes_every_index() {
    let plot = test_plot();
    let engine = BandAlgebraEngine::new(vec![
        IndexKind::Ndvi,
        IndexKind::Ndre,
        IndexKind::Msavi,
        IndexKind::Ndmi,
        IndexKind::TrueColor,
    ]);
    let download = SyntheticDownload::clear_scenes();
    let bands = engine.required_bands(true);
    let band_set = download
        .fetch(
            &SceneRef {
                scene_id: "S2-0".to_string(),
                cloud_pct: 5.0,
            },
            &plot.closed_ring(),
            date(2024, 2, 1),
            &bands,
        )
        .unwrap();

    let filter = QualityFilter::new(QualityThresholds::default());
    let mask = filter.evaluate(&band_set).unwrap();
    let (results, failures) = engine.compute(&band_set);
    assert!(failures.is_empty());
    assert_eq!(results.len(), 5);

    let metadata = sidecar_metadata(&plot, date(2024, 2, 1), &results, &mask, 1.5);
    assert_eq!(metadata["plot_id"], "plot-a");
    assert_eq!(metadata["satellite_date"], "2024-02-01");
    let indices = metadata["indices"].as_array().unwrap();
    assert_eq!(indices.len(), 5);
    for entry in indices {
        assert!(entry["formula"].as_str().unwrap().len() > 1);
        assert!(entry["stats"]["total_pixels"].as_u64().unwrap() > 0);
    }
    assert_eq!(metadata["quality"]["state"], "accepted");
}
