// tests/selection_tests.rs
use chrono::{Duration, NaiveDate, Utc};

use agro_scout::selection::{select_dates, DateSelectorParams, SearchCache};
use agro_scout::services::{SceneRef, SearchResult};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn candidates(base: NaiveDate, offsets_and_cloud: &[(i64, f64)]) -> SearchResult {
    offsets_and_cloud
        .iter()
        .enumerate()
        .map(|(i, &(offset, cloud))| {
            (
                base + Duration::days(offset),
                SceneRef {
                    scene_id: format!("scene-{i}"),
                    cloud_pct: cloud,
                },
            )
        })
        .collect()
}

fn no_bias() -> DateSelectorParams {
    DateSelectorParams {
        growth_stage_bias: false,
        ..DateSelectorParams::default()
    }
}

#[test]
fn greedy_selection_enforces_minimum_interval() {
    let base = date(2024, 5, 1);
    let input = candidates(
        base,
        &[(0, 5.0), (1, 5.0), (2, 5.0), (10, 5.0), (11, 5.0), (20, 5.0)],
    );
    let selected = select_dates(&input, &[], &no_bias());
    assert_eq!(
        selected,
        vec![base, base + Duration::days(10), base + Duration::days(20)]
    );
}

#[test]
fn earliest_candidate_is_always_kept() {
    let base = date(2024, 5, 1);
    let input = candidates(base, &[(3, 12.0), (4, 2.0)]);
    let selected = select_dates(&input, &[], &no_bias());
    assert_eq!(selected[0], base + Duration::days(3));
}

#[test]
fn cloudy_candidates_are_discarded() {
    let base = date(2024, 5, 1);
    let input = candidates(base, &[(0, 5.0), (8, 45.0), (16, 10.0)]);
    let selected = select_dates(&input, &[], &no_bias());
    assert_eq!(selected, vec![base, base + Duration::days(16)]);
}

#[test]
fn empty_candidates_yield_empty_selection() {
    let input = SearchResult::new();
    let anchors = vec![date(2024, 6, 1)];
    assert!(select_dates(&input, &anchors, &DateSelectorParams::default()).is_empty());
}

#[test]
fn anchor_prefers_lowest_cloud_within_tolerance() {
    let base = date(2024, 5, 1);
    let anchor = base + Duration::days(30);
    // Both candidates sit within the +/-3 day tolerance and both are too
    // close to the previous kept date; only the clearer one survives as
    // the anchor favourite.
    let input = candidates(base, &[(26, 5.0), (29, 15.0), (31, 4.0)]);
    let selected = select_dates(&input, &[anchor], &DateSelectorParams::default());
    assert!(selected.contains(&(base + Duration::days(31))));
    assert!(!selected.contains(&(base + Duration::days(29))));
}

#[test]
fn anchor_winner_overrides_spacing() {
    let base = date(2024, 5, 1);
    let anchor = base + Duration::days(14);
    // Day 12 is kept by spacing; day 14 is within 7 days of it but is the
    // anchor favourite, so both survive.
    let input = candidates(base, &[(0, 5.0), (12, 5.0), (14, 3.0)]);
    let selected = select_dates(&input, &[anchor], &DateSelectorParams::default());
    assert!(selected.contains(&(base + Duration::days(12))));
    assert!(selected.contains(&(base + Duration::days(14))));
}

#[test]
fn anchor_ties_go_to_the_earlier_date() {
    let base = date(2024, 5, 1);
    let anchor = base + Duration::days(30);
    let input = candidates(base, &[(28, 5.0), (32, 5.0)]);
    let selected = select_dates(&input, &[anchor], &DateSelectorParams::default());
    assert!(selected.contains(&(base + Duration::days(28))));
    assert!(!selected.contains(&(base + Duration::days(32))));
}

#[test]
fn disabled_bias_ignores_anchors() {
    let base = date(2024, 5, 1);
    let anchor = base + Duration::days(14);
    let input = candidates(base, &[(0, 5.0), (12, 5.0), (14, 3.0)]);
    let selected = select_dates(&input, &[anchor], &no_bias());
    assert_eq!(selected, vec![base, base + Duration::days(12)]);
}

#[test]
fn cache_round_trip() {
    let cache = SearchCache::new(24);
    let ring = [(13.0, 45.0), (13.01, 45.0), (13.01, 45.01), (13.0, 45.0)];
    let (start, end) = (date(2024, 1, 1), date(2024, 4, 1));
    let result = candidates(start, &[(0, 5.0), (6, 10.0)]);

    assert!(cache.lookup(&ring, start, end, 20.0).is_none());
    cache.store(&ring, start, end, 20.0, result.clone());
    assert_eq!(cache.lookup(&ring, start, end, 20.0), Some(result));
    assert_eq!(cache.len(), 1);
}

#[test]
fn cache_key_covers_the_whole_query() {
    let cache = SearchCache::new(24);
    let ring = [(13.0, 45.0), (13.01, 45.0), (13.01, 45.01), (13.0, 45.0)];
    let (start, end) = (date(2024, 1, 1), date(2024, 4, 1));
    cache.store(&ring, start, end, 20.0, SearchResult::new());

    // Different cloud threshold, date range or geometry must miss.
    assert!(cache.lookup(&ring, start, end, 30.0).is_none());
    assert!(cache
        .lookup(&ring, start, end + Duration::days(1), 20.0)
        .is_none());
    let other_ring = [(13.0, 45.0), (13.02, 45.0), (13.02, 45.01), (13.0, 45.0)];
    assert!(cache.lookup(&other_ring, start, end, 20.0).is_none());
}

#[test]
fn cache_entries_expire_after_ttl() {
    let cache = SearchCache::new(24);
    let ring = [(13.0, 45.0), (13.01, 45.0), (13.01, 45.01), (13.0, 45.0)];
    let (start, end) = (date(2024, 1, 1), date(2024, 4, 1));
    let stored_at = Utc::now();
    cache.store_at(&ring, start, end, 20.0, SearchResult::new(), stored_at);

    let just_before = stored_at + Duration::hours(24) - Duration::seconds(1);
    assert!(cache.lookup_at(&ring, start, end, 20.0, just_before).is_some());

    let at_expiry = stored_at + Duration::hours(24);
    assert!(cache.lookup_at(&ring, start, end, 20.0, at_expiry).is_none());
    // The expired entry is purged, not kept around.
    assert!(cache.is_empty());
}
