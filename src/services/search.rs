// src/services/search.rs
use std::sync::Arc;

use chrono::NaiveDate;

use crate::error::PipelineError;
use crate::services::{ImagerySearch, SceneRef, SearchResult, TokenProvider};

/// OData catalogue client for Sentinel-2 availability queries.
pub struct CopernicusSearch {
    search_url: String,
    http: reqwest::blocking::Client,
    tokens: Arc<dyn TokenProvider>,
    page_size: usize,
}

impl CopernicusSearch {
    pub fn new(
        search_url: &str,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, PipelineError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| PipelineError::Config(format!("http client: {e}")))?;
        Ok(Self {
            search_url: search_url.to_string(),
            http,
            tokens,
            page_size: 200,
        })
    }

    fn build_filter(
        ring: &[(f64, f64)],
        start: NaiveDate,
        end: NaiveDate,
        max_cloud_pct: f64,
    ) -> String {
        let mut min_lon = f64::INFINITY;
        let mut min_lat = f64::INFINITY;
        let mut max_lon = f64::NEG_INFINITY;
        let mut max_lat = f64::NEG_INFINITY;
        for &(lon, lat) in ring {
            min_lon = min_lon.min(lon);
            min_lat = min_lat.min(lat);
            max_lon = max_lon.max(lon);
            max_lat = max_lat.max(lat);
        }
        let polygon = format!(
            "POLYGON(({min_lon} {min_lat},{max_lon} {min_lat},{max_lon} {max_lat},{min_lon} {max_lat},{min_lon} {min_lat}))"
        );
        format!(
            "Collection/Name eq 'SENTINEL-2' and \
             ContentDate/Start ge {start}T00:00:00.000Z and \
             ContentDate/Start le {end}T23:59:59.999Z and \
             Attributes/OData.CSC.DoubleAttribute/any(att:att/Name eq 'cloudCover' and att/OData.CSC.DoubleAttribute/Value le {max_cloud_pct}) and \
             OData.CSC.Intersects(area=geography'SRID=4326;{polygon}')"
        )
    }
}

impl ImagerySearch for CopernicusSearch {
    fn search(
        &self,
        ring: &[(f64, f64)],
        start: NaiveDate,
        end: NaiveDate,
        max_cloud_pct: f64,
    ) -> Result<SearchResult, PipelineError> {
        let token = self.tokens.bearer_token()?;
        tracing::info!("searching catalogue for acquisitions {start}..{end}");

        let response = self
            .http
            .get(&self.search_url)
            .query(&[
                ("$filter", Self::build_filter(ring, start, end, max_cloud_pct)),
                ("$orderby", "ContentDate/Start asc".to_string()),
                ("$top", self.page_size.to_string()),
            ])
            .bearer_auth(token)
            .send()
            .map_err(classify_transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, "catalogue search"));
        }
        let body: serde_json::Value = response
            .json()
            .map_err(|e| PipelineError::DataFormat(format!("search response unparseable: {e}")))?;

        let mut result = SearchResult::new();
        for product in body.get("value").and_then(|v| v.as_array()).into_iter().flatten() {
            let Some(date) = product
                .get("ContentDate")
                .and_then(|c| c.get("Start"))
                .and_then(|s| s.as_str())
                .and_then(|s| NaiveDate::parse_from_str(&s[..s.len().min(10)], "%Y-%m-%d").ok())
            else {
                continue;
            };
            let scene_id = product
                .get("Id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let cloud_pct = product
                .get("Attributes")
                .and_then(|a| a.as_array())
                .and_then(|attrs| {
                    attrs.iter().find(|att| {
                        att.get("Name").and_then(|n| n.as_str()) == Some("cloudCover")
                    })
                })
                .and_then(|att| att.get("Value"))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);

            // Several tiles can cover one date; keep the clearest.
            match result.get(&date) {
                Some(existing) if existing.cloud_pct <= cloud_pct => {}
                _ => {
                    result.insert(date, SceneRef { scene_id, cloud_pct });
                }
            }
        }

        tracing::info!("catalogue returned {} distinct acquisition dates", result.len());
        Ok(result)
    }
}

pub(crate) fn classify_transport(err: reqwest::Error) -> PipelineError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        PipelineError::Network(err.to_string())
    } else {
        PipelineError::DataFormat(err.to_string())
    }
}

pub(crate) fn classify_status(status: reqwest::StatusCode, what: &str) -> PipelineError {
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        PipelineError::Auth(format!("{what} returned {status}"))
    } else if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        PipelineError::Network(format!("{what} returned {status}"))
    } else {
        PipelineError::DataFormat(format!("{what} returned {status}"))
    }
}
