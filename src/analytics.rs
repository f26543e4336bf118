//! Visitor analytics
//!
//! Counters live in memory only and reset on restart.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Mutex;

use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::app::AppState;
use crate::error::{AppError, AppJson, AppResult};

const MAX_RECENT_EVENTS: usize = 100;
const DEFAULT_TOP_N: usize = 10;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackRequest {
    /// `page_view`, `project_view`, `contact_submit`, `resume_download` or any
    /// custom name
    #[serde(alias = "type", alias = "event_type")]
    pub event_type: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsEvent {
    pub event_type: String,
    pub path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PageCount {
    pub path: String,
    pub views: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsSummary {
    pub total_events: u64,
    pub total_page_views: u64,
    pub events_by_type: BTreeMap<String, u64>,
    pub top_pages: Vec<PageCount>,
    pub daily: BTreeMap<NaiveDate, u64>,
    pub recent: Vec<AnalyticsEvent>,
}

#[derive(Default)]
struct Counters {
    by_type: HashMap<String, u64>,
    page_views: HashMap<String, u64>,
    daily: BTreeMap<NaiveDate, u64>,
    recent: VecDeque<AnalyticsEvent>,
    total: u64,
}

#[derive(Default)]
pub struct Analytics {
    counters: Mutex<Counters>,
}

impl Analytics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, request: TrackRequest) -> AppResult<AnalyticsEvent> {
        self.track_at(request, Utc::now())
    }

    fn track_at(&self, request: TrackRequest, now: DateTime<Utc>) -> AppResult<AnalyticsEvent> {
        let event_type = request.event_type.trim().to_ascii_lowercase();
        if event_type.is_empty() || event_type.len() > 64 {
            return Err(AppError::validation(
                "event type must be between 1 and 64 characters",
            ));
        }
        let path = request
            .path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .unwrap_or_else(|| "/".to_string());

        let event = AnalyticsEvent {
            event_type,
            path,
            referrer: request
                .referrer
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty()),
            timestamp: now,
        };

        let mut c = self.lock();
        c.total += 1;
        *c.by_type.entry(event.event_type.clone()).or_default() += 1;
        if event.event_type == "page_view" {
            *c.page_views.entry(event.path.clone()).or_default() += 1;
        }
        *c.daily.entry(now.date_naive()).or_default() += 1;
        c.recent.push_front(event.clone());
        c.recent.truncate(MAX_RECENT_EVENTS);

        Ok(event)
    }

    pub fn summary(&self, top_n: usize) -> AnalyticsSummary {
        let c = self.lock();

        let mut top_pages: Vec<PageCount> = c
            .page_views
            .iter()
            .map(|(path, views)| PageCount {
                path: path.clone(),
                views: *views,
            })
            .collect();
        top_pages.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.path.cmp(&b.path)));
        top_pages.truncate(top_n);

        AnalyticsSummary {
            total_events: c.total,
            total_page_views: c.page_views.values().sum(),
            events_by_type: c.by_type.iter().map(|(k, v)| (k.clone(), *v)).collect(),
            top_pages,
            daily: c.daily.clone(),
            recent: c.recent.iter().cloned().collect(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Counters> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Deserialize)]
pub struct SummaryQuery {
    #[serde(default)]
    pub top: Option<usize>,
}

pub async fn handle_track(
    State(state): State<AppState>,
    AppJson(request): AppJson<TrackRequest>,
) -> AppResult<(StatusCode, Json<AnalyticsEvent>)> {
    let event = state.analytics.track(request)?;
    Ok((StatusCode::ACCEPTED, Json(event)))
}

pub async fn handle_summary(
    State(state): State<AppState>,
    Query(query): Query<SummaryQuery>,
) -> Json<AnalyticsSummary> {
    let top = query.top.filter(|n| *n > 0).unwrap_or(DEFAULT_TOP_N);
    Json(state.analytics.summary(top))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn event(kind: &str, path: &str) -> TrackRequest {
        TrackRequest {
            event_type: kind.into(),
            path: Some(path.into()),
            referrer: None,
        }
    }

    #[test]
    fn test_counts_and_top_pages() {
        let analytics = Analytics::new();
        for path in ["/", "/", "/projects", "/", "/projects", "/about"] {
            analytics.track(event("page_view", path)).unwrap();
        }
        analytics.track(event("Resume_Download", "/about")).unwrap();

        let summary = analytics.summary(2);
        assert_eq!(summary.total_events, 7);
        assert_eq!(summary.total_page_views, 6);
        assert_eq!(summary.events_by_type["resume_download"], 1);
        assert_eq!(
            summary.top_pages,
            vec![
                PageCount { path: "/".into(), views: 3 },
                PageCount { path: "/projects".into(), views: 2 },
            ]
        );
        assert_eq!(summary.recent[0].event_type, "resume_download");
    }

    #[test]
    fn test_daily_buckets() {
        let analytics = Analytics::new();
        let day1 = Utc.with_ymd_and_hms(2024, 3, 1, 23, 59, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2024, 3, 2, 0, 1, 0).unwrap();
        analytics.track_at(event("page_view", "/"), day1).unwrap();
        analytics.track_at(event("page_view", "/"), day2).unwrap();
        analytics.track_at(event("page_view", "/"), day2).unwrap();

        let daily = analytics.summary(10).daily;
        assert_eq!(daily[&NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()], 1);
        assert_eq!(daily[&NaiveDate::from_ymd_opt(2024, 3, 2).unwrap()], 2);
    }

    #[test]
    fn test_recent_is_bounded() {
        let analytics = Analytics::new();
        for i in 0..(MAX_RECENT_EVENTS + 10) {
            analytics.track(event("page_view", &format!("/p/{i}"))).unwrap();
        }
        assert_eq!(analytics.summary(1).recent.len(), MAX_RECENT_EVENTS);
    }

    #[test]
    fn test_rejects_empty_type() {
        let analytics = Analytics::new();
        assert!(analytics.track(event("  ", "/")).is_err());
        assert_eq!(analytics.summary(5).total_events, 0);
    }
}
