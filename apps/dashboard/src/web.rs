use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use chrono::{Duration, Local};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use station_core::store::{RecordQuery, RecordStore, SqliteStore};
use station_core::transform::{
    interval_means, last_day_cutoff, normalize, partition, summarize, Frequency,
};
use station_core::{StationError, WeatherRecord};

// Every request reads a fresh snapshot; nothing is cached between requests.
#[derive(Clone)]
pub struct WebState {
    pub db_path: Arc<PathBuf>,
    pub baseline_days: i64,
    pub table_rows: usize,
}

#[derive(Deserialize)]
pub struct RecordsQuery {
    limit: Option<usize>,
}

#[derive(Deserialize)]
pub struct IntervalQuery {
    frequency: Option<Frequency>,
}

#[derive(Deserialize)]
pub struct SummaryQuery {
    window_days: Option<i64>,
}

pub fn router(state: WebState) -> Router {
    Router::new()
        .route("/api/records", get(get_records))
        .route("/api/last-day", get(get_last_day))
        .route("/api/observations", get(get_observations))
        .route("/api/intervals", get(get_intervals))
        .route("/api/summary", get(get_summary))
        .layer(CompressionLayer::new())
        .with_state(state)
}

pub async fn create_web_server(state: WebState, bind: &str) -> anyhow::Result<()> {
    let app = router(state);
    info!("Starting web server on http://{}", bind);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn snapshot(state: &WebState, query: RecordQuery) -> station_core::Result<Vec<WeatherRecord>> {
    let path = state.db_path.clone();
    tokio::task::spawn_blocking(move || match SqliteStore::open_read_only(&path)? {
        Some(store) => store.read(&query),
        None => Ok(Vec::new()),
    })
    .await
    .map_err(|e| StationError::Storage(format!("snapshot task failed: {}", e)))?
}

fn respond<T: Serialize>(result: station_core::Result<T>) -> Json<Value> {
    match result {
        Ok(data) => Json(json!({
            "success": true,
            "data": data
        })),
        Err(e) => {
            warn!("request failed: {}", e);
            Json(json!({
                "success": false,
                "error": e.to_string()
            }))
        }
    }
}

async fn get_records(
    State(state): State<WebState>,
    Query(query): Query<RecordsQuery>,
) -> Json<Value> {
    let limit = query.limit.unwrap_or(state.table_rows);
    respond(snapshot(&state, RecordQuery::latest(limit)).await)
}

async fn get_last_day(State(state): State<WebState>) -> Json<Value> {
    let cutoff = last_day_cutoff(Local::now());
    respond(snapshot(&state, RecordQuery::since(cutoff)).await)
}

async fn get_observations(State(state): State<WebState>) -> Json<Value> {
    let result = snapshot(&state, RecordQuery::default())
        .await
        .map(|records| partition(&normalize(&records)));
    respond(result)
}

async fn get_intervals(
    State(state): State<WebState>,
    Query(query): Query<IntervalQuery>,
) -> Json<Value> {
    let frequency = query.frequency.unwrap_or(Frequency::Day);
    let result = snapshot(&state, RecordQuery::default())
        .await
        .map(|records| interval_means(&normalize(&records), frequency));
    respond(result)
}

async fn get_summary(
    State(state): State<WebState>,
    Query(query): Query<SummaryQuery>,
) -> Json<Value> {
    let days = query.window_days.unwrap_or(state.baseline_days);
    let window = match Duration::try_days(days) {
        Some(window) if days > 0 => window,
        _ => {
            return respond::<()>(Err(StationError::Config(format!(
                "window_days must be a positive number of days, got {}",
                days
            ))))
        }
    };
    let result = snapshot(&state, RecordQuery::default()).await.map(|records| {
        summarize(&records, window)
            .into_iter()
            .map(|s| {
                json!({
                    "variable": s.variable,
                    "current": s.current,
                    "baseline": s.baseline,
                    "deviation": s.deviation,
                    "text": s.deviation.map(|d| d.to_string()),
                })
            })
            .collect::<Vec<Value>>()
    });
    respond(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use chrono::TimeZone;
    use tower::ServiceExt;

    fn db_with_records() -> anyhow::Result<(tempfile::TempDir, PathBuf)> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("enviro.db");
        let mut store = SqliteStore::open(&path)?;
        for (day, t) in [(1, 20.0), (2, 21.0), (3, 22.0)] {
            store.write(&WeatherRecord {
                living_room_temp: t,
                bathroom_temp: 19.0,
                closet_temp: 17.0,
                staircase_temp: 16.0,
                humidity: 45.0,
                pressure: 1013.0,
                record_date: Local.with_ymd_and_hms(2024, 1, day, 12, 0, 0).unwrap(),
            })?;
        }
        Ok((dir, path))
    }

    async fn get_json(state: WebState, uri: &str) -> anyhow::Result<Value> {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty())?)
            .await?;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn state(path: PathBuf) -> WebState {
        WebState {
            db_path: Arc::new(path),
            baseline_days: 30,
            table_rows: 10,
        }
    }

    #[tokio::test]
    async fn summary_reports_deviation() -> anyhow::Result<()> {
        let (_dir, path) = db_with_records()?;
        let body = get_json(state(path), "/api/summary").await?;
        assert_eq!(body["success"], true);
        let living = &body["data"][0];
        assert_eq!(living["variable"], "livingRoomTemp");
        assert_eq!(living["current"], 22.0);
        assert_eq!(living["baseline"], 21.0);
        assert_eq!(living["text"], "4.76% above");
        Ok(())
    }

    #[tokio::test]
    async fn records_newest_first() -> anyhow::Result<()> {
        let (_dir, path) = db_with_records()?;
        let body = get_json(state(path), "/api/records?limit=2").await?;
        let data = body["data"].as_array().cloned().unwrap_or_default();
        assert_eq!(data.len(), 2);
        assert_eq!(data[0]["livingRoomTemp"], 22.0);
        Ok(())
    }

    #[tokio::test]
    async fn observations_partitioned() -> anyhow::Result<()> {
        let (_dir, path) = db_with_records()?;
        let body = get_json(state(path), "/api/observations").await?;
        assert_eq!(body["data"]["temperature"].as_array().map(Vec::len), Some(9));
        assert_eq!(body["data"]["environmental"].as_array().map(Vec::len), Some(6));
        Ok(())
    }

    #[tokio::test]
    async fn weekly_intervals() -> anyhow::Result<()> {
        let (_dir, path) = db_with_records()?;
        let body = get_json(state(path), "/api/intervals?frequency=week").await?;
        // 2024-01-01..03 share one ISO week
        assert_eq!(body["data"].as_array().map(Vec::len), Some(5));
        Ok(())
    }

    #[tokio::test]
    async fn empty_store_stays_renderable() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("enviro.db");
        let body = get_json(state(path.clone()), "/api/summary").await?;
        assert_eq!(body["success"], true);
        assert!(body["data"][0]["current"].is_null());
        // reading must not create the database
        assert!(!path.exists());
        Ok(())
    }

    #[tokio::test]
    async fn rejects_non_positive_window() -> anyhow::Result<()> {
        let (_dir, path) = db_with_records()?;
        let body = get_json(state(path), "/api/summary?window_days=0").await?;
        assert_eq!(body["success"], false);
        Ok(())
    }

    #[tokio::test]
    async fn huge_window_degrades_instead_of_panicking() -> anyhow::Result<()> {
        let (_dir, path) = db_with_records()?;
        let body = get_json(state(path.clone()), "/api/summary?window_days=1000000000").await?;
        assert_eq!(body["success"], true);
        assert_eq!(body["data"][0]["baseline"], 21.0);

        let body = get_json(state(path), "/api/summary?window_days=9223372036854775807").await?;
        assert_eq!(body["success"], false);
        Ok(())
    }
}
