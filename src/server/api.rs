use crate::constants::TOP_PAIR_COUNT;
use crate::error::AppError;
use crate::server::AppState;
use crate::services::csv_export::{export_for_date, latest_export};
use crate::services::{select_top, MarketDataSource};
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

fn error_response(err: &AppError) -> Response {
    let status = match err {
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

/// GET /api/status - proxy the upstream server time/status
pub async fn get_status_handler(State(state): State<AppState>) -> Response {
    match state.client.server_status().await {
        Ok(status) => Json(status).into_response(),
        Err(e) => {
            error!(error = %e, "Upstream status fetch failed");
            error_response(&e)
        }
    }
}

/// GET /api/pairs - the top-10-by-volume pair listings plus a count
pub async fn get_pairs_handler(State(state): State<AppState>) -> Response {
    let listings = match state.client.trading_pairs().await {
        Ok(listings) => listings,
        Err(e) => {
            error!(error = %e, "Pair listing fetch failed");
            return error_response(&e);
        }
    };

    let selection = select_top(&listings, TOP_PAIR_COUNT);
    let mut pairs = serde_json::Map::new();
    for sample in &selection {
        if let Some(listing) = listings.get(&sample.name) {
            pairs.insert(sample.name.clone(), json!(listing));
        }
    }

    Json(json!({ "pairs": pairs, "count": pairs.len() })).into_response()
}

/// GET /api/pairs/{pair} - proxy the upstream ticker detail for one pair
pub async fn get_pair_detail_handler(
    State(state): State<AppState>,
    Path(pair): Path<String>,
) -> Response {
    if pair.trim().is_empty() {
        return error_response(&AppError::InvalidInput(
            "pair parameter is required".to_string(),
        ));
    }

    match state.client.pair_ticker(&pair).await {
        Ok(detail) => Json(detail).into_response(),
        Err(e) => {
            error!(pair = %pair, error = %e, "Ticker detail fetch failed");
            error_response(&e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HistoricalQuery {
    pub date: Option<String>,
}

fn parse_query_date(raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
        AppError::InvalidInput("Invalid date format, expected YYYY-MM-DD".to_string())
    })
}

/// GET /api/historical?date=YYYY-MM-DD - download the most recent export
/// artifact for the date (or the overall latest when omitted)
pub async fn get_historical_handler(
    State(state): State<AppState>,
    Query(params): Query<HistoricalQuery>,
) -> Response {
    let export_dir = state.snapshotter.export_dir();

    let found = match params.date.as_deref() {
        Some(raw) => match parse_query_date(raw) {
            Ok(date) => export_for_date(export_dir, date),
            Err(e) => return error_response(&e),
        },
        None => latest_export(export_dir).map(|latest| latest.map(|(path, _)| path)),
    };

    let path = match found {
        Ok(Some(path)) => path,
        Ok(None) => {
            return error_response(&AppError::NotFound(match params.date {
                Some(date) => format!("no export artifact found for date {}", date),
                None => "no export artifact found".to_string(),
            }))
        }
        Err(e) => return error_response(&e),
    };

    let body = match tokio::fs::read_to_string(&path).await {
        Ok(body) => body,
        Err(e) => return error_response(&AppError::Io(e.to_string())),
    };

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "export.csv".to_string());
    (
        [
            (CONTENT_TYPE, "text/csv".to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// GET /api/db - all persisted pairs with their info and historical rows,
/// grouped by pair name (most recent bucket wins per name)
pub async fn get_db_handler(State(state): State<AppState>) -> Response {
    let pairs = match state.db.get_trading_pairs().await {
        Ok(pairs) => pairs,
        Err(e) => {
            error!(error = %e, "Failed to read trading pairs");
            return error_response(&e);
        }
    };

    let total = pairs.len();
    let mut grouped = serde_json::Map::new();
    for pair in pairs {
        if grouped.contains_key(&pair.name) {
            continue;
        }
        let infos = match state.db.get_pair_info(pair.id).await {
            Ok(infos) => infos,
            Err(e) => {
                warn!(pair = %pair.name, error = %e, "Skipping pair with unreadable info rows");
                continue;
            }
        };
        let historical = match state.db.get_historical_data(pair.id).await {
            Ok(historical) => historical,
            Err(e) => {
                warn!(pair = %pair.name, error = %e, "Skipping pair with unreadable candle rows");
                continue;
            }
        };
        grouped.insert(
            pair.name.clone(),
            json!({
                "pair_info": pair,
                "info": infos,
                "historical": historical,
            }),
        );
    }

    Json(json!({ "pairs": Value::Object(grouped), "count": total })).into_response()
}

/// POST /api/save - manual synchronous pipeline trigger
pub async fn save_handler(State(state): State<AppState>) -> Response {
    match state.snapshotter.run().await {
        Ok(outcome) => {
            info!(message = %outcome.message(), "Manual snapshot trigger finished");
            Json(json!({ "message": outcome.message() })).into_response()
        }
        Err(e) => {
            error!(error = %e, "Manual snapshot trigger failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "error": "Failed to save snapshot",
                    "details": e.to_string(),
                })),
            )
                .into_response()
        }
    }
}
