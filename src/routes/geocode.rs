use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;

use crate::error::AppResult;
use crate::extractors::ApiQuery;
use crate::geocode::{validate_coordinates, GeocodedLocation};
use crate::response::ApiResponse;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct ReverseQuery {
    pub lat: f64,
    pub lon: f64,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/geocode/reverse", get(reverse))
}

/// `data` is null when the geocoder has nothing, or failed.
async fn reverse(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<ReverseQuery>,
) -> AppResult<Json<ApiResponse<GeocodedLocation>>> {
    validate_coordinates(query.lat, query.lon)?;
    let location = state.geocoder.reverse(query.lat, query.lon).await;
    Ok(Json(ApiResponse {
        data: location,
        error: None,
    }))
}
