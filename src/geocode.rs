use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::GeocodingConfig;
use crate::error::{AppError, AppResult};

/// Nominatim reverse lookup response. Unknown coordinates come back as
/// `{"error": "Unable to geocode"}` with a 200.
#[derive(Debug, Deserialize)]
struct NominatimReverse {
    display_name: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeocodedLocation {
    pub latitude: f64,
    pub longitude: f64,
    pub display_name: String,
}

/// Reverse geocoder for the location picker.
pub struct ReverseGeocoder {
    client: reqwest::Client,
    endpoint: String,
}

impl ReverseGeocoder {
    pub fn new(config: &GeocodingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }

    pub fn request_url(&self, latitude: f64, longitude: f64) -> Result<Url, url::ParseError> {
        Url::parse_with_params(
            &self.endpoint,
            &[
                ("format", "json".to_string()),
                ("lat", latitude.to_string()),
                ("lon", longitude.to_string()),
            ],
        )
    }

    /// Look up a display address. Failures of any kind are logged and
    /// produce `None`; there is no retry.
    #[instrument(skip(self))]
    pub async fn reverse(&self, latitude: f64, longitude: f64) -> Option<GeocodedLocation> {
        let url = match self.request_url(latitude, longitude) {
            Ok(url) => url,
            Err(e) => {
                warn!(error = %e, endpoint = %self.endpoint, "Invalid geocoding endpoint");
                return None;
            }
        };

        let response = match self.client.get(url).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Reverse geocoding request failed");
                return None;
            }
        };

        let body: NominatimReverse = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "Failed to parse reverse geocoding response");
                return None;
            }
        };

        let location = to_location(latitude, longitude, body);
        debug!(found = location.is_some(), "Reverse geocoded");
        location
    }
}

fn to_location(latitude: f64, longitude: f64, body: NominatimReverse) -> Option<GeocodedLocation> {
    if let Some(error) = body.error {
        debug!(%error, "Geocoder returned no address");
        return None;
    }
    let display_name = body.display_name.filter(|name| !name.trim().is_empty())?;
    Some(GeocodedLocation {
        latitude,
        longitude,
        display_name,
    })
}

pub fn validate_coordinates(latitude: f64, longitude: f64) -> AppResult<()> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(AppError::BadRequest(
            "Latitude must be between -90 and 90".into(),
        ));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(AppError::BadRequest(
            "Longitude must be between -180 and 180".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geocoder(endpoint: &str) -> ReverseGeocoder {
        ReverseGeocoder::new(&GeocodingConfig {
            endpoint: endpoint.to_string(),
            user_agent: "meowmery-test".to_string(),
            timeout_secs: 2,
        })
        .unwrap()
    }

    #[test]
    fn request_url_carries_format_and_coordinates() {
        let url = geocoder("https://nominatim.openstreetmap.org/reverse")
            .request_url(59.9139, 10.7522)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://nominatim.openstreetmap.org/reverse?format=json&lat=59.9139&lon=10.7522"
        );
    }

    #[test]
    fn response_with_display_name_becomes_location() {
        let body: NominatimReverse = serde_json::from_str(
            r#"{"place_id": 1, "display_name": "Oslo, Norway", "lat": "59.91", "lon": "10.75"}"#,
        )
        .unwrap();
        let location = to_location(59.91, 10.75, body).unwrap();
        assert_eq!(location.display_name, "Oslo, Norway");
        assert_eq!(location.latitude, 59.91);
    }

    #[test]
    fn error_response_becomes_none() {
        let body: NominatimReverse =
            serde_json::from_str(r#"{"error": "Unable to geocode"}"#).unwrap();
        assert!(to_location(0.0, 0.0, body).is_none());
    }

    #[test]
    fn blank_display_name_becomes_none() {
        let body: NominatimReverse = serde_json::from_str(r#"{"display_name": "  "}"#).unwrap();
        assert!(to_location(0.0, 0.0, body).is_none());
    }

    #[test]
    fn coordinates_are_range_checked() {
        assert!(validate_coordinates(45.0, 90.0).is_ok());
        assert!(validate_coordinates(-90.0, 180.0).is_ok());
        assert!(validate_coordinates(90.1, 0.0).is_err());
        assert!(validate_coordinates(0.0, -180.5).is_err());
        assert!(validate_coordinates(f64::NAN, 0.0).is_err());
    }

    #[tokio::test]
    async fn unreachable_endpoint_fails_silently() {
        let geocoder = geocoder("http://127.0.0.1:9/reverse");
        assert!(geocoder.reverse(10.0, 10.0).await.is_none());
    }
}
