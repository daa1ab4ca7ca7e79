use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;

use crate::{api::ApiUrls, app_error::AppError};

#[derive(Deserialize)]
struct Place {
    lat: String,
    lon: String,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

async fn search(client: &Client, urls: &ApiUrls, address: &str) -> Result<Option<Coordinates>> {
    let places: Vec<Place> = client
        .get(format!("{}/search", urls.geocoding_service_url))
        .query(&[("q", address), ("format", "json"), ("limit", "1")])
        .timeout(urls.timeout)
        .send()
        .await
        .map_err(|_| AppError::ServiceUnreachable("GeocodingService".into()))?
        .error_for_status()?
        .json()
        .await
        .context("Failed to parse JSON")?;

    places
        .into_iter()
        .next()
        .map(|place| {
            Ok(Coordinates {
                latitude: place.lat.parse::<f64>().context("Invalid latitude")?,
                longitude: place.lon.parse::<f64>().context("Invalid longitude")?,
            })
        })
        .transpose()
}

/// Best-effort lookup. Timeouts and service errors are logged and yield `None`.
pub async fn geocode(client: &Client, urls: &ApiUrls, address: &str) -> Option<Coordinates> {
    if address.trim().is_empty() {
        return None;
    }

    match search(client, urls, address).await {
        Ok(coordinates) => coordinates,
        Err(err) => {
            tracing::warn!("Geocoding failed, leaving coordinates empty: {:#}", err);
            None
        }
    }
}
