use anyhow::{Context, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{api::ApiUrls, app_error::AppError};

#[derive(Serialize)]
struct ExtractReq<'a> {
    file: &'a str,
}

#[derive(Deserialize)]
struct ExtractRes {
    text: String,
}

/// Extracts text from an uploaded prescription image. Failures are for the caller to absorb.
pub async fn extract_text(client: &Client, urls: &ApiUrls, file: &str) -> Result<String> {
    let res: ExtractRes = client
        .post(format!("{}/extract", urls.ocr_service_url))
        .json(&ExtractReq { file })
        .timeout(urls.timeout)
        .send()
        .await
        .map_err(|_| AppError::ServiceUnreachable("OcrService".into()))?
        .error_for_status()
        .context("OCR service rejected the file")?
        .json()
        .await
        .context("Failed to parse JSON")?;

    Ok(res.text)
}
