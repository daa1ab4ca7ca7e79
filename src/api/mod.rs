pub mod geocoding;
pub mod notifications;
pub mod ocr;

use std::time::Duration;

use anyhow::Result;

use crate::config::env_or;

/// Base URLs and timeout for the collaborators this service calls out to.
#[derive(Debug, Clone)]
pub struct ApiUrls {
    pub geocoding_service_url: String,
    pub ocr_service_url: String,
    pub notification_service_url: String,
    pub timeout: Duration,
}

impl ApiUrls {
    pub fn init() -> Result<Self> {
        Ok(Self {
            geocoding_service_url: Self::get_geocoding_service_url(),
            ocr_service_url: Self::get_ocr_service_url(),
            notification_service_url: Self::get_notification_service_url(),
            timeout: Duration::from_secs(env_or("EXTERNAL_TIMEOUT_SECS", 10)?),
        })
    }

    pub fn get_geocoding_service_url() -> String {
        std::env::var("GEOCODING_SERVICE_URL")
            .unwrap_or("http://localhost:3000/geocoding-service".to_string())
    }

    pub fn get_ocr_service_url() -> String {
        std::env::var("OCR_SERVICE_URL").unwrap_or("http://localhost:3000/ocr-service".to_string())
    }

    pub fn get_notification_service_url() -> String {
        std::env::var("NOTIFICATION_SERVICE_URL")
            .unwrap_or("http://localhost:3000/notification-service".to_string())
    }

    /// Points every collaborator at `base`; used by tests and local tooling.
    pub fn with_base(base: &str, timeout: Duration) -> Self {
        Self {
            geocoding_service_url: format!("{base}/geocoding-service"),
            ocr_service_url: format!("{base}/ocr-service"),
            notification_service_url: format!("{base}/notification-service"),
            timeout,
        }
    }
}
