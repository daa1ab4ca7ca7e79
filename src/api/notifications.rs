use reqwest::Client;
use serde::Serialize;

use crate::api::ApiUrls;

#[derive(Serialize)]
struct EmailReq<'a> {
    recipient: &'a str,
    subject: &'a str,
    body: &'a str,
}

/// Sends an email through the notification service. Returns whether it was accepted;
/// failures are logged and never escalated.
pub async fn send(
    client: &Client,
    urls: &ApiUrls,
    recipient: &str,
    subject: &str,
    body: &str,
) -> bool {
    let result = client
        .post(format!("{}/emails", urls.notification_service_url))
        .json(&EmailReq {
            recipient,
            subject,
            body,
        })
        .timeout(urls.timeout)
        .send()
        .await
        .and_then(|res| res.error_for_status());

    match result {
        Ok(_) => true,
        Err(err) => {
            tracing::warn!("Failed to send email to {}: {}", recipient, err);
            false
        }
    }
}
