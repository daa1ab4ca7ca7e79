use reqwest::Client;

use crate::{
    api::ApiUrls,
    config::{CheckoutConfig, Config, DeliveryConfig},
    db::DbPool,
};

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub http_client: Client,
    pub api_urls: ApiUrls,
    pub checkout: CheckoutConfig,
    pub delivery: DeliveryConfig,
}

impl AppState {
    pub fn new(db_pool: DbPool, config: &Config) -> Self {
        Self {
            db_pool,
            http_client: Client::new(),
            api_urls: config.api.clone(),
            checkout: config.checkout,
            delivery: config.delivery,
        }
    }
}
