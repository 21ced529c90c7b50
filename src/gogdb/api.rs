//! Named GOGDB data operations
//!
//! Every operation opens its own [`Session`], runs one fetch (or one batch)
//! through a [`Requester`], and releases the session before returning. Failed
//! fetches are logged and turned into an empty JSON object, so callers only
//! ever have to ask "did I get anything?".

use serde_json::{Map, Value};
use tracing::{debug, warn};

use super::requester::{FetchResult, QueryParams, Requester};
use super::session::Session;
use crate::config::ApiConfig;

/// The value handed back when a lookup failed or found nothing
pub fn empty_result() -> Value {
    Value::Object(Map::new())
}

pub fn is_empty_result(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn normalize(operation: &str, url: &str, result: FetchResult) -> Value {
    match result {
        Ok(value) => value,
        Err(failure) => {
            warn!(
                operation,
                url,
                record = %failure.to_record(),
                "Error occurred on GOGDB request, data may be lost"
            );
            empty_result()
        }
    }
}

#[derive(Debug, Clone)]
pub struct GogdbApi {
    config: ApiConfig,
}

impl GogdbApi {
    pub fn new(config: ApiConfig) -> Self {
        Self { config }
    }

    fn products_url(&self) -> String {
        format!("{}/products", self.config.root())
    }

    fn resource_url(&self, resource: &str, id: &str) -> String {
        format!("{}/{}/{}", self.config.root(), resource, id)
    }

    fn open_session(&self, operation: &str) -> Option<Session> {
        match Session::open(&self.config) {
            Ok(session) => {
                debug!(operation, user_agent = session.user_agent(), "Opened GOGDB session");
                Some(session)
            }
            Err(e) => {
                warn!(operation, "Could not open GOGDB session: {:?}", e);
                None
            }
        }
    }

    async fn fetch(&self, operation: &str, url: String, params: Option<QueryParams>) -> Value {
        let Some(session) = self.open_session(operation) else {
            return empty_result();
        };
        let requester = Requester::new(&session, &self.config);
        let result = requester.fetch_one(&url, params.as_ref()).await;
        normalize(operation, &url, result)
    }

    /// Search products by name: `{count, products: [{title, id, ..}]}`
    pub async fn query_products(&self, text: &str) -> Value {
        let params = QueryParams::new().with("query", text).with("limit", 0);
        self.fetch("search", self.products_url(), Some(params)).await
    }

    pub async fn product_detail(&self, id: &str) -> Value {
        self.fetch("detail", self.resource_url("products", id), None).await
    }

    /// Price list for a product. An empty `country` asks for every region.
    pub async fn product_price(&self, id: &str, country: &str) -> Value {
        let params = if country.is_empty() {
            QueryParams::new().with("limit", 0)
        } else {
            QueryParams::new().with("countryCode", country)
        };
        self.fetch("price", self.resource_url("price", id), Some(params)).await
    }

    pub async fn product_discount(&self, id: &str) -> Value {
        let params = QueryParams::new().with("limit", 0);
        self.fetch("discount", self.resource_url("discount", id), Some(params)).await
    }

    pub async fn product_changes(&self, id: &str) -> Value {
        let params = QueryParams::new().with("limit", 0);
        self.fetch("changes", self.resource_url("changes", id), Some(params)).await
    }

    /// Details for several products, one entry per id in the same order
    pub async fn product_details(&self, ids: &[&str]) -> Vec<Value> {
        if ids.is_empty() {
            return Vec::new();
        }
        let Some(session) = self.open_session("details") else {
            return ids.iter().map(|_| empty_result()).collect();
        };
        let urls: Vec<String> = ids.iter().map(|id| self.resource_url("products", id)).collect();
        let requester = Requester::new(&session, &self.config);
        let results = requester.fetch_many_urls(&urls, None).await;

        urls.iter()
            .zip(results)
            .map(|(url, result)| normalize("details", url, result))
            .collect()
    }

    /// Prices of one product in several countries, one entry per country
    pub async fn product_prices(&self, id: &str, countries: &[&str]) -> Vec<Value> {
        if countries.is_empty() {
            return Vec::new();
        }
        let Some(session) = self.open_session("prices") else {
            return countries.iter().map(|_| empty_result()).collect();
        };
        let url = self.resource_url("price", id);
        let params_list: Vec<QueryParams> = countries
            .iter()
            .map(|country| QueryParams::new().with("countryCode", country))
            .collect();
        let requester = Requester::new(&session, &self.config);

        requester
            .fetch_many_params(&url, &params_list)
            .await
            .into_iter()
            .map(|result| normalize("prices", &url, result))
            .collect()
    }
}
