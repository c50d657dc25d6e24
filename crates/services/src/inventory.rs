//! Pantry inventory service: the user's products and their expiry dates.
//!
//! Every call runs with the caller's [`AuthContext`]; the service knows who
//! the user is from the bearer token alone.

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use freshmate_config::InventoryConfig;
use freshmate_core::{ApiError, AuthContext, Error};
use freshmate_http::{ApiRequest, HttpClientCore};

use crate::models::{DateEntry, Envelope, PaginatedProducts, Product, ProductDateRequest, ProductSearchHit};

pub struct InventoryService {
    http: HttpClientCore,
}

impl InventoryService {
    pub fn new(config: &InventoryConfig) -> Result<Self, Error> {
        let http = HttpClientCore::new("inventory", &config.full_base_url(), &config.client)?;
        Ok(Self { http })
    }

    /// Wrap an already-built client (tests, shared limiters).
    pub fn from_client(http: HttpClientCore) -> Self {
        Self { http }
    }

    async fn call<T: DeserializeOwned>(
        &self,
        request: &ApiRequest,
        auth: &AuthContext,
    ) -> Result<Envelope<T>, ApiError> {
        self.http.execute(request, auth).await
    }

    /// `GET /product/user`
    pub async fn get_user_products(&self, auth: &AuthContext) -> Result<Vec<Product>, ApiError> {
        let envelope = self
            .call::<Vec<Product>>(&ApiRequest::get("/product/user"), auth)
            .await?;
        let products = envelope
            .into_data("failed to fetch user products")?
            .unwrap_or_default();
        info!(count = products.len(), "Fetched user products");
        Ok(products)
    }

    /// `GET /product/user/expired?days=`: products expired or expiring
    /// within `days`.
    pub async fn get_expired_products(
        &self,
        auth: &AuthContext,
        days: Option<u32>,
    ) -> Result<Vec<Product>, ApiError> {
        let request = ApiRequest::get("/product/user/expired").query_opt("days", days);
        let envelope = self.call::<Vec<Product>>(&request, auth).await?;
        let products = envelope
            .into_data("failed to fetch expired products")?
            .unwrap_or_default();
        info!(count = products.len(), ?days, "Fetched expiring products");
        Ok(products)
    }

    /// `GET /product-code/{code}`. A negative envelope means "no such
    /// product" and yields `None`.
    pub async fn search_product_code(
        &self,
        auth: &AuthContext,
        code: &str,
    ) -> Result<Option<Product>, ApiError> {
        let request = ApiRequest::get("/product-code").segment(code);
        let envelope = self.call::<Product>(&request, auth).await?;
        if !envelope.is_success() {
            warn!(code, error = ?envelope.error, "Product code lookup found nothing");
            return Ok(None);
        }
        Ok(envelope.data)
    }

    /// `GET /product-code/search/{query}`, flattened to the hit list.
    pub async fn search_product_by_name(
        &self,
        auth: &AuthContext,
        query: &str,
    ) -> Result<Vec<ProductSearchHit>, ApiError> {
        let request = ApiRequest::get("/product-code/search").segment(query);
        let envelope = self.call::<PaginatedProducts>(&request, auth).await?;
        let page = envelope
            .into_data("failed to search products")?
            .unwrap_or_default();
        info!(query, hits = page.products.len(), total = ?page.count, "Searched products");
        Ok(page.products)
    }

    /// `POST /date`
    pub async fn create_product_date(
        &self,
        auth: &AuthContext,
        date: &ProductDateRequest,
    ) -> Result<Option<DateEntry>, ApiError> {
        let body = serde_json::to_value(date)
            .map_err(|e| ApiError::validation(format!("invalid date entry: {e}")))?;
        let envelope = self
            .call::<DateEntry>(&ApiRequest::post("/date").json(body), auth)
            .await?;
        let entry = envelope.into_data("failed to create product date")?;
        info!(product_id = %date.product_id, "Created product date entry");
        Ok(entry)
    }

    /// `PUT /date/{id}`
    pub async fn update_product_date(
        &self,
        auth: &AuthContext,
        date_id: &str,
        date: &ProductDateRequest,
    ) -> Result<Option<DateEntry>, ApiError> {
        let body = serde_json::to_value(date)
            .map_err(|e| ApiError::validation(format!("invalid date entry: {e}")))?;
        let request = ApiRequest::put("/date").segment(date_id).json(body);
        let envelope = self.call::<DateEntry>(&request, auth).await?;
        let entry = envelope.into_data("failed to update product date")?;
        info!(date_id, "Updated product date entry");
        Ok(entry)
    }

    /// `DELETE /product/soft-delete/{id}`
    pub async fn delete_product(&self, auth: &AuthContext, product_id: &str) -> Result<Value, ApiError> {
        let request = ApiRequest::delete("/product/soft-delete").segment(product_id);
        let envelope = self.call::<Value>(&request, auth).await?;
        let data = envelope.into_data("failed to delete product")?;
        info!(product_id, "Soft-deleted product");
        Ok(data
            .filter(|v| !v.is_null())
            .unwrap_or_else(|| serde_json::json!({ "deleted": true, "product_id": product_id })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshmate_config::ClientConfig;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn service(server: &MockServer) -> InventoryService {
        let config = InventoryConfig {
            base_url: server.uri(),
            api_version: "v1".into(),
            client: ClientConfig {
                max_retries: 0,
                jitter: false,
                ..ClientConfig::default()
            },
        };
        InventoryService::new(&config).unwrap()
    }

    fn auth() -> AuthContext {
        AuthContext::from_header(Some("Bearer pantry-user")).unwrap()
    }

    #[tokio::test]
    async fn expiring_products_pass_days_and_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/product/user/expired"))
            .and(query_param("days", "7"))
            .and(header("authorization", "Bearer pantry-user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "res": 1,
                "data": [{
                    "id": "p1",
                    "productName": "Yogurt",
                    "dateProductUsers": [{"id": "d1", "productId": "p1", "dateExpired": "2025-01-03T00:00:00"}]
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let products = service(&server)
            .await
            .get_expired_products(&auth(), Some(7))
            .await
            .unwrap();
        assert_eq!(products.len(), 1);
        assert_eq!(products[0].date_product_users[0].date_expired.as_deref(), Some("2025-01-03T00:00:00"));
    }

    #[tokio::test]
    async fn negative_envelope_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/product/user"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "res": 0, "error": "User not found", "data": null
            })))
            .mount(&server)
            .await;

        let err = service(&server).await.get_user_products(&auth()).await.unwrap_err();
        assert!(matches!(err, ApiError::Unexpected { .. }));
        assert_eq!(err.message(), "User not found");
    }

    #[tokio::test]
    async fn unknown_barcode_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/product-code/0000000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "res": 0, "error": "Not found"
            })))
            .mount(&server)
            .await;

        let found = service(&server)
            .await
            .search_product_code(&auth(), "0000000")
            .await
            .unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn name_search_unwraps_pagination() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/product-code/search/oat%20milk"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "res": 1,
                "data": {"count": 1, "page": 1, "products": [{"code": "123", "product_name": "Oat Milk"}]}
            })))
            .mount(&server)
            .await;

        let hits = service(&server)
            .await
            .search_product_by_name(&auth(), "oat milk")
            .await
            .unwrap();
        assert_eq!(hits[0].product_name.as_deref(), Some("Oat Milk"));
    }

    #[tokio::test]
    async fn create_date_posts_camel_case_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/date"))
            .and(body_json(json!({"productId": "p1", "dateExpired": "2025-02-01T00:00:00"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "res": 1,
                "data": {"id": "d9", "productId": "p1", "dateExpired": "2025-02-01T00:00:00"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let request = ProductDateRequest {
            product_id: "p1".into(),
            date_expired: Some("2025-02-01T00:00:00".into()),
            ..Default::default()
        };
        let entry = service(&server)
            .await
            .create_product_date(&auth(), &request)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.id, "d9");
    }

    #[tokio::test]
    async fn delete_without_data_reports_deleted() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/product/soft-delete/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"res": 1})))
            .mount(&server)
            .await;

        let data = service(&server).await.delete_product(&auth(), "p1").await.unwrap();
        assert_eq!(data, json!({"deleted": true, "product_id": "p1"}));
    }

    #[tokio::test]
    async fn http_errors_keep_their_kind() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Date entry not found"})))
            .mount(&server)
            .await;

        let err = service(&server)
            .await
            .update_product_date(&auth(), "missing", &ProductDateRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
        assert_eq!(err.message(), "Date entry not found");
    }
}
