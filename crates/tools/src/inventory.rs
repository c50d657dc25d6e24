//! Pantry tools over the inventory service.
//!
//! Read tools run concurrently; the three mutating tools are exclusive so
//! two edits never race within a process.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::{Map, Value, json};
use tracing::debug;

use freshmate_core::{ApiError, AuthContext, Tool};
use freshmate_services::{InventoryService, Product, ProductDateRequest};

use crate::args;

pub const DEFAULT_EXPIRY_WINDOW_DAYS: u32 = 7;
pub const MAX_EXPIRY_WINDOW_DAYS: u32 = 365;

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::unexpected(format!("failed to encode result: {e}")))
}

/// Attach `daysUntilExpiry` and `isExpired` to every dated stock entry.
pub fn annotate_expiry(products: &[Product], today: NaiveDate) -> Result<Vec<Value>, ApiError> {
    products
        .iter()
        .map(|product| {
            let mut value = to_json(product)?;
            if let Some(entries) = value.get_mut("dateProductUsers").and_then(Value::as_array_mut) {
                for entry in entries {
                    let expires = entry
                        .get("dateExpired")
                        .and_then(Value::as_str)
                        .and_then(args::date_part);
                    if let (Some(expires), Some(obj)) = (expires, entry.as_object_mut()) {
                        let days = (expires - today).num_days();
                        obj.insert("daysUntilExpiry".into(), json!(days));
                        obj.insert("isExpired".into(), json!(days < 0));
                    }
                }
            }
            Ok(value)
        })
        .collect()
}

// --- list_products ---

pub struct ListProductsTool {
    inventory: Arc<InventoryService>,
}

impl ListProductsTool {
    pub fn new(inventory: Arc<InventoryService>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Tool for ListProductsTool {
    fn name(&self) -> &str {
        "list_products"
    }

    fn description(&self) -> &str {
        "List every product in the user's pantry with its tracked expiry dates and quantities."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "additionalProperties": false
        })
    }

    async fn invoke(&self, _arguments: &Map<String, Value>, auth: &AuthContext) -> Result<Value, ApiError> {
        let products = self.inventory.get_user_products(auth).await?;
        Ok(json!({
            "total_products": products.len(),
            "products": to_json(&products)?,
        }))
    }
}

// --- expiring_products ---

pub struct ExpiringProductsTool {
    inventory: Arc<InventoryService>,
}

impl ExpiringProductsTool {
    pub fn new(inventory: Arc<InventoryService>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Tool for ExpiringProductsTool {
    fn name(&self) -> &str {
        "expiring_products"
    }

    fn description(&self) -> &str {
        "Find pantry products that are expired or expire within the next N days. \
         Each dated entry is annotated with daysUntilExpiry (negative when already expired)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days": {
                    "type": "integer",
                    "minimum": 0,
                    "maximum": MAX_EXPIRY_WINDOW_DAYS,
                    "default": DEFAULT_EXPIRY_WINDOW_DAYS,
                    "description": "Look-ahead window in days (0 = only already expired)"
                }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: &Map<String, Value>, auth: &AuthContext) -> Result<Value, ApiError> {
        let days = args::optional_u32(arguments, "days")?.unwrap_or(DEFAULT_EXPIRY_WINDOW_DAYS);
        if days > MAX_EXPIRY_WINDOW_DAYS {
            return Err(ApiError::validation(format!(
                "'days' must be between 0 and {MAX_EXPIRY_WINDOW_DAYS}"
            )));
        }
        let products = self.inventory.get_expired_products(auth, Some(days)).await?;
        let today = Utc::now().date_naive();
        debug!(days, count = products.len(), %today, "Annotating expiring products");
        Ok(json!({
            "days": days,
            "total_products": products.len(),
            "products": annotate_expiry(&products, today)?,
        }))
    }
}

// --- lookup_barcode ---

pub struct LookupBarcodeTool {
    inventory: Arc<InventoryService>,
}

impl LookupBarcodeTool {
    pub fn new(inventory: Arc<InventoryService>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Tool for LookupBarcodeTool {
    fn name(&self) -> &str {
        "lookup_barcode"
    }

    fn description(&self) -> &str {
        "Look up a product by its barcode number."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "code": {
                    "type": "string",
                    "minLength": 1,
                    "description": "Barcode digits, e.g. 8001505005707"
                }
            },
            "required": ["code"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: &Map<String, Value>, auth: &AuthContext) -> Result<Value, ApiError> {
        let code = args::required_str(arguments, "code")?;
        let product = self.inventory.search_product_code(auth, code).await?;
        Ok(json!({
            "code": code,
            "found": product.is_some(),
            "product": product,
        }))
    }
}

// --- search_products ---

pub struct SearchProductsTool {
    inventory: Arc<InventoryService>,
}

impl SearchProductsTool {
    pub fn new(inventory: Arc<InventoryService>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Tool for SearchProductsTool {
    fn name(&self) -> &str {
        "search_products"
    }

    fn description(&self) -> &str {
        "Search the food product database by name. Returns barcodes usable with lookup_barcode."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "minLength": 1, "description": "Product name" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: &Map<String, Value>, auth: &AuthContext) -> Result<Value, ApiError> {
        let query = args::required_str(arguments, "query")?;
        let hits = self.inventory.search_product_by_name(auth, query).await?;
        Ok(json!({
            "query": query,
            "total": hits.len(),
            "products": hits,
        }))
    }
}

// --- add_product_date / update_product_date ---

fn date_properties() -> Value {
    json!({
        "product_id": { "type": "string", "minLength": 1 },
        "date_expired": { "type": "string", "description": "Expiry date, YYYY-MM-DD" },
        "date_best_before": { "type": "string", "description": "Best-before date, YYYY-MM-DD" },
        "date_manufactured": { "type": "string", "description": "Production date, YYYY-MM-DD" },
        "quantity": { "type": "number", "minimum": 0 }
    })
}

fn date_request(arguments: &Map<String, Value>) -> Result<ProductDateRequest, ApiError> {
    Ok(ProductDateRequest {
        product_id: args::required_str(arguments, "product_id")?.to_string(),
        date_expired: args::optional_date(arguments, "date_expired")?,
        date_best_before: args::optional_date(arguments, "date_best_before")?,
        date_manufactured: args::optional_date(arguments, "date_manufactured")?,
        quantity: args::optional_f64(arguments, "quantity"),
    })
}

pub struct AddProductDateTool {
    inventory: Arc<InventoryService>,
}

impl AddProductDateTool {
    pub fn new(inventory: Arc<InventoryService>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Tool for AddProductDateTool {
    fn name(&self) -> &str {
        "add_product_date"
    }

    fn description(&self) -> &str {
        "Track a new stock entry for a product: its expiry date and optionally best-before, \
         production date and quantity."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": date_properties(),
            "required": ["product_id", "date_expired"],
            "additionalProperties": false
        })
    }

    fn exclusive(&self) -> bool {
        true
    }

    async fn invoke(&self, arguments: &Map<String, Value>, auth: &AuthContext) -> Result<Value, ApiError> {
        let request = date_request(arguments)?;
        let entry = self.inventory.create_product_date(auth, &request).await?;
        Ok(json!({ "created": true, "entry": entry }))
    }
}

pub struct UpdateProductDateTool {
    inventory: Arc<InventoryService>,
}

impl UpdateProductDateTool {
    pub fn new(inventory: Arc<InventoryService>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Tool for UpdateProductDateTool {
    fn name(&self) -> &str {
        "update_product_date"
    }

    fn description(&self) -> &str {
        "Change the dates or quantity of an existing stock entry."
    }

    fn parameters_schema(&self) -> Value {
        let mut properties = date_properties();
        if let Some(obj) = properties.as_object_mut() {
            obj.insert(
                "date_id".into(),
                json!({ "type": "string", "minLength": 1, "description": "ID of the stock entry" }),
            );
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": ["date_id", "product_id"],
            "additionalProperties": false
        })
    }

    fn exclusive(&self) -> bool {
        true
    }

    async fn invoke(&self, arguments: &Map<String, Value>, auth: &AuthContext) -> Result<Value, ApiError> {
        let date_id = args::required_str(arguments, "date_id")?;
        let request = date_request(arguments)?;
        if request.date_expired.is_none()
            && request.date_best_before.is_none()
            && request.date_manufactured.is_none()
            && request.quantity.is_none()
        {
            return Err(ApiError::validation("nothing to update: give a date or a quantity"));
        }
        debug!(date_id, product_id = %request.product_id, "Updating stock entry");
        let entry = self.inventory.update_product_date(auth, date_id, &request).await?;
        Ok(json!({ "updated": true, "entry": entry }))
    }
}

// --- remove_product ---

pub struct RemoveProductTool {
    inventory: Arc<InventoryService>,
}

impl RemoveProductTool {
    pub fn new(inventory: Arc<InventoryService>) -> Self {
        Self { inventory }
    }
}

#[async_trait]
impl Tool for RemoveProductTool {
    fn name(&self) -> &str {
        "remove_product"
    }

    fn description(&self) -> &str {
        "Remove a product from the user's pantry."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "product_id": { "type": "string", "minLength": 1 }
            },
            "required": ["product_id"],
            "additionalProperties": false
        })
    }

    fn exclusive(&self) -> bool {
        true
    }

    async fn invoke(&self, arguments: &Map<String, Value>, auth: &AuthContext) -> Result<Value, ApiError> {
        let product_id = args::required_str(arguments, "product_id")?;
        self.inventory.delete_product(auth, product_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshmate_config::{ClientConfig, InventoryConfig};
    use freshmate_core::{ToolCallRequest, ToolRegistry};
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn inventory(server: &MockServer) -> Arc<InventoryService> {
        let config = InventoryConfig {
            base_url: server.uri(),
            api_version: "v1".into(),
            client: ClientConfig {
                max_retries: 0,
                ..ClientConfig::default()
            },
        };
        Arc::new(InventoryService::new(&config).unwrap())
    }

    fn auth() -> AuthContext {
        AuthContext::explicit("tok").unwrap()
    }

    fn args(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn annotates_days_until_expiry() {
        let products: Vec<Product> = serde_json::from_value(json!([{
            "id": "p1",
            "productName": "Yogurt",
            "dateProductUsers": [
                {"id": "d1", "productId": "p1", "dateExpired": "2025-01-03T00:00:00"},
                {"id": "d2", "productId": "p1", "dateExpired": "2024-12-30T00:00:00"},
                {"id": "d3", "productId": "p1"}
            ]
        }]))
        .unwrap();
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let annotated = annotate_expiry(&products, today).unwrap();
        let entries = annotated[0]["dateProductUsers"].as_array().unwrap();
        assert_eq!(entries[0]["daysUntilExpiry"], 2);
        assert_eq!(entries[0]["isExpired"], false);
        assert_eq!(entries[1]["daysUntilExpiry"], -2);
        assert_eq!(entries[1]["isExpired"], true);
        assert!(entries[2].get("daysUntilExpiry").is_none());
    }

    #[tokio::test]
    async fn expiring_defaults_to_a_week() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/product/user/expired"))
            .and(query_param("days", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"res": 1, "data": []})))
            .expect(1)
            .mount(&server)
            .await;

        let tool = ExpiringProductsTool::new(inventory(&server));
        let out = tool.invoke(&Map::new(), &auth()).await.unwrap();
        assert_eq!(out["days"], 7);
        assert_eq!(out["total_products"], 0);
    }

    #[tokio::test]
    async fn expiring_schema_rejects_out_of_range_days() {
        let server = MockServer::start().await;
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(ExpiringProductsTool::new(inventory(&server))))
            .unwrap();

        let call = ToolCallRequest::new("c1", "expiring_products", json!({"days": 400}));
        let err = registry.validate(&call).unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
        let call = ToolCallRequest::new("c2", "expiring_products", json!({"days": -1}));
        assert!(registry.validate(&call).is_err());
    }

    #[tokio::test]
    async fn barcode_not_found_is_data() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/product-code/123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"res": 0, "error": "none"})))
            .mount(&server)
            .await;

        let tool = LookupBarcodeTool::new(inventory(&server));
        let out = tool.invoke(&args(json!({"code": "123"})), &auth()).await.unwrap();
        assert_eq!(out["found"], false);
        assert!(out["product"].is_null());
    }

    #[tokio::test]
    async fn add_date_normalizes_dates() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/date"))
            .and(body_json(json!({
                "productId": "p1",
                "dateExpired": "2025-03-01T00:00:00",
                "quantity": 2.0
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "res": 1,
                "data": {"id": "d5", "productId": "p1", "dateExpired": "2025-03-01T00:00:00"}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tool = AddProductDateTool::new(inventory(&server));
        assert!(tool.exclusive());
        let out = tool
            .invoke(
                &args(json!({"product_id": "p1", "date_expired": "2025-03-01", "quantity": 2.0})),
                &auth(),
            )
            .await
            .unwrap();
        assert_eq!(out["entry"]["id"], "d5");
    }

    #[tokio::test]
    async fn add_date_rejects_garbage_date_locally() {
        let server = MockServer::start().await;
        let tool = AddProductDateTool::new(inventory(&server));
        let err = tool
            .invoke(&args(json!({"product_id": "p1", "date_expired": "soonish"})), &auth())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation { .. }));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn update_requires_a_change() {
        let server = MockServer::start().await;
        let tool = UpdateProductDateTool::new(inventory(&server));
        let err = tool
            .invoke(&args(json!({"date_id": "d1", "product_id": "p1"})), &auth())
            .await
            .unwrap_err();
        assert!(err.message().contains("nothing to update"));
    }

    #[tokio::test]
    async fn remove_product_surfaces_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/v1/product/soft-delete/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Product not found"})))
            .mount(&server)
            .await;

        let tool = RemoveProductTool::new(inventory(&server));
        let err = tool
            .invoke(&args(json!({"product_id": "gone"})), &auth())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::NotFound { .. }));
    }
}
