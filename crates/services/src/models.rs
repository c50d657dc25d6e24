//! Wire types for the inventory and recipe services.
//!
//! Every struct keeps unknown fields in `extra` so nothing the service sends
//! is lost on the way to the model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use freshmate_core::ApiError;

// --- Inventory ---

/// The inventory service wraps every payload: `{res, error, errorCode, data}`.
/// `res == 1` means success.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub res: i64,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_code: Option<String>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_success(&self) -> bool {
        self.res == 1
    }

    /// Unwrap the payload, turning `res != 1` into an error that carries the
    /// service's own message (or `fallback` when it gave none).
    pub fn into_data(self, fallback: &str) -> Result<Option<T>, ApiError> {
        if self.is_success() {
            return Ok(self.data);
        }
        let message = self.error.unwrap_or_else(|| fallback.to_string());
        let message = match self.error_code {
            Some(code) => format!("{message} ({code})"),
            None => message,
        };
        Err(ApiError::unexpected(message))
    }
}

/// One tracked stock entry of a product.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DateEntry {
    pub id: String,
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_manufactured: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_best_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_expired: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub date_product_users: Vec<DateEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A hit from the product-name search (food database, not the user's pantry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSearchHit {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub brands: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaginatedProducts {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub page: Option<u64>,
    #[serde(default)]
    pub products: Vec<ProductSearchHit>,
}

/// Body of `POST /date` and `PUT /date/{id}`. Dates are ISO-8601 strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDateRequest {
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_manufactured: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_best_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_expired: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<f64>,
}

// --- Recipes ---

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ComplexSearchRequest {
    pub query: Option<String>,
    pub cuisine: Option<String>,
    pub diet: Option<String>,
    pub intolerances: Option<String>,
    pub include_ingredients: Option<String>,
    pub exclude_ingredients: Option<String>,
    pub max_ready_time: Option<u32>,
    pub sort: Option<String>,
    pub number: u32,
    pub offset: u32,
}

impl ComplexSearchRequest {
    pub const MIN_NUMBER: u32 = 1;
    pub const MAX_NUMBER: u32 = 100;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSummary {
    pub id: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeSearchResults {
    #[serde(default)]
    pub results: Vec<RecipeSummary>,
    #[serde(default)]
    pub offset: u32,
    #[serde(default)]
    pub number: u32,
    #[serde(default)]
    pub total_results: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeIngredient {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub amount: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipeInformation {
    pub id: u64,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_in_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub servings: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default)]
    pub extended_ingredients: Vec<RecipeIngredient>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A recipe scored against the ingredients the user already has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngredientMatch {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub used_ingredient_count: u32,
    #[serde(default)]
    pub missed_ingredient_count: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `findByIngredients` ranking: maximise used ingredients, or minimise
/// missing ones.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IngredientRanking {
    #[default]
    MaximizeUsed,
    MinimizeMissing,
}

impl IngredientRanking {
    pub fn from_code(code: u64) -> Option<Self> {
        match code {
            1 => Some(Self::MaximizeUsed),
            2 => Some(Self::MinimizeMissing),
            _ => None,
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::MaximizeUsed => 1,
            Self::MinimizeMissing => 2,
        }
    }
}
