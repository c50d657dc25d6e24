//! Recipe tools over the recipe service.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use freshmate_core::{ApiError, AuthContext, Tool};
use freshmate_services::{ComplexSearchRequest, IngredientRanking, RecipeService};

use crate::args;

const DEFAULT_SEARCH_RESULTS: u32 = 10;
const DEFAULT_INGREDIENT_MATCHES: u32 = 5;

fn list_or_string(description: &str) -> Value {
    json!({
        "type": ["string", "array"],
        "items": { "type": "string" },
        "description": description
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError::unexpected(format!("failed to encode result: {e}")))
}

// --- search_recipes ---

pub struct SearchRecipesTool {
    recipes: Arc<RecipeService>,
}

impl SearchRecipesTool {
    pub fn new(recipes: Arc<RecipeService>) -> Self {
        Self { recipes }
    }
}

#[async_trait]
impl Tool for SearchRecipesTool {
    fn name(&self) -> &str {
        "search_recipes"
    }

    fn description(&self) -> &str {
        "Search recipes by keywords, cuisine, diet, intolerances, and ingredients to include or exclude."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Recipe name or keywords" },
                "cuisine": list_or_string("Cuisine(s), e.g. italian"),
                "diet": list_or_string("Diet(s), e.g. vegetarian"),
                "intolerances": list_or_string("Intolerances, e.g. gluten, dairy"),
                "include_ingredients": list_or_string("Ingredients the recipe must use"),
                "exclude_ingredients": list_or_string("Ingredients the recipe must not use"),
                "max_ready_time": { "type": "integer", "minimum": 1, "description": "Minutes" },
                "sort": { "type": "string", "description": "popularity, healthiness, time, ..." },
                "number": {
                    "type": "integer",
                    "minimum": ComplexSearchRequest::MIN_NUMBER,
                    "maximum": ComplexSearchRequest::MAX_NUMBER,
                    "default": DEFAULT_SEARCH_RESULTS
                },
                "offset": { "type": "integer", "minimum": 0, "default": 0 }
            },
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: &Map<String, Value>, auth: &AuthContext) -> Result<Value, ApiError> {
        let search = ComplexSearchRequest {
            query: args::optional_str(arguments, "query").map(str::to_string),
            cuisine: args::joined_list(arguments, "cuisine"),
            diet: args::joined_list(arguments, "diet"),
            intolerances: args::joined_list(arguments, "intolerances"),
            include_ingredients: args::joined_list(arguments, "include_ingredients"),
            exclude_ingredients: args::joined_list(arguments, "exclude_ingredients"),
            max_ready_time: args::optional_u32(arguments, "max_ready_time")?,
            sort: args::optional_str(arguments, "sort").map(str::to_string),
            number: args::optional_u32(arguments, "number")?.unwrap_or(DEFAULT_SEARCH_RESULTS),
            offset: args::optional_u32(arguments, "offset")?.unwrap_or(0),
        };
        let results = self.recipes.complex_search(auth, &search).await?;
        to_json(&results)
    }
}

// --- recipe_details ---

pub struct RecipeDetailsTool {
    recipes: Arc<RecipeService>,
}

impl RecipeDetailsTool {
    pub fn new(recipes: Arc<RecipeService>) -> Self {
        Self { recipes }
    }
}

#[async_trait]
impl Tool for RecipeDetailsTool {
    fn name(&self) -> &str {
        "recipe_details"
    }

    fn description(&self) -> &str {
        "Get full details of a recipe: ingredients, instructions, timing and servings."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "id": { "type": "integer", "minimum": 1, "description": "Recipe ID from a search" },
                "include_nutrition": { "type": "boolean", "default": false }
            },
            "required": ["id"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: &Map<String, Value>, auth: &AuthContext) -> Result<Value, ApiError> {
        let id = args::optional_u64(arguments, "id")?
            .ok_or_else(|| ApiError::validation("'id' is required"))?;
        let include_nutrition = args::optional_bool(arguments, "include_nutrition").unwrap_or(false);
        let info = self.recipes.recipe_information(auth, id, include_nutrition).await?;
        to_json(&info)
    }
}

// --- recipes_by_ingredients ---

pub struct RecipesByIngredientsTool {
    recipes: Arc<RecipeService>,
}

impl RecipesByIngredientsTool {
    pub fn new(recipes: Arc<RecipeService>) -> Self {
        Self { recipes }
    }
}

#[async_trait]
impl Tool for RecipesByIngredientsTool {
    fn name(&self) -> &str {
        "recipes_by_ingredients"
    }

    fn description(&self) -> &str {
        "Find recipes that use the given ingredients. Good for cooking what is about to expire. \
         ranking 1 maximises used ingredients, 2 minimises missing ones."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "ingredients": {
                    "type": "array",
                    "items": { "type": "string", "minLength": 1 },
                    "minItems": 1
                },
                "number": {
                    "type": "integer",
                    "minimum": ComplexSearchRequest::MIN_NUMBER,
                    "maximum": ComplexSearchRequest::MAX_NUMBER,
                    "default": DEFAULT_INGREDIENT_MATCHES
                },
                "ranking": { "type": "integer", "enum": [1, 2], "default": 1 },
                "ignore_pantry": { "type": "boolean", "default": true }
            },
            "required": ["ingredients"],
            "additionalProperties": false
        })
    }

    async fn invoke(&self, arguments: &Map<String, Value>, auth: &AuthContext) -> Result<Value, ApiError> {
        let ingredients = args::string_list(arguments, "ingredients");
        let number = args::optional_u32(arguments, "number")?.unwrap_or(DEFAULT_INGREDIENT_MATCHES);
        let ranking = match args::optional_u64(arguments, "ranking")? {
            None => IngredientRanking::default(),
            Some(code) => IngredientRanking::from_code(code)
                .ok_or_else(|| ApiError::validation("'ranking' must be 1 or 2"))?,
        };
        let ignore_pantry = args::optional_bool(arguments, "ignore_pantry").unwrap_or(true);

        let matches = self
            .recipes
            .find_by_ingredients(auth, &ingredients, number, ranking, ignore_pantry)
            .await?;
        Ok(json!({
            "ingredients": ingredients,
            "total": matches.len(),
            "recipes": to_json(&matches)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshmate_config::{ClientConfig, RecipesConfig};
    use freshmate_core::{ToolCallRequest, ToolRegistry};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn recipes(server: &MockServer) -> Arc<RecipeService> {
        let config = RecipesConfig {
            base_url: server.uri(),
            api_key: Some("k".into()),
            client: ClientConfig {
                max_retries: 0,
                ..ClientConfig::default()
            },
        };
        Arc::new(RecipeService::new(&config).unwrap())
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

    #[tokio::test]
    async fn search_joins_list_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recipes/complexSearch"))
            .and(query_param("cuisine", "italian,greek"))
            .and(query_param("includeIngredients", "tomato"))
            .and(query_param("number", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "results": [], "offset": 0, "number": 10, "totalResults": 0
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tool = SearchRecipesTool::new(recipes(&server));
        let out = tool
            .invoke(
                &args(json!({"cuisine": ["italian", "greek"], "include_ingredients": "tomato"})),
                &auth(),
            )
            .await
            .unwrap();
        assert_eq!(out["totalResults"], 0);
    }

    #[tokio::test]
    async fn details_schema_requires_id() {
        let server = MockServer::start().await;
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(RecipeDetailsTool::new(recipes(&server))))
            .unwrap();
        let call = ToolCallRequest::new("c1", "recipe_details", json!({"include_nutrition": true}));
        assert!(registry.validate(&call).is_err());
        let call = ToolCallRequest::new("c2", "recipe_details", json!({"id": 42}));
        assert!(registry.validate(&call).is_ok());
    }

    #[tokio::test]
    async fn by_ingredients_uses_defaults() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/recipes/findByIngredients"))
            .and(query_param("ingredients", "yogurt,spinach"))
            .and(query_param("number", "5"))
            .and(query_param("ranking", "1"))
            .and(query_param("ignorePantry", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 9, "title": "Spinach raita", "usedIngredientCount": 2, "missedIngredientCount": 0}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let tool = RecipesByIngredientsTool::new(recipes(&server));
        let out = tool
            .invoke(&args(json!({"ingredients": ["yogurt", "spinach"]})), &auth())
            .await
            .unwrap();
        assert_eq!(out["total"], 1);
        assert_eq!(out["recipes"][0]["title"], "Spinach raita");
    }

    #[tokio::test]
    async fn by_ingredients_schema_rejects_empty_list() {
        let server = MockServer::start().await;
        let mut registry = ToolRegistry::new();
        registry
            .register(Arc::new(RecipesByIngredientsTool::new(recipes(&server))))
            .unwrap();
        let call = ToolCallRequest::new("c1", "recipes_by_ingredients", json!({"ingredients": []}));
        let result = registry.invoke(&call, &auth()).await;
        assert!(matches!(result.outcome, Err(ApiError::Validation { .. })));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
