//! Recipe search service.
//!
//! Responses are bare JSON (no envelope). When a service key is configured
//! it is sent as the `apiKey` query parameter and as the bearer credential;
//! otherwise the caller's credential is forwarded.

use tracing::info;

use freshmate_config::RecipesConfig;
use freshmate_core::{ApiError, AuthContext, Error};
use freshmate_http::{ApiRequest, HttpClientCore};

use crate::models::{
    ComplexSearchRequest, IngredientMatch, IngredientRanking, RecipeInformation, RecipeSearchResults,
};

pub struct RecipeService {
    http: HttpClientCore,
    service_auth: Option<AuthContext>,
}

impl RecipeService {
    pub fn new(config: &RecipesConfig) -> Result<Self, Error> {
        let mut http = HttpClientCore::new("recipes", &config.base_url, &config.client)?;
        let service_auth = match config.api_key.as_deref() {
            Some(key) => {
                http = http.with_default_query("apiKey", key);
                Some(AuthContext::explicit(key).map_err(|e| Error::config(e.to_string()))?)
            }
            None => None,
        };
        Ok(Self { http, service_auth })
    }

    pub fn from_client(http: HttpClientCore, service_auth: Option<AuthContext>) -> Self {
        Self { http, service_auth }
    }

    fn auth<'a>(&'a self, caller: &'a AuthContext) -> &'a AuthContext {
        self.service_auth.as_ref().unwrap_or(caller)
    }

    /// `GET /recipes/complexSearch`. `number` is clamped to 1..=100.
    pub async fn complex_search(
        &self,
        auth: &AuthContext,
        search: &ComplexSearchRequest,
    ) -> Result<RecipeSearchResults, ApiError> {
        let number = search
            .number
            .clamp(ComplexSearchRequest::MIN_NUMBER, ComplexSearchRequest::MAX_NUMBER);
        let request = ApiRequest::get("/recipes/complexSearch")
            .query_opt("query", search.query.as_deref())
            .query_opt("cuisine", search.cuisine.as_deref())
            .query_opt("diet", search.diet.as_deref())
            .query_opt("intolerances", search.intolerances.as_deref())
            .query_opt("includeIngredients", search.include_ingredients.as_deref())
            .query_opt("excludeIngredients", search.exclude_ingredients.as_deref())
            .query_opt("maxReadyTime", search.max_ready_time)
            .query_opt("sort", search.sort.as_deref())
            .query("number", number)
            .query("offset", search.offset);

        let results: RecipeSearchResults = self.http.execute(&request, self.auth(auth)).await?;
        info!(
            query = ?search.query,
            returned = results.results.len(),
            total = results.total_results,
            "Searched recipes"
        );
        Ok(results)
    }

    /// `GET /recipes/{id}/information`
    pub async fn recipe_information(
        &self,
        auth: &AuthContext,
        id: u64,
        include_nutrition: bool,
    ) -> Result<RecipeInformation, ApiError> {
        let request = ApiRequest::get("/recipes")
            .segment(id)
            .segment("information")
            .query("includeNutrition", include_nutrition);
        self.http.execute(&request, self.auth(auth)).await
    }

    /// `GET /recipes/findByIngredients`
    pub async fn find_by_ingredients(
        &self,
        auth: &AuthContext,
        ingredients: &[String],
        number: u32,
        ranking: IngredientRanking,
        ignore_pantry: bool,
    ) -> Result<Vec<IngredientMatch>, ApiError> {
        if ingredients.is_empty() {
            return Err(ApiError::validation("at least one ingredient is required"));
        }
        let request = ApiRequest::get("/recipes/findByIngredients")
            .query("ingredients", ingredients.join(","))
            .query(
                "number",
                number.clamp(ComplexSearchRequest::MIN_NUMBER, ComplexSearchRequest::MAX_NUMBER),
            )
            .query("ranking", ranking.code())
            .query("ignorePantry", ignore_pantry);

        let matches: Vec<IngredientMatch> = self.http.execute(&request, self.auth(auth)).await?;
        info!(ingredients = ingredients.len(), matches = matches.len(), "Matched recipes by ingredients");
        Ok(matches)
    }
}
