//! # Freshmate Services
//!
//! Typed wrappers over the two outbound services the assistant's tools use:
//! the pantry inventory and the recipe search API. Both run every call
//! through [`freshmate_http::HttpClientCore`].

pub mod inventory;
pub mod models;
pub mod recipes;

pub use inventory::InventoryService;
pub use models::{
    ComplexSearchRequest, DateEntry, IngredientMatch, IngredientRanking, Product, ProductDateRequest,
    ProductSearchHit, RecipeInformation, RecipeSearchResults,
};
pub use recipes::RecipeService;
