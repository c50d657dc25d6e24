//! Domain tools for Freshmate.
//!
//! Tools give the assistant access to the user's pantry (inventory service)
//! and to recipe search (recipe service). Every tool forwards the caller's
//! [`AuthContext`](freshmate_core::AuthContext) to the service it wraps.

pub mod args;
pub mod inventory;
pub mod recipes;

use std::sync::Arc;

use freshmate_core::error::ToolError;
use freshmate_core::tool::ToolRegistry;
use freshmate_services::{InventoryService, RecipeService};

pub use inventory::{
    AddProductDateTool, ExpiringProductsTool, ListProductsTool, LookupBarcodeTool, RemoveProductTool,
    SearchProductsTool, UpdateProductDateTool,
};
pub use recipes::{RecipeDetailsTool, RecipesByIngredientsTool, SearchRecipesTool};

/// Create a registry with every pantry and recipe tool.
pub fn default_registry(
    inventory: Arc<InventoryService>,
    recipes: Arc<RecipeService>,
) -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ListProductsTool::new(Arc::clone(&inventory))))?;
    registry.register(Arc::new(ExpiringProductsTool::new(Arc::clone(&inventory))))?;
    registry.register(Arc::new(LookupBarcodeTool::new(Arc::clone(&inventory))))?;
    registry.register(Arc::new(SearchProductsTool::new(Arc::clone(&inventory))))?;
    registry.register(Arc::new(AddProductDateTool::new(Arc::clone(&inventory))))?;
    registry.register(Arc::new(UpdateProductDateTool::new(Arc::clone(&inventory))))?;
    registry.register(Arc::new(RemoveProductTool::new(inventory)))?;
    registry.register(Arc::new(SearchRecipesTool::new(Arc::clone(&recipes))))?;
    registry.register(Arc::new(RecipeDetailsTool::new(Arc::clone(&recipes))))?;
    registry.register(Arc::new(RecipesByIngredientsTool::new(recipes)))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use freshmate_config::{InventoryConfig, RecipesConfig};

    #[test]
    fn registry_has_every_tool_with_valid_schemas() {
        let inventory = Arc::new(InventoryService::new(&InventoryConfig::default()).unwrap());
        let recipes = Arc::new(RecipeService::new(&RecipesConfig::default()).unwrap());
        let registry = default_registry(inventory, recipes).unwrap();

        assert_eq!(
            registry.names(),
            vec![
                "add_product_date",
                "expiring_products",
                "list_products",
                "lookup_barcode",
                "recipe_details",
                "recipes_by_ingredients",
                "remove_product",
                "search_products",
                "search_recipes",
                "update_product_date",
            ]
        );

        let exclusive: Vec<String> = registry
            .names()
            .into_iter()
            .filter(|n| registry.get(n).is_some_and(|t| t.exclusive()))
            .map(str::to_string)
            .collect();
        assert_eq!(exclusive, vec!["add_product_date", "remove_product", "update_product_date"]);

        for def in registry.definitions() {
            assert_eq!(def.parameters["type"], "object", "{}", def.name);
            assert!(!def.description.is_empty());
        }
    }
}
