//! Catalog and pool loading from TOML files.
//!
//! A catalog file lists items and recipes:
//!
//! ```toml
//! [[items]]
//! code = "game:planks-oak"
//! class = "block"
//!
//! [[recipes]]
//! name = "game:recipes/grid/bucket"
//! ingredients = [{ code = "game:planks-*", quantity = 4, class = "block", allowed = ["oak"] }]
//! outputs = [{ code = "game:bucket-*" }]
//! ```
//!
//! A pool file lists stacks with `code`, `count` and `class`.

use std::fs;
use std::path::Path;

use craftscan_common::{CatalogError, CraftscanError, CraftscanResult, ItemClass, StackKey};
use craftscan_core::{IngredientDescriptor, ItemStack, RecipeDefinition, ResourcePool, StaticCatalog};
use serde::Deserialize;
use tracing::{info, warn};

fn default_class() -> String {
    ItemClass::Item.name().to_owned()
}

const fn default_quantity() -> u32 {
    1
}

/// An item entry.
#[derive(Debug, Clone, Deserialize)]
struct ItemEntry {
    code: String,
    #[serde(default = "default_class")]
    class: String,
    #[serde(default)]
    material: Option<String>,
    #[serde(default)]
    variant_type: Option<String>,
    #[serde(default)]
    max_stack: Option<u32>,
}

/// A recipe ingredient; `code` and `codes` are merged.
#[derive(Debug, Clone, Deserialize)]
struct IngredientEntry {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    codes: Vec<String>,
    #[serde(default = "default_quantity")]
    quantity: u32,
    #[serde(default = "default_class")]
    class: String,
    #[serde(default)]
    allowed: Option<Vec<String>>,
    #[serde(default)]
    tool: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct OutputEntry {
    code: String,
    #[serde(default = "default_class")]
    class: String,
    #[serde(default = "default_quantity")]
    quantity: u32,
    #[serde(default)]
    material: Option<String>,
    #[serde(default)]
    variant_type: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RecipeEntry {
    name: String,
    #[serde(default)]
    ingredients: Vec<IngredientEntry>,
    #[serde(default)]
    outputs: Vec<OutputEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<ItemEntry>,
    #[serde(default)]
    recipes: Vec<RecipeEntry>,
}

#[derive(Debug, Clone, Deserialize)]
struct PoolEntry {
    code: String,
    count: u32,
    #[serde(default = "default_class")]
    class: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PoolFile {
    #[serde(default)]
    stacks: Vec<PoolEntry>,
}

fn parse_class(name: &str) -> CraftscanResult<ItemClass> {
    ItemClass::from_name(name).ok_or_else(|| CatalogError::UnknownClassName(name.to_owned()).into())
}

fn keyed(code: String, material: Option<&str>, variant_type: Option<&str>) -> StackKey {
    StackKey::with_attributes(code, material, variant_type)
}

/// Parses a catalog from TOML text.
pub fn parse_catalog(contents: &str) -> CraftscanResult<StaticCatalog> {
    let file: CatalogFile = toml::from_str(contents).map_err(|e| CraftscanError::Serialization(e.to_string()))?;
    let mut catalog = StaticCatalog::new();

    for item in file.items {
        let class = parse_class(&item.class)?;
        let key = keyed(item.code, item.material.as_deref(), item.variant_type.as_deref());
        let mut stack = ItemStack::from_key(key, class, 1);
        if let Some(max_stack) = item.max_stack {
            stack = stack.with_max_stack(max_stack);
        }
        catalog.add_item(stack);
    }

    for recipe in file.recipes {
        let mut ingredients = Vec::with_capacity(recipe.ingredients.len());
        for entry in recipe.ingredients {
            let mut codes = entry.codes;
            if let Some(code) = entry.code {
                codes.insert(0, code);
            }
            if codes.is_empty() {
                warn!("Ingredient without codes in {}", recipe.name);
            }
            ingredients.push(IngredientDescriptor {
                codes,
                quantity: entry.quantity,
                is_tool: entry.tool,
                class: parse_class(&entry.class)?,
                allowed: entry.allowed,
            });
        }
        let mut outputs = Vec::with_capacity(recipe.outputs.len());
        for entry in recipe.outputs {
            let key = keyed(entry.code, entry.material.as_deref(), entry.variant_type.as_deref());
            outputs.push(ItemStack::from_key(key, parse_class(&entry.class)?, entry.quantity));
        }
        catalog.add_recipe(RecipeDefinition {
            name: recipe.name,
            ingredients,
            outputs,
        });
    }
    Ok(catalog)
}

/// Parses a pool from TOML text.
pub fn parse_pool(contents: &str) -> CraftscanResult<ResourcePool> {
    let file: PoolFile = toml::from_str(contents).map_err(|e| CraftscanError::Serialization(e.to_string()))?;
    let mut pool = ResourcePool::new();
    for entry in file.stacks {
        pool.add_count(&entry.code, entry.count, parse_class(&entry.class)?);
    }
    Ok(pool)
}

/// Loads a catalog file.
pub fn load_catalog(path: &Path) -> CraftscanResult<StaticCatalog> {
    let catalog = parse_catalog(&fs::read_to_string(path)?)?;
    info!(
        "Loaded {} items and {} recipes from {}",
        catalog.item_count(),
        catalog.recipe_count(),
        path.display()
    );
    Ok(catalog)
}

/// Loads a pool file.
pub fn load_pool(path: &Path) -> CraftscanResult<ResourcePool> {
    let pool = parse_pool(&fs::read_to_string(path)?)?;
    info!("Loaded {} pooled codes from {}", pool.len(), path.display());
    Ok(pool)
}
