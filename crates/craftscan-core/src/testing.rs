//! Shared fixtures for unit tests.

use craftscan_common::ItemClass;

use crate::pool::ResourcePool;
use crate::provider::{IngredientDescriptor, RecipeDefinition, StaticCatalog};
use crate::stack::ItemStack;

/// Catalog with planks, sticks, buckets and a few recipes, one of them
/// malformed and one with an ingredient missing from the catalog.
pub(crate) fn bucket_catalog() -> StaticCatalog {
    let mut cat = StaticCatalog::new();
    for code in ["game:planks-oak", "game:planks-pine", "game:planks-birch"] {
        cat.add_item(ItemStack::new(code, ItemClass::Block, 1));
    }
    cat.add_item(ItemStack::new("game:stick", ItemClass::Item, 1));
    cat.add_item(ItemStack::new("game:bucket-oak", ItemClass::Item, 1));
    cat.add_item(ItemStack::new("game:bucket-pine", ItemClass::Item, 1));
    cat.add_item(ItemStack::new("game:torch", ItemClass::Item, 1));
    cat.add_recipe(RecipeDefinition {
        name: "game:recipes/grid/bucket".to_owned(),
        ingredients: vec![IngredientDescriptor::new("game:planks-*", 4, ItemClass::Block).allowing(["oak", "pine"])],
        outputs: vec![ItemStack::new("game:bucket-*", ItemClass::Item, 1)],
    });
    cat.add_recipe(RecipeDefinition {
        name: "game:recipes/grid/torch".to_owned(),
        ingredients: vec![
            IngredientDescriptor::new("game:stick", 1, ItemClass::Item),
            IngredientDescriptor::new("game:resin", 1, ItemClass::Item),
        ],
        outputs: vec![ItemStack::new("game:torch", ItemClass::Item, 1)],
    });
    cat.add_recipe(RecipeDefinition {
        name: "game:recipes/grid/broken".to_owned(),
        ingredients: vec![IngredientDescriptor::new("game:stick", 1, ItemClass::Item)],
        outputs: vec![],
    });
    cat
}

/// Builds a pool from `(code, count, class)` triples.
pub(crate) fn pool_of(entries: &[(&str, u32, ItemClass)]) -> ResourcePool {
    let mut pool = ResourcePool::new();
    for &(code, count, class) in entries {
        pool.add_count(code, count, class);
    }
    pool
}
