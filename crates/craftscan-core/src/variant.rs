//! Catalog variants: named partitions of the recipe set, each with its own
//! index and consumer context.

use craftscan_common::{ContextKey, StackKey};
use serde::{Deserialize, Serialize};

use crate::recipe::Recipe;

/// Wood species recognized in codes and attributes.
pub const WOOD_SPECIES: &[&str] = &[
    "birch",
    "maple",
    "pine",
    "acacia",
    "kapok",
    "baldcypress",
    "larch",
    "redwood",
    "ebony",
    "walnut",
    "purpleheart",
    "oak",
    "aged",
];

/// Rock types recognized in codes and attributes.
pub const STONE_SPECIES: &[&str] = &[
    "andesite",
    "basalt",
    "bauxite",
    "chalk",
    "chert",
    "claystone",
    "conglomerate",
    "granite",
    "kimberlite",
    "limestone",
    "whitemarble",
    "redmarble",
    "greenmarble",
    "peridotite",
    "phyllite",
    "sandstone",
    "shale",
    "slate",
    "suevite",
];

/// Material family used to carve out variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialFamily {
    /// Wood species
    Wood,
    /// Rock types
    Stone,
}

impl MaterialFamily {
    /// Species names belonging to the family.
    #[must_use]
    pub const fn species(self) -> &'static [&'static str] {
        match self {
            Self::Wood => WOOD_SPECIES,
            Self::Stone => STONE_SPECIES,
        }
    }

    const fn placeholder(self) -> &'static str {
        match self {
            Self::Wood => "{wood}",
            Self::Stone => "{rock}",
        }
    }

    const fn type_prefix(self) -> &'static str {
        match self {
            Self::Wood => "wood-",
            Self::Stone => "stone-",
        }
    }

    /// Checks whether a code holds a species as a separator-delimited segment.
    #[must_use]
    pub fn matches_code(self, code: &str) -> bool {
        let lower = code.to_ascii_lowercase();
        if lower.contains(self.placeholder()) {
            return true;
        }
        let path = lower.split_once(':').map_or(lower.as_str(), |(_, p)| p);
        path.split(is_separator)
            .any(|segment| self.species().contains(&segment))
    }

    /// Checks material/type attributes for a species or the family placeholder.
    #[must_use]
    pub fn matches_attributes(self, material: Option<&str>, variant_type: Option<&str>) -> bool {
        let material_hit = material.is_some_and(|m| {
            let m = m.to_ascii_lowercase();
            m == self.placeholder() || self.species().contains(&m.as_str())
        });
        let type_hit = variant_type.is_some_and(|t| {
            let t = t.to_ascii_lowercase();
            t.strip_prefix(self.type_prefix())
                .is_some_and(|rest| self.species().contains(&rest))
        });
        material_hit || type_hit
    }

    /// Checks an identity by code and attributes.
    #[must_use]
    pub fn matches_key(self, key: &StackKey) -> bool {
        self.matches_code(key.code()) || self.matches_attributes(key.material(), key.variant_type())
    }

    /// A recipe belongs to the family when any of its outputs does.
    #[must_use]
    pub fn contains_recipe(self, recipe: &Recipe) -> bool {
        recipe.outputs.iter().any(|o| self.matches_key(o.key()))
    }
}

const fn is_separator(c: char) -> bool {
    matches!(c, '-' | '_' | '/' | '.')
}

/// A named partition of the recipe set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CatalogVariant {
    /// Base-game recipes outside the material families
    Vanilla,
    /// Recipes from other namespaces
    Mods,
    /// Base-game wood recipes
    Wood,
    /// Base-game stone recipes
    Stone,
    /// Everything
    All,
}

impl CatalogVariant {
    /// Every variant, in build order.
    pub const ALL: [Self; 5] = [Self::All, Self::Mods, Self::Wood, Self::Stone, Self::Vanilla];

    /// Short key used in cache file names and logs.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Vanilla => "van",
            Self::Mods => "mods",
            Self::Wood => "wood",
            Self::Stone => "stone",
            Self::All => "all",
        }
    }

    /// Cache file stem.
    #[must_use]
    pub const fn cache_name(self) -> &'static str {
        match self {
            Self::Vanilla => "vanilla",
            Self::Mods => "mods",
            Self::Wood => "wood",
            Self::Stone => "stone",
            Self::All => "all",
        }
    }

    /// Default consumer context showing this variant.
    #[must_use]
    pub fn context(self) -> ContextKey {
        ContextKey::new(match self {
            Self::Vanilla => "craftableTab",
            Self::Mods => "modTab",
            Self::Wood => "woodTab",
            Self::Stone => "stoneTab",
            Self::All => "allTab",
        })
    }

    /// Variant served by a context, if the context is known.
    #[must_use]
    pub fn from_context(context: &ContextKey) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.context() == *context)
    }

    /// Variant for a short key.
    #[must_use]
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|v| v.key() == key || v.cache_name() == key)
    }

    /// Checks whether a recipe belongs to this variant.
    #[must_use]
    pub fn admits(self, recipe: &Recipe) -> bool {
        let wood = || MaterialFamily::Wood.contains_recipe(recipe);
        let stone = || MaterialFamily::Stone.contains_recipe(recipe);
        match self {
            Self::All => true,
            Self::Mods => recipe.is_mod,
            Self::Wood => !recipe.is_mod && wood(),
            Self::Stone => !recipe.is_mod && stone(),
            Self::Vanilla => !recipe.is_mod && !wood() && !stone(),
        }
    }
}

impl std::fmt::Display for CatalogVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Ingredient;
    use crate::stack::ItemStack;
    use craftscan_common::{ItemClass, RecipeId};

    fn recipe(name: &str, output: StackKey) -> Recipe {
        Recipe::builder(RecipeId::new(0), name)
            .ingredient(Ingredient::concrete(["game:stick"], 1))
            .output(ItemStack::from_key(output, ItemClass::Item, 1))
            .build()
            .expect("valid")
    }

    #[test]
    fn test_code_segments() {
        assert!(MaterialFamily::Wood.matches_code("game:planks-oak"));
        assert!(MaterialFamily::Wood.matches_code("game:Door/Oak.shape"));
        assert!(!MaterialFamily::Wood.matches_code("game:cloak"));
        assert!(MaterialFamily::Stone.matches_code("game:rock_granite"));
        assert!(!MaterialFamily::Stone.matches_code("game:planks-oak"));
        assert!(MaterialFamily::Stone.matches_code("game:wall-{rock}"));
    }

    #[test]
    fn test_attributes() {
        assert!(MaterialFamily::Wood.matches_attributes(Some("{wood}"), None));
        assert!(MaterialFamily::Wood.matches_attributes(None, Some("wood-pine")));
        assert!(MaterialFamily::Stone.matches_attributes(Some("Basalt"), None));
        assert!(!MaterialFamily::Stone.matches_attributes(None, Some("wood-pine")));
    }

    #[test]
    fn test_variant_partition() {
        let wood = recipe("game:recipes/door", StackKey::new("game:door-oak"));
        let stone = recipe("game:recipes/wall", StackKey::new("game:wall-granite"));
        let plain = recipe("game:recipes/rope", StackKey::new("game:rope"));
        let modded = recipe("extra:recipes/gear", StackKey::new("extra:gear-oak"));

        assert!(CatalogVariant::Wood.admits(&wood));
        assert!(!CatalogVariant::Vanilla.admits(&wood));
        assert!(CatalogVariant::Stone.admits(&stone));
        assert!(CatalogVariant::Vanilla.admits(&plain));
        assert!(CatalogVariant::Mods.admits(&modded));
        assert!(!CatalogVariant::Wood.admits(&modded));
        for r in [&wood, &stone, &plain, &modded] {
            assert!(CatalogVariant::All.admits(r));
        }
    }

    #[test]
    fn test_context_mapping() {
        for variant in CatalogVariant::ALL {
            assert_eq!(CatalogVariant::from_context(&variant.context()), Some(variant));
            assert_eq!(CatalogVariant::from_key(variant.key()), Some(variant));
        }
        assert_eq!(CatalogVariant::from_context(&ContextKey::new("nope")), None);
    }
}
