//! Recipe provider seam between the engine and the host's registries.
//!
//! The host implements [`RecipeProvider`] to expose its recipes and item
//! catalog. [`StaticCatalog`] is an in-memory provider used by the CLI and
//! by tests.

use ahash::AHashMap;
use craftscan_common::{ItemClass, StackKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::stack::ItemStack;
use crate::wildcard::{is_pattern, WildcardPattern};

/// Raw ingredient as declared by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientDescriptor {
    /// Accepted codes; a single entry may be a wildcard pattern
    pub codes: Vec<String>,
    /// Quantity required
    pub quantity: u32,
    /// Tool ingredients are not consumed
    #[serde(default)]
    pub is_tool: bool,
    /// Class filter for wildcard matches
    #[serde(default)]
    pub class: ItemClass,
    /// Allowed wildcard tokens
    #[serde(default)]
    pub allowed: Option<Vec<String>>,
}

impl IngredientDescriptor {
    /// Creates a descriptor for a single code.
    #[must_use]
    pub fn new(code: impl Into<String>, quantity: u32, class: ItemClass) -> Self {
        Self {
            codes: vec![code.into()],
            quantity,
            is_tool: false,
            class,
            allowed: None,
        }
    }

    /// Restricts wildcard tokens.
    #[must_use]
    pub fn allowing<S: Into<String>>(mut self, tokens: impl IntoIterator<Item = S>) -> Self {
        self.allowed = Some(tokens.into_iter().map(Into::into).collect());
        self
    }

    /// Marks the descriptor as a tool.
    #[must_use]
    pub const fn tool(mut self) -> Self {
        self.is_tool = true;
        self
    }
}

/// Raw recipe as declared by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecipeDefinition {
    /// Recipe name
    pub name: String,
    /// Ingredients in declaration order
    pub ingredients: Vec<IngredientDescriptor>,
    /// Produced stacks
    pub outputs: Vec<ItemStack>,
}

/// How an ingredient descriptor resolves against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedIngredient {
    /// Concrete stacks that satisfy the ingredient
    Concrete(Vec<ItemStack>),
    /// A wildcard over the catalog
    Wildcard {
        /// Parsed pattern
        pattern: WildcardPattern,
        /// Allowed tokens
        allowed: Option<Vec<String>>,
        /// Class filter
        class: ItemClass,
    },
}

/// Source of recipes and catalog entries.
pub trait RecipeProvider: Send + Sync {
    /// Enumerates every known recipe.
    fn recipes(&self) -> Vec<RecipeDefinition>;

    /// Resolves an ingredient to concrete stacks or a wildcard, or `None`
    /// when it matches nothing.
    fn resolve_ingredient(&self, descriptor: &IngredientDescriptor) -> Option<ResolvedIngredient>;

    /// Enumerates catalog entries, optionally restricted to one class.
    fn catalog(&self, class: Option<ItemClass>) -> Vec<ItemStack>;

    /// Looks up a catalog entry by identity.
    fn resolve_stack(&self, key: &StackKey) -> Option<ItemStack> {
        self.catalog(None).into_iter().find(|s| s.key() == key)
    }

    /// Checks whether a code names anything in the catalog.
    fn knows_code(&self, code: &str) -> bool {
        self.catalog(None).iter().any(|s| s.code() == code)
    }
}

/// In-memory catalog and recipe list.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    items: Vec<ItemStack>,
    by_key: AHashMap<StackKey, usize>,
    by_code: AHashMap<String, usize>,
    recipes: Vec<RecipeDefinition>,
}

impl StaticCatalog {
    /// Creates an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a catalog entry. Later entries with the same identity replace
    /// earlier ones.
    pub fn add_item(&mut self, stack: ItemStack) {
        let key = stack.key().clone();
        let code = stack.code().to_owned();
        if let Some(&idx) = self.by_key.get(&key) {
            self.items[idx] = stack;
            return;
        }
        let idx = self.items.len();
        self.items.push(stack);
        self.by_key.insert(key, idx);
        self.by_code.entry(code).or_insert(idx);
    }

    /// Registers a recipe definition.
    pub fn add_recipe(&mut self, recipe: RecipeDefinition) {
        self.recipes.push(recipe);
    }

    /// Number of catalog entries.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    /// Number of recipe definitions.
    #[must_use]
    pub fn recipe_count(&self) -> usize {
        self.recipes.len()
    }

    /// First catalog entry with the given code.
    #[must_use]
    pub fn stack_for_code(&self, code: &str) -> Option<&ItemStack> {
        self.by_code.get(code).map(|&i| &self.items[i])
    }
}

impl RecipeProvider for StaticCatalog {
    fn recipes(&self) -> Vec<RecipeDefinition> {
        self.recipes.clone()
    }

    fn resolve_ingredient(&self, descriptor: &IngredientDescriptor) -> Option<ResolvedIngredient> {
        if let Some(raw) = descriptor.codes.iter().find(|c| is_pattern(c)) {
            return match WildcardPattern::parse(raw) {
                Ok(pattern) => Some(ResolvedIngredient::Wildcard {
                    pattern,
                    allowed: descriptor.allowed.clone(),
                    class: descriptor.class,
                }),
                Err(e) => {
                    debug!("Ignoring ingredient pattern: {e}");
                    None
                }
            };
        }

        let stacks: Vec<ItemStack> = descriptor
            .codes
            .iter()
            .filter_map(|code| self.stack_for_code(code).cloned())
            .collect();
        (!stacks.is_empty()).then_some(ResolvedIngredient::Concrete(stacks))
    }

    fn catalog(&self, class: Option<ItemClass>) -> Vec<ItemStack> {
        match class {
            None => self.items.clone(),
            Some(class) => self.items.iter().filter(|s| s.class() == class).cloned().collect(),
        }
    }

    fn resolve_stack(&self, key: &StackKey) -> Option<ItemStack> {
        self.by_key.get(key).map(|&i| self.items[i].clone())
    }

    fn knows_code(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }
}
