//! Normalized recipes and ingredients.
//!
//! These are the engine's own representation of a host recipe. Each
//! ingredient is either a concrete option list or a wildcard matcher, and
//! ingredients sharing a [`GroupKey`] compete for the same stock.

use std::collections::BTreeMap;

use craftscan_common::{is_foreign_domain, ItemClass, RecipeId, StackKey};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stack::ItemStack;
use crate::wildcard::{fill_template, is_pattern, WildcardMatcher};

/// Recipe construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecipeError {
    /// Recipe produces nothing
    #[error("Recipe '{0}' has no outputs")]
    NoOutputs(String),
    /// Every ingredient was dropped during resolution
    #[error("Recipe '{0}' has no resolvable ingredients")]
    NoIngredients(String),
}

/// Result type for recipe construction.
pub type RecipeResult<T> = Result<T, RecipeError>;

const WILD_PREFIX: &str = "wild:";

/// Canonical key of the stock an ingredient draws from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GroupKey(String);

impl GroupKey {
    /// Key of a concrete option list: sorted distinct codes joined by `|`.
    #[must_use]
    pub fn concrete<S: AsRef<str>>(codes: &[S]) -> Self {
        let mut sorted: Vec<&str> = codes.iter().map(AsRef::as_ref).collect();
        sorted.sort_unstable();
        sorted.dedup();
        Self(sorted.join("|"))
    }

    /// Key of a wildcard ingredient: pattern, sorted allow-list and class.
    #[must_use]
    pub fn wildcard(matcher: &WildcardMatcher) -> Self {
        let allowed = matcher.allowed().map(|list| list.join(",")).unwrap_or_default();
        Self(format!(
            "{WILD_PREFIX}{}|{allowed}|T:{}",
            matcher.pattern(),
            matcher.class().as_i32()
        ))
    }

    /// Checks if this key names a wildcard group.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.0.starts_with(WILD_PREFIX)
    }

    /// Class filter of a wildcard group, `None` for concrete groups.
    #[must_use]
    pub fn wildcard_class(&self) -> Option<ItemClass> {
        if !self.is_wildcard() {
            return None;
        }
        let (_, class) = self.0.rsplit_once("|T:")?;
        class.parse().ok().and_then(ItemClass::from_i32)
    }

    /// Codes of a concrete group, empty for wildcard groups.
    pub fn concrete_codes(&self) -> impl Iterator<Item = &str> + '_ {
        let codes = if self.is_wildcard() { "" } else { self.0.as_str() };
        codes.split('|').filter(|c| !c.is_empty())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for GroupKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether an ingredient is consumed or only needs to be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum IngredientRole {
    /// Used up by crafting
    #[default]
    Consumed,
    /// Must be present, never consumed
    Tool,
}

/// What an ingredient slot accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IngredientKind {
    /// Any of the listed codes (sorted, distinct)
    Concrete(Vec<String>),
    /// Any code matching the pattern
    Wildcard(WildcardMatcher),
}

/// An ingredient of a recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ingredient {
    /// Accepted stock
    pub kind: IngredientKind,
    /// Quantity as written in the recipe
    pub quantity: u32,
    /// Consumed or tool
    pub role: IngredientRole,
}

impl Ingredient {
    /// Creates a consumed ingredient accepting any of `codes`.
    #[must_use]
    pub fn concrete<S: Into<String>>(codes: impl IntoIterator<Item = S>, quantity: u32) -> Self {
        let mut codes: Vec<String> = codes.into_iter().map(Into::into).collect();
        codes.sort();
        codes.dedup();
        Self {
            kind: IngredientKind::Concrete(codes),
            quantity,
            role: IngredientRole::Consumed,
        }
    }

    /// Creates a consumed wildcard ingredient.
    #[must_use]
    pub const fn wildcard(matcher: WildcardMatcher, quantity: u32) -> Self {
        Self {
            kind: IngredientKind::Wildcard(matcher),
            quantity,
            role: IngredientRole::Consumed,
        }
    }

    /// Marks the ingredient as a tool.
    #[must_use]
    pub const fn as_tool(mut self) -> Self {
        self.role = IngredientRole::Tool;
        self
    }

    /// Checks if the ingredient is a tool.
    #[must_use]
    pub fn is_tool(&self) -> bool {
        self.role == IngredientRole::Tool
    }

    /// Units this ingredient needs: tools always one, others at least one.
    #[must_use]
    pub fn required(&self) -> u32 {
        match self.role {
            IngredientRole::Tool => 1,
            IngredientRole::Consumed => self.quantity.max(1),
        }
    }

    /// Group key of the ingredient.
    #[must_use]
    pub fn group_key(&self) -> GroupKey {
        match &self.kind {
            IngredientKind::Concrete(codes) => GroupKey::concrete(codes),
            IngredientKind::Wildcard(matcher) => GroupKey::wildcard(matcher),
        }
    }

    /// The wildcard matcher, if this is a wildcard ingredient.
    #[must_use]
    pub const fn matcher(&self) -> Option<&WildcardMatcher> {
        match &self.kind {
            IngredientKind::Wildcard(m) => Some(m),
            IngredientKind::Concrete(_) => None,
        }
    }

    /// Concrete options, empty for wildcards.
    #[must_use]
    pub fn options(&self) -> &[String] {
        match &self.kind {
            IngredientKind::Concrete(codes) => codes,
            IngredientKind::Wildcard(_) => &[],
        }
    }

    /// Checks whether a pooled code can stand in for this ingredient.
    #[must_use]
    pub fn accepts(&self, code: &str, class: ItemClass) -> bool {
        match &self.kind {
            IngredientKind::Concrete(codes) => codes.binary_search_by(|c| c.as_str().cmp(code)).is_ok(),
            IngredientKind::Wildcard(m) => m.matches(code, class),
        }
    }

    fn mentions_foreign_domain(&self) -> bool {
        match &self.kind {
            IngredientKind::Concrete(codes) => codes.iter().any(|c| is_foreign_domain(c)),
            IngredientKind::Wildcard(m) => is_foreign_domain(m.pattern().as_str()),
        }
    }
}

/// A normalized crafting recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Identifier within its index
    pub id: RecipeId,
    /// Host name of the recipe, such as `game:recipes/grid/bucket`
    pub name: String,
    /// Ingredients in declaration order
    pub ingredients: Vec<Ingredient>,
    /// Produced stacks; codes and attributes may hold placeholders
    pub outputs: Vec<ItemStack>,
    /// Whether the recipe belongs to a non-base namespace
    pub is_mod: bool,
}

impl Recipe {
    /// Creates a new recipe builder.
    #[must_use]
    pub fn builder(id: RecipeId, name: impl Into<String>) -> RecipeBuilder {
        RecipeBuilder::new(id, name)
    }

    /// Required units per group key, summing ingredients that share a key.
    #[must_use]
    pub fn group_needs(&self) -> BTreeMap<GroupKey, u32> {
        let mut needs = BTreeMap::new();
        for ingredient in &self.ingredients {
            *needs.entry(ingredient.group_key()).or_insert(0) += ingredient.required();
        }
        needs
    }

    /// First wildcard ingredient, which drives output expansion.
    #[must_use]
    pub fn first_wildcard(&self) -> Option<&Ingredient> {
        self.ingredients.iter().find(|i| i.matcher().is_some())
    }

    /// Output identities with placeholders substituted by `token`.
    #[must_use]
    pub fn expand_outputs(&self, token: &str) -> Vec<StackKey> {
        self.outputs
            .iter()
            .map(|out| {
                let key = out.key();
                StackKey::with_attributes(
                    fill_template(key.code(), token),
                    key.material().map(|m| fill_template(m, token)).as_deref(),
                    key.variant_type().map(|t| fill_template(t, token)).as_deref(),
                )
            })
            .collect()
    }

    /// Checks whether any output still carries a placeholder.
    #[must_use]
    pub fn has_templated_outputs(&self) -> bool {
        self.outputs.iter().any(|o| is_templated(o.key()))
    }

    /// Checks if the recipe needs no wildcard stock.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        self.first_wildcard().is_none()
    }

    /// A named recipe is classified by its name alone; unnamed recipes by
    /// their outputs, then their ingredients.
    fn derive_mod_flag(name: &str, outputs: &[ItemStack], ingredients: &[Ingredient]) -> bool {
        if !name.is_empty() {
            return is_foreign_domain(name);
        }
        outputs.iter().any(|o| is_foreign_domain(o.code()))
            || ingredients.iter().any(Ingredient::mentions_foreign_domain)
    }
}

/// Checks whether an identity holds a placeholder in code or attributes.
#[must_use]
pub fn is_templated(key: &StackKey) -> bool {
    is_pattern(key.code())
        || key.material().is_some_and(is_pattern)
        || key.variant_type().is_some_and(is_pattern)
}

/// Builder for creating recipes.
#[derive(Debug)]
pub struct RecipeBuilder {
    id: RecipeId,
    name: String,
    ingredients: Vec<Ingredient>,
    outputs: Vec<ItemStack>,
}

impl RecipeBuilder {
    fn new(id: RecipeId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            ingredients: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Adds an ingredient.
    #[must_use]
    pub fn ingredient(mut self, ingredient: Ingredient) -> Self {
        self.ingredients.push(ingredient);
        self
    }

    /// Adds a tool that is required but not consumed.
    #[must_use]
    pub fn tool(mut self, code: impl Into<String>) -> Self {
        self.ingredients.push(Ingredient::concrete([code.into()], 1).as_tool());
        self
    }

    /// Adds an output stack.
    #[must_use]
    pub fn output(mut self, stack: ItemStack) -> Self {
        self.outputs.push(stack);
        self
    }

    /// Builds the recipe, deriving its mod flag.
    pub fn build(self) -> RecipeResult<Recipe> {
        if self.outputs.is_empty() {
            return Err(RecipeError::NoOutputs(self.name));
        }
        if self.ingredients.is_empty() {
            return Err(RecipeError::NoIngredients(self.name));
        }
        let is_mod = Recipe::derive_mod_flag(&self.name, &self.outputs, &self.ingredients);
        Ok(Recipe {
            id: self.id,
            name: self.name,
            ingredients: self.ingredients,
            outputs: self.outputs,
            is_mod,
        })
    }
}
