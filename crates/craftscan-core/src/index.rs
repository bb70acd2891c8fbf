//! Recipe index: normalized recipes of one catalog variant plus the reverse
//! maps the scanner walks.

use std::collections::BTreeMap;
use std::time::Instant;

use ahash::{AHashMap, AHashSet};
use craftscan_common::{RecipeId, StackKey};
use tracing::{debug, info};

use crate::provider::{RecipeDefinition, RecipeProvider, ResolvedIngredient};
use crate::recipe::{is_templated, GroupKey, Ingredient, Recipe, RecipeResult};
use crate::variant::CatalogVariant;
use crate::wildcard::{WildcardMatcher, WildcardPattern};

/// A wildcard ingredient group of one recipe.
#[derive(Debug, Clone)]
pub struct WildcardGroup {
    /// Owning recipe
    pub recipe: RecipeId,
    /// Group key of the ingredient
    pub key: GroupKey,
    /// Pattern, allow-list and class
    pub matcher: WildcardMatcher,
}

/// An output whose identity still holds a placeholder.
#[derive(Debug, Clone)]
struct TemplatedOutput {
    recipe: RecipeId,
    pattern: WildcardPattern,
}

/// Recipe candidate for a catalog identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputCandidate {
    /// Producing recipe
    pub recipe: RecipeId,
    /// Token bound by a templated output, if the match came from one
    pub token: Option<String>,
}

/// Counts collected while building an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildStats {
    /// Definitions offered by the provider
    pub offered: usize,
    /// Definitions rejected as malformed
    pub malformed: usize,
    /// Ingredients dropped because nothing resolved
    pub dropped_ingredients: usize,
    /// Recipes outside the variant
    pub filtered: usize,
}

/// Per-variant recipe index.
#[derive(Debug, Clone)]
pub struct RecipeIndex {
    variant: CatalogVariant,
    recipes: Vec<Recipe>,
    needs: Vec<BTreeMap<GroupKey, u32>>,
    code_to_groups: AHashMap<String, Vec<(RecipeId, GroupKey)>>,
    code_to_keys: AHashMap<String, AHashSet<GroupKey>>,
    wildcard_groups: Vec<WildcardGroup>,
    outputs: AHashMap<StackKey, Vec<RecipeId>>,
    templated: Vec<TemplatedOutput>,
}

impl RecipeIndex {
    /// Builds the index of `variant` from the provider's recipes.
    pub fn build(variant: CatalogVariant, provider: &dyn RecipeProvider) -> (Self, BuildStats) {
        let started = Instant::now();
        let definitions = provider.recipes();
        let mut stats = BuildStats {
            offered: definitions.len(),
            ..BuildStats::default()
        };

        let mut recipes = Vec::new();
        for def in &definitions {
            let id = RecipeId::new(recipes.len() as u32);
            match normalize(def, id, provider, &mut stats) {
                Ok(recipe) if variant.admits(&recipe) => recipes.push(recipe),
                Ok(_) => stats.filtered += 1,
                Err(e) => {
                    debug!("Skipping recipe: {e}");
                    stats.malformed += 1;
                }
            }
        }

        let code_to_groups = map_codes(&recipes, provider);
        let needs = recipes.iter().map(Recipe::group_needs).collect();
        let index = Self::assemble(variant, recipes, needs, code_to_groups);
        info!(
            "Built {variant} recipe index: {} recipes, {} codes, {} malformed, {} ingredients dropped in {:?}",
            index.len(),
            index.code_to_groups.len(),
            stats.malformed,
            stats.dropped_ingredients,
            started.elapsed()
        );
        (index, stats)
    }

    /// Assembles an index from normalized recipes, their group needs and
    /// their code map.
    ///
    /// Recipe ids must equal their position in `recipes`, and `needs` runs
    /// parallel to `recipes`.
    pub(crate) fn assemble(
        variant: CatalogVariant,
        recipes: Vec<Recipe>,
        needs: Vec<BTreeMap<GroupKey, u32>>,
        code_to_groups: AHashMap<String, Vec<(RecipeId, GroupKey)>>,
    ) -> Self {

        let mut code_to_keys: AHashMap<String, AHashSet<GroupKey>> = AHashMap::new();
        for (code, groups) in &code_to_groups {
            code_to_keys
                .entry(code.clone())
                .or_default()
                .extend(groups.iter().map(|(_, key)| key.clone()));
        }

        let mut wildcard_groups = Vec::new();
        let mut outputs: AHashMap<StackKey, Vec<RecipeId>> = AHashMap::new();
        let mut templated = Vec::new();
        for recipe in &recipes {
            let mut seen = AHashSet::new();
            for ingredient in &recipe.ingredients {
                if let Some(matcher) = ingredient.matcher() {
                    let key = ingredient.group_key();
                    if seen.insert(key.clone()) {
                        wildcard_groups.push(WildcardGroup {
                            recipe: recipe.id,
                            key,
                            matcher: matcher.clone(),
                        });
                    }
                }
            }
            for out in &recipe.outputs {
                if is_templated(out.key()) {
                    if let Ok(pattern) = WildcardPattern::parse(out.code()) {
                        templated.push(TemplatedOutput {
                            recipe: recipe.id,
                            pattern,
                        });
                    }
                    continue;
                }
                let producers = outputs.entry(out.key().clone()).or_default();
                if !producers.contains(&recipe.id) {
                    producers.push(recipe.id);
                }
            }
        }

        Self {
            variant,
            recipes,
            needs,
            code_to_groups,
            code_to_keys,
            wildcard_groups,
            outputs,
            templated,
        }
    }

    /// Variant this index serves.
    #[must_use]
    pub const fn variant(&self) -> CatalogVariant {
        self.variant
    }

    /// Number of recipes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    /// Checks if the index holds no recipes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// All recipes, indexed by id.
    #[must_use]
    pub fn recipes(&self) -> &[Recipe] {
        &self.recipes
    }

    /// Recipe by id.
    #[must_use]
    pub fn recipe(&self, id: RecipeId) -> Option<&Recipe> {
        self.recipes.get(id.index())
    }

    /// Required units per group for a recipe.
    #[must_use]
    pub fn needs(&self, id: RecipeId) -> Option<&BTreeMap<GroupKey, u32>> {
        self.needs.get(id.index())
    }

    /// `(recipe, group)` pairs a code contributes to.
    #[must_use]
    pub fn groups_for_code(&self, code: &str) -> &[(RecipeId, GroupKey)] {
        self.code_to_groups.get(code).map(Vec::as_slice).unwrap_or_default()
    }

    /// Group keys a code contributes to.
    #[must_use]
    pub fn code_feeds_group(&self, code: &str, key: &GroupKey) -> bool {
        self.code_to_keys.get(code).is_some_and(|keys| keys.contains(key))
    }

    /// Raw code map, used when persisting the index.
    #[must_use]
    pub fn code_map(&self) -> &AHashMap<String, Vec<(RecipeId, GroupKey)>> {
        &self.code_to_groups
    }

    /// Wildcard groups of all recipes.
    #[must_use]
    pub fn wildcard_groups(&self) -> &[WildcardGroup] {
        &self.wildcard_groups
    }

    /// Recipes whose concrete outputs include `key`.
    #[must_use]
    pub fn producers_of(&self, key: &StackKey) -> &[RecipeId] {
        self.outputs.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Candidate recipes for a catalog identity: exact producers plus
    /// templated outputs whose pattern matches the identity's code.
    #[must_use]
    pub fn candidates_for(&self, key: &StackKey) -> Vec<OutputCandidate> {
        let mut found: Vec<OutputCandidate> = self
            .producers_of(key)
            .iter()
            .map(|&recipe| OutputCandidate { recipe, token: None })
            .collect();
        for t in &self.templated {
            if let Some(token) = t.pattern.extract_token(key.code()) {
                if token.is_empty() || found.iter().any(|c| c.recipe == t.recipe) {
                    continue;
                }
                found.push(OutputCandidate {
                    recipe: t.recipe,
                    token: Some(token.to_owned()),
                });
            }
        }
        found
    }

    /// Number of candidate recipes for an identity, used as a work weight.
    #[must_use]
    pub fn candidate_weight(&self, key: &StackKey) -> usize {
        self.producers_of(key).len()
            + self
                .templated
                .iter()
                .filter(|t| t.pattern.matches_code(key.code()))
                .count()
    }
}

/// Turns a host definition into a normalized recipe.
pub(crate) fn normalize(
    def: &RecipeDefinition,
    id: RecipeId,
    provider: &dyn RecipeProvider,
    stats: &mut BuildStats,
) -> RecipeResult<Recipe> {
    let mut builder = Recipe::builder(id, def.name.clone());
    for descriptor in &def.ingredients {
        let ingredient = match provider.resolve_ingredient(descriptor) {
            Some(ResolvedIngredient::Concrete(stacks)) => {
                Ingredient::concrete(stacks.iter().map(|s| s.code().to_owned()), descriptor.quantity)
            }
            Some(ResolvedIngredient::Wildcard { pattern, allowed, class }) => {
                Ingredient::wildcard(WildcardMatcher::new(pattern, allowed, class), descriptor.quantity)
            }
            None => {
                stats.dropped_ingredients += 1;
                continue;
            }
        };
        builder = builder.ingredient(if descriptor.is_tool { ingredient.as_tool() } else { ingredient });
    }
    for output in &def.outputs {
        builder = builder.output(output.clone());
    }
    builder.build()
}

/// Maps every code that can feed a group to its `(recipe, group)` pairs.
///
/// Wildcard groups are expanded against the provider catalog of the
/// ingredient's class; expansions are shared between identical groups.
fn map_codes(recipes: &[Recipe], provider: &dyn RecipeProvider) -> AHashMap<String, Vec<(RecipeId, GroupKey)>> {
    let mut map: AHashMap<String, Vec<(RecipeId, GroupKey)>> = AHashMap::new();
    let mut wild_cache: AHashMap<GroupKey, Vec<String>> = AHashMap::new();
    let mut catalogs = AHashMap::new();

    for recipe in recipes {
        let mut seen = AHashSet::new();
        for ingredient in &recipe.ingredients {
            let key = ingredient.group_key();
            if !seen.insert(key.clone()) {
                continue;
            }
            let codes: Vec<String> = match ingredient.matcher() {
                None => ingredient.options().to_vec(),
                Some(matcher) => wild_cache
                    .entry(key.clone())
                    .or_insert_with(|| {
                        let catalog = catalogs
                            .entry(matcher.class())
                            .or_insert_with(|| provider.catalog(Some(matcher.class())));
                        let mut codes: Vec<String> = catalog
                            .iter()
                            .filter(|s| matcher.matches(s.code(), s.class()))
                            .map(|s| s.code().to_owned())
                            .collect();
                        codes.sort();
                        codes.dedup();
                        codes
                    })
                    .clone(),
            };
            for code in codes {
                let entry = map.entry(code).or_default();
                let pair = (recipe.id, key.clone());
                if !entry.contains(&pair) {
                    entry.push(pair);
                }
            }
        }
    }
    map
}
