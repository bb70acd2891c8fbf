//! Craftability scanner.
//!
//! Given a pool and a recipe index, finds the recipes the pool satisfies and
//! the concrete outputs they produce:
//!
//! 1. gather candidate recipes from the codes present in the pool,
//! 2. deduct pooled stock from a copy of each candidate's group needs,
//! 3. re-check in isolation every candidate the deduction could not settle,
//! 4. expand wildcard outputs once per token the pool can supply.
//!
//! A separate catalog pass walks every catalog identity and tests its
//! producers directly, surfacing outputs the pool has never held.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Instant;

use craftscan_common::{ItemClass, RecipeId, StackKey};
use tracing::debug;

use crate::display::DisplayResolver;
use crate::index::RecipeIndex;
use crate::partition::ParallelPartitioner;
use crate::pool::ResourcePool;
use crate::recipe::{is_templated, GroupKey, IngredientKind, Recipe};
use crate::stack::ItemStack;

/// Result of a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Recipes the pool satisfies
    pub satisfied: Vec<RecipeId>,
    /// Concrete output identities
    pub outputs: BTreeSet<StackKey>,
    /// Display ids of the outputs and catalog hits
    pub display_ids: BTreeSet<String>,
}

#[derive(Debug)]
struct Candidate {
    remaining: BTreeMap<GroupKey, u32>,
    flagged: bool,
}

impl Candidate {
    fn quick_satisfied(&self) -> bool {
        self.remaining.values().all(|&need| need == 0)
    }
}

/// Scanner over one recipe index.
#[derive(Debug, Clone, Copy)]
pub struct CraftabilityScanner<'a> {
    index: &'a RecipeIndex,
}

impl<'a> CraftabilityScanner<'a> {
    /// Creates a scanner over `index`.
    #[must_use]
    pub const fn new(index: &'a RecipeIndex) -> Self {
        Self { index }
    }

    /// Runs phases one to four and resolves display ids.
    #[must_use]
    pub fn scan(&self, pool: &ResourcePool, resolver: &dyn DisplayResolver) -> ScanOutcome {
        let started = Instant::now();
        let satisfied = self.satisfied_recipes(pool);

        let mut outputs = BTreeSet::new();
        for &id in &satisfied {
            if let Some(recipe) = self.index.recipe(id) {
                outputs.extend(self.expand_outputs(pool, recipe));
            }
        }
        let display_ids = outputs.iter().filter_map(|key| resolver.display_id(key)).collect();

        debug!(
            "Scanned {} pooled codes against {} recipes: {} satisfied, {} outputs in {:?}",
            pool.len(),
            self.index.len(),
            satisfied.len(),
            outputs.len(),
            started.elapsed()
        );
        ScanOutcome {
            satisfied,
            outputs,
            display_ids,
        }
    }

    /// Runs [`scan`](Self::scan) followed by the catalog pass, merging the
    /// display ids of both.
    #[must_use]
    pub fn scan_with_catalog(
        &self,
        pool: &ResourcePool,
        resolver: &dyn DisplayResolver,
        catalog: &[ItemStack],
        partitioner: &ParallelPartitioner,
    ) -> ScanOutcome {
        let mut outcome = self.scan(pool, resolver);
        let mut from_catalog = self.scan_catalog(pool, resolver, catalog, partitioner);
        outcome.display_ids.append(&mut from_catalog);
        outcome
    }

    /// Recipes satisfied by the pool, in id order.
    #[must_use]
    pub fn satisfied_recipes(&self, pool: &ResourcePool) -> Vec<RecipeId> {
        let candidates = self.deduct(pool);
        candidates
            .into_iter()
            .filter(|(id, c)| (c.quick_satisfied() && !c.flagged) || self.can_satisfy_precisely(pool, *id))
            .map(|(id, _)| id)
            .collect()
    }

    /// Phases one and two: gather candidates and deduct optimistically.
    ///
    /// Each code deducts its full count from every group it feeds. A recipe
    /// in which one code feeds two groups is flagged, since that stock is
    /// counted twice here.
    fn deduct(&self, pool: &ResourcePool) -> BTreeMap<RecipeId, Candidate> {
        let mut candidates: BTreeMap<RecipeId, Candidate> = BTreeMap::new();
        for (code, entry) in pool.iter() {
            let groups = self.index.groups_for_code(code);
            if groups.is_empty() {
                continue;
            }
            let mut hits: BTreeMap<RecipeId, u32> = BTreeMap::new();
            for (id, key) in groups {
                if !class_fits(key, entry.class) {
                    continue;
                }
                let Some(candidate) = self.candidate(&mut candidates, *id) else {
                    continue;
                };
                *hits.entry(*id).or_insert(0) += 1;
                if let Some(need) = candidate.remaining.get_mut(key) {
                    *need -= (*need).min(entry.count);
                }
            }
            for (id, count) in hits {
                if count >= 2 {
                    if let Some(c) = candidates.get_mut(&id) {
                        c.flagged = true;
                    }
                }
            }
        }
        candidates
    }

    fn candidate<'c>(
        &self,
        candidates: &'c mut BTreeMap<RecipeId, Candidate>,
        id: RecipeId,
    ) -> Option<&'c mut Candidate> {
        if !candidates.contains_key(&id) {
            let needs = self.index.needs(id)?;
            candidates.insert(
                id,
                Candidate {
                    remaining: needs.clone(),
                    flagged: false,
                },
            );
        }
        candidates.get_mut(&id)
    }

    /// Checks one recipe against the pool in isolation.
    ///
    /// Groups draw from the pooled codes that feed them; a code feeding
    /// several groups is shared between them, never counted twice. The check
    /// is an exact allocation over the recipe's groups.
    #[must_use]
    pub fn can_satisfy_precisely(&self, pool: &ResourcePool, id: RecipeId) -> bool {
        let Some(needs) = self.index.needs(id) else {
            return false;
        };

        let mut codes: Vec<(&str, u32)> = Vec::new();
        let mut code_slot: BTreeMap<&str, usize> = BTreeMap::new();
        let mut groups: Vec<(u32, Vec<usize>)> = Vec::with_capacity(needs.len());

        for (key, &need) in needs {
            if need == 0 {
                continue;
            }
            let pooled: Vec<(&str, u32)> = if key.is_wildcard() {
                pool.iter()
                    .filter(|(code, entry)| class_fits(key, entry.class) && self.index.code_feeds_group(code, key))
                    .map(|(code, entry)| (code, entry.count))
                    .collect()
            } else {
                key.concrete_codes()
                    .filter_map(|code| {
                        let count = pool.count(code);
                        (count > 0).then_some((code, count))
                    })
                    .collect()
            };
            let supply: u64 = pooled.iter().map(|&(_, count)| u64::from(count)).sum();
            if supply < u64::from(need) {
                return false;
            }
            let eligible = pooled
                .into_iter()
                .map(|(code, count)| {
                    *code_slot.entry(code).or_insert_with(|| {
                        codes.push((code, count));
                        codes.len() - 1
                    })
                })
                .collect();
            groups.push((need, eligible));
        }

        let supply: Vec<u32> = codes.iter().map(|&(_, count)| count).collect();
        allocate(&groups, &supply)
    }

    /// Phase four: concrete outputs of a satisfied recipe.
    ///
    /// Recipes with a wildcard ingredient yield one output set per token the
    /// pool holds at least the per-unit need of. Templated outputs of recipes
    /// without a wildcard ingredient cannot be resolved and are skipped.
    #[must_use]
    pub fn expand_outputs(&self, pool: &ResourcePool, recipe: &Recipe) -> Vec<StackKey> {
        let Some(wild) = recipe.first_wildcard() else {
            return recipe
                .outputs
                .iter()
                .filter(|o| !is_templated(o.key()))
                .map(|o| o.key().clone())
                .collect();
        };
        let Some(matcher) = wild.matcher() else {
            return Vec::new();
        };
        let per_unit = self
            .index
            .needs(recipe.id)
            .and_then(|needs| needs.get(&wild.group_key()).copied())
            .unwrap_or_else(|| wild.required());

        pool.token_counts(matcher)
            .into_iter()
            .filter(|&(_, count)| count >= per_unit)
            .flat_map(|(token, _)| recipe.expand_outputs(&token))
            .collect()
    }

    /// Catalog pass: tests every catalog identity's producers against the
    /// pool and collects display ids of the satisfiable ones.
    #[must_use]
    pub fn scan_catalog(
        &self,
        pool: &ResourcePool,
        resolver: &dyn DisplayResolver,
        catalog: &[ItemStack],
        partitioner: &ParallelPartitioner,
    ) -> BTreeSet<String> {
        partitioner.run(
            catalog,
            |stack| self.index.candidate_weight(stack.key()),
            |stack, out| {
                for candidate in self.index.candidates_for(stack.key()) {
                    let Some(recipe) = self.index.recipe(candidate.recipe) else {
                        continue;
                    };
                    if self.recipe_satisfied_by_pool(pool, recipe, stack.key(), candidate.token.as_deref()) {
                        if let Some(id) = resolver.display_id(stack.key()) {
                            out.insert(id);
                        }
                        break;
                    }
                }
            },
        )
    }

    /// Checks whether the pool can craft `recipe` to produce `desired`,
    /// consuming ingredients in order from a private copy of the pool.
    ///
    /// Wildcard ingredients are pinned to `token` when the desired identity
    /// came from a templated output, otherwise narrowed to the allowed
    /// variant named in the desired code.
    #[must_use]
    pub fn recipe_satisfied_by_pool(
        &self,
        pool: &ResourcePool,
        recipe: &Recipe,
        desired: &StackKey,
        token: Option<&str>,
    ) -> bool {
        let mut scratch = pool.clone();
        recipe.ingredients.iter().all(|ingredient| {
            let qty = ingredient.required();
            match &ingredient.kind {
                IngredientKind::Concrete(options) => scratch.try_consume_any(options, qty, true),
                IngredientKind::Wildcard(matcher) => {
                    let matcher = match token {
                        Some(t) => {
                            if matcher.allowed().is_some_and(|list| !list.iter().any(|a| a == t)) {
                                return false;
                            }
                            matcher.restricted_to(t)
                        }
                        None => matcher.narrowed_to(desired.code()),
                    };
                    scratch.try_consume_wildcard(&matcher, qty, true)
                }
            }
        })
    }
}

/// Wildcard groups only draw on stock of their own class.
fn class_fits(key: &GroupKey, class: ItemClass) -> bool {
    key.wildcard_class().map_or(true, |wanted| wanted == class)
}

/// Exact feasibility of serving every group from shared code supplies.
///
/// `groups` holds each group's need and the supply slots it may draw from.
/// Solved as a max-flow from groups to supplies.
fn allocate(groups: &[(u32, Vec<usize>)], supply: &[u32]) -> bool {
    let total: u64 = groups.iter().map(|(need, _)| u64::from(*need)).sum();
    if total == 0 {
        return true;
    }

    // Nodes: source, groups, supplies, sink.
    let g = groups.len();
    let n = 2 + g + supply.len();
    let (source, sink) = (0, n - 1);
    let mut cap = vec![vec![0u64; n]; n];
    for (gi, (need, eligible)) in groups.iter().enumerate() {
        cap[source][1 + gi] = u64::from(*need);
        for &s in eligible {
            cap[1 + gi][1 + g + s] = u64::MAX / 4;
        }
    }
    for (s, &count) in supply.iter().enumerate() {
        cap[1 + g + s][sink] = u64::from(count);
    }

    let mut flow = 0u64;
    let mut parent = vec![usize::MAX; n];
    loop {
        parent.fill(usize::MAX);
        parent[source] = source;
        let mut queue = VecDeque::from([source]);
        while let Some(u) = queue.pop_front() {
            if u == sink {
                break;
            }
            for v in 0..n {
                if parent[v] == usize::MAX && cap[u][v] > 0 {
                    parent[v] = u;
                    queue.push_back(v);
                }
            }
        }
        if parent[sink] == usize::MAX {
            break;
        }

        let mut bottleneck = u64::MAX;
        let mut v = sink;
        while v != source {
            let u = parent[v];
            bottleneck = bottleneck.min(cap[u][v]);
            v = u;
        }
        let mut v = sink;
        while v != source {
            let u = parent[v];
            cap[u][v] -= bottleneck;
            cap[v][u] += bottleneck;
            v = u;
        }
        flow += bottleneck;
        if flow >= total {
            return true;
        }
    }
    flow >= total
}
