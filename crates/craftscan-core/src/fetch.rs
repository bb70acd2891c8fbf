//! Withdrawal of recipe ingredients from nearby storage into the requester.
//!
//! A fetch picks the first ingredient set the reachable stock satisfies,
//! previews the stacks it would move, rejects the fetch without touching
//! anything when the requester cannot hold them, and otherwise moves stacks
//! slot by slot. A shortfall discovered while moving is reported but not
//! rolled back.

use std::collections::BTreeMap;

use craftscan_common::{BlockPos, ContainerId, ItemClass, StackKey};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::inventory::StorageHost;
use crate::protocol::{IngredientFilter, IngredientSet};
use crate::stack::ItemStack;
use crate::storage::StorageSnapshot;

/// Plain `code -> count` tally used for virtual deduction.
pub type CountMap = BTreeMap<String, u32>;

/// Fetch error types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Requester inventory cannot absorb the previewed stacks
    #[error("Not enough inventory space to fetch the ingredients! ({required_slots} slots needed, {free_slots} free)")]
    InsufficientCapacity {
        /// Empty slots the fetch needs
        required_slots: usize,
        /// Empty slots available
        free_slots: usize,
    },
    /// No ingredient set is satisfiable from reachable stock
    #[error("Could not find required ingredients to fetch.")]
    IngredientsUnavailable,
    /// Fetching is switched off
    #[error("Fetching is disabled")]
    Disabled,
}

/// Result type for fetch operations.
pub type FetchResult<T> = Result<T, FetchError>;

/// Handle to one storage slot seen during collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRef {
    /// Owning container
    pub container: ContainerId,
    /// Slot index in the container
    pub slot: usize,
    /// Identity of the stack at collection time
    pub key: StackKey,
    /// Class of the stack at collection time
    pub class: ItemClass,
}

impl SlotRef {
    /// Item code of the referenced stack.
    #[must_use]
    pub fn code(&self) -> &str {
        self.key.code()
    }
}

/// The party receiving fetched ingredients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requester {
    /// Where leftovers are dropped
    pub position: BlockPos,
    /// Containers counted as the requester's own stock
    pub owned: Vec<ContainerId>,
    /// Containers fetched stacks are put into, in preference order
    pub receivers: Vec<ContainerId>,
}

impl Requester {
    /// Creates a requester without containers.
    #[must_use]
    pub const fn new(position: BlockPos) -> Self {
        Self {
            position,
            owned: Vec::new(),
            receivers: Vec::new(),
        }
    }

    /// Adds an owned container that also receives fetched stacks.
    #[must_use]
    pub fn with_receiver(mut self, id: ContainerId) -> Self {
        self.owned.push(id);
        self.receivers.push(id);
        self
    }

    /// Adds an owned container that only counts as stock.
    #[must_use]
    pub fn with_owned(mut self, id: ContainerId) -> Self {
        self.owned.push(id);
        self
    }
}

/// Outcome of an executed fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Index of the ingredient set that was fetched
    pub variant: usize,
    /// Stacks moved into the requester
    pub moved: Vec<ItemStack>,
    /// Stacks that fit nowhere and were dropped at the requester
    pub dropped: Vec<ItemStack>,
    /// Whether every ingredient was fully gathered
    pub complete: bool,
}

impl FetchReport {
    /// Total number of items moved.
    #[must_use]
    pub fn moved_count(&self) -> u32 {
        self.moved.iter().map(ItemStack::size).sum()
    }

    /// Player-facing summary line.
    #[must_use]
    pub const fn message(&self) -> Option<&'static str> {
        if self.complete {
            None
        } else {
            Some("Could not get all ingredients, your inventory is full!")
        }
    }
}

/// Removes up to `need` units matching `filter` from `counts`.
///
/// Concrete codes are visited in request order, wildcard matches in code
/// order. Returns the units still missing.
pub fn deduct_from(counts: &mut CountMap, filter: &IngredientFilter<'_>, need: u32) -> u32 {
    let mut need = need;
    let visit: Vec<String> = if filter.is_concrete() {
        filter.codes().to_vec()
    } else {
        counts.keys().filter(|code| filter.accepts_code(code)).cloned().collect()
    };
    for code in visit {
        if need == 0 {
            break;
        }
        let Some(have) = counts.get_mut(&code) else {
            continue;
        };
        let taken = (*have).min(need);
        *have -= taken;
        need -= taken;
        if *have == 0 {
            counts.remove(&code);
        }
    }
    need
}

/// Checks whether `counts` covers every ingredient of `set`.
///
/// Unlike recipe scanning, an ingredient may be assembled from several
/// accepted codes.
#[must_use]
pub fn can_satisfy(counts: &CountMap, set: &IngredientSet) -> bool {
    let mut left = counts.clone();
    set.ingredients.iter().all(|ing| {
        let filter = ing.filter();
        filter.quantity() == 0 || (filter.is_usable() && deduct_from(&mut left, &filter, filter.quantity()) == 0)
    })
}

/// Moves ingredients from storage slots into a requester.
pub struct FetchExecutor<'a, H: StorageHost + ?Sized> {
    host: &'a mut H,
    requester: &'a Requester,
}

impl<'a, H: StorageHost + ?Sized> FetchExecutor<'a, H> {
    /// Creates an executor acting on `host` for `requester`.
    pub fn new(host: &'a mut H, requester: &'a Requester) -> Self {
        Self { host, requester }
    }

    /// Fetches the first satisfiable ingredient set.
    ///
    /// A set the requester already holds entirely is fetched fresh from
    /// storage; otherwise the requester's own stock counts first and only
    /// the remainder is withdrawn.
    pub fn fetch(&mut self, snapshot: &StorageSnapshot, variants: &[IngredientSet]) -> FetchResult<FetchReport> {
        let storage_only = snapshot.storage_counts();
        let combined = snapshot.total_counts();
        for (index, set) in variants.iter().enumerate() {
            let (pool, requester_counts) = if can_satisfy(&snapshot.requester_counts, set) {
                (&storage_only, None)
            } else {
                (&combined, Some(&snapshot.requester_counts))
            };
            if !can_satisfy(pool, set) {
                debug!("Ingredient set {index} not satisfiable from reachable stock");
                continue;
            }
            let preview = self.preview(&snapshot.slots, set, requester_counts);
            self.check_capacity(&preview)?;
            let mut report = self.execute(&snapshot.slots, set, requester_counts);
            report.variant = index;
            info!(
                "Fetched ingredient set {index}: {} items moved, {} stacks dropped, complete: {}",
                report.moved_count(),
                report.dropped.len(),
                report.complete
            );
            return Ok(report);
        }
        Err(FetchError::IngredientsUnavailable)
    }

    /// Stacks that executing `set` would withdraw, without mutating anything.
    ///
    /// Slot stock drawn by one ingredient is not offered to the next.
    #[must_use]
    pub fn preview(&self, slots: &[SlotRef], set: &IngredientSet, requester_counts: Option<&CountMap>) -> Vec<ItemStack> {
        let mut virtual_counts = requester_counts.cloned().unwrap_or_default();
        let mut drawn = vec![0u32; slots.len()];
        let mut out = Vec::new();
        for ing in &set.ingredients {
            let filter = ing.filter();
            let mut need = deduct_from(&mut virtual_counts, &filter, filter.quantity());
            for (slot, used) in slots.iter().zip(drawn.iter_mut()) {
                if need == 0 {
                    break;
                }
                let Some(stack) = self.current_stack(slot, &filter) else {
                    continue;
                };
                let n = need.min(stack.size().saturating_sub(*used));
                if n == 0 {
                    continue;
                }
                *used += n;
                out.push(stack.with_size(n));
                need -= n;
            }
        }
        out
    }

    /// Checks that the requester can absorb `items`, merging into partial
    /// compatible stacks before counting empty slots.
    pub fn check_capacity(&self, items: &[ItemStack]) -> FetchResult<()> {
        let mut pending: Vec<ItemStack> = Vec::new();
        for item in items {
            match pending.iter_mut().find(|p| p.can_merge_with(item)) {
                Some(p) => p.set_size(p.size() + item.size()),
                None => pending.push(item.clone()),
            }
        }
        if pending.is_empty() {
            return Ok(());
        }

        let mut free_slots = 0usize;
        for &id in &self.requester.receivers {
            let Some(container) = self.host.container(id) else {
                continue;
            };
            for slot in 0..container.slot_count() {
                match container.stack(slot) {
                    None => free_slots += 1,
                    Some(existing) => {
                        if let Some(p) = pending.iter_mut().find(|p| p.can_merge_with(existing)) {
                            let merged = existing.headroom().min(p.size());
                            p.set_size(p.size() - merged);
                        }
                    }
                }
            }
        }

        let required_slots: usize = pending
            .iter()
            .map(|p| p.size().div_ceil(p.max_stack()) as usize)
            .sum();
        if required_slots <= free_slots {
            Ok(())
        } else {
            Err(FetchError::InsufficientCapacity {
                required_slots,
                free_slots,
            })
        }
    }

    /// Moves the stacks of `set` into the requester.
    ///
    /// Each withdrawal is take-then-give: what the requester cannot hold goes
    /// back to its source slot, and what does not fit there either is dropped
    /// at the requester's position.
    pub fn execute(&mut self, slots: &[SlotRef], set: &IngredientSet, requester_counts: Option<&CountMap>) -> FetchReport {
        let mut virtual_counts = requester_counts.cloned().unwrap_or_default();
        let mut report = FetchReport {
            complete: true,
            ..FetchReport::default()
        };

        for ing in &set.ingredients {
            let filter = ing.filter();
            let mut need = deduct_from(&mut virtual_counts, &filter, filter.quantity());
            for slot in slots {
                if need == 0 {
                    break;
                }
                if self.current_stack(slot, &filter).is_none() {
                    continue;
                }
                need -= self.withdraw(slot, need, &mut report);
            }
            if need > 0 {
                warn!("Fetch short by {need} for ingredient {:?}", ing.codes.first().or(ing.pattern.as_ref()));
                report.complete = false;
            }
        }
        report
    }

    /// Moves up to `need` items out of one slot. Returns the number the
    /// requester received.
    fn withdraw(&mut self, slot: &SlotRef, need: u32, report: &mut FetchReport) -> u32 {
        let Some(source) = self.host.container_mut(slot.container) else {
            return 0;
        };
        let Some(taken) = source.take(slot.slot, need) else {
            return 0;
        };
        let taken_size = taken.size();

        let mut rest = Some(taken);
        for &id in &self.requester.receivers {
            let Some(stack) = rest.take() else {
                break;
            };
            match self.host.container_mut(id) {
                Some(receiver) => {
                    rest = receiver.insert(stack);
                    receiver.mark_dirty();
                }
                None => rest = Some(stack),
            }
        }
        let leftover = rest.as_ref().map_or(0, ItemStack::size);
        let received = taken_size - leftover;

        if let Some(stack) = rest {
            let back = match self.host.container_mut(slot.container) {
                Some(source) => source.give(slot.slot, stack),
                None => Some(stack),
            };
            if let Some(stray) = back {
                debug!("Dropping {} x{} at {}", stray.key(), stray.size(), self.requester.position);
                self.host.drop_item(stray.clone(), self.requester.position);
                report.dropped.push(stray);
            }
        }

        if let Some(source) = self.host.container_mut(slot.container) {
            source.mark_dirty();
        }
        if self.host.remove_if_empty(slot.container) {
            debug!("Removed emptied container {:?}", slot.container);
        }

        if received > 0 {
            report.moved.push(ItemStack::from_key(slot.key.clone(), slot.class, received));
        }
        received
    }

    /// The slot's live stack if it still holds what was collected and the
    /// ingredient accepts it.
    fn current_stack(&self, slot: &SlotRef, filter: &IngredientFilter<'_>) -> Option<ItemStack> {
        let stack = self.host.container(slot.container)?.stack(slot.slot)?;
        (stack.key() == &slot.key && filter.accepts(stack.code(), stack.class())).then(|| stack.clone())
    }
}
