//! Host-side storage collection and request handling.

use std::collections::BTreeSet;

use craftscan_common::ContainerId;
use tracing::{debug, info};

use crate::fetch::{CountMap, FetchError, FetchExecutor, FetchReport, FetchResult, Requester, SlotRef};
use crate::inventory::StorageHost;
use crate::pool::ResourcePool;
use crate::protocol::{ScanReply, ScanRequest};

/// Everything reachable by a requester at one point in time.
#[derive(Debug, Clone, Default)]
pub struct StorageSnapshot {
    /// Requester stock plus nearby storage
    pub totals: ResourcePool,
    /// Requester stock alone
    pub requester_counts: CountMap,
    /// Nearby storage slots, in collection order
    pub slots: Vec<SlotRef>,
}

impl StorageSnapshot {
    /// Totals as a plain tally.
    #[must_use]
    pub fn total_counts(&self) -> CountMap {
        self.totals.iter().map(|(code, e)| (code.to_owned(), e.count)).collect()
    }

    /// Totals minus the requester's own stock.
    #[must_use]
    pub fn storage_counts(&self) -> CountMap {
        let mut counts = self.total_counts();
        for (code, &own) in &self.requester_counts {
            if let Some(count) = counts.get_mut(code) {
                *count = count.saturating_sub(own);
                if *count == 0 {
                    counts.remove(code);
                }
            }
        }
        counts
    }
}

/// Answer to a [`ScanRequest`].
#[derive(Debug, Clone)]
pub struct ScanResponse {
    /// Reply to send back
    pub reply: ScanReply,
    /// Fetch outcome when the request asked for one
    pub fetch: Option<FetchResult<FetchReport>>,
}

impl ScanResponse {
    /// Player-facing message for the fetch outcome, if any.
    #[must_use]
    pub fn message(&self) -> Option<String> {
        match &self.fetch {
            Some(Ok(report)) => report.message().map(str::to_owned),
            Some(Err(e)) => Some(e.to_string()),
            None => None,
        }
    }
}

/// Collects the stock around a requester.
#[derive(Debug, Clone, Copy)]
pub struct StorageScanner {
    radius: i32,
}

impl StorageScanner {
    /// Creates a scanner; negative radii search only the requester's column.
    #[must_use]
    pub fn new(radius: i32) -> Self {
        Self { radius: radius.max(0) }
    }

    /// Search radius in effect.
    #[must_use]
    pub const fn radius(&self) -> i32 {
        self.radius
    }

    /// Collects requester containers and unlocked storage in range.
    ///
    /// Each `(container, slot)` is counted once and every stack counts at
    /// least one item.
    pub fn collect<H: StorageHost + ?Sized>(&self, host: &H, requester: &Requester) -> StorageSnapshot {
        let mut snapshot = StorageSnapshot::default();
        let mut seen: BTreeSet<(ContainerId, usize)> = BTreeSet::new();

        for &id in &requester.owned {
            let Some(container) = host.container(id) else {
                continue;
            };
            for slot in 0..container.slot_count() {
                if !seen.insert((id, slot)) {
                    continue;
                }
                if let Some(stack) = container.stack(slot) {
                    snapshot.totals.add(stack);
                    *snapshot.requester_counts.entry(stack.code().to_owned()).or_insert(0) += stack.size().max(1);
                }
            }
        }

        let mut skipped_locked = 0usize;
        for id in host.containers_near(requester.position, self.radius) {
            if requester.owned.contains(&id) {
                continue;
            }
            if host.is_locked(id) {
                skipped_locked += 1;
                continue;
            }
            let Some(container) = host.container(id) else {
                continue;
            };
            for slot in 0..container.slot_count() {
                if !seen.insert((id, slot)) {
                    continue;
                }
                if let Some(stack) = container.stack(slot) {
                    snapshot.totals.add(stack);
                    snapshot.slots.push(SlotRef {
                        container: id,
                        slot,
                        key: stack.key().clone(),
                        class: stack.class(),
                    });
                }
            }
        }

        debug!(
            "Collected {} codes from {} storage slots around {} (radius {}, {skipped_locked} locked)",
            snapshot.totals.len(),
            snapshot.slots.len(),
            requester.position,
            self.radius
        );
        snapshot
    }

    /// Serves a request: collects, fetches when asked, and replies with the
    /// stock reachable afterwards.
    pub fn handle_request<H: StorageHost + ?Sized>(
        host: &mut H,
        requester: &Requester,
        request: &ScanRequest,
        fetch_enabled: bool,
    ) -> ScanResponse {
        let scanner = Self::new(request.radius);
        let mut snapshot = scanner.collect(host, requester);
        let wants_fetch = request.wants_fetch();

        let fetch = wants_fetch.then(|| {
            if !fetch_enabled {
                return Err(FetchError::Disabled);
            }
            let result = FetchExecutor::new(host, requester).fetch(&snapshot, &request.ingredient_variants);
            if result.is_ok() {
                snapshot = scanner.collect(host, requester);
            }
            result
        });

        if let Some(Err(e)) = &fetch {
            info!("Fetch for scan {} declined: {e}", request.scan_id);
        }

        ScanResponse {
            reply: ScanReply::from_pool(&snapshot.totals, request.scan_id, request.context_key.clone(), wants_fetch),
            fetch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::{Container, ContainerKind, StorageWorld};
    use crate::protocol::{IngredientSet, WireIngredient};
    use crate::stack::ItemStack;
    use craftscan_common::{BlockPos, ContextKey, ItemClass, ScanId};

    fn world() -> (StorageWorld, Requester) {
        let origin = BlockPos::new(0, 64, 0);
        let mut world = StorageWorld::new();

        let mut hotbar = Container::new(ContainerId::new(1), ContainerKind::Hotbar, 2);
        hotbar.set(0, ItemStack::new("game:stick", ItemClass::Item, 2)).expect("slot");
        world.insert(hotbar);

        let mut chest = Container::new(ContainerId::new(10), ContainerKind::Chest, 3).at(origin.offset(3, 0, 0));
        chest.set(0, ItemStack::new("game:stick", ItemClass::Item, 5)).expect("slot");
        chest.set(1, ItemStack::new("game:planks-oak", ItemClass::Block, 8)).expect("slot");
        world.insert(chest);

        let mut locked = Container::new(ContainerId::new(11), ContainerKind::Chest, 1).at(origin.offset(1, 0, 0)).locked();
        locked.set(0, ItemStack::new("game:gold", ItemClass::Item, 1)).expect("slot");
        world.insert(locked);

        let mut far = Container::new(ContainerId::new(12), ContainerKind::Chest, 1).at(origin.offset(0, 5, 0));
        far.set(0, ItemStack::new("game:flint", ItemClass::Item, 1)).expect("slot");
        world.insert(far);

        (world, Requester::new(origin).with_receiver(ContainerId::new(1)))
    }

    #[test]
    fn test_collect_respects_box_and_locks() {
        let (world, requester) = world();
        let snapshot = StorageScanner::new(4).collect(&world, &requester);
        assert_eq!(snapshot.totals.count("game:stick"), 7);
        assert_eq!(snapshot.totals.count("game:planks-oak"), 8);
        assert!(!snapshot.totals.contains("game:gold"));
        assert!(!snapshot.totals.contains("game:flint"));
        assert_eq!(snapshot.requester_counts.get("game:stick"), Some(&2));
        assert_eq!(snapshot.slots.len(), 2);
        assert_eq!(snapshot.storage_counts().get("game:stick"), Some(&5));
    }

    #[test]
    fn test_plain_scan_reply() {
        let (mut world, requester) = world();
        let request = ScanRequest::scan(4, ScanId::from_raw(9), ContextKey::new("craftableTab"));
        let response = StorageScanner::handle_request(&mut world, &requester, &request, true);
        assert!(response.fetch.is_none());
        assert!(!response.reply.is_fetch);
        assert_eq!(response.reply.scan_id, ScanId::from_raw(9));
        assert_eq!(response.reply.to_pool().expect("pool").count("game:stick"), 7);
    }

    #[test]
    fn test_fetch_request_moves_and_replies() {
        let (mut world, requester) = world();
        let set = IngredientSet {
            ingredients: vec![WireIngredient::concrete(["game:planks-oak"], 4)],
        };
        let request = ScanRequest::fetch(4, vec![set], ScanId::from_raw(2), ContextKey::new("craftableTab"));
        let response = StorageScanner::handle_request(&mut world, &requester, &request, true);
        assert!(response.reply.is_fetch);
        assert!(response.message().is_none());
        assert_eq!(world.count_in(&[ContainerId::new(1)], "game:planks-oak"), 4);
        assert_eq!(response.reply.to_pool().expect("pool").count("game:planks-oak"), 8);
    }

    #[test]
    fn test_fetch_disabled() {
        let (mut world, requester) = world();
        let set = IngredientSet {
            ingredients: vec![WireIngredient::concrete(["game:stick"], 1)],
        };
        let request = ScanRequest::fetch(4, vec![set], ScanId::from_raw(2), ContextKey::new("craftableTab"));
        let response = StorageScanner::handle_request(&mut world, &requester, &request, false);
        assert!(matches!(response.fetch, Some(Err(FetchError::Disabled))));
        assert_eq!(world.count_in(&[ContainerId::new(10)], "game:stick"), 5);
    }
}
