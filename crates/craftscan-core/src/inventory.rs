//! Slot containers and the storage host seam.
//!
//! The host implements [`SlotContainer`] for its inventories and
//! [`StorageHost`] for the world that owns them. [`Container`] and
//! [`StorageWorld`] are in-memory implementations.

use std::collections::BTreeMap;

use craftscan_common::{BlockPos, ContainerId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stack::ItemStack;

/// Inventory error types.
#[derive(Debug, Error)]
pub enum InventoryError {
    /// Slot index past the end of the container
    #[error("Slot {slot} out of range for container with {len} slots")]
    SlotOutOfRange {
        /// Requested slot
        slot: usize,
        /// Number of slots
        len: usize,
    },
    /// Container id unknown to the host
    #[error("Unknown container {0:?}")]
    UnknownContainer(ContainerId),
}

/// Result type for inventory operations.
pub type InventoryResult<T> = Result<T, InventoryError>;

/// A container of item slots.
pub trait SlotContainer {
    /// Identifier of the container.
    fn id(&self) -> ContainerId;

    /// Number of slots.
    fn slot_count(&self) -> usize;

    /// Stack in a slot, `None` when empty or out of range.
    fn stack(&self, slot: usize) -> Option<&ItemStack>;

    /// Removes up to `quantity` items from a slot.
    fn take(&mut self, slot: usize, quantity: u32) -> Option<ItemStack>;

    /// Puts a stack into a slot, returning what did not fit.
    fn give(&mut self, slot: usize, stack: ItemStack) -> Option<ItemStack>;

    /// Flags the container for persistence and client sync.
    fn mark_dirty(&mut self);

    /// Number of items of `stack`'s kind the container can still absorb.
    fn free_capacity_for(&self, stack: &ItemStack) -> u32 {
        (0..self.slot_count())
            .map(|slot| match self.stack(slot) {
                None => stack.max_stack(),
                Some(existing) if existing.can_merge_with(stack) => existing.headroom(),
                Some(_) => 0,
            })
            .sum()
    }

    /// Checks if every slot is empty.
    fn is_empty(&self) -> bool {
        (0..self.slot_count()).all(|slot| self.stack(slot).is_none())
    }

    /// Inserts a stack anywhere: compatible partial stacks first, then empty
    /// slots. Returns what did not fit.
    fn insert(&mut self, stack: ItemStack) -> Option<ItemStack> {
        let mut rest = Some(stack);
        for pass in 0..2 {
            for slot in 0..self.slot_count() {
                let Some(item) = rest.take() else {
                    return None;
                };
                let eligible = match self.stack(slot) {
                    Some(existing) => pass == 0 && existing.can_merge_with(&item),
                    None => pass == 1,
                };
                rest = if eligible { self.give(slot, item) } else { Some(item) };
            }
        }
        rest
    }
}

/// Role of a container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerKind {
    /// Requester hotbar
    Hotbar,
    /// Requester backpack
    Backpack,
    /// Requester crafting grid
    CraftingGrid,
    /// Placed storage such as a chest
    Chest,
    /// Items stacked on the ground; removed once emptied
    GroundStorage,
}

impl ContainerKind {
    /// Checks if the container disappears when emptied.
    #[must_use]
    pub const fn removed_when_empty(self) -> bool {
        matches!(self, Self::GroundStorage)
    }
}

/// In-memory slot container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Container {
    id: ContainerId,
    kind: ContainerKind,
    position: Option<BlockPos>,
    slots: Vec<Option<ItemStack>>,
    locked: bool,
    dirty: bool,
}

impl Container {
    /// Creates an empty container.
    #[must_use]
    pub fn new(id: ContainerId, kind: ContainerKind, slot_count: usize) -> Self {
        Self {
            id,
            kind,
            position: None,
            slots: vec![None; slot_count],
            locked: false,
            dirty: false,
        }
    }

    /// Places the container in the world.
    #[must_use]
    pub const fn at(mut self, position: BlockPos) -> Self {
        self.position = Some(position);
        self
    }

    /// Locks the container against access.
    #[must_use]
    pub const fn locked(mut self) -> Self {
        self.locked = true;
        self
    }

    /// Puts a stack into a slot, replacing its content.
    pub fn set(&mut self, slot: usize, stack: ItemStack) -> InventoryResult<()> {
        let len = self.slots.len();
        let target = self.slots.get_mut(slot).ok_or(InventoryError::SlotOutOfRange { slot, len })?;
        *target = (!stack.is_empty()).then_some(stack);
        Ok(())
    }

    /// Role of the container.
    #[must_use]
    pub const fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// World position, if placed.
    #[must_use]
    pub const fn position(&self) -> Option<BlockPos> {
        self.position
    }

    /// Checks the lock flag.
    #[must_use]
    pub const fn is_locked(&self) -> bool {
        self.locked
    }

    /// Checks the dirty flag.
    #[must_use]
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Total items of a code across all slots.
    #[must_use]
    pub fn count(&self, code: &str) -> u32 {
        self.slots.iter().flatten().filter(|s| s.code() == code).map(ItemStack::size).sum()
    }

    /// Number of empty slots.
    #[must_use]
    pub fn empty_slots(&self) -> usize {
        self.slots.iter().filter(|s| s.is_none()).count()
    }
}

impl SlotContainer for Container {
    fn id(&self) -> ContainerId {
        self.id
    }

    fn slot_count(&self) -> usize {
        self.slots.len()
    }

    fn stack(&self, slot: usize) -> Option<&ItemStack> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    fn take(&mut self, slot: usize, quantity: u32) -> Option<ItemStack> {
        let cell = self.slots.get_mut(slot)?;
        let stack = cell.as_mut()?;
        let taken = stack.size().min(quantity);
        if taken == 0 {
            return None;
        }
        let out = stack.with_size(taken);
        stack.set_size(stack.size() - taken);
        if stack.is_empty() {
            *cell = None;
        }
        Some(out)
    }

    fn give(&mut self, slot: usize, mut stack: ItemStack) -> Option<ItemStack> {
        let Some(cell) = self.slots.get_mut(slot) else {
            return Some(stack);
        };
        match cell {
            None => {
                let placed = stack.size().min(stack.max_stack());
                *cell = Some(stack.with_size(placed));
                stack.set_size(stack.size() - placed);
            }
            Some(existing) if existing.can_merge_with(&stack) => {
                let moved = existing.headroom().min(stack.size());
                existing.set_size(existing.size() + moved);
                stack.set_size(stack.size() - moved);
            }
            Some(_) => {}
        }
        (!stack.is_empty()).then_some(stack)
    }

    fn mark_dirty(&mut self) {
        self.dirty = true;
    }
}

/// World seen by the storage scanner and the fetch executor.
pub trait StorageHost {
    /// Containers whose position lies in the search box around `center`.
    fn containers_near(&self, center: BlockPos, radius: i32) -> Vec<ContainerId>;

    /// Read access to a container.
    fn container(&self, id: ContainerId) -> Option<&dyn SlotContainer>;

    /// Write access to a container.
    fn container_mut(&mut self, id: ContainerId) -> Option<&mut dyn SlotContainer>;

    /// Checks whether the requester may not open the container.
    fn is_locked(&self, id: ContainerId) -> bool;

    /// Spawns a stack into the world.
    fn drop_item(&mut self, stack: ItemStack, at: BlockPos);

    /// Clears a container that vanishes once empty. Returns true if removed.
    fn remove_if_empty(&mut self, id: ContainerId) -> bool;
}

/// In-memory world of containers.
#[derive(Debug, Clone, Default)]
pub struct StorageWorld {
    containers: BTreeMap<ContainerId, Container>,
    dropped: Vec<(ItemStack, BlockPos)>,
}

impl StorageWorld {
    /// Creates an empty world.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a container.
    pub fn insert(&mut self, container: Container) {
        self.containers.insert(container.id, container);
    }

    /// Concrete container by id.
    #[must_use]
    pub fn get(&self, id: ContainerId) -> Option<&Container> {
        self.containers.get(&id)
    }

    /// Stacks dropped into the world so far.
    #[must_use]
    pub fn dropped(&self) -> &[(ItemStack, BlockPos)] {
        &self.dropped
    }

    /// Total items of a code across the given containers.
    #[must_use]
    pub fn count_in(&self, ids: &[ContainerId], code: &str) -> u32 {
        ids.iter().filter_map(|id| self.containers.get(id)).map(|c| c.count(code)).sum()
    }
}

impl StorageHost for StorageWorld {
    fn containers_near(&self, center: BlockPos, radius: i32) -> Vec<ContainerId> {
        self.containers
            .values()
            .filter(|c| c.position.is_some_and(|p| center.within_search_box(p, radius)))
            .map(|c| c.id)
            .collect()
    }

    fn container(&self, id: ContainerId) -> Option<&dyn SlotContainer> {
        self.containers.get(&id).map(|c| c as &dyn SlotContainer)
    }

    fn container_mut(&mut self, id: ContainerId) -> Option<&mut dyn SlotContainer> {
        self.containers.get_mut(&id).map(|c| c as &mut dyn SlotContainer)
    }

    fn is_locked(&self, id: ContainerId) -> bool {
        self.containers.get(&id).is_some_and(Container::is_locked)
    }

    fn drop_item(&mut self, stack: ItemStack, at: BlockPos) {
        self.dropped.push((stack, at));
    }

    fn remove_if_empty(&mut self, id: ContainerId) -> bool {
        let removable = self
            .containers
            .get(&id)
            .is_some_and(|c| c.kind.removed_when_empty() && SlotContainer::is_empty(c));
        if removable {
            self.containers.remove(&id);
        }
        removable
    }
}
