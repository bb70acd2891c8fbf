//! Item stacks: an identity with a class, a size, and a stacking limit.

use craftscan_common::{ItemClass, StackKey};
use serde::{Deserialize, Serialize};

/// Default maximum stack size when the host does not report one.
pub const DEFAULT_MAX_STACK: u32 = 64;

/// A stack of identical items.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    key: StackKey,
    class: ItemClass,
    size: u32,
    max_stack: u32,
}

impl ItemStack {
    /// Creates a stack of a plain code.
    #[must_use]
    pub fn new(code: impl Into<String>, class: ItemClass, size: u32) -> Self {
        Self::from_key(StackKey::new(code), class, size)
    }

    /// Creates a stack from a full identity.
    #[must_use]
    pub const fn from_key(key: StackKey, class: ItemClass, size: u32) -> Self {
        Self {
            key,
            class,
            size,
            max_stack: DEFAULT_MAX_STACK,
        }
    }

    /// Sets the maximum stack size (at least 1).
    #[must_use]
    pub fn with_max_stack(mut self, max_stack: u32) -> Self {
        self.max_stack = max_stack.max(1);
        self
    }

    /// Identity of the stack.
    #[must_use]
    pub const fn key(&self) -> &StackKey {
        &self.key
    }

    /// Item code.
    #[must_use]
    pub fn code(&self) -> &str {
        self.key.code()
    }

    /// Item class.
    #[must_use]
    pub const fn class(&self) -> ItemClass {
        self.class
    }

    /// Number of items in the stack.
    #[must_use]
    pub const fn size(&self) -> u32 {
        self.size
    }

    /// Maximum number of items a single slot holds.
    #[must_use]
    pub const fn max_stack(&self) -> u32 {
        self.max_stack
    }

    /// Replaces the stack size.
    pub fn set_size(&mut self, size: u32) {
        self.size = size;
    }

    /// Returns a copy of this stack with another size.
    #[must_use]
    pub fn with_size(&self, size: u32) -> Self {
        let mut copy = self.clone();
        copy.size = size;
        copy
    }

    /// Checks if the stack holds nothing.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Checks if two stacks may share a slot.
    #[must_use]
    pub fn can_merge_with(&self, other: &Self) -> bool {
        self.class == other.class && self.key == other.key
    }

    /// Free room left in this slot for items of the same kind.
    #[must_use]
    pub const fn headroom(&self) -> u32 {
        self.max_stack.saturating_sub(self.size)
    }
}
