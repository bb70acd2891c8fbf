//! Resource pool: the multiset of reachable item codes.
//!
//! Entries are kept in code order so that every query visits candidates in
//! the same sequence regardless of how the pool was filled.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use craftscan_common::ItemClass;

use crate::stack::ItemStack;
use crate::wildcard::WildcardMatcher;

/// Count and class of one pooled code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEntry {
    /// Items available (always > 0)
    pub count: u32,
    /// Class of the stacks pooled under this code
    pub class: ItemClass,
}

const fn class_rank(class: ItemClass) -> u8 {
    match class {
        ItemClass::Item => 0,
        ItemClass::Tool => 1,
        ItemClass::Block => 2,
    }
}

/// Multiset of available item codes with their class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourcePool {
    entries: BTreeMap<String, PoolEntry>,
}

impl ResourcePool {
    /// Creates an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stack, counting at least one item for it.
    ///
    /// Stacks of one code pooled under several classes keep the highest
    /// ranked class (block, then tool, then item), whatever the order.
    pub fn add(&mut self, stack: &ItemStack) {
        self.add_count(stack.code(), stack.size().max(1), stack.class());
    }

    /// Adds `count` items of `code`. Zero counts are ignored.
    pub fn add_count(&mut self, code: &str, count: u32, class: ItemClass) {
        if count == 0 {
            return;
        }
        let entry = self.entries.entry(code.to_owned()).or_insert(PoolEntry { count: 0, class });
        entry.count = entry.count.saturating_add(count);
        if class_rank(class) > class_rank(entry.class) {
            entry.class = class;
        }
    }

    /// Sets the count of a code; zero or negative removes the entry.
    pub fn set_count(&mut self, code: &str, count: i64, class: ItemClass) {
        if count <= 0 {
            self.entries.remove(code);
        } else {
            let count = u32::try_from(count).unwrap_or(u32::MAX);
            self.entries.insert(code.to_owned(), PoolEntry { count, class });
        }
    }

    /// Removes up to `amount` items of `code`, dropping the entry at zero.
    /// Returns the number actually removed.
    pub fn deduct(&mut self, code: &str, amount: u32) -> u32 {
        let Some(entry) = self.entries.get_mut(code) else {
            return 0;
        };
        let taken = entry.count.min(amount);
        entry.count -= taken;
        if entry.count == 0 {
            self.entries.remove(code);
        }
        taken
    }

    /// Count for a code, zero when absent.
    #[must_use]
    pub fn count(&self, code: &str) -> u32 {
        self.entries.get(code).map_or(0, |e| e.count)
    }

    /// Class recorded for a code.
    #[must_use]
    pub fn class_of(&self, code: &str) -> Option<ItemClass> {
        self.entries.get(code).map(|e| e.class)
    }

    /// Checks if the code is present.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.entries.contains_key(code)
    }

    /// Number of distinct codes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Checks if the pool is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates entries in code order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PoolEntry)> + '_ {
        self.entries.iter().map(|(code, entry)| (code.as_str(), entry))
    }

    /// Canonical `code:count:class|` string, usable as a memoization key.
    #[must_use]
    pub fn signature(&self) -> String {
        let mut out = String::with_capacity(self.entries.len() * 24);
        for (code, entry) in &self.entries {
            let _ = write!(out, "{code}:{}:{}|", entry.count, entry.class.as_i32());
        }
        out
    }

    /// True iff some option code holds at least `qty` items. With `consume`
    /// the first such code (in code order of `options`) is deducted.
    pub fn try_consume_any(&mut self, options: &[String], qty: u32, consume: bool) -> bool {
        let qty = qty.max(1);
        let Some(code) = options.iter().find(|code| self.count(code) >= qty) else {
            return false;
        };
        if consume {
            let code = code.clone();
            self.deduct(&code, qty);
        }
        true
    }

    /// True iff any option code is present at all.
    #[must_use]
    pub fn has_any(&self, options: &[String]) -> bool {
        options.iter().any(|code| self.contains(code))
    }

    /// True iff an entry matching class, pattern and allow-list holds at least
    /// `qty` items. With `consume` the first such entry is deducted.
    pub fn try_consume_wildcard(&mut self, matcher: &WildcardMatcher, qty: u32, consume: bool) -> bool {
        let qty = qty.max(1);
        let hit = self
            .entries
            .iter()
            .find(|(code, entry)| entry.count >= qty && matcher.matches(code, entry.class))
            .map(|(code, _)| code.clone());
        match hit {
            Some(code) => {
                if consume {
                    self.deduct(&code, qty);
                }
                true
            }
            None => false,
        }
    }

    /// Total per token over entries matching the pattern, allow-list and class.
    #[must_use]
    pub fn token_counts(&self, matcher: &WildcardMatcher) -> BTreeMap<String, u32> {
        let mut counts = BTreeMap::new();
        for (code, entry) in &self.entries {
            if entry.class != matcher.class() {
                continue;
            }
            if let Some(token) = matcher.token(code) {
                if token.is_empty() {
                    continue;
                }
                let slot = counts.entry(token.to_owned()).or_insert(0u32);
                *slot = slot.saturating_add(entry.count);
            }
        }
        counts
    }

    /// Checks if every count in `self` is covered by `other`.
    #[must_use]
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.entries.iter().all(|(code, entry)| other.count(code) >= entry.count)
    }
}

impl<'a> FromIterator<&'a ItemStack> for ResourcePool {
    fn from_iter<I: IntoIterator<Item = &'a ItemStack>>(iter: I) -> Self {
        let mut pool = Self::new();
        for stack in iter {
            pool.add(stack);
        }
        pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wildcard::WildcardPattern;

    fn opts(codes: &[&str]) -> Vec<String> {
        codes.iter().map(|c| (*c).to_owned()).collect()
    }

    #[test]
    fn test_add_clamps_and_sums() {
        let mut pool = ResourcePool::new();
        pool.add(&ItemStack::new("game:stick", ItemClass::Item, 0));
        pool.add(&ItemStack::new("game:stick", ItemClass::Item, 4));
        assert_eq!(pool.count("game:stick"), 5);
    }

    #[test]
    fn test_block_class_wins() {
        let mut pool = ResourcePool::new();
        pool.add(&ItemStack::new("game:log-oak", ItemClass::Item, 1));
        pool.add(&ItemStack::new("game:log-oak", ItemClass::Block, 1));
        assert_eq!(pool.class_of("game:log-oak"), Some(ItemClass::Block));
    }

    #[test]
    fn test_mixed_class_merge_ignores_order() {
        let mut a = ResourcePool::new();
        a.add_count("game:axe", 1, ItemClass::Tool);
        a.add_count("game:axe", 1, ItemClass::Item);
        let mut b = ResourcePool::new();
        b.add_count("game:axe", 1, ItemClass::Item);
        b.add_count("game:axe", 1, ItemClass::Tool);
        assert_eq!(a, b);
        assert_eq!(a.signature(), "game:axe:2:2|");

        a.add_count("game:axe", 1, ItemClass::Block);
        b.add_count("game:axe", 1, ItemClass::Tool);
        assert_eq!(a.class_of("game:axe"), Some(ItemClass::Block));
        assert_eq!(b.class_of("game:axe"), Some(ItemClass::Tool));
    }

    #[test]
    fn test_set_count_non_positive_removes() {
        let mut pool = ResourcePool::new();
        pool.set_count("game:stick", 3, ItemClass::Item);
        pool.set_count("game:stick", 0, ItemClass::Item);
        assert!(pool.is_empty());
        pool.set_count("game:stick", -2, ItemClass::Item);
        assert!(pool.is_empty());
    }

    #[test]
    fn test_signature_is_sorted() {
        let mut a = ResourcePool::new();
        a.add(&ItemStack::new("game:b", ItemClass::Item, 2));
        a.add(&ItemStack::new("game:a", ItemClass::Block, 1));
        assert_eq!(a.signature(), "game:a:1:0|game:b:2:1|");
    }

    #[test]
    fn test_consume_any_only_when_asked() {
        let mut pool = ResourcePool::new();
        pool.add(&ItemStack::new("game:flint", ItemClass::Item, 2));
        let options = opts(&["game:stone", "game:flint"]);

        assert!(pool.try_consume_any(&options, 2, false));
        assert_eq!(pool.count("game:flint"), 2);
        assert!(pool.try_consume_any(&options, 2, true));
        assert!(!pool.contains("game:flint"));
        assert!(!pool.try_consume_any(&options, 1, false));
        assert!(!pool.has_any(&options));
    }

    #[test]
    fn test_consume_any_needs_single_code() {
        let mut pool = ResourcePool::new();
        pool.add(&ItemStack::new("game:a", ItemClass::Item, 1));
        pool.add(&ItemStack::new("game:b", ItemClass::Item, 1));
        assert!(!pool.try_consume_any(&opts(&["game:a", "game:b"]), 2, false));
    }

    #[test]
    fn test_consume_wildcard() {
        let matcher = WildcardMatcher::new(
            WildcardPattern::parse("game:planks-*").expect("valid"),
            Some(vec!["oak".to_owned()]),
            ItemClass::Block,
        );
        let mut pool = ResourcePool::new();
        pool.add(&ItemStack::new("game:planks-pine", ItemClass::Block, 8));
        assert!(!pool.try_consume_wildcard(&matcher, 4, true));

        pool.add(&ItemStack::new("game:planks-oak", ItemClass::Block, 4));
        assert!(pool.try_consume_wildcard(&matcher, 4, true));
        assert_eq!(pool.count("game:planks-oak"), 0);
        assert_eq!(pool.count("game:planks-pine"), 8);
    }

    #[test]
    fn test_token_counts_respect_class() {
        let matcher = WildcardMatcher::new(
            WildcardPattern::parse("game:planks-*").expect("valid"),
            None,
            ItemClass::Block,
        );
        let mut pool = ResourcePool::new();
        pool.add(&ItemStack::new("game:planks-oak", ItemClass::Block, 3));
        pool.add(&ItemStack::new("game:planks-ash", ItemClass::Item, 9));
        let counts = pool.token_counts(&matcher);
        assert_eq!(counts.get("oak"), Some(&3));
        assert!(!counts.contains_key("ash"));
    }
}
