//! Mapping from item identities to presentation identifiers.

use ahash::AHashMap;
use craftscan_common::StackKey;

use crate::stack::ItemStack;

/// Maps a concrete identity to an opaque display identifier.
pub trait DisplayResolver: Send + Sync {
    /// Display id for `key`, or `None` when nothing presents it.
    fn display_id(&self, key: &StackKey) -> Option<String>;
}

/// Default page code: class name followed by the identity.
#[must_use]
pub fn default_page_code(stack: &ItemStack) -> String {
    format!("{}-{}", stack.class(), stack.key())
}

/// Display ids precomputed for a catalog.
///
/// Every entry is registered under its full identity and, unless already
/// taken, under its code alone so attribute-less lookups still land.
#[derive(Debug, Clone, Default)]
pub struct PageCodeMap {
    codes: AHashMap<StackKey, String>,
}

impl PageCodeMap {
    /// Builds the map with [`default_page_code`].
    #[must_use]
    pub fn from_catalog(stacks: &[ItemStack]) -> Self {
        Self::from_catalog_with(stacks, default_page_code)
    }

    /// Builds the map with a custom page code function.
    #[must_use]
    pub fn from_catalog_with(stacks: &[ItemStack], page_code: impl Fn(&ItemStack) -> String) -> Self {
        let mut codes = AHashMap::with_capacity(stacks.len() * 2);
        for stack in stacks {
            let code = page_code(stack);
            codes.entry(stack.key().code_only()).or_insert_with(|| code.clone());
            codes.insert(stack.key().clone(), code);
        }
        Self { codes }
    }

    /// Number of registered keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.codes.len()
    }

    /// Checks if the map is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.codes.is_empty()
    }
}

impl DisplayResolver for PageCodeMap {
    fn display_id(&self, key: &StackKey) -> Option<String> {
        self.codes
            .get(key)
            .or_else(|| self.codes.get(&key.code_only()))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craftscan_common::ItemClass;

    #[test]
    fn test_exact_then_code_fallback() {
        let stacks = vec![
            ItemStack::from_key(StackKey::with_attributes("game:plank", Some("oak"), None), ItemClass::Block, 1),
            ItemStack::new("game:rope", ItemClass::Item, 1),
        ];
        let map = PageCodeMap::from_catalog(&stacks);
        assert_eq!(
            map.display_id(&StackKey::with_attributes("game:plank", Some("oak"), None)),
            Some("block-game:plank[oak/]".to_owned())
        );
        assert_eq!(
            map.display_id(&StackKey::with_attributes("game:plank", Some("ash"), None)),
            Some("block-game:plank[oak/]".to_owned())
        );
        assert_eq!(map.display_id(&StackKey::new("game:rope")), Some("item-game:rope".to_owned()));
        assert_eq!(map.display_id(&StackKey::new("game:nothing")), None);
    }
}
