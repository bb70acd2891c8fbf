//! On-disk cache of built recipe indexes, one file per variant.
//!
//! Layout: a little-endian `u32` header length, the bincode header carrying
//! magic bytes, schema version and variant, then the bincode body. Outputs are
//! re-resolved against the live provider on load so a stale cache never
//! references items the catalog no longer has.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use ahash::AHashMap;
use craftscan_common::{MagicBytes, RecipeId, SchemaVersion};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::index::RecipeIndex;
use crate::provider::RecipeProvider;
use crate::recipe::{is_templated, GroupKey, Recipe};
use crate::variant::CatalogVariant;

/// Index cache error types.
#[derive(Debug, Error)]
pub enum IndexCacheError {
    /// File could not be read or written
    #[error("Index cache IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Encoding or decoding failed
    #[error("Index cache serialization failed: {0}")]
    Serialization(String),
    /// Not an index cache file
    #[error("Invalid index cache format")]
    InvalidFormat,
    /// Written by an incompatible schema
    #[error("Version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version
        actual: String,
    },
    /// File belongs to another variant
    #[error("Cache holds the {actual} index, expected {expected}")]
    VariantMismatch {
        /// Variant asked for
        expected: CatalogVariant,
        /// Variant stored
        actual: CatalogVariant,
    },
}

/// Result type for index cache operations.
pub type IndexCacheResult<T> = Result<T, IndexCacheError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct IndexHeader {
    magic: [u8; 4],
    schema: SchemaVersion,
    variant: CatalogVariant,
}

impl IndexHeader {
    const fn new(variant: CatalogVariant) -> Self {
        Self {
            magic: MagicBytes::RECIPE_INDEX.0,
            schema: SchemaVersion::RECIPE_INDEX,
            variant,
        }
    }

    fn validate(&self, variant: CatalogVariant) -> IndexCacheResult<()> {
        if self.magic != MagicBytes::RECIPE_INDEX.0 {
            return Err(IndexCacheError::InvalidFormat);
        }
        if !SchemaVersion::RECIPE_INDEX.can_read(&self.schema) {
            return Err(IndexCacheError::VersionMismatch {
                expected: SchemaVersion::RECIPE_INDEX.to_string(),
                actual: self.schema.to_string(),
            });
        }
        if self.variant != variant {
            return Err(IndexCacheError::VariantMismatch {
                expected: variant,
                actual: self.variant,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexBody {
    recipes: Vec<Recipe>,
    needs: Vec<BTreeMap<GroupKey, u32>>,
    code_to_groups: Vec<(String, Vec<(RecipeId, GroupKey)>)>,
}

/// Reads and writes per-variant index files in one directory.
#[derive(Debug, Clone)]
pub struct IndexCache {
    dir: PathBuf,
}

impl IndexCache {
    /// Creates a cache rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File holding the index of `variant`.
    #[must_use]
    pub fn path_for(&self, variant: CatalogVariant) -> PathBuf {
        self.dir.join(format!("recipeindex_{}.bin", variant.cache_name()))
    }

    /// Writes an index.
    pub fn save(&self, index: &RecipeIndex) -> IndexCacheResult<()> {
        let bytes = encode(index)?;
        fs::create_dir_all(&self.dir)?;
        let path = self.path_for(index.variant());
        fs::write(&path, &bytes)?;
        info!("Saved {} recipe index ({} bytes) to {}", index.variant(), bytes.len(), path.display());
        Ok(())
    }

    /// Reads an index, re-resolving outputs against `provider`.
    pub fn load(&self, variant: CatalogVariant, provider: &dyn RecipeProvider) -> IndexCacheResult<RecipeIndex> {
        let started = Instant::now();
        let path = self.path_for(variant);
        let bytes = fs::read(&path)?;
        let index = decode(&bytes, variant, provider)?;
        info!(
            "Loaded {variant} recipe index from {}: {} recipes in {:?}",
            path.display(),
            index.len(),
            started.elapsed()
        );
        Ok(index)
    }

    /// Loads an index, or `None` when missing or unreadable.
    pub fn try_load(&self, variant: CatalogVariant, provider: &dyn RecipeProvider) -> Option<RecipeIndex> {
        match self.load(variant, provider) {
            Ok(index) => Some(index),
            Err(IndexCacheError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No cached {variant} index");
                None
            }
            Err(e) => {
                warn!("Discarding cached {variant} index: {e}");
                None
            }
        }
    }

    /// Loads the cached index or builds one and saves it.
    ///
    /// The second value is true when the index came from disk. Save
    /// failures are logged and otherwise ignored.
    pub fn load_or_build(&self, variant: CatalogVariant, provider: &dyn RecipeProvider) -> (RecipeIndex, bool) {
        if let Some(index) = self.try_load(variant, provider) {
            return (index, true);
        }
        let (index, _) = RecipeIndex::build(variant, provider);
        if let Err(e) = self.save(&index) {
            warn!("Failed to save {variant} index: {e}");
        }
        (index, false)
    }
}

fn encode(index: &RecipeIndex) -> IndexCacheResult<Vec<u8>> {
    let header = IndexHeader::new(index.variant());
    let mut code_to_groups: Vec<(String, Vec<(RecipeId, GroupKey)>)> =
        index.code_map().iter().map(|(code, groups)| (code.clone(), groups.clone())).collect();
    code_to_groups.sort_by(|a, b| a.0.cmp(&b.0));
    let body = IndexBody {
        recipes: index.recipes().to_vec(),
        needs: index
            .recipes()
            .iter()
            .map(|r| index.needs(r.id).cloned().unwrap_or_default())
            .collect(),
        code_to_groups,
    };

    let header_bytes = bincode::serialize(&header).map_err(|e| IndexCacheError::Serialization(e.to_string()))?;
    let body_bytes = bincode::serialize(&body).map_err(|e| IndexCacheError::Serialization(e.to_string()))?;
    let header_len = u32::try_from(header_bytes.len()).map_err(|_| IndexCacheError::InvalidFormat)?;

    let mut out = Vec::with_capacity(4 + header_bytes.len() + body_bytes.len());
    out.extend_from_slice(&header_len.to_le_bytes());
    out.extend_from_slice(&header_bytes);
    out.extend_from_slice(&body_bytes);
    Ok(out)
}

fn decode(bytes: &[u8], variant: CatalogVariant, provider: &dyn RecipeProvider) -> IndexCacheResult<RecipeIndex> {
    if bytes.len() < 4 {
        return Err(IndexCacheError::InvalidFormat);
    }
    let (len_bytes, rest) = bytes.split_at(4);
    let len_bytes: [u8; 4] = len_bytes.try_into().map_err(|_| IndexCacheError::InvalidFormat)?;
    let header_len = u32::from_le_bytes(len_bytes) as usize;
    if rest.len() < header_len {
        return Err(IndexCacheError::InvalidFormat);
    }
    let (header_bytes, body_bytes) = rest.split_at(header_len);
    let header: IndexHeader = bincode::deserialize(header_bytes).map_err(|_| IndexCacheError::InvalidFormat)?;
    header.validate(variant)?;
    let body: IndexBody =
        bincode::deserialize(body_bytes).map_err(|e| IndexCacheError::Serialization(e.to_string()))?;
    if body.needs.len() != body.recipes.len() {
        return Err(IndexCacheError::InvalidFormat);
    }

    let mut remap: AHashMap<RecipeId, RecipeId> = AHashMap::new();
    let mut recipes = Vec::with_capacity(body.recipes.len());
    let mut needs = Vec::with_capacity(body.needs.len());
    for (mut recipe, recipe_needs) in body.recipes.into_iter().zip(body.needs) {
        recipe.outputs = recipe
            .outputs
            .into_iter()
            .filter_map(|out| {
                if is_templated(out.key()) {
                    return Some(out);
                }
                provider
                    .resolve_stack(out.key())
                    .map(|live| live.with_size(out.size()))
            })
            .collect();
        if recipe.outputs.is_empty() {
            debug!("Cached recipe {} has no resolvable output, skipping", recipe.name);
            continue;
        }
        let new_id = RecipeId::new(recipes.len() as u32);
        remap.insert(recipe.id, new_id);
        recipe.id = new_id;
        recipes.push(recipe);
        needs.push(recipe_needs);
    }

    let mut code_to_groups: AHashMap<String, Vec<(RecipeId, GroupKey)>> = AHashMap::new();
    for (code, groups) in body.code_to_groups {
        let kept: Vec<(RecipeId, GroupKey)> = groups
            .into_iter()
            .filter_map(|(id, key)| remap.get(&id).map(|&new_id| (new_id, key)))
            .collect();
        if !kept.is_empty() {
            code_to_groups.insert(code, kept);
        }
    }

    Ok(RecipeIndex::assemble(variant, recipes, needs, code_to_groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{IngredientDescriptor, RecipeDefinition, StaticCatalog};
    use crate::stack::ItemStack;
    use crate::testing::bucket_catalog;
    use craftscan_common::{ItemClass, StackKey};
    use tempfile::TempDir;

    #[test]
    fn test_save_then_load_matches_build() {
        let dir = TempDir::new().expect("temp dir");
        let cache = IndexCache::new(dir.path());
        let cat = bucket_catalog();
        let (built, _) = RecipeIndex::build(CatalogVariant::All, &cat);
        cache.save(&built).expect("save");
        assert!(cache.path_for(CatalogVariant::All).ends_with("recipeindex_all.bin"));

        let loaded = cache.load(CatalogVariant::All, &cat).expect("load");
        assert_eq!(loaded.len(), built.len());
        assert_eq!(loaded.recipes(), built.recipes());
        assert_eq!(loaded.groups_for_code("game:planks-oak"), built.groups_for_code("game:planks-oak"));
        assert_eq!(loaded.producers_of(&StackKey::new("game:torch")), built.producers_of(&StackKey::new("game:torch")));
    }

    #[test]
    fn test_load_drops_recipes_without_live_outputs() {
        let dir = TempDir::new().expect("temp dir");
        let cache = IndexCache::new(dir.path());
        let mut cat = bucket_catalog();
        cat.add_item(ItemStack::new("game:lantern", ItemClass::Item, 1));
        cat.add_recipe(RecipeDefinition {
            name: "game:recipes/grid/lantern".to_owned(),
            ingredients: vec![IngredientDescriptor::new("game:stick", 2, ItemClass::Item)],
            outputs: vec![ItemStack::new("game:lantern", ItemClass::Item, 1)],
        });
        let (built, _) = RecipeIndex::build(CatalogVariant::All, &cat);
        assert_eq!(built.len(), 3);
        cache.save(&built).expect("save");

        // The torch output vanished from the live catalog.
        let mut live = StaticCatalog::new();
        for code in ["game:planks-oak", "game:planks-pine", "game:stick", "game:lantern"] {
            live.add_item(ItemStack::new(code, ItemClass::Item, 1));
        }
        let loaded = cache.load(CatalogVariant::All, &live).expect("load");
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.recipes()[1].name, "game:recipes/grid/lantern");
        assert_eq!(loaded.recipes()[1].id, RecipeId::new(1));
        assert_eq!(loaded.needs(RecipeId::new(1)), built.needs(RecipeId::new(2)));
        assert!(loaded
            .groups_for_code("game:stick")
            .iter()
            .all(|(id, _)| *id == RecipeId::new(1)));
    }

    #[test]
    fn test_load_uses_persisted_needs() {
        let dir = TempDir::new().expect("temp dir");
        let cache = IndexCache::new(dir.path());
        let cat = bucket_catalog();
        let (built, _) = RecipeIndex::build(CatalogVariant::All, &cat);
        let recipes = built.recipes().to_vec();
        let needs: Vec<BTreeMap<GroupKey, u32>> = recipes
            .iter()
            .map(|r| r.group_needs().into_iter().map(|(key, need)| (key, need + 10)).collect())
            .collect();
        let code_to_groups = built.code_map().clone();
        let stored = RecipeIndex::assemble(CatalogVariant::All, recipes, needs.clone(), code_to_groups);
        cache.save(&stored).expect("save");

        let loaded = cache.load(CatalogVariant::All, &cat).expect("load");
        assert_eq!(loaded.needs(RecipeId::new(0)), Some(&needs[0]));
        assert_ne!(loaded.needs(RecipeId::new(0)), built.needs(RecipeId::new(0)));
    }

    #[test]
    fn test_rejects_foreign_and_corrupt_files() {
        let dir = TempDir::new().expect("temp dir");
        let cache = IndexCache::new(dir.path());
        let cat = bucket_catalog();
        let (built, _) = RecipeIndex::build(CatalogVariant::All, &cat);
        cache.save(&built).expect("save");

        fs::copy(cache.path_for(CatalogVariant::All), cache.path_for(CatalogVariant::Wood)).expect("copy");
        assert!(matches!(
            cache.load(CatalogVariant::Wood, &cat),
            Err(IndexCacheError::VariantMismatch { .. })
        ));

        fs::write(cache.path_for(CatalogVariant::Stone), b"nope").expect("write");
        assert!(cache.try_load(CatalogVariant::Stone, &cat).is_none());
        assert!(cache.try_load(CatalogVariant::Mods, &cat).is_none());
    }

    #[test]
    fn test_load_or_build_persists() {
        let dir = TempDir::new().expect("temp dir");
        let cache = IndexCache::new(dir.path().join("indexes"));
        let cat = bucket_catalog();
        let (_, from_disk) = cache.load_or_build(CatalogVariant::Vanilla, &cat);
        assert!(!from_disk);
        assert!(cache.path_for(CatalogVariant::Vanilla).exists());
        let (_, from_disk) = cache.load_or_build(CatalogVariant::Vanilla, &cat);
        assert!(from_disk);
    }
}
