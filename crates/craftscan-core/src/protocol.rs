//! Scan request/reply messages exchanged between consumer and storage host.
//!
//! Messages are serde types encoded with bincode. A request may carry the
//! ingredient sets of a recipe when the consumer wants the host to fetch
//! them; the reply always carries the collected `(code, count, class)`
//! triples.

use craftscan_common::{CatalogError, ContextKey, ItemClass, ScanId};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::pool::ResourcePool;
use crate::recipe::{IngredientKind, Recipe};
use crate::wildcard::{WildcardMatcher, WildcardPattern};

/// Protocol error types.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Message could not be encoded
    #[error("Failed to encode message: {0}")]
    Encode(String),
    /// Message could not be decoded
    #[error("Failed to decode message: {0}")]
    Decode(String),
    /// Parallel reply columns differ in length
    #[error("Reply columns differ in length: {codes} codes, {counts} counts, {classes} classes")]
    ColumnMismatch {
        /// Number of codes
        codes: usize,
        /// Number of counts
        counts: usize,
        /// Number of classes
        classes: usize,
    },
    /// Reply referenced an unknown class
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// One ingredient as sent over the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireIngredient {
    /// Whether `pattern` applies
    pub is_wildcard: bool,
    /// Units to fetch
    pub quantity: u32,
    /// Concrete codes accepted as-is
    pub codes: Vec<String>,
    /// Wildcard pattern code
    pub pattern: Option<String>,
    /// Allowed wildcard tokens, empty for any
    pub allowed: Vec<String>,
    /// Class filter, `None` for any
    pub class: Option<ItemClass>,
}

impl WireIngredient {
    /// Creates a concrete ingredient.
    #[must_use]
    pub fn concrete<S: Into<String>>(codes: impl IntoIterator<Item = S>, quantity: u32) -> Self {
        Self {
            quantity,
            codes: codes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Creates a wildcard ingredient.
    #[must_use]
    pub fn wildcard(pattern: impl Into<String>, allowed: Vec<String>, class: Option<ItemClass>, quantity: u32) -> Self {
        Self {
            is_wildcard: true,
            quantity,
            pattern: Some(pattern.into()),
            allowed,
            class,
            ..Self::default()
        }
    }

    /// Compiles the ingredient into a reusable slot filter.
    #[must_use]
    pub fn filter(&self) -> IngredientFilter<'_> {
        let pattern = if self.is_wildcard {
            self.pattern.as_deref().filter(|p| !p.is_empty()).and_then(|p| match WildcardPattern::parse(p) {
                Ok(parsed) => Some(parsed),
                Err(e) => {
                    debug!("Ignoring wire wildcard {p}: {e}");
                    None
                }
            })
        } else {
            None
        };
        let matcher = pattern.map(|p| {
            let allowed = (!self.allowed.is_empty()).then(|| self.allowed.clone());
            WildcardMatcher::new(p, allowed, self.class.unwrap_or_default())
        });
        IngredientFilter {
            ingredient: self,
            matcher,
        }
    }

    /// Checks whether a stack of `code` and `class` counts for this ingredient.
    #[must_use]
    pub fn accepts(&self, code: &str, class: ItemClass) -> bool {
        self.filter().accepts(code, class)
    }
}

/// A [`WireIngredient`] with its wildcard pattern parsed once.
#[derive(Debug, Clone)]
pub struct IngredientFilter<'a> {
    ingredient: &'a WireIngredient,
    matcher: Option<WildcardMatcher>,
}

impl IngredientFilter<'_> {
    /// Units to fetch.
    #[must_use]
    pub const fn quantity(&self) -> u32 {
        self.ingredient.quantity
    }

    /// Checks whether the ingredient has any usable matching rule.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.ingredient.codes.is_empty() || self.matcher.is_some()
    }

    /// Checks whether a stack of `code` and `class` counts for the ingredient.
    #[must_use]
    pub fn accepts(&self, code: &str, class: ItemClass) -> bool {
        if self.ingredient.codes.iter().any(|c| c == code) {
            return true;
        }
        match &self.matcher {
            Some(m) => self.ingredient.class.map_or(true, |c| c == class) && m.token(code).is_some(),
            None => false,
        }
    }

    /// Checks whether a code matches, ignoring class.
    #[must_use]
    pub fn accepts_code(&self, code: &str) -> bool {
        self.ingredient.codes.iter().any(|c| c == code) || self.matcher.as_ref().is_some_and(|m| m.token(code).is_some())
    }

    /// Concrete codes listed for the ingredient, in request order.
    #[must_use]
    pub fn codes(&self) -> &[String] {
        &self.ingredient.codes
    }

    /// Checks if the ingredient is matched by its concrete codes.
    #[must_use]
    pub fn is_concrete(&self) -> bool {
        !self.ingredient.codes.is_empty()
    }
}

/// Ingredients of one recipe variant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngredientSet {
    /// Ingredients in recipe order
    pub ingredients: Vec<WireIngredient>,
}

impl IngredientSet {
    /// Builds the wire form of a normalized recipe.
    ///
    /// Tools request a single unit; consumed ingredients their quantity.
    #[must_use]
    pub fn from_recipe(recipe: &Recipe) -> Self {
        let ingredients = recipe
            .ingredients
            .iter()
            .map(|ing| match &ing.kind {
                IngredientKind::Concrete(codes) => WireIngredient::concrete(codes.iter().cloned(), ing.required()),
                IngredientKind::Wildcard(m) => WireIngredient::wildcard(
                    m.pattern().as_str(),
                    m.allowed().map(<[String]>::to_vec).unwrap_or_default(),
                    Some(m.class()),
                    ing.required(),
                ),
            })
            .collect();
        Self { ingredients }
    }

    /// Checks if the set has no ingredients.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ingredients.is_empty()
    }
}

/// Request for a storage scan, optionally with a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRequest {
    /// Search radius around the requester
    pub radius: i32,
    /// Fetch the first satisfiable ingredient set into the requester
    pub collect_items: bool,
    /// Candidate ingredient sets, tried in order
    pub ingredient_variants: Vec<IngredientSet>,
    /// Correlation id
    pub scan_id: ScanId,
    /// Consumer context that asked
    pub context_key: ContextKey,
}

impl ScanRequest {
    /// Creates a plain scan request.
    #[must_use]
    pub fn scan(radius: i32, scan_id: ScanId, context_key: ContextKey) -> Self {
        Self {
            radius,
            scan_id,
            context_key,
            ..Self::default()
        }
    }

    /// Creates a fetch request over `variants`.
    #[must_use]
    pub fn fetch(radius: i32, variants: Vec<IngredientSet>, scan_id: ScanId, context_key: ContextKey) -> Self {
        Self {
            radius,
            collect_items: true,
            ingredient_variants: variants,
            scan_id,
            context_key,
        }
    }

    /// Checks whether the request asks for a fetch the host can act on.
    #[must_use]
    pub fn wants_fetch(&self) -> bool {
        self.collect_items && !self.ingredient_variants.is_empty()
    }

    /// Encodes the request with bincode.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decodes a request.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        bincode::deserialize(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Collected storage contents answering a [`ScanRequest`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReply {
    /// Item codes
    pub codes: Vec<String>,
    /// Count per code
    pub counts: Vec<i32>,
    /// Class per code, as [`ItemClass::as_i32`]
    pub classes: Vec<i32>,
    /// Correlation id of the request
    pub scan_id: ScanId,
    /// Context of the request
    pub context_key: ContextKey,
    /// Whether the request carried a fetch
    pub is_fetch: bool,
}

impl ScanReply {
    /// Builds a reply from a pool.
    #[must_use]
    pub fn from_pool(pool: &ResourcePool, scan_id: ScanId, context_key: ContextKey, is_fetch: bool) -> Self {
        let mut reply = Self {
            scan_id,
            context_key,
            is_fetch,
            ..Self::default()
        };
        for (code, entry) in pool.iter() {
            reply.codes.push(code.to_owned());
            reply.counts.push(i32::try_from(entry.count).unwrap_or(i32::MAX));
            reply.classes.push(entry.class.as_i32());
        }
        reply
    }

    /// Rebuilds the pool described by the reply.
    ///
    /// Non-positive counts are skipped; repeated codes accumulate.
    pub fn to_pool(&self) -> ProtocolResult<ResourcePool> {
        if self.codes.len() != self.counts.len() || self.codes.len() != self.classes.len() {
            return Err(ProtocolError::ColumnMismatch {
                codes: self.codes.len(),
                counts: self.counts.len(),
                classes: self.classes.len(),
            });
        }
        let mut pool = ResourcePool::new();
        for ((code, &count), &class) in self.codes.iter().zip(&self.counts).zip(&self.classes) {
            let class = ItemClass::from_i32(class).ok_or(CatalogError::UnknownClass(class))?;
            if let Ok(count) = u32::try_from(count) {
                pool.add_count(code, count, class);
            }
        }
        Ok(pool)
    }

    /// Encodes the reply with bincode.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decodes a reply.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        bincode::deserialize(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
