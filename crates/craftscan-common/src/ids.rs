//! Identity types for items, recipes, scans, and containers.

use serde::{Deserialize, Serialize};

/// Namespace reserved for base-game content.
pub const BASE_DOMAIN: &str = "game";

/// Splits a namespaced code into `(domain, path)`.
///
/// Codes without a `:` belong to [`BASE_DOMAIN`].
#[must_use]
pub fn split_code(code: &str) -> (&str, &str) {
    match code.split_once(':') {
        Some((domain, path)) => (domain, path),
        None => (BASE_DOMAIN, code),
    }
}

/// Returns true when the code lives outside the base-game namespace.
#[must_use]
pub fn is_foreign_domain(code: &str) -> bool {
    split_code(code).0 != BASE_DOMAIN
}

/// Broad class of an item stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub enum ItemClass {
    /// Placeable block
    Block,
    /// Plain item
    #[default]
    Item,
    /// Durable tool
    Tool,
}

impl ItemClass {
    /// Stable integer used on the wire and in fingerprints.
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Block => 0,
            Self::Item => 1,
            Self::Tool => 2,
        }
    }

    /// Inverse of [`ItemClass::as_i32`].
    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Block),
            1 => Some(Self::Item),
            2 => Some(Self::Tool),
            _ => None,
        }
    }

    /// Inverse of [`ItemClass::name`], ignoring case.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        [Self::Block, Self::Item, Self::Tool]
            .into_iter()
            .find(|class| class.name().eq_ignore_ascii_case(name))
    }

    /// Short lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Block => "block",
            Self::Item => "item",
            Self::Tool => "tool",
        }
    }
}

impl std::fmt::Display for ItemClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Canonical identity of an item stack: code plus the optional material and
/// type attributes.
///
/// Empty attribute strings are normalized to `None`, so two keys are equal iff
/// all three components agree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StackKey {
    code: String,
    material: Option<String>,
    #[serde(rename = "type")]
    variant_type: Option<String>,
}

impl StackKey {
    /// Creates a key with no attributes.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            material: None,
            variant_type: None,
        }
    }

    /// Creates a key with optional material and type attributes.
    #[must_use]
    pub fn with_attributes(code: impl Into<String>, material: Option<&str>, variant_type: Option<&str>) -> Self {
        Self {
            code: code.into(),
            material: non_empty(material),
            variant_type: non_empty(variant_type),
        }
    }

    /// Item code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Material attribute, if any.
    #[must_use]
    pub fn material(&self) -> Option<&str> {
        self.material.as_deref()
    }

    /// Type attribute, if any.
    #[must_use]
    pub fn variant_type(&self) -> Option<&str> {
        self.variant_type.as_deref()
    }

    /// Returns the code-only key used as a lookup fallback.
    #[must_use]
    pub fn code_only(&self) -> Self {
        Self::new(self.code.clone())
    }

    /// Returns true if the key carries any attribute.
    #[must_use]
    pub const fn has_attributes(&self) -> bool {
        self.material.is_some() || self.variant_type.is_some()
    }
}

impl std::fmt::Display for StackKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.code)?;
        if self.has_attributes() {
            write!(
                f,
                "[{}/{}]",
                self.material.as_deref().unwrap_or(""),
                self.variant_type.as_deref().unwrap_or("")
            )?;
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|s| !s.is_empty()).map(str::to_owned)
}

/// Dense identifier of a recipe inside one recipe index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecipeId(u32);

impl RecipeId {
    /// Creates a recipe ID from a raw value.
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the ID as a slice index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Correlation id of a scan request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ScanId(u32);

impl ScanId {
    /// Id carried by replies that have no originating request.
    pub const NONE: Self = Self(0);

    /// First id handed out in a session.
    #[must_use]
    pub const fn first() -> Self {
        Self(1)
    }

    /// Creates a scan ID from a raw value.
    #[must_use]
    pub const fn from_raw(value: u32) -> Self {
        Self(value)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Returns the following id, wrapping past zero.
    #[must_use]
    pub const fn next(self) -> Self {
        match self.0.wrapping_add(1) {
            0 => Self(1),
            n => Self(n),
        }
    }

    /// Checks if this id refers to a real request.
    #[must_use]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }
}

impl std::fmt::Display for ScanId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Key of a consumer context (for example a UI tab) owning a cached result.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct ContextKey(String);

impl ContextKey {
    /// Creates a context key.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Checks if the key is empty (unknown context).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for ContextKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ContextKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Identifier of a storage container known to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(u64);

impl ContainerId {
    /// Creates a container ID from a raw value.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}
