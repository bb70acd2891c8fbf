//! # Craftscan Core
//!
//! Craftability resolution for container-based crafting.
//!
//! This crate answers "what can be crafted right now from everything
//! reachable?" and pulls the ingredients over on request:
//! - Resource pools and wildcard ingredient matching
//! - Recipe normalization and per-variant recipe indexes
//! - Craftability scanning with an optional parallel catalog pass
//! - Pool fingerprints and per-context result caching
//! - Storage collection and ingredient fetching on the storage side
//! - Scan request/reply wire format and scan scheduling
//! - The craftability service tying it all together
//! - Index persistence and service configuration

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod config;
pub mod display;
pub mod events;
pub mod fetch;
pub mod fingerprint;
pub mod index;
pub mod index_cache;
pub mod inventory;
pub mod partition;
pub mod pool;
pub mod protocol;
pub mod provider;
pub mod recipe;
pub mod scan_state;
pub mod scanner;
pub mod service;
pub mod stack;
pub mod storage;
pub mod variant;
pub mod wildcard;

#[cfg(test)]
mod testing;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::*;
    pub use crate::display::*;
    pub use crate::events::*;
    pub use crate::fetch::*;
    pub use crate::fingerprint::*;
    pub use crate::index::*;
    pub use crate::index_cache::*;
    pub use crate::inventory::*;
    pub use crate::partition::*;
    pub use crate::pool::*;
    pub use crate::protocol::*;
    pub use crate::provider::*;
    pub use crate::recipe::*;
    pub use crate::scan_state::*;
    pub use crate::scanner::*;
    pub use crate::service::*;
    pub use crate::stack::*;
    pub use crate::storage::*;
    pub use crate::variant::*;
    pub use crate::wildcard::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;
    use craftscan_common::{BlockPos, ContainerId, ContextKey, ItemClass, ScanId};

    /// One pass through both sides of the protocol: the consumer's request
    /// is served by a storage host and the reply feeds the scanner.
    #[test]
    fn test_request_served_by_storage_feeds_scanner() {
        let catalog = testing::bucket_catalog();
        let (index, _) = RecipeIndex::build(CatalogVariant::All, &catalog);
        let resolver = PageCodeMap::from_catalog(&catalog.catalog(None));

        let mut world = StorageWorld::new();
        let mut chest = Container::new(ContainerId::new(7), ContainerKind::Chest, 4).at(BlockPos::new(2, 64, 0));
        chest
            .set(0, ItemStack::new("game:planks-pine", ItemClass::Block, 6))
            .expect("slot");
        world.insert(chest);
        let requester = Requester::new(BlockPos::new(0, 64, 0));

        let request = ScanRequest::scan(20, ScanId::first(), ContextKey::new("allTab"));
        let wire = request.encode().expect("encode");
        let request = ScanRequest::decode(&wire).expect("decode");
        let response = StorageScanner::handle_request(&mut world, &requester, &request, true);
        assert!(response.fetch.is_none());

        let reply = ScanReply::decode(&response.reply.encode().expect("encode")).expect("decode");
        let pool = reply.to_pool().expect("pool");
        let outcome = CraftabilityScanner::new(&index).scan(&pool, &resolver);
        assert!(outcome
            .outputs
            .contains(&craftscan_common::StackKey::new("game:bucket-pine")));
    }
}
