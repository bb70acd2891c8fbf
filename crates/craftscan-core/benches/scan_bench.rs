//! Criterion benchmarks for the craftability scanner.
//!
//! Two benchmark groups:
//! - `scan`: recipe deduction and output expansion over a generated catalog
//! - `catalog_pass`: the full-catalog pass, sequential and partitioned

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use craftscan_common::ItemClass;
use craftscan_core::{
    CatalogVariant, CraftabilityScanner, IngredientDescriptor, ItemStack, PageCodeMap, ParallelPartitioner,
    PartitionConfig, RecipeDefinition, RecipeIndex, RecipeProvider, ResourcePool, StaticCatalog, WOOD_SPECIES,
};

/// Builds a catalog with one plank, log and product family per wood species
/// plus `extra` single-ingredient recipes.
fn build_catalog(extra: usize) -> StaticCatalog {
    let mut cat = StaticCatalog::new();
    for species in WOOD_SPECIES {
        cat.add_item(ItemStack::new(format!("game:planks-{species}"), ItemClass::Block, 1));
        cat.add_item(ItemStack::new(format!("game:log-{species}"), ItemClass::Block, 1));
        for product in ["bucket", "chest", "door", "table"] {
            cat.add_item(ItemStack::new(format!("game:{product}-{species}"), ItemClass::Item, 1));
        }
    }
    for (quantity, product) in [(4, "bucket"), (8, "chest"), (6, "door"), (5, "table")] {
        cat.add_recipe(RecipeDefinition {
            name: format!("game:recipes/grid/{product}"),
            ingredients: vec![IngredientDescriptor::new("game:planks-*", quantity, ItemClass::Block)],
            outputs: vec![ItemStack::new(format!("game:{product}-*"), ItemClass::Item, 1)],
        });
    }
    for i in 0..extra {
        let input = format!("game:ore-{i}");
        let output = format!("game:ingot-{i}");
        cat.add_item(ItemStack::new(input.clone(), ItemClass::Item, 1));
        cat.add_item(ItemStack::new(output.clone(), ItemClass::Item, 1));
        cat.add_recipe(RecipeDefinition {
            name: format!("game:recipes/smelt/ingot-{i}"),
            ingredients: vec![
                IngredientDescriptor::new(input, 2, ItemClass::Item),
                IngredientDescriptor::new("game:log-*", 1, ItemClass::Block),
            ],
            outputs: vec![ItemStack::new(output, ItemClass::Item, 1)],
        });
    }
    cat
}

fn build_pool(extra: usize) -> ResourcePool {
    let mut pool = ResourcePool::new();
    for species in WOOD_SPECIES.iter().step_by(2) {
        pool.add_count(&format!("game:planks-{species}"), 16, ItemClass::Block);
        pool.add_count(&format!("game:log-{species}"), 4, ItemClass::Block);
    }
    for i in (0..extra).step_by(3) {
        pool.add_count(&format!("game:ore-{i}"), 2, ItemClass::Item);
    }
    pool
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    for extra in [100, 1_000] {
        let catalog = build_catalog(extra);
        let (index, _) = RecipeIndex::build(CatalogVariant::All, &catalog);
        let resolver = PageCodeMap::from_catalog(&catalog.catalog(None));
        let pool = build_pool(extra);
        let scanner = CraftabilityScanner::new(&index);

        group.bench_with_input(BenchmarkId::from_parameter(extra), &pool, |b, pool| {
            b.iter(|| black_box(scanner.scan(pool, &resolver)));
        });
    }
    group.finish();
}

fn bench_catalog_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_pass");
    let catalog = build_catalog(1_000);
    let (index, _) = RecipeIndex::build(CatalogVariant::All, &catalog);
    let resolver = PageCodeMap::from_catalog(&catalog.catalog(None));
    let stacks = catalog.catalog(None);
    let pool = build_pool(1_000);
    let scanner = CraftabilityScanner::new(&index);

    for partitions in [1, -1] {
        let partitioner = ParallelPartitioner::new(PartitionConfig::default()).with_override(partitions);
        let label = if partitions == 1 { "sequential" } else { "auto" };
        group.bench_function(label, |b| {
            b.iter(|| black_box(scanner.scan_catalog(&pool, &resolver, &stacks, &partitioner)));
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scan, bench_catalog_pass);
criterion_main!(benches);
