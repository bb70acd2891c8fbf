//! Command dispatch.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use craftscan_core::{
    fingerprint, CatalogVariant, CraftabilityScanner, IndexCache, PageCodeMap, RecipeIndex, RecipeProvider,
    ResourcePool, ServiceConfig, StaticCatalog, CONFIG_FILE,
};
use serde::Serialize;
use tracing::info;

use crate::recipe_loader::{load_catalog, load_pool};

/// Craftability scanner for item catalogs.
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Service configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// List what a pool of items can craft
    Scan {
        /// Catalog TOML with items and recipes
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,

        /// Pool TOML with the stacks on hand
        #[arg(long, value_name = "FILE")]
        pool: PathBuf,

        /// Catalog variant: van, mods, wood, stone or all
        #[arg(long, default_value = "all", value_parser = parse_variant)]
        variant: CatalogVariant,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,

        /// Catalog pass workers: -1 automatic, 1 sequential
        #[arg(long, allow_hyphen_values = true)]
        partitions: Option<i32>,

        /// Skip the full-catalog pass
        #[arg(long)]
        no_catalog_pass: bool,
    },

    /// Build recipe indexes and write them to the cache directory
    Index {
        /// Catalog TOML with items and recipes
        #[arg(long, value_name = "FILE")]
        catalog: PathBuf,

        /// Output directory, defaults to the configured cache directory
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Only this variant
        #[arg(long, value_parser = parse_variant)]
        variant: Option<CatalogVariant>,
    },

    /// Write a default configuration file
    Config {
        /// Destination
        #[arg(default_value = CONFIG_FILE)]
        path: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Scan output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// One display id per line
    Text,
    /// Full report as JSON
    Json,
}

fn parse_variant(value: &str) -> Result<CatalogVariant, String> {
    CatalogVariant::from_key(value).ok_or_else(|| format!("unknown variant '{value}'"))
}

/// Result of the `scan` command.
#[derive(Debug, Clone, Serialize)]
struct ScanReport {
    variant: String,
    fingerprint: String,
    recipes: usize,
    satisfied: Vec<String>,
    outputs: Vec<String>,
    display_ids: Vec<String>,
}

/// Runs a parsed command line.
pub fn run(cli: Cli) -> Result<()> {
    let mut config = cli.config.as_deref().map(ServiceConfig::load_from).unwrap_or_default();

    match cli.command {
        Commands::Scan {
            catalog,
            pool,
            variant,
            format,
            partitions,
            no_catalog_pass,
        } => {
            if let Some(partitions) = partitions {
                config.partitions = partitions;
            }
            if no_catalog_pass {
                config.full_catalog_scan = false;
            }
            config.validate();

            let catalog =
                load_catalog(&catalog).with_context(|| format!("Failed to load catalog {}", catalog.display()))?;
            let pool = load_pool(&pool).with_context(|| format!("Failed to load pool {}", pool.display()))?;
            let report = scan_report(&catalog, &pool, variant, &config);
            print_report(&report, format)
        },
        Commands::Index { catalog, out, variant } => {
            let Some(dir) = out.or_else(|| config.cache_dir.clone()) else {
                bail!("No output directory: pass --out or set cache_dir in the configuration");
            };
            let catalog =
                load_catalog(&catalog).with_context(|| format!("Failed to load catalog {}", catalog.display()))?;
            let variants = variant.map_or_else(|| CatalogVariant::ALL.to_vec(), |v| vec![v]);
            build_indexes(&catalog, &dir, &variants)
        },
        Commands::Config { path, force } => write_default_config(&path, force),
    }
}

fn scan_report(
    catalog: &StaticCatalog,
    pool: &ResourcePool,
    variant: CatalogVariant,
    config: &ServiceConfig,
) -> ScanReport {
    let index = match &config.cache_dir {
        Some(dir) => IndexCache::new(dir).load_or_build(variant, catalog).0,
        None => RecipeIndex::build(variant, catalog).0,
    };
    let stacks = catalog.catalog(None);
    let resolver = PageCodeMap::from_catalog(&stacks);
    let scanner = CraftabilityScanner::new(&index);
    let outcome = if config.full_catalog_scan {
        scanner.scan_with_catalog(pool, &resolver, &stacks, &config.partitioner())
    } else {
        scanner.scan(pool, &resolver)
    };

    ScanReport {
        variant: variant.key().to_owned(),
        fingerprint: format!("{:016x}", fingerprint(pool)),
        recipes: index.len(),
        satisfied: outcome
            .satisfied
            .iter()
            .filter_map(|&id| index.recipe(id))
            .map(|recipe| recipe.name.clone())
            .collect(),
        outputs: outcome.outputs.iter().map(ToString::to_string).collect(),
        display_ids: outcome.display_ids.into_iter().collect(),
    }
}

fn print_report(report: &ScanReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            println!(
                "{} of {} {} recipes craftable (pool {})",
                report.satisfied.len(),
                report.recipes,
                report.variant,
                report.fingerprint
            );
            for id in &report.display_ids {
                println!("{id}");
            }
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(report)?),
    }
    Ok(())
}

fn build_indexes(catalog: &StaticCatalog, dir: &Path, variants: &[CatalogVariant]) -> Result<()> {
    let cache = IndexCache::new(dir);
    for &variant in variants {
        let (index, stats) = RecipeIndex::build(variant, catalog);
        cache
            .save(&index)
            .with_context(|| format!("Failed to save {variant} index"))?;
        println!(
            "{variant}: {} recipes ({} offered, {} malformed, {} filtered) -> {}",
            index.len(),
            stats.offered,
            stats.malformed,
            stats.filtered,
            cache.path_for(variant).display()
        );
    }
    Ok(())
}

fn write_default_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!("{} already exists, pass --force to overwrite", path.display());
    }
    ServiceConfig::default()
        .save_to(path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote default configuration to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe_loader::{parse_catalog, parse_pool};
    use tempfile::TempDir;

    const CATALOG: &str = r#"
items = [
    { code = "game:planks-oak", class = "block" },
    { code = "game:planks-pine", class = "block" },
    { code = "game:bucket-oak" },
    { code = "game:bucket-pine" },
    { code = "game:torch" },
]

[[recipes]]
name = "game:recipes/grid/bucket"
ingredients = [{ code = "game:planks-*", quantity = 4, class = "block", allowed = ["oak", "pine"] }]
outputs = [{ code = "game:bucket-*" }]
"#;

    #[test]
    fn test_cli_parses_scan() {
        let cli = Cli::try_parse_from([
            "craftscan",
            "scan",
            "--catalog",
            "cat.toml",
            "--pool",
            "pool.toml",
            "--variant",
            "wood",
            "--partitions",
            "-1",
            "--format",
            "json",
        ])
        .expect("parse");
        let Commands::Scan {
            variant,
            format,
            partitions,
            ..
        } = cli.command
        else {
            panic!("expected scan");
        };
        assert_eq!(variant, CatalogVariant::Wood);
        assert_eq!(format, OutputFormat::Json);
        assert_eq!(partitions, Some(-1));

        assert!(Cli::try_parse_from(["craftscan", "index", "--catalog", "c", "--variant", "nope"]).is_err());
    }

    #[test]
    fn test_scan_report_threshold() {
        let catalog = parse_catalog(CATALOG).expect("catalog");
        let config = ServiceConfig::default();

        let pool = parse_pool("[[stacks]]\ncode = \"game:planks-oak\"\ncount = 4\nclass = \"block\"\n").expect("pool");
        let report = scan_report(&catalog, &pool, CatalogVariant::All, &config);
        assert_eq!(report.satisfied, vec!["game:recipes/grid/bucket".to_owned()]);
        assert_eq!(report.outputs, vec!["game:bucket-oak".to_owned()]);
        assert_eq!(report.display_ids.len(), 1);

        let short = parse_pool("[[stacks]]\ncode = \"game:planks-oak\"\ncount = 3\nclass = \"block\"\n").expect("pool");
        let report = scan_report(&catalog, &short, CatalogVariant::All, &config);
        assert!(report.satisfied.is_empty());
        assert!(report.display_ids.is_empty());
    }

    #[test]
    fn test_index_and_config_commands() {
        let dir = TempDir::new().expect("temp dir");
        let catalog = parse_catalog(CATALOG).expect("catalog");
        build_indexes(&catalog, dir.path(), &[CatalogVariant::All]).expect("build");
        assert!(IndexCache::new(dir.path()).path_for(CatalogVariant::All).exists());

        let config_path = dir.path().join(CONFIG_FILE);
        write_default_config(&config_path, false).expect("write");
        assert!(write_default_config(&config_path, false).is_err());
        write_default_config(&config_path, true).expect("overwrite");
        assert_eq!(ServiceConfig::load_from(&config_path), ServiceConfig::default());
    }
}
