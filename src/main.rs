use anyhow::{bail, Result};
use std::env;
use std::path::Path;

use cat_registry::{init_tracing, load_csv, CatService, Config, SqliteCatMapper};

fn main() -> Result<()> {
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration ({}), using defaults", e);
        Config::default()
    });
    init_tracing(&config.logging)?;

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(&config),
        Some("import") => match args.get(2) {
            Some(csv_path) => run_import(&config, Path::new(csv_path)),
            None => bail!("usage: cat-registry import <cats.csv>"),
        },
        Some("list") | None => run_list(&config),
        Some(other) => bail!("unknown command: {} (expected init, import or list)", other),
    }
}

fn run_init(config: &Config) -> Result<()> {
    let mapper = SqliteCatMapper::open(&config.database.path)?;
    println!("✓ Database ready at {:?} ({} cats)", config.database.path, mapper.count()?);
    Ok(())
}

fn run_import(config: &Config, csv_path: &Path) -> Result<()> {
    println!("📂 Loading CSV...");
    let cats = load_csv(csv_path)?;
    println!("✓ Loaded {} cats from {:?}", cats.len(), csv_path);

    let mapper = SqliteCatMapper::open(&config.database.path)?.with_actor("csv_import");
    let inserted = mapper.import(&cats)?;

    println!("✓ Inserted: {}", inserted);
    println!("✓ Duplicates skipped: {}", cats.len() - inserted);
    println!("✓ Database contains {} cats", mapper.count()?);
    Ok(())
}

fn run_list(config: &Config) -> Result<()> {
    if !config.database.path.exists() {
        eprintln!("❌ Database not found at {:?}", config.database.path);
        eprintln!("   Run: cat-registry init");
        std::process::exit(1);
    }

    let service = CatService::new(SqliteCatMapper::open(&config.database.path)?);
    let cats = service.find_cat(None, None, None)?;

    if cats.is_empty() {
        println!("No cats registered yet.");
        return Ok(());
    }

    println!("{:<20} {:<10} {:>4}", "NAME", "SEX", "AGE");
    for cat in &cats {
        println!("{:<20} {:<10} {:>4}", cat.name, cat.sex, cat.age);
    }
    println!("\n{} cats", cats.len());
    Ok(())
}
