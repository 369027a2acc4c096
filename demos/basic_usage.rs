//! AnyCache walkthrough
//!
//! Stores a few values, reads them back through both tiers, lets one expire
//! and prints the statistics.
//!
//! Usage:
//!   cargo run --example basic_usage
//!
//! Environment variables:
//!   ANYCACHE_ROOT - root directory for cache files (default: platform cache dir)
//!   RUST_LOG      - log filter (default: info)

use anycache::{AnyCache, CacheConfig, Expiry};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Article {
    title: String,
    words: u32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut builder = CacheConfig::builder()
        .memory_count_limit(100)
        .disk_byte_limit(16 * 1024 * 1024);
    if let Ok(root) = std::env::var("ANYCACHE_ROOT") {
        builder = builder.root_directory(root);
    }
    let cache = AnyCache::with_config("demo", builder.build())?;
    info!("Cache directory: {}", cache.disk().directory().display());

    info!("--- Plain values ---");
    cache.set_object("greeting", "hello, cache".to_string(), Expiry::Never)?;
    cache.set_object("answer", 42u64, Expiry::after_secs(600))?;
    info!("greeting = {}", cache.object::<String>("greeting")?);

    // stored as u64, read back as text
    info!("answer as text = {}", cache.object::<String>("answer")?);

    info!("--- Structured values ---");
    let article = Article {
        title: "Two tiers".to_string(),
        words: 1200,
    };
    cache.set_codable("article.json", article, Expiry::after_secs(3600))?.await;
    cache.drop_all();
    let article: Article = cache.codable_object_async("article.json").await?;
    info!("article from disk = {:?}", article);

    info!("--- Expiry ---");
    cache.set_object("flash", "gone soon".to_string(), Expiry::after(Duration::from_millis(50)))?;
    tokio::time::sleep(Duration::from_millis(100)).await;
    match cache.object::<String>("flash") {
        Err(e) if e.is_expired() => info!("flash expired as expected"),
        other => info!("unexpected result: {:?}", other),
    }

    let report = cache.remove_all_expired();
    info!("Sweep: {:?}", report);
    info!("{}", cache.stats());

    cache.remove_all();
    cache.flush();
    Ok(())
}
