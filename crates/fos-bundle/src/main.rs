//! fOS Bundle - Chunk Loader
//!
//! Loads JSON data chunks through the bundle runtime and prints the exports
//! of every module they register.

use anyhow::{bail, Context};
use fos_bundle::{ChunkId, ChunkManifest, NetworkSource, Runtime, RuntimeConfig};
use fos_net::{HttpTransport, ResourceLoader, Url};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 3 {
        bail!("usage: fos-bundle <manifest.json> <base-url> <chunk-id>...");
    }

    let manifest_json = std::fs::read_to_string(&args[0])
        .with_context(|| format!("reading manifest {}", args[0]))?;
    let manifest = ChunkManifest::from_json(&manifest_json)?;

    let base = Url::parse(&args[1]).with_context(|| format!("invalid base URL {}", args[1]))?;

    let chunks = args[2..].iter()
        .map(|arg| {
            manifest.chunk_for_name(arg)
                .with_context(|| format!("unknown chunk {}", arg))
        })
        .collect::<anyhow::Result<Vec<ChunkId>>>()?;

    let config = RuntimeConfig::default();
    let transport = HttpTransport::new("fOS-Engine/0.1")?;
    let loader = ResourceLoader::new(transport).with_timeout(config.load_timeout);

    let runtime = Runtime::builder()
        .config(config)
        .manifest(manifest)
        .source(NetworkSource::new(loader, base))
        .build();

    tracing::info!(?chunks, "Loading chunks...");
    runtime.block_on(runtime.ensure_all(chunks.iter().copied()))?;

    let mut output = serde_json::Map::new();
    for chunk in &chunks {
        for module in runtime.chunk_modules(*chunk) {
            let exports = runtime.require(&module)?;
            let value = fos_bundle::ExportValue::Object(exports).to_json();
            output.insert(module.to_string(), value);
        }
    }

    println!("{}", serde_json::to_string_pretty(&serde_json::Value::Object(output))?);

    let stats = runtime.load_stats();
    tracing::info!(
        fetched = stats.unique,
        deduplicated = stats.deduplicated,
        "Done"
    );

    Ok(())
}
