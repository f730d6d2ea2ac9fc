//! Utility to inspect the model artifact directory and print what would be loaded.

use dotenvy::dotenv;
use rust_finrisk_api::artifacts::ModelStore;
use std::env;
use std::path::PathBuf;

/// Main entry point for the artifact inspection utility.
///
/// Loads the directory given as the first argument (or `ARTIFACTS_DIR`, or
/// `./artifacts`) with full validation and prints the feature order, model kinds and
/// file digests.
fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let dir: PathBuf = env::args()
        .nth(1)
        .or_else(|| env::var("ARTIFACTS_DIR").ok())
        .unwrap_or_else(|| "./artifacts".to_string())
        .into();

    let store = ModelStore::load(&dir)?;

    println!("Artifacts in {}", dir.display());
    println!();
    println!("Features ({}):", store.feature_names.len());
    for (i, name) in store.feature_names.iter().enumerate() {
        println!(
            "  {:>2}. {:<32} mean={:<12.4} scale={:.4}",
            i + 1,
            name,
            store.scaler.mean[i],
            store.scaler.scale[i]
        );
    }
    println!();
    println!("Models:");
    for (slot, model) in &store.models {
        println!("  - {:<20} {}", slot.display_name(), model.kind());
    }
    println!();
    println!("SHA-256:");
    for fp in &store.fingerprints {
        println!("  {}  {}", fp.sha256, fp.file);
    }

    Ok(())
}
