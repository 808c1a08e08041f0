//! Example demonstrating configuration, presets and state blobs
//!
//! Run with: cargo run --package bellcut-core --example config_demo

use std::sync::Arc;

use bellcut_core::domain::config::{decode_state, encode_state, BellcutConfig, PresetManager};
use bellcut_core::domain::dsp::ResponseMonitor;
use bellcut_core::domain::params::{ChainSettings, ParameterId, ParameterStore, Slope};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter("bellcut_core=debug,info")
        .init();

    println!("=== Bellcut Configuration Demo ===\n");
    let workspace = tempfile::TempDir::new()?;

    // 1. Factory default round trip
    println!("1. Saving and reloading the factory default configuration...");
    let config_path = workspace.path().join("config.toml");
    BellcutConfig::factory_default().save_to_file(&config_path).await?;
    let config = BellcutConfig::load_from_file(&config_path).await?;
    println!(
        "   ✓ {} Hz, {} frame blocks, peak at {} Hz",
        config.app.sample_rate, config.app.block_size, config.settings.peak_freq
    );

    // 2. Presets
    println!("\n2. Writing presets...");
    let presets = PresetManager::new(workspace.path().join("presets"));
    let vocal = ChainSettings {
        low_cut_freq: 100.0,
        low_cut_slope: Slope::Db24,
        peak_freq: 3000.0,
        peak_gain_db: 3.0,
        peak_quality: 0.8,
        ..Default::default()
    };
    let telephone = ChainSettings {
        low_cut_freq: 300.0,
        low_cut_slope: Slope::Db48,
        high_cut_freq: 3400.0,
        high_cut_slope: Slope::Db48,
        ..Default::default()
    };
    presets.save_preset("vocal", &vocal).await?;
    presets.save_preset("telephone", &telephone).await?;
    println!("   ✓ Presets on disk: {:?}", presets.list_presets().await?);

    // 3. Live parameters and the response curve
    println!("\n3. Loading 'vocal' into a parameter store...");
    let params = Arc::new(ParameterStore::new());
    params.store_settings(&presets.load_preset("vocal").await?);
    let mut monitor = ResponseMonitor::new(Arc::clone(&params), config.app.sample_rate as f64, 256);
    if let Some((freq, db)) = monitor.curve().peak() {
        println!("   ✓ Peak {db:+.1} dB at {freq:.0} Hz");
    }

    params.set(ParameterId::PeakGain, 9.0);
    if monitor.poll() {
        if let Some((freq, db)) = monitor.curve().peak() {
            println!("   ✓ After boosting: peak {db:+.1} dB at {freq:.0} Hz");
        }
    }

    // 4. State blob
    println!("\n4. Host state blob...");
    let blob = encode_state(&params.snapshot())?;
    println!("   {blob}");
    let restored = decode_state(&blob)?;
    assert_eq!(restored, params.snapshot());
    println!("   ✓ Blob restores the same settings");

    println!("\n=== Demo Complete ===");
    Ok(())
}
