use std::env;
use std::time::Instant;

use anyhow::{Context, Result};
use screen_snapshot::{CaptureEngine, TargetSelector};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let selector = TargetSelector::from_device_name(env::args().nth(1).as_deref());
    let engine = CaptureEngine::builder()
        .build()
        .context("failed to build capture engine")?;

    for (index, monitor) in engine.monitors().unwrap_or_default().iter().enumerate() {
        println!("{}", monitor.label(index));
    }

    let begin = Instant::now();
    let report = engine.capture_with_diagnostics(&selector, engine.config().timeout);
    let elapsed = begin.elapsed();

    println!("{}", report.diagnostics);
    println!(
        "Capture finished in {:.3} ms (tier: {})",
        elapsed.as_secs_f64() * 1000.0,
        report.tier.map_or("none", |tier| tier.as_str())
    );

    let Some(image) = report.image else {
        anyhow::bail!("no tier produced an image");
    };
    let path = env::temp_dir().join("screen-snapshot.jpg");
    std::fs::write(&path, image.bytes())
        .with_context(|| format!("failed to write JPEG to {}", path.display()))?;
    println!(
        "Saved {}x{} capture ({} bytes) to {}",
        image.width(),
        image.height(),
        image.len(),
        path.display()
    );
    Ok(())
}
