use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use droidpilot::{Controller, DriverConfig, EventBus};

fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = DriverConfig::load("droidpilot.json")?.with_env_overrides();

    let mut events = EventBus::new();
    events.on("task.failed", |event| {
        tracing::warn!(data = %event.data, "task failed");
        Ok(())
    });

    let mut controller = Controller::new(config, events);
    let device = controller.connect()?;
    tracing::info!(device = %device, "session established");

    let (width, height) = controller.capture.resolution()?;
    tracing::info!(width, height, "capturing screenshot");
    controller.capture.save_screenshot("screen.png")?;
    tracing::info!("screenshot written to screen.png");

    controller.disconnect()?;
    Ok(())
}
