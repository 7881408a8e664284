//! nodewarden daemon entrypoint.
//!
//! Startup order matters: profile and credentials are fatal checks,
//! the one-shot time config goes out before the first tick, and the echo
//! responder must be live before the scheduler measures application RTT.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn, Level};
use wardend::scheduler::TelemetryScheduler;
use wardend::settings::Settings;
use wardend::timesync::SystemClockMonitor;
use wardend::echo;
use wardend::transport::{LoopbackTransport, Transport};
use warden_common::{subjects, Profile};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("nodewarden v{} starting", env!("CARGO_PKG_VERSION"));

    let settings = Settings::from_env()?;
    let profile = Profile::load(&settings.profile_path).context("failed to load profile")?;
    let unit_id = profile.metadata.unit_id.clone();

    // The production broker client lives out of tree and implements the
    // same Transport trait; local bring-up runs on the in-process loopback.
    let transport: Arc<LoopbackTransport> = Arc::new(
        LoopbackTransport::connect(
            &settings.broker_url,
            &settings.sys_user,
            &settings.sys_password,
        )
        .context("initial broker connection failed")?,
    );
    info!("warden [{unit_id}] connected");

    let time_config = settings.time_config();
    let payload = serde_json::to_vec(&time_config).unwrap_or_default();
    if let Err(e) = transport.publish(subjects::TIME_CONFIG, payload).await {
        warn!("failed to publish time config: {e}");
    }
    info!("time config published: mode={}", settings.mode);

    echo::register(transport.as_ref(), &unit_id).await?;

    let monitor = Arc::new(SystemClockMonitor::new(&unit_id, settings.mode));
    let mut scheduler = TelemetryScheduler::new(
        Arc::clone(&transport),
        &unit_id,
        Arc::new(profile),
        monitor,
        settings.tick,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(true);
        }
    });

    scheduler.run(shutdown_rx).await;
    info!("shutting down gracefully");
    Ok(())
}
