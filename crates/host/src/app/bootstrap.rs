use tracing::info;
use tracing_subscriber::EnvFilter;

use super::config::HostConfig;

pub(crate) struct HostWiring {
    pub(crate) config: HostConfig,
}

pub(crate) fn build_app() -> HostWiring {
    init_tracing();
    info!("=== Tilehand Host Startup ===");

    let config = HostConfig::from_env();
    info!(
        tps = config.ticks_per_second,
        thruport_port = config.thruport_port,
        thruport_diag = config.thruport_diag,
        telemetry_every = config.telemetry_every,
        run_ticks = ?config.run_ticks,
        "host_config"
    );

    HostWiring { config }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}
