mod config;

use common::memory::InMemoryStore;
use common::mqtt::MqttClient;
use common::postgres::{
    PostgresActionRepository, PostgresClient, PostgresDeviceRepository,
    PostgresDeviceSnapRepository, PostgresDeviceVersionRepository, PostgresGroupRepository,
};
use common::telemetry::{init_telemetry, shutdown_telemetry, TelemetryProviders};
use config::{ServiceConfig, StorageDriver};
use devicetwin::{DeviceTwin, DeviceTwinConfig, DeviceTwinRepositories};
use devicetwin_runner::Runner;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[tokio::main]
async fn main() {
    let config = match ServiceConfig::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let telemetry_providers: Option<TelemetryProviders> =
        match init_telemetry(&config.telemetry()) {
            Ok(providers) => providers,
            Err(e) => {
                eprintln!("Failed to initialize telemetry: {}", e);
                std::process::exit(1);
            }
        };

    info!(
        otel_enabled = config.otel_enabled,
        otel_endpoint = %config.otel_endpoint,
        storage_driver = ?config.storage_driver,
        "Starting devicetwin service"
    );
    debug!("Configuration: {:?}", config);

    let repositories = match initialize_repositories(&config).await {
        Ok(repos) => repos,
        Err(e) => {
            error!("Failed to initialize storage: {}", e);
            std::process::exit(1);
        }
    };

    let (mqtt_client, eventloop) = MqttClient::new(&config.mqtt());

    let device_twin = DeviceTwin::new(
        repositories,
        mqtt_client.clone(),
        eventloop,
        DeviceTwinConfig {
            resync_delay: config.resync_delay(),
            reconnect_delay: config.mqtt().reconnect_delay(),
        },
    );

    let runner = Runner::new()
        .with_named_process("mqtt_subscriber", device_twin.into_runner_process())
        .with_closer(move || async move {
            info!("Running cleanup tasks...");
            if let Err(e) = mqtt_client.disconnect().await {
                warn!(error = %e, "MQTT disconnect failed");
            }

            // Flush pending traces and logs
            shutdown_telemetry(telemetry_providers);

            info!("Cleanup complete");
            Ok(())
        })
        .with_closer_timeout(Duration::from_secs(10));

    runner.run().await;
}

async fn initialize_repositories(config: &ServiceConfig) -> anyhow::Result<DeviceTwinRepositories> {
    match config.storage_driver {
        StorageDriver::Memory => {
            warn!("Using in-memory storage; state is lost on restart");
            Ok(DeviceTwinRepositories::from(InMemoryStore::new()))
        }
        StorageDriver::Postgres => {
            info!("Initializing PostgreSQL...");
            let client = PostgresClient::from_config(&config.postgres())?;
            client.ping().await?;
            client.run_migrations().await?;

            Ok(DeviceTwinRepositories {
                device: Arc::new(PostgresDeviceRepository::new(client.clone())),
                snap: Arc::new(PostgresDeviceSnapRepository::new(client.clone())),
                version: Arc::new(PostgresDeviceVersionRepository::new(client.clone())),
                action: Arc::new(PostgresActionRepository::new(client.clone())),
                group: Arc::new(PostgresGroupRepository::new(client)),
            })
        }
    }
}
