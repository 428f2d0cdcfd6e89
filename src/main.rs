use futures_util::future::join_all;
use log::{error, info};
use std::process::ExitCode;
use std::time::Duration;
use tokio::sync::watch;

use serial_sensor_logger::config::SensorConfig;
use serial_sensor_logger::ingest::{run_sensor, summarize_instances, SensorPipeline};
use serial_sensor_logger::models::SensorKind;
use serial_sensor_logger::serial::{find_sensor_devices, select_device, SerialLineSource};
use serial_sensor_logger::storage::DailyLogSink;
use serial_sensor_logger::utils::LocalClock;
use serial_sensor_logger::SensorError;

// Upper bound on waiting for leftover blocking work at exit
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

async fn run(config: SensorConfig, clock: LocalClock) -> Result<(), SensorError> {
    // Resolve every sensor to a device before opening anything
    let mut bindings: Vec<(SensorKind, String)> = Vec::new();
    for &kind in &config.sensors {
        let devices = find_sensor_devices(kind);
        if config.list_only {
            println!("{} devices: {:?}", kind, devices);
            continue;
        }
        match select_device(config.device.as_deref(), &devices) {
            Some(device) => bindings.push((kind, device)),
            None => return Err(SensorError::TransportUnavailable(kind)),
        }
    }
    if config.list_only {
        return Ok(());
    }

    let location = config.location;
    info!(
        "Site location: latitude {}, longitude {}, elevation {}",
        location.latitude, location.longitude, location.elevation
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks = Vec::new();
    let mut open_error = None;

    for (kind, device) in bindings {
        info!("Using {} device: {}", kind, device);
        let source = match SerialLineSource::open(&device, config.read_timeout_for(kind)).await {
            Ok(source) => source,
            Err(e) => {
                error!("Not starting {} logger: {}", kind, e);
                open_error = Some(e);
                continue;
            }
        };

        let sink = DailyLogSink::new(&config.output_dir, kind.log_prefix());
        info!("Writing {} records to {}", kind, sink.dir().display());

        let pipeline = SensorPipeline::new(kind);
        let handle = tokio::spawn(run_sensor(pipeline, source, sink, clock, shutdown_rx.clone()));
        tasks.push((kind, handle));
    }

    if tasks.is_empty() {
        return Err(open_error.unwrap_or(SensorError::Config("no sensors selected".into())));
    }

    let (kinds, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let all = join_all(handles);
    tokio::pin!(all);

    // Run every logger or wait for shutdown signal
    let finished = tokio::select! {
        results = &mut all => Some(results),
        _ = wait_for_interrupt() => None,
    };
    let results = match finished {
        Some(results) => results,
        None => {
            info!("Program terminated by user. Closing devices.");
            let _ = shutdown_tx.send(true);
            all.await
        }
    };

    let results = kinds
        .into_iter()
        .zip(results)
        .map(|(kind, joined)| {
            let result = joined.unwrap_or_else(|e| Err(SensorError::TaskFailed(e.to_string())));
            (kind, result)
        })
        .collect();
    summarize_instances(results)
}

/// Resolves on Ctrl+C; never resolves if the handler cannot be installed.
async fn wait_for_interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn main() -> ExitCode {
    // Initialize logging
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_secs()
        .init();

    let clock = LocalClock::system();

    // Load configuration
    let config = match SensorConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to start async runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let outcome = runtime.block_on(run(config, clock));
    runtime.shutdown_timeout(SHUTDOWN_GRACE);

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}
