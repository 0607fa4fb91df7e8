use anyhow::Result;
use heatshed::clock::SystemClock;
use heatshed::config::Config;
use heatshed::controller::{Controller, ControllerHandle};
use heatshed::notify::NotificationBus;
use heatshed::persistence::{JsonCommandStore, JsonStatisticsStore};
use heatshed::teleinfo::reader::LineReader;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info};

/// Lines buffered between the serial reader and the controller
const LINE_BUFFER: usize = 256;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config.validate()?;
    heatshed::logging::init_logging(&config.logging)?;

    info!("Heatshed {} starting up", env!("APP_VERSION"));

    let bus = heatshed::bus::open(&config.bus)
        .map_err(|e| anyhow::anyhow!("Failed to open expander bus: {}", e))?;
    info!(
        "Driving expanders on {:?} bus {}",
        config.bus.kind, config.bus.bus_number
    );
    let commands = JsonCommandStore::open(&config.storage.commands_file)?;
    let statistics = JsonStatisticsStore::open(&config.storage.statistics_file)?;

    let notifications = Arc::new(NotificationBus::new());
    let mut controller = Controller::new(
        bus,
        Box::new(commands),
        Box::new(statistics),
        Arc::new(SystemClock),
        notifications.clone(),
    )
    .map_err(|e| anyhow::anyhow!("Failed to initialise heaters: {}", e))?;
    controller.start()?;

    let (handle, commands_rx) = ControllerHandle::new(notifications);
    let (lines_tx, lines_rx) = mpsc::channel::<String>(LINE_BUFFER);
    let (shutdown_tx, shutdown_rx) = mpsc::unbounded_channel::<()>();

    let reader_task = tokio::spawn(LineReader::from_config(&config.serial).run(lines_tx));

    let web_host = config.web.host.clone();
    let web_port = config.web.port;
    let web_task = tokio::spawn(async move {
        if let Err(e) = heatshed::web::serve(handle, &web_host, web_port).await {
            error!("Web server error: {}", e);
        }
    });

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(());
        }
    });

    let result = controller.run(lines_rx, commands_rx, shutdown_rx).await;
    reader_task.abort();
    web_task.abort();
    match result {
        Ok(()) => {
            info!("Controller shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("Controller failed with error: {}", e);
            Err(anyhow::anyhow!("Controller error: {}", e))
        }
    }
}
