use log::LevelFilter;

#[tokio::main]
async fn main() {
    pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    if let Err(e) = run().await {
        log::error!("{}", e);
    }
}

#[cfg(any(target_os = "macos", target_os = "ios"))]
async fn run() -> soundbound_ble::Result<()> {
    use soundbound_ble::{ManagerConfig, Notice, corebluetooth};

    let config = ManagerConfig::load()?;
    let handle = corebluetooth::spawn_manager(&config)?;
    let mut snapshots = handle.subscribe();
    let mut notices = handle.notices();

    // Scanning starts by itself once the radio powers on.
    loop {
        tokio::select! {
            changed = snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = snapshots.borrow_and_update().clone();
                log::info!(
                    "{:?} scanning={} radio={:?} devices={}",
                    snapshot.state,
                    snapshot.scanning,
                    snapshot.radio,
                    snapshot.devices.len()
                );
                if !snapshot.state.is_busy() {
                    if let Some(device) = snapshot.devices.first() {
                        log::info!("Connecting to {} ({})", device.name_or_default(), device.identifier);
                        if let Err(e) = handle.connect(device.identifier).await {
                            log::warn!("Connect rejected: {}", e);
                        }
                    }
                }
                if !snapshot.services.is_empty() {
                    log::info!("Services: {:?}", snapshot.services);
                }
            }
            notice = notices.recv() => match notice {
                Ok(Notice::Failed { peripheral, error }) => log::warn!("{} failed: {}", peripheral, error),
                Ok(notice) => log::info!("{:?}", notice),
                Err(_) => break,
            },
        }
    }
    Ok(())
}

#[cfg(not(any(target_os = "macos", target_os = "ios")))]
async fn run() -> soundbound_ble::Result<()> {
    Err(soundbound_ble::Error::Platform(
        "no Bluetooth backend is available on this platform".to_string(),
    ))
}
