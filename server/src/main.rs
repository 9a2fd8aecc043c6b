use std::env;
use std::sync::Arc;

use log::info;
use protocol::{ChecksumAlgorithm, Config};
use server::{run, Error, FirmwareStore};

#[tokio::main]
async fn main() -> Result<(), Error> {
    env_logger::init();

    let Config {
        host, port, chunk_size, ..
    } = Config::new();

    let path = env::var("FIRMWARE_PATH").unwrap_or_else(|_| "firmware.bin".into());
    let title = env::var("FIRMWARE_TITLE").unwrap_or_else(|_| "ESPino32".into());
    let version = env::var("FIRMWARE_VERSION").unwrap_or_else(|_| "1.0.1".into());

    let image = tokio::fs::read(&path).await?;
    let store = FirmwareStore::new(title, version, image, chunk_size, ChecksumAlgorithm::Sha256)?;

    let descriptor = store.descriptor();
    info!(
        "Offering {} {} from {} ({} bytes)",
        descriptor.title, descriptor.version, path, descriptor.total_size
    );

    run(&host, port, Arc::new(store)).await
}
