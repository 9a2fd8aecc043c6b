mod session;
mod store;

use std::sync::Arc;

use log::{info, warn};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

pub use self::session::{DeviceRecord, DeviceSession};
pub use self::store::FirmwareStore;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(#[from] protocol::Error),
    #[error("Image of {0} bytes does not fit the wire format")]
    ImageTooLarge(usize),
}

pub async fn run(host: &str, port: u16, store: Arc<FirmwareStore>) -> Result<(), Error> {
    let listener = TcpListener::bind((host, port)).await?;
    info!("Server listening on {:?}", listener.local_addr());

    serve(listener, store).await
}

pub async fn serve(listener: TcpListener, store: Arc<FirmwareStore>) -> Result<(), Error> {
    loop {
        let (stream, addr) = listener.accept().await?;
        info!("Device connected from {}", addr);

        let store = store.clone();
        tokio::spawn(async move {
            let record = Arc::new(Mutex::new(DeviceRecord::default()));
            let session = DeviceSession::new(stream, store, record.clone());

            if let Err(e) = session.run().await {
                warn!("Session with {} ended: {}", addr, e);
            }

            let record = record.lock().await;
            info!(
                "Device {} disconnected, last state {:?} after {} chunks",
                addr,
                record.states.last(),
                record.chunks_served
            );
        });
    }
}
