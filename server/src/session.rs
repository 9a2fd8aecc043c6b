use std::sync::Arc;

use bytes::{Buf, BytesMut};
use log::{debug, info, warn};
use protocol::{FirmwareIdentity, FirmwareState, Message};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::store::FirmwareStore;
use crate::Error;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceRecord {
    pub identity: Option<FirmwareIdentity>,
    pub states: Vec<FirmwareState>,
    pub subscribed: bool,
    pub chunks_served: u32,
}

pub struct DeviceSession<T> {
    stream: T,
    incoming: BytesMut,
    store: Arc<FirmwareStore>,
    record: Arc<Mutex<DeviceRecord>>,
}

impl<T> DeviceSession<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: T, store: Arc<FirmwareStore>, record: Arc<Mutex<DeviceRecord>>) -> Self {
        Self {
            stream,
            incoming: BytesMut::new(),
            store,
            record,
        }
    }

    pub async fn run(mut self) -> Result<(), Error> {
        loop {
            match Message::decode(&self.incoming) {
                Ok((message, consumed)) => {
                    self.incoming.advance(consumed);
                    if let Some(reply) = self.handle(message).await {
                        self.send(&reply).await?;
                    }
                }
                Err(protocol::Error::InsufficientData) => {
                    if self.stream.read_buf(&mut self.incoming).await? == 0 {
                        return Ok(());
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn handle(&mut self, message: Message) -> Option<Message> {
        let mut record = self.record.lock().await;

        match message {
            Message::ClientInfo { identity } => {
                info!("Device runs {} {}", identity.title, identity.version);
                record.identity = Some(identity);
                None
            }
            Message::ClientState { state } => {
                info!("Device reported {}", state);
                record.states.push(state);
                None
            }
            Message::ClientSubscribe => {
                record.subscribed = true;
                let descriptor = self.store.descriptor().clone();
                debug!("Announcing {} {}", descriptor.title, descriptor.version);
                Some(Message::ServerFirmware { descriptor })
            }
            Message::ClientChunkRequest {
                request_id,
                chunk_index,
                chunk_size,
            } => match self.store.chunk(chunk_index, chunk_size) {
                Some(chunk) => {
                    record.chunks_served += 1;
                    Some(Message::ServerChunk { request_id, chunk })
                }
                None => {
                    warn!("Request {} for chunk {} out of range", request_id, chunk_index);
                    None
                }
            },
            Message::Heartbeat { timestamp } => Some(Message::Heartbeat { timestamp }),
            other => {
                debug!("Ignoring {:?} message from device", other.topic());
                None
            }
        }
    }

    async fn send(&mut self, message: &Message) -> Result<(), Error> {
        let buffer = message.encode()?;
        self.stream.write_all(&buffer).await?;
        self.stream.flush().await?;
        Ok(())
    }
}
