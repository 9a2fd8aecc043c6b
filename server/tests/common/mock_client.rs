use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use protocol::{FirmwareIdentity, FirmwareState, Message};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::time::timeout;

pub struct TestClient<T> {
    pub conn: Arc<Mutex<T>>,
}

impl<T> TestClient<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: T) -> Self {
        Self {
            conn: Arc::new(Mutex::new(stream)),
        }
    }

    pub async fn send(&mut self, msg: &Message) -> Result<(), Box<dyn Error>> {
        let data = msg.encode()?;
        let mut conn = self.conn.lock().await;
        conn.write_all(&data).await?;
        conn.flush().await?;
        Ok(())
    }

    pub async fn receive(&mut self, timeout_duration: Duration) -> Result<Message, Box<dyn Error>> {
        let mut conn = self.conn.lock().await;

        let read = async {
            let mut header = [0u8; Message::HEADER_SIZE];
            conn.read_exact(&mut header).await?;

            let payload_len = u16::from_be_bytes(header) as usize;
            let total_len = Message::HEADER_SIZE + payload_len;

            let mut buffer = vec![0u8; total_len];
            buffer[..Message::HEADER_SIZE].copy_from_slice(&header);
            conn.read_exact(&mut buffer[Message::HEADER_SIZE..]).await?;

            let (msg, consumed) = Message::decode(&buffer)?;
            assert_eq!(consumed, total_len);
            Ok::<_, Box<dyn Error>>(msg)
        };

        timeout(timeout_duration, read).await?
    }

    pub async fn handshake(&mut self, title: &str, version: &str) -> Result<(), Box<dyn Error>> {
        self.send(&Message::ClientInfo {
            identity: FirmwareIdentity::new(title, version),
        })
        .await?;
        self.send(&Message::ClientState {
            state: FirmwareState::Updated,
        })
        .await?;
        self.send(&Message::ClientSubscribe).await
    }
}
