use std::cell::RefCell;
use std::env;
use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::process;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use log::{debug, error, info, warn};
use program::*;

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const RECONNECT_INTERVAL: Duration = Duration::from_secs(1);

const MAX_BACKLOG: usize = 64 * 1024;

struct LinkState {
    stream: Option<TcpStream>,
    outbound: BytesMut,
}

impl LinkState {
    fn disconnect(&mut self) {
        self.stream = None;
        self.outbound.clear();
    }

    fn flush(&mut self) -> io::Result<()> {
        let Some(stream) = self.stream.as_mut() else {
            return Ok(());
        };

        while self.outbound.has_remaining() {
            match stream.write(self.outbound.chunk()) {
                Ok(0) => {
                    self.disconnect();
                    return Err(ErrorKind::WriteZero.into());
                }
                Ok(n) => self.outbound.advance(n),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.disconnect();
                    return Err(e);
                }
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct TcpLink {
    addr: Rc<str>,
    state: Rc<RefCell<LinkState>>,
}

impl TcpLink {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: Rc::from(addr),
            state: Rc::new(RefCell::new(LinkState {
                stream: None,
                outbound: BytesMut::new(),
            })),
        }
    }

    /// Appends whatever the service has sent to `buf`. Returns 0 once nothing is pending.
    pub fn read_into(&self, buf: &mut BytesMut) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        let Some(stream) = state.stream.as_mut() else {
            return Ok(0);
        };

        let mut buffer = [0u8; 2048];
        match stream.read(&mut buffer) {
            Ok(0) => {
                warn!("Management service closed the connection");
                state.disconnect();
                Ok(0)
            }
            Ok(n) => {
                buf.extend_from_slice(&buffer[..n]);
                Ok(n)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(0),
            Err(e) => {
                state.disconnect();
                Err(e)
            }
        }
    }

    /// Writes as much of the queued output as the socket takes without blocking.
    pub fn flush(&self) -> io::Result<()> {
        self.state.borrow_mut().flush()
    }

    pub fn backlog(&self) -> usize {
        self.state.borrow().outbound.len()
    }
}

impl Connectivity for TcpLink {
    fn is_connected(&self) -> bool {
        self.state.borrow().stream.is_some()
    }

    fn ensure_connected(&mut self) -> Result<(), ConnectError> {
        let connect = || -> io::Result<TcpStream> {
            let stream = TcpStream::connect(&*self.addr)?;
            stream.set_nonblocking(true)?;
            stream.set_nodelay(true)?;
            Ok(stream)
        };

        let stream = connect().map_err(|e| ConnectError(format!("{}: {}", self.addr, e)))?;
        let mut state = self.state.borrow_mut();
        state.outbound.clear();
        state.stream = Some(stream);
        Ok(())
    }
}

impl Transport for TcpLink {
    type Error = io::Error;

    fn publish(&mut self, _topic: Topic, message: &Message) -> Result<(), Self::Error> {
        let frame = message
            .encode()
            .map_err(|e| io::Error::new(ErrorKind::InvalidData, e.to_string()))?;

        let mut state = self.state.borrow_mut();
        if state.stream.is_none() {
            return Err(ErrorKind::NotConnected.into());
        }

        state.flush()?;
        if state.outbound.len() + frame.len() > MAX_BACKLOG {
            return Err(ErrorKind::WouldBlock.into());
        }

        state.outbound.extend_from_slice(&frame);
        state.flush()
    }
}

pub struct FileFlash {
    staging: PathBuf,
}

impl Flash for FileFlash {
    type Sink = MemorySink;

    fn begin(&mut self, descriptor: &FirmwareDescriptor) -> Result<MemorySink, ApplyError> {
        info!(
            "Reserving {} bytes for {} {}",
            descriptor.total_size, descriptor.title, descriptor.version
        );
        Ok(MemorySink::new(descriptor.total_size as usize))
    }

    fn apply(&mut self, image: MemorySink) -> Result<(), ApplyError> {
        fs::write(&self.staging, image.as_slice())
            .map_err(|e| ApplyError(format!("{}: {}", self.staging.display(), e)))?;
        info!("Image staged at {}", self.staging.display());
        Ok(())
    }

    fn restart(&mut self) {
        info!("Restarting into {}", self.staging.display());
        process::exit(0);
    }
}

pub struct LogObserver;

impl Observer for LogObserver {
    fn on_progress(&mut self, received: u32, total: u32) {
        info!("Downloaded {}/{} chunks", received, total);
    }

    fn on_complete(&mut self, success: bool) {
        if success {
            info!("Update finished");
        } else {
            error!("Update failed, keeping the running image");
        }
    }
}

fn main() {
    env_logger::init();

    let config = Config::new();
    let addr = format!("{}:{}", config.host, config.port);
    let staging = env::var("FIRMWARE_STAGING_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("firmware.bin"));

    info!(
        "Running {} {}, management service at {}",
        config.running_title, config.running_version, addr
    );

    let link = TcpLink::new(&addr);
    let mut device = UpdateOrchestrator::new(
        config,
        link.clone(),
        link.clone(),
        FileFlash { staging },
        LogObserver,
    );

    let started = Instant::now();
    let mut inbound = BytesMut::new();

    loop {
        if let Err(e) = link.flush() {
            warn!("Writing to management service failed: {}", e);
        }

        loop {
            match link.read_into(&mut inbound) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) => {
                    warn!("Reading from management service failed: {}", e);
                    break;
                }
            }
        }

        loop {
            match Message::decode(&inbound) {
                Ok((message, consumed)) => {
                    inbound.advance(consumed);
                    device.on_message(message);
                }
                Err(protocol::Error::InsufficientData) => break,
                Err(e) => {
                    error!("Discarding undecodable input: {}", e);
                    inbound.clear();
                    break;
                }
            }
        }

        let now = started.elapsed().as_millis() as u64;
        match device.drive(now) {
            OrchestratorAction::RebootRequested => device.restart_device(),
            OrchestratorAction::ProgressUpdate(percent) => debug!("Progress {}%", percent),
            OrchestratorAction::Noop => {}
        }

        if link.is_connected() {
            thread::sleep(POLL_INTERVAL);
        } else {
            inbound.clear();
            thread::sleep(RECONNECT_INTERVAL);
        }
    }
}
