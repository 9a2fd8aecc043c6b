use log::{debug, error, info, warn};
use protocol::{Chunk, Config, FirmwareDescriptor, FirmwareIdentity, FirmwareState, Message};

use crate::descriptor::is_update_needed;
use crate::reporter::StateReporter;
use crate::session::{SessionEvent, SessionStatus, UpdateSession};
use crate::{Connectivity, Flash, Observer, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrchestratorAction {
    Noop,
    RebootRequested,
    ProgressUpdate(u8),
}

pub struct UpdateOrchestrator<C, T, F, O = ()>
where
    C: Connectivity,
    T: Transport,
    F: Flash,
    O: Observer,
{
    config: Config,
    identity: FirmwareIdentity,
    connectivity: C,
    transport: T,
    flash: F,
    observer: O,
    reporter: StateReporter,
    session: Option<UpdateSession<F::Sink>>,
}

impl<C, T, F, O> UpdateOrchestrator<C, T, F, O>
where
    C: Connectivity,
    T: Transport,
    F: Flash,
    O: Observer,
{
    pub fn new(config: Config, connectivity: C, transport: T, flash: F, observer: O) -> Self {
        let identity = FirmwareIdentity::new(&*config.running_title, &*config.running_version);

        Self {
            reporter: StateReporter::new(identity.clone()),
            config,
            identity,
            connectivity,
            transport,
            flash,
            observer,
            session: None,
        }
    }

    pub fn drive(&mut self, now: u64) -> OrchestratorAction {
        if !self.connectivity.is_connected() {
            if let Some(session) = self.session.as_mut() {
                session.pause();
            }
            if let Err(e) = self.connectivity.ensure_connected() {
                warn!("Management service unreachable: {}", e);
                return OrchestratorAction::Noop;
            }
            info!("Connected to management service");
        }

        if !self.reporter.flush(&mut self.transport) {
            return OrchestratorAction::Noop;
        }

        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.advance(now, &mut self.transport, &mut self.flash) {
                warn!("Update stalled: {}", e);
            }
        }

        let action = self.drain_events();

        let terminal = self
            .session
            .as_ref()
            .filter(|session| session.is_terminal())
            .map(|session| session.status());

        let action = match terminal {
            Some(SessionStatus::Failed(reason)) => {
                info!("Update abandoned ({}), staying on {}", reason, self.identity.version);
                self.session = None;
                self.reporter.report(FirmwareState::Idle);
                action
            }
            Some(SessionStatus::Updated) => OrchestratorAction::RebootRequested,
            _ => action,
        };

        self.reporter.flush(&mut self.transport);
        action
    }

    pub fn on_firmware_announced(&mut self, mut descriptor: FirmwareDescriptor) {
        if let Some(session) = &self.session {
            info!(
                "Announcement of {} {} ignored, update to {} in progress",
                descriptor.title,
                descriptor.version,
                session.descriptor().version
            );
            return;
        }

        if !is_update_needed(&self.identity, &descriptor) {
            info!(
                "Firmware {} {} not applicable to running {} {}",
                descriptor.title, descriptor.version, self.identity.title, self.identity.version
            );
            return;
        }

        if descriptor.chunk_size == 0 {
            descriptor.chunk_size = self.config.chunk_size;
        }

        if descriptor.total_size == 0
            || descriptor.chunk_size == 0
            || descriptor.checksum.len() != descriptor.checksum_algorithm.digest_len()
        {
            warn!(
                "Announcement of {} {} is malformed, ignored",
                descriptor.title, descriptor.version
            );
            return;
        }

        match self.flash.begin(&descriptor) {
            Ok(sink) => {
                self.session = Some(UpdateSession::new(
                    descriptor,
                    sink,
                    self.config.chunk_retry_ceiling,
                    self.config.chunk_timeout_ms,
                ));
            }
            Err(e) => {
                error!("Preparing flash for {} failed: {}", descriptor.version, e);
                self.reporter.report(FirmwareState::Failed);
                self.reporter.report(FirmwareState::Idle);
                self.observer.on_complete(false);
            }
        }
    }

    pub fn on_chunk_received(&mut self, chunk: Chunk) {
        match self.session.as_mut() {
            Some(session) => session.on_chunk(chunk),
            None => debug!("Chunk {} received without an active update", chunk.index),
        }
    }

    pub fn on_message(&mut self, message: Message) {
        match message {
            Message::ServerFirmware { descriptor } => self.on_firmware_announced(descriptor),
            Message::ServerChunk { chunk, .. } => self.on_chunk_received(chunk),
            other => debug!("Ignoring {:?} message", other.topic()),
        }
    }

    pub fn reset(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.abort();
        }
    }

    pub fn restart_device(&mut self) {
        info!("Restarting device");
        self.flash.restart();
    }

    pub fn status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map(|session| session.status())
            .unwrap_or(SessionStatus::Idle)
    }

    pub fn identity(&self) -> &FirmwareIdentity {
        &self.identity
    }

    pub fn reporter(&self) -> &StateReporter {
        &self.reporter
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn connectivity_mut(&mut self) -> &mut C {
        &mut self.connectivity
    }

    pub fn flash(&self) -> &F {
        &self.flash
    }

    pub fn observer(&self) -> &O {
        &self.observer
    }

    fn drain_events(&mut self) -> OrchestratorAction {
        let mut action = OrchestratorAction::Noop;
        let Some(session) = self.session.as_mut() else {
            return action;
        };

        while let Some(event) = session.pop_event() {
            match event {
                SessionEvent::Transition(state) => self.reporter.report(state),
                SessionEvent::Progress { received, total } => {
                    self.observer.on_progress(received, total);
                    action = OrchestratorAction::ProgressUpdate(percent(received, total));
                }
                SessionEvent::Completed(success) => self.observer.on_complete(success),
            }
        }

        action
    }
}

fn percent(received: u32, total: u32) -> u8 {
    (received as u64 * 100 / total.max(1) as u64) as u8
}
