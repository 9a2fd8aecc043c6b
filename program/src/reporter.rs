use alloc::collections::VecDeque;

use log::{debug, warn};
use protocol::{FirmwareIdentity, FirmwareState, Message};

use crate::Transport;

pub struct StateReporter {
    identity: FirmwareIdentity,
    info_sent: bool,
    startup_state_sent: bool,
    subscribed: bool,
    pending: VecDeque<FirmwareState>,
    last_sent: Option<FirmwareState>,
}

impl StateReporter {
    pub fn new(identity: FirmwareIdentity) -> Self {
        Self {
            identity,
            info_sent: false,
            startup_state_sent: false,
            subscribed: false,
            pending: VecDeque::new(),
            last_sent: None,
        }
    }

    pub fn info_sent(&self) -> bool {
        self.info_sent
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscribed
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn last_sent(&self) -> Option<FirmwareState> {
        self.last_sent
    }

    pub fn send_info<T: Transport>(&mut self, transport: &mut T) -> bool {
        if self.info_sent {
            return true;
        }
        let message = Message::ClientInfo {
            identity: self.identity.clone(),
        };
        self.info_sent = Self::publish(transport, &message);
        self.info_sent
    }

    pub fn send_state<T: Transport>(&mut self, transport: &mut T, state: FirmwareState) -> bool {
        let sent = Self::publish(transport, &Message::ClientState { state });
        if sent {
            debug!("Reported state {}", state);
            self.last_sent = Some(state);
        }
        sent
    }

    pub fn report(&mut self, state: FirmwareState) {
        let latest = self.pending.back().copied().or(self.last_sent);
        if latest == Some(state) {
            return;
        }
        self.pending.push_back(state);
    }

    pub fn flush<T: Transport>(&mut self, transport: &mut T) -> bool {
        if !self.send_info(transport) {
            return false;
        }

        if !self.startup_state_sent {
            self.startup_state_sent = self.send_state(transport, FirmwareState::Updated);
            if !self.startup_state_sent {
                return false;
            }
        }

        if !self.subscribed {
            self.subscribed = Self::publish(transport, &Message::ClientSubscribe);
            if !self.subscribed {
                return false;
            }
        }

        while let Some(state) = self.pending.front().copied() {
            if !self.send_state(transport, state) {
                return false;
            }
            self.pending.pop_front();
        }

        true
    }

    fn publish<T: Transport>(transport: &mut T, message: &Message) -> bool {
        match transport.publish(message.topic(), message) {
            Ok(()) => true,
            Err(e) => {
                warn!("Publishing {:?} failed: {}", message.topic(), e);
                false
            }
        }
    }
}
