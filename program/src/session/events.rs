use alloc::collections::VecDeque;

use protocol::FirmwareState;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    Transition(FirmwareState),
    Progress { received: u32, total: u32 },
    Completed(bool),
}

pub struct EventQueue {
    inner: VecDeque<SessionEvent>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            inner: VecDeque::with_capacity(8),
        }
    }

    pub fn transition(&mut self, state: FirmwareState) {
        self.inner.push_back(SessionEvent::Transition(state));
    }

    pub fn progress(&mut self, (received, total): (u32, u32)) {
        self.inner.push_back(SessionEvent::Progress { received, total });
    }

    pub fn completed(&mut self, success: bool) {
        self.inner.push_back(SessionEvent::Completed(success));
    }
}

impl Iterator for EventQueue {
    type Item = SessionEvent;

    fn next(&mut self) -> Option<SessionEvent> {
        self.inner.pop_front()
    }
}
