use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use program::{ConnectError, Connectivity, Message, Topic, Transport};

#[derive(Debug, thiserror::Error)]
#[error("link is down")]
pub struct LinkDown;

pub struct LinkState {
    pub connected: bool,
    pub reachable: bool,
    pub outbox: VecDeque<Message>,
    pub published: Vec<(Topic, Message)>,
}

/// Connection shared by the device's connectivity and transport halves.
#[derive(Clone)]
pub struct MockLink {
    pub state: Rc<RefCell<LinkState>>,
}

impl MockLink {
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(LinkState {
                connected: false,
                reachable: true,
                outbox: VecDeque::new(),
                published: Vec::new(),
            })),
        }
    }

    pub fn drop_connection(&self) {
        let mut state = self.state.borrow_mut();
        state.connected = false;
        state.reachable = false;
    }

    pub fn restore(&self) {
        self.state.borrow_mut().reachable = true;
    }

    pub fn take_outbox(&self) -> Vec<Message> {
        self.state.borrow_mut().outbox.drain(..).collect()
    }

    pub fn requested(&self) -> Vec<u32> {
        self.state
            .borrow()
            .published
            .iter()
            .filter_map(|(_, message)| match message {
                Message::ClientChunkRequest { chunk_index, .. } => Some(*chunk_index),
                _ => None,
            })
            .collect()
    }
}

impl Connectivity for MockLink {
    fn is_connected(&self) -> bool {
        self.state.borrow().connected
    }

    fn ensure_connected(&mut self) -> Result<(), ConnectError> {
        let mut state = self.state.borrow_mut();
        if state.reachable {
            state.connected = true;
            Ok(())
        } else {
            Err(ConnectError("broker unreachable".into()))
        }
    }
}

impl Transport for MockLink {
    type Error = LinkDown;

    fn publish(&mut self, topic: Topic, message: &Message) -> Result<(), Self::Error> {
        let mut state = self.state.borrow_mut();
        if !state.connected {
            return Err(LinkDown);
        }
        assert_eq!(topic, message.topic());
        state.outbox.push_back(message.clone());
        state.published.push((topic, message.clone()));
        Ok(())
    }
}
