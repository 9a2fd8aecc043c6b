#![allow(dead_code)]

mod mock_link;
mod mock_server;

use std::cell::RefCell;
use std::rc::Rc;

pub use mock_link::MockLink;
pub use mock_server::MockService;
use program::{
    ApplyError, Config, FirmwareDescriptor, Flash, MemorySink, Observer, OrchestratorAction,
    UpdateOrchestrator,
};

#[derive(Default)]
pub struct FlashState {
    pub begun: usize,
    pub applied: Option<Vec<u8>>,
    pub reject_apply: bool,
    pub restarts: usize,
}

#[derive(Clone, Default)]
pub struct MockFlash {
    pub state: Rc<RefCell<FlashState>>,
}

impl Flash for MockFlash {
    type Sink = MemorySink;

    fn begin(&mut self, descriptor: &FirmwareDescriptor) -> Result<MemorySink, ApplyError> {
        self.state.borrow_mut().begun += 1;
        Ok(MemorySink::new(descriptor.total_size as usize))
    }

    fn apply(&mut self, image: MemorySink) -> Result<(), ApplyError> {
        let mut state = self.state.borrow_mut();
        if state.reject_apply {
            return Err(ApplyError("boot partition write-protected".into()));
        }
        state.applied = Some(image.into_inner());
        Ok(())
    }

    fn restart(&mut self) {
        self.state.borrow_mut().restarts += 1;
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub progress: Vec<(u32, u32)>,
    pub completed: Vec<bool>,
}

impl Observer for RecordingObserver {
    fn on_progress(&mut self, received: u32, total: u32) {
        self.progress.push((received, total));
    }

    fn on_complete(&mut self, success: bool) {
        self.completed.push(success);
    }
}

pub type Device = UpdateOrchestrator<MockLink, MockLink, MockFlash, RecordingObserver>;

pub struct Harness {
    pub device: Device,
    pub link: MockLink,
    pub flash: MockFlash,
    pub service: MockService,
    pub now: u64,
}

impl Harness {
    pub const TICK_MS: u64 = 10;

    pub fn new(config: Config, service: MockService) -> Self {
        let _ = env_logger::builder()
            .filter_level(log::LevelFilter::Trace)
            .is_test(true)
            .try_init();

        let link = MockLink::new();
        let flash = MockFlash::default();
        let device = UpdateOrchestrator::new(
            config,
            link.clone(),
            link.clone(),
            flash.clone(),
            RecordingObserver::default(),
        );

        Self {
            device,
            link,
            flash,
            service,
            now: 0,
        }
    }

    pub fn tick(&mut self) -> OrchestratorAction {
        self.now += Self::TICK_MS;
        let action = self.device.drive(self.now);
        for reply in self.service.serve(&self.link) {
            self.device.on_message(reply);
        }
        action
    }

    /// Ticks until the host is asked to reboot, returning every action seen.
    pub fn run(&mut self, max_ticks: usize) -> Vec<OrchestratorAction> {
        let mut actions = Vec::new();
        for _ in 0..max_ticks {
            let action = self.tick();
            actions.push(action);
            if action == OrchestratorAction::RebootRequested {
                break;
            }
        }
        actions
    }
}

pub fn image(size: usize) -> Vec<u8> {
    (0..size).map(|i| (i.wrapping_mul(31) ^ (i >> 8)) as u8).collect()
}

pub fn config(title: &str, version: &str) -> Config {
    Config {
        running_title: title.into(),
        running_version: version.into(),
        ..Config::default()
    }
}
