use protocol::{FirmwareDescriptor, FirmwareIdentity};

/// Only title equality and version inequality are checked, so downgrades are allowed.
pub fn is_update_needed(running: &FirmwareIdentity, announced: &FirmwareDescriptor) -> bool {
    running.title == announced.title && running.version != announced.version
}
