//! One-time probe for hole punching support.
//!
//! Scrolling moves a buffer's window forward through its backing file and
//! relies on `fallocate(PUNCH_HOLE)` to give the pages behind it back to the
//! kernel. Without that the file would only ever grow, so when the probe
//! fails, scrolling is reported unsupported and callers fall back to redraws.

use super::BackingFile;
use super::defaults::PROBE_NAME;
use std::sync::OnceLock;

static CAN_PUNCH_HOLE: OnceLock<bool> = OnceLock::new();

/// Whether the backing store can release interior byte ranges.
///
/// Probed on first call by punching a 1-byte hole into a throwaway backing
/// file. The answer is cached for the lifetime of the process.
pub fn can_punch_hole() -> bool {
    *CAN_PUNCH_HOLE.get_or_init(probe)
}

/// Whether the scroll engine can be used in this process at all.
///
/// Always false on 32-bit targets: the display peer keeps the whole pool
/// range of every backing file mapped and there is not enough address space
/// for that.
pub fn scrolling_possible() -> bool {
    cfg!(target_pointer_width = "64") && can_punch_hole()
}

fn probe() -> bool {
    let result = BackingFile::create(PROBE_NAME, 1).and_then(|file| file.punch_hole(0, 1));

    match result {
        Ok(()) => {
            tracing::debug!("fallocate(PUNCH_HOLE) supported");
            true
        }
        Err(e) => {
            tracing::warn!(
                "fallocate(PUNCH_HOLE) not supported ({}): expect lower performance",
                e
            );
            false
        }
    }
}
