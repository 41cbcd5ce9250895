use std::collections::BTreeSet;

/// Bytes in one MiB, the unit `nvidia-smi` reports framebuffer memory in.
pub const MIB: u64 = 1 << 20;

/// A single GPU as reported by one diagnostics run.
///
/// `index` is the zero-based position in the tool's enumeration order and is
/// the only way selectors refer to a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    pub index: u32,
    pub free_memory: u64,
    pub total_memory: u64,
    pub pids: BTreeSet<u32>,
}

impl Device {
    /// A device is free when no process is attached to it, regardless of
    /// how much memory is in use.
    pub fn is_free(&self) -> bool {
        self.pids.is_empty()
    }
}
