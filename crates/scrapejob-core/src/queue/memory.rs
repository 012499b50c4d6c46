//! Resident memory of the current process, for admission control.

use std::sync::Mutex;

use sysinfo::{Pid, ProcessesToUpdate, System};

pub(super) struct MemoryProbe {
    system: Mutex<System>,
    pid: Pid,
}

impl MemoryProbe {
    pub(super) fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            pid: Pid::from_u32(std::process::id()),
        }
    }

    /// Resident set size in bytes, or `None` if the process could not be inspected.
    pub(super) fn resident_bytes(&self) -> Option<u64> {
        let mut sys = self.system.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_processes(ProcessesToUpdate::Some(&[self.pid]), true);
        sys.process(self.pid).map(|p| p.memory())
    }
}
