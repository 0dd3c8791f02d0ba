//! `sysinfo`-backed probe. Each reading builds a fresh `System`, so no state is shared between calls.

use anyhow::{Result, anyhow};
use log::debug;
use sysinfo::{MemoryRefreshKind, Pid, ProcessRefreshKind, ProcessesToUpdate, System};

use super::MemoryProbe;

#[derive(Clone, Debug)]
pub struct SysinfoProbe {
    pid: Pid,
}

impl SysinfoProbe {
    /// Fails on platforms sysinfo does not support or when the current pid is unavailable.
    pub fn new() -> Result<Self> {
        if !sysinfo::IS_SUPPORTED_SYSTEM {
            return Err(anyhow!("sysinfo does not support this platform"));
        }
        let pid = sysinfo::get_current_pid().map_err(|e| anyhow!("current pid: {e}"))?;
        debug!("Memory probe attached to pid {}", pid);
        Ok(Self { pid })
    }
}

impl MemoryProbe for SysinfoProbe {
    fn available_memory(&self) -> Result<u64> {
        let mut sys = System::new();
        sys.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
        let available = sys.available_memory();
        if available == 0 && sys.total_memory() == 0 {
            return Err(anyhow!("host reported no memory information"));
        }
        Ok(available)
    }

    fn process_bytes_read(&self) -> Result<u64> {
        let mut sys = System::new();
        sys.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[self.pid]),
            false,
            ProcessRefreshKind::nothing().with_disk_usage(),
        );
        let process = sys
            .process(self.pid)
            .ok_or_else(|| anyhow!("process {} not visible to sysinfo", self.pid))?;
        Ok(process.disk_usage().total_read_bytes)
    }
}
