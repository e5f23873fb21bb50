/// Child-side hardening applied before any submission code runs
///
/// Order inside the forked child:
/// 1. prctl(PR_SET_PDEATHSIG, SIGKILL)
/// 2. SIGTERM/SIGINT back to their default disposition
/// 3. close inherited descriptors except stdio and the result channel
/// 4. spawn the runner thread
/// 5. rlimit set (CPU, address space, core, open files)
///
/// Every step is best effort: failures are recorded in [`SetupNotes`] and the
/// child carries on, relying on the parent's wall-clock deadline. Nothing here
/// logs. Another host thread may have held the logger's lock at fork time,
/// and in the child that lock is never released.
use crate::config::types::{GradeError, GradeLimits, Result};
use std::fs;
use std::os::unix::io::RawFd;

/// Open-file ceiling inside the child. Stdio plus the channel fit easily.
pub const CHILD_NOFILE_LIMIT: u64 = 16;

/// Diagnostics collected in the child, shipped back with the result frame and
/// logged by the supervisor.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SetupNotes(Vec<String>);

impl SetupNotes {
    pub fn push(&mut self, note: impl Into<String>) {
        self.0.push(note.into());
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0
    }
}

/// The rlimit values derived from a [`GradeLimits`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildLimits {
    pub cpu_secs: u64,
    pub address_space_bytes: u64,
    pub nofile: u64,
}

impl ChildLimits {
    /// `footprint_bytes` is the child's address space at the time the
    /// limits are applied; the submission gets `mem_limit_mb` on top.
    pub fn derive(limits: &GradeLimits, footprint_bytes: u64) -> Self {
        Self {
            cpu_secs: limits.cpu_limit_secs,
            address_space_bytes: footprint_bytes.saturating_add(limits.mem_limit_bytes()),
            nofile: CHILD_NOFILE_LIMIT,
        }
    }
}

fn apply_rlimit_value(
    name: &str,
    resource: libc::__rlimit_resource_t,
    value: u64,
    notes: &mut SetupNotes,
) -> bool {
    let limit = libc::rlimit {
        rlim_cur: value as libc::rlim_t,
        rlim_max: value as libc::rlim_t,
    };

    let rc = unsafe { libc::setrlimit(resource, &limit) };
    if rc == 0 {
        return true;
    }

    notes.push(format!(
        "Failed to apply {}={}: {}",
        name,
        value,
        std::io::Error::last_os_error()
    ));
    false
}

/// Current virtual memory size of this process, from /proc/self/statm.
pub fn address_space_footprint() -> Result<u64> {
    let statm = fs::read_to_string("/proc/self/statm")
        .map_err(|e| GradeError::Process(format!("Failed to read /proc/self/statm: {}", e)))?;
    let pages: u64 = statm
        .split_whitespace()
        .next()
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| GradeError::Process(format!("Malformed /proc/self/statm: {:?}", statm)))?;

    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page_size = if page_size > 0 { page_size as u64 } else { 4096 };
    Ok(pages.saturating_mul(page_size))
}

/// Apply the rlimit set. Returns how many limits took effect.
pub fn apply_resource_limits(limits: &ChildLimits, notes: &mut SetupNotes) -> usize {
    let applied = [
        apply_rlimit_value("RLIMIT_CPU", libc::RLIMIT_CPU, limits.cpu_secs, notes),
        apply_rlimit_value("RLIMIT_AS", libc::RLIMIT_AS, limits.address_space_bytes, notes),
        apply_rlimit_value("RLIMIT_CORE", libc::RLIMIT_CORE, 0, notes),
        apply_rlimit_value("RLIMIT_NOFILE", libc::RLIMIT_NOFILE, limits.nofile, notes),
    ];
    applied.iter().filter(|ok| **ok).count()
}

/// Child receives SIGKILL if the grading process dies first.
pub fn setup_parent_death_signal(notes: &mut SetupNotes) {
    #[cfg(target_os = "linux")]
    {
        let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGKILL, 0, 0, 0) };
        if rc != 0 {
            notes.push(format!(
                "Failed to set parent death signal: {}",
                std::io::Error::last_os_error()
            ));
        }
    }
}

/// Undo any handlers inherited from the host so SIGTERM really terminates.
pub fn reset_termination_signals(notes: &mut SetupNotes) {
    use nix::sys::signal::{signal, SigHandler, Signal};

    for sig in [Signal::SIGTERM, Signal::SIGINT] {
        if let Err(e) = unsafe { signal(sig, SigHandler::SigDfl) } {
            notes.push(format!("Failed to reset {}: {}", sig, e));
        }
    }
}

/// Close every descriptor above stderr except `keep`.
pub fn close_inherited_fds(keep: RawFd, notes: &mut SetupNotes) -> usize {
    let fds = match open_fds() {
        Ok(fds) => fds,
        Err(e) => {
            notes.push(format!("Skipping descriptor closure: {}", e));
            return 0;
        }
    };

    let mut closed = 0;
    for fd in fds {
        if fd > 2 && fd != keep {
            if unsafe { libc::close(fd) } == 0 {
                closed += 1;
            }
        }
    }
    closed
}

/// Descriptors open in this process, sorted.
pub fn open_fds() -> Result<Vec<RawFd>> {
    let fd_dir = "/proc/self/fd";

    let entries = fs::read_dir(fd_dir)
        .map_err(|e| GradeError::Process(format!("Failed to read {}: {}", fd_dir, e)))?;

    // Collect first: the directory handle itself shows up in the listing.
    let mut fds: Vec<RawFd> = entries
        .flatten()
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter_map(|name| name.parse().ok())
        .collect();

    fds.sort_unstable();
    Ok(fds)
}

/// Process-level hardening, run first thing after fork.
pub fn prepare_child(channel_fd: RawFd) -> SetupNotes {
    let mut notes = SetupNotes::default();
    setup_parent_death_signal(&mut notes);
    reset_termination_signals(&mut notes);
    let closed = close_inherited_fds(channel_fd, &mut notes);
    notes.push(format!("closed {} inherited descriptors", closed));
    notes
}

/// Resource ceilings. Run on the runner thread so its stack is part of
/// the measured footprint.
pub fn apply_child_limits(limits: &GradeLimits, notes: &mut SetupNotes) {
    let footprint = address_space_footprint().unwrap_or_else(|e| {
        notes.push(e.to_string());
        0
    });
    let derived = ChildLimits::derive(limits, footprint);
    let applied = apply_resource_limits(&derived, notes);
    notes.push(format!("applied {}/4 resource limits: {:?}", applied, derived));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_adds_headroom_to_footprint() {
        let limits = GradeLimits::default();
        let derived = ChildLimits::derive(&limits, 10 * 1024 * 1024);
        assert_eq!(derived.address_space_bytes, 138 * 1024 * 1024);
        assert_eq!(derived.cpu_secs, 3);
        assert_eq!(derived.nofile, CHILD_NOFILE_LIMIT);
    }

    #[test]
    fn test_derive_saturates() {
        let limits = GradeLimits {
            mem_limit_mb: u64::MAX,
            ..GradeLimits::default()
        };
        assert_eq!(ChildLimits::derive(&limits, 1).address_space_bytes, u64::MAX);
    }

    #[test]
    fn test_footprint_is_nonzero() {
        assert!(address_space_footprint().unwrap() > 0);
    }

    #[test]
    fn test_setup_failures_are_recorded_not_logged() {
        let mut notes = SetupNotes::default();
        assert!(!apply_rlimit_value("RLIMIT_BOGUS", 9999 as libc::__rlimit_resource_t, 1, &mut notes));
        let notes = notes.into_vec();
        assert_eq!(notes.len(), 1);
        assert!(notes[0].starts_with("Failed to apply RLIMIT_BOGUS=1"), "{:?}", notes);
    }

    #[test]
    fn test_open_fds_includes_stdio() {
        let fds = open_fds().unwrap();
        assert!(fds.contains(&0));
        assert!(fds.contains(&1));
        assert!(fds.contains(&2));
    }
}
