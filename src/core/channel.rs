//! One-shot result channel between the grading child and the supervisor.
//!
//! An anonymous `O_CLOEXEC` pipe carries exactly one frame: an 8-byte
//! little-endian length followed by a JSON-encoded [`ChildReport`], the
//! [`GradeResult`] plus the child's setup notes. The
//! parent drains the pipe on a reader thread so a large frame never blocks
//! the child, and picks the decoded result up through a bounded crossbeam
//! channel with a deadline.

use crate::config::types::{GradeError, Result};
use crate::verdict::GradeResult;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Read, Write};
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::os::unix::io::RawFd;
use std::thread;
use std::time::Duration;

/// Frames larger than this are treated as corrupt.
pub const MAX_FRAME_BYTES: u64 = 64 * 1024 * 1024;

/// Everything the child sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildReport {
    pub result: GradeResult,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl ChildReport {
    pub fn new(result: GradeResult, notes: Vec<String>) -> Self {
        Self { result, notes }
    }
}

impl From<GradeResult> for ChildReport {
    fn from(result: GradeResult) -> Self {
        Self::new(result, Vec::new())
    }
}

/// Write half, owned by the child.
#[derive(Debug)]
pub struct ResultWriter {
    fd: OwnedFd,
}

/// Read half, owned by the parent until [`ResultReader::spawn`].
#[derive(Debug)]
pub struct ResultReader {
    fd: OwnedFd,
}

/// A reader thread that will yield at most one result.
#[derive(Debug)]
pub struct PendingResult {
    rx: Receiver<ChildReport>,
}

/// Create the pipe backing one grading request.
pub fn open() -> Result<(ResultReader, ResultWriter)> {
    let mut fds = [0 as libc::c_int; 2];
    let rc = unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) };
    if rc != 0 {
        return Err(GradeError::Channel(format!(
            "pipe2: {}",
            std::io::Error::last_os_error()
        )));
    }
    // Both descriptors are fresh and owned by nobody else.
    let (read, write) = unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) };
    Ok((ResultReader { fd: read }, ResultWriter { fd: write }))
}

/// Length-prefixed JSON encoding of one report.
pub fn encode_frame(report: &ChildReport) -> Result<Vec<u8>> {
    let payload = serde_json::to_vec(report)
        .map_err(|e| GradeError::Channel(format!("failed to encode result: {e}")))?;
    let mut frame = Vec::with_capacity(8 + payload.len());
    frame.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Read one frame. Short reads, oversized lengths and bad JSON are errors.
pub fn read_frame<R: Read>(source: &mut R) -> Result<ChildReport> {
    let mut header = [0u8; 8];
    source
        .read_exact(&mut header)
        .map_err(|e| GradeError::Channel(format!("missing frame header: {e}")))?;

    let len = u64::from_le_bytes(header);
    if len > MAX_FRAME_BYTES {
        return Err(GradeError::Channel(format!("frame of {len} bytes exceeds limit")));
    }

    let mut payload = vec![0u8; len as usize];
    source
        .read_exact(&mut payload)
        .map_err(|e| GradeError::Channel(format!("truncated frame: {e}")))?;

    serde_json::from_slice(&payload)
        .map_err(|e| GradeError::Channel(format!("failed to decode result: {e}")))
}

impl ResultWriter {
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Send the single report. Consumes the writer, closing the pipe.
    pub fn send(self, report: &ChildReport) -> Result<()> {
        let frame = encode_frame(report)?;
        let mut file = File::from(self.fd);
        file.write_all(&frame)?;
        file.flush()?;
        Ok(())
    }
}

impl ResultReader {
    pub fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }

    /// Start draining the pipe in the background.
    ///
    /// The parent must drop its [`ResultWriter`] first, otherwise a child
    /// that dies silently never produces EOF.
    pub fn spawn(self) -> Result<PendingResult> {
        let (tx, rx) = bounded(1);
        let mut file = File::from(self.fd);
        thread::Builder::new()
            .name("gradebox-result".to_string())
            .spawn(move || match read_frame(&mut file) {
                Ok(report) => {
                    let _ = tx.send(report);
                }
                Err(e) => log::debug!("result channel closed without a result: {}", e),
            })
            .map_err(|e| GradeError::Channel(format!("failed to spawn reader: {e}")))?;
        Ok(PendingResult { rx })
    }
}

impl PendingResult {
    /// Wait up to `grace` for the frame. `None` means the channel stayed empty.
    pub fn wait(self, grace: Duration) -> Option<ChildReport> {
        match self.rx.recv_timeout(grace) {
            Ok(report) => Some(report),
            Err(RecvTimeoutError::Timeout) => {
                log::debug!("no result frame within {:?}", grace);
                None
            }
            Err(RecvTimeoutError::Disconnected) => None,
        }
    }
}
