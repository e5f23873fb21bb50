use crate::config::types::{GradeError, GradeLimits, Result};
use crate::core::channel::{self, ChildReport, ResultWriter};
use crate::core::limits;
use crate::core::runner::{self, EXIT_CHANNEL, EXIT_FAILED, EXIT_REJECTED};
use crate::core::types::{describe_exit, KillReport, LaunchOutcome};
use crate::observability::audit::{self, Correlation};
use crate::problem::Problem;
use crate::verdict::GradeResult;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, getpid, getppid, ForkResult, Pid};
use std::time::{Duration, Instant};

/// How often the parent polls the child while waiting.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

fn to_process_error(prefix: &str, err: impl std::fmt::Display) -> GradeError {
    GradeError::Process(format!("{prefix}: {err}"))
}

/// Exit details of a reaped child.
#[derive(Debug, Default, Clone, Copy)]
struct ChildExit {
    code: Option<i32>,
    signal: Option<i32>,
}

impl ChildExit {
    fn from_status(status: WaitStatus) -> Option<Self> {
        match status {
            WaitStatus::Exited(_, code) => Some(Self {
                code: Some(code),
                signal: None,
            }),
            WaitStatus::Signaled(_, sig, _) => Some(Self {
                code: None,
                signal: Some(sig as i32),
            }),
            _ => None,
        }
    }
}

/// Non-blocking reap. `Ok(None)` while the child is still running.
fn try_reap(child: Pid) -> Result<Option<ChildExit>> {
    loop {
        match waitpid(child, Some(WaitPidFlag::WNOHANG)) {
            Ok(WaitStatus::StillAlive) => return Ok(None),
            Ok(status) => {
                if let Some(exit) = ChildExit::from_status(status) {
                    return Ok(Some(exit));
                }
                // Stopped/continued: still ours to wait for.
                return Ok(None);
            }
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(to_process_error("waitpid(child)", e)),
        }
    }
}

/// Blocking reap, used once SIGKILL has been sent.
fn reap_blocking(child: Pid) -> ChildExit {
    loop {
        match waitpid(child, None) {
            Ok(status) => {
                if let Some(exit) = ChildExit::from_status(status) {
                    return exit;
                }
            }
            Err(Errno::EINTR) => continue,
            Err(e) => {
                log::warn!("waitpid({}) failed while reaping: {}", child, e);
                return ChildExit::default();
            }
        }
    }
}

/// SIGKILL and reap, for when supervision itself has failed.
fn abandon_child(child: Pid) -> ChildExit {
    let _ = kill(child, Signal::SIGKILL);
    reap_blocking(child)
}

/// SIGTERM, wait up to `grace`, then SIGKILL and reap.
fn terminate_child(child: Pid, grace: Duration) -> (KillReport, ChildExit) {
    let mut report = KillReport::default();
    let start = Instant::now();

    match kill(child, Signal::SIGTERM) {
        Ok(()) => report.term_sent = true,
        Err(e) => report.notes.push(format!("SIGTERM failed: {}", e)),
    }

    let mut exit = None;
    while start.elapsed() < grace {
        match try_reap(child) {
            Ok(Some(reaped)) => {
                exit = Some(reaped);
                break;
            }
            Ok(None) => std::thread::sleep(POLL_INTERVAL),
            Err(e) => {
                report.notes.push(e.to_string());
                break;
            }
        }
    }

    let exit = match exit {
        Some(exit) => exit,
        None => {
            match kill(child, Signal::SIGKILL) {
                Ok(()) => report.kill_sent = true,
                Err(e) => report.notes.push(format!("SIGKILL failed: {}", e)),
            }
            reap_blocking(child)
        }
    };

    report.waited_ms = start.elapsed().as_millis() as u64;
    (report, exit)
}

/// Body of the forked child. Never returns. Nothing in here may log.
fn child_main(
    problem: &Problem,
    code: &str,
    grade_limits: &GradeLimits,
    writer: ResultWriter,
    supervisor: Pid,
) -> ! {
    let mut notes = limits::prepare_child(writer.as_raw_fd());
    // The supervisor may have died before PR_SET_PDEATHSIG took effect.
    if getppid() != supervisor {
        unsafe { libc::_exit(EXIT_FAILED) }
    }

    let (problem, code, grade_limits) = (problem.clone(), code.to_string(), grade_limits.clone());
    let graded = runner::on_runner_stack(move || {
        limits::apply_child_limits(&grade_limits, &mut notes);
        let (result, exit_code) = runner::grade_in_process(&problem, &code, &grade_limits);
        (ChildReport::new(result, notes.into_vec()), exit_code)
    });

    let (report, exit_code) = graded.unwrap_or_else(|panic| {
        (
            GradeResult::error(format!("ERROR: InternalError: {panic}")).into(),
            EXIT_FAILED,
        )
    });

    let status = match writer.send(&report) {
        Ok(()) => exit_code,
        Err(_) => EXIT_CHANNEL,
    };
    unsafe { libc::_exit(status) }
}

/// Grade `code` against `problem` in a fresh child process.
///
/// Fails only when the child could not be started or supervised; every
/// outcome of the submission itself is carried in [`LaunchOutcome::result`].
pub fn launch(problem: &Problem, code: &str, limits: &GradeLimits) -> Result<LaunchOutcome> {
    launch_with_correlation(problem, code, limits, &Correlation::new(problem.id.as_str()))
}

fn launch_with_correlation(
    problem: &Problem,
    code: &str,
    grade_limits: &GradeLimits,
    correlation: &Correlation,
) -> Result<LaunchOutcome> {
    audit::submission_received(correlation, code.len());

    let (reader, writer) = channel::open()?;
    let supervisor = getpid();

    // The child only touches its own copies of the inputs and leaves via _exit.
    let fork_result = unsafe { fork() }.map_err(|e| to_process_error("fork(child)", e))?;
    let child = match fork_result {
        ForkResult::Child => {
            drop(reader);
            child_main(problem, code, grade_limits, writer, supervisor)
        }
        ForkResult::Parent { child } => child,
    };

    drop(writer);
    let correlation = correlation.clone().with_child_pid(child.as_raw());
    let started = Instant::now();

    let pending = match reader.spawn() {
        Ok(pending) => pending,
        Err(e) => {
            abandon_child(child);
            return Err(e);
        }
    };

    let deadline = grade_limits.wall_time();
    let mut timed_out = false;
    let mut kill_report = None;

    let exit = loop {
        match try_reap(child) {
            Ok(Some(exit)) => break exit,
            Ok(None) => {}
            Err(e) => {
                abandon_child(child);
                return Err(e);
            }
        }
        if started.elapsed() >= deadline {
            timed_out = true;
            let (report, exit) = terminate_child(child, grade_limits.kill_grace());
            kill_report = Some(report);
            break exit;
        }
        std::thread::sleep(POLL_INTERVAL);
    };
    let wall_time = started.elapsed();

    let result = if timed_out {
        audit::wall_time_limit_violation(
            &correlation,
            wall_time.as_millis() as u64,
            deadline.as_millis() as u64,
        );
        if let Some(report) = kill_report.as_ref().filter(|r| r.kill_sent) {
            audit::forced_kill(
                &correlation,
                format!("child ignored SIGTERM for {} ms", report.waited_ms),
            );
        }
        GradeResult::tle()
    } else {
        match pending.wait(grade_limits.result_grace()) {
            Some(report) => {
                for note in &report.notes {
                    log::debug!("child {}: {}", child, note);
                }
                report.result
            }
            None => {
                audit::no_result_returned(&correlation, describe_exit(exit.code, exit.signal));
                GradeResult::no_result()
            }
        }
    };

    if exit.code == Some(EXIT_REJECTED) {
        audit::submission_rejected(&correlation, result.error_message().unwrap_or_default());
    }
    audit::grading_completed(
        &correlation,
        result.status(),
        format!("wall_ms={}", wall_time.as_millis()),
    );

    Ok(LaunchOutcome {
        child_pid: child.as_raw(),
        result,
        exit_code: exit.code,
        term_signal: exit.signal,
        wall_time,
        timed_out,
        kill_report,
    })
}

/// Grade a submission. Always produces exactly one terminal result.
pub fn grade(problem: &Problem, code: &str, limits: &GradeLimits) -> GradeResult {
    let correlation = Correlation::new(problem.id.as_str());
    match launch_with_correlation(problem, code, limits, &correlation) {
        Ok(outcome) => outcome.result,
        Err(e) => {
            log::error!("grading '{}' failed to start: {}", problem.id, e);
            audit::launch_failed(&correlation, &e);
            GradeResult::error(format!("Failed to start grader: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::problem::ProblemBank;

    fn fib() -> Problem {
        ProblemBank::builtin().get("fibonacci").unwrap().clone()
    }

    #[test]
    fn test_template_solution_passes() {
        let problem = fib();
        let outcome = launch(&problem, &problem.template_code, &GradeLimits::default()).unwrap();
        assert!(outcome.result.all_passed(), "{:?}", outcome.result);
        assert_eq!(outcome.exit_code, Some(0));
        assert!(!outcome.timed_out);
        assert!(outcome.kill_report.is_none());
    }

    #[test]
    fn test_rejected_submission_exit_code() {
        let outcome = launch(&fib(), "import os\n", &GradeLimits::default()).unwrap();
        assert_eq!(outcome.exit_code, Some(EXIT_REJECTED));
        assert_eq!(
            outcome.result,
            GradeResult::error("Import statements are not allowed")
        );
    }

    #[test]
    fn test_timeout_escalates_and_reaps() {
        let limits = GradeLimits::default().with_overrides(Some(0.3), None);
        let outcome = launch(&fib(), "def fib(n):\n    while True:\n        pass\n", &limits).unwrap();
        assert!(outcome.timed_out);
        assert_eq!(outcome.result, GradeResult::tle());
        assert!(outcome.kill_report.as_ref().unwrap().term_sent);
        assert!(outcome.exit_code.is_some() || outcome.term_signal.is_some());
        assert_eq!(
            kill(Pid::from_raw(outcome.child_pid), None),
            Err(Errno::ESRCH)
        );
    }

    #[test]
    fn test_abandoned_child_is_killed_and_reaped() {
        let child = match unsafe { fork() }.unwrap() {
            ForkResult::Child => loop {
                unsafe { libc::pause() };
            },
            ForkResult::Parent { child } => child,
        };
        let exit = abandon_child(child);
        assert_eq!(exit.signal, Some(Signal::SIGKILL as i32));
        assert_eq!(kill(child, None), Err(Errno::ESRCH));
    }

    #[test]
    fn test_describe_exit_matches_status() {
        let outcome = launch(&fib(), "def fib(n):\n    return n\n", &GradeLimits::default()).unwrap();
        assert_eq!(outcome.describe_exit(), "exit code 0");
        assert_eq!(outcome.result.summary().unwrap().total, 4);
    }
}
