use std::io::Read;
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::error::PdfLightenError;

/// One labelled attempt in an ordered fallback chain.
pub type Attempt<'a, T> = (String, Box<dyn FnOnce() -> crate::error::Result<T> + 'a>);

/// Outcome of a fallback chain: the winning strategy's label plus its value.
#[derive(Debug)]
pub struct ChainOutcome<T> {
    pub label: String,
    pub value: T,
}

/// Run attempts in order and return the first success.
///
/// Each attempt is tried to exhaustion before the next; failures are
/// logged with their reason and collected. When every attempt fails the
/// error aggregates all attempt messages so the caller sees the whole
/// chain, not just the last failure.
pub fn run_fallback_chain<'a, T>(
    operation: &str,
    attempts: Vec<Attempt<'a, T>>,
) -> crate::error::Result<ChainOutcome<T>> {
    let mut failures: Vec<String> = Vec::new();

    for (label, attempt) in attempts {
        match attempt() {
            Ok(value) => {
                if !failures.is_empty() {
                    info!(operation, strategy = %label, "fallback strategy succeeded");
                }
                return Ok(ChainOutcome { label, value });
            }
            Err(e) => {
                warn!(operation, strategy = %label, error = %e, "strategy failed, falling back");
                failures.push(format!("{label}: {e}"));
            }
        }
    }

    Err(PdfLightenError::processor_failed(operation, failures))
}

/// Captured result of a bounded external invocation.
pub struct CmdOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stderr: String,
}

/// Run a command with a wall-clock bound. A process still alive at the
/// deadline is killed and reported as a failure, never left hanging.
///
/// stderr goes through a temp file rather than a pipe so polling cannot
/// deadlock on a full pipe buffer.
pub fn run_with_timeout(cmd: &mut Command, timeout: Duration) -> crate::error::Result<CmdOutput> {
    let mut stderr_file = tempfile::tempfile()?;

    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::from(stderr_file.try_clone()?))
        .spawn()?;

    let deadline = Instant::now() + timeout;
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(PdfLightenError::processor_failed(
                "bounded invocation",
                vec![format!("timed out after {}s", timeout.as_secs())],
            ));
        }
        std::thread::sleep(Duration::from_millis(50));
    };

    use std::io::Seek;
    stderr_file.seek(std::io::SeekFrom::Start(0))?;
    let mut stderr = String::new();
    stderr_file.read_to_string(&mut stderr)?;

    Ok(CmdOutput {
        success: status.success(),
        code: status.code(),
        stderr: stderr.trim().to_string(),
    })
}

/// Success predicate shared by the processor invokers: the process must
/// exit cleanly *and* the output file must actually exist.
pub fn check_produced(output: &Path, stderr: &str, code: Option<i32>) -> crate::error::Result<()> {
    if !output.exists() {
        let detail = if stderr.is_empty() {
            format!("exit code {}", code.map_or("unknown".into(), |c| c.to_string()))
        } else {
            stderr.to_string()
        };
        return Err(PdfLightenError::processor_failed(
            "external processor",
            vec![format!("no output file produced: {detail}")],
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn first_success_wins_and_later_attempts_never_run() {
        let third_ran = Cell::new(false);

        let attempts: Vec<Attempt<'_, u32>> = vec![
            (
                "strategy 1".into(),
                Box::new(|| Err(PdfLightenError::processor_unavailable("boom"))),
            ),
            ("strategy 2".into(), Box::new(|| Ok(42))),
            (
                "strategy 3".into(),
                Box::new(|| {
                    third_ran.set(true);
                    Ok(0)
                }),
            ),
        ];

        let outcome = run_fallback_chain("test op", attempts).expect("chain should succeed");
        assert_eq!(outcome.label, "strategy 2");
        assert_eq!(outcome.value, 42);
        assert!(!third_ran.get(), "strategy 3 must never be attempted");
    }

    #[test]
    fn exhausted_chain_aggregates_all_messages() {
        let attempts: Vec<Attempt<'_, ()>> = vec![
            (
                "a".into(),
                Box::new(|| Err(PdfLightenError::processor_unavailable("first reason"))),
            ),
            (
                "b".into(),
                Box::new(|| Err(PdfLightenError::processor_unavailable("second reason"))),
            ),
        ];

        let err = run_fallback_chain("test op", attempts).unwrap_err();
        match err {
            PdfLightenError::ProcessorFailed { operation, attempts } => {
                assert_eq!(operation, "test op");
                assert_eq!(attempts.len(), 2);
                assert!(attempts[0].contains("a:") && attempts[0].contains("first reason"));
                assert!(attempts[1].contains("b:") && attempts[1].contains("second reason"));
            }
            other => panic!("expected ProcessorFailed, got: {other}"),
        }
    }

    #[test]
    fn timeout_kills_the_process() {
        let mut cmd = Command::new("sleep");
        cmd.arg("30");
        let start = Instant::now();
        let result = run_with_timeout(&mut cmd, Duration::from_millis(200));
        assert!(result.is_err(), "sleep 30 must be reported as a failure");
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn fast_command_completes_within_bound() {
        let mut cmd = Command::new("true");
        let out = run_with_timeout(&mut cmd, Duration::from_secs(5)).expect("true should run");
        assert!(out.success);
    }
}
