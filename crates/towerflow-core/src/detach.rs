//! Follow a director deploy until its task has started
//!
//! The director keeps working on a task once it has been submitted, so a
//! self-update run only needs to see the task start before it can exit.

use crate::error::{Result, TowerError};
use std::io::Write;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

/// Line printed by the director CLI once the deploy task is running
pub const TASK_STARTED_MARKER: &str = "Preparing deployment";

pub const DETACH_NOTICE: &str = "Task started, detaching output\n";

/// Forward `stdout` line by line until a line contains the task-started
/// marker, then return without reading further.
///
/// Lines are forwarded as raw bytes; output that is not valid UTF-8 is
/// passed through untouched.
///
/// Reaching the end of the stream first means the command exited before
/// starting its task, which fails with [`TowerError::DetachFailed`].
pub async fn monitor_detached<R, W>(stdout: R, out: &mut W, command: &str) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let mut reader = BufReader::new(stdout);
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        out.write_all(&line)?;
        if !line.ends_with(b"\n") {
            out.write_all(b"\n")?;
        }

        if String::from_utf8_lossy(&line).contains(TASK_STARTED_MARKER) {
            out.write_all(DETACH_NOTICE.as_bytes())?;
            out.flush()?;
            tracing::info!("Detected task start, detaching from: {}", command);
            return Ok(());
        }
    }

    out.flush()?;
    Err(TowerError::DetachFailed {
        command: command.to_string(),
    })
}

/// Spawn `cmd` with stderr passed through and hand its stdout to
/// [`monitor_detached`], forwarding to `out`.
///
/// The child is left running on success; nothing waits for it.
pub async fn run_detached<W: Write>(
    mut cmd: Command,
    description: &str,
    out: &mut W,
) -> Result<()> {
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::inherit());

    tracing::debug!("Running detached: {}", description);

    let mut child = cmd.spawn()?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| TowerError::tool("bosh", "child stdout was not captured"))?;

    monitor_detached(stdout, out, description).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncWriteExt, duplex};

    #[tokio::test]
    async fn test_detaches_on_marker_without_waiting_for_exit() {
        let (mut writer, reader) = duplex(1024);
        writer
            .write_all(b"Using environment '10.0.0.6'\nTask 42\nTask 42 | 10:00:00 | Preparing deployment: Preparing deployment\n")
            .await
            .unwrap();

        let mut forwarded = Vec::new();
        // `writer` stays open: the command is still running
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            monitor_detached(reader, &mut forwarded, "bosh deploy"),
        )
        .await
        .expect("monitor should not wait for the command to exit");

        result.unwrap();
        let forwarded = String::from_utf8(forwarded).unwrap();
        let lines: Vec<&str> = forwarded.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[2].contains("Preparing deployment"));
        assert_eq!(lines[3], "Task started, detaching output");
        drop(writer);
    }

    #[tokio::test]
    async fn test_non_utf8_output_is_forwarded_raw() {
        let (mut writer, reader) = duplex(1024);
        writer
            .write_all(b"Task 42 | caf\xe9 output\nTask 42 | Preparing deployment\n")
            .await
            .unwrap();

        let mut forwarded = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(5),
            monitor_detached(reader, &mut forwarded, "bosh deploy"),
        )
        .await
        .unwrap()
        .unwrap();

        assert!(forwarded.starts_with(b"Task 42 | caf\xe9 output\n"));
        assert!(forwarded.ends_with(DETACH_NOTICE.as_bytes()));
        drop(writer);
    }

    #[tokio::test]
    async fn test_exit_before_marker_fails() {
        let (mut writer, reader) = duplex(1024);
        writer
            .write_all(b"Using environment '10.0.0.6'\nDeployment 'concourse' not found\n")
            .await
            .unwrap();
        drop(writer);

        let mut forwarded = Vec::new();
        let err = monitor_detached(reader, &mut forwarded, "bosh-cli deploy concourse.yml")
            .await
            .unwrap_err();

        assert!(matches!(err, TowerError::DetachFailed { .. }));
        assert_eq!(
            err.to_string(),
            "Didn't detect successful task start in BOSH command: bosh-cli deploy concourse.yml"
        );
        assert_eq!(String::from_utf8(forwarded).unwrap().lines().count(), 2);
    }
}
