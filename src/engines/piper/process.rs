use std::borrow::Cow;
use std::io::{self, Read, Write};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::SynthesisError;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Run `command` to completion, feeding `stdin` and failing on a non-zero exit.
///
/// With a `timeout`, the child is killed once it has run that long.
pub(crate) fn run(
    mut command: Command,
    stdin: Option<&str>,
    timeout: Option<Duration>,
) -> Result<(), SynthesisError> {
    let program = command.get_program().to_string_lossy().into_owned();

    let mut child = command
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                SynthesisError::EngineUnavailable(format!("{program} not found"))
            } else {
                SynthesisError::Io(e)
            }
        })?;

    // Drain stderr concurrently so a chatty child never blocks on a full pipe.
    let stderr_reader = child.stderr.take().map(|mut stderr| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            buf
        })
    });

    // Fed from its own thread: a child that never reads must not stall the deadline.
    let stdin_writer = match (stdin, child.stdin.take()) {
        (Some(text), Some(mut pipe)) => {
            let payload = canonicalize_stdin_payload(text).into_owned();
            Some(thread::spawn(move || pipe.write_all(payload.as_bytes())))
        }
        _ => None,
    };

    let status = match timeout {
        Some(limit) => wait_with_deadline(&mut child, limit)?,
        None => Some(child.wait()?),
    };

    let stderr = stderr_reader
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();

    if let Some(Ok(Err(e))) = stdin_writer.map(|writer| writer.join()) {
        // A broken pipe means the child quit early; its exit status tells why.
        if status.is_some() && e.kind() != io::ErrorKind::BrokenPipe {
            return Err(SynthesisError::Io(e));
        }
    }

    match status {
        Some(status) if status.success() => Ok(()),
        Some(status) => Err(SynthesisError::ProcessFailed(format!(
            "{program} exited with code {:?}: {}",
            status.code(),
            stderr.trim()
        ))),
        None => Err(SynthesisError::Timeout(timeout.unwrap_or_default())),
    }
}

/// `None` when the child had to be killed.
fn wait_with_deadline(child: &mut Child, limit: Duration) -> io::Result<Option<ExitStatus>> {
    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            log::warn!("Killing synthesis process {} after {limit:?}", child.id());
            child.kill()?;
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Piper reads stdin line by line; an unterminated last line may be dropped.
fn canonicalize_stdin_payload(input: &str) -> Cow<'_, str> {
    if input.ends_with('\n') {
        Cow::Borrowed(input)
    } else {
        Cow::Owned(format!("{input}\n"))
    }
}
