//! Task Executor: the wire contract for the isolated regex substitution process,
//! plus the regex-application logic the executor-worker binary runs.
//!
//! # Isolation requirement
//!
//! The executor must be stoppable unilaterally by the pool, without leaving
//! stranded resources in the parent and without requiring cooperation from
//! the executed regex. A same-thread interruptible try/catch is **not**
//! sufficient: pathological backtracking is uninterruptible on most regex
//! engines, including `fancy-regex` used here. This crate therefore realises
//! the executor as a dedicated OS process (see `core::worker_pool::worker`),
//! which the pool can `SIGKILL` unconditionally on deadline or crash. An
//! in-process-thread realisation on a regex engine without interrupt support
//! cannot reproduce this guarantee and must not be substituted silently.

use std::io::{self, Read, Write};

use fancy_regex::Regex;
use serde::{Deserialize, Serialize};

/// One substitution command as it travels over the executor wire protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireCommand {
    /// The regex pattern, already unescaped by the orchestrator.
    pub pattern: String,
    /// Raw flag string (e.g. `"gi"`); the executor re-derives compile options from it.
    pub flags: String,
    /// The replacement text, already unescaped and backreference-translated
    /// to the host engine's syntax (`$1` rather than `\1`).
    pub replacement: String,
}

/// Request sent to the executor process: `{initial_text, commands, include_performance}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorRequest {
    /// Text to apply the substitution to.
    pub initial_text: String,
    /// Always length one: the pool dispatches one command per task.
    pub commands: Vec<WireCommand>,
    /// Whether the executor should self-report its wall-clock duration.
    pub include_performance: bool,
}

/// Response received from the executor process: `{result, performance_ms, error}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorResponse {
    /// The substituted text (meaningless if `error` is set).
    pub result: String,
    /// Self-reported duration in milliseconds, present only if requested and successful.
    pub performance_ms: Option<u64>,
    /// Present when compilation or application failed.
    pub error: Option<String>,
}

/// Write one length-prefixed JSON frame: a 4-byte big-endian length, then the bytes.
///
/// # Errors
/// Returns an error if serialization or the underlying write fails.
pub fn write_frame<W: Write, T: Serialize>(writer: &mut W, value: &T) -> io::Result<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    let len = u32::try_from(bytes.len()).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(&bytes)?;
    writer.flush()
}

/// Read one length-prefixed JSON frame. Returns `Ok(None)` cleanly on EOF
/// (the peer closed the stream, e.g. on clean shutdown).
///
/// # Errors
/// Returns an error if the underlying read fails or the frame does not parse.
pub fn read_frame<R: Read, T: for<'de> Deserialize<'de>>(reader: &mut R) -> io::Result<Option<T>> {
    let mut len_buf = [0_u8; 4];
    match reader.read_exact(&mut len_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut buf = vec![0_u8; len];
    reader.read_exact(&mut buf)?;
    let value = serde_json::from_slice(&buf).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(Some(value))
}

fn compile_options(raw_flags: &str) -> (bool, bool, bool) {
    // (case_insensitive, multiline, dot_matches_new_line)
    let case_insensitive = raw_flags.contains('i');
    let multiline = raw_flags.contains('m');
    let dot_all = raw_flags.contains('s');
    (case_insensitive, multiline, dot_all)
}

/// Compile `pattern`/`flags` and apply `replacement` to `text`, returning the
/// substituted text or a compilation error message.
///
/// `replacement` is applied exactly as received: per specification §4.A, all
/// escape-decoding and backreference-syntax translation happen upstream, in
/// the orchestrator's escape-decode step (see `util::escape`), before a
/// request ever reaches here.
///
/// This is the executor's entire business logic; it is exercised both by
/// `src/bin/regex_executor.rs` in a real subprocess and directly in this
/// crate's unit tests, without needing to spawn anything.
///
/// # Errors
/// Returns `Err` with a human-readable message if the pattern fails to compile.
pub fn apply(command: &WireCommand, text: &str) -> Result<String, String> {
    let (case_insensitive, multiline, dot_all) = compile_options(&command.flags);
    let global = command.flags.contains('g');

    let mut pattern = String::new();
    pattern.push_str("(?");
    if case_insensitive {
        pattern.push('i');
    }
    if multiline {
        pattern.push('m');
    }
    if dot_all {
        pattern.push('s');
    }
    pattern.push(')');
    pattern.push_str(&command.pattern);

    let regex = Regex::new(&pattern).map_err(|e| e.to_string())?;

    if global {
        regex
            .replace_all(text, command.replacement.as_str())
            .map(|cow| cow.into_owned())
            .map_err(|e| e.to_string())
    } else {
        regex
            .replace(text, command.replacement.as_str())
            .map(|cow| cow.into_owned())
            .map_err(|e| e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmd(pattern: &str, flags: &str, replacement: &str) -> WireCommand {
        WireCommand { pattern: pattern.into(), flags: flags.into(), replacement: replacement.into() }
    }

    #[test]
    fn basic_substitution() {
        let result = apply(&cmd("hello", "", "hi"), "hello world").unwrap();
        assert_eq!(result, "hi world");
    }

    #[test]
    fn global_flag_replaces_every_occurrence() {
        let result = apply(&cmd("o", "g", "0"), "foo boo").unwrap();
        assert_eq!(result, "f00 b00");
    }

    #[test]
    fn case_insensitive_flag() {
        let result = apply(&cmd("HELLO", "i", "hi"), "hello world").unwrap();
        assert_eq!(result, "hi world");
    }

    #[test]
    fn invalid_pattern_is_an_error() {
        assert!(apply(&cmd("[unclosed", "", "x"), "anything").is_err());
    }

    #[test]
    fn applies_an_already_host_syntax_backreference_verbatim() {
        // By the time a request reaches the executor, the orchestrator's
        // escape-decode step (`util::escape::unescape_replacement`) has
        // already translated `\N` to `$N`; the executor never sees `\N`.
        let result = apply(&cmd(r"(\w+)@(\w+)", "", "$2#$1"), "user@host").unwrap();
        assert_eq!(result, "host#user");
    }

    #[test]
    fn frame_roundtrip() {
        let req = ExecutorRequest {
            initial_text: "hi".into(),
            commands: vec![cmd("h", "", "H")],
            include_performance: false,
        };
        let mut buf = Vec::new();
        write_frame(&mut buf, &req).unwrap();
        let mut cursor = io::Cursor::new(buf);
        let decoded: ExecutorRequest = read_frame(&mut cursor).unwrap().unwrap();
        assert_eq!(decoded.initial_text, "hi");
    }

    #[test]
    fn read_frame_returns_none_on_clean_eof() {
        let mut cursor = io::Cursor::new(Vec::<u8>::new());
        let decoded: Option<ExecutorRequest> = read_frame(&mut cursor).unwrap();
        assert!(decoded.is_none());
    }
}
