//! Task data model: substitution commands, tasks, and their results.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// One recognised regex flag.
///
/// The recognised alphabet is intentionally small and mirrors what a
/// JavaScript-style regex literal supports, since upstream message parsing
/// hands us flags collected from that surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegexFlag {
    /// `i` — case-insensitive matching.
    CaseInsensitive,
    /// `m` — `^`/`$` match at line boundaries.
    Multiline,
    /// `s` — `.` matches newlines too.
    DotAll,
    /// `g` — apply the substitution globally rather than once.
    Global,
    /// `u` — treat the pattern as Unicode-aware.
    Unicode,
    /// `y` — sticky matching anchored at the last match position.
    Sticky,
}

impl RegexFlag {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'i' => Some(Self::CaseInsensitive),
            'm' => Some(Self::Multiline),
            's' => Some(Self::DotAll),
            'g' => Some(Self::Global),
            'u' => Some(Self::Unicode),
            'y' => Some(Self::Sticky),
            _ => None,
        }
    }
}

/// Reserved, out-of-band marker requesting performance reporting.
///
/// This character is never a recognised regex flag; its only purpose is to
/// signal `include_performance` upstream. It is stripped from the
/// normalised [`RegexFlags`] set and must never reach the regex engine.
pub const PERFORMANCE_MARKER: char = 'p';

/// A normalised, deduplicated set of recognised regex flags.
///
/// Constructed by intersecting a raw, user-supplied flag string with the
/// recognised alphabet; duplicates collapse and unknown flags (including
/// the out-of-band performance marker) are dropped silently.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegexFlags {
    flags: Vec<RegexFlag>,
}

impl RegexFlags {
    /// Parse and normalise a raw flag string.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut flags = Vec::new();
        for c in raw.chars() {
            if let Some(flag) = RegexFlag::from_char(c) {
                if !flags.contains(&flag) {
                    flags.push(flag);
                }
            }
        }
        Self { flags }
    }

    /// Whether the performance-reporting marker was present in the raw string.
    #[must_use]
    pub fn requests_performance(raw: &str) -> bool {
        raw.contains(PERFORMANCE_MARKER)
    }

    /// Whether a given flag is present in the normalised set.
    #[must_use]
    pub fn contains(&self, flag: RegexFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Iterate the normalised flags.
    pub fn iter(&self) -> impl Iterator<Item = RegexFlag> + '_ {
        self.flags.iter().copied()
    }
}

/// One substitution step: a pattern, its normalised flags, and a replacement.
///
/// Immutable once constructed. `original_flag_string` is retained only to
/// detect the out-of-band performance marker (see [`RegexFlags::requests_performance`]);
/// it plays no role in regex compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubstitutionCommand {
    /// The regex pattern, still escaped as received from upstream parsing.
    pub pattern: String,
    /// The normalised, deduplicated flag set.
    pub flags: RegexFlags,
    /// The replacement text, still escaped as received from upstream parsing.
    pub replacement: String,
    /// The raw flag string as supplied by the caller, kept only for the
    /// out-of-band performance-marker check.
    pub original_flag_string: String,
}

impl SubstitutionCommand {
    /// Construct a command, normalising `raw_flags` against the recognised alphabet.
    #[must_use]
    pub fn new(pattern: impl Into<String>, raw_flags: impl Into<String>, replacement: impl Into<String>) -> Self {
        let raw_flags = raw_flags.into();
        Self {
            pattern: pattern.into(),
            flags: RegexFlags::parse(&raw_flags),
            replacement: replacement.into(),
            original_flag_string: raw_flags,
        }
    }

    /// Whether this command's raw flag string requested performance reporting.
    #[must_use]
    pub fn requests_performance(&self) -> bool {
        RegexFlags::requests_performance(&self.original_flag_string)
    }
}

/// One unit of work dispatched to the pool: one regex application.
///
/// A task always carries exactly one [`SubstitutionCommand`] — the
/// orchestrator submits one task per chain step, not one per chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Text the substitution is applied to.
    pub initial_text: String,
    /// The single command to apply. A `Vec` of length one on the wire to
    /// match the executor's request shape in §6 of the specification.
    pub commands: Vec<SubstitutionCommand>,
    /// Whether the executor should report its own wall-clock duration.
    pub include_performance: bool,
    /// Wall-clock deadline for this task, enforced by the pool, not the executor.
    #[serde(skip)]
    pub deadline: Duration,
}

impl Task {
    /// Construct a single-command task.
    #[must_use]
    pub fn new(initial_text: impl Into<String>, command: SubstitutionCommand, include_performance: bool, deadline: Duration) -> Self {
        Self {
            initial_text: initial_text.into(),
            commands: vec![command],
            include_performance,
            deadline,
        }
    }
}

/// The reason a task failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum TaskErrorKind {
    /// The pattern (with its flags) could not be compiled.
    #[error("invalid regex: {0}")]
    InvalidRegex(String),
    /// The task's deadline fired before a result arrived.
    #[error("task timed out")]
    Timeout,
    /// The executor reported or was observed to have failed unrecoverably.
    #[error("worker crashed: {0}")]
    WorkerCrash(String),
    /// The submission was rejected or cancelled because the pool is shutting down.
    #[error("pool is shutting down")]
    ShuttingDown,
}

/// The outcome of one dispatched task.
#[derive(Debug, Clone)]
pub enum TaskResult {
    /// Substitution succeeded; carries the resulting text and, if requested,
    /// the executor's self-reported duration in milliseconds.
    Ok {
        /// The substituted text.
        text: String,
        /// Executor-reported duration, present only if `include_performance` was set.
        performance_ms: Option<u64>,
    },
    /// Substitution failed for one of the reasons in [`TaskErrorKind`].
    Err(TaskErrorKind),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_parsing_deduplicates_and_drops_unknown() {
        let flags = RegexFlags::parse("igig?z");
        let mut seen: Vec<_> = flags.iter().collect();
        seen.sort_by_key(|f| format!("{f:?}"));
        assert_eq!(seen.len(), 2);
        assert!(flags.contains(RegexFlag::CaseInsensitive));
        assert!(flags.contains(RegexFlag::Global));
    }

    #[test]
    fn performance_marker_never_becomes_a_flag() {
        let flags = RegexFlags::parse("gp");
        assert!(flags.contains(RegexFlag::Global));
        assert!(!flags.contains(RegexFlag::CaseInsensitive));
        assert_eq!(flags.iter().count(), 1);
        assert!(RegexFlags::requests_performance("gp"));
    }

    #[test]
    fn command_reports_performance_request_from_raw_string() {
        let cmd = SubstitutionCommand::new("a", "gp", "b");
        assert!(cmd.requests_performance());
        let cmd = SubstitutionCommand::new("a", "g", "b");
        assert!(!cmd.requests_performance());
    }
}
