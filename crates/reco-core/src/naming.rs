//! Generated buffer names and session descriptor names.
//!
//! Scratch buffers are named `<buffer_prefix><sequence>.<pid>` and session
//! descriptors `<backup_prefix>.<pid>`. The embedded process id is the only
//! link between a live editor and the artifacts a dead one left behind, so the
//! grammar lives here and nowhere else.
//!
//! Both grammars are matched against the file-name component of a buffer
//! name; whatever directory precedes it is carried along untouched.

use std::fmt;

use regex::Regex;

use crate::error::NamingError;

/// Characters a name may carry in front of the prefix.
const NAME_CHARS: &str = r"[\\a-zA-Z0-9_./]*";

/// A buffer name produced by [`NamingScheme::generate`], or recognised as one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GeneratedName {
    /// Everything up to and including the `.` in front of the pid.
    stem: String,
    sequence: u64,
    pid: u32,
}

impl GeneratedName {
    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_owned_by(&self, pid: u32) -> bool {
        self.pid == pid
    }

    /// The same name rebound to another owning process.
    #[must_use]
    pub fn with_pid(&self, pid: u32) -> Self {
        Self {
            stem: self.stem.clone(),
            sequence: self.sequence,
            pid,
        }
    }
}

impl fmt::Display for GeneratedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stem, self.pid)
    }
}

/// A session descriptor name recognised by [`NamingScheme::parse_session_name`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionName {
    stem: String,
    pid: u32,
}

impl SessionName {
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.stem, self.pid)
    }
}

/// The pair of name grammars used by one recovery session.
#[derive(Debug, Clone)]
pub struct NamingScheme {
    buffer_prefix: String,
    backup_prefix: String,
    buffer_re: Regex,
    session_re: Regex,
}

impl NamingScheme {
    /// Build both grammars.
    ///
    /// Prefixes are spliced into the patterns as written. A prefix that does
    /// not compile is rejected here; one that compiles but cannot recognise its
    /// own output is rejected by [`generate`](Self::generate).
    pub fn new(buffer_prefix: &str, backup_prefix: &str) -> Result<Self, NamingError> {
        let buffer_re = compile(
            "buffer",
            buffer_prefix,
            &format!(r"^(?P<stem>{NAME_CHARS}{buffer_prefix}(?P<seq>\d+)\.)(?P<pid>\d+)$"),
        )?;
        let session_re = compile(
            "session",
            backup_prefix,
            &format!(r"^(?P<stem>{NAME_CHARS}{backup_prefix}\.)(?P<pid>\d+)$"),
        )?;

        Ok(Self {
            buffer_prefix: buffer_prefix.to_string(),
            backup_prefix: backup_prefix.to_string(),
            buffer_re,
            session_re,
        })
    }

    pub fn buffer_prefix(&self) -> &str {
        &self.buffer_prefix
    }

    pub fn backup_prefix(&self) -> &str {
        &self.backup_prefix
    }

    /// Produce the name for `(pid, sequence)`.
    ///
    /// Fails when the result would not parse back to the same pair, which only
    /// happens for a misconfigured prefix.
    pub fn generate(&self, pid: u32, sequence: u64) -> Result<GeneratedName, NamingError> {
        let candidate = format!("{}{sequence}.{pid}", self.buffer_prefix);
        match self.parse_buffer_name(&candidate) {
            Some(name) if name.sequence == sequence && name.pid == pid => Ok(name),
            _ => Err(NamingError::GrammarMismatch {
                kind: "buffer",
                name: candidate,
            }),
        }
    }

    /// Recognise a generated buffer name, with or without a leading directory.
    pub fn parse_buffer_name(&self, name: &str) -> Option<GeneratedName> {
        let (dir, base) = split_dir(name);
        let caps = self.buffer_re.captures(base)?;
        let sequence = caps.name("seq")?.as_str().parse().ok()?;
        let pid = caps.name("pid")?.as_str().parse().ok()?;
        Some(GeneratedName {
            stem: format!("{dir}{}", &caps["stem"]),
            sequence,
            pid,
        })
    }

    pub fn is_generated_name(&self, name: &str) -> bool {
        self.parse_buffer_name(name).is_some()
    }

    /// Process id embedded in a generated buffer name.
    pub fn owner_pid(&self, name: &str) -> Option<u32> {
        self.parse_buffer_name(name).map(|parsed| parsed.pid)
    }

    /// File name of the session descriptor owned by `pid`.
    pub fn session_file_name(&self, pid: u32) -> String {
        format!("{}.{pid}", self.backup_prefix)
    }

    /// Recognise a session descriptor path or file name.
    pub fn parse_session_name(&self, name: &str) -> Option<SessionName> {
        let (dir, base) = split_dir(name);
        let caps = self.session_re.captures(base)?;
        let pid = caps.name("pid")?.as_str().parse().ok()?;
        Some(SessionName {
            stem: format!("{dir}{}", &caps["stem"]),
            pid,
        })
    }

    pub fn is_backup_session_name(&self, name: &str) -> bool {
        self.parse_session_name(name).is_some()
    }
}

fn compile(kind: &'static str, prefix: &str, pattern: &str) -> Result<Regex, NamingError> {
    if prefix.is_empty() {
        return Err(NamingError::InvalidPattern {
            kind,
            prefix: String::new(),
            reason: "prefix must not be empty".to_string(),
        });
    }
    Regex::new(pattern).map_err(|err| NamingError::InvalidPattern {
        kind,
        prefix: prefix.to_string(),
        reason: err.to_string(),
    })
}

fn split_dir(name: &str) -> (&str, &str) {
    match name.rfind('/') {
        Some(idx) => name.split_at(idx + 1),
        None => ("", name),
    }
}

/// Per-process sequence counter for generated names.
///
/// Sequences start at 1 and are never handed out twice by one allocator.
#[derive(Debug, Clone)]
pub struct NameAllocator {
    next: u64,
}

impl Default for NameAllocator {
    fn default() -> Self {
        Self { next: 1 }
    }
}

impl NameAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence the next allocation will use.
    pub fn peek(&self) -> u64 {
        self.next
    }

    pub fn allocate(
        &mut self,
        scheme: &NamingScheme,
        pid: u32,
    ) -> Result<GeneratedName, NamingError> {
        let name = scheme.generate(pid, self.next)?;
        self.next = self.next.saturating_add(1);
        Ok(name)
    }

    /// Skip past a sequence that is already in use by a live buffer.
    pub fn observe(&mut self, sequence: u64) {
        if sequence >= self.next {
            self.next = sequence.saturating_add(1);
        }
    }
}
