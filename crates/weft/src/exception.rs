//! Exceptions and the virtual backtrace carried across coroutine boundaries.
//!
//! Each subcoroutine is an independent resumable, so a native stack trace
//! terminates at the resume site rather than at the user's call site. The
//! framework therefore builds its own backtrace: while an exception unwinds
//! the subcoroutine stack, a [`Frame`] is prepended to the in-flight
//! [`CoException`] for every nesting level crossed. On terminal unwind the
//! frames read outermost-first, the "most recent call last" ordering.

use std::{collections::VecDeque, error::Error as StdError, fmt};

use strum::{Display, EnumString, IntoStaticStr};

/// Exception kinds recognised by the framework.
///
/// Uses strum derives for automatic `Display`, `FromStr`, and `Into<&'static str>`
/// implementations. The string representation matches the variant name exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ExcType {
    /// Generic kind for exceptions raised by user coroutines.
    Error,
    /// A coroutine yielded a value of none of the recognised kinds.
    TypeFault,
    /// The framework API was used incorrectly (e.g. an empty `Return`).
    UsageError,
    /// An internal framework fault.
    RuntimeFault,
}

/// An exception value routed through the subcoroutine stack.
///
/// Deliberately plain data: a kind plus an optional message. Equality is by
/// value, which is what the unwind path uses to tell "the same exception
/// propagating" apart from "a handler raised something new".
#[derive(Debug, Clone, PartialEq)]
pub struct Exception {
    exc_type: ExcType,
    message: Option<String>,
}

impl Exception {
    /// Creates an exception of the given kind with a message.
    pub fn new(exc_type: ExcType, message: impl Into<String>) -> Self {
        Self {
            exc_type,
            message: Some(message.into()),
        }
    }

    /// Creates an exception of the given kind with no message.
    pub fn bare(exc_type: ExcType) -> Self {
        Self {
            exc_type,
            message: None,
        }
    }

    /// Shorthand for a generic [`ExcType::Error`] with a message.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ExcType::Error, message)
    }

    /// The exception kind.
    #[inline]
    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    /// The message, if one was attached.
    #[inline]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

impl fmt::Display for Exception {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {msg}", self.exc_type),
            None => write!(f, "{}", self.exc_type),
        }
    }
}

impl StdError for Exception {}

/// A source location reported by a coroutine, used in backtrace frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeLoc {
    pub file: &'static str,
    pub line: u32,
}

impl CodeLoc {
    /// Location of coroutines that do not report one.
    pub const UNKNOWN: Self = Self {
        file: "<coroutine>",
        line: 0,
    };

    pub const fn new(file: &'static str, line: u32) -> Self {
        Self { file, line }
    }
}

impl fmt::Display for CodeLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            write!(f, "File \"{}\"", self.file)
        } else {
            write!(f, "File \"{}\", line {}", self.file, self.line)
        }
    }
}

/// One virtual backtrace frame: a coroutine name and its reported location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    name: String,
    loc: CodeLoc,
}

impl Frame {
    pub fn new(name: impl Into<String>, loc: CodeLoc) -> Self {
        Self {
            name: name.into(),
            loc,
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn loc(&self) -> CodeLoc {
        self.loc
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "  {}, in {}", self.loc, self.name)
    }
}

/// An in-flight exception plus the virtual backtrace accumulated so far.
///
/// Created when user code raises (or the framework synthesises a fault)
/// inside a task; one frame is prepended per subcoroutine boundary crossed
/// during unwind. The frames are user-visible diagnostic output and can be
/// inspected in tests via [`CoException::frames`].
#[derive(Debug, Clone)]
pub struct CoException {
    orig: Exception,
    frames: VecDeque<Frame>,
}

impl CoException {
    pub(crate) fn new(orig: Exception) -> Self {
        Self {
            orig,
            frames: VecDeque::new(),
        }
    }

    /// Prepends a frame. The new frame becomes the ultimate parent, displayed
    /// first since backtraces show "most recent call last".
    pub(crate) fn push_caller_frame(&mut self, frame: Frame) {
        self.frames.push_front(frame);
    }

    /// The original exception the backtrace was built around.
    #[inline]
    pub fn orig(&self) -> &Exception {
        &self.orig
    }

    /// Consumes the backtrace and returns the original exception.
    pub fn into_orig(self) -> Exception {
        self.orig
    }

    /// Accumulated frames, outermost caller first.
    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    /// Number of accumulated frames (one per nesting level crossed).
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Formats the uncaught-exception report printed by the scheduler:
    /// a header, the frames, then the original message underlined.
    pub fn render_report(&self) -> String {
        use fmt::Write;

        let mut out = String::from("\nUnhandled coroutine exception backtrace:\n");
        for frame in &self.frames {
            let _ = writeln!(out, "{frame}");
        }
        let msg = self.orig.to_string();
        let _ = writeln!(out, "{msg}");
        let _ = writeln!(out, "{}", "-".repeat(msg.len()));
        out
    }
}

impl fmt::Display for CoException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for frame in &self.frames {
            writeln!(f, "{frame}")?;
        }
        write!(f, "{}", self.orig)
    }
}

impl StdError for CoException {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        Some(&self.orig)
    }
}
