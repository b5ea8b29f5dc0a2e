//! The callback seam surrounding collaborators must implement: the engine
//! calls back out for wall-clock time, timer arming, command execution,
//! and logging, but never performs I/O itself (per the concurrency
//! model's "eval/publish/alert run to completion without yielding; they
//! must not perform I/O").

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        write!(f, "{s}")
    }
}

/// The result an external command sink reports back; `code` is whatever
/// the sink's own convention uses (zero for success is the default but
/// not enforced here).
#[derive(Debug, Clone)]
pub struct CommandOutcome {
    pub code: i32,
    pub message: Option<String>,
}

/// Executes a rule action's command text. Rule continues regardless of
/// outcome; command failure is reported, not fatal (per the error
/// handling design's "Command failure" category).
pub trait CommandSink {
    fn exec_command(&mut self, context: &str, command: &str) -> CommandOutcome;
}

/// Everything the engine calls back out to a host for: the wall clock,
/// timer arming, command execution, and logging. One trait rather than
/// four so `Engine` carries a single boxed collaborator.
pub trait EngineHost: CommandSink {
    /// Monotonic wall-clock seconds. Must agree with the `at_seconds`
    /// values the engine later passes to `arm_timer`/expects from `tick`.
    fn now(&self) -> f64;

    /// Requests a wakeup no later than `at_seconds`; called whenever the
    /// dispatcher's earliest pending timer changes. The host is free to
    /// coalesce this with its own event loop's wait.
    fn arm_timer(&mut self, at_seconds: f64);

    /// Cancels a previously requested wakeup; called when the dispatcher's
    /// heap becomes empty.
    fn cancel_timer(&mut self);

    fn log(&mut self, level: LogLevel, message: &str);

    /// Carries out an `exit <cell>` rule command's computed exit code.
    /// Core only computes the code (see `engine::exit_code_for_value`);
    /// actually terminating the process is host I/O, same as every other
    /// side effect in this trait.
    fn request_exit(&mut self, code: i32);
}
