//! Build summary reported to the user.

use crate::domain::ExitStatus;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildSummary {
    pub sessions: usize,
    pub executed: usize,
    pub cached: usize,
    pub removed: usize,
    pub highlighted: usize,
    pub reaped: usize,
    /// The previous store was discarded because its vitals changed.
    pub invalidated: bool,
    /// Issues produced by work done in this build.
    pub fresh: ExitStatus,
    /// Last known issues of sessions that did not rerun under a conservative policy.
    pub carried: ExitStatus,
    pub messages: Vec<String>,
}

impl BuildSummary {
    pub fn total(&self) -> ExitStatus {
        ExitStatus::new(
            self.fresh.errors + self.carried.errors,
            self.fresh.warnings + self.carried.warnings,
        )
    }

    pub(crate) fn error(&mut self, message: impl Into<String>) {
        self.fresh.errors += 1;
        self.messages.push(message.into());
    }

    pub(crate) fn warning(&mut self, message: impl Into<String>) {
        self.fresh.warnings += 1;
        self.messages.push(message.into());
    }

    pub(crate) fn absorb(&mut self, status: ExitStatus, messages: &[String]) {
        self.fresh.errors += status.errors;
        self.fresh.warnings += status.warnings;
        self.messages.extend_from_slice(messages);
    }
}
