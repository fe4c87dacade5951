//! Completion events for external logging/audit collaborators.

use std::sync::{Arc, Mutex};

/// Event tag emitted once a rebuild has committed.
pub const REBUILT_STOCK: &str = "rebuilt-stock";

/// Severity channel of an emitted entry.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AuditLevel {
    /// Operator-facing informational notice.
    Notice,
    /// Audit trail entry.
    Audit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub level: AuditLevel,
    pub tag: &'static str,
}

/// Receives tag-only events. Payloads are deliberately absent: consumers key off the tag.
pub trait AuditSink: Send + Sync {
    fn notice(&self, tag: &'static str);
    fn audit(&self, tag: &'static str);
}

impl<A> AuditSink for Arc<A>
where
    A: AuditSink + ?Sized,
{
    fn notice(&self, tag: &'static str) {
        (**self).notice(tag)
    }

    fn audit(&self, tag: &'static str) {
        (**self).audit(tag)
    }
}

/// Default sink: notices go to `info`, audit entries to `warn` on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn notice(&self, tag: &'static str) {
        tracing::info!(event = tag, "stock notice");
    }

    fn audit(&self, tag: &'static str) {
        tracing::warn!(target: "audit", event = tag, "stock audit");
    }
}

/// Sink that keeps entries in memory, for tests/dev.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn push(&self, level: AuditLevel, tag: &'static str) {
        let mut entries = match self.entries.lock() {
            Ok(entries) => entries,
            Err(poisoned) => poisoned.into_inner(),
        };
        entries.push(AuditEntry { level, tag });
    }
}

impl AuditSink for RecordingAuditSink {
    fn notice(&self, tag: &'static str) {
        self.push(AuditLevel::Notice, tag);
    }

    fn audit(&self, tag: &'static str) {
        self.push(AuditLevel::Audit, tag);
    }
}
