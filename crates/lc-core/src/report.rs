use std::fmt;

use crate::{dedup::DedupReport, domain::OrganizeOutcome, errors::Error};

/// Final tally of a sweep or command.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub added: usize,
    pub already_existed: usize,
    pub thread_existed: usize,
    pub skipped: usize,
    pub errored: usize,
    pub deleted: usize,
    pub merged: usize,
    /// Postings left out of a merge because the target already held them.
    pub replay_skipped: usize,
    /// Scopes skipped for missing permissions, by name.
    pub skipped_scopes: Vec<String>,
    pub cancelled: bool,
}

impl SweepReport {
    pub fn record(&mut self, outcome: &OrganizeOutcome) {
        match outcome {
            OrganizeOutcome::Added { .. } => self.added += 1,
            OrganizeOutcome::AlreadyExists { .. } => self.already_existed += 1,
            OrganizeOutcome::ThreadExists { .. } => self.thread_existed += 1,
            OrganizeOutcome::PermissionError { scope } => self.skip_scope(scope),
            OrganizeOutcome::Failure(_) => self.errored += 1,
        }
    }

    pub fn skip_scope(&mut self, scope: &str) {
        self.skipped += 1;
        if !self.skipped_scopes.iter().any(|s| s == scope) {
            self.skipped_scopes.push(scope.to_string());
        }
    }

    /// A read or lookup failed for `scope`. Permission errors skip the scope
    /// by name; anything else counts as an error. The sweep goes on.
    pub fn scope_failed(&mut self, scope: &str, e: &Error) {
        if matches!(e, Error::Permission { .. }) {
            tracing::warn!(%scope, "missing permission; skipping scope");
            self.skip_scope(scope);
        } else {
            tracing::warn!(%scope, error = %e, "scope failed; continuing");
            self.errored += 1;
        }
    }

    pub fn absorb_dedup(&mut self, dedup: &DedupReport) {
        self.deleted += dedup.deleted;
        self.errored += dedup.failed;
        self.cancelled |= dedup.cancelled;
    }
}

impl fmt::Display for SweepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "added {}, already existed {}, thread existed {}, skipped {}, errored {}",
            self.added, self.already_existed, self.thread_existed, self.skipped, self.errored
        )?;
        if self.deleted > 0 {
            write!(f, ", deleted {}", self.deleted)?;
        }
        if self.merged > 0 {
            write!(f, ", merged {}", self.merged)?;
        }
        if self.replay_skipped > 0 {
            write!(f, ", replay skipped {}", self.replay_skipped)?;
        }
        if !self.skipped_scopes.is_empty() {
            write!(f, " (skipped: {})", self.skipped_scopes.join(", "))?;
        }
        if self.cancelled {
            write!(f, " [cancelled]")?;
        }
        Ok(())
    }
}
