//! Turns the raw lock set returned by a `DavLockSystem` into the four named
//! views and the four-value permission code a request needs.
//!
//! Grounded on `memls`'s existing path-segment tree walk (`discover`); this
//! module classifies what `discover` returns rather than re-walking storage
//! itself.

use std::time::SystemTime;

use crate::davpath::DavPath;
use crate::ls::{DavLock, DavLockSystem};

/// The effective lock set seen from a target resource, split into the three
/// disjoint subsets that matter for permission decisions.
#[derive(Debug, Default)]
pub(crate) struct EffectiveLocks {
    /// Locks held directly on the target resource.
    pub resource: Vec<DavLock>,
    /// Depth-0 locks held on the immediate parent collection.
    pub depth_zero: Vec<DavLock>,
    /// Depth-infinity locks held on some ancestor collection.
    pub depth_infinity: Vec<DavLock>,
}

impl EffectiveLocks {
    pub(crate) fn all(&self) -> impl Iterator<Item = &DavLock> {
        self.resource
            .iter()
            .chain(self.depth_zero.iter())
            .chain(self.depth_infinity.iter())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.resource.is_empty() && self.depth_zero.is_empty() && self.depth_infinity.is_empty()
    }
}

/// Four-value permission code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Permission {
    /// 0: denied.
    Denied,
    /// 1: may modify contents, but not the namespace entry itself
    /// (e.g. PUT is fine, DELETE/MOVE/PROPPATCH of the mapping is not).
    ContentsOnly,
    /// 2: full access.
    Full,
    /// 3: a new shared lock may be added alongside existing ones.
    SharedOk,
}

fn purge(locks: Vec<DavLock>) -> Vec<DavLock> {
    let now = SystemTime::now();
    locks
        .into_iter()
        .filter(|l| match l.timeout_at {
            Some(until) => until > now,
            None => true,
        })
        .collect()
}

/// Classify every lock covering `path` into the three named views.
pub(crate) fn effective_locks(ls: &dyn DavLockSystem, path: &DavPath) -> EffectiveLocks {
    let parent = path.parent();
    let mut eff = EffectiveLocks::default();
    for lock in purge(ls.discover(path)) {
        if lock.path == *path {
            eff.resource.push(lock);
        } else if lock.deep {
            eff.depth_infinity.push(lock);
        } else if lock.path == parent {
            eff.depth_zero.push(lock);
        }
        // a non-deep lock on a non-parent ancestor does not apply; ignore.
    }
    eff
}

fn owns(lock: &DavLock, principal: Option<&str>, submitted_tokens: &[&str]) -> bool {
    submitted_tokens.iter().any(|t| *t == lock.token) && principal == lock.principal.as_deref()
}

/// Compute the permission code for a non-LOCK method against `path`.
pub(crate) fn permission(
    eff: &EffectiveLocks,
    principal: Option<&str>,
    submitted_tokens: &[&str],
) -> Permission {
    if eff.is_empty() {
        return Permission::Full;
    }
    if eff.all().any(|l| owns(l, principal, submitted_tokens)) {
        // conservative: if we own every blocking lock, treat as full access.
        let unheld = eff
            .resource
            .iter()
            .chain(eff.depth_infinity.iter())
            .any(|l| !owns(l, principal, submitted_tokens));
        if !unheld {
            return Permission::Full;
        }
    }
    if !eff.resource.is_empty() || !eff.depth_infinity.is_empty() {
        return Permission::Denied;
    }
    if !eff.depth_zero.is_empty() {
        return Permission::ContentsOnly;
    }
    Permission::Denied
}

/// Compute the permission code for a new LOCK request against `path`.
pub(crate) fn lock_permission(eff: &EffectiveLocks, shared: bool) -> Permission {
    let exclusive_blocking = eff
        .resource
        .iter()
        .chain(eff.depth_infinity.iter())
        .any(|l| !l.shared);
    if exclusive_blocking {
        return Permission::Denied;
    }
    let exclusive_zero = eff.depth_zero.iter().any(|l| !l.shared);
    if exclusive_zero {
        return Permission::ContentsOnly;
    }
    let any_shared = eff.all().any(|l| l.shared);
    if any_shared {
        return if shared { Permission::SharedOk } else { Permission::Denied };
    }
    if eff.is_empty() {
        return Permission::Full;
    }
    // unreachable: every lock in a non-empty `eff` is either exclusive
    // (handled above) or shared (handled above).
    Permission::Denied
}
