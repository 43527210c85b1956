//! The sync guard: at most one sync session per node.
//!
//! A session is either the inbound handling of `/v1/sync` or an outbound
//! drill-down loop. An inbound request while busy gets the well-defined
//! busy response; an outbound attempt while busy returns without
//! sending. The guard lives in the node context, not in a process
//! global.

use std::sync::Mutex;

/// Node-wide mutual exclusion for sync sessions.
#[derive(Debug, Default)]
pub struct SyncGuard {
    busy: Mutex<bool>,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to start a session. Returns false if one is already active.
    pub fn try_begin(&self) -> bool {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        if *busy {
            false
        } else {
            *busy = true;
            true
        }
    }

    /// Mark the session finished.
    pub fn end(&self) {
        let mut busy = self.busy.lock().unwrap_or_else(|e| e.into_inner());
        *busy = false;
    }

    /// Whether a session is currently active.
    pub fn is_busy(&self) -> bool {
        *self.busy.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// [`SyncGuard::try_begin`] with RAII release: the permit calls
    /// [`SyncGuard::end`] when dropped, so early returns and `?` cannot
    /// leak a held guard.
    pub fn permit(&self) -> Option<SyncPermit<'_>> {
        if self.try_begin() {
            Some(SyncPermit { guard: self })
        } else {
            None
        }
    }
}

/// An acquired sync slot. Dropping it releases the guard.
#[derive(Debug)]
pub struct SyncPermit<'a> {
    guard: &'a SyncGuard,
}

impl Drop for SyncPermit<'_> {
    fn drop(&mut self) {
        self.guard.end();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_begin_is_refused() {
        let guard = SyncGuard::new();
        assert!(!guard.is_busy());
        assert!(guard.try_begin());
        assert!(guard.is_busy());
        assert!(!guard.try_begin());
        guard.end();
        assert!(guard.try_begin());
    }

    #[test]
    fn permit_releases_on_drop() {
        let guard = SyncGuard::new();
        {
            let permit = guard.permit().unwrap();
            assert!(guard.is_busy());
            assert!(guard.permit().is_none());
            drop(permit);
        }
        assert!(!guard.is_busy());
    }

    #[test]
    fn concurrent_attempts_admit_exactly_one() {
        use std::sync::Arc;

        let guard = Arc::new(SyncGuard::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let guard = Arc::clone(&guard);
            handles.push(std::thread::spawn(move || guard.try_begin()));
        }
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap_or(false))
            .filter(|admitted| *admitted)
            .count();
        assert_eq!(admitted, 1);
    }
}
