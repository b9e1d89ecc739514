use std::sync::atomic::{AtomicBool, Ordering};

/// Per-job "already running" flag.
///
/// A tick that finds the flag set is skipped, never queued. The flag is
/// cleared when the returned token drops, including on early return.
#[derive(Debug)]
pub struct JobGuard {
    name: &'static str,
    running: AtomicBool,
}

impl JobGuard {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Claim the job, or `None` if a previous tick is still running
    pub fn try_acquire(&self) -> Option<JobToken<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| JobToken { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Proof of a claimed job; releases the guard on drop
#[derive(Debug)]
pub struct JobToken<'a> {
    guard: &'a JobGuard,
}

impl Drop for JobToken<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_refused() {
        let guard = JobGuard::new("monitor");
        let token = guard.try_acquire();
        assert!(token.is_some());
        assert!(guard.is_running());
        assert!(guard.try_acquire().is_none());

        drop(token);
        assert!(!guard.is_running());
        assert!(guard.try_acquire().is_some());
    }
}
