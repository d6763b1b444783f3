//! Scoped thread-priority guard used while a trace's lifecycle is Running.
//!
//! Raises the current thread's scheduling priority to a background level for
//! the duration of the guard's lifetime and restores the previous value on
//! drop, regardless of how the guard is dropped (normal end, abort, or
//! unwind).

#[cfg(unix)]
pub struct PriorityGuard {
    previous: i32,
}

#[cfg(unix)]
impl PriorityGuard {
    /// Sets the calling thread's nice value to `target`. Lower `target`
    /// values mean higher priority; a trace writer wants a small positive
    /// (background) value so it yields to latency-sensitive application
    /// threads without starving entirely.
    pub fn raise(target: i32) -> Self {
        // SAFETY: PRIO_PROCESS + pid 0 targets the calling thread's process;
        // getpriority/setpriority take no pointers and cannot fail in a way
        // that corrupts memory - a failure just means priority is unchanged.
        let previous = unsafe { libc::getpriority(libc::PRIO_PROCESS, 0) };
        unsafe {
            libc::setpriority(libc::PRIO_PROCESS, 0, target);
        }
        Self { previous }
    }
}

#[cfg(unix)]
impl Drop for PriorityGuard {
    fn drop(&mut self) {
        unsafe {
            libc::setpriority(libc::PRIO_PROCESS, 0, self.previous);
        }
    }
}

#[cfg(not(unix))]
pub struct PriorityGuard;

#[cfg(not(unix))]
impl PriorityGuard {
    pub fn raise(_target: i32) -> Self {
        Self
    }
}
