//! Cancellation: the process-wide flag, the registry of live child processes, and the
//! monitor that reacts to Ctrl+C.
//!
//! Monitor states: `Armed → Triggered → Terminating → Exited`. The sequence runs at most
//! once per monitor; a second trigger is ignored. `Exited` ends the process without
//! draining workers: a hung child or worker thread must never hold the terminal hostage.

use anyhow::{Context, Result};
use log::{debug, warn};
use std::collections::HashMap;
use std::process::Child;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::engine::Reporter;
use crate::engine::process::kill_tree;

/// Set exactly once when the user interrupts. Cheap to clone and poll.
#[derive(Clone, Debug, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns true only for the call that flipped it.
    pub fn cancel(&self) -> bool {
        !self.0.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared handle to a spawned child. The owning worker polls it; the monitor may kill it.
pub type SharedChild = Arc<Mutex<Child>>;

/// Children currently running, keyed by registration id. Workers insert right after
/// spawning and remove (via [`ChildGuard`]) once the child has been reaped.
#[derive(Clone, Default)]
pub struct ChildRegistry {
    children: Arc<Mutex<HashMap<u64, SharedChild>>>,
    next_id: Arc<AtomicU64>,
}

impl ChildRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, child: SharedChild) -> ChildGuard {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, child);
        ChildGuard {
            registry: self.clone(),
            id,
        }
    }

    pub fn len(&self) -> usize {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Force-kill every registered child that is still running. Returns how many were killed.
    pub fn kill_all(&self) -> usize {
        let children: Vec<SharedChild> = self
            .children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        let mut killed = 0;
        for child in children {
            let mut child = child.lock().unwrap_or_else(PoisonError::into_inner);
            if matches!(child.try_wait(), Ok(Some(_))) {
                continue;
            }
            match kill_tree(&mut child) {
                Ok(()) => killed += 1,
                Err(e) => debug!("kill pid {}: {}", child.id(), e),
            }
        }
        killed
    }

    fn remove(&self, id: u64) {
        self.children
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
    }
}

/// Deregisters a child from the [`ChildRegistry`] on drop.
pub struct ChildGuard {
    registry: ChildRegistry,
    id: u64,
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MonitorState {
    Armed = 0,
    Triggered = 1,
    Terminating = 2,
    Exited = 3,
}

impl MonitorState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => MonitorState::Armed,
            1 => MonitorState::Triggered,
            2 => MonitorState::Terminating,
            _ => MonitorState::Exited,
        }
    }
}

/// Exit code used when the batch is cancelled.
pub const CANCEL_EXIT_CODE: i32 = 1;

type ExitFn = Box<dyn Fn(i32) + Send + Sync>;

/// Reacts to the interrupt signal: sets the flag, kills tracked children, prints a final
/// line, then exits the process.
pub struct CancelMonitor {
    state: AtomicU8,
    flag: CancellationFlag,
    registry: ChildRegistry,
    reporter: Option<Arc<Reporter>>,
    exit: ExitFn,
}

impl CancelMonitor {
    /// Monitor that ends the process with [`std::process::exit`].
    pub fn new(flag: CancellationFlag, registry: ChildRegistry) -> Self {
        Self::with_exit(flag, registry, Box::new(|code| std::process::exit(code)))
    }

    /// Monitor with a custom exit action (lets tests observe `Exited` without dying).
    pub fn with_exit(flag: CancellationFlag, registry: ChildRegistry, exit: ExitFn) -> Self {
        Self {
            state: AtomicU8::new(MonitorState::Armed as u8),
            flag,
            registry,
            reporter: None,
            exit,
        }
    }

    /// Print the "canceled by user" line and partial summary through this reporter.
    pub fn with_reporter(mut self, reporter: Arc<Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn state(&self) -> MonitorState {
        MonitorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Run the cancellation sequence. Only the first call does anything.
    pub fn trigger(&self) {
        if self
            .state
            .compare_exchange(
                MonitorState::Armed as u8,
                MonitorState::Triggered as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_err()
        {
            debug!("interrupt while already {:?}; ignoring", self.state());
            return;
        }
        // Flag first so the dispatcher stops submitting before anything slow happens.
        self.flag.cancel();

        self.state
            .store(MonitorState::Terminating as u8, Ordering::SeqCst);
        let killed = self.registry.kill_all();
        debug!("killed {} child process(es)", killed);

        match &self.reporter {
            Some(reporter) => reporter.cancel_notice(killed),
            None => warn!("canceled by user"),
        }

        self.state.store(MonitorState::Exited as u8, Ordering::SeqCst);
        (self.exit)(CANCEL_EXIT_CODE);
    }

    /// Register the Ctrl+C handler. Can only be done once per process.
    pub fn install(self: &Arc<Self>) -> Result<()> {
        let monitor = Arc::clone(self);
        ctrlc::set_handler(move || monitor.trigger()).context("set Ctrl+C handler")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn flag_reports_first_setter_only() {
        let flag = CancellationFlag::new();
        assert!(!flag.is_cancelled());
        assert!(flag.cancel());
        assert!(!flag.cancel());
        assert!(flag.clone().is_cancelled());
    }

    #[test]
    fn trigger_runs_once_and_ends_exited() {
        let exits = Arc::new(AtomicUsize::new(0));
        let exits_c = Arc::clone(&exits);
        let flag = CancellationFlag::new();
        let monitor = CancelMonitor::with_exit(
            flag.clone(),
            ChildRegistry::new(),
            Box::new(move |code| {
                assert_eq!(code, CANCEL_EXIT_CODE);
                exits_c.fetch_add(1, Ordering::SeqCst);
            }),
        );
        assert_eq!(monitor.state(), MonitorState::Armed);
        monitor.trigger();
        monitor.trigger();
        assert!(flag.is_cancelled());
        assert_eq!(monitor.state(), MonitorState::Exited);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }

    #[cfg(unix)]
    #[test]
    fn registry_kill_all_and_guard_removal() {
        use std::process::{Command, Stdio};
        let registry = ChildRegistry::new();
        let child = Command::new("sleep")
            .arg("30")
            .stdout(Stdio::null())
            .spawn()
            .unwrap();
        let shared = Arc::new(Mutex::new(child));
        let guard = registry.register(Arc::clone(&shared));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.kill_all(), 1);
        let status = shared.lock().unwrap().wait().unwrap();
        assert!(!status.success());
        drop(guard);
        assert!(registry.is_empty());
    }
}
