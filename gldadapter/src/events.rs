/// Session events and listener interface
///
/// Raw process output, lifecycle transitions, and the callback trait a
/// front-end implements to observe the session. Callbacks are invoked
/// on a snapshot of the registered listeners taken after session state
/// has settled, so a callback may freely call back into the session.
use std::fmt;
use std::sync::{Arc, Mutex};

use crate::commands::GldCommand;
use crate::types::GldStatus;

/// Where a framed message came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputChannel {
    Stdout,
    Stderr,
    /// Synthetic messages about the process itself
    Lifecycle,
}

impl fmt::Display for OutputChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputChannel::Stdout => write!(f, "stdout"),
            OutputChannel::Stderr => write!(f, "stderr"),
            OutputChannel::Lifecycle => write!(f, "lifecycle"),
        }
    }
}

/// How the simulator process came to an end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// The process exited on its own
    Finished,
    /// The process was torn down on request
    Halted,
}

impl fmt::Display for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LifecycleEvent::Finished => write!(f, "Process finished"),
            LifecycleEvent::Halted => write!(f, "Process halted"),
        }
    }
}

/// One event delivered from the process side to the session
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    /// A framed message from one of the output streams
    Output {
        channel: OutputChannel,
        message: String,
    },
    Lifecycle(LifecycleEvent),
}

/// Observer of session activity
///
/// All methods default to no-ops so a front-end implements only what it
/// cares about.
pub trait GldListener: Send + Sync {
    /// The simulation clock advanced during a `run`.
    fn clock_changed(&self, _clock: &str) {}

    /// A line of process output that no response handler consumed.
    fn output(&self, _channel: OutputChannel, _message: &str) {}

    /// The session moved between NONE, RUNNING, and STOPPED.
    fn status_changed(&self, _status: GldStatus, _command: Option<&GldCommand>) {}

    /// A command completed and its typed output is available.
    fn command_results(&self, _command: &GldCommand) {}
}

/// Registered listeners, cloned out before every dispatch
pub(crate) struct ListenerSet {
    listeners: Mutex<Vec<Arc<dyn GldListener>>>,
}

impl ListenerSet {
    pub fn new() -> ListenerSet {
        ListenerSet {
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub fn add(&self, listener: Arc<dyn GldListener>) {
        self.listeners.lock().unwrap().push(listener);
    }

    pub fn remove(&self, listener: &Arc<dyn GldListener>) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|registered| !Arc::ptr_eq(registered, listener));
    }

    pub fn snapshot(&self) -> Vec<Arc<dyn GldListener>> {
        self.listeners.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Quiet;
    impl GldListener for Quiet {}

    #[test]
    fn test_listener_set_add_remove() {
        let set = ListenerSet::new();
        let a: Arc<dyn GldListener> = Arc::new(Quiet);
        let b: Arc<dyn GldListener> = Arc::new(Quiet);
        set.add(a.clone());
        set.add(b.clone());
        assert_eq!(set.snapshot().len(), 2);

        set.remove(&a);
        let rest = set.snapshot();
        assert_eq!(rest.len(), 1);
        assert!(Arc::ptr_eq(&rest[0], &b));
    }

    #[test]
    fn test_lifecycle_display() {
        assert_eq!(LifecycleEvent::Finished.to_string(), "Process finished");
        assert_eq!(LifecycleEvent::Halted.to_string(), "Process halted");
    }
}
