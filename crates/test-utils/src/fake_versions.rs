use std::collections::HashMap;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard};

use pipegraph::node::VersionQuery;

#[derive(Debug, Default)]
struct State {
    outputs: HashMap<Vec<String>, String>,
    calls: Vec<Vec<String>>,
}

/// Canned version output per command line. Commands without an entry fail
/// with `NotFound`, like a program missing from `PATH`.
#[derive(Debug, Clone, Default)]
pub struct FakeVersions {
    state: Arc<Mutex<State>>,
}

impl FakeVersions {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn with_output(self, call: &[&str], output: &str) -> Self {
        self.lock()
            .outputs
            .insert(call.iter().map(|s| s.to_string()).collect(), output.to_string());
        self
    }

    /// Every command line queried so far, in order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.lock().calls.clone()
    }
}

impl VersionQuery for FakeVersions {
    fn output(&self, call: &[String]) -> io::Result<String> {
        let mut state = self.lock();
        state.calls.push(call.to_vec());
        state.outputs.get(call).cloned().ok_or_else(|| {
            io::Error::new(io::ErrorKind::NotFound, format!("{} not found", call.join(" ")))
        })
    }
}
