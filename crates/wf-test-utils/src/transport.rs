use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use wf_api_types::GenerationEvent;
use wf_sync::{EventTransport, TransportFactory, TransportSignal};

#[derive(Debug, Default)]
struct Shared {
    open: AtomicBool,
    connected: AtomicBool,
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    status_requests: AtomicUsize,
    include_history: Mutex<Option<bool>>,
}

#[derive(Default)]
struct Registry {
    created: Vec<TransportProbe>,
    /// Highest number of simultaneously open transports seen per task id.
    peak_open: HashMap<String, usize>,
    no_auto_open: bool,
}

impl Registry {
    fn open_count(&self, task_id: &str) -> usize {
        self.created
            .iter()
            .filter(|p| p.task_id == task_id && p.shared.open.load(Ordering::SeqCst))
            .count()
    }
}

/// Factory whose transports never touch the network.
///
/// By default a transport reports `Opened` as soon as it is asked to
/// connect; everything after that is driven through [`TransportProbe`].
#[derive(Clone, Default)]
pub struct ScriptedTransportFactory {
    registry: Arc<Mutex<Registry>>,
}

impl ScriptedTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave transports in the connecting state until the test calls
    /// [`TransportProbe::open`].
    pub fn manual_open(self) -> Self {
        self.registry.lock().unwrap().no_auto_open = true;
        self
    }

    pub fn created(&self) -> usize {
        self.registry.lock().unwrap().created.len()
    }

    pub fn created_for(&self, task_id: &str) -> usize {
        self.registry
            .lock()
            .unwrap()
            .created
            .iter()
            .filter(|p| p.task_id == task_id)
            .count()
    }

    /// Most recently created transport for `task_id`.
    pub fn latest(&self, task_id: &str) -> Option<TransportProbe> {
        self.registry
            .lock()
            .unwrap()
            .created
            .iter()
            .rev()
            .find(|p| p.task_id == task_id)
            .cloned()
    }

    pub fn open_count(&self, task_id: &str) -> usize {
        self.registry.lock().unwrap().open_count(task_id)
    }

    pub fn peak_open(&self, task_id: &str) -> usize {
        self.registry
            .lock()
            .unwrap()
            .peak_open
            .get(task_id)
            .copied()
            .unwrap_or(0)
    }

    /// Total open transports across all task ids.
    pub fn open_total(&self) -> usize {
        self.registry
            .lock()
            .unwrap()
            .created
            .iter()
            .filter(|p| p.shared.open.load(Ordering::SeqCst))
            .count()
    }
}

impl TransportFactory for ScriptedTransportFactory {
    fn create(
        &self,
        task_id: &str,
    ) -> (Box<dyn EventTransport>, flume::Receiver<TransportSignal>) {
        let (tx, rx) = flume::unbounded();
        let probe = TransportProbe {
            task_id: task_id.to_string(),
            signals: tx,
            shared: Arc::new(Shared::default()),
        };
        self.registry.lock().unwrap().created.push(probe.clone());
        let transport = ScriptedTransport {
            probe,
            registry: self.registry.clone(),
        };
        (Box::new(transport), rx)
    }
}

struct ScriptedTransport {
    probe: TransportProbe,
    registry: Arc<Mutex<Registry>>,
}

impl EventTransport for ScriptedTransport {
    fn task_id(&self) -> &str {
        &self.probe.task_id
    }

    fn connect(&mut self, include_history: bool) {
        let shared = &self.probe.shared;
        if shared.open.swap(true, Ordering::SeqCst) {
            return;
        }
        shared.connects.fetch_add(1, Ordering::SeqCst);
        *shared.include_history.lock().unwrap() = Some(include_history);

        let auto_open = {
            let mut registry = self.registry.lock().unwrap();
            let open = registry.open_count(&self.probe.task_id);
            let peak = registry
                .peak_open
                .entry(self.probe.task_id.clone())
                .or_insert(0);
            *peak = (*peak).max(open);
            !registry.no_auto_open
        };
        if auto_open {
            self.probe.open();
        }
    }

    fn disconnect(&mut self) {
        let shared = &self.probe.shared;
        if shared.open.swap(false, Ordering::SeqCst) {
            shared.connected.store(false, Ordering::SeqCst);
            shared.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn is_connected(&self) -> bool {
        self.probe.shared.connected.load(Ordering::SeqCst)
    }

    fn request_status(&self) {
        self.probe
            .shared
            .status_requests
            .fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ScriptedTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

/// Test-side handle on one scripted transport.
#[derive(Clone)]
pub struct TransportProbe {
    pub task_id: String,
    signals: flume::Sender<TransportSignal>,
    shared: Arc<Shared>,
}

impl TransportProbe {
    /// Report the socket as up.
    pub fn open(&self) {
        self.shared.connected.store(true, Ordering::SeqCst);
        self.signal(TransportSignal::Opened);
    }

    pub fn emit(&self, event: GenerationEvent) {
        self.signal(TransportSignal::Event(event));
    }

    /// Parse `json` as a wire frame and deliver it.
    pub fn emit_json(&self, json: &str) {
        let event = serde_json::from_str(json).expect("valid event json");
        self.emit(event);
    }

    /// Simulate the server dropping the connection.
    pub fn drop_connection(&self, reason: &str) {
        self.shared.open.store(false, Ordering::SeqCst);
        self.shared.connected.store(false, Ordering::SeqCst);
        self.signal(TransportSignal::Closed {
            reason: Some(reason.to_string()),
        });
    }

    pub fn signal(&self, signal: TransportSignal) {
        // The owner may already have dropped the receiver.
        let _ = self.signals.send(signal);
    }

    pub fn is_open(&self) -> bool {
        self.shared.open.load(Ordering::SeqCst)
    }

    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.shared.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.shared.disconnects.load(Ordering::SeqCst)
    }

    pub fn status_requests(&self) -> usize {
        self.shared.status_requests.load(Ordering::SeqCst)
    }

    pub fn include_history(&self) -> Option<bool> {
        *self.shared.include_history.lock().unwrap()
    }
}
