// Simulated air — an in-process broadcast medium for exercising floods
//
// Nodes are joined by undirected links. A node that is scanning hears every
// linked neighbour that is advertising: neighbours already on air when the
// scan starts are reported immediately, neighbours that start advertising
// during the scan are reported as they start. Every advertisement start is
// appended to a transmission log.

use super::{AdvKind, BleAddress, EventSink, Radio, RadioError, RadioEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::trace;

const SIM_RSSI: i8 = -60;

/// One advertisement put on air
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    /// Index of the transmitting node
    pub from: usize,
    pub payload: Vec<u8>,
}

#[derive(Default)]
struct SimNode {
    name: String,
    active: bool,
    sink: Option<EventSink>,
    scanning: bool,
    /// Bumped on every scan start so a stale timer cannot end a newer scan
    scan_epoch: u64,
    advert: Option<Vec<u8>>,
}

#[derive(Default)]
struct AirState {
    nodes: Vec<SimNode>,
    links: HashSet<(usize, usize)>,
    log: Vec<Transmission>,
}

impl AirState {
    fn linked(&self, a: usize, b: usize) -> bool {
        self.links.contains(&(a.min(b), a.max(b)))
    }

    fn neighbours(&self, index: usize) -> Vec<usize> {
        (0..self.nodes.len())
            .filter(|&other| other != index && self.linked(index, other))
            .collect()
    }

    fn deliver(&self, to: usize, from: usize, payload: &[u8]) {
        if let Some(sink) = &self.nodes[to].sink {
            let _ = sink.send(RadioEvent::ScanResult {
                addr: sim_address(from),
                adv_type: AdvKind::AdvInd,
                rssi: SIM_RSSI,
                payload: payload.to_vec(),
            });
        }
    }

    fn complete_scan(&mut self, index: usize) {
        let node = &mut self.nodes[index];
        node.scanning = false;
        if let Some(sink) = &node.sink {
            let _ = sink.send(RadioEvent::ScanComplete);
        }
    }
}

/// Address assigned to the node at `index`
pub fn sim_address(index: usize) -> BleAddress {
    let [hi, lo] = (index as u16).to_be_bytes();
    BleAddress([0xC0, 0xFF, 0xEE, 0x00, hi, lo])
}

/// Shared medium; cheap to clone
#[derive(Clone, Default)]
pub struct SimulatedAir {
    state: Arc<Mutex<AirState>>,
}

impl SimulatedAir {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an unlinked node and return its radio
    pub fn add_node(&self, name: impl Into<String>) -> SimRadio {
        let mut state = self.state.lock();
        state.nodes.push(SimNode {
            name: name.into(),
            ..SimNode::default()
        });
        SimRadio {
            state: Arc::clone(&self.state),
            index: state.nodes.len() - 1,
        }
    }

    /// Join two nodes so each hears the other
    pub fn link(&self, a: usize, b: usize) {
        if a != b {
            self.state.lock().links.insert((a.min(b), a.max(b)));
        }
    }

    /// `count` nodes where each only hears its predecessor and successor
    pub fn chain(&self, count: usize) -> Vec<SimRadio> {
        let radios: Vec<SimRadio> = (0..count)
            .map(|i| self.add_node(format!("node-{}", i)))
            .collect();
        for pair in radios.windows(2) {
            self.link(pair[0].index, pair[1].index);
        }
        radios
    }

    pub fn node_name(&self, index: usize) -> Option<String> {
        self.state.lock().nodes.get(index).map(|n| n.name.clone())
    }

    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state.lock().log.clone()
    }

    pub fn transmissions_from(&self, index: usize) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .log
            .iter()
            .filter(|t| t.from == index)
            .map(|t| t.payload.clone())
            .collect()
    }
}

/// One node's view of the simulated medium
#[derive(Clone)]
pub struct SimRadio {
    state: Arc<Mutex<AirState>>,
    index: usize,
}

impl SimRadio {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn address(&self) -> BleAddress {
        sim_address(self.index)
    }

    fn require_active(node: &SimNode) -> Result<(), RadioError> {
        if !node.active {
            return Err(RadioError::Unavailable(format!("{} not activated", node.name)));
        }
        Ok(())
    }
}

#[async_trait]
impl Radio for SimRadio {
    async fn activate(&self) -> Result<(), RadioError> {
        self.state.lock().nodes[self.index].active = true;
        Ok(())
    }

    fn set_event_sink(&self, sink: EventSink) {
        self.state.lock().nodes[self.index].sink = Some(sink);
    }

    async fn start_scan(
        &self,
        duration: Duration,
        _interval: Duration,
        _window: Duration,
    ) -> Result<(), RadioError> {
        let epoch = {
            let mut state = self.state.lock();
            let node = &mut state.nodes[self.index];
            Self::require_active(node)?;
            if node.advert.is_some() || node.scanning {
                return Err(RadioError::Busy);
            }
            node.scanning = true;
            node.scan_epoch += 1;
            let epoch = node.scan_epoch;

            for from in state.neighbours(self.index) {
                if let Some(payload) = state.nodes[from].advert.clone() {
                    state.deliver(self.index, from, &payload);
                }
            }
            epoch
        };

        let state = Arc::clone(&self.state);
        let index = self.index;
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let mut state = state.lock();
            let node = &state.nodes[index];
            if node.scanning && node.scan_epoch == epoch {
                state.complete_scan(index);
            }
        });
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        if state.nodes[self.index].scanning {
            state.complete_scan(self.index);
        }
        Ok(())
    }

    async fn start_advertise(&self, _interval: Duration, payload: &[u8]) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        let node = &mut state.nodes[self.index];
        Self::require_active(node)?;
        if node.scanning {
            return Err(RadioError::Busy);
        }
        node.advert = Some(payload.to_vec());

        state.log.push(Transmission {
            from: self.index,
            payload: payload.to_vec(),
        });
        trace!(node = self.index, len = payload.len(), "sim advert on air");

        for to in state.neighbours(self.index) {
            if state.nodes[to].scanning {
                state.deliver(to, self.index, payload);
            }
        }
        Ok(())
    }

    async fn stop_advertise(&self) -> Result<(), RadioError> {
        self.state.lock().nodes[self.index].advert = None;
        Ok(())
    }
}
