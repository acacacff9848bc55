// Scripted radio — replays canned scan batches and records every call
//
// Each `start_scan` pops the next queued batch and pushes its events into the
// sink, followed by `ScanComplete` unless the batch was queued as silent (the
// engine then has to fall back on its own timeout).

use super::{EventSink, Radio, RadioError, RadioEvent};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::time::Duration;

/// Call made against the radio, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioCall {
    Activate,
    StartScan { duration: Duration },
    StopScan,
    StartAdvertise { interval: Duration, payload: Vec<u8> },
    StopAdvertise,
}

struct ScanBatch {
    events: Vec<RadioEvent>,
    complete: bool,
}

#[derive(Default)]
struct ScriptState {
    sink: Option<EventSink>,
    batches: VecDeque<ScanBatch>,
    calls: Vec<RadioCall>,
    failing: bool,
    fail_scans: usize,
    fail_adverts: usize,
}

#[derive(Default)]
pub struct ScriptedRadio {
    state: Mutex<ScriptState>,
}

impl ScriptedRadio {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue events for the next scan, completed with `ScanComplete`
    pub fn push_scan(&self, events: Vec<RadioEvent>) {
        self.state.lock().batches.push_back(ScanBatch {
            events,
            complete: true,
        });
    }

    /// Queue events for the next scan without a completion notification
    pub fn push_silent_scan(&self, events: Vec<RadioEvent>) {
        self.state.lock().batches.push_back(ScanBatch {
            events,
            complete: false,
        });
    }

    /// Every operation fails with `Unavailable` while set
    pub fn set_failing(&self, failing: bool) {
        self.state.lock().failing = failing;
    }

    /// Fail the next `count` scan starts
    pub fn fail_next_scans(&self, count: usize) {
        self.state.lock().fail_scans = count;
    }

    /// Fail the next `count` advertise starts
    pub fn fail_next_adverts(&self, count: usize) {
        self.state.lock().fail_adverts = count;
    }

    /// Push an arbitrary notification right now
    pub fn inject(&self, event: RadioEvent) {
        if let Some(sink) = &self.state.lock().sink {
            let _ = sink.send(event);
        }
    }

    pub fn calls(&self) -> Vec<RadioCall> {
        self.state.lock().calls.clone()
    }

    /// Payloads handed to `start_advertise`, in order
    pub fn advertised(&self) -> Vec<Vec<u8>> {
        self.state
            .lock()
            .calls
            .iter()
            .filter_map(|call| match call {
                RadioCall::StartAdvertise { payload, .. } => Some(payload.clone()),
                _ => None,
            })
            .collect()
    }

    fn check(state: &ScriptState) -> Result<(), RadioError> {
        if state.failing {
            return Err(RadioError::Unavailable("scripted failure".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl Radio for ScriptedRadio {
    async fn activate(&self) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.calls.push(RadioCall::Activate);
        Ok(())
    }

    fn set_event_sink(&self, sink: EventSink) {
        self.state.lock().sink = Some(sink);
    }

    async fn start_scan(
        &self,
        duration: Duration,
        _interval: Duration,
        _window: Duration,
    ) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        if state.fail_scans > 0 {
            state.fail_scans -= 1;
            return Err(RadioError::Unavailable("scripted scan failure".to_string()));
        }
        state.calls.push(RadioCall::StartScan { duration });

        let batch = state.batches.pop_front().unwrap_or(ScanBatch {
            events: Vec::new(),
            complete: true,
        });
        if let Some(sink) = &state.sink {
            for event in batch.events {
                let _ = sink.send(event);
            }
            if batch.complete {
                let _ = sink.send(RadioEvent::ScanComplete);
            }
        }
        Ok(())
    }

    async fn stop_scan(&self) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.calls.push(RadioCall::StopScan);
        Ok(())
    }

    async fn start_advertise(&self, interval: Duration, payload: &[u8]) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        if state.fail_adverts > 0 {
            state.fail_adverts -= 1;
            return Err(RadioError::Failed("scripted advertise failure".to_string()));
        }
        state.calls.push(RadioCall::StartAdvertise {
            interval,
            payload: payload.to_vec(),
        });
        Ok(())
    }

    async fn stop_advertise(&self) -> Result<(), RadioError> {
        let mut state = self.state.lock();
        Self::check(&state)?;
        state.calls.push(RadioCall::StopAdvertise);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::radio::event_channel;

    #[tokio::test]
    async fn test_scan_replays_batch_then_completes() {
        let radio = ScriptedRadio::new();
        let (sink, mut queue) = event_channel();
        radio.set_event_sink(sink);
        radio.push_scan(vec![RadioEvent::CentralConnect { conn_handle: 1 }]);

        let ms = Duration::from_millis(10);
        radio.start_scan(ms, ms, ms).await.unwrap();

        assert_eq!(
            queue.recv().await,
            Some(RadioEvent::CentralConnect { conn_handle: 1 })
        );
        assert_eq!(queue.recv().await, Some(RadioEvent::ScanComplete));
    }

    #[tokio::test]
    async fn test_failing_radio() {
        let radio = ScriptedRadio::new();
        radio.set_failing(true);
        assert!(matches!(
            radio.activate().await,
            Err(RadioError::Unavailable(_))
        ));
        assert!(radio.calls().is_empty());
    }

    #[tokio::test]
    async fn test_records_advertised_payloads() {
        let radio = ScriptedRadio::new();
        let interval = Duration::from_millis(500);
        radio.start_advertise(interval, &[1, 2, 3]).await.unwrap();
        radio.stop_advertise().await.unwrap();
        assert_eq!(radio.advertised(), vec![vec![1, 2, 3]]);
        assert_eq!(radio.calls().len(), 2);
    }
}
