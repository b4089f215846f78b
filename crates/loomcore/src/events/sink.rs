use super::base::{ExecutionEvent, RunEvent, RunId};
use tokio::sync::{broadcast, mpsc};

/// Destination for run lifecycle events.
///
/// Delivery is best-effort: an implementation must not block the caller
/// for long and must swallow its own delivery failures.
pub trait EventSink: Send + Sync {
    fn emit(&self, run_id: RunId, event: &ExecutionEvent);
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn emit(&self, _run_id: RunId, _event: &ExecutionEvent) {}
}

/// Adapts a closure into a sink.
pub struct FnSink<F>(F);

impl<F> FnSink<F>
where
    F: Fn(RunId, &ExecutionEvent) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventSink for FnSink<F>
where
    F: Fn(RunId, &ExecutionEvent) + Send + Sync,
{
    fn emit(&self, run_id: RunId, event: &ExecutionEvent) {
        (self.0)(run_id, event)
    }
}

/// Bounded queue sink. A full or closed queue drops the event.
impl EventSink for mpsc::Sender<RunEvent> {
    fn emit(&self, run_id: RunId, event: &ExecutionEvent) {
        let run_event = RunEvent {
            run_id,
            event: event.clone(),
        };
        if let Err(e) = self.try_send(run_event) {
            tracing::warn!(%run_id, event = event.name(), "Dropping event: {}", e);
        }
    }
}

/// Global event bus
pub struct EventBus {
    sender: broadcast::Sender<RunEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, event: RunEvent) {
        // no subscribers is not an error
        let _ = self.sender.send(event);
    }
}

impl EventSink for EventBus {
    fn emit(&self, run_id: RunId, event: &ExecutionEvent) {
        self.publish(RunEvent {
            run_id,
            event: event.clone(),
        });
    }
}

impl<S: EventSink + ?Sized> EventSink for std::sync::Arc<S> {
    fn emit(&self, run_id: RunId, event: &ExecutionEvent) {
        (**self).emit(run_id, event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    fn iteration_event() -> ExecutionEvent {
        ExecutionEvent::LoopIteration {
            node_id: "process".to_string(),
            iteration: 2,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn fn_sink_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink = FnSink::new(move |_, event: &ExecutionEvent| {
            captured.lock().unwrap().push(event.name());
        });

        sink.emit(Uuid::new_v4(), &iteration_event());

        assert_eq!(*seen.lock().unwrap(), vec!["loop_iteration"]);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let (tx, mut rx) = mpsc::channel(1);
        let run_id = Uuid::new_v4();

        tx.emit(run_id, &iteration_event());
        tx.emit(run_id, &iteration_event());

        assert!(rx.recv().await.is_some());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn bus_without_subscribers_is_silent() {
        let bus = EventBus::new(4);
        bus.emit(Uuid::new_v4(), &iteration_event());

        let mut rx = bus.subscribe();
        let run_id = Uuid::new_v4();
        bus.emit(run_id, &iteration_event());
        assert_eq!(rx.recv().await.unwrap().run_id, run_id);
    }

    #[test]
    fn payload_omits_tag() {
        let payload = iteration_event().payload();
        assert_eq!(payload["node_id"], "process");
        assert_eq!(payload["iteration"], 2);
        assert!(payload.get("type").is_none());
    }
}
