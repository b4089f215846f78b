mod base;
mod sink;

pub use base::{ExecutionEvent, RunEvent, RunId};
pub use sink::{EventBus, EventSink, FnSink, NullSink};
