//! Events describing what a pass did to a lock, for whoever watches the lock.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
	Normal,
	Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
	pub event_type: EventType,
	/// Short machine readable cause, such as `ResolveDependency`.
	pub reason: String,
	pub message: String,
}

impl Event {
	pub fn normal(reason: impl Into<String>, message: impl Into<String>) -> Self {
		Self { event_type: EventType::Normal, reason: reason.into(), message: message.into() }
	}

	pub fn warning(reason: impl Into<String>, message: impl Into<String>) -> Self {
		Self { event_type: EventType::Warning, reason: reason.into(), message: message.into() }
	}
}

pub trait Recorder: Send + Sync {
	fn record(&self, lock: &str, event: Event);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NopRecorder;

impl Recorder for NopRecorder {
	fn record(&self, _lock: &str, _event: Event) {}
}

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecorder;

impl Recorder for LogRecorder {
	fn record(&self, lock: &str, event: Event) {
		match event.event_type {
			EventType::Normal => log::info!("lock {}: {}: {}", lock, event.reason, event.message),
			EventType::Warning => log::warn!("lock {}: {}: {}", lock, event.reason, event.message),
		}
	}
}
