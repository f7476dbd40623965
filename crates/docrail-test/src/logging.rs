//! Test logging utilities
//!
//! Provides utilities for initializing logging in test environments and for
//! capturing `tracing` events so tests can assert on them.

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Once};
use tracing::Level;
use tracing::field::{Field, Visit};
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

static INIT: Once = Once::new();

/// Initialize logging for tests (call once)
///
/// Installs a `tracing-subscriber` fmt subscriber writing through the test
/// harness at `DEBUG` level. Later calls are no-ops, as are calls after
/// another global subscriber was installed.
///
/// # Examples
///
/// ```
/// use docrail_test::logging::init_test_logging;
///
/// init_test_logging();
/// tracing::debug!("visible with --nocapture");
/// ```
pub fn init_test_logging() {
	INIT.call_once(|| {
		let _ = tracing_subscriber::fmt()
			.with_test_writer()
			.with_max_level(Level::DEBUG)
			.try_init();
	});
}

/// One event recorded by [`LogCapture`]
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedEvent {
	pub level: Level,
	pub target: String,
	pub message: String,
	/// Other fields as `(name, debug rendering)` pairs
	pub fields: Vec<(String, String)>,
	/// Names of the enclosing spans, outermost first
	pub spans: Vec<String>,
}

impl CapturedEvent {
	pub fn field(&self, name: &str) -> Option<&str> {
		self.fields
			.iter()
			.find(|(key, _)| key == name)
			.map(|(_, value)| value.as_str())
	}
}

impl fmt::Display for CapturedEvent {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "[{}] {}", self.level, self.message)
	}
}

/// `tracing_subscriber` layer recording events in memory
///
/// # Examples
///
/// ```
/// use docrail_test::logging::LogCapture;
///
/// let capture = LogCapture::new();
/// {
///     let _guard = capture.set_default();
///     tracing::warn!(attempt = 2, "retrying");
/// }
/// assert!(capture.contains(tracing::Level::WARN, "retrying"));
/// ```
#[derive(Clone, Default)]
pub struct LogCapture {
	events: Arc<Mutex<Vec<CapturedEvent>>>,
}

impl LogCapture {
	pub fn new() -> Self {
		Self::default()
	}

	/// Installs a registry with this layer as the thread's default subscriber
	///
	/// Events from tasks polled on other threads are not seen; use a
	/// current-thread runtime when capturing async code.
	pub fn set_default(&self) -> DefaultGuard {
		tracing_subscriber::registry()
			.with(self.clone())
			.set_default()
	}

	/// Snapshot of the events recorded so far
	pub fn events(&self) -> Vec<CapturedEvent> {
		self.events.lock().clone()
	}

	/// Whether an event at `level` has a message containing `needle`
	pub fn contains(&self, level: Level, needle: &str) -> bool {
		self.events
			.lock()
			.iter()
			.any(|event| event.level == level && event.message.contains(needle))
	}

	pub fn clear(&self) {
		self.events.lock().clear();
	}
}

impl fmt::Debug for LogCapture {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LogCapture")
			.field("events", &self.events.lock().len())
			.finish()
	}
}

#[derive(Default)]
struct EventVisitor {
	message: String,
	fields: Vec<(String, String)>,
}

impl Visit for EventVisitor {
	fn record_str(&mut self, field: &Field, value: &str) {
		if field.name() == "message" {
			self.message = value.to_string();
		} else {
			self.fields.push((field.name().to_string(), value.to_string()));
		}
	}

	fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
		if field.name() == "message" {
			self.message = format!("{:?}", value);
		} else {
			self.fields
				.push((field.name().to_string(), format!("{:?}", value)));
		}
	}
}

impl<S> tracing_subscriber::Layer<S> for LogCapture
where
	S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
	fn on_event(&self, event: &tracing::Event<'_>, ctx: Context<'_, S>) {
		let mut visitor = EventVisitor::default();
		event.record(&mut visitor);

		let spans = ctx
			.event_scope(event)
			.map(|scope| scope.from_root().map(|span| span.name().to_string()).collect())
			.unwrap_or_default();

		self.events.lock().push(CapturedEvent {
			level: *event.metadata().level(),
			target: event.metadata().target().to_string(),
			message: visitor.message,
			fields: visitor.fields,
			spans,
		});
	}
}
