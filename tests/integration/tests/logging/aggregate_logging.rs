//! Aggregate Logging Tests
//!
//! Checks the tracing output of an aggregation: one `aggregate` span with
//! the collection and stage count, and debug or warn events inside it.
//!
//! `#[tokio::test]` uses a current-thread runtime, so the spawned aggregation
//! is polled on the thread holding the capture guard.

use bson::doc;
use docrail::nosql::Repository;
use docrail::nosql::backends::MemoryBackend;
use docrail_integration_tests::{User, max_age_pipeline, seed_users};
use docrail_test::LogCapture;
use docrail_test::fixtures::memory_backend;
use rstest::*;
use std::sync::Arc;
use tracing::Level;

#[fixture]
fn capture() -> LogCapture {
	LogCapture::new()
}

/// Test the events of a successful aggregation
///
/// Verifies that:
/// 1. Submission and completion are logged at debug level
/// 2. Both events sit inside the `aggregate` span
/// 3. The completion event carries the result count
#[rstest]
#[tokio::test]
async fn test_successful_aggregate_is_traced(capture: LogCapture, memory_backend: Arc<MemoryBackend>) {
	// Arrange
	let _guard = capture.set_default();
	let repository = Repository::<User>::from_arc(memory_backend);
	seed_users(&repository, 5).await.unwrap();
	capture.clear();

	// Act
	let result = repository
		.aggregate_with(max_age_pipeline())
		.unwrap()
		.await
		.unwrap();

	// Assert
	assert_eq!(result.len(), 1);
	assert!(capture.contains(Level::DEBUG, "aggregate submitted"));
	let completed = capture
		.events()
		.into_iter()
		.find(|event| event.message == "aggregate completed")
		.expect("completion event");
	assert_eq!(completed.level, Level::DEBUG);
	assert_eq!(completed.field("results"), Some("1"));
	assert_eq!(completed.spans, vec!["aggregate".to_string()]);
	assert!(!capture.contains(Level::WARN, "aggregate failed"));
}

/// Test the events of a failing aggregation
#[rstest]
#[tokio::test]
async fn test_failed_aggregate_is_warned(capture: LogCapture, memory_backend: Arc<MemoryBackend>) {
	// Arrange
	let _guard = capture.set_default();
	let repository = Repository::<User>::from_arc(memory_backend);
	let aggregate = repository
		.aggregate()
		.append(doc! { "$nonsense": 1 })
		.unwrap();

	// Act
	let result = aggregate.exec().await;

	// Assert
	assert!(result.is_err());
	let failed = capture
		.events()
		.into_iter()
		.find(|event| event.message == "aggregate failed")
		.expect("failure event");
	assert_eq!(failed.level, Level::WARN);
	assert!(failed.field("error").unwrap().contains("$nonsense"));
	assert_eq!(failed.spans, vec!["aggregate".to_string()]);
	assert!(!capture.contains(Level::DEBUG, "aggregate completed"));
}

/// Test that a synchronous construction error logs nothing
#[rstest]
#[tokio::test]
async fn test_rejected_stage_logs_nothing(capture: LogCapture, memory_backend: Arc<MemoryBackend>) {
	let _guard = capture.set_default();
	let repository = Repository::<User>::from_arc(memory_backend);

	let err = repository.aggregate().append(doc! {}).unwrap_err();

	assert!(err.is_invalid_argument());
	assert!(capture.events().is_empty());
}
