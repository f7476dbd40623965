//! Model Aggregation Tests
//!
//! Runs aggregations through `Repository::aggregate` against the in-memory
//! backend, in both completion forms.

use bson::{Bson, doc};
use docrail::nosql::backends::MemoryBackend;
use docrail::nosql::types::ServerVersion;
use docrail::nosql::{Aggregate, NoSQLBackend, NoSQLError, Repository};
use docrail_integration_tests::{User, max_age_pipeline, seed_users};
use docrail_test::fixtures::{SeededUsers, memory_backend, seeded_users, unique_collection_name};
use docrail_test::init_test_logging;
use parking_lot::Mutex;
use rstest::*;
use std::sync::Arc;

/// Repository over ten random users, plus their max age
#[fixture]
fn users(seeded_users: SeededUsers) -> (Repository<User>, i32) {
	init_test_logging();
	(Repository::from_arc(seeded_users.backend), seeded_users.max_age)
}

/// Collects what a callback saw so the test can inspect it after awaiting
#[derive(Clone, Default)]
struct Seen(Arc<Mutex<Vec<Result<Vec<bson::Document>, String>>>>);

impl Seen {
	fn record(&self) -> impl FnOnce(Result<&[bson::Document], &NoSQLError>) + Send + 'static {
		let seen = self.clone();
		move |result| {
			let entry = result.map(|docs| docs.to_vec()).map_err(|e| e.to_string());
			seen.0.lock().push(entry);
		}
	}

	fn take(&self) -> Vec<Result<Vec<bson::Document>, String>> {
		std::mem::take(&mut *self.0.lock())
	}
}

/// Test awaiting an aggregation built from a stage list
///
/// Verifies that:
/// 1. The builder can be awaited directly
/// 2. The grouped maximum matches the seeded data
#[rstest]
#[tokio::test]
async fn test_aggregate_as_future(users: (Repository<User>, i32)) {
	// Arrange
	let (repository, max_age) = users;

	// Act
	let result = repository
		.aggregate_with(max_age_pipeline())
		.unwrap()
		.await
		.unwrap();

	// Assert
	assert_eq!(result, vec![doc! { "maxAge": max_age }]);
}

/// Test passing the stages as a BSON array with a callback
///
/// Verifies that:
/// 1. An array value is accepted as a pipeline
/// 2. The callback receives the results
/// 3. The returned future resolves to the same results
#[rstest]
#[tokio::test]
async fn test_aggregate_array_with_callback(users: (Repository<User>, i32)) {
	// Arrange
	let (repository, max_age) = users;
	let stages = Bson::Array(max_age_pipeline().into_iter().map(Bson::Document).collect());
	let seen = Seen::default();

	// Act
	let result = repository
		.aggregate_value(stages)
		.unwrap()
		.exec_with(seen.record())
		.await
		.unwrap();

	// Assert
	let expected = vec![doc! { "maxAge": max_age }];
	assert_eq!(seen.take(), vec![Ok(expected.clone())]);
	assert_eq!(result, expected);
}

/// Test the fluent stage methods with a callback
#[rstest]
#[tokio::test]
async fn test_fluent_with_callback(users: (Repository<User>, i32)) {
	// Arrange
	let (repository, max_age) = users;
	let seen = Seen::default();

	// Act
	repository
		.aggregate()
		.group(doc! { "_id": null, "maxAge": { "$max": "$age" } })
		.project(doc! { "maxAge": 1, "_id": 0 })
		.exec_with(seen.record())
		.await
		.unwrap();

	// Assert
	assert_eq!(seen.take(), vec![Ok(vec![doc! { "maxAge": max_age }])]);
}

/// Test the fluent stage methods without a callback
#[rstest]
#[tokio::test]
async fn test_fluent_exec(users: (Repository<User>, i32)) {
	// Arrange
	let (repository, max_age) = users;

	// Act
	let result = repository
		.aggregate()
		.group(doc! { "_id": null, "maxAge": { "$max": "$age" } })
		.project(doc! { "maxAge": 1, "_id": 0 })
		.exec()
		.await
		.unwrap();

	// Assert
	assert_eq!(result, vec![doc! { "maxAge": max_age }]);
}

/// Test that a model hands out an empty builder bound to its collection
#[rstest]
#[tokio::test]
async fn test_model_returns_builder(users: (Repository<User>, i32)) {
	let (repository, _) = users;

	let aggregate: Aggregate = repository.aggregate();

	assert!(aggregate.is_empty());
	assert_eq!(aggregate.collection_name(), "users");
	assert_eq!(
		repository.aggregate_value(Bson::Null).unwrap().pipeline(),
		&[] as &[bson::Document]
	);
}

/// Test that a lone stage value is rejected up front
///
/// Verifies that:
/// 1. A single document is refused with the spread message
/// 2. The rejection happens before anything is submitted
#[rstest]
#[tokio::test]
async fn test_rejects_spread_stage(users: (Repository<User>, i32)) {
	// Arrange
	let (repository, _) = users;
	let stage = Bson::Document(doc! { "$match": { "age": { "$gte": 0 } } });

	// Act
	let err = repository.aggregate_value(stage).unwrap_err();

	// Assert
	assert!(err.is_invalid_argument());
	assert!(err.to_string().contains("disallows passing a spread"));
}

/// Test a server-side failure reaching both the callback and the future
#[rstest]
#[tokio::test]
async fn test_unknown_stage_fails_asynchronously(users: (Repository<User>, i32)) {
	// Arrange
	let (repository, _) = users;
	let seen = Seen::default();
	let aggregate = repository
		.aggregate()
		.append(doc! { "$bogus": {} })
		.unwrap();

	// Act
	let result = aggregate.exec_with(seen.record()).await;

	// Assert
	let err = result.unwrap_err();
	assert!(err.to_string().contains("$bogus"));
	let seen = seen.take();
	assert_eq!(seen.len(), 1);
	assert!(seen[0].as_ref().unwrap_err().contains("$bogus"));
}

/// Test the `$out` helper
///
/// Verifies that:
/// 1. The pipeline result is empty
/// 2. The target collection holds the grouped output
#[rstest]
#[tokio::test]
async fn test_out_writes_collection(users: (Repository<User>, i32)) {
	// Arrange
	let (repository, max_age) = users;
	let version = repository.backend().server_version().await.unwrap();
	if !version.supports_out() {
		eprintln!("skipping: server {} has no $out", version);
		return;
	}
	let target = unique_collection_name("aggregate_out");

	// Act
	let result = repository
		.aggregate_with(max_age_pipeline())
		.unwrap()
		.out(&target)
		.await
		.unwrap();

	// Assert
	assert!(result.is_empty());
	let written = repository.collection(&target).find_all().await.unwrap();
	assert_eq!(written.len(), 1);
	assert_eq!(written[0].get_i32("maxAge").unwrap(), max_age);
	assert!(written[0].contains_key("_id"));

	// Cleanup
	repository.collection(&target).drop().await.unwrap();
}

/// Test that `$out` is refused by a server older than 2.6
#[rstest]
#[tokio::test]
async fn test_out_refused_by_old_server() {
	// Arrange
	let backend = MemoryBackend::new().with_server_version(ServerVersion::new(2, 4, 9));
	let repository = Repository::<User>::new(backend);
	seed_users(&repository, 3).await.unwrap();

	// Act
	let result = repository.aggregate().out("copies").await;

	// Assert
	assert!(matches!(result, Err(NoSQLError::UnsupportedFeature(_))));
	assert!(repository.collection("copies").find_all().await.unwrap().is_empty());
}

/// Test grouping by author over known data
#[rstest]
#[tokio::test]
async fn test_group_by_author_with_sort(memory_backend: Arc<MemoryBackend>) {
	// Arrange
	let repository = Repository::<User>::from_arc(memory_backend);
	repository
		.create(&[
			User::new("tj", 31),
			User::new("nathan", 44),
			User::new("tj", 27),
			User::new("marco", 19),
		])
		.await
		.unwrap();

	// Act
	let result = repository
		.aggregate()
		.group(doc! { "_id": "$author", "books": { "$sum": 1 }, "oldest": { "$max": "$age" } })
		.sort(doc! { "books": -1, "_id": 1 })
		.await
		.unwrap();

	// Assert
	assert_eq!(
		result,
		vec![
			doc! { "_id": "tj", "books": 2, "oldest": 31 },
			doc! { "_id": "marco", "books": 1, "oldest": 19 },
			doc! { "_id": "nathan", "books": 1, "oldest": 44 },
		]
	);
}
