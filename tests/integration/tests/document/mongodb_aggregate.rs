//! MongoDB Aggregation Tests
//!
//! The model aggregation scenarios against a real MongoDB server started
//! with testcontainers. Requires Docker.

#![cfg(all(feature = "mongodb", feature = "integration-tests"))]

use bson::{Bson, doc};
use docrail::nosql::backends::MongoDBBackend;
use docrail::nosql::{NoSQLBackend, NoSQLError, Repository};
use docrail_integration_tests::{User, max_age_pipeline, seed_users};
use docrail_test::fixtures::{ContainerAsync, GenericImage, mongodb_backend, unique_collection_name};
use rstest::*;
use std::sync::Arc;
use tokio::sync::oneshot;

type Mongo = (ContainerAsync<GenericImage>, Arc<MongoDBBackend>);

async fn seeded(backend: Arc<MongoDBBackend>) -> (Repository<User>, i32) {
	let repository = Repository::<User>::from_arc(backend);
	let max_age = seed_users(&repository, 10).await.unwrap();
	(repository, max_age)
}

/// Test awaiting a stage list on a real server
#[rstest]
#[tokio::test]
async fn test_mongodb_aggregate_as_future(#[future] mongodb_backend: Mongo) {
	// Arrange
	let (_container, backend) = mongodb_backend.await;
	let (repository, max_age) = seeded(backend).await;

	// Act
	let result = repository
		.aggregate_with(max_age_pipeline())
		.unwrap()
		.await
		.unwrap();

	// Assert
	assert_eq!(result, vec![doc! { "maxAge": max_age }]);
}

/// Test the callback form on a real server
///
/// Verifies that:
/// 1. The callback sees the server's result
/// 2. The future resolves to the same documents
#[rstest]
#[tokio::test]
async fn test_mongodb_fluent_with_callback(#[future] mongodb_backend: Mongo) {
	// Arrange
	let (_container, backend) = mongodb_backend.await;
	let (repository, max_age) = seeded(backend).await;
	let (tx, rx) = oneshot::channel();

	// Act
	let result = repository
		.aggregate()
		.group(doc! { "_id": null, "maxAge": { "$max": "$age" } })
		.project(doc! { "maxAge": 1, "_id": 0 })
		.exec_with(move |result| {
			let _ = tx.send(result.map(|docs| docs.to_vec()).map_err(|e| e.to_string()));
		})
		.await
		.unwrap();

	// Assert
	let seen = rx.await.unwrap().unwrap();
	assert_eq!(seen, result);
	assert_eq!(result, vec![doc! { "maxAge": max_age }]);
}

/// Test that an array value reaches the server unchanged
#[rstest]
#[tokio::test]
async fn test_mongodb_array_pipeline(#[future] mongodb_backend: Mongo) {
	// Arrange
	let (_container, backend) = mongodb_backend.await;
	let (repository, max_age) = seeded(backend).await;
	let stages = Bson::Array(max_age_pipeline().into_iter().map(Bson::Document).collect());

	// Act
	let result = repository.aggregate_value(stages).unwrap().exec().await.unwrap();

	// Assert
	assert_eq!(result[0].get_i32("maxAge").unwrap(), max_age);
}

/// Test that a server-side error comes back through the future
#[rstest]
#[tokio::test]
async fn test_mongodb_unknown_stage(#[future] mongodb_backend: Mongo) {
	// Arrange
	let (_container, backend) = mongodb_backend.await;
	let (repository, _) = seeded(backend).await;

	// Act
	let result = repository
		.aggregate()
		.append(doc! { "$bogus": {} })
		.unwrap()
		.await;

	// Assert
	assert!(matches!(result, Err(NoSQLError::DatabaseError(_))));
}

/// Test the `$out` helper on a real server
#[rstest]
#[tokio::test]
async fn test_mongodb_out(#[future] mongodb_backend: Mongo) {
	// Arrange
	let (_container, backend) = mongodb_backend.await;
	let (repository, max_age) = seeded(backend).await;
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

	// Cleanup
	repository.collection(&target).drop().await.unwrap();
}
