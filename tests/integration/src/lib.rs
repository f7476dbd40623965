//! Integration test utilities for docrail
//!
//! Shared models and seeding helpers used by the suites under `tests/`.

use bson::oid::ObjectId;
use docrail_db::nosql::{Document, Repository, Result};
use serde::{Deserialize, Serialize};

/// User model the aggregation suites run against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
	#[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
	pub id: Option<ObjectId>,
	pub author: String,
	pub age: i32,
}

impl User {
	pub fn new(author: &str, age: i32) -> Self {
		Self {
			id: None,
			author: author.to_string(),
			age,
		}
	}
}

impl Document for User {
	const COLLECTION_NAME: &'static str = docrail_test::fixtures::USERS_COLLECTION;

	fn validate(&self) -> Result<()> {
		if self.author.is_empty() {
			return Err(docrail_db::nosql::NoSQLError::InvalidArgument(
				"author is required".to_string(),
			));
		}
		Ok(())
	}
}

/// Inserts `count` random users and returns the largest age written
pub async fn seed_users(repository: &Repository<User>, count: usize) -> Result<i32> {
	let (documents, max_age) = docrail_test::fixtures::random_users(count);
	let users = documents
		.into_iter()
		.map(User::from_bson_document)
		.collect::<Result<Vec<_>>>()?;
	repository.create(&users).await?;
	Ok(max_age)
}

/// The pipeline every suite uses: highest age across all users
pub fn max_age_pipeline() -> Vec<bson::Document> {
	vec![
		bson::doc! { "$group": { "_id": null, "maxAge": { "$max": "$age" } } },
		bson::doc! { "$project": { "maxAge": 1, "_id": 0 } },
	]
}
