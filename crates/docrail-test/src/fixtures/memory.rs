//! In-memory backend fixtures

use bson::{Document, doc};
use docrail_db::nosql::backends::MemoryBackend;
use rand::Rng;
use rstest::*;
use std::sync::Arc;

/// Collection the user fixtures write to
pub const USERS_COLLECTION: &str = "users";

/// Author names cycled through by [`random_users`]
pub const AUTHORS: [&str; 5] = ["guillermo", "nathan", "tj", "damian", "marco"];

/// Builds `count` user documents with random ages in `0..100`
///
/// Returns the documents and the largest age among them.
pub fn random_users(count: usize) -> (Vec<Document>, i32) {
	let mut rng = rand::thread_rng();
	let mut max_age = 0;
	let users: Vec<Document> = (0..count)
		.map(|i| {
			let age: i32 = rng.gen_range(0..100);
			max_age = max_age.max(age);
			doc! { "author": AUTHORS[i % AUTHORS.len()], "age": age }
		})
		.collect();
	(users, max_age)
}

/// Collection name with a random suffix, for tests that write side collections
pub fn unique_collection_name(prefix: &str) -> String {
	format!("{}_{:08x}", prefix, rand::thread_rng().r#gen::<u32>())
}

/// Fixture providing an empty in-memory backend
#[fixture]
pub fn memory_backend() -> Arc<MemoryBackend> {
	Arc::new(MemoryBackend::new())
}

/// Backend seeded with random users
#[derive(Debug, Clone)]
pub struct SeededUsers {
	pub backend: Arc<MemoryBackend>,
	pub max_age: i32,
	pub count: usize,
}

/// Fixture providing a backend holding ten random users in [`USERS_COLLECTION`]
///
/// # Examples
///
/// ```
/// use docrail_test::fixtures::{SeededUsers, seeded_users};
/// use rstest::rstest;
///
/// #[rstest]
/// fn test_ages(seeded_users: SeededUsers) {
///     assert!(seeded_users.max_age < 100);
/// }
/// ```
#[fixture]
pub fn seeded_users(#[default(10)] count: usize) -> SeededUsers {
	let backend = MemoryBackend::new();
	let (users, max_age) = random_users(count);
	backend.seed(USERS_COLLECTION, users);
	SeededUsers {
		backend: Arc::new(backend),
		max_age,
		count,
	}
}
