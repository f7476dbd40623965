//! rstest fixtures
//!
//! In-memory fixtures are always available. The MongoDB container fixtures
//! need the `testcontainers` feature and a working Docker daemon.

pub mod memory;
#[cfg(feature = "testcontainers")]
pub mod testcontainers;

pub use memory::{
	AUTHORS, SeededUsers, USERS_COLLECTION, memory_backend, random_users, seeded_users,
	unique_collection_name,
};

#[cfg(feature = "testcontainers")]
pub use testcontainers::{ContainerAsync, GenericImage, mongodb_backend, mongodb_container};
