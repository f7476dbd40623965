//! Settings to Backend Tests
//!
//! Loads `NoSQLSettings` from files and the environment, opens a backend with
//! `connect`, and runs aggregations through it.

use docrail::conf::{NoSQLEngine, NoSQLSettings};
use docrail::nosql::backends::connect;
use docrail::nosql::types::{NoSQLBackendType, ServerVersion};
use docrail::nosql::{NoSQLBackend, NoSQLError, Repository};
use docrail_integration_tests::{User, max_age_pipeline, seed_users};
use rstest::*;
use serial_test::serial;
use std::io::Write;

fn settings_file(contents: &str) -> tempfile::NamedTempFile {
	let mut file = tempfile::NamedTempFile::new().unwrap();
	file.write_all(contents.as_bytes()).unwrap();
	file
}

/// Test opening the memory engine from a settings file
///
/// Verifies that:
/// 1. The file selects the memory engine and its server version
/// 2. Aggregations run against the connected backend
/// 3. `$out` is refused because the configured version predates it
#[rstest]
#[tokio::test]
#[serial(docrail_env)]
async fn test_connect_from_file() {
	// Arrange
	let file = settings_file(
		r#"
		engine = "memory"
		database = "reports"
		server_version = "2.4.0"
		"#,
	);
	let settings = NoSQLSettings::load(Some(file.path())).unwrap();

	// Act
	let backend = connect(&settings).await.unwrap();
	let repository = Repository::<User>::from_arc(backend);
	let max_age = seed_users(&repository, 6).await.unwrap();

	// Assert
	assert_eq!(repository.backend().backend_type(), NoSQLBackendType::Memory);
	assert_eq!(
		repository.backend().server_version().await.unwrap(),
		ServerVersion::new(2, 4, 0)
	);
	let result = repository
		.aggregate_with(max_age_pipeline())
		.unwrap()
		.await
		.unwrap();
	assert_eq!(result[0].get_i32("maxAge").unwrap(), max_age);
	let out = repository.aggregate().out("snapshot").await;
	assert!(matches!(out, Err(NoSQLError::UnsupportedFeature(_))));
}

/// Test that environment variables override the file
#[rstest]
#[tokio::test]
#[serial(docrail_env)]
async fn test_environment_overrides_file() {
	// Arrange
	let file = settings_file("database = \"from_file\"\n");
	unsafe {
		std::env::set_var("DOCRAIL_NOSQL_DATABASE", "from_env");
		std::env::set_var("DOCRAIL_NOSQL_SERVER_VERSION", "3.0.0");
	}

	// Act
	let settings = NoSQLSettings::load(Some(file.path()));

	// Cleanup before asserting so a failure does not leak state
	unsafe {
		std::env::remove_var("DOCRAIL_NOSQL_DATABASE");
		std::env::remove_var("DOCRAIL_NOSQL_SERVER_VERSION");
	}

	// Assert
	let settings = settings.unwrap();
	assert_eq!(settings.engine, NoSQLEngine::Memory);
	assert_eq!(settings.database, "from_env");
	let backend = connect(&settings).await.unwrap();
	assert!(backend.server_version().await.unwrap().supports_out());
}

/// Test that a malformed server version is a configuration error
#[rstest]
#[tokio::test]
async fn test_invalid_server_version() {
	let settings = NoSQLSettings {
		server_version: Some("latest".to_string()),
		..Default::default()
	};

	let result = connect(&settings).await;

	assert!(result.is_err());
}

/// Test that inconsistent settings are refused before a backend is built
#[rstest]
#[case("min_pool_size = 10\nmax_pool_size = 2\n")]
#[case("database = \"\"\n")]
#[tokio::test]
async fn test_invalid_settings_are_refused(#[case] contents: &str) {
	let file = settings_file(contents);

	let loaded = NoSQLSettings::from_file(file.path()).unwrap();
	let result = connect(&loaded).await;

	assert!(matches!(result, Err(NoSQLError::ConfigError(_))));
}
