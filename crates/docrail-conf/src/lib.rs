//! # docrail Configuration
//!
//! Settings for the document store used by docrail.
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables prefixed with `DOCRAIL_NOSQL_`.
//!
//! ## Example
//!
//! ```rust
//! use docrail_conf::{NoSQLEngine, NoSQLSettings};
//!
//! let settings = NoSQLSettings::from_toml_str(
//!     r#"
//!     engine = "mongodb"
//!     url = "mongodb://localhost:27017"
//!     database = "myapp"
//!     max_pool_size = 50
//!     "#,
//! )
//! .unwrap();
//!
//! assert_eq!(settings.engine, NoSQLEngine::MongoDB);
//! assert_eq!(settings.database, "myapp");
//! ```

pub mod settings;

pub use settings::{DEFAULT_ENV_PREFIX, NoSQLEngine, NoSQLSettings, SettingsError, SettingsResult};
