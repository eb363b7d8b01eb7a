//! Ambient infrastructure shared by every converge crate.
//!
//! - [`TracingSetup`] - Installs the `tracing` subscriber for binaries
//! - [`EngineConfig`] - Tunables for planning and applying (concurrency,
//!   retries, refresh staleness, state location)
//! - [`Clock`] - Wall-clock abstraction used to stamp and age state records
//!
//! # Feature Flags
//!
//! - `test-utils` - Enables [`MockClock`] for deterministic staleness tests
//!
//! # Example
//!
//! ```no_run
//! use converge_core::{EngineConfig, TracingFormat, TracingSetup};
//! use tracing::Level;
//!
//! TracingSetup::new()
//!     .with_level(Level::DEBUG)
//!     .with_format(TracingFormat::Compact)
//!     .init();
//!
//! let config = EngineConfig::default().with_env_overrides()?;
//! # Ok::<(), converge_core::ConfigError>(())
//! ```

mod clock;
mod config;
mod tracing_setup;

pub use clock::{Clock, SystemClock};
pub use config::{ConfigError, EngineConfig, RefreshConfig, RetryConfig};
pub use tracing_setup::{TracingFormat, TracingSetup};

#[cfg(any(test, feature = "test-utils"))]
pub use clock::MockClock;
