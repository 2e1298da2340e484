//! Default constants for reconciliation configuration.
//!
//! All magic numbers are centralized here with documentation.

// =============================================================================
// Numeric Comparison Defaults
// =============================================================================

/// Decimal places kept when comparing area and coverage.
pub const DEFAULT_NUMERIC_PRECISION: u32 = 2;

/// Relative difference above which a numeric field counts as changed (1%).
pub const DEFAULT_RELATIVE_THRESHOLD: f64 = 0.01;

/// Added before rounding so values on a rounding boundary round up.
pub const DEFAULT_ROUNDING_EPSILON: f64 = 1e-9;

// =============================================================================
// Environment
// =============================================================================

/// Prefix for environment variable overrides.
pub const ENV_PREFIX: &str = "PA_SYNC_";

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "PA_SYNC_CONFIG";

/// Whether hierarchy assignment and resolution run on the rayon pool.
pub const DEFAULT_PARALLEL: bool = true;
