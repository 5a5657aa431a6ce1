//! Types for global one-time configuration of the runtime parameters used by
//! the reclamation scheme.

use conquer_once::OnceCell;
use thiserror::Error;

include!(concat!(env!("OUT_DIR"), "/build_constants.rs"));

const DEFAULT_INIT_CACHE: usize = 128;
const DEFAULT_MIN_REQUIRED_RECORDS: u32 = 0;
const DEFAULT_SCAN_FACTOR: u32 = BUILD_SCAN_FACTOR;

/// Global one-time configuration for runtime parameters used for memory
/// reclamation.
///
/// Every thread reads the configuration exactly once, when it first retires a
/// record or acquires a hazard pointer.
/// Threads that started before the cell was initialized keep using the
/// default configuration.
pub static CONFIG: OnceCell<Config> = OnceCell::uninit();

////////////////////////////////////////////////////////////////////////////////////////////////////
// Config
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Runtime configuration parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Config {
    init_cache: usize,
    min_required_records: u32,
    scan_factor: u32,
}

/********** impl Default **************************************************************************/

impl Default for Config {
    #[inline]
    fn default() -> Self {
        ConfigBuilder::new().build()
    }
}

/********** impl inherent *************************************************************************/

impl Config {
    /// Creates a new [`Config`] with the given parameters
    ///
    /// # Panics
    ///
    /// This function panics, if `scan_factor` is 0.
    #[inline]
    pub fn with_params(init_cache: usize, min_required_records: u32, scan_factor: u32) -> Self {
        assert!(scan_factor > 0, "scan factor must be greater than 0");
        Self { init_cache, min_required_records, scan_factor }
    }

    /// Returns the current configuration for the calling thread, i.e. the
    /// content of [`CONFIG`] if it has been initialized or the default.
    #[inline]
    pub fn current() -> Self {
        CONFIG.try_get().ok().copied().unwrap_or_default()
    }

    /// Returns the initial capacity of the retired list of each newly created
    /// thread context.
    #[inline]
    pub fn init_cache(&self) -> usize {
        self.init_cache
    }

    /// Returns the minimum amount of retired records that is required, before
    /// an attempt at reclaiming records is initiated.
    #[inline]
    pub fn min_required_records(&self) -> u32 {
        self.min_required_records
    }

    /// Returns the scan factor in percent.
    ///
    /// A thread scans the hazard pointers once its count of retired records
    /// exceeds this percentage of the number of currently active hazard
    /// pointers.
    #[inline]
    pub fn scan_factor(&self) -> u32 {
        self.scan_factor
    }

    /// Returns `true` if `retired` records are enough to justify a scan while
    /// `active` hazard pointers are in use.
    #[inline]
    pub fn is_scan_due(&self, retired: usize, active: usize) -> bool {
        retired >= self.min_required_records as usize
            && retired.saturating_mul(100) > active.saturating_mul(self.scan_factor as usize)
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConfigBuilder
////////////////////////////////////////////////////////////////////////////////////////////////////

/// A builder type for gradually initializing a [`Config`].
///
/// This is mainly useful for keeping stability, in case the internal structure
/// of the [`Config`] type changes in the future, e.g. because further
/// parameters are added.
#[derive(Copy, Clone, Debug, Default)]
pub struct ConfigBuilder {
    init_cache: Option<usize>,
    min_required_records: Option<u32>,
    scan_factor: Option<u32>,
}

impl ConfigBuilder {
    /// Creates a new [`ConfigBuilder`] with default values.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the initial size of the retired list of each newly created
    /// thread context.
    ///
    /// If this is set to e.g. 0, retiring the first record will require the
    /// allocation of memory by the internally used data structure.
    #[inline]
    pub fn init_cache(mut self, init_cache: usize) -> Self {
        self.init_cache = Some(init_cache);
        self
    }

    /// Sets the minimum amount of records that must have been retired by a
    /// thread, before the thread may attempt to reclaim any memory.
    #[inline]
    pub fn min_required_records(mut self, min_required_records: u32) -> Self {
        self.min_required_records = Some(min_required_records);
        self
    }

    /// Sets the scan factor (in percent of the active hazard pointer count).
    #[inline]
    pub fn scan_factor(mut self, scan_factor: u32) -> Self {
        self.scan_factor = Some(scan_factor);
        self
    }

    /// Consumes the [`ConfigBuilder`] and returns a initialized [`Config`].
    ///
    /// Unspecified parameters are initialized with their default values.
    ///
    /// # Panics
    ///
    /// Panics if the scan factor was explicitly set to 0.
    #[inline]
    pub fn build(self) -> Config {
        match self.try_build() {
            Ok(config) => config,
            Err(err) => panic!("{}", err),
        }
    }

    /// Consumes the [`ConfigBuilder`] and returns a initialized [`Config`].
    ///
    /// # Errors
    ///
    /// Fails if the configured parameters are invalid.
    #[inline]
    pub fn try_build(self) -> Result<Config, ConfigError> {
        let scan_factor = self.scan_factor.unwrap_or(DEFAULT_SCAN_FACTOR);
        if scan_factor == 0 {
            return Err(ConfigError::ZeroScanFactor);
        }

        Ok(Config {
            init_cache: self.init_cache.unwrap_or(DEFAULT_INIT_CACHE),
            min_required_records: self
                .min_required_records
                .unwrap_or(DEFAULT_MIN_REQUIRED_RECORDS),
            scan_factor,
        })
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////
// ConfigError
////////////////////////////////////////////////////////////////////////////////////////////////////

/// Error type for invalid configuration parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Error)]
pub enum ConfigError {
    /// A scan factor of 0 would trigger a scan on every retired record even
    /// without any active hazard pointers.
    #[error("scan factor must be greater than 0")]
    ZeroScanFactor,
}

#[cfg(test)]
mod tests {
    use matches::assert_matches;

    use super::{Config, ConfigBuilder, ConfigError, BUILD_SCAN_FACTOR};

    #[test]
    fn default() {
        let config = Config::default();
        assert_eq!(config.init_cache(), 128);
        assert_eq!(config.min_required_records(), 0);
        assert_eq!(config.scan_factor(), BUILD_SCAN_FACTOR);
    }

    #[test]
    fn builder() {
        let config =
            ConfigBuilder::new().init_cache(8).min_required_records(4).scan_factor(200).build();
        assert_eq!(config, Config::with_params(8, 4, 200));
        assert_matches!(
            ConfigBuilder::new().scan_factor(0).try_build(),
            Err(ConfigError::ZeroScanFactor)
        );
    }

    #[test]
    #[should_panic]
    fn zero_scan_factor() {
        let _ = Config::with_params(0, 0, 0);
    }

    #[test]
    fn scan_due() {
        let config = Config::with_params(0, 0, 125);
        // 5/4 of 4 active hazards
        assert!(!config.is_scan_due(5, 4));
        assert!(config.is_scan_due(6, 4));
        // no active hazards at all
        assert!(config.is_scan_due(1, 0));
        assert!(!config.is_scan_due(0, 0));

        let config = Config::with_params(0, 10, 125);
        assert!(!config.is_scan_due(9, 0));
        assert!(config.is_scan_due(10, 0));
    }
}
