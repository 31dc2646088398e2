//! Capture configuration
//!
//! The deny-list names the instrumentation's own modules. It defaults to the
//! install paths for this build's address width and can be replaced through
//! the `MDB_UNWIND_SKIP_LIBRARIES` environment variable (colon-separated, an
//! empty value disables filtering). It is resolved once per process.

use log::info;
use mdb_unwind_common::{DEFAULT_SKIP_LIBRARIES, SKIP_LIBRARIES_ENV};
use std::sync::OnceLock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnwindConfig {
    /// Modules whose frames never appear in a captured backtrace
    pub skip_libraries: Vec<String>,
}

impl Default for UnwindConfig {
    fn default() -> Self {
        Self { skip_libraries: DEFAULT_SKIP_LIBRARIES.iter().map(|s| (*s).to_string()).collect() }
    }
}

impl UnwindConfig {
    /// Config with an explicit deny-list
    pub fn with_skip_libraries<I, S>(libs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { skip_libraries: libs.into_iter().map(Into::into).collect() }
    }

    /// Defaults, overridden by `MDB_UNWIND_SKIP_LIBRARIES` when set
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_env_value(std::env::var(SKIP_LIBRARIES_ENV).ok().as_deref())
    }

    fn from_env_value(value: Option<&str>) -> Self {
        match value {
            Some(value) => {
                let config = Self::with_skip_libraries(parse_skip_list(value));
                info!("{SKIP_LIBRARIES_ENV} set, skipping {:?}", config.skip_libraries);
                config
            }
            None => Self::default(),
        }
    }

    /// True if frames in the module named `name` are dropped
    #[must_use]
    pub fn is_skipped(&self, name: &str) -> bool {
        self.skip_libraries.iter().any(|lib| lib == name)
    }
}

fn parse_skip_list(value: &str) -> Vec<String> {
    value.split(':').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

static PROCESS_CONFIG: OnceLock<UnwindConfig> = OnceLock::new();

/// The process-wide config, resolved from the environment on first use
pub fn process_config() -> &'static UnwindConfig {
    PROCESS_CONFIG.get_or_init(UnwindConfig::from_env)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uses_width_specific_paths() {
        let config = UnwindConfig::default();
        assert_eq!(config.skip_libraries.len(), 2);
        #[cfg(target_pointer_width = "64")]
        assert!(config.is_skipped("/system/lib64/libc_malloc_debug.so"));
        #[cfg(target_pointer_width = "32")]
        assert!(config.is_skipped("/system/lib/libc_malloc_debug.so"));
        assert!(!config.is_skipped("/system/lib64/libc.so"));
    }

    #[test]
    fn test_env_value_overrides_defaults() {
        let config = UnwindConfig::from_env_value(Some("/opt/a.so: /opt/b.so::"));
        assert_eq!(config.skip_libraries, vec!["/opt/a.so", "/opt/b.so"]);
    }

    #[test]
    fn test_empty_env_value_disables_filtering() {
        let config = UnwindConfig::from_env_value(Some(""));
        assert!(config.skip_libraries.is_empty());
        assert!(!config.is_skipped(""));
    }

    #[test]
    fn test_unset_env_value_keeps_defaults() {
        assert_eq!(UnwindConfig::from_env_value(None), UnwindConfig::default());
    }
}
