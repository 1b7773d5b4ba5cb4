use baokit_core::{Error, Result, DEFAULT_TRANSIT_BATCH_SIZE, DEFAULT_TRANSIT_PATH};

/// Resolution policy and transit settings of a [`SecretInjector`](crate::SecretInjector)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectorConfig {
    /// Transit key used to decrypt ciphertext values
    pub transit_key_id: String,
    /// Mount path of the transit engine
    pub transit_path: String,
    /// Ciphertexts per batch decrypt call
    pub transit_batch_size: usize,
    /// Downgrade missing paths and failed decrypts to warnings
    pub ignore_missing_secrets: bool,
    /// Keep leases of read secrets alive in the background
    pub daemon_mode: bool,
}

impl Default for InjectorConfig {
    fn default() -> Self {
        Self {
            transit_key_id: String::new(),
            transit_path: DEFAULT_TRANSIT_PATH.to_string(),
            transit_batch_size: DEFAULT_TRANSIT_BATCH_SIZE,
            ignore_missing_secrets: false,
            daemon_mode: false,
        }
    }
}

impl InjectorConfig {
    #[must_use]
    pub fn with_transit_key(mut self, key_id: impl Into<String>) -> Self {
        self.transit_key_id = key_id.into();
        self
    }

    #[must_use]
    pub fn with_transit_path(mut self, path: impl Into<String>) -> Self {
        self.transit_path = path.into();
        self
    }

    #[must_use]
    pub fn with_transit_batch_size(mut self, batch_size: usize) -> Self {
        self.transit_batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn ignore_missing_secrets(mut self, ignore: bool) -> Self {
        self.ignore_missing_secrets = ignore;
        self
    }

    #[must_use]
    pub fn daemon_mode(mut self, daemon: bool) -> Self {
        self.daemon_mode = daemon;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.transit_batch_size == 0 {
            return Err(Error::configuration(
                "transit batch size must be greater than zero",
            ));
        }
        if self.transit_path.trim_matches('/').is_empty() {
            return Err(Error::configuration("transit mount path cannot be empty"));
        }
        Ok(())
    }
}
