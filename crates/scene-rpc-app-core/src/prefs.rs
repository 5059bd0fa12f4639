// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Receiver preferences shared by scene RPC tools.

use scene_rpc_port::{ValidationPolicy, DEFAULT_MAX_MESSAGE_BYTES};
use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigService, ConfigStore};

/// Config key under which [`ReceiverPrefs`] are stored.
pub const RECEIVER_PREFS_KEY: &str = "receiver";

/// Saved preferences for a message receiver.
///
/// Missing fields fall back to their defaults, so partial files stay valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiverPrefs {
    /// Requests larger than this are rejected before decoding.
    pub max_message_bytes: usize,
    /// Optional validation checks.
    pub policy: ValidationPolicy,
}

impl Default for ReceiverPrefs {
    fn default() -> Self {
        Self {
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
            policy: ValidationPolicy::default(),
        }
    }
}

impl ReceiverPrefs {
    /// Reject settings no receiver can run with.
    pub fn check(&self) -> Result<(), ConfigError> {
        if self.max_message_bytes == 0 {
            return Err(ConfigError::Other("max_message_bytes must be positive".into()));
        }
        Ok(())
    }
}

/// Typed access to saved [`ReceiverPrefs`].
pub trait ReceiverPrefsPort {
    /// Saved preferences, or the defaults when none are stored.
    fn load_prefs(&self) -> Result<ReceiverPrefs, ConfigError>;
    /// Persist `prefs` after checking them.
    fn save_prefs(&self, prefs: &ReceiverPrefs) -> Result<(), ConfigError>;
}

impl<S: ConfigStore> ReceiverPrefsPort for ConfigService<S> {
    fn load_prefs(&self) -> Result<ReceiverPrefs, ConfigError> {
        let prefs: ReceiverPrefs = self.load_or_default(RECEIVER_PREFS_KEY)?;
        prefs.check()?;
        Ok(prefs)
    }

    fn save_prefs(&self, prefs: &ReceiverPrefs) -> Result<(), ConfigError> {
        prefs.check()?;
        self.save(RECEIVER_PREFS_KEY, prefs)
    }
}
