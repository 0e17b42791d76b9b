//! Persisted settings document
//!
//! `LockSettings` is the JSON document shared with the surrounding settings
//! layer. Field names are camelCase on disk. Missing keys take their defaults
//! so older files keep loading.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    credential::Credential, CoreError, Result, DEFAULT_INACTIVITY_TIMEOUT_MINUTES,
};

/// Interface language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Language {
    #[default]
    En,
    ZhCn,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::ZhCn => "zh-cn",
        }
    }
}

impl FromStr for Language {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "zh-cn" => Ok(Language::ZhCn),
            other => Err(CoreError::UnsupportedLanguage(other.to_string())),
        }
    }
}

// Unknown codes in a stored document fall back to English
impl From<String> for Language {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<Language> for String {
    fn from(lang: Language) -> Self {
        lang.code().to_string()
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Which events re-engage the lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerConfig {
    pub lock_on_startup: bool,
    pub lock_on_inactivity: bool,
    pub lock_on_window_blur: bool,
    /// Minutes without activity before locking; only used with `lock_on_inactivity`
    pub inactivity_timeout_minutes: u32,
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            lock_on_startup: true,
            lock_on_inactivity: true,
            lock_on_window_blur: false,
            inactivity_timeout_minutes: DEFAULT_INACTIVITY_TIMEOUT_MINUTES,
        }
    }
}

impl TriggerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.inactivity_timeout_minutes == 0 {
            return Err(CoreError::InvalidTimeout(self.inactivity_timeout_minutes));
        }
        Ok(())
    }

    /// Replace an out-of-range timeout with the default
    pub fn sanitized(mut self) -> Self {
        if self.validate().is_err() {
            self.inactivity_timeout_minutes = DEFAULT_INACTIVITY_TIMEOUT_MINUTES;
        }
        self
    }

    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.inactivity_timeout_minutes) * 60)
    }

    pub fn inactivity_timeout_millis(&self) -> u64 {
        u64::from(self.inactivity_timeout_minutes) * 60 * 1000
    }
}

/// Attempt counter and lockout deadline
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockoutState {
    /// Consecutive failures since the last success or reset
    pub attempts: u32,
    /// Epoch millis until which attempts are refused; 0 when not locked
    pub locked_until: u64,
    /// Epoch millis of the last successful verification
    pub last_unlock_time: u64,
}

impl LockoutState {
    /// Check whether attempts are refused at `now`
    pub fn is_locked_out(&self, now: u64) -> bool {
        self.locked_until > now
    }

    /// Milliseconds of lockout left, if any
    pub fn locked_for(&self, now: u64) -> Option<u64> {
        if self.is_locked_out(now) {
            Some(self.locked_until - now)
        } else {
            None
        }
    }
}

/// The full persisted document
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LockSettings {
    /// Hex digest, empty when no credential is configured
    pub password_hash: String,
    /// Hex salt, empty when no credential is configured
    pub salt: String,
    pub lock_on_startup: bool,
    pub lock_on_inactivity: bool,
    pub lock_on_window_blur: bool,
    /// Minutes
    pub inactivity_timeout: u32,
    pub attempts: u32,
    pub last_unlock_time: u64,
    pub locked_until: u64,
    pub language: Language,
}

impl Default for LockSettings {
    fn default() -> Self {
        let triggers = TriggerConfig::default();
        Self {
            password_hash: String::new(),
            salt: String::new(),
            lock_on_startup: triggers.lock_on_startup,
            lock_on_inactivity: triggers.lock_on_inactivity,
            lock_on_window_blur: triggers.lock_on_window_blur,
            inactivity_timeout: triggers.inactivity_timeout_minutes,
            attempts: 0,
            last_unlock_time: 0,
            locked_until: 0,
            language: Language::default(),
        }
    }
}

impl LockSettings {
    /// True when both digest and salt are present
    pub fn has_credential(&self) -> bool {
        !self.password_hash.is_empty() && !self.salt.is_empty()
    }

    /// Decode the stored credential, if any
    pub fn credential(&self) -> Result<Option<Credential>> {
        Credential::from_hex_parts(&self.password_hash, &self.salt)
    }

    /// Store a credential; digest and salt are always written together
    pub fn set_credential(&mut self, credential: &Credential) {
        self.password_hash = credential.digest().to_hex();
        self.salt = credential.salt().to_hex();
    }

    pub fn clear_credential(&mut self) {
        self.password_hash.clear();
        self.salt.clear();
    }

    /// Trigger settings, with an invalid stored timeout replaced by the default
    pub fn triggers(&self) -> TriggerConfig {
        TriggerConfig {
            lock_on_startup: self.lock_on_startup,
            lock_on_inactivity: self.lock_on_inactivity,
            lock_on_window_blur: self.lock_on_window_blur,
            inactivity_timeout_minutes: self.inactivity_timeout,
        }
        .sanitized()
    }

    pub fn apply_triggers(&mut self, triggers: &TriggerConfig) {
        self.lock_on_startup = triggers.lock_on_startup;
        self.lock_on_inactivity = triggers.lock_on_inactivity;
        self.lock_on_window_blur = triggers.lock_on_window_blur;
        self.inactivity_timeout = triggers.inactivity_timeout_minutes;
    }

    pub fn lockout(&self) -> LockoutState {
        LockoutState {
            attempts: self.attempts,
            locked_until: self.locked_until,
            last_unlock_time: self.last_unlock_time,
        }
    }

    pub fn apply_lockout(&mut self, state: &LockoutState) {
        self.attempts = state.attempts;
        self.locked_until = state.locked_until;
        self.last_unlock_time = state.last_unlock_time;
    }
}

// Hash and salt stay out of logs
impl fmt::Debug for LockSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockSettings")
            .field("has_credential", &self.has_credential())
            .field("lock_on_startup", &self.lock_on_startup)
            .field("lock_on_inactivity", &self.lock_on_inactivity)
            .field("lock_on_window_blur", &self.lock_on_window_blur)
            .field("inactivity_timeout", &self.inactivity_timeout)
            .field("attempts", &self.attempts)
            .field("last_unlock_time", &self.last_unlock_time)
            .field("locked_until", &self.locked_until)
            .field("language", &self.language)
            .finish()
    }
}
