use crate::core::referral::{CommissionPolicy, RATE_SCALE};
use crate::core::reward::PAY_RATE_SCALE;
use crate::core::types::{AccountId, Amount};
use crate::error::{PorError, Result};
use log::warn;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::sync::RwLock;

pub static GLOBAL_CONFIG: Lazy<Config> = Lazy::new(Config::new);

const CONFIG_PATH_KEY: &str = "POR_CONFIG";
const DB_PATH_KEY: &str = "POR_DB_PATH";
const NATIVE_BRAND_KEY: &str = "POR_NATIVE_BRAND";
const COMMISSION_RATE_KEY: &str = "POR_COMMISSION_RATE";
const COMMIT_WINDOW_KEY: &str = "POR_COMMIT_WINDOW";
const CLAIM_WINDOW_KEY: &str = "POR_CLAIM_WINDOW";

/// Everything the engine needs to know besides its collaborators
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub db_path: String,
    /// Brand paid in the native reward unit without a campaign
    pub native_brand: String,
    pub native_pay_rate: Amount,
    /// Commits are accepted this long after the source block's timestamp
    pub commit_window_secs: u64,
    /// Claims open when the commit window closes and stay open this long
    pub claim_window_secs: u64,
    /// How far the sampled bounty block may trail the mining block
    pub bounty_window_secs: u64,
    /// Parts per billion of each reward
    pub commission_rate: Amount,
    pub commission_policy: CommissionPolicy,
    pub rent_unit: Amount,
    pub max_memo_length: usize,
    pub max_bounty_recipients: u32,
    pub dust_threshold: u64,
    pub max_referral_depth: usize,
    /// Receives rent upgrade fees
    pub treasury: AccountId,
    /// Holds rent deposits and spends token cutback allowances
    pub engine_account: AccountId,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            db_path: String::from("./data/por"),
            native_brand: String::from("endur.io"),
            native_pay_rate: PAY_RATE_SCALE,
            commit_window_secs: 3600,
            claim_window_secs: 7 * 24 * 3600,
            bounty_window_secs: 3600,
            commission_rate: RATE_SCALE / 2,
            commission_policy: CommissionPolicy::FirstLive,
            rent_unit: 1000,
            max_memo_length: 80,
            max_bounty_recipients: 8,
            dust_threshold: 546,
            max_referral_depth: 64,
            treasury: AccountId::ZERO,
            engine_account: AccountId::ZERO,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(raw: &str) -> Result<EngineConfig> {
        let config: EngineConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<EngineConfig> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        EngineConfig::from_toml_str(&raw)
    }

    fn validate(&self) -> Result<()> {
        if self.commission_rate > RATE_SCALE {
            return Err(PorError::Config(format!(
                "commission_rate {} exceeds {RATE_SCALE}",
                self.commission_rate
            )));
        }
        if self.native_brand.len() > self.max_memo_length {
            return Err(PorError::Config(
                "native_brand is longer than max_memo_length".to_string(),
            ));
        }
        Ok(())
    }

    /// Apply `POR_*` environment variables on top of the loaded values
    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| env::var(key).ok())
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        fn number<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
            raw.parse()
                .map_err(|_| PorError::Config(format!("{key} is not a number: {raw}")))
        }

        if let Some(path) = lookup(DB_PATH_KEY) {
            self.db_path = path;
        }
        if let Some(brand) = lookup(NATIVE_BRAND_KEY) {
            self.native_brand = brand;
        }
        if let Some(raw) = lookup(COMMISSION_RATE_KEY) {
            self.commission_rate = number(COMMISSION_RATE_KEY, &raw)?;
        }
        if let Some(raw) = lookup(COMMIT_WINDOW_KEY) {
            self.commit_window_secs = number(COMMIT_WINDOW_KEY, &raw)?;
        }
        if let Some(raw) = lookup(CLAIM_WINDOW_KEY) {
            self.claim_window_secs = number(CLAIM_WINDOW_KEY, &raw)?;
        }
        self.validate()
    }
}

/// Process-wide settings for the command line front end
pub struct Config {
    inner: RwLock<EngineConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Config {
        let mut settings = match env::var(CONFIG_PATH_KEY) {
            Ok(path) => EngineConfig::load(&path).unwrap_or_else(|e| {
                warn!("Ignoring config file {path}: {e}");
                EngineConfig::default()
            }),
            Err(_) => EngineConfig::default(),
        };
        if let Err(e) = settings.apply_env_overrides() {
            warn!("Ignoring environment overrides: {e}");
        }
        Config {
            inner: RwLock::new(settings),
        }
    }

    /// Snapshot of the current settings
    pub fn get(&self) -> EngineConfig {
        match self.inner.read() {
            Ok(inner) => inner.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn set(&self, settings: EngineConfig) {
        match self.inner.write() {
            Ok(mut inner) => *inner = settings,
            Err(poisoned) => *poisoned.into_inner() = settings,
        }
    }

    pub fn get_db_path(&self) -> String {
        self.get().db_path
    }

    pub fn set_db_path(&self, path: String) {
        let mut settings = self.get();
        settings.db_path = path;
        self.set(settings);
    }
}
