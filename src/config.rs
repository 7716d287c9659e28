use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::entity::{Module, ProvingKind};
use crate::error::Result;

pub const CONFIG_FILE: &str = "taquero.yaml";

pub const DEFAULT_BIND: &str = "127.0.0.1:8787";
pub const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Project configuration, stored as `.taquero/taquero.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the HTTP service listens on
    #[serde(default = "default_bind")]
    pub bind: String,
    /// When set, every route except /health requires this key
    #[serde(default)]
    pub api_key: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Endpoint URL per store, keyed by module slug or `proving-<kind>`
    #[serde(default)]
    pub endpoints: BTreeMap<String, String>,
    #[serde(default = "default_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoints: BTreeMap::new(),
            request_timeout_secs: default_timeout(),
        }
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Store key for a proving kind's endpoint.
pub fn proving_store_key(kind: ProvingKind) -> String {
    format!("proving-{}", kind.slug())
}

impl Config {
    /// Config whose client endpoints all point at a local `taquero serve`.
    pub fn for_local_server(bind: &str) -> Self {
        let base = format!("http://{}", bind);
        let mut endpoints = BTreeMap::new();

        for module in Module::ALL {
            endpoints.insert(
                module.slug().to_string(),
                format!("{}/api/records/{}", base, module.slug()),
            );
        }
        for kind in ProvingKind::ALL {
            endpoints.insert(
                proving_store_key(kind),
                format!("{}/api/proving/{}", base, kind.slug()),
            );
        }

        Self {
            server: ServerConfig {
                bind: bind.to_string(),
                api_key: None,
            },
            client: ClientConfig {
                endpoints,
                request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            },
        }
    }

    /// Load from the data directory (defaults if the file is absent), then
    /// apply environment overrides.
    pub fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(CONFIG_FILE);
        let mut config = if path.exists() {
            let text = fs::read_to_string(&path)?;
            serde_yaml::from_str(&text)?
        } else {
            Config::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn save(&self, data_dir: &Path) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(data_dir.join(CONFIG_FILE), yaml)?;
        Ok(())
    }

    /// Apply `TAQUERO_BIND`, `TAQUERO_API_KEY` and `TAQUERO_ENDPOINT_<STORE>`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(bind) = lookup("TAQUERO_BIND").filter(|v| !v.is_empty()) {
            self.server.bind = bind;
        }
        if let Some(key) = lookup("TAQUERO_API_KEY") {
            self.server.api_key = Some(key).filter(|k| !k.is_empty());
        }

        let stores = Module::ALL
            .iter()
            .map(|m| m.slug().to_string())
            .chain(ProvingKind::ALL.iter().map(|k| proving_store_key(*k)));
        for store in stores {
            if let Some(url) = lookup(&endpoint_env_var(&store)) {
                self.client.endpoints.insert(store, url);
            }
        }
    }

    /// Endpoint URL for a store; empty when not configured.
    pub fn endpoint(&self, store: &str) -> &str {
        self.client
            .endpoints
            .get(store)
            .map(String::as_str)
            .unwrap_or("")
    }
}

fn endpoint_env_var(store: &str) -> String {
    format!("TAQUERO_ENDPOINT_{}", store.to_uppercase().replace('-', "_"))
}
