//! Symbol → backend lookup
//!
//! Built once from the `coins:` section of the configuration. Node clients
//! are shared between all coins of the same kind.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{
    BackendSettings, EngineBackend, EngineNode, GrapheneBackend, GrapheneNode, LedgerBackend,
    SteemBackend, SteemNode,
};
use crate::config::{AppConfig, BackendKind};
use crate::error::LedgerError;
use crate::health::HealthReport;
use crate::keys::{KeyStore, TransactionSigner};
use crate::rpc::RpcError;

#[derive(Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn LedgerBackend>>,
}

fn node_error(section: &str, e: RpcError) -> LedgerError {
    LedgerError::Configuration(format!("cannot create {} client: {}", section, e))
}

fn missing_section(section: &str) -> LedgerError {
    LedgerError::Configuration(format!("missing `{}` section", section))
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register under the backend's upper-cased symbol, replacing any
    /// previous backend for it.
    pub fn register(&mut self, backend: Arc<dyn LedgerBackend>) {
        self.backends
            .insert(backend.symbol().to_uppercase(), backend);
    }

    pub fn get(&self, symbol: &str) -> Result<Arc<dyn LedgerBackend>, LedgerError> {
        self.backends
            .get(&symbol.trim().to_uppercase())
            .cloned()
            .ok_or_else(|| {
                LedgerError::Configuration(format!("No backend configured for coin {}", symbol))
            })
    }

    /// Registered symbols, sorted
    pub fn symbols(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Build every configured coin's backend over HTTP node clients.
    pub fn from_config(
        config: &AppConfig,
        keys: Arc<dyn KeyStore>,
        signer: Arc<dyn TransactionSigner>,
    ) -> Result<Self, LedgerError> {
        let timeout = Duration::from_secs(config.rpc_timeout_secs);

        let graphene = match &config.graphene {
            Some(node) => Some(Arc::new(
                GrapheneNode::new(node, timeout, signer.clone())
                    .map_err(|e| node_error("graphene", e))?,
            )),
            None => None,
        };
        let steem = match &config.steem {
            Some(node) => Some(Arc::new(
                SteemNode::new(node, timeout, signer.clone()).map_err(|e| node_error("steem", e))?,
            )),
            None => None,
        };
        let engine = match &config.steem_engine {
            Some(node) => Some((
                Arc::new(EngineNode::new(node, timeout).map_err(|e| node_error("steem_engine", e))?),
                node.sidechain_id.clone(),
            )),
            None => None,
        };

        let mut registry = Self::new();
        for coin in &config.coins {
            let settings = BackendSettings::from(coin);
            let backend: Arc<dyn LedgerBackend> = match coin.kind {
                BackendKind::Graphene => {
                    let api = graphene.clone().ok_or_else(|| missing_section("graphene"))?;
                    Arc::new(GrapheneBackend::new(settings, api, keys.clone()))
                }
                BackendKind::Steem => {
                    let api = steem.clone().ok_or_else(|| missing_section("steem"))?;
                    Arc::new(SteemBackend::new(settings, api, keys.clone()))
                }
                BackendKind::SteemEngine => {
                    let (api, sidechain_id) =
                        engine.clone().ok_or_else(|| missing_section("steem_engine"))?;
                    let steem = steem.clone().ok_or_else(|| missing_section("steem"))?;
                    Arc::new(EngineBackend::new(
                        settings,
                        api,
                        steem,
                        keys.clone(),
                        sidechain_id,
                    ))
                }
            };
            info!(symbol = %backend.symbol(), backend = backend.name(), "registered coin");
            registry.register(backend);
        }
        Ok(registry)
    }

    /// Health of every backend, one after another, in symbol order.
    pub async fn health_all(&self) -> Vec<HealthReport> {
        let mut reports = Vec::with_capacity(self.backends.len());
        for backend in self.backends.values() {
            reports.push(backend.health_check().await);
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::keys::{MemoryKeyStore, OfflineSigner};

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(MockBackend::new("SGTK", Some("privex"))));
        registry.register(Arc::new(MockBackend::new("ENG", None)));

        assert_eq!(registry.get("sgtk").unwrap().symbol(), "SGTK");
        assert_eq!(registry.symbols(), vec!["ENG", "SGTK"]);
        assert_eq!(registry.len(), 2);

        let err = registry.get("BTC").err().unwrap();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn test_from_config_builds_each_kind() {
        let config = AppConfig::from_yaml(
            r#"
log_level: "info"
log_dir: "./logs"
log_file: "ledger_bridge.log"
use_json: false
rotation: "never"
graphene:
  url: "http://127.0.0.1:8090"
steem:
  url: "http://127.0.0.1:8091"
steem_engine:
  rpc_url: "http://127.0.0.1:5000/contracts"
  history_url: "http://127.0.0.1:5001/history"
coins:
  - symbol: "sgtk"
    kind: graphene
    our_account: "privex"
  - symbol: "STEEM"
    kind: steem
  - symbol: "ENG"
    kind: steem_engine
"#,
        )
        .unwrap();

        let registry = BackendRegistry::from_config(
            &config,
            Arc::new(MemoryKeyStore::new()),
            Arc::new(OfflineSigner),
        )
        .unwrap();

        assert_eq!(registry.symbols(), vec!["ENG", "SGTK", "STEEM"]);
        assert_eq!(registry.get("SGTK").unwrap().name(), "GrapheneBackend");
        assert_eq!(registry.get("ENG").unwrap().name(), "EngineBackend");
        assert_eq!(
            registry.get("SGTK").unwrap().platform_account(),
            Some("privex")
        );
        assert!(registry.get("STEEM").unwrap().deposit_target().is_none());
    }

    #[tokio::test]
    async fn test_health_all_in_symbol_order() {
        let mut registry = BackendRegistry::new();
        registry.register(Arc::new(MockBackend::new("STEEM", None)));
        registry.register(Arc::new(MockBackend::new("ENG", None)));

        let reports = registry.health_all().await;
        let symbols: Vec<&str> = reports.iter().map(|r| r.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ENG", "STEEM"]);
    }
}
