//! Per-chain token symbols and DEX routers

use crate::config::{DexConfig, Settings};
use crate::error::{MonitorError, MonitorResult};

use ethers::types::Address;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
struct ChainRoutes {
    /// Upper-cased symbol -> token address
    tokens: HashMap<String, Address>,
    dex: Option<DexConfig>,
}

/// Routing table built from the enabled chains in the settings
#[derive(Debug, Clone, Default)]
pub struct RouteBook {
    chains: HashMap<u64, ChainRoutes>,
}

impl RouteBook {
    pub fn from_settings(settings: &Settings) -> MonitorResult<Self> {
        let mut book = Self::default();

        for (_, chain) in settings.enabled_chains() {
            for (symbol, address) in &chain.tokens {
                let token = address.parse().map_err(|e| {
                    MonitorError::Configuration(format!(
                        "Invalid address {:?} for token {} on chain {}: {}",
                        address, symbol, chain.chain_id, e
                    ))
                })?;
                book.add_token(chain.chain_id, symbol, token);
            }
            if let Some(dex) = &chain.dex {
                book.set_dex(chain.chain_id, dex.clone());
            }
        }

        Ok(book)
    }

    pub fn add_token(&mut self, chain_id: u64, symbol: &str, address: Address) {
        self.chains
            .entry(chain_id)
            .or_default()
            .tokens
            .insert(symbol.to_uppercase(), address);
    }

    pub fn set_dex(&mut self, chain_id: u64, dex: DexConfig) {
        self.chains.entry(chain_id).or_default().dex = Some(dex);
    }

    /// Case-insensitive symbol lookup
    pub fn resolve_token(&self, chain_id: u64, symbol: &str) -> MonitorResult<Address> {
        let routes = self
            .chains
            .get(&chain_id)
            .ok_or(MonitorError::ChainNotConfigured { chain_id })?;

        routes
            .tokens
            .get(&symbol.to_uppercase())
            .copied()
            .ok_or_else(|| {
                MonitorError::Configuration(format!(
                    "Token {} is not configured on chain {}",
                    symbol, chain_id
                ))
            })
    }

    pub fn dex(&self, chain_id: u64) -> MonitorResult<&DexConfig> {
        self.chains
            .get(&chain_id)
            .and_then(|routes| routes.dex.as_ref())
            .ok_or_else(|| {
                MonitorError::Configuration(format!("No DEX configured on chain {}", chain_id))
            })
    }
}
