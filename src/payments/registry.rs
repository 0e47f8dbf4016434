use std::collections::BTreeMap;
use std::sync::Arc;

use super::PaymentGateway;
use crate::config::GatewayFallback;
use crate::error::{AppError, Result};

/// Adapters keyed by provider name, plus the default and the policy for
/// requests naming an unavailable gateway.
#[derive(Clone)]
pub struct GatewayRegistry {
    gateways: BTreeMap<&'static str, Arc<dyn PaymentGateway>>,
    default_gateway: String,
    fallback: GatewayFallback,
}

impl GatewayRegistry {
    pub fn new(default_gateway: &str, fallback: GatewayFallback) -> Self {
        Self {
            gateways: BTreeMap::new(),
            default_gateway: default_gateway.trim().to_ascii_lowercase(),
            fallback,
        }
    }

    pub fn register(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.name(), gateway);
        self
    }

    pub fn default_name(&self) -> &str {
        &self.default_gateway
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn PaymentGateway>> {
        self.gateways.get(name.trim().to_ascii_lowercase().as_str())
    }

    /// Names of registered gateways that report themselves configured, sorted.
    pub fn available(&self) -> Vec<&'static str> {
        self.gateways
            .iter()
            .filter(|(_, gw)| gw.is_configured())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Pick the adapter for a checkout request.
    pub fn resolve(&self, requested: Option<&str>) -> Result<Arc<dyn PaymentGateway>> {
        let requested = requested.map(str::trim).filter(|name| !name.is_empty());

        if let Some(name) = requested {
            match self.get(name) {
                Some(gateway) if gateway.is_configured() => return Ok(gateway.clone()),
                _ => match self.fallback {
                    GatewayFallback::Reject => {
                        return Err(AppError::BadRequest(format!(
                            "gateway '{}' is not available",
                            name
                        )));
                    }
                    GatewayFallback::Default => {
                        tracing::warn!(
                            requested = name,
                            default = %self.default_gateway,
                            "requested gateway unavailable; falling back to default"
                        );
                    }
                },
            }
        }

        match self.get(&self.default_gateway) {
            Some(gateway) if gateway.is_configured() => Ok(gateway.clone()),
            _ => Err(AppError::GatewayUnconfigured(self.default_gateway.clone())),
        }
    }
}
