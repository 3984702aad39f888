//! Unified health check types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health status for a service or component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Component is fully operational
    Healthy,
    /// Component is operational but degraded
    Degraded,
    /// Component is not operational
    Unhealthy,
}

impl HealthStatus {
    /// Worst of two statuses.
    pub fn worst(self, other: HealthStatus) -> HealthStatus {
        use HealthStatus::*;
        match (self, other) {
            (Unhealthy, _) | (_, Unhealthy) => Unhealthy,
            (Degraded, _) | (_, Degraded) => Degraded,
            _ => Healthy,
        }
    }
}

/// Health check result for one component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub status: HealthStatus,
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, serde_json::Value>>,
}

impl HealthCheck {
    pub fn healthy(component: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Healthy,
            component: component.into(),
            message: None,
            metadata: None,
        }
    }

    pub fn degraded(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Degraded,
            component: component.into(),
            message: Some(message.into()),
            metadata: None,
        }
    }

    pub fn unhealthy(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            component: component.into(),
            message: Some(message.into()),
            metadata: None,
        }
    }

    /// Add metadata.
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata
            .get_or_insert_with(HashMap::new)
            .insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_status() {
        use HealthStatus::*;
        assert_eq!(Healthy.worst(Healthy), Healthy);
        assert_eq!(Healthy.worst(Degraded), Degraded);
        assert_eq!(Degraded.worst(Unhealthy), Unhealthy);
    }

    #[test]
    fn test_health_check_serialization() -> Result<(), serde_json::Error> {
        let check = HealthCheck::degraded("sink", "3 batches pending")
            .with_metadata("queued", serde_json::json!(3));
        let json = serde_json::to_value(&check)?;
        assert_eq!(json["status"], "degraded");
        assert_eq!(json["component"], "sink");
        assert_eq!(json["metadata"]["queued"], 3);
        Ok(())
    }
}
