use serde::Serialize;

/// Liveness summary over the bus and every enabled store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

impl HealthStatus {
    pub fn from_failed(mut failed: Vec<String>) -> Self {
        failed.sort();
        failed.dedup();
        let status = if failed.is_empty() { "ok" } else { "error" };
        Self {
            status: status.to_string(),
            failed,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failed.is_empty()
    }
}
