use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ForgeError;

/// Identifies one trace within a tenant's project.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceKey {
    pub tenant_id: i64,
    pub project_id: i64,
    pub trace_id: String,
}

impl TraceKey {
    pub fn new(tenant_id: i64, project_id: i64, trace_id: impl Into<String>) -> Self {
        Self {
            tenant_id,
            project_id,
            trace_id: trace_id.into(),
        }
    }

    pub fn validate(&self) -> Result<(), ForgeError> {
        if self.tenant_id <= 0 {
            return Err(ForgeError::InvalidKey(format!(
                "tenant_id must be positive, got {}",
                self.tenant_id
            )));
        }
        if self.project_id <= 0 {
            return Err(ForgeError::InvalidKey(format!(
                "project_id must be positive, got {}",
                self.project_id
            )));
        }
        if self.trace_id.trim().is_empty() {
            return Err(ForgeError::InvalidKey("trace_id is empty".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for TraceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.tenant_id, self.project_id, self.trace_id)
    }
}
