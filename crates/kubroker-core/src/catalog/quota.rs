use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

const PLAN_PREFIX: &str = "p-";

/// Resource quota tuple a plan is named after: `(cpu, memory, disk[, gpu])`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quota {
    pub cpu: String,
    pub memory: String,
    pub disk: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gpu: Option<String>,
}

impl Quota {
    pub fn new(cpu: impl Into<String>, memory: impl Into<String>, disk: impl Into<String>) -> Self {
        Self {
            cpu: cpu.into(),
            memory: memory.into(),
            disk: disk.into(),
            gpu: None,
        }
    }

    #[must_use]
    pub fn with_gpu(mut self, gpu: impl Into<String>) -> Self {
        self.gpu = Some(gpu.into());
        self
    }

    /// Builds a quota from the plan metadata bullet list.
    ///
    /// Accepts exactly three (`cpu, memory, disk`) or four (`.., gpu`) items.
    pub fn from_bullets(bullets: &[String]) -> Result<Self> {
        if bullets.iter().any(String::is_empty) {
            return Err(CatalogError::invalid_quota(format!(
                "empty quota component in {bullets:?}"
            )));
        }
        match bullets {
            [cpu, memory, disk] => Ok(Self::new(cpu, memory, disk)),
            [cpu, memory, disk, gpu] => Ok(Self::new(cpu, memory, disk).with_gpu(gpu)),
            _ => Err(CatalogError::invalid_quota(format!(
                "expected 3 or 4 quota components, got {}",
                bullets.len()
            ))),
        }
    }

    pub fn bullets(&self) -> Vec<String> {
        let mut out = vec![self.cpu.clone(), self.memory.clone(), self.disk.clone()];
        if let Some(gpu) = &self.gpu {
            out.push(gpu.clone());
        }
        out
    }

    /// The deterministic plan name for this tuple, e.g. `p-1-1Gi-10Gi`.
    pub fn plan_name(&self) -> String {
        format!("{PLAN_PREFIX}{}", self.bullets().join("-"))
    }

    /// Inverse of [`Quota::plan_name`].
    pub fn parse_plan_name(name: &str) -> Result<Self> {
        let rest = name
            .strip_prefix(PLAN_PREFIX)
            .ok_or_else(|| CatalogError::invalid_quota(format!("plan name {name} lacks prefix")))?;
        let parts: Vec<String> = rest.split('-').map(str::to_string).collect();
        Self::from_bullets(&parts)
    }
}

impl fmt::Display for Quota {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cpu={} memory={} disk={}", self.cpu, self.memory, self.disk)?;
        if let Some(gpu) = &self.gpu {
            write!(f, " gpu={gpu}")?;
        }
        Ok(())
    }
}
