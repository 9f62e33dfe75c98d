// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The persisted deployed manifest: what's actually installed, as
//! distinct from what the current declaration asks for.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeployedModule {
    pub name: String,
    pub version: Option<String>,
    #[serde(rename = "module.path")]
    pub module_path: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeployedManifest {
    #[serde(default)]
    pub modules: Vec<DeployedModule>,
}

impl DeployedManifest {
    /// Loads the manifest from `path`, or an empty manifest if it does
    /// not exist yet (the first `apply_update` against a fresh gateway).
    pub fn load(path: &Path) -> Result<Self, GatewayError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), GatewayError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    #[must_use]
    pub fn find(&self, name: &str) -> Option<&DeployedModule> {
        self.modules.iter().find(|m| m.name == name)
    }
}
