// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Parsing for the gateway declaration JSON document: the `gateway`,
//! `loaders`, `modules`, and `links` blocks.

use crate::error::GatewayError;
use linkgate_broker::LinkMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_MODULES_LOCAL_PATH: &str = "./modules";
const DEFAULT_DEPLOY_PATH: &str = "./deployed-manifest.json";
const ENV_MODULES_LOCAL_PATH: &str = "LINKGATE_MODULES_LOCAL_PATH";
const ENV_DEPLOY_PATH: &str = "LINKGATE_DEPLOY_PATH";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Transport {
    Amqp,
    Mqtt,
}

/// The top-level `"gateway"` block. `modules-local-path` and
/// `deploy-path` are `Option` (rather than defaulted at parse time) so
/// the orchestrator can tell "explicitly declared" apart from "absent,
/// fall through to an environment override or the built-in default".
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewaySettings {
    #[serde(rename = "connection-string", default)]
    pub connection_string: Option<String>,
    #[serde(default)]
    pub transport: Option<Transport>,
    #[serde(rename = "modules-local-path", default)]
    pub modules_local_path: Option<String>,
    #[serde(rename = "deploy-path", default)]
    pub deploy_path: Option<String>,
}

impl GatewaySettings {
    #[must_use]
    pub fn resolved_modules_local_path(&self) -> PathBuf {
        PathBuf::from(
            self.modules_local_path
                .clone()
                .or_else(|| std::env::var(ENV_MODULES_LOCAL_PATH).ok())
                .unwrap_or_else(|| DEFAULT_MODULES_LOCAL_PATH.to_string()),
        )
    }

    #[must_use]
    pub fn resolved_deploy_path(&self) -> PathBuf {
        PathBuf::from(
            self.deploy_path
                .clone()
                .or_else(|| std::env::var(ENV_DEPLOY_PATH).ok())
                .unwrap_or_else(|| DEFAULT_DEPLOY_PATH.to_string()),
        )
    }
}

/// One entry of the `"loaders"` array. Extra loader-specific fields in
/// the source JSON are ignored by `serde` rather than rejected.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoaderDeclJson {
    pub name: String,
    #[serde(rename = "type")]
    pub loader_type: String,
}

impl From<&LoaderDeclJson> for linkgate_loader::LoaderDeclaration {
    fn from(decl: &LoaderDeclJson) -> Self {
        linkgate_loader::LoaderDeclaration {
            name: decl.name.clone(),
            loader_type: decl.loader_type.clone(),
        }
    }
}

fn default_loader_name() -> String {
    linkgate_loader::NATIVE_LOADER_NAME.to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoaderRef {
    #[serde(default = "default_loader_name")]
    pub name: String,
    pub entrypoint: serde_json::Value,
}

fn default_args() -> serde_json::Value {
    serde_json::Value::Null
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModuleDeclaration {
    pub name: String,
    #[serde(default)]
    pub version: Option<String>,
    pub loader: LoaderRef,
    #[serde(default = "default_args")]
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkDeclaration {
    pub source: String,
    pub sink: String,
    #[serde(rename = "message.type", default)]
    pub message_type: Option<String>,
}

impl LinkDeclaration {
    /// Unknown or absent `message.type` defaults to WIRE; only the
    /// literal `"thread-message"` selects DIRECT.
    #[must_use]
    pub fn mode(&self) -> LinkMode {
        match self.message_type.as_deref() {
            Some("thread-message") => LinkMode::Direct,
            _ => LinkMode::Wire,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GatewayDeclaration {
    #[serde(default)]
    pub gateway: GatewaySettings,
    #[serde(default)]
    pub loaders: Vec<LoaderDeclJson>,
    #[serde(default)]
    pub modules: Vec<ModuleDeclaration>,
    #[serde(default)]
    pub links: Vec<LinkDeclaration>,
}

impl GatewayDeclaration {
    pub fn parse(raw: &str) -> Result<Self, GatewayError> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_file(path: &Path) -> Result<Self, GatewayError> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_declaration() -> Result<(), String> {
        let raw = r#"{
            "modules": [
                { "name": "a", "loader": { "entrypoint": { "module.path": "/m/a.so" } } }
            ],
            "links": []
        }"#;
        let decl = GatewayDeclaration::parse(raw).map_err(|e| e.to_string())?;
        if decl.modules.len() != 1 {
            return Err("expected one module".to_string());
        }
        if decl.modules[0].loader.name != linkgate_loader::NATIVE_LOADER_NAME {
            return Err("loader name should default to native".to_string());
        }
        Ok(())
    }

    #[test]
    fn unknown_message_type_defaults_to_wire() {
        let link = LinkDeclaration {
            source: "a".to_string(),
            sink: "b".to_string(),
            message_type: Some("some-other-transport".to_string()),
        };
        assert_eq!(link.mode(), LinkMode::Wire);
    }

    #[test]
    fn thread_message_selects_direct() {
        let link = LinkDeclaration {
            source: "a".to_string(),
            sink: "b".to_string(),
            message_type: Some("thread-message".to_string()),
        };
        assert_eq!(link.mode(), LinkMode::Direct);
    }

    #[test]
    fn explicit_paths_take_precedence_over_defaults() {
        let settings = GatewaySettings {
            connection_string: None,
            transport: None,
            modules_local_path: Some("/custom/modules".to_string()),
            deploy_path: Some("/custom/deploy.json".to_string()),
        };
        assert_eq!(settings.resolved_modules_local_path(), PathBuf::from("/custom/modules"));
        assert_eq!(settings.resolved_deploy_path(), PathBuf::from("/custom/deploy.json"));
    }
}
