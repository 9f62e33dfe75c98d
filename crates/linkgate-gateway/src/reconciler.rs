// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Compares a declared module against the deployed manifest and fetches
//! a fresh artifact when the version has changed.

use crate::declaration::ModuleDeclaration;
use crate::error::GatewayError;
use crate::manifest::DeployedManifest;
use std::path::Path;

pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Injected HTTP client collaborator. The core depends only on this
/// interface; no retries, no auth, by design (see crate docs).
pub trait HttpFetcher: Send + Sync {
    fn get(&self, url: &str) -> Result<HttpResponse, GatewayError>;
}

#[cfg(feature = "http-fetcher")]
pub struct ReqwestFetcher {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "http-fetcher")]
impl ReqwestFetcher {
    pub fn new() -> Result<Self, GatewayError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| GatewayError::Fetch(e.to_string()))?;
        Ok(Self { client })
    }
}

#[cfg(feature = "http-fetcher")]
impl Default for ReqwestFetcher {
    fn default() -> Self {
        Self::new().expect("failed to build default HTTP client")
    }
}

#[cfg(feature = "http-fetcher")]
impl HttpFetcher for ReqwestFetcher {
    fn get(&self, url: &str) -> Result<HttpResponse, GatewayError> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| GatewayError::Fetch(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|e| GatewayError::Fetch(e.to_string()))?
            .to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// Reconciles one declared module against the deployed manifest,
/// fetching a fresh artifact through `http_fetcher` when the version
/// differs and the entrypoint names a remote URL.
pub struct ConfigReconciler<'a> {
    pub modules_local_path: &'a Path,
    pub http_fetcher: Option<&'a dyn HttpFetcher>,
}

impl ConfigReconciler<'_> {
    pub fn reconcile(&self, deployed: &DeployedManifest, decl: &ModuleDeclaration) -> Result<(), GatewayError> {
        let deployed_version = deployed.find(&decl.name).and_then(|m| m.version.clone());
        if deployed_version == decl.version {
            return Ok(());
        }

        let Some(uri) = decl
            .loader
            .entrypoint
            .get("module.uri")
            .and_then(serde_json::Value::as_str)
        else {
            return Ok(());
        };
        let Some(module_path) = decl
            .loader
            .entrypoint
            .get("module.path")
            .and_then(serde_json::Value::as_str)
        else {
            return Ok(());
        };

        let Some(fetcher) = self.http_fetcher else {
            tracing::warn!(
                module = %decl.name,
                "version changed but no HttpFetcher is configured; using existing local file if present"
            );
            return Ok(());
        };

        match fetcher.get(uri) {
            Ok(response) if response.status == 200 => {
                let full_path = self.modules_local_path.join(module_path.trim_start_matches('/'));
                if let Some(parent) = full_path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                std::fs::write(&full_path, &response.body)?;
                tracing::info!(module = %decl.name, uri, path = %full_path.display(), "fetched module artifact");
                Ok(())
            }
            Ok(response) => {
                tracing::warn!(
                    module = %decl.name,
                    status = response.status,
                    "artifact fetch returned a non-200 status, falling back to existing local file"
                );
                Ok(())
            }
            Err(error) => {
                tracing::warn!(module = %decl.name, %error, "artifact fetch transport error, falling back to existing local file");
                Ok(())
            }
        }
    }
}
