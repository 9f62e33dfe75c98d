// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Ties the broker, loader registry, and event system together behind
//! a single handle that can build a gateway from a declaration, apply
//! hot updates to it, and tear it down.

use crate::cloud::{CloudIntegration, CloudTwinClient};
use crate::declaration::{GatewayDeclaration, LinkDeclaration, ModuleDeclaration};
use crate::error::GatewayError;
use crate::events::{Event, EventSystem, Topic};
use crate::manifest::{DeployedManifest, DeployedModule};
use crate::reconciler::{ConfigReconciler, HttpFetcher};
use linkgate_broker::{Broker, Link, LoaderInfo, ModuleHandle, ModuleSpec};
use linkgate_loader::LoaderRegistry;
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStatus {
    Idle,
    Updating,
    Updated,
}

struct OrchestratorInner {
    broker: Broker,
    loaders: LoaderRegistry,
    events: EventSystem,
    modules: Mutex<HashMap<String, ModuleHandle>>,
    links: Mutex<Vec<(ModuleHandle, ModuleHandle)>>,
    status: Mutex<UpdateStatus>,
    status_cv: Condvar,
    deploy_path: Mutex<PathBuf>,
    modules_local_path: Mutex<PathBuf>,
    http_fetcher: Option<Arc<dyn HttpFetcher>>,
    cloud: Mutex<Option<CloudIntegration>>,
}

/// Builds, updates, and tears down one gateway instance. Cheap to
/// clone, mirroring [`linkgate_broker::Broker`]'s shared-ownership
/// pattern: a clone is what the cloud-twin background thread holds to
/// call [`Self::apply_update`] from its own thread.
#[derive(Clone)]
pub struct GatewayOrchestrator(Arc<OrchestratorInner>);

impl GatewayOrchestrator {
    /// Builds a gateway from a parsed declaration: creates the broker,
    /// initializes the loader registry, then adds every declared module
    /// and link transactionally (a failure partway through rolls back
    /// everything already added).
    pub fn create_from_declaration(
        declaration: &GatewayDeclaration,
        http_fetcher: Option<Arc<dyn HttpFetcher>>,
        cloud_twin: Option<Arc<dyn CloudTwinClient>>,
    ) -> Result<Self, GatewayError> {
        let broker = Broker::create()?;
        let loaders = LoaderRegistry::new();
        loaders.initialize_defaults();
        let declared_loaders: Vec<_> = declaration.loaders.iter().map(Into::into).collect();
        loaders.initialize_from_manifest(&declared_loaders);

        let inner = Arc::new(OrchestratorInner {
            broker,
            loaders,
            events: EventSystem::new(),
            modules: Mutex::new(HashMap::new()),
            links: Mutex::new(Vec::new()),
            status: Mutex::new(UpdateStatus::Idle),
            status_cv: Condvar::new(),
            deploy_path: Mutex::new(declaration.gateway.resolved_deploy_path()),
            modules_local_path: Mutex::new(declaration.gateway.resolved_modules_local_path()),
            http_fetcher,
            cloud: Mutex::new(None),
        });
        let orchestrator = Self(inner);

        let added_modules = orchestrator.add_modules_transactional(&declaration.modules)?;
        if let Err(error) = orchestrator.add_links_transactional(&declaration.links) {
            orchestrator.rollback_modules(&added_modules);
            return Err(error);
        }

        if let Some(client) = cloud_twin {
            let integration = CloudIntegration::spawn(client, orchestrator.clone());
            *orchestrator.0.cloud.lock() = Some(integration);
        }

        Ok(orchestrator)
    }

    /// Starts every registered module and reports `ModuleListChanged`.
    pub fn start(&self) -> Result<(), GatewayError> {
        let handles: Vec<ModuleHandle> = self.0.modules.lock().values().copied().collect();
        for handle in handles {
            self.0.broker.start_module(handle)?;
        }
        self.0.events.report(Topic::ModuleListChanged, Event::ModuleListChanged);
        Ok(())
    }

    pub fn subscribe(&self, topic: Topic, callback: Arc<dyn Fn(Event) + Send + Sync>) {
        self.0.events.subscribe(topic, callback);
    }

    /// Applies a new declaration on top of the running gateway: waits
    /// for any update already in flight to finish, reconciles every
    /// declared module's artifact against the deployed manifest, adds
    /// any new modules and links (rolling back on failure), persists
    /// the updated manifest, and reports `ModuleListChanged`.
    ///
    /// Status always ends at `Updated`, whether or not the body
    /// succeeded — a failed update still leaves the gateway servicing
    /// whatever was running before, so it is not "still updating".
    pub fn apply_update(&self, declaration_json: &str) -> Result<(), GatewayError> {
        // The wait and the Idle/Updated -> Updating transition happen in one
        // critical section: `Condvar::wait` reacquires the lock before
        // returning, so the loop below still holds `status` when it exits,
        // and no other caller can observe Idle/Updated and start its own
        // update before this one claims Updating.
        let mut status = self.0.status.lock();
        while *status == UpdateStatus::Updating {
            self.0.status_cv.wait(&mut status);
        }
        *status = UpdateStatus::Updating;
        drop(status);
        self.0.status_cv.notify_all();

        let result = self.apply_update_body(declaration_json);

        let mut status = self.0.status.lock();
        *status = UpdateStatus::Updated;
        self.0.status_cv.notify_all();
        drop(status);

        result
    }

    fn apply_update_body(&self, declaration_json: &str) -> Result<(), GatewayError> {
        let declaration = GatewayDeclaration::parse(declaration_json)?;
        let deploy_path = self.0.deploy_path.lock().clone();
        let modules_local_path = self.0.modules_local_path.lock().clone();
        let deployed = DeployedManifest::load(&deploy_path)?;

        let reconciler = ConfigReconciler {
            modules_local_path: &modules_local_path,
            http_fetcher: self.0.http_fetcher.as_deref(),
        };
        for module_decl in &declaration.modules {
            reconciler.reconcile(&deployed, module_decl)?;
        }

        let new_modules: Vec<_> = declaration
            .modules
            .iter()
            .filter(|m| !self.0.modules.lock().contains_key(&m.name))
            .cloned()
            .collect();
        let added_modules = self.add_modules_transactional(&new_modules)?;

        // Only drop links that are already present; a link whose source or
        // sink name does not resolve is passed through so that
        // `add_links_transactional`'s `UnknownModule` check fires and
        // triggers the links-then-modules rollback, rather than being
        // silently treated as a no-op.
        let new_links: Vec<_> = declaration
            .links
            .iter()
            .filter(|l| {
                let modules = self.0.modules.lock();
                match (modules.get(&l.source), modules.get(&l.sink)) {
                    (Some(&source), Some(&sink)) => !self.0.links.lock().contains(&(source, sink)),
                    _ => true,
                }
            })
            .cloned()
            .collect();
        if let Err(error) = self.add_links_transactional(&new_links) {
            self.rollback_modules(&added_modules);
            return Err(error);
        }

        let updated_manifest = DeployedManifest {
            modules: declaration
                .modules
                .iter()
                .map(|m| DeployedModule {
                    name: m.name.clone(),
                    version: m.version.clone(),
                    module_path: m
                        .loader
                        .entrypoint
                        .get("module.path")
                        .and_then(serde_json::Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                })
                .collect(),
        };
        updated_manifest.save(&deploy_path)?;

        self.0.events.report(Topic::ModuleListChanged, Event::ModuleListChanged);
        Ok(())
    }

    fn build_and_add_module(&self, decl: &ModuleDeclaration) -> Result<ModuleHandle, GatewayError> {
        let loader = self.0.loaders.find_by_name(&decl.loader.name)?;
        let config = serde_json::to_string(&decl.args)?;
        let module = loader.build_module(&decl.loader.entrypoint, &config)?;
        let spec = ModuleSpec {
            name: decl.name.clone(),
            loader_info: LoaderInfo {
                loader_name: decl.loader.name.clone(),
                entrypoint: decl.loader.entrypoint.clone(),
            },
            loader_kind: loader.kind(),
            config,
            version: decl.version.clone(),
            module,
        };
        Ok(self.0.broker.add_module(spec)?)
    }

    fn add_modules_transactional(&self, decls: &[ModuleDeclaration]) -> Result<Vec<ModuleHandle>, GatewayError> {
        let mut added = Vec::with_capacity(decls.len());
        for decl in decls {
            match self.build_and_add_module(decl) {
                Ok(handle) => {
                    self.0.modules.lock().insert(decl.name.clone(), handle);
                    added.push(handle);
                }
                Err(error) => {
                    self.rollback_modules(&added);
                    return Err(error);
                }
            }
        }
        Ok(added)
    }

    fn add_links_transactional(&self, decls: &[LinkDeclaration]) -> Result<Vec<(ModuleHandle, ModuleHandle)>, GatewayError> {
        let mut added = Vec::with_capacity(decls.len());
        for decl in decls {
            let modules = self.0.modules.lock();
            let source = *modules
                .get(&decl.source)
                .ok_or_else(|| GatewayError::UnknownModule(decl.source.clone()))?;
            let sink = *modules
                .get(&decl.sink)
                .ok_or_else(|| GatewayError::UnknownModule(decl.sink.clone()))?;
            drop(modules);

            let mode = decl.mode();
            match self.0.broker.add_link(Link::new(source, sink, mode)) {
                Ok(()) => {
                    self.0.links.lock().push((source, sink));
                    added.push((source, sink));
                }
                Err(error) => {
                    for (s, k) in &added {
                        let _ = self.0.broker.remove_link(*s, *k);
                        self.0.links.lock().retain(|pair| pair != &(*s, *k));
                    }
                    return Err(error.into());
                }
            }
        }
        Ok(added)
    }

    fn rollback_modules(&self, handles: &[ModuleHandle]) {
        let mut modules = self.0.modules.lock();
        for handle in handles {
            let _ = self.0.broker.remove_module(*handle);
            modules.retain(|_, h| h != handle);
        }
    }

    /// Shuts down the cloud-twin thread (if any), removes every link
    /// and module best-effort, destroys the loader registry, and
    /// reports `Destroyed`.
    pub fn destroy(self) -> Result<(), GatewayError> {
        if let Some(cloud) = self.0.cloud.lock().take() {
            cloud.shutdown();
        }

        for (source, sink) in self.0.links.lock().drain(..) {
            if let Err(error) = self.0.broker.remove_link(source, sink) {
                tracing::warn!(%error, "failed to remove link during destroy");
            }
        }
        for handle in self.0.modules.lock().drain().map(|(_, h)| h).collect::<Vec<_>>() {
            if let Err(error) = self.0.broker.remove_module(handle) {
                tracing::warn!(%error, "failed to remove module during destroy");
            }
        }
        self.0.loaders.destroy();
        self.0.events.report(Topic::Destroyed, Event::Destroyed);
        Ok(())
    }
}
