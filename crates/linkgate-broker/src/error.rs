// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use crate::ModuleHandle;
use thiserror::Error;

/// Error taxonomy for broker operations.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("module or link not found")]
    NotFound,

    #[error("platform error: {0}")]
    PlatformError(String),

    #[error("add_link {source} -> {sink} failed")]
    AddLinkError {
        source: ModuleHandle,
        sink: ModuleHandle,
        #[source]
        cause: Box<BrokerError>,
    },

    #[error("remove_link {source} -> {sink} failed")]
    RemoveLinkError {
        source: ModuleHandle,
        sink: ModuleHandle,
        #[source]
        cause: Box<BrokerError>,
    },
}
