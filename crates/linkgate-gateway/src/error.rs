// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    #[error("unknown module referenced by a link: {0}")]
    UnknownModule(String),

    #[error("declaration parse error: {0}")]
    Declaration(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Broker(#[from] linkgate_broker::BrokerError),

    #[error(transparent)]
    Loader(#[from] linkgate_loader::LoaderError),

    #[error("module artifact fetch failed: {0}")]
    Fetch(String),

    /// `apply_update` failed after it began mutating broker state; the
    /// rollback described alongside this variant has already run by
    /// the time callers observe it.
    #[error("update failed: {0}")]
    UpdateError(String),

    /// Named for parity with the original error taxonomy's allocation
    /// failure variant. Safe Rust aborts the process on allocation
    /// failure rather than returning a recoverable error, so this
    /// variant is effectively unreachable in this implementation; kept
    /// so callers pattern-matching on the full taxonomy still compile.
    #[error("update ran out of memory")]
    UpdateMemoryError,

    #[error("update declaration was invalid: {0}")]
    UpdateInvalidArg(String),
}
