// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("loader not found: {0}")]
    NotFound(String),

    #[error("malformed entrypoint: {0}")]
    MalformedEntrypoint(String),

    #[error("failed to open native module library at {path}: {source}")]
    LibraryOpen {
        path: String,
        #[source]
        source: libloading::Error,
    },

    #[error("native module library at {path} is missing exported symbol {symbol}: {source}")]
    MissingSymbol {
        path: String,
        symbol: String,
        #[source]
        source: libloading::Error,
    },

    #[error("native module instance creation returned a null pointer")]
    CreateFailed,
}
