// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! The publish/subscribe broker that routes messages between gateway
//! modules, with a wire (serialized) fast-path and a direct (in-memory
//! queue) fast-path for in-process-to-in-process links.

mod broker;
mod direct;
mod entry;
mod error;
mod handle;
mod link;
mod spec;
mod wire_bus;
mod worker;

pub use broker::Broker;
pub use error::BrokerError;
pub use handle::ModuleHandle;
pub use link::{Link, LinkMode};
pub use spec::{LoaderInfo, LoaderKind, ModuleApi, ModuleSpec};

pub use linkgate_message::{Message, MessageBuilder, MessageError};
