// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod inference;
pub mod objects;
pub mod protocol;
pub mod storage;

pub use adapter::PluginAdapter;
pub use inference::InferenceAdapter;
pub use objects::ObjectStore;
pub use protocol::{ProtocolConnector, ProtocolHandle};
pub use storage::StorageAdapter;
