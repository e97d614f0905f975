// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Paydesk integration tests.
//!
//! Provides mock adapters and a harness for fast, deterministic tests
//! without a sidecar, an inference API or a real media directory.
//!
//! # Components
//!
//! - [`MockConnector`] - scripted protocol sessions with event injection
//! - [`MockInference`] - queued generation and extraction results
//! - [`MemoryObjectStore`] - in-memory buckets with injectable failures
//! - [`TestHarness`] - temp SQLite storage plus all of the above

pub mod harness;
pub mod mock_inference;
pub mod mock_objects;
pub mod mock_protocol;

pub use harness::TestHarness;
pub use mock_inference::MockInference;
pub use mock_objects::MemoryObjectStore;
pub use mock_protocol::{HandleBehavior, MockConnector, MockHandle, MockSession};
