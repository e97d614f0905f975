// SPDX-FileCopyrightText: 2026 Paydesk Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Payment destination allocation.
//!
//! Picks the destination to disclose to a customer: the customer's previous
//! destination while it stays eligible, otherwise the least-utilized one
//! with manual priority breaking near ties.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use paydesk_core::{PaydeskError, PaymentDestination, StorageAdapter};
use tracing::{debug, info};

/// Where sticky customer → destination choices live.
#[async_trait]
pub trait AllocationStateStore: Send + Sync {
    async fn get(&self, customer: &str) -> Result<Option<String>, PaydeskError>;
    async fn set(&self, customer: &str, destination_id: &str) -> Result<(), PaydeskError>;
}

/// Process-lifetime sticky state.
#[derive(Default)]
pub struct MemoryAllocationState {
    sticky: DashMap<String, String>,
}

impl MemoryAllocationState {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AllocationStateStore for MemoryAllocationState {
    async fn get(&self, customer: &str) -> Result<Option<String>, PaydeskError> {
        Ok(self.sticky.get(customer).map(|v| v.value().clone()))
    }

    async fn set(&self, customer: &str, destination_id: &str) -> Result<(), PaydeskError> {
        self.sticky
            .insert(customer.to_string(), destination_id.to_string());
        Ok(())
    }
}

/// Sticky state kept in the `sticky_allocations` table.
pub struct StorageAllocationState {
    storage: Arc<dyn StorageAdapter>,
}

impl StorageAllocationState {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl AllocationStateStore for StorageAllocationState {
    async fn get(&self, customer: &str) -> Result<Option<String>, PaydeskError> {
        self.storage.get_sticky_allocation(customer).await
    }

    async fn set(&self, customer: &str, destination_id: &str) -> Result<(), PaydeskError> {
        self.storage
            .set_sticky_allocation(customer, destination_id)
            .await
    }
}

/// Whether `candidate` should replace `best`.
///
/// Not a total order: utilization only decides when the gap is wide enough,
/// so selection is a linear scan rather than a sort.
fn beats(candidate: &PaymentDestination, best: &PaymentDestination, gap: f64) -> bool {
    if candidate.is_active != best.is_active {
        return candidate.is_active;
    }
    let (cu, bu) = (candidate.utilization(), best.utilization());
    if (cu - bu).abs() > gap {
        return cu < bu;
    }
    candidate.priority > best.priority
}

/// Chooses a destination from `destinations` (in storage order).
pub fn select<'a>(
    destinations: &'a [PaymentDestination],
    sticky: Option<&str>,
    gap: f64,
) -> Option<&'a PaymentDestination> {
    if let Some(sticky_id) = sticky
        && let Some(kept) = destinations
            .iter()
            .find(|d| d.id == sticky_id && d.is_eligible())
    {
        return Some(kept);
    }

    let mut eligible = destinations.iter().filter(|d| d.is_eligible());
    let first = eligible.next()?;
    Some(eligible.fold(first, |best, candidate| {
        if beats(candidate, best, gap) {
            candidate
        } else {
            best
        }
    }))
}

/// Allocation over live storage plus a sticky-state store.
pub struct AllocationEngine {
    storage: Arc<dyn StorageAdapter>,
    state: Arc<dyn AllocationStateStore>,
    utilization_gap: f64,
}

impl AllocationEngine {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        state: Arc<dyn AllocationStateStore>,
        utilization_gap: f64,
    ) -> Self {
        Self {
            storage,
            state,
            utilization_gap,
        }
    }

    /// The destination `allocate` would return, without recording it.
    pub async fn peek(&self, customer: &str) -> Result<Option<PaymentDestination>, PaydeskError> {
        let destinations = self.storage.list_destinations().await?;
        let sticky = self.state.get(customer).await?;
        Ok(select(&destinations, sticky.as_deref(), self.utilization_gap).cloned())
    }

    /// Chooses a destination for `customer` and makes it sticky.
    pub async fn allocate(
        &self,
        customer: &str,
    ) -> Result<Option<PaymentDestination>, PaydeskError> {
        let destinations = self.storage.list_destinations().await?;
        let sticky = self.state.get(customer).await?;
        let Some(chosen) = select(&destinations, sticky.as_deref(), self.utilization_gap).cloned()
        else {
            info!(customer, "no eligible payment destination");
            return Ok(None);
        };

        if sticky.as_deref() != Some(chosen.id.as_str()) {
            self.state.set(customer, &chosen.id).await?;
            debug!(customer, destination_id = %chosen.id, "sticky allocation updated");
        }
        Ok(Some(chosen))
    }
}
