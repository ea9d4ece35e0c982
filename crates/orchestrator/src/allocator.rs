use crate::commands;
use crate::error::{AllocError, NoCapacityError};
use core_types::{MAX_SLOT, SlotId};
use remote_session::CommandRunner;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;

/// Extracts the slots of every container named after the instance convention.
pub fn parse_instance_listing(output: &str) -> BTreeSet<SlotId> {
    output.lines().filter_map(SlotId::from_instance_name).collect()
}

/// The smallest slot in range that is not in `occupied`.
pub fn lowest_free(occupied: &BTreeSet<SlotId>) -> Option<SlotId> {
    SlotId::all().find(|slot| !occupied.contains(slot))
}

/// Hands out free instance slots.
///
/// A slot counts as occupied when its container is running on the host, or when it
/// has been claimed in this process and the claim has not been dropped yet.
pub struct SlotAllocator {
    runner: Arc<CommandRunner>,
    /// Serialises scan-then-claim so two callers never see the same free slot.
    allocation_lock: Mutex<()>,
    claims: Arc<StdMutex<BTreeSet<SlotId>>>,
}

impl SlotAllocator {
    pub fn new(runner: Arc<CommandRunner>) -> Self {
        Self {
            runner,
            allocation_lock: Mutex::new(()),
            claims: Arc::new(StdMutex::new(BTreeSet::new())),
        }
    }

    /// Slots whose containers are currently running on the host.
    pub async fn occupied_slots(&self) -> Result<BTreeSet<SlotId>, AllocError> {
        let output = self.runner.run(&commands::list_running_instances()).await?;
        Ok(parse_instance_listing(&output))
    }

    /// The lowest slot with no running container.
    ///
    /// This is a snapshot only; nothing stops another caller from picking the same
    /// slot. Use [`SlotAllocator::claim_slot`] before launching anything.
    pub async fn find_available_slot(&self) -> Result<SlotId, AllocError> {
        let occupied = self.occupied_slots().await?;
        let slot = lowest_free(&occupied).ok_or(NoCapacityError(MAX_SLOT))?;
        tracing::debug!(%slot, occupied = occupied.len(), "Found available slot.");
        Ok(slot)
    }

    /// Finds the lowest free slot and reserves it until the returned claim is dropped.
    pub async fn claim_slot(&self) -> Result<SlotClaim, AllocError> {
        let _guard = self.allocation_lock.lock().await;
        let mut occupied = self.occupied_slots().await?;

        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        occupied.extend(claims.iter().copied());
        let slot = lowest_free(&occupied).ok_or(NoCapacityError(MAX_SLOT))?;
        claims.insert(slot);

        tracing::info!(%slot, "Claimed instance slot.");
        Ok(SlotClaim { slot, claims: Arc::clone(&self.claims) })
    }

    /// Slots currently held by un-dropped claims.
    pub fn claimed(&self) -> BTreeSet<SlotId> {
        self.claims.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// An in-process reservation of a slot. Released on drop.
#[derive(Debug)]
pub struct SlotClaim {
    slot: SlotId,
    claims: Arc<StdMutex<BTreeSet<SlotId>>>,
}

impl SlotClaim {
    pub fn slot(&self) -> SlotId {
        self.slot
    }
}

impl Drop for SlotClaim {
    fn drop(&mut self) {
        let mut claims = self.claims.lock().unwrap_or_else(|e| e.into_inner());
        claims.remove(&self.slot);
        tracing::debug!(slot = %self.slot, "Released slot claim.");
    }
}
