use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lowest addressable instance slot on the host.
pub const MIN_SLOT: u32 = 1;
/// Highest addressable instance slot on the host.
pub const MAX_SLOT: u32 = 30;
/// Every container and process query is keyed by `<prefix><slot>`.
pub const INSTANCE_PREFIX: &str = "mt5-instance-";

/// A numbered unit of trading-terminal capacity on the remote host.
///
/// Slots are never stored on the host itself. They are derived on demand from the
/// names of the running containers, so the only invariant this type carries is the
/// range check performed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SlotId(u32);

impl SlotId {
    pub fn new(value: u32) -> Result<Self, CoreError> {
        if (MIN_SLOT..=MAX_SLOT).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CoreError::SlotOutOfRange(value))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Iterates every slot in ascending order.
    pub fn all() -> impl Iterator<Item = SlotId> {
        (MIN_SLOT..=MAX_SLOT).map(SlotId)
    }

    /// The container name for this slot, e.g. `mt5-instance-7`.
    pub fn instance_name(self) -> String {
        format!("{}{}", INSTANCE_PREFIX, self.0)
    }

    /// Parses a container name back into a slot.
    ///
    /// Returns `None` for names that do not follow the naming convention, carry a
    /// non-numeric suffix, or point outside the slot range.
    pub fn from_instance_name(name: &str) -> Option<SlotId> {
        let suffix = name.trim().strip_prefix(INSTANCE_PREFIX)?;
        let value = suffix.parse::<u32>().ok()?;
        SlotId::new(value).ok()
    }
}

impl TryFrom<u32> for SlotId {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        SlotId::new(value)
    }
}

impl From<SlotId> for u32 {
    fn from(slot: SlotId) -> Self {
        slot.0
    }
}

impl FromStr for SlotId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<u32>()
            .map_err(|e| CoreError::InvalidInput("slot".to_string(), e.to_string()))?;
        SlotId::new(value)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
