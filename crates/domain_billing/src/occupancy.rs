//! Occupant counting for headcount-based water billing

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::BillingError;

/// Number of people living in a room: the primary tenant plus any
/// additional occupants linked to that tenant. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct OccupantCount(u32);

impl OccupantCount {
    /// Creates a count, rejecting zero
    pub fn new(count: u32) -> Result<Self, BillingError> {
        if count == 0 {
            return Err(BillingError::InvalidOccupantCount(count));
        }
        Ok(Self(count))
    }

    /// Primary tenant plus `additional_occupants`
    pub fn for_tenant(additional_occupants: u32) -> Self {
        Self(additional_occupants.saturating_add(1))
    }

    /// Just the primary tenant
    pub fn single() -> Self {
        Self(1)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for OccupantCount {
    fn default() -> Self {
        Self::single()
    }
}

impl TryFrom<u32> for OccupantCount {
    type Error = BillingError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<OccupantCount> for u32 {
    fn from(count: OccupantCount) -> u32 {
        count.0
    }
}

impl fmt::Display for OccupantCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
