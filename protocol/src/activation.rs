//! # Activation Registry
//!
//! Maps network upgrades to the first height at which their rules apply and
//! answers "is upgrade X active at height H?". Every height-gated rule in the
//! crate goes through [`ActivationRegistry::is_active`]; nothing else
//! compares heights against upgrade schedules.
//!
//! The registry is built once from [`crate::config::ChainParams`] and never
//! mutated. A schedule that is out of order is rejected at construction,
//! which the node treats as a fatal startup error.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Consensus branch id in effect before Overwinter.
pub const SPROUT_BRANCH_ID: u32 = 0;

/// Errors in an activation schedule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ActivationError {
    #[error("{upgrade} activates at {height}, before {previous} at {previous_height}")]
    NonMonotonic {
        upgrade: NetworkUpgrade,
        height: u64,
        previous: NetworkUpgrade,
        previous_height: u64,
    },

    #[error("{upgrade} is scheduled but the earlier upgrade {missing} is not")]
    MissingPredecessor {
        upgrade: NetworkUpgrade,
        missing: NetworkUpgrade,
    },

    #[error("{upgrade} is scheduled more than once")]
    Duplicate { upgrade: NetworkUpgrade },

    #[error("unknown consensus branch id {branch_id:#010x}")]
    UnknownBranchId { branch_id: u32 },

    #[error("invalid nuparams {input:?}: expected <hex branch id>:<height>")]
    MalformedNuparam { input: String },
}

// ---------------------------------------------------------------------------
// NetworkUpgrade
// ---------------------------------------------------------------------------

/// Network upgrades in activation order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum NetworkUpgrade {
    Overwinter,
    Sapling,
    Blossom,
    Heartwood,
    Canopy,
    Nu5,
    /// Introduces the ZSF deposit field.
    ZFuture,
}

impl NetworkUpgrade {
    /// All upgrades, in the order they must activate.
    pub const ALL: [NetworkUpgrade; 7] = [
        NetworkUpgrade::Overwinter,
        NetworkUpgrade::Sapling,
        NetworkUpgrade::Blossom,
        NetworkUpgrade::Heartwood,
        NetworkUpgrade::Canopy,
        NetworkUpgrade::Nu5,
        NetworkUpgrade::ZFuture,
    ];

    /// The consensus branch id transactions must commit to once this
    /// upgrade is the latest active one.
    pub fn branch_id(self) -> u32 {
        match self {
            NetworkUpgrade::Overwinter => 0x5BA8_1B19,
            NetworkUpgrade::Sapling => 0x76B8_09BB,
            NetworkUpgrade::Blossom => 0x2BB4_0E60,
            NetworkUpgrade::Heartwood => 0xF5B9_230B,
            NetworkUpgrade::Canopy => 0xE9FF_75A6,
            NetworkUpgrade::Nu5 => 0xC2D6_D0B4,
            NetworkUpgrade::ZFuture => 0xFFFF_FFFF,
        }
    }

    /// Looks an upgrade up by its branch id.
    pub fn from_branch_id(branch_id: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|u| u.branch_id() == branch_id)
    }

    /// Display name, as reported in `getblockchaininfo`.
    pub fn name(self) -> &'static str {
        match self {
            NetworkUpgrade::Overwinter => "Overwinter",
            NetworkUpgrade::Sapling => "Sapling",
            NetworkUpgrade::Blossom => "Blossom",
            NetworkUpgrade::Heartwood => "Heartwood",
            NetworkUpgrade::Canopy => "Canopy",
            NetworkUpgrade::Nu5 => "NU5",
            NetworkUpgrade::ZFuture => "ZFUTURE",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for NetworkUpgrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse one `-nuparams` value: `<hex branch id>:<height>`.
pub fn parse_nuparam(input: &str) -> Result<(NetworkUpgrade, u64), ActivationError> {
    let malformed = || ActivationError::MalformedNuparam {
        input: input.to_string(),
    };
    let (branch, height) = input.split_once(':').ok_or_else(malformed)?;
    let branch_id = u32::from_str_radix(branch.trim_start_matches("0x"), 16)
        .map_err(|_| malformed())?;
    let height: u64 = height.parse().map_err(|_| malformed())?;
    let upgrade = NetworkUpgrade::from_branch_id(branch_id)
        .ok_or(ActivationError::UnknownBranchId { branch_id })?;
    Ok((upgrade, height))
}

// ---------------------------------------------------------------------------
// ActivationRegistry
// ---------------------------------------------------------------------------

/// Activation status of an upgrade relative to some height.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpgradeStatus {
    Active,
    Pending,
    Disabled,
}

/// Immutable upgrade → activation height table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivationRegistry {
    heights: [Option<u64>; NetworkUpgrade::ALL.len()],
}

impl ActivationRegistry {
    /// Builds a registry, validating that the schedule has no gaps and that
    /// heights never decrease in upgrade order.
    pub fn new<I>(schedule: I) -> Result<Self, ActivationError>
    where
        I: IntoIterator<Item = (NetworkUpgrade, u64)>,
    {
        let mut heights = [None; NetworkUpgrade::ALL.len()];
        for (upgrade, height) in schedule {
            let slot = &mut heights[upgrade.index()];
            if slot.is_some() {
                return Err(ActivationError::Duplicate { upgrade });
            }
            *slot = Some(height);
        }

        let mut previous: Option<(NetworkUpgrade, u64)> = None;
        let mut first_missing: Option<NetworkUpgrade> = None;
        for upgrade in NetworkUpgrade::ALL {
            match heights[upgrade.index()] {
                None => {
                    first_missing.get_or_insert(upgrade);
                }
                Some(height) => {
                    if let Some(missing) = first_missing {
                        return Err(ActivationError::MissingPredecessor { upgrade, missing });
                    }
                    if let Some((prev, prev_height)) = previous {
                        if height < prev_height {
                            return Err(ActivationError::NonMonotonic {
                                upgrade,
                                height,
                                previous: prev,
                                previous_height: prev_height,
                            });
                        }
                    }
                    previous = Some((upgrade, height));
                }
            }
        }

        tracing::debug!(schedule = ?heights, "activation registry built");
        Ok(Self { heights })
    }

    /// `true` if `upgrade` is scheduled and `height` is at or past its
    /// activation height.
    pub fn is_active(&self, upgrade: NetworkUpgrade, height: u64) -> bool {
        matches!(self.heights[upgrade.index()], Some(h) if height >= h)
    }

    /// Activation height of `upgrade`, if scheduled.
    pub fn activation_height(&self, upgrade: NetworkUpgrade) -> Option<u64> {
        self.heights[upgrade.index()]
    }

    /// The latest upgrade active at `height`.
    pub fn current_upgrade(&self, height: u64) -> Option<NetworkUpgrade> {
        NetworkUpgrade::ALL
            .into_iter()
            .rev()
            .find(|u| self.is_active(*u, height))
    }

    /// The first scheduled upgrade not yet active at `height`.
    pub fn next_upgrade(&self, height: u64) -> Option<NetworkUpgrade> {
        NetworkUpgrade::ALL
            .into_iter()
            .find(|u| self.heights[u.index()].is_some() && !self.is_active(*u, height))
    }

    /// Consensus branch id in effect at `height`.
    pub fn branch_id_at(&self, height: u64) -> u32 {
        self.current_upgrade(height)
            .map(NetworkUpgrade::branch_id)
            .unwrap_or(SPROUT_BRANCH_ID)
    }

    /// Status of `upgrade` as seen from `height`.
    pub fn status(&self, upgrade: NetworkUpgrade, height: u64) -> UpgradeStatus {
        match self.heights[upgrade.index()] {
            None => UpgradeStatus::Disabled,
            Some(h) if height >= h => UpgradeStatus::Active,
            Some(_) => UpgradeStatus::Pending,
        }
    }

    /// Scheduled upgrades with their heights, in activation order.
    pub fn upgrades(&self) -> impl Iterator<Item = (NetworkUpgrade, u64)> + '_ {
        NetworkUpgrade::ALL
            .into_iter()
            .filter_map(|u| self.heights[u.index()].map(|h| (u, h)))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
