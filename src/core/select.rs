use super::device::Device;
use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::BTreeSet;

/// Set of device indices the caller is willing to use.
///
/// Absence of a restriction is modelled as `Option<OnlyUse>::None` by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OnlyUse(BTreeSet<u32>);

impl OnlyUse {
    pub fn contains(&self, index: u32) -> bool {
        self.0.contains(&index)
    }

    pub fn indices(&self) -> impl Iterator<Item = u32> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<u32> for OnlyUse {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Indices of devices with no attached processes, in ascending order.
pub fn free_devices(devices: &[Device]) -> Vec<u32> {
    devices
        .iter()
        .filter(|d| d.is_free())
        .map(|d| d.index)
        .collect()
}

/// All device indices, most free memory first.
///
/// The sort is stable, so devices with equal free memory keep ascending index
/// order.
pub fn rank_by_free_memory(devices: &[Device]) -> Vec<u32> {
    let mut ranked: Vec<&Device> = devices.iter().collect();
    ranked.sort_by(|a, b| b.free_memory.cmp(&a.free_memory));
    ranked.into_iter().map(|d| d.index).collect()
}

/// Keep only indices allowed by `only_use`, preserving order.
pub fn restrict(indices: Vec<u32>, only_use: Option<&OnlyUse>) -> Vec<u32> {
    match only_use {
        None => indices,
        Some(allowed) => indices
            .into_iter()
            .filter(|&index| allowed.contains(index))
            .collect(),
    }
}

/// Shuffle uniformly at random in place.
pub fn shuffle<R: Rng + ?Sized>(indices: &mut [u32], rng: &mut R) {
    indices.shuffle(rng);
}
