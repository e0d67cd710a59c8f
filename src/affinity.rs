//! CPU affinity.
//!
//! Maps logical roles (a cell's L2, its uplink or downlink PHY, the radio unit,
//! the low-priority pool) to concrete CPU sets. The mapping is a pure lookup
//! over a table fixed at construction.

use crate::error::ConfigError;
use crate::topology::Topology;
use bit_iter::BitIter;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Highest number of CPUs a mask can describe (`CPU_SETSIZE` on Linux).
pub const MAX_CPUS: usize = 1024;
const WORDS: usize = MAX_CPUS / 64;

/// Ordered set of CPU indices.
///
/// Serialized as a Linux cpulist string, e.g. `"0-3,8,10-11"`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CpuMask {
    words: [u64; WORDS],
}

impl CpuMask {
    /// Empty mask.
    pub const fn new() -> Self {
        CpuMask { words: [0; WORDS] }
    }

    pub fn single(cpu: usize) -> Self {
        Self::from_cpus([cpu])
    }

    /// CPUs beyond [`MAX_CPUS`] are ignored.
    pub fn from_cpus<I: IntoIterator<Item = usize>>(cpus: I) -> Self {
        let mut mask = Self::new();
        for cpu in cpus {
            mask.set(cpu);
        }
        mask
    }

    pub fn from_range(range: Range<usize>) -> Self {
        Self::from_cpus(range)
    }

    /// Adds `cpu`. Returns false if it is out of range.
    pub fn set(&mut self, cpu: usize) -> bool {
        if cpu >= MAX_CPUS {
            return false;
        }
        self.words[cpu / 64] |= 1 << (cpu % 64);
        true
    }

    pub fn contains(&self, cpu: usize) -> bool {
        cpu < MAX_CPUS && self.words[cpu / 64] & (1 << (cpu % 64)) != 0
    }

    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&w| w == 0)
    }

    /// CPU indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words
            .iter()
            .enumerate()
            .flat_map(|(i, &word)| BitIter::from(word).map(move |bit| i * 64 + bit))
    }

    /// The `n`-th CPU of the mask, in ascending order.
    pub fn nth_cpu(&self, n: usize) -> Option<usize> {
        self.iter().nth(n)
    }

    pub fn is_disjoint(&self, other: &CpuMask) -> bool {
        self.words.iter().zip(other.words.iter()).all(|(a, b)| a & b == 0)
    }

    pub fn intersection(&self, other: &CpuMask) -> CpuMask {
        let mut mask = *self;
        for (a, b) in mask.words.iter_mut().zip(other.words.iter()) {
            *a &= b;
        }
        mask
    }
}

impl Default for CpuMask {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut cpus = self.iter().peekable();
        while let Some(start) = cpus.next() {
            let mut end = start;
            while cpus.peek() == Some(&(end + 1)) {
                end += 1;
                cpus.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{start}")?;
            } else {
                write!(f, "{start}-{end}")?;
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CpuMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CpuMask({self})")
    }
}

impl FromStr for CpuMask {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidCpuList(s.to_string());
        let parse = |v: &str| v.trim().parse::<usize>().map_err(|_| invalid());

        let mut mask = CpuMask::new();
        for token in s.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            let (start, end) = match token.split_once('-') {
                Some((start, end)) => (parse(start)?, parse(end)?),
                None => {
                    let cpu = parse(token)?;
                    (cpu, cpu)
                }
            };
            if start > end || end >= MAX_CPUS {
                return Err(invalid());
            }
            for cpu in start..=end {
                mask.set(cpu);
            }
        }
        Ok(mask)
    }
}

impl TryFrom<String> for CpuMask {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CpuMask> for String {
    fn from(mask: CpuMask) -> Self {
        mask.to_string()
    }
}

/// Logical role a thread plays, for CPU placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffinityRole {
    /// A cell's L2 real-time processing.
    L2Cell,
    /// A cell's uplink PHY processing.
    L1Ul,
    /// A cell's downlink PHY processing.
    L1Dl,
    /// Radio unit processing.
    Ru,
    /// Non real-time, process-wide work.
    LowPriority,
}

impl AffinityRole {
    pub const ALL: [AffinityRole; 5] = [
        AffinityRole::L2Cell,
        AffinityRole::L1Ul,
        AffinityRole::L1Dl,
        AffinityRole::Ru,
        AffinityRole::LowPriority,
    ];
}

/// How threads of one role are spread over the role's mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinningPolicy {
    /// Every thread may run on any CPU of the mask.
    #[default]
    Mask,
    /// Thread `i` is pinned to the `i`-th CPU of the mask, wrapping around.
    RoundRobin,
}

/// Placement of one role. An empty mask means every CPU of the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleAffinityConfig {
    pub role: AffinityRole,
    #[serde(default)]
    pub mask: CpuMask,
    #[serde(default)]
    pub pinning: PinningPolicy,
}

impl RoleAffinityConfig {
    pub fn new(role: AffinityRole, mask: CpuMask, pinning: PinningPolicy) -> Self {
        RoleAffinityConfig { role, mask, pinning }
    }

    /// Unpinned entries for every role.
    pub fn unpinned() -> Vec<RoleAffinityConfig> {
        AffinityRole::ALL
            .iter()
            .map(|&role| RoleAffinityConfig::new(role, CpuMask::new(), PinningPolicy::Mask))
            .collect()
    }
}

/// Computes CPU masks for roles from an immutable table.
#[derive(Debug, Clone)]
pub struct AffinityManager {
    entries: Vec<RoleAffinityConfig>,
    host: CpuMask,
}

impl AffinityManager {
    /// Builds a manager over the CPUs detected on the host.
    pub fn new(entries: Vec<RoleAffinityConfig>) -> Self {
        Self::with_host_cpus(entries, Topology::detect().all_cpus())
    }

    /// Builds a manager that treats `host` as the set of available CPUs.
    pub fn with_host_cpus(entries: Vec<RoleAffinityConfig>, host: CpuMask) -> Self {
        let host = if host.is_empty() { CpuMask::single(0) } else { host };
        AffinityManager { entries, host }
    }

    /// Returns the CPU mask for thread `index` of `role`. Never empty.
    ///
    /// A role missing from the table is a boot-time configuration defect and
    /// aborts.
    pub fn compute_mask(&self, role: AffinityRole, index: usize) -> CpuMask {
        let entry = self
            .entries
            .iter()
            .find(|entry| entry.role == role)
            .unwrap_or_else(|| crate::report_fatal_error!("No CPU affinity configured for role {:?}", role));

        let mask = if entry.mask.is_empty() {
            self.host
        } else {
            entry.mask
        };

        match entry.pinning {
            PinningPolicy::Mask => mask,
            PinningPolicy::RoundRobin => match mask.nth_cpu(index % mask.count()) {
                Some(cpu) => CpuMask::single(cpu),
                None => mask,
            },
        }
    }

    pub fn has_role(&self, role: AffinityRole) -> bool {
        self.entries.iter().any(|entry| entry.role == role)
    }

    pub fn entries(&self) -> &[RoleAffinityConfig] {
        &self.entries
    }
}
