//! Startup configuration of the worker topology.
//!
//! Every subsystem section is optional; a missing section means the subsystem
//! is not deployed. The whole configuration can be loaded from JSON.

use crate::affinity::{CpuMask, RoleAffinityConfig};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Most cells that can share one OFH transmit/receive worker.
pub const MAX_CELLS_PER_TXRX_GROUP: usize = 2;

/// Protocol layers whose traffic can be captured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PcapProtocol {
    Mac,
    Rlc,
    F1ap,
    F1u,
    E1ap,
    E2ap,
    Ngap,
    N3,
}

impl PcapProtocol {
    pub const ALL: [PcapProtocol; 8] = [
        PcapProtocol::Mac,
        PcapProtocol::Rlc,
        PcapProtocol::F1ap,
        PcapProtocol::F1u,
        PcapProtocol::E1ap,
        PcapProtocol::E2ap,
        PcapProtocol::Ngap,
        PcapProtocol::N3,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PcapProtocol::Mac => "mac",
            PcapProtocol::Rlc => "rlc",
            PcapProtocol::F1ap => "f1ap",
            PcapProtocol::F1u => "f1u",
            PcapProtocol::E1ap => "e1ap",
            PcapProtocol::E2ap => "e2ap",
            PcapProtocol::Ngap => "ngap",
            PcapProtocol::N3 => "n3",
        }
    }
}

/// Packet capture flags, one per protocol layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PcapConfig {
    pub mac: bool,
    pub rlc: bool,
    pub f1ap: bool,
    pub f1u: bool,
    pub e1ap: bool,
    pub e2ap: bool,
    pub ngap: bool,
    pub n3: bool,
}

impl PcapConfig {
    pub fn is_enabled(&self, protocol: PcapProtocol) -> bool {
        match protocol {
            PcapProtocol::Mac => self.mac,
            PcapProtocol::Rlc => self.rlc,
            PcapProtocol::F1ap => self.f1ap,
            PcapProtocol::F1u => self.f1u,
            PcapProtocol::E1ap => self.e1ap,
            PcapProtocol::E2ap => self.e2ap,
            PcapProtocol::Ngap => self.ngap,
            PcapProtocol::N3 => self.n3,
        }
    }

    /// Enabled protocols, in [`PcapProtocol::ALL`] order.
    pub fn enabled(&self) -> Vec<PcapProtocol> {
        PcapProtocol::ALL
            .into_iter()
            .filter(|&protocol| self.is_enabled(protocol))
            .collect()
    }
}

/// CU user plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CuUpConfig {
    /// Per-UE strands shared round-robin by all UEs. Default: 16.
    pub max_nof_ue_strands: usize,
    /// Capacity of each per-UE strand queue. Default: 8192.
    pub ue_queue_size: usize,
    /// Capacity of the control and UL IO strand queues. Default: 2048.
    pub ctrl_queue_size: usize,
}

impl Default for CuUpConfig {
    fn default() -> Self {
        Self {
            max_nof_ue_strands: 16,
            ue_queue_size: 8192,
            ctrl_queue_size: 2048,
        }
    }
}

/// DU high (MAC, RLC, scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuHighConfig {
    /// Default: 1.
    pub nof_cells: usize,
    /// Capacity of the per-cell UE queue. Default: 1024.
    pub ue_queue_size: usize,
    /// Capacity of the per-cell cell-event queue. Default: 256.
    pub cell_queue_size: usize,
    /// Capacity of the per-cell slot indication queue. Default: 16.
    pub slot_queue_size: usize,
    /// Buffer FAPI messages on a dedicated worker per cell. Default: false.
    pub fapi_buffering: bool,
    /// Capacity of the FAPI buffering queue. Default: 256.
    pub fapi_queue_size: usize,
}

impl Default for DuHighConfig {
    fn default() -> Self {
        Self {
            nof_cells: 1,
            ue_queue_size: 1024,
            cell_queue_size: 256,
            slot_queue_size: 16,
            fapi_buffering: false,
            fapi_queue_size: 256,
        }
    }
}

/// Split 6 (FAPI over a transport) adaptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Split6Config {
    /// Default: 2048.
    pub queue_size: usize,
}

impl Default for Split6Config {
    fn default() -> Self {
        Self { queue_size: 2048 }
    }
}

/// DU low (upper PHY).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DuLowConfig {
    /// Default: 1.
    pub nof_cells: usize,
    /// Run every cell on one non real-time PHY worker. Default: false.
    pub blocking_mode: bool,
    /// Uplink workers per cell. Default: 1.
    pub nof_ul_threads: usize,
    /// Downlink workers per cell. Default: 1.
    pub nof_dl_threads: usize,
    /// Asynchronous PUSCH decoder workers per cell, 0 for synchronous
    /// decoding. Default: 0.
    pub nof_pusch_decoder_threads: usize,
    /// Capacity of every PHY queue. Default: 2048.
    pub task_queue_size: usize,
}

impl Default for DuLowConfig {
    fn default() -> Self {
        Self {
            nof_cells: 1,
            blocking_mode: false,
            nof_ul_threads: 1,
            nof_dl_threads: 1,
            nof_pusch_decoder_threads: 0,
            task_queue_size: 2048,
        }
    }
}

impl DuLowConfig {
    /// Whether each cell's L2 shares the downlink PHY pool.
    pub fn shares_l2_with_dl_pool(&self) -> bool {
        !self.blocking_mode && self.nof_dl_threads > 1
    }
}

/// Open Fronthaul radio unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuOfhConfig {
    /// Downlink antennas of each cell; one entry per cell. Default: `[1]`.
    pub nof_downlink_antennas: Vec<usize>,
    /// Parallelize downlink codification across antennas. Default: false.
    pub parallelize_dl: bool,
    /// CPUs of the timing worker. Empty means unpinned.
    pub timing_cpu: CpuMask,
    /// One transmit/receive worker per entry. Default: one unpinned group.
    pub txrx_affinities: Vec<CpuMask>,
    /// Default: 2048.
    pub task_queue_size: usize,
}

impl Default for RuOfhConfig {
    fn default() -> Self {
        Self {
            nof_downlink_antennas: vec![1],
            parallelize_dl: false,
            timing_cpu: CpuMask::new(),
            txrx_affinities: vec![CpuMask::new()],
            task_queue_size: 2048,
        }
    }
}

impl RuOfhConfig {
    pub fn nof_cells(&self) -> usize {
        self.nof_downlink_antennas.len()
    }

    /// Downlink codification threads of `cell`.
    pub fn nof_dl_threads(&self, cell: usize) -> usize {
        if self.parallelize_dl {
            self.nof_downlink_antennas.get(cell).copied().unwrap_or(1).max(1)
        } else {
            1
        }
    }

    /// Transmit/receive group serving `cell`.
    pub fn txrx_group(&self, cell: usize) -> usize {
        let nof_groups = self.txrx_affinities.len().max(1);
        let nof_cells = self.nof_cells().max(1);
        if nof_groups >= nof_cells {
            cell
        } else {
            cell / nof_cells.div_ceil(nof_groups)
        }
    }
}

/// Worker layout of the SDR radio unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SdrThreadProfile {
    /// Everything on the radio worker.
    Blocking,
    /// One worker per cell.
    #[default]
    Single,
    /// Uplink/receive and downlink/transmit workers per cell.
    Dual,
    /// Transmit, receive, downlink and uplink workers per cell.
    Quad,
}

impl SdrThreadProfile {
    pub fn nof_workers_per_cell(self) -> usize {
        match self {
            SdrThreadProfile::Blocking => 0,
            SdrThreadProfile::Single => 1,
            SdrThreadProfile::Dual => 2,
            SdrThreadProfile::Quad => 4,
        }
    }
}

/// SDR radio unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuSdrConfig {
    /// Default: 1.
    pub nof_cells: usize,
    pub profile: SdrThreadProfile,
    /// Default: 2048.
    pub task_queue_size: usize,
}

impl Default for RuSdrConfig {
    fn default() -> Self {
        Self {
            nof_cells: 1,
            profile: SdrThreadProfile::default(),
            task_queue_size: 2048,
        }
    }
}

/// Dummy radio unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuDummyConfig {
    /// Default: 1.
    pub nof_cells: usize,
    /// Default: 2048.
    pub task_queue_size: usize,
}

impl Default for RuDummyConfig {
    fn default() -> Self {
        Self {
            nof_cells: 1,
            task_queue_size: 2048,
        }
    }
}

/// Everything the worker manager needs to build the executor topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerManagerConfig {
    /// Threads of the shared low-priority pool. Default: 4.
    pub nof_low_prio_threads: usize,
    /// Capacity of each low-priority tier queue. Default: 2048.
    pub low_prio_task_queue_size: usize,
    /// CPUs of the low-priority pool and other non real-time workers. Empty
    /// means every CPU.
    pub low_prio_cpu_mask: CpuMask,
    /// Role placement of each cell. Empty means unpinned.
    pub cell_affinities: Vec<Vec<RoleAffinityConfig>>,
    /// Run latency-critical workers under `SCHED_FIFO`. Default: true.
    pub realtime_priorities: bool,
    pub pcap: PcapConfig,
    pub cu_up: Option<CuUpConfig>,
    pub du_high: Option<DuHighConfig>,
    pub split6: Option<Split6Config>,
    pub du_low: Option<DuLowConfig>,
    pub ru_ofh: Option<RuOfhConfig>,
    pub ru_sdr: Option<RuSdrConfig>,
    pub ru_dummy: Option<RuDummyConfig>,
}

impl Default for WorkerManagerConfig {
    fn default() -> Self {
        Self {
            nof_low_prio_threads: 4,
            low_prio_task_queue_size: 2048,
            low_prio_cpu_mask: CpuMask::new(),
            cell_affinities: Vec::new(),
            realtime_priorities: true,
            pcap: PcapConfig::default(),
            cu_up: None,
            du_high: None,
            split6: None,
            du_low: None,
            ru_ofh: None,
            ru_sdr: None,
            ru_dummy: None,
        }
    }
}

impl WorkerManagerConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Number of cells of the deployment: the largest count any subsystem
    /// declares.
    pub fn nof_cells(&self) -> usize {
        [
            self.du_high.as_ref().map(|c| c.nof_cells),
            self.du_low.as_ref().map(|c| c.nof_cells),
            self.ru_ofh.as_ref().map(|c| c.nof_cells()),
            self.ru_sdr.as_ref().map(|c| c.nof_cells),
            self.ru_dummy.as_ref().map(|c| c.nof_cells),
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0)
    }

    /// Checks the cross-section consistency of the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nof_low_prio_threads == 0 {
            return Err(invalid("nof_low_prio_threads", "must be at least 1"));
        }
        if self.low_prio_task_queue_size == 0 {
            return Err(invalid("low_prio_task_queue_size", "must be greater than zero"));
        }

        let nof_rus = [self.ru_ofh.is_some(), self.ru_sdr.is_some(), self.ru_dummy.is_some()]
            .into_iter()
            .filter(|&configured| configured)
            .count();
        if nof_rus > 1 {
            return Err(ConfigError::MultipleRadioUnits(nof_rus));
        }

        let nof_cells = self.nof_cells();
        if !self.cell_affinities.is_empty() && self.cell_affinities.len() != nof_cells {
            return Err(ConfigError::CellCountMismatch {
                field: "cell_affinities",
                given: self.cell_affinities.len(),
                expected: nof_cells,
            });
        }

        if let Some(cu_up) = &self.cu_up {
            if cu_up.max_nof_ue_strands == 0 {
                return Err(invalid("cu_up.max_nof_ue_strands", "must be at least 1"));
            }
            if cu_up.ue_queue_size == 0 || cu_up.ctrl_queue_size == 0 {
                return Err(invalid("cu_up", "queue sizes must be greater than zero"));
            }
        }

        if let Some(du_high) = &self.du_high {
            if du_high.nof_cells == 0 {
                return Err(invalid("du_high.nof_cells", "must be at least 1"));
            }
            if du_high.ue_queue_size == 0
                || du_high.cell_queue_size == 0
                || du_high.slot_queue_size == 0
                || du_high.fapi_queue_size == 0
            {
                return Err(invalid("du_high", "queue sizes must be greater than zero"));
            }
            if let Some(du_low) = &self.du_low {
                if du_low.nof_cells != du_high.nof_cells {
                    return Err(ConfigError::CellCountMismatch {
                        field: "du_low.nof_cells",
                        given: du_low.nof_cells,
                        expected: du_high.nof_cells,
                    });
                }
            }
        }

        if let Some(split6) = &self.split6 {
            if split6.queue_size == 0 {
                return Err(invalid("split6.queue_size", "must be greater than zero"));
            }
        }

        if let Some(du_low) = &self.du_low {
            if du_low.nof_cells == 0 {
                return Err(invalid("du_low.nof_cells", "must be at least 1"));
            }
            if !du_low.blocking_mode && (du_low.nof_ul_threads == 0 || du_low.nof_dl_threads == 0) {
                return Err(invalid("du_low", "real-time mode needs at least one UL and one DL thread"));
            }
            if du_low.task_queue_size == 0 {
                return Err(invalid("du_low.task_queue_size", "must be greater than zero"));
            }
        }

        if let Some(ofh) = &self.ru_ofh {
            if ofh.nof_cells() == 0 {
                return Err(invalid("ru_ofh.nof_downlink_antennas", "must list at least one cell"));
            }
            if let Some(du_low) = &self.du_low {
                if ofh.nof_cells() != du_low.nof_cells {
                    return Err(ConfigError::CellCountMismatch {
                        field: "ru_ofh.nof_downlink_antennas",
                        given: ofh.nof_cells(),
                        expected: du_low.nof_cells,
                    });
                }
            }
            if ofh.txrx_affinities.is_empty() {
                return Err(invalid("ru_ofh.txrx_affinities", "must list at least one group"));
            }
            let cells_per_group = ofh.nof_cells().div_ceil(ofh.txrx_affinities.len());
            if cells_per_group > MAX_CELLS_PER_TXRX_GROUP {
                return Err(invalid(
                    "ru_ofh.txrx_affinities",
                    format!(
                        "{} groups for {} cells would put {} cells on one worker, at most {} allowed",
                        ofh.txrx_affinities.len(),
                        ofh.nof_cells(),
                        cells_per_group,
                        MAX_CELLS_PER_TXRX_GROUP
                    ),
                ));
            }
            if ofh.task_queue_size == 0 {
                return Err(invalid("ru_ofh.task_queue_size", "must be greater than zero"));
            }
        }

        if let Some(sdr) = &self.ru_sdr {
            if sdr.nof_cells == 0 || sdr.task_queue_size == 0 {
                return Err(invalid("ru_sdr", "needs at least one cell and a non-zero queue size"));
            }
            if let Some(du_low) = &self.du_low {
                if sdr.nof_cells != du_low.nof_cells {
                    return Err(ConfigError::CellCountMismatch {
                        field: "ru_sdr.nof_cells",
                        given: sdr.nof_cells,
                        expected: du_low.nof_cells,
                    });
                }
            }
        }

        if let Some(dummy) = &self.ru_dummy {
            if dummy.nof_cells == 0 || dummy.task_queue_size == 0 {
                return Err(invalid("ru_dummy", "needs at least one cell and a non-zero queue size"));
            }
            if let Some(du_low) = &self.du_low {
                if dummy.nof_cells != du_low.nof_cells {
                    return Err(ConfigError::CellCountMismatch {
                        field: "ru_dummy.nof_cells",
                        given: dummy.nof_cells,
                        expected: du_low.nof_cells,
                    });
                }
            }
        }

        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        field,
        reason: reason.into(),
    }
}
