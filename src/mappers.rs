//! Executor mappers.
//!
//! Each subsystem receives a mapper grouping the executors it submits to, so
//! it never sees the registry. Mappers are resolved once, after every context
//! of the topology exists.

use crate::config::{PcapConfig, PcapProtocol, SdrThreadProfile};
use crate::executor::ExecutorRef;
use crate::manager::ExecutorRegistry;
use crate::worker_manager::ExecutorRole;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

fn resolve(registry: &ExecutorRegistry, role: ExecutorRole, index: usize) -> ExecutorRef {
    registry.executor(&role.name(index))
}

fn cell_or_fatal<'a, T>(cells: &'a [T], cell: usize, subsystem: &str) -> &'a T {
    cells
        .get(cell)
        .unwrap_or_else(|| crate::report_fatal_error!("No {} executors for cell {}", subsystem, cell))
}

/// Executors of one DU-high cell.
#[derive(Clone)]
pub struct DuHighCellExecutors {
    pub slot_ind: ExecutorRef,
    pub cell: ExecutorRef,
    pub ue: ExecutorRef,
    pub fapi_buffering: Option<ExecutorRef>,
}

pub struct DuHighExecutorMapper {
    cells: Vec<DuHighCellExecutors>,
    ctrl: ExecutorRef,
    timer: ExecutorRef,
}

impl DuHighExecutorMapper {
    pub(crate) fn from_registry(registry: &ExecutorRegistry, nof_cells: usize, fapi_buffering: bool) -> Self {
        let cells = (0..nof_cells)
            .map(|cell| DuHighCellExecutors {
                slot_ind: resolve(registry, ExecutorRole::DuSlot, cell),
                cell: resolve(registry, ExecutorRole::DuCell, cell),
                ue: resolve(registry, ExecutorRole::DuUe, cell),
                fapi_buffering: fapi_buffering.then(|| resolve(registry, ExecutorRole::FapiBuffering, cell)),
            })
            .collect();
        DuHighExecutorMapper {
            cells,
            ctrl: resolve(registry, ExecutorRole::HighPrio, 0),
            timer: resolve(registry, ExecutorRole::LowPrio, 0),
        }
    }

    pub fn nof_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, cell: usize) -> &DuHighCellExecutors {
        cell_or_fatal(&self.cells, cell, "DU-high")
    }

    pub fn slot_ind_executor(&self, cell: usize) -> &ExecutorRef {
        &self.cell(cell).slot_ind
    }

    pub fn cell_executor(&self, cell: usize) -> &ExecutorRef {
        &self.cell(cell).cell
    }

    pub fn ue_executor(&self, cell: usize) -> &ExecutorRef {
        &self.cell(cell).ue
    }

    pub fn fapi_buffering_executor(&self, cell: usize) -> Option<&ExecutorRef> {
        self.cell(cell).fapi_buffering.as_ref()
    }

    /// F1 and other DU control procedures.
    pub fn ctrl_executor(&self) -> &ExecutorRef {
        &self.ctrl
    }

    pub fn timer_executor(&self) -> &ExecutorRef {
        &self.timer
    }
}

/// Executors of one DU-low cell.
#[derive(Clone)]
pub struct DuLowCellExecutors {
    pub pucch: ExecutorRef,
    pub pusch: ExecutorRef,
    pub srs: ExecutorRef,
    pub pusch_decoder: ExecutorRef,
    pub dl: ExecutorRef,
    pub pdsch: ExecutorRef,
    pub prach: ExecutorRef,
}

pub struct DuLowExecutorMapper {
    cells: Vec<DuLowCellExecutors>,
}

impl DuLowExecutorMapper {
    /// In blocking mode every role of every cell maps to the shared PHY
    /// executor. Without asynchronous decoders PUSCH decoding runs on the PUSCH
    /// executor.
    pub(crate) fn from_registry(
        registry: &ExecutorRegistry,
        nof_cells: usize,
        blocking_mode: bool,
        async_pusch_decoding: bool,
    ) -> Self {
        let cells = (0..nof_cells)
            .map(|cell| {
                if blocking_mode {
                    let phy = resolve(registry, ExecutorRole::PhyBlocking, 0);
                    return DuLowCellExecutors {
                        pucch: phy.clone(),
                        pusch: phy.clone(),
                        srs: phy.clone(),
                        pusch_decoder: phy.clone(),
                        dl: phy.clone(),
                        pdsch: phy.clone(),
                        prach: phy,
                    };
                }
                let pusch = resolve(registry, ExecutorRole::Pusch, cell);
                DuLowCellExecutors {
                    pucch: resolve(registry, ExecutorRole::Pucch, cell),
                    pusch_decoder: if async_pusch_decoding {
                        resolve(registry, ExecutorRole::PuschDecoder, cell)
                    } else {
                        pusch.clone()
                    },
                    pusch,
                    srs: resolve(registry, ExecutorRole::Srs, cell),
                    dl: resolve(registry, ExecutorRole::PhyDl, cell),
                    pdsch: resolve(registry, ExecutorRole::Pdsch, cell),
                    prach: resolve(registry, ExecutorRole::Prach, cell),
                }
            })
            .collect();
        DuLowExecutorMapper { cells }
    }

    pub fn nof_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn cell(&self, cell: usize) -> &DuLowCellExecutors {
        cell_or_fatal(&self.cells, cell, "DU-low")
    }

    pub fn pucch_executor(&self, cell: usize) -> &ExecutorRef {
        &self.cell(cell).pucch
    }

    pub fn pusch_executor(&self, cell: usize) -> &ExecutorRef {
        &self.cell(cell).pusch
    }

    pub fn pusch_decoder_executor(&self, cell: usize) -> &ExecutorRef {
        &self.cell(cell).pusch_decoder
    }

    pub fn srs_executor(&self, cell: usize) -> &ExecutorRef {
        &self.cell(cell).srs
    }

    pub fn dl_executor(&self, cell: usize) -> &ExecutorRef {
        &self.cell(cell).dl
    }

    pub fn pdsch_executor(&self, cell: usize) -> &ExecutorRef {
        &self.cell(cell).pdsch
    }

    pub fn prach_executor(&self, cell: usize) -> &ExecutorRef {
        &self.cell(cell).prach
    }
}

/// Ordered executors of one UE. Control runs before UL, UL before DL.
#[derive(Clone)]
pub struct CuUpUeExecutors {
    pub ctrl: ExecutorRef,
    pub ul: ExecutorRef,
    pub dl: ExecutorRef,
}

/// Strand-based executors of the CU-UP, layered over the low-priority pool.
pub struct CuUpExecutorMapper {
    ctrl: ExecutorRef,
    io_ul: ExecutorRef,
    ue_strands: Vec<CuUpUeExecutors>,
    next_ue_strand: AtomicUsize,
}

impl CuUpExecutorMapper {
    pub(crate) fn from_registry(registry: &ExecutorRegistry, nof_ue_strands: usize) -> Self {
        let ue_strands = (0..nof_ue_strands)
            .map(|index| CuUpUeExecutors {
                ctrl: resolve(registry, ExecutorRole::CuUpUeCtrl, index),
                ul: resolve(registry, ExecutorRole::CuUpUeUl, index),
                dl: resolve(registry, ExecutorRole::CuUpUeDl, index),
            })
            .collect();
        CuUpExecutorMapper {
            ctrl: resolve(registry, ExecutorRole::CuUpCtrl, 0),
            io_ul: resolve(registry, ExecutorRole::CuUpIoUl, 0),
            ue_strands,
            next_ue_strand: AtomicUsize::new(0),
        }
    }

    pub fn ctrl_executor(&self) -> &ExecutorRef {
        &self.ctrl
    }

    /// Reception of N3 and F1-U traffic.
    pub fn io_ul_executor(&self) -> &ExecutorRef {
        &self.io_ul
    }

    /// Executors for a new UE. UEs are spread over the strands round-robin, so
    /// several UEs may share one strand.
    pub fn create_ue_executors(&self) -> CuUpUeExecutors {
        let index = self.next_ue_strand.fetch_add(1, Ordering::Relaxed) % self.ue_strands.len();
        self.ue_strands[index].clone()
    }

    pub fn nof_ue_strands(&self) -> usize {
        self.ue_strands.len()
    }
}

/// Executors writing packet captures, one strand per enabled protocol.
pub struct PcapExecutorMapper {
    executors: HashMap<PcapProtocol, ExecutorRef>,
}

impl PcapExecutorMapper {
    pub(crate) fn from_registry(registry: &ExecutorRegistry, pcap: &PcapConfig) -> Self {
        let executors = pcap
            .enabled()
            .into_iter()
            .map(|protocol| (protocol, resolve(registry, ExecutorRole::Pcap(protocol), 0)))
            .collect();
        PcapExecutorMapper { executors }
    }

    /// `None` when capture of `protocol` is disabled.
    pub fn executor(&self, protocol: PcapProtocol) -> Option<&ExecutorRef> {
        self.executors.get(&protocol)
    }
}

/// Executors of one cell of an OFH radio unit.
#[derive(Clone)]
pub struct OfhCellExecutors {
    pub dl: ExecutorRef,
    pub rx: ExecutorRef,
    pub txrx: ExecutorRef,
}

pub struct RuOfhExecutorMapper {
    timing: ExecutorRef,
    cells: Vec<OfhCellExecutors>,
}

impl RuOfhExecutorMapper {
    pub(crate) fn from_registry(registry: &ExecutorRegistry, txrx_groups: &[usize]) -> Self {
        let cells = txrx_groups
            .iter()
            .enumerate()
            .map(|(cell, &group)| OfhCellExecutors {
                dl: resolve(registry, ExecutorRole::RuDl, cell),
                rx: resolve(registry, ExecutorRole::RuRx, cell),
                txrx: resolve(registry, ExecutorRole::RuTxRx, group),
            })
            .collect();
        RuOfhExecutorMapper {
            timing: resolve(registry, ExecutorRole::RuTiming, 0),
            cells,
        }
    }

    pub fn timing_executor(&self) -> &ExecutorRef {
        &self.timing
    }

    pub fn cell(&self, cell: usize) -> &OfhCellExecutors {
        cell_or_fatal(&self.cells, cell, "OFH")
    }
}

/// Executors of one cell of an SDR radio unit.
#[derive(Clone)]
pub struct SdrCellExecutors {
    pub tx: ExecutorRef,
    pub rx: ExecutorRef,
    pub dl: ExecutorRef,
    pub ul: ExecutorRef,
}

pub struct RuSdrExecutorMapper {
    radio: ExecutorRef,
    cells: Vec<SdrCellExecutors>,
}

impl RuSdrExecutorMapper {
    pub(crate) fn from_registry(registry: &ExecutorRegistry, nof_cells: usize, profile: SdrThreadProfile) -> Self {
        let radio = resolve(registry, ExecutorRole::Radio, 0);
        let cells = (0..nof_cells)
            .map(|cell| {
                let get = |role| resolve(registry, role, cell);
                match profile {
                    SdrThreadProfile::Blocking => SdrCellExecutors {
                        tx: radio.clone(),
                        rx: radio.clone(),
                        dl: radio.clone(),
                        ul: radio.clone(),
                    },
                    SdrThreadProfile::Single => {
                        let exec = get(ExecutorRole::SdrCell);
                        SdrCellExecutors {
                            tx: exec.clone(),
                            rx: exec.clone(),
                            dl: exec.clone(),
                            ul: exec,
                        }
                    }
                    SdrThreadProfile::Dual => {
                        let (ul, dl) = (get(ExecutorRole::SdrUl), get(ExecutorRole::SdrDl));
                        SdrCellExecutors {
                            tx: dl.clone(),
                            rx: ul.clone(),
                            dl,
                            ul,
                        }
                    }
                    SdrThreadProfile::Quad => SdrCellExecutors {
                        tx: get(ExecutorRole::SdrTx),
                        rx: get(ExecutorRole::SdrRx),
                        dl: get(ExecutorRole::SdrDl),
                        ul: get(ExecutorRole::SdrUl),
                    },
                }
            })
            .collect();
        RuSdrExecutorMapper { radio, cells }
    }

    pub fn radio_executor(&self) -> &ExecutorRef {
        &self.radio
    }

    pub fn cell(&self, cell: usize) -> &SdrCellExecutors {
        cell_or_fatal(&self.cells, cell, "SDR")
    }
}

pub struct RuDummyExecutorMapper {
    executor: ExecutorRef,
    nof_cells: usize,
}

impl RuDummyExecutorMapper {
    pub(crate) fn from_registry(registry: &ExecutorRegistry, nof_cells: usize) -> Self {
        RuDummyExecutorMapper {
            executor: resolve(registry, ExecutorRole::RuDummy, 0),
            nof_cells,
        }
    }

    pub fn executor(&self) -> &ExecutorRef {
        &self.executor
    }

    /// Every cell shares the dummy RU worker.
    pub fn cell_executor(&self, cell: usize) -> &ExecutorRef {
        crate::report_fatal_error_if_not!(cell < self.nof_cells, "No dummy RU executor for cell {}", cell);
        &self.executor
    }
}

/// Executors of whichever radio unit is deployed.
pub enum RuExecutorMapper {
    Ofh(RuOfhExecutorMapper),
    Sdr(RuSdrExecutorMapper),
    Dummy(RuDummyExecutorMapper),
}
