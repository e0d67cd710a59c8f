//! Worker topology of the whole application.
//!
//! [`WorkerManager`] is the one place that knows which execution contexts the
//! deployment needs. It creates them in dependency order from a
//! [`WorkerManagerConfig`] and hands out executor mappers to the subsystems.
//!
//! Creation order:
//! 1. shared low-priority pool (three tiers, PCAP, metrics, CU-CP and CU-UP strands)
//! 2. split 6 worker
//! 3. CU-UP mapper over the pool
//! 4. DU-high: FAPI buffering workers, per-cell L2 workers
//! 5. DU-low: PHY worker, or per-cell UL/DL pools and PUSCH decoders
//! 6. OFH radio unit
//! 7. SDR radio unit
//! 8. dummy radio unit

use crate::affinity::{AffinityManager, AffinityRole, CpuMask, PinningPolicy, RoleAffinityConfig};
use crate::config::{
    CuUpConfig, DuHighConfig, DuLowConfig, PcapProtocol, RuDummyConfig, RuOfhConfig, RuSdrConfig, SdrThreadProfile,
    Split6Config, WorkerManagerConfig,
};
use crate::descriptor::{
    ExecutionContextDescriptor, ExecutorDescriptor, PriorityMultiqueueWorkerDescriptor, QueueDescriptor,
    SingleWorkerDescriptor, StrandDescriptor, TaskPriority, WorkerPoolDescriptor,
};
use crate::error::Error;
use crate::executor::ExecutorRef;
use crate::manager::{ExecutorRegistry, TaskExecutionManager};
use crate::mappers::{
    CuUpExecutorMapper, DuHighExecutorMapper, DuLowExecutorMapper, PcapExecutorMapper, RuDummyExecutorMapper,
    RuExecutorMapper, RuOfhExecutorMapper, RuSdrExecutorMapper,
};
use crate::queue::QueuePolicy;
use crate::topology::Topology;
use crate::ThreadPriority;
use std::time::Duration;

const LOW_PRIO_WAIT_INTERVAL: Duration = Duration::from_micros(50);
const DECODER_WAIT_INTERVAL: Duration = Duration::from_micros(100);
const RT_WAIT_INTERVAL: Duration = Duration::from_micros(10);

const LOW_PRIO_POOL: &str = "low_prio";
const SPLIT6_WORKER: &str = "split6_worker";
const PHY_WORKER: &str = "phy_worker";
const RU_TIMING_WORKER: &str = "ru_timing";
const RADIO_WORKER: &str = "radio";
const RU_DUMMY_WORKER: &str = "ru_dummy";

/// Named executor of the topology. Indexed roles append `#<index>` (cell,
/// TX/RX group or UE strand) to their name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutorRole {
    /// Low-priority pool, top tier: traffic received from peers.
    HighPrio,
    /// Low-priority pool, middle tier: PCAP writing and CU-UP.
    MediumPrio,
    /// Low-priority pool, bottom tier: control plane and timers.
    LowPrio,
    Metrics,
    CuCp,
    Pcap(PcapProtocol),
    CuUpCtrl,
    CuUpIoUl,
    CuUpUeCtrl,
    CuUpUeUl,
    CuUpUeDl,
    Split6,
    FapiBuffering,
    DuSlot,
    DuCell,
    DuUe,
    /// PHY of every cell in blocking mode.
    PhyBlocking,
    Pucch,
    Pusch,
    Srs,
    PuschDecoder,
    /// Top tier of the downlink PHY pool, carries L2 when it is shared.
    DuRt,
    PhyDl,
    Pdsch,
    Prach,
    RuTiming,
    RuDl,
    RuRx,
    RuTxRx,
    Radio,
    SdrCell,
    SdrTx,
    SdrRx,
    SdrDl,
    SdrUl,
    RuDummy,
}

impl ExecutorRole {
    pub fn is_indexed(self) -> bool {
        !matches!(
            self,
            ExecutorRole::HighPrio
                | ExecutorRole::MediumPrio
                | ExecutorRole::LowPrio
                | ExecutorRole::Metrics
                | ExecutorRole::CuCp
                | ExecutorRole::Pcap(_)
                | ExecutorRole::CuUpCtrl
                | ExecutorRole::CuUpIoUl
                | ExecutorRole::Split6
                | ExecutorRole::PhyBlocking
                | ExecutorRole::RuTiming
                | ExecutorRole::Radio
                | ExecutorRole::RuDummy
        )
    }

    /// Registered executor name. `index` is ignored by roles that are not
    /// indexed.
    pub fn name(self, index: usize) -> String {
        let base = match self {
            ExecutorRole::Pcap(protocol) => return format!("pcap_{}_exec", protocol.as_str()),
            ExecutorRole::HighPrio => "high_prio_exec",
            ExecutorRole::MediumPrio => "medium_prio_exec",
            ExecutorRole::LowPrio => "low_prio_exec",
            ExecutorRole::Metrics => "metrics_exec",
            ExecutorRole::CuCp => "cu_cp_exec",
            ExecutorRole::CuUpCtrl => "cu_up_ctrl_exec",
            ExecutorRole::CuUpIoUl => "cu_up_io_ul_exec",
            ExecutorRole::CuUpUeCtrl => "cu_up_ue_ctrl_exec",
            ExecutorRole::CuUpUeUl => "cu_up_ue_ul_exec",
            ExecutorRole::CuUpUeDl => "cu_up_ue_dl_exec",
            ExecutorRole::Split6 => "split6_exec",
            ExecutorRole::FapiBuffering => "fapi_buf_exec",
            ExecutorRole::DuSlot => "du_slot_exec",
            ExecutorRole::DuCell => "du_cell_exec",
            ExecutorRole::DuUe => "du_ue_exec",
            ExecutorRole::PhyBlocking => "phy_exec",
            ExecutorRole::Pucch => "pucch_exec",
            ExecutorRole::Pusch => "pusch_exec",
            ExecutorRole::Srs => "srs_exec",
            ExecutorRole::PuschDecoder => "pusch_dec_exec",
            ExecutorRole::DuRt => "du_rt_exec",
            ExecutorRole::PhyDl => "phy_dl_exec",
            ExecutorRole::Pdsch => "pdsch_exec",
            ExecutorRole::Prach => "prach_exec",
            ExecutorRole::RuTiming => "ru_timing_exec",
            ExecutorRole::RuDl => "ru_dl_exec",
            ExecutorRole::RuRx => "ru_rx_exec",
            ExecutorRole::RuTxRx => "ru_txrx_exec",
            ExecutorRole::Radio => "radio_exec",
            ExecutorRole::SdrCell => "sdr_exec",
            ExecutorRole::SdrTx => "sdr_tx_exec",
            ExecutorRole::SdrRx => "sdr_rx_exec",
            ExecutorRole::SdrDl => "sdr_dl_exec",
            ExecutorRole::SdrUl => "sdr_ul_exec",
            ExecutorRole::RuDummy => "ru_dummy_exec",
        };
        if self.is_indexed() {
            format!("{base}#{index}")
        } else {
            base.to_string()
        }
    }
}

fn executor(role: ExecutorRole, index: usize) -> ExecutorDescriptor {
    ExecutorDescriptor::new(role.name(index))
}

fn tier(context: &str, tier: &str, policy: QueuePolicy, size: usize, priority: TaskPriority) -> QueueDescriptor {
    QueueDescriptor::new(format!("{context}_{tier}_queue"), policy, size).with_priority(priority)
}

fn single_worker(
    name: String,
    policy: QueuePolicy,
    size: usize,
    executors: Vec<ExecutorDescriptor>,
    mask: CpuMask,
    priority: ThreadPriority,
) -> ExecutionContextDescriptor {
    ExecutionContextDescriptor::SingleWorker(SingleWorkerDescriptor {
        queue: QueueDescriptor::new(format!("{name}_queue"), policy, size),
        name,
        executors,
        mask,
        priority,
        wait_interval: None,
    })
}

/// Builds and owns every execution context of the application.
pub struct WorkerManager {
    config: WorkerManagerConfig,
    exec_mng: TaskExecutionManager,
    low_prio_affinity: AffinityManager,
    cell_affinities: Vec<AffinityManager>,
    pcap: PcapExecutorMapper,
    cu_up: Option<CuUpExecutorMapper>,
    du_high: Option<DuHighExecutorMapper>,
    du_low: Option<DuLowExecutorMapper>,
    ru: Option<RuExecutorMapper>,
}

impl WorkerManager {
    /// Builds the topology. Any failure is fatal.
    pub fn new(config: WorkerManagerConfig) -> Self {
        match Self::try_new(config) {
            Ok(manager) => manager,
            Err(err) => crate::report_fatal_error!("Failed to create the worker topology: {}", err),
        }
    }

    /// Builds the topology over the CPUs detected on the host.
    pub fn try_new(config: WorkerManagerConfig) -> Result<Self, Error> {
        Self::with_host_cpus(config, Topology::detect().all_cpus())
    }

    /// Builds the topology treating `host` as the available CPUs. Contexts
    /// created before a failure are stopped before the error is returned.
    pub fn with_host_cpus(config: WorkerManagerConfig, host: CpuMask) -> Result<Self, Error> {
        config.validate()?;

        let low_prio_affinity = AffinityManager::with_host_cpus(
            vec![RoleAffinityConfig::new(
                AffinityRole::LowPriority,
                config.low_prio_cpu_mask,
                PinningPolicy::Mask,
            )],
            host,
        );
        let cell_affinities: Vec<AffinityManager> = (0..config.nof_cells())
            .map(|cell| {
                let entries = config
                    .cell_affinities
                    .get(cell)
                    .cloned()
                    .unwrap_or_else(RoleAffinityConfig::unpinned);
                AffinityManager::with_host_cpus(entries, host)
            })
            .collect();

        let mut builder = TopologyBuilder {
            config: &config,
            exec_mng: TaskExecutionManager::new(),
            low_prio_affinity: &low_prio_affinity,
            cell_affinities: &cell_affinities,
        };

        builder.create_low_prio_pool()?;
        if let Some(split6) = &config.split6 {
            builder.create_split6_worker(split6)?;
        }
        if let Some(du_high) = &config.du_high {
            builder.create_du_high_workers(du_high)?;
        }
        if let Some(du_low) = &config.du_low {
            builder.create_du_low_workers(du_low)?;
        }
        if let Some(ofh) = &config.ru_ofh {
            builder.create_ofh_workers(ofh)?;
        }
        if let Some(sdr) = &config.ru_sdr {
            builder.create_sdr_workers(sdr)?;
        }
        if let Some(dummy) = &config.ru_dummy {
            builder.create_dummy_worker(dummy)?;
        }
        let exec_mng = builder.exec_mng;

        let registry = exec_mng.executors();
        let pcap = PcapExecutorMapper::from_registry(registry, &config.pcap);
        let cu_up = config
            .cu_up
            .as_ref()
            .map(|cu_up| CuUpExecutorMapper::from_registry(registry, cu_up.max_nof_ue_strands));
        let du_high = config.du_high.as_ref().map(|du_high| {
            DuHighExecutorMapper::from_registry(registry, du_high.nof_cells, du_high.fapi_buffering)
        });
        let du_low = config.du_low.as_ref().map(|du_low| {
            DuLowExecutorMapper::from_registry(
                registry,
                du_low.nof_cells,
                du_low.blocking_mode,
                du_low.nof_pusch_decoder_threads > 0,
            )
        });
        let ru = if let Some(ofh) = &config.ru_ofh {
            let groups: Vec<usize> = (0..ofh.nof_cells()).map(|cell| ofh.txrx_group(cell)).collect();
            Some(RuExecutorMapper::Ofh(RuOfhExecutorMapper::from_registry(registry, &groups)))
        } else if let Some(sdr) = &config.ru_sdr {
            Some(RuExecutorMapper::Sdr(RuSdrExecutorMapper::from_registry(
                registry,
                sdr.nof_cells,
                sdr.profile,
            )))
        } else {
            config
                .ru_dummy
                .as_ref()
                .map(|dummy| RuExecutorMapper::Dummy(RuDummyExecutorMapper::from_registry(registry, dummy.nof_cells)))
        };

        tracing::info!(
            contexts = exec_mng.contexts().len(),
            executors = registry.len(),
            cells = config.nof_cells(),
            "Worker topology created"
        );

        Ok(WorkerManager {
            config,
            exec_mng,
            low_prio_affinity,
            cell_affinities,
            pcap,
            cu_up,
            du_high,
            du_low,
            ru,
        })
    }

    pub fn config(&self) -> &WorkerManagerConfig {
        &self.config
    }

    pub fn executors(&self) -> &ExecutorRegistry {
        self.exec_mng.executors()
    }

    pub fn task_execution_manager(&self) -> &TaskExecutionManager {
        &self.exec_mng
    }

    /// Executor playing `role` for `index`. Aborts if the role was not
    /// deployed.
    pub fn executor(&self, role: ExecutorRole, index: usize) -> ExecutorRef {
        self.exec_mng.executor(&role.name(index))
    }

    pub fn high_prio_executor(&self) -> ExecutorRef {
        self.executor(ExecutorRole::HighPrio, 0)
    }

    pub fn medium_prio_executor(&self) -> ExecutorRef {
        self.executor(ExecutorRole::MediumPrio, 0)
    }

    pub fn low_prio_executor(&self) -> ExecutorRef {
        self.executor(ExecutorRole::LowPrio, 0)
    }

    pub fn metrics_executor(&self) -> ExecutorRef {
        self.executor(ExecutorRole::Metrics, 0)
    }

    pub fn cu_cp_executor(&self) -> ExecutorRef {
        self.executor(ExecutorRole::CuCp, 0)
    }

    /// Timers tick on the bottom tier of the low-priority pool.
    pub fn timer_source_executor(&self) -> ExecutorRef {
        self.low_prio_executor()
    }

    pub fn split6_executor(&self) -> Option<ExecutorRef> {
        self.config
            .split6
            .as_ref()
            .map(|_| self.executor(ExecutorRole::Split6, 0))
    }

    pub fn pcap_mapper(&self) -> &PcapExecutorMapper {
        &self.pcap
    }

    pub fn cu_up_mapper(&self) -> Option<&CuUpExecutorMapper> {
        self.cu_up.as_ref()
    }

    pub fn du_high_mapper(&self) -> Option<&DuHighExecutorMapper> {
        self.du_high.as_ref()
    }

    pub fn du_low_mapper(&self) -> Option<&DuLowExecutorMapper> {
        self.du_low.as_ref()
    }

    pub fn ru_mapper(&self) -> Option<&RuExecutorMapper> {
        self.ru.as_ref()
    }

    pub fn low_prio_affinity(&self) -> &AffinityManager {
        &self.low_prio_affinity
    }

    pub fn cell_affinity(&self, cell: usize) -> &AffinityManager {
        self.cell_affinities
            .get(cell)
            .unwrap_or_else(|| crate::report_fatal_error!("No affinity configuration for cell {}", cell))
    }

    /// Stops every worker. Later calls do nothing.
    pub fn stop(&mut self) {
        self.exec_mng.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.exec_mng.is_stopped()
    }
}

impl Drop for WorkerManager {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Creation steps. Dropping the builder on error stops what was created.
struct TopologyBuilder<'a> {
    config: &'a WorkerManagerConfig,
    exec_mng: TaskExecutionManager,
    low_prio_affinity: &'a AffinityManager,
    cell_affinities: &'a [AffinityManager],
}

impl TopologyBuilder<'_> {
    fn add(&mut self, descriptor: ExecutionContextDescriptor) -> Result<(), Error> {
        self.exec_mng.try_add_execution_context(&descriptor)?;
        Ok(())
    }

    fn rt(&self, priority: ThreadPriority) -> ThreadPriority {
        if self.config.realtime_priorities {
            priority
        } else {
            ThreadPriority::Normal
        }
    }

    fn low_prio_mask(&self, index: usize) -> CpuMask {
        self.low_prio_affinity.compute_mask(AffinityRole::LowPriority, index)
    }

    fn cell_mask(&self, cell: usize, role: AffinityRole, index: usize) -> CpuMask {
        self.cell_affinities[cell].compute_mask(role, index)
    }

    fn create_low_prio_pool(&mut self) -> Result<(), Error> {
        let config = self.config;
        let size = config.low_prio_task_queue_size;
        let policy = QueuePolicy::MoodycamelMpmc;
        let strand = |role: ExecutorRole, size: usize| StrandDescriptor::single(role.name(0), policy, size);

        let medium_strands = config
            .pcap
            .enabled()
            .into_iter()
            .map(|protocol| strand(ExecutorRole::Pcap(protocol), size))
            .chain(config.cu_up.iter().flat_map(cu_up_strands));

        let descriptor = ExecutionContextDescriptor::WorkerPool(WorkerPoolDescriptor {
            name: LOW_PRIO_POOL.into(),
            nof_workers: config.nof_low_prio_threads,
            queues: vec![
                tier(LOW_PRIO_POOL, "high", policy, size, TaskPriority::MAX),
                tier(LOW_PRIO_POOL, "medium", policy, size, TaskPriority::below_max(1)),
                tier(LOW_PRIO_POOL, "low", policy, size, TaskPriority::below_max(2)),
            ],
            executors: vec![
                executor(ExecutorRole::HighPrio, 0),
                executor(ExecutorRole::MediumPrio, 0)
                    .with_priority(TaskPriority::below_max(1))
                    .with_strands(medium_strands),
                executor(ExecutorRole::LowPrio, 0)
                    .with_priority(TaskPriority::below_max(2))
                    .with_strand(strand(ExecutorRole::Metrics, size))
                    .with_strand(strand(ExecutorRole::CuCp, size)),
            ],
            masks: (0..config.nof_low_prio_threads)
                .map(|index| self.low_prio_mask(index))
                .collect(),
            priority: ThreadPriority::Normal,
            wait_interval: Some(LOW_PRIO_WAIT_INTERVAL),
        });
        self.add(descriptor)
    }

    fn create_split6_worker(&mut self, split6: &Split6Config) -> Result<(), Error> {
        let descriptor = single_worker(
            SPLIT6_WORKER.into(),
            QueuePolicy::LockingMpsc,
            split6.queue_size,
            vec![executor(ExecutorRole::Split6, 0)],
            self.low_prio_mask(0),
            ThreadPriority::Normal,
        );
        self.add(descriptor)
    }

    fn create_du_high_workers(&mut self, du_high: &DuHighConfig) -> Result<(), Error> {
        let shares_dl_pool = self
            .config
            .du_low
            .as_ref()
            .is_some_and(DuLowConfig::shares_l2_with_dl_pool);

        for cell in 0..du_high.nof_cells {
            if du_high.fapi_buffering {
                let descriptor = single_worker(
                    format!("fapi_buf#{cell}"),
                    QueuePolicy::LockingMpsc,
                    du_high.fapi_queue_size,
                    vec![executor(ExecutorRole::FapiBuffering, cell)],
                    self.cell_mask(cell, AffinityRole::L2Cell, 0),
                    self.rt(ThreadPriority::BelowMax(3)),
                );
                self.add(descriptor)?;
            }

            // Otherwise L2 is a strand on the downlink PHY pool.
            if shares_dl_pool {
                continue;
            }

            let name = format!("du_cell#{cell}");
            let descriptor = ExecutionContextDescriptor::PriorityMultiqueueWorker(PriorityMultiqueueWorkerDescriptor {
                queues: vec![
                    tier(&name, "slot", QueuePolicy::LockfreeSpsc, du_high.slot_queue_size, TaskPriority::MAX),
                    tier(
                        &name,
                        "cell",
                        QueuePolicy::LockfreeMpmc,
                        du_high.cell_queue_size,
                        TaskPriority::below_max(1),
                    ),
                    tier(
                        &name,
                        "ue",
                        QueuePolicy::LockfreeMpmc,
                        du_high.ue_queue_size,
                        TaskPriority::below_max(2),
                    ),
                ],
                name,
                executors: vec![
                    executor(ExecutorRole::DuSlot, cell),
                    executor(ExecutorRole::DuCell, cell).with_priority(TaskPriority::below_max(1)),
                    executor(ExecutorRole::DuUe, cell).with_priority(TaskPriority::below_max(2)),
                ],
                mask: self.cell_mask(cell, AffinityRole::L2Cell, 0),
                priority: self.rt(ThreadPriority::BelowMax(2)),
                wait_interval: Some(RT_WAIT_INTERVAL),
            });
            self.add(descriptor)?;
        }
        Ok(())
    }

    fn create_du_low_workers(&mut self, du_low: &DuLowConfig) -> Result<(), Error> {
        let size = du_low.task_queue_size;

        if du_low.blocking_mode {
            let descriptor = single_worker(
                PHY_WORKER.into(),
                QueuePolicy::LockingMpsc,
                size,
                vec![executor(ExecutorRole::PhyBlocking, 0).inline_when_on_worker()],
                self.low_prio_mask(0),
                ThreadPriority::Normal,
            );
            return self.add(descriptor);
        }

        let config = self.config;
        let l2 = config.du_high.as_ref().filter(|_| du_low.shares_l2_with_dl_pool());

        for cell in 0..du_low.nof_cells {
            let name = format!("up_phy_ul#{cell}");
            let policy = QueuePolicy::LockfreeMpmc;
            let descriptor = ExecutionContextDescriptor::WorkerPool(WorkerPoolDescriptor {
                queues: vec![
                    tier(&name, "pucch", policy, size, TaskPriority::MAX),
                    tier(&name, "pusch", policy, size, TaskPriority::below_max(1)),
                    tier(&name, "srs", policy, size, TaskPriority::below_max(2)),
                ],
                name,
                nof_workers: du_low.nof_ul_threads,
                executors: vec![
                    executor(ExecutorRole::Pucch, cell),
                    executor(ExecutorRole::Pusch, cell).with_priority(TaskPriority::below_max(1)),
                    executor(ExecutorRole::Srs, cell).with_priority(TaskPriority::below_max(2)),
                ],
                masks: (0..du_low.nof_ul_threads)
                    .map(|index| self.cell_mask(cell, AffinityRole::L1Ul, index))
                    .collect(),
                priority: self.rt(ThreadPriority::BelowMax(20)),
                wait_interval: Some(RT_WAIT_INTERVAL),
            });
            self.add(descriptor)?;

            let mut du_rt = executor(ExecutorRole::DuRt, cell);
            if let Some(du_high) = l2 {
                du_rt = du_rt.with_strand(l2_strand(cell, du_high));
            }
            let name = format!("up_phy_dl#{cell}");
            let descriptor = ExecutionContextDescriptor::WorkerPool(WorkerPoolDescriptor {
                queues: vec![
                    tier(&name, "rt", policy, size, TaskPriority::MAX),
                    tier(&name, "dl", policy, size, TaskPriority::below_max(1)),
                    tier(&name, "pdsch", policy, size, TaskPriority::below_max(2)),
                    tier(&name, "prach", policy, size, TaskPriority::below_max(3)),
                ],
                name,
                nof_workers: du_low.nof_dl_threads,
                executors: vec![
                    du_rt,
                    executor(ExecutorRole::PhyDl, cell).with_priority(TaskPriority::below_max(1)),
                    executor(ExecutorRole::Pdsch, cell).with_priority(TaskPriority::below_max(2)),
                    executor(ExecutorRole::Prach, cell).with_priority(TaskPriority::below_max(3)),
                ],
                masks: (0..du_low.nof_dl_threads)
                    .map(|index| self.cell_mask(cell, AffinityRole::L1Dl, index))
                    .collect(),
                priority: self.rt(ThreadPriority::BelowMax(10)),
                wait_interval: Some(RT_WAIT_INTERVAL),
            });
            self.add(descriptor)?;

            if du_low.nof_pusch_decoder_threads > 0 {
                let nof_workers = du_low.nof_pusch_decoder_threads;
                let name = format!("pusch_dec#{cell}");
                let descriptor = ExecutionContextDescriptor::WorkerPool(WorkerPoolDescriptor {
                    queues: vec![QueueDescriptor::new(format!("{name}_queue"), QueuePolicy::LockfreeMpmc, size)],
                    name,
                    nof_workers,
                    executors: vec![executor(ExecutorRole::PuschDecoder, cell)],
                    masks: (0..nof_workers).map(|index| self.low_prio_mask(index)).collect(),
                    priority: ThreadPriority::Normal,
                    wait_interval: Some(DECODER_WAIT_INTERVAL),
                });
                self.add(descriptor)?;
            }
        }
        Ok(())
    }

    fn create_ofh_workers(&mut self, ofh: &RuOfhConfig) -> Result<(), Error> {
        let size = ofh.task_queue_size;

        let descriptor = single_worker(
            RU_TIMING_WORKER.into(),
            QueuePolicy::LockingMpsc,
            size,
            vec![executor(ExecutorRole::RuTiming, 0)],
            ofh.timing_cpu,
            self.rt(ThreadPriority::Max),
        );
        self.add(descriptor)?;

        for cell in 0..ofh.nof_cells() {
            let nof_workers = ofh.nof_dl_threads(cell);
            let name = format!("ru_dl#{cell}");
            let descriptor = ExecutionContextDescriptor::WorkerPool(WorkerPoolDescriptor {
                queues: vec![QueueDescriptor::new(format!("{name}_queue"), QueuePolicy::LockfreeMpmc, size)],
                name,
                nof_workers,
                executors: vec![executor(ExecutorRole::RuDl, cell)],
                masks: (0..nof_workers)
                    .map(|index| self.cell_mask(cell, AffinityRole::Ru, index))
                    .collect(),
                priority: self.rt(ThreadPriority::BelowMax(5)),
                wait_interval: Some(RT_WAIT_INTERVAL),
            });
            self.add(descriptor)?;

            let descriptor = single_worker(
                format!("ru_rx#{cell}"),
                QueuePolicy::LockingMpsc,
                size,
                vec![executor(ExecutorRole::RuRx, cell)],
                self.cell_mask(cell, AffinityRole::Ru, 0),
                self.rt(ThreadPriority::BelowMax(1)),
            );
            self.add(descriptor)?;
        }

        // Groups beyond the last cell would have nothing to serve.
        let nof_groups = ofh.txrx_group(ofh.nof_cells() - 1) + 1;
        for group in 0..nof_groups {
            let descriptor = single_worker(
                format!("ru_txrx#{group}"),
                QueuePolicy::LockingMpsc,
                size,
                vec![executor(ExecutorRole::RuTxRx, group)],
                ofh.txrx_affinities.get(group).copied().unwrap_or_default(),
                self.rt(ThreadPriority::BelowMax(1)),
            );
            self.add(descriptor)?;
        }
        Ok(())
    }

    fn create_sdr_workers(&mut self, sdr: &RuSdrConfig) -> Result<(), Error> {
        let size = sdr.task_queue_size;
        let descriptor = single_worker(
            RADIO_WORKER.into(),
            QueuePolicy::LockingMpsc,
            size,
            vec![executor(ExecutorRole::Radio, 0)],
            self.cell_mask(0, AffinityRole::Ru, 0),
            self.rt(ThreadPriority::Max),
        );
        self.add(descriptor)?;

        let roles: &[ExecutorRole] = match sdr.profile {
            SdrThreadProfile::Blocking => &[],
            SdrThreadProfile::Single => &[ExecutorRole::SdrCell],
            SdrThreadProfile::Dual => &[ExecutorRole::SdrUl, ExecutorRole::SdrDl],
            SdrThreadProfile::Quad => &[
                ExecutorRole::SdrTx,
                ExecutorRole::SdrRx,
                ExecutorRole::SdrDl,
                ExecutorRole::SdrUl,
            ],
        };
        debug_assert_eq!(roles.len(), sdr.profile.nof_workers_per_cell());

        for cell in 0..sdr.nof_cells {
            for (index, &role) in roles.iter().enumerate() {
                let executor_name = role.name(cell);
                let context_name = executor_name.replace("_exec", "");
                let descriptor = single_worker(
                    context_name,
                    QueuePolicy::LockingMpsc,
                    size,
                    vec![ExecutorDescriptor::new(executor_name)],
                    self.cell_mask(cell, AffinityRole::Ru, index),
                    self.rt(ThreadPriority::BelowMax(1)),
                );
                self.add(descriptor)?;
            }
        }
        Ok(())
    }

    fn create_dummy_worker(&mut self, dummy: &RuDummyConfig) -> Result<(), Error> {
        let descriptor = single_worker(
            RU_DUMMY_WORKER.into(),
            QueuePolicy::LockingMpsc,
            dummy.task_queue_size,
            vec![executor(ExecutorRole::RuDummy, 0)],
            self.cell_mask(0, AffinityRole::Ru, 0),
            self.rt(ThreadPriority::Max),
        );
        self.add(descriptor)
    }
}

/// CU-UP strands: control, UL IO and the per-UE strands.
fn cu_up_strands(cu_up: &CuUpConfig) -> Vec<StrandDescriptor> {
    let policy = QueuePolicy::MoodycamelMpmc;
    let mut strands = vec![
        StrandDescriptor::single(ExecutorRole::CuUpCtrl.name(0), policy, cu_up.ctrl_queue_size),
        StrandDescriptor::single(ExecutorRole::CuUpIoUl.name(0), policy, cu_up.ctrl_queue_size),
    ];
    strands.extend((0..cu_up.max_nof_ue_strands).map(|index| {
        StrandDescriptor::new(
            format!("cu_up_ue_strand#{index}"),
            [ExecutorRole::CuUpUeCtrl, ExecutorRole::CuUpUeUl, ExecutorRole::CuUpUeDl]
                .into_iter()
                .map(|role| QueueDescriptor::new(role.name(index), policy, cu_up.ue_queue_size))
                .collect(),
        )
    }));
    strands
}

/// L2 of `cell` layered on the top tier of the downlink PHY pool.
fn l2_strand(cell: usize, du_high: &DuHighConfig) -> StrandDescriptor {
    let policy = QueuePolicy::LockfreeMpmc;
    StrandDescriptor::new(
        format!("du_l2_strand#{cell}"),
        vec![
            QueueDescriptor::new(ExecutorRole::DuSlot.name(cell), policy, du_high.slot_queue_size),
            QueueDescriptor::new(ExecutorRole::DuCell.name(cell), policy, du_high.cell_queue_size),
            QueueDescriptor::new(ExecutorRole::DuUe.name(cell), policy, du_high.ue_queue_size),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names() {
        assert_eq!(ExecutorRole::HighPrio.name(3), "high_prio_exec");
        assert_eq!(ExecutorRole::DuUe.name(1), "du_ue_exec#1");
        assert_eq!(ExecutorRole::Pcap(PcapProtocol::F1ap).name(0), "pcap_f1ap_exec");
        assert_eq!(ExecutorRole::RuTxRx.name(2), "ru_txrx_exec#2");
        assert!(!ExecutorRole::Radio.is_indexed());
    }

    #[test]
    fn test_cu_up_strand_layout() {
        let strands = cu_up_strands(&CuUpConfig {
            max_nof_ue_strands: 2,
            ..Default::default()
        });
        assert_eq!(strands.len(), 4);
        let names: Vec<&str> = strands[3].queues.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["cu_up_ue_ctrl_exec#1", "cu_up_ue_ul_exec#1", "cu_up_ue_dl_exec#1"]);
    }

    #[test]
    fn test_l2_strand_reuses_l2_names() {
        let strand = l2_strand(0, &DuHighConfig::default());
        let names: Vec<&str> = strand.queues.iter().map(|q| q.name.as_str()).collect();
        assert_eq!(names, vec!["du_slot_exec#0", "du_cell_exec#0", "du_ue_exec#0"]);
    }
}
