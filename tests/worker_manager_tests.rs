use ranexec::config::{
    CuUpConfig, DuHighConfig, DuLowConfig, PcapProtocol, RuDummyConfig, RuOfhConfig, RuSdrConfig, SdrThreadProfile,
    Split6Config,
};
use ranexec::mappers::RuExecutorMapper;
use ranexec::{
    ConfigError, CpuMask, Error, ExecutionContext, ExecutorRole, SubmitError, TaskExecutor, TaskExecutorExt,
    WorkerManager, WorkerManagerConfig,
};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, mut done: impl FnMut() -> bool) {
    let start = Instant::now();
    while !done() {
        if start.elapsed() > timeout {
            panic!("condition not reached within {:?}", timeout);
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Config that never asks for real-time scheduling, so it runs unprivileged.
fn base_config() -> WorkerManagerConfig {
    WorkerManagerConfig {
        nof_low_prio_threads: 2,
        realtime_priorities: false,
        ..Default::default()
    }
}

fn build(config: WorkerManagerConfig) -> WorkerManager {
    WorkerManager::with_host_cpus(config, CpuMask::from_range(0..num_cpus::get())).unwrap()
}

fn context_names(workers: &WorkerManager) -> Vec<String> {
    workers
        .task_execution_manager()
        .contexts()
        .iter()
        .map(|context| context.name().to_string())
        .collect()
}

#[test]
fn test_minimal_topology_has_low_prio_executors() {
    let mut workers = build(base_config());

    let registry = workers.executors();
    for name in ["high_prio_exec", "medium_prio_exec", "low_prio_exec", "metrics_exec", "cu_cp_exec"] {
        assert!(registry.contains(name), "missing {name}");
    }
    assert!(!registry.contains("du_ue_exec#0"));
    assert!(workers.du_high_mapper().is_none());
    assert!(workers.ru_mapper().is_none());
    assert!(workers.split6_executor().is_none());
    assert_eq!(context_names(&workers), vec!["low_prio"]);

    let ran = Arc::new(Mutex::new(Vec::new()));
    for executor in [
        workers.high_prio_executor(),
        workers.medium_prio_executor(),
        workers.low_prio_executor(),
        workers.metrics_executor(),
        workers.cu_cp_executor(),
        workers.timer_source_executor(),
    ] {
        let ran = ran.clone();
        let name = executor.name().to_string();
        executor.defer_fn(move || ran.lock().unwrap().push(name)).unwrap();
    }
    wait_until(Duration::from_secs(5), || ran.lock().unwrap().len() == 6);

    workers.stop();
    assert!(workers.is_stopped());
}

#[test]
fn test_split6_worker_uses_configured_queue_size() {
    let mut config = base_config();
    config.split6 = Some(Split6Config { queue_size: 3 });
    let mut workers = build(config);
    assert!(context_names(&workers).contains(&"split6_worker".to_string()));
    let executor = workers.split6_executor().unwrap();

    // 1. Park the worker on a gate task.
    let (started_tx, started_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    executor
        .defer_fn(move || {
            started_tx.send(()).unwrap();
            let _ = release_rx.recv();
        })
        .unwrap();
    started_rx.recv_timeout(Duration::from_secs(5)).unwrap();

    // 2. Exactly the configured capacity is accepted.
    for _ in 0..3 {
        executor.defer_fn(|| {}).unwrap();
    }
    assert_eq!(executor.defer_fn(|| {}), Err(SubmitError::QueueFull));

    // 3. Release and stop.
    release_tx.send(()).unwrap();
    workers.stop();
}

#[test]
fn test_du_cells_get_dedicated_l2_workers() {
    let mut config = base_config();
    config.du_high = Some(DuHighConfig {
        nof_cells: 2,
        ..Default::default()
    });
    config.du_low = Some(DuLowConfig {
        nof_cells: 2,
        ..Default::default()
    });
    let mut workers = build(config);

    let contexts = context_names(&workers);
    for name in ["du_cell#0", "du_cell#1", "up_phy_ul#0", "up_phy_dl#1"] {
        assert!(contexts.iter().any(|c| c == name), "missing context {name}");
    }

    let du_high = workers.du_high_mapper().unwrap();
    assert_eq!(du_high.nof_cells(), 2);
    assert_eq!(du_high.ue_executor(1).name(), "du_ue_exec#1");
    assert_eq!(du_high.slot_ind_executor(0).name(), "du_slot_exec#0");
    assert!(du_high.fapi_buffering_executor(0).is_none());
    assert_eq!(du_high.ctrl_executor().name(), "high_prio_exec");

    let du_low = workers.du_low_mapper().unwrap();
    // Synchronous decoding runs on the PUSCH executor.
    assert_eq!(du_low.pusch_decoder_executor(0).name(), du_low.pusch_executor(0).name());
    assert_eq!(du_low.pdsch_executor(1).name(), "pdsch_exec#1");

    let done = Arc::new(Mutex::new(0));
    for executor in [du_high.ue_executor(1), du_high.cell_executor(0), du_low.prach_executor(1)] {
        let done = done.clone();
        executor.defer_fn(move || *done.lock().unwrap() += 1).unwrap();
    }
    wait_until(Duration::from_secs(5), || *done.lock().unwrap() == 3);

    workers.stop();
}

#[test]
fn test_l2_shares_dl_pool_with_multiple_dl_threads() {
    let mut config = base_config();
    config.du_high = Some(DuHighConfig::default());
    config.du_low = Some(DuLowConfig {
        nof_dl_threads: 2,
        ..Default::default()
    });
    let mut workers = build(config);

    let contexts = context_names(&workers);
    assert!(!contexts.iter().any(|c| c == "du_cell#0"));
    assert!(workers.executors().contains("du_rt_exec#0"));

    // The L2 executors are strands, so a burst keeps its order on two threads.
    let ue = workers.du_high_mapper().unwrap().ue_executor(0).clone();
    let log = Arc::new(Mutex::new(Vec::new()));
    for i in 0..200 {
        let log = log.clone();
        ue.defer_fn(move || log.lock().unwrap().push(i)).unwrap();
    }
    wait_until(Duration::from_secs(5), || log.lock().unwrap().len() == 200);
    assert_eq!(*log.lock().unwrap(), (0..200).collect::<Vec<_>>());

    workers.stop();
}

#[test]
fn test_blocking_phy_maps_every_role_to_one_worker() {
    let mut config = base_config();
    config.du_low = Some(DuLowConfig {
        nof_cells: 2,
        blocking_mode: true,
        ..Default::default()
    });
    let mut workers = build(config);

    let du_low = workers.du_low_mapper().unwrap();
    for cell in 0..2 {
        for executor in [
            du_low.pucch_executor(cell),
            du_low.pusch_executor(cell),
            du_low.srs_executor(cell),
            du_low.dl_executor(cell),
            du_low.pdsch_executor(cell),
            du_low.prach_executor(cell),
        ] {
            assert_eq!(executor.name(), "phy_exec");
        }
    }
    assert!(context_names(&workers).iter().any(|c| c == "phy_worker"));

    workers.stop();
}

#[test]
fn test_ofh_cells_grouped_on_txrx_workers() {
    let mut config = base_config();
    config.ru_ofh = Some(RuOfhConfig {
        nof_downlink_antennas: vec![1, 1, 1],
        txrx_affinities: vec![CpuMask::new(), CpuMask::new()],
        ..Default::default()
    });
    let mut workers = build(config);

    let contexts = context_names(&workers);
    for name in ["ru_timing", "ru_dl#2", "ru_rx#0", "ru_txrx#0", "ru_txrx#1"] {
        assert!(contexts.iter().any(|c| c == name), "missing context {name}");
    }

    match workers.ru_mapper() {
        Some(RuExecutorMapper::Ofh(ofh)) => {
            assert_eq!(ofh.timing_executor().name(), "ru_timing_exec");
            assert_eq!(ofh.cell(0).txrx.name(), ofh.cell(1).txrx.name());
            assert_ne!(ofh.cell(1).txrx.name(), ofh.cell(2).txrx.name());
        }
        _ => panic!("expected an OFH mapper"),
    }

    workers.stop();
}

#[test]
fn test_sdr_profiles_set_worker_count() {
    for (profile, per_cell) in [
        (SdrThreadProfile::Blocking, 0),
        (SdrThreadProfile::Single, 1),
        (SdrThreadProfile::Dual, 2),
        (SdrThreadProfile::Quad, 4),
    ] {
        let mut config = base_config();
        config.ru_sdr = Some(RuSdrConfig {
            nof_cells: 2,
            profile,
            ..Default::default()
        });
        let mut workers = build(config);

        let sdr_contexts = context_names(&workers)
            .into_iter()
            .filter(|name| name.starts_with("sdr"))
            .count();
        assert_eq!(sdr_contexts, 2 * per_cell, "{profile:?}");

        match workers.ru_mapper() {
            Some(RuExecutorMapper::Sdr(sdr)) => {
                assert_eq!(sdr.radio_executor().name(), "radio_exec");
                if profile == SdrThreadProfile::Blocking {
                    assert_eq!(sdr.cell(1).ul.name(), "radio_exec");
                }
                if profile == SdrThreadProfile::Dual {
                    assert_eq!(sdr.cell(1).rx.name(), "sdr_ul_exec#1");
                    assert_eq!(sdr.cell(1).tx.name(), "sdr_dl_exec#1");
                }
            }
            _ => panic!("expected an SDR mapper"),
        }
        workers.stop();
    }
}

#[test]
fn test_dummy_ru_shared_by_cells() {
    let mut config = base_config();
    config.ru_dummy = Some(RuDummyConfig {
        nof_cells: 2,
        ..Default::default()
    });
    let mut workers = build(config);

    match workers.ru_mapper() {
        Some(RuExecutorMapper::Dummy(dummy)) => {
            assert_eq!(dummy.cell_executor(1).name(), "ru_dummy_exec");
        }
        _ => panic!("expected a dummy RU mapper"),
    }
    workers.stop();
}

#[test]
fn test_cu_up_ue_executors_round_robin() {
    let mut config = base_config();
    config.cu_up = Some(CuUpConfig {
        max_nof_ue_strands: 2,
        ..Default::default()
    });
    let mut workers = build(config);

    let cu_up = workers.cu_up_mapper().unwrap();
    assert_eq!(cu_up.nof_ue_strands(), 2);
    let names: Vec<String> = (0..4)
        .map(|_| cu_up.create_ue_executors().dl.name().to_string())
        .collect();
    assert_eq!(
        names,
        vec!["cu_up_ue_dl_exec#0", "cu_up_ue_dl_exec#1", "cu_up_ue_dl_exec#0", "cu_up_ue_dl_exec#1"]
    );

    // Control, UL and DL of one UE share a strand: they never overlap and keep
    // submission order.
    let ue = cu_up.create_ue_executors();
    let log = Arc::new(Mutex::new(Vec::new()));
    for (label, executor) in [("ctrl", &ue.ctrl), ("ul", &ue.ul), ("dl", &ue.dl)] {
        let log = log.clone();
        executor.defer_fn(move || log.lock().unwrap().push(label)).unwrap();
    }
    wait_until(Duration::from_secs(5), || log.lock().unwrap().len() == 3);
    assert_eq!(*log.lock().unwrap(), vec!["ctrl", "ul", "dl"]);

    workers.stop();
}

#[test]
fn test_pcap_executors_only_for_enabled_protocols() {
    let mut config = base_config();
    config.pcap.f1ap = true;
    config.pcap.mac = true;
    let mut workers = build(config);

    let pcap = workers.pcap_mapper();
    assert_eq!(pcap.executor(PcapProtocol::F1ap).map(|e| e.name()), Some("pcap_f1ap_exec"));
    assert!(pcap.executor(PcapProtocol::Mac).is_some());
    assert!(pcap.executor(PcapProtocol::Ngap).is_none());
    assert!(!workers.executors().contains("pcap_ngap_exec"));

    workers.stop();
}

#[test]
fn test_executor_by_role() {
    let mut config = base_config();
    config.du_high = Some(DuHighConfig::default());
    let mut workers = build(config);

    assert_eq!(workers.executor(ExecutorRole::DuCell, 0).name(), "du_cell_exec#0");
    assert_eq!(workers.executor(ExecutorRole::HighPrio, 7).name(), "high_prio_exec");
    workers.stop();
}

#[test]
fn test_two_radio_units_rejected() {
    let mut config = base_config();
    config.ru_dummy = Some(RuDummyConfig::default());
    config.ru_sdr = Some(RuSdrConfig::default());

    match WorkerManager::with_host_cpus(config, CpuMask::from_range(0..1)) {
        Err(Error::Config(ConfigError::MultipleRadioUnits(2))) => {}
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("two radio units were accepted"),
    }
}

#[test]
#[should_panic(expected = "Failed to create the worker topology")]
fn test_new_with_invalid_config_is_fatal() {
    let mut config = base_config();
    config.nof_low_prio_threads = 0;
    let _workers = WorkerManager::new(config);
}

#[test]
fn test_stop_twice_and_drop() {
    let mut workers = build(base_config());
    let executor = workers.low_prio_executor();
    workers.stop();
    workers.stop();
    assert!(executor.defer_fn(|| {}).is_err());

    // Dropping a running manager stops and joins its workers.
    let workers = build(base_config());
    drop(workers);
}
