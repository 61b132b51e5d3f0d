//! Partitioned scanner
//!
//! The data range is split into `N` static partitions (see
//! [`partition_range`]). Each partition is scanned by its own scoped
//! worker thread while the calling thread scans the residual tail. All
//! `N + 1` participants meet at a single barrier before the coordinator
//! joins the workers, so no worker exits before the residual is done.
//!
//! Workers are held at a start gate until every one of them has been
//! spawned. If a spawn fails the gate is closed instead, the workers that
//! already exist leave without scanning, and the scan returns the spawn
//! error. The barrier count is only ever relied on once all `N` workers
//! exist.
//!
//! A failing partition stops early but does not stop its siblings. The
//! failure only surfaces after every thread has been joined, and work
//! already committed by other partitions is kept.

use crate::config::ScanConfig;
use crate::error::{Result, ZerofreeError};
use crate::partition::partition_range;
use crate::progress::ProgressCounters;
use crate::scan::{scan_range, ScanMode, ScanSummary};
use crate::volume::Volume;
use parking_lot::{Condvar, Mutex};
use std::ops::Range;
use std::sync::Barrier;
use tracing::{debug, info, warn};

/// Arrives at the barrier when dropped, on every exit path
struct Arrival<'a> {
    barrier: &'a Barrier,
}

impl<'a> Arrival<'a> {
    fn new(barrier: &'a Barrier) -> Self {
        Arrival { barrier }
    }
}

impl Drop for Arrival<'_> {
    fn drop(&mut self) {
        self.barrier.wait();
    }
}

/// One-shot go / no-go signal for spawned workers
struct StartGate {
    state: Mutex<Option<bool>>,
    changed: Condvar,
}

impl StartGate {
    fn new() -> Self {
        StartGate {
            state: Mutex::new(None),
            changed: Condvar::new(),
        }
    }

    /// Block until the gate is settled; true means start scanning
    fn wait(&self) -> bool {
        let mut state = self.state.lock();
        loop {
            if let Some(open) = *state {
                return open;
            }
            self.changed.wait(&mut state);
        }
    }

    /// First call wins
    fn settle(&self, open: bool) {
        let mut state = self.state.lock();
        if state.is_none() {
            *state = Some(open);
            self.changed.notify_all();
        }
    }
}

/// Closes the gate on drop unless it was opened first
struct GateRelease<'a>(&'a StartGate);

impl Drop for GateRelease<'_> {
    fn drop(&mut self) {
        self.0.settle(false);
    }
}

/// What one range (partition or residual) produced
struct RangeOutcome {
    index: usize,
    range: Range<u64>,
    result: Result<()>,
    counters: ProgressCounters,
}

/// Scan one range with a private scratch buffer, then arrive
///
/// The scratch buffer is declared after the arrival guard so it is freed
/// before the barrier wait.
fn run_range<V: Volume + ?Sized>(
    volume: &V,
    index: usize,
    range: Range<u64>,
    config: &ScanConfig,
    fill_buf: &[u8],
    barrier: &Barrier,
) -> RangeOutcome {
    let _arrival = Arrival::new(barrier);
    let mut scratch = vec![0u8; volume.block_size()];

    debug!("Range {} scanning blocks {}..{}", index, range.start, range.end);
    let (result, counters) = scan_range(volume, range.clone(), config, fill_buf, &mut scratch);

    match &result {
        Ok(()) => debug!(
            "Range {} done: {} free, {} modified",
            index, counters.free_blocks_seen, counters.blocks_modified
        ),
        Err(e) => warn!("Range {} stopped early: {}", index, e),
    }

    RangeOutcome {
        index,
        range,
        result,
        counters,
    }
}

/// Scan the data range with `config.thread_count` workers
///
/// Works for any thread count of at least 1; [`crate::run_scan`] only
/// takes this path for two or more. Failing to start a worker thread is
/// reported as [`ZerofreeError::Io`] with no block touched.
pub fn scan_parallel<V: Volume + ?Sized>(volume: &V, config: &ScanConfig) -> Result<ScanSummary> {
    scan_partitions(volume, config, |_| None)
}

/// `stack_size` picks an explicit stack size for worker `index`
fn scan_partitions<V, S>(volume: &V, config: &ScanConfig, stack_size: S) -> Result<ScanSummary>
where
    V: Volume + ?Sized,
    S: Fn(usize) -> Option<usize>,
{
    config.validate()?;

    let n = config.thread_count;
    let plan = partition_range(volume.data_range(), n);
    let fill_buf = config.fill_buffer(volume.block_size());
    let gate = StartGate::new();
    let barrier = Barrier::new(n + 1);

    info!(
        "Partitioned scan of blocks {}..{} with {} threads (residual {}..{})",
        volume.first_data_block(),
        volume.blocks_count(),
        n,
        plan.residual.start,
        plan.residual.end
    );

    let outcomes = crossbeam::thread::scope(|s| -> Result<Vec<RangeOutcome>> {
        let _release = GateRelease(&gate);
        let mut handles = Vec::with_capacity(n);

        for (index, range) in plan.partitions.iter().enumerate() {
            let range = range.clone();
            let gate = &gate;
            let barrier = &barrier;
            let fill_buf = fill_buf.as_slice();

            let mut builder = s.builder().name(format!("zerofree-scan-{}", index));
            if let Some(size) = stack_size(index) {
                builder = builder.stack_size(size);
            }

            // On error the release guard closes the gate and the scope
            // joins the workers started so far
            let handle = builder
                .spawn(move |_| {
                    gate.wait()
                        .then(|| run_range(volume, index, range, config, fill_buf, barrier))
                })
                .map_err(|e| {
                    warn!("Failed to start scan worker {} of {}: {}", index, n, e);
                    ZerofreeError::Io(e)
                })?;
            handles.push(handle);
        }

        gate.settle(true);

        // The residual runs here, concurrently with the workers
        let residual = run_range(volume, n, plan.residual.clone(), config, &fill_buf, &barrier);

        let mut outcomes: Vec<RangeOutcome> = handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| match handle.join() {
                Ok(Some(outcome)) => outcome,
                // The gate is open, so no outcome means the worker panicked
                _ => RangeOutcome {
                    index,
                    range: plan.partitions[index].clone(),
                    result: Err(ZerofreeError::WorkerPanicked(index)),
                    counters: ProgressCounters::default(),
                },
            })
            .collect();
        outcomes.push(residual);
        Ok(outcomes)
    })
    .map_err(|_| ZerofreeError::WorkerPanicked(n))??;

    summarize(outcomes, config)
}

fn summarize(outcomes: Vec<RangeOutcome>, config: &ScanConfig) -> Result<ScanSummary> {
    let ranges = outcomes.len();
    let mut counters = ProgressCounters::default();
    let mut failed = 0;
    let mut first = None;

    for outcome in outcomes {
        counters.merge(outcome.counters);
        if let Err(e) = outcome.result {
            warn!(
                "Range {} ({}..{}) failed",
                outcome.index, outcome.range.start, outcome.range.end
            );
            failed += 1;
            first.get_or_insert(e);
        }
    }

    if let Some(first) = first {
        return Err(ZerofreeError::PartitionsFailed {
            failed,
            ranges,
            first: Box::new(first),
        });
    }

    info!(
        "Partitioned scan finished: {} free, {} modified",
        counters.free_blocks_seen, counters.blocks_modified
    );
    Ok(ScanSummary::new(ScanMode::Partitioned, ranges, counters, config))
}
