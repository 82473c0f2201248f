//! Snapshot request dispatch
//!
//! Requests leave the step context grouped by horizontal region, one
//! [`RegionRequest`] per region per step. Results come back through a
//! [`SnapshotSink`], a channel the engine drains at the start of each step;
//! nothing on the fetching side ever touches the registry or the physics
//! space.

use super::section::{SectionCoord, Ticket};
use super::snapshot::VoxelSnapshot;
use super::voxel::VoxelWorld;
use crate::error::{Result, SnapshotError};
use crossbeam_channel::{unbounded, Receiver, Sender};
use glam::IVec2;
use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Request for the voxels of one section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionRequest {
    pub coord: SectionCoord,
    pub ticket: Ticket,
}

/// Requests for several sections of one horizontal region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRequest {
    pub region: IVec2,
    pub sections: Vec<SectionRequest>,
}

impl RegionRequest {
    pub fn coords(&self) -> Vec<SectionCoord> {
        self.sections.iter().map(|section| section.coord).collect()
    }
}

/// Result of one section request
#[derive(Debug)]
pub struct SnapshotDelivery {
    pub request: SectionRequest,
    pub result: std::result::Result<VoxelSnapshot, SnapshotError>,
}

/// Return path for snapshot results, usable from any thread
#[derive(Debug, Clone)]
pub struct SnapshotSink {
    tx: Sender<SnapshotDelivery>,
}

impl SnapshotSink {
    /// Hand a result back to the engine
    ///
    /// Results for an engine that no longer exists are dropped.
    pub fn deliver(
        &self,
        request: SectionRequest,
        result: std::result::Result<VoxelSnapshot, SnapshotError>,
    ) {
        if self.tx.send(SnapshotDelivery { request, result }).is_err() {
            tracing::trace!(section = %request.coord, "engine gone, dropping snapshot");
        }
    }
}

pub(crate) fn snapshot_channel() -> (SnapshotSink, Receiver<SnapshotDelivery>) {
    let (tx, rx) = unbounded();
    (SnapshotSink { tx }, rx)
}

/// Hook through which the engine asks the host for voxel data
///
/// Called from the step context, once per region per step. Implementations
/// must return without waiting for the data; every section of the request
/// eventually gets exactly one delivery through `sink`, or none at all if the
/// host gives up on it.
pub trait SnapshotScheduler {
    fn schedule(&mut self, request: RegionRequest, sink: SnapshotSink);
}

/// Fetch a region from `world` and deliver one result per requested section
pub fn fulfil<W: VoxelWorld + ?Sized>(world: &W, request: &RegionRequest, sink: &SnapshotSink) {
    match world.fetch_region_snapshot(request.region, &request.coords()) {
        Ok(snapshots) => {
            let mut by_coord: HashMap<_, _> = snapshots.into_iter().collect();
            for &section in &request.sections {
                let result = by_coord.remove(&section.coord).ok_or_else(|| {
                    SnapshotError::Failed(format!(
                        "section {} missing from region snapshot",
                        section.coord
                    ))
                });
                sink.deliver(section, result);
            }
        }
        Err(err) => {
            tracing::debug!(region = %request.region, %err, "region fetch failed");
            for &section in &request.sections {
                sink.deliver(section, Err(err.clone()));
            }
        }
    }
}

/// Fulfils every request immediately on the step thread
#[derive(Debug)]
pub struct InlineScheduler<W> {
    world: Arc<W>,
}

impl<W: VoxelWorld> InlineScheduler<W> {
    pub fn new(world: Arc<W>) -> Self {
        Self { world }
    }
}

impl<W: VoxelWorld> SnapshotScheduler for InlineScheduler<W> {
    fn schedule(&mut self, request: RegionRequest, sink: SnapshotSink) {
        fulfil(self.world.as_ref(), &request, &sink);
    }
}

type Job = (RegionRequest, SnapshotSink);

/// Fulfils requests on a pool of background threads
///
/// Workers pull region jobs from a shared queue. Dropping the scheduler
/// closes the queue and joins every worker after the queued jobs finish.
pub struct WorkerPoolScheduler {
    jobs: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPoolScheduler {
    /// Spawn `threads` workers (at least one) reading from `world`
    pub fn new<W: VoxelWorld>(world: Arc<W>, threads: usize) -> Result<Self> {
        let (tx, rx) = unbounded::<Job>();
        let mut workers = Vec::with_capacity(threads.max(1));

        for index in 0..threads.max(1) {
            let world = Arc::clone(&world);
            let rx = rx.clone();
            let worker = thread::Builder::new()
                .name(format!("terrain-snapshot-{index}"))
                .spawn(move || {
                    while let Ok((request, sink)) = rx.recv() {
                        fulfil(world.as_ref(), &request, &sink);
                    }
                })?;
            workers.push(worker);
        }

        tracing::debug!(threads = workers.len(), "snapshot worker pool started");
        Ok(Self {
            jobs: Some(tx),
            workers,
        })
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }
}

impl SnapshotScheduler for WorkerPoolScheduler {
    fn schedule(&mut self, request: RegionRequest, sink: SnapshotSink) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        if jobs.send((request, sink)).is_err() {
            tracing::warn!("snapshot workers have shut down, request dropped");
        }
    }
}

impl Drop for WorkerPoolScheduler {
    fn drop(&mut self) {
        self.jobs.take();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                tracing::error!("snapshot worker panicked");
            }
        }
    }
}

/// Queues requests for the host to fulfil on its own schedule
#[derive(Debug, Default)]
pub struct DeferredScheduler {
    queue: Vec<Job>,
}

impl DeferredScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Region requests waiting to be fulfilled
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Sections waiting across all queued requests
    pub fn queued_sections(&self) -> usize {
        self.queue
            .iter()
            .map(|(request, _)| request.sections.len())
            .sum()
    }

    /// Hand every queued request over to the caller
    pub fn take(&mut self) -> Vec<(RegionRequest, SnapshotSink)> {
        std::mem::take(&mut self.queue)
    }

    /// Fulfil every queued request from `world`
    pub fn fulfil_all<W: VoxelWorld + ?Sized>(&mut self, world: &W) {
        for (request, sink) in self.take() {
            fulfil(world, &request, &sink);
        }
    }
}

impl SnapshotScheduler for DeferredScheduler {
    fn schedule(&mut self, request: RegionRequest, sink: SnapshotSink) {
        self.queue.push((request, sink));
    }
}
