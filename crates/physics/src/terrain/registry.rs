//! Section registry
//!
//! Single source of truth for which sections exist and in which state. Next
//! to the section map it keeps explicit indices so a step never rescans the
//! whole registry:
//!
//! - `dirty`: sections in `Snapshot` state awaiting synthesis
//! - `unrequested`: `Pending` sections with no request in flight
//! - `by_collider`: owner of every collider the registry holds

use super::layer::LayerKey;
use super::section::{Layers, Section, SectionCoord, SectionState, Ticket};
use super::snapshot::VoxelSnapshot;
use crate::error::SnapshotError;
use rapier3d::prelude::ColliderHandle;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What happened to a snapshot delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Stored; the section awaits synthesis
    Stored,
    /// The fetch failed; the section will be requested again
    Failed,
    /// The section is gone or no longer waits on this ticket
    Stale,
}

/// Number of sections in each state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StateCounts {
    pub pending: usize,
    pub in_flight: usize,
    pub snapshot: usize,
    pub built: usize,
    pub retiring: usize,
}

#[derive(Debug, Default)]
pub struct SectionRegistry {
    sections: HashMap<SectionCoord, Section>,
    dirty: HashSet<SectionCoord>,
    unrequested: HashSet<SectionCoord>,
    by_collider: HashMap<ColliderHandle, (SectionCoord, LayerKey)>,
    next_ticket: u64,
}

impl SectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coord: SectionCoord) -> Option<&Section> {
        self.sections.get(&coord)
    }

    pub fn get_mut(&mut self, coord: SectionCoord) -> Option<&mut Section> {
        self.sections.get_mut(&coord)
    }

    pub fn contains(&self, coord: SectionCoord) -> bool {
        self.sections.contains_key(&coord)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub fn coords(&self) -> impl Iterator<Item = SectionCoord> + '_ {
        self.sections.keys().copied()
    }

    /// Add a section that still needs its voxel data
    pub fn insert_pending(&mut self, coord: SectionCoord) {
        self.sections.insert(coord, Section::pending());
        self.unrequested.insert(coord);
    }

    /// Add a section that permanently holds no collision
    pub fn insert_empty(&mut self, coord: SectionCoord) {
        self.sections.insert(coord, Section::empty());
    }

    /// `Pending` sections without a request in flight
    pub fn unrequested(&self) -> impl Iterator<Item = SectionCoord> + '_ {
        self.unrequested.iter().copied()
    }

    /// Mark a pending section as requested and return the ticket to send
    ///
    /// Returns `None` if the section is not pending or already has a request
    /// in flight.
    pub fn issue_ticket(&mut self, coord: SectionCoord) -> Option<Ticket> {
        let section = self.sections.get_mut(&coord)?;
        let request = match &mut section.state {
            SectionState::Pending { request } if request.is_none() => request,
            _ => return None,
        };

        self.next_ticket += 1;
        let ticket = Ticket(self.next_ticket);
        *request = Some(ticket);
        self.unrequested.remove(&coord);
        Some(ticket)
    }

    /// Apply the result of a snapshot request
    pub fn accept(
        &mut self,
        coord: SectionCoord,
        ticket: Ticket,
        result: Result<VoxelSnapshot, SnapshotError>,
    ) -> Delivery {
        let Some(section) = self.sections.get_mut(&coord) else {
            return Delivery::Stale;
        };
        if !matches!(section.state, SectionState::Pending { request: Some(t) } if t == ticket) {
            return Delivery::Stale;
        }

        match result {
            Ok(snapshot) => {
                section.state = SectionState::Snapshot(Arc::new(snapshot));
                self.dirty.insert(coord);
                Delivery::Stored
            }
            Err(_) => {
                section.state = SectionState::Pending { request: None };
                self.unrequested.insert(coord);
                Delivery::Failed
            }
        }
    }

    /// Drain the sections awaiting synthesis, in coordinate order
    pub fn take_dirty(&mut self) -> Vec<(SectionCoord, Arc<VoxelSnapshot>)> {
        let mut ready: Vec<_> = self
            .dirty
            .drain()
            .filter_map(|coord| match &self.sections.get(&coord)?.state {
                SectionState::Snapshot(snapshot) => Some((coord, Arc::clone(snapshot))),
                _ => None,
            })
            .collect();
        ready.sort_by_key(|(coord, _)| *coord);
        ready
    }

    /// Mark a section built with `layers`
    ///
    /// Returns the layers of the build it replaces, if any. The caller owns
    /// them and must release them.
    pub fn install(&mut self, coord: SectionCoord, layers: Layers) -> Option<Layers> {
        let section = self.sections.get_mut(&coord)?;
        self.dirty.remove(&coord);
        self.unrequested.remove(&coord);

        index_layers(&mut self.by_collider, coord, &layers);
        section.state = SectionState::Built(layers);

        let superseded = section.superseded.take()?;
        unindex_layers(&mut self.by_collider, &superseded);
        Some(superseded)
    }

    /// Send a section back to `Pending` because its voxels changed
    ///
    /// Built colliders stay live as the superseded build until the rebuild is
    /// installed. A request in flight is abandoned so its result is discarded.
    /// Returns whether the section exists.
    pub fn invalidate(&mut self, coord: SectionCoord) -> bool {
        let Some(section) = self.sections.get_mut(&coord) else {
            return false;
        };

        let previous = std::mem::replace(
            &mut section.state,
            SectionState::Pending { request: None },
        );
        if let SectionState::Built(layers) = previous {
            debug_assert!(section.superseded.is_none());
            if !layers.is_empty() {
                section.superseded = Some(layers);
            }
        }

        self.dirty.remove(&coord);
        self.unrequested.insert(coord);
        true
    }

    /// Remove a section from the registry and every index
    ///
    /// The returned section still owns its colliders and shape references.
    pub fn remove(&mut self, coord: SectionCoord) -> Option<Section> {
        let section = self.sections.remove(&coord)?;
        self.dirty.remove(&coord);
        self.unrequested.remove(&coord);

        if let SectionState::Built(layers) = &section.state {
            unindex_layers(&mut self.by_collider, layers);
        }
        if let Some(layers) = &section.superseded {
            unindex_layers(&mut self.by_collider, layers);
        }
        Some(section)
    }

    /// Remove every section, in coordinate order
    pub fn drain(&mut self) -> Vec<(SectionCoord, Section)> {
        self.dirty.clear();
        self.unrequested.clear();
        self.by_collider.clear();

        let mut sections: Vec<_> = self.sections.drain().collect();
        sections.sort_by_key(|(coord, _)| *coord);
        sections
    }

    /// Section and layer a collider belongs to
    pub fn owner_of(&self, collider: ColliderHandle) -> Option<(SectionCoord, LayerKey)> {
        self.by_collider.get(&collider).cloned()
    }

    /// Number of colliders the registry currently holds
    pub fn collider_count(&self) -> usize {
        self.by_collider.len()
    }

    pub fn state_counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for section in self.sections.values() {
            match section.state {
                SectionState::Pending { request: None } => counts.pending += 1,
                SectionState::Pending { request: Some(_) } => counts.in_flight += 1,
                SectionState::Snapshot(_) => counts.snapshot += 1,
                SectionState::Built(_) => counts.built += 1,
            }
            if section.retire_at.is_some() {
                counts.retiring += 1;
            }
        }
        counts
    }
}

fn index_layers(
    index: &mut HashMap<ColliderHandle, (SectionCoord, LayerKey)>,
    coord: SectionCoord,
    layers: &Layers,
) {
    for (key, group) in layers {
        for &handle in &group.colliders {
            index.insert(handle, (coord, key.clone()));
        }
    }
}

fn unindex_layers(index: &mut HashMap<ColliderHandle, (SectionCoord, LayerKey)>, layers: &Layers) {
    for group in layers.values() {
        for handle in &group.colliders {
            index.remove(handle);
        }
    }
}
