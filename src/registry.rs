// MIT License
// Entity catalog and the per-kind diff

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::devices::{
    DeviceIdentity, EntityKind, Kind, Observed, Output, Partition, Privileges, Zone,
};
use crate::error::Result;
use crate::event::NormalizedEvent;
use crate::gateway::PanelGateway;
use crate::protocol::{NamedIndex, PrivilegeSet, StatusSample};
use crate::transport::Transport;

/// A partition, zone or output known to the bridge.
#[derive(Debug, Clone)]
pub struct Entity<K: EntityKind> {
    pub index: u32,
    pub name: String,
    /// Partitions a zone belongs to. Empty for partitions and outputs, and
    /// for zones when the panel configuration could not be read.
    pub linked_partitions: BTreeSet<u32>,
    last_known: Option<Observed<K::State>>,
}

impl<K: EntityKind> Entity<K> {
    fn new(index: u32, name: String) -> Self {
        Self {
            index,
            name,
            linked_partitions: BTreeSet::new(),
            last_known: None,
        }
    }

    pub fn unique_id(&self) -> String {
        K::KIND.unique_id(self.index)
    }

    /// Last observed state, or `None` before the first poll or while the
    /// panel reports a code outside the table.
    pub fn state(&self) -> Option<K::State> {
        self.last_known.and_then(|o| o.known())
    }

    pub fn last_observed(&self) -> Option<Observed<K::State>> {
        self.last_known
    }
}

/// Outcome of applying one status list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KindDiff {
    /// One event per entity whose state changed.
    pub events: Vec<NormalizedEvent>,
    /// Indexes reported by the panel that are not in the catalog.
    pub unknown_indexes: Vec<u32>,
    /// `(index, raw code)` for newly seen codes outside the table.
    pub unhandled: Vec<(u32, u16)>,
    /// `(index, raw code)` behind each entry of `events`, in the same order.
    /// Handed back to [`EntitySet::commit`] once the event is delivered.
    pub pending: Vec<(u32, u16)>,
}

/// All entities of one kind, keyed by panel index.
#[derive(Debug, Clone)]
pub struct EntitySet<K: EntityKind> {
    entities: BTreeMap<u32, Entity<K>>,
}

impl<K: EntityKind> Default for EntitySet<K> {
    fn default() -> Self {
        Self {
            entities: BTreeMap::new(),
        }
    }
}

impl<K: EntityKind> EntitySet<K> {
    pub fn from_names(names: Vec<NamedIndex>) -> Self {
        let mut entities = BTreeMap::new();
        for NamedIndex { index, name } in names {
            if entities.insert(index, Entity::new(index, name)).is_some() {
                debug!("Duplicate {} index {index}, keeping the last name", K::KIND);
            }
        }
        Self { entities }
    }

    pub fn get(&self, index: u32) -> Option<&Entity<K>> {
        self.entities.get(&index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entity<K>> {
        self.entities.values()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Diff a status list against the last known states.
    ///
    /// Known states are not recorded here: each event stays pending until
    /// [`commit`](Self::commit) is called for it, so an event that never
    /// reaches the sink is detected again on the next pass. Unmapped codes
    /// have no event and are recorded immediately. Samples for unknown
    /// indexes are skipped and never create an entity.
    pub fn apply(&mut self, samples: &[StatusSample]) -> KindDiff {
        let mut diff = KindDiff::default();
        for sample in samples {
            let Some(entity) = self.entities.get_mut(&sample.index) else {
                diff.unknown_indexes.push(sample.index);
                continue;
            };
            let observed = observe::<K>(sample.raw_state);
            if entity.last_known == Some(observed) {
                continue;
            }
            match observed {
                Observed::Known(state) => {
                    diff.events.push(NormalizedEvent {
                        kind: K::KIND,
                        index: sample.index,
                        payload: K::payload(state),
                    });
                    diff.pending.push((sample.index, sample.raw_state));
                }
                Observed::Unmapped(code) => {
                    entity.last_known = Some(observed);
                    diff.unhandled.push((sample.index, code));
                }
            }
        }
        diff
    }

    /// Record `raw_state` as the last known state of `index`.
    pub fn commit(&mut self, index: u32, raw_state: u16) {
        if let Some(entity) = self.entities.get_mut(&index) {
            entity.last_known = Some(observe::<K>(raw_state));
        }
    }
}

fn observe<K: EntityKind>(raw_state: u16) -> Observed<K::State> {
    match K::decode(raw_state) {
        Some(state) => Observed::Known(state),
        None => Observed::Unmapped(raw_state),
    }
}

/// The panel and everything it exposes, built once at startup.
#[derive(Debug, Clone)]
pub struct EntityRegistry {
    pub device: DeviceIdentity,
    /// `None` when `priv.xml` could not be read.
    pub privileges: Option<PrivilegeSet>,
    pub partitions: EntitySet<Partition>,
    pub zones: EntitySet<Zone>,
    pub outputs: EntitySet<Output>,
}

impl EntityRegistry {
    /// Fetch identity and names from the panel.
    ///
    /// Identity and name lists are required. Privileges and zone partition
    /// links are best-effort.
    pub async fn populate<T: Transport>(gateway: &PanelGateway<T>) -> Result<Self> {
        let device = gateway.system_information().await?;
        info!(
            "Panel: {} (software {})",
            device.name(),
            device.software_version
        );

        let privileges = match gateway.privileges().await {
            Ok(privileges) => {
                check_privileges(privileges.flags);
                Some(privileges)
            }
            Err(e) => {
                warn!("Could not read user privileges: {e}");
                None
            }
        };

        let partitions = EntitySet::<Partition>::from_names(gateway.partition_names().await?);
        let mut zones = EntitySet::<Zone>::from_names(gateway.zone_names().await?);
        let outputs = EntitySet::<Output>::from_names(gateway.output_names().await?);

        match gateway.config_zones().await {
            Ok(config) => {
                for zone in config {
                    if let Some(entity) = zones.entities.get_mut(&zone.index) {
                        entity.linked_partitions = zone.partitions.into_iter().collect();
                    }
                }
            }
            Err(e) => warn!("Could not read panel configuration, zones have no partition links: {e}"),
        }

        info!(
            "Discovered {} partitions, {} zones, {} outputs",
            partitions.len(),
            zones.len(),
            outputs.len()
        );

        Ok(Self {
            device,
            privileges,
            partitions,
            zones,
            outputs,
        })
    }

    /// `(kind, index, name)` of every entity that accepts commands.
    pub fn controllable(&self) -> Vec<(Kind, u32, String)> {
        self.partitions
            .iter()
            .map(|e| (Kind::Partition, e.index, e.name.clone()))
            .chain(
                self.outputs
                    .iter()
                    .map(|e| (Kind::Output, e.index, e.name.clone())),
            )
            .collect()
    }
}

fn check_privileges(flags: Privileges) {
    if flags.can_control_partitions() {
        return;
    }
    for (flag, what) in [
        (Privileges::ARM_AWAY, "arm away"),
        (Privileges::DISARM_AWAY, "disarm"),
    ] {
        if !flags.contains(flag) {
            warn!("Panel user lacks the {what} privilege, partition commands may be rejected");
        }
    }
}
