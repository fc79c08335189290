//! Contact graphs and their time-partitioned snapshots.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use super::generator::RouteGenerator;
use super::route::Route;
use crate::net::{Contact, NodeId};

/// Directed multigraph whose edges are contact lists sorted by start time.
#[derive(Debug, Clone, Default)]
pub struct ContactGraph {
    vertices: BTreeSet<NodeId>,
    adjacency: BTreeMap<NodeId, Vec<(NodeId, Vec<Contact>)>>,
}

impl ContactGraph {
    pub fn from_contacts<'a>(contacts: impl IntoIterator<Item = &'a Contact>) -> Self {
        let mut edges: BTreeMap<(NodeId, NodeId), Vec<Contact>> = BTreeMap::new();
        let mut vertices = BTreeSet::new();
        for c in contacts {
            vertices.insert(c.tx_node);
            vertices.insert(c.rx_node);
            edges.entry((c.tx_node, c.rx_node)).or_default().push(*c);
        }
        let mut adjacency: BTreeMap<NodeId, Vec<(NodeId, Vec<Contact>)>> = BTreeMap::new();
        for ((tx, rx), mut list) in edges {
            list.sort_by(|a, b| a.start_time.total_cmp(&b.start_time).then_with(|| a.cmp(b)));
            adjacency.entry(tx).or_default().push((rx, list));
        }
        Self {
            vertices,
            adjacency,
        }
    }

    pub fn vertices(&self) -> &BTreeSet<NodeId> {
        &self.vertices
    }

    /// Outgoing edges of `node` as (neighbor, contacts sorted by start).
    pub fn neighbors(&self, node: NodeId) -> &[(NodeId, Vec<Contact>)] {
        self.adjacency.get(&node).map_or(&[], Vec::as_slice)
    }

    pub fn contact_count(&self) -> usize {
        self.adjacency
            .values()
            .flat_map(|edges| edges.iter().map(|(_, list)| list.len()))
            .sum()
    }
}

/// Ordered map from validity start time to value. A lookup for time `t`
/// returns the entry with the largest key `<= t`, or the first entry when `t`
/// precedes every key.
#[derive(Debug)]
pub struct StartTimeBasedDict<T> {
    entries: Vec<(f64, T)>,
}

impl<T> Default for StartTimeBasedDict<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<T> StartTimeBasedDict<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert keeping keys sorted; an equal key is replaced.
    pub fn insert(&mut self, start_time: f64, value: T) {
        match self
            .entries
            .binary_search_by(|(k, _)| k.total_cmp(&start_time))
        {
            Ok(idx) => self.entries[idx].1 = value,
            Err(idx) => self.entries.insert(idx, (start_time, value)),
        }
    }

    /// `None` before the first key.
    fn index_for(&self, time: f64) -> Option<usize> {
        self.entries
            .partition_point(|(k, _)| *k <= time)
            .checked_sub(1)
    }

    pub fn get_entry_for(&self, time: f64) -> Option<&T> {
        self.index_for(time).map(|i| &self.entries[i].1)
    }

    pub fn get_entry_for_mut(&mut self, time: f64) -> Option<&mut T> {
        let i = self.index_for(time)?;
        Some(&mut self.entries[i].1)
    }

    /// Like [`get_entry_for_mut`](Self::get_entry_for_mut) but first discards
    /// every entry that is superseded at `time`.
    pub fn get_entry_and_drop_predecessors(&mut self, time: f64) -> Option<&mut T> {
        let i = self.index_for(time)?;
        self.entries.drain(..i);
        self.entries.first_mut().map(|(_, v)| v)
    }

    /// Entry whose key is exactly `start_time`.
    pub fn get_exact(&self, start_time: f64) -> Option<&T> {
        self.entries
            .iter()
            .find(|(k, _)| *k == start_time)
            .map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(k, _)| *k)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One contact graph snapshot plus the route caches built on it.
///
/// Valid from `start_time` until the start time of the next snapshot. Caches
/// are owned by the snapshot, so switching snapshots starts from empty ones.
pub struct SabrGraphData {
    pub start_time: f64,
    pub contact_plan: Vec<Contact>,
    /// Contacts from the owning node to each neighbor, sorted by start.
    pub neighbor_contact_lists: BTreeMap<NodeId, Vec<Contact>>,
    pub graph: Arc<ContactGraph>,
    pub(crate) route_lists: HashMap<NodeId, Vec<Route>>,
    pub(crate) route_gens: HashMap<NodeId, Box<dyn RouteGenerator>>,
}

impl SabrGraphData {
    pub fn new(start_time: f64, contact_plan: Vec<Contact>, own_eid: NodeId) -> Self {
        let graph = Arc::new(ContactGraph::from_contacts(&contact_plan));
        let neighbor_contact_lists = graph
            .neighbors(own_eid)
            .iter()
            .map(|(rx, list)| (*rx, list.clone()))
            .collect();
        Self {
            start_time,
            contact_plan,
            neighbor_contact_lists,
            graph,
            route_lists: HashMap::new(),
            route_gens: HashMap::new(),
        }
    }

    /// Routes discovered so far towards `dest`.
    pub fn cached_routes(&self, dest: NodeId) -> &[Route] {
        self.route_lists.get(&dest).map_or(&[], Vec::as_slice)
    }
}

impl std::fmt::Debug for SabrGraphData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SabrGraphData")
            .field("start_time", &self.start_time)
            .field("contacts", &self.contact_plan.len())
            .field("route_lists", &self.route_lists.len())
            .finish()
    }
}
