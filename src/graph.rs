//! Heterogeneous transaction multigraph.
//!
//! Accounts, devices, IP addresses and payment instruments are typed nodes.
//! Every inserted edge is kept (parallel edges included) in a petgraph
//! `DiGraph`; two simple projections are maintained alongside it as edges
//! arrive:
//!
//! - an undirected view with one edge per unordered pair and no self-loops,
//!   used by community detection and the subgraph metrics;
//! - a directed view with one arc per ordered pair, used by link analysis.

use crate::error::InputError;
use crate::records::TransactionRecord;
use petgraph::graph::{DiGraph, EdgeIndex, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Account,
    Device,
    Ip,
    Instrument,
}

impl NodeKind {
    pub const ALL: [NodeKind; 4] = [
        NodeKind::Account,
        NodeKind::Device,
        NodeKind::Ip,
        NodeKind::Instrument,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Account => "account",
            NodeKind::Device => "device",
            NodeKind::Ip => "ip",
            NodeKind::Instrument => "instrument",
        }
    }

    /// Relation linking an account to a shared identifier of this kind.
    pub fn link_relation(self) -> Option<Relation> {
        match self {
            NodeKind::Account => None,
            NodeKind::Device => Some(Relation::DeviceLink),
            NodeKind::Ip => Some(Relation::IpLink),
            NodeKind::Instrument => Some(Relation::InstrumentLink),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseNodeIdError {
    #[error("node id `{0}` has no `kind:` prefix")]
    MissingKind(String),

    #[error("unknown node kind `{0}`")]
    UnknownKind(String),
}

impl FromStr for NodeKind {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "account" => Ok(NodeKind::Account),
            "device" => Ok(NodeKind::Device),
            "ip" => Ok(NodeKind::Ip),
            "instrument" => Ok(NodeKind::Instrument),
            other => Err(ParseNodeIdError::UnknownKind(other.to_string())),
        }
    }
}

/// Node identifier. Renders externally as `"kind:key"`, e.g. `"account:42"`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    pub kind: NodeKind,
    pub key: String,
}

impl NodeId {
    pub fn new(kind: NodeKind, key: impl Into<String>) -> Self {
        Self {
            kind,
            key: key.into(),
        }
    }

    pub fn account(key: impl Into<String>) -> Self {
        Self::new(NodeKind::Account, key)
    }

    pub fn device(key: impl Into<String>) -> Self {
        Self::new(NodeKind::Device, key)
    }

    pub fn ip(key: impl Into<String>) -> Self {
        Self::new(NodeKind::Ip, key)
    }

    pub fn instrument(key: impl Into<String>) -> Self {
        Self::new(NodeKind::Instrument, key)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.key)
    }
}

impl FromStr for NodeId {
    type Err = ParseNodeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, key) = s
            .split_once(':')
            .ok_or_else(|| ParseNodeIdError::MissingKind(s.to_string()))?;
        Ok(NodeId::new(kind.parse()?, key))
    }
}

/// Payload of a transaction edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxnAttrs {
    pub amount: f64,
    pub timestamp: i64,
}

/// Edge relation. Only transactions carry a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Relation {
    Txn(TxnAttrs),
    DeviceLink,
    IpLink,
    InstrumentLink,
}

impl Relation {
    pub fn name(&self) -> &'static str {
        match self {
            Relation::Txn(_) => "txn",
            Relation::DeviceLink => "device_link",
            Relation::IpLink => "ip_link",
            Relation::InstrumentLink => "instrument_link",
        }
    }

    pub fn is_txn(&self) -> bool {
        matches!(self, Relation::Txn(_))
    }
}

/// Transaction activity merged into a node as txn edges arrive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Activity {
    pub sent: u32,
    pub received: u32,
    pub amount_out: f64,
    pub amount_in: f64,
    pub first_seen: Option<i64>,
    pub last_seen: Option<i64>,
}

impl Activity {
    fn touch(&mut self, timestamp: i64) {
        self.first_seen = Some(self.first_seen.map_or(timestamp, |t| t.min(timestamp)));
        self.last_seen = Some(self.last_seen.map_or(timestamp, |t| t.max(timestamp)));
    }
}

#[derive(Debug, Clone)]
pub struct NodeData {
    pub id: NodeId,
    pub activity: Activity,
}

/// Adjacency view requested from [`TransactionGraph::neighbors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Undirected,
}

/// Node counts per kind for a node set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    pub accounts: usize,
    pub devices: usize,
    pub ips: usize,
    pub instruments: usize,
}

impl KindCounts {
    fn add(&mut self, kind: NodeKind) {
        match kind {
            NodeKind::Account => self.accounts += 1,
            NodeKind::Device => self.devices += 1,
            NodeKind::Ip => self.ips += 1,
            NodeKind::Instrument => self.instruments += 1,
        }
    }
}

/// Static snapshot of the transaction network for one run.
#[derive(Debug, Clone, Default)]
pub struct TransactionGraph {
    graph: DiGraph<NodeData, Relation>,
    index: HashMap<NodeId, NodeIndex>,
    undirected: Vec<Vec<NodeIndex>>,
    undirected_edges: usize,
    successors: Vec<Vec<NodeIndex>>,
    predecessors: Vec<Vec<NodeIndex>>,
    directed_edges: usize,
}

/// Insert into a sorted adjacency list, returning whether it was new.
fn insert_sorted(list: &mut Vec<NodeIndex>, node: NodeIndex) -> bool {
    match list.binary_search(&node) {
        Ok(_) => false,
        Err(pos) => {
            list.insert(pos, node);
            true
        }
    }
}

impl TransactionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, or return the existing one. Idempotent.
    pub fn add_node(&mut self, id: NodeId) -> NodeIndex {
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(NodeData {
            id: id.clone(),
            activity: Activity::default(),
        });
        self.index.insert(id, idx);
        self.undirected.push(Vec::new());
        self.successors.push(Vec::new());
        self.predecessors.push(Vec::new());
        idx
    }

    /// Append an edge, creating missing endpoints. Parallel edges are kept.
    pub fn add_edge(&mut self, source: NodeId, target: NodeId, relation: Relation) -> EdgeIndex {
        let u = self.add_node(source);
        let v = self.add_node(target);
        self.add_edge_between(u, v, relation)
    }

    fn add_edge_between(&mut self, u: NodeIndex, v: NodeIndex, relation: Relation) -> EdgeIndex {
        if let Relation::Txn(txn) = relation {
            let sender = &mut self.graph[u].activity;
            sender.sent += 1;
            sender.amount_out += txn.amount;
            sender.touch(txn.timestamp);
            let receiver = &mut self.graph[v].activity;
            receiver.received += 1;
            receiver.amount_in += txn.amount;
            receiver.touch(txn.timestamp);
        }

        if insert_sorted(&mut self.successors[u.index()], v) {
            insert_sorted(&mut self.predecessors[v.index()], u);
            self.directed_edges += 1;
        }
        if u != v && insert_sorted(&mut self.undirected[u.index()], v) {
            insert_sorted(&mut self.undirected[v.index()], u);
            self.undirected_edges += 1;
        }

        self.graph.add_edge(u, v, relation)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of stored edges, parallel edges included.
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Edges of the undirected simple projection.
    pub fn undirected_edge_count(&self) -> usize {
        self.undirected_edges
    }

    /// Arcs of the directed simple projection.
    pub fn directed_edge_count(&self) -> usize {
        self.directed_edges
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Node indices in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.node_indices()
    }

    pub fn node_index(&self, id: &NodeId) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    pub fn node(&self, idx: NodeIndex) -> &NodeData {
        &self.graph[idx]
    }

    pub fn id(&self, idx: NodeIndex) -> &NodeId {
        &self.graph[idx].id
    }

    pub fn kind(&self, idx: NodeIndex) -> NodeKind {
        self.graph[idx].id.kind
    }

    /// Distinct adjacent nodes in ascending index order.
    pub fn neighbors(&self, idx: NodeIndex, direction: Direction) -> &[NodeIndex] {
        match direction {
            Direction::Outgoing => &self.successors[idx.index()],
            Direction::Incoming => &self.predecessors[idx.index()],
            Direction::Undirected => &self.undirected[idx.index()],
        }
    }

    /// Degree in the undirected simple projection.
    pub fn degree(&self, idx: NodeIndex) -> usize {
        self.undirected[idx.index()].len()
    }

    /// Every stored edge in insertion order.
    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, &Relation)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source(), e.target(), e.weight()))
    }

    /// `(source, target, relation)` triples for external graph sinks.
    pub fn edge_triples(&self) -> impl Iterator<Item = (&NodeId, &NodeId, &'static str)> + '_ {
        self.edges()
            .map(move |(u, v, relation)| (self.id(u), self.id(v), relation.name()))
    }

    pub fn kind_counts(&self, members: &[NodeIndex]) -> KindCounts {
        let mut counts = KindCounts::default();
        for &idx in members {
            counts.add(self.kind(idx));
        }
        counts
    }

    /// View restricted to `members` and the edges with both endpoints inside.
    pub fn induced_subgraph(&self, members: &[NodeIndex]) -> Subgraph<'_> {
        let mut members = members.to_vec();
        members.sort_unstable();
        members.dedup();
        let local = members
            .iter()
            .enumerate()
            .map(|(pos, &idx)| (idx, pos))
            .collect();
        Subgraph {
            graph: self,
            members,
            local,
        }
    }
}

/// Read-only induced subgraph of a [`TransactionGraph`].
#[derive(Debug, Clone)]
pub struct Subgraph<'g> {
    graph: &'g TransactionGraph,
    members: Vec<NodeIndex>,
    local: HashMap<NodeIndex, usize>,
}

impl<'g> Subgraph<'g> {
    pub fn members(&self) -> &[NodeIndex] {
        &self.members
    }

    pub fn node_count(&self) -> usize {
        self.members.len()
    }

    pub fn contains(&self, idx: NodeIndex) -> bool {
        self.local.contains_key(&idx)
    }

    /// Stored edges with both endpoints inside, parallel edges included.
    pub fn directed_edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, &'g Relation)> + '_ {
        let graph: &'g DiGraph<NodeData, Relation> = &self.graph.graph;
        self.members.iter().flat_map(move |&u| {
            graph
                .edges_directed(u, petgraph::Direction::Outgoing)
                .filter(move |e| self.contains(e.target()))
                .map(|e| (e.source(), e.target(), e.weight()))
        })
    }

    pub fn edge_count(&self) -> usize {
        self.directed_edges().count()
    }

    /// Stored edges of the full graph with exactly one endpoint inside.
    pub fn cut_edges(&self) -> usize {
        let graph = &self.graph.graph;
        self.members
            .iter()
            .map(|&u| {
                let out = graph
                    .edges_directed(u, petgraph::Direction::Outgoing)
                    .filter(|e| !self.contains(e.target()))
                    .count();
                let inc = graph
                    .edges_directed(u, petgraph::Direction::Incoming)
                    .filter(|e| !self.contains(e.source()))
                    .count();
                out + inc
            })
            .sum()
    }

    /// Undirected simple projection with local node numbering.
    pub fn simple(&self) -> SimpleGraph {
        let adjacency: Vec<Vec<usize>> = self
            .members
            .iter()
            .map(|&u| {
                self.graph
                    .neighbors(u, Direction::Undirected)
                    .iter()
                    .filter_map(|v| self.local.get(v).copied())
                    .collect()
            })
            .collect();
        let edge_count = adjacency.iter().map(Vec::len).sum::<usize>() / 2;
        SimpleGraph {
            adjacency,
            edge_count,
        }
    }
}

/// Undirected simple graph over local indices `0..n`. Adjacency lists are sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimpleGraph {
    adjacency: Vec<Vec<usize>>,
    edge_count: usize,
}

impl SimpleGraph {
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    pub fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    pub fn neighbors(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }
}

/// Incremental builder that turns transaction records into a graph.
#[derive(Debug)]
pub struct GraphBuilder {
    graph: TransactionGraph,
    include_id_links: bool,
    rows: usize,
}

impl GraphBuilder {
    pub fn new(include_id_links: bool) -> Self {
        Self {
            graph: TransactionGraph::new(),
            include_id_links,
            rows: 0,
        }
    }

    /// Add one record: a sender→receiver txn edge plus, when enabled, two
    /// link arcs (sender→identifier, receiver→identifier) per present identifier.
    pub fn push(&mut self, record: &TransactionRecord) -> Result<(), InputError> {
        self.rows += 1;
        let row = self.rows;

        let sender = required_key(row, "sender", record.sender.as_deref())?;
        let receiver = required_key(row, "receiver", record.receiver.as_deref())?;
        let amount = record.amount.ok_or(InputError::MissingField {
            row,
            field: "amount",
        })?;
        if !amount.is_finite() {
            return Err(InputError::InvalidAmount { row, value: amount });
        }

        let a = self.graph.add_node(NodeId::account(sender));
        let b = self.graph.add_node(NodeId::account(receiver));
        let txn = TxnAttrs {
            amount,
            timestamp: record.timestamp.unwrap_or(0),
        };
        self.graph.add_edge_between(a, b, Relation::Txn(txn));

        if !self.include_id_links {
            return Ok(());
        }
        let identifiers = [
            (NodeKind::Device, record.device_id.as_deref()),
            (NodeKind::Ip, record.ip.as_deref()),
            (NodeKind::Instrument, record.instrument_id.as_deref()),
        ];
        for (kind, key) in identifiers {
            let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
                continue;
            };
            let Some(relation) = kind.link_relation() else {
                continue;
            };
            let shared = self.graph.add_node(NodeId::new(kind, key));
            self.graph.add_edge_between(a, shared, relation);
            self.graph.add_edge_between(b, shared, relation);
        }
        Ok(())
    }

    pub fn finish(self) -> TransactionGraph {
        debug!(
            rows = self.rows,
            nodes = self.graph.node_count(),
            edges = self.graph.edge_count(),
            "graph built"
        );
        self.graph
    }
}

fn required_key<'r>(
    row: usize,
    field: &'static str,
    value: Option<&'r str>,
) -> Result<&'r str, InputError> {
    let value = value.ok_or(InputError::MissingField { row, field })?.trim();
    if value.is_empty() {
        return Err(InputError::EmptyIdentifier { row, field });
    }
    Ok(value)
}

/// Build the heterogeneous graph from records, failing on the first bad record.
pub fn build_graph(
    records: &[TransactionRecord],
    include_id_links: bool,
) -> Result<TransactionGraph, InputError> {
    let mut builder = GraphBuilder::new(include_id_links);
    for record in records {
        builder.push(record)?;
    }
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sender: &str, receiver: &str, amount: f64) -> TransactionRecord {
        TransactionRecord {
            timestamp: Some(100),
            sender: Some(sender.to_string()),
            receiver: Some(receiver.to_string()),
            amount: Some(amount),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_node_is_idempotent() {
        let mut graph = TransactionGraph::new();
        let a = graph.add_node(NodeId::account("42"));
        let b = graph.add_node(NodeId::account("42"));
        assert_eq!(a, b);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.kind(a), NodeKind::Account);
        assert_eq!(graph.id(a).to_string(), "account:42");
    }

    #[test]
    fn test_parallel_edges_are_kept() {
        let mut graph = TransactionGraph::new();
        let txn = Relation::Txn(TxnAttrs {
            amount: 10.0,
            timestamp: 1,
        });
        graph.add_edge(NodeId::account("a"), NodeId::account("b"), txn);
        graph.add_edge(NodeId::account("a"), NodeId::account("b"), txn);
        graph.add_edge(NodeId::account("b"), NodeId::account("a"), txn);

        assert_eq!(graph.edge_count(), 3);
        assert_eq!(graph.directed_edge_count(), 2);
        assert_eq!(graph.undirected_edge_count(), 1);
    }

    #[test]
    fn test_neighbors_by_direction() {
        let mut graph = TransactionGraph::new();
        graph.add_edge(NodeId::account("a"), NodeId::device("d1"), Relation::DeviceLink);
        graph.add_edge(NodeId::account("b"), NodeId::device("d1"), Relation::DeviceLink);

        let d1 = graph.node_index(&NodeId::device("d1")).unwrap();
        let a = graph.node_index(&NodeId::account("a")).unwrap();
        assert!(graph.neighbors(d1, Direction::Outgoing).is_empty());
        assert_eq!(graph.neighbors(d1, Direction::Incoming).len(), 2);
        assert_eq!(graph.neighbors(d1, Direction::Undirected).len(), 2);
        assert_eq!(graph.neighbors(a, Direction::Outgoing), &[d1]);
    }

    #[test]
    fn test_self_loop_is_not_in_undirected_view() {
        let mut graph = TransactionGraph::new();
        let txn = Relation::Txn(TxnAttrs {
            amount: 1.0,
            timestamp: 0,
        });
        graph.add_edge(NodeId::account("a"), NodeId::account("a"), txn);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.directed_edge_count(), 1);
        assert_eq!(graph.undirected_edge_count(), 0);
    }

    #[test]
    fn test_build_graph_with_id_links() {
        let mut rec = record("1", "2", 50.0);
        rec.device_id = Some("d9".to_string());
        rec.ip = Some("10.0.0.1".to_string());
        let graph = build_graph(&[rec.clone()], true).unwrap();

        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 5);
        let relations: Vec<_> = graph.edge_triples().map(|(_, _, r)| r).collect();
        assert_eq!(
            relations,
            vec!["txn", "device_link", "device_link", "ip_link", "ip_link"]
        );

        let without = build_graph(&[rec], false).unwrap();
        assert_eq!(without.node_count(), 2);
        assert_eq!(without.edge_count(), 1);
    }

    #[test]
    fn test_build_graph_merges_activity() {
        let graph = build_graph(&[record("1", "2", 50.0), record("1", "3", 25.0)], true).unwrap();
        let sender = graph.node_index(&NodeId::account("1")).unwrap();
        let activity = &graph.node(sender).activity;
        assert_eq!(activity.sent, 2);
        assert_eq!(activity.amount_out, 75.0);
        assert_eq!(activity.first_seen, Some(100));
    }

    #[test]
    fn test_build_graph_rejects_missing_fields() {
        let mut rec = record("1", "2", 5.0);
        rec.receiver = None;
        let err = build_graph(&[record("1", "2", 1.0), rec], true).unwrap_err();
        assert_eq!(
            err,
            InputError::MissingField {
                row: 2,
                field: "receiver"
            }
        );

        let mut rec = record("1", "2", 5.0);
        rec.amount = None;
        assert!(matches!(
            build_graph(&[rec], true),
            Err(InputError::MissingField { field: "amount", .. })
        ));

        let err = build_graph(&[record(" ", "2", 1.0)], true).unwrap_err();
        assert!(matches!(err, InputError::EmptyIdentifier { field: "sender", .. }));

        let err = build_graph(&[record("1", "2", f64::NAN)], true).unwrap_err();
        assert!(matches!(err, InputError::InvalidAmount { row: 1, .. }));
    }

    #[test]
    fn test_induced_subgraph_over_all_nodes_keeps_every_edge() {
        let mut rec = record("1", "2", 50.0);
        rec.instrument_id = Some("card7".to_string());
        let records = vec![rec.clone(), rec, record("2", "3", 1.0), record("3", "3", 2.0)];
        let graph = build_graph(&records, true).unwrap();

        let all: Vec<_> = graph.nodes().collect();
        let sub = graph.induced_subgraph(&all);
        assert_eq!(sub.edge_count(), graph.edge_count());
        assert_eq!(sub.cut_edges(), 0);
        assert_eq!(sub.simple().edge_count(), graph.undirected_edge_count());
    }

    #[test]
    fn test_induced_subgraph_counts_cut_edges() {
        let records = vec![
            record("1", "2", 1.0),
            record("2", "3", 1.0),
            record("3", "1", 1.0),
            record("3", "4", 1.0),
            record("3", "4", 1.0),
        ];
        let graph = build_graph(&records, false).unwrap();
        let members: Vec<_> = ["1", "2", "3"]
            .iter()
            .map(|k| graph.node_index(&NodeId::account(*k)).unwrap())
            .collect();
        let sub = graph.induced_subgraph(&members);
        assert_eq!(sub.edge_count(), 3);
        assert_eq!(sub.cut_edges(), 2);
        assert_eq!(sub.simple().edge_count(), 3);
    }

    #[test]
    fn test_node_id_round_trips_through_text() {
        let id: NodeId = "ip:10.0.0.1".parse().unwrap();
        assert_eq!(id, NodeId::ip("10.0.0.1"));
        assert_eq!(id.to_string(), "ip:10.0.0.1");
        assert!(matches!(
            "wallet:1".parse::<NodeId>(),
            Err(ParseNodeIdError::UnknownKind(_))
        ));
        assert!(matches!(
            "nokind".parse::<NodeId>(),
            Err(ParseNodeIdError::MissingKind(_))
        ));
    }
}
