// The unified logic graph: a name-deduplicated vertex registry plus directed,
// requirement-gated edges. Vertices are typed structs addressed by index;
// the human-readable name is the only identity key.

use anyhow::{bail, Result};
use comborando_game::Title;
use comborando_logic::{ItemCondition, ItemId};
use hashbrown::HashMap;
use strum_macros::{Display, EnumString};

pub type VertexId = usize; // Index into LogicGraph.vertices

/// Semantic vertex kind. One enum covers both the primary type and the
/// subtype slot (e.g. an Item vertex with a Chozo subtype).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum VertexType {
    Meta,
    Item,
    Boss,
    Entrance,
    Elevator,
    Start,
    Chozo,
    Hidden,
    Visible,
    Standing,
}

#[derive(Clone, Debug)]
pub struct Vertex {
    pub name: String,
    pub vertex_type: VertexType,
    pub subtype: Option<VertexType>,
    /// Item or flag granted by reaching this vertex, if any.
    pub item: Option<ItemId>,
    /// Named weighted pools this vertex's item participates in when
    /// randomized.
    pub item_set: Vec<String>,
    /// Persisted memory addresses for later ROM writing; opaque here.
    pub addresses: Option<Vec<u64>>,
    pub title: Option<Title>,
}

#[derive(Clone, Debug)]
pub struct Edge {
    pub from: VertexId,
    pub to: VertexId,
    pub condition: ItemCondition,
}

#[derive(Default, Clone, Debug)]
pub struct LogicGraph {
    vertices: Vec<Vertex>,
    index_by_name: HashMap<String, VertexId>,
    edges_out: Vec<Vec<Edge>>,
}

impl LogicGraph {
    pub fn new() -> Self {
        LogicGraph::default()
    }

    /// Adds a vertex, or merges with the existing vertex of the same name.
    /// Name uniqueness is the only identity key: constructing the same name
    /// twice never yields two registry entries.
    pub fn add_vertex(&mut self, vertex: Vertex) -> VertexId {
        if let Some(&id) = self.index_by_name.get(&vertex.name) {
            return id;
        }
        let id = self.vertices.len();
        self.index_by_name.insert(vertex.name.clone(), id);
        self.vertices.push(vertex);
        self.edges_out.push(Vec::new());
        id
    }

    pub fn vertex_id(&self, name: &str) -> Option<VertexId> {
        self.index_by_name.get(name).copied()
    }

    /// Resolves a vertex name that must exist; a miss is a fatal
    /// configuration error (a connector or edge references a vertex the
    /// graph never built).
    pub fn expect_vertex_id(&self, name: &str) -> Result<VertexId> {
        match self.vertex_id(name) {
            Some(id) => Ok(id),
            None => bail!("name connection mismatch: no vertex named '{name}'"),
        }
    }

    pub fn vertex(&self, id: VertexId) -> &Vertex {
        &self.vertices[id]
    }

    pub fn vertex_mut(&mut self, id: VertexId) -> &mut Vertex {
        &mut self.vertices[id]
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Adds a directed edge. An edge identical to one already present for
    /// the same (from, to) pair is dropped rather than duplicated.
    pub fn add_directed(&mut self, from: VertexId, to: VertexId, condition: ItemCondition) {
        let existing = &self.edges_out[from];
        if existing
            .iter()
            .any(|e| e.to == to && e.condition == condition)
        {
            return;
        }
        self.edges_out[from].push(Edge {
            from,
            to,
            condition,
        });
    }

    pub fn edges_from(&self, from: VertexId) -> &[Edge] {
        &self.edges_out[from]
    }

    pub fn edges_from_mut(&mut self, from: VertexId) -> &mut Vec<Edge> {
        &mut self.edges_out[from]
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn num_edges(&self) -> usize {
        self.edges_out.iter().map(|e| e.len()).sum()
    }

    /// Every (from, to) pair, in emission order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges_out.iter().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use comborando_logic::{ItemStore, ItemCondition};

    fn meta_vertex(name: &str) -> Vertex {
        Vertex {
            name: name.to_string(),
            vertex_type: VertexType::Meta,
            subtype: None,
            item: None,
            item_set: vec![],
            addresses: None,
            title: None,
        }
    }

    #[test]
    fn test_vertex_dedup_by_name() {
        let mut graph = LogicGraph::new();
        let a = graph.add_vertex(meta_vertex("A"));
        let a2 = graph.add_vertex(meta_vertex("A"));
        assert_eq!(a, a2);
        assert_eq!(graph.num_vertices(), 1);
    }

    #[test]
    fn test_edge_value_dedup() {
        let mut items = ItemStore::default();
        let fixed = items.get_or_intern("fixed");
        let mut graph = LogicGraph::new();
        let a = graph.add_vertex(meta_vertex("A"));
        let b = graph.add_vertex(meta_vertex("B"));
        graph.add_directed(a, b, ItemCondition::new(fixed, 1));
        graph.add_directed(a, b, ItemCondition::new(fixed, 1));
        assert_eq!(graph.num_edges(), 1);
        // A different count is a different edge.
        graph.add_directed(a, b, ItemCondition::new(fixed, 2));
        assert_eq!(graph.num_edges(), 2);
    }

    #[test]
    fn test_missing_vertex_is_fatal() {
        let graph = LogicGraph::new();
        assert!(graph.expect_vertex_id("nowhere").is_err());
    }
}
