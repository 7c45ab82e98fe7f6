use crate::graph::{LogicGraph, Vertex, VertexType};
use crate::settings::WorldSettings;
use comborando_game::Capacity;
use comborando_logic::{ItemId, ItemStore};

/// Name of the global root vertex every title's entry edges hang off.
pub const START_VERTEX: &str = "start";

/// One world instance under construction: the interned item pool, the
/// unified graph, and the items granted before any traversal. Registries are
/// exclusively owned by the build for the duration of one world's
/// construction.
pub struct World {
    pub settings: WorldSettings,
    pub items: ItemStore,
    pub graph: LogicGraph,
    pub starting_items: Vec<(ItemId, Capacity)>,
}

impl World {
    pub fn new(settings: WorldSettings) -> Self {
        let mut world = World {
            settings,
            items: ItemStore::default(),
            graph: LogicGraph::new(),
            starting_items: Vec::new(),
        };
        world.graph.add_vertex(Vertex {
            name: START_VERTEX.to_string(),
            vertex_type: VertexType::Start,
            subtype: None,
            item: None,
            item_set: vec![],
            addresses: None,
            title: None,
        });
        world
    }

    pub fn add_starting_item(&mut self, name: &str, count: Capacity) {
        let item = self.items.get_or_intern(name);
        self.starting_items.push((item, count));
    }
}
