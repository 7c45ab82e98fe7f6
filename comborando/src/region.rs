// Per-region graph builder: expands one title's rooms into obstacle-state
// vertex variants, connects them through strats by depth-first recursion, and
// emits a vertex list plus requirement-keyed edge groups for the stitcher.
// Source data is read-only here; everything emitted is owned by the builder.

use crate::graph::VertexType;
use anyhow::{bail, ensure, Context, Result};
use comborando_game::{Connection, Node, Requirement, Room};
use hashbrown::{HashMap, HashSet};
use log::warn;

/// Obstacle counts above this make the per-room power set unreasonable; no
/// known room declares more than 4.
pub const MAX_ROOM_OBSTACLES: usize = 6;

/// Item pool tag attached to item vertices produced by this builder.
const ITEM_POOL: &str = "supermetroid";

/// A vertex as emitted by the builder: names are still title-local; the
/// stitcher prefixes them and interns item names when merging into the world
/// registry.
#[derive(Clone, Debug)]
pub struct VertexSpec {
    pub name: String,
    pub vertex_type: VertexType,
    pub subtype: Option<VertexType>,
    pub item: Option<String>,
    pub item_set: Vec<String>,
    pub address: Option<u64>,
}

impl VertexSpec {
    fn meta(name: &str) -> Self {
        VertexSpec {
            name: name.to_string(),
            vertex_type: VertexType::Meta,
            subtype: None,
            item: None,
            item_set: vec![],
            address: None,
        }
    }

    fn meta_with_item(name: &str, item: &str) -> Self {
        VertexSpec {
            item: Some(item.to_string()),
            ..Self::meta(name)
        }
    }
}

/// Edge endpoints grouped by shared requirement. Undirected pairs expand to
/// two directed edges when merged into the graph.
#[derive(Default, Clone, Debug)]
pub struct EdgeGroup {
    pub directed: Vec<(String, String)>,
    pub undirected: Vec<(String, String)>,
}

/// One title's isolated vertex/edge set, names not yet globally namespaced.
#[derive(Default, Clone, Debug)]
pub struct TitleGraph {
    pub vertices: Vec<VertexSpec>,
    pub edge_groups: Vec<(Requirement, EdgeGroup)>,
}

#[derive(Default)]
pub struct RegionBuilder {
    // Slot-based storage keeps emission order stable across pruning.
    vertices: Vec<Option<VertexSpec>>,
    vertex_index: HashMap<String, usize>,
    edge_groups: Vec<(Requirement, EdgeGroup)>,
    group_index: HashMap<Requirement, usize>,
    edge_seen: HashSet<(usize, String, String, bool)>,
    edge_endpoints: HashSet<String>,
    connected_strats: HashSet<(String, String)>,
}

impl RegionBuilder {
    pub fn new() -> Self {
        RegionBuilder::default()
    }

    pub fn build(mut self, rooms: &[Room], connections: &[Connection]) -> Result<TitleGraph> {
        for room in rooms {
            self.build_room(room)
                .with_context(|| format!("building room {}", room.name))?;
        }
        for connection in connections {
            self.build_connection(rooms, connection)?;
        }
        Ok(TitleGraph {
            vertices: self.vertices.into_iter().flatten().collect(),
            edge_groups: self.edge_groups,
        })
    }

    fn has_vertex(&self, name: &str) -> bool {
        self.vertex_index.contains_key(name)
    }

    fn create_vertex(&mut self, spec: VertexSpec) -> Result<()> {
        ensure!(!spec.name.is_empty(), "vertex without a name");
        if self.vertex_index.contains_key(&spec.name) {
            bail!("duplicate vertex name: {}", spec.name);
        }
        self.vertex_index.insert(spec.name.clone(), self.vertices.len());
        self.vertices.push(Some(spec));
        Ok(())
    }

    fn find_or_create_vertex(&mut self, spec: VertexSpec) {
        if !self.vertex_index.contains_key(&spec.name) {
            self.vertex_index.insert(spec.name.clone(), self.vertices.len());
            self.vertices.push(Some(spec));
        }
    }

    fn remove_vertex(&mut self, name: &str) {
        if let Some(slot) = self.vertex_index.remove(name) {
            self.vertices[slot] = None;
        }
    }

    fn add_edge(&mut self, from: &str, to: &str, requirement: Requirement, undirected: bool) {
        let group_idx = match self.group_index.get(&requirement) {
            Some(&idx) => idx,
            None => {
                let idx = self.edge_groups.len();
                self.group_index.insert(requirement.clone(), idx);
                self.edge_groups.push((requirement, EdgeGroup::default()));
                idx
            }
        };
        // Never silently duplicate an edge already present for the same
        // logical connection.
        if !self
            .edge_seen
            .insert((group_idx, from.to_string(), to.to_string(), undirected))
        {
            return;
        }
        self.edge_endpoints.insert(from.to_string());
        self.edge_endpoints.insert(to.to_string());
        let group = &mut self.edge_groups[group_idx].1;
        if undirected {
            group.undirected.push((from.to_string(), to.to_string()));
        } else {
            group.directed.push((from.to_string(), to.to_string()));
        }
    }

    fn add_directed_edge(&mut self, from: &str, to: &str, requirement: Requirement) {
        self.add_edge(from, to, requirement, false);
    }

    fn add_undirected_edge(&mut self, from: &str, to: &str, requirement: Requirement) {
        self.add_edge(from, to, requirement, true);
    }

    fn build_room(&mut self, room: &Room) -> Result<()> {
        let obstacle_states = obstacle_state_strings(room)?;
        let mut room_vertices: Vec<String> = Vec::new();

        // Instantiate a copy of every node for each obstacle combination
        // (including the empty state), and resolve locks, items and yielded
        // flags for each copy.
        for state in &obstacle_states {
            let cleared: Vec<&str> = split_state(state);
            for node in &room.nodes {
                let node_name = node_variant_name(room, &node.name, state);
                self.create_vertex(VertexSpec::meta(&node_name))?;
                room_vertices.push(node_name.clone());

                let has_locks = node.locks.as_ref().is_some_and(|l| !l.is_empty());
                let lock_cleared_name =
                    format!("{} - {} - {} - Lock Cleared", room.area, room.name, node.name);

                if let Some(locks) = &node.locks {
                    self.find_or_create_vertex(VertexSpec::meta(&lock_cleared_name));

                    for node_lock in locks {
                        if node_lock.lock.is_some()
                            && node_lock.lock_type.eq_ignore_ascii_case("escapefunnel")
                        {
                            self.add_directed_edge(
                                &node_name,
                                &lock_cleared_name,
                                Requirement::Always,
                            );
                            continue;
                        }

                        for lock_strat in &node_lock.unlock_strats {
                            let lock_strat_name = format!(
                                "{} - {} - {} - Lock Strat: {}",
                                room.area, room.name, node.name, lock_strat.name
                            );
                            self.find_or_create_vertex(VertexSpec::meta(&lock_strat_name));

                            let mut lock_requirement = lock_strat.requires.clone();
                            if let Some(lock) = &node_lock.lock {
                                lock_requirement =
                                    Requirement::And(vec![lock_requirement, lock.clone()]);
                            }
                            let lock_requirement =
                                lock_requirement.adjust_obstacle_state(&cleared);

                            self.add_directed_edge(&node_name, &lock_strat_name, lock_requirement);
                            self.add_directed_edge(
                                &lock_strat_name,
                                &lock_cleared_name,
                                Requirement::Always,
                            );
                        }

                        for lock_yield in node_lock.yields.as_deref().unwrap_or(&[]) {
                            let yield_name = format!(
                                "{} - {} - {} - Lock Yields: {}",
                                room.area, room.name, node.name, lock_yield
                            );
                            self.find_or_create_vertex(VertexSpec::meta_with_item(
                                &yield_name,
                                lock_yield,
                            ));
                            self.add_directed_edge(
                                &lock_cleared_name,
                                &yield_name,
                                Requirement::Always,
                            );
                        }
                    }
                }

                // Items get exactly one vertex per node regardless of the
                // obstacle-state count.
                if node.node_type == "item" {
                    let item_name =
                        format!("{} - {} - {} - Item", room.area, room.name, node.name);
                    let address = match &node.node_address {
                        Some(s) => Some(parse_int::parse::<u64>(s).with_context(|| {
                            format!("bad nodeAddress for node {}", node.name)
                        })?),
                        None => None,
                    };
                    self.find_or_create_vertex(VertexSpec {
                        name: item_name.clone(),
                        vertex_type: VertexType::Item,
                        subtype: match node.node_sub_type.as_str() {
                            "chozo" => Some(VertexType::Chozo),
                            "hidden" => Some(VertexType::Hidden),
                            "visible" => Some(VertexType::Visible),
                            _ => None,
                        },
                        item: None,
                        item_set: vec![ITEM_POOL.to_string()],
                        address,
                    });

                    if has_locks {
                        self.add_directed_edge(&lock_cleared_name, &item_name, Requirement::Always);
                    } else {
                        self.add_directed_edge(&node_name, &item_name, Requirement::Always);
                    }

                    if state.is_empty() {
                        // Back-edge to the base state to support the
                        // solver's backtracking search.
                        self.add_directed_edge(
                            &item_name,
                            &node_name,
                            Requirement::Single("BacktrackSearch".to_string()),
                        );
                    }
                }

                // Flag-yielding nodes feed a flag vertex.
                if let Some(yields) = &node.yields {
                    for flag in yields {
                        let yield_name = format!(
                            "{} - {} - {} - Yields: {}",
                            room.area, room.name, node.name, flag
                        );
                        self.find_or_create_vertex(VertexSpec::meta_with_item(&yield_name, flag));
                        if has_locks {
                            self.add_directed_edge(
                                &lock_cleared_name,
                                &yield_name,
                                Requirement::Always,
                            );
                        } else {
                            self.add_directed_edge(&node_name, &yield_name, Requirement::Always);
                        }
                    }
                }
            }
        }

        // Walk the links, starting every node from the obstacle-free state.
        for node in &room.nodes {
            self.connect_node(room, node, "")?;
        }

        // Purge the obstacle-expansion vertices that never got an edge.
        room_vertices.retain(|name| {
            if self.edge_endpoints.contains(name) {
                true
            } else {
                self.remove_vertex(name);
                false
            }
        });

        // Synthesize In/Out vertices for the room's doors.
        for node in &room.nodes {
            let is_door = matches!(node.node_type.as_str(), "door" | "entrance" | "exit")
                || node.node_sub_type == "ship";
            if !is_door {
                continue;
            }

            let base_name = node_variant_name(room, &node.name, "");
            if !self.has_vertex(&base_name) {
                warn!("no surviving base vertex for door node {base_name}; skipping In/Out");
                continue;
            }

            let in_name = format!("{base_name} - In");
            let out_name = format!("{base_name} - Out");
            self.find_or_create_vertex(VertexSpec {
                vertex_type: VertexType::Entrance,
                ..VertexSpec::meta(&in_name)
            });
            self.find_or_create_vertex(VertexSpec {
                vertex_type: VertexType::Entrance,
                ..VertexSpec::meta(&out_name)
            });

            // Entering the room always lands on the base state.
            self.add_undirected_edge(&in_name, &base_name, Requirement::Always);

            // Leaving goes through the lock when there is one.
            let resolved_name = if node.locks.is_some() {
                let lock_cleared_name = format!("{base_name} - Lock Cleared");
                if !self.has_vertex(&lock_cleared_name) {
                    warn!("no lock-cleared vertex for door node {base_name}; skipping Out");
                    continue;
                }
                lock_cleared_name
            } else {
                base_name.clone()
            };
            self.add_directed_edge(&resolved_name, &out_name, Requirement::Always);

            if node.locks.is_none() {
                // Any obstacle state the room was explored into can still
                // leave through this door.
                let variant_prefix = format!("{base_name} - ");
                let variants: Vec<String> = room_vertices
                    .iter()
                    .filter(|v| v.starts_with(&variant_prefix))
                    .cloned()
                    .collect();
                for variant in variants {
                    self.add_directed_edge(&variant, &out_name, Requirement::Always);
                }
            }
        }

        Ok(())
    }

    /// Recursively connects `from` to everything reachable from it,
    /// switching obstacle states as strats clear or reset obstacles. The
    /// visited set over (from vertex, strat vertex) pairs is the sole
    /// termination guard; recursion depth is bounded by
    /// nodes x strats x obstacle states for a single room.
    fn connect_node(&mut self, room: &Room, from: &Node, state: &str) -> Result<()> {
        let from_name = node_variant_name(room, &from.name, state);
        let cleared: Vec<&str> = split_state(state);

        for link in room.links.iter().filter(|l| l.from == from.id) {
            for link_to in &link.to {
                let to_node = match room.nodes.iter().find(|n| n.id == link_to.id) {
                    Some(node) => node,
                    None => bail!(
                        "link from node {} references nonexistent node {} in room {}",
                        link.from,
                        link_to.id,
                        room.name
                    ),
                };

                for strat in room
                    .strats
                    .iter()
                    .filter(|s| s.link == (link.from, link_to.id))
                {
                    // Strats with unsupported entrance conditions are
                    // deliberately omitted, not an error.
                    if let Some(ec) = &strat.entrance_condition {
                        if !ec.is_supported() {
                            continue;
                        }
                    }

                    let mut new_state = state.to_string();
                    if let Some(clears) = &strat.clears_obstacles {
                        new_state = union_state(&new_state, clears);
                    }
                    if let Some(resets) = &strat.resets_obstacles {
                        new_state = except_state(&new_state, resets);
                    }

                    let strat_name = format!(
                        "{} - {},{} - Strat: {}",
                        from_name, strat.link.0, strat.link.1, strat.name
                    );
                    let to_name = node_variant_name(room, &to_node.name, &new_state);
                    ensure!(
                        self.has_vertex(&to_name),
                        "missing target vertex {to_name} in room {}",
                        room.name
                    );

                    let requirement = if strat.requires.is_vacuous() {
                        Requirement::Always
                    } else {
                        strat.requires.clone()
                    };
                    // The requirement sees the pre-strat obstacle state.
                    let requirement = requirement.adjust_obstacle_state(&cleared);

                    if self
                        .connected_strats
                        .insert((from_name.clone(), strat_name.clone()))
                    {
                        self.find_or_create_vertex(VertexSpec::meta(&strat_name));
                        self.add_directed_edge(&from_name, &strat_name, requirement);
                        self.add_directed_edge(&strat_name, &to_name, Requirement::Always);
                        self.connect_node(room, to_node, &new_state)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn build_connection(&mut self, rooms: &[Room], connection: &Connection) -> Result<()> {
        let first = &connection.nodes[0];
        let second = &connection.nodes[1];

        let first_room = rooms
            .iter()
            .find(|r| r.id == first.room_id)
            .with_context(|| {
                format!(
                    "connection references missing room {} ({})",
                    first.room_id, first.room_name
                )
            })?;
        let second_room = rooms
            .iter()
            .find(|r| r.id == second.room_id)
            .with_context(|| {
                format!(
                    "connection references missing room {} ({})",
                    second.room_id, second.room_name
                )
            })?;

        let first_node = find_connection_node(first_room, first.node_id)?;
        let second_node = find_connection_node(second_room, second.node_id)?;

        let out_name = format!(
            "{} - {} - {} - Out",
            first_room.area, first_room.name, first_node.name
        );
        let in_name = format!(
            "{} - {} - {} - In",
            second_room.area, second_room.name, second_node.name
        );
        self.expect_connection_vertex(&out_name)?;
        self.expect_connection_vertex(&in_name)?;
        self.add_directed_edge(&out_name, &in_name, Requirement::Always);

        if connection.direction.eq_ignore_ascii_case("bidirectional") {
            let out_name = format!(
                "{} - {} - {} - Out",
                second_room.area, second_room.name, second_node.name
            );
            let in_name = format!(
                "{} - {} - {} - In",
                first_room.area, first_room.name, first_node.name
            );
            self.expect_connection_vertex(&out_name)?;
            self.expect_connection_vertex(&in_name)?;
            self.add_directed_edge(&out_name, &in_name, Requirement::Always);
        }
        Ok(())
    }

    fn expect_connection_vertex(&self, name: &str) -> Result<()> {
        ensure!(
            self.has_vertex(name),
            "door with no matching vertex: {name}"
        );
        Ok(())
    }
}

fn find_connection_node(room: &Room, node_id: usize) -> Result<&Node> {
    room.nodes
        .iter()
        .find(|n| n.id == node_id)
        .with_context(|| {
            format!(
                "connection references missing node {} in room {}",
                node_id, room.name
            )
        })
}

fn node_variant_name(room: &Room, node_name: &str, state: &str) -> String {
    if state.is_empty() {
        format!("{} - {} - {}", room.area, room.name, node_name)
    } else {
        format!("{} - {} - {} - {}", room.area, room.name, node_name, state)
    }
}

/// All obstacle-state suffixes for the room: the empty state plus every
/// non-empty subset of obstacle ids, each normalized (sorted, comma-joined)
/// and the whole list sorted for deterministic emission.
fn obstacle_state_strings(room: &Room) -> Result<Vec<String>> {
    let num_obstacles = room.obstacles.len();
    ensure!(
        num_obstacles <= MAX_ROOM_OBSTACLES,
        "room {} declares {} obstacles; power-set expansion refused",
        room.name,
        num_obstacles
    );
    let mut ids: Vec<&str> = room.obstacles.iter().map(|o| o.id.as_str()).collect();
    ids.sort_unstable();

    let mut states: Vec<String> = Vec::new();
    for mask in 1usize..(1 << num_obstacles) {
        let combo: Vec<&str> = ids
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, id)| *id)
            .collect();
        states.push(combo.join(","));
    }
    states.sort_unstable();
    let mut all = vec![String::new()];
    all.extend(states);
    Ok(all)
}

fn split_state(state: &str) -> Vec<&str> {
    state.split(',').filter(|s| !s.is_empty()).collect()
}

fn union_state(state: &str, add: &[String]) -> String {
    let mut ids = split_state(state);
    for id in add {
        if !ids.contains(&id.as_str()) {
            ids.push(id.as_str());
        }
    }
    ids.sort_unstable();
    ids.join(",")
}

fn except_state(state: &str, remove: &[String]) -> String {
    let mut ids = split_state(state);
    ids.retain(|id| !remove.iter().any(|r| r == id));
    ids.sort_unstable();
    ids.join(",")
}
