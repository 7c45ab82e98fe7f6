// End-to-end scenarios for the region builder and stitcher: rooms are
// declared as structural JSON, built into a title graph, and merged into a
// world, then the resulting vertices and edges are checked by name.

use anyhow::Result;
use comborando::graph::VertexType;
use comborando::region::{EdgeGroup, RegionBuilder, TitleGraph, VertexSpec};
use comborando::settings::WorldSettings;
use comborando::stitch::{
    add_keyed_title_graph, add_title_graph, apply_connectors, apply_z1_triforce_setting,
    parse_edge_key,
};
use comborando::world::{World, START_VERTEX};
use comborando_game::{Capacity, Connection, Room, Title};
use comborando_logic::TechPolicy;

fn parse_room(s: &str) -> Room {
    Room::parse(&json::parse(s).unwrap()).unwrap()
}

fn parse_connections(s: &str) -> Vec<Connection> {
    let json_value = json::parse(s).unwrap();
    json_value
        .members()
        .map(|c| Connection::parse(c).unwrap())
        .collect()
}

fn build_world(rooms: &[Room], connections: &[Connection], settings: WorldSettings) -> World {
    let title_graph = RegionBuilder::new().build(rooms, connections).unwrap();
    let mut world = World::new(settings);
    add_title_graph(&mut world, Title::SuperMetroid, &title_graph).unwrap();
    world
}

fn vertex_id(world: &World, name: &str) -> usize {
    world
        .graph
        .vertex_id(name)
        .unwrap_or_else(|| panic!("missing vertex '{name}'"))
}

/// Conditions of all edges from `from` to `to`, as (item name, count).
fn edge_conditions(world: &World, from: &str, to: &str) -> Vec<(String, Capacity)> {
    let from_id = vertex_id(world, from);
    let to_id = vertex_id(world, to);
    world
        .graph
        .edges_from(from_id)
        .iter()
        .filter(|e| e.to == to_id)
        .map(|e| (world.items.name(e.condition.item).to_string(), e.condition.count))
        .collect()
}

const TWO_NODE_ROOM: &str = r#"{
    "id": 1,
    "name": "Two Node Room",
    "area": "Crateria",
    "nodes": [
        {"id": 1, "name": "Left Door", "nodeType": "door", "nodeSubType": "blue"},
        {"id": 2, "name": "Right Door", "nodeType": "door", "nodeSubType": "blue"}
    ],
    "links": [
        {"from": 1, "to": [{"id": 2}]}
    ],
    "strats": [
        {"link": [1, 2], "name": "Bomb Crossing", "requires": ["Bombs"]}
    ]
}"#;

#[test]
fn test_two_node_room_single_strat() {
    let rooms = [parse_room(TWO_NODE_ROOM)];
    let world = build_world(&rooms, &[], WorldSettings::default());

    let from = "SM - Crateria - Two Node Room - Left Door";
    let strat = "SM - Crateria - Two Node Room - Left Door - 1,2 - Strat: Bomb Crossing";
    let to = "SM - Crateria - Two Node Room - Right Door";

    // Exactly one gated edge into the strat vertex, and an always-edge out.
    assert_eq!(edge_conditions(&world, from, strat), vec![("SMBombs".to_string(), 1)]);
    assert_eq!(edge_conditions(&world, strat, to), vec![("fixed".to_string(), 1)]);

    // No reverse link was declared.
    let to_id = vertex_id(&world, to);
    assert!(world
        .graph
        .edges_from(to_id)
        .iter()
        .all(|e| e.to != vertex_id(&world, from)));
}

#[test]
fn test_empty_requires_condenses_to_always() {
    let room = r#"{
        "id": 2, "name": "Free Room", "area": "Crateria",
        "nodes": [
            {"id": 1, "name": "A", "nodeType": "junction", "nodeSubType": "x"},
            {"id": 2, "name": "B", "nodeType": "junction", "nodeSubType": "x"}
        ],
        "links": [{"from": 1, "to": [{"id": 2}]}],
        "strats": [{"link": [1, 2], "name": "Base", "requires": []}]
    }"#;
    let rooms = [parse_room(room)];
    let world = build_world(&rooms, &[], WorldSettings::default());
    let from = "SM - Crateria - Free Room - A";
    let strat = "SM - Crateria - Free Room - A - 1,2 - Strat: Base";
    assert_eq!(edge_conditions(&world, from, strat), vec![("fixed".to_string(), 1)]);
}

const OBSTACLE_ROOM: &str = r#"{
    "id": 3,
    "name": "Obstacle Room",
    "area": "Brinstar",
    "obstacles": [
        {"id": "A", "name": "Bomb Blocks"},
        {"id": "B", "name": "Boulder"}
    ],
    "nodes": [
        {"id": 1, "name": "Door", "nodeType": "door", "nodeSubType": "blue"},
        {"id": 2, "name": "Junction", "nodeType": "junction", "nodeSubType": "x"}
    ],
    "links": [
        {"from": 1, "to": [{"id": 2}]},
        {"from": 2, "to": [{"id": 1}]}
    ],
    "strats": [
        {"link": [1, 2], "name": "Clear Blocks", "requires": ["Bombs"],
         "clearsObstacles": ["A"]},
        {"link": [2, 1], "name": "Return", "requires": []},
        {"link": [1, 2], "name": "Walk Under", "requires": [{"obstaclesCleared": ["A"]}]}
    ]
}"#;

#[test]
fn test_obstacle_expansion_and_pruning() {
    let rooms = [parse_room(OBSTACLE_ROOM)];
    let title_graph = RegionBuilder::new().build(&rooms, &[]).unwrap();
    let names: Vec<&str> = title_graph.vertices.iter().map(|v| v.name.as_str()).collect();

    // The A-cleared variants are reachable through "Clear Blocks".
    assert!(names.contains(&"Brinstar - Obstacle Room - Junction - A"));
    assert!(names.contains(&"Brinstar - Obstacle Room - Door - A"));
    // Obstacle B is never cleared by any strat, so its variants are pruned.
    assert!(!names.iter().any(|n| n.ends_with("- B") || n.ends_with("A,B")));

    // Every surviving vertex has at least one incident edge.
    for vertex in &title_graph.vertices {
        let incident = title_graph.edge_groups.iter().any(|(_, group)| {
            group
                .directed
                .iter()
                .chain(group.undirected.iter())
                .any(|(f, t)| f == &vertex.name || t == &vertex.name)
        });
        assert!(incident, "isolated vertex survived pruning: {}", vertex.name);
    }
}

#[test]
fn test_obstacle_state_gates_requirements() {
    let rooms = [parse_room(OBSTACLE_ROOM)];
    let world = build_world(&rooms, &[], WorldSettings::default());

    // In the base state, "Walk Under" requires obstacle A cleared, which is
    // statically false, so the gated edge into its strat vertex is dropped.
    let base = "SM - Brinstar - Obstacle Room - Door";
    let walk_base = "SM - Brinstar - Obstacle Room - Door - 1,2 - Strat: Walk Under";
    assert_eq!(edge_conditions(&world, base, walk_base), vec![]);

    // In the A-cleared state the same strat is unconditionally available.
    let walk_cleared = "SM - Brinstar - Obstacle Room - Door - A - 1,2 - Strat: Walk Under";
    let from_cleared = "SM - Brinstar - Obstacle Room - Door - A";
    assert_eq!(
        edge_conditions(&world, from_cleared, walk_cleared),
        vec![("fixed".to_string(), 1)]
    );

    // Clearing the blocks moves the explorer into the A-state vertex set.
    let clear_strat = "SM - Brinstar - Obstacle Room - Door - 1,2 - Strat: Clear Blocks";
    let junction_a = "SM - Brinstar - Obstacle Room - Junction - A";
    assert_eq!(edge_conditions(&world, base, clear_strat), vec![("SMBombs".to_string(), 1)]);
    assert_eq!(
        edge_conditions(&world, clear_strat, junction_a),
        vec![("fixed".to_string(), 1)]
    );

    // Every obstacle variant of an unlocked door can still leave the room.
    let out = "SM - Brinstar - Obstacle Room - Door - Out";
    assert_eq!(
        edge_conditions(&world, from_cleared, out),
        vec![("fixed".to_string(), 1)]
    );
}

const ITEM_ROOM: &str = r#"{
    "id": 4,
    "name": "Pedestal Room",
    "area": "Crateria",
    "nodes": [
        {"id": 1, "name": "Door", "nodeType": "door", "nodeSubType": "blue"},
        {"id": 2, "name": "Pedestal", "nodeType": "item", "nodeSubType": "chozo",
         "nodeAddress": "0x786DE"}
    ],
    "links": [
        {"from": 1, "to": [{"id": 2}]},
        {"from": 2, "to": [{"id": 1}]}
    ],
    "strats": [
        {"link": [1, 2], "name": "Base", "requires": []},
        {"link": [2, 1], "name": "Base", "requires": []}
    ]
}"#;

#[test]
fn test_item_node_vertex_and_backtrack_edge() {
    let rooms = [parse_room(ITEM_ROOM)];
    let world = build_world(&rooms, &[], WorldSettings::default());

    let node = "SM - Crateria - Pedestal Room - Pedestal";
    let item = "SM - Crateria - Pedestal Room - Pedestal - Item";
    assert_eq!(edge_conditions(&world, node, item), vec![("fixed".to_string(), 1)]);
    assert_eq!(
        edge_conditions(&world, item, node),
        vec![("SMBacktrackSearch".to_string(), 1)]
    );

    let item_vertex = world.graph.vertex(vertex_id(&world, item));
    assert_eq!(item_vertex.vertex_type, VertexType::Item);
    assert_eq!(item_vertex.subtype, Some(VertexType::Chozo));
    assert_eq!(item_vertex.item_set, vec!["supermetroid".to_string()]);
    assert_eq!(
        item_vertex.addresses,
        Some(vec![0x786DE, 0x786DF, 0x786E3])
    );
}

const LOCKED_ROOM: &str = r#"{
    "id": 5,
    "name": "Gauntlet",
    "area": "Norfair",
    "nodes": [
        {"id": 1, "name": "Door", "nodeType": "door", "nodeSubType": "blue"},
        {"id": 2, "name": "Gate", "nodeType": "junction", "nodeSubType": "x",
         "locks": [{
             "name": "Gate Lock",
             "lockType": "triggeredEvent",
             "unlockStrats": [
                 {"name": "Ceiling Climb", "requires": ["canIBJ"]}
             ],
             "yields": ["f_GateOpen"]
         }]}
    ],
    "links": [{"from": 1, "to": [{"id": 2}]}],
    "strats": [{"link": [1, 2], "name": "Base", "requires": []}]
}"#;

#[test]
fn test_lock_resolution() {
    let rooms = [parse_room(LOCKED_ROOM)];
    let world = build_world(&rooms, &[], WorldSettings::default());

    let gate = "SM - Norfair - Gauntlet - Gate";
    let lock_strat = "SM - Norfair - Gauntlet - Gate - Lock Strat: Ceiling Climb";
    let lock_cleared = "SM - Norfair - Gauntlet - Gate - Lock Cleared";
    let lock_yield = "SM - Norfair - Gauntlet - Gate - Lock Yields: f_GateOpen";

    // canIBJ is in the default allow-list, so the lock strat stays gated on
    // the tech item.
    assert_eq!(
        edge_conditions(&world, gate, lock_strat),
        vec![("SMcanIBJ".to_string(), 1)]
    );
    assert_eq!(
        edge_conditions(&world, lock_strat, lock_cleared),
        vec![("fixed".to_string(), 1)]
    );
    assert_eq!(
        edge_conditions(&world, lock_cleared, lock_yield),
        vec![("fixed".to_string(), 1)]
    );
    // The yield vertex grants the flag item.
    let yield_vertex = world.graph.vertex(vertex_id(&world, lock_yield));
    assert_eq!(
        yield_vertex.item.map(|i| world.items.name(i).to_string()),
        Some("SMf_GateOpen".to_string())
    );
}

#[test]
fn test_disallowed_lock_tech_makes_lock_unreachable() {
    let rooms = [parse_room(LOCKED_ROOM)];
    let settings = WorldSettings {
        tech_policy: TechPolicy::from_allowed(["canWalljump"]),
        ..WorldSettings::default()
    };
    let world = build_world(&rooms, &[], settings);

    // The unlock strat requirement condenses to Never, so the edge into the
    // lock strat vertex is dropped and Lock Cleared is unreachable.
    let gate = vertex_id(&world, "SM - Norfair - Gauntlet - Gate");
    let lock_strat = vertex_id(
        &world,
        "SM - Norfair - Gauntlet - Gate - Lock Strat: Ceiling Climb",
    );
    assert!(world.graph.edges_from(gate).iter().all(|e| e.to != lock_strat));
}

#[test]
fn test_unsupported_entrance_condition_skips_strat() {
    let room = r#"{
        "id": 6, "name": "Spark Room", "area": "Maridia",
        "nodes": [
            {"id": 1, "name": "A", "nodeType": "junction", "nodeSubType": "x"},
            {"id": 2, "name": "B", "nodeType": "junction", "nodeSubType": "x"}
        ],
        "links": [{"from": 1, "to": [{"id": 2}]}],
        "strats": [
            {"link": [1, 2], "name": "Spark Across", "requires": [],
             "entranceCondition": {"comeInWithSpark": {}}},
            {"link": [1, 2], "name": "Run In", "requires": [],
             "entranceCondition": {"comeInRunning": {"speedBooster": "any", "minTiles": 2}}}
        ]
    }"#;
    let rooms = [parse_room(room)];
    let world = build_world(&rooms, &[], WorldSettings::default());

    assert!(world
        .graph
        .vertex_id("SM - Maridia - Spark Room - A - 1,2 - Strat: Spark Across")
        .is_none());
    assert!(world
        .graph
        .vertex_id("SM - Maridia - Spark Room - A - 1,2 - Strat: Run In")
        .is_some());
}

const LEFT_ROOM: &str = r#"{
    "id": 10, "name": "Left Room", "area": "Crateria",
    "nodes": [
        {"id": 1, "name": "East Door", "nodeType": "door", "nodeSubType": "blue"},
        {"id": 2, "name": "Ledge", "nodeType": "junction", "nodeSubType": "x"}
    ],
    "links": [
        {"from": 1, "to": [{"id": 2}]},
        {"from": 2, "to": [{"id": 1}]}
    ],
    "strats": [
        {"link": [1, 2], "name": "Base", "requires": []},
        {"link": [2, 1], "name": "Base", "requires": []}
    ]
}"#;

#[test]
fn test_bidirectional_connection() {
    let left = LEFT_ROOM;
    let right = r#"{
        "id": 11, "name": "Right Room", "area": "Crateria",
        "nodes": [
            {"id": 1, "name": "West Door", "nodeType": "door", "nodeSubType": "blue"},
            {"id": 2, "name": "Ledge", "nodeType": "junction", "nodeSubType": "x"}
        ],
        "links": [
            {"from": 1, "to": [{"id": 2}]},
            {"from": 2, "to": [{"id": 1}]}
        ],
        "strats": [
            {"link": [1, 2], "name": "Base", "requires": []},
            {"link": [2, 1], "name": "Base", "requires": []}
        ]
    }"#;
    let connections = parse_connections(
        r#"[{
            "direction": "bidirectional",
            "nodes": [
                {"area": "Crateria", "roomid": 10, "roomName": "Left Room", "nodeid": 1,
                 "nodeName": "East Door"},
                {"area": "Crateria", "roomid": 11, "roomName": "Right Room", "nodeid": 1,
                 "nodeName": "West Door"}
            ]
        }]"#,
    );
    let rooms = [parse_room(left), parse_room(right)];
    let world = build_world(&rooms, &connections, WorldSettings::default());

    assert_eq!(
        edge_conditions(
            &world,
            "SM - Crateria - Left Room - East Door - Out",
            "SM - Crateria - Right Room - West Door - In"
        ),
        vec![("fixed".to_string(), 1)]
    );
    assert_eq!(
        edge_conditions(
            &world,
            "SM - Crateria - Right Room - West Door - Out",
            "SM - Crateria - Left Room - East Door - In"
        ),
        vec![("fixed".to_string(), 1)]
    );
}

#[test]
fn test_connection_to_missing_room_is_fatal() {
    let left = LEFT_ROOM;
    let connections = parse_connections(
        r#"[{
            "direction": "forward",
            "nodes": [
                {"area": "Crateria", "roomid": 10, "roomName": "Left Room", "nodeid": 1,
                 "nodeName": "East Door"},
                {"area": "Crateria", "roomid": 99, "roomName": "Gone Room", "nodeid": 1,
                 "nodeName": "West Door"}
            ]
        }]"#,
    );
    let rooms = [parse_room(left)];
    assert!(RegionBuilder::new().build(&rooms, &connections).is_err());
}

#[test]
fn test_dangling_edge_group_is_fatal() {
    let title_graph = TitleGraph {
        vertices: vec![VertexSpec {
            name: "Somewhere".to_string(),
            vertex_type: VertexType::Meta,
            subtype: None,
            item: None,
            item_set: vec![],
            address: None,
        }],
        edge_groups: vec![(
            comborando_game::Requirement::Always,
            EdgeGroup {
                directed: vec![("Somewhere".to_string(), "Nowhere".to_string())],
                undirected: vec![],
            },
        )],
    };
    let mut world = World::new(WorldSettings::default());
    let result = add_title_graph(&mut world, Title::SuperMetroid, &title_graph);
    assert!(result.is_err());
    assert!(format!("{:#}", result.unwrap_err()).contains("name connection mismatch"));
}

#[test]
fn test_keyed_title_graph_and_triforce_patch() -> Result<()> {
    let vertices = vec![
        VertexSpec {
            name: "Level 9 - Entrance".to_string(),
            vertex_type: VertexType::Entrance,
            subtype: None,
            item: None,
            item_set: vec![],
            address: None,
        },
        VertexSpec {
            name: "Level 9 - Stairway".to_string(),
            vertex_type: VertexType::Meta,
            subtype: None,
            item: None,
            item_set: vec![],
            address: None,
        },
    ];
    let edge_groups = vec![
        (
            "Triforce|8:level9".to_string(),
            EdgeGroup {
                directed: vec![],
                undirected: vec![(
                    "Level 9 - Entrance".to_string(),
                    "Level 9 - Stairway".to_string(),
                )],
            },
        ),
        (
            "fixed".to_string(),
            EdgeGroup {
                directed: vec![(
                    "Level 9 - Stairway".to_string(),
                    "Level 9 - Entrance".to_string(),
                )],
                undirected: vec![],
            },
        ),
    ];

    let settings = WorldSettings {
        z1_triforces: 3,
        ..WorldSettings::default()
    };
    let mut world = World::new(settings);
    add_keyed_title_graph(&mut world, Title::Zelda, &vertices, &edge_groups)?;

    assert_eq!(
        edge_conditions(&world, "Z1 - Level 9 - Entrance", "Z1 - Level 9 - Stairway"),
        vec![("Z1Triforce".to_string(), 8)]
    );

    apply_z1_triforce_setting(&mut world)?;
    assert_eq!(
        edge_conditions(&world, "Z1 - Level 9 - Entrance", "Z1 - Level 9 - Stairway"),
        vec![("Z1Triforce".to_string(), 3)]
    );
    Ok(())
}

#[test]
fn test_parse_edge_key() {
    let (item, count) = parse_edge_key("Triforce|8:level9", Title::Zelda).unwrap();
    assert_eq!(item, "Z1Triforce");
    assert_eq!(count, 8);
    let (item, count) = parse_edge_key("Missile|2", Title::Metroid).unwrap();
    assert_eq!(item, "M1Missile");
    assert_eq!(count, 2);
    let (item, count) = parse_edge_key("fixed", Title::Zelda).unwrap();
    assert_eq!(item, "fixed");
    assert_eq!(count, 1);
    assert!(parse_edge_key("Bombs|many", Title::Zelda).is_err());
}

#[test]
fn test_connectors_require_loaded_titles() {
    let rooms = [parse_room(TWO_NODE_ROOM)];
    let mut world = build_world(&rooms, &[], WorldSettings::default());

    // The SM entry connectors reference vertices this tiny world lacks.
    assert!(apply_connectors(&mut world, &[Title::SuperMetroid]).is_err());

    // With no titles loaded the table is inert.
    apply_connectors(&mut world, &[]).unwrap();
    let start = vertex_id(&world, START_VERTEX);
    assert!(world.graph.edges_from(start).is_empty());
}

#[test]
fn test_start_vertex_and_vertex_dedup() {
    let rooms = [parse_room(TWO_NODE_ROOM)];
    let world = build_world(&rooms, &[], WorldSettings::default());
    assert!(world.graph.vertex_id(START_VERTEX).is_some());

    // Re-merging the same title graph must not create duplicate vertices.
    let title_graph = RegionBuilder::new().build(&rooms, &[]).unwrap();
    let mut world2 = World::new(WorldSettings::default());
    add_title_graph(&mut world2, Title::SuperMetroid, &title_graph).unwrap();
    let before = world2.graph.num_vertices();
    add_title_graph(&mut world2, Title::SuperMetroid, &title_graph).unwrap();
    assert_eq!(world2.graph.num_vertices(), before);
}
