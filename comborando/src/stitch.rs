// Cross-title stitcher: namespaces each title's vertices and edges with its
// tag, merges them into the shared registry, and wires the fixed connector
// edges between titles and the global start vertex. A connector or edge that
// names a vertex missing from the registry is a fatal configuration error.

use crate::graph::{Vertex, VertexType};
use crate::region::{EdgeGroup, TitleGraph, VertexSpec};
use crate::world::{World, START_VERTEX};
use anyhow::{Context, Result};
use comborando_game::{Capacity, HelperCollection, Requirement, Tech, TechCollection, Title};
use comborando_logic::{collapse, condense, lower, ItemCondition, FIXED_ITEM, NEVER_ITEM};
use log::info;

/// A fixed cross-title or start-entry edge, always passable. Applied only
/// when every title it spans has been loaded into the world; within loaded
/// titles, a dangling name aborts world construction.
pub struct Connector {
    pub from: &'static str,
    pub to: &'static str,
    pub bidirectional: bool,
    pub titles: &'static [Title],
}

/// The single declarative table of fixed connector edges.
pub const CONNECTORS: &[Connector] = &[
    Connector {
        from: START_VERTEX,
        to: "SM - Meta",
        bidirectional: false,
        titles: &[Title::SuperMetroid],
    },
    Connector {
        from: START_VERTEX,
        to: "SM - Crateria - Landing Site - Bottom Left Door",
        bidirectional: false,
        titles: &[Title::SuperMetroid],
    },
    Connector {
        from: START_VERTEX,
        to: "M1 - Brinstar - Left Vertical Shaft - Right Door Shaft (11) - Right door",
        bidirectional: false,
        titles: &[Title::Metroid],
    },
    Connector {
        from: START_VERTEX,
        to: "M1 - Meta - Metroid Meta Locations - Meta (0) - Meta",
        bidirectional: false,
        titles: &[Title::Metroid],
    },
    // Norfair map station to the Death Mountain portal.
    Connector {
        from: "SM - Norfair - Business Center - Middle Left Door",
        to: "Z1 - West Death Mountain",
        bidirectional: true,
        titles: &[Title::SuperMetroid, Title::Zelda],
    },
    // Maridia missile refill to the dark-world shopping mall.
    Connector {
        from: "SM - Maridia - Halfie Climb Room - Bottom Right Door",
        to: "Z1 - Dark Shopping Mall",
        bidirectional: true,
        titles: &[Title::SuperMetroid, Title::Zelda],
    },
    // Lower Norfair refill to the mire area.
    Connector {
        from: "SM - Norfair - Screw Attack Room - Middle Right Door",
        to: "Z1 - Mire",
        bidirectional: true,
        titles: &[Title::SuperMetroid, Title::Zelda],
    },
];

fn title_addresses(title: Title, address: u64) -> Vec<u64> {
    match title {
        Title::Metroid => vec![address, address + 1],
        Title::SuperMetroid => vec![address, address + 1, address + 5],
        Title::Zelda => vec![address],
    }
}

fn add_spec_vertices(world: &mut World, title: Title, specs: &[VertexSpec]) -> Result<()> {
    let tag = title.tag();
    for spec in specs {
        anyhow::ensure!(!spec.name.is_empty(), "{tag} vertex without a name");
        let item = match &spec.item {
            Some(item) => Some(world.items.get_or_intern(&format!("{tag}{item}"))),
            None => None,
        };
        let subtype = spec.subtype.or(if spec.vertex_type == VertexType::Item {
            Some(VertexType::Standing)
        } else {
            None
        });
        world.graph.add_vertex(Vertex {
            name: format!("{tag} - {}", spec.name),
            vertex_type: spec.vertex_type,
            subtype,
            item,
            item_set: spec.item_set.clone(),
            addresses: spec.address.map(|a| title_addresses(title, a)),
            title: Some(title),
        });
    }
    Ok(())
}

fn add_group_edges(
    world: &mut World,
    title: Title,
    group: &EdgeGroup,
    condition: &ItemCondition,
) -> Result<()> {
    let tag = title.tag();
    for (from, to) in &group.directed {
        add_title_edge(world, tag, from, to, condition.clone())?;
    }
    for (from, to) in &group.undirected {
        add_title_edge(world, tag, from, to, condition.clone())?;
        add_title_edge(world, tag, to, from, condition.clone())?;
    }
    Ok(())
}

fn add_title_edge(
    world: &mut World,
    tag: &str,
    from: &str,
    to: &str,
    condition: ItemCondition,
) -> Result<()> {
    let from_id = world.graph.expect_vertex_id(&format!("{tag} - {from}"))?;
    let to_id = world.graph.expect_vertex_id(&format!("{tag} - {to}"))?;
    world.graph.add_directed(from_id, to_id, condition);
    Ok(())
}

/// Merges a title graph whose edge groups are keyed by requirement ASTs.
/// Each group's requirement is lowered, condensed against the world's tech
/// policy, and collapsed to an item condition; groups that condense to
/// `never` are dropped entirely.
pub fn add_title_graph(world: &mut World, title: Title, title_graph: &TitleGraph) -> Result<()> {
    add_spec_vertices(world, title, &title_graph.vertices)?;

    for (requirement, group) in &title_graph.edge_groups {
        let lowered = lower(requirement, title)?;
        let condensed = condense(&lowered, &world.settings.tech_policy);
        let condition = collapse(&condensed, title, &mut world.items);
        if world.items.name(condition.item) == NEVER_ITEM {
            continue;
        }
        add_group_edges(world, title, group, &condition)?;
    }
    info!(
        "{}: {} vertices, {} edge groups merged",
        title.tag(),
        title_graph.vertices.len(),
        title_graph.edge_groups.len()
    );
    Ok(())
}

/// Merges a title graph whose edge groups are keyed by string-encoded
/// requirements (`"<item>|<count>:<group>"`), the form the simpler titles
/// produce.
pub fn add_keyed_title_graph(
    world: &mut World,
    title: Title,
    vertices: &[VertexSpec],
    edge_groups: &[(String, EdgeGroup)],
) -> Result<()> {
    add_spec_vertices(world, title, vertices)?;

    for (key, group) in edge_groups {
        let (item_name, count) = parse_edge_key(key, title)?;
        let item = world.items.get_or_intern(&item_name);
        let condition = ItemCondition::new(item, count);
        add_group_edges(world, title, group, &condition)?;
    }
    Ok(())
}

/// Decodes a string edge-group key into an item name and count. The part
/// after a `':'` only disambiguates groups and is discarded; a missing count
/// defaults to 1. Items named `fixed*` are shared across titles and stay
/// unprefixed.
pub fn parse_edge_key(key: &str, title: Title) -> Result<(String, Capacity)> {
    let key_part = key.split(':').next().unwrap();
    let mut parts = key_part.split('|');
    let name = parts.next().unwrap();
    anyhow::ensure!(!name.is_empty(), "empty requirement in edge key '{key}'");
    let count: Capacity = match parts.next() {
        Some(c) => c
            .parse()
            .with_context(|| format!("bad count in edge key '{key}'"))?,
        None => 1,
    };
    let item_name = if name.starts_with("fixed") {
        name.to_string()
    } else {
        format!("{}{}", title.tag(), name)
    };
    Ok((item_name, count))
}

/// Creates the per-title meta vertex and hangs the helper and tech vertices
/// off it, each gated by its own condensed requirement. Only allowed techs
/// are wired; a disallowed tech is skipped along with its extensions.
pub fn add_sm_meta(
    world: &mut World,
    techs: &TechCollection,
    helpers: &HelperCollection,
) -> Result<()> {
    let title = Title::SuperMetroid;
    let meta_id = world.graph.add_vertex(Vertex {
        name: "SM - Meta".to_string(),
        vertex_type: VertexType::Meta,
        subtype: None,
        item: None,
        item_set: vec![],
        addresses: None,
        title: Some(title),
    });

    for helper in helpers
        .helper_categories
        .iter()
        .flat_map(|c| c.helpers.iter())
    {
        let item = world.items.get_or_intern(&format!("SM{}", helper.name));
        let helper_id = world.graph.add_vertex(Vertex {
            name: format!("SM - Helper - {}", helper.name),
            vertex_type: VertexType::Meta,
            subtype: None,
            item: Some(item),
            item_set: vec![],
            addresses: None,
            title: Some(title),
        });
        let lowered = lower(&helper.requires, title)?;
        let condensed = condense(&lowered, &world.settings.tech_policy);
        let condition = collapse(&condensed, title, &mut world.items);
        world.graph.add_directed(meta_id, helper_id, condition);
    }

    for tech in techs.tech_categories.iter().flat_map(|c| c.techs.iter()) {
        add_tech(world, meta_id, tech)?;
    }
    Ok(())
}

fn add_tech(world: &mut World, meta_id: usize, tech: &Tech) -> Result<()> {
    if !world.settings.tech_policy.allows(&tech.name) {
        return Ok(());
    }
    let title = Title::SuperMetroid;
    let item = world.items.get_or_intern(&format!("SM{}", tech.name));
    let tech_id = world.graph.add_vertex(Vertex {
        name: format!("SM - Tech - {}", tech.name),
        vertex_type: VertexType::Meta,
        subtype: None,
        item: Some(item),
        item_set: vec![],
        addresses: None,
        title: Some(title),
    });

    let requirement = Requirement::And(vec![
        tech.tech_requires.clone(),
        tech.other_requires.clone(),
    ]);
    let lowered = lower(&requirement, title)?;
    let condensed = condense(&lowered, &world.settings.tech_policy);
    let condition = collapse(&condensed, title, &mut world.items);
    world.graph.add_directed(meta_id, tech_id, condition);

    for ext in &tech.extension_techs {
        add_tech(world, meta_id, ext)?;
    }
    Ok(())
}

/// Wires the fixed connector edges for the loaded titles. A connector whose
/// titles are all loaded but whose vertex names do not resolve indicates the
/// title's internal graph changed shape without updating this table; that
/// aborts world construction.
pub fn apply_connectors(world: &mut World, loaded: &[Title]) -> Result<()> {
    let fixed = world.items.get_or_intern(FIXED_ITEM);
    for connector in CONNECTORS {
        if !connector.titles.iter().all(|t| loaded.contains(t)) {
            continue;
        }
        let from = world
            .graph
            .expect_vertex_id(connector.from)
            .with_context(|| format!("wiring connector {} -> {}", connector.from, connector.to))?;
        let to = world
            .graph
            .expect_vertex_id(connector.to)
            .with_context(|| format!("wiring connector {} -> {}", connector.from, connector.to))?;
        world
            .graph
            .add_directed(from, to, ItemCondition::new(fixed, 1));
        if connector.bidirectional {
            world
                .graph
                .add_directed(to, from, ItemCondition::new(fixed, 1));
        }
    }
    Ok(())
}

/// Title-specific graph patches for Super Metroid: the Main Street
/// speed-blocked item shortcut (the shinespark there is modeled as an extra
/// edge rather than a node) and the starting world-state flag.
pub fn apply_sm_patches(world: &mut World) -> Result<()> {
    let title = Title::SuperMetroid;
    let requirement = Requirement::And(vec![
        Requirement::Single("SMcanShinespark".to_string()),
        Requirement::Single("SMSpeedBooster".to_string()),
        Requirement::Single("SMGravity".to_string()),
    ]);
    let condition = collapse(&requirement, title, &mut world.items);
    let from = world
        .graph
        .expect_vertex_id("SM - Maridia - Main Street - Bottom Door")?;
    let to = world
        .graph
        .expect_vertex_id("SM - Maridia - Main Street - Speed Blocked Item")?;
    world.graph.add_directed(from, to, condition);

    world.add_starting_item("SMf_ZebesAwake", 1);
    Ok(())
}

/// Wires the start vertex into the Zelda overworld, which depends on the
/// shuffled start map rather than the static connector table.
pub fn apply_z1_start(world: &mut World, start_map: u8) -> Result<()> {
    let fixed = world.items.get_or_intern(FIXED_ITEM);
    let start = world.graph.expect_vertex_id(START_VERTEX)?;
    let map_entry = world
        .graph
        .expect_vertex_id(&format!("Z1 - Overworld - Map {start_map:02X} - Left exit"))?;
    let meta = world.graph.expect_vertex_id("Z1 - Overworld - Meta - Meta")?;
    world
        .graph
        .add_directed(start, map_entry, ItemCondition::new(fixed, 1));
    world
        .graph
        .add_directed(start, meta, ItemCondition::new(fixed, 1));
    Ok(())
}

/// Rewrites the Level 9 entrance edge so its triforce count matches the
/// world settings.
pub fn apply_z1_triforce_setting(world: &mut World) -> Result<()> {
    let entrance = world.graph.expect_vertex_id("Z1 - Level 9 - Entrance")?;
    let triforce = world
        .items
        .get("Z1Triforce")
        .context("no Z1Triforce item in the world")?;
    let count = world.settings.z1_triforces;
    let edge = world
        .graph
        .edges_from_mut(entrance)
        .iter_mut()
        .find(|e| e.condition.item == triforce)
        .context("no triforce edge on the Level 9 entrance")?;
    edge.condition.count = count;
    Ok(())
}
