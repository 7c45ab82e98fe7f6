use anyhow::{Context, Result};
use clap::Parser;
use comborando::region::RegionBuilder;
use comborando::settings::WorldSettings;
use comborando::stitch::{add_sm_meta, add_title_graph, apply_connectors, apply_sm_patches};
use comborando::world::World;
use comborando_game::{load_connections, load_helpers, load_rooms, load_tech, Title};
use log::info;
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    /// Path to the structural data directory (containing region/,
    /// connection/, tech.json and helpers.json).
    #[arg(long)]
    sm_data: PathBuf,

    /// Optional JSON world settings file.
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn load_settings(args: &Args) -> Result<WorldSettings> {
    match &args.settings {
        Some(path) => {
            let settings_str = std::fs::read_to_string(path)
                .with_context(|| format!("unable to read settings at {}", path.display()))?;
            serde_json::from_str(&settings_str)
                .with_context(|| format!("unable to parse settings at {}", path.display()))
        }
        None => Ok(WorldSettings::default()),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
    let args = Args::parse();
    let settings = load_settings(&args)?;

    let rooms = load_rooms(&args.sm_data.join("region"))?;
    let connections = load_connections(&args.sm_data.join("connection"))?;
    let techs = load_tech(&args.sm_data.join("tech.json"))?;
    let helpers = load_helpers(&args.sm_data.join("helpers.json"))?;
    info!("loaded {} rooms, {} connections", rooms.len(), connections.len());

    let title_graph = RegionBuilder::new().build(&rooms, &connections)?;
    info!(
        "built {} vertices, {} edge groups",
        title_graph.vertices.len(),
        title_graph.edge_groups.len()
    );

    let mut world = World::new(settings);
    add_title_graph(&mut world, Title::SuperMetroid, &title_graph)?;
    add_sm_meta(&mut world, &techs, &helpers)?;
    apply_sm_patches(&mut world)?;
    apply_connectors(&mut world, &[Title::SuperMetroid])?;

    info!(
        "world graph: {} vertices, {} edges, {} items",
        world.graph.num_vertices(),
        world.graph.num_edges(),
        world.items.len()
    );
    Ok(())
}
