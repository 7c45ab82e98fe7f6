use comborando_game::Capacity;
use comborando_logic::TechPolicy;
use serde::Deserialize;

/// Per-world configuration. Owned by the build (never global), so multiple
/// worlds can be generated concurrently with different settings and no
/// shared mutable state.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorldSettings {
    /// Number of triforce pieces required to enter Level 9.
    pub z1_triforces: Capacity,
    pub tech_policy: TechPolicy,
}

impl Default for WorldSettings {
    fn default() -> Self {
        WorldSettings {
            z1_triforces: 8,
            tech_policy: TechPolicy::default(),
        }
    }
}
