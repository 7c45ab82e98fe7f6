// Evaluation semantics for requirement expressions: the item store and
// inventory, the `evaluate`/`is_unconditional`/`condense` passes, the
// lowering pass that substitutes the per-predicate approximation table, and
// the collapse of a condensed requirement into the solver-facing
// `ItemCondition` form.

use anyhow::{bail, Result};
use comborando_game::{Capacity, Requirement, ResourceCount, Title};
use hashbrown::{HashMap, HashSet};
use serde::Deserialize;

pub type ItemId = usize; // Index into ItemStore.names

/// Ammo is tracked in packs of 5 in-universe; requirements carry raw ammo
/// counts which must be converted.
pub const AMMO_PACK_SIZE: Capacity = 5;
pub const ENERGY_TANK_SIZE: Capacity = 100;

/// Item gating an edge that is always passable.
pub const FIXED_ITEM: &str = "fixed";
/// Item gating an edge that is never passable.
pub const NEVER_ITEM: &str = "never";

fn packs(count: Capacity, pack_size: Capacity) -> Capacity {
    (count + pack_size - 1) / pack_size
}

/// Interned item/flag names. Items are created on first use, so a name lookup
/// during evaluation can legitimately miss (an item nobody can ever hold).
#[derive(Default, Clone, Debug)]
pub struct ItemStore {
    names: Vec<String>,
    index_by_name: HashMap<String, ItemId>,
}

impl ItemStore {
    pub fn get_or_intern(&mut self, name: &str) -> ItemId {
        if let Some(&id) = self.index_by_name.get(name) {
            return id;
        }
        let id = self.names.len();
        self.names.push(name.to_string());
        self.index_by_name.insert(name.to_string(), id);
        id
    }

    pub fn get(&self, name: &str) -> Option<ItemId> {
        self.index_by_name.get(name).copied()
    }

    pub fn name(&self, id: ItemId) -> &str {
        &self.names[id]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// A snapshot of held item counts, indexed by `ItemId`.
#[derive(Default, Clone, Debug)]
pub struct Inventory {
    counts: Vec<Capacity>,
}

impl Inventory {
    pub fn new() -> Self {
        Inventory::default()
    }

    pub fn count(&self, item: ItemId) -> Capacity {
        self.counts.get(item).copied().unwrap_or(0)
    }

    pub fn has(&self, item: ItemId) -> bool {
        self.count(item) >= 1
    }

    pub fn has_at_least(&self, item: ItemId, count: Capacity) -> bool {
        self.count(item) >= count
    }

    pub fn add_item(&mut self, item: ItemId, count: Capacity) {
        if self.counts.len() <= item {
            self.counts.resize(item + 1, 0);
        }
        self.counts[item] += count;
    }
}

/// The set of movement techs the logic is allowed to require. A `Single`
/// leaf naming a tech outside this set condenses to `Never`, disabling every
/// strat gated on it. Passed into the build as configuration so concurrent
/// world builds can use different policies.
#[derive(Clone, Debug, Deserialize)]
#[serde(transparent)]
pub struct TechPolicy {
    allowed: HashSet<String>,
}

impl TechPolicy {
    pub fn from_allowed<I: IntoIterator<Item = S>, S: Into<String>>(allowed: I) -> Self {
        TechPolicy {
            allowed: allowed.into_iter().map(|s| s.into()).collect(),
        }
    }

    pub fn allows(&self, tech_name: &str) -> bool {
        self.allowed.contains(tech_name)
    }
}

impl Default for TechPolicy {
    fn default() -> Self {
        TechPolicy::from_allowed([
            "canMidAirMorph",
            "canUseGrapple",
            "canCrouchJump",
            "canWalljump",
            "canUnmorphBombBoost",
            "canIBJ",
            "canJumpIntoIBJ",
            "canShinespark",
            "canHorizontalShinespark",
            "canMidairShinespark",
            "canShinechargeMovement",
            "canUseSpeedEchoes",
            "canAwakenZebes",
            "canCarefulJump",
            "canDisableEquipment",
            "canDownGrab",
            "canTrivialMidAirMorph",
            "canConsecutiveWalljump",
            "canBombAboveIBJ",
            "canPseudoScrew",
        ])
    }
}

/// Decides pass/fail for a requirement against an inventory snapshot. Pure;
/// `And`/`Or` short-circuit left to right.
///
/// Hazard and room-state predicates that have no physics model here resolve
/// to fixed, documented constants, a known approximation: frame-damage
/// hazards fail (no health is budgeted for them), hit-count hazards and
/// enemy kills pass (treated as avoidable or free), and room-history
/// predicates fail (the solver cannot track in-room history).
pub fn evaluate(req: &Requirement, inventory: &Inventory, items: &ItemStore) -> bool {
    match req {
        Requirement::Always => true,
        Requirement::Never => false,
        Requirement::Single(name) => items.get(name).is_some_and(|id| inventory.has(id)),
        Requirement::And(reqs) => reqs.iter().all(|r| evaluate(r, inventory, items)),
        Requirement::Or(reqs) => reqs.iter().any(|r| evaluate(r, inventory, items)),
        Requirement::Not(r) => !evaluate(r, inventory, items),
        Requirement::Ammo { ammo_type, count } => items
            .get(ammo_type)
            .is_some_and(|id| inventory.has_at_least(id, packs(*count, AMMO_PACK_SIZE))),
        Requirement::AmmoDrain { .. } => true,
        Requirement::Refill(_) => true,
        Requirement::PartialRefill { .. } => true,
        // TODO: check the enemies' vulnerabilities against the held weapons.
        Requirement::EnemyKill { .. } => true,
        Requirement::AcidFrames(_) => false,
        Requirement::GravitylessAcidFrames(_) => false,
        Requirement::DraygonElectricityFrames(_) => true,
        Requirement::EnemyDamage { .. } => true,
        Requirement::HeatFrames(_) => false,
        Requirement::HeatFramesWithEnergyDrops { .. } => false,
        Requirement::GravitylessHeatFrames(_) => false,
        Requirement::HibashiHits(_) => true,
        Requirement::LavaFrames(_) => false,
        Requirement::GravitylessLavaFrames(_) => false,
        Requirement::SamusEaterFrames(_) => true,
        Requirement::MetroidFrames(_) => true,
        Requirement::EnergyAtMost(_) => true,
        Requirement::AutoReserveTrigger { .. } => false,
        Requirement::SpikeHits(_) => true,
        Requirement::ThornHits(_) => true,
        Requirement::DoorUnlockedAtNode(_) => false,
        // Obstacle predicates are rewritten against the fixed obstacle state
        // at build time; one surviving to evaluation is outside any room
        // context and does not gate anything.
        Requirement::ObstaclesCleared(_) => true,
        Requirement::ObstaclesNotCleared(_) => true,
        Requirement::ResourceCapacity(counts) => counts.iter().all(|c| {
            items
                .get(&c.resource)
                .is_some_and(|id| inventory.has_at_least(id, c.count))
        }),
        Requirement::ResourceAvailable(_) => false,
        Requirement::ResourceMissingAtMost(_) => false,
        // The full runway model is not implemented; the one vanilla runway
        // length that matters (33 tiles) passes with the shinespark tech.
        Requirement::CanShineCharge(runway) => {
            if runway.tiles.get() == 33.0 {
                items
                    .get("SMcanShinespark")
                    .is_some_and(|id| inventory.has(id))
            } else {
                false
            }
        }
        Requirement::GetBlueSpeed(_) => false,
        Requirement::SpeedBall(_) => false,
        Requirement::Shinespark { .. } => true,
        Requirement::ResetRoom { .. } => false,
        Requirement::ItemNotCollectedAtNode(_) => false,
        Requirement::GainFlashSuit => true,
        Requirement::UseFlashSuit => false,
        Requirement::NoFlashSuit => true,
        Requirement::Tech(name) => items.get(name).is_some_and(|id| inventory.has(id)),
    }
}

/// True iff the requirement passes against an empty inventory. Computed
/// structurally: `Always` is unconditional, `And`/`Or` propagate, and every
/// other node defaults to conditional.
pub fn is_unconditional(req: &Requirement) -> bool {
    match req {
        Requirement::Always => true,
        Requirement::And(reqs) => reqs.iter().all(is_unconditional),
        Requirement::Or(reqs) => reqs.iter().any(is_unconditional),
        _ => false,
    }
}

/// Constant-folds a requirement into its minimal equivalent form.
///
/// Applied bottom-up: disallowed techs become `Never`, unconditional
/// subtrees become `Always`, and `And`/`Or` nodes fold away constant
/// children. Idempotent, and semantics-preserving for every inventory.
pub fn condense(req: &Requirement, policy: &TechPolicy) -> Requirement {
    if let Requirement::Single(name) = req {
        if let Some(tech_name) = name.strip_prefix("SM") {
            if tech_name.starts_with("can") && !policy.allows(tech_name) {
                return Requirement::Never;
            }
        }
        if name.eq_ignore_ascii_case("smnever") {
            return Requirement::Never;
        }
    }

    if is_unconditional(req) {
        return Requirement::Always;
    }

    if let Requirement::And(reqs) = req {
        let condensed: Vec<Requirement> = reqs.iter().map(|r| condense(r, policy)).collect();
        if condensed.iter().all(|r| matches!(r, Requirement::Always)) {
            return Requirement::Always;
        }
        if condensed.iter().any(|r| matches!(r, Requirement::Never)) {
            return Requirement::Never;
        }
        let mut remaining: Vec<Requirement> = condensed
            .into_iter()
            .filter(|r| !matches!(r, Requirement::Always))
            .collect();
        return match remaining.len() {
            0 => Requirement::Always,
            1 => remaining.pop().unwrap(),
            _ => Requirement::And(remaining),
        };
    }

    if let Requirement::Or(reqs) = req {
        let condensed: Vec<Requirement> = reqs.iter().map(|r| condense(r, policy)).collect();
        if condensed.iter().any(|r| matches!(r, Requirement::Always)) {
            return Requirement::Always;
        }
        if condensed.iter().all(|r| matches!(r, Requirement::Never)) {
            return Requirement::Never;
        }
        let mut remaining: Vec<Requirement> = condensed
            .into_iter()
            .filter(|r| !matches!(r, Requirement::Never))
            .collect();
        // An Or filtered down to nothing is treated as vacuously satisfied.
        return match remaining.len() {
            0 => Requirement::Always,
            1 => remaining.pop().unwrap(),
            _ => Requirement::Or(remaining),
        };
    }

    req.clone()
}

/// Resolves a parsed requirement into its solver form for one title:
/// item and tech names gain the title tag, raw resource amounts become
/// pack/tank counts, and predicates without a physics model are substituted
/// per the fixed approximation table (heat needs the heat suit, lava needs
/// both suits, blue-speed tricks and flash-suit consumption are off).
pub fn lower(req: &Requirement, title: Title) -> Result<Requirement> {
    let tag = title.tag();
    let lowered = match req {
        Requirement::Single(name) => Requirement::Single(format!("{tag}{name}")),
        Requirement::Tech(name) => Requirement::Single(format!("{tag}{name}")),
        Requirement::And(reqs) => match reqs.len() {
            0 => Requirement::Always,
            1 => lower(&reqs[0], title)?,
            _ => Requirement::And(
                reqs.iter()
                    .map(|r| lower(r, title))
                    .collect::<Result<Vec<Requirement>>>()?,
            ),
        },
        Requirement::Or(reqs) => match reqs.len() {
            0 => Requirement::Always,
            1 => lower(&reqs[0], title)?,
            _ => Requirement::Or(
                reqs.iter()
                    .map(|r| lower(r, title))
                    .collect::<Result<Vec<Requirement>>>()?,
            ),
        },
        Requirement::Not(r) => Requirement::Not(Box::new(lower(r, title)?)),
        Requirement::Ammo { ammo_type, count } => Requirement::Ammo {
            ammo_type: format!("{tag}{ammo_type}"),
            count: *count,
        },
        Requirement::HeatFrames(_)
        | Requirement::HeatFramesWithEnergyDrops { .. }
        | Requirement::GravitylessHeatFrames(_) => Requirement::Single(format!("{tag}Varia")),
        Requirement::LavaFrames(_) => Requirement::And(vec![
            Requirement::Single(format!("{tag}Gravity")),
            Requirement::Single(format!("{tag}Varia")),
        ]),
        Requirement::GetBlueSpeed(_)
        | Requirement::SpeedBall(_)
        | Requirement::ResourceAvailable(_)
        | Requirement::ResourceMissingAtMost(_)
        | Requirement::UseFlashSuit => Requirement::Never,
        Requirement::GainFlashSuit | Requirement::NoFlashSuit => Requirement::Always,
        Requirement::ResourceCapacity(counts) => {
            let mut resolved: Vec<ResourceCount> = Vec::new();
            for c in counts {
                let (item_name, count) = match c.resource.as_str() {
                    "Missile" => (format!("{tag}Missile"), packs(c.count, AMMO_PACK_SIZE)),
                    "Super" => (format!("{tag}Super"), packs(c.count, AMMO_PACK_SIZE)),
                    "PowerBomb" => (format!("{tag}PowerBomb"), packs(c.count, AMMO_PACK_SIZE)),
                    "RegularEnergy" => (format!("{tag}ETank"), packs(c.count, ENERGY_TANK_SIZE)),
                    "ReserveEnergy" => (
                        format!("{tag}ReserveTank"),
                        packs(c.count, ENERGY_TANK_SIZE),
                    ),
                    _ => bail!("unrecognized resource type: {}", c.resource),
                };
                resolved.push(ResourceCount {
                    resource: item_name,
                    count,
                });
            }
            Requirement::ResourceCapacity(resolved)
        }
        _ => req.clone(),
    };
    Ok(lowered)
}

/// The solver-facing edge requirement: an item reference plus a minimum
/// count. Requirements that do not reduce to a single item are carried
/// behind the title's complex-requirement sentinel item with the condensed
/// AST attached as payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ItemCondition {
    pub item: ItemId,
    pub count: Capacity,
    pub complex: Option<Requirement>,
}

impl ItemCondition {
    pub fn new(item: ItemId, count: Capacity) -> Self {
        ItemCondition {
            item,
            count,
            complex: None,
        }
    }
}

/// Collapses a condensed requirement to the lightweight `ItemCondition`
/// form the solver consumes for O(1) checks.
pub fn collapse(req: &Requirement, title: Title, items: &mut ItemStore) -> ItemCondition {
    match req {
        Requirement::Always => ItemCondition::new(items.get_or_intern(FIXED_ITEM), 1),
        Requirement::Never => ItemCondition::new(items.get_or_intern(NEVER_ITEM), 1),
        Requirement::Single(name) => ItemCondition::new(items.get_or_intern(name), 1),
        Requirement::Ammo { ammo_type, count } => ItemCondition::new(
            items.get_or_intern(ammo_type),
            packs(*count, AMMO_PACK_SIZE),
        ),
        _ => {
            let sentinel = items.get_or_intern(&format!("{}ComplexRequirement", title.tag()));
            ItemCondition {
                item: sentinel,
                count: 1,
                complex: Some(req.clone()),
            }
        }
    }
}
