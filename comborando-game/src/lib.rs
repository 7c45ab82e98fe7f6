// Structural data model for the combo logic-graph compiler: the requirement
// AST and its parser, plus the per-title room/node/link/strat records that the
// graph builder consumes. File decoding is kept thin here; anything beyond
// shape-checking the JSON is the loader's problem.

use anyhow::{bail, ensure, Context, Result};
use json::{self, JsonValue};
use log::error;
use std::fmt::{self, Debug, Formatter};
use std::fs::File;
use std::path::Path;
use strum_macros::{Display, EnumString};

pub type RoomId = usize; // Room ID from the structural data
pub type NodeId = usize; // Node ID from the structural data (only unique within a room)
pub type Capacity = i32; // Data type used to represent quantities of energy, ammo, etc.

/// Title whose world data feeds the combined graph. The tag doubles as the
/// item-name prefix and, with `" - "` appended, as the vertex namespace.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString)]
pub enum Title {
    #[strum(serialize = "M1")]
    Metroid,
    #[strum(serialize = "SM")]
    SuperMetroid,
    #[strum(serialize = "Z1")]
    Zelda,
}

impl Title {
    pub fn tag(self) -> &'static str {
        match self {
            Title::Metroid => "M1",
            Title::SuperMetroid => "SM",
            Title::Zelda => "Z1",
        }
    }

    /// Vertex namespace prefix, e.g. `"SM - "`.
    pub fn prefix(self) -> String {
        format!("{} - ", self.tag())
    }
}

/// Wrapper on f32 to make it hashable, e.g. for use in requirements that key
/// the builder's edge-group map.
#[derive(Copy, Clone, PartialEq, Eq, Hash)]
pub struct Float {
    data: u32,
}

impl Float {
    pub fn new(x: f32) -> Self {
        Float { data: x.to_bits() }
    }

    pub fn get(self) -> f32 {
        f32::from_bits(self.data)
    }
}

impl Debug for Float {
    fn fmt(&self, f: &mut Formatter) -> Result<(), fmt::Error> {
        write!(f, "Float({})", self.get())
    }
}

/// A resource type paired with a raw in-game amount (e.g. 15 missiles, 300
/// energy). Raw amounts are converted to pack/tank counts by the lowering
/// pass in the logic crate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ResourceCount {
    pub resource: String,
    pub count: Capacity,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct EnemyDrop {
    pub enemy: String,
    pub count: Capacity,
}

/// Runway geometry shared by the shine-charge family of requirements and by
/// entrance/exit conditions. `tiles` is "usedTiles" or "length" depending on
/// the predicate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RunwayGeometry {
    pub tiles: Float,
    pub open_end: Float,
    pub gentle_up_tiles: Option<Float>,
    pub gentle_down_tiles: Option<Float>,
    pub steep_up_tiles: Option<Float>,
    pub steep_down_tiles: Option<Float>,
    pub starting_down_tiles: Option<Float>,
}

impl RunwayGeometry {
    fn parse(value: &JsonValue, tiles_key: &str) -> Result<Self> {
        Ok(RunwayGeometry {
            tiles: req_float(value, tiles_key)?,
            open_end: req_float(value, "openEnd")?,
            gentle_up_tiles: opt_float(value, "gentleUpTiles"),
            gentle_down_tiles: opt_float(value, "gentleDownTiles"),
            steep_up_tiles: opt_float(value, "steepUpTiles"),
            steep_down_tiles: opt_float(value, "steepDownTiles"),
            starting_down_tiles: opt_float(value, "startingDownTiles"),
        })
    }
}

/// Requirement expression tree gating an edge in the logic graph.
///
/// This is a single closed set of variants: an unrecognized predicate tag is a
/// hard parse error. The same type carries a requirement from parse time
/// through lowering and condensing; leaves hold item/tech names as strings
/// until the edge-emission boundary interns them into the world's item store.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Requirement {
    Always,
    Never,
    Single(String),
    And(Vec<Requirement>),
    Or(Vec<Requirement>),
    Not(Box<Requirement>),
    Ammo {
        ammo_type: String,
        count: Capacity,
    },
    AmmoDrain {
        ammo_type: String,
        count: Capacity,
    },
    Refill(Vec<String>),
    PartialRefill {
        resource: String,
        limit: Capacity,
    },
    EnemyKill {
        enemies: Vec<Vec<String>>,
        explicit_weapons: Option<Vec<String>>,
        excluded_weapons: Option<Vec<String>>,
        farmable_ammo: Option<Vec<String>>,
    },
    AcidFrames(Capacity),
    GravitylessAcidFrames(Capacity),
    DraygonElectricityFrames(Capacity),
    EnemyDamage {
        enemy: String,
        attack: String,
        hits: Capacity,
    },
    HeatFrames(Capacity),
    HeatFramesWithEnergyDrops {
        frames: Capacity,
        drops: Vec<EnemyDrop>,
    },
    GravitylessHeatFrames(Capacity),
    HibashiHits(Capacity),
    LavaFrames(Capacity),
    GravitylessLavaFrames(Capacity),
    SamusEaterFrames(Capacity),
    MetroidFrames(Capacity),
    EnergyAtMost(Capacity),
    AutoReserveTrigger {
        min_reserve_energy: Capacity,
        max_reserve_energy: Capacity,
    },
    SpikeHits(Capacity),
    ThornHits(Capacity),
    DoorUnlockedAtNode(NodeId),
    ObstaclesCleared(Vec<String>),
    ObstaclesNotCleared(Vec<String>),
    ResourceCapacity(Vec<ResourceCount>),
    ResourceAvailable(Vec<ResourceCount>),
    ResourceMissingAtMost(Vec<ResourceCount>),
    CanShineCharge(RunwayGeometry),
    GetBlueSpeed(RunwayGeometry),
    SpeedBall(RunwayGeometry),
    Shinespark {
        frames: Capacity,
        excess_frames: Option<Capacity>,
    },
    ResetRoom {
        nodes: Vec<NodeId>,
        nodes_to_avoid: Option<Vec<NodeId>>,
        must_stay_put: Option<bool>,
    },
    ItemNotCollectedAtNode(NodeId),
    GainFlashSuit,
    UseFlashSuit,
    NoFlashSuit,
    Tech(String),
}

impl Requirement {
    /// Parses the external declarative form: a bare string is a single item
    /// or tech reference, an array is a conjunction, and a single-key object
    /// selects one of the predicate kinds.
    pub fn parse(req_json: &JsonValue) -> Result<Requirement> {
        if req_json.is_string() {
            return Ok(Requirement::Single(req_json.as_str().unwrap().to_string()));
        }
        if req_json.is_array() {
            return Ok(Requirement::And(Self::parse_list(req_json)?));
        }
        if req_json.is_object() && req_json.len() == 1 {
            let (key, value) = req_json.entries().next().unwrap();
            return Self::parse_tagged(key, value, req_json);
        }
        bail!("unable to parse requirement: {}", req_json);
    }

    /// Parses an array of requirements (e.g. a `requires` list).
    pub fn parse_list(json_value: &JsonValue) -> Result<Vec<Requirement>> {
        ensure!(
            json_value.is_array(),
            "expected requirement list, got: {}",
            json_value
        );
        let mut reqs: Vec<Requirement> = Vec::new();
        for req_json in json_value.members() {
            reqs.push(
                Self::parse(req_json)
                    .with_context(|| format!("processing requirement {req_json}"))?,
            );
        }
        Ok(reqs)
    }

    /// Parses a `requires` list into a single conjunction node.
    pub fn parse_requires(json_value: &JsonValue) -> Result<Requirement> {
        if json_value.is_null() {
            return Ok(Requirement::And(vec![]));
        }
        Ok(Requirement::And(Self::parse_list(json_value)?))
    }

    fn parse_tagged(key: &str, value: &JsonValue, ctx: &JsonValue) -> Result<Requirement> {
        let req = match key {
            "always" => Requirement::Always,
            "never" => Requirement::Never,
            "and" => Requirement::And(Self::parse_list(value)?),
            "or" => Requirement::Or(Self::parse_list(value)?),
            "not" => Requirement::Not(Box::new(Self::parse(value)?)),
            "ammo" => Requirement::Ammo {
                ammo_type: req_str(value, "type", ctx)?,
                count: req_i32(value, "count", ctx)?,
            },
            "ammoDrain" => Requirement::AmmoDrain {
                ammo_type: req_str(value, "type", ctx)?,
                count: req_i32(value, "count", ctx)?,
            },
            "refill" => Requirement::Refill(str_list(value)?),
            "partialRefill" => Requirement::PartialRefill {
                resource: req_str(value, "type", ctx)?,
                limit: req_i32(value, "limit", ctx)?,
            },
            "enemyKill" => {
                ensure!(value["enemies"].is_array());
                let mut enemies: Vec<Vec<String>> = Vec::new();
                for group in value["enemies"].members() {
                    enemies.push(str_list(group)?);
                }
                Requirement::EnemyKill {
                    enemies,
                    explicit_weapons: opt_str_list(value, "explicitWeapons")?,
                    excluded_weapons: opt_str_list(value, "excludedWeapons")?,
                    farmable_ammo: opt_str_list(value, "farmableAmmo")?,
                }
            }
            "acidFrames" => Requirement::AcidFrames(self_i32(value, ctx)?),
            "gravitylessAcidFrames" => Requirement::GravitylessAcidFrames(self_i32(value, ctx)?),
            "draygonElectricityFrames" => {
                Requirement::DraygonElectricityFrames(self_i32(value, ctx)?)
            }
            "enemyDamage" => Requirement::EnemyDamage {
                enemy: req_str(value, "enemy", ctx)?,
                attack: req_str(value, "type", ctx)?,
                hits: req_i32(value, "hits", ctx)?,
            },
            "heatFrames" => Requirement::HeatFrames(self_i32(value, ctx)?),
            "heatFramesWithEnergyDrops" => {
                ensure!(value["drops"].is_array());
                let mut drops: Vec<EnemyDrop> = Vec::new();
                for drop in value["drops"].members() {
                    drops.push(EnemyDrop {
                        enemy: req_str(drop, "enemy", ctx)?,
                        count: req_i32(drop, "count", ctx)?,
                    });
                }
                Requirement::HeatFramesWithEnergyDrops {
                    frames: req_i32(value, "frames", ctx)?,
                    drops,
                }
            }
            "gravitylessHeatFrames" => Requirement::GravitylessHeatFrames(self_i32(value, ctx)?),
            "hibashiHits" => Requirement::HibashiHits(self_i32(value, ctx)?),
            "lavaFrames" => Requirement::LavaFrames(self_i32(value, ctx)?),
            "gravitylessLavaFrames" => Requirement::GravitylessLavaFrames(self_i32(value, ctx)?),
            "samusEaterFrames" => Requirement::SamusEaterFrames(self_i32(value, ctx)?),
            "metroidFrames" => Requirement::MetroidFrames(self_i32(value, ctx)?),
            "energyAtMost" => Requirement::EnergyAtMost(self_i32(value, ctx)?),
            "autoReserveTrigger" => Requirement::AutoReserveTrigger {
                min_reserve_energy: value["minReserveEnergy"].as_i32().unwrap_or(1),
                max_reserve_energy: value["maxReserveEnergy"].as_i32().unwrap_or(400),
            },
            "spikeHits" => Requirement::SpikeHits(self_i32(value, ctx)?),
            "thornHits" => Requirement::ThornHits(self_i32(value, ctx)?),
            "doorUnlockedAtNode" => Requirement::DoorUnlockedAtNode(self_usize(value, ctx)?),
            "obstaclesCleared" => Requirement::ObstaclesCleared(str_list(value)?),
            "obstaclesNotCleared" => Requirement::ObstaclesNotCleared(str_list(value)?),
            "resourceCapacity" => Requirement::ResourceCapacity(resource_list(value, ctx)?),
            "resourceAvailable" => Requirement::ResourceAvailable(resource_list(value, ctx)?),
            "resourceMissingAtMost" => {
                Requirement::ResourceMissingAtMost(resource_list(value, ctx)?)
            }
            "canShineCharge" => {
                Requirement::CanShineCharge(RunwayGeometry::parse(value, "usedTiles")?)
            }
            "getBlueSpeed" => Requirement::GetBlueSpeed(RunwayGeometry::parse(value, "usedTiles")?),
            "speedBall" => Requirement::SpeedBall(RunwayGeometry::parse(value, "length")?),
            "shinespark" => Requirement::Shinespark {
                frames: req_i32(value, "frames", ctx)?,
                excess_frames: value["excessFrames"].as_i32(),
            },
            "resetRoom" => Requirement::ResetRoom {
                nodes: usize_list(&value["nodes"], ctx)?,
                nodes_to_avoid: if value["nodesToAvoid"].is_array() {
                    Some(usize_list(&value["nodesToAvoid"], ctx)?)
                } else {
                    None
                },
                must_stay_put: value["mustStayPut"].as_bool(),
            },
            "itemNotCollectedAtNode" => Requirement::ItemNotCollectedAtNode(self_usize(value, ctx)?),
            "gainFlashSuit" => Requirement::GainFlashSuit,
            "useFlashSuit" => Requirement::UseFlashSuit,
            "noFlashSuit" => Requirement::NoFlashSuit,
            "tech" => Requirement::Tech(
                value
                    .as_str()
                    .with_context(|| format!("missing/invalid tech name in {ctx}"))?
                    .to_string(),
            ),
            _ => bail!("unrecognized requirement: {key}"),
        };
        Ok(req)
    }

    /// Rewrites obstacle-state predicates against a fixed set of cleared
    /// obstacle ids, so that downstream condensing can fold them away.
    pub fn adjust_obstacle_state(&self, cleared: &[&str]) -> Requirement {
        match self {
            Requirement::ObstaclesCleared(obstacles) => {
                if obstacles.iter().all(|o| cleared.contains(&o.as_str())) {
                    Requirement::Always
                } else {
                    Requirement::Never
                }
            }
            Requirement::ObstaclesNotCleared(obstacles) => {
                if obstacles.iter().any(|o| cleared.contains(&o.as_str())) {
                    Requirement::Never
                } else {
                    Requirement::Always
                }
            }
            Requirement::And(reqs) => Requirement::And(
                reqs.iter()
                    .map(|r| r.adjust_obstacle_state(cleared))
                    .collect(),
            ),
            Requirement::Or(reqs) => Requirement::Or(
                reqs.iter()
                    .map(|r| r.adjust_obstacle_state(cleared))
                    .collect(),
            ),
            _ => self.clone(),
        }
    }

    /// True for an empty conjunction, the parse result of an absent or empty
    /// `requires` list.
    pub fn is_vacuous(&self) -> bool {
        matches!(self, Requirement::And(reqs) if reqs.is_empty())
    }
}

/// How a strat expects to enter the room. Only the plain movement kinds are
/// supported by the graph builder; strats carrying any other kind are skipped
/// (see `is_supported`). The variant set itself is closed: an unrecognized
/// tag is a parse error.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EntranceCondition {
    ComeInNormally,
    ComeInRunning {
        speed_booster: String,
        min_tiles: Float,
        max_tiles: Option<Float>,
    },
    ComeInJumping {
        speed_booster: String,
        min_tiles: Float,
        max_tiles: Option<Float>,
    },
    ComeInSpaceJumping {
        speed_booster: String,
        min_tiles: Float,
        max_tiles: Option<Float>,
    },
    ComeInShineCharging(RunwayGeometry),
    ComeInGettingBlueSpeed {
        runway: RunwayGeometry,
        min_extra_run_speed: Option<String>,
        max_extra_run_speed: Option<String>,
    },
    ComeInShineCharged {
        frames_required: Capacity,
    },
    ComeInShineChargedJumping {
        frames_required: Capacity,
    },
    ComeInWithSpark {
        position: Option<String>,
    },
    ComeInStutterShineCharging {
        min_tiles: Float,
    },
    ComeInWithBombBoost,
    ComeInWithDoorStuckSetup,
    ComeInSpeedballing {
        runway: RunwayGeometry,
    },
    ComeInWithTemporaryBlue,
    ComeInBlueSpinning {
        min_extra_run_speed: Option<String>,
        max_extra_run_speed: Option<String>,
        unusable_tiles: Float,
    },
    ComeInWithMockball {
        adjacent_min_tiles: Option<Float>,
        remote_and_landing_min_tiles: Option<Vec<Vec<Float>>>,
    },
    ComeInWithSpringBallBounce {
        movement_type: String,
        adjacent_min_tiles: Option<Float>,
        remote_and_landing_min_tiles: Option<Vec<Vec<Float>>>,
    },
    ComeInWithBlueSpringBallBounce {
        movement_type: String,
        min_extra_run_speed: Option<String>,
        max_extra_run_speed: Option<String>,
        min_landing_tiles: Option<Float>,
    },
    ComeInWithStoredFallSpeed {
        fall_speed_in_tiles: Capacity,
    },
    ComeInWithRMode,
    ComeInWithGMode {
        mode: String,
        morphed: bool,
        mobility: Option<String>,
    },
    ComeInWithWallJumpBelow {
        min_height: Capacity,
    },
    ComeInWithSpaceJumpBelow,
    ComeInWithPlatformBelow {
        min_height: Option<Float>,
        max_height: Option<Float>,
        max_left_position: Option<Float>,
        min_right_position: Option<Float>,
    },
    ComeInWithGrappleTeleport {
        block_positions: Vec<(Capacity, Capacity)>,
    },
    ComesThroughToilet(String),
}

impl EntranceCondition {
    pub fn parse(json_value: &JsonValue) -> Result<EntranceCondition> {
        ensure!(
            json_value.is_object() && json_value.len() >= 1,
            "unable to parse entrance condition: {}",
            json_value
        );
        let (key, value) = json_value.entries().next().unwrap();
        let ec = match key {
            "comeInNormally" => EntranceCondition::ComeInNormally,
            "comeInRunning" => EntranceCondition::ComeInRunning {
                speed_booster: value["speedBooster"].to_string(),
                min_tiles: req_float(value, "minTiles")?,
                max_tiles: opt_float(value, "maxTiles"),
            },
            "comeInJumping" => EntranceCondition::ComeInJumping {
                speed_booster: value["speedBooster"].to_string(),
                min_tiles: req_float(value, "minTiles")?,
                max_tiles: opt_float(value, "maxTiles"),
            },
            "comeInSpaceJumping" => EntranceCondition::ComeInSpaceJumping {
                speed_booster: value["speedBooster"].to_string(),
                min_tiles: req_float(value, "minTiles")?,
                max_tiles: opt_float(value, "maxTiles"),
            },
            "comeInShinecharging" => {
                EntranceCondition::ComeInShineCharging(RunwayGeometry::parse(value, "length")?)
            }
            "comeInGettingBlueSpeed" => EntranceCondition::ComeInGettingBlueSpeed {
                runway: RunwayGeometry::parse(value, "length")?,
                min_extra_run_speed: opt_str(value, "minExtraRunSpeed"),
                max_extra_run_speed: opt_str(value, "maxExtraRunSpeed"),
            },
            "comeInShinecharged" => EntranceCondition::ComeInShineCharged {
                frames_required: req_i32(value, "framesRequired", json_value)?,
            },
            "comeInShinechargedJumping" => EntranceCondition::ComeInShineChargedJumping {
                frames_required: req_i32(value, "framesRequired", json_value)?,
            },
            "comeInWithSpark" => EntranceCondition::ComeInWithSpark {
                position: opt_str(value, "position"),
            },
            "comeInStutterShinecharging" => EntranceCondition::ComeInStutterShineCharging {
                min_tiles: req_float(value, "minTiles")?,
            },
            "comeInWithBombBoost" => EntranceCondition::ComeInWithBombBoost,
            "comeInWithDoorStuckSetup" => EntranceCondition::ComeInWithDoorStuckSetup,
            "comeInSpeedballing" => EntranceCondition::ComeInSpeedballing {
                runway: RunwayGeometry::parse(&value["runway"], "length")?,
            },
            "comeInWithTemporaryBlue" => EntranceCondition::ComeInWithTemporaryBlue,
            "comeInBlueSpinning" => EntranceCondition::ComeInBlueSpinning {
                min_extra_run_speed: opt_str(value, "minExtraRunSpeed"),
                max_extra_run_speed: opt_str(value, "maxExtraRunSpeed"),
                unusable_tiles: req_float(value, "unusableTiles")?,
            },
            "comeInWithMockball" => EntranceCondition::ComeInWithMockball {
                adjacent_min_tiles: opt_float(value, "adjacentMinTiles"),
                remote_and_landing_min_tiles: opt_float_grid(value, "remoteAndLandingMinTiles"),
            },
            "comeInWithSpringBallBounce" => EntranceCondition::ComeInWithSpringBallBounce {
                movement_type: value["movementType"].as_str().unwrap_or("").to_string(),
                adjacent_min_tiles: opt_float(value, "adjacentMinTiles"),
                remote_and_landing_min_tiles: opt_float_grid(value, "remoteAndLandingMinTiles"),
            },
            "comeInWithBlueSpringBallBounce" => EntranceCondition::ComeInWithBlueSpringBallBounce {
                movement_type: value["movementType"].as_str().unwrap_or("").to_string(),
                min_extra_run_speed: opt_str(value, "minExtraRunSpeed"),
                max_extra_run_speed: opt_str(value, "maxExtraRunSpeed"),
                min_landing_tiles: opt_float(value, "minLandingTiles"),
            },
            "comeInWithStoredFallSpeed" => EntranceCondition::ComeInWithStoredFallSpeed {
                fall_speed_in_tiles: req_i32(value, "fallSpeedInTiles", json_value)?,
            },
            "comeInWithRMode" => EntranceCondition::ComeInWithRMode,
            "comeInWithGMode" => EntranceCondition::ComeInWithGMode {
                mode: req_str(value, "mode", json_value)?,
                morphed: value["morphed"]
                    .as_bool()
                    .with_context(|| format!("missing morphed in {json_value}"))?,
                mobility: opt_str(value, "mobility"),
            },
            "comeInWithWallJumpBelow" => EntranceCondition::ComeInWithWallJumpBelow {
                min_height: req_i32(value, "minHeight", json_value)?,
            },
            "comeInWithSpaceJumpBelow" => EntranceCondition::ComeInWithSpaceJumpBelow,
            "comeInWithPlatformBelow" => EntranceCondition::ComeInWithPlatformBelow {
                min_height: opt_float(value, "minHeight"),
                max_height: opt_float(value, "maxHeight"),
                max_left_position: opt_float(value, "maxLeftPosition"),
                min_right_position: opt_float(value, "minRightPosition"),
            },
            "comeInWithGrappleTeleport" => EntranceCondition::ComeInWithGrappleTeleport {
                block_positions: block_positions(&value["blockPositions"], json_value)?,
            },
            "comesThroughToilet" => {
                EntranceCondition::ComesThroughToilet(value.as_str().unwrap_or("").to_string())
            }
            _ => bail!("unrecognized entrance condition: {key}"),
        };
        Ok(ec)
    }

    /// The single enumeration of entrance kinds the graph builder handles.
    /// A strat whose entrance condition is anything else is deliberately
    /// omitted from the graph rather than raising.
    pub fn is_supported(&self) -> bool {
        matches!(
            self,
            EntranceCondition::ComeInNormally
                | EntranceCondition::ComeInRunning { .. }
                | EntranceCondition::ComeInJumping { .. }
        )
    }
}

/// How a strat leaves the room. Carried in the structural model; the graph
/// builder does not act on these yet.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ExitCondition {
    LeaveNormally,
    LeaveWithRunway(RunwayGeometry),
    LeaveShineCharged {
        frames_remaining: Capacity,
    },
    LeaveWithTemporaryBlue {
        direction: Option<String>,
    },
    LeaveWithSpark {
        position: Option<String>,
    },
    LeaveSpinning {
        remote_runway: RunwayGeometry,
        min_extra_run_speed: Option<String>,
        max_extra_run_speed: Option<String>,
        blue: Option<String>,
    },
    LeaveWithMockball {
        remote_runway: RunwayGeometry,
        landing_runway: RunwayGeometry,
        min_extra_run_speed: Option<String>,
        max_extra_run_speed: Option<String>,
        blue: Option<String>,
    },
    LeaveWithSpringBallBounce {
        remote_runway: RunwayGeometry,
        landing_runway: RunwayGeometry,
        min_extra_run_speed: Option<String>,
        max_extra_run_speed: Option<String>,
        blue: Option<String>,
        movement_type: String,
    },
    LeaveSpaceJumping {
        remote_runway: RunwayGeometry,
        min_extra_run_speed: Option<String>,
        max_extra_run_speed: Option<String>,
        blue: Option<String>,
    },
    LeaveWithStoredFallSpeed {
        fall_speed_in_tiles: Capacity,
    },
    LeaveWithGModeSetup {
        knockback: bool,
    },
    LeaveWithGMode {
        morphed: bool,
    },
    LeaveWithDoorFrameBelow {
        height: Float,
    },
    LeaveWithPlatformBelow {
        height: Float,
        left_position: Float,
        right_position: Float,
    },
    LeaveWithGrappleTeleport {
        block_positions: Vec<(Capacity, Capacity)>,
    },
}

impl ExitCondition {
    pub fn parse(json_value: &JsonValue) -> Result<ExitCondition> {
        ensure!(
            json_value.is_object() && json_value.len() >= 1,
            "unable to parse exit condition: {}",
            json_value
        );
        let (key, value) = json_value.entries().next().unwrap();
        let ec = match key {
            "leaveNormally" => ExitCondition::LeaveNormally,
            "leaveWithRunway" => {
                ExitCondition::LeaveWithRunway(RunwayGeometry::parse(value, "length")?)
            }
            "leaveShinecharged" => {
                // "framesRemaining" is either a frame count or the string
                // "auto", which we encode as -1.
                let frames_json = &value["framesRemaining"];
                let frames_remaining = if let Some(frames) = frames_json.as_i32() {
                    frames
                } else if frames_json.as_str() == Some("auto") {
                    -1
                } else {
                    bail!("unknown shinecharged exit condition: {}", frames_json);
                };
                ExitCondition::LeaveShineCharged { frames_remaining }
            }
            "leaveWithTemporaryBlue" => ExitCondition::LeaveWithTemporaryBlue {
                direction: opt_str(value, "direction"),
            },
            "leaveWithSpark" => ExitCondition::LeaveWithSpark {
                position: opt_str(value, "position"),
            },
            "leaveSpinning" => ExitCondition::LeaveSpinning {
                remote_runway: RunwayGeometry::parse(&value["remoteRunway"], "length")?,
                min_extra_run_speed: opt_str(value, "minExtraRunSpeed"),
                max_extra_run_speed: opt_str(value, "maxExtraRunSpeed"),
                blue: opt_str(value, "blue"),
            },
            "leaveWithMockball" => ExitCondition::LeaveWithMockball {
                remote_runway: RunwayGeometry::parse(&value["remoteRunway"], "length")?,
                landing_runway: RunwayGeometry::parse(&value["landingRunway"], "length")?,
                min_extra_run_speed: opt_str(value, "minExtraRunSpeed"),
                max_extra_run_speed: opt_str(value, "maxExtraRunSpeed"),
                blue: opt_str(value, "blue"),
            },
            "leaveWithSpringBallBounce" => ExitCondition::LeaveWithSpringBallBounce {
                remote_runway: RunwayGeometry::parse(&value["remoteRunway"], "length")?,
                landing_runway: RunwayGeometry::parse(&value["landingRunway"], "length")?,
                min_extra_run_speed: opt_str(value, "minExtraRunSpeed"),
                max_extra_run_speed: opt_str(value, "maxExtraRunSpeed"),
                blue: opt_str(value, "blue"),
                movement_type: value["movementType"].as_str().unwrap_or("").to_string(),
            },
            "leaveSpaceJumping" => ExitCondition::LeaveSpaceJumping {
                remote_runway: RunwayGeometry::parse(&value["remoteRunway"], "length")?,
                min_extra_run_speed: opt_str(value, "minExtraRunSpeed"),
                max_extra_run_speed: opt_str(value, "maxExtraRunSpeed"),
                blue: opt_str(value, "blue"),
            },
            "leaveWithStoredFallSpeed" => ExitCondition::LeaveWithStoredFallSpeed {
                fall_speed_in_tiles: req_i32(value, "fallSpeedInTiles", json_value)?,
            },
            "leaveWithGModeSetup" => ExitCondition::LeaveWithGModeSetup {
                knockback: value["knockback"].as_bool().unwrap_or(true),
            },
            "leaveWithGMode" => ExitCondition::LeaveWithGMode {
                morphed: value["morphed"]
                    .as_bool()
                    .with_context(|| format!("missing morphed in {json_value}"))?,
            },
            "leaveWithDoorFrameBelow" => ExitCondition::LeaveWithDoorFrameBelow {
                height: req_float(value, "height")?,
            },
            "leaveWithPlatformBelow" => ExitCondition::LeaveWithPlatformBelow {
                height: req_float(value, "height")?,
                left_position: req_float(value, "leftPosition")?,
                right_position: req_float(value, "rightPosition")?,
            },
            "leaveWithGrappleTeleport" => ExitCondition::LeaveWithGrappleTeleport {
                block_positions: block_positions(&value["blockPositions"], json_value)?,
            },
            _ => bail!("unrecognized exit condition: {key}"),
        };
        Ok(ec)
    }
}

#[derive(Clone, Debug)]
pub struct Obstacle {
    pub id: String,
    pub name: String,
    pub obstacle_type: Option<String>,
}

#[derive(Clone, Debug)]
pub struct NodeLock {
    pub name: String,
    pub lock_type: String,
    pub lock: Option<Requirement>,
    pub unlock_strats: Vec<Strat>,
    pub yields: Option<Vec<String>>,
}

#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub node_type: String,
    pub node_sub_type: String,
    pub node_address: Option<String>,
    pub locks: Option<Vec<NodeLock>>,
    pub yields: Option<Vec<String>>,
}

#[derive(Clone, Debug)]
pub struct LinkTo {
    pub id: NodeId,
}

#[derive(Clone, Debug)]
pub struct Link {
    pub from: NodeId,
    pub to: Vec<LinkTo>,
}

/// One way of traversing a link, with its own requirement and obstacle side
/// effects.
#[derive(Clone, Debug)]
pub struct Strat {
    pub link: (NodeId, NodeId),
    pub name: String,
    pub notable: Option<bool>,
    pub requires: Requirement,
    pub entrance_condition: Option<EntranceCondition>,
    pub exit_condition: Option<ExitCondition>,
    pub clears_obstacles: Option<Vec<String>>,
    pub resets_obstacles: Option<Vec<String>>,
}

#[derive(Clone, Debug)]
pub struct Room {
    pub id: RoomId,
    pub name: String,
    pub area: String,
    pub sub_area: Option<String>,
    pub nodes: Vec<Node>,
    pub links: Vec<Link>,
    pub strats: Vec<Strat>,
    pub obstacles: Vec<Obstacle>,
}

impl Room {
    pub fn parse(json_value: &JsonValue) -> Result<Room> {
        let name = json_value["name"]
            .as_str()
            .context("room without a name")?
            .to_string();
        let id = json_value["id"]
            .as_usize()
            .with_context(|| format!("missing/invalid id for room {name}"))?;
        let area = json_value["area"]
            .as_str()
            .with_context(|| format!("missing area for room {name}"))?
            .to_string();
        let sub_area = opt_str(json_value, "subarea");

        ensure!(json_value["nodes"].is_array(), "room {name} without nodes");
        let mut nodes: Vec<Node> = Vec::new();
        for node_json in json_value["nodes"].members() {
            nodes.push(
                Node::parse(node_json).with_context(|| format!("processing room {name}"))?,
            );
        }

        let mut links: Vec<Link> = Vec::new();
        if json_value["links"].is_array() {
            for link_json in json_value["links"].members() {
                links.push(Link::parse(link_json)?);
            }
        }

        let mut strats: Vec<Strat> = Vec::new();
        if json_value["strats"].is_array() {
            for strat_json in json_value["strats"].members() {
                strats.push(
                    Strat::parse(strat_json).with_context(|| format!("processing room {name}"))?,
                );
            }
        }

        let mut obstacles: Vec<Obstacle> = Vec::new();
        if json_value["obstacles"].is_array() {
            for obstacle_json in json_value["obstacles"].members() {
                obstacles.push(Obstacle {
                    id: req_str(obstacle_json, "id", json_value)?,
                    name: req_str(obstacle_json, "name", json_value)?,
                    obstacle_type: opt_str(obstacle_json, "obstacleType"),
                });
            }
        }

        Ok(Room {
            id,
            name,
            area,
            sub_area,
            nodes,
            links,
            strats,
            obstacles,
        })
    }
}

impl Node {
    fn parse(json_value: &JsonValue) -> Result<Node> {
        let name = json_value["name"]
            .as_str()
            .context("node without a name")?
            .to_string();
        let id = json_value["id"]
            .as_usize()
            .with_context(|| format!("missing/invalid id for node {name}"))?;
        let node_type = json_value["nodeType"]
            .as_str()
            .with_context(|| format!("missing nodeType for node {name}"))?
            .to_string();
        let node_sub_type = json_value["nodeSubType"].as_str().unwrap_or("").to_string();
        let node_address = opt_str(json_value, "nodeAddress");

        let locks = if json_value["locks"].is_array() {
            let mut locks: Vec<NodeLock> = Vec::new();
            for lock_json in json_value["locks"].members() {
                locks.push(
                    NodeLock::parse(lock_json)
                        .with_context(|| format!("processing node {name}"))?,
                );
            }
            Some(locks)
        } else {
            None
        };

        let yields = opt_str_list(json_value, "yields")?;

        Ok(Node {
            id,
            name,
            node_type,
            node_sub_type,
            node_address,
            locks,
            yields,
        })
    }
}

impl NodeLock {
    fn parse(json_value: &JsonValue) -> Result<NodeLock> {
        let name = json_value["name"]
            .as_str()
            .context("lock without a name")?
            .to_string();
        let lock_type = req_str(json_value, "lockType", json_value)?;
        let lock = if json_value["lock"].is_null() {
            None
        } else {
            Some(Requirement::parse_requires(&json_value["lock"])?)
        };
        ensure!(
            json_value["unlockStrats"].is_array(),
            "lock {name} without unlockStrats"
        );
        let mut unlock_strats: Vec<Strat> = Vec::new();
        for strat_json in json_value["unlockStrats"].members() {
            unlock_strats.push(Strat::parse_unlock(strat_json)?);
        }
        let yields = opt_str_list(json_value, "yields")?;
        Ok(NodeLock {
            name,
            lock_type,
            lock,
            unlock_strats,
            yields,
        })
    }
}

impl Link {
    fn parse(json_value: &JsonValue) -> Result<Link> {
        let from = json_value["from"]
            .as_usize()
            .with_context(|| format!("missing/invalid link from: {json_value}"))?;
        ensure!(json_value["to"].is_array(), "link without to: {}", json_value);
        let mut to: Vec<LinkTo> = Vec::new();
        for to_json in json_value["to"].members() {
            to.push(LinkTo {
                id: to_json["id"]
                    .as_usize()
                    .with_context(|| format!("missing/invalid link to id: {json_value}"))?,
            });
        }
        Ok(Link { from, to })
    }
}

impl Strat {
    fn parse(json_value: &JsonValue) -> Result<Strat> {
        let name = json_value["name"]
            .as_str()
            .context("strat without a name")?
            .to_string();
        ensure!(
            json_value["link"].is_array() && json_value["link"].len() == 2,
            "strat {name} without link pair"
        );
        let link = (
            json_value["link"][0]
                .as_usize()
                .with_context(|| format!("bad link pair in strat {name}"))?,
            json_value["link"][1]
                .as_usize()
                .with_context(|| format!("bad link pair in strat {name}"))?,
        );
        let mut strat = Self::parse_common(json_value, name)?;
        strat.link = link;
        Ok(strat)
    }

    // Unlock strats live inside a lock and have no link of their own.
    fn parse_unlock(json_value: &JsonValue) -> Result<Strat> {
        let name = json_value["name"]
            .as_str()
            .context("unlock strat without a name")?
            .to_string();
        Self::parse_common(json_value, name)
    }

    fn parse_common(json_value: &JsonValue, name: String) -> Result<Strat> {
        let requires = Requirement::parse_requires(&json_value["requires"])
            .with_context(|| format!("processing strat {name}"))?;
        let entrance_condition = if json_value["entranceCondition"].is_null() {
            None
        } else {
            Some(
                EntranceCondition::parse(&json_value["entranceCondition"])
                    .with_context(|| format!("processing strat {name}"))?,
            )
        };
        let exit_condition = if json_value["exitCondition"].is_null() {
            None
        } else {
            Some(
                ExitCondition::parse(&json_value["exitCondition"])
                    .with_context(|| format!("processing strat {name}"))?,
            )
        };
        Ok(Strat {
            link: (0, 0),
            name,
            notable: json_value["notable"].as_bool(),
            requires,
            entrance_condition,
            exit_condition,
            clears_obstacles: opt_str_list(json_value, "clearsObstacles")?,
            resets_obstacles: opt_str_list(json_value, "resetsObstacles")?,
        })
    }
}

#[derive(Clone, Debug)]
pub struct Tech {
    pub name: String,
    pub tech_requires: Requirement,
    pub other_requires: Requirement,
    pub extension_techs: Vec<Tech>,
}

#[derive(Clone, Debug)]
pub struct TechCategory {
    pub name: String,
    pub techs: Vec<Tech>,
}

#[derive(Clone, Debug, Default)]
pub struct TechCollection {
    pub tech_categories: Vec<TechCategory>,
}

impl Tech {
    fn parse(json_value: &JsonValue) -> Result<Tech> {
        let name = json_value["name"]
            .as_str()
            .context("tech without a name")?
            .to_string();
        let tech_requires = Requirement::parse_requires(&json_value["techRequires"])
            .with_context(|| format!("processing tech {name}"))?;
        let other_requires = Requirement::parse_requires(&json_value["otherRequires"])
            .with_context(|| format!("processing tech {name}"))?;
        let mut extension_techs: Vec<Tech> = Vec::new();
        if json_value["extensionTechs"].is_array() {
            for ext_json in json_value["extensionTechs"].members() {
                extension_techs.push(Tech::parse(ext_json)?);
            }
        }
        Ok(Tech {
            name,
            tech_requires,
            other_requires,
            extension_techs,
        })
    }
}

impl TechCollection {
    pub fn parse(json_value: &JsonValue) -> Result<TechCollection> {
        ensure!(json_value["techCategories"].is_array());
        let mut tech_categories: Vec<TechCategory> = Vec::new();
        for category_json in json_value["techCategories"].members() {
            ensure!(category_json["techs"].is_array());
            let mut techs: Vec<Tech> = Vec::new();
            for tech_json in category_json["techs"].members() {
                techs.push(Tech::parse(tech_json)?);
            }
            tech_categories.push(TechCategory {
                name: category_json["name"].as_str().unwrap_or("").to_string(),
                techs,
            });
        }
        Ok(TechCollection { tech_categories })
    }
}

#[derive(Clone, Debug)]
pub struct Helper {
    pub name: String,
    pub requires: Requirement,
}

#[derive(Clone, Debug)]
pub struct HelperCategory {
    pub name: String,
    pub helpers: Vec<Helper>,
}

#[derive(Clone, Debug, Default)]
pub struct HelperCollection {
    pub helper_categories: Vec<HelperCategory>,
}

impl HelperCollection {
    pub fn parse(json_value: &JsonValue) -> Result<HelperCollection> {
        ensure!(json_value["helperCategories"].is_array());
        let mut helper_categories: Vec<HelperCategory> = Vec::new();
        for category_json in json_value["helperCategories"].members() {
            ensure!(category_json["helpers"].is_array());
            let mut helpers: Vec<Helper> = Vec::new();
            for helper_json in category_json["helpers"].members() {
                let name = helper_json["name"]
                    .as_str()
                    .context("helper without a name")?
                    .to_string();
                let requires = Requirement::parse_requires(&helper_json["requires"])
                    .with_context(|| format!("processing helper {name}"))?;
                helpers.push(Helper { name, requires });
            }
            helper_categories.push(HelperCategory {
                name: category_json["name"].as_str().unwrap_or("").to_string(),
                helpers,
            });
        }
        Ok(HelperCollection { helper_categories })
    }
}

#[derive(Clone, Debug)]
pub struct ConnectionNode {
    pub area: String,
    pub room_id: RoomId,
    pub room_name: String,
    pub node_id: NodeId,
    pub node_name: String,
}

/// A door pairing between two rooms. Direction is either "forward" or
/// "bidirectional".
#[derive(Clone, Debug)]
pub struct Connection {
    pub direction: String,
    pub nodes: Vec<ConnectionNode>,
}

impl Connection {
    pub fn parse(json_value: &JsonValue) -> Result<Connection> {
        let direction = json_value["direction"].as_str().unwrap_or("forward").to_string();
        ensure!(
            json_value["nodes"].is_array() && json_value["nodes"].len() == 2,
            "connection without a node pair: {}",
            json_value
        );
        let mut nodes: Vec<ConnectionNode> = Vec::new();
        for node_json in json_value["nodes"].members() {
            nodes.push(ConnectionNode {
                area: node_json["area"].as_str().unwrap_or("").to_string(),
                room_id: node_json["roomid"]
                    .as_usize()
                    .with_context(|| format!("missing roomid in connection: {json_value}"))?,
                room_name: node_json["roomName"].as_str().unwrap_or("").to_string(),
                node_id: node_json["nodeid"]
                    .as_usize()
                    .with_context(|| format!("missing nodeid in connection: {json_value}"))?,
                node_name: node_json["nodeName"].as_str().unwrap_or("").to_string(),
            });
        }
        Ok(Connection { direction, nodes })
    }
}

pub fn read_json(path: &Path) -> Result<JsonValue> {
    let file = File::open(path).with_context(|| format!("unable to open {}", path.display()))?;
    let json_str =
        std::io::read_to_string(file).with_context(|| format!("unable to read {}", path.display()))?;
    let json_data =
        json::parse(&json_str).with_context(|| format!("unable to parse {}", path.display()))?;
    Ok(json_data)
}

fn sorted_json_files(pattern: &str) -> Result<Vec<std::path::PathBuf>> {
    let mut paths: Vec<std::path::PathBuf> = Vec::new();
    for entry in glob::glob(pattern)? {
        paths.push(entry?);
    }
    paths.sort();
    Ok(paths)
}

/// Loads every room file under the region directory. A file that fails to
/// decode is logged and excluded; missing files do not abort the load.
pub fn load_rooms(region_dir: &Path) -> Result<Vec<Room>> {
    let pattern = format!("{}/**/*.json", region_dir.display());
    let mut rooms: Vec<Room> = Vec::new();
    for path in sorted_json_files(&pattern)? {
        let path_str = path.to_str().unwrap_or("");
        if path_str.contains("roomDiagram") || path_str.contains("ceres") {
            continue;
        }
        let json_value = read_json(&path)?;
        match Room::parse(&json_value) {
            Ok(room) => rooms.push(room),
            Err(e) => error!("error while decoding {}: {:#}", path.display(), e),
        }
    }
    Ok(rooms)
}

pub fn load_connections(connection_dir: &Path) -> Result<Vec<Connection>> {
    let pattern = format!("{}/**/*.json", connection_dir.display());
    let mut connections: Vec<Connection> = Vec::new();
    for path in sorted_json_files(&pattern)? {
        if path.to_str().unwrap_or("").contains("ceres") {
            continue;
        }
        let json_value = read_json(&path)?;
        if !json_value["connections"].is_array() {
            continue;
        }
        for connection_json in json_value["connections"].members() {
            match Connection::parse(connection_json) {
                Ok(connection) => connections.push(connection),
                Err(e) => error!("error while decoding {}: {:#}", path.display(), e),
            }
        }
    }
    Ok(connections)
}

pub fn load_tech(path: &Path) -> Result<TechCollection> {
    TechCollection::parse(&read_json(path)?)
}

pub fn load_helpers(path: &Path) -> Result<HelperCollection> {
    HelperCollection::parse(&read_json(path)?)
}

fn req_str(value: &JsonValue, key: &str, ctx: &JsonValue) -> Result<String> {
    Ok(value[key]
        .as_str()
        .with_context(|| format!("missing/invalid {key} in {ctx}"))?
        .to_string())
}

fn opt_str(value: &JsonValue, key: &str) -> Option<String> {
    value[key].as_str().map(|s| s.to_string())
}

fn req_i32(value: &JsonValue, key: &str, ctx: &JsonValue) -> Result<Capacity> {
    value[key]
        .as_i32()
        .with_context(|| format!("missing/invalid {key} in {ctx}"))
}

fn self_i32(value: &JsonValue, ctx: &JsonValue) -> Result<Capacity> {
    value
        .as_i32()
        .with_context(|| format!("invalid value in {ctx}"))
}

fn self_usize(value: &JsonValue, ctx: &JsonValue) -> Result<usize> {
    value
        .as_usize()
        .with_context(|| format!("invalid value in {ctx}"))
}

fn req_float(value: &JsonValue, key: &str) -> Result<Float> {
    Ok(Float::new(value[key].as_f32().with_context(|| {
        format!("missing/invalid {key} in {value}")
    })?))
}

fn opt_float(value: &JsonValue, key: &str) -> Option<Float> {
    value[key].as_f32().map(Float::new)
}

fn opt_float_grid(value: &JsonValue, key: &str) -> Option<Vec<Vec<Float>>> {
    if !value[key].is_array() {
        return None;
    }
    let mut grid: Vec<Vec<Float>> = Vec::new();
    for row in value[key].members() {
        grid.push(
            row.members()
                .filter_map(|x| x.as_f32().map(Float::new))
                .collect(),
        );
    }
    Some(grid)
}

fn str_list(value: &JsonValue) -> Result<Vec<String>> {
    ensure!(value.is_array(), "expected string list, got: {}", value);
    let mut out: Vec<String> = Vec::new();
    for member in value.members() {
        out.push(
            member
                .as_str()
                .with_context(|| format!("expected string in {value}"))?
                .to_string(),
        );
    }
    Ok(out)
}

fn opt_str_list(value: &JsonValue, key: &str) -> Result<Option<Vec<String>>> {
    if value[key].is_array() {
        Ok(Some(str_list(&value[key])?))
    } else {
        Ok(None)
    }
}

fn resource_list(value: &JsonValue, ctx: &JsonValue) -> Result<Vec<ResourceCount>> {
    ensure!(value.is_array(), "expected resource list in {}", ctx);
    let mut out: Vec<ResourceCount> = Vec::new();
    for member in value.members() {
        out.push(ResourceCount {
            resource: req_str(member, "type", ctx)?,
            count: req_i32(member, "count", ctx)?,
        });
    }
    Ok(out)
}

fn usize_list(value: &JsonValue, ctx: &JsonValue) -> Result<Vec<usize>> {
    ensure!(value.is_array(), "expected id list in {}", ctx);
    let mut out: Vec<usize> = Vec::new();
    for member in value.members() {
        out.push(
            member
                .as_usize()
                .with_context(|| format!("expected node id in {ctx}"))?,
        );
    }
    Ok(out)
}

fn block_positions(value: &JsonValue, ctx: &JsonValue) -> Result<Vec<(Capacity, Capacity)>> {
    ensure!(value.is_array(), "missing blockPositions in {}", ctx);
    let mut out: Vec<(Capacity, Capacity)> = Vec::new();
    for pos in value.members() {
        ensure!(pos.is_array() && pos.len() == 2, "bad block position in {}", ctx);
        out.push((pos[0].as_i32().unwrap_or(0), pos[1].as_i32().unwrap_or(0)));
    }
    Ok(out)
}
