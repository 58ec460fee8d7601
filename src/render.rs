//! Render context - the pull-mode snapshot for renderers.
//!
//! Each frame, the host renderer calls [`build_render_context`] and draws
//! whatever came back. The renderer never subscribes to events and never
//! mutates simulation state; all visual decisions (glyphs, colors,
//! sprites) belong to it, keyed off the tags in this context.

use crate::components::*;
use crate::phase::BattlePhase;
use crate::state::{GameState, MenuModel};
use crate::timeline::{EntryKind, Tick};
use bevy_ecs::prelude::*;
use serde::{Deserialize, Serialize};

/// Entries shown in the upcoming-turns strip.
const TIMELINE_PREVIEW_LEN: usize = 8;
/// Manhattan distance at which an enemy intent is fully readable.
const INTENT_FULL_RANGE: u32 = 5;
/// Beyond this, enemy intents are hidden entirely.
const INTENT_PARTIAL_RANGE: u32 = 10;

/// Tile overlay bit flags.
pub const OVERLAY_MOVEMENT: u8 = 1 << 0;
pub const OVERLAY_ATTACK: u8 = 1 << 1;
pub const OVERLAY_DANGER: u8 = 1 << 2;
pub const OVERLAY_CURSOR: u8 = 1 << 3;

/// Visible slice of the map, in tiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Camera {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileView {
    pub x: i32,
    pub y: i32,
    pub terrain_id: u16,
    pub overlay_flags: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitView {
    pub id: UnitId,
    pub x: i32,
    pub y: i32,
    pub team: Team,
    pub class: UnitClass,
    pub name: String,
    pub hp_cur: i32,
    pub hp_max: i32,
    pub is_selected: bool,
    pub morale_state: Option<MoraleState>,
    pub wound_count: Option<u32>,
}

/// Kind of a free-standing overlay marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverlayKind {
    MovementRange,
    AttackRange,
    DangerZone,
    Cursor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayView {
    pub kind: OverlayKind,
    pub x: i32,
    pub y: i32,
    pub team: Option<Team>,
}

/// Screen corner a text block anchors to; layout is the renderer's call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextAnchor {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextView {
    pub anchor: TextAnchor,
    pub text: String,
    pub style_tag: String,
}

/// How much of a timeline entry the player may see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IntentVisibility {
    Full,
    Partial,
    Hidden,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelinePreviewEntry {
    pub unit_name: String,
    /// Label of the declared intent, if any ("Attack", "Move", ...).
    pub action_icon: Option<String>,
    pub ready_in_ticks: Tick,
    pub visibility: IntentVisibility,
}

/// Everything a renderer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderContext {
    pub camera: Camera,
    pub tiles: Vec<TileView>,
    pub units: Vec<UnitView>,
    pub overlays: Vec<OverlayView>,
    pub menus: Vec<MenuModel>,
    pub texts: Vec<TextView>,
    pub timeline_preview: Vec<TimelinePreviewEntry>,
    pub forecast: Option<crate::battle::Forecast>,
}

/// Builds the frame snapshot. Takes `&mut GameState` for ECS query access
/// only; observable state is untouched (asserted by the save-digest test).
pub fn build_render_context(state: &mut GameState) -> RenderContext {
    let camera = Camera {
        x: 0,
        y: 0,
        w: state.map.width() as i32,
        h: state.map.height() as i32,
    };

    // Overlay markers from the UI scratch state.
    let mut overlays = Vec::new();
    for &(pos, _) in &state.ui.reachable {
        overlays.push(OverlayView {
            kind: OverlayKind::MovementRange,
            x: pos.x,
            y: pos.y,
            team: None,
        });
    }
    for &pos in &state.ui.attack_tiles {
        overlays.push(OverlayView {
            kind: OverlayKind::AttackRange,
            x: pos.x,
            y: pos.y,
            team: None,
        });
    }
    for &pos in &state.ui.danger_tiles {
        overlays.push(OverlayView {
            kind: OverlayKind::DangerZone,
            x: pos.x,
            y: pos.y,
            team: Some(Team::Enemy),
        });
    }
    overlays.push(OverlayView {
        kind: OverlayKind::Cursor,
        x: state.ui.cursor.x,
        y: state.ui.cursor.y,
        team: None,
    });

    // Tiles with their overlay flags folded in.
    let mut tiles = Vec::with_capacity(state.map.width() * state.map.height());
    for (pos, tile) in state.map.iter() {
        let mut flags = 0u8;
        if state.ui.reachable.iter().any(|&(p, _)| p == pos) {
            flags |= OVERLAY_MOVEMENT;
        }
        if state.ui.attack_tiles.contains(&pos) {
            flags |= OVERLAY_ATTACK;
        }
        if state.ui.danger_tiles.contains(&pos) {
            flags |= OVERLAY_DANGER;
        }
        if state.ui.cursor == pos {
            flags |= OVERLAY_CURSOR;
        }
        tiles.push(TileView {
            x: pos.x,
            y: pos.y,
            terrain_id: tile.terrain_id,
            overlay_flags: flags,
        });
    }

    let units = collect_units(state);
    let timeline_preview = collect_timeline_preview(state, &units);

    let mut texts = vec![
        TextView {
            anchor: TextAnchor::TopLeft,
            text: format!("Tick {}", state.timeline.now()),
            style_tag: "status".to_string(),
        },
        TextView {
            anchor: TextAnchor::TopRight,
            text: format!("{:?}", state.battle_phase()),
            style_tag: "phase".to_string(),
        },
    ];
    if state.ui.targeting.awaiting_friendly_confirm {
        texts.push(TextView {
            anchor: TextAnchor::BottomLeft,
            text: "Strike an ally? Confirm again.".to_string(),
            style_tag: "warning".to_string(),
        });
    }
    if let Some(line) = state.log.lines().last() {
        texts.push(TextView {
            anchor: TextAnchor::BottomRight,
            text: (*line).to_string(),
            style_tag: "log".to_string(),
        });
    }

    RenderContext {
        camera,
        tiles,
        units,
        overlays,
        menus: state.ui.menu.iter().cloned().collect(),
        texts,
        timeline_preview,
        forecast: state.ui.forecast.clone(),
    }
}

fn collect_units(state: &mut GameState) -> Vec<UnitView> {
    let selected = state.active_unit;
    let mut query = state.world.query::<(
        &UnitId,
        &Actor,
        &Team,
        &Health,
        &Movement,
        Option<&Morale>,
        Option<&Wounds>,
    )>();
    let mut units: Vec<UnitView> = query
        .iter(&state.world)
        .filter(|(_, _, _, health, ..)| health.is_alive())
        .map(|(id, actor, team, health, movement, morale, wounds)| UnitView {
            id: *id,
            x: movement.position.x,
            y: movement.position.y,
            team: *team,
            class: actor.class,
            name: actor.name.clone(),
            hp_cur: health.current,
            hp_max: health.max,
            is_selected: selected == Some(*id),
            morale_state: morale.map(|m| m.state),
            wound_count: wounds.map(|w| w.list.len() as u32),
        })
        .collect();
    units.sort_by_key(|u| u.id);
    units
}

fn collect_timeline_preview(state: &GameState, units: &[UnitView]) -> Vec<TimelinePreviewEntry> {
    let now = state.timeline.now();
    let player_positions: Vec<Vector2> = units
        .iter()
        .filter(|u| u.team == Team::Player)
        .map(|u| Vector2::new(u.x, u.y))
        .collect();

    state
        .timeline
        .preview(TIMELINE_PREVIEW_LEN)
        .into_iter()
        .filter_map(|entry| {
            let EntryKind::Unit(unit) = entry.kind else {
                return None;
            };
            let visibility = intent_visibility(state, unit, &player_positions);
            Some(TimelinePreviewEntry {
                unit_name: state.name_of(unit),
                action_icon: match visibility {
                    IntentVisibility::Full => {
                        entry.scheduled_action.map(|a| a.label().to_string())
                    }
                    _ => None,
                },
                ready_in_ticks: entry.ready_tick.saturating_sub(now),
                visibility,
            })
        })
        .collect()
}

/// Player units always read Full; enemy intents fade with distance from
/// the nearest player unit.
fn intent_visibility(
    state: &GameState,
    unit: UnitId,
    player_positions: &[Vector2],
) -> IntentVisibility {
    if !state.fog_of_war || state.team_of(unit) == Some(Team::Player) {
        return IntentVisibility::Full;
    }
    let Some(pos) = state.position_of(unit) else {
        return IntentVisibility::Hidden;
    };
    let nearest = player_positions
        .iter()
        .map(|p| p.manhattan(pos))
        .min()
        .unwrap_or(u32::MAX);
    if nearest <= INTENT_FULL_RANGE {
        IntentVisibility::Full
    } else if nearest <= INTENT_PARTIAL_RANGE {
        IntentVisibility::Partial
    } else {
        IntentVisibility::Hidden
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Terrain, Tile, TileMap};
    use crate::state::UnitSpawn;
    use crate::timeline::EntryKind;

    fn scene() -> (GameState, UnitId, UnitId) {
        let tile = Tile::from_terrain(1, &Terrain::open("Plain"));
        let mut state = GameState::new(TileMap::filled(12, 6, tile), 21);
        let hero = state.spawn_unit(UnitSpawn::new(
            "Hero",
            UnitClass::Knight,
            Team::Player,
            Vector2::new(1, 1),
        ));
        let mut lurker =
            UnitSpawn::new("Lurker", UnitClass::Brigand, Team::Enemy, Vector2::new(11, 5));
        lurker.personality = Some(Personality::Aggressive);
        let lurker = state.spawn_unit(lurker);
        state
            .timeline
            .schedule(EntryKind::Unit(hero), 10, None);
        state.timeline.schedule(
            EntryKind::Unit(lurker),
            20,
            Some(crate::actions::ActionKind::Wait),
        );
        (state, hero, lurker)
    }

    #[test]
    fn test_context_collects_tiles_units_and_preview() {
        let (mut state, hero, _) = scene();
        state.active_unit = Some(hero);
        let ctx = build_render_context(&mut state);

        assert_eq!(ctx.camera.w, 12);
        assert_eq!(ctx.tiles.len(), 72);
        assert_eq!(ctx.units.len(), 2);
        assert!(ctx.units[0].is_selected);
        assert_eq!(ctx.timeline_preview.len(), 2);
        assert_eq!(ctx.timeline_preview[0].unit_name, "Hero");
        assert_eq!(ctx.timeline_preview[0].ready_in_ticks, 10);
    }

    #[test]
    fn test_distant_enemy_intent_is_hidden() {
        let (mut state, _, _) = scene();
        let ctx = build_render_context(&mut state);
        // Lurker is 14 tiles from the only player unit.
        let lurker = &ctx.timeline_preview[1];
        assert_eq!(lurker.visibility, IntentVisibility::Hidden);
        assert!(lurker.action_icon.is_none());
    }

    #[test]
    fn test_close_enemy_intent_is_readable() {
        let (mut state, _, lurker) = scene();
        let e = state.entity(lurker).unwrap();
        state.world.get_mut::<Movement>(e).unwrap().position = Vector2::new(3, 1);
        state.occupancy.move_unit(lurker, Vector2::new(3, 1));

        let ctx = build_render_context(&mut state);
        let entry = &ctx.timeline_preview[1];
        assert_eq!(entry.visibility, IntentVisibility::Full);
        assert_eq!(entry.action_icon.as_deref(), Some("Wait"));
    }

    #[test]
    fn test_cursor_flag_lands_on_one_tile() {
        let (mut state, _, _) = scene();
        state.ui.cursor = Vector2::new(4, 2);
        let ctx = build_render_context(&mut state);
        let flagged: Vec<_> = ctx
            .tiles
            .iter()
            .filter(|t| t.overlay_flags & OVERLAY_CURSOR != 0)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!((flagged[0].x, flagged[0].y), (4, 2));
    }
}
