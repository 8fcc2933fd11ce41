//! Load-time topology resolution: track linking, traction wiring, event
//! and launcher cross-referencing.
//!
//! Everything here runs once after the scene is placed on the grid.
//! Track ends find their neighbors by coincident endpoints through a
//! deterministic ring search; traction spans do the same and then
//! propagate power-source references and accumulated wire resistance to a
//! fixed point. Named cross-references resolve or degrade, never abort.

use tracing::{debug, error, info, warn};

use crate::context::WorldConfig;
use crate::event::{Event, EventAction, EventRegistry, NodeRef};
use crate::grid::{ring_probes, SpatialGrid, SECTOR_ORDER};
use crate::id::{EventId, NodeId};
use crate::isolated::IsolatedRegistry;
use crate::math::Vec3;
use crate::memcell::MemoryCell;
use crate::node::{NodeKind, NodePayload, SyntheticSource, WorldNode};
use crate::registry::{NameClass, NodeRegistry};
use crate::track::{Connection, EndCase, TrackEnd, TrackKind};
use crate::traction::SpanLink;

/// Maximum gap bridged by the tensioning-run resistance search, meters.
pub const WIRE_GAP_LIMIT: f64 = 200.0;

// ---------------------------------------------------------------------
// nearest-endpoint searches
// ---------------------------------------------------------------------

/// Track whose endpoint coincides with `point`, searched over the ring
/// spiral around the point's sector. Returns the endpoint discriminator
/// case alongside the node.
pub fn find_track(
    nodes: &NodeRegistry,
    grid: &SpatialGrid,
    point: Vec3,
    exclude: Option<NodeId>,
) -> Option<(NodeId, EndCase)> {
    let center = grid.sector_of(point);
    for offset in SECTOR_ORDER {
        for probe in ring_probes(center, offset) {
            let Some(sector) = grid.fast_sector(probe) else {
                continue;
            };
            for &id in &sector.tracks {
                if Some(id) == exclude {
                    continue;
                }
                if let Some(case) = nodes
                    .get(id)
                    .and_then(|n| n.as_track())
                    .and_then(|t| t.test_point(point))
                {
                    return Some((id, case));
                }
            }
        }
    }
    None
}

/// Traction span with an endpoint coinciding with `point`, same search
/// shape as [`find_track`] over the sector node lists.
pub fn find_traction(
    nodes: &NodeRegistry,
    grid: &SpatialGrid,
    point: Vec3,
    exclude: Option<NodeId>,
) -> Option<(NodeId, u8)> {
    let center = grid.sector_of(point);
    for offset in SECTOR_ORDER {
        for probe in ring_probes(center, offset) {
            let Some(sector) = grid.fast_sector(probe) else {
                continue;
            };
            let mut cursor = sector.nodes;
            while let Some(id) = cursor {
                let node = nodes.get(id);
                cursor = node.and_then(|n| n.next_in_sector);
                if Some(id) == exclude {
                    continue;
                }
                let Some(span) = node.and_then(|n| n.as_traction()) else {
                    continue;
                };
                if crate::math::points_coincide(span.point1, point) {
                    return Some((id, 0));
                }
                if crate::math::points_coincide(span.point2, point) {
                    return Some((id, 1));
                }
            }
        }
    }
    None
}

// ---------------------------------------------------------------------
// track linking
// ---------------------------------------------------------------------

fn link(
    nodes: &mut NodeRegistry,
    this: NodeId,
    this_end: TrackEnd,
    other: NodeId,
    other_case: EndCase,
) {
    // The discriminator case decodes to: which connection this track
    // stores, which end of the neighbor points back, and whether the
    // neighbor is a switch whose branch bookkeeping needs updating.
    let (direction, back_end, record_branch, through_diverging) = match other_case {
        0 => (0, TrackEnd::Prev, None, false),
        1 => (1, TrackEnd::Next, None, false),
        2 => (0, TrackEnd::Prev, Some(0), false),
        3 => (1, TrackEnd::Next, Some(0), false),
        4 => (2, TrackEnd::Prev, Some(1), true),
        5 => (3, TrackEnd::Next, Some(1), true),
        _ => return,
    };
    let back_direction = match this_end {
        TrackEnd::Prev => 0,
        TrackEnd::Next => 1,
    };
    let Ok((a, b)) = nodes.get_pair_mut(this, other) else {
        return;
    };
    let this_name = a.name.clone();
    let other_name = b.name.clone();
    let (Some(a), Some(b)) = (a.as_track_mut(), b.as_track_mut()) else {
        return;
    };
    // Linking through the diverging branch requires the blades there.
    if through_diverging {
        b.throw_switch(1, -1.0, -1.0);
    }
    if let Err(e) = a.connect(
        &this_name,
        this_end,
        Connection {
            target: other,
            direction,
        },
    ) {
        warn!(track = %this_name, error = %e, "track link skipped");
    } else if let Err(e) = b.connect(
        &other_name,
        back_end,
        Connection {
            target: this,
            direction: back_direction,
        },
    ) {
        warn!(track = %other_name, error = %e, "track back-link skipped");
        a.disconnect(this_end);
    } else if let Some(branch) = record_branch {
        b.set_connections(branch);
    }
    if through_diverging {
        b.throw_switch(0, -1.0, -1.0);
    }
}

/// Connect every open track end to its coincident neighbor, then apply
/// the per-track post passes: portal marking, forced-switch events,
/// isolated-section wiring, hidden by-name events.
pub fn init_tracks(
    nodes: &mut NodeRegistry,
    grid: &SpatialGrid,
    events: &mut EventRegistry,
    isolated: &mut IsolatedRegistry,
    config: &WorldConfig,
) {
    let mut ids = nodes.ids_of(NodeKind::Track);
    ids.reverse();
    for id in ids {
        let Some(track) = nodes.get(id).and_then(|n| n.as_track()) else {
            continue;
        };
        let point1 = track.point1;
        let point2 = track.point2;
        let prev_open = track.prev.is_none();
        let next_open = track.next.is_none();
        // Only plain tracks and turntables initiate linking; switches and
        // crossings get linked by their neighbors, which records the
        // connections into the right branch slots.
        let seeds = matches!(track.kind, TrackKind::Normal | TrackKind::Table);

        if seeds
            && prev_open
            && let Some((other, case)) = find_track(nodes, grid, point1, Some(id))
        {
            link(nodes, id, TrackEnd::Prev, other, case);
        }
        if seeds
            && next_open
            && let Some((other, case)) = find_track(nodes, grid, point2, Some(id))
        {
            link(nodes, id, TrackEnd::Next, other, case);
        }

        post_link_track(nodes, events, isolated, config, id);
    }
    init_isolated_cells(nodes, events, isolated, config);
}

fn post_link_track(
    nodes: &mut NodeRegistry,
    events: &mut EventRegistry,
    isolated: &mut IsolatedRegistry,
    config: &WorldConfig,
    id: NodeId,
) {
    let Some(node) = nodes.get(id) else {
        return;
    };
    let name = node.name.clone();
    let Some(track) = node.as_track() else {
        return;
    };
    let is_switch = track.switch.is_some();
    let prev_open = track.prev.is_none();
    let next_linked = track.next.is_some();
    let isolated_name = track.isolated_name.clone();

    // An unconnected point1 on a star-named track is a scenario exit.
    let portal = name.starts_with('*') && prev_open && next_linked;

    let forced = if is_switch {
        (
            events.find(&format!("{name}:forced+")),
            events.find(&format!("{name}:forced-")),
        )
    } else {
        (None, None)
    };

    let iso = if isolated_name.is_empty() {
        None
    } else {
        let iso_id = isolated.find_or_create(&isolated_name);
        if let Some(section) = isolated.get_mut(iso_id) {
            section.ev_busy = events.find(&format!("{isolated_name}:busy"));
            section.ev_free = events.find(&format!("{isolated_name}:free"));
        }
        Some(iso_id)
    };

    let find_named = |n: &str| {
        if n.is_empty() || n == "none" {
            return None;
        }
        let found = events.find(n);
        if found.is_none() {
            warn!(track = %name, event = %n, "missed track event");
        }
        found
    };
    let authored = [
        find_named(&track.events.event0_name),
        find_named(&track.events.event1_name),
        find_named(&track.events.event2_name),
        find_named(&track.events.eventall0_name),
        find_named(&track.events.eventall1_name),
        find_named(&track.events.eventall2_name),
    ];

    let hidden = if config.hidden_events & 0x1 != 0 && !name.is_empty() {
        [
            events.find(&format!("{name}:event0")),
            events.find(&format!("{name}:event1")),
            events.find(&format!("{name}:event2")),
            events.find(&format!("{name}:eventall0")),
            events.find(&format!("{name}:eventall1")),
            events.find(&format!("{name}:eventall2")),
        ]
    } else {
        [None; 6]
    };

    let Some(track) = nodes.get_mut(id).and_then(|n| n.as_track_mut()) else {
        return;
    };
    track.portal = portal;
    if let Some(sw) = &mut track.switch {
        sw.ev_plus = forced.0;
        sw.ev_minus = forced.1;
    }
    track.isolated = iso;
    let ev = &mut track.events;
    // Authored names win the slot; hidden by-name events only fill gaps.
    for (i, slot) in [
        &mut ev.event0,
        &mut ev.event1,
        &mut ev.event2,
        &mut ev.eventall0,
        &mut ev.eventall1,
        &mut ev.eventall2,
    ]
    .into_iter()
    .enumerate()
    {
        if slot.is_none() {
            *slot = authored[i].or(hidden[i]);
        }
    }
}

/// Pair every isolated section with a memory cell: an authored cell of
/// the same name, or a synthesized one indexed under it.
fn init_isolated_cells(
    nodes: &mut NodeRegistry,
    _events: &EventRegistry,
    isolated: &mut IsolatedRegistry,
    config: &WorldConfig,
) {
    for iso_id in isolated.ids() {
        let Some(name) = isolated.get(iso_id).map(|s| s.name.clone()) else {
            continue;
        };
        let cell = match nodes.find(NameClass::MemoryCell, &name) {
            Some(id) => id,
            None => {
                debug!(section = %name, "synthesizing isolated section cell");
                nodes.insert(
                    WorldNode::new(
                        &name,
                        Vec3::ZERO,
                        NodePayload::MemoryCell(MemoryCell::new("", 0.0, 0.0)),
                    )
                    .synthetic(SyntheticSource::IsolatedCell),
                    config,
                )
            }
        };
        if let Some(section) = isolated.get_mut(iso_id) {
            section.cell = Some(cell);
        }
    }
}

// ---------------------------------------------------------------------
// event resolution
// ---------------------------------------------------------------------

fn resolve_ref(
    nodes: &NodeRegistry,
    class: NameClass,
    r: &mut NodeRef,
) -> bool {
    if r.name.is_empty() || r.name == "none" {
        return true;
    }
    r.id = nodes.find(class, &r.name);
    r.id.is_some()
}

/// Resolve every named cross-reference of every event. A missing required
/// reference degrades the event to an inert one and logs; loading never
/// aborts over a dangling name.
pub fn resolve_events(events: &mut EventRegistry, nodes: &NodeRegistry) {
    let ids: Vec<EventId> = events.iter().map(|(id, _)| id).collect();
    for id in ids {
        let Some(ev) = events.get_mut(id) else {
            continue;
        };
        let name = ev.name.clone();
        let ok = match &mut ev.action {
            EventAction::UpdateValues { cell, .. }
            | EventAction::AddValues { cell, .. }
            | EventAction::GetValues { cell }
            | EventAction::WhoIs { cell, .. } => resolve_ref(nodes, NameClass::MemoryCell, cell),
            EventAction::CopyValues { target, source, .. } => {
                resolve_ref(nodes, NameClass::MemoryCell, target)
                    && resolve_ref(nodes, NameClass::MemoryCell, source)
            }
            EventAction::LogValues { cell } => {
                if let Some(cell) = cell {
                    resolve_ref(nodes, NameClass::MemoryCell, cell)
                } else {
                    true
                }
            }
            EventAction::Lights { model, .. } | EventAction::Animation { model, .. } => {
                resolve_ref(nodes, NameClass::Model, model)
            }
            EventAction::Visible { target, .. } => {
                resolve_ref(nodes, NameClass::Model, target)
                    || resolve_ref(nodes, NameClass::Track, target)
                    || resolve_ref(nodes, NameClass::Traction, target)
            }
            EventAction::Switch { track, .. } | EventAction::TrackVel { track, .. } => {
                resolve_ref(nodes, NameClass::Track, track)
            }
            EventAction::Sound { emitter, .. } => resolve_ref(nodes, NameClass::Sound, emitter),
            EventAction::Voltage { source, .. } => {
                resolve_ref(nodes, NameClass::PowerSource, source)
            }
            EventAction::Multiple { .. }
            | EventAction::PutValues { .. }
            | EventAction::DynVel { .. }
            | EventAction::Friction { .. }
            | EventAction::Message { .. }
            | EventAction::Exit { .. }
            | EventAction::Ignored => true,
        };
        if !ok {
            error!(event = %name, "bad event: unresolved reference, degraded");
            ev.ignore();
            continue;
        }
        // Condition references.
        let cond_ok = {
            let c = &mut ev.condition;
            let track_ok = c.track.name.is_empty()
                || c.track.name == "none"
                || {
                    c.track.id = nodes.find(NameClass::Track, &c.track.name);
                    c.track.id.is_some()
                };
            let cell_ok = c.cell.name.is_empty()
                || c.cell.name == "none"
                || {
                    c.cell.id = nodes.find(NameClass::MemoryCell, &c.cell.name);
                    c.cell.id.is_some()
                };
            track_ok && cell_ok
        };
        if !cond_ok {
            error!(event = %name, "bad event: unresolved condition reference, degraded");
            ev.ignore();
        }
    }
    resolve_multiple_children(events);
}

fn resolve_multiple_children(events: &mut EventRegistry) {
    let ids: Vec<EventId> = events.iter().map(|(id, _)| id).collect();
    for id in ids {
        let Some(ev) = events.get(id) else {
            continue;
        };
        let EventAction::Multiple { children } = &ev.action else {
            continue;
        };
        let looked_up: Vec<Option<EventId>> = children
            .iter()
            .map(|c| {
                if c.name.is_empty() || c.name == "none" {
                    None
                } else {
                    events.find(&c.name)
                }
            })
            .collect();
        let name = ev.name.clone();
        let Some(ev) = events.get_mut(id) else {
            continue;
        };
        if let EventAction::Multiple { children } = &mut ev.action {
            for (child, found) in children.iter_mut().zip(looked_up) {
                child.id = found;
                if child.id.is_none() && !child.name.is_empty() && child.name != "none" {
                    warn!(event = %name, child = %child.name, "missed event reference");
                }
            }
        }
    }
}

/// Event a scanning driver reads at `name`: the authored `<name>:scan`
/// event, or an implicit cell read synthesized when only a memory cell of
/// that name exists.
pub fn find_event_scan(
    events: &mut EventRegistry,
    nodes: &NodeRegistry,
    name: &str,
) -> Option<EventId> {
    let scan_name = format!("{name}:scan");
    if let Some(id) = events.find(&scan_name) {
        return Some(id);
    }
    let cell = nodes.find(NameClass::MemoryCell, name)?;
    info!(%name, "synthesizing scan event over memory cell");
    let mut ev = Event::new(
        &scan_name,
        EventAction::GetValues {
            cell: NodeRef {
                name: name.to_string(),
                id: Some(cell),
            },
        },
    );
    ev.delay = 0.0;
    Some(events.insert(ev))
}

/// Resolve launcher event and cell references.
pub fn init_launchers(nodes: &mut NodeRegistry, events: &EventRegistry) {
    let ids = nodes.ids_of(NodeKind::Launcher);
    for id in ids {
        let Some(l) = nodes.get(id).and_then(|n| n.as_launcher()) else {
            continue;
        };
        let ev1 = if l.event1_name.is_empty() {
            None
        } else {
            let found = events.find(&l.event1_name);
            if found.is_none() {
                warn!(launcher = ?id, event = %l.event1_name, "missed launcher event");
            }
            found
        };
        let ev2 = if l.event2_name.is_empty() {
            None
        } else {
            events.find(&l.event2_name)
        };
        let cell = if l.cell_name.is_empty() || l.cell_name == "none" {
            None
        } else {
            nodes.find(NameClass::MemoryCell, &l.cell_name)
        };
        if let Some(l) = nodes.get_mut(id).and_then(|n| n.as_launcher_mut()) {
            l.event1 = ev1;
            l.event2 = ev2;
            l.cell = cell;
        }
    }
}

// ---------------------------------------------------------------------
// traction wiring
// ---------------------------------------------------------------------

/// Wire up the overhead network: resolve supply references, link span
/// ends, mark tensioning-run boundaries, build parallel rings, and
/// propagate resistance to a fixed point.
pub fn init_traction(nodes: &mut NodeRegistry, grid: &SpatialGrid, config: &WorldConfig) {
    let mut spans = nodes.ids_of(NodeKind::Traction);
    spans.reverse();

    resolve_power_sources(nodes, &spans, config);
    link_spans(nodes, grid, &spans);
    build_parallel_rings(nodes, &spans);
    propagate_resistance(nodes, grid, &spans);
}

fn resolve_power_sources(nodes: &mut NodeRegistry, spans: &[NodeId], config: &WorldConfig) {
    for &id in spans {
        let Some(span) = nodes.get(id).and_then(|n| n.as_traction()) else {
            continue;
        };
        let power_name = span.power_name.clone();
        if power_name.is_empty() || power_name == "none" || power_name == "*" {
            continue;
        }
        let section = match nodes.find(NameClass::PowerSource, &power_name) {
            Some(s) => s,
            None => {
                // A missing supply gets a stand-in substation so the wire
                // still feeds; the scenery bug is logged.
                error!(span = ?id, supply = %power_name, "bad power: unknown supply, substituting");
                nodes.insert(
                    WorldNode::new(
                        &power_name,
                        Vec3::ZERO,
                        NodePayload::PowerSource(crate::traction::PowerSource::fallback()),
                    )
                    .synthetic(SyntheticSource::PowerFallback),
                    config,
                )
            }
        };
        if let Some(span) = nodes.get_mut(id).and_then(|n| n.as_traction_mut()) {
            span.section = Some(section);
        }
    }
}

fn link_spans(nodes: &mut NodeRegistry, grid: &SpatialGrid, spans: &[NodeId]) {
    for &id in spans {
        for end in 0..2u8 {
            let Some(span) = nodes.get(id).and_then(|n| n.as_traction()) else {
                continue;
            };
            if span.links[end as usize].is_some() {
                continue;
            }
            let point = span.endpoint(end);
            let Some((other, other_end)) = find_traction(nodes, grid, point, Some(id)) else {
                continue;
            };
            reconcile_sections(nodes, id, other);
            let Ok((a, b)) = nodes.get_pair_mut(id, other) else {
                continue;
            };
            if let (Some(a), Some(b)) = (a.as_traction_mut(), b.as_traction_mut()) {
                a.links[end as usize] = Some(SpanLink {
                    target: other,
                    target_end: other_end,
                });
                b.links[other_end as usize] = Some(SpanLink {
                    target: id,
                    target_end: end,
                });
            }
        }
    }
    for &id in spans {
        if let Some(span) = nodes.get_mut(id).and_then(|n| n.as_traction_mut()) {
            span.where_is();
        }
    }
}

/// When two linked spans disagree on their supply section and exactly one
/// side is a bare named section, the substation reference wins and flows
/// over the section. Two different substations touching is a scenery bug.
fn reconcile_sections(nodes: &mut NodeRegistry, a: NodeId, b: NodeId) {
    let section_of = |nodes: &NodeRegistry, id: NodeId| {
        nodes.get(id).and_then(|n| n.as_traction()).and_then(|s| s.section)
    };
    let (sa, sb) = (section_of(nodes, a), section_of(nodes, b));
    let (Some(sa), Some(sb)) = (sa, sb) else {
        // One side inherits the other's reference.
        let inherited = sa.or(sb);
        if let Some(section) = inherited {
            for id in [a, b] {
                if let Some(span) = nodes.get_mut(id).and_then(|n| n.as_traction_mut())
                    && span.section.is_none()
                {
                    span.section = Some(section);
                }
            }
        }
        return;
    };
    if sa == sb {
        return;
    }
    let is_section = |nodes: &NodeRegistry, id: NodeId| {
        nodes
            .get(id)
            .and_then(|n| n.as_power_source())
            .map(|p| p.is_section)
            .unwrap_or(false)
    };
    match (is_section(nodes, sa), is_section(nodes, sb)) {
        (true, false) => {
            if let Some(span) = nodes.get_mut(a).and_then(|n| n.as_traction_mut()) {
                span.section = Some(sb);
            }
        }
        (false, true) => {
            if let Some(span) = nodes.get_mut(b).and_then(|n| n.as_traction_mut()) {
                span.section = Some(sa);
            }
        }
        _ => {
            error!(?a, ?b, "bad power: conflicting supplies left unmerged");
        }
    }
}

fn build_parallel_rings(nodes: &mut NodeRegistry, spans: &[NodeId]) {
    use std::collections::HashMap;
    let mut groups: HashMap<String, Vec<NodeId>> = HashMap::new();
    for &id in spans {
        if let Some(span) = nodes.get(id).and_then(|n| n.as_traction())
            && !span.parallel_name.is_empty()
            && span.parallel_name != "none"
        {
            groups.entry(span.parallel_name.clone()).or_default().push(id);
        }
    }
    for (_, members) in groups {
        if members.len() < 2 {
            continue;
        }
        for (i, &id) in members.iter().enumerate() {
            let next = members[(i + 1) % members.len()];
            if let Some(span) = nodes.get_mut(id).and_then(|n| n.as_traction_mut()) {
                span.parallel = Some(next);
            }
        }
    }
}

/// Greedy resistance propagation. Spans with a direct substation seed at
/// zero; links carry the far-end value plus the span's own wire; open
/// ends bridge to the nearest span endpoint within [`WIRE_GAP_LIMIT`]
/// over the surrounding sectors. Iterates until no span changes.
fn propagate_resistance(nodes: &mut NodeRegistry, grid: &SpatialGrid, spans: &[NodeId]) {
    // Seeds: spans fed by a real substation.
    for &id in spans {
        let seed = nodes
            .get(id)
            .and_then(|n| n.as_traction())
            .and_then(|s| s.section)
            .filter(|&sec| {
                nodes
                    .get(sec)
                    .and_then(|n| n.as_power_source())
                    .map(|p| !p.is_section)
                    .unwrap_or(false)
            });
        if let Some(section) = seed
            && let Some(span) = nodes.get_mut(id).and_then(|n| n.as_traction_mut())
        {
            span.resistance_calc(0, 0.0, Some(section));
        }
    }

    for _ in 0..64 {
        let mut changed = false;
        for &id in spans {
            let Some(span) = nodes.get(id).and_then(|n| n.as_traction()) else {
                continue;
            };
            let resistance = span.resistance;
            let power = span.power;
            let links = span.links;
            let ends = [span.endpoint(0), span.endpoint(1)];
            if resistance[0] < 0.0 && resistance[1] < 0.0 {
                continue;
            }
            for end in 0..2usize {
                let base = resistance[end];
                if base < 0.0 {
                    continue;
                }
                let source = power[end];
                // Direct link feeds the neighbor's touching end.
                let feed = match links[end] {
                    Some(link) => Some((link.target, link.target_end as usize)),
                    None => nearest_open_end(nodes, grid, id, ends[end]),
                };
                let Some((target, target_end)) = feed else {
                    continue;
                };
                let unknown = nodes
                    .get(target)
                    .and_then(|n| n.as_traction())
                    .map(|s| s.resistance[target_end] < 0.0)
                    .unwrap_or(false);
                if unknown
                    && let Some(other) = nodes.get_mut(target).and_then(|n| n.as_traction_mut())
                {
                    other.resistance_calc(target_end, base, source);
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

/// Nearest other-span endpoint within the gap limit around an open end,
/// over the 3x3 sector window.
fn nearest_open_end(
    nodes: &NodeRegistry,
    grid: &SpatialGrid,
    exclude: NodeId,
    point: Vec3,
) -> Option<(NodeId, usize)> {
    let center = grid.sector_of(point);
    let mut best: Option<(NodeId, usize, f64)> = None;
    for dc in -1..=1 {
        for dr in -1..=1 {
            let coord = crate::id::SectorCoord {
                col: center.col + dc,
                row: center.row + dr,
            };
            let Some(sector) = grid.fast_sector(coord) else {
                continue;
            };
            let mut cursor = sector.nodes;
            while let Some(id) = cursor {
                let node = nodes.get(id);
                cursor = node.and_then(|n| n.next_in_sector);
                if id == exclude {
                    continue;
                }
                let Some(span) = node.and_then(|n| n.as_traction()) else {
                    continue;
                };
                for end in 0..2usize {
                    let d = span.endpoint(end as u8).distance_squared(point).sqrt();
                    if d <= WIRE_GAP_LIMIT
                        && best.map(|(_, _, bd)| d < bd).unwrap_or(true)
                    {
                        best = Some((id, end, d));
                    }
                }
            }
        }
    }
    best.map(|(id, end, _)| (id, end))
}
