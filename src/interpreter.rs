//! The category-map interpreter (C5, §4.5): resolves a pointer coordinate
//! or input submission to a category, dispatches by `Behavior`, and builds
//! the outbound intent (an event to emit, or a local-only effect).
//!
//! This module is deliberately transport-agnostic: it never touches a
//! socket. A client implementation calls [`lookup`] on its current `Page`
//! and feeds the result to [`dispatch`]; a server re-validates an inbound
//! `PIXINP` the same way via [`validate_input`]. Stateful pieces (debounce,
//! drag, scroll rate limiting) are plain structs the caller owns per
//! session, with no locking needed since a `Page` is immutable after
//! publication.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::page::{Behavior, CategoryDef, NavigateTarget, Page, ValidationFlags};
use crate::url::PixnetUrl;

/// A pointer or keyboard action, with the modifier mask in effect (§4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerAction {
    /// Button pressed.
    Down,
    /// Button released.
    Up,
    /// Pointer moved without a button transition.
    Move,
    /// A complete click (down+up at the same pixel).
    Click,
    /// A complete double-click.
    DoubleClick,
    /// A key press while this zone has focus.
    KeyPress,
}

/// A single pointer/keyboard input at a pixel coordinate.
#[derive(Debug, Clone, Copy)]
pub struct PointerEvent {
    /// Pixel X coordinate.
    pub x: u16,
    /// Pixel Y coordinate.
    pub y: u16,
    /// The action performed.
    pub action: PointerAction,
    /// Modifier key mask in effect.
    pub modifiers: u8,
}

/// Result of resolving a pixel coordinate against a `Page`'s category map.
#[derive(Debug)]
pub enum LookupOutcome<'a> {
    /// `category_map[pixel] == 0`; no behavior attached.
    NoBehavior,
    /// Resolved to a concrete category definition.
    Found(&'a CategoryDef),
    /// `category_map[pixel]` referenced a category ID absent from
    /// `page.categories` — an inconsistent page (§4.5 step 2).
    InvalidZone(u16),
    /// The coordinate is outside the page's raster.
    OutOfBounds,
}

/// Looks up the category at `(x, y)` (§4.5 step 1-2).
#[must_use]
pub fn lookup(page: &Page, x: u16, y: u16) -> LookupOutcome<'_> {
    let Some(cid) = page.category_map.get(x, y) else {
        return LookupOutcome::OutOfBounds;
    };
    if cid == 0 {
        return LookupOutcome::NoBehavior;
    }
    match page.categories.get(&cid) {
        Some(def) => LookupOutcome::Found(def),
        None => LookupOutcome::InvalidZone(cid),
    }
}

/// Resolves the winning category among several candidates mapped to the
/// same region: higher `priority` wins; on a tie, the smaller ID wins
/// (§4.5 priority tie-break, §8 testable property).
#[must_use]
pub fn resolve_priority<'a>(candidates: &[&'a CategoryDef]) -> Option<&'a CategoryDef> {
    candidates
        .iter()
        .copied()
        .max_by(|a, b| a.priority.cmp(&b.priority).then_with(|| b.id.cmp(&a.id)))
}

/// The outcome of dispatching a pointer event through a resolved category's
/// behavior (§4.5 step 3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundIntent {
    /// Emit a `"navigate"` request.
    Navigate {
        /// Parsed target URL.
        url: PixnetUrl,
        /// Same-context vs. new-context navigation.
        target: NavigateTarget,
    },
    /// Emit a `PIXEVT` for an `EmitEvent` behavior.
    Emit {
        /// Zone the event originated from.
        zone_id: u16,
        /// Event name to report.
        name: String,
        /// Application-defined event type tag.
        event_type: String,
    },
    /// A drag/drop state transition to report via `PIXDRG`.
    Drag {
        /// Drag lifecycle stage.
        event_type: u8,
        /// Source zone.
        src: u16,
        /// Target zone, 0 if none.
        dst: u16,
    },
    /// A scroll position update to report via `PIXSCR`.
    Scroll {
        /// Scrollable zone.
        zone_id: u16,
    },
    /// Purely client-side; no outbound message (HoverEffect, ClickEffect, MediaZone in v1).
    NoOutbound,
    /// The event was suppressed (debounce window, scroll rate limit).
    Suppressed,
    /// The category resolved but its behavior rejected this action locally
    /// (e.g. an unparseable Navigate URL).
    LocalError(String),
}

/// Dispatches a resolved category's behavior against a pointer action
/// (§4.5 step 3). Stateful behaviors (EmitEvent debounce, DragZone/DropZone,
/// ScrollZone rate limiting) are handled by the caller using
/// [`DebounceTracker`], [`DragCoordinator`], and [`ScrollGate`] respectively —
/// this function only covers the stateless dispatch rules.
#[must_use]
pub fn dispatch(def: &CategoryDef, _action: PointerAction) -> OutboundIntent {
    match &def.behavior {
        Behavior::Navigate { url, target } => match PixnetUrl::parse(url) {
            Ok(parsed) => OutboundIntent::Navigate { url: parsed, target: *target },
            Err(e) => OutboundIntent::LocalError(e.to_string()),
        },
        Behavior::EmitEvent { event_name, event_type, .. } => OutboundIntent::Emit {
            zone_id: def.id,
            name: event_name.clone(),
            event_type: event_type.clone(),
        },
        Behavior::InputZone { .. } => OutboundIntent::NoOutbound,
        Behavior::HoverEffect | Behavior::ClickEffect => OutboundIntent::NoOutbound,
        Behavior::DragZone { zone_id } => OutboundIntent::Drag {
            event_type: 0,
            src: *zone_id,
            dst: 0,
        },
        Behavior::DropZone { zone_id } => OutboundIntent::Drag {
            event_type: 2,
            src: 0,
            dst: *zone_id,
        },
        Behavior::ScrollZone { zone_id } => OutboundIntent::Scroll { zone_id: *zone_id },
        Behavior::MediaZone { .. } => OutboundIntent::NoOutbound,
    }
}

/// Tracks the last emission time of each `(zone, event_name)` pair to
/// implement `EmitEvent`'s debounce rule (§4.5 step 3.2, §8 debounce
/// property).
#[derive(Debug, Default)]
pub struct DebounceTracker {
    last_emitted: HashMap<(u16, String), Instant>,
}

impl DebounceTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` (and records `now`) if an emission for `(zone_id,
    /// event_name)` is allowed — i.e. at least `debounce_ms` have elapsed
    /// since the last one, or there was none.
    pub fn should_emit(&mut self, zone_id: u16, event_name: &str, debounce_ms: u32, now: Instant) -> bool {
        let key = (zone_id, event_name.to_string());
        let allowed = match self.last_emitted.get(&key) {
            Some(last) => now.duration_since(*last) >= Duration::from_millis(debounce_ms as u64),
            None => true,
        };
        if allowed {
            self.last_emitted.insert(key, now);
        }
        allowed
    }
}

/// Validates an `InputZone` submission against its `ValidationFlags`,
/// returning the `validation_status` byte to report in `PIXINP`
/// (0 = passed, 1 = failed; §4.5 step 3.3).
#[must_use]
pub fn validate_input(flags: ValidationFlags, payload: &[u8]) -> u8 {
    if flags.required && payload.is_empty() {
        return 1;
    }
    let Ok(text) = std::str::from_utf8(payload) else {
        return 1;
    };
    if flags.numeric && !text.trim().is_empty() && text.trim().parse::<f64>().is_err() {
        return 1;
    }
    if flags.email && !looks_like_email(text) {
        return 1;
    }
    0
}

fn looks_like_email(text: &str) -> bool {
    let Some((local, domain)) = text.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

/// Lifecycle state of a `DragZone`/`DropZone` pair (§4.5 steps 3.6-3.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragState {
    /// No drag in progress.
    Idle,
    /// A drag started from `src` and has not yet dropped or cancelled.
    Dragging {
        /// Source zone identifier.
        src: u16,
    },
    /// The drag ended by dropping onto a `DropZone`.
    Dropped,
    /// The drag ended without a drop.
    Cancelled,
}

/// Drives the Idle→Dragging→Dropped/Cancelled state machine for one
/// in-flight drag gesture.
#[derive(Debug, Default)]
pub struct DragCoordinator {
    state: DragState,
}

impl DragCoordinator {
    /// Starts tracking with no drag in progress.
    #[must_use]
    pub fn new() -> Self {
        Self { state: DragState::Idle }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> DragState {
        self.state
    }

    /// Begins a drag from `src`. No-op (returns `false`) if a drag is
    /// already in progress.
    pub fn start(&mut self, src: u16) -> bool {
        if matches!(self.state, DragState::Dragging { .. }) {
            return false;
        }
        self.state = DragState::Dragging { src };
        true
    }

    /// Completes the drag onto `dst`, transitioning to `Dropped`. Returns
    /// the source zone if a drag was in progress.
    pub fn drop_onto(&mut self, _dst: u16) -> Option<u16> {
        if let DragState::Dragging { src } = self.state {
            self.state = DragState::Dropped;
            Some(src)
        } else {
            None
        }
    }

    /// Cancels an in-progress drag.
    pub fn cancel(&mut self) {
        if matches!(self.state, DragState::Dragging { .. }) {
            self.state = DragState::Cancelled;
        }
    }

    /// Resets to `Idle`, ready for the next gesture.
    pub fn reset(&mut self) {
        self.state = DragState::Idle;
    }
}

impl Default for DragState {
    fn default() -> Self {
        Self::Idle
    }
}

/// Rate-limits `ScrollZone` updates to at most once per frame interval
/// (§4.5 step 3.8).
#[derive(Debug, Default)]
pub struct ScrollGate {
    last_emit: Option<Instant>,
}

impl ScrollGate {
    /// Creates a gate with no prior emission.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` (and records `now`) if enough time has passed since
    /// the last allowed scroll update.
    pub fn allow(&mut self, now: Instant, frame_interval: Duration) -> bool {
        let allowed = match self.last_emit {
            Some(last) => now.duration_since(last) >= frame_interval,
            None => true,
        };
        if allowed {
            self.last_emit = Some(now);
        }
        allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::{CategoryMap, PixelBuffer, PixelFormat};
    use std::collections::HashMap as Map;

    fn def(id: u16, priority: u8, behavior: Behavior) -> CategoryDef {
        CategoryDef {
            id,
            name: format!("cat-{id}"),
            priority,
            behavior,
            extended_properties: Vec::new(),
        }
    }

    fn page_with(categories: Map<u16, CategoryDef>, ids: Vec<u16>) -> Page {
        let pixels = PixelBuffer::new(2, 2, PixelFormat::Rgba8, vec![0u8; 16]).unwrap();
        let category_map = CategoryMap::new(2, 2, ids).unwrap();
        Page {
            pixels,
            category_map,
            categories,
            metadata: None,
            animation: None,
            audio: None,
            extended_metadata: None,
        }
    }

    #[test]
    fn lookup_no_behavior_at_zero() {
        let page = page_with(Map::new(), vec![0, 0, 0, 0]);
        assert!(matches!(lookup(&page, 0, 0), LookupOutcome::NoBehavior));
    }

    #[test]
    fn lookup_invalid_zone_when_category_missing() {
        let page = page_with(Map::new(), vec![7, 0, 0, 0]);
        assert!(matches!(lookup(&page, 0, 0), LookupOutcome::InvalidZone(7)));
    }

    #[test]
    fn lookup_out_of_bounds() {
        let page = page_with(Map::new(), vec![0, 0, 0, 0]);
        assert!(matches!(lookup(&page, 9, 9), LookupOutcome::OutOfBounds));
    }

    #[test]
    fn priority_resolution_prefers_higher_priority() {
        let a = def(1, 10, Behavior::HoverEffect);
        let b = def(2, 20, Behavior::HoverEffect);
        let winner = resolve_priority(&[&a, &b]).unwrap();
        assert_eq!(winner.id, 2);
    }

    #[test]
    fn priority_resolution_flips_with_swapped_priorities() {
        let a = def(1, 20, Behavior::HoverEffect);
        let b = def(2, 10, Behavior::HoverEffect);
        let winner = resolve_priority(&[&a, &b]).unwrap();
        assert_eq!(winner.id, 1);
    }

    #[test]
    fn priority_resolution_tie_prefers_lower_id() {
        let a = def(5, 10, Behavior::HoverEffect);
        let b = def(2, 10, Behavior::HoverEffect);
        let winner = resolve_priority(&[&a, &b]).unwrap();
        assert_eq!(winner.id, 2);
    }

    #[test]
    fn dispatch_navigate_emits_intent() {
        let category = def(
            7,
            0,
            Behavior::Navigate {
                url: "pixnet://example/next".to_string(),
                target: NavigateTarget::Same,
            },
        );
        match dispatch(&category, PointerAction::Click) {
            OutboundIntent::Navigate { url, .. } => assert_eq!(url.path, "/next"),
            other => panic!("unexpected intent: {other:?}"),
        }
    }

    #[test]
    fn dispatch_navigate_rejects_bad_url() {
        let category = def(
            7,
            0,
            Behavior::Navigate {
                url: "not-a-url".to_string(),
                target: NavigateTarget::Same,
            },
        );
        assert!(matches!(dispatch(&category, PointerAction::Click), OutboundIntent::LocalError(_)));
    }

    #[test]
    fn debounce_suppresses_rapid_repeats() {
        let mut tracker = DebounceTracker::new();
        let t0 = Instant::now();
        assert!(tracker.should_emit(1, "click", 100, t0));
        assert!(!tracker.should_emit(1, "click", 100, t0 + Duration::from_millis(50)));
        assert!(tracker.should_emit(1, "click", 100, t0 + Duration::from_millis(150)));
    }

    #[test]
    fn validate_input_required_rejects_empty() {
        assert_eq!(
            validate_input(
                ValidationFlags {
                    required: true,
                    numeric: false,
                    email: false,
                    custom: false
                },
                b""
            ),
            1
        );
    }

    #[test]
    fn validate_input_email_accepts_plausible_address() {
        assert_eq!(
            validate_input(
                ValidationFlags {
                    required: false,
                    numeric: false,
                    email: true,
                    custom: false
                },
                b"a@b.com"
            ),
            0
        );
    }

    #[test]
    fn drag_coordinator_start_drop_cycle() {
        let mut drag = DragCoordinator::new();
        assert!(drag.start(3));
        assert_eq!(drag.drop_onto(9), Some(3));
        assert_eq!(drag.state(), DragState::Dropped);
    }

    #[test]
    fn drag_coordinator_cancel() {
        let mut drag = DragCoordinator::new();
        drag.start(3);
        drag.cancel();
        assert_eq!(drag.state(), DragState::Cancelled);
    }

    #[test]
    fn scroll_gate_rate_limits() {
        let mut gate = ScrollGate::new();
        let t0 = Instant::now();
        let interval = Duration::from_millis(16);
        assert!(gate.allow(t0, interval));
        assert!(!gate.allow(t0 + Duration::from_millis(5), interval));
        assert!(gate.allow(t0 + Duration::from_millis(20), interval));
    }
}
