//! Pointer-driven correction of phase markers.
//!
//! [`transition`] is a pure function over [`CorrectionState`]; the
//! [`CorrectionController`] feeds it pointer events and applies the
//! resulting commits to a [`PhaseAssignment`]. Nothing is written before the
//! pointer is released, so a cancelled drag leaves the assignment as it was.

use std::ops::Range;

use crate::error::GatingError;
use crate::phase::{PhaseAssignment, PhaseLabel, PhaseMarker};

/// Smallest pick distance in frames, for short ranges.
const MIN_PICK_TOLERANCE: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorrectionState {
    #[default]
    Idle,
    /// Pointer down, not moved yet
    Selecting {
        origin: Option<usize>,
        frame: usize,
        tentative_label: PhaseLabel,
    },
    Dragging {
        origin: Option<usize>,
        frame: usize,
        tentative_label: PhaseLabel,
    },
}

/// Pointer input in timeline coordinates (fractional frame numbers).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PointerEvent {
    Press(f64),
    /// `None` when the pointer is outside the plot
    Move(Option<f64>),
    Release,
    Leave,
}

/// What the interactive view should render or do in response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerEvent {
    Selected { frame: usize, label: PhaseLabel },
    Added { frame: usize, label: PhaseLabel },
    Moved { frame: usize, label: PhaseLabel },
    SliderTo(usize),
    Commit {
        from: Option<usize>,
        to: usize,
        label: PhaseLabel,
    },
    Cancelled { origin: Option<usize> },
}

/// Read-only view of the timeline at the time of an event.
#[derive(Debug, Clone)]
pub struct TimelineView<'a> {
    pub range: Range<usize>,
    pub markers: &'a [PhaseMarker],
    /// Label given to markers placed on an empty spot
    pub active_phase: PhaseLabel,
}

impl TimelineView<'_> {
    fn frame_at(&self, x: f64) -> Option<usize> {
        if !x.is_finite() {
            return None;
        }
        let f = x.round();
        if f < self.range.start as f64 || f >= self.range.end as f64 {
            return None;
        }
        Some(f as usize)
    }

    fn tolerance(&self) -> f64 {
        (self.range.len() as f64 / 100.0).max(MIN_PICK_TOLERANCE)
    }

    fn marker_near(&self, x: f64) -> Option<PhaseMarker> {
        let tolerance = self.tolerance();
        self.markers
            .iter()
            .map(|m| (m, (m.frame as f64 - x).abs()))
            .filter(|(_, d)| *d < tolerance)
            .min_by(|a, b| a.1.total_cmp(&b.1))
            .map(|(m, _)| *m)
    }
}

pub fn transition(
    state: CorrectionState,
    event: PointerEvent,
    view: &TimelineView<'_>,
) -> (CorrectionState, Vec<MarkerEvent>) {
    use CorrectionState::*;

    match (state, event) {
        (Idle, PointerEvent::Press(x)) => press(x, view),
        (Selecting { origin, .. } | Dragging { origin, .. }, PointerEvent::Press(x)) => {
            // release was lost; drop the pending marker first
            let (next, mut events) = press(x, view);
            events.insert(0, MarkerEvent::Cancelled { origin });
            (next, events)
        }

        (
            Selecting {
                origin,
                tentative_label,
                ..
            }
            | Dragging {
                origin,
                tentative_label,
                ..
            },
            PointerEvent::Move(x),
        ) => match x.and_then(|x| view.frame_at(x)) {
            Some(frame) => (
                Dragging {
                    origin,
                    frame,
                    tentative_label,
                },
                vec![
                    MarkerEvent::Moved {
                        frame,
                        label: tentative_label,
                    },
                    MarkerEvent::SliderTo(frame),
                ],
            ),
            None => (Idle, vec![MarkerEvent::Cancelled { origin }]),
        },

        (Selecting { origin, .. } | Dragging { origin, .. }, PointerEvent::Leave) => {
            (Idle, vec![MarkerEvent::Cancelled { origin }])
        }

        (Selecting { origin: Some(_), .. }, PointerEvent::Release) => (Idle, Vec::new()),
        (
            Selecting {
                origin: None,
                frame,
                tentative_label,
            },
            PointerEvent::Release,
        ) => (
            Idle,
            vec![MarkerEvent::Commit {
                from: None,
                to: frame,
                label: tentative_label,
            }],
        ),

        (
            Dragging {
                origin,
                frame,
                tentative_label,
            },
            PointerEvent::Release,
        ) => (
            Idle,
            vec![MarkerEvent::Commit {
                from: origin,
                to: frame,
                label: tentative_label,
            }],
        ),

        (Idle, _) => (Idle, Vec::new()),
    }
}

fn press(x: f64, view: &TimelineView<'_>) -> (CorrectionState, Vec<MarkerEvent>) {
    if let Some(marker) = view.marker_near(x) {
        return (
            CorrectionState::Selecting {
                origin: Some(marker.frame),
                frame: marker.frame,
                tentative_label: marker.label,
            },
            vec![
                MarkerEvent::Selected {
                    frame: marker.frame,
                    label: marker.label,
                },
                MarkerEvent::SliderTo(marker.frame),
            ],
        );
    }

    let Some(frame) = view.frame_at(x) else {
        return (CorrectionState::Idle, Vec::new());
    };
    if !view.active_phase.is_marked() {
        // plain navigation click
        return (CorrectionState::Idle, vec![MarkerEvent::SliderTo(frame)]);
    }
    (
        CorrectionState::Selecting {
            origin: None,
            frame,
            tentative_label: view.active_phase,
        },
        vec![
            MarkerEvent::Added {
                frame,
                label: view.active_phase,
            },
            MarkerEvent::SliderTo(frame),
        ],
    )
}

/// Drives [`transition`] for one analyzed frame range.
#[derive(Debug, Clone)]
pub struct CorrectionController {
    state: CorrectionState,
    active_phase: PhaseLabel,
    range: Range<usize>,
}

impl CorrectionController {
    pub fn new(range: Range<usize>) -> Self {
        Self {
            state: CorrectionState::Idle,
            active_phase: PhaseLabel::Unmarked,
            range,
        }
    }

    pub fn state(&self) -> CorrectionState {
        self.state
    }

    pub fn range(&self) -> Range<usize> {
        self.range.clone()
    }

    pub fn active_phase(&self) -> PhaseLabel {
        self.active_phase
    }

    pub fn set_active_phase(&mut self, label: PhaseLabel) {
        self.active_phase = label;
    }

    /// Feed one pointer event. A commit is applied before returning; the
    /// controller is back in `Idle` even if the commit fails.
    pub fn handle(
        &mut self,
        event: PointerEvent,
        assignment: &mut PhaseAssignment,
    ) -> Result<Vec<MarkerEvent>, GatingError> {
        let markers = assignment.markers(self.range.clone());
        let view = TimelineView {
            range: self.range.clone(),
            markers: &markers,
            active_phase: self.active_phase,
        };
        let (next, events) = transition(self.state, event, &view);
        self.state = next;

        for event in &events {
            if let MarkerEvent::Commit { from, to, label } = *event {
                assignment.move_label(from, to, label)?;
                log::debug!("Moved {:?} marker {:?} -> {}", label, from, to);
            }
        }
        Ok(events)
    }

    /// Toggle `label` at `frame`; turning a phase on makes it the active one.
    pub fn toggle(
        &mut self,
        frame: usize,
        label: PhaseLabel,
        on: bool,
        assignment: &mut PhaseAssignment,
    ) -> Result<bool, GatingError> {
        let changed = assignment.toggle(frame, label, on)?;
        if on {
            self.active_phase = label;
        } else if self.active_phase == label {
            self.active_phase = PhaseLabel::Unmarked;
        }
        Ok(changed)
    }

    /// Unmark every frame of the controlled range.
    pub fn reset_phases(&mut self, assignment: &mut PhaseAssignment) -> Result<usize, GatingError> {
        self.state = CorrectionState::Idle;
        assignment.reset_range(self.range.clone())
    }

    /// Swap diastole and systole within the controlled range.
    pub fn switch_phases(&mut self, assignment: &mut PhaseAssignment) -> Result<usize, GatingError> {
        self.state = CorrectionState::Idle;
        assignment.switch_range(self.range.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view<'a>(markers: &'a [PhaseMarker], active: PhaseLabel) -> TimelineView<'a> {
        TimelineView {
            range: 0..200,
            markers,
            active_phase: active,
        }
    }

    fn marker(frame: usize, label: PhaseLabel) -> PhaseMarker {
        PhaseMarker { frame, label }
    }

    #[test]
    fn test_press_near_marker_selects() {
        let markers = [marker(40, PhaseLabel::Diastole), marker(80, PhaseLabel::Systole)];
        let (state, events) = transition(
            CorrectionState::Idle,
            PointerEvent::Press(80.9),
            &view(&markers, PhaseLabel::Unmarked),
        );
        assert_eq!(
            state,
            CorrectionState::Selecting {
                origin: Some(80),
                frame: 80,
                tentative_label: PhaseLabel::Systole
            }
        );
        assert_eq!(events[1], MarkerEvent::SliderTo(80));
    }

    #[test]
    fn test_press_empty_uses_active_phase() {
        let (state, events) = transition(
            CorrectionState::Idle,
            PointerEvent::Press(10.2),
            &view(&[], PhaseLabel::Diastole),
        );
        assert!(matches!(
            state,
            CorrectionState::Selecting { origin: None, frame: 10, .. }
        ));
        assert_eq!(
            events[0],
            MarkerEvent::Added {
                frame: 10,
                label: PhaseLabel::Diastole
            }
        );

        let (state, events) = transition(
            CorrectionState::Idle,
            PointerEvent::Press(10.2),
            &view(&[], PhaseLabel::Unmarked),
        );
        assert_eq!(state, CorrectionState::Idle);
        assert_eq!(events, vec![MarkerEvent::SliderTo(10)]);
    }

    #[test]
    fn test_idle_ignores_move_and_release() {
        let v = view(&[], PhaseLabel::Diastole);
        for event in [PointerEvent::Move(Some(3.0)), PointerEvent::Release, PointerEvent::Leave] {
            let (state, events) = transition(CorrectionState::Idle, event, &v);
            assert_eq!(state, CorrectionState::Idle);
            assert!(events.is_empty());
        }
    }

    #[test]
    fn test_drag_then_release_commits_move() {
        let markers = [marker(40, PhaseLabel::Diastole)];
        let v = view(&markers, PhaseLabel::Unmarked);
        let (s, _) = transition(CorrectionState::Idle, PointerEvent::Press(40.0), &v);
        let (s, events) = transition(s, PointerEvent::Move(Some(46.4)), &v);
        assert_eq!(events[1], MarkerEvent::SliderTo(46));
        let (s, events) = transition(s, PointerEvent::Release, &v);
        assert_eq!(s, CorrectionState::Idle);
        assert_eq!(
            events,
            vec![MarkerEvent::Commit {
                from: Some(40),
                to: 46,
                label: PhaseLabel::Diastole
            }]
        );
    }

    #[test]
    fn test_leaving_cancels() {
        let markers = [marker(40, PhaseLabel::Diastole)];
        let v = view(&markers, PhaseLabel::Unmarked);
        let (s, _) = transition(CorrectionState::Idle, PointerEvent::Press(40.0), &v);
        let (s, _) = transition(s, PointerEvent::Move(Some(50.0)), &v);
        let (s, events) = transition(s, PointerEvent::Move(None), &v);
        assert_eq!(s, CorrectionState::Idle);
        assert_eq!(events, vec![MarkerEvent::Cancelled { origin: Some(40) }]);

        let (s, _) = transition(CorrectionState::Idle, PointerEvent::Press(40.0), &v);
        let (s, events) = transition(s, PointerEvent::Move(Some(250.0)), &v);
        assert_eq!(s, CorrectionState::Idle);
        assert_eq!(events, vec![MarkerEvent::Cancelled { origin: Some(40) }]);
    }

    #[test]
    fn test_release_without_drag() {
        let markers = [marker(40, PhaseLabel::Systole)];
        let v = view(&markers, PhaseLabel::Systole);
        let (s, _) = transition(CorrectionState::Idle, PointerEvent::Press(40.0), &v);
        let (s, events) = transition(s, PointerEvent::Release, &v);
        assert_eq!(s, CorrectionState::Idle);
        assert!(events.is_empty());
    }

    #[test]
    fn test_controller_commits_on_release_only() {
        let mut assignment = PhaseAssignment::from_frames(200, &[40], &[90]).unwrap();
        let mut controller = CorrectionController::new(0..200);

        controller.handle(PointerEvent::Press(40.0), &mut assignment).unwrap();
        controller.handle(PointerEvent::Move(Some(44.0)), &mut assignment).unwrap();
        assert_eq!(assignment.diastolic_frames(), &[40]);
        controller.handle(PointerEvent::Move(Some(47.0)), &mut assignment).unwrap();
        controller.handle(PointerEvent::Release, &mut assignment).unwrap();
        assert_eq!(assignment.diastolic_frames(), &[47]);
        assert_eq!(assignment.systolic_frames(), &[90]);

        // cancelled drag changes nothing
        let before = assignment.clone();
        controller.handle(PointerEvent::Press(90.0), &mut assignment).unwrap();
        controller.handle(PointerEvent::Move(Some(120.0)), &mut assignment).unwrap();
        controller.handle(PointerEvent::Leave, &mut assignment).unwrap();
        assert_eq!(assignment, before);
        assert_eq!(controller.state(), CorrectionState::Idle);
    }

    #[test]
    fn test_controller_adds_with_active_phase() {
        let mut assignment = PhaseAssignment::new(200);
        let mut controller = CorrectionController::new(0..200);
        controller
            .toggle(10, PhaseLabel::Systole, true, &mut assignment)
            .unwrap();
        assert_eq!(controller.active_phase(), PhaseLabel::Systole);

        controller.handle(PointerEvent::Press(60.0), &mut assignment).unwrap();
        controller.handle(PointerEvent::Release, &mut assignment).unwrap();
        assert_eq!(assignment.systolic_frames(), &[10, 60]);

        controller
            .toggle(60, PhaseLabel::Systole, false, &mut assignment)
            .unwrap();
        assert_eq!(controller.active_phase(), PhaseLabel::Unmarked);
        assert_eq!(assignment.systolic_frames(), &[10]);
    }

    #[test]
    fn test_controller_reset_and_switch() {
        let mut assignment = PhaseAssignment::from_frames(300, &[20, 250], &[30]).unwrap();
        let mut controller = CorrectionController::new(0..200);
        assert_eq!(controller.switch_phases(&mut assignment).unwrap(), 2);
        assert_eq!(assignment.diastolic_frames(), &[30, 250]);
        assert_eq!(controller.reset_phases(&mut assignment).unwrap(), 2);
        assert_eq!(assignment.diastolic_frames(), &[250]);
        assert!(assignment.systolic_frames().is_empty());
    }
}
