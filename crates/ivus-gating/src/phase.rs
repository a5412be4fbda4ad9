use serde::{Deserialize, Serialize};
use std::ops::Range;

use crate::error::GatingError;

/// Cardiac phase attached to one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PhaseLabel {
    #[serde(rename = "D")]
    Diastole,
    #[serde(rename = "S")]
    Systole,
    #[default]
    #[serde(rename = "-")]
    Unmarked,
}

impl PhaseLabel {
    /// One-character code used by persistence collaborators.
    pub fn code(self) -> char {
        match self {
            PhaseLabel::Diastole => 'D',
            PhaseLabel::Systole => 'S',
            PhaseLabel::Unmarked => '-',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'D' => Some(PhaseLabel::Diastole),
            'S' => Some(PhaseLabel::Systole),
            '-' => Some(PhaseLabel::Unmarked),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            PhaseLabel::Diastole => PhaseLabel::Systole,
            PhaseLabel::Systole => PhaseLabel::Diastole,
            PhaseLabel::Unmarked => PhaseLabel::Unmarked,
        }
    }

    pub fn is_marked(self) -> bool {
        self != PhaseLabel::Unmarked
    }
}

/// Which gated frames a navigation step may land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatedFilter {
    Diastole,
    Systole,
    Both,
}

/// Ascending, duplicate-free frame list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortedFrames(Vec<usize>);

impl SortedFrames {
    /// Returns false if the frame was already present.
    pub fn insert(&mut self, frame: usize) -> bool {
        match self.0.binary_search(&frame) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, frame);
                true
            }
        }
    }

    /// Returns false if the frame was absent.
    pub fn remove(&mut self, frame: usize) -> bool {
        match self.0.binary_search(&frame) {
            Ok(pos) => {
                self.0.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, frame: usize) -> bool {
        self.0.binary_search(&frame).is_ok()
    }

    pub fn as_slice(&self) -> &[usize] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// First frame strictly after `frame`.
    pub fn next_after(&self, frame: usize) -> Option<usize> {
        let pos = self.0.partition_point(|&f| f <= frame);
        self.0.get(pos).copied()
    }

    /// Last frame strictly before `frame`.
    pub fn previous_before(&self, frame: usize) -> Option<usize> {
        let pos = self.0.partition_point(|&f| f < frame);
        pos.checked_sub(1).map(|p| self.0[p])
    }

    fn in_range(&self, range: &Range<usize>) -> &[usize] {
        let lo = self.0.partition_point(|&f| f < range.start);
        let hi = self.0.partition_point(|&f| f < range.end);
        &self.0[lo..hi]
    }
}

/// Timeline handle for one labeled frame, rebuilt on every redraw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseMarker {
    pub frame: usize,
    pub label: PhaseLabel,
}

/// Per-frame phase labels of a whole pullback.
///
/// The label array and the two frame lists always agree: a frame is in
/// `diastolic_frames` exactly when its label is `Diastole`, likewise for
/// systole, and no frame is in both. Every mutation either succeeds as a
/// whole or leaves the assignment untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "Vec<PhaseLabel>", from = "Vec<PhaseLabel>")]
pub struct PhaseAssignment {
    labels: Vec<PhaseLabel>,
    diastolic: SortedFrames,
    systolic: SortedFrames,
}

impl PhaseAssignment {
    /// All-unmarked assignment for a pullback of `total_frames`.
    pub fn new(total_frames: usize) -> Self {
        Self {
            labels: vec![PhaseLabel::Unmarked; total_frames],
            diastolic: SortedFrames::default(),
            systolic: SortedFrames::default(),
        }
    }

    /// Rebuild from a persisted label array.
    pub fn from_labels(labels: Vec<PhaseLabel>) -> Self {
        let mut diastolic = SortedFrames::default();
        let mut systolic = SortedFrames::default();
        for (frame, label) in labels.iter().enumerate() {
            match label {
                PhaseLabel::Diastole => diastolic.0.push(frame),
                PhaseLabel::Systole => systolic.0.push(frame),
                PhaseLabel::Unmarked => {}
            }
        }
        Self {
            labels,
            diastolic,
            systolic,
        }
    }

    /// Rebuild from persisted frame lists, rejecting overlaps and
    /// out-of-range frames.
    pub fn from_frames(
        total_frames: usize,
        diastolic: &[usize],
        systolic: &[usize],
    ) -> Result<Self, GatingError> {
        let mut labels = vec![PhaseLabel::Unmarked; total_frames];
        for (frames, label) in [(diastolic, PhaseLabel::Diastole), (systolic, PhaseLabel::Systole)] {
            for &frame in frames {
                let slot = labels.get_mut(frame).ok_or(GatingError::FrameOutOfBounds {
                    frame,
                    total: total_frames,
                })?;
                if slot.is_marked() && *slot != label {
                    return Err(GatingError::InvalidAssignment(format!(
                        "frame {} is both diastolic and systolic",
                        frame
                    )));
                }
                *slot = label;
            }
        }
        Ok(Self::from_labels(labels))
    }

    pub fn total_frames(&self) -> usize {
        self.labels.len()
    }

    pub fn labels(&self) -> &[PhaseLabel] {
        &self.labels
    }

    pub fn label(&self, frame: usize) -> Option<PhaseLabel> {
        self.labels.get(frame).copied()
    }

    pub fn diastolic_frames(&self) -> &[usize] {
        self.diastolic.as_slice()
    }

    pub fn systolic_frames(&self) -> &[usize] {
        self.systolic.as_slice()
    }

    pub fn frames(&self, label: PhaseLabel) -> &[usize] {
        match label {
            PhaseLabel::Diastole => self.diastolic.as_slice(),
            PhaseLabel::Systole => self.systolic.as_slice(),
            PhaseLabel::Unmarked => &[],
        }
    }

    /// True when neither list holds a frame.
    pub fn is_empty(&self) -> bool {
        self.diastolic.is_empty() && self.systolic.is_empty()
    }

    /// Label `frame` as `label`, moving it out of the opposite list in the
    /// same step. `Unmarked` clears the frame. Returns whether anything
    /// changed.
    pub fn set_label(&mut self, frame: usize, label: PhaseLabel) -> Result<bool, GatingError> {
        let current = self.checked_label(frame)?;
        if current == label {
            return Ok(false);
        }
        if let Some(list) = self.list_mut(current) {
            list.remove(frame);
        }
        if let Some(list) = self.list_mut(label) {
            list.insert(frame);
        }
        self.labels[frame] = label;
        Ok(true)
    }

    /// Switch `label` on or off at `frame`. Turning off only clears the frame
    /// if it currently holds `label`.
    pub fn toggle(&mut self, frame: usize, label: PhaseLabel, on: bool) -> Result<bool, GatingError> {
        if on {
            return self.set_label(frame, label);
        }
        if self.checked_label(frame)? == label {
            self.set_label(frame, PhaseLabel::Unmarked)
        } else {
            Ok(false)
        }
    }

    /// Move `label` from `from` (if any) to `to` as a single update.
    ///
    /// The origin is cleared only if it still holds `label`.
    pub fn move_label(
        &mut self,
        from: Option<usize>,
        to: usize,
        label: PhaseLabel,
    ) -> Result<(), GatingError> {
        self.checked_label(to)?;
        let origin_matches = match from {
            Some(f) => self.checked_label(f)? == label,
            None => false,
        };
        if let (Some(f), true) = (from, origin_matches) {
            if f == to {
                return Ok(());
            }
            self.set_label(f, PhaseLabel::Unmarked)?;
        }
        self.set_label(to, label)?;
        Ok(())
    }

    /// Unmark every frame in `range`. Returns the number of frames cleared.
    pub fn reset_range(&mut self, range: Range<usize>) -> Result<usize, GatingError> {
        self.check_range(&range)?;
        let mut cleared = 0;
        for frame in range {
            if self.set_label(frame, PhaseLabel::Unmarked)? {
                cleared += 1;
            }
        }
        Ok(cleared)
    }

    /// Swap diastole and systole for every labeled frame in `range`.
    pub fn switch_range(&mut self, range: Range<usize>) -> Result<usize, GatingError> {
        self.check_range(&range)?;
        let mut switched = 0;
        for frame in range {
            let current = self.labels[frame];
            if current.is_marked() {
                self.set_label(frame, current.opposite())?;
                switched += 1;
            }
        }
        Ok(switched)
    }

    /// Replace every label in `range` with the two given groups. Validated
    /// up front so a bad group leaves the assignment untouched.
    pub fn commit_range(
        &mut self,
        range: Range<usize>,
        diastole: &[usize],
        systole: &[usize],
    ) -> Result<(), GatingError> {
        self.check_range(&range)?;
        for &frame in diastole.iter().chain(systole) {
            if !range.contains(&frame) {
                return Err(GatingError::InvalidAssignment(format!(
                    "frame {} outside committed range {}..{}",
                    frame, range.start, range.end
                )));
            }
        }
        if let Some(frame) = diastole.iter().find(|f| systole.contains(f)) {
            return Err(GatingError::InvalidAssignment(format!(
                "frame {} is both diastolic and systolic",
                frame
            )));
        }

        self.reset_range(range)?;
        for &frame in diastole {
            self.set_label(frame, PhaseLabel::Diastole)?;
        }
        for &frame in systole {
            self.set_label(frame, PhaseLabel::Systole)?;
        }
        Ok(())
    }

    /// Markers for the labeled frames inside `range`, in frame order.
    pub fn markers(&self, range: Range<usize>) -> Vec<PhaseMarker> {
        let mut markers: Vec<PhaseMarker> = self
            .diastolic
            .in_range(&range)
            .iter()
            .map(|&frame| PhaseMarker {
                frame,
                label: PhaseLabel::Diastole,
            })
            .chain(self.systolic.in_range(&range).iter().map(|&frame| PhaseMarker {
                frame,
                label: PhaseLabel::Systole,
            }))
            .collect();
        markers.sort_by_key(|m| m.frame);
        markers
    }

    /// Next gated frame after `current`.
    pub fn next_gated(&self, filter: GatedFilter, current: usize) -> Option<usize> {
        let d = self.diastolic.next_after(current);
        let s = self.systolic.next_after(current);
        match filter {
            GatedFilter::Diastole => d,
            GatedFilter::Systole => s,
            GatedFilter::Both => d.into_iter().chain(s).min(),
        }
    }

    /// Previous gated frame before `current`.
    pub fn previous_gated(&self, filter: GatedFilter, current: usize) -> Option<usize> {
        let d = self.diastolic.previous_before(current);
        let s = self.systolic.previous_before(current);
        match filter {
            GatedFilter::Diastole => d,
            GatedFilter::Systole => s,
            GatedFilter::Both => d.into_iter().chain(s).max(),
        }
    }

    /// Check that lists and labels agree; used by tests and after restore.
    pub fn is_consistent(&self) -> bool {
        let sorted = |list: &SortedFrames| list.0.windows(2).all(|w| w[0] < w[1]);
        if !sorted(&self.diastolic) || !sorted(&self.systolic) {
            return false;
        }
        self.labels.iter().enumerate().all(|(frame, label)| {
            let d = self.diastolic.contains(frame);
            let s = self.systolic.contains(frame);
            match label {
                PhaseLabel::Diastole => d && !s,
                PhaseLabel::Systole => s && !d,
                PhaseLabel::Unmarked => !d && !s,
            }
        }) && self.diastolic.len() + self.systolic.len()
            == self.labels.iter().filter(|l| l.is_marked()).count()
    }

    fn checked_label(&self, frame: usize) -> Result<PhaseLabel, GatingError> {
        self.label(frame).ok_or(GatingError::FrameOutOfBounds {
            frame,
            total: self.labels.len(),
        })
    }

    fn check_range(&self, range: &Range<usize>) -> Result<(), GatingError> {
        if range.end > self.labels.len() || range.start > range.end {
            return Err(GatingError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                total: self.labels.len(),
            });
        }
        Ok(())
    }

    fn list_mut(&mut self, label: PhaseLabel) -> Option<&mut SortedFrames> {
        match label {
            PhaseLabel::Diastole => Some(&mut self.diastolic),
            PhaseLabel::Systole => Some(&mut self.systolic),
            PhaseLabel::Unmarked => None,
        }
    }
}

impl From<PhaseAssignment> for Vec<PhaseLabel> {
    fn from(assignment: PhaseAssignment) -> Self {
        assignment.labels
    }
}

impl From<Vec<PhaseLabel>> for PhaseAssignment {
    fn from(labels: Vec<PhaseLabel>) -> Self {
        PhaseAssignment::from_labels(labels)
    }
}

/// Collapse frame numbers into runs, e.g. `[12, 13, 14, 15, 20]` becomes
/// `"12-15, 20"`.
pub fn format_frame_runs(frames: &[usize]) -> String {
    let mut sorted = frames.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(mut start) = iter.next() else {
        return String::new();
    };
    let mut end = start;
    for frame in iter {
        if frame == end + 1 {
            end = frame;
            continue;
        }
        parts.push(run_text(start, end));
        start = frame;
        end = frame;
    }
    parts.push(run_text(start, end));
    parts.join(", ")
}

fn run_text(start: usize, end: usize) -> String {
    if start == end {
        start.to_string()
    } else {
        format!("{}-{}", start, end)
    }
}
