use std::cell::Cell;
use std::f64::consts::PI;
use std::io::Write;
use std::ops::Range;

use ivus_gating::{
    assign_groups, ClassifierState, ContourMetrics, ContourStore, GatingConfig, GatingError, GatingRequest,
    ImageStore, PhaseAssignment, PhaseLabel, PullbackSession,
};
use ndarray::{Array1, Array3, ArrayView3};

const FPS: f64 = 30.0;

fn beat(frame: usize) -> f64 {
    (2.0 * PI * 1.2 * frame as f64 / FPS).sin()
}

/// Image stack that counts how often frames were requested.
struct CountingImages {
    stack: Array3<u8>,
    reads: Cell<usize>,
}

impl CountingImages {
    fn new(n: usize) -> Self {
        let stack = Array3::from_shape_fn((n, 32, 32), |(f, r, c)| {
            let texture = ((r * 11 + c * 5) % 40) as f64;
            (texture + 80.0 + 50.0 * beat(f) * (c as f64 / 32.0)).clamp(0.0, 255.0) as u8
        });
        Self {
            stack,
            reads: Cell::new(0),
        }
    }
}

impl ImageStore for CountingImages {
    fn frame_count(&self) -> usize {
        self.stack.frame_count()
    }

    fn frames(&self, range: Range<usize>) -> Option<ArrayView3<'_, u8>> {
        self.reads.set(self.reads.get() + 1);
        self.stack.frames(range)
    }
}

fn contours(n: usize) -> Vec<Option<ContourMetrics>> {
    (0..n)
        .map(|f| {
            Some(ContourMetrics {
                shortest_distance: 1.8 + 0.2 * beat(f),
                vector_angle: 0.4 * beat(f + 3),
                vector_length: 0.1 + 0.03 * beat(f + 1),
                elliptic_ratio: 1.15 + 0.05 * beat(f),
            })
        })
        .collect()
}

/// Session whose assignment already holds a label, so gating only
/// computes signals.
fn labeled_session(n: usize) -> PullbackSession {
    let assignment = PhaseAssignment::from_frames(n, &[5], &[]).unwrap();
    PullbackSession::with_assignment(assignment, FPS, GatingConfig::default()).unwrap()
}

#[test]
fn missing_contours_are_reported_before_any_computation() {
    let images = CountingImages::new(60);
    let mut contours = contours(60);
    contours[14] = None;
    contours[15] = None;
    let mut session = PullbackSession::new(60, FPS, GatingConfig::default()).unwrap();

    let err = session
        .gate(&GatingRequest::new(10..20), &images, &contours)
        .unwrap_err();
    match err {
        GatingError::MissingContours { frames, count } => {
            assert_eq!(frames, "14-15");
            assert_eq!(count, 2);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(images.reads.get(), 0);
    assert_eq!(session.signal_computations(), 0);
    assert!(session.signals().is_none());
    assert!(session.assignment().is_empty());
}

#[test]
fn unchanged_request_reuses_cached_signals() {
    let images = CountingImages::new(300);
    let contours = contours(300);
    let mut session = labeled_session(300);
    let request = GatingRequest::new(50..250);

    let first = session.gate(&request, &images, &contours).unwrap();
    assert!(!first.reused_signals);
    assert!(first.classification.is_none());
    assert_eq!(session.signal_computations(), 1);
    let weights = session.signals().unwrap().image.weights.clone();

    let second = session.gate(&request, &images, &contours).unwrap();
    assert!(second.reused_signals);
    assert_eq!(session.signal_computations(), 1);
    assert_eq!(images.reads.get(), 1);
    assert_eq!(session.signals().unwrap().image.weights, weights);
    // the existing assignment is never overwritten
    assert_eq!(session.assignment().diastolic_frames(), &[5]);
}

#[test]
fn config_or_range_change_recomputes() {
    let images = CountingImages::new(300);
    let contours = contours(300);
    let mut session = labeled_session(300);

    session.gate(&GatingRequest::new(50..250), &images, &contours).unwrap();
    assert_eq!(session.signal_computations(), 1);

    session.gate(&GatingRequest::new(60..240), &images, &contours).unwrap();
    assert_eq!(session.signal_computations(), 2);

    // same length, different frames
    session.gate(&GatingRequest::new(70..250), &images, &contours).unwrap();
    assert_eq!(session.signal_computations(), 3);
    session.gate(&GatingRequest::new(60..240), &images, &contours).unwrap();
    assert_eq!(session.signal_computations(), 4);

    let config = GatingConfig {
        min_spacing: 8,
        ..GatingConfig::default()
    };
    session.set_config(config).unwrap();
    session.gate(&GatingRequest::new(60..240), &images, &contours).unwrap();
    assert_eq!(session.signal_computations(), 5);

    session.invalidate_signals();
    assert!(session.signals().is_none());
    session.gate(&GatingRequest::new(60..240), &images, &contours).unwrap();
    assert_eq!(session.signal_computations(), 6);
}

#[test]
fn dismissed_selection_computes_nothing() {
    let images = CountingImages::new(100);
    let contours = contours(100);
    let mut session = PullbackSession::new(100, FPS, GatingConfig::default()).unwrap();
    let report = session.gate_selection(None, &images, &contours).unwrap();
    assert!(report.is_none());
    assert_eq!(images.reads.get(), 0);
    assert_eq!(session.signal_computations(), 0);
}

#[test]
fn synthetic_pullback_is_classified_in_alternating_phases() {
    let images = CountingImages::new(300);
    let contours = contours(300);
    let mut session = PullbackSession::new(300, FPS, GatingConfig::default()).unwrap();
    assert_eq!(session.classifier_state(), ClassifierState::Unclassified);
    let range = 30..270;

    let report = session
        .gate(&GatingRequest::new(range.clone()), &images, &contours)
        .unwrap();
    let classification = report.classification.unwrap();
    // 240 frames at 1.2 Hz hold about 9 beats
    assert!(
        classification.common_indices.len() >= 4,
        "only {} common extrema",
        classification.common_indices.len()
    );

    let assignment = session.assignment();
    assert_eq!(session.classifier_state(), ClassifierState::Classified);
    assert!(assignment.is_consistent());
    assert_eq!(
        assignment.diastolic_frames().len() + assignment.systolic_frames().len(),
        classification.common_indices.len()
    );
    let markers = assignment.markers(range.clone());
    assert_eq!(markers.len(), classification.common_indices.len());
    assert!(markers.iter().all(|m| range.contains(&m.frame)));
    for pair in markers.windows(2) {
        assert_eq!(pair[1].label, pair[0].label.opposite());
    }
}

#[test]
fn alternating_groups_split_by_elliptic_ratio() {
    let mut ratio = Array1::from_elem(20, 1.0);
    for (frame, value) in [(2usize, 5.0), (8, 4.0), (14, 3.0), (5, 3.0), (11, 3.0), (17, 3.0)] {
        ratio[frame] = value;
    }
    let classification = assign_groups(&[2, 5, 8, 11, 14, 17], &ratio).unwrap();
    assert_eq!(classification.systole, vec![2, 8, 14]);
    assert_eq!(classification.diastole, vec![5, 11, 17]);

    let mut assignment = PhaseAssignment::new(40);
    classification.commit(&mut assignment, 0..20).unwrap();
    assert_eq!(assignment.systolic_frames(), &[2, 8, 14]);
    assert_eq!(assignment.diastolic_frames(), &[5, 11, 17]);
    assert_eq!(assignment.label(8), Some(PhaseLabel::Systole));
}

#[test]
fn invalid_requests() {
    let images = CountingImages::new(50);
    let contours = contours(50);
    let mut session = PullbackSession::new(50, FPS, GatingConfig::default()).unwrap();
    assert!(matches!(
        session.gate(&GatingRequest::new(20..20), &images, &contours),
        Err(GatingError::EmptyRange)
    ));
    assert!(matches!(
        session.gate(&GatingRequest::new(20..60), &images, &contours),
        Err(GatingError::RangeOutOfBounds { end: 60, .. })
    ));
    assert!(PullbackSession::new(50, 0.0, GatingConfig::default()).is_err());
}

#[test]
fn session_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "normalize_step = 40\nmaxima_only = false\nhighcut = 2.0").unwrap();
    let config = GatingConfig::from_file(file.path()).unwrap();
    let session = PullbackSession::new(10, FPS, config).unwrap();
    assert_eq!(session.config().normalize_step, 40);
    assert!(!session.config().maxima_only);
    assert_eq!(session.config().order, 4);
}

#[test]
fn contour_store_for_slices() {
    let data = contours(4);
    let slice: &[Option<ContourMetrics>] = &data;
    assert!(slice.metrics(3).is_some());
    assert!(slice.metrics(4).is_none());
}
