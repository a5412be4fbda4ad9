use ivus_signals::{ContourSeries, Series, SignalError};
use std::ops::Range;

use crate::classifier::{Classification, ClassifierState, GatingMethods, PhaseClassifier};
use crate::config::GatingConfig;
use crate::correction::CorrectionController;
use crate::error::GatingError;
use crate::phase::{format_frame_runs, PhaseAssignment};
use crate::signals::{GatingSignals, SignalCache};
use crate::sources::{missing_contours, ContourStore, ImageStore};

/// A gating request over a frame range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatingRequest {
    pub range: Range<usize>,
    /// Defaults derived from the config when `None`
    pub methods: Option<GatingMethods>,
}

impl GatingRequest {
    pub fn new(range: Range<usize>) -> Self {
        Self {
            range,
            methods: None,
        }
    }

    pub fn with_methods(mut self, methods: GatingMethods) -> Self {
        self.methods = Some(methods);
        self
    }
}

/// What a gating run did.
#[derive(Debug, Clone, PartialEq)]
pub struct GatingReport {
    pub range: Range<usize>,
    /// Signals came from the cache
    pub reused_signals: bool,
    /// `None` when an existing assignment was kept
    pub classification: Option<Classification>,
}

/// Everything gating needs to know about one loaded pullback.
#[derive(Debug, Clone)]
pub struct PullbackSession {
    frame_rate: f64,
    config: GatingConfig,
    assignment: PhaseAssignment,
    cache: Option<SignalCache>,
    computations: usize,
}

impl PullbackSession {
    pub fn new(
        total_frames: usize,
        frame_rate: f64,
        config: GatingConfig,
    ) -> Result<Self, GatingError> {
        Self::with_assignment(PhaseAssignment::new(total_frames), frame_rate, config)
    }

    /// Session around a restored assignment.
    pub fn with_assignment(
        assignment: PhaseAssignment,
        frame_rate: f64,
        config: GatingConfig,
    ) -> Result<Self, GatingError> {
        if !(frame_rate > 0.0) || !frame_rate.is_finite() {
            return Err(SignalError::InvalidFrameRate(frame_rate).into());
        }
        config.validate()?;
        Ok(Self {
            frame_rate,
            config,
            assignment,
            cache: None,
            computations: 0,
        })
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    pub fn total_frames(&self) -> usize {
        self.assignment.total_frames()
    }

    pub fn config(&self) -> &GatingConfig {
        &self.config
    }

    /// Replace the configuration. Cached signals stay until the next gating
    /// run notices the change.
    pub fn set_config(&mut self, config: GatingConfig) -> Result<(), GatingError> {
        config.validate()?;
        self.config = config;
        Ok(())
    }

    pub fn assignment(&self) -> &PhaseAssignment {
        &self.assignment
    }

    pub fn assignment_mut(&mut self) -> &mut PhaseAssignment {
        &mut self.assignment
    }

    pub fn classifier_state(&self) -> ClassifierState {
        ClassifierState::of(&self.assignment)
    }

    pub fn signals(&self) -> Option<&GatingSignals> {
        self.cache.as_ref().map(|c| c.signals())
    }

    /// How many times signals were computed rather than taken from cache.
    pub fn signal_computations(&self) -> usize {
        self.computations
    }

    pub fn invalidate_signals(&mut self) {
        self.cache = None;
    }

    /// Correction controller over `range` of this pullback.
    pub fn controller(&self, range: Range<usize>) -> Result<CorrectionController, GatingError> {
        if range.is_empty() {
            return Err(GatingError::EmptyRange);
        }
        if range.end > self.total_frames() {
            return Err(GatingError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                total: self.total_frames(),
            });
        }
        Ok(CorrectionController::new(range))
    }

    /// Gate a range picked by the user; `None` means the selection was
    /// dismissed and nothing is computed.
    pub fn gate_selection<I, C>(
        &mut self,
        selection: Option<GatingRequest>,
        images: &I,
        contours: &C,
    ) -> Result<Option<GatingReport>, GatingError>
    where
        I: ImageStore + ?Sized,
        C: ContourStore + ?Sized,
    {
        match selection {
            Some(request) => self.gate(&request, images, contours).map(Some),
            None => {
                log::info!("Gating cancelled");
                Ok(None)
            }
        }
    }

    /// Compute (or reuse) the gating signals for `request.range` and, if no
    /// frame is labeled yet, classify the range.
    ///
    /// Signals stay available through [`signals`](Self::signals) even when
    /// classification fails.
    pub fn gate<I, C>(
        &mut self,
        request: &GatingRequest,
        images: &I,
        contours: &C,
    ) -> Result<GatingReport, GatingError>
    where
        I: ImageStore + ?Sized,
        C: ContourStore + ?Sized,
    {
        let range = request.range.clone();
        if range.is_empty() {
            return Err(GatingError::EmptyRange);
        }
        let total = self.total_frames();
        if range.end > total || range.end > images.frame_count() {
            return Err(GatingError::RangeOutOfBounds {
                start: range.start,
                end: range.end,
                total: total.min(images.frame_count()),
            });
        }

        let missing = missing_contours(contours, range.clone());
        if !missing.is_empty() {
            let frames = format_frame_runs(&missing);
            log::warn!("Missing contours for frames {}", frames);
            return Err(GatingError::MissingContours {
                frames,
                count: missing.len(),
            });
        }
        let metrics: Vec<_> = range.clone().filter_map(|f| contours.metrics(f)).collect();
        let elliptic_ratio: Series = metrics.iter().map(|m| m.elliptic_ratio).collect();

        let (cache, reused_signals) = match self.cache.take() {
            Some(cache) if cache.matches(&self.config, &range) => {
                log::info!(
                    "Reusing cached gating signals for frames {}..{}",
                    range.start,
                    range.end
                );
                (cache, true)
            }
            _ => {
                let frames = images.frames(range.clone()).ok_or(GatingError::ImagesUnavailable {
                    start: range.start,
                    end: range.end,
                })?;
                let contour_series = ContourSeries {
                    shortest_distance: metrics.iter().map(|m| m.shortest_distance).collect(),
                    vector_angle: metrics.iter().map(|m| m.vector_angle).collect(),
                    vector_length: metrics.iter().map(|m| m.vector_length).collect(),
                };
                let signals =
                    GatingSignals::compute(frames, &contour_series, &self.config, self.frame_rate)?;
                self.computations += 1;
                (SignalCache::new(self.config.clone(), range.clone(), signals), false)
            }
        };
        let signals = self.cache.insert(cache).signals();

        if !self.assignment.is_empty() {
            log::info!("Keeping existing phase assignment");
            return Ok(GatingReport {
                range,
                reused_signals,
                classification: None,
            });
        }

        let methods = request
            .methods
            .unwrap_or_else(|| GatingMethods::from_config(&self.config));
        let classifier = PhaseClassifier::new(self.config.extrema());
        let classification = classifier.classify(
            &signals.image_filtered.series,
            &signals.contour_filtered.series,
            &elliptic_ratio,
            methods,
        )?;
        classification.commit(&mut self.assignment, range.clone())?;

        Ok(GatingReport {
            range,
            reused_signals,
            classification: Some(classification),
        })
    }
}
