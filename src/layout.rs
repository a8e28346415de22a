//! Probe layouts: turn one transcript into a [`ProbeSet`].
//!
//! Only uniform tiling ships today. New layouts implement [`ProbeLayout`] and
//! are added to [`crate::config::Registry`]; the pool never names them.
use tracing::info;

use crate::config::{Category, ConfigLine, Feature};
use crate::error::DesignError;
use crate::probe::{Orientation, Probe, ProbeSet, Transcript};

/// A strategy that lays candidate probes over a transcript.
pub trait ProbeLayout: Feature + Send + Sync {
    /// Generate the probe set for `transcript`. A transcript too short for
    /// any probe yields an empty set.
    fn probes(&self, transcript: &Transcript) -> Result<ProbeSet, DesignError>;
}

/// Probes of a fixed length tiled at a fixed step from a start offset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SingleTilingProbeLayout {
    size: usize,
    step: usize,
    start: usize,
    orientation: Orientation,
}

const NAME: &str = "single_tiling_probe_layout";

impl SingleTilingProbeLayout {
    pub fn new(probe_size: usize, step_size: usize, first_position: usize, orientation: Orientation) -> Result<Self, DesignError> {
        if probe_size == 0 || step_size == 0 {
            return Err(DesignError::Settings(format!(
                "probe size and step must be >= 1 (got {} and {})",
                probe_size, step_size
            )));
        }
        Ok(Self { size: probe_size, step: step_size, start: first_position, orientation })
    }

    pub fn probe_size(&self) -> usize { self.size }

    pub fn step_size(&self) -> usize { self.step }

    pub fn first_position(&self) -> usize { self.start }

    pub fn orientation(&self) -> Orientation { self.orientation }

    fn parse(line: &ConfigLine) -> Result<Self, String> {
        line.expect_header(Category::ProbeLayout, NAME, 6)?;
        let size = line.usize_at(2, 1)?;
        let step = line.usize_at(3, 1)?;
        let start = line.usize_at(4, 0)?;
        let orientation = line.choice_at(5, &["sense", "antisense"])?.parse()?;
        Ok(Self { size, step, start, orientation })
    }
}

impl Default for SingleTilingProbeLayout {
    fn default() -> Self {
        Self { size: 120, step: 15, start: 0, orientation: Orientation::Antisense }
    }
}

impl Feature for SingleTilingProbeLayout {
    fn category(&self) -> Category { Category::ProbeLayout }

    fn name(&self) -> &'static str { NAME }

    fn config_line_grammar(&self) -> String {
        format!("{}\t{}\tprobe_size\tstep_size\tfirst_position\t<'sense' OR 'antisense'>", Category::ProbeLayout, NAME)
    }

    fn check(&self, line: &ConfigLine) -> Result<(), String> { Self::parse(line).map(|_| ()) }

    fn apply(&mut self, line: &ConfigLine) -> Result<(), String> {
        *self = Self::parse(line)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}_{}_{}_{}_{}", NAME, self.size, self.step, self.start, self.orientation)
    }
}

impl ProbeLayout for SingleTilingProbeLayout {
    fn probes(&self, transcript: &Transcript) -> Result<ProbeSet, DesignError> {
        let layout = self.describe();
        let mut set = ProbeSet::new(layout.as_str());
        let mut pos = self.start;
        while pos.checked_add(self.size).is_some_and(|end| end <= transcript.len()) {
            set.add_probe(Probe::new(transcript, &layout, pos, self.size, self.orientation)?)?;
            match pos.checked_add(self.step) {
                Some(next) => pos = next,
                None => break,
            }
        }
        if set.is_empty() {
            info!(transcript = %transcript.id, length = transcript.len(), "transcript too short for {}", layout);
        }
        Ok(set)
    }
}
