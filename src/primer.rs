//! Primers, primer pairs and **primer filters**.
//!
//! A primer pair flanks every probe of its group in the synthesized oligo:
//!
//! ```text
//! 5'- left primer | probe | reverse complement of right primer -3'
//! ```
//!
//! Primer filters judge a candidate pair against the probes it would be
//! attached to, so they can refuse pairs that cross-hybridize with the group.
use aho_corasick::AhoCorasick;
use serde::Serialize;

use crate::config::{Category, ConfigLine, Feature};
use crate::filter::has_poly_base;
use crate::probe::{reverse_complement, Probe};

/// Which end of the final oligo a primer occupies.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum Flank {
    /// Left primer, written as-is at the 5' end.
    FivePrime,
    /// Right primer, reverse complemented at the 3' end.
    ThreePrime,
}

/// A primer reported by the primer designer.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Primer {
    /// Primer sequence 5'→3' as designed.
    pub sequence: String,
    /// Melting temperature reported by the designer (°C).
    pub tm: f64,
    /// Position in the final oligo.
    pub flank: Flank,
}

/// Forward/reverse primers shared by one probe group.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrimerPair {
    pub left: Primer,
    pub right: Primer,
    /// primer3 pair penalty, when reported.
    pub penalty: Option<f64>,
}

impl PrimerPair {
    pub fn new(left: &str, left_tm: f64, right: &str, right_tm: f64) -> Self {
        Self {
            left: Primer { sequence: left.to_string(), tm: left_tm, flank: Flank::FivePrime },
            right: Primer { sequence: right.to_string(), tm: right_tm, flank: Flank::ThreePrime },
            penalty: None,
        }
    }

    /// Sequence prepended to each probe.
    pub fn five_prime_flank(&self) -> &str { &self.left.sequence }

    /// Sequence appended to each probe.
    pub fn three_prime_flank(&self) -> String { reverse_complement(&self.right.sequence) }

    /// Length added to every probe.
    pub fn flank_length(&self) -> usize { self.left.sequence.len() + self.right.sequence.len() }

    /// `left + probe + revcomp(right)`.
    pub fn oligo(&self, probe_sequence: &str) -> String {
        let mut out = String::with_capacity(probe_sequence.len() + self.flank_length());
        out.push_str(self.five_prime_flank());
        out.push_str(probe_sequence);
        out.push_str(&self.three_prime_flank());
        out
    }

    /// Both primer sequences, upper-cased.
    pub fn sequences(&self) -> [String; 2] {
        [self.left.sequence.to_ascii_uppercase(), self.right.sequence.to_ascii_uppercase()]
    }
}

/// A strategy that may reject a primer pair for a group of probes.
pub trait PrimerFilter: Feature + Send + Sync {
    /// `true` if `pair` must not be attached to `probes`.
    fn rejects(&self, pair: &PrimerPair, probes: &[Probe]) -> bool;
}

/// First primer filter (configuration order) that rejects the pair, if any.
pub fn first_rejecting_primer<'a>(
    filters: &'a [Box<dyn PrimerFilter>],
    pair: &PrimerPair,
    probes: &[Probe],
) -> Option<&'a dyn PrimerFilter> {
    filters.iter().find(|f| f.rejects(pair, probes)).map(|f| f.as_ref())
}

const PRIMER_POLY_BASE: &str = "primer_poly_base_filter";

/// Poly-base check applied to both primers of a pair.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrimerPolyBaseFilter {
    bases: String,
    window: usize,
    max_count: usize,
}

impl PrimerPolyBaseFilter {
    pub fn new(bases: &str, window: usize, max_count: usize) -> Self {
        Self { bases: bases.to_ascii_uppercase(), window: window.max(1), max_count }
    }

    fn parse(line: &ConfigLine) -> Result<Self, String> {
        line.expect_header(Category::PrimerFilter, PRIMER_POLY_BASE, 5)?;
        Ok(Self { bases: line.bases_at(2)?, window: line.usize_at(3, 1)?, max_count: line.usize_at(4, 0)? })
    }
}

impl Default for PrimerPolyBaseFilter {
    fn default() -> Self { Self::new("ACGT", 15, 12) }
}

impl Feature for PrimerPolyBaseFilter {
    fn category(&self) -> Category { Category::PrimerFilter }

    fn name(&self) -> &'static str { PRIMER_POLY_BASE }

    fn config_line_grammar(&self) -> String {
        format!("{}\t{}\tbases (e.g. ACGT)\twindow\tmax_count", Category::PrimerFilter, PRIMER_POLY_BASE)
    }

    fn check(&self, line: &ConfigLine) -> Result<(), String> { Self::parse(line).map(|_| ()) }

    fn apply(&mut self, line: &ConfigLine) -> Result<(), String> {
        *self = Self::parse(line)?;
        Ok(())
    }

    fn describe(&self) -> String { format!("{}_{}_{}_{}", PRIMER_POLY_BASE, self.bases, self.window, self.max_count) }
}

impl PrimerFilter for PrimerPolyBaseFilter {
    fn rejects(&self, pair: &PrimerPair, _probes: &[Probe]) -> bool {
        [&pair.left, &pair.right]
            .iter()
            .any(|p| has_poly_base(p.sequence.as_bytes(), self.bases.as_bytes(), self.window, self.max_count))
    }
}

const PRIMER_PROBE_MATCH: &str = "primer_probe_match_filter";

/// Rejects a pair when either primer (or its reverse complement) occurs in
/// more than `max_matching_probes` of the group's probes.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct PrimerProbeMatchFilter {
    max_matching_probes: usize,
}

impl PrimerProbeMatchFilter {
    pub fn new(max_matching_probes: usize) -> Self { Self { max_matching_probes } }

    /// Number of probes containing a primer site on either strand.
    pub fn matching_probes(pair: &PrimerPair, probes: &[Probe]) -> usize {
        let [left, right] = pair.sequences();
        let patterns = [reverse_complement(&left), reverse_complement(&right), left, right];
        let Ok(ac) = AhoCorasick::new(patterns.iter().filter(|p| !p.is_empty())) else {
            return 0;
        };
        probes
            .iter()
            .filter(|p| ac.is_match(p.sequence.to_ascii_uppercase().as_bytes()))
            .count()
    }

    fn parse(line: &ConfigLine) -> Result<Self, String> {
        line.expect_header(Category::PrimerFilter, PRIMER_PROBE_MATCH, 3)?;
        Ok(Self { max_matching_probes: line.usize_at(2, 0)? })
    }
}

impl Feature for PrimerProbeMatchFilter {
    fn category(&self) -> Category { Category::PrimerFilter }

    fn name(&self) -> &'static str { PRIMER_PROBE_MATCH }

    fn config_line_grammar(&self) -> String {
        format!("{}\t{}\tmax_matching_probes", Category::PrimerFilter, PRIMER_PROBE_MATCH)
    }

    fn check(&self, line: &ConfigLine) -> Result<(), String> { Self::parse(line).map(|_| ()) }

    fn apply(&mut self, line: &ConfigLine) -> Result<(), String> {
        *self = Self::parse(line)?;
        Ok(())
    }

    fn describe(&self) -> String { format!("{}_{}", PRIMER_PROBE_MATCH, self.max_matching_probes) }
}

impl PrimerFilter for PrimerProbeMatchFilter {
    fn rejects(&self, pair: &PrimerPair, probes: &[Probe]) -> bool {
        Self::matching_probes(pair, probes) > self.max_matching_probes
    }
}
