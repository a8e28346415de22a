//! Probe filters: accept or reject one probe at a time.
//!
//! Filters are pure functions of the probe sequence and their own
//! parameters. A probe survives only when no enabled filter rejects it; see
//! [`first_rejecting`].
//!
//! # Examples
//! ```
//! use oligopool::filter::PolyBaseFilter;
//! use oligopool::filter::ProbeFilter;
//! use oligopool::probe::{Orientation, Probe, Transcript};
//! let t = Transcript::new("t", "AAAAAAAAAAAAAAAA");
//! let p = Probe::new(&t, "x", 0, 16, Orientation::Sense).unwrap();
//! assert!(PolyBaseFilter::default().rejects(&p));
//! ```
use crate::config::{Category, ConfigLine, Feature};
use crate::probe::Probe;

/// A strategy that may reject a single probe.
pub trait ProbeFilter: Feature + Send + Sync {
    /// `true` if the probe must be dropped.
    fn rejects(&self, probe: &Probe) -> bool;
}

/// First filter (in configuration order) that rejects `probe`, if any.
pub fn first_rejecting<'a>(filters: &'a [Box<dyn ProbeFilter>], probe: &Probe) -> Option<&'a dyn ProbeFilter> {
    filters.iter().find(|f| f.rejects(probe)).map(|f| f.as_ref())
}

/// Whether any window of `window` bases holds more than `max_count` copies of
/// one of `bases`. Comparison is case-insensitive; a sequence shorter than the
/// window is checked as a single window.
pub fn has_poly_base(seq: &[u8], bases: &[u8], window: usize, max_count: usize) -> bool {
    if seq.is_empty() || window == 0 {
        return false;
    }
    let w = window.min(seq.len());
    bases.iter().map(|b| b.to_ascii_uppercase()).any(|base| {
        let hit = |c: &u8| c.to_ascii_uppercase() == base;
        let mut count = seq[..w].iter().filter(|c| hit(c)).count();
        if count > max_count {
            return true;
        }
        for i in w..seq.len() {
            if hit(&seq[i]) { count += 1; }
            if hit(&seq[i - w]) { count -= 1; }
            if count > max_count {
                return true;
            }
        }
        false
    })
}

/// Shannon entropy (bits) of A/C/G/T composition; other symbols are ignored.
fn entropy(counts: &[usize; 4]) -> f64 {
    let total: usize = counts.iter().sum();
    if total == 0 {
        return 0.0;
    }
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / total as f64;
            -p * p.log2()
        })
        .sum()
}

fn base_index(b: u8) -> Option<usize> {
    match b.to_ascii_uppercase() {
        b'A' => Some(0),
        b'C' => Some(1),
        b'G' => Some(2),
        b'T' | b'U' => Some(3),
        _ => None,
    }
}

/// Lowest windowed composition entropy over the sequence.
pub fn min_window_entropy(seq: &[u8], window: usize) -> f64 {
    if seq.is_empty() {
        return 0.0;
    }
    let w = window.clamp(1, seq.len());
    let mut counts = [0usize; 4];
    for &b in &seq[..w] {
        if let Some(i) = base_index(b) { counts[i] += 1; }
    }
    let mut lowest = entropy(&counts);
    for i in w..seq.len() {
        if let Some(k) = base_index(seq[i]) { counts[k] += 1; }
        if let Some(k) = base_index(seq[i - w]) { counts[k] -= 1; }
        lowest = lowest.min(entropy(&counts));
    }
    lowest
}

/// Longest tandem run of one dinucleotide (two distinct bases), in copies.
pub fn longest_dinucleotide_run(seq: &[u8]) -> usize {
    let s: Vec<u8> = seq.iter().map(u8::to_ascii_uppercase).collect();
    let mut best = 0;
    let mut run = s.len().min(2);
    for j in 2..s.len() {
        run = if s[j] == s[j - 2] { run + 1 } else { 2 };
        if s[j] != s[j - 1] {
            best = best.max(run / 2);
        }
    }
    best
}

const LOW_COMPLEXITY: &str = "low_complexity_filter";

/// Rejects low-complexity probes: a window whose base composition entropy is
/// below a threshold, or a long dinucleotide tandem repeat.
#[derive(Clone, Debug, PartialEq)]
pub struct LowComplexityFilter {
    window: usize,
    min_entropy: f64,
    max_dinucleotide_repeats: usize,
}

impl LowComplexityFilter {
    pub fn new(window: usize, min_entropy: f64, max_dinucleotide_repeats: usize) -> Self {
        Self { window: window.max(1), min_entropy, max_dinucleotide_repeats }
    }

    fn parse(line: &ConfigLine) -> Result<Self, String> {
        line.expect_header(Category::ProbeFilter, LOW_COMPLEXITY, 5)?;
        Ok(Self {
            window: line.usize_at(2, 1)?,
            min_entropy: line.f64_at(3, 0.0, 2.0)?,
            max_dinucleotide_repeats: line.usize_at(4, 1)?,
        })
    }
}

impl Default for LowComplexityFilter {
    fn default() -> Self { Self::new(20, 1.0, 6) }
}

impl Feature for LowComplexityFilter {
    fn category(&self) -> Category { Category::ProbeFilter }

    fn name(&self) -> &'static str { LOW_COMPLEXITY }

    fn config_line_grammar(&self) -> String {
        format!("{}\t{}\twindow\tmin_entropy_bits\tmax_dinucleotide_repeats", Category::ProbeFilter, LOW_COMPLEXITY)
    }

    fn check(&self, line: &ConfigLine) -> Result<(), String> { Self::parse(line).map(|_| ()) }

    fn apply(&mut self, line: &ConfigLine) -> Result<(), String> {
        *self = Self::parse(line)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("{}_{}_{}_{}", LOW_COMPLEXITY, self.window, self.min_entropy, self.max_dinucleotide_repeats)
    }
}

impl ProbeFilter for LowComplexityFilter {
    fn rejects(&self, probe: &Probe) -> bool {
        let seq = probe.sequence.as_bytes();
        min_window_entropy(seq, self.window) < self.min_entropy
            || longest_dinucleotide_run(seq) > self.max_dinucleotide_repeats
    }
}

const POLY_BASE: &str = "poly_base_filter";

/// Rejects probes with too many copies of one base inside a sliding window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolyBaseFilter {
    bases: String,
    window: usize,
    max_count: usize,
}

impl PolyBaseFilter {
    pub fn new(bases: &str, window: usize, max_count: usize) -> Self {
        Self { bases: bases.to_ascii_uppercase(), window: window.max(1), max_count }
    }

    fn parse(line: &ConfigLine) -> Result<Self, String> {
        line.expect_header(Category::ProbeFilter, POLY_BASE, 5)?;
        Ok(Self { bases: line.bases_at(2)?, window: line.usize_at(3, 1)?, max_count: line.usize_at(4, 0)? })
    }
}

impl Default for PolyBaseFilter {
    fn default() -> Self { Self::new("ACGT", 15, 12) }
}

impl Feature for PolyBaseFilter {
    fn category(&self) -> Category { Category::ProbeFilter }

    fn name(&self) -> &'static str { POLY_BASE }

    fn config_line_grammar(&self) -> String {
        format!("{}\t{}\tbases (e.g. ACGT)\twindow\tmax_count", Category::ProbeFilter, POLY_BASE)
    }

    fn check(&self, line: &ConfigLine) -> Result<(), String> { Self::parse(line).map(|_| ()) }

    fn apply(&mut self, line: &ConfigLine) -> Result<(), String> {
        *self = Self::parse(line)?;
        Ok(())
    }

    fn describe(&self) -> String { format!("{}_{}_{}_{}", POLY_BASE, self.bases, self.window, self.max_count) }
}

impl ProbeFilter for PolyBaseFilter {
    fn rejects(&self, probe: &Probe) -> bool {
        has_poly_base(probe.sequence.as_bytes(), self.bases.as_bytes(), self.window, self.max_count)
    }
}

const REPEAT: &str = "repeat_filter";

/// Rejects probes whose fraction of repeat-masked positions is too high.
#[derive(Clone, Debug, PartialEq)]
pub struct RepeatFilter {
    max_fraction: f64,
    lower_case: bool,
    n: bool,
}

impl RepeatFilter {
    pub fn new(max_fraction: f64, lower_case: bool, n: bool) -> Self { Self { max_fraction, lower_case, n } }

    /// Fraction of masked positions under this filter's counting rules.
    pub fn masked_fraction(&self, seq: &[u8]) -> f64 {
        if seq.is_empty() {
            return 0.0;
        }
        let masked = seq
            .iter()
            .filter(|&&b| (self.lower_case && b.is_ascii_lowercase()) || (self.n && (b == b'N' || b == b'n')))
            .count();
        masked as f64 / seq.len() as f64
    }

    fn parse(line: &ConfigLine) -> Result<Self, String> {
        line.expect_header(Category::ProbeFilter, REPEAT, 5)?;
        Ok(Self { max_fraction: line.f64_at(2, 0.0, 1.0)?, lower_case: line.bool_at(3)?, n: line.bool_at(4)? })
    }
}

impl Default for RepeatFilter {
    fn default() -> Self { Self::new(0.07, true, true) }
}

impl Feature for RepeatFilter {
    fn category(&self) -> Category { Category::ProbeFilter }

    fn name(&self) -> &'static str { REPEAT }

    fn config_line_grammar(&self) -> String {
        format!(
            "{}\t{}\tmax_fraction\t<lower_case_counts: 'true' OR 'false'>\t<n_counts: 'true' OR 'false'>",
            Category::ProbeFilter,
            REPEAT
        )
    }

    fn check(&self, line: &ConfigLine) -> Result<(), String> { Self::parse(line).map(|_| ()) }

    fn apply(&mut self, line: &ConfigLine) -> Result<(), String> {
        *self = Self::parse(line)?;
        Ok(())
    }

    fn describe(&self) -> String { format!("{}_{}_{}_{}", REPEAT, self.max_fraction, self.lower_case, self.n) }
}

impl ProbeFilter for RepeatFilter {
    fn rejects(&self, probe: &Probe) -> bool { self.masked_fraction(probe.sequence.as_bytes()) > self.max_fraction }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::{Orientation, Transcript};
    use rstest::rstest;

    fn probe(seq: &str) -> Probe {
        Probe::new(&Transcript::new("t", seq), "test", 0, seq.len(), Orientation::Sense).unwrap()
    }

    const BALANCED: &str = "ACGTTGCAAGCTTCGAGATCCGTAGCTAGGCTTACGATCGGATC";

    #[test]
    fn poly_base_rejects_homopolymer_and_accepts_mixed_sequence() {
        let f = PolyBaseFilter::default();
        assert!(f.rejects(&probe("AAAAAAAAAAAAAAAA")));
        assert!(f.rejects(&probe("ccccccccccccccccTGA")));
        assert!(!f.rejects(&probe(BALANCED)));
        // 12 T's inside 15 is exactly at the limit.
        assert!(!f.rejects(&probe("GCTTTTTTTTTTTTGCA")));
        assert!(f.rejects(&probe("GCTTTTTTTTTTTTTGCA")));
    }

    #[test]
    fn poly_base_only_counts_configured_bases() {
        let only_gc = PolyBaseFilter::new("GC", 15, 12);
        assert!(!only_gc.rejects(&probe("AAAAAAAAAAAAAAAA")));
        assert!(only_gc.rejects(&probe("GGGGGGGGGGGGGGGG")));
    }

    #[test]
    fn poly_base_violation_needs_only_one_window() {
        let seq = format!("{}{}{}", BALANCED, "G".repeat(13), BALANCED);
        assert!(has_poly_base(seq.as_bytes(), b"G", 15, 12));
        assert!(!has_poly_base(b"GGGG", b"G", 15, 4));
        assert!(has_poly_base(b"GGGGG", b"G", 15, 4));
    }

    #[rstest]
    #[case(8, true)]
    #[case(7, false)]
    #[case(0, false)]
    fn repeat_filter_threshold_is_strict(#[case] lower: usize, #[case] rejected: bool) {
        let seq = format!("{}{}", "a".repeat(lower), "C".repeat(100 - lower));
        let f = RepeatFilter::new(0.07, true, false);
        assert_eq!(f.rejects(&probe(&seq)), rejected);
    }

    #[test]
    fn repeat_filter_counting_rules_are_independent() {
        let seq = format!("{}{}{}", "acgt", "NNNN", "C".repeat(92));
        assert!(!RepeatFilter::new(0.07, false, false).rejects(&probe(&seq)));
        assert!(!RepeatFilter::new(0.07, true, false).rejects(&probe(&seq)));
        assert!(!RepeatFilter::new(0.07, false, true).rejects(&probe(&seq)));
        assert!(RepeatFilter::new(0.07, true, true).rejects(&probe(&seq)));
    }

    #[test]
    fn low_complexity_catches_dinucleotide_repeats_and_skewed_windows() {
        let f = LowComplexityFilter::default();
        assert!(f.rejects(&probe(&format!("GCAT{}GCAT", "AT".repeat(7)))));
        assert!(!f.rejects(&probe(&format!("GCAT{}GCAT", "AT".repeat(5)))));
        assert!(f.rejects(&probe(&format!("{}{}{}", BALANCED, "AAAAAAAAAAAAAAAAAAAG", BALANCED))));
        assert!(!f.rejects(&probe(BALANCED)));
    }

    #[test]
    fn dinucleotide_runs_ignore_homopolymers() {
        assert_eq!(longest_dinucleotide_run(b"AAAAAAAA"), 0);
        assert_eq!(longest_dinucleotide_run(b"CACACAg"), 3);
        assert_eq!(longest_dinucleotide_run(b"GTGTGTGT"), 4);
    }

    #[test]
    fn filters_are_deterministic() {
        let filters: Vec<Box<dyn ProbeFilter>> = vec![
            Box::new(LowComplexityFilter::default()),
            Box::new(PolyBaseFilter::default()),
            Box::new(RepeatFilter::default()),
        ];
        for seq in [BALANCED, "AAAAAAAAAAAAAAAA", "acgtacgtACGTACGTACGT"] {
            let p = probe(seq);
            let first = first_rejecting(&filters, &p).map(|f| f.describe());
            let again = first_rejecting(&filters, &p).map(|f| f.describe());
            assert_eq!(first, again);
        }
    }

    #[test]
    fn first_rejecting_reports_configuration_order() {
        let filters: Vec<Box<dyn ProbeFilter>> = vec![
            Box::new(RepeatFilter::new(0.5, true, true)),
            Box::new(PolyBaseFilter::default()),
        ];
        let hit = first_rejecting(&filters, &probe("AAAAAAAAAAAAAAAA")).unwrap();
        assert_eq!(hit.name(), "poly_base_filter");
        assert!(first_rejecting(&filters, &probe(BALANCED)).is_none());
    }

    #[test]
    fn describe_reflects_configuration() {
        let mut f = PolyBaseFilter::default();
        assert_eq!(f.describe(), "poly_base_filter_ACGT_15_12");
        f.configure(&"probe_filter poly_base_filter gc 10 8".parse().unwrap()).unwrap();
        assert_eq!(f.describe(), "poly_base_filter_GC_10_8");
        assert!(f.configure(&"probe_filter poly_base_filter GX 10 8".parse().unwrap()).is_err());
    }
}
