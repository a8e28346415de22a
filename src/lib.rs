#![forbid(unsafe_code)]
//! # oligopool
//!
//! Design a pool of synthetic **oligonucleotide probes** tiling a set of target
//! transcripts, with shared **amplification primers** attached to every probe:
//!
//! ```text
//! 5'- left primer | probe | reverse complement of right primer -3'
//! ```
//!
//! ## Pipeline
//! 1. [`seqio`] reads transcripts from FASTA.
//! 2. A [`layout::ProbeLayout`] tiles each transcript into candidate probes.
//! 3. [`filter::ProbeFilter`]s drop low complexity, poly-base and repeat-masked probes.
//! 4. Transcripts are grouped; a [`primer3::PrimerDesigner`] proposes primer pairs
//!    for each group and [`primer::PrimerFilter`]s vet them.
//! 5. [`pool::OligoPool`] assembles the final oligos, keeping every sequence
//!    unique in the pool, and [`output`] writes the synthesis tables.
//!
//! Layouts and filters are selected by **config lines** (see [`config`]); the
//! pipeline only ever talks to them through traits.
//!
//! ## Examples
//! ```rust
//! use oligopool::config::{parse_config_text, Registry};
//! use oligopool::pool::{OligoPool, PoolSettings};
//! use oligopool::probe::Transcript;
//!
//! let lines = parse_config_text("probe_layout single_tiling_probe_layout 8 4 0 sense");
//! let features = Registry::builtin().load(&lines).unwrap();
//! let pool = OligoPool::new(features, PoolSettings::default()).unwrap();
//! let probes = pool.design_probes(&[Transcript::new("t1", "ACGTACGTACGTACGT")]).unwrap();
//! assert_eq!(probes[0].accepted.len(), 3);
//! ```

pub mod error;
pub mod probe;
pub mod config;
pub mod layout;
pub mod filter;
pub mod primer;
pub mod primer3;
pub mod pool;
pub mod seqio;
pub mod output;

use config::{Category, ConfigLine, Registry};
use probe::Orientation;

/// Crate version string (from `CARGO_PKG_VERSION`).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Convenience: one row per registered strategy (for CLI/UX).
/// Each row is `(category, name, grammar)`.
pub fn list_feature_rows() -> Vec<(String, String, String)> {
    Registry::builtin()
        .grammars()
        .into_iter()
        .map(|(cat, name, grammar)| (cat.tag().to_string(), name.to_string(), grammar))
        .collect()
}

/// Grammar of the built-in strategy called `name`, if any.
pub fn feature_grammar(name: &str) -> Option<String> {
    Registry::builtin().grammars().into_iter().find(|(_, n, _)| *n == name).map(|(_, _, g)| g)
}

/// Feature selection in the shape of the classic designer's command line.
///
/// [`FeatureFlags::config_lines`] turns it into the equivalent config lines,
/// so flag-driven and file-driven runs go through the same registry.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureFlags {
    pub probe_size: usize,
    pub step_size: usize,
    pub first_position: usize,
    pub orientation: Orientation,
    pub low_complexity: bool,
    pub poly_base: bool,
    pub poly_base_bases: String,
    pub poly_base_window: usize,
    pub poly_base_max_count: usize,
    pub repeat: bool,
    pub repeat_max_fraction: f64,
    pub repeat_lower_case: bool,
    pub repeat_n: bool,
    pub primer_poly_base: bool,
    pub primer_probe_match: Option<usize>,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            probe_size: 120,
            step_size: 15,
            first_position: 0,
            orientation: Orientation::Antisense,
            low_complexity: false,
            poly_base: false,
            poly_base_bases: "ACGT".to_string(),
            poly_base_window: 15,
            poly_base_max_count: 12,
            repeat: false,
            repeat_max_fraction: 0.07,
            repeat_lower_case: false,
            repeat_n: false,
            primer_poly_base: false,
            primer_probe_match: None,
        }
    }
}

impl FeatureFlags {
    pub fn config_lines(&self) -> Vec<ConfigLine> {
        let line = |cat: Category, name: &str, params: Vec<String>| {
            ConfigLine::new([cat.tag().to_string(), name.to_string()].into_iter().chain(params))
        };
        let mut lines = vec![line(
            Category::ProbeLayout,
            "single_tiling_probe_layout",
            vec![
                self.probe_size.to_string(),
                self.step_size.to_string(),
                self.first_position.to_string(),
                self.orientation.to_string(),
            ],
        )];
        if self.low_complexity {
            lines.push(line(Category::ProbeFilter, "low_complexity_filter", vec!["20".into(), "1.0".into(), "6".into()]));
        }
        let poly = vec![
            self.poly_base_bases.clone(),
            self.poly_base_window.to_string(),
            self.poly_base_max_count.to_string(),
        ];
        if self.poly_base {
            lines.push(line(Category::ProbeFilter, "poly_base_filter", poly.clone()));
        }
        if self.repeat {
            lines.push(line(
                Category::ProbeFilter,
                "repeat_filter",
                vec![
                    self.repeat_max_fraction.to_string(),
                    self.repeat_lower_case.to_string(),
                    self.repeat_n.to_string(),
                ],
            ));
        }
        if self.primer_poly_base {
            lines.push(line(Category::PrimerFilter, "primer_poly_base_filter", poly));
        }
        if let Some(max) = self.primer_probe_match {
            lines.push(line(Category::PrimerFilter, "primer_probe_match_filter", vec![max.to_string()]));
        }
        lines
    }
}
