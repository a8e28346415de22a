//! Self-describing **config lines** and the **feature registry**.
//!
//! Every strategy (probe layout, probe filter, primer filter) is configured
//! from one line of tokens:
//!
//! ```text
//! <category>  <strategy name>  <param> ...
//! probe_layout  single_tiling_probe_layout  120  30  0  antisense
//! probe_filter  poly_base_filter  ACGT  15  12
//! ```
//!
//! Strategies declare their grammar, validate lines against it and rebuild
//! their parameters from a valid line through the [`Feature`] trait. The
//! pipeline only ever sees trait objects; [`Registry`] is the closed table
//! that maps names to constructors.
//!
//! # Examples
//! ```
//! use oligopool::config::{ConfigLine, Registry};
//! let lines = vec![
//!     "probe_layout single_tiling_probe_layout 8 4 0 sense".parse::<ConfigLine>().unwrap(),
//!     "probe_filter poly_base_filter ACGT 15 12".parse::<ConfigLine>().unwrap(),
//! ];
//! let features = Registry::builtin().load(&lines).unwrap();
//! assert_eq!(features.probe_filters.len(), 1);
//! ```
use core::fmt;
use std::path::Path;

use anyhow::Context;
use tracing::warn;

use crate::error::DesignError;
use crate::filter::{LowComplexityFilter, PolyBaseFilter, ProbeFilter, RepeatFilter};
use crate::layout::{ProbeLayout, SingleTilingProbeLayout};
use crate::primer::{PrimerFilter, PrimerPolyBaseFilter, PrimerProbeMatchFilter};

/// Feature category, i.e. the first token of a config line.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Category {
    ProbeLayout,
    ProbeFilter,
    PrimerFilter,
}

impl Category {
    pub fn tag(self) -> &'static str {
        match self {
            Category::ProbeLayout => "probe_layout",
            Category::ProbeFilter => "probe_filter",
            Category::PrimerFilter => "primer_filter",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "probe_layout" => Some(Self::ProbeLayout),
            "probe_filter" => Some(Self::ProbeFilter),
            "primer_filter" => Some(Self::PrimerFilter),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.tag()) }
}

/// One tokenized config line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ConfigLine {
    tokens: Vec<String>,
}

impl ConfigLine {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { tokens: tokens.into_iter().map(Into::into).collect() }
    }

    pub fn tokens(&self) -> &[String] { &self.tokens }

    pub fn len(&self) -> usize { self.tokens.len() }

    pub fn is_empty(&self) -> bool { self.tokens.is_empty() }

    pub fn token(&self, idx: usize) -> Option<&str> { self.tokens.get(idx).map(String::as_str) }

    pub fn category(&self) -> Option<&str> { self.token(0) }

    pub fn feature_name(&self) -> Option<&str> { self.token(1) }

    /// Check category, name and exact token count.
    pub fn expect_header(&self, category: Category, name: &str, arity: usize) -> Result<(), String> {
        if self.category() != Some(category.tag()) {
            return Err(format!("first token must be `{}`", category.tag()));
        }
        if self.feature_name() != Some(name) {
            return Err(format!("second token must be `{}`", name));
        }
        if self.len() != arity {
            return Err(format!("expected {} tokens, found {}", arity, self.len()));
        }
        Ok(())
    }

    fn raw(&self, idx: usize) -> Result<&str, String> {
        self.token(idx).ok_or_else(|| format!("missing token {}", idx))
    }

    /// Integer token no smaller than `min`.
    pub fn usize_at(&self, idx: usize, min: usize) -> Result<usize, String> {
        let raw = self.raw(idx)?;
        let v: usize = raw.parse().map_err(|_| format!("token {} (`{}`) is not a non-negative integer", idx, raw))?;
        if v < min {
            return Err(format!("token {} (`{}`) must be >= {}", idx, raw, min));
        }
        Ok(v)
    }

    /// Finite float token within `[min, max]`.
    pub fn f64_at(&self, idx: usize, min: f64, max: f64) -> Result<f64, String> {
        let raw = self.raw(idx)?;
        let v: f64 = raw.parse().map_err(|_| format!("token {} (`{}`) is not a number", idx, raw))?;
        if !v.is_finite() || v < min || v > max {
            return Err(format!("token {} (`{}`) must be within [{}, {}]", idx, raw, min, max));
        }
        Ok(v)
    }

    /// `true` or `false`.
    pub fn bool_at(&self, idx: usize) -> Result<bool, String> {
        match self.raw(idx)? {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(format!("token {} (`{}`) must be `true` or `false`", idx, other)),
        }
    }

    /// One of a fixed vocabulary.
    pub fn choice_at<'a>(&'a self, idx: usize, allowed: &[&str]) -> Result<&'a str, String> {
        let raw = self.raw(idx)?;
        if allowed.contains(&raw) {
            Ok(raw)
        } else {
            Err(format!("token {} (`{}`) must be one of {}", idx, raw, allowed.join("|")))
        }
    }

    /// Non-empty nucleotide alphabet such as `ACGT`; returned upper-case.
    pub fn bases_at(&self, idx: usize) -> Result<String, String> {
        let raw = self.raw(idx)?;
        let upper = raw.to_ascii_uppercase();
        if upper.is_empty() || !upper.bytes().all(|b| matches!(b, b'A' | b'C' | b'G' | b'T' | b'U' | b'N')) {
            return Err(format!("token {} (`{}`) must be a non-empty set of bases from ACGTUN", idx, raw));
        }
        Ok(upper)
    }
}

impl fmt::Display for ConfigLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.tokens.join("\t")) }
}

impl std::str::FromStr for ConfigLine {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let line = ConfigLine::new(s.split_whitespace());
        if line.is_empty() {
            return Err("empty config line".to_string());
        }
        Ok(line)
    }
}

/// Capability set shared by every configurable strategy.
///
/// Implementors provide `check`, which parses a line into the strategy's
/// parameters or explains what is wrong, and `apply`, which stores them. The
/// provided methods build the public protocol on top of those two.
pub trait Feature {
    /// Category tag the strategy's config line starts with.
    fn category(&self) -> Category;

    /// Stable name used in config lines and derived identifiers.
    fn name(&self) -> &'static str;

    /// Human-readable token grammar, e.g. `probe_filter\tpoly_base_filter\tbases\twindow\tmax_count`.
    fn config_line_grammar(&self) -> String;

    /// Validate `line`; `Err` carries the reason.
    fn check(&self, line: &ConfigLine) -> Result<(), String>;

    /// Replace the current parameters with those in `line`. Leaves the
    /// strategy untouched when the line does not parse.
    fn apply(&mut self, line: &ConfigLine) -> Result<(), String>;

    /// Canonical description of the current configuration.
    fn describe(&self) -> String;

    /// Whether `line` satisfies the grammar. Logs the grammar on mismatch.
    fn is_valid_config_line(&self, line: &ConfigLine) -> bool {
        match self.check(line) {
            Ok(()) => true,
            Err(reason) => {
                warn!(feature = self.name(), %line, %reason, "Correct config file line format: {}", self.config_line_grammar());
                false
            }
        }
    }

    /// Configure from `line`, fully replacing any earlier configuration.
    fn configure(&mut self, line: &ConfigLine) -> Result<(), DesignError> {
        if !self.is_valid_config_line(line) {
            return Err(DesignError::Config { line: line.to_string(), grammar: self.config_line_grammar() });
        }
        self.apply(line).map_err(|_| DesignError::Config { line: line.to_string(), grammar: self.config_line_grammar() })
    }
}

/// Constructor for an unconfigured probe layout.
pub type LayoutCtor = fn() -> Box<dyn ProbeLayout>;
/// Constructor for an unconfigured probe filter.
pub type ProbeFilterCtor = fn() -> Box<dyn ProbeFilter>;
/// Constructor for an unconfigured primer filter.
pub type PrimerFilterCtor = fn() -> Box<dyn PrimerFilter>;

fn new_single_tiling() -> Box<dyn ProbeLayout> { Box::new(SingleTilingProbeLayout::default()) }
fn new_low_complexity() -> Box<dyn ProbeFilter> { Box::new(LowComplexityFilter::default()) }
fn new_poly_base() -> Box<dyn ProbeFilter> { Box::new(PolyBaseFilter::default()) }
fn new_repeat() -> Box<dyn ProbeFilter> { Box::new(RepeatFilter::default()) }
fn new_primer_poly_base() -> Box<dyn PrimerFilter> { Box::new(PrimerPolyBaseFilter::default()) }
fn new_primer_probe_match() -> Box<dyn PrimerFilter> { Box::new(PrimerProbeMatchFilter::default()) }

/// Built-in layouts.
pub const PROBE_LAYOUTS: &[(&str, LayoutCtor)] = &[
    ("single_tiling_probe_layout", new_single_tiling as LayoutCtor),
];

/// Built-in probe filters.
pub const PROBE_FILTERS: &[(&str, ProbeFilterCtor)] = &[
    ("low_complexity_filter", new_low_complexity as ProbeFilterCtor),
    ("poly_base_filter", new_poly_base as ProbeFilterCtor),
    ("repeat_filter", new_repeat as ProbeFilterCtor),
];

/// Built-in primer filters.
pub const PRIMER_FILTERS: &[(&str, PrimerFilterCtor)] = &[
    ("primer_poly_base_filter", new_primer_poly_base as PrimerFilterCtor),
    ("primer_probe_match_filter", new_primer_probe_match as PrimerFilterCtor),
];

/// Configured strategies for one run.
pub struct FeatureSet {
    pub layout: Box<dyn ProbeLayout>,
    pub probe_filters: Vec<Box<dyn ProbeFilter>>,
    pub primer_filters: Vec<Box<dyn PrimerFilter>>,
}

impl FeatureSet {
    /// `describe()` of every configured feature, layout first.
    pub fn descriptions(&self) -> Vec<String> {
        let mut out = vec![self.layout.describe()];
        out.extend(self.probe_filters.iter().map(|f| f.describe()));
        out.extend(self.primer_filters.iter().map(|f| f.describe()));
        out
    }
}

impl fmt::Debug for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.descriptions()).finish()
    }
}

/// Name → constructor table, assembled explicitly at startup.
#[derive(Clone)]
pub struct Registry {
    layouts: Vec<(&'static str, LayoutCtor)>,
    probe_filters: Vec<(&'static str, ProbeFilterCtor)>,
    primer_filters: Vec<(&'static str, PrimerFilterCtor)>,
}

impl Registry {
    /// Registry with nothing in it.
    pub fn empty() -> Self {
        Self { layouts: Vec::new(), probe_filters: Vec::new(), primer_filters: Vec::new() }
    }

    /// Registry holding every strategy shipped with the crate.
    pub fn builtin() -> Self {
        Self {
            layouts: PROBE_LAYOUTS.to_vec(),
            probe_filters: PROBE_FILTERS.to_vec(),
            primer_filters: PRIMER_FILTERS.to_vec(),
        }
    }

    pub fn register_layout(&mut self, name: &'static str, ctor: LayoutCtor) { self.layouts.push((name, ctor)); }

    pub fn register_probe_filter(&mut self, name: &'static str, ctor: ProbeFilterCtor) { self.probe_filters.push((name, ctor)); }

    pub fn register_primer_filter(&mut self, name: &'static str, ctor: PrimerFilterCtor) { self.primer_filters.push((name, ctor)); }

    /// `(category, name, grammar)` for every registered strategy, in registration order.
    pub fn grammars(&self) -> Vec<(Category, &'static str, String)> {
        let mut rows = Vec::new();
        for (name, ctor) in &self.layouts {
            rows.push((Category::ProbeLayout, *name, ctor().config_line_grammar()));
        }
        for (name, ctor) in &self.probe_filters {
            rows.push((Category::ProbeFilter, *name, ctor().config_line_grammar()));
        }
        for (name, ctor) in &self.primer_filters {
            rows.push((Category::PrimerFilter, *name, ctor().config_line_grammar()));
        }
        rows
    }

    fn lookup<C: Copy>(table: &[(&'static str, C)], category: Category, name: &str) -> Result<C, DesignError> {
        table
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, c)| *c)
            .ok_or_else(|| DesignError::UnknownFeature { category: category.tag().to_string(), name: name.to_string() })
    }

    fn split(line: &ConfigLine) -> Result<(Category, &str), DesignError> {
        let tag = line.category().unwrap_or("");
        let category = Category::from_tag(tag).ok_or_else(|| DesignError::UnknownFeature {
            category: "category".to_string(),
            name: tag.to_string(),
        })?;
        let name = line.feature_name().ok_or_else(|| DesignError::Config {
            line: line.to_string(),
            grammar: format!("{}\t<name>\t...", category.tag()),
        })?;
        Ok((category, name))
    }

    pub fn build_layout(&self, line: &ConfigLine) -> Result<Box<dyn ProbeLayout>, DesignError> {
        let (_, name) = Self::split(line)?;
        let ctor = Self::lookup(&self.layouts, Category::ProbeLayout, name)?;
        let mut layout = ctor();
        layout.configure(line)?;
        Ok(layout)
    }

    pub fn build_probe_filter(&self, line: &ConfigLine) -> Result<Box<dyn ProbeFilter>, DesignError> {
        let (_, name) = Self::split(line)?;
        let ctor = Self::lookup(&self.probe_filters, Category::ProbeFilter, name)?;
        let mut filter = ctor();
        filter.configure(line)?;
        Ok(filter)
    }

    pub fn build_primer_filter(&self, line: &ConfigLine) -> Result<Box<dyn PrimerFilter>, DesignError> {
        let (_, name) = Self::split(line)?;
        let ctor = Self::lookup(&self.primer_filters, Category::PrimerFilter, name)?;
        let mut filter = ctor();
        filter.configure(line)?;
        Ok(filter)
    }

    /// Build the run's features. Exactly one layout line is required.
    pub fn load(&self, lines: &[ConfigLine]) -> Result<FeatureSet, DesignError> {
        let mut layout = None;
        let mut probe_filters = Vec::new();
        let mut primer_filters = Vec::new();
        for line in lines {
            match Self::split(line)?.0 {
                Category::ProbeLayout => {
                    if layout.is_some() {
                        return Err(DesignError::FeatureSet(format!("more than one probe layout (second: `{}`)", line)));
                    }
                    layout = Some(self.build_layout(line)?);
                }
                Category::ProbeFilter => probe_filters.push(self.build_probe_filter(line)?),
                Category::PrimerFilter => primer_filters.push(self.build_primer_filter(line)?),
            }
        }
        let layout = layout.ok_or_else(|| DesignError::FeatureSet("no probe layout configured".to_string()))?;
        Ok(FeatureSet { layout, probe_filters, primer_filters })
    }
}

impl Default for Registry {
    fn default() -> Self { Self::builtin() }
}

/// Parse config text: one feature per line, `#` comments and blank lines skipped.
pub fn parse_config_text(text: &str) -> Vec<ConfigLine> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.parse().ok())
        .collect()
}

/// Read a config file from disk.
pub fn read_config_lines<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<ConfigLine>> {
    let p = path.as_ref();
    let text = std::fs::read_to_string(p).with_context(|| format!("reading config file {}", p.display()))?;
    Ok(parse_config_text(&text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn line(s: &str) -> ConfigLine { s.parse().unwrap() }

    #[test]
    fn builtin_registry_loads_full_feature_set() {
        let lines = parse_config_text(
            "# layout first\n\
             probe_layout\tsingle_tiling_probe_layout\t120\t15\t0\tantisense\n\
             \n\
             probe_filter low_complexity_filter 20 1.0 6\n\
             probe_filter poly_base_filter ACGT 15 12\n\
             probe_filter repeat_filter 0.07 true false\n\
             primer_filter primer_poly_base_filter ACGT 15 12\n\
             primer_filter primer_probe_match_filter 0\n",
        );
        let fs = Registry::builtin().load(&lines).unwrap();
        assert_eq!(fs.probe_filters.len(), 3);
        assert_eq!(fs.primer_filters.len(), 2);
        assert_eq!(fs.layout.describe(), "single_tiling_probe_layout_120_15_0_antisense");
    }

    #[rstest]
    #[case("probe_layout single_tiling_probe_layout 8 4 0")]
    #[case("probe_layout single_tiling_probe_layout eight 4 0 sense")]
    #[case("probe_layout single_tiling_probe_layout 0 4 0 sense")]
    #[case("probe_layout single_tiling_probe_layout 8 4 -1 sense")]
    #[case("probe_layout single_tiling_probe_layout 8 4 0 both")]
    fn malformed_layout_lines_are_config_errors(#[case] text: &str) {
        let err = Registry::builtin().build_layout(&line(text)).err().unwrap();
        match err {
            DesignError::Config { grammar, .. } => assert!(grammar.contains("probe_size")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn unknown_names_and_categories_are_reported() {
        let reg = Registry::builtin();
        assert!(matches!(reg.load(&[line("probe_filter gc_filter 0.4 0.6")]), Err(DesignError::UnknownFeature { .. })));
        assert!(matches!(reg.load(&[line("layout single_tiling_probe_layout 8 4 0 sense")]), Err(DesignError::UnknownFeature { .. })));
    }

    #[test]
    fn layout_count_is_enforced() {
        let reg = Registry::builtin();
        assert!(matches!(reg.load(&[line("probe_filter poly_base_filter ACGT 15 12")]), Err(DesignError::FeatureSet(_))));
        let two = [
            line("probe_layout single_tiling_probe_layout 8 4 0 sense"),
            line("probe_layout single_tiling_probe_layout 8 2 0 sense"),
        ];
        assert!(matches!(reg.load(&two), Err(DesignError::FeatureSet(_))));
    }

    #[test]
    fn filter_line_in_wrong_category_is_invalid() {
        let reg = Registry::builtin();
        let probe_filter = reg.build_probe_filter(&line("probe_filter poly_base_filter ACGT 15 12")).unwrap();
        assert!(!probe_filter.is_valid_config_line(&line("primer_filter poly_base_filter ACGT 15 12")));
    }

    #[test]
    fn grammars_cover_every_registered_feature() {
        let rows = Registry::builtin().grammars();
        assert_eq!(rows.len(), PROBE_LAYOUTS.len() + PROBE_FILTERS.len() + PRIMER_FILTERS.len());
        for (cat, name, grammar) in rows {
            assert!(grammar.starts_with(cat.tag()));
            assert!(grammar.contains(name));
        }
    }

    #[test]
    fn token_helpers_enforce_domains() {
        let l = line("probe_filter x 3 0.5 true ACGT maybe");
        assert_eq!(l.usize_at(2, 1), Ok(3));
        assert!(l.usize_at(2, 4).is_err());
        assert!(l.f64_at(3, 0.0, 0.4).is_err());
        assert_eq!(l.bool_at(4), Ok(true));
        assert_eq!(l.bases_at(5).as_deref(), Ok("ACGT"));
        assert!(l.bool_at(6).is_err());
        assert!(l.usize_at(9, 0).is_err());
    }
}
