//! **Pool assembly**: probes → primer groups → synthesized oligos.
//!
//! ### Stages
//! 1. [`OligoPool::design_probes`] lays probes over every transcript and runs
//!    the probe filters. Transcripts are independent, so this stage runs on a
//!    local Rayon pool; results keep input order.
//! 2. [`OligoPool::assign_primers`] walks transcripts in input order in chunks
//!    of `group_size`, asks the [`PrimerDesigner`] for candidates and keeps the
//!    first pair that passes every primer filter and reuses no primer of an
//!    earlier group. This stage is sequential.
//! 3. [`OligoPool::verify`] re-checks the final list.
//!
//! ### Uniqueness
//! Every synthesized oligo must be unique in the pool. A group's entries are
//! checked against each other and against everything committed so far before
//! any of them is committed. Oligos are compared upper-case, since soft-masked
//! windows synthesize to the same molecule. A duplicate is a
//! [`DesignError::Invariant`] and is never silently dropped.
use std::collections::HashSet;

use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::FeatureSet;
use crate::error::DesignError;
use crate::filter::first_rejecting;
use crate::primer::{first_rejecting_primer, PrimerPair};
use crate::primer3::{PrimerDesigner, PrimerRequest};
use crate::probe::{reverse_complement, Probe, ProbeSet, Transcript};

/// Run-level knobs for primer assignment and parallelism.
#[derive(Clone, Debug, PartialEq)]
pub struct PoolSettings {
    /// Exact length of every designed primer.
    pub primer_length: usize,
    /// Optimal primer melting temperature (°C).
    pub optimal_tm: f64,
    /// Consecutive transcripts sharing one primer pair.
    pub group_size: usize,
    /// primer designer invocations per group before the group fails.
    pub max_primer_attempts: usize,
    /// Failed groups tolerated before the run aborts.
    pub max_failed_groups: usize,
    /// Worker threads for probe design; `None` uses all logical cores.
    pub threads: Option<usize>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            primer_length: 20,
            optimal_tm: 60.0,
            group_size: 1,
            max_primer_attempts: 10,
            max_failed_groups: 0,
            threads: None,
        }
    }
}

impl PoolSettings {
    pub fn validate(&self) -> Result<(), DesignError> {
        if self.primer_length == 0 {
            return Err(DesignError::Settings("primer_length must be >= 1".to_string()));
        }
        if !self.optimal_tm.is_finite() || self.optimal_tm <= 0.0 {
            return Err(DesignError::Settings(format!("optimal_tm must be a positive temperature (got {})", self.optimal_tm)));
        }
        if self.group_size == 0 {
            return Err(DesignError::Settings("group_size must be >= 1".to_string()));
        }
        if self.max_primer_attempts == 0 {
            return Err(DesignError::Settings("max_primer_attempts must be >= 1".to_string()));
        }
        if self.threads == Some(0) {
            return Err(DesignError::Settings("threads must be >= 1".to_string()));
        }
        Ok(())
    }
}

/// A probe dropped by a filter, with the filter's description.
#[derive(Clone, Debug, PartialEq)]
pub struct RejectedProbe {
    pub probe: Probe,
    pub filter: String,
}

/// Outcome of layout + filtering for one transcript.
#[derive(Clone, Debug)]
pub struct TranscriptProbes {
    pub transcript_id: String,
    pub transcript_length: usize,
    /// Surviving probes, in layout order.
    pub accepted: ProbeSet,
    pub rejected: Vec<RejectedProbe>,
}

impl TranscriptProbes {
    /// Probes generated by the layout before filtering.
    pub fn candidates(&self) -> usize { self.accepted.len() + self.rejected.len() }
}

/// One line of the synthesis order.
#[derive(Clone, Debug, PartialEq)]
pub struct FullDesignEntry {
    pub probe: Probe,
    /// Id of the [`PrimerGroup`] the probe belongs to.
    pub primer_group: String,
    pub primer_pair: PrimerPair,
    /// `left + probe + revcomp(right)`, upper-case as ordered for synthesis.
    pub oligo: String,
}

/// Transcripts sharing one accepted primer pair.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PrimerGroup {
    /// `primer_group_<n>`, `n` counting chunks of the input.
    pub id: String,
    pub transcripts: Vec<String>,
    pub pair: PrimerPair,
    pub probes: usize,
}

/// A group for which no acceptable primer pair was found.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct GroupFailure {
    pub group: String,
    pub transcripts: Vec<String>,
    pub reason: String,
}

/// Result of [`OligoPool::assign_primers`].
#[derive(Clone, Debug, Default)]
pub struct PrimerAssignment {
    pub entries: Vec<FullDesignEntry>,
    pub groups: Vec<PrimerGroup>,
    pub failures: Vec<GroupFailure>,
}

/// Per-transcript counts reported in the run summary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TranscriptStats {
    pub transcript_id: String,
    pub length: usize,
    pub candidates: usize,
    pub accepted: usize,
    pub rejected: usize,
}

impl From<&TranscriptProbes> for TranscriptStats {
    fn from(tp: &TranscriptProbes) -> Self {
        Self {
            transcript_id: tp.transcript_id.clone(),
            length: tp.transcript_length,
            candidates: tp.candidates(),
            accepted: tp.accepted.len(),
            rejected: tp.rejected.len(),
        }
    }
}

/// Everything a run produced.
#[derive(Clone, Debug)]
pub struct Design {
    /// `describe()` of the configured features, layout first.
    pub features: Vec<String>,
    pub transcripts: Vec<TranscriptStats>,
    pub entries: Vec<FullDesignEntry>,
    pub groups: Vec<PrimerGroup>,
    pub failures: Vec<GroupFailure>,
    pub rejected: Vec<RejectedProbe>,
}

/// The orchestrator. Owns the configured features and the pool-wide
/// uniqueness state.
pub struct OligoPool {
    features: FeatureSet,
    settings: PoolSettings,
    oligos: HashSet<String>,
    used_primers: HashSet<String>,
}

impl OligoPool {
    pub fn new(features: FeatureSet, settings: PoolSettings) -> Result<Self, DesignError> {
        settings.validate()?;
        Ok(Self { features, settings, oligos: HashSet::new(), used_primers: HashSet::new() })
    }

    pub fn features(&self) -> &FeatureSet { &self.features }

    pub fn settings(&self) -> &PoolSettings { &self.settings }

    /// Lay out and filter one transcript.
    pub fn probes_for(&self, transcript: &Transcript) -> Result<TranscriptProbes, DesignError> {
        let set = self.features.layout.probes(transcript)?;
        let mut accepted = ProbeSet::new(set.name());
        let mut rejected = Vec::new();
        for probe in set.into_probes() {
            match first_rejecting(&self.features.probe_filters, &probe) {
                Some(filter) => rejected.push(RejectedProbe { filter: filter.describe(), probe }),
                None => accepted.add_probe(probe)?,
            }
        }
        info!(
            transcript = %transcript.id,
            accepted = accepted.len(),
            rejected = rejected.len(),
            "probes designed"
        );
        Ok(TranscriptProbes {
            transcript_id: transcript.id.clone(),
            transcript_length: transcript.len(),
            accepted,
            rejected,
        })
    }

    /// Probe design for every transcript, in parallel, preserving input order.
    pub fn design_probes(&self, transcripts: &[Transcript]) -> Result<Vec<TranscriptProbes>, DesignError> {
        let n = self.settings.threads.unwrap_or_else(num_cpus::get).max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| DesignError::Settings(format!("thread pool: {}", e)))?;
        pool.install(|| transcripts.par_iter().map(|t| self.probes_for(t)).collect())
    }

    /// Group transcripts and attach one primer pair per group.
    pub fn assign_primers(
        &mut self,
        probes: &[TranscriptProbes],
        designer: &mut dyn PrimerDesigner,
    ) -> Result<PrimerAssignment, DesignError> {
        let mut out = PrimerAssignment::default();
        for (n, chunk) in probes.chunks(self.settings.group_size).enumerate() {
            let id = format!("primer_group_{}", n);
            let transcripts: Vec<String> = chunk.iter().map(|t| t.transcript_id.clone()).collect();
            let group_probes: Vec<Probe> = chunk.iter().flat_map(|t| t.accepted.probes().iter().cloned()).collect();
            if group_probes.is_empty() {
                warn!(group = %id, transcripts = ?transcripts, "no surviving probes; group skipped");
                continue;
            }

            let pair = match self.find_pair(&id, &group_probes, designer) {
                Ok(pair) => pair,
                Err(reason) => {
                    warn!(group = %id, %reason, "primer group failed");
                    out.failures.push(GroupFailure { group: id.clone(), transcripts, reason: reason.clone() });
                    if out.failures.len() > self.settings.max_failed_groups {
                        return Err(DesignError::PrimerGroup { group: id, reason });
                    }
                    continue;
                }
            };

            let entries = self.group_entries(&id, &pair, group_probes)?;
            self.oligos.extend(entries.iter().map(|e| e.oligo.clone()));
            for primer in pair.sequences() {
                self.used_primers.insert(reverse_complement(&primer));
                self.used_primers.insert(primer);
            }
            info!(group = %id, transcripts = transcripts.len(), oligos = entries.len(), left = %pair.left.sequence, right = %pair.right.sequence, "primer group assigned");
            out.groups.push(PrimerGroup { id, transcripts, pair, probes: entries.len() });
            out.entries.extend(entries);
        }
        Ok(out)
    }

    /// Ask the designer up to `max_primer_attempts` times. `Err` is the
    /// failure reason recorded for the group.
    fn find_pair(
        &self,
        group: &str,
        probes: &[Probe],
        designer: &mut dyn PrimerDesigner,
    ) -> Result<PrimerPair, String> {
        for attempt in 0..self.settings.max_primer_attempts {
            let request = PrimerRequest {
                id: format!("{}_attempt_{}", group, attempt),
                primer_length: self.settings.primer_length,
                optimal_tm: self.settings.optimal_tm,
            };
            let pairs = designer.design(&request).map_err(|e| e.to_string())?;
            debug!(group, attempt, candidates = pairs.len(), "primer candidates");
            for pair in pairs {
                if let Some(filter) = first_rejecting_primer(&self.features.primer_filters, &pair, probes) {
                    debug!(group, left = %pair.left.sequence, right = %pair.right.sequence, filter = %filter.describe(), "primer pair rejected");
                    continue;
                }
                if pair.sequences().iter().any(|s| self.used_primers.contains(s)) {
                    debug!(group, left = %pair.left.sequence, right = %pair.right.sequence, "primer (or its reverse complement) already used by another group");
                    continue;
                }
                return Ok(pair);
            }
        }
        Err(format!("no acceptable primer pair after {} attempts", self.settings.max_primer_attempts))
    }

    fn group_entries(&self, group: &str, pair: &PrimerPair, probes: Vec<Probe>) -> Result<Vec<FullDesignEntry>, DesignError> {
        let mut seen = HashSet::with_capacity(probes.len());
        let mut entries = Vec::with_capacity(probes.len());
        for probe in probes {
            let oligo = pair.oligo(&probe.sequence).to_ascii_uppercase();
            if self.oligos.contains(&oligo) || !seen.insert(oligo.clone()) {
                return Err(DesignError::Invariant(format!(
                    "duplicate oligo for probe {} in {}: {}",
                    probe.id, group, oligo
                )));
            }
            entries.push(FullDesignEntry { probe, primer_group: group.to_string(), primer_pair: pair.clone(), oligo });
        }
        Ok(entries)
    }

    /// Whole pipeline: probes, primers, final verification.
    pub fn create_oligos(
        &mut self,
        transcripts: &[Transcript],
        designer: &mut dyn PrimerDesigner,
    ) -> Result<Design, DesignError> {
        let probes = self.design_probes(transcripts)?;
        let assignment = self.assign_primers(&probes, designer)?;
        Self::verify(&assignment.entries)?;
        info!(
            transcripts = probes.len(),
            oligos = assignment.entries.len(),
            groups = assignment.groups.len(),
            failed = assignment.failures.len(),
            "pool assembled"
        );
        Ok(Design {
            features: self.features.descriptions(),
            transcripts: probes.iter().map(TranscriptStats::from).collect(),
            rejected: probes.into_iter().flat_map(|t| t.rejected).collect(),
            entries: assignment.entries,
            groups: assignment.groups,
            failures: assignment.failures,
        })
    }

    /// Pool-wide uniqueness and per-entry length/composition.
    pub fn verify(entries: &[FullDesignEntry]) -> Result<(), DesignError> {
        let mut seen = HashSet::with_capacity(entries.len());
        for e in entries {
            if e.probe.sequence.len() != e.probe.length {
                return Err(DesignError::Invariant(format!("probe {} has length {} but sequence of {}", e.probe.id, e.probe.length, e.probe.sequence.len())));
            }
            if e.oligo.len() != e.probe.length + e.primer_pair.flank_length() {
                return Err(DesignError::Invariant(format!("oligo for {} has length {}", e.probe.id, e.oligo.len())));
            }
            if !e.oligo.eq_ignore_ascii_case(&e.primer_pair.oligo(&e.probe.sequence)) {
                return Err(DesignError::Invariant(format!("oligo for {} is not primer + probe + primer", e.probe.id)));
            }
            if !seen.insert(e.oligo.to_ascii_uppercase()) {
                return Err(DesignError::Invariant(format!("duplicate oligo for probe {}: {}", e.probe.id, e.oligo)));
            }
        }
        Ok(())
    }
}
