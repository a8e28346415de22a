//! Core types for **transcripts**, **probes** and **probe sets**.
//!
//! Transcripts are read once and stay immutable for the whole run. Probes are
//! windows over a transcript; their sequence is derived when the probe is
//! created and never changes afterwards.
//!
//! Probe sequences keep the case of the transcript so that repeat-masked
//! (lower-case) bases survive into the filters, including after reverse
//! complementing antisense probes.
use core::fmt;
use std::collections::HashSet;

use crate::error::DesignError;

/// A named target sequence supplied by the sequence provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcript {
    /// Unique identifier (first token of the FASTA header).
    pub id: String,
    /// Nucleotide string as read (case preserved).
    pub sequence: String,
}

impl Transcript {
    pub fn new(id: impl Into<String>, sequence: impl Into<String>) -> Self {
        Self { id: id.into(), sequence: sequence.into() }
    }

    pub fn len(&self) -> usize { self.sequence.len() }

    pub fn is_empty(&self) -> bool { self.sequence.is_empty() }
}

/// Strand of the probe relative to its transcript.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Orientation {
    Sense,
    Antisense,
}

impl Orientation {
    pub fn as_str(self) -> &'static str {
        match self {
            Orientation::Sense => "sense",
            Orientation::Antisense => "antisense",
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

impl std::str::FromStr for Orientation {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sense" => Ok(Self::Sense),
            "antisense" => Ok(Self::Antisense),
            other => Err(format!("Unknown orientation: {}", other)),
        }
    }
}

/// Reverse complement preserving case (`bio` keeps lower-case bases lower-case).
pub fn reverse_complement(seq: &str) -> String {
    let rc = bio::alphabets::dna::revcomp(seq.as_bytes());
    String::from_utf8_lossy(&rc).into_owned()
}

/// A fixed-length window over one transcript.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Probe {
    /// `<layout description>_<transcript>_<start>_<end>`.
    pub id: String,
    /// Source transcript identifier.
    pub transcript_id: String,
    /// Canonical description of the layout that produced the probe.
    pub layout: String,
    /// 0-based start offset on the transcript.
    pub start: usize,
    /// Probe length.
    pub length: usize,
    /// Whether the sequence is the transcript substring or its reverse complement.
    pub orientation: Orientation,
    /// Derived probe sequence.
    pub sequence: String,
}

impl Probe {
    /// Cut a probe from `transcript`. The window must fit inside the transcript.
    pub fn new(
        transcript: &Transcript,
        layout: &str,
        start: usize,
        length: usize,
        orientation: Orientation,
    ) -> Result<Self, DesignError> {
        let end = start.checked_add(length).filter(|e| *e <= transcript.len() && length > 0);
        let Some(end) = end else {
            return Err(DesignError::Invariant(format!(
                "probe window {}+{} does not fit transcript {} (length {})",
                start, length, transcript.id, transcript.len()
            )));
        };
        let window = transcript.sequence.get(start..end).ok_or_else(|| {
            DesignError::Invariant(format!("transcript {} is not ASCII", transcript.id))
        })?;
        let sequence = match orientation {
            Orientation::Sense => window.to_string(),
            Orientation::Antisense => reverse_complement(window),
        };
        Ok(Self {
            id: format!("{}_{}_{}_{}", layout, transcript.id, start, end - 1),
            transcript_id: transcript.id.clone(),
            layout: layout.to_string(),
            start,
            length,
            orientation,
            sequence,
        })
    }

    /// Inclusive 0-based end offset.
    pub fn end(&self) -> usize { self.start + self.length - 1 }
}

/// Ordered probes from one layout invocation on one transcript.
#[derive(Clone, Debug, Default)]
pub struct ProbeSet {
    name: String,
    probes: Vec<Probe>,
    ids: HashSet<String>,
}

impl ProbeSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), probes: Vec::new(), ids: HashSet::new() }
    }

    /// Layout description shared by every member.
    pub fn name(&self) -> &str { &self.name }

    /// Append a probe; duplicate ids or a foreign layout break the set invariant.
    pub fn add_probe(&mut self, probe: Probe) -> Result<(), DesignError> {
        if probe.layout != self.name {
            return Err(DesignError::Invariant(format!(
                "probe {} from layout {} added to probe set {}",
                probe.id, probe.layout, self.name
            )));
        }
        if !self.ids.insert(probe.id.clone()) {
            return Err(DesignError::Invariant(format!("duplicate probe id {}", probe.id)));
        }
        self.probes.push(probe);
        Ok(())
    }

    pub fn probes(&self) -> &[Probe] { &self.probes }

    pub fn len(&self) -> usize { self.probes.len() }

    pub fn is_empty(&self) -> bool { self.probes.is_empty() }

    pub fn into_probes(self) -> Vec<Probe> { self.probes }
}
