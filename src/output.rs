//! Result tables and run summary.
//!
//! Writes, for an output prefix `out/run`:
//! - `out/run_oligos.tsv`: one row per synthesized oligo
//! - `out/run_primers.tsv`: one row per accepted primer group
//! - `out/run_rejected_probes.tsv`: probes dropped by a filter
//! - `out/run_summary.json`: counts, feature descriptions and failures
//!
//! Rows follow the order of the [`Design`], which is deterministic for a
//! fixed input and seed.
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::pool::Design;

#[derive(Serialize)]
struct OligoRow<'a> {
    probe_id: &'a str,
    transcript_id: &'a str,
    start: usize,
    end: usize,
    orientation: &'a str,
    primer_group: &'a str,
    probe_sequence: &'a str,
    oligo: &'a str,
}

#[derive(Serialize)]
struct PrimerRow<'a> {
    group: &'a str,
    transcripts: String,
    left: &'a str,
    left_tm: f64,
    right: &'a str,
    right_tm: f64,
    penalty: Option<f64>,
}

#[derive(Serialize)]
struct RejectedRow<'a> {
    probe_id: &'a str,
    transcript_id: &'a str,
    start: usize,
    end: usize,
    filter: &'a str,
}

/// Paths of the files written by [`write_design`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputPaths {
    pub oligos: PathBuf,
    pub primers: PathBuf,
    pub rejected: PathBuf,
    pub summary: PathBuf,
}

impl OutputPaths {
    pub fn from_prefix<P: AsRef<Path>>(prefix: P) -> Self {
        let prefix = prefix.as_ref().display().to_string();
        Self {
            oligos: format!("{prefix}_oligos.tsv").into(),
            primers: format!("{prefix}_primers.tsv").into(),
            rejected: format!("{prefix}_rejected_probes.tsv").into(),
            summary: format!("{prefix}_summary.json").into(),
        }
    }
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<File>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("creating {}", path.display()))
}

fn write_rows<T: Serialize>(path: &Path, rows: impl IntoIterator<Item = T>) -> Result<()> {
    let mut wtr = tsv_writer(path)?;
    for row in rows {
        wtr.serialize(row).with_context(|| format!("writing {}", path.display()))?;
    }
    wtr.flush().with_context(|| format!("flushing {}", path.display()))?;
    Ok(())
}

/// Summary object written to `<prefix>_summary.json`.
pub fn summary_json(design: &Design) -> serde_json::Value {
    let accepted: usize = design.transcripts.iter().map(|t| t.accepted).sum();
    let candidates: usize = design.transcripts.iter().map(|t| t.candidates).sum();
    serde_json::json!({
        "version": crate::VERSION,
        "features": design.features,
        "counts": {
            "transcripts": design.transcripts.len(),
            "candidate_probes": candidates,
            "accepted_probes": accepted,
            "rejected_probes": design.rejected.len(),
            "oligos": design.entries.len(),
            "primer_groups": design.groups.len(),
            "failed_groups": design.failures.len(),
        },
        "transcripts": design.transcripts,
        "failures": design.failures,
    })
}

/// Write all result files for `design`.
pub fn write_design<P: AsRef<Path>>(design: &Design, prefix: P) -> Result<OutputPaths> {
    let paths = OutputPaths::from_prefix(prefix);
    if let Some(dir) = paths.oligos.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    }

    write_rows(
        &paths.oligos,
        design.entries.iter().map(|e| OligoRow {
            probe_id: &e.probe.id,
            transcript_id: &e.probe.transcript_id,
            start: e.probe.start,
            end: e.probe.end(),
            orientation: e.probe.orientation.as_str(),
            primer_group: &e.primer_group,
            probe_sequence: &e.probe.sequence,
            oligo: &e.oligo,
        }),
    )?;

    write_rows(
        &paths.primers,
        design.groups.iter().map(|g| PrimerRow {
            group: &g.id,
            transcripts: g.transcripts.join(","),
            left: &g.pair.left.sequence,
            left_tm: g.pair.left.tm,
            right: &g.pair.right.sequence,
            right_tm: g.pair.right.tm,
            penalty: g.pair.penalty,
        }),
    )?;

    write_rows(
        &paths.rejected,
        design.rejected.iter().map(|r| RejectedRow {
            probe_id: &r.probe.id,
            transcript_id: &r.probe.transcript_id,
            start: r.probe.start,
            end: r.probe.end(),
            filter: &r.filter,
        }),
    )?;

    let f = File::create(&paths.summary).with_context(|| format!("creating {}", paths.summary.display()))?;
    serde_json::to_writer_pretty(BufWriter::new(f), &summary_json(design))?;
    Ok(paths)
}
