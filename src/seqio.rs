//! FASTA input for **transcripts**.
//!
//! ### Design
//! - **FASTA / FASTA.GZ** (and FASTQ, whose qualities are ignored) parsed with `needletail`
//! - Identifier is the first whitespace-delimited token of the header
//! - Sequence case is preserved so repeat-masked bases reach the filters
//!
//! ### Errors
//! Parsing/IO errors, empty records and duplicate identifiers are bubbled via
//! `anyhow::Result` to the caller.
//!
//! ### Example
//! ```no_run
//! use oligopool::seqio;
//! let transcripts = seqio::read_transcripts("targets.fa.gz").unwrap();
//! println!("read {} transcripts", transcripts.len());
//! ```
use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use needletail::parse_fastx_file;
use tracing::info;

use crate::probe::Transcript;

/// Read every record of `path`, in file order.
pub fn read_transcripts<P: AsRef<Path>>(path: P) -> Result<Vec<Transcript>> {
    let p = path.as_ref();
    let mut reader = parse_fastx_file(p).with_context(|| format!("opening {}", p.display()))?;
    let mut seen = HashSet::new();
    let mut transcripts = Vec::new();
    while let Some(record) = reader.next() {
        let rec = record.with_context(|| format!("parsing {}", p.display()))?;
        let header = String::from_utf8_lossy(rec.id()).to_string();
        let id = header.split_whitespace().next().unwrap_or_default().to_string();
        if id.is_empty() {
            bail!("{}: record {} has an empty identifier", p.display(), transcripts.len() + 1);
        }
        if !seen.insert(id.clone()) {
            bail!("{}: duplicate transcript identifier '{}'", p.display(), id);
        }
        let seq = rec.seq();
        if !seq.is_ascii() {
            bail!("{}: transcript '{}' contains non-ASCII bases", p.display(), id);
        }
        transcripts.push(Transcript::new(id, String::from_utf8_lossy(&seq).into_owned()));
    }
    info!(path = %p.display(), transcripts = transcripts.len(), "transcripts loaded");
    Ok(transcripts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn fasta(text: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(".fa").tempfile().unwrap();
        f.write_all(text.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn reads_ids_and_keeps_case() {
        let f = fasta(">tx1 some description\nACGTacgt\nNNAC\n>tx2\nGGCC\n");
        let t = read_transcripts(f.path()).unwrap();
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].id, "tx1");
        assert_eq!(t[0].sequence, "ACGTacgtNNAC");
        assert_eq!(t[1], Transcript::new("tx2", "GGCC"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let f = fasta(">tx1\nACGT\n>tx1 again\nGGCC\n");
        let err = read_transcripts(f.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(read_transcripts("/nonexistent/targets.fa").is_err());
    }
}
