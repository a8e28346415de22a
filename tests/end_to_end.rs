use std::io::Write;

use oligopool::config::{read_config_lines, Registry};
use oligopool::error::DesignError;
use oligopool::output;
use oligopool::pool::{OligoPool, PoolSettings};
use oligopool::primer::PrimerPair;
use oligopool::primer3::{PrimerDesigner, PrimerRequest};
use oligopool::seqio;
use rstest::rstest;

const FASTA: &str = "\
>tx1 first target
GCTAAAGACAATTACATAACATACACGTCAGCACGAAACTTGTTGGCCCAGTGTGAATCG
>tx2
CTTAAGGGTTAAGTAAGTGTGATGCATACGCCTTTACTTGCTGTGTCCACCCCATCGGAC
>polyA
ACGTGCTAGCAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAATGCATGCAGT
";

const CONFIG: &str = "\
# tiling + filters
probe_layout\tsingle_tiling_probe_layout\t20\t10\t0\tsense
probe_filter\tpoly_base_filter\tACGT\t15\t12
primer_filter\tprimer_poly_base_filter\tACGT\t15\t12
primer_filter\tprimer_probe_match_filter\t0
";

fn write_temp(dir: &tempfile::TempDir, name: &str, text: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut f = std::fs::File::create(&path).unwrap();
    f.write_all(text.as_bytes()).unwrap();
    path
}

/// Designer returning one new pair per call, recording requests.
#[derive(Default)]
struct Scripted {
    requests: Vec<PrimerRequest>,
}

impl PrimerDesigner for Scripted {
    fn design(&mut self, request: &PrimerRequest) -> Result<Vec<PrimerPair>, DesignError> {
        let n = self.requests.len();
        self.requests.push(request.clone());
        let tag: String = (0..4).map(|k| b"ACGT"[(n >> (2 * k)) & 3] as char).collect();
        Ok(vec![PrimerPair::new(
            &format!("GGTCTCAGCTGACT{}TC", tag),
            60.1,
            &format!("CCAGTGACTGCATG{}AG", tag),
            59.8,
        )])
    }
}

fn pool(dir: &tempfile::TempDir, settings: PoolSettings) -> OligoPool {
    let lines = read_config_lines(write_temp(dir, "features.conf", CONFIG)).unwrap();
    OligoPool::new(Registry::builtin().load(&lines).unwrap(), settings).unwrap()
}

#[rstest]
#[case(1, 3)]
#[case(2, 2)]
#[case(3, 1)]
fn fasta_to_tables(#[case] group_size: usize, #[case] groups: usize) {
    let dir = tempfile::tempdir().unwrap();
    let transcripts = seqio::read_transcripts(write_temp(&dir, "targets.fa", FASTA)).unwrap();
    let mut pool = pool(&dir, PoolSettings { group_size, threads: Some(2), ..PoolSettings::default() });
    let mut designer = Scripted::default();

    let design = pool.create_oligos(&transcripts, &mut designer).unwrap();
    assert_eq!(design.groups.len(), groups);
    assert_eq!(designer.requests.len(), groups);
    assert!(designer.requests.iter().all(|r| r.primer_length == 20 && r.optimal_tm == 60.0));
    assert_eq!(design.entries.len(), 5 + 5 + 2);
    assert_eq!(design.rejected.len(), 3);
    assert!(design.rejected.iter().all(|r| r.probe.transcript_id == "polyA"));
    assert!(design.entries.iter().all(|e| e.oligo.len() == 20 + 40));
    assert!(design.entries[0].oligo.contains("GCTAAAGACAATTACATAAC"));

    let paths = output::write_design(&design, dir.path().join("run")).unwrap();
    let oligos = std::fs::read_to_string(&paths.oligos).unwrap();
    assert_eq!(oligos.lines().count(), 1 + 12);
    let primers = std::fs::read_to_string(&paths.primers).unwrap();
    assert_eq!(primers.lines().count(), 1 + groups);
    let rejected = std::fs::read_to_string(&paths.rejected).unwrap();
    assert!(rejected.contains("single_tiling_probe_layout_20_10_0_sense_polyA_10_29\tpolyA\t10\t29\tpoly_base_filter_ACGT_15_12"));
}

#[test]
fn feature_descriptions_reach_the_summary() {
    let dir = tempfile::tempdir().unwrap();
    let transcripts = seqio::read_transcripts(write_temp(&dir, "targets.fa", FASTA)).unwrap();
    let mut pool = pool(&dir, PoolSettings::default());
    let design = pool.create_oligos(&transcripts, &mut Scripted::default()).unwrap();
    let summary = output::summary_json(&design);
    assert_eq!(summary["features"][0], "single_tiling_probe_layout_20_10_0_sense");
    assert_eq!(summary["counts"]["candidate_probes"], 15);
    assert_eq!(summary["counts"]["failed_groups"], 0);
}

#[cfg(unix)]
mod fake_primer3 {
    use super::*;
    use oligopool::primer3::{Primer3, Primer3Settings};

    const REPLY: &str = include_str!("fixtures/primer3_two_pairs.txt");

    #[test]
    fn primer3_process_feeds_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let reply = write_temp(&dir, "reply.txt", REPLY);
        let script = write_temp(&dir, "primer3_core.sh", &format!("cat > /dev/null\ncat '{}'\n", reply.display()));
        let transcripts = seqio::read_transcripts(write_temp(&dir, "targets.fa", FASTA)).unwrap();
        let mut pool = pool(&dir, PoolSettings { group_size: 2, ..PoolSettings::default() });
        let mut designer = Primer3::new(Primer3Settings {
            executable: "sh".into(),
            args: vec![script.display().to_string()],
            seed: 11,
            ..Primer3Settings::default()
        })
        .unwrap();

        let design = pool.create_oligos(&transcripts, &mut designer).unwrap();
        // Every call returns the same two pairs; the second group has to take the second one.
        assert_eq!(design.groups.len(), 2);
        assert_eq!(design.groups[0].pair.left.sequence, "AGGTCTGCTTCAGGGACTCA");
        assert_eq!(design.groups[1].pair.left.sequence, "GCATCGATCGGATCCAGTTA");
        assert_eq!(design.groups[0].transcripts, vec!["tx1", "tx2"]);
        assert!(design.entries[0].oligo.starts_with("AGGTCTGCTTCAGGGACTCA"));
    }

    #[test]
    fn primer3_errors_abort_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let script = write_temp(&dir, "primer3_core.sh", "cat > /dev/null\necho 'PRIMER_ERROR=bad settings'\necho '='\n");
        let transcripts = seqio::read_transcripts(write_temp(&dir, "targets.fa", FASTA)).unwrap();
        let mut pool = pool(&dir, PoolSettings::default());
        let mut designer = Primer3::new(Primer3Settings {
            executable: "sh".into(),
            args: vec![script.display().to_string()],
            ..Primer3Settings::default()
        })
        .unwrap();
        match pool.create_oligos(&transcripts, &mut designer) {
            Err(DesignError::PrimerGroup { group, reason }) => {
                assert_eq!(group, "primer_group_0");
                assert!(reason.contains("bad settings"));
            }
            other => panic!("unexpected {:?}", other.map(|d| d.entries.len())),
        }
    }
}
