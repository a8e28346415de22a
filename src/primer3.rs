//! primer3 integration.
//!
//! ### Design
//! - Primers are shared across a whole probe group and must not bind any
//!   transcript, so they are designed on a **random synthetic template**
//!   drawn from a seeded RNG (reproducible runs).
//! - `primer3_core` is run as a scoped child process: the Boulder-IO record
//!   goes to stdin, the reply is read from stdout, and the child is always
//!   reaped before returning.
//! - All text handling lives in [`boulder_input`] and
//!   [`parse_boulder_output`], which are pure and tested on captured output.
//!
//! ### Errors
//! A missing executable, a non-zero exit, a `PRIMER_ERROR` tag or malformed
//! output are hard errors for that invocation. Zero returned pairs is not.
use std::collections::HashMap;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::error::DesignError;
use crate::primer::PrimerPair;

const DEFAULT_PRIMER3_BIN: &str = "primer3_core";
const PRIMER3_ENV_BIN: &str = "OLIGOPOOL_PRIMER3_BIN";

/// One request for candidate primer pairs.
#[derive(Clone, Debug, PartialEq)]
pub struct PrimerRequest {
    /// Label echoed as `SEQUENCE_ID` (e.g. `primer_group_0_attempt_2`).
    pub id: String,
    /// Exact primer length.
    pub primer_length: usize,
    /// Optimal melting temperature (°C).
    pub optimal_tm: f64,
}

/// Source of candidate primer pairs.
///
/// [`Primer3`] is the production implementation; tests plug in scripted
/// designers.
pub trait PrimerDesigner {
    fn design(&mut self, request: &PrimerRequest) -> Result<Vec<PrimerPair>, DesignError>;
}

impl<F> PrimerDesigner for F
where
    F: FnMut(&PrimerRequest) -> Result<Vec<PrimerPair>, DesignError>,
{
    fn design(&mut self, request: &PrimerRequest) -> Result<Vec<PrimerPair>, DesignError> { self(request) }
}

/// How to run primer3 and shape its synthetic template.
#[derive(Clone, Debug, PartialEq)]
pub struct Primer3Settings {
    /// Executable path; defaults to `$OLIGOPOOL_PRIMER3_BIN` or `primer3_core`.
    pub executable: PathBuf,
    /// Arguments placed before the record, e.g. `--p3_settings_file=...`.
    pub args: Vec<String>,
    /// Length of the random template handed to primer3.
    pub template_length: usize,
    /// Smallest product primer3 may propose.
    pub min_product_size: usize,
    /// Allowed deviation from the optimal Tm on either side.
    pub tm_tolerance: f64,
    /// `PRIMER_NUM_RETURN`.
    pub pairs_per_call: usize,
    /// RNG seed for templates.
    pub seed: u64,
}

impl Default for Primer3Settings {
    fn default() -> Self {
        Self {
            executable: primer3_executable(),
            args: Vec::new(),
            template_length: 500,
            min_product_size: 100,
            tm_tolerance: 3.0,
            pairs_per_call: 5,
            seed: 0,
        }
    }
}

impl Primer3Settings {
    pub fn validate(&self) -> Result<(), DesignError> {
        if self.executable.as_os_str().is_empty() {
            return Err(DesignError::Settings("primer3 executable must not be empty".to_string()));
        }
        if self.min_product_size == 0 {
            return Err(DesignError::Settings("min_product_size must be >= 1".to_string()));
        }
        if self.template_length < self.min_product_size {
            return Err(DesignError::Settings(format!(
                "template_length ({}) must be >= min_product_size ({})",
                self.template_length, self.min_product_size
            )));
        }
        if !self.tm_tolerance.is_finite() || self.tm_tolerance < 0.0 {
            return Err(DesignError::Settings(format!("tm_tolerance must be a non-negative number (got {})", self.tm_tolerance)));
        }
        if self.pairs_per_call == 0 {
            return Err(DesignError::Settings("pairs_per_call must be >= 1".to_string()));
        }
        Ok(())
    }

    /// A product must hold both primers.
    pub fn check_primer_length(&self, primer_length: usize) -> Result<(), DesignError> {
        if primer_length.checked_mul(2).is_none_or(|both| both > self.min_product_size) {
            return Err(DesignError::Settings(format!(
                "min_product_size ({}) cannot hold two primers of length {}",
                self.min_product_size, primer_length
            )));
        }
        Ok(())
    }
}

fn primer3_executable() -> PathBuf {
    std::env::var(PRIMER3_ENV_BIN)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_PRIMER3_BIN.to_string())
        .into()
}

/// Boulder-IO record asking for `pairs_per_call` pairs on `template`.
pub fn boulder_input(request: &PrimerRequest, settings: &Primer3Settings, template: &str) -> String {
    let product_max = template.len().max(settings.min_product_size);
    let tags = [
        ("SEQUENCE_ID", request.id.clone()),
        ("SEQUENCE_TEMPLATE", template.to_string()),
        ("PRIMER_TASK", "generic".to_string()),
        ("PRIMER_PICK_LEFT_PRIMER", "1".to_string()),
        ("PRIMER_PICK_INTERNAL_OLIGO", "0".to_string()),
        ("PRIMER_PICK_RIGHT_PRIMER", "1".to_string()),
        ("PRIMER_OPT_SIZE", request.primer_length.to_string()),
        ("PRIMER_MIN_SIZE", request.primer_length.to_string()),
        ("PRIMER_MAX_SIZE", request.primer_length.to_string()),
        ("PRIMER_OPT_TM", format!("{:.1}", request.optimal_tm)),
        ("PRIMER_MIN_TM", format!("{:.1}", request.optimal_tm - settings.tm_tolerance)),
        ("PRIMER_MAX_TM", format!("{:.1}", request.optimal_tm + settings.tm_tolerance)),
        ("PRIMER_PRODUCT_SIZE_RANGE", format!("{}-{}", settings.min_product_size, product_max)),
        ("PRIMER_NUM_RETURN", settings.pairs_per_call.to_string()),
        ("PRIMER_EXPLAIN_FLAG", "1".to_string()),
    ];
    let mut out = String::new();
    for (k, v) in tags {
        out.push_str(k);
        out.push('=');
        out.push_str(&v);
        out.push('\n');
    }
    out.push_str("=\n");
    out
}

/// Parse one primer3 Boulder-IO reply into primer pairs (best first).
pub fn parse_boulder_output(text: &str) -> Result<Vec<PrimerPair>, DesignError> {
    let mut tags: HashMap<&str, &str> = HashMap::new();
    for line in text.lines() {
        let line = line.trim_end();
        if line == "=" {
            break;
        }
        if line.is_empty() {
            continue;
        }
        let (k, v) = line
            .split_once('=')
            .ok_or_else(|| DesignError::Primer3Output(format!("line without '=': {}", line)))?;
        tags.insert(k, v);
    }

    if let Some(err) = tags.get("PRIMER_ERROR").filter(|v| !v.is_empty()) {
        return Err(DesignError::Primer3Output(format!("PRIMER_ERROR={}", err)));
    }

    let n: usize = tags
        .get("PRIMER_PAIR_NUM_RETURNED")
        .ok_or_else(|| DesignError::Primer3Output("missing PRIMER_PAIR_NUM_RETURNED".to_string()))?
        .trim()
        .parse()
        .map_err(|_| DesignError::Primer3Output("PRIMER_PAIR_NUM_RETURNED is not a number".to_string()))?;

    let text_tag = |key: String| {
        tags.get(key.as_str())
            .copied()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| DesignError::Primer3Output(format!("missing {}", key)))
    };
    let tm_tag = |key: String| -> Result<f64, DesignError> {
        let raw = text_tag(key.clone())?;
        raw.trim().parse().map_err(|_| DesignError::Primer3Output(format!("{} is not a number: {}", key, raw)))
    };

    let mut pairs = Vec::with_capacity(n);
    for i in 0..n {
        let left = text_tag(format!("PRIMER_LEFT_{i}_SEQUENCE"))?;
        let right = text_tag(format!("PRIMER_RIGHT_{i}_SEQUENCE"))?;
        let mut pair = PrimerPair::new(
            left.trim(),
            tm_tag(format!("PRIMER_LEFT_{i}_TM"))?,
            right.trim(),
            tm_tag(format!("PRIMER_RIGHT_{i}_TM"))?,
        );
        pair.penalty = tags
            .get(format!("PRIMER_PAIR_{i}_PENALTY").as_str())
            .and_then(|v| v.trim().parse().ok());
        pairs.push(pair);
    }
    Ok(pairs)
}

fn run_primer3(settings: &Primer3Settings, input: &str) -> Result<String, DesignError> {
    let executable = settings.executable.display().to_string();
    let mut child = Command::new(&settings.executable)
        .args(&settings.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                DesignError::ToolNotFound { executable: executable.clone() }
            } else {
                DesignError::Io(e)
            }
        })?;

    // stdin is dropped at the end of this block so primer3 sees EOF.
    let written = match child.stdin.take() {
        Some(mut stdin) => stdin.write_all(input.as_bytes()),
        None => Err(std::io::Error::new(ErrorKind::BrokenPipe, "primer3 stdin unavailable")),
    };
    if let Err(e) = written {
        let _ = child.kill();
        let _ = child.wait();
        return Err(DesignError::Io(e));
    }

    let output = child.wait_with_output()?;
    if !output.status.success() {
        return Err(DesignError::ToolFailed {
            executable,
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    String::from_utf8(output.stdout).map_err(|_| DesignError::Primer3Output("stdout is not UTF-8".to_string()))
}

/// primer3_core behind [`PrimerDesigner`].
pub struct Primer3 {
    settings: Primer3Settings,
    rng: StdRng,
}

impl Primer3 {
    pub fn new(settings: Primer3Settings) -> Result<Self, DesignError> {
        settings.validate()?;
        let rng = StdRng::seed_from_u64(settings.seed);
        Ok(Self { settings, rng })
    }

    pub fn settings(&self) -> &Primer3Settings { &self.settings }

    /// Uniform random A/C/G/T template of the configured length.
    pub fn random_template(&mut self) -> String {
        const BASES: [char; 4] = ['A', 'C', 'G', 'T'];
        (0..self.settings.template_length).map(|_| BASES[self.rng.random_range(0..4)]).collect()
    }
}

impl PrimerDesigner for Primer3 {
    fn design(&mut self, request: &PrimerRequest) -> Result<Vec<PrimerPair>, DesignError> {
        self.settings.check_primer_length(request.primer_length)?;
        let template = self.random_template();
        let input = boulder_input(request, &self.settings, &template);
        let stdout = run_primer3(&self.settings, &input)?;
        let pairs = parse_boulder_output(&stdout)?;
        debug!(request = %request.id, pairs = pairs.len(), "primer3 returned candidates");
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TWO_PAIRS: &str = include_str!("../tests/fixtures/primer3_two_pairs.txt");
    const ERROR: &str = include_str!("../tests/fixtures/primer3_error.txt");
    const NO_PAIRS: &str = include_str!("../tests/fixtures/primer3_no_pairs.txt");

    fn request() -> PrimerRequest {
        PrimerRequest { id: "primer_group_0_attempt_0".to_string(), primer_length: 20, optimal_tm: 60.0 }
    }

    #[test]
    fn parses_captured_primer3_reply() {
        let pairs = parse_boulder_output(TWO_PAIRS).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(pairs[0].left.sequence, "AGGTCTGCTTCAGGGACTCA");
        assert_eq!(pairs[0].right.sequence, "CTGAGCACCTTGGTACAGTA");
        assert!((pairs[0].left.tm - 60.059).abs() < 1e-9);
        assert!((pairs[1].right.tm - 60.214).abs() < 1e-9);
        assert_eq!(pairs[1].penalty, Some(0.402));
    }

    #[test]
    fn primer_error_tag_is_fatal() {
        match parse_boulder_output(ERROR) {
            Err(DesignError::Primer3Output(msg)) => assert!(msg.contains("shorter than the minimum product size")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn zero_pairs_is_an_empty_result() {
        assert!(parse_boulder_output(NO_PAIRS).unwrap().is_empty());
    }

    #[test]
    fn malformed_replies_are_rejected() {
        assert!(parse_boulder_output("").is_err());
        assert!(parse_boulder_output("garbage\n=\n").is_err());
        let missing_tm = "PRIMER_PAIR_NUM_RETURNED=1\nPRIMER_LEFT_0_SEQUENCE=ACGT\nPRIMER_RIGHT_0_SEQUENCE=TTGA\nPRIMER_LEFT_0_TM=60\n=\n";
        assert!(matches!(parse_boulder_output(missing_tm), Err(DesignError::Primer3Output(m)) if m.contains("PRIMER_RIGHT_0_TM")));
        let bad_tm = "PRIMER_PAIR_NUM_RETURNED=1\nPRIMER_LEFT_0_SEQUENCE=ACGT\nPRIMER_RIGHT_0_SEQUENCE=TTGA\nPRIMER_LEFT_0_TM=sixty\nPRIMER_RIGHT_0_TM=60\n=\n";
        assert!(parse_boulder_output(bad_tm).is_err());
    }

    #[test]
    fn boulder_record_carries_length_and_tm_window() {
        let settings = Primer3Settings { tm_tolerance: 2.5, pairs_per_call: 7, ..Primer3Settings::default() };
        let rec = boulder_input(&request(), &settings, &"A".repeat(300));
        assert!(rec.contains("PRIMER_MIN_SIZE=20\nPRIMER_MAX_SIZE=20\n"));
        assert!(rec.contains("PRIMER_OPT_TM=60.0\nPRIMER_MIN_TM=57.5\nPRIMER_MAX_TM=62.5\n"));
        assert!(rec.contains("PRIMER_PRODUCT_SIZE_RANGE=100-300\n"));
        assert!(rec.contains("PRIMER_NUM_RETURN=7\n"));
        assert!(rec.ends_with("\n=\n"));
    }

    #[test]
    fn templates_are_reproducible_per_seed() {
        let settings = Primer3Settings { seed: 42, template_length: 64, ..Primer3Settings::default() };
        let mut a = Primer3::new(settings.clone()).unwrap();
        let mut b = Primer3::new(settings).unwrap();
        let ta = a.random_template();
        assert_eq!(ta, b.random_template());
        assert_eq!(ta.len(), 64);
        assert!(ta.bytes().all(|c| b"ACGT".contains(&c)));
        assert_ne!(ta, a.random_template());
    }

    #[rstest]
    #[case(Primer3Settings { template_length: 50, ..Primer3Settings::default() })]
    #[case(Primer3Settings { min_product_size: 0, ..Primer3Settings::default() })]
    #[case(Primer3Settings { pairs_per_call: 0, ..Primer3Settings::default() })]
    #[case(Primer3Settings { tm_tolerance: -1.0, ..Primer3Settings::default() })]
    #[case(Primer3Settings { tm_tolerance: f64::NAN, ..Primer3Settings::default() })]
    #[case(Primer3Settings { executable: PathBuf::new(), ..Primer3Settings::default() })]
    fn out_of_range_settings_are_refused(#[case] settings: Primer3Settings) {
        assert!(matches!(settings.validate(), Err(DesignError::Settings(_))));
        assert!(matches!(Primer3::new(settings), Err(DesignError::Settings(_))));
    }

    #[test]
    fn default_settings_are_valid() {
        assert!(Primer3Settings::default().validate().is_ok());
        assert!(Primer3Settings { tm_tolerance: 0.0, ..Primer3Settings::default() }.validate().is_ok());
    }

    #[test]
    fn primers_must_fit_the_product() {
        let settings = Primer3Settings { min_product_size: 60, template_length: 60, ..Primer3Settings::default() };
        assert!(settings.check_primer_length(30).is_ok());
        assert!(settings.check_primer_length(31).is_err());
        assert!(settings.check_primer_length(usize::MAX).is_err());
        let mut p3 = Primer3::new(settings).unwrap();
        let long = PrimerRequest { primer_length: 40, ..request() };
        assert!(matches!(p3.design(&long), Err(DesignError::Settings(_))));
    }

    #[test]
    fn missing_executable_is_reported() {
        let settings = Primer3Settings {
            executable: "/nonexistent/oligopool/primer3_core".into(),
            ..Primer3Settings::default()
        };
        let err = Primer3::new(settings).unwrap().design(&request()).unwrap_err();
        assert!(matches!(err, DesignError::ToolNotFound { .. }));
    }

    #[cfg(unix)]
    mod process {
        use super::*;

        fn scripted(body: &str) -> (tempfile::TempDir, Primer3) {
            let dir = tempfile::tempdir().unwrap();
            let script = dir.path().join("fake_primer3.sh");
            std::fs::write(&script, body).unwrap();
            let settings = Primer3Settings {
                executable: "sh".into(),
                args: vec![script.display().to_string()],
                ..Primer3Settings::default()
            };
            (dir, Primer3::new(settings).unwrap())
        }

        #[test]
        fn runs_process_and_parses_stdout() {
            let fixture = tempfile::NamedTempFile::new().unwrap();
            std::fs::write(fixture.path(), TWO_PAIRS).unwrap();
            let (_dir, mut p3) = scripted(&format!("cat > /dev/null\ncat '{}'\n", fixture.path().display()));
            let pairs = p3.design(&request()).unwrap();
            assert_eq!(pairs.len(), 2);
        }

        #[test]
        fn non_zero_exit_is_a_tool_failure() {
            let (_dir, mut p3) = scripted("cat > /dev/null\necho 'boom' >&2\nexit 3\n");
            match p3.design(&request()) {
                Err(DesignError::ToolFailed { status, stderr, .. }) => {
                    assert_eq!(status, Some(3));
                    assert_eq!(stderr, "boom");
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        #[test]
        fn unparseable_stdout_is_fatal() {
            let (_dir, mut p3) = scripted("cat > /dev/null\necho 'not boulder io'\n");
            assert!(matches!(p3.design(&request()), Err(DesignError::Primer3Output(_))));
        }
    }
}
