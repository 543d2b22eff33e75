//! Verification suite
//!
//! Runs every reference case through both the golden model and the tiled
//! engine, checks the expected closed-form values, dumps the hex vectors
//! for the RTL testbenches and keeps a pass/fail tally.
//!
//! A numeric mismatch between the engine and the golden model stops the
//! run. An I/O failure fails only the case that needed the file.

use std::fs;
use std::path::{Path, PathBuf};

use colored::Colorize;
use serde::{Deserialize, Serialize};

use crate::engine::{ExecutionReport, TiledEngine};
use crate::error::{NpuError, NpuResult};
use crate::executor::ExecutionMode;
use crate::hardware::{NpuConfig, SUBARRAY_COLS, SUBARRAY_ROWS};
use crate::hexio::{dump_hex_file, load_hex_file};
use crate::mac::{ref_mac, MacDrive, MacUnit};
use crate::reference::{gemm_tiled, gemv_tiled, GemmLayer, GemvLayer};
use crate::testgen::{compare_exact, MacStream, VectorGenerator};

/// Seeds of the random sub-array cases
pub const RANDOM_CASE_SALTS: [u64; 4] = [1, 42, 123, 9999];

/// How a suite run is set up
#[derive(Debug, Clone)]
pub struct SuiteOptions {
    pub seed: u64,
    pub out_dir: PathBuf,
    pub mode: ExecutionMode,
    pub config: NpuConfig,
    /// Print section banners and per-check lines
    pub echo: bool,
}

impl Default for SuiteOptions {
    fn default() -> Self {
        Self {
            seed: 42,
            out_dir: PathBuf::from("hex_out"),
            mode: ExecutionMode::CycleAccurate,
            config: NpuConfig::default(),
            echo: true,
        }
    }
}

/// One recorded check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRecord {
    pub section: String,
    pub name: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Outcome of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub seed: u64,
    pub mode: ExecutionMode,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Set when a mismatch stopped the run early
    pub aborted: Option<String>,
    pub hex_files: usize,
    pub engine: ExecutionReport,
    pub checks: Vec<CheckRecord>,
}

impl RunReport {
    pub fn all_passed(&self) -> bool {
        self.aborted.is_none() && self.failed == 0 && self.total > 0
    }

    /// Process exit status: 0 only when every check passed
    pub fn exit_code(&self) -> i32 {
        if self.all_passed() {
            0
        } else {
            1
        }
    }

    pub fn pass_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            100.0 * self.passed as f64 / self.total as f64
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

type Case = fn(&mut TestSuite) -> NpuResult<()>;

fn case(title: &'static str, run: Case) -> (&'static str, Case) {
    (title, run)
}

pub struct TestSuite {
    options: SuiteOptions,
    engine: TiledEngine,
    section: String,
    checks: Vec<CheckRecord>,
    hex_files: usize,
}

impl TestSuite {
    pub fn new(options: SuiteOptions) -> NpuResult<Self> {
        let engine = TiledEngine::new(&options.config, options.mode)?;
        Ok(Self {
            options,
            engine,
            section: String::new(),
            checks: Vec::new(),
            hex_files: 0,
        })
    }

    pub fn total(&self) -> usize {
        self.checks.len()
    }

    pub fn passed(&self) -> usize {
        self.checks.iter().filter(|c| c.passed).count()
    }

    /// Run every section in order
    pub fn run(mut self) -> NpuResult<RunReport> {
        fs::create_dir_all(&self.options.out_dir)
            .map_err(|e| NpuError::io(&self.options.out_dir, e))?;
        log::info!(
            "seed {} mode {} writing to {}",
            self.options.seed,
            self.options.mode,
            self.options.out_dir.display()
        );

        let sections = vec![
            (
                "MAC UNIT TESTS",
                vec![
                    case("MAC Unit - Basic Operations", mac_basic),
                    case("MAC Unit - Edge Cases", mac_edge_cases),
                    case("MAC Unit - Accumulation Patterns", mac_patterns),
                ],
            ),
            (
                "MAC UNIT HEX FILE GENERATION",
                vec![case("MAC Unit - Streamed Test Vectors", mac_stream)],
            ),
            (
                "GEMV SUBARRAY TESTS",
                vec![
                    case("GeMV - Identity-like Pattern", gemv_identity),
                    case("GeMV - All Ones Pattern", gemv_all_ones),
                    case("GeMV - Scaled Rows Pattern", gemv_scaled_rows),
                    case("GeMV - Alternating Signs Pattern", gemv_alternating),
                    case("GeMV - Maximum Values", gemv_max_values),
                    case("GeMV - Minimum Values", gemv_min_values),
                    case("GeMV - Mixed Signs", gemv_mixed_signs),
                    case("GeMV - Sparse Pattern", gemv_sparse),
                    case("GeMV - With Bias", gemv_with_bias),
                ],
            ),
            ("RANDOM TESTS", vec![case("GeMV - Random Patterns", gemv_random)]),
            (
                "LLM SIMULATION TESTS",
                vec![
                    case("LLM - Q/K/V Projection", llm_qkv_projection),
                    case("LLM - FFN Up Projection (Tiled)", llm_ffn_layer),
                ],
            ),
            (
                "TILING TESTS",
                vec![
                    case("Tiled GeMV - Accumulation Correctness", tiled_accumulation),
                    case("Tiled GeMV - Large Matrix", tiled_large_matrix),
                ],
            ),
            (
                "BOUNDARY TESTS",
                vec![
                    case("Boundary - Single Active Element", boundary_single_element),
                    case("Boundary - Last Element Only", boundary_last_element),
                    case("Boundary - First and Last Row Only", boundary_first_last_row),
                ],
            ),
            (
                "SIZE CLASS TESTS",
                vec![
                    case("GeMV - Size Classes", gemv_size_classes),
                    case("GeMM - Size Classes", gemm_size_classes),
                ],
            ),
        ];

        let mut aborted = None;
        'outer: for (banner, cases) in sections {
            if self.options.echo {
                println!("\n\n{}", format!(">>> {} <<<", banner).bold());
            }
            for (title, run_case) in cases {
                self.begin(title);
                match run_case(&mut self) {
                    Ok(()) => {}
                    Err(e) if e.is_fatal() => {
                        self.record(false, "tiled matches direct", Some(e.to_string()));
                        log::error!("{}", e);
                        aborted = Some(e.to_string());
                        break 'outer;
                    }
                    Err(e) => {
                        log::error!("{}: {}", title, e);
                        self.record(false, "case completed", Some(e.to_string()));
                    }
                }
            }
        }

        let total = self.total();
        let passed = self.passed();
        Ok(RunReport {
            seed: self.options.seed,
            mode: self.options.mode,
            total,
            passed,
            failed: total - passed,
            aborted,
            hex_files: self.hex_files,
            engine: self.engine.totals(),
            checks: self.checks,
        })
    }

    fn begin(&mut self, title: &str) {
        self.section = title.to_string();
        if self.options.echo {
            println!();
            println!("{}", "=".repeat(61));
            println!("{}", title.cyan());
            println!("{}", "=".repeat(61));
        }
    }

    fn record(&mut self, passed: bool, name: &str, detail: Option<String>) {
        if self.options.echo {
            let tag = if passed { "[PASS]".green() } else { "[FAIL]".red() };
            match &detail {
                Some(detail) => println!("  {} {} ({})", tag, name, detail),
                None => println!("  {} {}", tag, name),
            }
        }
        self.checks.push(CheckRecord {
            section: self.section.clone(),
            name: name.to_string(),
            passed,
            detail,
        });
    }

    fn check(&mut self, cond: bool, name: &str) {
        self.record(cond, name, None);
    }

    fn note(&self, line: impl AsRef<str>) {
        if self.options.echo {
            println!("  {}", line.as_ref());
        }
    }

    /// Derived seed for one case; every vector follows the run seed
    fn case_seed(&self, salt: u64) -> u64 {
        self.options.seed.wrapping_mul(10_007).wrapping_add(salt)
    }

    fn random(&self, len: usize, salt: u64) -> Vec<i8> {
        VectorGenerator::new(self.case_seed(salt)).random_i8(len)
    }

    /// Fatal comparison: records a pass or propagates the mismatch
    fn verify(&mut self, case: &str, tiled: &[i32], direct: &[i32]) -> NpuResult<()> {
        compare_exact(case, tiled, direct)?;
        self.check(true, &format!("{}: tiled matches direct", case));
        Ok(())
    }

    fn dump<T: crate::hexio::HexWord>(&mut self, name: &str, values: &[T]) -> NpuResult<PathBuf> {
        let path = self.options.out_dir.join(name);
        dump_hex_file(&path, values)?;
        self.hex_files += 1;
        Ok(path)
    }

    fn dump_layer(&mut self, tag: &str, layer: &GemvLayer) -> NpuResult<()> {
        self.dump(&format!("test_{}_input.hex", tag), &layer.input)?;
        self.dump(&format!("test_{}_weight.hex", tag), &layer.weights)?;
        self.dump(&format!("test_{}_output.hex", tag), &layer.output)?;
        Ok(())
    }

    /// Golden model, closed-form check, tiled engine, hex dump
    fn subarray_case(
        &mut self,
        tag: &str,
        mut layer: GemvLayer,
        expected: impl Fn(usize) -> i32,
        claim: &str,
    ) -> NpuResult<()> {
        layer.compute_reference()?;
        let matches = (0..layer.output_dim).all(|r| layer.output[r] == expected(r));
        self.check(matches, claim);

        let mut tiled = layer.clone();
        self.engine.run_layer(&mut tiled)?;
        self.verify(tag, &tiled.output, &layer.output)?;

        self.dump_layer(tag, &layer)
    }

    /// Tiled engine against the golden model for one GEMV shape
    fn gemv_against_reference(
        &mut self,
        case: &str,
        layer: &GemvLayer,
    ) -> NpuResult<(Vec<i32>, ExecutionReport)> {
        let mut direct = layer.clone();
        direct.compute_reference()?;
        let (tiled, report) = self
            .engine
            .gemv(&layer.weights, &layer.input, layer.input_dim, layer.output_dim)?;
        self.verify(case, &tiled, &direct.output)?;
        Ok((direct.output, report))
    }

    fn gemm_against_reference(
        &mut self,
        case: &str,
        layer: &GemmLayer,
    ) -> NpuResult<ExecutionReport> {
        let mut direct = layer.clone();
        direct.compute_reference()?;
        let (tiled, report) = self.engine.gemm(&layer.a, &layer.b, layer.m, layer.k, layer.n)?;
        self.verify(case, &tiled, &direct.c)?;

        let geometry = self.options.config.geometry();
        let mut software = vec![0; layer.m * layer.n];
        gemm_tiled(
            &layer.a,
            &layer.b,
            &mut software,
            (layer.m, layer.k, layer.n),
            (geometry.rows, geometry.cols),
        )?;
        self.verify(&format!("{} (software tiling)", case), &software, &direct.c)?;
        Ok(report)
    }

    fn expected_tiles(&self, m: usize, k: usize) -> usize {
        let geometry = self.options.config.geometry();
        geometry.row_tiles(m) * geometry.col_tiles(k)
    }
}

fn mac_check(suite: &mut TestSuite, start: i32, ops: &[(i8, i8)], expected: i32, claim: &str) {
    let mut acc = start;
    for (input, weight) in ops {
        ref_mac(*input, *weight, &mut acc);
    }
    suite.check(acc == expected, claim);
}

fn mac_basic(suite: &mut TestSuite) -> NpuResult<()> {
    mac_check(suite, 0, &[(2, 3)], 6, "2 * 3 = 6");
    mac_check(suite, 0, &[(2, 3), (4, 5)], 26, "6 + (4 * 5) = 26");
    mac_check(suite, 0, &[(-5, 7)], -35, "(-5) * 7 = -35");
    mac_check(suite, 0, &[(-3, -4)], 12, "(-3) * (-4) = 12");
    mac_check(suite, 0, &[(-3, -4), (-5, 7)], -23, "12 + ((-5) * 7) = -23");
    Ok(())
}

fn mac_edge_cases(suite: &mut TestSuite) -> NpuResult<()> {
    mac_check(suite, 100, &[(0, 50)], 100, "100 + (0 * 50) = 100");
    mac_check(suite, 100, &[(50, 0)], 100, "100 + (50 * 0) = 100");
    mac_check(suite, 0, &[(127, 1)], 127, "127 * 1 = 127");
    mac_check(suite, 0, &[(1, -128)], -128, "1 * (-128) = -128");
    mac_check(suite, 0, &[(100, -1)], -100, "100 * (-1) = -100");
    mac_check(suite, 0, &[(127, 127)], 16129, "127 * 127 = 16129");
    mac_check(suite, 0, &[(-128, -128)], 16384, "(-128) * (-128) = 16384");
    mac_check(suite, 0, &[(127, -128)], -16256, "127 * (-128) = -16256");
    mac_check(suite, 0, &[(127, 127); 256], 16129 * 256, "256 * (127 * 127) = 4129024");

    let mut acc = i32::MAX;
    ref_mac(1, 1, &mut acc);
    suite.check(acc == i32::MIN, "i32::MAX + 1 wraps to i32::MIN");
    Ok(())
}

fn mac_patterns(suite: &mut TestSuite) -> NpuResult<()> {
    mac_check(suite, 0, &[(10, 10), (-10, 10)], 0, "Alternating: (10*10) + (-10*10) = 0");
    let squares: Vec<(i8, i8)> = (1..=10).map(|i| (i, i)).collect();
    mac_check(suite, 0, &squares, 385, "Sum of squares 1^2 to 10^2 = 385");
    let ramp: Vec<(i8, i8)> = (1..=8).map(|i| (i, 1)).collect();
    mac_check(suite, 0, &ramp, 36, "Sum 1 to 8 = 36");
    Ok(())
}

fn mac_stream(suite: &mut TestSuite) -> NpuResult<()> {
    let mut stream = MacStream::new(suite.options.config.mac_stream_capacity);
    let mut push = |clear: bool, input: i8, weight: i8| {
        if let Err(e) = stream.push(clear, input, weight) {
            log::warn!("{}", e);
        }
    };

    // Basic operations
    push(true, 2, 3);
    push(false, 4, 5);
    push(true, -5, 7);
    push(true, -3, -4);
    push(false, -5, 7);

    // Edge cases
    for (input, weight) in [
        (0, 50),
        (50, 0),
        (127, 1),
        (1, -128),
        (100, -1),
        (127, 127),
        (-128, -128),
        (127, -128),
    ] {
        push(true, input, weight);
    }

    // Large accumulation
    push(true, 127, 127);
    for _ in 1..256 {
        push(false, 127, 127);
    }

    // Alternating signs
    push(true, 10, 10);
    push(false, -10, 10);

    // Sum of squares
    push(true, 1, 1);
    for i in 2..=10 {
        push(false, i, i);
    }

    // Sum 1 to 8
    push(true, 1, 1);
    for i in 2..=8 {
        push(false, i, 1);
    }

    suite.note(format!("Total MAC operations: {}", stream.len()));

    // Replay through the pipelined unit: clear, enable, one drain edge
    let mut unit = MacUnit::new();
    let mut pipeline_ok = true;
    for op in stream.ops() {
        if op.clear {
            unit.tick(MacDrive::clear());
        }
        unit.tick(MacDrive::enabled(op.input, op.weight));
        unit.tick(MacDrive::default());
        pipeline_ok &= unit.accumulator() == op.expected;
    }
    suite.check(pipeline_ok, "Pipelined MAC unit reproduces every expected accumulator");
    suite.check(
        stream.ops().last().map(|op| op.expected) == Some(36),
        "Stream ends on sum 1 to 8 = 36",
    );

    stream.dump(&suite.options.out_dir)?;
    suite.hex_files += 4;
    Ok(())
}

fn gemv_identity(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    for (i, x) in layer.input.iter_mut().enumerate() {
        *x = i as i8 + 1;
    }
    for r in 0..SUBARRAY_ROWS {
        layer.set_weight(r, r % SUBARRAY_COLS, 1);
    }
    suite.subarray_case(
        "identity",
        layer,
        |r| (r % SUBARRAY_COLS) as i32 + 1,
        "Identity pattern: output[r] = input[r % 8]",
    )
}

fn gemv_all_ones(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    layer.input.fill(1);
    layer.weights.fill(1);
    suite.subarray_case(
        "allones",
        layer,
        |_| SUBARRAY_COLS as i32,
        "All ones: output[r] = 8 for all r",
    )
}

fn gemv_scaled_rows(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    layer.input.fill(1);
    for r in 0..SUBARRAY_ROWS {
        for c in 0..SUBARRAY_COLS {
            layer.set_weight(r, c, r as i8 + 1);
        }
    }
    suite.subarray_case(
        "scaled",
        layer,
        |r| (r as i32 + 1) * SUBARRAY_COLS as i32,
        "Scaled rows: output[r] = (r+1) * 8",
    )
}

fn gemv_alternating(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    for (i, x) in layer.input.iter_mut().enumerate() {
        *x = if i % 2 == 0 { 1 } else { -1 };
    }
    layer.weights.fill(1);
    suite.subarray_case(
        "alternating",
        layer,
        |_| 0,
        "Alternating input: output[r] = 0 (cancellation)",
    )
}

fn gemv_max_values(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    layer.input.fill(127);
    layer.weights.fill(127);
    suite.subarray_case(
        "maxval",
        layer,
        |_| 127 * 127 * SUBARRAY_COLS as i32,
        "Max values: output[r] = 127 * 127 * 8 = 129032",
    )
}

fn gemv_min_values(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    layer.input.fill(-128);
    layer.weights.fill(-128);
    suite.subarray_case(
        "minval",
        layer,
        |_| 128 * 128 * SUBARRAY_COLS as i32,
        "Min values: output[r] = (-128) * (-128) * 8 = 131072",
    )
}

fn gemv_mixed_signs(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    layer.input.fill(127);
    layer.weights.fill(-128);
    suite.subarray_case(
        "mixed",
        layer,
        |_| 127 * -128 * SUBARRAY_COLS as i32,
        "Mixed signs: output[r] = 127 * (-128) * 8 = -130048",
    )
}

fn gemv_sparse(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    for (i, x) in layer.input.iter_mut().enumerate() {
        *x = i as i8 + 1;
    }
    for r in 0..SUBARRAY_ROWS {
        layer.set_weight(r, r % SUBARRAY_COLS, r as i8 + 1);
    }
    suite.subarray_case(
        "sparse",
        layer,
        |r| (r as i32 + 1) * ((r % SUBARRAY_COLS) as i32 + 1),
        "Sparse: output[r] = (r+1) * ((r%8)+1)",
    )
}

fn gemv_with_bias(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    layer.input.fill(1);
    layer.weights.fill(1);
    let layer = layer.with_bias((0..SUBARRAY_ROWS as i32).map(|r| r * 10).collect())?;
    suite.subarray_case(
        "bias",
        layer,
        |r| SUBARRAY_COLS as i32 + r as i32 * 10,
        "With bias: output[r] = 8 + r*10",
    )
}

fn gemv_random(suite: &mut TestSuite) -> NpuResult<()> {
    for salt in RANDOM_CASE_SALTS {
        let input = suite.random(SUBARRAY_COLS, salt);
        let weights = suite.random(SUBARRAY_ROWS * SUBARRAY_COLS, salt + 1000);
        let layer = GemvLayer::from_parts(SUBARRAY_COLS, SUBARRAY_ROWS, weights, input)?;

        let case = format!("random{}", salt);
        let (output, _) = suite.gemv_against_reference(&case, &layer)?;

        let min = output.iter().min().copied().unwrap_or_default();
        let max = output.iter().max().copied().unwrap_or_default();
        let avg = output.iter().map(|v| i64::from(*v)).sum::<i64>() / output.len() as i64;
        suite.note(format!("{} output stats: min={}, max={}, avg={}", case, min, max, avg));

        let golden = GemvLayer { output, ..layer };
        suite.dump_layer(&case, &golden)?;
    }
    Ok(())
}

fn llm_qkv_projection(suite: &mut TestSuite) -> NpuResult<()> {
    let token = suite.random(SUBARRAY_COLS, 100);
    suite.dump("test_llm_token.hex", &token)?;

    for (name, salt) in [("q", 200), ("k", 300), ("v", 400)] {
        let weights = suite.random(SUBARRAY_ROWS * SUBARRAY_COLS, salt);
        let layer = GemvLayer::from_parts(SUBARRAY_COLS, SUBARRAY_ROWS, weights, token.clone())?;
        let case = format!("{} projection", name.to_uppercase());
        let (output, _) = suite.gemv_against_reference(&case, &layer)?;
        suite.dump(&format!("test_llm_w{}.hex", name), &layer.weights)?;
        suite.dump(&format!("test_llm_{}.hex", name), &output)?;
    }
    Ok(())
}

fn llm_ffn_layer(suite: &mut TestSuite) -> NpuResult<()> {
    let (hidden_dim, intermediate_dim) = (64, 256);
    let input = suite.random(hidden_dim, 500);
    let weights = suite.random(intermediate_dim * hidden_dim, 600);
    let layer = GemvLayer::from_parts(hidden_dim, intermediate_dim, weights, input)?;

    let (output, report) = suite.gemv_against_reference("FFN up projection", &layer)?;
    let expected = suite.expected_tiles(intermediate_dim, hidden_dim);
    suite.check(
        report.tiles_issued == expected,
        &format!("FFN issued {} tile operations", expected),
    );
    suite.note(format!("Input dim: {}, Output dim: {}", hidden_dim, intermediate_dim));

    suite.dump("test_ffn_input.hex", &layer.input)?;
    suite.dump("test_ffn_weight.hex", &layer.weights)?;
    suite.dump("test_ffn_output.hex", &output)?;
    Ok(())
}

fn tiled_accumulation(suite: &mut TestSuite) -> NpuResult<()> {
    let (input_dim, output_dim) = (32, 32);
    let mut layer = GemvLayer::new(input_dim, output_dim)?;
    layer.input.fill(1);
    layer.weights.fill(1);

    let (direct, _) = suite.gemv_against_reference("accumulation", &layer)?;

    let geometry = suite.options.config.geometry();
    let mut software = vec![0; output_dim];
    gemv_tiled(
        &layer.input,
        &layer.weights,
        &mut software,
        (input_dim, output_dim),
        (geometry.rows, geometry.cols),
    )?;
    suite.verify("accumulation (software tiling)", &software, &direct)?;
    suite.check(direct[0] == input_dim as i32, "Output = sum of 32 ones = 32");
    Ok(())
}

fn tiled_large_matrix(suite: &mut TestSuite) -> NpuResult<()> {
    let (input_dim, output_dim) = (128, 256);
    let input = suite.random(input_dim, 700);
    let weights = suite.random(output_dim * input_dim, 800);
    let layer = GemvLayer::from_parts(input_dim, output_dim, weights, input)?;

    let (output, report) = suite.gemv_against_reference("large", &layer)?;
    let expected = suite.expected_tiles(output_dim, input_dim);
    suite.note(format!("Total tile operations: {}", report.tiles_issued));
    suite.check(report.tiles_issued == expected, &format!("{} tile operations issued", expected));
    if suite.options.mode == ExecutionMode::CycleAccurate {
        let cycles = expected as u64 * suite.options.config.cycles_per_tile();
        suite.check(report.cycles == cycles, &format!("{} controller cycles", cycles));
    }

    suite.dump("test_large_input.hex", &layer.input)?;
    suite.dump("test_large_weight.hex", &layer.weights)?;
    let path = suite.dump("test_large_output.hex", &output)?;
    hex_round_trip(suite, &path, &output)
}

/// Reload a dumped golden vector and hold it against a fresh engine run
fn hex_round_trip(suite: &mut TestSuite, path: &Path, golden: &[i32]) -> NpuResult<()> {
    let reloaded: Vec<i32> = load_hex_file(path, golden.len())?;
    suite.verify("hex round-trip", &reloaded, golden)
}

fn boundary_single_element(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    layer.input[0] = 5;
    for r in 0..SUBARRAY_ROWS {
        layer.set_weight(r, 0, r as i8 + 1);
    }
    suite.subarray_case(
        "single",
        layer,
        |r| 5 * (r as i32 + 1),
        "Single element: output[r] = 5 * (r+1)",
    )
}

fn boundary_last_element(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    layer.input[SUBARRAY_COLS - 1] = 7;
    for r in 0..SUBARRAY_ROWS {
        layer.set_weight(r, SUBARRAY_COLS - 1, r as i8 + 1);
    }
    suite.subarray_case(
        "last",
        layer,
        |r| 7 * (r as i32 + 1),
        "Last element: output[r] = 7 * (r+1)",
    )
}

fn boundary_first_last_row(suite: &mut TestSuite) -> NpuResult<()> {
    let mut layer = GemvLayer::subarray();
    layer.input.fill(1);
    for c in 0..SUBARRAY_COLS {
        layer.set_weight(0, c, 10);
        layer.set_weight(SUBARRAY_ROWS - 1, c, 20);
    }
    suite.subarray_case(
        "firstlast",
        layer,
        |r| match r {
            0 => 10 * SUBARRAY_COLS as i32,
            r if r == SUBARRAY_ROWS - 1 => 20 * SUBARRAY_COLS as i32,
            _ => 0,
        },
        "First/last row: output[0]=80, output[31]=160, others=0",
    )
}

/// Single tile, tiled along one dimension, tiled along both
fn size_class_shapes(suite: &TestSuite) -> [(&'static str, usize, usize); 3] {
    let geometry = suite.options.config.geometry();
    let (r, c) = (geometry.rows, geometry.cols);
    [
        ("single tile", r, c),
        ("tiled in K", r, 4 * c + 3),
        ("tiled in M and K", 3 * r + 5, 2 * c + 1),
    ]
}

fn gemv_size_classes(suite: &mut TestSuite) -> NpuResult<()> {
    for (index, (label, m, k)) in size_class_shapes(suite).into_iter().enumerate() {
        let salt = 2000 + 10 * index as u64;
        let weights = suite.random(m * k, salt);
        let input = suite.random(k, salt + 1);
        let layer = GemvLayer::from_parts(k, m, weights, input)?;
        let case = format!("GEMV {} ({}x{})", label, m, k);
        let (_, report) = suite.gemv_against_reference(&case, &layer)?;
        suite.check(
            report.tiles_issued == suite.expected_tiles(m, k),
            &format!("GEMV {} issued {} tiles", label, report.tiles_issued),
        );
    }
    Ok(())
}

fn gemm_size_classes(suite: &mut TestSuite) -> NpuResult<()> {
    for (index, (label, m, k)) in size_class_shapes(suite).into_iter().enumerate() {
        let n = 3 + index;
        let salt = 3000 + 10 * index as u64;
        let a = suite.random(m * k, salt);
        let b = suite.random(k * n, salt + 1);
        let layer = GemmLayer::from_parts(m, k, n, a, b)?;
        let case = format!("GEMM {} ({}x{}x{})", label, m, k, n);
        let report = suite.gemm_against_reference(&case, &layer)?;
        suite.check(
            report.tiles_issued == suite.expected_tiles(m, k) * n,
            &format!("GEMM {} issued {} tiles", label, report.tiles_issued),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(dir: &Path, mode: ExecutionMode) -> SuiteOptions {
        SuiteOptions {
            seed: 7,
            out_dir: dir.to_path_buf(),
            mode,
            config: NpuConfig::default(),
            echo: false,
        }
    }

    fn report(total: usize, failed: usize, aborted: Option<&str>) -> RunReport {
        RunReport {
            seed: 42,
            mode: ExecutionMode::Functional,
            total,
            passed: total - failed,
            failed,
            aborted: aborted.map(str::to_string),
            hex_files: 0,
            engine: ExecutionReport::default(),
            checks: Vec::new(),
        }
    }

    #[test]
    fn test_exit_code_requires_every_check() {
        assert_eq!(report(10, 0, None).exit_code(), 0);
        assert_eq!(report(10, 1, None).exit_code(), 1);
        assert_eq!(report(3, 0, Some("Mismatch in qkv at [4]")).exit_code(), 1);
        // An empty run proves nothing
        assert_eq!(report(0, 0, None).exit_code(), 1);
        assert_eq!(report(10, 1, None).pass_rate(), 90.0);
    }

    #[test]
    fn test_full_run_passes() {
        let dir = tempfile::tempdir().unwrap();
        let report = TestSuite::new(options(dir.path(), ExecutionMode::Functional))
            .unwrap()
            .run()
            .unwrap();
        let failures: Vec<_> = report.checks.iter().filter(|c| !c.passed).collect();
        assert!(report.all_passed(), "{:#?}", failures);
        assert!(dir.path().join("test_identity_output.hex").exists());
        assert!(dir.path().join("mac_test_expected.hex").exists());
    }

    #[test]
    fn test_case_seed_follows_run_seed() {
        let dir = tempfile::tempdir().unwrap();
        let a = TestSuite::new(options(dir.path(), ExecutionMode::Functional)).unwrap();
        let mut other = options(dir.path(), ExecutionMode::Functional);
        other.seed = 8;
        let b = TestSuite::new(other).unwrap();
        assert_ne!(a.random(16, 1), b.random(16, 1));
        assert_eq!(a.random(16, 1), a.random(16, 1));
    }

    #[test]
    fn test_unwritable_out_dir_fails_run() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        fs::write(&blocker, "x").unwrap();
        let suite =
            TestSuite::new(options(&blocker.join("sub"), ExecutionMode::Functional)).unwrap();
        assert!(matches!(suite.run(), Err(NpuError::Io { .. })));
    }
}
