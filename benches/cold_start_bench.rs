// Cold-start benchmark for per-submission grading
// Measures end-to-end latency of grade(): fork, vet, execute, score, reap
// Target: p50 < 50ms, p95 < 100ms for the stock problems

use gradebox::{grade, GradeLimits, ProblemBank};
use std::time::{Duration, Instant};

/// Benchmark configuration
const ITERATIONS: usize = 100;
const WARMUP_ITERATIONS: usize = 10;

/// Latency percentiles
struct LatencyStats {
    p50: Duration,
    p95: Duration,
    p99: Duration,
    min: Duration,
    max: Duration,
    mean: Duration,
}

impl LatencyStats {
    fn from_samples(mut samples: Vec<Duration>) -> Self {
        samples.sort();
        let len = samples.len();

        let p50_idx = (len as f64 * 0.50) as usize;
        let p95_idx = (len as f64 * 0.95) as usize;
        let p99_idx = (len as f64 * 0.99) as usize;

        let sum: Duration = samples.iter().sum();
        let mean = sum / len as u32;

        Self {
            p50: samples[p50_idx],
            p95: samples[p95_idx],
            p99: samples[p99_idx],
            min: samples[0],
            max: samples[len - 1],
            mean,
        }
    }

    fn print(&self, label: &str) {
        println!("\n{}", label);
        println!("  p50: {:?}", self.p50);
        println!("  p95: {:?}", self.p95);
        println!("  p99: {:?}", self.p99);
        println!("  min: {:?}", self.min);
        println!("  max: {:?}", self.max);
        println!("  mean: {:?}", self.mean);
    }
}

/// Benchmark result
struct BenchmarkResult {
    scenario: String,
    stats: LatencyStats,
    passed: bool,
    reason: Option<String>,
}

impl BenchmarkResult {
    fn print(&self) {
        println!("\n=== {} ===", self.scenario);
        self.stats.print("Latency");

        match &self.reason {
            None => println!("PASS"),
            Some(reason) => println!("FAIL: {}", reason),
        }
    }
}

/// Grade `code` against a stock problem repeatedly and check the budget
fn benchmark_problem(problem_id: &str, code: Option<&str>, p50: u64, p95: u64) -> BenchmarkResult {
    let bank = ProblemBank::builtin();
    let problem = bank.get(problem_id).expect("stock problem");
    let code = code.unwrap_or(&problem.template_code);
    let limits = GradeLimits::default();

    for _ in 0..WARMUP_ITERATIONS {
        let _ = grade(problem, code, &limits);
    }

    let mut samples = Vec::new();
    let mut failures = 0;
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        let result = grade(problem, code, &limits);
        samples.push(start.elapsed());
        if !result.all_passed() {
            failures += 1;
        }
    }

    let stats = LatencyStats::from_samples(samples);

    let within_budget =
        stats.p50 < Duration::from_millis(p50) && stats.p95 < Duration::from_millis(p95);
    let reason = if failures > 0 {
        Some(format!("{} of {} runs did not pass", failures, ITERATIONS))
    } else if !within_budget {
        Some(format!(
            "p50={:?} (target <{}ms), p95={:?} (target <{}ms)",
            stats.p50, p50, stats.p95, p95
        ))
    } else {
        None
    };

    BenchmarkResult {
        scenario: format!("Grade {}", problem_id),
        stats,
        passed: reason.is_none(),
        reason,
    }
}

fn main() {
    println!("=== gradebox Cold-Start Benchmark ===");
    println!("Iterations: {} (after {} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let two_sum = "\
def two_sum(nums, target):
    seen = {}
    for i, n in enumerate(nums):
        if target - n in seen:
            return [seen[target - n], i]
        seen[n] = i
";

    let results = vec![
        benchmark_problem("fibonacci", None, 50, 100),
        benchmark_problem("is_palindrome", None, 50, 100),
        benchmark_problem("two_sum", Some(two_sum), 50, 100),
    ];

    for result in &results {
        result.print();
    }

    let passed_count = results.iter().filter(|r| r.passed).count();
    let total_count = results.len();
    println!("\n=== Summary ===");
    println!("{}/{} scenarios passed", passed_count, total_count);

    if passed_count == total_count {
        println!("All cold-start budgets met");
        std::process::exit(0);
    } else {
        println!("Some cold-start budgets exceeded");
        std::process::exit(1);
    }
}
