// Rendering benchmark for the proxy configuration generator
// Measures render_all latency over registries of increasing size
// Target: p95 < 50ms for 2000 sites, so every mutation can regenerate everything

use chrono::Utc;
use hostbox::proxy::{ConfigGenerator, FrontDoorPorts, GeneratorSettings};
use hostbox::{RuntimeInstance, Site, SiteStatus};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Benchmark configuration
const ITERATIONS: usize = 50;
const WARMUP_ITERATIONS: usize = 5;

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

struct BenchmarkResult {
    scenario: String,
    stats: LatencyStats,
    bytes: usize,
    passed: bool,
}

impl BenchmarkResult {
    fn print(&self) {
        println!("\n=== {} ===", self.scenario);
        self.stats.print("Latency");
        println!("  output: {} bytes", self.bytes);

        if self.passed {
            println!("PASS");
        } else {
            println!("FAIL: p95={:?} (target <50ms)", self.stats.p95);
        }
    }
}

fn runtimes() -> Vec<RuntimeInstance> {
    vec![
        RuntimeInstance::new("8.2", 9082, 2082),
        RuntimeInstance::new("8.3", 9083, 2083),
        RuntimeInstance::new("8.4", 9084, 2084),
    ]
}

fn synthetic_sites(count: usize) -> Vec<Site> {
    let versions = ["8.2", "8.3", "8.4"];
    let now = Utc::now();
    (0..count)
        .map(|i| {
            let domain = format!("site{}.example.test", i);
            let mut environment = BTreeMap::new();
            if i % 3 == 0 {
                environment.insert("APP_ENV".to_string(), "production".to_string());
            }
            Site {
                id: format!("{:08}", i),
                name: format!("Site {}", i),
                aliases: vec![format!("www.{}", domain)],
                runtime_version: versions[i % versions.len()].to_string(),
                root_path: PathBuf::from("/var/www/tenant").join(&domain),
                public_path: "public".to_string(),
                status: if i % 10 == 9 {
                    SiteStatus::Suspended
                } else {
                    SiteStatus::Active
                },
                worker_mode: false,
                worker_file: String::new(),
                worker_num: 0,
                environment,
                owner_id: format!("tenant{}", i % 50),
                created_at: now,
                updated_at: now,
                domain,
            }
        })
        .collect()
}

fn benchmark_render_all(count: usize) -> BenchmarkResult {
    let generator = ConfigGenerator::new(GeneratorSettings {
        log_dir: PathBuf::from("/var/log/hostbox"),
        proxy_admin_listen: "localhost:2019".to_string(),
    });
    let ports = FrontDoorPorts {
        http: 80,
        https: 443,
    };
    let sites = synthetic_sites(count);
    let runtimes = runtimes();

    for _ in 0..WARMUP_ITERATIONS {
        let _ = generator.render_all(&sites, &runtimes, ports);
    }

    let mut samples = Vec::with_capacity(ITERATIONS);
    let mut bytes = 0;
    for _ in 0..ITERATIONS {
        let start = Instant::now();
        let rendered = generator.render_all(&sites, &runtimes, ports);
        samples.push(start.elapsed());
        if let Ok(rendered) = rendered {
            bytes = rendered.front_door.len()
                + rendered.instances.values().map(String::len).sum::<usize>();
        }
    }

    let stats = LatencyStats::from_samples(samples);
    let passed = stats.p95 < Duration::from_millis(50);

    BenchmarkResult {
        scenario: format!("render_all, {} sites", count),
        stats,
        bytes,
        passed,
    }
}

fn main() {
    println!("hostbox render benchmark");
    println!("Iterations: {} (+{} warmup)", ITERATIONS, WARMUP_ITERATIONS);

    let results = [100, 500, 2000].map(benchmark_render_all);

    for result in &results {
        result.print();
    }

    let failed = results.iter().filter(|r| !r.passed).count();
    println!("\n{} of {} scenarios within target", results.len() - failed, results.len());
}
