//! Benchmarks for artifact aggregation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use reconflow::aggregate::{collect_findings, combine, extract_parametrized, TEMPLATE_RESULTS};

fn aggregate_benchmark(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let a = dir.path().join("gau.txt");
    let b = dir.path().join("waybackurls.txt");
    let urls_a: String = (0..5_000)
        .map(|i| format!("https://h{}.example.com/p/{i}?id={i}\n", i % 50))
        .collect();
    let urls_b: String = (2_500..7_500)
        .map(|i| format!("https://h{}.example.com/p/{i}\n", i % 50))
        .collect();
    std::fs::write(&a, urls_a).expect("write");
    std::fs::write(&b, urls_b).expect("write");

    let vuln = dir.path().join("vulnerabilities");
    std::fs::create_dir_all(&vuln).expect("mkdir");
    let hits: String = (0..1_000)
        .map(|i| format!("[tmpl-{i}] [http] [medium] https://h.example.com/{i}\n"))
        .collect();
    std::fs::write(vuln.join(TEMPLATE_RESULTS), hits).expect("write");

    c.bench_function("combine_10k", |bench| {
        bench.iter(|| combine(black_box(&[a.clone(), b.clone()])))
    });

    let merged = combine(&[a.clone(), b.clone()]).expect("combine");
    c.bench_function("extract_parametrized", |bench| {
        bench.iter(|| extract_parametrized(black_box(&merged)))
    });

    c.bench_function("collect_findings_1k", |bench| {
        bench.iter(|| collect_findings(black_box(&vuln)))
    });
}

criterion_group!(benches, aggregate_benchmark);
criterion_main!(benches);
