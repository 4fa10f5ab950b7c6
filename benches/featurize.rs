use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rarepred::data::CleanRecord;
use rarepred::features::{features_and_labels, select_tests, test_counts};

const TEST_IDS: [&str; 8] = ["HBA", "GLU", "ALB", "CRP", "LDL", "TSH", "VITD", "FERR"];

/// Test `k` is taken by roughly one patient in `k + 1`, so later ids are rarer.
fn random_records(patients: usize) -> Vec<CleanRecord> {
    let mut rng = StdRng::seed_from_u64(0xFEA7 + patients as u64);
    let mut records = Vec::new();
    for p in 0..patients {
        let age = rng.gen_range(18.0..90.0);
        for (k, id) in TEST_IDS.iter().enumerate() {
            if rng.gen_range(0..=k) == 0 {
                records.push(CleanRecord {
                    test_id: id.to_string(),
                    patient_id: format!("p{p}"),
                    age: age + rng.gen_range(0.0..2.0),
                    result: f64::from(rng.gen_range(1_u32..200)),
                });
            }
        }
    }
    records
}

fn benchmark_featurize(c: &mut Criterion) {
    let mut group = c.benchmark_group("features_and_labels");
    for patients in [1_000_usize, 10_000, 50_000] {
        let records = random_records(patients);
        let selection = select_tests(&test_counts(&records), patients / 10)
            .expect("synthetic data always has an eligible test");
        group.throughput(Throughput::Elements(records.len() as u64));

        group.bench_with_input(
            BenchmarkId::from_parameter(patients),
            &records,
            |b, input| {
                b.iter(|| {
                    let set = features_and_labels(black_box(input), &selection)
                        .expect("rare test patients exist");
                    black_box(set);
                });
            },
        );
    }
    group.finish();
}

criterion_group!(featurize, benchmark_featurize);
criterion_main!(featurize);
