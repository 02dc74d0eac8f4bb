//! Resolver and Selection Benchmarks
//!
//! Measures the per-job routing path:
//! - Alias to family lookup
//! - Candidate resolution with and without an explicit voice
//! - Plan construction over a probed capability set
//! - Request fingerprinting

use std::collections::HashMap;
use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use sg_core::capability::{BackendId, CapabilityDescriptor, CapabilitySet, Quality, VoiceInfo};
use sg_core::job::{Constraints, Job, JobKind};
use sg_core::language::{LanguageFamily, PreferenceTable, Resolver};
use sg_core::policy::{PolicyOptions, RecencyMemo, SelectionPolicy};
use sg_core::probe::{ProbeReport, ProbeStatus};

fn capabilities() -> Arc<CapabilitySet> {
    let descriptors = vec![
        CapabilityDescriptor::new("azure", false)
            .with_languages(&["zh-HK", "zh-CN", "zh-TW", "en-US", "en-GB", "ja-JP"])
            .with_voices(vec![
                VoiceInfo::new("zh-HK-HiuMaanNeural", "HiuMaan", &["zh-HK"]),
                VoiceInfo::new("zh-CN-XiaoxiaoNeural", "Xiaoxiao", &["zh-CN"]),
                VoiceInfo::new("en-US-JennyNeural", "Jenny", &["en-US"]),
            ])
            .with_quality(Quality::Excellent),
        CapabilityDescriptor::new("gtts", false).with_languages(&["yue", "zh-CN", "zh-TW", "zh", "en", "ja", "fr"]),
        CapabilityDescriptor::new("say", true)
            .with_voices(vec![
                VoiceInfo::new("Sinji", "Sinji", &["zh_HK"]),
                VoiceInfo::new("Tingting", "Tingting", &["zh_CN"]),
                VoiceInfo::new("Samantha", "Samantha", &["en_US"]),
            ])
            .with_voice_languages()
            .with_batch(false),
        CapabilityDescriptor::new("espeak", true)
            .with_languages(&["en", "yue", "cmn", "fr"])
            .with_quality(Quality::Basic),
    ];
    match CapabilitySet::new(descriptors) {
        Ok(set) => Arc::new(set),
        Err(e) => panic!("invalid benchmark descriptors: {}", e),
    }
}

fn healthy(set: &CapabilitySet) -> ProbeReport {
    ProbeReport::new(set.ids().into_iter().map(|id| (id, ProbeStatus::Healthy)).collect::<HashMap<_, _>>())
}

/// Benchmark alias normalization
fn bench_family_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("family_lookup");

    for alias in ["yue", "zh_HK", "mandarin", "en-US", "tlh"] {
        group.bench_with_input(BenchmarkId::from_parameter(alias), &alias, |b, alias| {
            b.iter(|| black_box(LanguageFamily::from_alias(alias)))
        });
    }

    group.finish();
}

/// Benchmark candidate resolution
fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");
    let resolver = Resolver::new(capabilities(), PreferenceTable::builtin(), "en");

    group.bench_function("cantonese", |b| b.iter(|| black_box(resolver.resolve("cantonese", None))));

    group.bench_function("cantonese_with_voice", |b| {
        b.iter(|| black_box(resolver.resolve("zh-HK", Some("HiuMaan"))))
    });

    group.bench_function("unlisted", |b| b.iter(|| black_box(resolver.resolve("fr-CA", None))));

    group.finish();
}

/// Benchmark plan construction
fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    let set = capabilities();
    let probes = healthy(&set);
    let resolver = Resolver::new(set.clone(), PreferenceTable::builtin(), "en");
    let policy = SelectionPolicy::new(set, PolicyOptions::default());
    let memo = RecencyMemo::default();
    let family = LanguageFamily::Cantonese;
    let candidates = resolver.resolve("yue", None);

    group.bench_function("unconstrained", |b| {
        let constraints = Constraints::default();
        b.iter(|| {
            black_box(policy.plan(
                candidates.clone(),
                &constraints,
                &probes,
                &family,
                JobKind::Synthesis,
                &memo,
            ))
        })
    });

    group.bench_function("offline_only", |b| {
        let constraints = Constraints {
            offline_only: true,
            ..Constraints::default()
        };
        b.iter(|| {
            black_box(policy.plan(
                candidates.clone(),
                &constraints,
                &probes,
                &family,
                JobKind::Synthesis,
                &memo,
            ))
        })
    });

    group.bench_function("with_recency", |b| {
        memo.record(&family, JobKind::Synthesis, &BackendId::new("gtts"));
        let constraints = Constraints::default();
        b.iter(|| {
            black_box(policy.plan(
                candidates.clone(),
                &constraints,
                &probes,
                &family,
                JobKind::Synthesis,
                &memo,
            ))
        })
    });

    group.finish();
}

/// Benchmark request fingerprinting
fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    let family = LanguageFamily::English;

    for size in [16usize, 256, 4096] {
        let job = Job::synthesis("a".repeat(size)).with_voice("Samantha");
        group.bench_with_input(BenchmarkId::new("text", size), &job, |b, job| {
            b.iter(|| black_box(job.fingerprint(&family)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_family_lookup, bench_resolve, bench_plan, bench_fingerprint);
criterion_main!(benches);
