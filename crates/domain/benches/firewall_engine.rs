#![allow(clippy::cast_possible_truncation)]

use std::net::Ipv4Addr;

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use domain::common::entity::TransportProtocol;
use domain::firewall::engine::{FirewallEngine, matcher_insert, matcher_without};
use domain::firewall::entity::{FwRule, Ipv4Network, PortRange};
use ebpf_common::firewall::AdvRuleMatcher;

fn make_rule(i: usize) -> FwRule {
    let network = Ipv4Network::new(Ipv4Addr::from(0x0A00_0000 | ((i as u32) << 8)), 24)
        .expect("valid prefix");
    FwRule::new(
        network,
        PortRange::ANY,
        PortRange::single(80),
        TransportProtocol::Tcp,
    )
}

fn bench_prepare(c: &mut Criterion) {
    let mut group = c.benchmark_group("firewall_prepare");

    for n in [10, 100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter(|| {
                let mut engine = FirewallEngine::new();
                for i in 0..n {
                    let rule = engine.prepare(make_rule(i)).expect("valid rule");
                    engine.insert(rule);
                }
                black_box(engine.len())
            });
        });
    }
    group.finish();
}

fn bench_matcher(c: &mut Criterion) {
    let mut full = AdvRuleMatcher::default();
    for id in 1..=16 {
        matcher_insert(&mut full, id);
    }

    c.bench_function("matcher_insert_until_full", |b| {
        b.iter(|| {
            let mut matcher = AdvRuleMatcher::default();
            for id in 1..=17 {
                black_box(matcher_insert(&mut matcher, black_box(id)));
            }
            matcher
        });
    });

    c.bench_function("matcher_without_middle", |b| {
        b.iter(|| matcher_without(black_box(&full), black_box(8)));
    });
}

criterion_group!(benches, bench_prepare, bench_matcher);
criterion_main!(benches);
