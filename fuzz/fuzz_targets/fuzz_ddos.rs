#![no_main]

use std::collections::HashMap;

use libfuzzer_sys::fuzz_target;

use domain::common::entity::{TcpFlag, TransportProtocol};
use domain::ddos::engine::DosEngine;
use domain::ddos::entity::DosPolicy;
use ebpf_common::ddos::DosIdentifier;

const FLAGS: [TcpFlag; 8] = [
    TcpFlag::Fin,
    TcpFlag::Syn,
    TcpFlag::Rst,
    TcpFlag::Psh,
    TcpFlag::Ack,
    TcpFlag::Urg,
    TcpFlag::Ece,
    TcpFlag::Cwr,
];

// Feed the DoS engine random policies and counter snapshots, recording
// every mitigation as installed. A source is never blocked twice by the
// same policy.
//
// Layout:
//   [0]        = policy count (mod 8)
//   next 10*n  = policies: protocol, flag, limit (u64 LE)
//   rest       = snapshots of 14-byte observations:
//                address (u32 LE), protocol, flag, count (u64 LE)
fuzz_target!(|data: &[u8]| {
    let Some((&count, mut rest)) = data.split_first() else {
        return;
    };

    let mut engine = DosEngine::new();
    for _ in 0..(count % 8) {
        let Some((chunk, tail)) = rest.split_first_chunk::<10>() else {
            return;
        };
        rest = tail;
        let protocol = match chunk[0] % 4 {
            0 => TransportProtocol::Any,
            1 => TransportProtocol::Icmp,
            2 => TransportProtocol::Tcp,
            _ => TransportProtocol::Udp,
        };
        let flag = (chunk[1] < 8).then(|| FLAGS[usize::from(chunk[1])]);
        let mut limit = [0u8; 8];
        limit.copy_from_slice(&chunk[2..10]);
        let _ = engine.add_policy(DosPolicy::new(protocol, flag, u64::from_le_bytes(limit)));
    }

    let mut rule_id = 0;
    for snapshot in rest.chunks(14 * 4) {
        // Map keys are unique within one read.
        let observations: HashMap<_, _> = snapshot
            .chunks_exact(14)
            .map(|c| {
                let address = u32::from_le_bytes([c[0], c[1], c[2], c[3]]);
                let mut n = [0u8; 8];
                n.copy_from_slice(&c[6..14]);
                (DosIdentifier::new(address, c[4], c[5]), u64::from_le_bytes(n))
            })
            .collect();

        let observations: Vec<_> = observations.into_iter().collect();
        let evaluation = engine.evaluate(&observations);
        for mitigation in evaluation.mitigations {
            let policy = engine.policy(mitigation.policy_id).unwrap();
            assert!(!policy.blocked.contains(&mitigation.source));
            assert_eq!(mitigation.rule.network.prefix_len(), 32);
            rule_id += 1;
            engine
                .record_mitigation(mitigation.policy_id, rule_id, mitigation.source)
                .unwrap();
        }
    }
});
