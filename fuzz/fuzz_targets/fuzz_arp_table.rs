#![no_main]

use libfuzzer_sys::fuzz_target;

use adapters::net::arp::parse_arp_table;

// Parse arbitrary text as a neighbor table. Every parsed row must carry a
// non-empty device name.
fuzz_target!(|data: &[u8]| {
    let Ok(content) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(entries) = parse_arp_table(content) {
        for entry in &entries {
            assert!(!entry.device.is_empty());
            let _ = entry.is_resolved();
        }
    }
});
