#![no_main]

//! Fuzz target for access unit splitting and layer scanning.

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use transcode_svc::{extract, DqScan, Framing, SvcExtension};

#[derive(Arbitrary, Debug)]
struct UnitInput {
    data: Vec<u8>,
    /// 0 selects start-code framing, anything else a length field width.
    length_size: u8,
}

fuzz_target!(|input: UnitInput| {
    if input.data.len() > 1024 * 1024 {
        return;
    }

    let framing = match input.length_size % 5 {
        0 => Framing::StartCode,
        n => Framing::LengthPrefixed(n),
    };
    let Ok(units) = extract::units(&input.data, framing) else {
        return;
    };

    let mut total = 0;
    for unit in units.clone() {
        assert!(!unit.is_empty());
        total += unit.len();
        if let Some(ext) = SvcExtension::parse(unit) {
            assert!(ext.dependency_id < 8);
            assert!(ext.quality_id < 16);
        }
    }
    assert!(total <= input.data.len());

    let scan = DqScan::scan(units);
    assert!(scan.present.windows(2).all(|w| w[0] < w[1]));
    assert!(scan.present.last().map_or(true, |&max| max == scan.max_dq_id));
});
