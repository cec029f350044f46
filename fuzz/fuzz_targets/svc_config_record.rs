#![no_main]

//! Fuzz target for decoder configuration record and parameter set parsing.

use libfuzzer_sys::fuzz_target;
use transcode_svc::{DecoderConfigRecord, PpsInfo, SpsInfo};

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = DecoderConfigRecord::parse(data) {
        assert!((1..=4).contains(&record.nal_length_size));
        for sps in &record.sequence_parameter_sets {
            let _ = SpsInfo::parse(sps);
        }
        for pps in &record.picture_parameter_sets {
            let _ = PpsInfo::parse(pps);
        }
    }

    // raw units as well, header byte first
    let _ = SpsInfo::parse(data);
    let _ = PpsInfo::parse(data);
});
