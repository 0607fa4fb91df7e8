#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // The reader hands the decoder lossily converted lines
    let text = String::from_utf8_lossy(data);
    for line in text.split('\n') {
        let _ = heatshed::teleinfo::decode_line(line, 0.0);
    }
});
