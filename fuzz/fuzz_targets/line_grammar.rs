#![no_main]

use cdrflow_core::config::LogGeneration;
use cdrflow_pipeline::grammar::LineGrammar;
use libfuzzer_sys::fuzz_target;

const LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.f%z";

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);

    // 두 세대 모두 패닉 없이 레코드 또는 거부 사유를 반환해야 한다
    for generation in [LogGeneration::Current, LogGeneration::Legacy] {
        let grammar = LineGrammar::new(generation, LAYOUT).unwrap();
        let _ = grammar.parse_line(&line);
    }
});
