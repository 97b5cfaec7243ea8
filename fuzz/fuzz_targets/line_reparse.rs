#![no_main]

use cdrflow_core::config::LogGeneration;
use cdrflow_pipeline::grammar::LineGrammar;
use libfuzzer_sys::fuzz_target;

const LAYOUT: &str = "%Y-%m-%d %H:%M:%S%.f%z";

fuzz_target!(|data: &[u8]| {
    let Ok(line) = std::str::from_utf8(data) else {
        return;
    };
    let grammar = LineGrammar::new(LogGeneration::Current, LAYOUT).unwrap();

    // 파싱된 레코드를 다시 직렬화하면 같은 키로 다시 파싱되어야 한다
    if let Ok(record) = grammar.parse_line(line) {
        let rendered = grammar.render_line(&record);
        let reparsed = grammar
            .parse_line(&rendered)
            .unwrap_or_else(|e| panic!("rendered line rejected ({e}): {rendered}"));
        assert_eq!(reparsed.idempotency_key(), record.idempotency_key());
    }
});
