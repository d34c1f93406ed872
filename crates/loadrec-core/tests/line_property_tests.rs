// Property-based tests for the values-file line format
//
// Properties tested:
// 1. format -> parse reproduces all six fields, including zero status/size
// 2. formatted lines always hold exactly five delimiters and no terminator
// 3. fields holding the delimiter are rejected before they reach a line

use loadrec_core::{parse_line, CoreError, EventRecord, DELIMITER};
use proptest::prelude::*;

// Methods and paths never contain the delimiter or line terminators.
fn method_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("GET".to_string()),
        Just("POST".to_string()),
        Just("PUT".to_string()),
        "[A-Z]{1,10}",
    ]
}

fn path_strategy() -> impl Strategy<Value = String> {
    "(/[a-zA-Z0-9_.~%?=&-]{0,12}){0,5}"
}

proptest! {
    #[test]
    fn prop_format_parse_round_trip(
        ts in any::<u64>(),
        method in method_strategy(),
        path in path_strategy(),
        time in any::<u64>(),
        status in any::<u16>(),
        size in any::<u64>(),
    ) {
        let record = EventRecord::new(ts, method, path, time, status, size).unwrap();
        let parsed = parse_line(&record.to_line()).unwrap();
        prop_assert_eq!(parsed, record);
    }

    #[test]
    fn prop_line_shape(
        ts in any::<u64>(),
        method in method_strategy(),
        path in path_strategy(),
        status in 0u16..600,
    ) {
        let line = EventRecord::new(ts, method, path, 0, status, 0).unwrap().to_line();
        prop_assert_eq!(line.matches(DELIMITER).count(), 5);
        prop_assert!(!line.contains('\n'));
    }

    #[test]
    fn prop_delimiter_in_path_rejected(prefix in "[a-z/]{0,8}", suffix in "[a-z/]{0,8}") {
        let path = format!("{prefix}{DELIMITER}{suffix}");
        let result = EventRecord::new(1, "GET", path, 1, 200, 1);
        prop_assert!(matches!(result, Err(CoreError::ValidationError(_))));
    }
}

#[test]
fn test_zero_edge_values_round_trip() {
    let record = EventRecord::new(0, "GET", "/", 0, 0, 0).unwrap();
    assert_eq!(record.to_line(), "0|GET|/|0|0|0");
    assert_eq!(parse_line("0|GET|/|0|0|0").unwrap(), record);
}
