//! Integration tests for the MI line parser against fuller, realistic
//! transcripts (the inline `#[cfg(test)]` module in `src/mi.rs` covers the
//! scenario list from the spec line-by-line; these exercise longer,
//! multi-record sequences the way a real `gdb --interpreter=mi` session
//! would actually emit them).

use gdb_mcp_bridge::mi::{parse_line, MiRecord, ResultClass, StopReason};

#[test]
fn full_breakpoint_hit_transcript_parses_record_by_record() {
    let lines = [
        r#"=breakpoint-modified,bkpt={number="1",type="breakpoint",disp="keep",enabled="y",addr="0x0000000000401136",func="main",file="main.c",fullname="/tmp/main.c",line="5",thread-groups=["i1"],times="1",original-location="main"}"#,
        "~\"Starting program: /tmp/a.out \\n\"",
        "*running,thread-id=\"all\"",
        r#"*stopped,reason="breakpoint-hit",disp="keep",bkptno="1",frame={addr="0x0000000000401136",func="main",args=[],file="main.c",fullname="/tmp/main.c",line="5"},thread-id="1",stopped-threads="all",core="2""#,
        "(gdb)",
    ];

    let records: Vec<MiRecord> = lines
        .iter()
        .map(|l| parse_line(l).expect("every line in a real transcript must parse"))
        .collect();

    assert!(matches!(records[0], MiRecord::NotifyAsync { .. }));
    assert!(matches!(records[1], MiRecord::ConsoleStream { .. }));
    match &records[2] {
        MiRecord::ExecAsync { class, .. } => assert_eq!(class, "running"),
        other => panic!("unexpected: {other:?}"),
    }
    match &records[3] {
        MiRecord::ExecAsync { class, body, .. } => {
            assert_eq!(class, "stopped");
            let frame = body.get("frame").unwrap();
            assert_eq!(frame.get("func").and_then(|v| v.as_str()), Some("main"));
            let reason = body.get("reason").and_then(|v| v.as_str()).unwrap();
            assert_eq!(StopReason::from_mi_reason(reason), StopReason::Breakpoint);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert!(matches!(records[4], MiRecord::Prompt));
}

#[test]
fn backtrace_result_preserves_frame_order_and_list_shape() {
    let line = r#"^done,stack=[frame={level="0",addr="0x401136",func="main",file="main.c",line="5"},frame={level="1",addr="0x401050",func="__libc_start_main",file="??",line="0"}]"#;
    let record = parse_line(line).unwrap();
    let MiRecord::Result { class, body, .. } = record else {
        panic!("expected a Result record");
    };
    assert_eq!(class, ResultClass::Done);
    let stack = body.get("stack").unwrap().as_list().unwrap();
    assert_eq!(stack.len(), 2);
    assert_eq!(
        stack[0].get("level").and_then(|v| v.as_str()),
        Some("0")
    );
    assert_eq!(
        stack[1].get("func").and_then(|v| v.as_str()),
        Some("__libc_start_main")
    );
}

#[test]
fn exited_normally_result_is_recognized() {
    let record = parse_line(r#"*stopped,reason="exited-normally""#).unwrap();
    match record {
        MiRecord::ExecAsync { body, .. } => {
            let reason = body.get("reason").and_then(|v| v.as_str()).unwrap();
            assert_eq!(
                StopReason::from_mi_reason(reason),
                StopReason::ExitedNormally
            );
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn gdb_exit_result_class_recognized() {
    let record = parse_line("^exit").unwrap();
    match record {
        MiRecord::Result { class, token, .. } => {
            assert_eq!(class, ResultClass::Exit);
            assert_eq!(token, None);
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn watchpoint_variants_all_map_to_watchpoint() {
    for reason in [
        "watchpoint-trigger",
        "read-watchpoint-trigger",
        "access-watchpoint-trigger",
    ] {
        assert_eq!(StopReason::from_mi_reason(reason), StopReason::Watchpoint);
    }
}

#[test]
fn locals_result_with_empty_list_round_trips() {
    let record = parse_line(r#"^done,locals=[]"#).unwrap();
    match record {
        MiRecord::Result { body, .. } => {
            let locals = body.get("locals").unwrap().as_list().unwrap();
            assert!(locals.is_empty());
        }
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn log_stream_line_is_distinguished_from_console_and_target() {
    let log = parse_line(r#"&"target remote 127.0.0.1:1234\n""#).unwrap();
    assert!(matches!(log, MiRecord::LogStream { .. }));
    let target = parse_line(r#"@"inferior stdout line\n""#).unwrap();
    assert!(matches!(target, MiRecord::TargetStream { .. }));
}
