//! End-to-end parser scenarios: bytes in, events and tree out.

use ralph_core::signal::Signal;
use ralph_core::subagent::SubagentStatus;
use ralph_parser::{
    Dialect, EventKind, ParsedEvent, SignalScanner, StreamParser, SubagentTree, TreeDelta,
};

/// Push a whole byte stream through parser + tree + scanner the way the
/// engine's read loop does.
fn run_stream(
    dialect: Dialect,
    input: &[u8],
) -> (Vec<ParsedEvent>, SubagentTree, Option<Signal>) {
    let mut parser = StreamParser::new(dialect);
    let mut tree = SubagentTree::new();
    let mut scanner = SignalScanner::new();
    let mut events = Vec::new();
    let mut signal = None;

    parser.push(input);
    parser.finish();
    while let Some(ev) = parser.next_event() {
        if let Some(sig) = scanner.scan(&ev) {
            signal.get_or_insert(sig);
        }
        if let ParsedEvent::Structured(se) = &ev {
            tree.apply(se);
        }
        events.push(ev);
    }
    (events, tree, signal)
}

#[test]
fn claude_spawn_then_result_builds_one_completed_node() {
    let input = concat!(
        r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"toolu_1","name":"Task","input":{"description":"explore the repo"}}]}}"#,
        "\n",
        r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"toolu_1","content":"explored","is_error":false}]}}"#,
        "\n"
    );
    let (_, tree, _) = run_stream(Dialect::Claude, input.as_bytes());
    let nodes = tree.nodes();
    assert_eq!(nodes.len(), 1);
    assert_eq!(nodes[0].status, SubagentStatus::Completed);
    assert_eq!(nodes[0].description, "explore the repo");
    assert_eq!(nodes[0].output.as_deref(), Some("explored"));
}

#[test]
fn opencode_single_line_yields_spawn_then_result_same_call_id() {
    // Dialect B packs spawn + completion into one line.
    let input = br#"{"type":"tool_use","timestamp":1718000000000,"sessionID":"s","part":{"tool":"Task","callID":"c9","state":{"status":"completed","input":{"prompt":"subtask"},"output":"finished"}}}
"#;
    let (events, tree, _) = run_stream(Dialect::OpenCode, input);

    let structured: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            ParsedEvent::Structured(se) => Some(se),
            _ => None,
        })
        .collect();
    assert_eq!(structured.len(), 2);
    assert_eq!(structured[0].kind, EventKind::Spawn);
    assert_eq!(structured[1].kind, EventKind::Result);
    assert_eq!(structured[0].call_id, structured[1].call_id);

    assert_eq!(tree.len(), 1);
    assert_eq!(tree.nodes()[0].status, SubagentStatus::Completed);
}

#[test]
fn chunked_malformed_line_scenario() {
    // garbage-prefixed valid line, malformed line, valid line
    let input = b"garbage-prefix{\"type\":\"assistant\",\"message\":{\"content\":[{\"type\":\"tool_use\",\"id\":\"t1\",\"name\":\"Read\",\"input\":{}}]}}\n{bad json\n{\"type\":\"result\",\"result\":\"bye\"}\n";
    let (events, _, _) = run_stream(Dialect::Claude, input);

    assert_eq!(events.len(), 3);
    assert!(matches!(&events[0], ParsedEvent::Structured(se) if se.kind == EventKind::Spawn));
    assert!(matches!(&events[1], ParsedEvent::ParseError { .. }));
    assert!(matches!(&events[2], ParsedEvent::Structured(se) if se.kind == EventKind::Text));
}

#[test]
fn every_byte_boundary_chunking_is_equivalent() {
    let input: &[u8] = b"{\"type\":\"tool_use\",\"part\":{\"tool\":\"Task\",\"callID\":\"c1\",\"state\":{\"status\":\"completed\",\"output\":\"\xc3\xa9ok\"}}}\n\x1b[1mplain\x1b[0m\n";

    let mut whole = StreamParser::new(Dialect::OpenCode);
    whole.push(input);
    whole.finish();
    let mut expected = Vec::new();
    while let Some(e) = whole.next_event() {
        expected.push(e);
    }

    for split in 1..input.len() {
        let mut p = StreamParser::new(Dialect::OpenCode);
        p.push(&input[..split]);
        p.push(&input[split..]);
        p.finish();
        let mut got = Vec::new();
        while let Some(e) = p.next_event() {
            got.push(e);
        }
        assert_eq!(got, expected, "split at byte {split}");
    }
}

#[test]
fn unmatched_result_surfaces_without_poisoning_tree() {
    let input = br#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"never-spawned","content":"?","is_error":false}]}}
"#;
    let mut parser = StreamParser::new(Dialect::Claude);
    let mut tree = SubagentTree::new();
    parser.push(input);

    let mut unmatched = 0;
    while let Some(ev) = parser.next_event() {
        if let ParsedEvent::Structured(se) = &ev {
            if let Some(TreeDelta::Unmatched(id)) = tree.apply(se) {
                assert_eq!(id, "never-spawned");
                unmatched += 1;
            }
        }
    }
    assert_eq!(unmatched, 1);
    assert!(tree.is_empty());
}

#[test]
fn nested_spawns_produce_acyclic_tree_with_correct_depths() {
    let input = concat!(
        r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"p","name":"Task","input":{}}]}}"#,
        "\n",
        r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"child","name":"Bash","input":{}}]}}"#,
        "\n",
        r#"{"type":"user","message":{"content":[{"type":"tool_result","tool_use_id":"child","content":"ok"}]}}"#,
        "\n",
        r#"{"type":"assistant","message":{"content":[{"type":"tool_use","id":"child2","name":"Read","input":{}}]}}"#,
        "\n"
    );
    let (_, mut tree, _) = run_stream(Dialect::Claude, input.as_bytes());

    let closed = tree.finalize();
    // p and child2 never completed
    assert_eq!(closed.len(), 2);

    let nodes = tree.nodes();
    assert_eq!(nodes.len(), 3);
    assert_eq!(nodes[0].depth, 0);
    assert_eq!(nodes[1].depth, 1);
    assert_eq!(nodes[2].depth, 1);
    assert_eq!(nodes[1].parent, Some(0));
    assert_eq!(nodes[2].parent, Some(0));
    for n in nodes {
        if let Some(p) = n.parent {
            assert!(p < n.id);
        }
    }
}

#[test]
fn completion_sentinel_detected_in_stream() {
    let input = b"doing work\nall done <promise>COMPLETE</promise>\n";
    let (_, _, signal) = run_stream(Dialect::Claude, input);
    assert_eq!(signal, Some(Signal::Completion));
}

#[test]
fn rate_limit_line_detected_with_hint() {
    let input = b"Error: rate limit exceeded. Retry after 2 seconds.\n";
    let (_, _, signal) = run_stream(Dialect::Claude, input);
    assert_eq!(
        signal,
        Some(Signal::RateLimited {
            retry_after_secs: Some(2)
        })
    );
}
