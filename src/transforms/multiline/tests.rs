use std::{collections::HashMap, sync::Arc, thread};

use proptest::prelude::*;
use rand::{seq::SliceRandom, Rng};
use rstest::rstest;
use serde_json::json;
use similar_asserts::assert_eq;

use super::*;

fn build(config: &str) -> Multiline {
    toml::from_str::<MultilineConfig>(config)
        .unwrap()
        .build()
        .unwrap()
}

fn line(host: &str, message: &str) -> LogEvent {
    let mut event = LogEvent::from(message);
    event.insert("host", host);
    event.insert("type", "test");
    event
}

/// Runs the lines through `multiline` as one stream and returns what
/// `process` emitted followed by what the final `flush` emitted.
fn run(multiline: &Multiline, lines: &[&str]) -> (Vec<LogEvent>, Vec<LogEvent>) {
    let processed = lines
        .iter()
        .filter_map(|message| multiline.process(line("host", message)))
        .collect();
    (processed, multiline.flush())
}

fn messages(events: &[LogEvent]) -> Vec<String> {
    events
        .iter()
        .map(|event| event.message().unwrap_or_default().into_owned())
        .collect()
}

const SIMPLE: &str = r#"
    pattern = "^\\s"
    what = "previous"
"#;

#[test]
fn new_group_after_a_group_flushes_it() {
    let multiline = build(SIMPLE);
    let (processed, flushed) = run(
        &multiline,
        &[
            "hello world",
            "   second line",
            "another first line",
            "not linked to previous",
        ],
    );

    assert_eq!(
        messages(&processed),
        vec!["hello world\n   second line", "another first line"]
    );
    assert!(processed[0].has_tag("multiline"));
    assert!(!processed[1].contains("tags"));

    assert_eq!(messages(&flushed), vec!["not linked to previous"]);
    assert!(!flushed[0].contains("tags"));
}

#[test]
fn continuation_after_a_single_line_extends_it() {
    let multiline = build(SIMPLE);
    let (processed, flushed) = run(
        &multiline,
        &[
            "hello world",
            "   second line",
            "another first line",
            "   linked to previous",
        ],
    );

    assert_eq!(messages(&processed), vec!["hello world\n   second line"]);
    assert_eq!(
        messages(&flushed),
        vec!["another first line\n   linked to previous"]
    );
    assert!(flushed[0].has_tag("multiline"));
}

#[test]
fn add_tag_and_add_field_apply_to_groups_only() {
    let multiline = build(
        r#"
        pattern = "^\\s"
        what = "previous"
        add_tag = ["test"]
        add_field = ["test", "value"]
        "#,
    );
    let (processed, _) = run(
        &multiline,
        &[
            "hello world",
            "   second line",
            "another first line",
            "not linked to previous",
        ],
    );

    assert_eq!(processed[0].tags(), vec!["multiline", "test"]);
    assert_eq!(processed[0].get("test"), Some(&json!("value")));
    assert!(!processed[1].contains("tags"));
    assert!(!processed[1].contains("test"));
}

#[test]
fn grok_pattern_with_negate_groups_until_next_header() {
    let multiline = build(
        r#"
        pattern = "^%{NUMBER} %{TIME}"
        negate = true
        what = "previous"
        "#,
    );
    let (processed, flushed) = run(
        &multiline,
        &[
            "120913 12:04:33 first line",
            "second line",
            "third line",
            "120913 12:05:25 another event",
            "120913 12:05:25 yet another event",
        ],
    );

    assert_eq!(
        messages(&processed),
        vec![
            "120913 12:04:33 first line\nsecond line\nthird line",
            "120913 12:05:25 another event",
        ]
    );
    assert_eq!(messages(&flushed), vec!["120913 12:05:25 yet another event"]);
}

#[test]
fn named_captures_of_the_first_line_are_kept() {
    let multiline = build(
        r#"
        pattern = "^%{NUMBER:first} %{TIME:second}"
        negate = true
        what = "previous"
        "#,
    );
    let (processed, flushed) = run(
        &multiline,
        &["120913 12:04:33 first line", "second line", "third line"],
    );

    assert!(processed.is_empty());
    assert_eq!(flushed.len(), 1);
    let event = &flushed[0];
    assert_eq!(
        event.message().as_deref(),
        Some("120913 12:04:33 first line\nsecond line\nthird line")
    );
    assert_eq!(event.get("first"), Some(&json!("120913")));
    assert_eq!(event.get("second"), Some(&json!("12:04:33")));
    assert!(event.has_tag("multiline"));
}

#[test]
fn captures_are_written_onto_single_lines_too() {
    let multiline = build(
        r#"
        pattern = "^%{NUMBER:first} %{TIME:second}"
        negate = true
        what = "previous"
        "#,
    );
    let (processed, _) = run(
        &multiline,
        &["120913 12:05:25 another event", "120913 12:05:26 next"],
    );

    assert_eq!(processed.len(), 1);
    assert_eq!(processed[0].get("second"), Some(&json!("12:05:25")));
    assert!(!processed[0].contains("tags"));
}

#[test]
fn upstream_tags_survive_when_nothing_is_aggregated() {
    let multiline = build(
        r#"
        add_tag = ["nope"]
        remove_tag = "dummy"
        add_field = ["dummy2", "value"]
        pattern = "an unlikely match"
        what = "previous"
        "#,
    );

    let mut emitted = Vec::new();
    for message in [
        "120913 12:04:33 first line",
        "120913 12:04:33 second line",
        "",
    ] {
        let mut event = line("host", message);
        event.add_tag("dummy");
        emitted.extend(multiline.process(event));
    }
    emitted.extend(multiline.flush());

    assert_eq!(emitted.len(), 3);
    for event in &emitted {
        assert_eq!(event.tags(), vec!["dummy"]);
        assert!(!event.contains("dummy2"));
    }
}

#[test]
fn remove_tag_and_remove_field_apply_to_groups() {
    let multiline = build(
        r#"
        pattern = "^\\s"
        what = "previous"
        remove_tag = ["dummy"]
        remove_field = "secret"
        "#,
    );

    let mut first = line("host", "start");
    first.add_tag("dummy");
    first.insert("secret", "hunter2");
    assert!(multiline.process(first).is_none());
    assert!(multiline.process(line("host", "  more")).is_none());

    let flushed = multiline.flush();
    assert_eq!(flushed[0].tags(), vec!["multiline"]);
    assert!(!flushed[0].contains("secret"));
}

#[test]
fn templated_mutations_render_against_the_group() {
    let multiline = build(
        r#"
        pattern = "^\\s"
        what = "previous"
        multiline_tag = ""
        add_tag = "from-{{ host }}"
        add_field = { origin = "{{ type }}" }
        "#,
    );

    multiline.process(line("web-1", "start"));
    multiline.process(line("web-1", "  more"));
    let flushed = multiline.flush();

    assert_eq!(flushed[0].tags(), vec!["from-web-1"]);
    assert_eq!(flushed[0].get("origin"), Some(&json!("test")));
}

#[test]
fn flush_twice_emits_each_group_once() {
    let multiline = build(SIMPLE);
    multiline.process(line("a", "a start"));
    multiline.process(line("b", "b start"));
    multiline.process(line("a", "  a more"));
    assert_eq!(multiline.open_streams(), 2);

    assert_eq!(
        messages(&multiline.flush()),
        vec!["a start\n  a more", "b start"]
    );
    assert_eq!(multiline.open_streams(), 0);
    assert!(multiline.flush().is_empty());
}

#[test]
fn next_mode_groups_through_the_terminating_line() {
    let multiline = build(
        r#"
        pattern = "\\\\$"
        what = "next"
        "#,
    );
    let (processed, flushed) = run(&multiline, &["a \\", "b \\", "c", "d"]);

    assert_eq!(messages(&processed), vec!["a \\\nb \\\nc", "d"]);
    assert!(processed[0].has_tag("multiline"));
    assert!(!processed[1].contains("tags"));
    assert!(flushed.is_empty());
}

#[test]
fn next_mode_with_negate_holds_non_matching_lines() {
    let multiline = build(
        r#"
        pattern = ";$"
        negate = true
        what = "next"
        "#,
    );
    let (processed, flushed) = run(&multiline, &["select *", "from t", "where x;", "commit;", "tail"]);

    assert_eq!(
        messages(&processed),
        vec!["select *\nfrom t\nwhere x;", "commit;"]
    );
    assert_eq!(messages(&flushed), vec!["tail"]);
}

#[test]
fn typed_captures_and_custom_patterns() {
    let multiline = build(
        r#"
        pattern = "^%{STATUS:status:int} %{NUMBER:took:float}"
        negate = true
        what = "previous"

        [patterns]
        STATUS = "[1-5][0-9]{2}"
        "#,
    );
    let (_, flushed) = run(&multiline, &["503 1.5 upstream failed", "retrying"]);

    assert_eq!(flushed[0].get("status"), Some(&json!(503)));
    assert_eq!(flushed[0].get("took"), Some(&json!(1.5)));
}

#[test]
fn custom_source_and_stream_identity() {
    let multiline = build(
        r#"
        pattern = "^\\s"
        what = "previous"
        source = "line"
        stream_identity = ["pod"]
        "#,
    );

    let event = |pod: &str, text: &str| -> LogEvent {
        [("pod", pod), ("line", text), ("host", text)]
            .into_iter()
            .collect()
    };
    multiline.process(event("p1", "start"));
    multiline.process(event("p1", "  more"));
    let flushed = multiline.flush();

    assert_eq!(flushed.len(), 1);
    assert_eq!(flushed[0].get("line"), Some(&json!("start\n  more")));
    assert_eq!(flushed[0].get("host"), Some(&json!("start")));
    assert!(!flushed[0].contains("message"));
}

#[rstest]
#[case::invalid_regex(r#"pattern = "(unclosed""#, "Invalid pattern")]
#[case::unknown_reference(r#"pattern = "%{NOPE}""#, "Unknown pattern %{NOPE}")]
#[case::odd_add_field(
    "pattern = \"x\"\nadd_field = [\"only_key\"]",
    "add_field list must hold key/value pairs"
)]
#[case::bad_template(r#"pattern = "x"
add_tag = "{{ }}""#, "Invalid template")]
#[case::empty_identity("pattern = \"x\"\nstream_identity = []", "stream_identity")]
fn invalid_configs_fail_to_build(#[case] options: &str, #[case] expected: &str) {
    let config: MultilineConfig =
        toml::from_str(&format!("what = \"previous\"\n{options}")).unwrap();
    let error = config.build().unwrap_err().to_string();
    assert!(error.contains(expected), "{error}");
}

#[test]
fn config_builder_matches_defaults() {
    let parsed: MultilineConfig = toml::from_str(SIMPLE).unwrap();
    assert_eq!(parsed, MultilineConfig::new("^\\s", What::Previous));
}

#[test]
fn function_transform_pushes_closed_groups() {
    let mut transform: Box<dyn FunctionTransform> = Box::new(build(SIMPLE));
    let mut output = OutputBuffer::default();

    for message in ["one", "  two", "three"] {
        transform.transform(&mut output, line("h", message));
    }

    assert_eq!(output.len(), 1);
    assert_eq!(
        output.first().and_then(LogEvent::message).as_deref(),
        Some("one\n  two")
    );
}

/// Builds `streams` streams, each a header followed by up to four indented
/// continuation lines, and interleaves them at random while keeping the
/// order within every stream.
fn interleaved(streams: usize) -> (HashMap<String, Vec<String>>, Vec<LogEvent>) {
    let mut rng = rand::rng();
    let mut expected = HashMap::new();
    let mut order = Vec::new();

    for stream in 0..streams {
        let host = format!("stream{stream}");
        let mut lines = vec![format!("hello world {host}")];
        for n in 0..rng.random_range(0..5) {
            lines.push(format!("   extra line {n} in {host}"));
        }
        order.extend(std::iter::repeat_n(stream, lines.len()));
        expected.insert(host, lines);
    }
    order.shuffle(&mut rng);

    let mut cursors = vec![0; streams];
    let events = order
        .into_iter()
        .map(|stream| {
            let host = format!("stream{stream}");
            let message = &expected[&host][cursors[stream]];
            cursors[stream] += 1;
            let mut event = line(&host, message);
            event.insert("type", host.clone());
            event
        })
        .collect();

    (expected, events)
}

fn assert_one_event_per_stream(expected: &HashMap<String, Vec<String>>, emitted: &[LogEvent]) {
    assert_eq!(emitted.len(), expected.len());
    for event in emitted {
        let host = event.get_str("host").unwrap_or_default().into_owned();
        let lines = &expected[&host];
        let message = event.message().unwrap_or_default().into_owned();
        assert!(message.starts_with(&lines[0]), "{message:?}");
        assert_eq!(message, lines.join("\n"));
    }
}

#[test]
fn interleaved_streams_never_mix() {
    let multiline = build(SIMPLE);
    let (expected, events) = interleaved(20);

    let mut emitted: Vec<LogEvent> = events
        .into_iter()
        .filter_map(|event| multiline.process(event))
        .collect();
    assert!(emitted.is_empty());
    emitted.extend(multiline.flush());

    assert_one_event_per_stream(&expected, &emitted);
}

#[test]
fn concurrent_producers_never_mix() {
    const PRODUCERS: usize = 8;

    let multiline = build(SIMPLE);
    let (expected, events) = interleaved(64);

    // Each producer owns a disjoint set of streams so that the order within a
    // stream is kept while producers race each other.
    let mut batches: Vec<Vec<LogEvent>> = (0..PRODUCERS).map(|_| Vec::new()).collect();
    for event in events {
        let host = event.get_str("host").unwrap_or_default().into_owned();
        let stream: usize = host.trim_start_matches("stream").parse().unwrap();
        batches[stream % PRODUCERS].push(event);
    }

    let emitted = Arc::new(std::sync::Mutex::new(Vec::new()));
    let handles: Vec<_> = batches
        .into_iter()
        .map(|batch| {
            let multiline = multiline.clone();
            let emitted = Arc::clone(&emitted);
            thread::spawn(move || {
                for event in batch {
                    if let Some(event) = multiline.process(event) {
                        emitted.lock().unwrap().push(event);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let mut emitted = Arc::try_unwrap(emitted).unwrap().into_inner().unwrap();
    emitted.extend(multiline.flush());

    assert_one_event_per_stream(&expected, &emitted);
    assert_eq!(multiline.open_streams(), 0);
}

#[test]
fn concurrent_groups_on_many_streams_close_in_place() {
    let multiline = build(SIMPLE);

    let handles: Vec<_> = (0..4)
        .map(|producer| {
            let multiline = multiline.clone();
            thread::spawn(move || {
                let host = format!("p{producer}");
                let mut closed = Vec::new();
                for group in 0..50 {
                    closed.extend(multiline.process(line(&host, &format!("group {group}"))));
                    closed.extend(multiline.process(line(&host, "  detail")));
                }
                closed
            })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        let closed = handle.join().unwrap();
        assert_eq!(closed.len(), 49);
        for (group, event) in closed.iter().enumerate() {
            assert_eq!(
                event.message().as_deref(),
                Some(format!("group {group}\n  detail").as_str())
            );
        }
        total += closed.len();
    }
    total += multiline.flush().len();
    assert_eq!(total, 200);
}

proptest! {
    #[test]
    fn lines_that_never_continue_pass_through(
        lines in prop::collection::vec("[a-z0-9][a-z0-9 ]{0,30}", 0..50)
    ) {
        let multiline = build(SIMPLE);
        let input: Vec<LogEvent> = lines.iter().map(|message| line("host", message)).collect();

        let mut output: Vec<LogEvent> = input
            .iter()
            .cloned()
            .filter_map(|event| multiline.process(event))
            .collect();
        output.extend(multiline.flush());

        prop_assert_eq!(output, input);
    }
}
