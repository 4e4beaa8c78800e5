use chrono::{Duration, TimeZone, Utc};
use wf_api_types::{ExecutionLog, LogLevel};
use wf_core::log_buffer::{StepLogBuffer, GENERAL_STEP};

fn entry(id: &str, step: Option<&str>, secs: i64) -> ExecutionLog {
    ExecutionLog {
        id: id.to_string(),
        task_id: "t-1".into(),
        level: LogLevel::Info,
        category: "workflow".into(),
        step: step.map(str::to_string),
        agent_name: None,
        message: format!("message {id}"),
        details: serde_json::Value::Null,
        duration_ms: None,
        created_at: Utc.timestamp_opt(1_700_000_000, 0).unwrap() + Duration::seconds(secs),
    }
}

#[test]
fn step_never_grows_past_cap() {
    let mut buf = StepLogBuffer::new(100);
    for i in 0..1_000 {
        buf.append(entry(&format!("e{i}"), Some("content_generation"), i));
        assert!(buf.step(Some("content_generation")).len() <= 100);
    }
    let kept = buf.step(Some("content_generation"));
    assert_eq!(kept.len(), 100);
    // oldest evicted first
    assert_eq!(kept[0].id, "e900");
    assert_eq!(kept[99].id, "e999");
}

#[test]
fn most_recent_append_survives_even_when_oldest() {
    let mut buf = StepLogBuffer::new(3);
    buf.append(entry("a", Some("quiz_generation"), 10));
    buf.append(entry("b", Some("quiz_generation"), 20));
    buf.append(entry("c", Some("quiz_generation"), 30));
    // late arrival with the oldest timestamp of all
    buf.append(entry("late", Some("quiz_generation"), 1));

    let ids: Vec<&str> = buf
        .step(Some("quiz_generation"))
        .iter()
        .map(|e| e.id.as_str())
        .collect();
    assert_eq!(ids, vec!["b", "c", "late"]);
}

#[test]
fn caps_are_per_step() {
    let mut buf = StepLogBuffer::new(2);
    for i in 0..5 {
        buf.append(entry(&format!("x{i}"), Some("intent_analysis"), i));
        buf.append(entry(&format!("y{i}"), None, i));
    }
    assert_eq!(buf.step(Some("intent_analysis")).len(), 2);
    assert_eq!(buf.step(None).len(), 2);
    assert_eq!(buf.len(), 4);
    assert!(buf.steps().any(|(name, _)| name == GENERAL_STEP));
}

#[test]
fn server_merge_dedupes_and_keeps_newer_local_entries() {
    let mut buf = StepLogBuffer::new(100);
    buf.append(entry("local-old", Some("content_generation"), 5));
    buf.append(entry("local-new", Some("content_generation"), 50));
    buf.append(entry("srv-1", Some("content_generation"), 1));

    buf.merge_server(vec![
        entry("srv-1", Some("content_generation"), 1),
        entry("srv-2", Some("content_generation"), 20),
        entry("srv-2", Some("content_generation"), 20),
    ]);

    let ids: Vec<&str> = buf.chronological().iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec!["srv-1", "srv-2", "local-new"]);
}

#[test]
fn replace_drops_previous_entries() {
    let mut buf = StepLogBuffer::new(10);
    buf.append(entry("a", None, 1));
    buf.replace(vec![entry("b", Some("curriculum_design"), 2)]);
    assert_eq!(buf.len(), 1);
    assert!(buf.step(None).is_empty());
}
