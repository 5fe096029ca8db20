//! Ring buffer behaviour of the scratchpad: overflow, ordering, filters, age.

use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::Duration;
use serde_json::json;

use agentmem_core::scratchpad::{ReadQuery, Scratchpad, ScratchpadEntry};
use agentmem_core::ScratchpadConfig;

fn texts(entries: &[ScratchpadEntry]) -> Vec<String> {
    entries
        .iter()
        .map(|e| e.content().as_str().unwrap_or_default().to_string())
        .collect()
}

#[test]
fn test_end_to_end_overflow_example() {
    let sp = Scratchpad::new(3, Duration::hours(1));
    sp.write(json!("a"), "cmd", "agentX", None);
    sp.write(json!("b"), "cmd", "agentX", None);
    sp.write(json!("c"), "cmd", "agentY", None);
    sp.write(json!("d"), "cmd", "agentX", None);

    assert_eq!(texts(&sp.read_all(None, None)), vec!["d", "c", "b"]);
    assert_eq!(sp.get_summary().total_overflows, 1);
}

#[test]
fn test_keeps_exactly_the_most_recent_capacity_entries() {
    for (capacity, writes) in [(1usize, 5usize), (4, 10), (7, 8), (16, 100)] {
        let sp = Scratchpad::new(capacity, Duration::hours(1));
        for i in 0..writes {
            sp.write(json!(i), "tick", "agent", None);
        }
        let all = sp.read_all(None, None);
        let got: Vec<u64> = all.iter().map(|e| e.content().as_u64().unwrap()).collect();
        let expected: Vec<u64> = (writes - capacity..writes).rev().map(|i| i as u64).collect();
        assert_eq!(got, expected, "capacity={capacity} writes={writes}");

        let summary = sp.get_summary();
        assert_eq!(summary.total_overflows, (writes - capacity) as u64);
        assert_eq!(summary.total_writes, writes as u64);
    }
}

#[test]
fn test_read_recent_is_a_prefix_of_read_all() {
    let sp = Scratchpad::new(8, Duration::hours(1));
    for i in 0..12 {
        let agent = if i % 3 == 0 { "planner" } else { "coder" };
        sp.write(json!(i), "step", agent, None);
    }
    let all = sp.read_all(None, None);
    for k in 0..=10 {
        let recent = sp.read_recent(&ReadQuery::recent(k));
        assert!(recent.len() <= k);
        assert_eq!(recent.as_slice(), &all[..recent.len()]);
    }
}

#[test]
fn test_filters_never_leak_non_matching_entries() {
    let sp = Scratchpad::new(50, Duration::hours(1));
    let agents = ["planner", "coder", "critic"];
    let kinds = ["thought", "command", "observation"];
    for i in 0..40 {
        sp.write(json!(i), kinds[i % 3], agents[i % 2 + (i / 20)], None);
    }

    for agent in agents {
        for kind in kinds {
            let got = sp.read_recent(
                &ReadQuery::recent(50)
                    .with_agent(agent)
                    .with_entry_type(kind),
            );
            assert!(got.iter().all(|e| e.agent() == agent && e.entry_type() == kind));

            let expected = sp
                .read_all(None, None)
                .into_iter()
                .filter(|e| e.agent() == agent && e.entry_type() == kind)
                .count();
            assert_eq!(got.len(), expected);
        }
        let by_agent = sp.read_all(Some(agent), None);
        assert!(by_agent.iter().all(|e| e.agent() == agent));
    }
}

#[test]
fn test_age_ceiling_hides_but_does_not_remove() {
    let sp = Scratchpad::new(10, Duration::milliseconds(100));
    sp.write(json!("old"), "note", "a", None);
    thread::sleep(StdDuration::from_millis(250));
    sp.write(json!("new"), "note", "a", None);

    assert_eq!(texts(&sp.read_recent(&ReadQuery::recent(10))), vec!["new"]);
    assert_eq!(
        texts(&sp.read_recent(&ReadQuery::recent(10).unbounded_age())),
        vec!["new", "old"]
    );
    assert_eq!(
        texts(&sp.read_recent(&ReadQuery::recent(10).within(Duration::hours(1)))),
        vec!["new", "old"]
    );
    assert_eq!(sp.len(), 2);

    assert_eq!(sp.cleanup_old_entries(), 1);
    assert_eq!(texts(&sp.read_all(None, None)), vec!["new"]);
}

#[test]
fn test_summary_reports_counts_and_span() {
    let sp = Scratchpad::from_config(&ScratchpadConfig {
        capacity: 4,
        max_age_seconds: 60,
    });
    sp.write(json!("a"), "thought", "planner", None);
    thread::sleep(StdDuration::from_millis(20));
    sp.write(json!("b"), "command", "planner", None);
    sp.write(json!("c"), "thought", "coder", None);
    sp.read_recent(&ReadQuery::recent(1));
    sp.read_all(None, None);

    let s = sp.get_summary();
    assert_eq!(s.total_entries, 3);
    assert_eq!(s.capacity_utilization, 0.75);
    assert_eq!(s.agent_counts["planner"], 2);
    assert_eq!(s.entry_type_counts["thought"], 2);
    assert_eq!(s.total_reads, 2);
    assert!(s.oldest_ts.unwrap() < s.newest_ts.unwrap());
    assert!(s.age_range_seconds.unwrap() > 0.0);

    let json = serde_json::to_value(&s).unwrap();
    assert_eq!(json["total_writes"], json!(3));
}

#[test]
fn test_concurrent_writers_and_readers() {
    let sp = Arc::new(Scratchpad::new(64, Duration::hours(1)));
    let writers = 8;
    let per_writer = 500;

    thread::scope(|s| {
        for w in 0..writers {
            let sp = Arc::clone(&sp);
            s.spawn(move || {
                let agent = format!("agent-{w}");
                for i in 0..per_writer {
                    sp.write(json!(i), "tick", &agent, None);
                }
            });
        }
        for _ in 0..4 {
            let sp = Arc::clone(&sp);
            s.spawn(move || {
                for _ in 0..200 {
                    let recent = sp.read_recent(&ReadQuery::recent(16));
                    assert!(recent.len() <= 16);
                    assert!(recent.windows(2).all(|w| w[0].sequence() > w[1].sequence()));
                    sp.cleanup_old_entries();
                }
            });
        }
    });

    let summary = sp.get_summary();
    let total = (writers * per_writer) as u64;
    assert_eq!(summary.total_writes, total);
    assert_eq!(summary.total_entries, 64);
    assert_eq!(summary.total_overflows, total - 64);
    assert_eq!(summary.total_reads, 800);

    let all = sp.read_all(None, None);
    assert!(all.windows(2).all(|w| w[0].sequence() == w[1].sequence() + 1));
    assert_eq!(all[0].sequence(), total);
}
