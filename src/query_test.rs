//! # Query Helpers Test Suite
//!
//! Covers aggregate stats (including the empty collection and rounding) and
//! the consumer-owned filter and filter cell.

use crate::event::{EntityKey, EntityState};
use crate::query::{AggregateStats, Filter, FilterCell};
use futures::StreamExt;

fn states(done: &[bool]) -> Vec<EntityState> {
  done
    .iter()
    .enumerate()
    .map(|(i, done)| EntityState {
      key: EntityKey::new(i as u64),
      text: format!("item {}", i),
      done: *done,
    })
    .collect()
}

#[test]
fn test_stats_empty_collection() {
  let stats = AggregateStats::from_states(&Vec::<EntityState>::new());
  assert_eq!(stats, AggregateStats::default());
  assert_eq!(stats.percent_complete, 0);
}

#[test]
fn test_stats_counts() {
  let stats = AggregateStats::from_states(&states(&[true, false, true, false, false]));
  assert_eq!(stats.total, 5);
  assert_eq!(stats.completed, 2);
  assert_eq!(stats.pending, 3);
  assert_eq!(stats.percent_complete, 40);
}

#[test]
fn test_percent_rounds_half_up() {
  let cases: [(&[bool], u32); 5] = [
    (&[true, false, false], 33),
    (&[true, true, false], 67),
    (&[true, false], 50),
    (&[true, false, false, false, false, false, false, false], 13),
    (&[true, true, true], 100),
  ];
  for (done, expected) in cases {
    assert_eq!(
      AggregateStats::from_states(&states(done)).percent_complete,
      expected,
      "{:?}",
      done
    );
  }
}

#[test]
fn test_filter_matches() {
  let items = states(&[true, false]);
  assert!(Filter::All.matches(&items[0]) && Filter::All.matches(&items[1]));
  assert!(Filter::Done.matches(&items[0]) && !Filter::Done.matches(&items[1]));
  assert!(!Filter::Pending.matches(&items[0]) && Filter::Pending.matches(&items[1]));
}

#[test]
fn test_filter_string_forms() {
  for filter in [Filter::All, Filter::Done, Filter::Pending] {
    assert_eq!(filter.to_string().parse::<Filter>(), Ok(filter));
  }
  assert_eq!(" Completed ".parse::<Filter>(), Ok(Filter::Done));
  assert_eq!("uncompleted".parse::<Filter>(), Ok(Filter::Pending));
  assert!("archived".parse::<Filter>().is_err());
  assert_eq!(serde_json::to_string(&Filter::Pending).unwrap(), "\"pending\"");
}

#[tokio::test]
async fn test_filter_cell_replays_and_dedups() {
  let cell = FilterCell::default();
  assert_eq!(cell.get(), Filter::All);

  cell.set(Filter::Done);
  let mut stream = cell.stream();
  assert_eq!(stream.next().await, Some(Filter::Done));

  let mut receiver = cell.subscribe();
  cell.set(Filter::Done);
  assert!(!receiver.has_changed().unwrap());

  cell.clone().set(Filter::Pending);
  assert!(receiver.has_changed().unwrap());
  assert_eq!(stream.next().await, Some(Filter::Pending));
  assert_eq!(cell.get(), Filter::Pending);
}
