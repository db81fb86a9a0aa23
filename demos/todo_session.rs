//! Replays a short to-do session against a store and prints what a UI would render.
//!
//! ```text
//! RUST_LOG=todoweave=debug cargo run --example todo_session
//! ```

use futures::StreamExt;
use serde_json::json;
use todoweave::{Filter, FilterCell, Store, StoreConfig, StoreResult};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> StoreResult<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let store = Store::start(StoreConfig::default().with_name("todo-session"));

  // A stats panel subscribed before anything happens.
  let mut panel = store.stats_stream();
  let panel_task = tokio::spawn(async move {
    while let Some(stats) = panel.next().await {
      info!(
        total = stats.total,
        completed = stats.completed,
        percent = stats.percent_complete,
        "stats panel"
      );
    }
  });

  let milk = store.create("buy milk")?;
  store.toggle(milk)?;
  let dog = store.create("walk dog")?;
  store.delete(milk)?;
  store.sync().await?;

  println!("keys after scenario: {:?}", store.all_keys());
  println!("stats after scenario: {:?}", store.stats());
  match store.entity_by_key(milk).await {
    Ok(state) => println!("unexpected: {:?}", state),
    Err(error) => println!("lookup of deleted key {}: {}", milk, error),
  }

  let bread = store.create("bake bread")?;
  store.toggle(bread)?;
  store.update(dog, "walk the dog")?;
  // Producers without typed events go through the raw path.
  store.publish_raw(json!({ "kind": "archive", "key": dog.get() }))?;
  store.sync().await?;

  let filter = FilterCell::default();
  for selected in [Filter::All, Filter::Done, Filter::Pending] {
    filter.set(selected);
    let rows: Vec<_> = store
      .visible_keys(filter.get())
      .into_iter()
      .filter_map(|key| store.try_entity(key).ok())
      .map(|state| format!("[{}] {}", if state.done { "x" } else { " " }, state.text))
      .collect();
    println!("{:<8} {:?}", filter.get().to_string(), rows);
  }
  println!("dropped events: {}", store.view().dropped());

  store.shutdown().await;
  if let Err(error) = panel_task.await {
    eprintln!("stats panel task failed: {}", error);
  }
  Ok(())
}
