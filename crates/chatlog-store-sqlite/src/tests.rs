//! Integration tests for `SqliteStore` against an in-memory database.

use chatlog_core::{
  message::{MessageQuery, NewMessage},
  page::{MAX_PAGE_LIMIT, Page},
  profile::Profile,
  run::{NewRun, RunId, RunStatus, RunUpdate},
  store::{ChatStore, StoreError},
  target::{ChatKind, NewTarget, TargetFilter, TargetUpdate},
};
use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn at(minute: u32) -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
}

async fn new_run(s: &SqliteStore) -> RunId {
  let id = RunId::generate(Profile::Medium, Utc::now());
  s.create_run(NewRun {
    id:         id.clone(),
    profile:    Profile::Medium,
    headless:   true,
    started_at: Utc::now(),
  })
  .await
  .unwrap();
  id
}

fn msg(channel: &str, sender: &str, text: &str, minute: u32) -> NewMessage {
  NewMessage::new(channel, sender, text, at(minute))
}

fn all(channel: Option<&str>, include_deleted: bool) -> MessageQuery {
  MessageQuery {
    page: Page::new(MAX_PAGE_LIMIT, 0),
    channel: channel.map(str::to_owned),
    include_deleted,
  }
}

// ─── Runs ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_run() {
  let s = store().await;
  let id = new_run(&s).await;

  let run = s.get_run(id.clone()).await.unwrap().unwrap();
  assert_eq!(run.id, id);
  assert_eq!(run.status, RunStatus::Running);
  assert!(run.headless);
  assert!(run.completed_at.is_none());
}

#[tokio::test]
async fn update_run_keeps_unset_fields() {
  let s = store().await;
  let id = new_run(&s).await;

  s.update_run(id.clone(), RunUpdate {
    log_path: Some("/logs/x.log".into()),
    ..RunUpdate::default()
  })
  .await
  .unwrap();

  let changed = s
    .update_run(id.clone(), RunUpdate {
      status: Some(RunStatus::Success),
      completed_at: Some(Utc::now()),
      message_count: Some(7),
      ..RunUpdate::default()
    })
    .await
    .unwrap();
  assert!(changed);

  let run = s.get_run(id).await.unwrap().unwrap();
  assert_eq!(run.status, RunStatus::Success);
  assert_eq!(run.message_count, 7);
  assert_eq!(run.log_path.as_deref(), Some("/logs/x.log"));
  assert!(run.completed_at.is_some());
}

#[tokio::test]
async fn update_missing_run_reports_false() {
  let s = store().await;
  let changed = s
    .update_run(RunId::parse("run_missing").unwrap(), RunUpdate::failed("x", Utc::now()))
    .await
    .unwrap();
  assert!(!changed);
}

#[tokio::test]
async fn list_runs_newest_first_and_hides_deleted() {
  let s = store().await;
  let first = new_run(&s).await;
  tokio::time::sleep(std::time::Duration::from_millis(5)).await;
  let second = new_run(&s).await;

  let runs = s.list_runs(Page::new(10, 0)).await.unwrap();
  assert_eq!(runs.len(), 2);
  assert_eq!(runs[0].id, second);

  assert!(s.soft_delete_run(first.clone()).await.unwrap());
  assert!(!s.soft_delete_run(first.clone()).await.unwrap());

  let runs = s.list_runs(Page::new(10, 0)).await.unwrap();
  assert_eq!(runs.len(), 1);
  assert!(s.get_run(first).await.unwrap().is_none());
}

// ─── Messages ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn upsert_is_idempotent() {
  let s = store().await;
  let run = new_run(&s).await;

  let batch = vec![
    msg("Ops Channel", "Alice", "deploy started", 1),
    msg("Ops Channel", "Bob", "deploy done", 2),
    msg("Ops Channel", "Alice", "thanks", 3),
  ];

  s.upsert_messages(run.clone(), batch.clone()).await.unwrap();
  let before = s.list_messages(all(None, true)).await.unwrap();
  assert_eq!(before.len(), 3);

  s.upsert_messages(run, batch).await.unwrap();
  let after = s.list_messages(all(None, true)).await.unwrap();
  assert_eq!(after.len(), 3);
}

#[tokio::test]
async fn overlapping_batch_updates_owner_and_payload_only() {
  let s = store().await;
  let first_run = new_run(&s).await;
  let second_run = new_run(&s).await;

  s.upsert_messages(first_run, vec![msg("Ops", "Alice", "hello", 1)])
    .await
    .unwrap();

  let mut again = msg("Ops", "Alice", "hello", 1);
  again.raw = serde_json::json!({ "source": "retry" });
  let overlapping = vec![again, msg("Ops", "Bob", "new one", 2)];
  s.upsert_messages(second_run.clone(), overlapping).await.unwrap();

  let rows = s.list_messages(all(Some("Ops"), false)).await.unwrap();
  assert_eq!(rows.len(), 2);

  let hello = rows.iter().find(|m| m.message_text == "hello").unwrap();
  assert_eq!(hello.scrape_run_id.as_ref(), Some(&second_run));
  assert_eq!(hello.raw_json, Some(serde_json::json!({ "source": "retry" })));
  assert_eq!(hello.timestamp, at(1));
}

#[tokio::test]
async fn same_time_different_text_are_distinct() {
  let s = store().await;
  let run = new_run(&s).await;

  let written = s
    .upsert_messages(run, vec![
      msg("Ops", "Alice", "one", 1),
      msg("Ops", "Alice", "two", 1),
      msg("Other", "Alice", "one", 1),
    ])
    .await
    .unwrap();
  assert_eq!(written, 3);
  assert_eq!(s.list_messages(all(None, false)).await.unwrap().len(), 3);
}

#[tokio::test]
async fn blank_sender_is_stored_as_unknown() {
  let s = store().await;
  let run = new_run(&s).await;
  s.upsert_messages(run, vec![msg("Ops", " ", "who said this", 1)])
    .await
    .unwrap();

  let rows = s.list_messages(all(None, false)).await.unwrap();
  assert_eq!(rows[0].sender, "Unknown");
}

#[tokio::test]
async fn latest_timestamp_ignores_deleted_and_other_channels() {
  let s = store().await;
  assert!(s.latest_timestamp("Ops".into()).await.unwrap().is_none());

  let run = new_run(&s).await;
  s.upsert_messages(run, vec![
    msg("Ops", "Alice", "a", 1),
    msg("Ops", "Alice", "b", 5),
    msg("Other", "Alice", "c", 9),
  ])
  .await
  .unwrap();

  assert_eq!(s.latest_timestamp("Ops".into()).await.unwrap(), Some(at(5)));

  let newest = s
    .list_messages(all(Some("Ops"), false))
    .await
    .unwrap()
    .into_iter()
    .find(|m| m.message_text == "b")
    .unwrap();
  assert!(s.soft_delete_message(newest.id).await.unwrap());

  assert_eq!(s.latest_timestamp("Ops".into()).await.unwrap(), Some(at(1)));
}

#[tokio::test]
async fn list_messages_filters_channel_newest_first() {
  let s = store().await;
  let run = new_run(&s).await;
  s.upsert_messages(run, vec![
    msg("Ops Channel", "Alice", "first", 1),
    msg("Ops Channel", "Bob", "third", 3),
    msg("Ops Channel", "Carol", "second", 2),
    msg("Random", "Dan", "elsewhere", 4),
  ])
  .await
  .unwrap();

  let rows = s.list_messages(all(Some("Ops Channel"), false)).await.unwrap();
  let texts: Vec<_> = rows.iter().map(|m| m.message_text.as_str()).collect();
  assert_eq!(texts, ["third", "second", "first"]);
}

#[tokio::test]
async fn soft_deleted_message_only_visible_with_include_deleted() {
  let s = store().await;
  let run = new_run(&s).await;
  s.upsert_messages(run.clone(), vec![msg("Ops", "Alice", "oops", 1)])
    .await
    .unwrap();
  let id = s.list_messages(all(None, false)).await.unwrap()[0].id;

  assert!(s.soft_delete_message(id).await.unwrap());
  assert!(!s.soft_delete_message(id).await.unwrap());

  assert!(s.list_messages(all(None, false)).await.unwrap().is_empty());
  assert!(s.get_message(id, false).await.unwrap().is_none());

  let hidden = s.list_messages(all(None, true)).await.unwrap();
  assert_eq!(hidden.len(), 1);
  assert!(hidden[0].deleted_at.is_some());

  // Re-collecting the same message must not resurrect it.
  s.upsert_messages(run, vec![msg("Ops", "Alice", "oops", 1)])
    .await
    .unwrap();
  let again = s.get_message(id, true).await.unwrap().unwrap();
  assert!(again.deleted_at.is_some());
  assert!(s.list_messages(all(None, false)).await.unwrap().is_empty());
}

#[tokio::test]
async fn page_limit_is_clamped() {
  let s = store().await;
  let run = new_run(&s).await;
  let base = at(0);
  let batch: Vec<_> = (0..(MAX_PAGE_LIMIT + 5))
    .map(|i| NewMessage::new("Bulk", "Bot", format!("m{i}"), base + Duration::seconds(i)))
    .collect();
  s.upsert_messages(run, batch).await.unwrap();

  let rows = s
    .list_messages(MessageQuery {
      page: Page::new(99_999, 0),
      ..MessageQuery::default()
    })
    .await
    .unwrap();
  assert_eq!(rows.len() as i64, MAX_PAGE_LIMIT);
}

#[tokio::test]
async fn search_matches_substring_case_insensitively() {
  let s = store().await;
  let run = new_run(&s).await;
  s.upsert_messages(run, vec![
    msg("Ops", "Alice", "Deploy finished", 1),
    msg("Ops", "Bob", "lunch?", 2),
    msg("Ops", "Carol", "redeploy at 5", 3),
    msg("Ops", "Dan", "100% done", 4),
  ])
  .await
  .unwrap();

  let hits = s.search_messages("deploy".into(), Page::new(50, 0)).await.unwrap();
  let texts: Vec<_> = hits.iter().map(|m| m.message_text.as_str()).collect();
  assert_eq!(texts, ["redeploy at 5", "Deploy finished"]);

  let literal = s.search_messages("%".into(), Page::new(50, 0)).await.unwrap();
  assert_eq!(literal.len(), 1);
}

#[tokio::test]
async fn channels_carry_latest_preview() {
  let s = store().await;
  let run = new_run(&s).await;
  s.upsert_messages(run, vec![
    msg("Ops", "Alice", "old", 1),
    msg("Ops", "Bob", "new", 6),
    msg("Random", "Carol", "hi", 3),
  ])
  .await
  .unwrap();

  let channels = s.list_channels().await.unwrap();
  assert_eq!(channels.len(), 2);
  assert_eq!(channels[0].channel_name, "Ops");
  assert_eq!(channels[0].message_count, 2);
  assert_eq!(channels[0].last_sender, "Bob");
  assert_eq!(channels[0].last_message, "new");
  assert_eq!(channels[1].channel_name, "Random");
}

// ─── Targets ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn duplicate_target_name_is_a_conflict() {
  let s = store().await;
  s.create_target(NewTarget::new("Ops Channel")).await.unwrap();

  let err = s.create_target(NewTarget::new("Ops Channel")).await.unwrap_err();
  assert!(matches!(err, Error::DuplicateTarget(ref n) if n == "Ops Channel"));
  assert_eq!(err.conflict(), Some("Ops Channel"));

  // Exact match only.
  s.create_target(NewTarget::new("ops channel")).await.unwrap();
}

#[tokio::test]
async fn deleted_target_name_can_be_reused() {
  let s = store().await;
  let t = s.create_target(NewTarget::new("Ops")).await.unwrap();
  assert!(s.delete_target(t.id).await.unwrap());
  assert!(!s.delete_target(t.id).await.unwrap());

  assert!(s.get_target(t.id).await.unwrap().is_none());
  assert!(s.list_targets(TargetFilter::default()).await.unwrap().is_empty());

  let again = s.create_target(NewTarget::new("Ops")).await.unwrap();
  assert_ne!(again.id, t.id);
}

#[tokio::test]
async fn targets_ordered_by_priority_then_name() {
  let s = store().await;
  for (name, priority) in [("Bravo", 1), ("Alpha", 1), ("Zulu", 9), ("Mike", 0)] {
    let mut t = NewTarget::new(name);
    t.priority = priority;
    s.create_target(t).await.unwrap();
  }

  let names: Vec<_> = s
    .list_targets(TargetFilter::default())
    .await
    .unwrap()
    .into_iter()
    .map(|t| t.chat_name)
    .collect();
  assert_eq!(names, ["Zulu", "Alpha", "Bravo", "Mike"]);
}

#[tokio::test]
async fn target_filter_by_activity_and_profile() {
  let s = store().await;

  let mut paused = NewTarget::new("Paused");
  paused.is_active = false;
  s.create_target(paused).await.unwrap();

  let mut large_only = NewTarget::new("Large only");
  large_only.profile = Some(Profile::Large);
  s.create_target(large_only).await.unwrap();

  s.create_target(NewTarget::new("Anywhere")).await.unwrap();

  let medium = s
    .list_targets(TargetFilter { active_only: true, profile: Some(Profile::Medium) })
    .await
    .unwrap();
  assert_eq!(medium.len(), 1);
  assert_eq!(medium[0].chat_name, "Anywhere");

  let large = s
    .list_targets(TargetFilter { active_only: true, profile: Some(Profile::Large) })
    .await
    .unwrap();
  assert_eq!(large.len(), 2);

  let everything = s.list_targets(TargetFilter::default()).await.unwrap();
  assert_eq!(everything.len(), 3);
}

#[tokio::test]
async fn update_target_fields_and_conflicts() {
  let s = store().await;
  let a = s.create_target(NewTarget::new("A")).await.unwrap();
  s.create_target(NewTarget::new("B")).await.unwrap();

  let updated = s
    .update_target(a.id, TargetUpdate {
      priority: Some(5),
      chat_type: Some(ChatKind::Group),
      notes: Some(Some("weekly sync".into())),
      ..TargetUpdate::default()
    })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.priority, 5);
  assert_eq!(updated.chat_type, ChatKind::Group);
  assert_eq!(updated.chat_name, "A");
  assert_eq!(updated.notes.as_deref(), Some("weekly sync"));

  let err = s
    .update_target(a.id, TargetUpdate {
      chat_name: Some("B".into()),
      ..TargetUpdate::default()
    })
    .await
    .unwrap_err();
  assert_eq!(err.conflict(), Some("B"));

  let missing = s.update_target(9_999, TargetUpdate::default()).await.unwrap();
  assert!(missing.is_none());
}

#[tokio::test]
async fn update_target_clears_nullable_fields() {
  let s = store().await;
  let mut input = NewTarget::new("Pinned");
  input.profile = Some(Profile::Large);
  input.notes = Some("only on the big screen".into());
  let t = s.create_target(input).await.unwrap();

  let untouched = s
    .update_target(t.id, TargetUpdate { priority: Some(2), ..TargetUpdate::default() })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(untouched.profile, Some(Profile::Large));
  assert_eq!(untouched.notes.as_deref(), Some("only on the big screen"));

  let cleared = s
    .update_target(t.id, TargetUpdate {
      profile: Some(None),
      notes: Some(None),
      ..TargetUpdate::default()
    })
    .await
    .unwrap()
    .unwrap();
  assert_eq!(cleared.profile, None);
  assert_eq!(cleared.notes, None);
  assert_eq!(cleared.priority, 2);
}

#[tokio::test]
async fn record_target_scrape_accumulates() {
  let s = store().await;
  let t = s.create_target(NewTarget::new("Ops")).await.unwrap();
  assert_eq!(t.message_count, 0);
  assert!(t.last_scraped_at.is_none());

  assert!(s.record_target_scrape(t.id, at(1), 4).await.unwrap());
  assert!(s.record_target_scrape(t.id, at(2), 3).await.unwrap());

  let t = s.get_target(t.id).await.unwrap().unwrap();
  assert_eq!(t.message_count, 7);
  assert_eq!(t.last_scraped_at, Some(at(2)));
}
