//! Onboarding, pulls and tear-down, driven through the in-memory collaborators

use chrono::Duration;

use tasks_calendar_sync::engine::sync_progress::{feedback_channel, SyncEvent};
use tasks_calendar_sync::mock_behaviour::MockBehaviour;
use tasks_calendar_sync::storage::FolderKeyValueStore;
use tasks_calendar_sync::traits::CalendarStore;
use tasks_calendar_sync::{CalendarMode, DisableDisposition, EngineState, SyncDirection, SyncEngine, SyncError, SyncSettings, SyncStateStore, Task, TaskId};

use scenarii::{day, home, marker, now, work, TestSetup};

#[tokio::test]
async fn test_onboarding_single_calendar() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::new();
    assert_eq!(setup.engine.state(), EngineState::Disabled);

    setup.engine.onboarding_begin();
    assert_eq!(setup.engine.state(), EngineState::Onboarding);
    setup.engine.onboarding_complete(CalendarMode::Single, vec![home(), work()]).await.unwrap();
    assert_eq!(setup.engine.state(), EngineState::Idle);
    assert!(setup.engine.is_enabled());

    let calendars = setup.calendar.calendars();
    assert_eq!(calendars.len(), 1);
    assert_eq!(calendars[0].name(), "Tasks");
    assert_eq!(setup.engine.setup().calendar_id.as_ref(), Some(calendars[0].id()));

    // Onboarding again does not duplicate calendars
    setup.engine.onboarding_begin();
    setup.engine.onboarding_complete(CalendarMode::Single, vec![home()]).await.unwrap();
    assert_eq!(setup.calendar.calendars().len(), 1);
}

#[tokio::test]
async fn test_onboarding_per_project() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::PerProject, vec![home(), work()]).await;

    let mut names: Vec<String> = setup.calendar.calendars().iter().map(|cal| cal.name().to_string()).collect();
    names.sort();
    assert_eq!(names, vec!["Home".to_string(), "Work".to_string()]);

    let project_calendars = setup.engine.project_calendars();
    assert_eq!(project_calendars.len(), 2);
    assert_ne!(project_calendars.lookup(&home().id), project_calendars.lookup(&work().id));
}

#[tokio::test]
async fn test_onboarding_access_denied() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::new();
    setup.calendar.set_access_granted(false);
    setup.engine.onboarding_begin();

    let result = setup.engine.onboarding_complete(CalendarMode::Single, vec![home()]).await;
    assert_eq!(result, Err(SyncError::AccessDenied));
    assert_eq!(setup.engine.state(), EngineState::Error);
    assert!(setup.engine.is_enabled() == false);
    assert_eq!(setup.engine.errors(), vec![SyncError::AccessDenied]);
    assert!(setup.calendar.calendars().is_empty());
    assert_eq!(setup.engine.pull_sync_at(now()).await, Err(SyncError::NotEnabled));

    // Starting over clears the errors
    setup.engine.onboarding_begin();
    assert!(setup.engine.errors().is_empty());
}

#[tokio::test]
async fn test_onboarding_calendar_creation_failures() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::new();
    setup.calendar.set_sources(Vec::new());
    let result = setup.engine.onboarding_complete(CalendarMode::Single, vec![home()]).await;
    assert!(matches!(result, Err(SyncError::CalendarCreation(_))));
    assert_eq!(setup.engine.state(), EngineState::Error);

    let setup = TestSetup::new();
    setup.calendar.set_mock_behaviour(MockBehaviour {
        find_or_create_calendar_behaviour: (1, 1),
        ..MockBehaviour::default()
    });
    let result = setup.engine.onboarding_complete(CalendarMode::PerProject, vec![home(), work()]).await;
    assert!(matches!(result, Err(SyncError::CalendarCreation(_))));
    assert!(setup.engine.is_enabled() == false);
}

#[tokio::test]
async fn test_pull_creates_events() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", now())
        .with_due(day(4, 15), false)
        .with_reminders(vec![-600]));
    setup.tasks.upsert_task(Task::new("2", "home", "Birthday", now())
        .with_due(day(5, 10), true)
        .with_notes("Bring a cake"));
    setup.tasks.upsert_task(Task::new("3", "home", "Someday", now()));

    let report = setup.engine.pull_sync_at(now()).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.processed, 3);
    assert_eq!(report.written, 2);

    // Timed tasks end at their due date
    let timed = setup.event_of("1", "home");
    assert_eq!(timed.title, "Buy milk");
    assert_eq!(timed.start, day(4, 14));
    assert_eq!(timed.end, day(4, 15));
    assert_eq!(timed.alarms, vec![3000]);
    assert!(timed.is_all_day == false);

    // All-day tasks fill their day
    let all_day = setup.event_of("2", "home");
    assert!(all_day.is_all_day);
    assert_eq!(all_day.start, day(5, 0));
    assert_eq!(all_day.end, day(6, 0));
    assert!(all_day.notes.unwrap().starts_with("Bring a cake"));

    assert_eq!(setup.calendar.all_events().len(), 2);
    assert_eq!(setup.engine.identity_map().len(), 2);
    assert_eq!(setup.engine.sync_state().remote_cursor, Some(now()));
    assert_eq!(setup.engine.state(), EngineState::Idle);
}

#[tokio::test]
async fn test_pull_window_bounds_are_inclusive() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    let window = setup.engine.pull_window(now());
    let second = Duration::seconds(1);
    setup.tasks.upsert_task(Task::new("first", "home", "First", now()).with_due(window.start, false));
    setup.tasks.upsert_task(Task::new("last", "home", "Last", now()).with_due(window.end, false));
    setup.tasks.upsert_task(Task::new("before", "home", "Before", now()).with_due(window.start - second, false));
    setup.tasks.upsert_task(Task::new("after", "home", "After", now()).with_due(window.end + second, false));

    setup.engine.pull_sync_at(now()).await.unwrap();
    assert_eq!(setup.events_of("first", "home").len(), 1);
    assert_eq!(setup.events_of("last", "home").len(), 1);
    assert!(setup.events_of("before", "home").is_empty());
    assert!(setup.events_of("after", "home").is_empty());
}

#[tokio::test]
async fn test_pull_is_idempotent() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", now()).with_due(day(4, 15), false));
    setup.tasks.upsert_task(Task::new("2", "home", "Birthday", now()).with_due(day(5, 0), true));

    setup.engine.pull_sync_at(now()).await.unwrap();
    let before = setup.sorted_events();

    setup.set_now(now() + Duration::hours(1));
    let report = setup.engine.pull_sync_at(now() + Duration::hours(1)).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.written, 0);
    // Not even re-written with the same content
    assert_eq!(setup.sorted_events(), before);
}

#[tokio::test]
async fn test_pull_updates_events() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", now()).with_due(day(4, 15), false));
    setup.engine.pull_sync_at(now()).await.unwrap();
    let event_id = setup.event_of("1", "home").id;

    let later = now() + Duration::hours(1);
    setup.tasks.upsert_task(Task::new("1", "home", "Buy oat milk", later).with_due(day(6, 9), false));
    let report = setup.engine.pull_sync_at(later).await.unwrap();
    assert_eq!(report.written, 1);

    let event = setup.event_of("1", "home");
    assert_eq!(event.id, event_id);
    assert_eq!(event.title, "Buy oat milk");
    assert_eq!(event.end, day(6, 9));
    assert_eq!(setup.engine.sync_state().remote_cursor, Some(later));
}

#[tokio::test]
async fn test_pull_removes_done_and_undated_tasks() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    setup.tasks.upsert_task(Task::new("done", "home", "Done", now()).with_due(day(4, 15), false));
    setup.tasks.upsert_task(Task::new("undated", "home", "Undated", now()).with_due(day(4, 16), false));
    setup.tasks.upsert_task(Task::new("kept", "home", "Kept", now()).with_due(day(4, 17), false));
    setup.engine.pull_sync_at(now()).await.unwrap();
    assert_eq!(setup.calendar.all_events().len(), 3);

    let later = now() + Duration::hours(1);
    setup.tasks.upsert_task(Task::new("done", "home", "Done", later).with_due(day(4, 15), false).with_done(true));
    setup.tasks.upsert_task(Task::new("undated", "home", "Undated", later));
    let report = setup.engine.pull_sync_at(later).await.unwrap();
    assert!(report.is_success());

    assert!(setup.events_of("done", "home").is_empty());
    assert!(setup.events_of("undated", "home").is_empty());
    assert_eq!(setup.events_of("kept", "home").len(), 1);

    let identity_map = setup.engine.identity_map();
    assert_eq!(identity_map.len(), 1);
    assert!(identity_map.event_for(&TaskId::from("done")).is_none());
}

#[tokio::test]
async fn test_pull_forgets_events_deleted_by_the_user() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", now()).with_due(day(4, 15), false));
    setup.engine.pull_sync_at(now()).await.unwrap();
    let event_id = setup.event_of("1", "home").id.unwrap();

    // The user deletes the event in their calendar app, then completes the task
    setup.calendar.delete_event(&event_id).await.unwrap();
    setup.calendar.commit().await.unwrap();
    let later = now() + Duration::hours(1);
    setup.set_now(later);
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", later).with_due(day(4, 15), false).with_done(true));

    let report = setup.engine.pull_sync_at(later).await.unwrap();
    assert!(report.is_success());
    assert!(setup.engine.errors().is_empty());
    assert!(setup.events_of("1", "home").is_empty());

    let identity_map = setup.engine.identity_map();
    assert!(identity_map.event_for(&TaskId::from("1")).is_none());
    assert!(identity_map.task_for(&event_id).is_none());
}

#[tokio::test]
async fn test_pull_replaces_events_outside_the_listing_window() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "Renew passport", now()).with_due(day(-10, 9), false));
    setup.engine.pull_sync_at(now()).await.unwrap();
    let old_event_id = setup.event_of("1", "home").id.unwrap();

    // Weeks later, the old event is not listed anymore when the overdue task is rescheduled
    let later = now() + Duration::weeks(10);
    assert!(setup.engine.pull_window(later).contains(day(-10, 9)) == false);
    setup.set_now(later);
    setup.tasks.upsert_task(Task::new("1", "home", "Renew passport", later).with_due(later + Duration::days(3), false));

    let report = setup.engine.pull_sync_at(later).await.unwrap();
    assert!(report.is_success());

    let event = setup.event_of("1", "home");
    assert_eq!(event.end, later + Duration::days(3));
    assert!(setup.calendar.event(&old_event_id).is_none());
    assert_eq!(setup.engine.identity_map().event_for(&TaskId::from("1")), event.id.as_ref());
}

#[tokio::test]
async fn test_pull_isolates_project_failures() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home(), work()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", now()).with_due(day(4, 15), false));
    setup.tasks.upsert_task(Task::new("2", "work", "Send report", now()).with_due(day(4, 16), false));
    setup.tasks.set_project_failing(work().id, true);

    let report = setup.engine.pull_sync_at(now()).await.unwrap();
    assert!(report.is_success() == false);
    assert!(matches!(report.errors.as_slice(), [SyncError::TransportError(_)]));
    assert_eq!(setup.engine.errors(), report.errors);

    // The other project has been synced, but the cursor has not moved
    assert_eq!(setup.events_of("1", "home").len(), 1);
    assert!(setup.events_of("2", "work").is_empty());
    assert_eq!(setup.engine.sync_state().remote_cursor, None);

    setup.tasks.set_project_failing(work().id, false);
    let report = setup.engine.pull_sync_at(now()).await.unwrap();
    assert!(report.is_success());
    assert_eq!(setup.events_of("2", "work").len(), 1);
    assert_eq!(setup.events_of("1", "home").len(), 1);
    assert_eq!(setup.engine.sync_state().remote_cursor, Some(now()));
}

#[tokio::test]
async fn test_pull_survives_event_id_churn() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", now()).with_due(day(4, 15), false));
    setup.engine.pull_sync_at(now()).await.unwrap();

    // The calendar store hands out a new id for the same event
    let old_id = setup.event_of("1", "home").id.unwrap();
    let new_id = setup.calendar.reassign_event_id(&old_id).unwrap();

    let later = now() + Duration::hours(1);
    setup.tasks.upsert_task(Task::new("1", "home", "Buy oat milk", later).with_due(day(4, 15), false));
    let report = setup.engine.pull_sync_at(later).await.unwrap();
    assert!(report.is_success());

    // The event has been found by its identity marker, and updated in place
    let event = setup.event_of("1", "home");
    assert_eq!(event.id.as_ref(), Some(&new_id));
    assert_eq!(event.title, "Buy oat milk");
    let identity_map = setup.engine.identity_map();
    assert_eq!(identity_map.event_for(&TaskId::from("1")), Some(&new_id));
    assert!(identity_map.task_for(&old_id).is_none());
}

#[tokio::test]
async fn test_pull_moves_tasks_between_project_calendars() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::PerProject, vec![home(), work()]).await;
    let project_calendars = setup.engine.project_calendars();
    let home_calendar = project_calendars.lookup(&home().id).unwrap().clone();
    let work_calendar = project_calendars.lookup(&work().id).unwrap().clone();

    setup.tasks.upsert_task(Task::new("1", "home", "Prepare slides", now()).with_due(day(4, 15), false));
    setup.engine.pull_sync_at(now()).await.unwrap();
    assert_eq!(setup.event_of("1", "home").calendar_id, home_calendar);

    let later = now() + Duration::hours(1);
    setup.tasks.upsert_task(Task::new("1", "work", "Prepare slides", later).with_due(day(4, 15), false));
    let report = setup.engine.pull_sync_at(later).await.unwrap();
    assert!(report.is_success());

    assert!(setup.events_of("1", "home").is_empty());
    assert_eq!(setup.event_of("1", "work").calendar_id, work_calendar);
    assert_eq!(setup.calendar.all_events().len(), 1);
}

#[tokio::test]
async fn test_pull_keeps_pending_user_edits() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", now()).with_due(day(4, 15), false));
    setup.engine.pull_sync_at(now()).await.unwrap();

    let event_id = setup.event_of("1", "home").id.unwrap();
    setup.calendar.edit_event(&event_id, |ev| ev.title = "Buy cheese".to_string()).unwrap();

    // The task has not changed since the last pull: the user edit wins until it is pushed
    setup.engine.pull_sync_at(now()).await.unwrap();
    assert_eq!(setup.event_of("1", "home").title, "Buy cheese");
}

#[tokio::test]
async fn test_pull_collects_calendar_failures() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "First", now()).with_due(day(4, 15), false));
    setup.tasks.upsert_task(Task::new("2", "home", "Second", now()).with_due(day(4, 16), false));
    setup.calendar.set_mock_behaviour(MockBehaviour {
        create_event_behaviour: (0, 1),
        ..MockBehaviour::default()
    });

    let report = setup.engine.pull_sync_at(now()).await.unwrap();
    assert_eq!(report.errors.len(), 1);
    // Only one of them has failed
    assert_eq!(setup.calendar.all_events().len(), 1);
    // Per-item failures do not hold the cursor back
    assert_eq!(setup.engine.sync_state().remote_cursor, Some(now()));
}

#[tokio::test]
async fn test_pull_with_feedback() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    let (sender, receiver) = feedback_channel();
    let report = setup.engine.pull_sync_with_feedback(sender).await.unwrap();
    assert!(report.is_success());
    assert_eq!(*receiver.borrow(), SyncEvent::Finished{ direction: SyncDirection::Pull, success: true });
}

#[tokio::test]
async fn test_disable_sync_deletes_managed_calendars() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::PerProject, vec![home(), work()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", now()).with_due(day(4, 15), false));
    setup.tasks.upsert_task(Task::new("2", "work", "Send report", now()).with_due(day(4, 16), false));
    setup.engine.pull_sync_at(now()).await.unwrap();
    assert_eq!(setup.calendar.all_events().len(), 2);

    setup.engine.disable_sync(DisableDisposition::DeleteManagedEvents).await.unwrap();
    assert_eq!(setup.engine.state(), EngineState::Disabled);
    assert!(setup.calendar.calendars().is_empty());
    assert!(setup.calendar.all_events().is_empty());
    assert!(setup.engine.identity_map().is_empty());
    assert_eq!(setup.engine.sync_state().remote_cursor, None);
    assert_eq!(setup.engine.pull_sync_at(now()).await, Err(SyncError::NotEnabled));
}

#[tokio::test]
async fn test_disable_sync_keeps_events() {
    let _ = env_logger::builder().is_test(true).try_init();

    let setup = TestSetup::enabled(CalendarMode::Single, vec![home()]).await;
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", now()).with_due(day(4, 15), false));
    setup.engine.pull_sync_at(now()).await.unwrap();

    setup.engine.disable_sync(DisableDisposition::KeepEverything).await.unwrap();
    assert!(setup.engine.is_enabled() == false);
    assert_eq!(setup.calendar.events_with_url(&marker("1", "home")).len(), 1);
}

#[tokio::test]
async fn test_state_survives_a_restart() {
    let _ = env_logger::builder().is_test(true).try_init();

    let folder = tempfile::tempdir().unwrap();
    let setup = TestSetup::with_store(FolderKeyValueStore::new(folder.path()).unwrap());
    setup.engine.onboarding_complete(CalendarMode::Single, vec![home()]).await.unwrap();
    setup.tasks.upsert_task(Task::new("1", "home", "Buy milk", now()).with_due(day(4, 15), false));
    setup.engine.pull_sync_at(now()).await.unwrap();
    let sync_state = setup.engine.sync_state();

    let restarted = SyncEngine::new(
        setup.tasks.clone(),
        setup.calendar.clone(),
        SyncStateStore::new(FolderKeyValueStore::new(folder.path()).unwrap()),
        SyncSettings::default(),
    );
    assert_eq!(restarted.state(), EngineState::Idle);
    assert_eq!(restarted.sync_state(), sync_state);
    assert_eq!(restarted.identity_map(), setup.engine.identity_map());
    assert_eq!(restarted.setup(), setup.engine.setup());

    let report = restarted.pull_sync_at(now()).await.unwrap();
    assert!(report.is_success());
    assert_eq!(report.written, 0);
    assert_eq!(setup.calendar.all_events().len(), 1);
}
