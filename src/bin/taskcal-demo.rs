//! This is an example of how tasks-calendar-sync can be used
//!
//! Everything lives in memory, apart from the sync state, which is persisted into a folder.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};

use tasks_calendar_sync::storage::FolderKeyValueStore;
use tasks_calendar_sync::utils::{print_event_list, print_task_list};
use tasks_calendar_sync::{CalendarMode, MemoryCalendarStore, MemoryTaskService, Project, SyncEngine, SyncSettings, SyncStateStore, Task, TaskId};

const STATE_FOLDER: &str = "test_cache/taskcal_demo";

#[tokio::main]
async fn main() {
    env_logger::init();

    println!("This example syncs an in-memory Task Service with an in-memory calendar store.");
    println!("You can set the RUST_LOG environment variable to display more info about the sync.");
    println!("");

    let now = Utc::now();
    let tasks = Arc::new(MemoryTaskService::new());
    tasks.upsert_task(Task::new("1", "home", "Water the plants", now)
        .with_due(now + Duration::days(1), true));
    tasks.upsert_task(Task::new("2", "home", "Call the plumber", now)
        .with_due(now + Duration::hours(5), false)
        .with_reminders(vec![-900])
        .with_notes("The sink is leaking"));
    tasks.upsert_task(Task::new("3", "work", "Send the report", now)
        .with_due(now + Duration::days(3), false));
    tasks.upsert_task(Task::new("4", "work", "Someday, maybe", now));

    let calendar = Arc::new(MemoryCalendarStore::new());
    let store = SyncStateStore::new(FolderKeyValueStore::new(Path::new(STATE_FOLDER)).unwrap());
    let engine = SyncEngine::new(tasks.clone(), calendar.clone(), store, SyncSettings::default());

    let projects = vec![Project::new("home", "Home"), Project::new("work", "Work")];
    engine.onboarding_begin();
    engine.onboarding_complete(CalendarMode::PerProject, projects).await.unwrap();

    println!("---- Tasks -----");
    print_task_list(&[
        tasks.task(&TaskId::from("1")).unwrap(),
        tasks.task(&TaskId::from("2")).unwrap(),
        tasks.task(&TaskId::from("3")).unwrap(),
        tasks.task(&TaskId::from("4")).unwrap(),
    ]);

    let report = engine.pull_sync().await.unwrap();
    println!("---- Events, after a pull ({} written) -----", report.written);
    print_event_list(&calendar.all_events());

    // The user renames an event in their calendar app
    let event = calendar.events_with_url("taskcal://task/2?project=home").pop().unwrap();
    calendar.edit_event(event.id.as_ref().unwrap(), |ev| ev.title = "Call the plumber (again)".to_string()).unwrap();
    println!("---- Events, after a user edit -----");
    print_event_list(&calendar.all_events());

    let report = engine.push_sync().await.unwrap();
    println!("---- Task 2, after a push ({} patched) -----", report.written);
    print_task_list(&[tasks.task(&TaskId::from("2")).unwrap()]);

    println!("---- Events, after the push -----");
    print_event_list(&calendar.all_events());

    if engine.errors().is_empty() == false {
        println!("Errors: {:?}", engine.errors());
    }
}
