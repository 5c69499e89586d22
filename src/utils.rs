//! Some utility functions

use crate::event::Event;
use crate::mapper::TaskEventMapper;
use crate::task::Task;

/// A debug utility that pretty-prints calendar events, sorted by start date
pub fn print_event_list(events: &[Event]) {
    let mut sorted: Vec<&Event> = events.iter().collect();
    sorted.sort_by(|left, right| compare_events_chrono(left, right));

    for event in sorted {
        print_event(event);
    }
}

pub fn print_event(event: &Event) {
    let managed = match event.url {
        None => " ",
        Some(_) => if TaskEventMapper::is_modified(event) { "~" } else { "=" },
    };
    let when = if event.is_all_day {
        event.start.format("%Y-%m-%d").to_string()
    } else {
        format!("{} → {}", event.start.format("%Y-%m-%d %H:%M"), event.end.format("%H:%M"))
    };
    let id = event.id.as_ref().map(|id| id.to_string()).unwrap_or_default();
    println!("    {} {}\t{}\t{}", managed, when, event.title, id);
}

/// A debug utility that pretty-prints tasks
pub fn print_task_list(tasks: &[Task]) {
    for task in tasks {
        print_task(task);
    }
}

pub fn print_task(task: &Task) {
    let completion = if task.is_done() { "✓" } else { " " };
    let due = task.due()
        .map(|due| due.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "(no due date)".to_string());
    println!("    {} {}\t{}\t{}", completion, due, task.title(), task.id());
}

/// Compare events by start date, then alphabetically
pub fn compare_events_chrono(left: &Event, right: &Event) -> std::cmp::Ordering {
    left.start.cmp(&right.start)
        .then_with(|| left.title.to_lowercase().cmp(&right.title.to_lowercase()))
}
