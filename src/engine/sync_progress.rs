//! Utilities to track the progression of a sync pass

use std::collections::VecDeque;
use std::fmt::{Display, Error, Formatter};

use crate::error::SyncError;

/// The two kinds of sync passes
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncDirection {
    /// From the Task Service to the calendar store
    Pull,
    /// From the calendar store to the Task Service
    Push,
}

impl Display for SyncDirection {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            SyncDirection::Pull => write!(f, "pull"),
            SyncDirection::Push => write!(f, "push"),
        }
    }
}

/// An event that happens during a sync
#[derive(Clone, Debug, PartialEq)]
pub enum SyncEvent {
    /// Sync has not started
    NotStarted,
    /// Sync has just started but no item is handled yet
    Started{ direction: SyncDirection },
    /// Sync is in progress.
    InProgress{ direction: SyncDirection, items_done_already: usize, details: String},
    /// Sync is finished
    Finished{ direction: SyncDirection, success: bool },
}

impl Display for SyncEvent {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), Error> {
        match self {
            SyncEvent::NotStarted => write!(f, "Not started"),
            SyncEvent::Started{direction} => write!(f, "{} has started...", direction),
            SyncEvent::InProgress{direction, items_done_already, details} => write!(f, "[{} {}] {}...", direction, items_done_already, details),
            SyncEvent::Finished{direction, success} => match success {
                true => write!(f, "{} successfully finished", direction),
                false => write!(f, "{} finished with errors", direction),
            }
        }
    }
}

impl Default for SyncEvent {
    fn default() -> Self {
        Self::NotStarted
    }
}



/// See [`feedback_channel`]
pub type FeedbackSender = tokio::sync::watch::Sender<SyncEvent>;
/// See [`feedback_channel`]
pub type FeedbackReceiver = tokio::sync::watch::Receiver<SyncEvent>;

/// Create a feeback channel, that can be used to retrieve the current progress of a sync operation
pub fn feedback_channel() -> (FeedbackSender, FeedbackReceiver) {
    tokio::sync::watch::channel(SyncEvent::default())
}




/// A structure that tracks the progression and the errors that happen during a sync pass
///
/// Only the most recent `max_errors` errors are kept.
pub struct SyncProgress {
    n_errors: u32,
    errors: VecDeque<SyncError>,
    max_errors: usize,
    counter: usize,
    feedback_channel: Option<FeedbackSender>
}
impl SyncProgress {
    pub fn new(max_errors: usize) -> Self {
        Self { n_errors: 0, errors: VecDeque::new(), max_errors, counter: 0, feedback_channel: None }
    }
    pub fn new_with_feedback_channel(max_errors: usize, channel: FeedbackSender) -> Self {
        Self { n_errors: 0, errors: VecDeque::new(), max_errors, counter: 0, feedback_channel: Some(channel) }
    }

    /// Reset the user-info counter
    pub fn reset_counter(&mut self) {
        self.counter = 0;
    }
    /// Increments the user-info counter.
    pub fn increment_counter(&mut self, increment: usize) {
        self.counter += increment;
    }
    /// Retrieves the current user-info counter.
    /// This counts items that have been handled during this pass, and is only useful to provide feedback to the user.
    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn is_success(&self) -> bool {
        self.n_errors == 0
    }

    /// How many errors happened, including the ones that have been dropped from [`Self::errors`]
    pub fn n_errors(&self) -> u32 {
        self.n_errors
    }

    /// The most recent errors
    pub fn errors(&self) -> impl Iterator<Item = &SyncError> {
        self.errors.iter()
    }

    pub fn into_errors(self) -> Vec<SyncError> {
        self.errors.into_iter().collect()
    }

    /// Log an error, and keep it for later inspection
    pub fn error(&mut self, err: SyncError, context: &str) {
        log::error!("{}: {}", context, err);
        self.n_errors += 1;
        if self.max_errors == 0 {
            return;
        }
        while self.errors.len() >= self.max_errors {
            self.errors.pop_front();
        }
        self.errors.push_back(err);
    }
    /// Log a warning
    pub fn warn(&mut self, text: &str) {
        log::warn!("{}", text);
    }
    /// Log an info
    pub fn info(&mut self, text: &str) {
        log::info!("{}", text);
    }
    /// Log a debug message
    pub fn debug(&mut self, text: &str) {
        log::debug!("{}", text);
    }
    /// Log a trace message
    pub fn trace(&mut self, text: &str) {
        log::trace!("{}", text);
    }
    /// Send an event as a feedback to the listener (if any).
    pub fn feedback(&mut self, event: SyncEvent) {
        self.feedback_channel
            .as_ref()
            .map(|sender| {
                sender.send(event)
            });
    }
}
