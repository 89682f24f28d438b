//! User-facing failure notifications.
//!
//! One notification per failure category per refresh cycle, so a cycle in
//! which every chart times out shows a single banner. At most five are kept;
//! the oldest is dropped first.

use std::collections::{HashSet, VecDeque};

use crate::coordinator::Generation;
use crate::error::QueryError;

const MAX_NOTIFICATIONS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationSeverity {
    Normal,
    Critical,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: u32,
    pub generation: Generation,
    pub category: &'static str,
    pub message: String,
    pub severity: NotificationSeverity,
}

#[derive(Debug, Default)]
pub struct Notifications {
    items: VecDeque<Notification>,
    seen: HashSet<(Generation, &'static str)>,
    next_id: u32,
}

impl Notifications {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a chart failure. Returns the new notification's id, or `None`
    /// when this cycle already reported the same category.
    pub fn report(&mut self, generation: Generation, error: &QueryError, chart: &str) -> Option<u32> {
        let category = error.category();
        if !self.seen.insert((generation, category)) {
            return None;
        }
        // Only the current cycle matters for de-duplication.
        self.seen.retain(|(g, _)| *g >= generation);

        let severity = match error {
            QueryError::Transport(_) => NotificationSeverity::Critical,
            _ => NotificationSeverity::Normal,
        };
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        if self.items.len() >= MAX_NOTIFICATIONS {
            self.items.pop_front();
        }
        self.items.push_back(Notification {
            id,
            generation,
            category,
            message: format!("{chart}: {error}"),
            severity,
        });
        tracing::debug!(%generation, category, "Notification raised");
        Some(id)
    }

    pub fn dismiss(&mut self, id: u32) -> bool {
        let before = self.items.len();
        self.items.retain(|n| n.id != id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Oldest first.
    pub fn list(&self) -> Vec<Notification> {
        self.items.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
