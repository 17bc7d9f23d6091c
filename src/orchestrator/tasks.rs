//! Deferred work queued while handling a store event.
//!
//! Tasks run only after the current event has been handled and acknowledged,
//! so ledger writes made while handling the event are visible to them.

use std::collections::VecDeque;

use super::Delivery;
use crate::models::RewardDescriptor;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum DeferredTask {
    GrantRewards {
        delivery: Delivery,
        rewards: Vec<RewardDescriptor>,
        /// A ledger write failed while collecting `rewards`.
        ledger_failed: bool,
    },
}

/// FIFO of deferred tasks.
#[derive(Debug, Default)]
pub(crate) struct TaskQueue {
    tasks: VecDeque<DeferredTask>,
}

impl TaskQueue {
    pub fn push(&mut self, task: DeferredTask) {
        self.tasks.push_back(task);
    }

    pub fn pop(&mut self) -> Option<DeferredTask> {
        self.tasks.pop_front()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }
}
