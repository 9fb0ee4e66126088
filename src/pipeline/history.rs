//! Bounded in-memory record of recent cycles.

use std::collections::VecDeque;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Datelike;

use crate::models::ScrapeCycleResult;

/// The most recent cycle results, oldest dropped first.
#[derive(Debug)]
pub struct CycleHistory {
    capacity: usize,
    results: RwLock<VecDeque<ScrapeCycleResult>>,
}

impl CycleHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            results: RwLock::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, result: ScrapeCycleResult) {
        let mut results = self.write();
        if results.len() == self.capacity {
            results.pop_front();
        }
        results.push_back(result);
    }

    pub fn latest(&self) -> Option<ScrapeCycleResult> {
        self.read().back().cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Results started on the given date parts (UTC), newest first.
    pub fn filter(
        &self,
        year: Option<i32>,
        month: Option<u32>,
        day: Option<u32>,
    ) -> Vec<ScrapeCycleResult> {
        self.read()
            .iter()
            .rev()
            .filter(|r| year.is_none_or(|y| r.started_at.year() == y))
            .filter(|r| month.is_none_or(|m| r.started_at.month() == m))
            .filter(|r| day.is_none_or(|d| r.started_at.day() == d))
            .cloned()
            .collect()
    }

    fn read(&self) -> RwLockReadGuard<'_, VecDeque<ScrapeCycleResult>> {
        self.results.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, VecDeque<ScrapeCycleResult>> {
        self.results.write().unwrap_or_else(|e| e.into_inner())
    }
}
