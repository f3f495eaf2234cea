//! Crawl frontier
//!
//! Pending tasks live in one queue per host so that a host in cooldown never holds back
//! a host that is ready. Inside a host, tasks are ordered by `(priority, seq)`; tasks
//! waiting out a retry delay sit in a separate heap keyed by their not-before instant.
//!
//! The frontier also owns the [`DedupIndex`]. A fingerprint is always in exactly one of:
//! queued, in flight, resolved.

pub mod dedup;

pub use dedup::DedupIndex;

use crate::politeness::PolitenessController;
use crate::state::CrawlTask;
use crate::url::Fingerprint;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::time::Duration;
use tokio::time::Instant;

/// Result of offering a task to the frontier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Queued,
    /// Pending, in flight or resolved already; nothing changed
    AlreadyKnown,
}

/// Result of asking the frontier for work
#[derive(Debug, Clone, PartialEq)]
pub enum Dequeue {
    /// A task whose host and own retry floor both allow a fetch now
    Ready(CrawlTask),
    /// Nothing is ready; something becomes eligible at this instant
    Wait(Instant),
    /// Pending tasks only wait on robots.txt fetches in flight
    Blocked,
    /// No pending work
    Idle,
}

/// Ready task ordered so the lowest `(priority, seq)` pops first
#[derive(Debug)]
struct Queued(CrawlTask);

impl Ord for Queued {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.0.priority, other.0.seq).cmp(&(self.0.priority, self.0.seq))
    }
}

impl PartialOrd for Queued {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Queued {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Queued {}

/// Task waiting for its not-before floor, earliest first
#[derive(Debug)]
struct Delayed {
    not_before: Instant,
    task: CrawlTask,
}

impl Ord for Delayed {
    fn cmp(&self, other: &Self) -> Ordering {
        (other.not_before, other.task.seq).cmp(&(self.not_before, self.task.seq))
    }
}

impl PartialOrd for Delayed {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Delayed {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Delayed {}

#[derive(Debug, Default)]
struct HostQueue {
    ready: BinaryHeap<Queued>,
    delayed: BinaryHeap<Delayed>,
}

impl HostQueue {
    fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.delayed.is_empty()
    }

    /// Moves delayed tasks whose floor has passed into the ready heap
    fn promote(&mut self, now: Instant) {
        while self.delayed.peek().map_or(false, |d| d.not_before <= now) {
            if let Some(delayed) = self.delayed.pop() {
                self.ready.push(Queued(delayed.task));
            }
        }
    }

    fn drain(&mut self) -> impl Iterator<Item = (CrawlTask, Option<Instant>)> + '_ {
        self.ready
            .drain()
            .map(|q| (q.0, None))
            .chain(self.delayed.drain().map(|d| (d.task, Some(d.not_before))))
    }
}

/// Priority-ordered pending tasks with per-host queues
#[derive(Debug, Default)]
pub struct Frontier {
    hosts: HashMap<String, HostQueue>,
    queued: HashSet<Fingerprint>,
    in_flight: HashMap<Fingerprint, CrawlTask>,
    dedup: DedupIndex,
    next_seq: u64,
}

impl Frontier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task unless its fingerprint is already known
    ///
    /// The task receives the next discovery sequence number.
    pub fn enqueue(&mut self, mut task: CrawlTask) -> EnqueueOutcome {
        let fp = task.fingerprint();
        if self.is_known(&fp) {
            return EnqueueOutcome::AlreadyKnown;
        }

        task.seq = self.next_seq;
        self.next_seq += 1;
        self.queued.insert(fp);
        self.host_queue(&task).ready.push(Queued(task));
        EnqueueOutcome::Queued
    }

    /// Returns true if the fingerprint is queued, in flight or resolved
    pub fn is_known(&self, fp: &Fingerprint) -> bool {
        self.queued.contains(fp) || self.in_flight.contains_key(fp) || self.dedup.contains(fp)
    }

    /// Hands out the best task that may be fetched at `now`
    ///
    /// A host is eligible when its politeness deadline has passed and no robots.txt fetch
    /// is pending for it. The returned task is marked in flight until it is completed,
    /// requeued or released.
    pub fn dequeue_ready(&mut self, now: Instant, politeness: &PolitenessController) -> Dequeue {
        self.hosts.retain(|_, q| !q.is_empty());

        let mut best: Option<(u32, u64, String)> = None;
        let mut earliest: Option<Instant> = None;
        let mut blocked = false;

        for (host, queue) in self.hosts.iter_mut() {
            queue.promote(now);

            if politeness.robots_pending(host) {
                blocked = true;
                continue;
            }

            let host_next = politeness.next_allowed(host);
            let host_ready = host_next.map_or(true, |t| now >= t);

            if let Some(top) = queue.ready.peek() {
                if host_ready {
                    let key = (top.0.priority, top.0.seq);
                    if best.as_ref().map_or(true, |(p, s, _)| key < (*p, *s)) {
                        best = Some((key.0, key.1, host.clone()));
                    }
                } else if let Some(t) = host_next {
                    earliest = Some(earliest.map_or(t, |e| e.min(t)));
                }
            }

            if let Some(delayed) = queue.delayed.peek() {
                let t = host_next.map_or(delayed.not_before, |h| h.max(delayed.not_before));
                earliest = Some(earliest.map_or(t, |e| e.min(t)));
            }
        }

        if let Some((_, _, host)) = best {
            if let Some(Queued(task)) = self.hosts.get_mut(&host).and_then(|q| q.ready.pop()) {
                let fp = task.fingerprint();
                self.queued.remove(&fp);
                self.in_flight.insert(fp, task.clone());
                return Dequeue::Ready(task);
            }
        }

        match earliest {
            Some(t) => Dequeue::Wait(t),
            None if blocked => Dequeue::Blocked,
            None => Dequeue::Idle,
        }
    }

    /// Re-inserts an in-flight task with a not-before floor of `now + delay`
    ///
    /// The dedup index is not consulted; the task keeps its sequence number.
    pub fn requeue(&mut self, task: CrawlTask, delay: Duration, now: Instant) {
        let fp = task.fingerprint();
        self.in_flight.remove(&fp);
        self.queued.insert(fp);
        let queue = self.host_queue(&task);
        if delay.is_zero() {
            queue.ready.push(Queued(task));
        } else {
            queue.delayed.push(Delayed {
                not_before: now + delay,
                task,
            });
        }
    }

    /// Puts a dequeued task back untouched
    pub fn release(&mut self, task: CrawlTask) {
        let fp = task.fingerprint();
        self.in_flight.remove(&fp);
        self.queued.insert(fp);
        self.host_queue(&task).ready.push(Queued(task));
    }

    /// Resolves an in-flight task: its fingerprint moves to the dedup index
    pub fn complete(&mut self, fp: &Fingerprint) {
        self.in_flight.remove(fp);
        self.dedup.mark_seen(fp.clone());
    }

    /// Removes and resolves every pending task of `host` matching `predicate`
    ///
    /// Used when robots.txt loaded after discovery disallows queued URLs.
    pub fn purge_host<F>(&mut self, host: &str, predicate: F) -> Vec<CrawlTask>
    where
        F: Fn(&CrawlTask) -> bool,
    {
        let Some(queue) = self.hosts.get_mut(host) else {
            return Vec::new();
        };

        let mut purged = Vec::new();
        let mut kept = Vec::new();
        for (task, not_before) in queue.drain() {
            if predicate(&task) {
                purged.push(task);
            } else {
                kept.push((task, not_before));
            }
        }
        for (task, not_before) in kept {
            match not_before {
                Some(not_before) => queue.delayed.push(Delayed { not_before, task }),
                None => queue.ready.push(Queued(task)),
            }
        }

        for task in &purged {
            let fp = task.fingerprint();
            self.queued.remove(&fp);
            self.dedup.mark_seen(fp);
        }
        purged
    }

    /// Returns in-flight tasks to the queue, for tasks whose worker vanished
    pub fn release_orphans(&mut self) -> usize {
        let orphans: Vec<CrawlTask> = self.in_flight.drain().map(|(_, task)| task).collect();
        let count = orphans.len();
        for task in orphans {
            self.release(task);
        }
        count
    }

    /// Number of pending (not in flight) tasks
    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns true when nothing is pending or in flight
    pub fn is_idle(&self) -> bool {
        self.queued.is_empty() && self.in_flight.is_empty()
    }

    pub fn dedup(&self) -> &DedupIndex {
        &self.dedup
    }

    /// Captures pending and in-flight tasks, in-flight ones as immediately ready
    pub fn snapshot(&self, now: Instant) -> FrontierSnapshot {
        let mut pending: Vec<PendingEntry> = self
            .in_flight
            .values()
            .map(|task| PendingEntry {
                task: task.clone(),
                delay_ms: 0,
            })
            .collect();

        for queue in self.hosts.values() {
            pending.extend(queue.ready.iter().map(|q| PendingEntry {
                task: q.0.clone(),
                delay_ms: 0,
            }));
            pending.extend(queue.delayed.iter().map(|d| PendingEntry {
                task: d.task.clone(),
                delay_ms: d.not_before.saturating_duration_since(now).as_millis() as u64,
            }));
        }
        pending.sort_by_key(|e| (e.task.priority, e.task.seq));

        FrontierSnapshot {
            next_seq: self.next_seq,
            pending,
        }
    }

    /// Rebuilds a frontier from a snapshot and the resolved fingerprints
    ///
    /// Pending entries that are already resolved or duplicated are dropped.
    pub fn restore(snapshot: FrontierSnapshot, resolved: Vec<Fingerprint>, now: Instant) -> Self {
        let mut frontier = Self {
            dedup: DedupIndex::restore(resolved),
            next_seq: snapshot.next_seq,
            ..Self::default()
        };

        for entry in snapshot.pending {
            let fp = entry.task.fingerprint();
            if frontier.is_known(&fp) {
                continue;
            }
            frontier.next_seq = frontier.next_seq.max(entry.task.seq + 1);
            frontier.queued.insert(fp);
            let delay = Duration::from_millis(entry.delay_ms);
            let queue = frontier.host_queue(&entry.task);
            if delay.is_zero() {
                queue.ready.push(Queued(entry.task));
            } else {
                queue.delayed.push(Delayed {
                    not_before: now + delay,
                    task: entry.task,
                });
            }
        }
        frontier
    }

    fn host_queue(&mut self, task: &CrawlTask) -> &mut HostQueue {
        self.hosts.entry(task.host_key()).or_default()
    }
}

/// Persisted form of the frontier
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrontierSnapshot {
    pub next_seq: u64,
    pub pending: Vec<PendingEntry>,
}

/// A pending task and the time left on its retry floor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub task: CrawlTask,
    pub delay_ms: u64,
}
