//! Scheduler Module
//!
//! Priority-aware admission of asynchronous jobs under a concurrency cap and
//! a replenishing reservoir.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::LimiterConfig;
use crate::error::{PipelineError, Result};
use crate::limiter::job::next_job_id;
use crate::limiter::{
    JobOptions, JobState, LimiterEvent, LimiterObserver, NoopObserver, Priority, Reservoir,
};

// == Limiter Counts ==
/// Point-in-time view of the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LimiterCounts {
    pub queued: usize,
    pub executing: usize,
    /// Jobs that finished successfully
    pub done: u64,
    /// Jobs that failed with no retry budget left
    pub failed: u64,
    pub reservoir_level: u64,
}

/// Queue entry; ordered so the heap top is the highest priority, oldest job.
struct Waiter {
    id: String,
    priority: Priority,
    seq: u64,
    weight: u64,
    attempt: u32,
    enqueued_at: Instant,
    admit: oneshot::Sender<Admission>,
}

impl PartialEq for Waiter {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Waiter {}

impl PartialOrd for Waiter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Waiter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct State {
    queue: BinaryHeap<Waiter>,
    executing: usize,
    reservoir: Reservoir,
    stopped: bool,
    next_seq: u64,
    done: u64,
    failed: u64,
}

struct Shared {
    state: Mutex<State>,
    config: LimiterConfig,
    observer: Arc<dyn LimiterObserver>,
    /// Signalled whenever the executing or queued count may have dropped
    idle: Notify,
}

/// Concurrency slot held by an executing job; released on drop.
struct Admission {
    shared: Arc<Shared>,
    weight: u64,
    outcome: Option<JobState>,
    armed: bool,
}

impl Admission {
    fn finish(mut self, outcome: Option<JobState>) {
        self.outcome = outcome;
    }
}

impl Drop for Admission {
    fn drop(&mut self) {
        if self.armed {
            self.shared.release(self.outcome);
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, events: &[LimiterEvent]) {
        for event in events {
            self.observer.on_event(event);
        }
    }

    // == Dispatch ==
    /// Admits queued jobs while a slot is free and the reservoir covers the head.
    ///
    /// The head blocks everything behind it, so a heavy high-priority job is
    /// never overtaken by lighter low-priority ones.
    fn dispatch(self: &Arc<Self>, state: &mut State, events: &mut Vec<LimiterEvent>) {
        while state.executing < self.config.max_concurrent {
            let Some(head) = state.queue.peek() else {
                break;
            };
            if head.admit.is_closed() {
                // Submitter went away
                state.queue.pop();
                continue;
            }
            if head.weight > state.reservoir.level() {
                break;
            }

            let Some(waiter) = state.queue.pop() else {
                break;
            };
            state.reservoir.try_take(waiter.weight);
            state.executing += 1;

            let admission = Admission {
                shared: Arc::clone(self),
                weight: waiter.weight,
                outcome: None,
                armed: true,
            };
            match waiter.admit.send(admission) {
                Ok(()) => {
                    events.push(LimiterEvent::Admitted {
                        id: waiter.id,
                        attempt: waiter.attempt,
                        waited: waiter.enqueued_at.elapsed(),
                    });
                    if state.reservoir.is_depleted() {
                        events.push(LimiterEvent::Depleted);
                    }
                }
                Err(mut admission) => {
                    admission.armed = false;
                    state.executing -= 1;
                    state.reservoir.give_back(admission.weight);
                }
            }
        }
    }

    fn release(self: &Arc<Self>, outcome: Option<JobState>) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            state.executing = state.executing.saturating_sub(1);
            match outcome {
                Some(JobState::Done) => state.done += 1,
                Some(JobState::Failed) => state.failed += 1,
                _ => {}
            }
            self.dispatch(&mut state, &mut events);
        }
        self.emit(&events);
        self.idle.notify_waiters();
    }

    fn refill(self: &Arc<Self>) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            let level = state.reservoir.refill();
            events.push(LimiterEvent::Refilled { level });
            self.dispatch(&mut state, &mut events);
        }
        self.emit(&events);
        self.idle.notify_waiters();
    }

    /// Removes a still-queued waiter; false means it was already admitted or dropped.
    fn withdraw(self: &Arc<Self>, seq: u64) -> bool {
        let mut events = Vec::new();
        let removed = {
            let mut state = self.lock();
            let before = state.queue.len();
            state.queue.retain(|waiter| waiter.seq != seq);
            let removed = state.queue.len() < before;
            if removed {
                self.dispatch(&mut state, &mut events);
            }
            removed
        };
        self.emit(&events);
        self.idle.notify_waiters();
        removed
    }
}

// == Rate Limiter ==
/// Cloneable handle to a shared scheduler.
///
/// Construction spawns the reservoir refill ticker, so it must happen inside
/// a tokio runtime. The ticker stops once every handle is dropped.
#[derive(Clone)]
pub struct RateLimiter {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.shared.config)
            .field("counts", &self.counts())
            .finish()
    }
}

impl RateLimiter {
    /// Creates a limiter that reports nothing.
    pub fn new(config: LimiterConfig) -> Self {
        Self::with_observer(config, Arc::new(NoopObserver))
    }

    /// Creates a limiter that reports lifecycle events to `observer`.
    pub fn with_observer(config: LimiterConfig, observer: Arc<dyn LimiterObserver>) -> Self {
        let reservoir = Reservoir::new(
            config.reservoir_initial,
            config.reservoir_ceiling,
            config.refill_amount,
            config.refill_interval,
        );
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                queue: BinaryHeap::new(),
                executing: 0,
                reservoir,
                stopped: false,
                next_seq: 0,
                done: 0,
                failed: 0,
            }),
            config,
            observer,
            idle: Notify::new(),
        });
        spawn_refill_task(Arc::downgrade(&shared), shared.config.refill_interval);
        Self { shared }
    }

    // == Schedule ==
    /// Submits `work` and waits for it to be admitted and completed.
    ///
    /// `work` is invoked once per attempt. When it fails and the job still
    /// has retry budget, the job waits `retry_delay` and re-enters the queue
    /// at its original priority.
    ///
    /// # Errors
    /// - `WeightExceedsCapacity` if the reservoir can never cover the weight
    /// - `LimiterStopped` once draining has begun
    /// - `LoadShed` if the queue is past its high-water mark and the priority is too low
    /// - `AdmissionExpired` if one attempt waits longer than `expiration`
    /// - the work's own error after the last attempt
    pub async fn schedule<T, F, Fut>(&self, options: JobOptions, mut work: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let id = options.id.clone().unwrap_or_else(next_job_id);
        let ceiling = self.shared.config.reservoir_ceiling;
        if options.weight > ceiling {
            return Err(PipelineError::WeightExceedsCapacity {
                weight: options.weight,
                ceiling,
            });
        }

        let mut attempt = 0;
        loop {
            let admission = self.acquire(&id, &options, attempt).await?;

            match work().await {
                Ok(value) => {
                    admission.finish(Some(JobState::Done));
                    self.shared.emit(&[LimiterEvent::Done { id, attempt }]);
                    return Ok(value);
                }
                Err(err) => {
                    let will_retry = attempt < options.retries;
                    admission.finish((!will_retry).then_some(JobState::Failed));
                    self.shared.emit(&[LimiterEvent::Failed {
                        id: id.clone(),
                        attempt,
                        error: err.to_string(),
                        will_retry,
                    }]);
                    if !will_retry {
                        return Err(err);
                    }

                    attempt += 1;
                    self.shared.emit(&[LimiterEvent::Retrying {
                        id: id.clone(),
                        attempt,
                        delay: options.retry_delay,
                    }]);
                    tokio::time::sleep(options.retry_delay).await;
                }
            }
        }
    }

    /// Queues one attempt and waits for its admission.
    async fn acquire(&self, id: &str, options: &JobOptions, attempt: u32) -> Result<Admission> {
        let (tx, mut rx) = oneshot::channel();
        let mut events = Vec::new();

        let seq = {
            let mut state = self.shared.lock();
            if state.stopped {
                return Err(PipelineError::LimiterStopped);
            }
            if state.queue.len() >= self.shared.config.high_water_mark
                && options.priority < self.shared.config.shed_below
            {
                drop(state);
                self.shared.emit(&[LimiterEvent::Shed {
                    id: id.to_string(),
                    priority: options.priority,
                }]);
                return Err(PipelineError::LoadShed {
                    job_id: id.to_string(),
                    priority: options.priority,
                });
            }

            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push(Waiter {
                id: id.to_string(),
                priority: options.priority,
                seq,
                weight: options.weight,
                attempt,
                enqueued_at: Instant::now(),
                admit: tx,
            });
            events.push(LimiterEvent::Queued {
                id: id.to_string(),
                priority: options.priority,
                attempt,
            });
            self.shared.dispatch(&mut state, &mut events);
            seq
        };
        self.shared.emit(&events);

        let admitted = match options.expiration {
            None => rx.await.ok(),
            Some(limit) => match tokio::time::timeout(limit, &mut rx).await {
                Ok(received) => received.ok(),
                Err(_) => {
                    if self.shared.withdraw(seq) {
                        self.shared.emit(&[LimiterEvent::Expired {
                            id: id.to_string(),
                            waited: limit,
                        }]);
                        return Err(PipelineError::AdmissionExpired {
                            job_id: id.to_string(),
                            waited: limit,
                        });
                    }
                    // Admitted between the deadline and the withdrawal
                    rx.try_recv().ok()
                }
            },
        };

        // A dropped sender means the queue was cleared by a draining shutdown
        admitted.ok_or(PipelineError::LimiterStopped)
    }

    /// Schedules `work` at high priority with default options.
    pub async fn schedule_high_priority<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.schedule(JobOptions::with_priority(Priority::High), work)
            .await
    }

    /// Schedules `work` at low priority with default options.
    pub async fn schedule_low_priority<T, F, Fut>(&self, work: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.schedule(JobOptions::with_priority(Priority::Low), work)
            .await
    }

    // == Is Busy ==
    /// True when the queue is past its healthy threshold or every slot is taken.
    pub fn is_busy(&self) -> bool {
        let state = self.shared.lock();
        state.queue.len() > self.shared.config.busy_queue_threshold
            || state.executing >= self.shared.config.max_concurrent
    }

    pub fn counts(&self) -> LimiterCounts {
        let state = self.shared.lock();
        LimiterCounts {
            queued: state.queue.len(),
            executing: state.executing,
            done: state.done,
            failed: state.failed,
            reservoir_level: state.reservoir.level(),
        }
    }

    pub fn reservoir_level(&self) -> u64 {
        self.shared.lock().reservoir.level()
    }

    pub fn is_stopped(&self) -> bool {
        self.shared.lock().stopped
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.shared.config
    }

    // == Drain ==
    /// Stops admitting new submissions and waits for outstanding work.
    ///
    /// With `drop_waiting`, every queued job fails immediately with
    /// `LimiterStopped` and only executing jobs are awaited. Otherwise queued
    /// jobs are still admitted and awaited. Executing jobs always run to
    /// completion.
    pub async fn drain(&self, drop_waiting: bool) {
        let mut events = Vec::new();
        {
            let mut state = self.shared.lock();
            state.stopped = true;
            if drop_waiting {
                for waiter in state.queue.drain() {
                    events.push(LimiterEvent::Dropped { id: waiter.id });
                }
            }
        }
        self.shared.emit(&events);

        loop {
            let notified = self.shared.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let state = self.shared.lock();
                if state.executing == 0 && state.queue.is_empty() {
                    return;
                }
            }
            notified.await;
        }
    }
}

fn spawn_refill_task(shared: Weak<Shared>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            shared.refill();
        }
    })
}
