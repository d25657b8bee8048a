//! Scheduler engine — one driver task that sleeps until the next due job.
//! Adding or removing a job wakes it so the sleep is recomputed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use actionbot_core::error::{ActionBotError, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{Notify, oneshot};
use tokio::task::{JoinHandle, JoinSet};

use crate::job::{JobCallback, JobId, JobInfo};
use crate::schedule::Schedule;

/// How long the driver parks when no job is registered.
const IDLE_PARK: Duration = Duration::from_secs(3600);

struct JobEntry {
    seq: u64,
    name: String,
    expression: String,
    schedule: Schedule,
    callback: JobCallback,
    next_run: Option<DateTime<Utc>>,
    last_run: Option<DateTime<Utc>>,
    run_count: u64,
}

impl JobEntry {
    fn info(&self, id: &str) -> JobInfo {
        JobInfo {
            id: id.to_string(),
            name: self.name.clone(),
            schedule: self.expression.clone(),
            next_run: self.next_run,
            last_run: self.last_run,
            run_count: self.run_count,
        }
    }
}

/// A fire the driver has claimed and must run.
struct DueFire {
    id: JobId,
    name: String,
    callback: JobCallback,
}

#[derive(Default)]
struct Shared {
    jobs: RwLock<HashMap<JobId, JobEntry>>,
    next_seq: AtomicU64,
    wake: Notify,
}

impl Shared {
    fn read_jobs(&self) -> std::sync::RwLockReadGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_jobs(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<JobId, JobEntry>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Recompute every job's next run from `now` (no backlog after a restart).
    fn reschedule_all(&self, now: DateTime<Utc>) {
        for entry in self.write_jobs().values_mut() {
            entry.next_run = entry.schedule.next_after(now);
        }
    }

    /// Claim all jobs due at `now` and advance their next run.
    fn take_due(&self, now: DateTime<Utc>) -> Vec<DueFire> {
        let mut due = Vec::new();
        for (id, entry) in self.write_jobs().iter_mut() {
            if entry.next_run.is_some_and(|next| next <= now) {
                entry.last_run = Some(now);
                entry.run_count += 1;
                entry.next_run = entry.schedule.next_after(now);
                due.push(DueFire {
                    id: id.clone(),
                    name: entry.name.clone(),
                    callback: entry.callback.clone(),
                });
            }
        }
        due
    }

    /// Time until the earliest next run, if any job is scheduled.
    fn until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.read_jobs()
            .values()
            .filter_map(|e| e.next_run)
            .min()
            .map(|next| (next - now).to_std().unwrap_or(Duration::ZERO))
    }
}

struct Running {
    stop_tx: oneshot::Sender<()>,
    driver: JoinHandle<()>,
}

/// Cron-driven job scheduler.
///
/// Jobs may be added or removed whether or not the scheduler is running; they
/// only fire while it is running.
pub struct Scheduler {
    shared: Arc<Shared>,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            running: Mutex::new(None),
        }
    }

    /// Start the driver task. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return Err(ActionBotError::AlreadyRunning);
        }

        self.shared.reschedule_all(Utc::now());
        let (stop_tx, stop_rx) = oneshot::channel();
        let driver = tokio::spawn(drive(self.shared.clone(), stop_rx));
        *running = Some(Running { stop_tx, driver });

        tracing::info!("⏰ Scheduler started ({} jobs)", self.shared.read_jobs().len());
        Ok(())
    }

    /// Stop the driver and wait for in-flight fires to complete.
    pub async fn stop(&self) -> Result<()> {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(ActionBotError::NotRunning)?;

        tracing::info!("⏹️ Stopping scheduler");
        let _ = running.stop_tx.send(());
        if let Err(e) = running.driver.await {
            tracing::error!("⚠️ Scheduler driver ended abnormally: {e}");
        }
        tracing::info!("⏹️ Scheduler stopped");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Register a job. Fails with `InvalidSchedule` on a malformed expression.
    pub fn add_job(&self, name: &str, expression: &str, callback: JobCallback) -> Result<JobId> {
        let schedule = Schedule::parse(expression).inspect_err(|e| {
            tracing::error!("❌ Failed to add job '{name}': {e}");
        })?;

        let seq = self.shared.next_seq.fetch_add(1, Ordering::Relaxed) + 1;
        let id = format!("job-{seq}");
        let next_run = schedule.next_after(Utc::now());
        self.shared.write_jobs().insert(
            id.clone(),
            JobEntry {
                seq,
                name: name.to_string(),
                expression: expression.to_string(),
                schedule,
                callback,
                next_run,
                last_run: None,
                run_count: 0,
            },
        );
        self.shared.wake.notify_one();

        tracing::debug!("📅 Job added: '{name}' ({id}) schedule='{expression}'");
        Ok(id)
    }

    /// Remove a job. In-flight fires of the job are not interrupted.
    pub fn remove_job(&self, id: &str) -> Result<()> {
        let removed = self.shared.write_jobs().remove(id);
        match removed {
            Some(entry) => {
                self.shared.wake.notify_one();
                tracing::debug!("🗑️ Job removed: '{}' ({id})", entry.name);
                Ok(())
            }
            None => {
                tracing::warn!("Job not found: {id}");
                Err(ActionBotError::JobNotFound(id.to_string()))
            }
        }
    }

    pub fn job_info(&self, id: &str) -> Result<JobInfo> {
        self.shared
            .read_jobs()
            .get(id)
            .map(|entry| entry.info(id))
            .ok_or_else(|| ActionBotError::JobNotFound(id.to_string()))
    }

    /// All jobs in registration order.
    pub fn list_jobs(&self) -> Vec<JobInfo> {
        let jobs = self.shared.read_jobs();
        let mut entries: Vec<_> = jobs.iter().collect();
        entries.sort_by_key(|(_, entry)| entry.seq);
        entries.into_iter().map(|(id, entry)| entry.info(id)).collect()
    }

    pub fn job_count(&self) -> usize {
        self.shared.read_jobs().len()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

/// Driver loop: fire due jobs, then park until the next due time, a job
/// change, or stop. On stop, waits for every in-flight fire.
async fn drive(shared: Arc<Shared>, mut stop_rx: oneshot::Receiver<()>) {
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        for fire in shared.take_due(Utc::now()) {
            tracing::debug!("🔔 Job fired: '{}' ({})", fire.name, fire.id);
            in_flight.spawn(async move {
                if let Err(e) = (fire.callback)().await {
                    tracing::error!("⚠️ Job '{}' ({}) failed: {e}", fire.name, fire.id);
                }
            });
        }

        let park = shared.until_next(Utc::now()).unwrap_or(IDLE_PARK);
        tokio::select! {
            _ = &mut stop_rx => break,
            _ = shared.wake.notified() => {}
            _ = tokio::time::sleep(park) => {}
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                if let Err(e) = joined {
                    tracing::error!("⚠️ Job task panicked: {e}");
                }
            }
        }
    }

    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            tracing::error!("⚠️ Job task panicked: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::job_callback;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn noop() -> JobCallback {
        job_callback(|| async { Ok(()) })
    }

    #[tokio::test]
    async fn test_start_stop() {
        let sched = Scheduler::new();
        assert!(!sched.is_running());
        sched.start().unwrap();
        assert!(sched.is_running());
        sched.stop().await.unwrap();
        assert!(!sched.is_running());
    }

    #[tokio::test]
    async fn test_start_twice_fails() {
        let sched = Scheduler::new();
        sched.start().unwrap();
        let err = sched.start().unwrap_err();
        assert!(matches!(err, ActionBotError::AlreadyRunning));
        assert!(err.to_string().contains("already running"));
        sched.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_when_not_running_fails() {
        let sched = Scheduler::new();
        let err = sched.stop().await.unwrap_err();
        assert!(matches!(err, ActionBotError::NotRunning));
        assert!(err.to_string().contains("not running"));
    }

    #[test]
    fn test_add_job_with_descriptors() {
        let sched = Scheduler::new();
        let id = sched.add_job("hourly", "@hourly", noop()).unwrap();
        assert!(id.starts_with("job-"));
        sched.add_job("daily", "@daily", noop()).unwrap();
        let weekly = sched.add_job("weekly", "@weekly", noop()).unwrap();

        let info = sched.job_info(&weekly).unwrap();
        assert_eq!(info.name, "weekly");
        assert_eq!(info.schedule, "@weekly");
        assert!(info.next_run.is_some());

        let names: Vec<_> = sched.list_jobs().into_iter().map(|j| j.name).collect();
        assert_eq!(names, vec!["hourly", "daily", "weekly"]);
    }

    #[test]
    fn test_add_job_invalid_expression() {
        let sched = Scheduler::new();
        let err = sched.add_job("bad", "invalid", noop()).unwrap_err();
        assert!(err.to_string().contains("Invalid cron expression"));
        assert_eq!(sched.job_count(), 0);
    }

    #[test]
    fn test_remove_job() {
        let sched = Scheduler::new();
        let id = sched.add_job("daily", "@daily", noop()).unwrap();
        sched.remove_job(&id).unwrap();
        assert_eq!(sched.job_count(), 0);

        let err = sched.remove_job("non-existent").unwrap_err();
        assert!(matches!(err, ActionBotError::JobNotFound(_)));
        assert!(err.to_string().contains("Job not found"));
    }

    #[tokio::test]
    async fn test_every_second_job_fires() {
        let sched = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let id = sched
            .add_job(
                "tick",
                "@every 1s",
                job_callback(move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();

        sched.start().unwrap();
        tokio::time::sleep(Duration::from_millis(1500)).await;
        sched.stop().await.unwrap();

        assert!(count.load(Ordering::SeqCst) >= 1, "job should have fired");
        assert!(sched.job_info(&id).unwrap().run_count >= 1);
    }

    #[tokio::test]
    async fn test_jobs_do_not_fire_while_stopped() {
        let sched = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        sched
            .add_job(
                "tick",
                "@every 100ms",
                job_callback(move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failing_job_keeps_schedule() {
        let sched = Scheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        sched
            .add_job(
                "flaky",
                "@every 100ms",
                job_callback(move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Err(ActionBotError::Other("boom".into()))
                    }
                }),
            )
            .unwrap();

        sched.start().unwrap();
        tokio::time::sleep(Duration::from_millis(550)).await;
        sched.stop().await.unwrap();
        assert!(count.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test]
    async fn test_stop_drains_in_flight_fires() {
        let sched = Scheduler::new();
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let (s, f) = (started.clone(), finished.clone());
        sched
            .add_job(
                "slow",
                "@every 100ms",
                job_callback(move || {
                    let (s, f) = (s.clone(), f.clone());
                    async move {
                        s.store(true, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(300)).await;
                        f.store(true, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();

        sched.start().unwrap();
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        sched.stop().await.unwrap();
        assert!(finished.load(Ordering::SeqCst), "stop should wait for the fire");
    }

    #[tokio::test]
    async fn test_add_job_while_running() {
        let sched = Scheduler::new();
        sched.start().unwrap();

        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        sched
            .add_job(
                "late",
                "@every 200ms",
                job_callback(move || {
                    let c = c.clone();
                    async move {
                        c.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                }),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        sched.stop().await.unwrap();
        assert!(count.load(Ordering::SeqCst) >= 1);
    }
}
