use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use executor_core::kind::SYNTHETIC;
use executor_core::status::judge_existence;
use executor_core::{
    CanonicalStatus, Executor, ExecutorError, Existence, Kind, Name, Options, StatusDesc, Task,
    TaskInspect,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default simulated work time, overridable per executor.
pub const DURATION_OPTION: &str = "duration_ms";
pub const DEFAULT_DURATION_MS: u64 = 100;
/// Task envs steering one run.
pub const DURATION_ENV: &str = "SYNTHETIC_DURATION_MS";
pub const OUTCOME_ENV: &str = "SYNTHETIC_OUTCOME";

const COMPLETION_CHANNEL_CAPACITY: usize = 256;

/// Final status of one attempt. Only the attempt holding the current
/// generation of its task gets to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Completion {
    pub key: String,
    pub generation: u64,
    pub status: CanonicalStatus,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    fn status(&self) -> CanonicalStatus {
        match self {
            Outcome::Success => CanonicalStatus::Success,
            Outcome::Failed => CanonicalStatus::Failed,
        }
    }
}

#[derive(Debug, Clone)]
struct Record {
    generation: u64,
    status: CanonicalStatus,
    updated_at: DateTime<Utc>,
}

impl Record {
    fn new(generation: u64, status: CanonicalStatus) -> Self {
        Self {
            generation,
            status,
            updated_at: Utc::now(),
        }
    }
}

/// How one run behaves, read from the task's envs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub duration: Duration,
    pub outcome: Outcome,
}

impl Plan {
    pub fn for_task(task: &Task, default_duration: Duration) -> Result<Self, ExecutorError> {
        let duration = match task.spec.env.get(DURATION_ENV) {
            None => default_duration,
            Some(raw) => raw.trim().parse::<u64>().map(Duration::from_millis).map_err(|e| {
                ExecutorError::InvalidTask(format!("invalid {}: {:?}, err: {}", DURATION_ENV, raw, e))
            })?,
        };
        let outcome = match task.spec.env.get(OUTCOME_ENV).map(|s| s.trim().to_ascii_lowercase()) {
            None => Outcome::Success,
            Some(raw) if raw.is_empty() || raw == "success" => Outcome::Success,
            Some(raw) if raw == "failed" => Outcome::Failed,
            Some(raw) => {
                return Err(ExecutorError::InvalidTask(format!(
                    "invalid {}: {:?}",
                    OUTCOME_ENV, raw
                )))
            }
        };
        Ok(Self { duration, outcome })
    }
}

/// Runs nothing: a started task sleeps in a detached worker and then reports
/// the outcome its envs asked for. At most one attempt per task is in flight.
pub struct SyntheticExecutor {
    kind: Kind,
    name: Name,
    default_duration: Duration,
    records: Arc<DashMap<String, Record>>,
    generations: AtomicU64,
    completions: broadcast::Sender<Completion>,
}

impl SyntheticExecutor {
    pub fn new(name: Name, options: &Options) -> Result<Self, ExecutorError> {
        let duration_ms = match options.get(DURATION_OPTION) {
            None => DEFAULT_DURATION_MS,
            Some(raw) => raw.trim().parse::<u64>().map_err(|e| {
                ExecutorError::Config(format!("invalid {}: {:?}, err: {}", DURATION_OPTION, raw, e))
            })?,
        };
        let (completions, _) = broadcast::channel(COMPLETION_CHANNEL_CAPACITY);
        Ok(Self {
            kind: Kind::new(SYNTHETIC)?,
            name,
            default_duration: Duration::from_millis(duration_ms),
            records: Arc::new(DashMap::new()),
            generations: AtomicU64::new(0),
            completions,
        })
    }

    /// Completions published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Completion> {
        self.completions.subscribe()
    }

    /// Current generation of the task, if it was ever created.
    pub fn generation(&self, task: &Task) -> Option<u64> {
        self.records.get(&task.key()).map(|r| r.generation)
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn current(&self, task: &Task) -> CanonicalStatus {
        self.records
            .get(&task.key())
            .map(|r| r.status)
            .unwrap_or(CanonicalStatus::Created)
    }

    fn publish(&self, completion: Completion) {
        // No subscribers is fine.
        let _ = self.completions.send(completion);
    }

    fn spawn_attempt(&self, key: String, generation: u64, plan: Plan) {
        let records = self.records.clone();
        let completions = self.completions.clone();
        tokio::spawn(async move {
            tokio::time::sleep(plan.duration).await;
            let status = plan.outcome.status();
            {
                let Some(mut record) = records.get_mut(&key) else {
                    debug!("synthetic task {} removed before generation {} finished", key, generation);
                    return;
                };
                if record.generation != generation {
                    debug!(
                        "discard stale completion of {}, generation {} superseded by {}",
                        key, generation, record.generation
                    );
                    return;
                }
                record.status = status;
                record.updated_at = Utc::now();
            }
            info!("synthetic task {} generation {} finished: {}", key, generation, status);
            let _ = completions.send(Completion {
                key,
                generation,
                status,
                finished_at: Utc::now(),
            });
        });
    }

    /// Marks the task stopped by the user under a fresh generation, so the
    /// running attempt, if any, can no longer publish.
    fn stop(&self, task: &Task) -> Completion {
        let generation = self.next_generation();
        let key = task.key();
        let record = Record::new(generation, CanonicalStatus::StoppedByUser);
        let finished_at = record.updated_at;
        self.records.insert(key.clone(), record);
        Completion {
            key,
            generation,
            status: CanonicalStatus::StoppedByUser,
            finished_at,
        }
    }

    fn validated(&self, op: &'static str, task: &Task) -> Result<(), ExecutorError> {
        task.validate().map_err(|e| e.wrap_task(op, &self.kind, task))
    }
}

#[async_trait::async_trait]
impl Executor for SyntheticExecutor {
    fn kind(&self) -> &Kind {
        &self.kind
    }

    fn name(&self) -> &Name {
        &self.name
    }

    async fn exist(&self, task: &Task) -> Result<Existence, ExecutorError> {
        self.validated("judge existence", task)?;
        if !self.records.contains_key(&task.key()) {
            return Ok(Existence::ABSENT);
        }
        judge_existence(self.current(task))
            .map_err(|e| e.wrap_task("judge existence", &self.kind, task))
    }

    async fn create(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.validated("create job", task)?;
        let generation = self.next_generation();
        self.records
            .entry(task.key())
            .or_insert_with(|| Record::new(generation, CanonicalStatus::Created));
        Ok(Value::Null)
    }

    /// A second start while an attempt is in flight, or after it finished, is
    /// a no-op.
    async fn start(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.validated("start job", task)?;
        let plan = Plan::for_task(task, self.default_duration)
            .map_err(|e| e.wrap_task("start job", &self.kind, task))?;
        let key = task.key();
        let generation = self.next_generation();

        match self.records.entry(key.clone()) {
            Entry::Occupied(mut entry) => {
                if entry.get().status != CanonicalStatus::Created {
                    warn!(
                        "{}: task already started, status: {}, taskInfo: {}",
                        self.kind,
                        entry.get().status,
                        task.describe()
                    );
                    return Ok(Value::Null);
                }
                entry.insert(Record::new(generation, CanonicalStatus::Running));
            }
            Entry::Vacant(entry) => {
                entry.insert(Record::new(generation, CanonicalStatus::Running));
            }
        }

        info!(
            "{}: task started, generation: {}, duration: {:?}, outcome: {:?}, taskInfo: {}",
            self.kind,
            generation,
            plan.duration,
            plan.outcome,
            task.describe()
        );
        self.spawn_attempt(key, generation, plan);
        Ok(serde_json::json!({ "generation": generation }))
    }

    async fn update(&self, _task: &Task) -> Result<Value, ExecutorError> {
        Err(ExecutorError::unsupported_operation(&self.kind, "update"))
    }

    /// A task never seen reports `Created`.
    async fn status(&self, task: &Task) -> Result<StatusDesc, ExecutorError> {
        self.validated("status job", task)?;
        let status = self.current(task);
        let desc = if status == CanonicalStatus::Failed {
            "synthetic failure"
        } else {
            ""
        };
        Ok(StatusDesc::new(status, desc))
    }

    async fn inspect(&self, task: &Task) -> Result<TaskInspect, ExecutorError> {
        self.validated("inspect job", task)?;
        let key = task.key();
        let record = self
            .records
            .get(&key)
            .map(|r| r.clone())
            .ok_or_else(|| ExecutorError::ObjectNotFound(key.clone()))
            .map_err(|e| e.wrap_task("inspect job", &self.kind, task))?;
        Ok(TaskInspect {
            desc: format!(
                "key: {}\ngeneration: {}\nstatus: {}\nupdated: {}\n",
                key,
                record.generation,
                record.status,
                record.updated_at.to_rfc3339()
            ),
        })
    }

    /// Keyed by the stored uuid, the same key `start` recorded. There is no
    /// backend name to rebuild here.
    async fn cancel(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.validated("cancel job", task)?;
        let completion = self.stop(task);
        info!(
            "{}: task cancelled, generation: {}, taskInfo: {}",
            self.kind,
            completion.generation,
            task.describe()
        );
        self.publish(completion);
        Ok(Value::Null)
    }

    /// Same keying as `cancel`.
    async fn remove(&self, task: &Task) -> Result<Value, ExecutorError> {
        self.validated("remove job", task)?;
        if self.records.remove(&task.key()).is_some() {
            debug!("{}: task removed, taskInfo: {}", self.kind, task.describe());
        }
        Ok(Value::Null)
    }

    async fn batch_delete(&self, tasks: &[Task]) -> Result<Value, ExecutorError> {
        for task in tasks.iter().filter(|t| !t.uuid.is_empty()) {
            self.remove(task).await?;
        }
        Ok(Value::Null)
    }
}
