//! In-process deferred-job scheduler.
//!
//! A dispatcher actor owns the bookkeeping. Each scheduled job gets its own
//! task that sleeps until `not_before` and then waits for a permit, so at
//! most `concurrency` handlers run at once.

use crate::{
    actor::{Actor, ActorContext, ActorRef, spawn::spawn_actor},
    error::ActorError,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engine_core::{
    error::SchedulerError,
    jobs::{JobScheduler, ScheduledJob},
};
use std::{collections::HashMap, fmt, sync::Arc};
use tokio::{
    sync::{Semaphore, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info};

pub type JobResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[async_trait]
pub trait JobHandler: Send + Sync {
    async fn run(&self, payload: serde_json::Value) -> JobResult;
}

pub enum SchedulerMsg {
    SetActorRef(ActorRef<SchedulerMsg>),
    Schedule(ScheduledJob),
    Completed { job_name: String, ok: bool },
    WaitIdle(oneshot::Sender<()>),
}

impl fmt::Debug for SchedulerMsg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerMsg::SetActorRef(_) => f.write_str("SetActorRef"),
            SchedulerMsg::Schedule(job) => write!(f, "Schedule({})", job.job_name),
            SchedulerMsg::Completed { job_name, ok } => {
                write!(f, "Completed({job_name}, ok={ok})")
            }
            SchedulerMsg::WaitIdle(_) => f.write_str("WaitIdle"),
        }
    }
}

type Handlers = Arc<HashMap<String, Arc<dyn JobHandler>>>;

struct Dispatcher {
    handlers: Handlers,
    permits: Arc<Semaphore>,
    self_ref: Option<ActorRef<SchedulerMsg>>,
    pending: usize,
    waiters: Vec<oneshot::Sender<()>>,
}

impl Dispatcher {
    fn dispatch(&mut self, job: ScheduledJob) -> Result<(), ActorError> {
        let Some(handler) = self.handlers.get(&job.job_name).cloned() else {
            return Err(ActorError::Internal(format!(
                "no handler for job '{}'",
                job.job_name
            )));
        };
        let Some(completion) = self.self_ref.clone() else {
            return Err(ActorError::Internal("dispatcher not initialized".into()));
        };
        let permits = Arc::clone(&self.permits);
        self.pending += 1;

        tokio::spawn(async move {
            let wait = (job.not_before - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let ok = match permits.acquire_owned().await {
                Ok(_permit) => match handler.run(job.payload).await {
                    Ok(()) => true,
                    Err(err) => {
                        error!(job = %job.job_name, group = %job.group, error = %err, "Job failed");
                        false
                    }
                },
                Err(_) => false,
            };

            let msg = SchedulerMsg::Completed {
                job_name: job.job_name,
                ok,
            };
            if completion.send(msg).await.is_err() {
                debug!("Scheduler stopped before job completion was recorded");
            }
        });
        Ok(())
    }

    fn notify_if_idle(&mut self) {
        if self.pending == 0 {
            for waiter in self.waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }
}

#[async_trait]
impl Actor<SchedulerMsg> for Dispatcher {
    async fn handle(&mut self, msg: SchedulerMsg, ctx: &ActorContext) -> Result<(), ActorError> {
        match msg {
            SchedulerMsg::SetActorRef(actor_ref) => self.self_ref = Some(actor_ref),
            SchedulerMsg::Schedule(job) => {
                debug!(actor = %ctx.name(), job = %job.job_name, not_before = %job.not_before, "Job queued");
                self.dispatch(job)?;
            }
            SchedulerMsg::Completed { job_name, ok } => {
                self.pending = self.pending.saturating_sub(1);
                debug!(job = %job_name, ok, pending = self.pending, "Job completed");
                self.notify_if_idle();
            }
            SchedulerMsg::WaitIdle(waiter) => {
                self.waiters.push(waiter);
                self.notify_if_idle();
            }
        }
        Ok(())
    }

    async fn on_stop(&mut self, ctx: &ActorContext) -> Result<(), ActorError> {
        if self.pending > 0 {
            info!(actor = %ctx.name(), pending = self.pending, "Scheduler stopped with jobs in flight");
        }
        Ok(())
    }
}

pub struct LocalJobScheduler {
    actor: ActorRef<SchedulerMsg>,
    handlers: Handlers,
    handle: JoinHandle<()>,
}

impl LocalJobScheduler {
    pub async fn start(
        concurrency: usize,
        handlers: HashMap<String, Arc<dyn JobHandler>>,
    ) -> Result<Self, SchedulerError> {
        let handlers: Handlers = Arc::new(handlers);
        let dispatcher = Dispatcher {
            handlers: Arc::clone(&handlers),
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
            self_ref: None,
            pending: 0,
            waiters: Vec::new(),
        };
        let (actor, handle) = spawn_actor("job-scheduler", 256, dispatcher);
        actor
            .send(SchedulerMsg::SetActorRef(actor.clone()))
            .await?;

        Ok(LocalJobScheduler {
            actor,
            handlers,
            handle,
        })
    }

    /// Resolves once no scheduled job is waiting or running.
    pub async fn wait_idle(&self) -> Result<(), SchedulerError> {
        let (tx, rx) = oneshot::channel();
        self.actor.send(SchedulerMsg::WaitIdle(tx)).await?;
        rx.await.map_err(|_| SchedulerError::Closed)
    }

    /// Stops the dispatcher; jobs already running keep their task.
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

#[async_trait]
impl JobScheduler for LocalJobScheduler {
    async fn schedule(
        &self,
        job_name: &str,
        payload: serde_json::Value,
        not_before: DateTime<Utc>,
        group: &str,
    ) -> Result<(), SchedulerError> {
        if !self.handlers.contains_key(job_name) {
            return Err(SchedulerError::UnknownJob(job_name.to_string()));
        }
        let job = ScheduledJob {
            job_name: job_name.to_string(),
            payload,
            not_before,
            group: group.to_string(),
        };
        self.actor.send(SchedulerMsg::Schedule(job)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl JobHandler for Recorder {
        async fn run(&self, payload: serde_json::Value) -> JobResult {
            let n = payload["n"].as_i64().ok_or("missing n")?;
            self.seen.lock().unwrap().push(n);
            if n < 0 {
                return Err("negative".into());
            }
            Ok(())
        }
    }

    async fn scheduler(recorder: Arc<Recorder>) -> LocalJobScheduler {
        let handlers: HashMap<String, Arc<dyn JobHandler>> =
            HashMap::from([("record".to_string(), recorder as Arc<dyn JobHandler>)]);
        LocalJobScheduler::start(2, handlers).await.unwrap()
    }

    #[tokio::test]
    async fn runs_jobs_in_not_before_order() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(Arc::clone(&recorder)).await;
        let now = Utc::now();

        for (n, delay_ms) in [(3, 120), (1, 0), (2, 60)] {
            scheduler
                .schedule(
                    "record",
                    serde_json::json!({ "n": n }),
                    now + chrono::Duration::milliseconds(delay_ms),
                    "test",
                )
                .await
                .unwrap();
        }

        tokio::time::timeout(Duration::from_secs(5), scheduler.wait_idle())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn failing_jobs_still_complete() {
        let recorder = Arc::new(Recorder::default());
        let scheduler = scheduler(Arc::clone(&recorder)).await;

        scheduler
            .schedule("record", serde_json::json!({ "n": -1 }), Utc::now(), "test")
            .await
            .unwrap();
        scheduler.wait_idle().await.unwrap();
        assert_eq!(*recorder.seen.lock().unwrap(), vec![-1]);
    }

    #[tokio::test]
    async fn rejects_unknown_jobs() {
        let scheduler = scheduler(Arc::new(Recorder::default())).await;
        let err = scheduler
            .schedule("other", serde_json::Value::Null, Utc::now(), "test")
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulerError::UnknownJob(_)));
        scheduler.wait_idle().await.unwrap();
    }
}
