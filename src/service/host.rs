use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ahash::AHashMap;
use chrono::{DateTime, Utc};
use crossbeam_channel::{RecvTimeoutError, Sender, bounded};
use llgym_benchmark::{Benchmark, BenchmarkFactory};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::protocol::{Reply, Request, SessionInfo};
use super::worker::{self, Job, WorkerInit, WorkerMessage};
use crate::actions::{ActionId, catalogue};
use crate::cost::{BaselineCosts, CostFunction};
use crate::error::{GymError, Result};
use crate::session::{ActionOutcome, CompilationSession, Observation, SessionId, SessionOptions};

#[derive(Clone, Debug)]
pub struct HostConfig {
    pub session: SessionOptions,
    /// How long a caller waits for a session request before giving up.
    pub request_timeout: Duration,
    /// How long a caller waits for a new session's baselines.
    pub start_timeout: Duration,
    pub max_sessions: usize,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            session: SessionOptions::default(),
            request_timeout: Duration::from_secs(300),
            start_timeout: Duration::from_secs(600),
            max_sessions: 256,
        }
    }
}

struct SessionHandle {
    inbox: Sender<WorkerMessage>,
    thread: JoinHandle<()>,
    benchmark: String,
    created_at: DateTime<Utc>,
}

/// Registry of live sessions, each running on its own thread.
///
/// Requests for one session are queued on that session's thread and run one
/// at a time; requests for different sessions run in parallel. The host only
/// routes work and never touches a module itself.
pub struct SessionHost {
    factory: Arc<BenchmarkFactory>,
    config: HostConfig,
    sessions: RwLock<AHashMap<SessionId, SessionHandle>>,
    retired: Mutex<Vec<JoinHandle<()>>>,
    next_id: AtomicU64,
    live: AtomicUsize,
    closed: AtomicBool,
}

impl SessionHost {
    pub fn new(factory: Arc<BenchmarkFactory>, config: HostConfig) -> Self {
        Self {
            factory,
            config,
            sessions: RwLock::new(AHashMap::new()),
            retired: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            live: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    pub fn factory(&self) -> &Arc<BenchmarkFactory> {
        &self.factory
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    /// Start a session on a benchmark registered with the factory.
    pub fn start_session(&self, benchmark: &str) -> Result<SessionId> {
        let benchmark = self.factory.get(benchmark)?;
        self.start_session_with(benchmark)
    }

    /// Start a session on a benchmark that need not be registered.
    pub fn start_session_with(&self, benchmark: Benchmark) -> Result<SessionId> {
        let uri = benchmark.uri().to_string();
        self.launch(WorkerInit::Benchmark(benchmark), uri, "start_session")
    }

    /// Start a new session holding a copy of `id`'s current state.
    pub fn fork_session(&self, id: SessionId) -> Result<SessionId> {
        let snapshot = self.call(id, "fork_session", self.config.request_timeout, |session| {
            session.snapshot()
        })?;
        let uri = snapshot.benchmark.to_string();
        let fork = self.launch(WorkerInit::Fork(snapshot), uri, "fork_session")?;
        info!(session = %id, fork = %fork, "forked session");
        Ok(fork)
    }

    pub fn apply_actions(&self, id: SessionId, actions: Vec<ActionId>) -> Result<ActionOutcome> {
        self.call(id, "apply_actions", self.config.request_timeout, move |session| {
            session.apply_actions(&actions)
        })
    }

    pub fn observe(&self, id: SessionId, cost_functions: Vec<CostFunction>) -> Result<Observation> {
        self.observe_within(id, cost_functions, self.config.request_timeout)
    }

    /// Like [`observe`](Self::observe) with an explicit caller timeout.
    pub fn observe_within(
        &self,
        id: SessionId,
        cost_functions: Vec<CostFunction>,
        timeout: Duration,
    ) -> Result<Observation> {
        self.call(id, "observe", timeout, move |session| {
            session.observe(&cost_functions)
        })
    }

    pub fn ir(&self, id: SessionId) -> Result<String> {
        self.call(id, "get_ir", self.config.request_timeout, |session| session.ir())
    }

    pub fn baseline_costs(&self, id: SessionId) -> Result<BaselineCosts> {
        self.call(id, "get_baselines", self.config.request_timeout, |session| {
            session.baseline_costs()
        })
    }

    /// Flags of the actions committed so far, oldest first.
    pub fn action_history(&self, id: SessionId) -> Result<Vec<String>> {
        self.call(id, "get_action_history", self.config.request_timeout, |session| {
            Ok(session
                .actions()
                .iter()
                .map(|action| action.flag().to_string())
                .collect())
        })
    }

    pub fn sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<_> = self
            .sessions
            .read()
            .iter()
            .map(|(id, handle)| SessionInfo {
                session_id: *id,
                benchmark: handle.benchmark.clone(),
                created_at: handle.created_at,
            })
            .collect();
        sessions.sort_by_key(|info| info.session_id);
        sessions
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.read().len()
    }

    /// End a session and wait for its thread to release the module and
    /// working area. Ending a session that already ended is a no-op.
    pub fn end_session(&self, id: SessionId) -> Result<()> {
        let removed = self.sessions.write().remove(&id);
        let Some(handle) = removed else {
            return if self.issued(id) {
                Ok(())
            } else {
                Err(GymError::SessionNotFound(id))
            };
        };
        self.live.fetch_sub(1, Ordering::SeqCst);

        let _ = handle.inbox.send(WorkerMessage::Terminate);
        if handle.thread.join().is_err() {
            warn!(session = %id, "session thread panicked during teardown");
        }
        info!(session = %id, "ended session");
        Ok(())
    }

    /// End every session and join every session thread.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let drained: Vec<_> = self.sessions.write().drain().collect();
        if !drained.is_empty() {
            info!(sessions = drained.len(), "shutting down sessions");
        }
        self.live.fetch_sub(drained.len(), Ordering::SeqCst);

        for (_, handle) in &drained {
            let _ = handle.inbox.send(WorkerMessage::Terminate);
        }
        for (id, handle) in drained {
            if handle.thread.join().is_err() {
                warn!(session = %id, "session thread panicked during shutdown");
            }
        }

        let retired = std::mem::take(&mut *self.retired.lock());
        for thread in retired {
            let _ = thread.join();
        }
    }

    /// Serve one protocol request.
    pub fn handle(&self, request: Request) -> Reply {
        let result = match request {
            Request::StartSession { benchmark } => self
                .start_session(&benchmark)
                .map(|session_id| Reply::SessionStarted { session_id }),
            Request::ForkSession { session_id } => self
                .fork_session(session_id)
                .map(|session_id| Reply::SessionStarted { session_id }),
            Request::ApplyActions {
                session_id,
                actions,
            } => self.apply_actions(session_id, actions).map(Reply::from),
            Request::Observe {
                session_id,
                cost_functions,
                representation,
            } => self
                .observe(session_id, cost_functions)
                .map(|observation| Reply::observation(observation, representation)),
            Request::GetIr { session_id } => self.ir(session_id).map(|ir| Reply::Ir { ir }),
            Request::GetBaselines { session_id } => self
                .baseline_costs(session_id)
                .map(|costs| Reply::baselines(&costs)),
            Request::GetActionHistory { session_id } => self
                .action_history(session_id)
                .map(|actions| Reply::ActionHistory { actions }),
            Request::ListActions => Ok(Reply::Actions {
                actions: catalogue(),
            }),
            Request::ListSessions => Ok(Reply::Sessions {
                sessions: self.sessions(),
            }),
            Request::EndSession { session_id } => self
                .end_session(session_id)
                .map(|()| Reply::SessionEnded { session_id }),
        };
        result.unwrap_or_else(|err| {
            debug!(error = %err, "request failed");
            Reply::from(err)
        })
    }

    fn reserve_slot(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GymError::ResourceExhausted("session host is shutting down".into()));
        }
        let max = self.config.max_sessions;
        self.live
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| (live < max).then_some(live + 1))
            .map(|_| ())
            .map_err(|_| GymError::ResourceExhausted(format!("session limit of {max} reached")))
    }

    fn release_slot(&self) {
        self.live.fetch_sub(1, Ordering::SeqCst);
    }

    fn launch(&self, init: WorkerInit, benchmark: String, operation: &'static str) -> Result<SessionId> {
        self.reserve_slot()?;
        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let started = Instant::now();

        let spawned = match worker::spawn(id, init, self.config.session.clone()) {
            Ok(spawned) => spawned,
            Err(err) => {
                self.release_slot();
                return Err(err);
            }
        };

        let ready = spawned.ready.recv_timeout(self.config.start_timeout);
        let failure = match ready {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some((err, false)),
            Err(RecvTimeoutError::Timeout) => Some((
                GymError::Timeout {
                    session: Some(id),
                    operation,
                    elapsed: started.elapsed(),
                },
                true,
            )),
            Err(RecvTimeoutError::Disconnected) => Some((GymError::SessionTerminated(id), false)),
        };
        if let Some((err, still_starting)) = failure {
            self.release_slot();
            // Without an inbox a still-initialising thread exits as soon as it is ready.
            drop(spawned.inbox);
            if still_starting {
                self.retire(spawned.thread);
            } else if spawned.thread.join().is_err() {
                warn!(session = %id, "session thread panicked during failed start");
            }
            warn!(session = %id, %benchmark, error = %err, "session creation failed");
            return Err(err);
        }

        self.register(id, spawned.inbox, spawned.thread, benchmark.clone())?;
        info!(
            session = %id,
            %benchmark,
            elapsed_ms = started.elapsed().as_millis(),
            "started session"
        );
        Ok(id)
    }

    /// Publish a started session, unless the host closed while it was starting.
    fn register(
        &self,
        id: SessionId,
        inbox: Sender<WorkerMessage>,
        thread: JoinHandle<()>,
        benchmark: String,
    ) -> Result<()> {
        let mut sessions = self.sessions.write();
        if self.closed.load(Ordering::SeqCst) {
            drop(sessions);
            self.release_slot();
            let _ = inbox.send(WorkerMessage::Terminate);
            if thread.join().is_err() {
                warn!(session = %id, "session thread panicked during shutdown");
            }
            return Err(GymError::ResourceExhausted("session host is shutting down".into()));
        }
        sessions.insert(
            id,
            SessionHandle {
                inbox,
                thread,
                benchmark,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// Whether this host handed out `id`. Ids are never reused, so an issued
    /// id missing from the registry names a session that has terminated.
    fn issued(&self, id: SessionId) -> bool {
        (1..self.next_id.load(Ordering::SeqCst)).contains(&id.raw())
    }

    /// Park a thread that may still be running, joining retired threads that
    /// have since finished.
    fn retire(&self, thread: JoinHandle<()>) {
        let finished: Vec<_> = {
            let mut retired = self.retired.lock();
            retired.push(thread);
            let (finished, running) = retired.drain(..).partition(JoinHandle::is_finished);
            *retired = running;
            finished
        };
        for thread in finished {
            let _ = thread.join();
        }
    }

    fn inbox(&self, id: SessionId) -> Result<Sender<WorkerMessage>> {
        if let Some(handle) = self.sessions.read().get(&id) {
            return Ok(handle.inbox.clone());
        }
        if self.issued(id) {
            Err(GymError::SessionTerminated(id))
        } else {
            Err(GymError::SessionNotFound(id))
        }
    }

    /// Run `f` on the session's thread and wait up to `timeout` for its result.
    ///
    /// On timeout the job keeps running on the session thread; its result is
    /// dropped.
    fn call<T, F>(&self, id: SessionId, operation: &'static str, timeout: Duration, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: for<'ctx> FnOnce(&mut CompilationSession<'ctx>) -> Result<T> + Send + 'static,
    {
        let inbox = self.inbox(id)?;
        let (reply_tx, reply_rx) = bounded(1);
        let job: Job = Box::new(move |session: &mut CompilationSession<'_>| {
            let _ = reply_tx.send(f(session));
        });
        if inbox.send(WorkerMessage::Run(job)).is_err() {
            return Err(self.retire_crashed(id));
        }

        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(session = %id, operation, ?timeout, "request timed out");
                Err(GymError::Timeout {
                    session: Some(id),
                    operation,
                    elapsed: timeout,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(self.retire_crashed(id)),
        }
    }

    /// Forget a session whose thread died under it.
    fn retire_crashed(&self, id: SessionId) -> GymError {
        let removed = self.sessions.write().remove(&id);
        if let Some(handle) = removed {
            self.release_slot();
            warn!(session = %id, "session thread exited unexpectedly");
            if handle.thread.join().is_err() {
                warn!(session = %id, "session thread panicked outside a job");
            }
        }
        GymError::SessionTerminated(id)
    }
}

impl Drop for SessionHost {
    fn drop(&mut self) {
        self.shutdown();
    }
}
