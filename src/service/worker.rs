use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use inkwell::context::Context;
use llgym_benchmark::Benchmark;
use tracing::{debug, error};

use crate::error::{GymError, Result};
use crate::session::{CompilationSession, SessionId, SessionOptions, SessionSnapshot};

/// Work shipped to a session thread. It runs against the session with the
/// thread's own context, so it must not smuggle LLVM values back out.
pub(crate) type Job = Box<dyn for<'ctx> FnOnce(&mut CompilationSession<'ctx>) + Send>;

pub(crate) enum WorkerMessage {
    Run(Job),
    Terminate,
}

pub(crate) enum WorkerInit {
    Benchmark(Benchmark),
    Fork(SessionSnapshot),
}

/// A session thread that has been spawned but may still be computing
/// baselines. `ready` yields once creation has finished either way.
pub(crate) struct SpawnedWorker {
    pub(crate) inbox: Sender<WorkerMessage>,
    pub(crate) thread: JoinHandle<()>,
    pub(crate) ready: Receiver<Result<()>>,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

pub(crate) fn spawn(id: SessionId, init: WorkerInit, options: SessionOptions) -> Result<SpawnedWorker> {
    let (inbox, messages) = unbounded();
    let (ready_tx, ready) = bounded(1);

    let thread = thread::Builder::new()
        .name(format!("llgym-session-{id}"))
        .spawn(move || run(id, init, &options, &messages, &ready_tx))
        .map_err(|err| GymError::ResourceExhausted(format!("failed to spawn session thread: {err}")))?;

    Ok(SpawnedWorker {
        inbox,
        thread,
        ready,
    })
}

fn run(
    id: SessionId,
    init: WorkerInit,
    options: &SessionOptions,
    messages: &Receiver<WorkerMessage>,
    ready: &Sender<Result<()>>,
) {
    let context = Context::create();
    let created = catch_unwind(AssertUnwindSafe(|| match init {
        WorkerInit::Benchmark(benchmark) => CompilationSession::create(&context, id, &benchmark, options),
        WorkerInit::Fork(snapshot) => CompilationSession::from_snapshot(&context, id, snapshot, options),
    }));

    let mut session = match created {
        Ok(Ok(session)) => session,
        Ok(Err(err)) => {
            let _ = ready.send(Err(err));
            return;
        }
        Err(payload) => {
            error!(session = %id, panic = %panic_message(payload.as_ref()), "session creation panicked");
            let _ = ready.send(Err(GymError::SessionTerminated(id)));
            return;
        }
    };
    if ready.send(Ok(())).is_err() {
        debug!(session = %id, "session start abandoned by caller");
        return;
    }

    while let Ok(message) = messages.recv() {
        match message {
            WorkerMessage::Run(job) => {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(|| job(&mut session))) {
                    error!(session = %id, panic = %panic_message(payload.as_ref()), "session job panicked");
                    break;
                }
            }
            WorkerMessage::Terminate => break,
        }
    }

    session.terminate();
}
