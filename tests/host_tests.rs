mod common;

use std::thread;
use std::time::Duration;

use anyhow::Result;
use llgym::actions::ActionId;
use llgym::cost::{BaselinePolicy, CostFunction};
use llgym::service::{Reply, Request};
use llgym::session::SessionId;
use llgym::{ErrorKind, GymError};

use common::{REDUNDANT_IR, benchmark, host_in, host_with};

const REDUNDANT: &str = "benchmark://tests-v0/redundant";

#[test]
fn optimize_then_end_session() -> Result<()> {
    let root = tempfile::tempdir()?;
    let host = host_in(&root);
    let session = host.start_session(REDUNDANT)?;

    let baselines = host.baseline_costs(session)?;
    assert!(
        baselines.get(BaselinePolicy::Oz, CostFunction::IrInstructionCount)
            <= baselines.get(BaselinePolicy::O0, CostFunction::IrInstructionCount)
    );

    let before = host.observe(session, vec![CostFunction::IrInstructionCount])?;
    let outcome = host.apply_actions(session, vec!["instcombine".into()])?;
    assert!(outcome.is_success());
    let after = host.observe(session, vec![CostFunction::IrInstructionCount])?;
    assert!(
        after.value(CostFunction::IrInstructionCount) <= before.value(CostFunction::IrInstructionCount)
    );

    host.end_session(session)?;
    let err = host
        .observe(session, vec![CostFunction::IrInstructionCount])
        .unwrap_err();
    assert!(matches!(err, GymError::SessionTerminated(id) if id == session), "{err}");
    Ok(())
}

#[test]
fn ending_twice_is_a_no_op() -> Result<()> {
    let root = tempfile::tempdir()?;
    let host = host_in(&root);
    let session = host.start_session(REDUNDANT)?;

    host.end_session(session)?;
    host.end_session(session)?;
    assert_eq!(host.active_sessions(), 0);
    assert_eq!(std::fs::read_dir(root.path())?.count(), 0);
    Ok(())
}

#[test]
fn unknown_sessions_are_not_found() -> Result<()> {
    let root = tempfile::tempdir()?;
    let host = host_in(&root);
    let missing = SessionId::new(4242);

    assert!(matches!(host.ir(missing), Err(GymError::SessionNotFound(id)) if id == missing));
    assert!(matches!(host.end_session(missing), Err(GymError::SessionNotFound(_))));
    assert!(matches!(
        host.start_session("benchmark://tests-v0/absent"),
        Err(GymError::Benchmark(_))
    ));
    Ok(())
}

#[test]
fn sessions_run_in_parallel_and_stay_isolated() -> Result<()> {
    let root = tempfile::tempdir()?;
    let host = host_in(&root);

    let results: Vec<Result<(SessionId, Vec<String>)>> = thread::scope(|scope| {
        let workers: Vec<_> = ["mem2reg", "instcombine", "sroa", "gvn"]
            .into_iter()
            .map(|action| {
                let host = &host;
                scope.spawn(move || -> Result<(SessionId, Vec<String>)> {
                    let session = host.start_session(REDUNDANT)?;
                    host.apply_actions(session, vec![action.into()])?;
                    host.observe(session, CostFunction::ALL.to_vec())?;
                    Ok((session, host.action_history(session)?))
                })
            })
            .collect();
        workers
            .into_iter()
            .map(|worker| worker.join().expect("session worker panicked"))
            .collect()
    });

    let mut ids = Vec::new();
    for result in results {
        let (session, history) = result?;
        assert_eq!(history.len(), 1);
        ids.push(session);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 4);
    assert_eq!(host.sessions().len(), 4);

    host.shutdown();
    assert_eq!(host.active_sessions(), 0);
    assert_eq!(std::fs::read_dir(root.path())?.count(), 0);
    Ok(())
}

#[test]
fn forks_evolve_independently() -> Result<()> {
    let root = tempfile::tempdir()?;
    let host = host_in(&root);
    let original = host.start_session(REDUNDANT)?;
    host.apply_actions(original, vec!["mem2reg".into()])?;

    let fork = host.fork_session(original)?;
    assert_ne!(fork, original);
    assert_eq!(host.baseline_costs(fork)?, host.baseline_costs(original)?);
    assert_eq!(host.ir(fork)?, host.ir(original)?);

    host.apply_actions(fork, vec!["instcombine".into(), "dce".into()])?;
    assert_eq!(host.action_history(original)?, ["mem2reg"]);
    assert_eq!(host.action_history(fork)?, ["mem2reg", "instcombine", "dce"]);

    host.end_session(original)?;
    assert!(host.ir(fork).is_ok());
    Ok(())
}

#[test]
fn timed_out_request_leaves_session_usable() -> Result<()> {
    let root = tempfile::tempdir()?;
    let host = host_in(&root);
    let session = host.start_session(REDUNDANT)?;

    let err = host
        .observe_within(session, vec![CostFunction::ObjectTextSizeBytes], Duration::ZERO)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let observation = host.observe(session, vec![CostFunction::ObjectTextSizeBytes])?;
    assert!(observation.value(CostFunction::ObjectTextSizeBytes).is_some_and(|size| size > 0.0));
    Ok(())
}

#[test]
fn session_limit_is_enforced() -> Result<()> {
    let root = tempfile::tempdir()?;
    let host = host_with(&root, |config| config.max_sessions = 1);

    let first = host.start_session(REDUNDANT)?;
    let err = host.start_session(REDUNDANT).unwrap_err();
    assert!(matches!(err, GymError::ResourceExhausted(_)), "{err}");

    host.end_session(first)?;
    let second = host.start_session(REDUNDANT)?;
    assert!(second > first);
    Ok(())
}

#[test]
fn failed_creation_frees_its_slot() -> Result<()> {
    let root = tempfile::tempdir()?;
    let host = host_with(&root, |config| config.max_sessions = 1);

    let err = host
        .start_session_with(benchmark("broken", "define i32 @f( {"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Benchmark);
    assert_eq!(host.active_sessions(), 0);

    host.start_session_with(benchmark("redundant", REDUNDANT_IR))?;
    assert_eq!(host.active_sessions(), 1);
    Ok(())
}

#[test]
fn protocol_requests_round_trip_through_the_host() -> Result<()> {
    let root = tempfile::tempdir()?;
    let host = host_in(&root);

    let Reply::SessionStarted { session_id } = host.handle(Request::StartSession {
        benchmark: "tests-v0/redundant".into(),
    }) else {
        anyhow::bail!("session did not start");
    };

    let reply = host.handle(Request::ApplyActions {
        session_id,
        actions: vec![ActionId::from("sroa"), ActionId::from("bogus"), ActionId::from("dce")],
    });
    assert_eq!(
        reply,
        Reply::ActionsApplied {
            applied_count: 0,
            failed_action_index: Some(1),
            error_detail: Some("unknown action `bogus` at index 1".into()),
        }
    );

    let reply = host.handle(Request::GetBaselines { session_id });
    assert!(matches!(reply, Reply::Baselines { ref baselines } if baselines.len() == 6));

    assert!(matches!(
        host.handle(Request::EndSession { session_id }),
        Reply::SessionEnded { .. }
    ));
    assert!(matches!(
        host.handle(Request::GetIr { session_id }),
        Reply::Error {
            kind: ErrorKind::SessionTerminated,
            ..
        }
    ));
    Ok(())
}
