mod common;

use anyhow::Result;
use inkwell::context::Context;
use llgym::GymError;
use llgym::cost::{BaselinePolicy, CostFunction, compute_baselines, compute_cost};
use llgym::session::WorkingArea;
use llgym::target::CodegenTarget;

use common::{LOOP_IR, REDUNDANT_IR, benchmark};

#[test]
fn every_cell_is_populated() -> Result<()> {
    let root = tempfile::tempdir()?;
    let area = WorkingArea::create(Some(root.path()), "baseline")?;
    let target = CodegenTarget::host()?;
    let context = Context::create();
    let module = benchmark("loop", LOOP_IR).load(&context)?;

    let baselines = compute_baselines(&module, &area, &target)?;

    assert_eq!(baselines.iter().count(), BaselinePolicy::ALL.len() * CostFunction::ALL.len());
    for (policy, cost_function, value) in baselines.iter() {
        assert!(value.is_finite() && value >= 0.0, "{policy} {cost_function}: {value}");
    }
    assert!(area.is_clean());
    Ok(())
}

#[test]
fn unoptimized_baseline_measures_the_module_as_is() -> Result<()> {
    let root = tempfile::tempdir()?;
    let area = WorkingArea::create(Some(root.path()), "baseline")?;
    let target = CodegenTarget::host()?;
    let context = Context::create();
    let module = benchmark("redundant", REDUNDANT_IR).load(&context)?;
    let before = module.print_to_string().to_string();

    let baselines = compute_baselines(&module, &area, &target)?;
    let direct = compute_cost(CostFunction::IrInstructionCount, &module, &area, &target)?;

    assert_eq!(baselines.get(BaselinePolicy::O0, CostFunction::IrInstructionCount), direct);
    assert!(
        baselines.get(BaselinePolicy::Oz, CostFunction::IrInstructionCount)
            <= baselines.get(BaselinePolicy::O0, CostFunction::IrInstructionCount)
    );
    assert!(
        baselines.get(BaselinePolicy::O3, CostFunction::IrInstructionCount)
            < baselines.get(BaselinePolicy::O0, CostFunction::IrInstructionCount)
    );
    assert_eq!(module.print_to_string().to_string(), before);
    Ok(())
}

#[test]
fn losing_the_working_area_fails_the_unoptimized_baseline() -> Result<()> {
    let root = tempfile::tempdir()?;
    let area = WorkingArea::create(Some(root.path()), "baseline")?;
    let target = CodegenTarget::host()?;
    let context = Context::create();
    let module = benchmark("loop", LOOP_IR).load(&context)?;
    std::fs::remove_dir_all(area.path())?;

    let err = compute_baselines(&module, &area, &target).unwrap_err();
    match err {
        GymError::BaselineComputationFailed { policy, reason } => {
            assert_eq!(policy, BaselinePolicy::O0);
            assert!(reason.contains("resource exhausted"), "{reason}");
        }
        other => panic!("expected a baseline failure, got {other}"),
    }
    Ok(())
}
