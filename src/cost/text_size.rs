use std::fs::File;

use inkwell::module::Module;
use inkwell::targets::FileType;
use memmap2::Mmap;
use object::{Object, ObjectSection, SectionKind};

use super::CostFunction;
use crate::error::{GymError, Result};
use crate::session::WorkingArea;
use crate::target::CodegenTarget;

fn backend_error(reason: impl Into<String>) -> GymError {
    GymError::BackendCompilationFailed {
        cost_function: CostFunction::ObjectTextSizeBytes,
        reason: reason.into(),
    }
}

/// Lower a clone of `module` to an object file and sum its code sections.
pub(super) fn object_text_size(
    module: &Module<'_>,
    working_area: &WorkingArea,
    target: &CodegenTarget,
) -> Result<u64> {
    let scratch = working_area.scratch("text-size")?;
    let object_path = scratch.path().join("module.o");

    let snapshot = module.clone();
    target.prepare(&snapshot);
    target
        .machine()
        .write_to_file(&snapshot, FileType::Object, &object_path)
        .map_err(|err| backend_error(format!("object emission failed: {err}")))?;

    let file = File::open(&object_path)
        .map_err(|err| backend_error(format!("failed to open emitted object: {err}")))?;
    // SAFETY: the object file lives in a scratch directory owned by this call
    // and nothing else writes to it while it is mapped.
    let map = unsafe { Mmap::map(&file) }
        .map_err(|err| backend_error(format!("failed to memory-map emitted object: {err}")))?;
    let object = object::File::parse(&*map)
        .map_err(|err| backend_error(format!("unreadable object file: {err}")))?;

    Ok(object
        .sections()
        .filter(|section| section.kind() == SectionKind::Text)
        .map(|section| section.size())
        .sum())
}
