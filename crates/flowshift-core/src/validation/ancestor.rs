use crate::error::PlanViolation;

use super::{PlanContext, Resolved};

/// The closest mapped flow-scope ancestor of the source activity must be mapped
/// to a scope that encloses the target activity. This keeps an instruction from
/// silently moving an activity into an unrelated branch of the target tree.
pub(crate) fn check(ctx: &PlanContext<'_>, resolved: &Resolved<'_>) -> Result<(), PlanViolation> {
    let target_id = resolved.target.id.as_str();
    for ancestor in ctx.source.ancestors(&resolved.source.id) {
        let Some(mapped_scope) = ctx.mapped_target(&ancestor.id) else {
            continue;
        };
        if ctx.target.is_ancestor(mapped_scope, target_id) {
            return Ok(());
        }
        return Err(PlanViolation::AncestorMismatch {
            ancestor: ancestor.id.clone(),
            mapped_scope: mapped_scope.to_string(),
            target_scope: target_id.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::RawInstruction;
    use flowshift_types::ProcessModel;

    #[test]
    fn moving_out_of_a_mapped_scope_fails() {
        let source = ProcessModel::builder("proc:1")
            .sub_process("subProcess", |s| s.user_task("userTask"))
            .build()
            .unwrap();
        let target = ProcessModel::builder("proc:2")
            .sub_process("subProcess", |s| s.manual_task("other"))
            .user_task("userTask")
            .build()
            .unwrap();
        let raw = vec![
            RawInstruction::new("subProcess", "subProcess"),
            RawInstruction::new("userTask", "userTask"),
        ];
        let ctx = PlanContext::new(&source, &target, &raw);
        let resolved = Resolved {
            raw: &raw[1],
            source: source.activity("userTask").unwrap(),
            target: target.activity("userTask").unwrap(),
        };
        assert_eq!(
            check(&ctx, &resolved).unwrap_err().to_string(),
            "The closest mapped ancestor 'subProcess' is mapped to scope 'subProcess' which is not an ancestor of target scope 'userTask'"
        );
    }

    #[test]
    fn unmapped_ancestors_fall_back_to_the_root() {
        let source = ProcessModel::builder("proc:1")
            .sub_process("subProcess", |s| s.user_task("userTask"))
            .build()
            .unwrap();
        let target = ProcessModel::builder("proc:2")
            .user_task("userTask")
            .build()
            .unwrap();
        let raw = vec![RawInstruction::new("userTask", "userTask")];
        let ctx = PlanContext::new(&source, &target, &raw);
        let resolved = Resolved {
            raw: &raw[0],
            source: source.activity("userTask").unwrap(),
            target: target.activity("userTask").unwrap(),
        };
        assert_eq!(check(&ctx, &resolved), Ok(()));
    }
}
