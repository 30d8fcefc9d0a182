use flowshift_types::{ActivityKind, GatewayKind};

use crate::error::PlanViolation;

use super::{PlanContext, Resolved};

/// Joining gateways keep their arrived tokens only if the join stays in a
/// mapped scope, receives from a single source gateway and has room for every
/// incoming branch.
pub(crate) fn check(ctx: &PlanContext<'_>, resolved: &Resolved<'_>, violations: &mut Vec<PlanViolation>) {
    let (source, target) = (resolved.source, resolved.target);
    if !matches!(
        target.kind,
        ActivityKind::Gateway(GatewayKind::Parallel | GatewayKind::Inclusive)
    ) {
        return;
    }

    if let (Some(source_scope), Some(target_scope)) =
        (source.parent_id.as_deref(), target.parent_id.as_deref())
        && !ctx.is_mapped(source_scope, target_scope)
    {
        violations.push(PlanViolation::GatewayFlowScopeNotMapped {
            flow_scope: source_scope.to_string(),
        });
    }

    if ctx.sources_of(&target.id).len() > 1 {
        violations.push(PlanViolation::GatewayMappedMoreThanOnce {
            target_gateway: target.id.clone(),
        });
    }

    if ctx.target.incoming(&target.id).count() < ctx.source.incoming(&source.id).count() {
        violations.push(PlanViolation::GatewayMissingIncomingFlows);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::RawInstruction;
    use flowshift_types::ProcessModel;

    fn join(id: &str, branches: usize) -> ProcessModel {
        let mut builder = ProcessModel::builder(id).parallel_gateway("join");
        for n in 0..branches {
            let task = format!("task{n}");
            builder = builder
                .user_task(&task)
                .flow(&format!("flow{n}"), &task, "join");
        }
        builder.build().unwrap()
    }

    #[test]
    fn join_with_fewer_incoming_flows_fails() {
        let (source, target) = (join("proc:1", 2), join("proc:2", 1));
        let raw = vec![RawInstruction::new("join", "join")];
        let ctx = PlanContext::new(&source, &target, &raw);
        let resolved = Resolved {
            raw: &raw[0],
            source: source.activity("join").unwrap(),
            target: target.activity("join").unwrap(),
        };
        let mut violations = Vec::new();
        check(&ctx, &resolved, &mut violations);
        assert_eq!(violations, vec![PlanViolation::GatewayMissingIncomingFlows]);
    }

    #[test]
    fn gateway_mapped_twice_fails_on_each_instruction() {
        let source = ProcessModel::builder("proc:1")
            .parallel_gateway("join1")
            .parallel_gateway("join2")
            .build()
            .unwrap();
        let target = join("proc:2", 0);
        let raw = vec![
            RawInstruction::new("join1", "join"),
            RawInstruction::new("join2", "join"),
        ];
        let ctx = PlanContext::new(&source, &target, &raw);
        for (idx, source_id) in ["join1", "join2"].into_iter().enumerate() {
            let resolved = Resolved {
                raw: &raw[idx],
                source: source.activity(source_id).unwrap(),
                target: target.activity("join").unwrap(),
            };
            let mut violations = Vec::new();
            check(&ctx, &resolved, &mut violations);
            assert_eq!(
                violations,
                vec![PlanViolation::GatewayMappedMoreThanOnce {
                    target_gateway: "join".into()
                }]
            );
        }
    }
}
