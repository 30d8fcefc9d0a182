//! Target-side execution tree.
//!
//! Migration builds the new tree in two passes. [`place`] lays out a tree of
//! [`TargetNode`]s, one per migrating activity, transition and event-scope
//! instance plus one per target scope that has to be created on the way
//! ("emerging" scopes). [`materialize`] then turns that node tree into an
//! [`ExecutionTree`] in normal form:
//!
//! - a scope node owns one scope execution;
//! - a single non-scope child is executed by the scope execution itself;
//! - a single scope child gets a non-concurrent child scope execution;
//! - two or more children each get a concurrent execution, which either runs
//!   the child or hosts the child's scope execution;
//! - event-scope nodes keep their execution and never count as children for
//!   concurrency.
//!
//! Scope executions of migrated scopes keep their ids. Concurrent executions
//! reuse the id of the concurrent execution they replace when it is still free.

use flowshift_types::{
    Execution, ExecutionId, ExecutionTree, IdGenerator, ModelError, PendingTransition,
    ProcessModel,
};
use std::collections::{HashMap, HashSet};

use crate::error::{EntityKind, InstanceValidationReport, InstanceViolation};
use crate::matcher::MatchedInstance;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Scope,
    Leaf,
    Transition(PendingTransition),
    EventScope,
}

/// What a target node was derived from; indices point into the source
/// activity-instance view.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeOrigin {
    Root,
    ActivityInstance(usize),
    Transition(usize),
    EventScope(usize),
    Emerging,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TargetNode {
    pub activity_id: String,
    pub kind: NodeKind,
    pub origin: NodeOrigin,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Kept for migrated instances; assigned during materialization for emerging scopes.
    pub activity_instance_id: Option<String>,
    /// Scope execution id to keep.
    pub reuse_execution: Option<ExecutionId>,
    /// Concurrent execution the node ran under in the source tree.
    pub reuse_concurrent: Option<ExecutionId>,
    pub scope_execution: Option<ExecutionId>,
    /// Execution that runs the node's activity or transition.
    pub executing_execution: Option<ExecutionId>,
}

impl TargetNode {
    pub fn new(activity_id: impl Into<String>, kind: NodeKind, origin: NodeOrigin) -> Self {
        Self {
            activity_id: activity_id.into(),
            kind,
            origin,
            parent: None,
            children: Vec::new(),
            activity_instance_id: None,
            reuse_execution: None,
            reuse_concurrent: None,
            scope_execution: None,
            executing_execution: None,
        }
    }

    pub fn is_emerging(&self) -> bool {
        self.origin == NodeOrigin::Emerging
    }

    /// Whether the node owns a scope execution hosting boundary and event-subprocess triggers.
    pub fn owns_scope(&self) -> bool {
        matches!(self.kind, NodeKind::Root | NodeKind::Scope)
    }
}

#[derive(Clone, Debug, Default)]
pub struct TargetTree {
    pub nodes: Vec<TargetNode>,
    instance_nodes: HashMap<usize, usize>,
    transition_nodes: HashMap<usize, usize>,
    event_scope_nodes: HashMap<usize, usize>,
}

impl TargetTree {
    pub fn with_root(
        activity_id: impl Into<String>,
        activity_instance_id: Option<String>,
        execution: Option<ExecutionId>,
    ) -> Self {
        let mut root = TargetNode::new(activity_id, NodeKind::Root, NodeOrigin::Root);
        root.activity_instance_id = activity_instance_id;
        root.reuse_execution = execution;
        let mut tree = Self {
            nodes: vec![root],
            ..Self::default()
        };
        tree.instance_nodes.insert(0, 0);
        tree
    }

    pub fn node(&self, idx: usize) -> Option<&TargetNode> {
        self.nodes.get(idx)
    }

    pub fn node_of_instance(&self, instance: usize) -> Option<usize> {
        self.instance_nodes.get(&instance).copied()
    }

    pub fn node_of_transition(&self, transition: usize) -> Option<usize> {
        self.transition_nodes.get(&transition).copied()
    }

    pub fn node_of_event_scope(&self, event_scope: usize) -> Option<usize> {
        self.event_scope_nodes.get(&event_scope).copied()
    }

    pub fn pre_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = if self.nodes.is_empty() { vec![] } else { vec![0] };
        while let Some(idx) = stack.pop() {
            order.push(idx);
            stack.extend(self.nodes[idx].children.iter().rev());
        }
        order
    }

    /// Closest activity-instance origin at or above `idx`, for error reporting.
    pub fn reporting_origin(&self, idx: usize) -> Option<usize> {
        let mut current = Some(idx);
        while let Some(i) = current {
            let node = self.nodes.get(i)?;
            match node.origin {
                NodeOrigin::Root => return Some(0),
                NodeOrigin::ActivityInstance(instance) => return Some(instance),
                _ => current = node.parent,
            }
        }
        None
    }

    pub fn push_child(&mut self, parent: usize, mut node: TargetNode) -> usize {
        let idx = self.nodes.len();
        node.parent = Some(parent);
        self.nodes.push(node);
        self.nodes[parent].children.push(idx);
        idx
    }

    /// Attach `node` below `parent`, creating emerging scopes for every target
    /// flow scope in between. Emerging scopes are shared between siblings;
    /// migrated scopes never are.
    pub fn attach(
        &mut self,
        model: &ProcessModel,
        parent: usize,
        node: TargetNode,
    ) -> Result<usize, InstanceViolation> {
        let parent_activity = self.nodes[parent].activity_id.clone();
        let chain = model.ancestors(&node.activity_id);
        let Some(pos) = chain.iter().position(|a| a.id == parent_activity) else {
            return Err(InstanceViolation::TargetScopeUnreachable {
                target_activity: node.activity_id,
                scope: parent_activity,
            });
        };

        let path: Vec<String> = chain[..pos].iter().rev().map(|a| a.id.clone()).collect();
        let scope = self.emerge(parent, &path);
        Ok(self.push_child(scope, node))
    }

    /// Node of target scope `scope_id` below `parent`, entering every scope on the way.
    pub fn enter_scope(
        &mut self,
        model: &ProcessModel,
        parent: usize,
        scope_id: &str,
    ) -> Result<usize, InstanceViolation> {
        let parent_activity = self.nodes[parent].activity_id.clone();
        if scope_id == parent_activity {
            return Ok(parent);
        }
        let chain = model.ancestors(scope_id);
        let Some(pos) = chain.iter().position(|a| a.id == parent_activity) else {
            return Err(InstanceViolation::TargetScopeUnreachable {
                target_activity: scope_id.to_string(),
                scope: parent_activity,
            });
        };
        let mut path: Vec<String> = chain[..pos].iter().rev().map(|a| a.id.clone()).collect();
        path.push(scope_id.to_string());
        Ok(self.emerge(parent, &path))
    }

    fn emerge(&mut self, parent: usize, path: &[String]) -> usize {
        let mut current = parent;
        for scope in path {
            let existing = self.nodes[current].children.iter().copied().find(|c| {
                let child = &self.nodes[*c];
                child.is_emerging() && &child.activity_id == scope
            });
            current = match existing {
                Some(idx) => idx,
                None => self.push_child(
                    current,
                    TargetNode::new(scope.clone(), NodeKind::Scope, NodeOrigin::Emerging),
                ),
            };
        }
        current
    }
}

/// Lay out the target node tree for a matched instance.
pub fn place(
    matched: &MatchedInstance,
    source_tree: &ExecutionTree,
    target: &ProcessModel,
    report: &mut InstanceValidationReport,
) -> TargetTree {
    let view = &matched.view;
    let Some(root) = view.instances.first() else {
        return TargetTree::default();
    };
    let mut tree = TargetTree::with_root(
        target.id(),
        Some(root.id.clone()),
        root.execution_ids.first().cloned(),
    );

    let concurrent = |id: Option<&ExecutionId>| {
        id.and_then(|e| source_tree.get(e))
            .filter(|e| e.is_concurrent)
            .map(|e| e.id.clone())
    };

    for (idx, instance) in view.instances.iter().enumerate().skip(1) {
        let Some(target_id) = matched.instance_target(idx) else {
            continue;
        };
        let parent = instance
            .parent
            .map(|p| matched.migrating_ancestor(p))
            .unwrap_or(0);
        let Some(parent_node) = tree.node_of_instance(parent) else {
            continue;
        };

        let is_scope = target.activity(target_id).is_some_and(|a| a.is_scope);
        let kind = if is_scope { NodeKind::Scope } else { NodeKind::Leaf };
        let mut node = TargetNode::new(target_id, kind, NodeOrigin::ActivityInstance(idx));
        node.activity_instance_id = Some(instance.id.clone());
        let own = instance.execution_ids.first();
        if instance.is_scope_instance {
            if is_scope {
                node.reuse_execution = own.cloned();
            }
            node.reuse_concurrent =
                concurrent(own.and_then(|e| source_tree.get(e)).and_then(|e| e.parent_id.as_ref()));
        } else {
            node.reuse_concurrent = concurrent(own);
        }

        match tree.attach(target, parent_node, node) {
            Ok(n) => {
                tree.instance_nodes.insert(idx, n);
            }
            Err(violation) => report.add(
                EntityKind::ActivityInstance,
                &instance.id,
                &instance.activity_id,
                violation,
            ),
        }
    }

    for (idx, transition) in view.transitions.iter().enumerate() {
        let Some(instruction) = matched.transitions.get(idx).and_then(Option::as_ref) else {
            continue;
        };
        let Some(parent_node) = tree.node_of_instance(matched.migrating_ancestor(transition.parent))
        else {
            continue;
        };
        let pending = PendingTransition {
            phase: transition.phase.clone(),
            instantiating: transition.instantiating,
        };
        let mut node = TargetNode::new(
            instruction.target_activity_id.clone(),
            NodeKind::Transition(pending),
            NodeOrigin::Transition(idx),
        );
        node.reuse_concurrent = concurrent(Some(&transition.execution_id));

        match tree.attach(target, parent_node, node) {
            Ok(n) => {
                tree.transition_nodes.insert(idx, n);
            }
            Err(violation) => report.add(
                EntityKind::TransitionInstance,
                &transition.id,
                &transition.activity_id,
                violation,
            ),
        }
    }

    // Event scopes stay with their closest migrating ancestor and never create scopes.
    for (idx, scope) in view.event_scopes.iter().enumerate() {
        let Some(instruction) = matched.event_scopes.get(idx).and_then(Option::as_ref) else {
            continue;
        };
        let parent_node = match scope.parent_event_scope {
            Some(parent) => tree.node_of_event_scope(parent),
            None => tree.node_of_instance(matched.migrating_ancestor(scope.parent)),
        };
        let Some(parent_node) = parent_node else {
            continue;
        };
        let mut node = TargetNode::new(
            instruction.target_activity_id.clone(),
            NodeKind::EventScope,
            NodeOrigin::EventScope(idx),
        );
        node.reuse_execution = Some(scope.execution_id.clone());
        node.activity_instance_id = source_tree
            .get(&scope.execution_id)
            .and_then(|e| e.scope_instance_id.clone());
        let n = tree.push_child(parent_node, node);
        tree.event_scope_nodes.insert(idx, n);
    }

    tree
}

/// Build the execution tree for `tree`, recording each node's executions on the node.
pub fn materialize(
    tree: &mut TargetTree,
    process_instance_id: &str,
    process_definition_id: &str,
    ids: &mut IdGenerator,
) -> Result<ExecutionTree, ModelError> {
    let mut builder = Materializer {
        used: tree
            .nodes
            .iter()
            .filter_map(|n| n.reuse_execution.clone())
            .collect(),
        executions: ExecutionTree::new(),
        process_instance_id,
        process_definition_id,
        ids,
    };
    if tree.nodes.is_empty() {
        return Ok(builder.executions);
    }

    let root = &mut tree.nodes[0];
    let root_id = match root.reuse_execution.clone() {
        Some(id) => id,
        None => builder.ids.next_execution_id(),
    };
    let instance_id = root
        .activity_instance_id
        .get_or_insert_with(|| process_instance_id.to_string())
        .clone();
    let mut execution = builder.execution(root_id.clone(), None);
    execution.is_scope = true;
    execution.scope_activity_id = Some(root.activity_id.clone());
    execution.scope_instance_id = Some(instance_id);
    builder.executions.insert_root(execution)?;
    root.scope_execution = Some(root_id);

    let mut stack = vec![0];
    while let Some(idx) = stack.pop() {
        builder.layout(tree, idx, &mut stack)?;
    }
    Ok(builder.executions)
}

struct Materializer<'a> {
    used: HashSet<ExecutionId>,
    executions: ExecutionTree,
    process_instance_id: &'a str,
    process_definition_id: &'a str,
    ids: &'a mut IdGenerator,
}

impl Materializer<'_> {
    fn execution(&self, id: ExecutionId, parent: Option<ExecutionId>) -> Execution {
        Execution::new(id, parent, self.process_instance_id, self.process_definition_id)
    }

    /// Lay out the children of a node whose scope execution already exists.
    fn layout(
        &mut self,
        tree: &mut TargetTree,
        idx: usize,
        stack: &mut Vec<usize>,
    ) -> Result<(), ModelError> {
        let Some(scope_execution) = tree.nodes[idx].scope_execution.clone() else {
            return Ok(());
        };
        let (event_scopes, content): (Vec<usize>, Vec<usize>) = tree.nodes[idx]
            .children
            .iter()
            .partition(|c| tree.nodes[**c].kind == NodeKind::EventScope);

        for child in event_scopes {
            self.create_event_scope(tree, child, &scope_execution)?;
            stack.push(child);
        }

        match content.as_slice() {
            [] => {
                let node = &mut tree.nodes[idx];
                if matches!(node.origin, NodeOrigin::ActivityInstance(_)) {
                    let activity_instance_id = node.activity_instance_id.clone();
                    let activity_id = node.activity_id.clone();
                    node.executing_execution = Some(scope_execution.clone());
                    if let Some(execution) = self.executions.get_mut(&scope_execution) {
                        execution.activity_id = Some(activity_id);
                        execution.activity_instance_id = activity_instance_id;
                        execution.is_active = true;
                    }
                }
            }
            [only] => {
                if tree.nodes[*only].kind == NodeKind::Scope {
                    self.create_scope(tree, *only, &scope_execution)?;
                    stack.push(*only);
                } else {
                    self.execute(tree, *only, &scope_execution);
                }
            }
            many => {
                for child in many {
                    let concurrent_id = match tree.nodes[*child].reuse_concurrent.clone() {
                        Some(id) if self.used.insert(id.clone()) => id,
                        _ => self.ids.next_execution_id(),
                    };
                    let mut execution =
                        self.execution(concurrent_id.clone(), Some(scope_execution.clone()));
                    execution.is_concurrent = true;
                    self.executions.insert_child(execution)?;

                    if tree.nodes[*child].kind == NodeKind::Scope {
                        self.create_scope(tree, *child, &concurrent_id)?;
                        stack.push(*child);
                    } else {
                        self.execute(tree, *child, &concurrent_id);
                    }
                }
            }
        }
        Ok(())
    }

    fn create_scope(
        &mut self,
        tree: &mut TargetTree,
        idx: usize,
        parent: &ExecutionId,
    ) -> Result<(), ModelError> {
        let node = &mut tree.nodes[idx];
        let id = match node.reuse_execution.clone() {
            Some(id) => id,
            None => self.ids.next_execution_id(),
        };
        let instance_id = match node.activity_instance_id.clone() {
            Some(instance) => instance,
            None => {
                let instance = self.ids.next_activity_instance_id(&node.activity_id);
                node.activity_instance_id = Some(instance.clone());
                instance
            }
        };
        let mut execution = self.execution(id.clone(), Some(parent.clone()));
        execution.is_scope = true;
        execution.scope_activity_id = Some(node.activity_id.clone());
        execution.scope_instance_id = Some(instance_id);
        self.executions.insert_child(execution)?;
        node.scope_execution = Some(id);
        Ok(())
    }

    fn create_event_scope(
        &mut self,
        tree: &mut TargetTree,
        idx: usize,
        parent: &ExecutionId,
    ) -> Result<(), ModelError> {
        let node = &mut tree.nodes[idx];
        let id = match node.reuse_execution.clone() {
            Some(id) => id,
            None => self.ids.next_execution_id(),
        };
        let mut execution = self.execution(id.clone(), Some(parent.clone()));
        execution.is_scope = true;
        execution.is_event_scope = true;
        execution.activity_id = Some(node.activity_id.clone());
        execution.scope_activity_id = Some(node.activity_id.clone());
        execution.scope_instance_id = node.activity_instance_id.clone();
        self.executions.insert_child(execution)?;
        node.scope_execution = Some(id);
        Ok(())
    }

    fn execute(&mut self, tree: &mut TargetTree, idx: usize, execution_id: &ExecutionId) {
        let node = &mut tree.nodes[idx];
        node.executing_execution = Some(execution_id.clone());
        let Some(execution) = self.executions.get_mut(execution_id) else {
            return;
        };
        execution.activity_id = Some(node.activity_id.clone());
        execution.is_active = true;
        match &node.kind {
            NodeKind::Transition(pending) => {
                execution.transition = Some(pending.clone());
                execution.activity_instance_id = None;
            }
            _ => execution.activity_instance_id = node.activity_instance_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::match_instance;
    use crate::plan::MigrationPlanBuilder;
    use crate::snapshot_builder::SnapshotBuilder;
    use flowshift_types::ActivityInstanceTree;
    use std::sync::Arc;

    fn migrate_tree(
        source: &Arc<ProcessModel>,
        target: &Arc<ProcessModel>,
        pairs: &[(&str, &str)],
        active: &[&str],
    ) -> (ExecutionTree, ExecutionTree, TargetTree) {
        let plan = pairs
            .iter()
            .fold(
                MigrationPlanBuilder::new(source.clone(), target.clone()),
                |b, (s, t)| b.map_activities(*s, *t),
            )
            .build()
            .unwrap();
        let snapshot = active
            .iter()
            .fold(SnapshotBuilder::new(source, "pi"), |b, a| b.active(*a))
            .build()
            .unwrap();
        let mut report = InstanceValidationReport::new("pi");
        let matched = match_instance(&plan, source, target, &snapshot, &mut report);
        let mut tree = place(&matched, &snapshot.executions, target, &mut report);
        assert!(!report.has_failures(), "{report}");
        let mut ids = IdGenerator::new("pi").with_taken(snapshot.used_ids());
        let executions = materialize(&mut tree, "pi", target.id(), &mut ids).unwrap();
        (snapshot.executions.clone(), executions, tree)
    }

    #[test]
    fn adding_a_sub_process_inserts_one_scope_execution() {
        let source = Arc::new(ProcessModel::builder("proc:1").user_task("userTask").build().unwrap());
        let target = Arc::new(
            ProcessModel::builder("proc:2")
                .sub_process("subProcess", |s| s.user_task("userTask"))
                .build()
                .unwrap(),
        );
        let (before, after, tree) =
            migrate_tree(&source, &target, &[("userTask", "userTask")], &["userTask"]);

        assert_eq!(before.len(), 1);
        assert_eq!(after.len(), 2);
        assert_eq!(after.root_id(), before.root_id());
        insta::assert_snapshot!(ActivityInstanceTree::derive(&after).render(), @r"
        proc:2
          subProcess
            userTask
        ");
        let task = tree
            .nodes
            .iter()
            .find(|n| n.activity_id == "userTask")
            .unwrap();
        let before_task = ActivityInstanceTree::derive(&before);
        assert_eq!(
            task.activity_instance_id.as_deref(),
            Some(before_task.by_activity("userTask")[0].id.as_str())
        );
    }

    #[test]
    fn removing_a_sub_process_compacts_into_the_root() {
        let source = Arc::new(
            ProcessModel::builder("proc:1")
                .sub_process("subProcess", |s| s.user_task("userTask"))
                .build()
                .unwrap(),
        );
        let target = Arc::new(ProcessModel::builder("proc:2").user_task("userTask").build().unwrap());
        let (_, after, _) = migrate_tree(&source, &target, &[("userTask", "userTask")], &["userTask"]);

        assert_eq!(after.len(), 1);
        let root = after.root().unwrap();
        assert_eq!(root.activity_id.as_deref(), Some("userTask"));
        assert_eq!(root.process_definition_id, "proc:2");
    }

    #[test]
    fn siblings_share_emerging_scope_but_keep_concurrency() {
        let source = Arc::new(
            ProcessModel::builder("proc:1")
                .user_task("userTask1")
                .user_task("userTask2")
                .build()
                .unwrap(),
        );
        let target = Arc::new(
            ProcessModel::builder("proc:2")
                .sub_process("subProcess", |s| s.user_task("userTask1").user_task("userTask2"))
                .build()
                .unwrap(),
        );
        let (before, after, _) = migrate_tree(
            &source,
            &target,
            &[("userTask1", "userTask1"), ("userTask2", "userTask2")],
            &["userTask1", "userTask2"],
        );

        insta::assert_snapshot!(ActivityInstanceTree::derive(&after).render(), @r"
        proc:2
          subProcess
            userTask1
            userTask2
        ");
        // root, sub process scope, two concurrent executions
        assert_eq!(after.len(), 4);
        let source_concurrent: HashSet<_> = before
            .iter()
            .filter(|e| e.is_concurrent)
            .map(|e| e.id.clone())
            .collect();
        let target_concurrent: HashSet<_> = after
            .iter()
            .filter(|e| e.is_concurrent)
            .map(|e| e.id.clone())
            .collect();
        similar_asserts::assert_eq!(source_concurrent, target_concurrent);
    }

    #[test]
    fn scope_executions_keep_their_ids() {
        let model = Arc::new(
            ProcessModel::builder("proc:1")
                .sub_process("subProcess", |s| s.user_task("userTask"))
                .build()
                .unwrap(),
        );
        let target = Arc::new(
            ProcessModel::builder("proc:2")
                .sub_process("subProcess", |s| s.user_task("userTask"))
                .build()
                .unwrap(),
        );
        let (before, after, _) = migrate_tree(
            &model,
            &target,
            &[("subProcess", "subProcess"), ("userTask", "userTask")],
            &["userTask"],
        );
        let ids = |tree: &ExecutionTree| tree.iter().map(|e| e.id.clone()).collect::<HashSet<_>>();
        assert_eq!(ids(&before), ids(&after));
    }
}
