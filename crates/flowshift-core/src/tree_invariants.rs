//! Structural checks for migrated execution trees.
//!
//! A tree is in normal form when:
//! - the root is a scope execution without parent;
//! - parent and child links agree, every execution is reachable from the root
//!   and belongs to the same process instance;
//! - a scope execution runs one activity itself, or has exactly one
//!   non-concurrent scope child, or two or more concurrent children;
//! - a concurrent execution is not a scope and either runs an activity or
//!   hosts exactly one scope execution;
//! - event-scope executions are scope children that take no part in
//!   concurrency.
//!
//! [`check_tree`] collects every violation instead of stopping at the first.

use flowshift_types::{Execution, ExecutionId, ExecutionTree};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TreeViolation {
    MissingRoot,
    RootNotScope { execution: ExecutionId },
    DanglingParent { execution: ExecutionId, parent: ExecutionId },
    /// The parent's child list and the child's parent link disagree.
    LinkMismatch { execution: ExecutionId },
    Unreachable { execution: ExecutionId },
    ForeignExecution { execution: ExecutionId, process_instance_id: String },
    ConcurrentScope { execution: ExecutionId },
    /// A non-scope, non-concurrent execution below the root.
    DetachedExecution { execution: ExecutionId },
    SingleConcurrentChild { execution: ExecutionId },
    MixedConcurrency { execution: ExecutionId },
    NonScopeChild { execution: ExecutionId },
    ConcurrentHostsMany { execution: ExecutionId },
    BusyScope { execution: ExecutionId },
    IdleLeaf { execution: ExecutionId },
}

impl fmt::Display for TreeViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRoot => write!(f, "execution tree has no root"),
            Self::RootNotScope { execution } => {
                write!(f, "root execution '{execution}' is not a scope")
            }
            Self::DanglingParent { execution, parent } => write!(
                f,
                "execution '{execution}' references missing parent '{parent}'"
            ),
            Self::LinkMismatch { execution } => write!(
                f,
                "execution '{execution}' is not listed as a child of its parent"
            ),
            Self::Unreachable { execution } => {
                write!(f, "execution '{execution}' is not reachable from the root")
            }
            Self::ForeignExecution {
                execution,
                process_instance_id,
            } => write!(
                f,
                "execution '{execution}' belongs to process instance '{process_instance_id}'"
            ),
            Self::ConcurrentScope { execution } => {
                write!(f, "concurrent execution '{execution}' is a scope")
            }
            Self::DetachedExecution { execution } => write!(
                f,
                "execution '{execution}' is neither a scope nor concurrent"
            ),
            Self::SingleConcurrentChild { execution } => write!(
                f,
                "scope execution '{execution}' has a single concurrent child"
            ),
            Self::MixedConcurrency { execution } => write!(
                f,
                "scope execution '{execution}' mixes concurrent and non-concurrent children"
            ),
            Self::NonScopeChild { execution } => write!(
                f,
                "scope execution '{execution}' has a single child that is not a scope"
            ),
            Self::ConcurrentHostsMany { execution } => write!(
                f,
                "concurrent execution '{execution}' must host exactly one scope execution"
            ),
            Self::BusyScope { execution } => write!(
                f,
                "scope execution '{execution}' runs an activity and has children"
            ),
            Self::IdleLeaf { execution } => {
                write!(f, "leaf execution '{execution}' runs no activity")
            }
        }
    }
}

/// Check every structural rule of the normal form.
pub fn check_tree(tree: &ExecutionTree) -> Vec<TreeViolation> {
    let Some(root) = tree.root() else {
        return if tree.is_empty() {
            Vec::new()
        } else {
            vec![TreeViolation::MissingRoot]
        };
    };

    let mut violations = Vec::new();
    if !root.is_scope {
        violations.push(TreeViolation::RootNotScope {
            execution: root.id.clone(),
        });
    }
    check_links(tree, root, &mut violations);

    for execution in tree.pre_order() {
        check_children(tree, execution, &mut violations);
    }
    violations
}

fn check_links(tree: &ExecutionTree, root: &Execution, violations: &mut Vec<TreeViolation>) {
    let reachable: HashSet<&ExecutionId> = tree.pre_order().into_iter().map(|e| &e.id).collect();
    for execution in tree.iter() {
        if execution.process_instance_id != root.process_instance_id {
            violations.push(TreeViolation::ForeignExecution {
                execution: execution.id.clone(),
                process_instance_id: execution.process_instance_id.clone(),
            });
        }
        if let Some(parent_id) = &execution.parent_id {
            match tree.get(parent_id) {
                None => violations.push(TreeViolation::DanglingParent {
                    execution: execution.id.clone(),
                    parent: parent_id.clone(),
                }),
                Some(parent) if !parent.children.contains(&execution.id) => {
                    violations.push(TreeViolation::LinkMismatch {
                        execution: execution.id.clone(),
                    })
                }
                Some(_) => {}
            }
        }
        if !reachable.contains(&execution.id) {
            violations.push(TreeViolation::Unreachable {
                execution: execution.id.clone(),
            });
        }
    }
}

fn check_children(tree: &ExecutionTree, execution: &Execution, violations: &mut Vec<TreeViolation>) {
    let id = || execution.id.clone();
    let content: Vec<&Execution> = tree
        .children(&execution.id)
        .filter(|c| !c.is_event_scope)
        .collect();

    if execution.is_event_scope {
        return;
    }
    if execution.is_concurrent {
        if execution.is_scope {
            violations.push(TreeViolation::ConcurrentScope { execution: id() });
        }
        let hosts_one_scope = matches!(content.as_slice(), [only] if only.is_scope && !only.is_concurrent);
        if !content.is_empty() && !hosts_one_scope {
            violations.push(TreeViolation::ConcurrentHostsMany { execution: id() });
        }
        if content.is_empty() && !execution.is_executing() {
            violations.push(TreeViolation::IdleLeaf { execution: id() });
        }
        return;
    }
    if !execution.is_scope {
        violations.push(TreeViolation::DetachedExecution { execution: id() });
        return;
    }

    match content.as_slice() {
        [] => {}
        [only] if only.is_concurrent => {
            violations.push(TreeViolation::SingleConcurrentChild { execution: id() })
        }
        [only] if !only.is_scope => {
            violations.push(TreeViolation::NonScopeChild { execution: id() })
        }
        [_] => {}
        many => {
            if many.iter().any(|c| !c.is_concurrent) {
                violations.push(TreeViolation::MixedConcurrency { execution: id() });
            }
        }
    }
    if !content.is_empty() && execution.is_executing() {
        violations.push(TreeViolation::BusyScope { execution: id() });
    }
}
