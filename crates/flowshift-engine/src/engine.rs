use chrono::{DateTime, Utc};
use flowshift_core::{
    ExpressionResolver, MigratedInstance, MigrationContext, MigrationOptions, MigrationPlan,
    MigrationPlanBuilder, MigrationStep, NoopListener, PlaceholderResolver,
    ScopeLifecycleListener,
};
use flowshift_types::ProcessModel;
use rayon::ThreadPool;
use rayon::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, info_span, warn};
use uuid::Uuid;

use crate::audit::{AuditSink, batch_entries};
use crate::config::MigrationConfig;
use crate::error::MigrationError;
use crate::repository::ModelRepository;
use crate::store::InstanceStore;

#[derive(Debug)]
pub struct InstanceFailure {
    pub process_instance_id: String,
    pub error: MigrationError,
}

/// Result of one batch. Instances are independent: a failure never undoes a commit.
#[derive(Debug)]
pub struct BatchOutcome {
    pub correlation_id: Uuid,
    pub committed: Vec<String>,
    pub failures: Vec<InstanceFailure>,
    /// Set when the batch stopped before every instance was attempted.
    pub aborted: bool,
}

impl BatchOutcome {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.aborted
    }

    pub fn failure_of(&self, process_instance_id: &str) -> Option<&MigrationError> {
        self.failures
            .iter()
            .find(|f| f.process_instance_id == process_instance_id)
            .map(|f| &f.error)
    }
}

pub struct MigrationEngine {
    models: Arc<dyn ModelRepository>,
    store: Arc<dyn InstanceStore>,
    audit: Arc<dyn AuditSink>,
    listener: Arc<dyn ScopeLifecycleListener>,
    resolver: Arc<dyn ExpressionResolver>,
    config: MigrationConfig,
    pool: ThreadPool,
}

impl MigrationEngine {
    pub fn new(
        config: MigrationConfig,
        models: Arc<dyn ModelRepository>,
        store: Arc<dyn InstanceStore>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, MigrationError> {
        let pool = config.build_pool()?;
        Ok(Self {
            models,
            store,
            audit,
            listener: Arc::new(NoopListener),
            resolver: Arc::new(PlaceholderResolver),
            config,
            pool,
        })
    }

    pub fn with_listener(mut self, listener: Arc<dyn ScopeLifecycleListener>) -> Self {
        self.listener = listener;
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ExpressionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Start a plan between two deployed definitions.
    pub fn create_migration_plan(
        &self,
        source_definition_id: Option<&str>,
        target_definition_id: Option<&str>,
    ) -> Result<MigrationPlanBuilder, MigrationError> {
        let source_id = source_definition_id.ok_or(MigrationError::SourceDefinitionIdNull)?;
        let target_id = target_definition_id.ok_or(MigrationError::TargetDefinitionIdNull)?;
        let (source, target) = self.models_for(source_id, target_id)?;
        Ok(MigrationPlanBuilder::new(source, target))
    }

    pub fn migrate(
        &self,
        plan: &MigrationPlan,
        process_instance_ids: &[String],
        options: MigrationOptions,
    ) -> Result<BatchOutcome, MigrationError> {
        self.migrate_batch(plan, process_instance_ids, options, &AtomicBool::new(false))
    }

    /// Migrate every running instance of the plan's source definition.
    pub fn migrate_query(
        &self,
        plan: &MigrationPlan,
        options: MigrationOptions,
    ) -> Result<BatchOutcome, MigrationError> {
        let ids = self.store.find_by_definition(plan.source_model_id());
        self.migrate(plan, &ids, options)
    }

    /// Migrate `process_instance_ids` chunk by chunk on the worker pool.
    ///
    /// `abort` is checked before every chunk; instances committed before the
    /// abort stay committed.
    pub fn migrate_batch(
        &self,
        plan: &MigrationPlan,
        process_instance_ids: &[String],
        options: MigrationOptions,
        abort: &AtomicBool,
    ) -> Result<BatchOutcome, MigrationError> {
        let (source, target) = self.models_for(plan.source_model_id(), plan.target_model_id())?;
        let correlation_id = Uuid::new_v4();
        let span = info_span!(
            "migration_batch",
            %correlation_id,
            source = plan.source_model_id(),
            target = plan.target_model_id(),
            instances = process_instance_ids.len()
        );
        let _entered = span.enter();

        let now = self.config.get_clock().now();
        let ctx = self.context(plan, &source, &target, options, now);
        let mut outcome = BatchOutcome {
            correlation_id,
            committed: Vec::new(),
            failures: Vec::new(),
            aborted: false,
        };

        for chunk in process_instance_ids.chunks(self.config.get_chunk_size()) {
            if abort.load(Ordering::Acquire) {
                outcome.aborted = true;
                warn!(
                    attempted = outcome.committed.len() + outcome.failures.len(),
                    "migration batch aborted"
                );
                break;
            }
            let results: Vec<(&String, Result<MigratedInstance, MigrationError>)> =
                self.pool.install(|| {
                    chunk
                        .par_iter()
                        .map(|id| (id, span.in_scope(|| self.migrate_one(&ctx, id))))
                        .collect()
                });
            for (id, result) in results {
                match result {
                    Ok(_) => outcome.committed.push(id.clone()),
                    Err(error) => outcome.failures.push(InstanceFailure {
                        process_instance_id: id.clone(),
                        error,
                    }),
                }
            }
        }

        if !outcome.committed.is_empty() {
            self.audit.record(batch_entries(
                correlation_id,
                source.id(),
                target.id(),
                outcome.committed.len(),
            ));
        }
        info!(
            committed = outcome.committed.len(),
            failed = outcome.failures.len(),
            aborted = outcome.aborted,
            "migration batch finished"
        );
        Ok(outcome)
    }

    /// Migrate a single instance, failing with its error instead of a batch outcome.
    pub fn migrate_instance(
        &self,
        plan: &MigrationPlan,
        process_instance_id: &str,
        options: MigrationOptions,
    ) -> Result<MigratedInstance, MigrationError> {
        let (source, target) = self.models_for(plan.source_model_id(), plan.target_model_id())?;
        let ctx = self.context(plan, &source, &target, options, self.config.get_clock().now());
        let migrated = self.migrate_one(&ctx, process_instance_id)?;
        self.audit
            .record(batch_entries(Uuid::new_v4(), source.id(), target.id(), 1));
        Ok(migrated)
    }

    fn models_for(
        &self,
        source_id: &str,
        target_id: &str,
    ) -> Result<(Arc<ProcessModel>, Arc<ProcessModel>), MigrationError> {
        let source = self
            .models
            .find(source_id)
            .ok_or_else(|| MigrationError::SourceDefinitionMissing(source_id.to_string()))?;
        let target = self
            .models
            .find(target_id)
            .ok_or_else(|| MigrationError::TargetDefinitionMissing(target_id.to_string()))?;
        Ok((source, target))
    }

    fn context<'a>(
        &'a self,
        plan: &'a MigrationPlan,
        source: &'a ProcessModel,
        target: &'a ProcessModel,
        options: MigrationOptions,
        now: DateTime<Utc>,
    ) -> MigrationContext<'a> {
        MigrationContext::new(plan, source, target)
            .with_options(options)
            .with_now(now)
            .with_resolver(self.resolver.as_ref())
            .with_listener(self.listener.as_ref())
            .with_default_job_retries(self.config.get_default_job_retries())
            .with_verify_tree(self.config.get_verify_tree())
    }

    fn migrate_one(
        &self,
        ctx: &MigrationContext<'_>,
        process_instance_id: &str,
    ) -> Result<MigratedInstance, MigrationError> {
        let snapshot = self
            .store
            .load(process_instance_id)
            .ok_or_else(|| MigrationError::InstanceNotFound(process_instance_id.to_string()))?;
        let mut migrated = flowshift_core::migrate_instance(ctx, &snapshot)?;
        self.store
            .commit(migrated.snapshot.clone())
            .map_err(|e| MigrationError::Store {
                process_instance_id: process_instance_id.to_string(),
                message: e.to_string(),
            })?;
        migrated.progress.advance(MigrationStep::Commit)?;
        debug!(
            process_instance_id,
            executions = migrated.snapshot.executions.len(),
            "committed process instance"
        );
        Ok(migrated)
    }
}
