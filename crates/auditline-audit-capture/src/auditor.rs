//! Lifecycle hooks for the persistence layer.

use crate::{Auditable, RecordBuilder};
use auditline_audit_context::{CallerContext, RequestContext};
use auditline_audit_dispatch::Dispatcher;
use auditline_audit_types::AuditAction;
use std::sync::Arc;
use tracing::trace;

/// Called by the persistence wrapper just before an entity is created,
/// updated or removed. Each hook builds one record from the entity and the
/// current [`RequestContext`] and dispatches it.
///
/// Hooks never fail and never panic on dispatch problems; the mutation
/// proceeds regardless.
#[derive(Debug, Clone)]
pub struct EntityAuditor {
    builder: Arc<RecordBuilder>,
    dispatcher: Dispatcher,
}

impl EntityAuditor {
    pub fn new(builder: RecordBuilder, dispatcher: Dispatcher) -> Self {
        Self {
            builder: Arc::new(builder),
            dispatcher,
        }
    }

    pub fn builder(&self) -> &RecordBuilder {
        &self.builder
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub async fn before_create<E: Auditable + ?Sized>(&self, entity: &E) {
        self.record(AuditAction::Create, None, entity).await
    }

    pub async fn before_update<E: Auditable + ?Sized>(&self, entity: &E) {
        self.record(AuditAction::Update, None, entity).await
    }

    pub async fn before_remove<E: Auditable + ?Sized>(&self, entity: &E) {
        self.record(AuditAction::Delete, None, entity).await
    }

    /// Update hook for wrappers that loaded the stored state first.
    pub async fn before_update_with_previous<E: Auditable + ?Sized>(&self, previous: &E, current: &E) {
        self.record(AuditAction::Update, Some(previous), current).await
    }

    /// Remove hook for wrappers that loaded the stored state first.
    pub async fn before_remove_with_previous<E: Auditable + ?Sized>(&self, previous: &E, current: &E) {
        self.record(AuditAction::Delete, Some(previous), current).await
    }

    /// Build and dispatch with the ambient request context.
    pub async fn record<E: Auditable + ?Sized>(&self, action: AuditAction, previous: Option<&E>, current: &E) {
        let caller = RequestContext::current();
        self.record_with_caller(action, previous, current, &caller).await
    }

    /// Build and dispatch with an explicitly passed caller.
    pub async fn record_with_caller<E: Auditable + ?Sized>(
        &self,
        action: AuditAction,
        previous: Option<&E>,
        current: &E,
        caller: &CallerContext,
    ) {
        if !self.dispatcher.is_enabled() {
            trace!(entity = %current.entity_name(), %action, "auditing disabled, hook skipped");
            return;
        }

        let record = self.builder.build_change(previous, current, action, caller);
        self.dispatcher.dispatch(record).await
    }
}
