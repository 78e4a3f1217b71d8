//! # Audit Seam
//!
//! Queries are audited when they are about to execute (create, or a
//! duplicate/reset that yields a running query), never on define. Transport
//! of audit records is outside this crate; the default sink logs through
//! tracing.
//!
//! An audit failure aborts the operation before any state mutation.

use crate::error::Result;
use crate::models::QueryDefinition;
use async_trait::async_trait;
use uuid::Uuid;

/// Sink for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, query_id: Uuid, query: &QueryDefinition) -> Result<()>;
}

/// Default sink emitting audit records as structured log events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAuditSink;

#[async_trait]
impl AuditSink for LoggingAuditSink {
    async fn record(&self, query_id: Uuid, query: &QueryDefinition) -> Result<()> {
        tracing::info!(
            %query_id,
            query_logic = %query.query_logic_name,
            owner = %query.owner,
            user_dn = %query.user_dn,
            query = %query.query,
            visibility = %query.visibility,
            "audit: query submitted for execution"
        );
        Ok(())
    }
}
