//! Audit trail for permission state changes.
//!
//! Every state-changing store operation emits a `tracing` event on the
//! `"warden::audit"` target carrying a stable `category` field. This module
//! provides a layer that captures those events into a ring buffer, so the
//! hosting bot can show a recent-changes view or stream them elsewhere.
//! Capture is fire-and-forget: a full or unobserved buffer never fails the
//! operation that produced the event.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

/// Target used by all audit events in this crate.
pub const AUDIT_TARGET: &str = "warden::audit";

/// Stable category tags for audit entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditCategory {
    TempPermissions,
    PermissionInheritance,
    ContextPermissions,
    RateLimiter,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::TempPermissions => "TEMP_PERMISSIONS",
            AuditCategory::PermissionInheritance => "PERMISSION_INHERITANCE",
            AuditCategory::ContextPermissions => "CONTEXT_PERMISSIONS",
            AuditCategory::RateLimiter => "RATE_LIMITER",
        }
    }
}

/// A single captured audit entry
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub category: String,
    pub message: String,
}

impl AuditEntry {
    /// Format as a string for display
    pub fn format(&self) -> String {
        format!(
            "{} [{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.category,
            self.message
        )
    }

    /// Format as JSON for export
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "timestamp": self.timestamp.to_rfc3339(),
            "category": self.category,
            "message": self.message
        })
        .to_string()
    }
}

/// Buffer that stores recent audit entries and broadcasts new ones
pub struct AuditBuffer {
    /// Broadcast sender for new entries
    tx: broadcast::Sender<AuditEntry>,
    /// Recent entries (ring buffer)
    recent: parking_lot::RwLock<Vec<AuditEntry>>,
    /// Maximum entries to keep in memory
    max_entries: usize,
}

impl AuditBuffer {
    pub fn new(max_entries: usize) -> Self {
        let (tx, _) = broadcast::channel(1000);
        Self {
            tx,
            recent: parking_lot::RwLock::new(Vec::with_capacity(max_entries)),
            max_entries,
        }
    }

    /// Add an entry
    pub fn push(&self, entry: AuditEntry) {
        {
            let mut recent = self.recent.write();
            if recent.len() >= self.max_entries {
                recent.remove(0);
            }
            recent.push(entry.clone());
        }

        // Broadcast to subscribers (ignore if no receivers)
        let _ = self.tx.send(entry);
    }

    /// Get the most recent entries, oldest first
    pub fn get_recent(&self, count: usize) -> Vec<AuditEntry> {
        let recent = self.recent.read();
        let start = recent.len().saturating_sub(count);
        recent[start..].to_vec()
    }

    /// Subscribe to new entries
    pub fn subscribe(&self) -> broadcast::Receiver<AuditEntry> {
        self.tx.subscribe()
    }
}

/// Shared audit buffer type
pub type SharedAuditBuffer = Arc<AuditBuffer>;

pub fn create_audit_buffer(max_entries: usize) -> SharedAuditBuffer {
    Arc::new(AuditBuffer::new(max_entries))
}

/// Tracing layer that captures audit-target events into the buffer
pub struct AuditCaptureLayer {
    buffer: SharedAuditBuffer,
}

impl AuditCaptureLayer {
    pub fn new(buffer: SharedAuditBuffer) -> Self {
        Self { buffer }
    }
}

impl<S> Layer<S> for AuditCaptureLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != AUDIT_TARGET {
            return;
        }

        let mut visitor = AuditVisitor::default();
        event.record(&mut visitor);

        self.buffer.push(AuditEntry {
            timestamp: chrono::Utc::now(),
            category: visitor.category,
            message: visitor.message,
        });
    }
}

/// Visitor to pull `category` and the message out of audit events
#[derive(Default)]
struct AuditVisitor {
    category: String,
    message: String,
}

impl tracing::field::Visit for AuditVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        } else if field.name() == "category" {
            self.category = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else if field.name() == "category" {
            self.category = value.to_string();
        }
    }
}
