//! The immutable audit record.

use crate::{AuditAction, AuditRecordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form metadata attached to a record.
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// One audited entity mutation: who changed what, when, and from where.
///
/// Fields are private and there are no setters. A correction is a new
/// record. Serialized as a single camelCase JSON object; absent values are
/// written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    id: AuditRecordId,
    entity_name: String,
    entity_id: Option<String>,
    action: AuditAction,
    changed_by: Option<String>,
    #[serde(rename = "sourceIp")]
    source_address: Option<String>,
    #[serde(rename = "requestUri")]
    request_path: Option<String>,
    old_value: Option<String>,
    new_value: Option<String>,
    service_name: String,
    compliance_tag: String,
    #[serde(with = "crate::timestamp")]
    timestamp: DateTime<Utc>,
    #[serde(default)]
    metadata: Option<Metadata>,
}

impl AuditRecord {
    /// Start building a record for the given entity and action.
    pub fn builder(entity_name: impl Into<String>, action: AuditAction) -> AuditRecordBuilder {
        AuditRecordBuilder::new(entity_name, action)
    }

    /// Unique record identifier.
    pub fn id(&self) -> AuditRecordId {
        self.id
    }

    /// Name of the mutated entity type.
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Identifier of the mutated entity, if it exposes one.
    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn action(&self) -> AuditAction {
        self.action
    }

    /// Acting user copied from the request context.
    pub fn changed_by(&self) -> Option<&str> {
        self.changed_by.as_deref()
    }

    pub fn source_address(&self) -> Option<&str> {
        self.source_address.as_deref()
    }

    pub fn request_path(&self) -> Option<&str> {
        self.request_path.as_deref()
    }

    /// Serialized snapshot of the entity before the mutation.
    pub fn old_value(&self) -> Option<&str> {
        self.old_value.as_deref()
    }

    /// Serialized snapshot of the entity as handed to the hook.
    pub fn new_value(&self) -> Option<&str> {
        self.new_value.as_deref()
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn compliance_tag(&self) -> &str {
        &self.compliance_tag
    }

    /// Moment the mutation was detected.
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    /// Serialize to the persisted JSON document.
    pub fn to_document(&self) -> Result<serde_json::Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    /// Serialize to the persisted JSON text (one object, no trailing newline).
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a persisted JSON document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Builder for constructing audit records.
///
/// `build` assigns the id and captures the timestamp; nothing about the
/// record can change afterwards.
#[derive(Debug, Clone)]
pub struct AuditRecordBuilder {
    entity_name: String,
    entity_id: Option<String>,
    action: AuditAction,
    changed_by: Option<String>,
    source_address: Option<String>,
    request_path: Option<String>,
    old_value: Option<String>,
    new_value: Option<String>,
    service_name: String,
    compliance_tag: String,
    timestamp: Option<DateTime<Utc>>,
    metadata: Metadata,
}

impl AuditRecordBuilder {
    /// Default service name when none is configured.
    pub const DEFAULT_SERVICE_NAME: &'static str = "default-service";
    /// Default compliance tag when none is configured.
    pub const DEFAULT_COMPLIANCE_TAG: &'static str = "GENERAL";

    /// Create a new builder.
    pub fn new(entity_name: impl Into<String>, action: AuditAction) -> Self {
        Self {
            entity_name: entity_name.into(),
            entity_id: None,
            action,
            changed_by: None,
            source_address: None,
            request_path: None,
            old_value: None,
            new_value: None,
            service_name: Self::DEFAULT_SERVICE_NAME.to_string(),
            compliance_tag: Self::DEFAULT_COMPLIANCE_TAG.to_string(),
            timestamp: None,
            metadata: Metadata::new(),
        }
    }

    pub fn entity_id(mut self, id: Option<String>) -> Self {
        self.entity_id = id;
        self
    }

    pub fn changed_by(mut self, user: Option<String>) -> Self {
        self.changed_by = user;
        self
    }

    pub fn source_address(mut self, address: Option<String>) -> Self {
        self.source_address = address;
        self
    }

    pub fn request_path(mut self, path: Option<String>) -> Self {
        self.request_path = path;
        self
    }

    pub fn old_value(mut self, snapshot: Option<String>) -> Self {
        self.old_value = snapshot;
        self
    }

    pub fn new_value(mut self, snapshot: Option<String>) -> Self {
        self.new_value = snapshot;
        self
    }

    pub fn service_name(mut self, name: impl Into<String>) -> Self {
        self.service_name = name.into();
        self
    }

    pub fn compliance_tag(mut self, tag: impl Into<String>) -> Self {
        self.compliance_tag = tag.into();
        self
    }

    /// Override the detection time (defaults to the moment `build` runs).
    pub fn timestamp(mut self, ts: DateTime<Utc>) -> Self {
        self.timestamp = Some(ts);
        self
    }

    /// Add a metadata entry. Values that fail to serialize are skipped.
    pub fn metadata(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        if let Ok(json) = serde_json::to_value(value) {
            self.metadata.insert(key.into(), json);
        }
        self
    }

    /// Merge a set of metadata entries; existing keys are overwritten.
    pub fn extend_metadata(mut self, entries: impl IntoIterator<Item = (String, serde_json::Value)>) -> Self {
        self.metadata.extend(entries);
        self
    }

    /// Build the record.
    pub fn build(self) -> AuditRecord {
        AuditRecord {
            id: AuditRecordId::new(),
            entity_name: self.entity_name,
            entity_id: self.entity_id,
            action: self.action,
            changed_by: self.changed_by,
            source_address: self.source_address,
            request_path: self.request_path,
            old_value: self.old_value,
            new_value: self.new_value,
            service_name: self.service_name,
            compliance_tag: self.compliance_tag,
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            metadata: if self.metadata.is_empty() {
                None
            } else {
                Some(self.metadata)
            },
        }
    }
}
