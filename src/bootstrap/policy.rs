/*!
 * Capability policies.
 *
 * A role holds named inline policies; each policy lists statements that
 * allow or deny actions on resources. An action is permitted when some
 * statement allows it and none denies it.
 */

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use crate::database::Repository;
use crate::errors::WorkflowError;

/// Policy language version written into every document
pub const POLICY_VERSION: &str = "2012-10-17";

/// Action needed to start a workflow run
pub const START_RUN_ACTION: &str = "workflow:StartRun";

/// Action needed by the coordinator to invoke a leaf task
pub const INVOKE_TASK_ACTION: &str = "task:Invoke";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// A single policy statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    pub effect: Effect,
    pub action: Vec<String>,
    pub resource: Vec<String>,
}

impl Statement {
    fn matches(&self, action: &str, resource: &str) -> bool {
        let action_matches = self.action.iter().any(|a| a == "*" || a == action);
        let resource_matches = self.resource.iter().any(|r| r == "*" || r == resource);
        action_matches && resource_matches
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PolicyDocument {
    pub version: String,
    pub statement: Vec<Statement>,
}

impl PolicyDocument {
    /// Document with one statement allowing `action` on every resource given
    pub fn allow<I, S>(action: &str, resources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version: POLICY_VERSION.to_string(),
            statement: vec![Statement {
                effect: Effect::Allow,
                action: vec![action.to_string()],
                resource: resources.into_iter().map(Into::into).collect(),
            }],
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize policy document")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse policy document")
    }

    fn effect_for(&self, action: &str, resource: &str) -> Option<Effect> {
        let mut effect = None;
        for statement in self.statement.iter().filter(|s| s.matches(action, resource)) {
            if statement.effect == Effect::Deny {
                return Some(Effect::Deny);
            }
            effect = Some(Effect::Allow);
        }
        effect
    }
}

/// Role name from a role identifier: its last `/` segment
pub fn role_name(role_id: &str) -> Option<&str> {
    role_id.rsplit('/').next().filter(|name| !name.trim().is_empty())
}

/// Named inline policies per role
#[async_trait]
pub trait PolicyStore: Send + Sync + Debug {
    /// Create or replace a policy
    async fn put_policy(&self, role: &str, name: &str, document: &PolicyDocument) -> Result<()>;

    async fn get_policy(&self, role: &str, name: &str) -> Result<Option<PolicyDocument>>;

    /// All policies of a role, ordered by name
    async fn list_policies(&self, role: &str) -> Result<Vec<(String, PolicyDocument)>>;

    /// Remove a policy; `Ok(false)` when it did not exist
    async fn delete_policy(&self, role: &str, name: &str) -> Result<bool>;
}

/// Whether `role` may perform `action` on `resource`
pub async fn is_allowed(store: &dyn PolicyStore, role: &str, action: &str, resource: &str) -> Result<bool> {
    let mut allowed = false;
    for (_, document) in store.list_policies(role).await? {
        match document.effect_for(action, resource) {
            Some(Effect::Deny) => return Ok(false),
            Some(Effect::Allow) => allowed = true,
            None => {}
        }
    }
    Ok(allowed)
}

/// Checks one principal's capabilities before an action is taken
#[derive(Debug, Clone)]
pub struct AccessGuard {
    store: Arc<dyn PolicyStore>,
    role: String,
}

impl AccessGuard {
    pub fn new(store: Arc<dyn PolicyStore>, role: impl Into<String>) -> Self {
        Self {
            store,
            role: role.into(),
        }
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    /// `AccessDenied` unless the role may perform `action` on `resource`
    pub async fn check(&self, action: &str, resource: &str) -> Result<(), WorkflowError> {
        let denied = || WorkflowError::AccessDenied {
            principal: self.role.clone(),
            action: action.to_string(),
            resource: resource.to_string(),
        };

        match is_allowed(self.store.as_ref(), &self.role, action, resource).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(denied()),
            Err(e) => {
                log::warn!("Policy lookup for {} failed: {:#}", self.role, e);
                Err(denied())
            }
        }
    }
}

/// Process-local policy store
#[derive(Debug, Clone, Default)]
pub struct MemoryPolicyStore {
    policies: Arc<RwLock<BTreeMap<(String, String), PolicyDocument>>>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of policies across all roles
    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn put_policy(&self, role: &str, name: &str, document: &PolicyDocument) -> Result<()> {
        self.policies
            .write()
            .insert((role.to_string(), name.to_string()), document.clone());
        Ok(())
    }

    async fn get_policy(&self, role: &str, name: &str) -> Result<Option<PolicyDocument>> {
        Ok(self.policies.read().get(&(role.to_string(), name.to_string())).cloned())
    }

    async fn list_policies(&self, role: &str) -> Result<Vec<(String, PolicyDocument)>> {
        Ok(self
            .policies
            .read()
            .iter()
            .filter(|((r, _), _)| r == role)
            .map(|((_, name), document)| (name.clone(), document.clone()))
            .collect())
    }

    async fn delete_policy(&self, role: &str, name: &str) -> Result<bool> {
        Ok(self.policies.write().remove(&(role.to_string(), name.to_string())).is_some())
    }
}

/// Policy store backed by the `role_policies` table
#[derive(Debug, Clone)]
pub struct SqlitePolicyStore {
    repository: Repository,
}

impl SqlitePolicyStore {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }
}

#[async_trait]
impl PolicyStore for SqlitePolicyStore {
    async fn put_policy(&self, role: &str, name: &str, document: &PolicyDocument) -> Result<()> {
        self.repository.put_role_policy(role, name, &document.to_json()?).await
    }

    async fn get_policy(&self, role: &str, name: &str) -> Result<Option<PolicyDocument>> {
        self.repository
            .get_role_policy(role, name)
            .await?
            .map(|record| PolicyDocument::from_json(&record.document))
            .transpose()
    }

    async fn list_policies(&self, role: &str) -> Result<Vec<(String, PolicyDocument)>> {
        self.repository
            .list_role_policies(role)
            .await?
            .into_iter()
            .map(|record| Ok((record.policy_name, PolicyDocument::from_json(&record.document)?)))
            .collect()
    }

    async fn delete_policy(&self, role: &str, name: &str) -> Result<bool> {
        self.repository.delete_role_policy(role, name).await
    }
}
