//! Role resolution for authenticated sessions.
//!
//! Resolution order: operator allow-list, stored role assignment, then the
//! one-time first-admin bootstrap. Storage failures degrade to the default
//! `user` role instead of failing the session; privileged actions must check
//! capabilities and therefore fail closed.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::db::{DbPool, queries};
use crate::error::Result;
use crate::jwt::Identity;
use crate::models::{Capabilities, Role};

/// Where a resolved role came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleSource {
    Operator,
    Assigned,
    Bootstrap,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedAccess {
    pub user_id: String,
    pub role: Role,
    pub capabilities: Capabilities,
    pub source: RoleSource,
}

impl ResolvedAccess {
    fn new(identity: &Identity, role: Role, source: RoleSource) -> Self {
        Self {
            user_id: identity.user_id.clone(),
            role,
            capabilities: role.capabilities(),
            source,
        }
    }
}

pub struct AccessResolver {
    operator_emails: Vec<String>,
    settle_delay: Duration,
    /// Identities whose bootstrap has been attempted by this process
    attempted: Mutex<HashSet<String>>,
    /// Set once any bootstrap attempt has reached the database and returned;
    /// from then on no identity can be promoted
    settled: AtomicBool,
}

impl AccessResolver {
    /// `operator_emails` must already be lowercased (see `config::parse_email_list`).
    pub fn new(operator_emails: Vec<String>, settle_delay: Duration) -> Self {
        Self {
            operator_emails,
            settle_delay,
            attempted: Mutex::new(HashSet::new()),
            settled: AtomicBool::new(false),
        }
    }

    pub fn is_operator(&self, identity: &Identity) -> bool {
        identity.email.as_ref().is_some_and(|email| {
            let email = email.trim().to_lowercase();
            self.operator_emails.iter().any(|op| *op == email)
        })
    }

    pub async fn resolve(&self, db: &DbPool, identity: &Identity) -> ResolvedAccess {
        if self.is_operator(identity) {
            return ResolvedAccess::new(identity, Role::Admin, RoleSource::Operator);
        }

        match lookup_role(db, &identity.user_id) {
            Ok(Some(role)) => return ResolvedAccess::new(identity, role, RoleSource::Assigned),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    "Role lookup failed for {}, using default role: {}",
                    identity.user_id,
                    e
                );
                return ResolvedAccess::new(identity, Role::User, RoleSource::Default);
            }
        }

        if self.is_settled() || !self.claim_attempt(&identity.user_id) {
            return ResolvedAccess::new(identity, Role::User, RoleSource::Default);
        }

        // Let concurrent session initialization for this user finish first
        if !self.settle_delay.is_zero() {
            tokio::time::sleep(self.settle_delay).await;
        }

        let outcome = bootstrap_admin(db, &identity.user_id);
        if outcome.is_ok() {
            self.settle();
        }

        match outcome {
            Ok(true) => {
                tracing::info!("Bootstrap: promoted first user {} to admin", identity.user_id);
                ResolvedAccess::new(identity, Role::Admin, RoleSource::Bootstrap)
            }
            Ok(false) => ResolvedAccess::new(identity, Role::User, RoleSource::Default),
            Err(e) => {
                tracing::warn!("Admin bootstrap failed for {}: {}", identity.user_id, e);
                ResolvedAccess::new(identity, Role::User, RoleSource::Default)
            }
        }
    }

    /// Whether the bootstrap window has closed for this process.
    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Close the bootstrap window. The per-identity record is no longer
    /// consulted, so it is released.
    fn settle(&self) {
        self.settled.store(true, Ordering::Release);
        self.attempted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    /// Record a bootstrap attempt; false if this identity already had one.
    fn claim_attempt(&self, user_id: &str) -> bool {
        let mut attempted = self
            .attempted
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        attempted.insert(user_id.to_string())
    }
}

fn lookup_role(db: &DbPool, user_id: &str) -> Result<Option<Role>> {
    let conn = db.get()?;
    Ok(queries::get_role_assignment(&conn, user_id)?.map(|a| a.role))
}

fn bootstrap_admin(db: &DbPool, user_id: &str) -> Result<bool> {
    let mut conn = db.get()?;
    queries::try_bootstrap_admin(&mut conn, user_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(email: Option<&str>) -> Identity {
        Identity {
            user_id: "u1".into(),
            email: email.map(String::from),
        }
    }

    #[test]
    fn test_operator_match_is_case_insensitive() {
        let resolver = AccessResolver::new(vec!["ops@example.com".into()], Duration::ZERO);
        assert!(resolver.is_operator(&identity(Some("Ops@Example.COM"))));
        assert!(!resolver.is_operator(&identity(Some("someone@example.com"))));
        assert!(!resolver.is_operator(&identity(None)));
    }

    #[test]
    fn test_bootstrap_attempt_claimed_once() {
        let resolver = AccessResolver::new(vec![], Duration::ZERO);
        assert!(resolver.claim_attempt("u1"));
        assert!(!resolver.claim_attempt("u1"));
        assert!(resolver.claim_attempt("u2"));
    }

    #[test]
    fn test_settle_releases_attempt_record() {
        let resolver = AccessResolver::new(vec![], Duration::ZERO);
        resolver.claim_attempt("u1");
        assert!(!resolver.is_settled());

        resolver.settle();

        assert!(resolver.is_settled());
        assert!(resolver.attempted.lock().unwrap().is_empty());
    }
}
