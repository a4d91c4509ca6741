//! Access grant table.
//!
//! A grant is one principal's copy of an artifact's content key, wrapped
//! under that principal's public key, together with the artifact hash the
//! grant was issued against.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::artifact::verify_blob;
use crate::principal::{Principal, PrincipalKeys};
use consignvault_common::{ArtifactId, ContentHash, Error, PrincipalId, Result, Role};
use consignvault_crypto::{unwrap_key, wrap_key, ContentKey, WrappedKey};
use consignvault_storage::{BlobStore, GrantRecord, RecordStore};

/// A principal's access to an artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub artifact_id: ArtifactId,
    pub principal_id: PrincipalId,
    pub role: Role,
    pub wrapped_key: WrappedKey,
    pub content_hash: ContentHash,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<GrantRecord> for AccessGrant {
    fn from(record: GrantRecord) -> Self {
        Self {
            artifact_id: record.artifact_id,
            principal_id: record.principal_id,
            role: record.role,
            wrapped_key: WrappedKey::from_bytes(record.wrapped_key),
            content_hash: record.content_hash,
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

/// Order in which existing grants are tried when re-wrapping.
fn recovery_rank(role: Role) -> u8 {
    match role {
        Role::Authority => 0,
        Role::Owner => 1,
        Role::Assigned => 2,
    }
}

/// Most recently updated grant first; ties go to the more specific role.
fn resolution_order(a: &GrantRecord, b: &GrantRecord) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| a.role.specificity().cmp(&b.role.specificity()))
}

/// Pick the grant a read should use.
pub(crate) fn select_grant(grants: Vec<GrantRecord>) -> Option<GrantRecord> {
    grants.into_iter().min_by(resolution_order)
}

/// Grants usable to recover the content key, in the order they are tried.
pub(crate) fn recovery_candidates(
    grants: Vec<GrantRecord>,
    current_hash: &ContentHash,
) -> Vec<GrantRecord> {
    let mut candidates: Vec<GrantRecord> = grants
        .into_iter()
        .filter(|g| g.content_hash == *current_hash)
        .collect();
    candidates.sort_by(|a, b| {
        recovery_rank(a.role)
            .cmp(&recovery_rank(b.role))
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    candidates
}

/// Issues, resolves and lists access grants.
pub struct AccessGrantTable {
    records: Arc<dyn RecordStore>,
    blobs: Arc<dyn BlobStore>,
    principals: Arc<PrincipalKeys>,
}

impl AccessGrantTable {
    /// Create a grant table.
    pub fn new(
        records: Arc<dyn RecordStore>,
        blobs: Arc<dyn BlobStore>,
        principals: Arc<PrincipalKeys>,
    ) -> Self {
        Self {
            records,
            blobs,
            principals,
        }
    }

    /// Wrap `key` for `principal` without persisting anything.
    pub(crate) fn prepare(
        &self,
        artifact_id: &ArtifactId,
        principal: &Principal,
        role: Role,
        key: &ContentKey,
        content_hash: &ContentHash,
    ) -> Result<GrantRecord> {
        let wrapped = wrap_key(key, &principal.public_key)?;
        let now = Utc::now();
        Ok(GrantRecord {
            artifact_id: *artifact_id,
            principal_id: principal.id.clone(),
            role,
            wrapped_key: wrapped.as_bytes().to_vec(),
            content_hash: *content_hash,
            created_at: now,
            updated_at: now,
        })
    }

    /// Grant access by re-wrapping the content key recovered through an
    /// existing grant.
    ///
    /// Existing grants are tried AUTHORITY first, then OWNER, then ASSIGNED,
    /// most recent first within a role. Grants issued against a different
    /// artifact hash are never used, and nothing is granted while the blob
    /// no longer matches its recorded hash.
    ///
    /// # Errors
    /// - `NotFound` if the artifact does not exist
    /// - `TamperDetected` if the blob no longer matches its recorded hash
    /// - `NoKeyMaterial` if the new principal has no key pair
    /// - `NoExistingGrant` if no existing grant can be unwrapped
    pub fn grant(
        &self,
        artifact_id: &ArtifactId,
        principal_id: &PrincipalId,
        role: Role,
    ) -> Result<AccessGrant> {
        let artifact = self
            .records
            .get_artifact(artifact_id)?
            .ok_or_else(|| Error::NotFound(format!("Artifact not found: {}", artifact_id)))?;
        verify_blob(self.blobs.as_ref(), &artifact)?;
        let target = self.principals.principal(principal_id)?;

        let candidates =
            recovery_candidates(self.records.list_grants(artifact_id)?, &artifact.content_hash);

        for candidate in &candidates {
            match self.recover(candidate) {
                Ok(key) => {
                    let record =
                        self.prepare(artifact_id, &target, role, &key, &artifact.content_hash)?;
                    let stored = self.records.upsert_grant(&record)?;
                    info!(
                        artifact = %artifact_id,
                        principal = %principal_id,
                        role = %role,
                        via = %candidate.principal_id,
                        "Access granted by re-wrap"
                    );
                    return Ok(stored.into());
                }
                Err(e) => {
                    debug!(
                        artifact = %artifact_id,
                        via = %candidate.principal_id,
                        role = %candidate.role,
                        error = %e,
                        "Grant unusable for recovery"
                    );
                }
            }
        }

        warn!(artifact = %artifact_id, tried = candidates.len(), "No grant could be re-wrapped");
        Err(Error::NoExistingGrant(format!(
            "No existing grant on {} could be unwrapped",
            artifact_id
        )))
    }

    /// Unwrap the content key held by `grant` with its principal's private
    /// key.
    pub(crate) fn recover(&self, grant: &GrantRecord) -> Result<ContentKey> {
        let holder = self.principals.principal(&grant.principal_id)?;
        let private = self.principals.private_key(&holder)?;
        unwrap_key(&WrappedKey::from_bytes(grant.wrapped_key.clone()), &private)
    }

    /// The grant a read by `principal_id` would use, if any.
    pub fn resolve(
        &self,
        artifact_id: &ArtifactId,
        principal_id: &PrincipalId,
    ) -> Result<Option<AccessGrant>> {
        let grants = self.records.grants_for(artifact_id, principal_id)?;
        Ok(select_grant(grants).map(AccessGrant::from))
    }

    /// Principals holding at least one grant on the artifact.
    pub fn authorized_principals(&self, artifact_id: &ArtifactId) -> Result<BTreeSet<PrincipalId>> {
        Ok(self
            .records
            .list_grants(artifact_id)?
            .into_iter()
            .map(|g| g.principal_id)
            .collect())
    }

    /// All grants of an artifact.
    pub fn grants(&self, artifact_id: &ArtifactId) -> Result<Vec<AccessGrant>> {
        Ok(self
            .records
            .list_grants(artifact_id)?
            .into_iter()
            .map(AccessGrant::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn record(who: &str, role: Role, age_secs: i64, hash: u8) -> GrantRecord {
        let at = Utc::now() - Duration::seconds(age_secs);
        GrantRecord {
            artifact_id: ArtifactId::parse("6f9619ff-8b86-d011-b42d-00c04fc964ff").unwrap(),
            principal_id: PrincipalId::new(who).unwrap(),
            role,
            wrapped_key: vec![0; 8],
            content_hash: ContentHash::from_bytes([hash; 32]),
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_select_prefers_most_recent() {
        let picked = select_grant(vec![
            record("alice", Role::Owner, 60, 1),
            record("alice", Role::Authority, 5, 1),
        ])
        .unwrap();
        assert_eq!(picked.role, Role::Authority);
    }

    #[test]
    fn test_select_tie_goes_to_specific_role() {
        let mut owner = record("alice", Role::Owner, 0, 1);
        let mut authority = record("alice", Role::Authority, 0, 1);
        let at = Utc::now();
        owner.updated_at = at;
        authority.updated_at = at;

        let picked = select_grant(vec![authority, owner]).unwrap();
        assert_eq!(picked.role, Role::Owner);
        assert!(select_grant(Vec::new()).is_none());
    }

    #[test]
    fn test_recovery_order_and_stale_hash_filter() {
        let current = ContentHash::from_bytes([1; 32]);
        let order: Vec<(String, Role)> = recovery_candidates(
            vec![
                record("assigned", Role::Assigned, 1, 1),
                record("owner", Role::Owner, 1, 1),
                record("old-authority", Role::Authority, 100, 1),
                record("new-authority", Role::Authority, 10, 1),
                record("stale", Role::Authority, 0, 2),
            ],
            &current,
        )
        .into_iter()
        .map(|g| (g.principal_id.to_string(), g.role))
        .collect();

        assert_eq!(
            order,
            vec![
                ("new-authority".to_string(), Role::Authority),
                ("old-authority".to_string(), Role::Authority),
                ("owner".to_string(), Role::Owner),
                ("assigned".to_string(), Role::Assigned),
            ]
        );
    }

    proptest! {
        #[test]
        fn prop_selected_grant_is_never_older(ages in proptest::collection::vec(0i64..1000, 1..8)) {
            let grants: Vec<GrantRecord> = ages
                .iter()
                .enumerate()
                .map(|(i, age)| record("p", Role::ALL[i % 3], *age, 1))
                .collect();
            let newest = grants.iter().map(|g| g.updated_at).max().unwrap();

            let picked = select_grant(grants).unwrap();
            prop_assert_eq!(picked.updated_at, newest);
        }
    }
}
