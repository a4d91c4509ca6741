//! Shipment roster: who handles a shipment and who reviews it.
//!
//! The surrounding application owns shipments and user accounts. The vault
//! only needs to know, at upload time, which principals should receive a
//! wrapped copy of the content key.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use consignvault_common::{Error, PrincipalId, Result, Role, ShipmentId};

/// A principal to grant access to, with the role it is granted under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Recipient {
    pub principal_id: PrincipalId,
    pub role: Role,
}

impl Recipient {
    pub fn new(principal_id: PrincipalId, role: Role) -> Self {
        Self { principal_id, role }
    }

    pub fn owner(principal_id: PrincipalId) -> Self {
        Self::new(principal_id, Role::Owner)
    }
}

/// The application's view of shipment staffing.
pub trait ShipmentRoster: Send + Sync {
    /// Active handlers assigned to the shipment.
    fn assigned_handlers(&self, shipment: &ShipmentId) -> Result<Vec<PrincipalId>>;

    /// Active members of the reviewing authority pool.
    fn authority_pool(&self) -> Result<Vec<PrincipalId>>;
}

/// Everyone who should be able to read a shipment artifact: the uploader
/// as OWNER, assigned handlers as ASSIGNED, authorities as AUTHORITY.
///
/// A principal appearing in several roles gets one recipient per role.
/// Duplicate (principal, role) pairs are collapsed.
pub fn audience(
    uploader: &PrincipalId,
    shipment: &ShipmentId,
    roster: &dyn ShipmentRoster,
) -> Result<Vec<Recipient>> {
    let mut recipients = vec![Recipient::owner(uploader.clone())];
    recipients.extend(
        roster
            .assigned_handlers(shipment)?
            .into_iter()
            .map(|id| Recipient::new(id, Role::Assigned)),
    );
    recipients.extend(
        roster
            .authority_pool()?
            .into_iter()
            .map(|id| Recipient::new(id, Role::Authority)),
    );

    let mut seen = std::collections::HashSet::new();
    recipients.retain(|r| seen.insert(r.clone()));
    Ok(recipients)
}

/// A roster entry; inactive members receive no grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterMember {
    pub principal_id: PrincipalId,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// In-memory roster, loadable from JSON.
///
/// ```json
/// {
///   "authorities": [{"principal_id": "customs@port"}],
///   "shipments": {"SHP-1": [{"principal_id": "agent@forwarder", "active": true}]}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticRoster {
    #[serde(default)]
    pub authorities: Vec<RosterMember>,
    #[serde(default)]
    pub shipments: HashMap<ShipmentId, Vec<RosterMember>>,
}

impl StaticRoster {
    /// Create an empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an active authority.
    pub fn with_authority(mut self, id: PrincipalId) -> Self {
        self.authorities.push(RosterMember {
            principal_id: id,
            active: true,
        });
        self
    }

    /// Assign an active handler to a shipment.
    pub fn with_handler(mut self, shipment: ShipmentId, id: PrincipalId) -> Self {
        self.shipments.entry(shipment).or_default().push(RosterMember {
            principal_id: id,
            active: true,
        });
        self
    }

    /// Mark a member inactive everywhere.
    pub fn deactivate(&mut self, id: &PrincipalId) {
        self.authorities
            .iter_mut()
            .chain(self.shipments.values_mut().flatten())
            .filter(|m| m.principal_id == *id)
            .for_each(|m| m.active = false);
    }

    /// Parse a roster from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Load a roster from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

fn active(members: &[RosterMember]) -> Vec<PrincipalId> {
    members
        .iter()
        .filter(|m| m.active)
        .map(|m| m.principal_id.clone())
        .collect()
}

impl ShipmentRoster for StaticRoster {
    fn assigned_handlers(&self, shipment: &ShipmentId) -> Result<Vec<PrincipalId>> {
        Ok(self
            .shipments
            .get(shipment)
            .map(|members| active(members))
            .unwrap_or_default())
    }

    fn authority_pool(&self) -> Result<Vec<PrincipalId>> {
        Ok(active(&self.authorities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(name: &str) -> PrincipalId {
        PrincipalId::new(name).unwrap()
    }

    fn shipment() -> ShipmentId {
        ShipmentId::new("SHP-7").unwrap()
    }

    #[test]
    fn test_audience_roles() {
        let roster = StaticRoster::new()
            .with_handler(shipment(), id("agent"))
            .with_authority(id("customs"))
            .with_authority(id("uploader"));

        let recipients = audience(&id("uploader"), &shipment(), &roster).unwrap();
        assert_eq!(
            recipients,
            vec![
                Recipient::owner(id("uploader")),
                Recipient::new(id("agent"), Role::Assigned),
                Recipient::new(id("customs"), Role::Authority),
                Recipient::new(id("uploader"), Role::Authority),
            ]
        );
    }

    #[test]
    fn test_inactive_members_excluded() {
        let mut roster = StaticRoster::new()
            .with_handler(shipment(), id("agent"))
            .with_authority(id("customs"));
        roster.deactivate(&id("customs"));

        assert!(roster.authority_pool().unwrap().is_empty());
        assert_eq!(roster.assigned_handlers(&shipment()).unwrap(), vec![id("agent")]);
        assert!(roster
            .assigned_handlers(&ShipmentId::new("other").unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_duplicates_collapsed() {
        let roster = StaticRoster::new()
            .with_handler(shipment(), id("agent"))
            .with_handler(shipment(), id("agent"));
        assert_eq!(audience(&id("u"), &shipment(), &roster).unwrap().len(), 2);
    }

    #[test]
    fn test_roster_from_json() {
        let roster = StaticRoster::from_json(
            r#"{
                "authorities": [{"principal_id": "customs"}, {"principal_id": "retired", "active": false}],
                "shipments": {"SHP-7": [{"principal_id": "agent"}]}
            }"#,
        )
        .unwrap();

        assert_eq!(roster.authority_pool().unwrap(), vec![id("customs")]);
        assert_eq!(roster.assigned_handlers(&shipment()).unwrap(), vec![id("agent")]);
        assert!(StaticRoster::from_json("{\"authorities\": [{}]}").is_err());
    }
}
