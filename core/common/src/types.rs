//! Common types used throughout ConsignVault.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;
use uuid::Uuid;
use zeroize::Zeroize;

/// Maximum length of a principal or shipment identifier.
pub const MAX_ID_LENGTH: usize = 254;

fn validate_label(kind: &str, value: &str) -> crate::Result<()> {
    if value.is_empty() {
        return Err(crate::Error::InvalidInput(format!("{} cannot be empty", kind)));
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(crate::Error::InvalidInput(format!(
            "{} exceeds {} bytes",
            kind, MAX_ID_LENGTH
        )));
    }
    if value.chars().any(|c| c.is_control()) {
        return Err(crate::Error::InvalidInput(format!(
            "{} cannot contain control characters",
            kind
        )));
    }
    Ok(())
}

/// Identifier of a principal (a user able to hold a keypair).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PrincipalId(String);

impl PrincipalId {
    /// Create a new PrincipalId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty, too long or contains control characters
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        validate_label("PrincipalId", &id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PrincipalId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<PrincipalId> for String {
    fn from(id: PrincipalId) -> Self {
        id.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the shipment an artifact belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ShipmentId(String);

impl ShipmentId {
    /// Create a new ShipmentId from a string.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        validate_label("ShipmentId", &id)?;
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ShipmentId {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<ShipmentId> for String {
    fn from(id: ShipmentId) -> Self {
        id.0
    }
}

impl fmt::Display for ShipmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh random identifier.
            pub fn generate() -> Self {
                Self(Uuid::new_v4())
            }

            /// Parse an identifier from its hyphenated string form.
            pub fn parse(value: &str) -> crate::Result<Self> {
                Uuid::parse_str(value).map(Self).map_err(|e| {
                    crate::Error::InvalidInput(format!(
                        "Invalid {} '{}': {}",
                        stringify!($name),
                        value,
                        e
                    ))
                })
            }

            /// Hyphenated string form.
            pub fn to_hyphenated(&self) -> String {
                self.0.hyphenated().to_string()
            }
        }

        impl FromStr for $name {
            type Err = crate::Error;

            fn from_str(s: &str) -> crate::Result<Self> {
                Self::parse(s)
            }
        }

        impl TryFrom<String> for $name {
            type Error = crate::Error;

            fn try_from(value: String) -> crate::Result<Self> {
                Self::parse(&value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.to_hyphenated()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }
    };
}

uuid_id!(
    /// Unique identifier of an encrypted artifact.
    ///
    /// Safe to use as a file name.
    ArtifactId
);

uuid_id!(
    /// Opaque reference to a private key record in the vault.
    VaultRef
);

/// Role under which a principal was granted access to an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// The uploader of the artifact.
    Owner,
    /// A handler assigned to the shipment.
    Assigned,
    /// A member of the reviewing authority pool.
    Authority,
}

impl Role {
    /// All roles, most specific first.
    pub const ALL: [Role; 3] = [Role::Owner, Role::Assigned, Role::Authority];

    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Owner => "OWNER",
            Role::Assigned => "ASSIGNED",
            Role::Authority => "AUTHORITY",
        }
    }

    /// Specificity rank; lower is more specific.
    pub fn specificity(&self) -> u8 {
        match self {
            Role::Owner => 0,
            Role::Assigned => 1,
            Role::Authority => 2,
        }
    }
}

impl FromStr for Role {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OWNER" => Ok(Role::Owner),
            "ASSIGNED" => Ok(Role::Assigned),
            "AUTHORITY" => Ok(Role::Authority),
            other => Err(crate::Error::InvalidInput(format!("Unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an artifact.
///
/// `PendingEncryption` only exists in memory while a blob is being produced;
/// persisted artifacts start at `Encrypted`. There is no deleted state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArtifactState {
    PendingEncryption,
    Encrypted,
    AccessExpanded,
    Readable,
}

impl ArtifactState {
    /// Canonical upper-case name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactState::PendingEncryption => "PENDING_ENCRYPTION",
            ArtifactState::Encrypted => "ENCRYPTED",
            ArtifactState::AccessExpanded => "ACCESS_EXPANDED",
            ArtifactState::Readable => "READABLE",
        }
    }

    /// Whether moving to `next` is a legal lifecycle step.
    ///
    /// Staying in the same state is always allowed.
    pub fn can_transition_to(&self, next: ArtifactState) -> bool {
        use ArtifactState::*;
        matches!(
            (self, next),
            (PendingEncryption, Encrypted)
                | (Encrypted, AccessExpanded)
                | (Encrypted, Readable)
                | (AccessExpanded, AccessExpanded)
                | (AccessExpanded, Readable)
                | (Readable, AccessExpanded)
                | (Readable, Readable)
                | (Encrypted, Encrypted)
                | (PendingEncryption, PendingEncryption)
        )
    }
}

impl FromStr for ArtifactState {
    type Err = crate::Error;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING_ENCRYPTION" => Ok(ArtifactState::PendingEncryption),
            "ENCRYPTED" => Ok(ArtifactState::Encrypted),
            "ACCESS_EXPANDED" => Ok(ArtifactState::AccessExpanded),
            "READABLE" => Ok(ArtifactState::Readable),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown artifact state '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length of a content hash in bytes (SHA-256).
pub const CONTENT_HASH_LENGTH: usize = 32;

/// SHA-256 digest of a stored artifact blob.
///
/// Serialized as lowercase hex. Equality is constant-time.
#[derive(Clone, Copy, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; CONTENT_HASH_LENGTH]);

impl ContentHash {
    /// Wrap raw digest bytes.
    pub fn from_bytes(bytes: [u8; CONTENT_HASH_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Build from a slice, checking its length.
    pub fn from_slice(bytes: &[u8]) -> crate::Result<Self> {
        let array: [u8; CONTENT_HASH_LENGTH] = bytes.try_into().map_err(|_| {
            crate::Error::InvalidInput(format!(
                "Content hash must be {} bytes, got {}",
                CONTENT_HASH_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    /// Parse from hex.
    pub fn from_hex(value: &str) -> crate::Result<Self> {
        let bytes = hex::decode(value)
            .map_err(|e| crate::Error::InvalidInput(format!("Invalid content hash: {}", e)))?;
        Self::from_slice(&bytes)
    }

    /// Raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; CONTENT_HASH_LENGTH] {
        &self.0
    }

    /// Lowercase hex encoding.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First eight hex characters, for log lines.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl PartialEq for ContentHash {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl TryFrom<String> for ContentHash {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::from_hex(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", self.to_hex())
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Sensitive data wrapper that zeroizes on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SensitiveBytes(Vec<u8>);

impl SensitiveBytes {
    /// Create new sensitive bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self(data)
    }

    /// Get a reference to the inner bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Get the length.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SensitiveBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SensitiveBytes([REDACTED; {} bytes])", self.0.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_principal_id_creation() {
        let id = PrincipalId::new("authority@port.example").unwrap();
        assert_eq!(id.as_str(), "authority@port.example");
    }

    #[test]
    fn test_principal_id_rejects_bad_input() {
        assert!(PrincipalId::new("").is_err());
        assert!(PrincipalId::new("a\nb").is_err());
        assert!(PrincipalId::new("x".repeat(MAX_ID_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_principal_id_deserialize_validates() {
        let ok: PrincipalId = serde_json::from_str("\"bob\"").unwrap();
        assert_eq!(ok.as_str(), "bob");
        assert!(serde_json::from_str::<PrincipalId>("\"\"").is_err());
    }

    #[test]
    fn test_artifact_id_parse_and_display() {
        let id = ArtifactId::generate();
        let parsed = ArtifactId::parse(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(ArtifactId::parse("../../etc/passwd").is_err());
    }

    #[test]
    fn test_vault_refs_are_unique() {
        assert_ne!(VaultRef::generate(), VaultRef::generate());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("owner".parse::<Role>().unwrap(), Role::Owner);
        assert_eq!("AUTHORITY".parse::<Role>().unwrap(), Role::Authority);
        assert!("admin".parse::<Role>().is_err());
        assert_eq!(serde_json::to_string(&Role::Assigned).unwrap(), "\"ASSIGNED\"");
    }

    #[test]
    fn test_role_specificity_order() {
        assert!(Role::Owner.specificity() < Role::Assigned.specificity());
        assert!(Role::Assigned.specificity() < Role::Authority.specificity());
    }

    #[test]
    fn test_artifact_state_transitions() {
        use ArtifactState::*;
        assert!(PendingEncryption.can_transition_to(Encrypted));
        assert!(Encrypted.can_transition_to(Readable));
        assert!(Readable.can_transition_to(AccessExpanded));
        assert!(!Readable.can_transition_to(Encrypted));
        assert!(!Encrypted.can_transition_to(PendingEncryption));
        assert_eq!("access_expanded".parse::<ArtifactState>().unwrap(), AccessExpanded);
        assert_eq!(Readable.to_string(), "READABLE");
    }

    #[test]
    fn test_content_hash_hex() {
        let hash = ContentHash::from_bytes([0xAB; CONTENT_HASH_LENGTH]);
        let restored = ContentHash::from_hex(&hash.to_hex()).unwrap();
        assert_eq!(hash, restored);
        assert_eq!(hash.short(), "abababab");
        assert!(ContentHash::from_hex("abcd").is_err());
    }

    #[test]
    fn test_content_hash_inequality() {
        let a = ContentHash::from_bytes([1u8; CONTENT_HASH_LENGTH]);
        let mut raw = [1u8; CONTENT_HASH_LENGTH];
        raw[31] = 2;
        assert_ne!(a, ContentHash::from_bytes(raw));
    }

    #[test]
    fn test_sensitive_bytes_debug_redacted() {
        let secret = SensitiveBytes::new(b"private".to_vec());
        assert_eq!(format!("{:?}", secret), "SensitiveBytes([REDACTED; 7 bytes])");
    }
}
