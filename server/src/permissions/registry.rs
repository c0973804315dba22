//! Permission bit assignments.
//!
//! Each resource domain maps permission names to bit indices. The mapping is
//! read once from configuration (`PERMISSION_FLAGS`) and resolved into a
//! fixed table keyed by typed [`Domain`] / [`Permission`] values.
//!
//! ```json
//! {"problems": {"edit": 0, "view_solutions": 1, "delete": 2, "view": 3, "submit": 4},
//!  "site": {"administrator": 0}}
//! ```

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Highest usable bit. Masks are stored in signed 64-bit columns.
pub const MAX_BIT: u8 = 62;

/// Default assignment used when `PERMISSION_FLAGS` is not set.
pub const DEFAULT_PERMISSION_FLAGS: &str = r#"{"problems":{"edit":0,"view_solutions":1,"delete":2,"view":3,"submit":4},"site":{"administrator":0}}"#;

/// Resource domain a permission belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    /// Per-problem permissions held through resource role bindings.
    Problems,
    /// Site-wide permissions aggregated into tokens.
    Site,
}

impl Domain {
    pub const ALL: [Self; 2] = [Self::Problems, Self::Site];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Problems => "problems",
            Self::Site => "site",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.name() == name)
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A named permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Modify a problem, its test cases and see its role bindings
    Edit,
    /// See reference solutions
    ViewSolutions,
    /// Delete a problem with everything attached to it
    Delete,
    /// See a problem at all
    View,
    /// Submit source code against a problem
    Submit,
    /// Site-wide bypass of every check
    Administrator,
}

impl Permission {
    pub const ALL: [Self; 6] = [
        Self::Edit,
        Self::ViewSolutions,
        Self::Delete,
        Self::View,
        Self::Submit,
        Self::Administrator,
    ];

    /// Configuration key of this permission.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Edit => "edit",
            Self::ViewSolutions => "view_solutions",
            Self::Delete => "delete",
            Self::View => "view",
            Self::Submit => "submit",
            Self::Administrator => "administrator",
        }
    }

    /// Domain the permission is defined in.
    #[must_use]
    pub const fn domain(self) -> Domain {
        match self {
            Self::Administrator => Domain::Site,
            _ => Domain::Problems,
        }
    }

    fn from_name(domain: Domain, name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.domain() == domain && p.name() == name)
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Registry errors.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("unknown permission {permission} in domain {domain}")]
    UnknownPermission { domain: String, permission: String },

    #[error("unknown permission domain {0}")]
    UnknownDomain(String),

    #[error("bit {bit} for {domain}.{permission} is above the highest usable bit")]
    BitOutOfRange {
        domain: Domain,
        permission: Permission,
        bit: u8,
    },

    #[error("{domain}.{first} and {domain}.{second} share bit {bit}")]
    DuplicateBit {
        domain: Domain,
        first: Permission,
        second: Permission,
        bit: u8,
    },

    #[error("site administrator must be bit 0, configured as {0}")]
    AdministratorBit(u8),

    #[error("invalid permission flags: {0}")]
    Parse(String),
}

/// Resolved permission bit table. Immutable after load.
#[derive(Debug, Clone)]
pub struct PermissionRegistry {
    bits: HashMap<(Domain, Permission), u8>,
}

impl PermissionRegistry {
    /// Parse the `{domain: {permission: bit}}` JSON document.
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let raw: BTreeMap<String, BTreeMap<String, u8>> =
            serde_json::from_str(json).map_err(|e| RegistryError::Parse(e.to_string()))?;
        Self::from_raw(&raw)
    }

    /// Resolve names into the typed table, rejecting unknown names,
    /// out-of-range bits and bits shared within a domain.
    pub fn from_raw(raw: &BTreeMap<String, BTreeMap<String, u8>>) -> Result<Self, RegistryError> {
        let mut bits = HashMap::new();
        let mut owners: HashMap<(Domain, u8), Permission> = HashMap::new();

        for (domain_name, entries) in raw {
            let domain = Domain::from_name(domain_name)
                .ok_or_else(|| RegistryError::UnknownDomain(domain_name.clone()))?;

            for (permission_name, &bit) in entries {
                let permission = Permission::from_name(domain, permission_name).ok_or_else(|| {
                    RegistryError::UnknownPermission {
                        domain: domain_name.clone(),
                        permission: permission_name.clone(),
                    }
                })?;

                if bit > MAX_BIT {
                    return Err(RegistryError::BitOutOfRange {
                        domain,
                        permission,
                        bit,
                    });
                }
                if let Some(&first) = owners.get(&(domain, bit)) {
                    return Err(RegistryError::DuplicateBit {
                        domain,
                        first,
                        second: permission,
                        bit,
                    });
                }

                owners.insert((domain, bit), permission);
                bits.insert((domain, permission), bit);
            }
        }

        // Bit 0 of the site mask is the administrator bypass.
        if let Some(&bit) = bits.get(&(Domain::Site, Permission::Administrator)) {
            if bit != 0 {
                return Err(RegistryError::AdministratorBit(bit));
            }
        }

        Ok(Self { bits })
    }

    /// Bit index of `permission` within `domain`.
    pub fn bit_index(&self, domain: Domain, permission: Permission) -> Result<u8, RegistryError> {
        self.bits
            .get(&(domain, permission))
            .copied()
            .ok_or_else(|| RegistryError::UnknownPermission {
                domain: domain.name().to_string(),
                permission: permission.name().to_string(),
            })
    }

    /// Single-bit mask for `permission` in its own domain.
    pub fn mask(&self, permission: Permission) -> Result<u64, RegistryError> {
        self.bit_index(permission.domain(), permission)
            .map(|bit| 1u64 << bit)
    }

    /// Permissions without a configured bit.
    #[must_use]
    pub fn missing(&self) -> Vec<Permission> {
        Permission::ALL
            .into_iter()
            .filter(|p| !self.bits.contains_key(&(p.domain(), *p)))
            .collect()
    }
}

impl Default for PermissionRegistry {
    fn default() -> Self {
        let bits = [
            (Permission::Edit, 0),
            (Permission::ViewSolutions, 1),
            (Permission::Delete, 2),
            (Permission::View, 3),
            (Permission::Submit, 4),
            (Permission::Administrator, 0),
        ]
        .into_iter()
        .map(|(p, bit)| ((p.domain(), p), bit))
        .collect();
        Self { bits }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_json_matches_default_table() {
        let parsed = PermissionRegistry::from_json(DEFAULT_PERMISSION_FLAGS).unwrap();
        let default = PermissionRegistry::default();
        for p in Permission::ALL {
            assert_eq!(
                parsed.bit_index(p.domain(), p).unwrap(),
                default.bit_index(p.domain(), p).unwrap(),
                "{p}"
            );
        }
        assert!(parsed.missing().is_empty());
    }

    #[test]
    fn bit_index_lookup() {
        let registry = PermissionRegistry::default();
        assert_eq!(registry.bit_index(Domain::Problems, Permission::Edit), Ok(0));
        assert_eq!(registry.bit_index(Domain::Problems, Permission::View), Ok(3));
        assert_eq!(registry.mask(Permission::ViewSolutions), Ok(0b10));
        assert_eq!(registry.mask(Permission::Administrator), Ok(1));
    }

    #[test]
    fn wrong_domain_is_unknown() {
        let registry = PermissionRegistry::default();
        assert!(matches!(
            registry.bit_index(Domain::Site, Permission::Edit),
            Err(RegistryError::UnknownPermission { .. })
        ));
    }

    #[test]
    fn absent_permission_is_unknown() {
        let registry = PermissionRegistry::from_json(r#"{"problems":{"view":0}}"#).unwrap();
        assert!(registry.bit_index(Domain::Problems, Permission::View).is_ok());
        assert_eq!(
            registry.bit_index(Domain::Problems, Permission::Delete),
            Err(RegistryError::UnknownPermission {
                domain: "problems".into(),
                permission: "delete".into(),
            })
        );
        assert!(registry.missing().contains(&Permission::Administrator));
    }

    #[test]
    fn rejects_unknown_names() {
        assert!(matches!(
            PermissionRegistry::from_json(r#"{"problems":{"fly":0}}"#),
            Err(RegistryError::UnknownPermission { .. })
        ));
        assert!(matches!(
            PermissionRegistry::from_json(r#"{"contests":{"view":0}}"#),
            Err(RegistryError::UnknownDomain(_))
        ));
    }

    #[test]
    fn rejects_shared_bits() {
        let result = PermissionRegistry::from_json(r#"{"problems":{"edit":1,"view":1}}"#);
        assert!(matches!(result, Err(RegistryError::DuplicateBit { bit: 1, .. })));
    }

    #[test]
    fn same_bit_in_different_domains_is_fine() {
        let result =
            PermissionRegistry::from_json(r#"{"problems":{"edit":0},"site":{"administrator":0}}"#);
        assert!(result.is_ok());
    }

    #[test]
    fn rejects_out_of_range_and_moved_admin_bit() {
        assert!(matches!(
            PermissionRegistry::from_json(r#"{"problems":{"edit":63}}"#),
            Err(RegistryError::BitOutOfRange { bit: 63, .. })
        ));
        assert_eq!(
            PermissionRegistry::from_json(r#"{"site":{"administrator":2}}"#).unwrap_err(),
            RegistryError::AdministratorBit(2)
        );
    }

    #[test]
    fn malformed_json_is_parse_error() {
        assert!(matches!(
            PermissionRegistry::from_json("{not json"),
            Err(RegistryError::Parse(_))
        ));
    }
}
