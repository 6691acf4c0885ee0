/// RESOURCE CATALOG
///
/// Static mapping from resource identifier to trade eligibility and display
/// metadata. The catalog is fixed for the lifetime of a session; only
/// tradable resources may be priced, taxed or posted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Every resource the economy knows about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceKind {
    Food,
    Wood,
    Stone,
    Iron,
    Copper,
    Gold,
    Oil,
    Uranium,
    Steel,
    Electronics,
    /// Produced only through research, never traded
    ResearchPoints,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 11] = [
        ResourceKind::Food,
        ResourceKind::Wood,
        ResourceKind::Stone,
        ResourceKind::Iron,
        ResourceKind::Copper,
        ResourceKind::Gold,
        ResourceKind::Oil,
        ResourceKind::Uranium,
        ResourceKind::Steel,
        ResourceKind::Electronics,
        ResourceKind::ResearchPoints,
    ];
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Broad grouping used by presentation layers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceCategory {
    Raw,
    Refined,
    Strategic,
    Intangible,
}

/// Catalog entry for one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceInfo {
    /// Whether players may post or accept orders for this resource
    pub tradable: bool,
    /// Display name (untranslated key)
    pub display_name: String,
    pub category: ResourceCategory,
}

impl ResourceInfo {
    fn new(display_name: &str, category: ResourceCategory, tradable: bool) -> Self {
        ResourceInfo {
            tradable,
            display_name: display_name.to_string(),
            category,
        }
    }
}

/// Resource catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    entries: BTreeMap<ResourceKind, ResourceInfo>,
}

impl Catalog {
    /// Catalog with the default resource set
    pub fn standard() -> Self {
        use ResourceCategory::*;

        let mut entries = BTreeMap::new();
        entries.insert(ResourceKind::Food, ResourceInfo::new("resource.food", Raw, true));
        entries.insert(ResourceKind::Wood, ResourceInfo::new("resource.wood", Raw, true));
        entries.insert(ResourceKind::Stone, ResourceInfo::new("resource.stone", Raw, true));
        entries.insert(ResourceKind::Iron, ResourceInfo::new("resource.iron", Raw, true));
        entries.insert(ResourceKind::Copper, ResourceInfo::new("resource.copper", Raw, true));
        entries.insert(ResourceKind::Gold, ResourceInfo::new("resource.gold", Strategic, true));
        entries.insert(ResourceKind::Oil, ResourceInfo::new("resource.oil", Strategic, true));
        entries.insert(ResourceKind::Uranium, ResourceInfo::new("resource.uranium", Strategic, true));
        entries.insert(ResourceKind::Steel, ResourceInfo::new("resource.steel", Refined, true));
        entries.insert(ResourceKind::Electronics, ResourceInfo::new("resource.electronics", Refined, true));
        entries.insert(
            ResourceKind::ResearchPoints,
            ResourceInfo::new("resource.research_points", Intangible, false),
        );

        Catalog { entries }
    }

    /// Build a catalog from explicit entries
    pub fn from_entries(entries: BTreeMap<ResourceKind, ResourceInfo>) -> Self {
        Catalog { entries }
    }

    pub fn get(&self, resource: ResourceKind) -> Option<&ResourceInfo> {
        self.entries.get(&resource)
    }

    pub fn is_tradable(&self, resource: ResourceKind) -> bool {
        self.entries.get(&resource).map(|info| info.tradable).unwrap_or(false)
    }

    /// Fails unless the resource is present and tradable
    pub fn ensure_tradable(&self, resource: ResourceKind) -> Result<&ResourceInfo, CatalogError> {
        let info = self
            .entries
            .get(&resource)
            .ok_or(CatalogError::UnknownResource(resource))?;
        if !info.tradable {
            return Err(CatalogError::NotTradable(resource));
        }
        Ok(info)
    }

    /// Iterate tradable resources in catalog order
    pub fn tradable(&self) -> impl Iterator<Item = ResourceKind> + '_ {
        self.entries
            .iter()
            .filter(|(_, info)| info.tradable)
            .map(|(kind, _)| *kind)
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Catalog::standard()
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CatalogError {
    #[error("Unknown resource: {0}")]
    UnknownResource(ResourceKind),
    #[error("Resource is not tradable: {0}")]
    NotTradable(ResourceKind),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_catalog_covers_all_kinds() {
        let catalog = Catalog::standard();
        for kind in ResourceKind::ALL {
            assert!(catalog.get(kind).is_some(), "missing {kind}");
        }
    }

    #[test]
    fn test_research_points_not_tradable() {
        let catalog = Catalog::standard();
        assert_eq!(
            catalog.ensure_tradable(ResourceKind::ResearchPoints).unwrap_err(),
            CatalogError::NotTradable(ResourceKind::ResearchPoints)
        );
        assert!(!catalog.tradable().any(|k| k == ResourceKind::ResearchPoints));
    }

    #[test]
    fn test_unknown_resource_rejected() {
        let catalog = Catalog::from_entries(BTreeMap::new());
        assert_eq!(
            catalog.ensure_tradable(ResourceKind::Iron).unwrap_err(),
            CatalogError::UnknownResource(ResourceKind::Iron)
        );
    }
}
