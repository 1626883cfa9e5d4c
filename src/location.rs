/// Registry region inference and comparison against the cluster region

/// Region label used by private endpoint canonical names
pub const PRIVATE_LINK_LABEL: &str = "privatelink";

/// Outcome of comparing the registry region with the cluster region
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionCheck {
    Match,
    Mismatch { registry: String, cluster: String },
    /// Registry is reached through a private endpoint, no comparison made
    PrivateLink,
    /// Canonical name carried no region label
    Unknown,
}

/// Second dot-separated label of a canonical name
pub fn registry_region(cname: &str) -> Option<&str> {
    cname.split('.').nth(1).filter(|label| !label.is_empty())
}

pub fn is_private_link(region: &str) -> bool {
    region.eq_ignore_ascii_case(PRIVATE_LINK_LABEL)
}

/// Compare two locations ignoring case and whitespace ("East US" == "eastus")
pub fn location_equals(a: &str, b: &str) -> bool {
    normalize(a) == normalize(b)
}

fn normalize(location: &str) -> String {
    location
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Compare the region derived from a canonical name with the cluster location
pub fn check_region(registry_region: Option<&str>, cluster_location: &str) -> RegionCheck {
    match registry_region {
        None => RegionCheck::Unknown,
        Some(region) if is_private_link(region) => RegionCheck::PrivateLink,
        Some(region) if location_equals(region, cluster_location) => RegionCheck::Match,
        Some(region) => RegionCheck::Mismatch {
            registry: region.to_string(),
            cluster: cluster_location.to_string(),
        },
    }
}
