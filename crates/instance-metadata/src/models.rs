//! Core data models for instance metadata

use serde::{Deserialize, Deserializer, Serialize};

/// Reads a string field, treating JSON `null` like an absent field
fn null_as_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Option::<String>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// Identity of the running instance
///
/// Decoded from the `2012-08-10` `meta_data.json` document. Fields not
/// listed here are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceMetadata {
    #[serde(rename = "uuid", default, deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub availability_zone: String,
}

/// A network link (physical or virtual NIC) independent of any address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    #[serde(rename = "ethernet_mac_address", default, deserialize_with = "null_as_default")]
    pub mac_address: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub id: String,
}

/// A network attachment of the instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterfaceRecord {
    #[serde(default, deserialize_with = "null_as_default")]
    pub network_id: String,
    /// Not present for `*_dhcp` networks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(rename = "link", default, deserialize_with = "null_as_default")]
    pub link_id: String,
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    /// Copy of the link whose id equals `link_id`, filled in by the cross-referencer
    #[serde(skip)]
    pub resolved_link: Option<LinkRecord>,
}

impl NetworkInterfaceRecord {
    /// MAC address of the resolved link, if any
    pub fn mac_address(&self) -> Option<&str> {
        self.resolved_link
            .as_ref()
            .map(|link| link.mac_address.as_str())
    }
}

/// Auxiliary network service endpoint (e.g. DNS)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRecord {
    #[serde(rename = "type", default, deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub address: String,
}

/// Network topology decoded from the `2015-10-15` `network_data.json` document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTopology {
    #[serde(default)]
    pub links: Vec<LinkRecord>,
    #[serde(rename = "networks", default)]
    pub interfaces: Vec<NetworkInterfaceRecord>,
    #[serde(default)]
    pub services: Vec<ServiceRecord>,
}

impl NetworkTopology {
    /// True when the host reported no links, interfaces or services
    pub fn is_empty(&self) -> bool {
        self.links.is_empty() && self.interfaces.is_empty() && self.services.is_empty()
    }

    /// First interface attached to the given link
    pub fn interface_for_link(&self, link_id: &str) -> Option<&NetworkInterfaceRecord> {
        self.interfaces.iter().find(|iface| iface.link_id == link_id)
    }

    /// MAC addresses of all links, in document order
    pub fn mac_addresses(&self) -> Vec<&str> {
        self.links
            .iter()
            .map(|link| link.mac_address.as_str())
            .filter(|mac| !mac.is_empty())
            .collect()
    }

    /// Services of the given type, e.g. `"dns"`
    pub fn services_of_type<'a>(
        &'a self,
        kind: &'a str,
    ) -> impl Iterator<Item = &'a ServiceRecord> + 'a {
        self.services.iter().filter(move |svc| svc.kind == kind)
    }
}

/// Result of a successful retrieval, as stored in the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    pub instance: InstanceMetadata,
    pub network: Option<NetworkTopology>,
    /// Name of the source that produced this value
    pub source: String,
    /// Unix timestamp of the retrieval
    pub retrieved_at: i64,
}

impl ResolvedMetadata {
    pub fn new(
        instance: InstanceMetadata,
        network: Option<NetworkTopology>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            instance,
            network,
            source: source.into(),
            retrieved_at: chrono::Utc::now().timestamp(),
        }
    }
}
