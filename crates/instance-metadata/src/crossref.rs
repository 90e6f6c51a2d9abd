//! Joins network interfaces to the links they reference

use crate::models::{LinkRecord, NetworkInterfaceRecord};

/// Attach to every interface a copy of the first link whose id equals the
/// interface's `link_id`.
///
/// Missing matches leave `resolved_link` empty. Links are scanned in
/// document order, so with duplicate ids the earliest one wins.
pub fn join(interfaces: &mut [NetworkInterfaceRecord], links: &[LinkRecord]) {
    for iface in interfaces.iter_mut() {
        iface.resolved_link = links
            .iter()
            .find(|link| link.id == iface.link_id)
            .cloned();
    }
}
