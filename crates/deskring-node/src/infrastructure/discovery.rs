//! Discovery collaborator contract.
//!
//! The actual LAN browser (mDNS/DNS-SD) is an external collaborator; this
//! module only fixes the shape of what it feeds us and gates candidates so
//! we never dial a node we are already meshed with. A browser resolves a
//! service to an address, offers it here, and the gate asks the running node
//! whether the advertised service name is already a known ring member before
//! dialing.

use tracing::debug;

use super::ui_bridge::NodeHandle;

/// One resolved discovery candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredPeer {
    /// Dialable address, `"host:port"`.
    pub address: String,
    /// The advertised service name — by convention the node id.
    pub service_name: String,
}

/// Filters discovery candidates through the node's is-known predicate.
#[derive(Debug, Clone)]
pub struct DiscoveryGate {
    handle: NodeHandle,
}

impl DiscoveryGate {
    pub fn new(handle: NodeHandle) -> Self {
        Self { handle }
    }

    /// Offers a resolved candidate; dials it unless it is already known.
    ///
    /// Returns whether a dial was requested.
    pub async fn offer(&self, peer: DiscoveredPeer) -> bool {
        if self.handle.is_known(peer.service_name.clone()).await {
            debug!(service = %peer.service_name, "ignoring known node from discovery");
            return false;
        }
        debug!(service = %peer.service_name, address = %peer.address, "dialing discovered node");
        self.handle.connect(peer.address);
        true
    }
}
