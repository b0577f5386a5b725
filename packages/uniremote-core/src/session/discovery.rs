//! Discovery list: candidates found on the network, deduplicated by name.

use serde::Serialize;

use crate::transport::PeerCandidate;

/// What the presentation layer should offer after discovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "peers", rename_all = "camelCase")]
pub enum ServerSelection {
    /// No servers found; prompt the user to retry.
    None,
    /// Exactly one server; it is connected automatically.
    Single(PeerCandidate),
    /// Several servers; the user picks one.
    Multiple(Vec<PeerCandidate>),
}

/// Result of adding a candidate.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Added {
    /// Same display name already listed.
    Duplicate,
    /// First candidate in the list.
    Only(PeerCandidate),
    /// Listed alongside others.
    AmongMany(Vec<PeerCandidate>),
}

#[derive(Debug, Default)]
pub(crate) struct DiscoveryList {
    peers: Vec<PeerCandidate>,
}

impl DiscoveryList {
    pub(crate) fn add(&mut self, candidate: PeerCandidate) -> Added {
        if self
            .peers
            .iter()
            .any(|peer| peer.display_name == candidate.display_name)
        {
            return Added::Duplicate;
        }
        self.peers.push(candidate.clone());
        if self.peers.len() == 1 {
            Added::Only(candidate)
        } else {
            Added::AmongMany(self.peers.clone())
        }
    }

    pub(crate) fn remove(&mut self, display_name: &str) -> bool {
        let before = self.peers.len();
        self.peers.retain(|peer| peer.display_name != display_name);
        self.peers.len() < before
    }

    pub(crate) fn clear(&mut self) {
        self.peers.clear();
    }

    pub(crate) fn peers(&self) -> &[PeerCandidate] {
        &self.peers
    }

    pub(crate) fn selection(&self) -> ServerSelection {
        match self.peers.as_slice() {
            [] => ServerSelection::None,
            [only] => ServerSelection::Single(only.clone()),
            many => ServerSelection::Multiple(many.to_vec()),
        }
    }
}
