// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Node identity, XOR distance, and the k-bucket routing table.

use std::collections::VecDeque;
use std::fmt;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

/// Bucket capacity (Kademlia's `k`).
pub const K: usize = 20;
/// Width of the id space in bits.
const ID_BITS: usize = 160;

/// A 160-bit node identifier, chosen uniformly at random at node startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(#[serde(with = "hex_bytes")] pub [u8; 20]);

impl NodeId {
    /// Pick a node id uniformly at random.
    #[must_use]
    pub fn random() -> Self {
        let mut bytes = [0u8; 20];
        rand::Rng::fill(&mut rand::thread_rng(), &mut bytes);
        Self(bytes)
    }

    /// Derive a lookup key's id by hashing it with SHA-1 — used for
    /// content keys (`worker:<id>`, `service:<type>`), not for node ids.
    #[must_use]
    pub fn from_key(key: &str) -> Self {
        let digest = Sha1::digest(key.as_bytes());
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    #[must_use]
    pub fn distance(&self, other: &Self) -> Distance {
        let mut out = [0u8; 20];
        for i in 0..20 {
            out[i] = self.0[i] ^ other.0[i];
        }
        Distance(out)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Option<Self> {
        let decoded = hex::decode(s).ok()?;
        let bytes: [u8; 20] = decoded.try_into().ok()?;
        Some(Self(bytes))
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8; 20], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 20], D::Error> {
        let s = String::deserialize(d)?;
        let decoded = hex::decode(&s).map_err(serde::de::Error::custom)?;
        decoded
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 20-byte node id"))
    }
}

/// XOR distance between two node ids. Ordering matches numeric distance.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Distance([u8; 20]);

impl Distance {
    #[must_use]
    pub fn leading_zeros(&self) -> u32 {
        for (i, byte) in self.0.iter().enumerate() {
            if *byte != 0 {
                return (i * 8) as u32 + byte.leading_zeros();
            }
        }
        ID_BITS as u32
    }

    /// Which of the 160 buckets a contact at this distance belongs in.
    #[must_use]
    pub fn bucket_index(&self) -> usize {
        let zeros = self.leading_zeros() as usize;
        if zeros >= ID_BITS {
            ID_BITS - 1
        } else {
            ID_BITS - 1 - zeros
        }
    }
}

/// A reachable DHT peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub node_id: NodeId,
    pub host: String,
    pub port: u16,
}

impl Contact {
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// One bucket: a bounded, least-recently-seen-evicted list of contacts.
#[derive(Default)]
struct Bucket {
    contacts: VecDeque<Contact>,
}

impl Bucket {
    fn touch(&mut self, contact: Contact) {
        if let Some(pos) = self.contacts.iter().position(|c| c.node_id == contact.node_id) {
            self.contacts.remove(pos);
            self.contacts.push_back(contact);
            return;
        }
        if self.contacts.len() >= K {
            // Kademlia would ping the head and evict only on failure; we
            // simplify to evict the least-recently-seen entry outright.
            self.contacts.pop_front();
        }
        self.contacts.push_back(contact);
    }

    fn remove(&mut self, node_id: &NodeId) {
        self.contacts.retain(|c| &c.node_id != node_id);
    }
}

/// The full set of 160 k-buckets for one local node.
pub struct RoutingTable {
    local_id: NodeId,
    buckets: Vec<RwLock<Bucket>>,
}

impl RoutingTable {
    #[must_use]
    pub fn new(local_id: NodeId) -> Self {
        let mut buckets = Vec::with_capacity(ID_BITS);
        for _ in 0..ID_BITS {
            buckets.push(RwLock::new(Bucket::default()));
        }
        Self { local_id, buckets }
    }

    /// Record or refresh a sighting of `contact`.
    pub fn observe(&self, contact: Contact) {
        if contact.node_id == self.local_id {
            return;
        }
        let idx = self.local_id.distance(&contact.node_id).bucket_index();
        self.buckets[idx].write().touch(contact);
    }

    pub fn remove(&self, node_id: &NodeId) {
        if *node_id == self.local_id {
            return;
        }
        let idx = self.local_id.distance(node_id).bucket_index();
        self.buckets[idx].write().remove(node_id);
    }

    /// The `count` contacts closest to `target`, across all buckets.
    #[must_use]
    pub fn closest(&self, target: &NodeId, count: usize) -> Vec<Contact> {
        let mut all: Vec<Contact> = self
            .buckets
            .iter()
            .flat_map(|b| b.read().contacts.iter().cloned().collect::<Vec<_>>())
            .collect();
        all.sort_by_key(|c| c.node_id.distance(target));
        all.truncate(count);
        all
    }

    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.buckets.iter().map(|b| b.read().contacts.len()).sum()
    }
}
