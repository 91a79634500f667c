use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub link_id: u32,
    pub cost: u32,
}

impl Link {
    pub fn new(link_id: u32, cost: u32) -> Self {
        Self { link_id, cost }
    }
}

// router_id and link_state_id both name the originator; kept distinct
// only to preserve the on-wire field shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkStatePacket {
    pub router_id: u32,
    pub sequence_number: u64,
    pub link_state_id: u32,
    pub links: Vec<Link>,
    pub ttl: u16,
}

impl LinkStatePacket {
    pub fn new(router_id: u32, sequence_number: u64, links: Vec<Link>, ttl: u16) -> Self {
        Self {
            router_id,
            sequence_number,
            link_state_id: router_id,
            links,
            ttl,
        }
    }
}

// Identity is the (router_id, sequence_number, link_state_id) triple,
// not the link list or TTL.
impl PartialEq for LinkStatePacket {
    fn eq(&self, other: &Self) -> bool {
        self.router_id == other.router_id
            && self.sequence_number == other.sequence_number
            && self.link_state_id == other.link_state_id
    }
}

impl Eq for LinkStatePacket {}

impl Hash for LinkStatePacket {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.router_id.hash(state);
        self.sequence_number.hash(state);
        self.link_state_id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_ignores_links_and_ttl() {
        let a = LinkStatePacket::new(1, 3, vec![Link::new(2, 5)], 60);
        let b = LinkStatePacket::new(1, 3, vec![], 10);
        assert_eq!(a, b);
    }

    #[test]
    fn identity_distinguishes_sequence_number() {
        let a = LinkStatePacket::new(1, 3, vec![], 60);
        let b = LinkStatePacket::new(1, 4, vec![], 60);
        assert_ne!(a, b);
    }
}
