use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Up { cost: i64 },
    Down,
}

impl LinkStatus {
    pub fn is_up(self) -> bool {
        matches!(self, LinkStatus::Up { .. })
    }

    pub fn cost(self) -> Option<i64> {
        match self {
            LinkStatus::Up { cost } => Some(cost),
            LinkStatus::Down => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct NeighborLinks {
    links: HashMap<u32, LinkStatus>,
}

impl NeighborLinks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, neighbor_id: u32) -> Option<LinkStatus> {
        self.links.get(&neighbor_id).copied()
    }

    pub fn is_absent(&self, neighbor_id: u32) -> bool {
        self.status(neighbor_id).is_none()
    }

    pub fn set_up(&mut self, neighbor_id: u32, cost: i64) {
        self.links.insert(neighbor_id, LinkStatus::Up { cost });
    }

    pub fn set_down(&mut self, neighbor_id: u32) {
        self.links.insert(neighbor_id, LinkStatus::Down);
    }

    pub fn remove(&mut self, neighbor_id: u32) {
        self.links.remove(&neighbor_id);
    }

    pub fn up_neighbors(&self) -> impl Iterator<Item = (u32, i64)> + '_ {
        self.links.iter().filter_map(|(id, status)| match status {
            LinkStatus::Up { cost } => Some((*id, *cost)),
            LinkStatus::Down => None,
        })
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }
}

// Tracks the highest sequence number seen per originator instead of
// every (link_state_id, sequence_number) pair ever seen, which would
// grow without bound. Callers must check the LSDB for staleness before
// consulting this, since a sequence number can be stale relative to
// the highest seen without this type being able to tell the two apart.
#[derive(Debug, Default)]
pub struct ProcessedLsas {
    highest_seen: HashMap<u32, u64>,
}

impl ProcessedLsas {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark_and_check_duplicate(&mut self, link_state_id: u32, sequence_number: u64) -> bool {
        match self.highest_seen.get(&link_state_id) {
            Some(&highest) if sequence_number <= highest => true,
            _ => {
                self.highest_seen.insert(link_state_id, sequence_number);
                false
            }
        }
    }
}
