use std::collections::HashMap;
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use tracing::{info, warn};

use crate::model::lsa::{Link, LinkStatePacket};
use crate::model::lsdb::Lsdb;
use crate::model::messages::Frame;
use crate::model::neighbor::{LinkStatus, NeighborLinks, ProcessedLsas};
use crate::runtime::config::NodeConfig;
use crate::runtime::transport::{self, OutboundHandle};

struct Neighbors {
    connections: HashMap<u32, OutboundHandle>,
    links: NeighborLinks,
    processed: ProcessedLsas,
}

impl Neighbors {
    fn new() -> Self {
        Self {
            connections: HashMap::new(),
            links: NeighborLinks::new(),
            processed: ProcessedLsas::new(),
        }
    }
}

struct Inner {
    router_id: u32,
    bind_address: String,
    hello_interval: Duration,
    lsa_interval: Duration,
    lsa_jitter: Duration,
    lsa_ttl: u16,
    cancel: Arc<AtomicBool>,
    lsdb: Lsdb,
    neighbors: Mutex<Neighbors>,
}

// Cheap to clone: every field a background task needs already lives
// behind its own Arc/Mutex, so this is just a handle to shared state.
#[derive(Clone)]
pub struct LinkStateNode(Arc<Inner>);

impl LinkStateNode {
    pub fn new(config: &NodeConfig) -> Self {
        Self(Arc::new(Inner {
            router_id: config.router_id,
            bind_address: config.bind_address.clone(),
            hello_interval: Duration::from_secs(config.hello_interval_s),
            lsa_interval: Duration::from_secs(config.lsa_interval_s),
            lsa_jitter: Duration::from_secs(config.lsa_jitter_s),
            lsa_ttl: config.lsa_ttl,
            cancel: Arc::new(AtomicBool::new(true)),
            lsdb: Lsdb::new(),
            neighbors: Mutex::new(Neighbors::new()),
        }))
    }

    pub fn router_id(&self) -> u32 {
        self.0.router_id
    }

    pub fn lsdb(&self) -> &Lsdb {
        &self.0.lsdb
    }

    fn is_on(&self) -> bool {
        !self.0.cancel.load(Ordering::Relaxed)
    }

    fn lock_neighbors(&self) -> MutexGuard<'_, Neighbors> {
        self.0.neighbors.lock().expect("neighbor table lock poisoned")
    }

    pub fn turn_on(&self) -> Result<()> {
        let listener = transport::listen(&self.0.bind_address, self.0.router_id)
            .with_context(|| format!("node {} failed to bind its listener", self.0.router_id))?;
        listener
            .set_nonblocking(true)
            .context("failed to set listener to non-blocking mode")?;
        self.0.cancel.store(false, Ordering::Relaxed);

        let accept_node = self.clone();
        thread::spawn(move || accept_node.accept_loop(listener));

        self.0.lsdb.spawn_aging_thread(Arc::clone(&self.0.cancel));

        let hello_node = self.clone();
        thread::spawn(move || hello_node.run_periodic_hello());

        let lsa_node = self.clone();
        thread::spawn(move || lsa_node.run_periodic_lsa());

        info!(router_id = self.0.router_id, "node turned on");
        Ok(())
    }

    pub fn turn_off(&self) {
        self.0.cancel.store(true, Ordering::Relaxed);
        {
            let mut neighbors = self.lock_neighbors();
            for (_, handle) in neighbors.connections.drain() {
                handle.close();
            }
            neighbors.links.clear();
            neighbors.processed = ProcessedLsas::new();
        }
        self.0.lsdb.clear();
        info!(router_id = self.0.router_id, "node turned off");
    }

    pub fn show_peers(&self) -> Vec<u32> {
        let mut peers: Vec<u32> = self.lock_neighbors().connections.keys().copied().collect();
        peers.sort_unstable();
        peers
    }

    pub fn add_link(&self, neighbor_id: u32, cost: u32) {
        if !self.is_on() {
            warn!(router_id = self.0.router_id, "add_link called on an off node, ignoring");
            return;
        }

        let status = self.lock_neighbors().links.status(neighbor_id);
        match status {
            None => {
                if self.open_connection(neighbor_id, cost as i64) {
                    self.broadcast_hello();
                }
            }
            Some(LinkStatus::Down) => {
                if self.open_connection(neighbor_id, cost as i64) {
                    self.broadcast_hello();
                    if self.0.router_id < neighbor_id {
                        self.send_resync_to(neighbor_id);
                    }
                }
            }
            Some(LinkStatus::Up { .. }) => {
                warn!(router_id = self.0.router_id, neighbor_id, "link already up, ignoring add_link");
            }
        }
    }

    pub fn remove_link(&self, neighbor_id: u32) {
        {
            let mut neighbors = self.lock_neighbors();
            if let Some(handle) = neighbors.connections.remove(&neighbor_id) {
                handle.close();
            }
            neighbors.links.remove(neighbor_id);
        }
        self.0.lsdb.remove(neighbor_id);
        self.broadcast_hello();
    }

    fn open_connection(&self, neighbor_id: u32, cost: i64) -> bool {
        let stream = match transport::connect(&self.0.bind_address, neighbor_id) {
            Ok(stream) => stream,
            Err(err) => {
                warn!(router_id = self.0.router_id, neighbor_id, error = %err, "failed to connect to neighbor");
                return false;
            }
        };
        let (handle, reader_half) = match OutboundHandle::new(stream) {
            Ok(pair) => pair,
            Err(err) => {
                warn!(router_id = self.0.router_id, neighbor_id, error = %err, "failed to split outbound connection");
                return false;
            }
        };

        {
            let mut neighbors = self.lock_neighbors();
            neighbors.connections.insert(neighbor_id, handle.clone());
            neighbors.links.set_up(neighbor_id, cost);
        }
        self.spawn_reader(reader_half, handle);
        true
    }

    fn accept_loop(&self, listener: TcpListener) {
        while self.is_on() {
            match listener.accept() {
                Ok((stream, _addr)) => match OutboundHandle::new(stream) {
                    Ok((handle, reader_half)) => {
                        // neighbor id is unknown until its first hello
                        self.spawn_reader(reader_half, handle);
                    }
                    Err(err) => {
                        warn!(router_id = self.0.router_id, error = %err, "failed to split accepted connection");
                    }
                },
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(Duration::from_millis(50));
                }
                Err(err) => {
                    warn!(router_id = self.0.router_id, error = %err, "accept failed");
                    thread::sleep(Duration::from_millis(50));
                }
            }
        }
    }

    fn spawn_reader(&self, reader_half: std::net::TcpStream, handle: OutboundHandle) {
        let frame_node = self.clone();
        let frame_handle = handle.clone();
        let closed_node = self.clone();
        transport::spawn_frame_reader(
            reader_half,
            move |frame| frame_node.handle_frame(frame, frame_handle.clone()),
            move || closed_node.handle_stream_closed(handle),
        );
    }

    fn handle_frame(&self, frame: Frame, handle: OutboundHandle) {
        match frame {
            Frame::Hello { id, cost } => self.handle_hello(id, cost as i64, handle),
            Frame::Lsa { id, lsas } => self.handle_lsa(id, lsas),
            Frame::Resync { id, lsas } => self.handle_resync(id, lsas),
        }
    }

    fn handle_stream_closed(&self, handle: OutboundHandle) {
        if !self.is_on() {
            return;
        }
        let dead_neighbor = {
            let mut neighbors = self.lock_neighbors();
            let found = neighbors
                .connections
                .iter()
                .find(|(_, h)| **h == handle)
                .map(|(id, _)| *id);
            if let Some(neighbor_id) = found {
                neighbors.connections.remove(&neighbor_id);
                neighbors.links.set_down(neighbor_id);
            }
            found
        };

        let Some(neighbor_id) = dead_neighbor else {
            return;
        };
        info!(router_id = self.0.router_id, neighbor_id, "link to neighbor presumed down");
        self.0.lsdb.remove(neighbor_id);

        if let Some(mut own_lsa) = self.0.lsdb.get(self.0.router_id) {
            own_lsa.links.retain(|link| link.link_id != neighbor_id);
            own_lsa.sequence_number += 1;
            self.0.lsdb.add(self.0.router_id, own_lsa.clone());
            self.flood_lsa(own_lsa, None);
        }
    }

    fn handle_hello(&self, sender_id: u32, cost: i64, handle: OutboundHandle) {
        let was_down = matches!(self.lock_neighbors().links.status(sender_id), Some(LinkStatus::Down));

        if was_down {
            info!(router_id = self.0.router_id, sender_id, "link to neighbor has come up again");
            {
                let mut neighbors = self.lock_neighbors();
                neighbors.connections.insert(sender_id, handle.clone());
                neighbors.links.set_up(sender_id, cost);
            }
            if self.0.router_id < sender_id {
                self.append_link_to_own_lsa(sender_id, cost);
                self.send_resync_to(sender_id);
            }
        }

        let mut neighbors = self.lock_neighbors();
        if !neighbors.connections.contains_key(&sender_id) {
            neighbors.connections.insert(sender_id, handle);
            neighbors.links.set_up(sender_id, cost);
        } else {
            neighbors.links.set_up(sender_id, cost);
        }
    }

    fn append_link_to_own_lsa(&self, neighbor_id: u32, cost: i64) {
        if let Some(mut own_lsa) = self.0.lsdb.get(self.0.router_id) {
            own_lsa.links.push(Link::new(neighbor_id, cost as u32));
            own_lsa.sequence_number += 1;
            self.0.lsdb.add(self.0.router_id, own_lsa);
        }
    }

    // Replaces on sequence_number >= existing, unlike handle_resync which
    // only installs on strict >.
    //
    // Staleness is checked against the LSDB before the dedup map, not
    // after: the map only remembers the highest sequence number seen per
    // originator, so a sequence that's stale relative to that highest
    // would otherwise look "already processed" and get silently dropped
    // instead of triggering the correction send-back.
    fn handle_lsa(&self, sender_id: u32, lsas: Vec<LinkStatePacket>) {
        for lsa in lsas {
            if let Some(existing) = self.0.lsdb.get(lsa.link_state_id) {
                if lsa.sequence_number < existing.sequence_number {
                    self.send_frame_to(
                        sender_id,
                        &Frame::Lsa {
                            id: self.0.router_id,
                            lsas: vec![existing],
                        },
                    );
                    continue;
                }
            }

            let duplicate = self
                .lock_neighbors()
                .processed
                .mark_and_check_duplicate(lsa.link_state_id, lsa.sequence_number);
            if duplicate {
                continue;
            }

            let link_state_id = lsa.link_state_id;
            self.0.lsdb.add(link_state_id, lsa.clone());
            self.flood_lsa(lsa, Some(sender_id));
        }
    }

    fn handle_resync(&self, sender_id: u32, lsas: Vec<LinkStatePacket>) {
        if self.0.router_id > sender_id {
            self.send_resync_to(sender_id);
        }
        for lsa in lsas {
            let install = match self.0.lsdb.get(lsa.link_state_id) {
                None => true,
                Some(existing) => lsa.sequence_number > existing.sequence_number,
            };
            if install {
                self.0.lsdb.add(lsa.link_state_id, lsa);
            }
        }
        self.originate_own_lsa();
    }

    fn originate_own_lsa(&self) {
        let links: Vec<Link> = {
            let neighbors = self.lock_neighbors();
            neighbors
                .connections
                .keys()
                .filter_map(|id| neighbors.links.status(*id).and_then(LinkStatus::cost).map(|cost| Link::new(*id, cost as u32)))
                .collect()
        };

        let lsa = match self.0.lsdb.get(self.0.router_id) {
            None => LinkStatePacket::new(self.0.router_id, 0, links, self.0.lsa_ttl),
            Some(previous) => LinkStatePacket::new(self.0.router_id, previous.sequence_number + 1, links, self.0.lsa_ttl),
        };
        self.0.lsdb.add(self.0.router_id, lsa.clone());
        self.flood_lsa(lsa, None);
    }

    fn flood_lsa(&self, lsa: LinkStatePacket, except: Option<u32>) {
        let targets: Vec<u32> = {
            let neighbors = self.lock_neighbors();
            neighbors
                .connections
                .keys()
                .copied()
                .filter(|id| Some(*id) != except)
                .collect()
        };
        for neighbor_id in targets {
            self.send_frame_to(
                neighbor_id,
                &Frame::Lsa {
                    id: self.0.router_id,
                    lsas: vec![lsa.clone()],
                },
            );
        }
    }

    fn send_resync_to(&self, target_id: u32) {
        let lsas: Vec<LinkStatePacket> = self
            .0
            .lsdb
            .snapshot()
            .into_iter()
            .filter(|(key, _)| *key != target_id)
            .map(|(_, lsa)| lsa)
            .collect();
        self.send_frame_to(
            target_id,
            &Frame::Resync {
                id: self.0.router_id,
                lsas,
            },
        );
    }

    fn send_frame_to(&self, neighbor_id: u32, frame: &Frame) {
        let handle = self.lock_neighbors().connections.get(&neighbor_id).cloned();
        if let Some(handle) = handle {
            if let Err(err) = handle.send_frame(frame) {
                warn!(router_id = self.0.router_id, neighbor_id, error = %err, "failed to send frame");
            }
        }
    }

    fn broadcast_hello(&self) {
        let targets: Vec<(u32, i64)> = {
            let neighbors = self.lock_neighbors();
            neighbors
                .connections
                .keys()
                .filter_map(|id| neighbors.links.status(*id).and_then(LinkStatus::cost).map(|cost| (*id, cost)))
                .collect()
        };
        for (neighbor_id, cost) in targets {
            self.send_frame_to(
                neighbor_id,
                &Frame::Hello {
                    id: self.0.router_id,
                    cost: cost as u32,
                },
            );
        }
    }

    fn run_periodic_hello(&self) {
        while self.is_on() {
            thread::sleep(self.0.hello_interval);
            if !self.is_on() {
                break;
            }
            self.broadcast_hello();
        }
    }

    fn run_periodic_lsa(&self) {
        let mut rng = rand::thread_rng();
        while self.is_on() {
            let jitter_s = self.0.lsa_jitter.as_secs();
            let offset = if jitter_s == 0 { 0 } else { rng.gen_range(0..=2 * jitter_s) };
            let sleep_for = self.0.lsa_interval.saturating_sub(self.0.lsa_jitter) + Duration::from_secs(offset);
            thread::sleep(sleep_for);
            if !self.is_on() {
                break;
            }
            self.originate_own_lsa();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn test_config(router_id: u32) -> NodeConfig {
        // Real deployments use 15s/30±5s; tests shrink these so
        // convergence (which relies on the periodic LSA thread, not
        // just add_link/hello) happens well inside the wait budget.
        NodeConfig {
            router_id,
            bind_address: "127.0.0.1".to_string(),
            hello_interval_s: 1,
            lsa_interval_s: 1,
            lsa_jitter_s: 0,
            lsa_ttl: 60,
            initial_links: vec![],
        }
    }

    fn wait_until(mut condition: impl FnMut() -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        condition()
    }

    #[test]
    fn two_node_ring_converges() {
        let node1 = LinkStateNode::new(&test_config(18080));
        let node2 = LinkStateNode::new(&test_config(18081));
        node1.turn_on().unwrap();
        node2.turn_on().unwrap();
        thread::sleep(Duration::from_millis(100));

        node1.add_link(18081, 1);

        assert!(wait_until(
            || node1.lsdb().snapshot().len() == 2 && node2.lsdb().snapshot().len() == 2,
            Duration::from_secs(5)
        ));

        let node1_lsa_for_2 = node2.lsdb().get(18080).unwrap();
        assert_eq!(node1_lsa_for_2.links, vec![Link::new(18081, 1)]);
        let node2_lsa_for_1 = node1.lsdb().get(18081).unwrap();
        assert_eq!(node2_lsa_for_1.links, vec![Link::new(18080, 1)]);

        node1.turn_off();
        node2.turn_off();
    }

    #[test]
    fn remove_link_propagates_an_empty_own_lsa() {
        let node1 = LinkStateNode::new(&test_config(18090));
        let node2 = LinkStateNode::new(&test_config(18091));
        node1.turn_on().unwrap();
        node2.turn_on().unwrap();
        thread::sleep(Duration::from_millis(100));
        node1.add_link(18091, 3);
        assert!(wait_until(|| node2.lsdb().get(18090).is_some(), Duration::from_secs(5)));

        node1.remove_link(18091);
        assert!(wait_until(
            || node1.lsdb().get(18090).map(|lsa| lsa.links.is_empty()).unwrap_or(false),
            Duration::from_secs(5)
        ));

        node1.turn_off();
        node2.turn_off();
    }

    #[test]
    fn disconnect_marks_neighbor_down_and_strips_own_lsa() {
        let node1 = LinkStateNode::new(&test_config(18100));
        let node2 = LinkStateNode::new(&test_config(18101));
        node1.turn_on().unwrap();
        node2.turn_on().unwrap();
        thread::sleep(Duration::from_millis(100));
        node1.add_link(18101, 2);
        assert!(wait_until(|| node2.lsdb().get(18100).is_some(), Duration::from_secs(5)));

        node2.turn_off();

        assert!(wait_until(
            || node1.lsdb().get(18100).map(|lsa| lsa.links.is_empty()).unwrap_or(false),
            Duration::from_secs(5)
        ));
        assert!(wait_until(|| node1.show_peers().is_empty(), Duration::from_secs(5)));

        node1.turn_off();
    }

    #[test]
    fn stale_lsa_triggers_correction_to_sender() {
        let node_a = LinkStateNode::new(&test_config(18130));
        let node_b = LinkStateNode::new(&test_config(18131));
        node_a.turn_on().unwrap();
        node_b.turn_on().unwrap();
        thread::sleep(Duration::from_millis(100));
        node_a.add_link(18131, 1);
        assert!(wait_until(|| node_b.show_peers() == vec![18130], Duration::from_secs(5)));

        let originator = 9999;
        // Install seq 5 through the real handler, so the dedup map's
        // highest-seen entry for `originator` is populated the same way
        // it would be from genuine flooding, not by seeding the LSDB
        // directly underneath it.
        node_b.handle_lsa(0, vec![LinkStatePacket::new(originator, 5, vec![], 60)]);
        assert_eq!(node_b.lsdb().get(originator).map(|lsa| lsa.sequence_number), Some(5));

        // node_a now forwards a stale copy of `originator`'s LSA to node_b.
        node_b.handle_lsa(18130, vec![LinkStatePacket::new(originator, 3, vec![], 60)]);

        assert!(wait_until(
            || node_a.lsdb().get(originator).map(|lsa| lsa.sequence_number) == Some(5),
            Duration::from_secs(3)
        ));

        node_a.turn_off();
        node_b.turn_off();
    }

    #[test]
    fn show_peers_reflects_only_connected_neighbors() {
        let node1 = LinkStateNode::new(&test_config(18110));
        let node2 = LinkStateNode::new(&test_config(18111));
        node1.turn_on().unwrap();
        node2.turn_on().unwrap();
        thread::sleep(Duration::from_millis(100));
        assert!(node1.show_peers().is_empty());

        node1.add_link(18111, 1);
        assert!(wait_until(|| node1.show_peers() == vec![18111], Duration::from_secs(5)));

        node1.turn_off();
        node2.turn_off();
    }
}
