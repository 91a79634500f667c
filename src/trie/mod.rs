// Octet-decomposed IPv4 longest-prefix-match trie. Each CIDR is stored
// at its boundary octet (the octet the mask boundary falls within), so
// a lookup walks at most four trie levels.

use std::collections::{BTreeSet, HashMap};

type Route = (String, String);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Winner {
    prefix_len: u8,
    cidr: String,
    route_name: String,
}

#[derive(Debug, Default)]
struct Node {
    children: HashMap<u8, Node>,
    routes: BTreeSet<Route>,
    winner: Option<Winner>,
}

#[derive(Debug, Default)]
pub struct LpmTrie {
    root: Node,
}

impl LpmTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, cidr: &str, route_name: &str) {
        let (network, mask) = parse_cidr(cidr);
        let boundary = boundary_octet(mask);
        let path: Vec<u8> = (0..boundary).map(|i| byte_at(network, i)).collect();
        let fanout = fanout_keys(network, mask, boundary);

        let mut node = &mut self.root;
        for key in &path {
            node = node.children.entry(*key).or_default();
        }
        for key in &fanout {
            let child = node.children.entry(*key).or_default();
            child.routes.insert((cidr.to_string(), route_name.to_string()));
            let should_promote = match &child.winner {
                None => true,
                Some(current) => current.prefix_len < mask,
            };
            if should_promote {
                child.winner = Some(Winner {
                    prefix_len: mask,
                    cidr: cidr.to_string(),
                    route_name: route_name.to_string(),
                });
            }
        }
    }

    // A prefix that was never inserted, or whose path was pruned by an
    // earlier remove, is a silent no-op.
    pub fn remove(&mut self, cidr: &str, route_name: &str) {
        let (network, mask) = parse_cidr(cidr);
        let boundary = boundary_octet(mask);
        let path: Vec<u8> = (0..boundary).map(|i| byte_at(network, i)).collect();
        let fanout = fanout_keys(network, mask, boundary);

        {
            let mut node = &self.root;
            for key in &path {
                match node.children.get(key) {
                    Some(child) => node = child,
                    None => return,
                }
            }
            for key in &fanout {
                if !node.children.contains_key(key) {
                    return;
                }
            }
        }

        let mut node = &mut self.root;
        for key in &path {
            node = node.children.get_mut(key).expect("path verified to exist above");
        }
        let route = (cidr.to_string(), route_name.to_string());
        for key in &fanout {
            if let Some(child) = node.children.get_mut(key) {
                child.routes.remove(&route);
                recompute_winner(child);
            }
        }

        prune(&mut self.root, &path, 0, &fanout);
    }

    pub fn search(&self, ip: &str) -> Option<(u8, String, String)> {
        let addr = parse_ipv4(ip);
        let mut node = &self.root;
        let mut best: Option<(u8, String, String)> = None;
        for i in 0..4 {
            let byte = byte_at(addr, i);
            let child = match node.children.get(&byte) {
                Some(child) => child,
                None => break,
            };
            node = child;
            if let Some(winner) = &node.winner {
                if best.as_ref().map_or(true, |(len, ..)| winner.prefix_len > *len) {
                    best = Some((winner.prefix_len, winner.cidr.clone(), winner.route_name.clone()));
                }
            }
        }
        best
    }
}

fn recompute_winner(node: &mut Node) {
    node.winner = node
        .routes
        .iter()
        .map(|(cidr, route_name)| {
            let mask = cidr
                .rsplit('/')
                .next()
                .expect("cidr always contains '/'")
                .parse::<u8>()
                .expect("cidr mask is a valid u8");
            (mask, cidr.clone(), route_name.clone())
        })
        // Tie-break deterministically on the greatest CIDR string when
        // masks are equal, so recompute is independent of set iteration
        // order.
        .max_by(|(len_a, cidr_a, _), (len_b, cidr_b, _)| len_a.cmp(len_b).then(cidr_a.cmp(cidr_b)))
        .map(|(prefix_len, cidr, route_name)| Winner {
            prefix_len,
            cidr,
            route_name,
        });
}

fn prune(node: &mut Node, path: &[u8], depth: usize, fanout: &[u8]) -> bool {
    if depth == path.len() {
        for key in fanout {
            let is_empty = node
                .children
                .get(key)
                .map(|child| child.routes.is_empty() && child.children.is_empty())
                .unwrap_or(false);
            if is_empty {
                node.children.remove(key);
            }
        }
    } else {
        let key = path[depth];
        if let Some(child) = node.children.get_mut(&key) {
            if prune(child, path, depth + 1, fanout) {
                node.children.remove(&key);
            }
        }
    }
    node.routes.is_empty() && node.children.is_empty()
}

fn boundary_octet(mask: u8) -> usize {
    let mut octet = (mask / 8) as usize;
    if mask % 8 == 0 && mask != 0 {
        octet -= 1;
    }
    octet
}

fn fanout_keys(network: u32, mask: u8, boundary: usize) -> Vec<u8> {
    let mask_num = byte_at(network, boundary) as u32;
    let shift = 8 * (boundary as u32 + 1) - mask as u32;
    let count = 1u32 << shift;
    (0..count).map(|j| ((mask_num + j) & 0xFF) as u8).collect()
}

fn byte_at(addr: u32, index: usize) -> u8 {
    ((addr >> (24 - 8 * index)) & 0xFF) as u8
}

fn parse_ipv4(ip: &str) -> u32 {
    let mut octets = ip.split('.').map(|part| part.parse::<u32>().expect("valid IPv4 octet"));
    let mut addr = 0u32;
    for i in 0..4 {
        let octet = octets.next().expect("IPv4 address has four octets");
        addr |= octet << (24 - 8 * i);
    }
    addr
}

fn parse_cidr(cidr: &str) -> (u32, u8) {
    let (network, mask) = cidr.split_once('/').expect("cidr contains a '/'");
    (parse_ipv4(network), mask.parse().expect("valid mask length"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_with_no_longer_prefix() {
        let mut trie = LpmTrie::new();
        trie.insert("10.0.0.0/8", "a");
        assert_eq!(
            trie.search("10.2.0.0"),
            Some((8, "10.0.0.0/8".to_string(), "a".to_string()))
        );
    }

    #[test]
    fn longest_prefix_wins_over_shorter_covering_prefix() {
        let mut trie = LpmTrie::new();
        trie.insert("10.0.0.0/8", "a");
        trie.insert("10.1.0.0/16", "b");
        assert_eq!(
            trie.search("10.1.2.3"),
            Some((16, "10.1.0.0/16".to_string(), "b".to_string()))
        );
        assert_eq!(
            trie.search("10.2.0.0"),
            Some((8, "10.0.0.0/8".to_string(), "a".to_string()))
        );
    }

    #[test]
    fn default_route_matches_everything() {
        let mut trie = LpmTrie::new();
        trie.insert("0.0.0.0/0", "default");
        assert_eq!(
            trie.search("8.8.8.8"),
            Some((0, "0.0.0.0/0".to_string(), "default".to_string()))
        );
    }

    #[test]
    fn insert_then_remove_restores_prior_search_result() {
        let mut trie = LpmTrie::new();
        trie.insert("10.0.0.0/8", "a");
        trie.insert("10.1.0.0/16", "b");
        trie.remove("10.1.0.0/16", "b");
        assert_eq!(
            trie.search("10.1.2.3"),
            Some((8, "10.0.0.0/8".to_string(), "a".to_string()))
        );
    }

    #[test]
    fn remove_last_route_prunes_node_and_leaves_no_match() {
        let mut trie = LpmTrie::new();
        trie.insert("192.168.1.0/24", "a");
        trie.remove("192.168.1.0/24", "a");
        assert_eq!(trie.search("192.168.1.5"), None);
        assert!(trie.root.children.is_empty());
    }

    #[test]
    fn search_outside_any_prefix_returns_none() {
        let mut trie = LpmTrie::new();
        trie.insert("10.0.0.0/8", "a");
        assert_eq!(trie.search("192.168.1.1"), None);
    }

    #[test]
    fn remove_of_nonexistent_route_is_a_no_op() {
        let mut trie = LpmTrie::new();
        trie.insert("10.0.0.0/8", "a");
        trie.remove("172.16.0.0/12", "ghost");
        assert_eq!(
            trie.search("10.1.2.3"),
            Some((8, "10.0.0.0/8".to_string(), "a".to_string()))
        );
    }

    #[test]
    fn removal_recompute_breaks_same_cidr_ties_on_route_name() {
        // Three named routes for the identical prefix share one boundary
        // node; removing one forces a recompute among the survivors.
        let mut trie = LpmTrie::new();
        trie.insert("10.1.0.0/16", "a");
        trie.insert("10.1.0.0/16", "b");
        trie.insert("10.1.0.0/16", "c");
        trie.remove("10.1.0.0/16", "a");
        assert_eq!(
            trie.search("10.1.2.3"),
            Some((16, "10.1.0.0/16".to_string(), "c".to_string()))
        );
    }

    #[test]
    fn host_route_uses_single_child_at_last_octet() {
        let mut trie = LpmTrie::new();
        trie.insert("10.0.0.1/32", "host");
        assert_eq!(
            trie.search("10.0.0.1"),
            Some((32, "10.0.0.1/32".to_string(), "host".to_string()))
        );
        assert_eq!(trie.search("10.0.0.2"), None);
    }
}
