use crate::net::{Contact, NodeId};

/// A candidate route: a contiguous contact path starting at the routing node.
#[derive(Debug, Clone, PartialEq)]
pub struct Route {
    /// Start of the first contact (not adjusted to the current time).
    pub start_time: f64,
    /// End of the earliest-ending contact on the path.
    pub end_time: f64,
    /// Receiver of the first contact.
    pub neighbor_eid: NodeId,
    pub contact_path: Vec<Contact>,
    /// For each hop, the minimum end time of it and every following hop.
    pub effective_stop_times: Vec<f64>,
    /// Deterministic hash of the first contact, final ranking tie-break.
    pub entry_vid: u64,
}

impl Route {
    /// Build a route from a non-empty, contiguous contact path.
    pub fn from_path(contact_path: Vec<Contact>) -> Self {
        assert!(!contact_path.is_empty(), "route needs at least one contact");
        debug_assert!(
            contact_path
                .windows(2)
                .all(|w| w[0].rx_node == w[1].tx_node),
            "route contacts must be contiguous"
        );
        let first = contact_path[0];

        let mut effective_stop_times = vec![0.0; contact_path.len()];
        let mut min_stop = f64::INFINITY;
        for (i, c) in contact_path.iter().enumerate().rev() {
            min_stop = min_stop.min(c.end_time);
            effective_stop_times[i] = min_stop;
        }

        Self {
            start_time: first.start_time,
            end_time: min_stop,
            neighbor_eid: first.rx_node,
            effective_stop_times,
            entry_vid: contact_hash(&first),
            contact_path,
        }
    }

    pub fn hops(&self) -> usize {
        self.contact_path.len()
    }

    pub fn first_contact(&self) -> &Contact {
        &self.contact_path[0]
    }

    /// Product of the per-contact probabilities.
    pub fn path_probability(&self) -> f64 {
        self.contact_path.iter().map(Contact::probability).product()
    }
}

/// Stable 64-bit hash of a contact's identity fields.
pub fn contact_hash(c: &Contact) -> u64 {
    let mut h = mix64(c.tx_node.0 as u64);
    for word in [
        c.rx_node.0 as u64,
        c.start_time.to_bits(),
        c.end_time.to_bits(),
        c.bit_rate.to_bits(),
        c.delay.to_bits(),
    ] {
        h = mix64(h ^ word);
    }
    h
}

/// splitmix64
fn mix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}
