//! Signature cache
//!
//! Remembers (sighash, pubkey, signature) triples that verified, keyed by
//! SHA256(nonce ∥ sighash ∥ pubkey ∥ sig) with a per-instance random nonce.
//! Entries are stored whole, so a lookup can only hit on an exact match.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::info;

use crate::constants::MAX_MAX_SIG_CACHE_SIZE;
use crate::types::Hash;

/// Candidate slots per entry
const SLOTS_PER_ENTRY: usize = 8;

/// Bounded set of 256-bit entries with cuckoo placement.
///
/// Each entry may live in one of eight slots derived from its bytes. An
/// insert that finds all eight occupied displaces an occupant into one of
/// its own alternatives, up to a depth limit, after which the last
/// displaced entry is dropped. Slots flagged for collection count as free.
struct CuckooSet {
    table: Vec<Option<Hash>>,
    collect: Vec<AtomicBool>,
    depth_limit: usize,
}

impl CuckooSet {
    fn with_capacity(elements: usize) -> Self {
        let size = elements.max(2);
        CuckooSet {
            table: vec![None; size],
            collect: (0..size).map(|_| AtomicBool::new(false)).collect(),
            depth_limit: (usize::BITS - size.leading_zeros()) as usize,
        }
    }

    fn size(&self) -> usize {
        self.table.len()
    }

    /// Slot candidates: each 32-bit word of the entry scaled onto the table
    fn locations(&self, entry: &Hash) -> [usize; SLOTS_PER_ENTRY] {
        let size = self.table.len() as u64;
        let mut locations = [0usize; SLOTS_PER_ENTRY];
        for (i, location) in locations.iter_mut().enumerate() {
            let word = u32::from_le_bytes([entry[4 * i], entry[4 * i + 1], entry[4 * i + 2], entry[4 * i + 3]]);
            *location = ((u64::from(word) * size) >> 32) as usize;
        }
        locations
    }

    /// Membership test; a hit may flag the slot for reuse
    fn contains(&self, entry: &Hash, erase: bool) -> bool {
        for location in self.locations(entry) {
            if self.table[location].as_ref() == Some(entry) {
                if erase {
                    self.collect[location].store(true, Ordering::Relaxed);
                }
                return true;
            }
        }
        false
    }

    fn is_free(&self, location: usize) -> bool {
        self.table[location].is_none() || self.collect[location].load(Ordering::Relaxed)
    }

    fn insert(&mut self, entry: Hash) {
        let mut entry = entry;
        let mut locations = self.locations(&entry);
        let mut last_location = locations[0];

        for _ in 0..self.depth_limit {
            for &location in &locations {
                if self.is_free(location) || self.table[location] == Some(entry) {
                    self.table[location] = Some(entry);
                    self.collect[location].store(false, Ordering::Relaxed);
                    return;
                }
            }

            // Evict from the slot after the one the displaced entry came from
            // so repeated swaps cycle through the candidates.
            let next = locations
                .iter()
                .position(|&l| l == last_location)
                .map_or(0, |i| (i + 1) % SLOTS_PER_ENTRY);
            last_location = locations[next];

            let Some(evicted) = self.table[last_location].replace(entry) else {
                return;
            };
            self.collect[last_location].store(false, Ordering::Relaxed);
            entry = evicted;
            locations = self.locations(&entry);
        }
        // the final displaced entry is dropped
    }
}

/// Process-lifetime memo of successful signature verifications
pub struct SignatureCache {
    nonce: Hash,
    set: RwLock<CuckooSet>,
}

impl SignatureCache {
    /// Cache sized from a budget in MiB, clamped to `[0, 16384]`.
    /// A zero budget still yields the two-element minimum.
    pub fn new(max_size_mib: usize) -> Self {
        let requested = max_size_mib.min(MAX_MAX_SIG_CACHE_SIZE) << 20;
        let elements = requested / std::mem::size_of::<Hash>();
        let set = CuckooSet::with_capacity(elements);
        let stored = set.size();
        info!(
            "Using {} MiB out of {} requested for signature cache, able to store {} elements",
            (stored * std::mem::size_of::<Hash>()) >> 20,
            requested >> 20,
            stored
        );

        let mut nonce = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut nonce);
        SignatureCache { nonce, set: RwLock::new(set) }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.set.read().map_or(0, |set| set.size())
    }

    pub fn compute_entry(&self, sighash: &Hash, pubkey: &[u8], sig: &[u8]) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.nonce);
        hasher.update(sighash);
        hasher.update(pubkey);
        hasher.update(sig);
        hasher.finalize().into()
    }

    /// Lookup under the shared lock; `erase` flags a hit for reuse
    pub fn get(&self, entry: &Hash, erase: bool) -> bool {
        match self.set.read() {
            Ok(set) => set.contains(entry, erase),
            Err(_) => false,
        }
    }

    /// Insert under the exclusive lock
    pub fn insert(&self, entry: Hash) {
        if let Ok(mut set) = self.set.write() {
            set.insert(entry);
        }
    }
}

impl Default for SignatureCache {
    fn default() -> Self {
        SignatureCache::new(crate::constants::DEFAULT_MAX_SIG_CACHE_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    #[test]
    fn test_minimum_size() {
        let cache = SignatureCache::new(0);
        assert_eq!(cache.capacity(), 2);
    }

    #[test]
    fn test_size_clamped() {
        let set = CuckooSet::with_capacity((1usize << 20) / 32);
        assert_eq!(set.size(), 32768);
        assert_eq!(set.depth_limit, 16);
    }

    #[test]
    fn test_insert_and_get() {
        let cache = SignatureCache::new(1);
        let entry = cache.compute_entry(&[1u8; 32], &[2u8; 33], &[3u8; 71]);
        assert!(!cache.get(&entry, false));
        cache.insert(entry);
        assert!(cache.get(&entry, false));
        assert!(!cache.get(&sha256(b"other"), false));
    }

    #[test]
    fn test_entry_depends_on_nonce() {
        let a = SignatureCache::new(0);
        let b = SignatureCache::new(0);
        let ea = a.compute_entry(&[1u8; 32], &[2u8; 33], &[3u8; 71]);
        let eb = b.compute_entry(&[1u8; 32], &[2u8; 33], &[3u8; 71]);
        assert_ne!(ea, eb);
        a.insert(ea);
        assert!(!b.get(&ea, false));
    }

    #[test]
    fn test_erased_slot_is_reused() {
        let mut set = CuckooSet::with_capacity(2);
        let first = sha256(b"first");
        set.insert(first);
        assert!(set.contains(&first, true));
        // still present until overwritten
        assert!(set.contains(&first, false));
        let location = set.locations(&first).into_iter().find(|&l| set.table[l] == Some(first)).unwrap();
        assert!(set.is_free(location));
    }

    #[test]
    fn test_many_inserts_keep_recent_entries() {
        let cache = SignatureCache::new(1);
        let entries: Vec<Hash> = (0u32..1000).map(|i| sha256(&i.to_le_bytes())).collect();
        for entry in &entries {
            cache.insert(*entry);
        }
        let hits = entries.iter().filter(|e| cache.get(e, false)).count();
        assert!(hits > 990);
    }
}
