//! Shared transposition table.
//!
//! A flat open-addressed array indexed by `key % capacity`, guarded by a
//! reader/writer lock. Every entry stores the full key, so a probe either
//! misses or returns data for exactly the requested position; the stored
//! move is still re-verified against the legal move list before use.

use parking_lot::RwLock;

use crate::mv::Move;

use super::MATE_THRESHOLD;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TTFlag {
    Empty = 0,
    Exact = 1,
    LowerBound = 2,
    UpperBound = 3,
}

#[derive(Debug, Clone, Copy)]
pub struct TTEntry {
    pub key: u64,
    pub depth: i16,
    pub score: i16,
    pub mv: Move,
    pub flag: TTFlag,
    pub generation: u8,
}

impl Default for TTEntry {
    fn default() -> TTEntry {
        TTEntry {
            key: 0,
            depth: -1,
            score: 0,
            mv: Move::NULL,
            flag: TTFlag::Empty,
            generation: 0,
        }
    }
}

/// Mate scores are stored as distance-from-node rather than
/// distance-from-root, so an entry stays valid wherever it is probed.
pub fn to_tt_score(score: i32, ply: i32) -> i32 {
    if score > MATE_THRESHOLD {
        score + ply
    } else if score < -MATE_THRESHOLD {
        score - ply
    } else {
        score
    }
}

pub fn from_tt_score(score: i32, ply: i32) -> i32 {
    if score > MATE_THRESHOLD {
        score - ply
    } else if score < -MATE_THRESHOLD {
        score + ply
    } else {
        score
    }
}

pub struct TranspositionTable {
    entries: RwLock<Vec<TTEntry>>,
}

impl TranspositionTable {
    pub fn new(capacity: usize) -> TranspositionTable {
        let capacity = capacity.max(1);
        TranspositionTable {
            entries: RwLock::new(vec![TTEntry::default(); capacity]),
        }
    }

    pub fn with_size_mb(megabytes: usize) -> TranspositionTable {
        let bytes = megabytes.max(1) * 1024 * 1024;
        TranspositionTable::new(bytes / std::mem::size_of::<TTEntry>())
    }

    pub fn resize(&self, capacity: usize) {
        let capacity = capacity.max(1);
        let mut entries = self.entries.write();
        entries.clear();
        entries.resize(capacity, TTEntry::default());
    }

    pub fn resize_mb(&self, megabytes: usize) {
        let bytes = megabytes.max(1) * 1024 * 1024;
        self.resize(bytes / std::mem::size_of::<TTEntry>());
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write();
        let capacity = entries.len();
        entries.clear();
        entries.resize(capacity, TTEntry::default());
    }

    pub fn capacity(&self) -> usize {
        self.entries.read().len()
    }

    /// Looks up `key`; the returned score has its mate distance rebased to
    /// `ply`.
    pub fn probe(&self, key: u64, ply: i32) -> Option<TTEntry> {
        let entries = self.entries.read();
        let slot = (key % entries.len() as u64) as usize;
        let entry = entries[slot];
        if entry.flag != TTFlag::Empty && entry.key == key {
            let mut entry = entry;
            entry.score = from_tt_score(entry.score as i32, ply) as i16;
            Some(entry)
        } else {
            None
        }
    }

    /// Stores an entry, replacing the slot when it is empty, shallower than
    /// the new depth, or from an older search generation.
    pub fn store(
        &self,
        key: u64,
        depth: i32,
        score: i32,
        mv: Move,
        flag: TTFlag,
        ply: i32,
        generation: u8,
    ) {
        let mut entries = self.entries.write();
        let slot = (key % entries.len() as u64) as usize;
        let entry = &mut entries[slot];
        if entry.flag == TTFlag::Empty || entry.depth <= depth as i16 || entry.generation != generation
        {
            entry.key = key;
            entry.depth = depth as i16;
            entry.score = to_tt_score(score, ply) as i16;
            entry.mv = mv;
            entry.flag = flag;
            entry.generation = generation;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mv::flag;

    #[test]
    fn mate_scores_round_trip() {
        for ply in 0..64 {
            for score in [31_900, -31_900, 150, 0, -150] {
                assert_eq!(from_tt_score(to_tt_score(score, ply), ply), score);
            }
        }
    }

    #[test]
    fn store_then_probe_returns_entry() {
        let tt = TranspositionTable::new(1024);
        let mv = Move::new(12, 28, flag::DOUBLE_PUSH);
        tt.store(0xDEAD_BEEF, 5, 42, mv, TTFlag::Exact, 3, 1);

        let entry = tt.probe(0xDEAD_BEEF, 3).expect("entry should be present");
        assert_eq!(entry.key, 0xDEAD_BEEF);
        assert_eq!(entry.depth, 5);
        assert_eq!(entry.score, 42);
        assert_eq!(entry.mv, mv);
        assert_eq!(entry.flag, TTFlag::Exact);
    }

    #[test]
    fn colliding_key_misses() {
        let tt = TranspositionTable::new(16);
        tt.store(16, 3, 10, Move::NULL, TTFlag::Exact, 0, 0);
        // Same slot (32 % 16 == 16 % 16), different key.
        assert!(tt.probe(32, 0).is_none());
        assert!(tt.probe(16, 0).is_some());
    }

    #[test]
    fn shallower_entries_do_not_replace_same_generation() {
        let tt = TranspositionTable::new(8);
        tt.store(8, 9, 100, Move::NULL, TTFlag::Exact, 0, 7);
        tt.store(8, 2, -5, Move::NULL, TTFlag::LowerBound, 0, 7);
        let entry = tt.probe(8, 0).unwrap();
        assert_eq!(entry.depth, 9);
        assert_eq!(entry.score, 100);

        // A new generation evicts regardless of depth.
        tt.store(8, 2, -5, Move::NULL, TTFlag::LowerBound, 0, 8);
        assert_eq!(tt.probe(8, 0).unwrap().depth, 2);
    }

    #[test]
    fn mate_score_rebased_at_probe_ply() {
        let tt = TranspositionTable::new(64);
        let mate_at_root = super::super::MATE - 4;
        tt.store(5, 8, mate_at_root, Move::NULL, TTFlag::Exact, 2, 0);
        let entry = tt.probe(5, 6).unwrap();
        assert_eq!(entry.score as i32, mate_at_root - 4);
    }
}
