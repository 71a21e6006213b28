//! Hash-bucketed token memories.
//!
//! Every join has a left and a right [`BetaMemory`]; every rule's last join
//! also has a terminal memory. Buckets hold `(hash, handle)` pairs, so a
//! resize relinks handles and never touches the tokens themselves.

use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::Arc;

use trellis_foundation::{Error, Result, Value};

use crate::pattern::Bindings;
use crate::token::{TokenArena, TokenId};

/// Table sizes a memory grows through.
pub const TABLE_PRIMES: [usize; 27] = [
    13, 29, 59, 127, 257, 521, 1049, 2099, 4201, 8419, 16843, 33703, 67409, 134_837, 269_683,
    539_389, 1_078_787, 2_157_587, 4_315_183, 8_630_387, 17_260_781, 34_521_589, 69_043_189,
    138_086_407, 276_172_823, 552_345_671, 1_104_691_373,
];

/// Positional weight base for join-key hashing.
pub const JOIN_HASH_BASE: u64 = 509;

/// Hashes the values of the given join-key variables.
///
/// `Σ_i v_i.stable_hash() · 509^i` with wrapping arithmetic, over the keys
/// in the order given (join keys are kept sorted). An unbound key hashes as
/// nil.
#[must_use]
pub fn join_key_hash(bindings: &Bindings, keys: &[Arc<str>]) -> u64 {
    let mut hash = 0u64;
    let mut weight = 1u64;
    for key in keys {
        let term = bindings
            .get(key)
            .map_or_else(|| Value::Nil.stable_hash(), Value::stable_hash);
        hash = hash.wrapping_add(term.wrapping_mul(weight));
        weight = weight.wrapping_mul(JOIN_HASH_BASE);
    }
    hash
}

/// Hashes a complete binding map (used where a join has no join keys).
#[must_use]
pub fn bindings_hash(bindings: &Bindings) -> u64 {
    let mut hash = 0u64;
    let mut weight = 1u64;
    for (var, value) in bindings.iter() {
        let mut hasher = DefaultHasher::new();
        var.hash(&mut hasher);
        let term = hasher.finish() ^ value.stable_hash();
        hash = hash.wrapping_add(term.wrapping_mul(weight));
        weight = weight.wrapping_mul(JOIN_HASH_BASE);
    }
    hash
}

/// A resizable hash table of token handles.
#[derive(Clone, Debug)]
pub struct BetaMemory {
    buckets: Vec<Vec<(u64, TokenId)>>,
    prime_index: usize,
    len: usize,
}

impl Default for BetaMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl BetaMemory {
    /// Creates an empty memory at the smallest table size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_prime_index(0)
    }

    /// Creates an empty memory starting at `TABLE_PRIMES[index]`.
    ///
    /// Out-of-range indices are clamped to the largest size.
    #[must_use]
    pub fn with_prime_index(index: usize) -> Self {
        let prime_index = index.min(TABLE_PRIMES.len() - 1);
        Self {
            buckets: vec![Vec::new(); TABLE_PRIMES[prime_index]],
            prime_index,
            len: 0,
        }
    }

    /// Returns the number of stored tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if the memory is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the current number of buckets.
    #[must_use]
    pub fn table_size(&self) -> usize {
        self.buckets.len()
    }

    #[allow(clippy::cast_possible_truncation)]
    fn bucket_index(&self, hash: u64) -> usize {
        (hash % self.buckets.len() as u64) as usize
    }

    /// Stores a token under its own hash.
    ///
    /// Returns `false` (and stores nothing) if an equal token is already
    /// present: same hash, same ordered fact list, equal bindings.
    ///
    /// # Errors
    /// Returns a structural error if the handle is not live.
    pub fn insert(&mut self, arena: &TokenArena, id: TokenId) -> Result<bool> {
        let token = arena
            .get(id)
            .ok_or_else(|| Error::structural(format!("inserting dead token {id:?}")))?;
        let index = self.bucket_index(token.hash);
        let duplicate = self.buckets[index].iter().any(|&(hash, other)| {
            hash == token.hash && arena.get(other).is_some_and(|o| o.same_match(token))
        });
        if duplicate {
            return Ok(false);
        }
        self.buckets[index].push((token.hash, id));
        self.len += 1;
        if self.len > 2 * self.buckets.len() {
            self.grow();
        }
        Ok(true)
    }

    /// Removes a token stored under `hash`. Returns false if it was absent.
    pub fn remove(&mut self, id: TokenId, hash: u64) -> bool {
        let index = self.bucket_index(hash);
        let bucket = &mut self.buckets[index];
        match bucket.iter().position(|&(_, other)| other == id) {
            Some(pos) => {
                bucket.swap_remove(pos);
                self.len -= 1;
                true
            }
            None => false,
        }
    }

    /// Returns true if the token is stored under `hash`.
    #[must_use]
    pub fn contains(&self, id: TokenId, hash: u64) -> bool {
        self.buckets[self.bucket_index(hash)]
            .iter()
            .any(|&(_, other)| other == id)
    }

    /// Iterates the tokens stored under exactly this hash.
    pub fn bucket(&self, hash: u64) -> impl Iterator<Item = TokenId> + '_ {
        self.buckets[self.bucket_index(hash)]
            .iter()
            .filter(move |&&(h, _)| h == hash)
            .map(|&(_, id)| id)
    }

    /// Iterates every stored token.
    pub fn iter(&self) -> impl Iterator<Item = TokenId> + '_ {
        self.buckets.iter().flatten().map(|&(_, id)| id)
    }

    /// Moves to the next table size, relinking every entry.
    fn grow(&mut self) {
        if self.prime_index + 1 >= TABLE_PRIMES.len() {
            return;
        }
        self.prime_index += 1;
        let size = TABLE_PRIMES[self.prime_index];
        let old = std::mem::replace(&mut self.buckets, vec![Vec::new(); size]);
        for (hash, id) in old.into_iter().flatten() {
            let index = self.bucket_index(hash);
            self.buckets[index].push((hash, id));
        }
    }
}
