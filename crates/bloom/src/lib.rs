///! # Bloom Filter
///!
///! A space-efficient probabilistic data structure for set membership testing.
///!
///! A bloom filter can tell you with certainty that a key is **not** in the set
///! (no false negatives), but may occasionally report that a key **is** in the
///! set when it isn't (false positives). The false positive rate depends on the
///! number of bits per key and the number of hash functions.
///!
///! ## Usage in DriftKV
///!
///! Every on-disk run carries a bloom filter built from its keys. During point
///! lookups the engine checks the filter first -- if it says "not present", the
///! run is skipped entirely, avoiding index and data I/O.
///!
///! Filters are sized from the run's entry count (`bits_per_key` bits each, 10
///! by default), so the run writer collects key hashes while streaming entries
///! and builds the filter once the final count is known.
///!
///! ## Example
///!
///! ```rust,no_run
///! use bloom::BloomFilter;
///!
///! let mut bf = BloomFilter::sized_for(1000, 10, 2);
///! bf.insert(b"hello");
///! assert!(bf.may_contain(b"hello"));
///! ```
use std::io::{self, Read, Write};

/// A bloom filter backed by a bit vector with `k` independent hash functions.
///
/// Uses double hashing: `h(i) = h1 + i * h2` where `h1` and `h2` are derived
/// from FNV-1a with two different seeds. Bit indexes are reduced modulo the
/// bit count of the filter.
pub struct BloomFilter {
    /// The bit vector storing the filter state.
    bits: Vec<u8>,
    /// Number of bits in the filter.
    bit_count: u64,
    /// Number of hash functions (k).
    num_hashes: u8,
}

impl BloomFilter {
    /// Creates a bloom filter with an explicit bit count and hash count.
    ///
    /// # Panics
    ///
    /// Panics if `bit_count` or `num_hashes` is 0.
    pub fn with_params(bit_count: u64, num_hashes: u8) -> Self {
        assert!(bit_count > 0, "bit_count must be > 0");
        assert!(num_hashes > 0, "num_hashes must be > 0");

        let byte_len = ((bit_count + 7) / 8) as usize;
        Self {
            bits: vec![0u8; byte_len],
            bit_count,
            num_hashes,
        }
    }

    /// Creates a bloom filter sized for `expected_items` entries at
    /// `bits_per_key` bits each.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` or `bits_per_key` is 0.
    pub fn sized_for(expected_items: usize, bits_per_key: usize, num_hashes: u8) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(bits_per_key > 0, "bits_per_key must be > 0");

        let bit_count = (expected_items as u64 * bits_per_key as u64).max(8);
        Self::with_params(bit_count, num_hashes)
    }

    /// Creates a bloom filter from raw parts (used during deserialization).
    fn from_raw(bits: Vec<u8>, bit_count: u64, num_hashes: u8) -> Self {
        Self {
            bits,
            bit_count,
            num_hashes,
        }
    }

    /// Inserts a key into the bloom filter.
    pub fn insert(&mut self, key: &[u8]) {
        self.insert_pair(hash_pair(key));
    }

    /// Inserts a precomputed hash pair (see [`hash_pair`]).
    ///
    /// Streaming run writers hash keys as they pass through and build the
    /// filter once the entry count is known; this avoids buffering whole keys.
    pub fn insert_pair(&mut self, (h1, h2): (u64, u64)) {
        for i in 0..self.num_hashes {
            let bit_idx = self.bit_index(h1, h2, i);
            self.set_bit(bit_idx);
        }
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not** in the set.
    #[must_use]
    pub fn may_contain(&self, key: &[u8]) -> bool {
        let (h1, h2) = hash_pair(key);
        for i in 0..self.num_hashes {
            let bit_idx = self.bit_index(h1, h2, i);
            if !self.get_bit(bit_idx) {
                return false;
            }
        }
        true
    }

    /// Returns the number of bits in the filter.
    #[must_use]
    pub fn bit_count(&self) -> u64 {
        self.bit_count
    }

    /// Returns the number of hash functions.
    #[must_use]
    pub fn num_hashes(&self) -> u8 {
        self.num_hashes
    }

    /// Returns the size of the serialized bloom filter in bytes.
    ///
    /// Layout: `num_hashes(u8) + bit_count(u64) + bits`.
    #[must_use]
    pub fn serialized_size(&self) -> usize {
        1 + 8 + self.bits.len()
    }

    /// Serializes the bloom filter to a writer.
    ///
    /// Wire format (little-endian):
    /// ```text
    /// [num_hashes: u8][bit_count: u64][bits: (bit_count+7)/8 bytes]
    /// ```
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[self.num_hashes])?;
        w.write_all(&self.bit_count.to_le_bytes())?;
        w.write_all(&self.bits)?;
        Ok(())
    }

    /// Deserializes a bloom filter from a reader.
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut buf1 = [0u8; 1];
        let mut buf8 = [0u8; 8];

        r.read_exact(&mut buf1)?;
        let num_hashes = buf1[0];

        r.read_exact(&mut buf8)?;
        let bit_count = u64::from_le_bytes(buf8);

        if num_hashes == 0 || bit_count == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "bloom filter header has zero hashes or bits",
            ));
        }

        // Safety cap: a filter should not exceed 128 MiB
        const MAX_BLOOM_BITS: u64 = 128 * 1024 * 1024 * 8;
        if bit_count > MAX_BLOOM_BITS {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bloom filter too large: {} bits", bit_count),
            ));
        }

        let byte_len = ((bit_count + 7) / 8) as usize;
        let mut bits = vec![0u8; byte_len];
        r.read_exact(&mut bits)?;

        Ok(Self::from_raw(bits, bit_count, num_hashes))
    }

    // ---- Internal helpers ----

    /// Double hashing: h(i) = (h1 + i * h2) mod bit_count.
    fn bit_index(&self, h1: u64, h2: u64, i: u8) -> u64 {
        h1.wrapping_add((i as u64).wrapping_mul(h2)) % self.bit_count
    }

    fn set_bit(&mut self, idx: u64) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("bit_count", &self.bit_count)
            .field("num_hashes", &self.num_hashes)
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// Computes two independent 64-bit hashes using FNV-1a with different seeds.
///
/// Exposed so streaming writers can hash keys up front and feed the filter
/// later via [`BloomFilter::insert_pair`].
#[must_use]
pub fn hash_pair(key: &[u8]) -> (u64, u64) {
    let h1 = fnv1a_64(key, 0xcbf29ce484222325);
    let h2 = fnv1a_64(key, 0x517cc1b727220a95);
    (h1, h2)
}

/// FNV-1a 64-bit hash with a configurable starting basis.
fn fnv1a_64(data: &[u8], basis: u64) -> u64 {
    const FNV_PRIME: u64 = 0x00000100000001b3;
    let mut hash = basis;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}
