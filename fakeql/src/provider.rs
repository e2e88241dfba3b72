//! Primitive fake values.
//!
//! Every scalar the mock engine fabricates bottoms out in a [`FakeProvider`],
//! so swapping the implementation changes the flavor of every response.
//! The stock [`Faker`] draws from compiled-in wordlists and can be seeded for
//! repeatable output.

use std::hash::DefaultHasher;
use std::hash::Hash;
use std::hash::Hasher;

use parking_lot::Mutex;
use rand::Rng;
use rand::SeedableRng;
use rand::distr::Alphanumeric;
use rand::rngs::StdRng;

const WORDS: &[&str] = &[
    "amber", "basin", "cedar", "delta", "ember", "fable", "grove", "harbor", "iris", "juniper",
    "kestrel", "lumen", "meadow", "north", "opal", "pioneer", "quartz", "ridge", "summit", "thistle",
    "umber", "vessel", "willow", "zephyr",
];

const COMPANY_SUFFIXES: &[&str] = &["Group", "Labs", "Trading", "Holdings", "Supply", "Works"];

/// Source of primitive fake scalars.
pub trait FakeProvider: Send + Sync {
    /// A single lowercase word.
    fn word(&self) -> String;

    /// A short capitalized sentence ending in a period.
    fn sentence(&self) -> String;

    /// A company-sounding name.
    fn company(&self) -> String;

    /// An opaque alphanumeric token, usable as an entity key.
    fn token(&self) -> String;

    /// An integer in a small readable range.
    fn integer(&self) -> i64;

    /// An amount in [0, 1000) quantized to two decimals.
    fn amount(&self) -> f64;

    /// A coin flip.
    fn boolean(&self) -> bool;

    /// Length for a structurally-defaulted list.
    fn list_len(&self) -> usize;

    /// Index into `len` choices (enum variants, union members).
    fn pick(&self, len: usize) -> usize;
}

/// Wordlist-backed [`FakeProvider`] over a seedable RNG.
pub struct Faker {
    rng: Mutex<StdRng>,
}

impl Faker {
    /// A provider seeded from OS entropy.
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_os_rng()),
        }
    }

    /// A provider with a fixed seed; identical call sequences produce
    /// identical values.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn capitalized(word: &str) -> String {
        let mut chars = word.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl Default for Faker {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeProvider for Faker {
    fn word(&self) -> String {
        let mut rng = self.rng.lock();
        WORDS[rng.random_range(0..WORDS.len())].to_string()
    }

    fn sentence(&self) -> String {
        let mut rng = self.rng.lock();
        let count = rng.random_range(4..=8);
        let mut words = Vec::with_capacity(count);
        for _ in 0..count {
            words.push(WORDS[rng.random_range(0..WORDS.len())]);
        }
        let mut sentence = Self::capitalized(words[0]);
        for word in &words[1..] {
            sentence.push(' ');
            sentence.push_str(word);
        }
        sentence.push('.');
        sentence
    }

    fn company(&self) -> String {
        let mut rng = self.rng.lock();
        let first = WORDS[rng.random_range(0..WORDS.len())];
        let second = WORDS[rng.random_range(0..WORDS.len())];
        let suffix = COMPANY_SUFFIXES[rng.random_range(0..COMPANY_SUFFIXES.len())];
        format!(
            "{} {} {suffix}",
            Self::capitalized(first),
            Self::capitalized(second)
        )
    }

    fn token(&self) -> String {
        let mut rng = self.rng.lock();
        (&mut *rng)
            .sample_iter(Alphanumeric)
            .take(12)
            .map(char::from)
            .collect()
    }

    fn integer(&self) -> i64 {
        self.rng.lock().random_range(0..1000)
    }

    fn amount(&self) -> f64 {
        let cents: i64 = self.rng.lock().random_range(0..100_000);
        cents as f64 / 100.0
    }

    fn boolean(&self) -> bool {
        self.rng.lock().random()
    }

    fn list_len(&self) -> usize {
        self.rng.lock().random_range(1..=3)
    }

    fn pick(&self, len: usize) -> usize {
        if len < 2 {
            return 0;
        }
        self.rng.lock().random_range(0..len)
    }
}

/// Stable 64-bit seed derived from an entity key.
///
/// Lets fabricated entities keep the same fake data every time the same key
/// is fetched, within and across requests.
pub fn stable_seed(key: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}
