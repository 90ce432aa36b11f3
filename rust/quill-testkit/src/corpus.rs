//! Random text corpora.
//!
//! Documents are built from a fixed vocabulary of pronounceable words so that
//! documents written by different threads share terms.

/// Generator of random documents, deterministic for a given seed.
pub struct Corpus {
    rng: fastrand::Rng,
    vocabulary: Vec<String>,
}

impl Corpus {
    /// Creates a corpus over `vocabulary_size` distinct lower-case words.
    pub fn new(seed: u64, vocabulary_size: usize) -> Corpus {
        assert_ne!(vocabulary_size, 0);
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut vocabulary = Vec::with_capacity(vocabulary_size);
        while vocabulary.len() < vocabulary_size {
            let word = random_word(&mut rng);
            if !vocabulary.contains(&word) {
                vocabulary.push(word);
            }
        }
        Corpus { rng, vocabulary }
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    /// Returns a document body of `min_words..=max_words` space-separated words.
    pub fn document(&mut self, min_words: usize, max_words: usize) -> String {
        let count = self.rng.usize(min_words..=max_words);
        let mut body = String::new();
        for i in 0..count {
            if i > 0 {
                body.push(' ');
            }
            let word = &self.vocabulary[self.rng.usize(..self.vocabulary.len())];
            body.push_str(word);
        }
        body
    }

    /// Returns `count` document bodies.
    pub fn documents(&mut self, count: usize, min_words: usize, max_words: usize) -> Vec<String> {
        (0..count)
            .map(|_| self.document(min_words, max_words))
            .collect()
    }
}

fn random_word(rng: &mut fastrand::Rng) -> String {
    const CONSONANTS: &[u8] = b"bcdfghjklmnprstvz";
    const VOWELS: &[u8] = b"aeiou";
    let syllables = rng.usize(1..=4);
    let mut word = String::with_capacity(syllables * 2);
    for _ in 0..syllables {
        word.push(CONSONANTS[rng.usize(..CONSONANTS.len())] as char);
        word.push(VOWELS[rng.usize(..VOWELS.len())] as char);
    }
    word
}

/// Splits `body` into the terms a lower-casing word tokenizer would produce.
pub fn words(body: &str) -> impl Iterator<Item = &str> {
    body.split_whitespace()
}
