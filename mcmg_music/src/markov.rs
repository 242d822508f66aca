// Arbitrary-order Markov chain over any ordered symbol type.
//
// A chain of degree N conditions each next symbol on the previous N-1
// symbols. Training walks a sequence and counts, for every context tuple,
// which token followed it; generation replays those counts with roulette
// sampling. Sequence boundaries are an explicit `Token::Boundary` variant
// rather than a reserved symbol value, so no domain value can collide with
// the start/end marker.
//
// The context window has a two-state lifecycle. `Clean` means "at a
// sequence boundary" and is equivalent to N-1 boundary tokens; `Active`
// holds the last N-1 tokens of a sequence in progress. Training and
// generation both start from `Clean` and always return to it, including on
// truncation or error, so the all-boundary context (present after any
// training) is the only state a new run can begin in.
//
// Transition rows are BTreeMaps: the roulette walk visits tokens in `Ord`
// order, which makes output a pure function of the training data and the
// uniform draws supplied by a `UniformSource` (see `mcmg_prng`).
//
// The chain is used twice by `compose.rs`: once over `Pitch` and once over
// `NoteValue`.

use crate::error::{MusicError, Result};
use log::debug;
use mcmg_prng::UniformSource;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// A training/generation unit: either a real symbol or the sequence
/// boundary. `Boundary` orders before every symbol and displays as `<end>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Token<T> {
    Boundary,
    Symbol(T),
}

impl<T> Token<T> {
    pub fn is_boundary(&self) -> bool {
        matches!(self, Token::Boundary)
    }

    pub fn symbol(&self) -> Option<&T> {
        match self {
            Token::Boundary => None,
            Token::Symbol(s) => Some(s),
        }
    }
}

impl<T: fmt::Display> fmt::Display for Token<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Boundary => write!(f, "<end>"),
            Token::Symbol(s) => write!(f, "{s}"),
        }
    }
}

/// Counts of the tokens observed after one context, plus their sum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRow<T> {
    counts: BTreeMap<Token<T>, u64>,
    total: u64,
}

impl<T: Ord> TransitionRow<T> {
    fn new() -> Self {
        TransitionRow {
            counts: BTreeMap::new(),
            total: 0,
        }
    }

    fn increment(&mut self, token: Token<T>) {
        *self.counts.entry(token).or_insert(0) += 1;
        self.total += 1;
    }

    /// Number of times this context was observed during training.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn count(&self, token: &Token<T>) -> u64 {
        self.counts.get(token).copied().unwrap_or(0)
    }

    /// Observed next tokens with their counts, in sampling order.
    pub fn iter(&self) -> impl Iterator<Item = (&Token<T>, u64)> {
        self.counts.iter().map(|(t, &c)| (t, c))
    }

    /// Roulette-wheel selection: draw `r` in `[1, total]` and return the
    /// first token whose cumulative count reaches `r`.
    pub fn roulette(&self, rng: &mut impl UniformSource) -> Option<&Token<T>> {
        if self.total == 0 {
            return None;
        }
        let r = rng.uniform_inclusive(1, self.total);
        let mut running = 0;
        for (token, &count) in &self.counts {
            running += count;
            if running >= r {
                return Some(token);
            }
        }
        None
    }

    fn can_produce_symbol(&self) -> bool {
        self.counts.keys().any(|t| !t.is_boundary())
    }
}

#[derive(Debug, Clone)]
enum Window<T> {
    Clean,
    Active(VecDeque<Token<T>>),
}

/// Markov chain of arbitrary degree. See the module comment for the
/// lifecycle rules.
#[derive(Debug, Clone)]
pub struct MarkovChain<T> {
    degree: usize,
    window: Window<T>,
    table: BTreeMap<Vec<Token<T>>, TransitionRow<T>>,
}

impl<T: Ord + Clone + fmt::Debug> MarkovChain<T> {
    /// Create an empty chain. Degree 1 is a plain frequency distribution
    /// (empty context); degree 0 is rejected.
    pub fn new(degree: usize) -> Result<Self> {
        if degree < 1 {
            return Err(MusicError::InvalidDegree(degree));
        }
        Ok(MarkovChain {
            degree,
            window: Window::Clean,
            table: BTreeMap::new(),
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    /// True when the window sits at a sequence boundary.
    pub fn is_clean(&self) -> bool {
        matches!(self.window, Window::Clean)
    }

    /// Number of distinct contexts observed.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// The row for a context tuple of exactly `degree - 1` tokens.
    pub fn row(&self, context: &[Token<T>]) -> Option<&TransitionRow<T>> {
        self.table.get(context)
    }

    pub fn rows(&self) -> impl Iterator<Item = (&[Token<T>], &TransitionRow<T>)> {
        self.table.iter().map(|(k, v)| (k.as_slice(), v))
    }

    fn clean_key(&self) -> Vec<Token<T>> {
        vec![Token::Boundary; self.degree - 1]
    }

    fn context_key(&self) -> Vec<Token<T>> {
        match &self.window {
            Window::Clean => self.clean_key(),
            Window::Active(w) => w.iter().cloned().collect(),
        }
    }

    /// Slide the window over `token`. A boundary returns it to `Clean`.
    fn advance(&mut self, token: Token<T>) {
        if token.is_boundary() {
            self.window = Window::Clean;
            return;
        }
        let mut w = match std::mem::replace(&mut self.window, Window::Clean) {
            Window::Clean => VecDeque::from(self.clean_key()),
            Window::Active(w) => w,
        };
        if self.degree > 1 {
            w.pop_front();
            w.push_back(token);
        }
        self.window = Window::Active(w);
    }

    /// Record one symbol of a sequence in progress.
    ///
    /// Callers feeding symbols one at a time must close the sequence with
    /// [`finish`](Self::finish) before training or generating again.
    pub fn consume(&mut self, symbol: T) {
        let key = self.context_key();
        self.table
            .entry(key)
            .or_insert_with(TransitionRow::new)
            .increment(Token::Symbol(symbol.clone()));
        self.advance(Token::Symbol(symbol));
    }

    /// Record the end-of-sequence transition and reset the window.
    pub fn finish(&mut self) {
        let key = self.context_key();
        self.table
            .entry(key)
            .or_insert_with(TransitionRow::new)
            .increment(Token::Boundary);
        self.window = Window::Clean;
    }

    /// Train on one complete sequence. Counts accumulate across calls.
    pub fn train<I: IntoIterator<Item = T>>(&mut self, sequence: I) -> Result<()> {
        if !self.is_clean() {
            return Err(MusicError::ProtocolViolation(
                "train called while a previous sequence is still open".into(),
            ));
        }
        let mut n = 0usize;
        for symbol in sequence {
            self.consume(symbol);
            n += 1;
        }
        self.finish();
        debug!(
            "markov(degree {}): trained on {} symbols, {} contexts",
            self.degree,
            n,
            self.table.len()
        );
        Ok(())
    }

    /// Sample one sequence, stopping at a drawn boundary or after
    /// `length_limit` symbols, whichever comes first.
    pub fn generate(
        &mut self,
        rng: &mut impl UniformSource,
        length_limit: Option<usize>,
    ) -> Result<Vec<T>> {
        if !self.is_clean() {
            return Err(MusicError::ProtocolViolation(
                "generate called while a training sequence is still open".into(),
            ));
        }
        let mut out = Vec::new();
        loop {
            if length_limit.is_some_and(|limit| out.len() >= limit) {
                self.window = Window::Clean;
                break;
            }
            let key = self.context_key();
            let token = match self.table.get(&key).and_then(|row| row.roulette(rng)) {
                Some(t) => t.clone(),
                None => {
                    self.window = Window::Clean;
                    return Err(MusicError::UnknownContext(format!("{key:?}")));
                }
            };
            match token {
                Token::Boundary => {
                    self.window = Window::Clean;
                    break;
                }
                Token::Symbol(s) => {
                    out.push(s.clone());
                    self.advance(Token::Symbol(s));
                }
            }
        }
        Ok(out)
    }

    /// Concatenate independent generated sequences until at least `length`
    /// symbols exist. Statistics are not continuous across the joins.
    pub fn generate_at_least(
        &mut self,
        rng: &mut impl UniformSource,
        length: usize,
    ) -> Result<Vec<T>> {
        if length == 0 {
            return Ok(Vec::new());
        }
        let start = self.clean_key();
        match self.table.get(&start) {
            None => return Err(MusicError::UnknownContext(format!("{start:?}"))),
            Some(row) if !row.can_produce_symbol() => return Err(MusicError::EmptyModel),
            Some(_) => {}
        }

        let mut sequence = Vec::with_capacity(length);
        let mut runs = 0usize;
        while sequence.len() < length {
            sequence.extend(self.generate(rng, None)?);
            runs += 1;
        }
        if runs > 1 {
            debug!(
                "markov(degree {}): stitched {} runs to reach {} symbols",
                self.degree, runs, length
            );
        }
        Ok(sequence)
    }

    /// Exactly `length` symbols, built like
    /// [`generate_at_least`](Self::generate_at_least) and truncated.
    pub fn generate_exact(&mut self, rng: &mut impl UniformSource, length: usize) -> Result<Vec<T>> {
        let mut sequence = self.generate_at_least(rng, length)?;
        sequence.truncate(length);
        Ok(sequence)
    }
}

impl<T: fmt::Display> fmt::Display for MarkovChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Markov chain of degree {} ({} previous symbols matter)",
            self.degree,
            self.degree - 1
        )?;
        for (context, row) in &self.table {
            let ctx: Vec<String> = context.iter().map(|t| t.to_string()).collect();
            let next: Vec<String> = row
                .counts
                .iter()
                .map(|(t, c)| format!("{t}: {c}"))
                .collect();
            writeln!(f, "({}) -> {{{}}} |{}", ctx.join(", "), next.join(", "), row.total)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcmg_prng::SeqRng;
    use std::collections::{HashMap, HashSet};

    /// Returns pre-scripted draws so roulette outcomes can be asserted.
    struct Scripted(VecDeque<u64>);

    impl UniformSource for Scripted {
        fn uniform_inclusive(&mut self, low: u64, high: u64) -> u64 {
            let v = self.0.pop_front().expect("script exhausted");
            assert!((low..=high).contains(&v), "scripted draw {v} outside {low}..={high}");
            v
        }
    }

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    fn sym(c: char) -> Token<char> {
        Token::Symbol(c)
    }

    #[test]
    fn degree_zero_is_rejected() {
        assert!(matches!(
            MarkovChain::<char>::new(0),
            Err(MusicError::InvalidDegree(0))
        ));
    }

    #[test]
    fn degree_two_counts() {
        let mut chain = MarkovChain::new(2).unwrap();
        chain.train(chars("ABAB")).unwrap();

        let start = chain.row(&[Token::Boundary]).unwrap();
        assert_eq!(start.total(), 1);
        assert_eq!(start.count(&sym('A')), 1);

        let after_a = chain.row(&[sym('A')]).unwrap();
        assert_eq!(after_a.total(), 2);
        assert_eq!(after_a.count(&sym('B')), 2);

        let after_b = chain.row(&[sym('B')]).unwrap();
        assert_eq!(after_b.count(&sym('A')), 1);
        assert_eq!(after_b.count(&Token::Boundary), 1);
        assert!(chain.is_clean());
    }

    #[test]
    fn row_totals_match_observed_contexts() {
        let words = ["mast", "tame", "same", "teams", "team", "meat", "steam", "stem"];
        let mut chain = MarkovChain::new(3).unwrap();
        for w in words {
            chain.train(chars(w)).unwrap();
        }

        // Recount context occurrences independently of the chain.
        let mut observed: HashMap<Vec<Token<char>>, u64> = HashMap::new();
        for w in words {
            let mut tokens = vec![Token::Boundary, Token::Boundary];
            tokens.extend(w.chars().map(Token::Symbol));
            // One context per consumed symbol, plus the trailing boundary.
            for i in 0..=w.len() {
                *observed.entry(tokens[i..i + 2].to_vec()).or_insert(0) += 1;
            }
        }

        assert_eq!(chain.len(), observed.len());
        for (context, row) in chain.rows() {
            let sum: u64 = row.iter().map(|(_, c)| c).sum();
            assert_eq!(sum, row.total());
            assert_eq!(row.total(), observed[context], "context {context:?}");
        }
    }

    #[test]
    fn degree_one_is_a_frequency_table() {
        let mut chain = MarkovChain::new(1).unwrap();
        chain.train(chars("aab")).unwrap();
        let row = chain.row(&[]).unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(row.count(&sym('a')), 2);
        assert_eq!(row.count(&sym('b')), 1);
        assert_eq!(row.count(&Token::Boundary), 1);
        assert_eq!(row.total(), 4);

        let mut rng = SeqRng::new(9);
        for _ in 0..200 {
            let out = chain.generate(&mut rng, None).unwrap();
            assert!(out.iter().all(|c| *c == 'a' || *c == 'b'));
        }
    }

    #[test]
    fn training_accumulates() {
        let mut chain = MarkovChain::new(2).unwrap();
        chain.train(chars("ab")).unwrap();
        chain.train(chars("ab")).unwrap();
        assert_eq!(chain.row(&[Token::Boundary]).unwrap().count(&sym('a')), 2);
        assert_eq!(chain.row(&[sym('b')]).unwrap().count(&Token::Boundary), 2);
    }

    #[test]
    fn roulette_walks_in_order() {
        let mut chain = MarkovChain::new(1).unwrap();
        chain.train(chars("AAB")).unwrap();
        // Row order: <end> (1), A (2), B (1); total 4.
        let row = chain.row(&[]).unwrap();
        let mut src = Scripted(VecDeque::from(vec![1, 2, 3, 4]));
        assert_eq!(row.roulette(&mut src), Some(&Token::Boundary));
        assert_eq!(row.roulette(&mut src), Some(&sym('A')));
        assert_eq!(row.roulette(&mut src), Some(&sym('A')));
        assert_eq!(row.roulette(&mut src), Some(&sym('B')));
    }

    #[test]
    fn scripted_generation_is_exact() {
        let mut chain = MarkovChain::new(2).unwrap();
        chain.train(chars("ab")).unwrap();
        chain.train(chars("ac")).unwrap();
        // [<end>] -> a(2); [a] -> b(1) c(1); [b] -> <end>; [c] -> <end>.
        let mut src = Scripted(VecDeque::from(vec![2, 2, 1]));
        assert_eq!(chain.generate(&mut src, None).unwrap(), vec!['a', 'c']);
        assert!(chain.is_clean());
    }

    #[test]
    fn alternating_sequence_always_terminates() {
        let mut chain = MarkovChain::new(2).unwrap();
        chain.train(["A", "B", "A", "B"]).unwrap();
        let mut rng = SeqRng::new(2024);
        for _ in 0..10_000 {
            let out = chain.generate(&mut rng, None).unwrap();
            assert!(!out.is_empty());
            assert!(out.len() % 2 == 0, "must end after a B: {out:?}");
            assert!(chain.is_clean());
        }
    }

    #[test]
    fn word_corpus_only_produces_trained_bigrams() {
        let corpus = "mast tame same teams team meat steam stem";
        let mut chain = MarkovChain::new(2).unwrap();
        let mut bigrams = HashSet::new();
        let mut firsts = HashSet::new();
        let mut lasts = HashSet::new();
        for word in corpus.split(' ') {
            let letters = chars(word);
            for pair in letters.windows(2) {
                bigrams.insert((pair[0], pair[1]));
            }
            firsts.insert(letters[0]);
            lasts.insert(letters[letters.len() - 1]);
            chain.train(letters).unwrap();
        }

        let mut rng = SeqRng::new(7);
        for _ in 0..1000 {
            let word = chain.generate(&mut rng, None).unwrap();
            assert!(firsts.contains(&word[0]), "bad first letter in {word:?}");
            assert!(lasts.contains(&word[word.len() - 1]), "bad last letter in {word:?}");
            for pair in word.windows(2) {
                assert!(
                    bigrams.contains(&(pair[0], pair[1])),
                    "untrained bigram {:?} in {word:?}",
                    pair
                );
            }
        }
    }

    #[test]
    fn length_limit_truncates_and_resets() {
        let mut chain = MarkovChain::new(2).unwrap();
        chain.train(chars("abcdefgh")).unwrap();
        let mut rng = SeqRng::new(1);
        assert_eq!(chain.generate(&mut rng, Some(3)).unwrap(), chars("abc"));
        assert!(chain.is_clean());
        // The next run starts from the boundary again, not from "c".
        assert_eq!(chain.generate(&mut rng, None).unwrap(), chars("abcdefgh"));
        assert!(chain.generate(&mut rng, Some(0)).unwrap().is_empty());
    }

    #[test]
    fn untrained_chain_reports_unknown_context() {
        let mut chain = MarkovChain::<char>::new(3).unwrap();
        let mut rng = SeqRng::new(1);
        assert!(matches!(
            chain.generate(&mut rng, None),
            Err(MusicError::UnknownContext(_))
        ));
        assert!(chain.is_clean());
    }

    #[test]
    fn open_sequence_blocks_train_and_generate() {
        let mut chain = MarkovChain::new(2).unwrap();
        chain.consume('x');
        assert!(!chain.is_clean());
        assert!(matches!(
            chain.train(chars("ab")),
            Err(MusicError::ProtocolViolation(_))
        ));
        let mut rng = SeqRng::new(1);
        assert!(matches!(
            chain.generate(&mut rng, None),
            Err(MusicError::ProtocolViolation(_))
        ));
        chain.finish();
        chain.train(chars("ab")).unwrap();
        assert_eq!(chain.row(&[Token::Boundary]).unwrap().total(), 2);
    }

    #[test]
    fn exact_length_stitches_runs() {
        let mut chain = MarkovChain::new(2).unwrap();
        chain.train(chars("xy")).unwrap();
        let mut rng = SeqRng::new(11);
        let out = chain.generate_exact(&mut rng, 5).unwrap();
        assert_eq!(out, chars("xyxyx"));
        assert_eq!(chain.generate_at_least(&mut rng, 5).unwrap(), chars("xyxyxy"));
        assert!(chain.generate_exact(&mut rng, 0).unwrap().is_empty());
    }

    #[test]
    fn exact_length_on_empty_model_fails() {
        let mut chain = MarkovChain::<char>::new(2).unwrap();
        chain.train(Vec::new()).unwrap();
        let mut rng = SeqRng::new(1);
        assert!(matches!(
            chain.generate_exact(&mut rng, 4),
            Err(MusicError::EmptyModel)
        ));
        assert!(chain.generate(&mut rng, None).unwrap().is_empty());
    }

    #[test]
    fn same_seed_same_output() {
        let mut chain = MarkovChain::new(2).unwrap();
        for w in ["mast", "tame", "same", "team"] {
            chain.train(chars(w)).unwrap();
        }
        let mut a = chain.clone();
        let mut ra = SeqRng::new(99);
        let mut rb = SeqRng::new(99);
        assert_eq!(
            a.generate_exact(&mut ra, 50).unwrap(),
            chain.generate_exact(&mut rb, 50).unwrap()
        );
    }

    #[test]
    fn display_lists_rows() {
        let mut chain = MarkovChain::new(2).unwrap();
        chain.train(chars("ab")).unwrap();
        let text = chain.to_string();
        assert!(text.starts_with("Markov chain of degree 2 (1 previous symbols matter)"));
        assert!(text.contains("(<end>) -> {a: 1} |1"), "{text}");
        assert!(text.contains("(b) -> {<end>: 1} |1"), "{text}");
    }

    #[test]
    fn dollar_symbol_is_not_the_boundary() {
        let mut chain = MarkovChain::new(2).unwrap();
        chain.train(chars("$")).unwrap();
        let text = chain.to_string();
        assert!(text.contains("(<end>) -> {$: 1} |1"), "{text}");
        assert!(text.contains("($) -> {<end>: 1} |1"), "{text}");
    }
}
