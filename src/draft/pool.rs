use std::collections::BTreeMap;

use rand::Rng;

use crate::{
    cards::CardId,
    error::{DraftError, MessageError, Res},
};

/// A multiset of cards, mapping card ID to the number of copies remaining.
/// Removing the last copy of a card removes its key.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CardPool {
    cards: BTreeMap<CardId, u32>,
    total: usize,
}

impl CardPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: CardId, count: u32) {
        if count == 0 {
            return;
        }
        *self.cards.entry(id).or_insert(0) += count;
        self.total += count as usize;
    }

    /// Remove a single copy of a card. Returns false if the card was absent.
    pub fn remove_one(&mut self, id: &str) -> bool {
        let Some(count) = self.cards.get_mut(id) else {
            return false;
        };
        *count -= 1;
        if *count == 0 {
            self.cards.remove(id);
        }
        self.total -= 1;
        true
    }

    #[cfg(test)]
    pub fn count(&self, id: &str) -> u32 {
        self.cards.get(id).copied().unwrap_or(0)
    }

    #[cfg(test)]
    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Total number of copies in the pool.
    pub fn total(&self) -> usize {
        self.total
    }

    /// Number of distinct cards in the pool.
    #[cfg(test)]
    pub fn distinct(&self) -> usize {
        self.cards.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&CardId, u32)> {
        self.cards.iter().map(|(id, count)| (id, *count))
    }

    /// Split the pool in two: cards matching the predicate and the rest.
    pub fn partition<F: Fn(&str) -> bool>(self, predicate: F) -> (CardPool, CardPool) {
        let mut matching = CardPool::new();
        let mut rest = CardPool::new();
        for (id, count) in self.cards {
            if predicate(&id) {
                matching.add(id, count);
            } else {
                rest.add(id, count);
            }
        }
        (matching, rest)
    }

    /// Find the card holding the n-th copy of the pool (in key order),
    /// skipping cards rejected by the filter.
    fn nth_copy<F: Fn(&str) -> bool>(&self, mut n: usize, filter: F) -> Option<&CardId> {
        for (id, count) in &self.cards {
            if !filter(id) {
                continue;
            }
            if n < *count as usize {
                return Some(id);
            }
            n -= *count as usize;
        }
        None
    }
}

impl FromIterator<(CardId, u32)> for CardPool {
    fn from_iter<T: IntoIterator<Item = (CardId, u32)>>(iter: T) -> Self {
        let mut pool = CardPool::new();
        for (id, count) in iter {
            pool.add(id, count);
        }
        pool
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PickOptions {
    /// Leave picked cards in the pool.
    pub with_replacement: bool,

    /// Avoid picking a card already present in the booster being built.
    pub duplicate_protection: bool,
}

impl Default for PickOptions {
    fn default() -> Self {
        Self {
            with_replacement: false,
            duplicate_protection: true,
        }
    }
}

/// Pick a random card from the pool, every remaining copy being equally
/// likely. With duplicate protection, cards listed in `booster` are excluded
/// from the draw unless the pool holds nothing else.
pub fn pick_card<R: Rng + ?Sized>(
    pool: &mut CardPool,
    booster: &[CardId],
    options: PickOptions,
    rng: &mut R,
) -> Res<CardId> {
    if pool.is_empty() {
        return Err(DraftError::EmptyPool);
    }

    let is_new = |id: &str| !booster.iter().any(|picked| picked == id);
    let eligible = if options.duplicate_protection && !booster.is_empty() {
        pool.iter()
            .filter(|(id, _)| is_new(id))
            .map(|(_, count)| count as usize)
            .sum()
    } else {
        pool.total()
    };

    let id = if eligible > 0 && eligible < pool.total() {
        pool.nth_copy(rng.gen_range(0..eligible), is_new)
    } else {
        pool.nth_copy(rng.gen_range(0..pool.total()), |_| true)
    }
    .cloned()
    .ok_or_else(|| DraftError::Internal("Card pool count out of sync.".to_string()))?;

    if !options.with_replacement {
        pool.remove_one(&id);
    }
    Ok(id)
}

/// Pick `count` consecutive cards of a print run, starting at a random group
/// boundary.
pub fn pick_print_run<R: Rng + ?Sized>(
    count: usize,
    print_run: &[CardId],
    group_size: usize,
    wrap: bool,
    rng: &mut R,
) -> Res<Vec<CardId>> {
    if print_run.is_empty() {
        return Err(DraftError::EmptyPool);
    }

    let group_size = group_size.max(1);
    let groups = (print_run.len() / group_size).max(1);
    let start = rng.gen_range(0..groups) * group_size;
    if !wrap && start + count > print_run.len() {
        return Err(MessageError::generation(format!(
            "Print run too short: cannot take {count} cards starting at position {start} of {}.",
            print_run.len()
        ))
        .into());
    }

    Ok((0..count)
        .map(|i| print_run[(start + i) % print_run.len()].clone())
        .collect())
}

/// Choose an index with probability proportional to its weight. Returns None
/// if every weight is zero.
pub fn weighted_index<R: Rng + ?Sized>(weights: &[u32], rng: &mut R) -> Option<usize> {
    let total: u64 = weights.iter().map(|w| *w as u64).sum();
    if total == 0 {
        return None;
    }

    let roll = rng.gen_range(0..total);
    let mut cumulative = 0;
    for (index, weight) in weights.iter().enumerate() {
        cumulative += *weight as u64;
        if roll < cumulative {
            return Some(index);
        }
    }
    None
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    fn pool(cards: &[(&str, u32)]) -> CardPool {
        cards.iter().map(|(id, n)| (id.to_string(), *n)).collect()
    }

    #[test]
    fn test_pool_counts() {
        let mut p = pool(&[("a", 2), ("b", 1)]);
        assert_eq!(p.total(), 3);
        assert_eq!(p.distinct(), 2);

        assert!(p.remove_one("a"));
        assert_eq!(p.count("a"), 1);
        assert!(p.remove_one("a"));
        assert!(!p.contains("a"));
        assert!(!p.remove_one("a"));
        assert_eq!(p.total(), 1);

        p.add("b".to_string(), 3);
        assert_eq!(p.total(), 4);
        for _ in 0..4 {
            assert!(p.remove_one("b"));
        }
        assert!(p.is_empty());
        assert_eq!(p.distinct(), 0);
    }

    #[test]
    fn test_partition() {
        let p = pool(&[("pw-1", 1), ("c-1", 3), ("pw-2", 2)]);
        let (walkers, rest) = p.partition(|id| id.starts_with("pw"));
        assert_eq!(walkers.total(), 3);
        assert_eq!(rest.total(), 3);
        assert!(rest.contains("c-1"));
    }

    #[test]
    fn test_pick_removes_copies() {
        let rng = &mut StdRng::seed_from_u64(7);
        let mut p = pool(&[("a", 2), ("b", 2)]);
        let mut picked = Vec::new();
        for _ in 0..4 {
            picked.push(pick_card(&mut p, &[], PickOptions::default(), rng).unwrap());
        }
        assert!(p.is_empty());
        assert_eq!(picked.iter().filter(|id| *id == "a").count(), 2);
        assert_eq!(
            pick_card(&mut p, &[], PickOptions::default(), rng),
            Err(DraftError::EmptyPool)
        );
    }

    #[test]
    fn test_pick_with_replacement() {
        let rng = &mut StdRng::seed_from_u64(7);
        let mut p = pool(&[("a", 1)]);
        let options = PickOptions {
            with_replacement: true,
            ..Default::default()
        };
        for _ in 0..10 {
            assert_eq!(pick_card(&mut p, &[], options, rng).unwrap(), "a");
        }
        assert_eq!(p.total(), 1);
    }

    #[test]
    fn test_duplicate_protection() {
        let rng = &mut StdRng::seed_from_u64(11);
        for _ in 0..100 {
            let mut p = pool(&[("a", 10), ("b", 1)]);
            let booster = vec!["a".to_string()];
            assert_eq!(
                pick_card(&mut p, &booster, PickOptions::default(), rng).unwrap(),
                "b"
            );
        }

        // Falls back to a duplicate when nothing else is left.
        let mut p = pool(&[("a", 1)]);
        let booster = vec!["a".to_string()];
        assert_eq!(
            pick_card(&mut p, &booster, PickOptions::default(), rng).unwrap(),
            "a"
        );
    }

    #[test]
    fn test_pick_print_run() {
        let rng = &mut StdRng::seed_from_u64(3);
        let run: Vec<CardId> = (0..9).map(|i| i.to_string()).collect();
        for _ in 0..50 {
            let cards = pick_print_run(3, &run, 3, true, rng).unwrap();
            let start: usize = cards[0].parse().unwrap();
            assert_eq!(start % 3, 0);
            assert_eq!(cards[1], ((start + 1) % 9).to_string());
            assert_eq!(cards[2], ((start + 2) % 9).to_string());
        }

        // Wrapping around the end of the run.
        let cards = pick_print_run(12, &run, 9, true, rng).unwrap();
        assert_eq!(cards[9], "0");
        assert!(pick_print_run(12, &run, 9, false, rng).is_err());
        assert!(pick_print_run(1, &[], 1, true, rng).is_err());
    }

    #[test]
    fn test_weighted_index() {
        let rng = &mut StdRng::seed_from_u64(5);
        assert_eq!(weighted_index(&[0, 0], rng), None);
        assert_eq!(weighted_index(&[0, 3, 0], rng), Some(1));

        let mut hits = [0usize; 2];
        for _ in 0..10_000 {
            hits[weighted_index(&[1, 3], rng).unwrap()] += 1;
        }
        let ratio = hits[1] as f64 / 10_000.0;
        assert!((ratio - 0.75).abs() < 0.03, "ratio {ratio}");
    }
}
