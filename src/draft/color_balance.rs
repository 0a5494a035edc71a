use std::collections::{BTreeMap, HashMap};

use rand::{seq::SliceRandom, Rng};

use crate::{
    cards::{CardId, CardLookup, Color},
    error::{DraftError, Res},
};

use super::pool::{pick_card, CardPool, PickOptions};

/// Smallest number of cards for which colour balancing is applied.
pub const COLOR_BALANCE_THRESHOLD: usize = 5;

/// Owns a pool of cards and draws from it so that every colour is represented
/// while keeping the pool's natural ratio of monocoloured to other cards.
///
/// The colour caches are derived from the pool and are kept in sync by every
/// pick, whether balanced or not.
#[derive(Clone, Debug)]
pub struct ColorBalancedSlot {
    pool: CardPool,
    by_color: BTreeMap<String, CardPool>,
    monocolored: CardPool,
    others: CardPool,
    colors: HashMap<CardId, String>,
}

impl ColorBalancedSlot {
    pub fn new(pool: CardPool, cards: &dyn CardLookup) -> Res<Self> {
        let mut by_color: BTreeMap<String, CardPool> = BTreeMap::new();
        let mut monocolored = CardPool::new();
        let mut others = CardPool::new();
        let mut colors = HashMap::new();

        for (id, count) in pool.iter() {
            let Some(card) = cards.lookup(id) else {
                return Err(DraftError::Config(format!("Unknown card '{id}'.")));
            };
            let key = card.color_key();
            by_color.entry(key.clone()).or_default().add(id.clone(), count);
            if card.is_monocolored() {
                monocolored.add(id.clone(), count);
            } else {
                others.add(id.clone(), count);
            }
            colors.insert(id.clone(), key);
        }

        Ok(Self {
            pool,
            by_color,
            monocolored,
            others,
            colors,
        })
    }

    pub fn pool(&self) -> &CardPool {
        &self.pool
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Remove one copy of a card that was taken from the pool by other means.
    pub fn remove_one(&mut self, id: &str) -> bool {
        if !self.pool.remove_one(id) {
            return false;
        }
        if let Some(key) = self.colors.get(id) {
            if let Some(bucket) = self.by_color.get_mut(key) {
                bucket.remove_one(id);
            }
            if key.len() == 1 {
                self.monocolored.remove_one(id);
            } else {
                self.others.remove_one(id);
            }
        }
        true
    }

    /// A single unbalanced pick from the whole pool.
    pub fn pick<R: Rng + ?Sized>(
        &mut self,
        booster: &[CardId],
        options: PickOptions,
        rng: &mut R,
    ) -> Res<CardId> {
        let peek = PickOptions {
            with_replacement: true,
            ..options
        };
        let id = pick_card(&mut self.pool, booster, peek, rng)?;
        if !options.with_replacement {
            self.remove_one(&id);
        }
        Ok(id)
    }

    /// Draw `count` colour balanced cards. `booster` holds the cards already
    /// in the booster being built, for duplicate protection. The result is
    /// shuffled so that its order does not reveal the balancing.
    pub fn generate<R: Rng + ?Sized>(
        &mut self,
        count: usize,
        booster: &[CardId],
        options: PickOptions,
        rng: &mut R,
    ) -> Res<Vec<CardId>> {
        let mut picked: Vec<CardId> = Vec::with_capacity(count);
        let mut exclude = booster.to_vec();

        // Seed one card of each colour.
        for color in Color::ALL {
            if picked.len() >= count {
                break;
            }
            let key = color.symbol().to_string();
            let Some(bucket) = self.by_color.get_mut(&key) else {
                continue;
            };
            if bucket.is_empty() {
                continue;
            }
            let id = pick_card(bucket, &exclude, options, rng)?;
            if !options.with_replacement {
                self.pool.remove_one(&id);
                self.monocolored.remove_one(&id);
            }
            exclude.push(id.clone());
            picked.push(id);
        }

        // c: monocoloured cards including the seeded ones, a: the others,
        // s: seeded cards, r: cards left to pick. Taking the remaining cards
        // as monocoloured with probability x keeps the expected number of
        // monocoloured cards at (r + s) * c / (c + a).
        let s = picked.len() as f64;
        let c = self.monocolored.total() as f64 + s;
        let a = self.others.total() as f64;
        let r = (count - picked.len()) as f64;
        let x = if r > 0.0 && c + a > 0.0 {
            (c * r - a * s) / (r * (c + a))
        } else {
            0.0
        };

        while picked.len() < count {
            let monocolored =
                (rng.gen::<f64>() < x && !self.monocolored.is_empty()) || self.others.is_empty();
            let bucket = if monocolored {
                &mut self.monocolored
            } else {
                &mut self.others
            };
            let id = pick_card(bucket, &exclude, options, rng)?;
            if !options.with_replacement {
                self.pool.remove_one(&id);
                if let Some(by_color) = self.colors.get(&id).and_then(|k| self.by_color.get_mut(k)) {
                    by_color.remove_one(&id);
                }
            }
            exclude.push(id.clone());
            picked.push(id);
        }

        picked.shuffle(rng);
        Ok(picked)
    }
}

/// A sheet's working pool, optionally colour balanced.
#[derive(Clone, Debug)]
pub enum SheetPool {
    Plain(CardPool),
    Balanced(ColorBalancedSlot),
}

impl SheetPool {
    pub fn new(pool: CardPool, color_balance: bool, cards: &dyn CardLookup) -> Res<Self> {
        Ok(if color_balance {
            SheetPool::Balanced(ColorBalancedSlot::new(pool, cards)?)
        } else {
            SheetPool::Plain(pool)
        })
    }

    pub fn pool(&self) -> &CardPool {
        match self {
            SheetPool::Plain(pool) => pool,
            SheetPool::Balanced(slot) => slot.pool(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.pool().is_empty()
    }

    pub fn pick<R: Rng + ?Sized>(
        &mut self,
        booster: &[CardId],
        options: PickOptions,
        rng: &mut R,
    ) -> Res<CardId> {
        match self {
            SheetPool::Plain(pool) => pick_card(pool, booster, options, rng),
            SheetPool::Balanced(slot) => slot.pick(booster, options, rng),
        }
    }

    /// Draw `count` cards, colour balanced when the pool supports it and the
    /// count reaches the threshold.
    pub fn pick_many<R: Rng + ?Sized>(
        &mut self,
        count: usize,
        booster: &[CardId],
        options: PickOptions,
        rng: &mut R,
    ) -> Res<Vec<CardId>> {
        match self {
            SheetPool::Balanced(slot) if count >= COLOR_BALANCE_THRESHOLD => {
                slot.generate(count, booster, options, rng)
            }
            _ => {
                let mut exclude = booster.to_vec();
                let mut picked = Vec::with_capacity(count);
                for _ in 0..count {
                    let id = self.pick(&exclude, options, rng)?;
                    exclude.push(id.clone());
                    picked.push(id);
                }
                Ok(picked)
            }
        }
    }
}
