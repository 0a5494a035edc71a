use std::{collections::HashMap, sync::Arc};

use rand::Rng;
use regex::Regex;

use crate::{
    cards::{Card, CardId, CardLookup, Rarity, UniqueCard},
    error::{DraftError, Res},
};

use super::{
    color_balance::SheetPool,
    pool::{pick_card, CardPool, PickOptions},
};

pub const MYTHIC_RATE: f64 = 1.0 / 8.0;
pub const FOIL_RATE: f64 = 15.0 / 63.0;

/// Cumulative odds of each rarity for a foil, checked rarest first.
const FOIL_RARITY_RATES: [(Rarity, f64); 4] = [
    (Rarity::Mythic, 1.0 / 128.0),
    (Rarity::Rare, 1.0 / 128.0 + 7.0 / 128.0),
    (Rarity::Uncommon, 1.0 / 16.0 + 3.0 / 16.0),
    (Rarity::Common, 1.0),
];

pub type Booster = Vec<UniqueCard>;

/// Number of cards of each rarity in a booster. Mythics use the rare slots.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RarityTargets {
    pub rare: usize,
    pub uncommon: usize,
    pub common: usize,
}

impl RarityTargets {
    pub fn total(&self) -> usize {
        self.rare + self.uncommon + self.common
    }
}

impl Default for RarityTargets {
    fn default() -> Self {
        Self {
            rare: 1,
            uncommon: 3,
            common: 10,
        }
    }
}

/// Copies of each card added to the pool when drafting from set data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MaxDuplicates {
    pub mythic: u32,
    pub rare: u32,
    pub uncommon: u32,
    pub common: u32,
}

impl MaxDuplicates {
    pub fn of(&self, rarity: Rarity) -> u32 {
        match rarity {
            Rarity::Mythic => self.mythic,
            Rarity::Rare => self.rare,
            Rarity::Uncommon => self.uncommon,
            Rarity::Common => self.common,
            Rarity::Special | Rarity::Bonus => 0,
        }
    }
}

impl Default for MaxDuplicates {
    fn default() -> Self {
        Self {
            mythic: 1,
            rare: 2,
            uncommon: 4,
            common: 8,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoosterOptions {
    pub foil: bool,
    pub mythic_promotion: bool,
    pub color_balance: bool,
}

impl Default for BoosterOptions {
    fn default() -> Self {
        Self {
            foil: false,
            mythic_promotion: true,
            color_balance: true,
        }
    }
}

/// Card pool split by rarity.
#[derive(Clone, Debug, Default)]
pub struct RarityPools {
    pub mythic: CardPool,
    pub rare: CardPool,
    pub uncommon: CardPool,
    pub common: CardPool,
}

impl RarityPools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the pools from a card list, adding the configured number of
    /// copies for each rarity.
    pub fn from_cards<'a, I: IntoIterator<Item = &'a Arc<Card>>>(
        cards: I,
        max_duplicates: &MaxDuplicates,
    ) -> Self {
        let mut pools = Self::new();
        for card in cards {
            pools.add(card, max_duplicates.of(card.rarity));
        }
        pools
    }

    /// Build the pools from a player collection (card ID to owned copies),
    /// capped by the configured number of copies.
    pub fn from_collection(
        collection: &HashMap<CardId, u32>,
        cards: &dyn CardLookup,
        max_duplicates: &MaxDuplicates,
    ) -> Self {
        let mut pools = Self::new();
        for (id, count) in collection {
            if let Some(card) = cards.lookup(id) {
                pools.add(&card, (*count).min(max_duplicates.of(card.rarity)));
            }
        }
        pools
    }

    pub fn add(&mut self, card: &Card, count: u32) {
        if let Some(pool) = self.get_mut(card.rarity) {
            pool.add(card.id.clone(), count);
        }
        // Special and bonus cards are not part of the pool.
    }

    pub fn get(&self, rarity: Rarity) -> Option<&CardPool> {
        match rarity {
            Rarity::Mythic => Some(&self.mythic),
            Rarity::Rare => Some(&self.rare),
            Rarity::Uncommon => Some(&self.uncommon),
            Rarity::Common => Some(&self.common),
            Rarity::Special | Rarity::Bonus => None,
        }
    }

    pub fn get_mut(&mut self, rarity: Rarity) -> Option<&mut CardPool> {
        match rarity {
            Rarity::Mythic => Some(&mut self.mythic),
            Rarity::Rare => Some(&mut self.rare),
            Rarity::Uncommon => Some(&mut self.uncommon),
            Rarity::Common => Some(&mut self.common),
            Rarity::Special | Rarity::Bonus => None,
        }
    }

    pub fn count(&self, rarity: Rarity) -> usize {
        self.get(rarity).map(CardPool::total).unwrap_or(0)
    }

    /// Split into (cards matching the predicate, other cards).
    pub fn partition<F: Fn(&Card) -> bool>(
        self,
        cards: &dyn CardLookup,
        predicate: F,
    ) -> (RarityPools, RarityPools) {
        let matches = |id: &str| cards.lookup(id).map(|c| predicate(&c)).unwrap_or(false);
        let (mythic, other_mythic) = self.mythic.partition(matches);
        let (rare, other_rare) = self.rare.partition(matches);
        let (uncommon, other_uncommon) = self.uncommon.partition(matches);
        let (common, other_common) = self.common.partition(matches);
        (
            RarityPools {
                mythic,
                rare,
                uncommon,
                common,
            },
            RarityPools {
                mythic: other_mythic,
                rare: other_rare,
                uncommon: other_uncommon,
                common: other_common,
            },
        )
    }

    /// Pools and matching database with the given number of cards of each
    /// rarity, one copy each. Commons cycle through the five colours.
    #[cfg(test)]
    pub fn sample(
        db: &mut crate::cards::CardDatabase,
        mythics: usize,
        rares: usize,
        uncommons: usize,
        commons: usize,
    ) -> Self {
        use crate::cards::Color;

        let mut pools = Self::new();
        let counts = [
            (Rarity::Mythic, mythics),
            (Rarity::Rare, rares),
            (Rarity::Uncommon, uncommons),
            (Rarity::Common, commons),
        ];
        for (rarity, count) in counts {
            for i in 0..count {
                let card = Card::sample(rarity).with_colors(&[Color::ALL[i % 5]]);
                pools.add(&card, 1);
                db.add(card);
            }
        }
        pools
    }
}

/// An extra slot holding basic lands (or set specific lands), drawn with
/// replacement and appended to each booster.
#[derive(Clone, Debug)]
pub struct LandSlot {
    pool: CardPool,
}

impl LandSlot {
    /// Move the commons matching the predicate (e.g. gates, gain lands) into
    /// a land slot.
    pub fn from_commons<F: Fn(&Card) -> bool>(
        commons: &mut CardPool,
        cards: &dyn CardLookup,
        predicate: F,
    ) -> Self {
        let (lands, rest) = std::mem::take(commons)
            .partition(|id| cards.lookup(id).map(|c| predicate(&c)).unwrap_or(false));
        *commons = rest;
        Self { pool: lands }
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    pub fn pick<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Res<CardId> {
        let options = PickOptions {
            with_replacement: true,
            duplicate_protection: false,
        };
        pick_card(&mut self.pool, &[], options, rng)
    }
}

#[derive(Clone, Debug)]
pub enum CardPredicate {
    TypeContains(String),
    TypeMatches(Regex),
    NameContains(String),
}

impl CardPredicate {
    pub fn matches(&self, card: &Card) -> bool {
        match self {
            CardPredicate::TypeContains(s) => card.type_line.contains(s.as_str()),
            CardPredicate::TypeMatches(re) => re.is_match(&card.type_line),
            CardPredicate::NameContains(s) => card.name.contains(s.as_str()),
        }
    }
}

/// Where a reserved card is put back into the booster.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Placement {
    /// First card of the booster.
    Front,
    /// In front of rares for a rare or mythic, else in front of the first card
    /// of its rarity.
    ByRarity,
}

/// Set specific collation rules enforcing a single card of some kind per
/// booster.
#[derive(Clone, Debug)]
pub enum SpecialRule {
    None,

    /// Exactly one matching card per booster, taken from the uncommon or rare
    /// slots. Ignored when the booster has neither.
    OneOfType {
        predicate: CardPredicate,
        placement: Placement,
    },

    /// Exactly one matching card per booster, regardless of targets, always
    /// placed first.
    OneOfRarityPool { predicate: CardPredicate },
}

impl SpecialRule {
    pub fn for_set(code: &str) -> Self {
        match code.to_ascii_lowercase().as_str() {
            // War of the Spark: one planeswalker per booster.
            "war" => SpecialRule::OneOfType {
                predicate: CardPredicate::TypeContains("Planeswalker".to_string()),
                placement: Placement::ByRarity,
            },
            // Zendikar Rising: one modal double-faced card per booster.
            "znr" => SpecialRule::OneOfType {
                predicate: CardPredicate::NameContains("//".to_string()),
                placement: Placement::ByRarity,
            },
            // Dominaria: one legendary creature per booster.
            "dom" => match Regex::new("Legendary.*Creature") {
                Ok(re) => SpecialRule::OneOfRarityPool {
                    predicate: CardPredicate::TypeMatches(re),
                },
                Err(_) => SpecialRule::None,
            },
            _ => SpecialRule::None,
        }
    }

    fn predicate(&self) -> Option<&CardPredicate> {
        match self {
            SpecialRule::None => None,
            SpecialRule::OneOfType { predicate, .. } | SpecialRule::OneOfRarityPool { predicate } => {
                Some(predicate)
            }
        }
    }

    fn placement(&self) -> Placement {
        match self {
            SpecialRule::OneOfType { placement, .. } => *placement,
            SpecialRule::None | SpecialRule::OneOfRarityPool { .. } => Placement::Front,
        }
    }
}

/// Choose the rarity of a reserved card, favouring rare over uncommon in the
/// proportion of the booster's rare and uncommon slots. Without any such slot
/// an uncommon is used whenever one is left.
fn roll_special_rarity<R: Rng + ?Sized>(
    reserved: &RarityPools,
    targets: &RarityTargets,
    mythic_promotion: bool,
    rng: &mut R,
) -> Rarity {
    let uncommons = reserved.count(Rarity::Uncommon);
    let rares = reserved.count(Rarity::Rare) + reserved.count(Rarity::Mythic);
    let slots = targets.rare + targets.uncommon;
    if uncommons > 0 && (rares == 0 || slots == 0) {
        return Rarity::Uncommon;
    }

    let rare_odds = targets.rare as f64 / slots.max(1) as f64;
    if uncommons == 0 || rng.gen::<f64>() < rare_odds {
        if reserved.count(Rarity::Rare) == 0
            || (reserved.count(Rarity::Mythic) > 0
                && mythic_promotion
                && rng.gen::<f64>() <= MYTHIC_RATE)
        {
            Rarity::Mythic
        } else {
            Rarity::Rare
        }
    } else {
        Rarity::Uncommon
    }
}

/// Map an exhausted pool to the rarity that ran out.
fn insufficient(rarity: Rarity) -> impl Fn(DraftError) -> DraftError {
    move |e| match e {
        DraftError::EmptyPool => DraftError::InsufficientCards(rarity),
        e => e,
    }
}

/// Generates regular boosters from pools split by rarity. Owns its pools:
/// every card handed out is removed from them.
pub struct BoosterFactory<'a> {
    mythic: CardPool,
    rare: CardPool,
    uncommon: CardPool,
    common: SheetPool,
    land_slot: Option<LandSlot>,
    options: BoosterOptions,
    rule: SpecialRule,
    reserved: RarityPools,
    cards: &'a dyn CardLookup,
}

impl<'a> BoosterFactory<'a> {
    pub fn new(
        pools: RarityPools,
        land_slot: Option<LandSlot>,
        options: BoosterOptions,
        rule: SpecialRule,
        cards: &'a dyn CardLookup,
    ) -> Res<Self> {
        let (reserved, pools) = match rule.predicate() {
            Some(predicate) => pools.partition(cards, |card| predicate.matches(card)),
            None => (RarityPools::new(), pools),
        };

        Ok(Self {
            mythic: pools.mythic,
            rare: pools.rare,
            uncommon: pools.uncommon,
            common: SheetPool::new(pools.common, options.color_balance, cards)?,
            land_slot,
            options,
            rule,
            reserved,
            cards,
        })
    }

    /// Generate a booster with the given number of cards of each rarity.
    pub fn generate_booster<R: Rng + ?Sized>(
        &mut self,
        targets: &RarityTargets,
        rng: &mut R,
    ) -> Res<Booster> {
        let reserved_available = self.reserved.count(Rarity::Mythic)
            + self.reserved.count(Rarity::Rare)
            + self.reserved.count(Rarity::Uncommon)
            > 0;
        let applies = match self.rule {
            SpecialRule::None => false,
            SpecialRule::OneOfType { .. } => targets.uncommon > 0 || targets.rare > 0,
            SpecialRule::OneOfRarityPool { .. } => true,
        };
        if !applies || !reserved_available {
            return self.generate_regular(targets, rng);
        }

        let rarity = roll_special_rarity(&self.reserved, targets, self.options.mythic_promotion, rng);
        let mut updated = *targets;
        match rarity {
            Rarity::Mythic | Rarity::Rare => updated.rare = updated.rare.saturating_sub(1),
            _ => updated.uncommon = updated.uncommon.saturating_sub(1),
        }

        // The reserved card is only drawn once the rest of the booster exists.
        let mut booster = self.generate_regular(&updated, rng)?;
        let reserved = self
            .reserved
            .get_mut(rarity)
            .ok_or_else(|| DraftError::Internal(format!("No reserved pool for {rarity:?}.")))?;
        let id = pick_card(reserved, &[], PickOptions::default(), rng).map_err(insufficient(rarity))?;
        let card = self.unique(&id)?;
        let index = match (self.rule.placement(), rarity) {
            (Placement::Front, _) | (Placement::ByRarity, Rarity::Mythic | Rarity::Rare) => 0,
            (Placement::ByRarity, _) => booster
                .iter()
                .position(|c| c.rarity() == rarity && !c.foil)
                .unwrap_or_else(|| {
                    booster
                        .iter()
                        .rposition(|c| matches!(c.rarity(), Rarity::Mythic | Rarity::Rare))
                        .map(|i| i + 1)
                        .unwrap_or(0)
                }),
        };
        booster.insert(index, card);
        Ok(booster)
    }

    fn generate_regular<R: Rng + ?Sized>(
        &mut self,
        targets: &RarityTargets,
        rng: &mut R,
    ) -> Res<Booster> {
        let options = PickOptions::default();
        let mut ids: Vec<CardId> = Vec::with_capacity(targets.total() + 1);

        let mut foils = 0;
        if self.options.foil && rng.gen::<f64>() <= FOIL_RATE {
            let check = rng.gen::<f64>();
            for (rarity, rate) in FOIL_RARITY_RATES {
                let pool_empty = match rarity {
                    Rarity::Common => self.common.is_empty(),
                    _ => self.pool(rarity).is_empty(),
                };
                if check <= rate && !pool_empty {
                    let id = match rarity {
                        Rarity::Common => self.common.pick(&ids, options, rng),
                        _ => pick_card(self.pool(rarity), &ids, options, rng),
                    }
                    .map_err(insufficient(rarity))?;
                    ids.push(id);
                    foils += 1;
                    break;
                }
            }
        }

        for _ in 0..targets.rare {
            let rarity = if self.mythic.is_empty() && self.rare.is_empty() {
                tracing::warn!("Not enough rare or mythic cards in collection.");
                return Err(DraftError::InsufficientCards(Rarity::Rare));
            } else if self.mythic.is_empty() {
                Rarity::Rare
            } else if self.options.mythic_promotion && self.rare.is_empty() {
                Rarity::Mythic
            } else if self.options.mythic_promotion && rng.gen::<f64>() <= MYTHIC_RATE {
                Rarity::Mythic
            } else {
                Rarity::Rare
            };
            let id = pick_card(self.pool(rarity), &ids, options, rng).map_err(insufficient(rarity))?;
            ids.push(id);
        }

        for _ in 0..targets.uncommon {
            let id = pick_card(&mut self.uncommon, &ids, options, rng)
                .map_err(insufficient(Rarity::Uncommon))?;
            ids.push(id);
        }

        let commons = targets.common.saturating_sub(foils);
        let picked = self
            .common
            .pick_many(commons, &ids, options, rng)
            .map_err(insufficient(Rarity::Common))?;
        ids.extend(picked);

        if let Some(land_slot) = &mut self.land_slot {
            ids.push(land_slot.pick(rng)?);
        }

        let mut booster = ids
            .iter()
            .map(|id| self.unique(id))
            .collect::<Res<Booster>>()?;
        if foils > 0 {
            booster[0].foil = true;
        }
        Ok(booster)
    }

    fn pool(&mut self, rarity: Rarity) -> &mut CardPool {
        match rarity {
            Rarity::Mythic => &mut self.mythic,
            Rarity::Rare => &mut self.rare,
            _ => &mut self.uncommon,
        }
    }

    fn unique(&self, id: &str) -> Res<UniqueCard> {
        match self.cards.lookup(id) {
            Some(card) => Ok(UniqueCard::new(card)),
            None => {
                tracing::error!("Generated booster holds unknown card '{id}'.");
                Err(DraftError::Internal(format!("Unknown card '{id}'.")))
            }
        }
    }
}

/// Generate `count` boosters from a single factory.
pub fn make_boosters<R: Rng + ?Sized>(
    factory: &mut BoosterFactory,
    count: usize,
    targets: &RarityTargets,
    rng: &mut R,
) -> Res<Vec<Booster>> {
    (0..count)
        .map(|_| factory.generate_booster(targets, rng))
        .collect()
}

/// Boosters of `size` distinct common sample cards each.
#[cfg(test)]
pub fn sample_boosters(count: usize, size: usize) -> Vec<Booster> {
    (0..count)
        .map(|_| {
            (0..size)
                .map(|_| UniqueCard::new(Arc::new(Card::sample(Rarity::Common))))
                .collect()
        })
        .collect()
}
