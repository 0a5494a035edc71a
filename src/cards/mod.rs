use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

pub mod cockatrice;
pub mod scryfall;

pub type CardId = String;

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Rarity {
    Mythic,
    Rare,
    Uncommon,
    #[default]
    Common,
    Special,
    Bonus,
}

impl Rarity {
    pub fn name(self) -> &'static str {
        match self {
            Rarity::Mythic => "mythic",
            Rarity::Rare => "rare",
            Rarity::Uncommon => "uncommon",
            Rarity::Common => "common",
            Rarity::Special => "special",
            Rarity::Bonus => "bonus",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mythic" => Some(Rarity::Mythic),
            "rare" => Some(Rarity::Rare),
            "uncommon" => Some(Rarity::Uncommon),
            "common" => Some(Rarity::Common),
            "special" => Some(Rarity::Special),
            "bonus" => Some(Rarity::Bonus),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum Color {
    W,
    U,
    B,
    R,
    G,
}

impl Color {
    pub const ALL: [Color; 5] = [Color::W, Color::U, Color::B, Color::R, Color::G];

    pub fn symbol(self) -> char {
        match self {
            Color::W => 'W',
            Color::U => 'U',
            Color::B => 'B',
            Color::R => 'R',
            Color::G => 'G',
        }
    }

    pub fn from_symbol(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            'W' => Some(Color::W),
            'U' => Some(Color::U),
            'B' => Some(Color::B),
            'R' => Some(Color::R),
            'G' => Some(Color::G),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Card {
    #[serde(default)]
    pub id: CardId,
    pub name: String,
    #[serde(default)]
    pub set: String,
    #[serde(default)]
    pub collector_number: String,
    #[serde(default)]
    pub rarity: Rarity,
    #[serde(default)]
    pub colors: Vec<Color>,
    #[serde(default, rename = "type")]
    pub type_line: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub text: String,
}

impl Card {
    /// Colour identity key used to bucket cards for colour balancing, e.g.
    /// "WU". Colourless cards have an empty key.
    pub fn color_key(&self) -> String {
        let mut colors = self.colors.clone();
        colors.sort();
        colors.dedup();
        colors.into_iter().map(Color::symbol).collect()
    }

    pub fn is_monocolored(&self) -> bool {
        self.color_key().len() == 1
    }

    #[cfg(test)]
    pub fn sample(rarity: Rarity) -> Self {
        static ID: AtomicU64 = AtomicU64::new(1);

        let id = ID.fetch_add(1, Ordering::Relaxed);
        Self {
            id: format!("tst-{id}"),
            name: format!("Card {id}"),
            set: "tst".to_string(),
            collector_number: id.to_string(),
            rarity,
            colors: Vec::new(),
            type_line: "Creature".to_string(),
            image: format!("https://example.com/card-{id}-art.jpg"),
            text: format!("Text for test card {id}."),
        }
    }

    #[cfg(test)]
    pub fn with_colors(mut self, colors: &[Color]) -> Self {
        self.colors = colors.to_vec();
        self
    }

    #[cfg(test)]
    pub fn with_type(mut self, type_line: &str) -> Self {
        self.type_line = type_line.to_string();
        self
    }
}

/// A single copy of a card handed to a player. Foil and slot are properties of
/// the copy, not the card.
#[derive(Clone, Debug, serde::Serialize)]
pub struct UniqueCard {
    pub uid: u64,
    #[serde(flatten)]
    pub card: Arc<Card>,
    pub foil: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slot: Option<String>,
}

impl UniqueCard {
    pub fn new(card: Arc<Card>) -> Self {
        static UID: AtomicU64 = AtomicU64::new(1);

        Self {
            uid: UID.fetch_add(1, Ordering::Relaxed),
            card,
            foil: false,
            slot: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.card.id
    }

    pub fn rarity(&self) -> Rarity {
        self.card.rarity
    }
}

/// Card metadata source used by the booster generators.
pub trait CardLookup {
    fn lookup(&self, id: &str) -> Option<Arc<Card>>;
}

#[derive(Default)]
pub struct CardDatabase {
    /// Map from card ID to card.
    cards: HashMap<CardId, Arc<Card>>,

    /// Map from lowercased card name to card ID.
    name_to_id: HashMap<String, CardId>,

    /// Map from "set:collector number" to card ID.
    collector_numbers: HashMap<String, CardId>,
}

impl CardDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, card: Card) {
        let key = card.name.to_ascii_lowercase();
        self.name_to_id.entry(key).or_insert_with(|| card.id.clone());
        if !card.collector_number.is_empty() {
            self.collector_numbers.insert(
                format!("{}:{}", card.set.to_ascii_lowercase(), card.collector_number),
                card.id.clone(),
            );
        }
        self.cards.insert(card.id.clone(), Arc::new(card));
    }

    /// Find a card by (case insensitive) name.
    pub fn get(&self, name: &str) -> Option<&Arc<Card>> {
        self.name_to_id
            .get(&name.to_ascii_lowercase())
            .and_then(|id| self.cards.get(id))
    }

    pub fn by_collector_number(&self, set: &str, number: &str) -> Option<&Arc<Card>> {
        self.collector_numbers
            .get(&format!("{}:{}", set.to_ascii_lowercase(), number))
            .and_then(|id| self.cards.get(id))
    }

    /// All draftable cards of a set.
    pub fn cards_in_set<'a>(&'a self, set: &'a str) -> impl Iterator<Item = &'a Arc<Card>> + 'a {
        self.cards
            .values()
            .filter(move |card| card.set.eq_ignore_ascii_case(set))
    }

    pub fn cards(&self) -> impl Iterator<Item = &Arc<Card>> {
        self.cards.values()
    }

    pub fn size(&self) -> usize {
        self.cards.len()
    }
}

impl CardLookup for CardDatabase {
    fn lookup(&self, id: &str) -> Option<Arc<Card>> {
        self.cards.get(id).cloned()
    }
}

/// Lookup that prefers a custom card list's own card definitions over the
/// shared database.
pub struct CustomCardLookup<'a> {
    pub custom: &'a HashMap<CardId, Arc<Card>>,
    pub database: &'a dyn CardLookup,
}

impl CardLookup for CustomCardLookup<'_> {
    fn lookup(&self, id: &str) -> Option<Arc<Card>> {
        self.custom
            .get(id)
            .cloned()
            .or_else(|| self.database.lookup(id))
    }
}
