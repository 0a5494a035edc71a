use std::{collections::HashMap, fmt};

use rand::Rng;
use serde::de::{Deserializer, MapAccess, Visitor};

use crate::{
    cards::{CardDatabase, CardId, CardLookup, UniqueCard},
    error::{DraftError, MessageError, Res},
};

use super::{packs::Booster, pool::weighted_index};

fn one() -> u32 {
    1
}

/// Keeps the document order of a `{sheet: count}` map.
fn ordered_sheets<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<(String, usize)>, D::Error> {
    struct OrderedVisitor;

    impl<'de> Visitor<'de> for OrderedVisitor {
        type Value = Vec<(String, usize)>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map from sheet name to card count")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::new();
            while let Some(entry) = map.next_entry()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(OrderedVisitor)
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct PaperCardEntry {
    pub set: String,
    pub number: String,
    #[serde(default = "one")]
    pub weight: u32,
    #[serde(default)]
    pub foil: bool,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct PaperSheet {
    pub cards: Vec<PaperCardEntry>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct PaperLayout {
    #[serde(deserialize_with = "ordered_sheets")]
    pub sheets: Vec<(String, usize)>,
    #[serde(default = "one")]
    pub weight: u32,
}

impl PaperLayout {
    fn has_foil_sheet(&self) -> bool {
        self.sheets.iter().any(|(name, _)| name.contains("foil"))
    }
}

/// Published collation data for one set.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct PaperSet {
    pub code: String,
    pub boosters: Vec<PaperLayout>,
    pub sheets: HashMap<String, PaperSheet>,
}

/// Decode a collation data file holding a list of sets, keyed by set code.
/// Sets whose data does not describe their one-per-pack rules are skipped.
pub fn decode_paper_sets(data: &[u8]) -> Result<HashMap<String, PaperSet>, serde_json::Error> {
    let sets: Vec<PaperSet> = serde_json::from_slice(data)?;
    Ok(sets
        .into_iter()
        .filter(|set| {
            let incomplete = set.code == "znr";
            if incomplete {
                tracing::debug!("Skipping incomplete collation data for '{}'.", set.code);
            }
            !incomplete
        })
        .map(|set| (set.code.clone(), set))
        .collect())
}

#[derive(Clone, Debug)]
struct ResolvedCard {
    id: CardId,
    weight: u32,
    foil: bool,
}

/// Generates boosters from weighted sheets and layouts.
pub struct PaperBoosterFactory<'a> {
    layouts: Vec<PaperLayout>,
    sheets: HashMap<String, Vec<ResolvedCard>>,
    cards: &'a CardDatabase,
}

impl<'a> PaperBoosterFactory<'a> {
    pub fn new(set: &PaperSet, cards: &'a CardDatabase, foil: bool) -> Self {
        let mut layouts = set.boosters.clone();
        if !foil {
            let non_foil: Vec<PaperLayout> = layouts
                .iter()
                .filter(|layout| !layout.has_foil_sheet())
                .cloned()
                .collect();
            if !non_foil.is_empty() {
                layouts = non_foil;
            }
        }

        let mut sheets = HashMap::new();
        for (name, sheet) in &set.sheets {
            let resolved = sheet
                .cards
                .iter()
                .filter_map(|entry| match resolve(cards, entry) {
                    Some(id) => Some(ResolvedCard {
                        id,
                        weight: entry.weight,
                        foil: entry.foil,
                    }),
                    None => {
                        tracing::warn!(
                            "Could not find card {}:{} of sheet '{name}'.",
                            entry.set,
                            entry.number
                        );
                        None
                    }
                })
                .collect();
            sheets.insert(name.clone(), resolved);
        }

        Self {
            layouts,
            sheets,
            cards,
        }
    }

    pub fn generate_booster<R: Rng + ?Sized>(&self, rng: &mut R) -> Res<Booster> {
        let weights: Vec<u32> = self.layouts.iter().map(|l| l.weight).collect();
        let layout = weighted_index(&weights, rng)
            .and_then(|i| self.layouts.get(i))
            .ok_or_else(|| MessageError::generation("No booster layout available."))?;

        let mut picked: Vec<&ResolvedCard> = Vec::new();
        for (name, count) in &layout.sheets {
            let sheet = self
                .sheets
                .get(name)
                .ok_or_else(|| DraftError::Config(format!("Unknown sheet '{name}'.")))?;

            for _ in 0..*count {
                let weights: Vec<u32> = sheet
                    .iter()
                    .map(|card| {
                        if picked.iter().any(|p| p.id == card.id) {
                            0
                        } else {
                            card.weight
                        }
                    })
                    .collect();
                let index = weighted_index(&weights, rng).ok_or_else(|| {
                    MessageError::generation(format!("Not enough cards in sheet '{name}'."))
                })?;
                picked.push(&sheet[index]);
            }
        }

        picked
            .into_iter()
            .rev()
            .map(|entry| {
                let card = self.cards.lookup(&entry.id).ok_or_else(|| {
                    tracing::error!("Collation sheet holds unknown card '{}'.", entry.id);
                    DraftError::Internal(format!("Unknown card '{}'.", entry.id))
                })?;
                let mut card = UniqueCard::new(card);
                card.foil = entry.foil;
                Ok(card)
            })
            .collect()
    }
}

/// Find a sheet entry in the database. Double faced cards are listed with an
/// "a" or "★" suffix on their collector number.
fn resolve(cards: &CardDatabase, entry: &PaperCardEntry) -> Option<CardId> {
    cards
        .by_collector_number(&entry.set, &entry.number)
        .or_else(|| {
            let number = entry
                .number
                .strip_suffix('a')
                .or_else(|| entry.number.strip_suffix('★'))?;
            cards.by_collector_number(&entry.set, number)
        })
        .map(|card| card.id.clone())
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use rand::{rngs::StdRng, SeedableRng};

    use crate::cards::{Card, Rarity};

    use super::*;

    /// Database with commons 1-6, a rare numbered 7 and a double faced rare
    /// numbered 8.
    fn sample_db() -> CardDatabase {
        let mut db = CardDatabase::new();
        for i in 1..=8 {
            let rarity = if i > 6 { Rarity::Rare } else { Rarity::Common };
            let mut card = Card::sample(rarity);
            card.set = "pap".to_string();
            card.collector_number = i.to_string();
            card.id = format!("pap-{i}");
            db.add(card);
        }
        db
    }

    const DATA: &str = r#"[{
        "code": "pap",
        "boosters": [
            {"sheets": {"common": 3, "rare": 1}, "weight": 1},
            {"sheets": {"common": 2, "foil": 1, "rare": 1}, "weight": 1}
        ],
        "sheets": {
            "common": {"balance_colors": true, "total_weight": 6, "cards": [
                {"set": "pap", "number": "1", "weight": 1},
                {"set": "pap", "number": "2", "weight": 1},
                {"set": "pap", "number": "3", "weight": 1},
                {"set": "pap", "number": "4", "weight": 1},
                {"set": "pap", "number": "5", "weight": 1},
                {"set": "pap", "number": "99", "weight": 1}
            ]},
            "foil": {"total_weight": 1, "cards": [
                {"set": "pap", "number": "6", "weight": 1, "foil": true}
            ]},
            "rare": {"total_weight": 3, "cards": [
                {"set": "pap", "number": "7", "weight": 2},
                {"set": "pap", "number": "8a", "weight": 1}
            ]}
        }
    }, {
        "code": "znr",
        "boosters": [],
        "sheets": {}
    }]"#;

    #[test]
    fn test_decode_sets() {
        let sets = decode_paper_sets(DATA.as_bytes()).unwrap();
        assert_eq!(sets.len(), 1);
        let set = sets.get("pap").unwrap();
        assert_eq!(
            set.boosters[1].sheets,
            vec![
                ("common".to_string(), 2),
                ("foil".to_string(), 1),
                ("rare".to_string(), 1)
            ]
        );
        // Published `balance_colors` and `total_weight` keys are ignored.
        assert_eq!(set.sheets["common"].cards.len(), 6);
        assert_eq!(set.sheets["rare"].cards.iter().map(|c| c.weight).sum::<u32>(), 3);
    }

    #[test]
    fn test_generate_without_foils() {
        let rng = &mut StdRng::seed_from_u64(1);
        let db = sample_db();
        let sets = decode_paper_sets(DATA.as_bytes()).unwrap();
        let factory = PaperBoosterFactory::new(sets.get("pap").unwrap(), &db, false);

        // Unknown collector numbers are dropped, suffixed numbers resolved.
        assert_eq!(factory.sheets["common"].len(), 5);
        assert_eq!(factory.sheets["rare"][1].id, "pap-8");

        let mut rares = HashSet::new();
        for _ in 0..50 {
            let booster = factory.generate_booster(rng).unwrap();
            assert_eq!(booster.len(), 4);
            assert!(booster.iter().all(|c| !c.foil));

            // Drawn commons first, reversed: the rare leads.
            assert_eq!(booster[0].rarity(), Rarity::Rare);
            rares.insert(booster[0].id().to_string());

            let commons: HashSet<&str> = booster[1..].iter().map(|c| c.id()).collect();
            assert_eq!(commons.len(), 3);
        }
        assert_eq!(rares.len(), 2);
    }

    #[test]
    fn test_generate_with_foils() {
        let rng = &mut StdRng::seed_from_u64(2);
        let db = sample_db();
        let sets = decode_paper_sets(DATA.as_bytes()).unwrap();
        let factory = PaperBoosterFactory::new(sets.get("pap").unwrap(), &db, true);
        assert_eq!(factory.layouts.len(), 2);

        let mut foils = 0;
        for _ in 0..50 {
            let booster = factory.generate_booster(rng).unwrap();
            assert_eq!(booster.len(), 4);
            if let Some(foil) = booster.iter().find(|c| c.foil) {
                assert_eq!(foil.id(), "pap-6");
                foils += 1;
            }
        }
        assert!(foils > 0 && foils < 50);
    }

    #[test]
    fn test_exhausted_sheet() {
        let rng = &mut StdRng::seed_from_u64(3);
        let db = sample_db();
        let set: PaperSet = serde_json::from_str(
            r#"{
                "code": "pap",
                "boosters": [{"sheets": {"rare": 3}, "weight": 1}],
                "sheets": {"rare": {"cards": [
                    {"set": "pap", "number": "7"},
                    {"set": "pap", "number": "8"}
                ]}}
            }"#,
        )
        .unwrap();
        let factory = PaperBoosterFactory::new(&set, &db, false);
        assert!(matches!(
            factory.generate_booster(rng),
            Err(DraftError::Generation(_))
        ));
    }
}
