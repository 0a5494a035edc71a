use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use rand::{seq::SliceRandom, Rng};
use serde::Deserialize;

use crate::{
    cards::{Card, CardId, CardLookup, CustomCardLookup, UniqueCard},
    error::{DraftError, MessageError, Res},
};

use super::{
    color_balance::{ColorBalancedSlot, SheetPool, COLOR_BALANCE_THRESHOLD},
    game::BoosterSettings,
    packs::Booster,
    pool::{pick_card, pick_print_run, weighted_index, CardPool, PickOptions},
};

fn one() -> usize {
    1
}

/// A sheet is `{"cards": {id: count}}`, or a print run when `collation` is
/// `"printRun"`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawSheet")]
pub enum Sheet {
    PrintRun {
        print_run: Vec<CardId>,
        group_size: usize,
    },
    Random {
        cards: BTreeMap<CardId, u32>,
    },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSheet {
    collation: Option<String>,
    print_run: Option<Vec<CardId>>,
    #[serde(default = "one")]
    group_size: usize,
    cards: Option<BTreeMap<CardId, u32>>,
}

impl TryFrom<RawSheet> for Sheet {
    type Error = String;

    fn try_from(raw: RawSheet) -> Result<Self, Self::Error> {
        if raw.collation.as_deref() == Some("printRun") {
            let print_run = raw
                .print_run
                .ok_or_else(|| "Print run sheet without 'printRun'.".to_string())?;
            Ok(Sheet::PrintRun {
                print_run,
                group_size: raw.group_size,
            })
        } else {
            let cards = raw.cards.ok_or_else(|| "Sheet without 'cards'.".to_string())?;
            Ok(Sheet::Random { cards })
        }
    }
}

impl Sheet {
    fn is_empty(&self) -> bool {
        match self {
            Sheet::PrintRun { print_run, .. } => print_run.is_empty(),
            Sheet::Random { cards } => cards.values().all(|n| *n == 0),
        }
    }

    fn card_ids(&self) -> Box<dyn Iterator<Item = &CardId> + '_> {
        match self {
            Sheet::PrintRun { print_run, .. } => Box::new(print_run.iter()),
            Sheet::Random { cards } => Box::new(cards.keys()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SheetChoice {
    pub name: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Slot {
    pub name: String,
    pub count: usize,
    #[serde(default)]
    pub foil: bool,
    pub sheets: Vec<SheetChoice>,
}

fn default_weight() -> u32 {
    1
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PackLayout {
    #[serde(default = "default_weight")]
    pub weight: u32,
    pub slots: Vec<Slot>,
}

impl PackLayout {
    /// Index of the slot to colour balance: the first of the largest slots.
    fn largest_slot(&self) -> Option<usize> {
        let max = self.slots.iter().map(|s| s.count).max()?;
        self.slots.iter().position(|s| s.count == max)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomListSettings {
    pub name: Option<String>,
    pub show_slots: bool,
    pub booster_settings: Option<Vec<BoosterSettings>>,
    pub predetermined_layouts: Option<Vec<Vec<SheetChoice>>>,
    pub layout_with_replacement: Option<bool>,
    pub duplicate_protection: Option<bool>,
    pub boosters_per_player: Option<usize>,
    pub with_replacement: Option<bool>,
    pub color_balance: Option<bool>,
    pub print_run_wrap: Option<bool>,
}

/// `layouts` is either a map or `false`.
fn layouts_or_false<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<BTreeMap<String, PackLayout>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Layouts {
        Map(BTreeMap<String, PackLayout>),
        Disabled(bool),
    }

    match Option::<Layouts>::deserialize(deserializer)? {
        Some(Layouts::Map(layouts)) => Ok(layouts),
        Some(Layouts::Disabled(false)) | None => Ok(BTreeMap::new()),
        Some(Layouts::Disabled(true)) => Err(serde::de::Error::custom(
            "layouts must be a map or false",
        )),
    }
}

/// A user supplied card list: sheets of cards, optional booster layouts made
/// of slots drawing from those sheets, and cards that are not part of the
/// shared database.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomCardList {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub sheets: BTreeMap<String, Sheet>,
    #[serde(default, deserialize_with = "layouts_or_false")]
    pub layouts: BTreeMap<String, PackLayout>,
    #[serde(default)]
    pub custom_cards: Option<HashMap<CardId, Card>>,
    #[serde(default)]
    pub settings: CustomListSettings,
}

impl CustomCardList {
    pub fn from_json(data: &[u8]) -> Res<Self> {
        let list: CustomCardList = serde_json::from_slice(data)
            .map_err(|e| DraftError::Config(format!("Could not parse card list: {e}")))?;
        Ok(list)
    }

    /// Custom card definitions keyed by ID. Cards without an explicit ID take
    /// the key they are listed under.
    pub fn custom_cards(&self) -> HashMap<CardId, Arc<Card>> {
        self.custom_cards
            .iter()
            .flatten()
            .map(|(id, card)| {
                let mut card = card.clone();
                if card.id.is_empty() {
                    card.id = id.clone();
                }
                (id.clone(), Arc::new(card))
            })
            .collect()
    }

    /// Check that every layout refers to existing sheets, that predetermined
    /// layouts exist and that every card is known.
    pub fn validate(&self, database: &dyn CardLookup) -> Res<()> {
        for (name, layout) in &self.layouts {
            for slot in &layout.slots {
                if slot.sheets.is_empty() {
                    return Err(DraftError::Config(format!(
                        "Slot '{}' of layout '{name}' has no sheet.",
                        slot.name
                    )));
                }
                if let Some(sheet) = slot.sheets.iter().find(|s| !self.sheets.contains_key(&s.name)) {
                    return Err(DraftError::Config(format!(
                        "Slot '{}' of layout '{name}' refers to unknown sheet '{}'.",
                        slot.name, sheet.name
                    )));
                }
            }
        }

        for group in self.settings.predetermined_layouts.iter().flatten() {
            if group.is_empty() {
                return Err(MessageError::generation("Invalid layout: empty predetermined group.").into());
            }
            if let Some(choice) = group.iter().find(|c| !self.layouts.contains_key(&c.name)) {
                return Err(MessageError::generation(format!("Invalid layout '{}'.", choice.name)).into());
            }
        }

        let custom = self.custom_cards();
        let lookup = CustomCardLookup {
            custom: &custom,
            database,
        };
        for sheet in self.sheets.values() {
            if let Some(id) = sheet.card_ids().find(|id| lookup.lookup(id).is_none()) {
                return Err(DraftError::Config(format!("Unknown card '{id}'.")));
            }
        }
        Ok(())
    }
}

/// Per generation options. List settings provide the session defaults.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CustomListOptions {
    pub color_balance: bool,
    pub cards_per_booster: usize,
    pub with_replacement: bool,
    pub duplicate_protection: bool,

    /// Number of players, so that all boosters of a round use the same
    /// predetermined layout group.
    pub player_count: Option<usize>,
}

impl Default for CustomListOptions {
    fn default() -> Self {
        Self {
            color_balance: false,
            cards_per_booster: 15,
            with_replacement: false,
            duplicate_protection: true,
            player_count: None,
        }
    }
}

impl CustomListOptions {
    fn pick_options(&self) -> PickOptions {
        PickOptions {
            with_replacement: self.with_replacement,
            duplicate_protection: self.duplicate_protection,
        }
    }
}

/// Fill a bag with `weight` copies of each name, shuffled.
fn fill_bag<'a, R: Rng + ?Sized>(
    choices: impl Iterator<Item = (&'a str, u32)>,
    rng: &mut R,
) -> Vec<&'a str> {
    let mut bag: Vec<&str> = choices
        .flat_map(|(name, weight)| std::iter::repeat(name).take(weight as usize))
        .collect();
    bag.shuffle(rng);
    bag
}

enum LayoutPicker<'a> {
    Random(&'a BTreeMap<String, PackLayout>),
    Bag {
        layouts: &'a BTreeMap<String, PackLayout>,
        bag: Vec<&'a str>,
    },
    Predetermined(&'a [Vec<SheetChoice>]),
    PredeterminedBag {
        groups: &'a [Vec<SheetChoice>],
        bags: Vec<Vec<&'a str>>,
    },
}

impl<'a> LayoutPicker<'a> {
    fn new(list: &'a CustomCardList) -> Self {
        let with_replacement = list.settings.layout_with_replacement != Some(false);
        match &list.settings.predetermined_layouts {
            Some(groups) if with_replacement => LayoutPicker::Predetermined(groups),
            Some(groups) => LayoutPicker::PredeterminedBag {
                groups,
                bags: vec![Vec::new(); groups.len()],
            },
            None if with_replacement => LayoutPicker::Random(&list.layouts),
            None => LayoutPicker::Bag {
                layouts: &list.layouts,
                bag: Vec::new(),
            },
        }
    }

    fn next<R: Rng + ?Sized>(&mut self, index: usize, rng: &mut R) -> Option<&'a str> {
        match self {
            LayoutPicker::Random(layouts) => {
                let layouts: &'a BTreeMap<String, PackLayout> = *layouts;
                let weights: Vec<u32> = layouts.values().map(|l| l.weight).collect();
                weighted_index(&weights, rng)
                    .and_then(|i| layouts.keys().nth(i))
                    .or_else(|| layouts.keys().next())
                    .map(String::as_str)
            }
            LayoutPicker::Bag { layouts, bag } => {
                let layouts: &'a BTreeMap<String, PackLayout> = *layouts;
                if bag.is_empty() {
                    *bag = fill_bag(layouts.iter().map(|(n, l)| (n.as_str(), l.weight)), rng);
                }
                bag.pop()
            }
            LayoutPicker::Predetermined(groups) => {
                let groups: &'a [Vec<SheetChoice>] = *groups;
                let choices = groups.get(index % groups.len().max(1))?;
                let weights: Vec<u32> = choices.iter().map(|c| c.weight).collect();
                let i = if choices.len() == 1 {
                    0
                } else {
                    weighted_index(&weights, rng)?
                };
                choices.get(i).map(|c| c.name.as_str())
            }
            LayoutPicker::PredeterminedBag { groups, bags } => {
                let groups: &'a [Vec<SheetChoice>] = *groups;
                let index = index % groups.len().max(1);
                let bag = bags.get_mut(index)?;
                if bag.is_empty() {
                    let group = groups.get(index)?;
                    *bag = fill_bag(group.iter().map(|c| (c.name.as_str(), c.weight)), rng);
                }
                bag.pop()
            }
        }
    }
}

fn unique(cards: &dyn CardLookup, id: &str) -> Res<UniqueCard> {
    match cards.lookup(id) {
        Some(card) => Ok(UniqueCard::new(card)),
        None => {
            tracing::error!("Custom list booster holds unknown card '{id}'.");
            Err(DraftError::Internal(format!("Unknown card '{id}'.")))
        }
    }
}

fn exhausted(e: DraftError) -> DraftError {
    match e {
        DraftError::EmptyPool => DraftError::Generation(MessageError::generation(
            "An error occured while generating boosters. Make sure there are enough cards in the list.",
        )),
        e => e,
    }
}

/// Generate `quantity` boosters from a custom card list.
pub fn generate_custom_boosters<R: Rng + ?Sized>(
    list: &CustomCardList,
    quantity: usize,
    options: &CustomListOptions,
    database: &dyn CardLookup,
    rng: &mut R,
) -> Res<Vec<Booster>> {
    if list.sheets.values().all(Sheet::is_empty) {
        return Err(MessageError::generation("No custom card list provided.").into());
    }

    let custom = list.custom_cards();
    let cards = CustomCardLookup {
        custom: &custom,
        database,
    };

    if list.layouts.is_empty() {
        generate_single_slot(list, quantity, options, &cards, rng)
    } else {
        generate_from_layouts(list, quantity, options, &cards, rng)
    }
}

fn generate_from_layouts<R: Rng + ?Sized>(
    list: &CustomCardList,
    quantity: usize,
    options: &CustomListOptions,
    cards: &dyn CardLookup,
    rng: &mut R,
) -> Res<Vec<Booster>> {
    let pick_options = options.pick_options();
    let wrap = list.settings.print_run_wrap.unwrap_or(true);

    let mut pools: HashMap<&str, SheetPool> = HashMap::new();
    for (name, sheet) in &list.sheets {
        if let Sheet::Random { cards: counts } = sheet {
            let pool: CardPool = counts.iter().map(|(id, n)| (id.clone(), *n)).collect();
            pools.insert(name.as_str(), SheetPool::new(pool, options.color_balance, cards)?);
        }
    }

    let balanced_slots: HashMap<&str, usize> = list
        .layouts
        .iter()
        .filter_map(|(name, layout)| Some((name.as_str(), layout.largest_slot()?)))
        .collect();

    let mut picker = LayoutPicker::new(list);
    let mut boosters = Vec::with_capacity(quantity);
    for i in 0..quantity {
        let index = options.player_count.filter(|n| *n > 0).map(|n| i / n).unwrap_or(i);
        let layout_name = picker.next(index, rng).unwrap_or_default();
        let Some(layout) = list.layouts.get(layout_name) else {
            return Err(MessageError::generation(format!("Invalid layout '{layout_name}'.")).into());
        };

        let mut booster: Booster = Vec::new();
        let mut ids: Vec<CardId> = Vec::new();
        for (slot_index, slot) in layout.slots.iter().enumerate() {
            let weights: Vec<u32> = slot.sheets.iter().map(|s| s.weight).collect();
            let sheet_name = weighted_index(&weights, rng)
                .and_then(|i| slot.sheets.get(i))
                .map(|s| s.name.as_str())
                .ok_or_else(|| DraftError::Config(format!("Slot '{}' has no sheet.", slot.name)))?;

            let picked = match list.sheets.get(sheet_name) {
                Some(Sheet::PrintRun {
                    print_run,
                    group_size,
                }) => pick_print_run(slot.count, print_run, *group_size, wrap, rng)?,
                Some(Sheet::Random { .. }) => {
                    let pool = pools.get_mut(sheet_name).ok_or_else(|| {
                        DraftError::Internal(format!("Missing pool for sheet '{sheet_name}'."))
                    })?;
                    let balance = options.color_balance
                        && balanced_slots.get(layout_name) == Some(&slot_index)
                        && slot.count >= COLOR_BALANCE_THRESHOLD;
                    if balance {
                        pool.pick_many(slot.count, &ids, pick_options, rng)
                            .map_err(exhausted)?
                    } else {
                        let mut picked: Vec<CardId> = Vec::with_capacity(slot.count);
                        for _ in 0..slot.count {
                            let exclude: Vec<CardId> = ids.iter().chain(&picked).cloned().collect();
                            let id = pool.pick(&exclude, pick_options, rng).map_err(exhausted)?;
                            picked.push(id);
                        }
                        picked
                    }
                }
                None => {
                    return Err(DraftError::Config(format!("Unknown sheet '{sheet_name}'.")));
                }
            };

            let label = list
                .settings
                .show_slots
                .then(|| slot.name.split("##").next().unwrap_or_default().to_string());
            for id in picked {
                let mut card = unique(cards, &id)?;
                card.foil = slot.foil;
                card.slot = label.clone();
                ids.push(id);
                booster.push(card);
            }
        }
        boosters.push(booster);
    }
    Ok(boosters)
}

fn generate_single_slot<R: Rng + ?Sized>(
    list: &CustomCardList,
    quantity: usize,
    options: &CustomListOptions,
    cards: &dyn CardLookup,
    rng: &mut R,
) -> Res<Vec<Booster>> {
    let mut sheets = list.sheets.values();
    let sheet = match (sheets.next(), sheets.next()) {
        (None, _) => return Err(DraftError::Config("No slot defined.".to_string())),
        (Some(sheet), None) => sheet,
        (Some(_), Some(_)) => {
            return Err(DraftError::Config(
                "Multiple 'default' slots defined. Merge them into a single one, or use layouts.".to_string(),
            ))
        }
    };
    let Sheet::Random { cards: counts } = sheet else {
        return Err(DraftError::Config(
            "Print run collation is not supported when a single slot is defined.".to_string(),
        ));
    };

    let mut pool: CardPool = counts.iter().map(|(id, n)| (id.clone(), *n)).collect();
    let per_booster = options.cards_per_booster;
    let target = per_booster * quantity;
    if !options.with_replacement && pool.total() < target {
        return Err(MessageError::generation(format!(
            "Not enough cards ({}/{target}) in custom list.",
            pool.total()
        ))
        .into());
    }

    let pick_options = options.pick_options();
    let mut boosters = Vec::with_capacity(quantity);
    if options.color_balance && per_booster >= COLOR_BALANCE_THRESHOLD {
        let mut slot = ColorBalancedSlot::new(pool, cards)?;
        for _ in 0..quantity {
            let ids = slot.generate(per_booster, &[], pick_options, rng).map_err(exhausted)?;
            boosters.push(ids.iter().map(|id| unique(cards, id)).collect::<Res<Booster>>()?);
        }
    } else {
        for _ in 0..quantity {
            let mut ids = Vec::with_capacity(per_booster);
            for _ in 0..per_booster {
                let id = pick_card(&mut pool, &ids, pick_options, rng).map_err(exhausted)?;
                ids.push(id);
            }
            boosters.push(ids.iter().map(|id| unique(cards, id)).collect::<Res<Booster>>()?);
        }
    }
    Ok(boosters)
}

#[cfg(test)]
mod test {
    use std::collections::HashSet;

    use rand::{rngs::StdRng, SeedableRng};
    use serde_json::json;

    use crate::cards::CardDatabase;

    use super::*;

    fn list(value: serde_json::Value) -> CustomCardList {
        serde_json::from_value(value).unwrap()
    }

    /// Custom cards c0..c{n}, cycling through the five colours.
    fn custom_cards(prefix: &str, n: usize) -> serde_json::Value {
        let colors = ["W", "U", "B", "R", "G"];
        let mut cards = serde_json::Map::new();
        for i in 0..n {
            cards.insert(
                format!("{prefix}{i}"),
                json!({"name": format!("{prefix} {i}"), "colors": [colors[i % 5]]}),
            );
        }
        serde_json::Value::Object(cards)
    }

    fn sheet(prefix: &str, n: usize, copies: u32) -> serde_json::Value {
        let cards: serde_json::Map<String, serde_json::Value> =
            (0..n).map(|i| (format!("{prefix}{i}"), json!(copies))).collect();
        json!({ "cards": cards })
    }

    fn merge(a: serde_json::Value, b: serde_json::Value) -> serde_json::Value {
        let mut a = a.as_object().cloned().unwrap();
        a.extend(b.as_object().cloned().unwrap());
        serde_json::Value::Object(a)
    }

    #[test]
    fn test_single_slot_oversubscription() {
        let rng = &mut StdRng::seed_from_u64(1);
        let db = CardDatabase::new();
        let cube = list(json!({
            "sheets": {"default": sheet("c", 40, 1)},
            "layouts": false,
            "customCards": custom_cards("c", 40),
        }));
        cube.validate(&db).unwrap();

        let options = CustomListOptions::default();
        let result = generate_custom_boosters(&cube, 3, &options, &db, rng);
        assert!(matches!(result, Err(DraftError::Generation(_))));

        let boosters = generate_custom_boosters(&cube, 2, &options, &db, rng).unwrap();
        assert_eq!(boosters.len(), 2);
        let ids: HashSet<&str> = boosters.iter().flatten().map(|c| c.id()).collect();
        assert_eq!(ids.len(), 30);

        let options = CustomListOptions {
            with_replacement: true,
            ..Default::default()
        };
        assert_eq!(generate_custom_boosters(&cube, 4, &options, &db, rng).unwrap().len(), 4);
    }

    #[test]
    fn test_single_slot_color_balance() {
        let rng = &mut StdRng::seed_from_u64(2);
        let db = CardDatabase::new();
        let cube = list(json!({
            "sheets": {"default": sheet("c", 50, 1)},
            "customCards": custom_cards("c", 50),
        }));
        let options = CustomListOptions {
            color_balance: true,
            cards_per_booster: 10,
            ..Default::default()
        };
        for booster in generate_custom_boosters(&cube, 4, &options, &db, rng).unwrap() {
            assert_eq!(booster.len(), 10);
            let colors: HashSet<String> = booster.iter().map(|c| c.card.color_key()).collect();
            assert_eq!(colors.len(), 5);
        }
    }

    #[test]
    fn test_list_errors() {
        let rng = &mut StdRng::seed_from_u64(3);
        let db = CardDatabase::new();
        let options = CustomListOptions::default();

        let empty = list(json!({"sheets": {"default": {"cards": {}}}}));
        assert_eq!(
            generate_custom_boosters(&empty, 1, &options, &db, rng).unwrap_err(),
            DraftError::Generation(MessageError::generation("No custom card list provided."))
        );

        let multiple = list(json!({
            "sheets": {"a": sheet("a", 20, 1), "b": sheet("b", 20, 1)},
            "customCards": merge(custom_cards("a", 20), custom_cards("b", 20)),
        }));
        assert!(matches!(
            generate_custom_boosters(&multiple, 1, &options, &db, rng),
            Err(DraftError::Config(_))
        ));

        let print_run = list(json!({
            "sheets": {"run": {"collation": "printRun", "printRun": ["a0", "a1"], "groupSize": 1}},
            "customCards": custom_cards("a", 2),
        }));
        assert!(matches!(
            generate_custom_boosters(&print_run, 1, &options, &db, rng),
            Err(DraftError::Config(_))
        ));

        let unknown = list(json!({"sheets": {"default": {"cards": {"nope": 1}}}}));
        assert!(matches!(unknown.validate(&db), Err(DraftError::Config(_))));
    }

    fn layout_list(settings: serde_json::Value) -> CustomCardList {
        list(json!({
            "sheets": {
                "rares": sheet("r", 10, 1),
                "commons": sheet("c", 60, 1),
            },
            "layouts": {
                "a": {"weight": 2, "slots": [
                    {"name": "Rare##hidden", "count": 1, "foil": true, "sheets": [{"name": "rares", "weight": 1}]},
                    {"name": "Common", "count": 5, "sheets": [{"name": "commons", "weight": 1}]}
                ]},
                "b": {"weight": 1, "slots": [
                    {"name": "Common", "count": 3, "sheets": [{"name": "commons", "weight": 1}]}
                ]}
            },
            "customCards": merge(custom_cards("r", 10), custom_cards("c", 60)),
            "settings": settings,
        }))
    }

    #[test]
    fn test_layout_slots() {
        let rng = &mut StdRng::seed_from_u64(4);
        let db = CardDatabase::new();
        let cards = layout_list(json!({"showSlots": true}));
        cards.validate(&db).unwrap();

        let options = CustomListOptions {
            color_balance: true,
            ..Default::default()
        };
        let boosters = generate_custom_boosters(&cards, 6, &options, &db, rng).unwrap();
        for booster in &boosters {
            if booster.len() == 6 {
                assert_eq!(booster[0].slot.as_deref(), Some("Rare"));
                assert!(booster[0].foil);
                assert!(booster[1..].iter().all(|c| !c.foil && c.slot.as_deref() == Some("Common")));

                // The largest slot is colour balanced.
                let colors: HashSet<String> = booster[1..].iter().map(|c| c.card.color_key()).collect();
                assert_eq!(colors.len(), 5);
            } else {
                assert_eq!(booster.len(), 3);
            }
        }
        let ids: HashSet<u64> = boosters.iter().flatten().map(|c| c.uid).collect();
        assert_eq!(ids.len(), boosters.iter().map(Vec::len).sum::<usize>());
    }

    #[test]
    fn test_layouts_without_replacement() {
        let rng = &mut StdRng::seed_from_u64(5);
        let db = CardDatabase::new();
        let cards = layout_list(json!({"layoutWithReplacement": false}));
        let options = CustomListOptions::default();

        for _ in 0..10 {
            let boosters = generate_custom_boosters(&cards, 3, &options, &db, rng).unwrap();
            assert_eq!(boosters.iter().filter(|b| b.len() == 6).count(), 2);
            assert_eq!(boosters.iter().filter(|b| b.len() == 3).count(), 1);
        }
    }

    #[test]
    fn test_predetermined_layouts() {
        let rng = &mut StdRng::seed_from_u64(6);
        let db = CardDatabase::new();
        let cards = layout_list(json!({
            "predeterminedLayouts": [[{"name": "a", "weight": 1}], [{"name": "b", "weight": 1}]],
        }));
        cards.validate(&db).unwrap();
        let options = CustomListOptions {
            player_count: Some(2),
            ..Default::default()
        };

        let sizes: Vec<usize> = generate_custom_boosters(&cards, 6, &options, &db, rng)
            .unwrap()
            .iter()
            .map(Vec::len)
            .collect();
        assert_eq!(sizes, vec![6, 6, 3, 3, 6, 6]);

        let invalid = layout_list(json!({"predeterminedLayouts": [[{"name": "z", "weight": 1}]]}));
        assert!(matches!(invalid.validate(&db), Err(DraftError::Generation(_))));
    }

    #[test]
    fn test_layout_exhaustion() {
        let rng = &mut StdRng::seed_from_u64(7);
        let db = CardDatabase::new();
        let cards = layout_list(json!({}));
        let options = CustomListOptions::default();

        // 10 rares and 60 commons cannot fill 30 boosters.
        assert!(matches!(
            generate_custom_boosters(&cards, 30, &options, &db, rng),
            Err(DraftError::Generation(_))
        ));
    }

    #[test]
    fn test_sheet_collation() {
        let cards = |value: serde_json::Value| CustomCardList::from_json(value.to_string().as_bytes());

        let random = cards(json!({"sheets": {"s": {"cards": {"a0": 2}}}})).unwrap();
        assert_eq!(
            random.sheets["s"],
            Sheet::Random {
                cards: BTreeMap::from([("a0".to_string(), 2)])
            }
        );

        let run = cards(json!({"sheets": {"s": {"collation": "printRun", "printRun": ["a0", "a1"]}}})).unwrap();
        assert_eq!(
            run.sheets["s"],
            Sheet::PrintRun {
                print_run: vec!["a0".to_string(), "a1".to_string()],
                group_size: 1,
            }
        );

        // A broken print run is an error, even when the sheet also lists cards.
        for sheet in [
            json!({"collation": "printRun", "printRun": "a0", "cards": {"a0": 1}}),
            json!({"collation": "printRun", "cards": {"a0": 1}}),
            json!({"printRun": ["a0"]}),
        ] {
            assert!(matches!(
                cards(json!({"sheets": {"s": sheet}})),
                Err(DraftError::Config(_))
            ));
        }

        assert!(cards(json!({"layouts": false})).unwrap().layouts.is_empty());
        assert!(cards(json!({"layouts": true})).is_err());
    }

    #[test]
    fn test_print_run_slot() {
        let rng = &mut StdRng::seed_from_u64(8);
        let db = CardDatabase::new();
        let run: Vec<String> = (0..9).map(|i| format!("p{i}")).collect();
        let cards = list(json!({
            "sheets": {"run": {"collation": "printRun", "printRun": run, "groupSize": 3}},
            "layouts": {"default": {"weight": 1, "slots": [
                {"name": "Run", "count": 3, "sheets": [{"name": "run", "weight": 1}]}
            ]}},
            "customCards": custom_cards("p", 9),
        }));
        cards.validate(&db).unwrap();

        for booster in generate_custom_boosters(&cards, 5, &CustomListOptions::default(), &db, rng).unwrap() {
            let start: usize = booster[0].id()[1..].parse().unwrap();
            assert_eq!(start % 3, 0);
            assert_eq!(booster[1].id(), format!("p{}", start + 1));
            assert_eq!(booster[2].id(), format!("p{}", start + 2));
        }
    }
}
