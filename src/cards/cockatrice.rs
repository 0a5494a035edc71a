use std::collections::HashMap;

use quick_xml::DeError;

use crate::cards::{Card, CardId, Color, Rarity};

#[derive(serde::Deserialize)]
struct XmlSetInner {
    name: String,
    longname: String,
}

#[derive(serde::Deserialize)]
struct XmlSet {
    #[serde(rename = "set")]
    inner: XmlSetInner,
}

#[derive(serde::Deserialize)]
struct XmlSetEntry {
    #[serde(rename = "@rarity")]
    rarity: String,

    #[serde(rename = "@picURL")]
    image: String,

    #[serde(default, rename = "@num")]
    number: Option<String>,

    #[serde(rename = "$text")]
    name: String,
}

#[derive(serde::Deserialize, PartialEq, Debug)]
struct XmlColourHolder {
    #[serde(rename = "$text")]
    inner: Color,
}

#[derive(serde::Deserialize)]
struct XmlCard {
    name: String,
    set: XmlSetEntry,

    #[serde(default, rename = "color")]
    colour: Vec<XmlColourHolder>,

    #[serde(rename = "type")]
    ty: String,

    #[serde(default)]
    text: String,
}

impl XmlCard {
    fn rarity(&self) -> Option<Rarity> {
        Rarity::parse(&self.set.rarity.replace(" Rare", ""))
    }

    fn to_card(self) -> Option<Card> {
        let rarity = self.rarity()?;
        let number = self.set.number.unwrap_or_default();
        Some(Card {
            id: self.name.to_lowercase(),
            collector_number: number,
            rarity,
            colors: self.colour.into_iter().map(|c| c.inner).collect(),
            type_line: self.ty,
            image: self.set.image,
            set: self.set.name,
            text: self.text,
            name: self.name,
        })
    }
}

#[derive(serde::Deserialize)]
struct XmlCardList {
    #[serde(default, rename = "card")]
    list: Vec<XmlCard>,
}

#[derive(serde::Deserialize)]
struct XmlCardDb {
    #[serde(default)]
    sets: Vec<XmlSet>,

    cards: XmlCardList,
}

/// Decode a cockatrice card database XML into a map from card ID (the
/// lowercased card name) to card. Used as the custom cards of a list, so that
/// lists can refer to cards that are not in the shared database.
pub fn decode_xml_cards(data: bytes::Bytes) -> Result<HashMap<CardId, Card>, DeError> {
    let xml: XmlCardDb = quick_xml::de::from_reader(&*data)?;
    for set in &xml.sets {
        tracing::debug!("Custom card database set {} ({}).", set.inner.name, set.inner.longname);
    }

    Ok(xml
        .cards
        .list
        .into_iter()
        .filter_map(XmlCard::to_card)
        .map(|card| (card.id.clone(), card))
        .collect())
}
