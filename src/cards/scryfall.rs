use std::path::Path;

use bytes::Buf;
use serde::de::DeserializeOwned;

use crate::cards::{Card, Color, Rarity};

pub async fn get_bytes(uri: &str) -> Result<bytes::Bytes, String> {
    reqwest::get(uri)
        .await
        .map_err(|e| e.to_string())?
        .bytes()
        .await
        .map_err(|e| e.to_string())
}

fn decode_json<T: DeserializeOwned>(bytes: bytes::Bytes) -> Result<T, String> {
    serde_json::de::from_reader(bytes.reader()).map_err(|e| e.to_string())
}

async fn download_list(path: &Path) -> Result<(), String> {
    #[derive(serde::Deserialize)]
    struct BulkDataInfo {
        download_uri: String,
    }

    // Default cards rather than oracle cards: paper collation data refers to
    // specific printings by collector number.
    let info: BulkDataInfo =
        decode_json(get_bytes("https://api.scryfall.com/bulk-data/default-cards").await?)?;
    let raw = get_bytes(&info.download_uri).await?;

    tokio::fs::write(path, raw)
        .await
        .map_err(|e| e.to_string())?;
    Ok(())
}

#[derive(serde::Deserialize, Debug)]
struct ScryfallCardImages {
    png: Option<String>,
    border_crop: Option<String>,
    art_crop: Option<String>,
    large: Option<String>,
    normal: Option<String>,
    small: Option<String>,
}

impl ScryfallCardImages {
    fn choose(self) -> Option<String> {
        self.large
            .or(self.png)
            .or(self.normal)
            .or(self.border_crop)
            .or(self.small)
            .or(self.art_crop)
    }
}

#[derive(serde::Deserialize, Debug)]
struct ScryfallCardFace {
    image_uris: Option<ScryfallCardImages>,
    oracle_text: Option<String>,
}

#[derive(serde::Deserialize, Debug)]
struct ScryfallCard {
    /// Scryfall ID of this printing.
    id: String,

    /// Card name. Includes both faces (!).
    name: String,

    /// Set code.
    set: String,

    collector_number: String,

    /// Object containing image URIs. Missing for multi-faced cards, whose
    /// images are on the faces.
    image_uris: Option<ScryfallCardImages>,

    #[serde(default)]
    card_faces: Vec<ScryfallCardFace>,

    /// Rarity string, mythic, rare, uncommon, common, special, bonus.
    rarity: String,

    #[serde(default)]
    colors: Vec<String>,

    #[serde(default)]
    type_line: String,

    /// Oracle text for the card.
    oracle_text: Option<String>,

    #[serde(default)]
    booster: bool,
}

impl ScryfallCard {
    fn to_card(self) -> Option<Card> {
        if !self.booster {
            return None;
        }

        let rarity = Rarity::parse(&self.rarity)?;
        let mut faces = self.card_faces.into_iter();
        let first_face = faces.next();
        let image = match self.image_uris {
            Some(images) => images.choose(),
            None => first_face
                .as_ref()
                .and_then(|face| face.image_uris.as_ref())
                .and_then(|images| images.large.clone().or(images.normal.clone())),
        }?;
        let text = self
            .oracle_text
            .or_else(|| first_face.and_then(|face| face.oracle_text))
            .unwrap_or_default();

        // Keep the full name: "//" in a name marks a multi-faced card.
        Some(Card {
            id: self.id,
            name: self.name,
            set: self.set,
            collector_number: self.collector_number,
            rarity,
            colors: self
                .colors
                .iter()
                .filter_map(|c| c.chars().next().and_then(Color::from_symbol))
                .collect(),
            type_line: self.type_line,
            image,
            text,
        })
    }
}

pub async fn load_cards(data: &Path) -> Result<Vec<Card>, String> {
    tracing::debug!("Loading scryfall card data.");

    tokio::fs::create_dir_all(data)
        .await
        .map_err(|e| e.to_string())?;
    let file = data.join("scryfall-cards.json");

    if !file.exists() {
        tracing::debug!("File not found in cache, downloading to {}", file.display());
        download_list(&file).await?;
        tracing::debug!("Successfully downloaded data.");
    }

    let raw = tokio::fs::read(&file).await.map_err(|e| e.to_string())?;
    tracing::debug!("Read scryfall data from disk. Parsing JSON.");
    let cards: Vec<ScryfallCard> = decode_json(bytes::Bytes::from(raw))?;
    tracing::debug!("Converting parsed JSON into card structs.");
    Ok(cards
        .into_iter()
        .filter_map(ScryfallCard::to_card)
        .collect())
}
