use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::unbounded_channel;
use uuid::Uuid;

use crate::{
    cards::{Card, CardDatabase, CardId},
    error::MessageError,
    Resp,
};

use super::{
    custom_list::{CustomCardList, Sheet},
    server::{DraftClientMessage, DraftServerMessage, DraftServerRequest, SessionHandle, SessionRegistry},
    session::{Ack, AckCode},
    CardData,
};

/// Relay messages between a websocket and a session until either side
/// closes.
pub async fn handle_socket(socket: WebSocket, session: SessionHandle, user: Uuid, name: String) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = unbounded_channel::<DraftServerMessage>();
    if !session.send(DraftServerRequest::Connect {
        user,
        name,
        chan: tx.clone(),
    }) {
        return;
    }

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Failed to encode message: {e}");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let msg = match serde_json::from_str::<DraftClientMessage>(&text) {
            Ok(DraftClientMessage::ImportCustomCardList { url }) => match fetch_custom_list(&url).await {
                Ok(list) => DraftClientMessage::SetCustomCardList(list),
                Err(e) => {
                    tracing::debug!(%user, "Failed to import card list from {url}: {e}");
                    tx.send(DraftServerMessage::Message(MessageError::new(
                        "Error importing card list",
                        &e,
                    )))
                    .ok();
                    tx.send(DraftServerMessage::Ack(Ack::new(AckCode::Internal, e))).ok();
                    continue;
                }
            },
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!(%user, "Invalid message: {e}");
                tx.send(DraftServerMessage::Ack(Ack::new(
                    AckCode::Internal,
                    format!("Invalid message: {e}"),
                )))
                .ok();
                continue;
            }
        };

        if !session.send(DraftServerRequest::Message(user, msg)) {
            break;
        }
    }

    session.send(DraftServerRequest::Disconnect { user, chan: tx });
}

async fn fetch_custom_list(url: &str) -> Result<CustomCardList, String> {
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(format!("Invalid card list URL: {url}"));
    }
    let bytes = crate::cards::scryfall::get_bytes(url).await?;
    CustomCardList::from_json(&bytes).map_err(|e| e.to_string())
}

/// Build a single sheet list from card names, one per line. Cards from the
/// uploaded database take precedence over the shared database.
fn list_from_names(
    text: &str,
    uploaded: &HashMap<CardId, Card>,
    database: &CardDatabase,
) -> Result<CustomCardList, String> {
    let mut cards = BTreeMap::new();
    let mut custom_cards = HashMap::new();
    for line in text.lines() {
        let key = line.trim().to_lowercase();
        if key.is_empty() {
            continue;
        }

        let id = if let Some(card) = uploaded.get(&key) {
            custom_cards.insert(card.id.clone(), card.clone());
            card.id.clone()
        } else if let Some(card) = database.get(&key) {
            card.id.clone()
        } else {
            return Err(format!("Card not found in custom list or database: {}", line.trim()));
        };
        *cards.entry(id).or_insert(0) += 1;
    }

    if cards.is_empty() {
        return Err("No card list provided for draft.".to_string());
    }
    Ok(CustomCardList {
        sheets: BTreeMap::from([("default".to_string(), Sheet::Random { cards })]),
        custom_cards: Some(custom_cards),
        ..Default::default()
    })
}

/// Create a session. Accepts an optional Cockatrice card database, and a card
/// list either as card names (`list`) or as a custom list document
/// (`custom_list`).
pub async fn handle_create_request(
    cards: Arc<CardData>,
    registry: SessionRegistry,
    mut data: axum::extract::Multipart,
) -> axum::response::Response<String> {
    let mut uploaded = None;
    let mut names = None;
    let mut custom_list = None;
    while let Ok(Some(field)) = data.next_field().await {
        let field_name = field.name().unwrap_or("").to_string();
        let bytes = match field.bytes().await {
            Ok(bytes) => bytes,
            Err(e) => return Resp::e500(e),
        };

        match field_name.as_str() {
            "card_database" => match crate::cards::cockatrice::decode_xml_cards(bytes) {
                Ok(db) => uploaded = Some(db),
                Err(e) => return Resp::e422(format!("Failed to load card database: {e}")),
            },
            "list" => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => names = Some(text),
                Err(e) => return Resp::e422(format!("Invalid card list: {e}")),
            },
            "custom_list" => match CustomCardList::from_json(&bytes) {
                Ok(list) => custom_list = Some(list),
                Err(e) => return Resp::e422(format!("Invalid custom card list: {e}")),
            },
            _ => {}
        }
    }

    let uploaded = uploaded.unwrap_or_default();
    let list = match (custom_list, names) {
        (Some(_), Some(_)) => return Resp::e422("Provide either a card list or a custom list, not both."),
        (Some(mut list), None) => {
            list.custom_cards
                .get_or_insert_with(HashMap::new)
                .extend(uploaded);
            Some(list)
        }
        (None, Some(names)) => match list_from_names(&names, &uploaded, &cards.database) {
            Ok(list) => Some(list),
            Err(e) => return Resp::e422(e),
        },
        (None, None) => None,
    };

    match registry.create(cards, list) {
        Ok(session) => Resp::ok(session.id()),
        Err(e) => Resp::e422(e.into_message()),
    }
}

#[cfg(test)]
mod test {
    use crate::cards::Rarity;

    use super::*;

    #[test]
    fn test_list_from_names() {
        let mut database = CardDatabase::new();
        let shared = Card::sample(Rarity::Common);
        let shared_name = shared.name.clone();
        let shared_id = shared.id.clone();
        database.add(shared);

        let mut custom = Card::sample(Rarity::Rare);
        custom.id = "my card".to_string();
        custom.name = "My Card".to_string();
        let uploaded = HashMap::from([(custom.id.clone(), custom)]);

        let text = format!("My Card\n\n  {shared_name}\n{}\n", shared_name.to_uppercase());
        let list = list_from_names(&text, &uploaded, &database).unwrap();
        let Some(Sheet::Random { cards }) = list.sheets.get("default") else {
            panic!("expected a random sheet");
        };
        assert_eq!(cards.get("my card"), Some(&1));
        assert_eq!(cards.get(&shared_id), Some(&2));
        assert!(list.custom_cards.unwrap().contains_key("my card"));

        assert!(list_from_names("Unknown Card", &uploaded, &database).is_err());
        assert!(list_from_names("\n", &uploaded, &database).is_err());
    }
}
