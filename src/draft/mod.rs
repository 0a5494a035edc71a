use std::collections::HashMap;

use uuid::Uuid;

use crate::cards::CardDatabase;

mod color_balance;
pub mod custom_list;
pub mod game;
pub mod grid;
pub mod handlers;
pub mod packs;
pub mod paper;
mod pool;
pub mod rochester;
pub mod server;
pub mod session;
pub mod winston;

pub type SessionId = Uuid;

/// Card metadata shared by every session.
#[derive(Default)]
pub struct CardData {
    pub database: CardDatabase,

    /// Published collation data, by set code.
    pub paper_sets: HashMap<String, paper::PaperSet>,
}
