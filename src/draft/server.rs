use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use rand::{rngs::StdRng, SeedableRng};
use tokio::{
    sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    time::MissedTickBehavior,
};
use uuid::Uuid;

use crate::{
    cards::{CardId, UniqueCard},
    error::{MessageError, Res},
};

use super::{
    custom_list::CustomCardList,
    packs::Booster,
    session::{Ack, DraftLog, DraftVariant, Session, SessionOptions},
    CardData, SessionId,
};

#[derive(Clone, Debug, serde::Serialize)]
pub struct UserInfo {
    pub id: Uuid,
    pub name: String,
    pub connected: bool,

    /// Whether the user shared a collection.
    pub collection: bool,
}

#[derive(Clone, Debug, serde::Serialize)]
pub enum DraftServerMessage {
    Started, // Draft already started, cannot join.
    Connected {
        session: SessionId,
        user: Uuid,
        owner: bool,
        pool: Vec<UniqueCard>,
    },
    Ack(Ack),
    Message(MessageError),
    SessionUsers {
        owner: Option<Uuid>,
        users: Vec<UserInfo>,
    },
    SessionOptions(SessionOptions),
    DraftStarted {
        variant: DraftVariant,
    },
    NewPack {
        booster: Booster,
        picks: usize,
        burns: usize,
        round: usize,
        pick: usize,
    },
    Picked {
        cards: Vec<UniqueCard>,
    },
    WinstonNextRound {
        current_player: Uuid,
        current_pile: usize,
        piles: Vec<Vec<UniqueCard>>,
        remaining_cards: usize,
    },
    WinstonRandomCard {
        card: UniqueCard,
    },
    GridNextRound {
        current_player: Uuid,
        round: usize,
        grid: Vec<Option<UniqueCard>>,
    },
    RochesterNextPick {
        current_player: Uuid,
        booster: Booster,
        booster_number: usize,
        pick_number: usize,
    },
    Timer {
        seconds: u32,
    },
    Paused,
    Resumed,
    UserDisconnected {
        user: Uuid,
    },
    DraftEnded {
        log: DraftLog,
    },
    DraftLog(DraftLog),
}

#[derive(Debug, serde::Deserialize)]
pub enum DraftClientMessage {
    SetOptions(SessionOptions),
    SetCustomCardList(CustomCardList),

    /// Fetch a custom card list from a URL.
    ImportCustomCardList {
        url: String,
    },
    SetCollection(HashMap<CardId, u32>),
    StartDraft,
    StartWinstonDraft {
        #[serde(default)]
        boosters: Option<usize>,
    },
    StartGridDraft {
        #[serde(default)]
        boosters: Option<usize>,
    },
    StartRochesterDraft,
    StopDraft,
    PauseDraft,
    ResumeDraft,
    ReplaceDisconnectedPlayers,
    PickCard {
        picks: Vec<usize>,
        #[serde(default)]
        burns: Vec<usize>,
    },
    WinstonTakePile,
    WinstonSkipPile,
    GridPick {
        choice: usize,
    },
    RochesterPick {
        choice: usize,
    },
    GetDraftLog,
}

pub enum DraftServerRequest {
    Connect {
        user: Uuid,
        name: String,
        chan: UnboundedSender<DraftServerMessage>,
    },
    Disconnect {
        user: Uuid,
        chan: UnboundedSender<DraftServerMessage>,
    },
    Message(Uuid, DraftClientMessage),
}

/// Sender half of a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    chan: UnboundedSender<DraftServerRequest>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns false if the session has shut down.
    pub fn send(&self, req: DraftServerRequest) -> bool {
        self.chan.send(req).is_ok()
    }
}

/// Running sessions by ID.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<Mutex<HashMap<SessionId, SessionHandle>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session and spawn the task running it.
    pub fn create(&self, cards: Arc<CardData>, custom_list: Option<CustomCardList>) -> Res<SessionHandle> {
        let id = Uuid::new_v4();
        let mut session = Session::new(id, cards, StdRng::from_entropy());
        if let Some(list) = custom_list {
            session.load_custom_card_list(list)?;
        }

        let (tx, rx) = unbounded_channel();
        let handle = SessionHandle { id, chan: tx };
        self.sessions().insert(id, handle.clone());
        tracing::info!(session = %id, "Session created.");

        let server = DraftServer {
            session,
            chan: rx,
            registry: self.clone(),
        };
        tokio::spawn(server.run());
        Ok(handle)
    }

    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions().get(&id).cloned()
    }

    pub fn remove(&self, id: SessionId) -> bool {
        self.sessions().remove(&id).is_some()
    }

    fn sessions(&self) -> MutexGuard<'_, HashMap<SessionId, SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Task owning a session. Requests from connections are handled one at a
/// time, and pick timers are ticked every second.
struct DraftServer {
    session: Session,
    chan: UnboundedReceiver<DraftServerRequest>,
    registry: SessionRegistry,
}

impl DraftServer {
    async fn run(mut self) {
        let mut timer = tokio::time::interval(Duration::from_secs(1));
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                req = self.chan.recv() => match req {
                    Some(req) => {
                        if self.handle(req) {
                            break;
                        }
                    }
                    None => break,
                },
                _ = timer.tick() => self.session.tick(),
            }
        }

        let id = self.session.id();
        self.registry.remove(id);
        tracing::info!(session = %id, "Session closed.");
    }

    /// Returns true once the session should shut down.
    fn handle(&mut self, req: DraftServerRequest) -> bool {
        match req {
            DraftServerRequest::Connect { user, name, chan } => {
                self.session.connect(user, name, chan);
                false
            }
            DraftServerRequest::Disconnect { user, chan } => {
                self.session.disconnect(user, &chan);
                self.session.is_abandoned()
            }
            DraftServerRequest::Message(user, msg) => {
                self.session.handle_message(user, msg);
                false
            }
        }
    }
}
