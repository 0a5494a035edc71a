use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use rand::rngs::StdRng;
use serde::Serializer;
use tokio::sync::mpsc::UnboundedSender;
use uuid::Uuid;

use crate::{
    cards::{CardId, UniqueCard},
    error::{DraftError, MessageError, Res},
};

use super::{
    custom_list::{generate_custom_boosters, CustomCardList, CustomListOptions},
    game::{bot_pick, DistributionMode, Draft, NewPacks, PickSettings},
    grid::{GridDraft, DEFAULT_GRID_BOOSTERS, GRID_TARGETS},
    packs::{
        make_boosters, Booster, BoosterFactory, BoosterOptions, LandSlot, MaxDuplicates, RarityPools,
        RarityTargets, SpecialRule,
    },
    paper::PaperBoosterFactory,
    rochester::RochesterDraft,
    server::{DraftClientMessage, DraftServerMessage, UserInfo},
    winston::{SkipOutcome, WinstonDraft, DEFAULT_PILE_COUNT},
    CardData, SessionId,
};

pub const DEFAULT_WINSTON_BOOSTERS: usize = 6;
const TEAM_DRAFT_PLAYERS: usize = 6;

/// Status code of the acknowledgement sent after each client action.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum AckCode {
    Success = 0,
    /// Internal error, or an action refused by the draft (e.g. skipping the
    /// only pile left).
    Internal = 1,
    NoSession = 2,
    NotDrafting = 3,
    NotYourTurn = 4,
}

impl serde::Serialize for AckCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize)]
pub struct Ack {
    pub code: AckCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Ack {
    pub fn success() -> Self {
        Self {
            code: AckCode::Success,
            error: None,
        }
    }

    pub fn new<S: ToString>(code: AckCode, error: S) -> Self {
        Self {
            code,
            error: Some(error.to_string()),
        }
    }

    fn internal<S: ToString>(error: S) -> Self {
        Self::new(AckCode::Internal, error)
    }
}

impl From<DraftError> for Ack {
    fn from(e: DraftError) -> Self {
        match e {
            DraftError::InvalidPick(reason) => Ack::internal(reason),
            e => Ack::internal(e),
        }
    }
}

type Action = Result<(), Ack>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DraftVariant {
    Standard,
    Winston,
    Rochester,
    Grid,
}

/// Session configuration, set by the owner between drafts.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionOptions {
    pub boosters_per_player: usize,
    pub targets: RarityTargets,
    pub foil: bool,
    pub mythic_promotion: bool,
    pub color_balance: bool,
    pub max_duplicates: MaxDuplicates,

    /// Sets to draw cards from. Empty means every known card.
    pub set_restriction: Vec<String>,
    pub bots: usize,
    pub distribution_mode: DistributionMode,
    pub picked_cards_per_round: usize,
    pub burned_cards_per_round: usize,

    /// Seconds allowed per pick. 0 disables the timer.
    pub max_timer: u32,
    pub team_draft: bool,
    pub use_custom_card_list: bool,

    /// Draw from the intersection of the players' collections.
    pub use_collection: bool,

    /// Use published collation data when drafting a single set.
    pub paper_boosters: bool,
    pub with_replacement: bool,
    pub duplicate_protection: bool,
    pub pile_count: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            boosters_per_player: 3,
            targets: RarityTargets::default(),
            foil: false,
            mythic_promotion: true,
            color_balance: true,
            max_duplicates: MaxDuplicates::default(),
            set_restriction: Vec::new(),
            bots: 0,
            distribution_mode: DistributionMode::Regular,
            picked_cards_per_round: 1,
            burned_cards_per_round: 0,
            max_timer: 75,
            team_draft: false,
            use_custom_card_list: false,
            use_collection: false,
            paper_boosters: false,
            with_replacement: false,
            duplicate_protection: true,
            pile_count: DEFAULT_PILE_COUNT,
        }
    }
}

pub enum DraftState {
    Standard(Draft),
    Winston(WinstonDraft),
    Rochester(RochesterDraft),
    Grid(GridDraft),
}

impl DraftState {
    pub fn variant(&self) -> DraftVariant {
        match self {
            DraftState::Standard(_) => DraftVariant::Standard,
            DraftState::Winston(_) => DraftVariant::Winston,
            DraftState::Rochester(_) => DraftVariant::Rochester,
            DraftState::Grid(_) => DraftVariant::Grid,
        }
    }

    pub fn pools(&self) -> &HashMap<Uuid, Vec<UniqueCard>> {
        match self {
            DraftState::Standard(draft) => draft.pools(),
            DraftState::Winston(draft) => draft.pools(),
            DraftState::Rochester(draft) => draft.pools(),
            DraftState::Grid(draft) => draft.pools(),
        }
    }

    pub fn is_complete(&self) -> bool {
        match self {
            DraftState::Standard(draft) => draft.draft_complete(),
            DraftState::Winston(draft) => draft.is_complete(),
            DraftState::Rochester(draft) => draft.is_complete(),
            DraftState::Grid(draft) => draft.is_complete(),
        }
    }
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogUser {
    pub id: Uuid,
    pub name: String,
    pub bot: bool,
}

#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickRecord {
    pub user: Uuid,
    pub picked: Vec<CardId>,
    pub burned: Vec<CardId>,
}

/// Record of a draft: who played, the generated boosters, every pick and the
/// final pools.
#[derive(Clone, Debug, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DraftLog {
    pub session: SessionId,
    pub variant: DraftVariant,
    pub users: Vec<LogUser>,
    pub boosters: Vec<Vec<CardId>>,
    pub picks: Vec<PickRecord>,
    pub pools: HashMap<Uuid, Vec<CardId>>,
}

fn card_ids(cards: &[UniqueCard]) -> Vec<CardId> {
    cards.iter().map(|c| c.id().to_string()).collect()
}

struct Client {
    id: Uuid,
    name: String,
    chan: Option<UnboundedSender<DraftServerMessage>>,
    collection: Option<HashMap<CardId, u32>>,
}

impl Client {
    fn connected(&self) -> bool {
        self.chan.as_ref().is_some_and(|chan| !chan.is_closed())
    }

    fn send(&self, msg: DraftServerMessage) {
        if let Some(chan) = &self.chan {
            chan.send(msg).ok();
        }
    }
}

/// A group of users drafting together. Users join the lobby, the owner
/// configures and starts a draft, and every client action is answered with
/// an [`Ack`].
pub struct Session {
    id: SessionId,
    owner: Option<Uuid>,
    clients: Vec<Client>,
    options: SessionOptions,
    custom_list: Option<CustomCardList>,
    cards: Arc<CardData>,
    rng: StdRng,

    state: Option<DraftState>,
    paused: bool,

    /// Seats picking automatically in the current draft.
    bots: HashSet<Uuid>,

    /// Seconds left for each waiting player.
    timers: HashMap<Uuid, u32>,
    log: Option<DraftLog>,
    last_log: Option<DraftLog>,
}

impl Session {
    pub fn new(id: SessionId, cards: Arc<CardData>, rng: StdRng) -> Self {
        Self {
            id,
            owner: None,
            clients: Vec::new(),
            options: SessionOptions::default(),
            custom_list: None,
            cards,
            rng,
            state: None,
            paused: false,
            bots: HashSet::new(),
            timers: HashMap::new(),
            log: None,
            last_log: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn is_drafting(&self) -> bool {
        self.state.is_some()
    }

    /// No connected client and no draft running.
    pub fn is_abandoned(&self) -> bool {
        !self.is_drafting() && !self.clients.iter().any(Client::connected)
    }

    /// Add a user to the lobby or reconnect a user to the session. New users
    /// cannot join once the draft has started. Returns whether the user is
    /// connected.
    pub fn connect(&mut self, user: Uuid, name: String, chan: UnboundedSender<DraftServerMessage>) -> bool {
        if let Some(index) = self.clients.iter().position(|c| c.id == user) {
            let client = &mut self.clients[index];
            client.chan = Some(chan);
            if !name.is_empty() {
                client.name = name;
            }
            tracing::debug!(session = %self.id, %user, "User reconnected.");
            self.send_state(user);
        } else if self.is_drafting() {
            chan.send(DraftServerMessage::Started).ok();
            return false;
        } else {
            self.clients.push(Client {
                id: user,
                name,
                chan: Some(chan),
                collection: None,
            });
            self.owner.get_or_insert(user);
            tracing::debug!(session = %self.id, %user, "User joined.");
            self.send_state(user);
        }

        self.broadcast_users();
        true
    }

    /// Only the connection matching `chan` is dropped, so that a stale
    /// connection closing does not disconnect a user who reconnected.
    pub fn disconnect(&mut self, user: Uuid, chan: &UnboundedSender<DraftServerMessage>) {
        let Some(index) = self.clients.iter().position(|c| c.id == user) else {
            return;
        };
        if !self.clients[index]
            .chan
            .as_ref()
            .is_some_and(|current| current.same_channel(chan))
        {
            return;
        }

        tracing::debug!(session = %self.id, %user, "User disconnected.");
        if self.is_drafting() {
            self.clients[index].chan = None;
            self.broadcast(|| DraftServerMessage::UserDisconnected { user });
        } else {
            self.clients.remove(index);
            if self.owner == Some(user) {
                self.owner = self.clients.first().map(|c| c.id);
            }
        }
        self.broadcast_users();
    }

    /// Handle a client action and acknowledge it.
    pub fn handle_message(&mut self, user: Uuid, msg: DraftClientMessage) {
        let result = match msg {
            DraftClientMessage::SetOptions(options) => self.set_options(user, options),
            DraftClientMessage::SetCustomCardList(list) => self.set_custom_card_list(user, list),
            DraftClientMessage::ImportCustomCardList { .. } => {
                Err(Ack::internal("Card list imports are handled by the connection."))
            }
            DraftClientMessage::SetCollection(collection) => self.set_collection(user, collection),
            DraftClientMessage::StartDraft => self.start_draft(user),
            DraftClientMessage::StartWinstonDraft { boosters } => {
                self.start_winston_draft(user, boosters.unwrap_or(DEFAULT_WINSTON_BOOSTERS))
            }
            DraftClientMessage::StartGridDraft { boosters } => {
                self.start_grid_draft(user, boosters.unwrap_or(DEFAULT_GRID_BOOSTERS))
            }
            DraftClientMessage::StartRochesterDraft => self.start_rochester_draft(user),
            DraftClientMessage::StopDraft => self.stop_draft(user),
            DraftClientMessage::PauseDraft => self.pause_draft(user),
            DraftClientMessage::ResumeDraft => self.resume_draft(user),
            DraftClientMessage::ReplaceDisconnectedPlayers => self.replace_disconnected_players(user),
            DraftClientMessage::PickCard { picks, burns } => self.pick_card(user, &picks, &burns),
            DraftClientMessage::WinstonTakePile => self.winston_take_pile(user),
            DraftClientMessage::WinstonSkipPile => self.winston_skip_pile(user),
            DraftClientMessage::GridPick { choice } => self.grid_pick(user, choice),
            DraftClientMessage::RochesterPick { choice } => self.rochester_pick(user, choice),
            DraftClientMessage::GetDraftLog => self.send_draft_log(user),
        };

        let ack = result.err().unwrap_or_else(Ack::success);
        if ack.code != AckCode::Success {
            tracing::debug!(session = %self.id, %user, ?ack, "Action refused.");
        }
        self.send_to(user, DraftServerMessage::Ack(ack));
    }

    /// Count down the pick timers by a second. A player whose timer runs out
    /// picks automatically.
    pub fn tick(&mut self) {
        let max_timer = self.options.max_timer;
        if self.paused || max_timer == 0 {
            return;
        }
        let Some(DraftState::Standard(draft)) = &self.state else {
            return;
        };

        let waiting: Vec<Uuid> = draft
            .waiting_on()
            .into_iter()
            .filter(|p| !self.bots.contains(p))
            .collect();
        let mut expired = Vec::new();
        for player in waiting {
            let timer = self.timers.entry(player).or_insert(max_timer);
            *timer = timer.saturating_sub(1);
            let seconds = *timer;
            self.send_to(player, DraftServerMessage::Timer { seconds });
            if seconds == 0 {
                expired.push(player);
            }
        }

        for player in expired {
            tracing::debug!(session = %self.id, %player, "Pick timer expired.");
            self.auto_pick(player);
        }
    }

    pub fn set_options(&mut self, user: Uuid, options: SessionOptions) -> Action {
        self.check_owner(user)?;
        self.check_not_drafting()?;
        if options.boosters_per_player == 0 {
            return Err(Ack::internal("Players need at least one booster."));
        }
        if options.targets.total() == 0 {
            return Err(Ack::internal("Boosters cannot be empty."));
        }
        if options.picked_cards_per_round == 0 {
            return Err(Ack::internal("Players must pick at least one card per round."));
        }
        if options.pile_count == 0 {
            return Err(Ack::internal("Winston draft needs at least one pile."));
        }

        self.options = options;
        self.broadcast_options();
        Ok(())
    }

    pub fn set_custom_card_list(&mut self, user: Uuid, list: CustomCardList) -> Action {
        self.check_owner(user)?;
        self.check_not_drafting()?;
        self.load_custom_card_list(list).map_err(|e| self.report_error(user, e))?;
        self.broadcast_options();
        Ok(())
    }

    /// Load a custom card list. Its settings become the session defaults.
    pub fn load_custom_card_list(&mut self, list: CustomCardList) -> Res<()> {
        list.validate(&self.cards.database)?;

        let settings = &list.settings;
        if let Some(color_balance) = settings.color_balance {
            self.options.color_balance = color_balance;
        }
        if let Some(with_replacement) = settings.with_replacement {
            self.options.with_replacement = with_replacement;
        }
        if let Some(duplicate_protection) = settings.duplicate_protection {
            self.options.duplicate_protection = duplicate_protection;
        }
        if let Some(boosters) = settings.boosters_per_player {
            self.options.boosters_per_player = boosters.max(1);
        }
        self.options.use_custom_card_list = true;
        tracing::info!(session = %self.id, name = ?list.name, "Custom card list loaded.");
        self.custom_list = Some(list);
        Ok(())
    }

    pub fn set_collection(&mut self, user: Uuid, collection: HashMap<CardId, u32>) -> Action {
        let Some(client) = self.clients.iter_mut().find(|c| c.id == user) else {
            return Err(Ack::new(AckCode::NoSession, "Not in session."));
        };
        client.collection = Some(collection);
        self.broadcast_users();
        Ok(())
    }

    pub fn start_draft(&mut self, user: Uuid) -> Action {
        self.check_owner(user)?;
        self.check_not_drafting()?;

        let humans = self.clients.len();
        if self.options.team_draft && humans != TEAM_DRAFT_PLAYERS {
            return Err(self.refuse(
                user,
                MessageError::new(
                    "Wrong player count",
                    "Team draft requires exactly 6 players. Please add/remove players or disable Team Draft under Settings.",
                ),
            ));
        }
        if humans == 0 || humans + self.options.bots < 2 {
            return Err(self.refuse(
                user,
                MessageError::new(
                    "Not enough players",
                    "Can't start draft: Not enough players (min. 2 including bots).",
                ),
            ));
        }

        let bots: Vec<Uuid> = if self.options.team_draft {
            Vec::new()
        } else {
            (0..self.options.bots).map(|_| Uuid::new_v4()).collect()
        };
        let players: Vec<Uuid> = self.clients.iter().map(|c| c.id).chain(bots.iter().copied()).collect();
        let quantity = players.len() * self.options.boosters_per_player;
        let targets = self.options.targets;
        let boosters = self
            .generate_boosters(quantity, &targets, players.len())
            .map_err(|e| self.report_error(user, e))?;

        let settings = PickSettings {
            picks_per_round: self.options.picked_cards_per_round,
            burns_per_round: self.options.burned_cards_per_round,
            booster_settings: self
                .custom_list
                .as_ref()
                .filter(|_| self.options.use_custom_card_list)
                .and_then(|list| list.settings.booster_settings.clone())
                .unwrap_or_default(),
        };
        let log = self.new_log(DraftVariant::Standard, &boosters, &bots);
        let mut draft = Draft::new(
            players,
            boosters,
            self.options.distribution_mode,
            settings,
            &mut self.rng,
        )
        .map_err(|e| self.report_error(user, e))?;

        self.bots = bots.into_iter().collect();
        let packs = draft.begin();
        self.begin(DraftState::Standard(draft), log);
        self.deliver_packs(packs);
        Ok(())
    }

    pub fn start_winston_draft(&mut self, user: Uuid, booster_count: usize) -> Action {
        self.check_owner(user)?;
        self.check_not_drafting()?;
        if self.clients.len() != 2 {
            return Err(self.refuse(
                user,
                MessageError::new("2 Players Only", "Winston Draft can only be played with exactly 2 players."),
            ));
        }

        let players: Vec<Uuid> = self.clients.iter().map(|c| c.id).collect();
        let targets = self.options.targets;
        let boosters = self
            .generate_boosters(booster_count, &targets, players.len())
            .map_err(|e| self.report_error(user, e))?;
        let log = self.new_log(DraftVariant::Winston, &boosters, &[]);
        let draft = WinstonDraft::new(players, boosters, self.options.pile_count, &mut self.rng)
            .map_err(|e| self.report_error(user, e))?;

        self.begin(DraftState::Winston(draft), log);
        self.broadcast_turn();
        Ok(())
    }

    pub fn start_grid_draft(&mut self, user: Uuid, booster_count: usize) -> Action {
        self.check_owner(user)?;
        self.check_not_drafting()?;
        if self.clients.len() != 2 {
            return Err(self.refuse(
                user,
                MessageError::new("2 Players Only", "Grid Draft can only be played with exactly 2 players."),
            ));
        }

        let players: Vec<Uuid> = self.clients.iter().map(|c| c.id).collect();
        let boosters = self
            .generate_boosters(booster_count, &GRID_TARGETS, players.len())
            .map_err(|e| self.report_error(user, e))?;
        let log = self.new_log(DraftVariant::Grid, &boosters, &[]);
        let draft = GridDraft::new(players, boosters).map_err(|e| self.report_error(user, e))?;

        self.begin(DraftState::Grid(draft), log);
        self.broadcast_turn();
        Ok(())
    }

    pub fn start_rochester_draft(&mut self, user: Uuid) -> Action {
        self.check_owner(user)?;
        self.check_not_drafting()?;
        if self.clients.len() < 2 {
            return Err(self.refuse(
                user,
                MessageError::new("Not enough players", "Rochester Draft requires at least 2 players."),
            ));
        }

        let players: Vec<Uuid> = self.clients.iter().map(|c| c.id).collect();
        let quantity = players.len() * self.options.boosters_per_player;
        let targets = self.options.targets;
        let boosters = self
            .generate_boosters(quantity, &targets, players.len())
            .map_err(|e| self.report_error(user, e))?;
        let log = self.new_log(DraftVariant::Rochester, &boosters, &[]);
        let draft = RochesterDraft::new(players, boosters).map_err(|e| self.report_error(user, e))?;

        self.begin(DraftState::Rochester(draft), log);
        self.broadcast_turn();
        Ok(())
    }

    pub fn stop_draft(&mut self, user: Uuid) -> Action {
        self.check_owner(user)?;
        if !self.is_drafting() {
            return Err(Ack::new(AckCode::NotDrafting, "No draft in progress."));
        }
        tracing::info!(session = %self.id, "Draft stopped by owner.");
        self.end_draft();
        Ok(())
    }

    pub fn pause_draft(&mut self, user: Uuid) -> Action {
        self.check_owner(user)?;
        if !self.is_drafting() {
            return Err(Ack::new(AckCode::NotDrafting, "No draft in progress."));
        }
        if !self.paused {
            self.paused = true;
            self.broadcast(|| DraftServerMessage::Paused);
        }
        Ok(())
    }

    pub fn resume_draft(&mut self, user: Uuid) -> Action {
        self.check_owner(user)?;
        if !self.is_drafting() {
            return Err(Ack::new(AckCode::NotDrafting, "No draft in progress."));
        }
        if self.paused {
            self.paused = false;
            self.broadcast(|| DraftServerMessage::Resumed);
        }
        Ok(())
    }

    /// Hand the seats of disconnected players over to bots.
    pub fn replace_disconnected_players(&mut self, user: Uuid) -> Action {
        self.check_owner(user)?;
        let Some(DraftState::Standard(draft)) = &self.state else {
            return Err(Ack::new(AckCode::NotDrafting, "No standard draft in progress."));
        };

        let mut packs = Vec::new();
        for client in self.clients.iter().filter(|c| !c.connected()) {
            if self.bots.insert(client.id) {
                tracing::info!(session = %self.id, user = %client.id, "Replacing disconnected player with a bot.");
                if let Some(pack) = draft.current_pack(client.id) {
                    packs.push((client.id, pack.clone()));
                }
            }
        }
        self.deliver_packs(packs);
        Ok(())
    }

    pub fn pick_card(&mut self, user: Uuid, picks: &[usize], burns: &[usize]) -> Action {
        self.check_member(user)?;
        let Some(DraftState::Standard(draft)) = &mut self.state else {
            return Err(Ack::new(AckCode::NotDrafting, "No standard draft in progress."));
        };
        let outcome = draft.handle_pick(user, picks, burns)?;
        self.timers.remove(&user);
        self.record_pick(user, &outcome.picked, &outcome.burned);
        self.send_to(user, DraftServerMessage::Picked { cards: outcome.picked });
        self.deliver_packs(outcome.new_packs);
        Ok(())
    }

    pub fn winston_take_pile(&mut self, user: Uuid) -> Action {
        let draft = self.winston_turn(user)?;
        let cards = draft.take_pile(user)?;

        self.record_pick(user, &cards, &[]);
        self.send_to(user, DraftServerMessage::Picked { cards });
        self.next_turn();
        Ok(())
    }

    pub fn winston_skip_pile(&mut self, user: Uuid) -> Action {
        let draft = self.winston_turn(user)?;
        match draft.skip_pile(user)? {
            SkipOutcome::NextPile => {}
            SkipOutcome::RandomCard(card) => {
                if let Some(card) = card {
                    self.record_pick(user, std::slice::from_ref(&card), &[]);
                    self.send_to(user, DraftServerMessage::WinstonRandomCard { card });
                }
            }
        }
        self.next_turn();
        Ok(())
    }

    pub fn grid_pick(&mut self, user: Uuid, choice: usize) -> Action {
        self.check_member(user)?;
        let Some(DraftState::Grid(draft)) = &mut self.state else {
            return Err(Ack::new(AckCode::NotDrafting, "No grid draft in progress."));
        };
        if draft.current_player() != Some(user) {
            return Err(Ack::new(AckCode::NotYourTurn, "Not your turn."));
        }

        let cards = draft.pick(user, choice)?;
        self.record_pick(user, &cards, &[]);
        self.send_to(user, DraftServerMessage::Picked { cards });
        self.next_turn();
        Ok(())
    }

    pub fn rochester_pick(&mut self, user: Uuid, choice: usize) -> Action {
        self.check_member(user)?;
        let Some(DraftState::Rochester(draft)) = &mut self.state else {
            return Err(Ack::new(AckCode::NotDrafting, "No Rochester draft in progress."));
        };
        if draft.current_player() != Some(user) {
            return Err(Ack::new(AckCode::NotYourTurn, "Not your turn."));
        }

        let card = draft.pick(user, choice)?;
        self.record_pick(user, std::slice::from_ref(&card), &[]);
        self.send_to(user, DraftServerMessage::Picked { cards: vec![card] });
        self.next_turn();
        Ok(())
    }

    pub fn send_draft_log(&mut self, user: Uuid) -> Action {
        self.check_member(user)?;
        let Some(log) = self.last_log.clone() else {
            return Err(Ack::internal("No draft log available."));
        };
        self.send_to(user, DraftServerMessage::DraftLog(log));
        Ok(())
    }

    /// Generate boosters from the configured source: the custom card list,
    /// collation data for a single set, or the card pools of the selected sets
    /// or of the players' collections.
    fn generate_boosters(
        &mut self,
        quantity: usize,
        targets: &RarityTargets,
        players: usize,
    ) -> Res<Vec<Booster>> {
        let cards = Arc::clone(&self.cards);
        let options = &self.options;

        if options.use_custom_card_list {
            let Some(list) = &self.custom_list else {
                return Err(MessageError::generation("No custom card list provided.").into());
            };
            let list_options = CustomListOptions {
                color_balance: options.color_balance,
                cards_per_booster: targets.total(),
                with_replacement: options.with_replacement,
                duplicate_protection: options.duplicate_protection,
                player_count: Some(players),
            };
            return generate_custom_boosters(list, quantity, &list_options, &cards.database, &mut self.rng);
        }

        let single_set = match options.set_restriction.as_slice() {
            [set] => Some(set.as_str()),
            _ => None,
        };

        if options.paper_boosters {
            let Some(set) = single_set.and_then(|s| cards.paper_sets.get(s)) else {
                return Err(DraftError::Config(
                    "Paper boosters need exactly one set with collation data.".to_string(),
                ));
            };
            let factory = PaperBoosterFactory::new(set, &cards.database, options.foil);
            return (0..quantity).map(|_| factory.generate_booster(&mut self.rng)).collect();
        }

        let mut pools = match self.collection().filter(|_| options.use_collection) {
            Some(collection) => RarityPools::from_collection(&collection, &cards.database, &options.max_duplicates),
            None if options.set_restriction.is_empty() => {
                RarityPools::from_cards(cards.database.cards(), &options.max_duplicates)
            }
            None => RarityPools::from_cards(
                options
                    .set_restriction
                    .iter()
                    .flat_map(|set| cards.database.cards_in_set(set)),
                &options.max_duplicates,
            ),
        };

        // Basic lands only appear in the land slot of single set boosters.
        let lands = LandSlot::from_commons(&mut pools.common, &cards.database, |c| {
            c.type_line.starts_with("Basic Land")
        });
        let land_slot = single_set.and(Some(lands)).filter(|slot| !slot.is_empty());
        let rule = single_set.map(SpecialRule::for_set).unwrap_or(SpecialRule::None);
        let booster_options = BoosterOptions {
            foil: options.foil,
            mythic_promotion: options.mythic_promotion,
            color_balance: options.color_balance,
        };

        let mut factory = BoosterFactory::new(pools, land_slot, booster_options, rule, &cards.database)?;
        make_boosters(&mut factory, quantity, targets, &mut self.rng)
    }

    /// Cards owned by every user who shared a collection, with the smallest
    /// owned count.
    fn collection(&self) -> Option<HashMap<CardId, u32>> {
        let mut collections = self.clients.iter().filter_map(|c| c.collection.as_ref());
        let mut shared = collections.next()?.clone();
        for collection in collections {
            shared.retain(|id, count| match collection.get(id) {
                Some(other) => {
                    *count = (*count).min(*other);
                    true
                }
                None => false,
            });
        }
        Some(shared)
    }

    fn new_log(&self, variant: DraftVariant, boosters: &[Booster], bots: &[Uuid]) -> DraftLog {
        let humans = self.clients.iter().map(|c| LogUser {
            id: c.id,
            name: c.name.clone(),
            bot: false,
        });
        let bots = bots.iter().enumerate().map(|(i, id)| LogUser {
            id: *id,
            name: format!("Bot #{}", i + 1),
            bot: true,
        });
        DraftLog {
            session: self.id,
            variant,
            users: humans.chain(bots).collect(),
            boosters: boosters.iter().map(|b| card_ids(b)).collect(),
            picks: Vec::new(),
            pools: HashMap::new(),
        }
    }

    fn begin(&mut self, state: DraftState, log: DraftLog) {
        let variant = state.variant();
        tracing::info!(session = %self.id, ?variant, players = log.users.len(), "Draft started.");
        self.state = Some(state);
        self.log = Some(log);
        self.paused = false;
        self.timers.clear();
        self.broadcast(|| DraftServerMessage::DraftStarted { variant });
    }

    fn end_draft(&mut self) {
        let Some(state) = self.state.take() else {
            return;
        };

        if let Some(mut log) = self.log.take() {
            log.pools = state
                .pools()
                .iter()
                .map(|(player, pool)| (*player, card_ids(pool)))
                .collect();
            self.last_log = Some(log);
        }
        self.paused = false;
        self.timers.clear();
        self.bots.clear();

        tracing::info!(session = %self.id, variant = ?state.variant(), "Draft ended.");
        match &self.last_log {
            Some(log) => {
                let log = log.clone();
                self.broadcast(|| DraftServerMessage::DraftEnded { log: log.clone() });
            }
            None => tracing::error!(session = %self.id, "Draft ended without a log."),
        }
    }

    fn record_pick(&mut self, user: Uuid, picked: &[UniqueCard], burned: &[UniqueCard]) {
        if let Some(log) = &mut self.log {
            log.picks.push(PickRecord {
                user,
                picked: card_ids(picked),
                burned: card_ids(burned),
            });
        }
    }

    /// Send new boosters to players. Bots pick right away, which may complete
    /// the pick round and hand out more boosters.
    fn deliver_packs(&mut self, packs: NewPacks) {
        let mut pending = packs;
        while !pending.is_empty() {
            let mut next = Vec::new();
            for (player, booster) in pending {
                let Some(DraftState::Standard(draft)) = &mut self.state else {
                    return;
                };
                let Some((picks, burns)) = draft.expected_counts(player) else {
                    continue;
                };

                if self.bots.contains(&player) {
                    let (picks, burns) = bot_pick(&booster, picks, burns);
                    match draft.handle_pick(player, &picks, &burns) {
                        Ok(outcome) => {
                            self.record_pick(player, &outcome.picked, &outcome.burned);
                            next.extend(outcome.new_packs);
                        }
                        Err(e) => tracing::error!(session = %self.id, %player, "Bot pick failed: {e}"),
                    }
                } else {
                    let (round, pick) = draft.progress();
                    self.timers.insert(player, self.options.max_timer);
                    self.send_to(
                        player,
                        DraftServerMessage::NewPack {
                            booster,
                            picks,
                            burns,
                            round,
                            pick,
                        },
                    );
                }
            }
            pending = next;
        }

        if self.state.as_ref().is_some_and(DraftState::is_complete) {
            self.end_draft();
        }
    }

    fn auto_pick(&mut self, player: Uuid) {
        let Some(DraftState::Standard(draft)) = &self.state else {
            return;
        };
        let (Some(booster), Some((picks, burns))) = (draft.current_pack(player), draft.expected_counts(player))
        else {
            return;
        };

        let (picks, burns) = bot_pick(booster, picks, burns);
        if let Err(ack) = self.pick_card(player, &picks, &burns) {
            tracing::error!(session = %self.id, %player, ?ack, "Automatic pick failed.");
        }
    }

    /// Broadcast the next turn of a turn based draft, or end it.
    fn next_turn(&mut self) {
        if self.state.as_ref().is_some_and(DraftState::is_complete) {
            self.end_draft();
        } else {
            self.broadcast_turn();
        }
    }

    fn turn_message(&self) -> Option<DraftServerMessage> {
        match self.state.as_ref()? {
            DraftState::Standard(_) => None,
            DraftState::Winston(draft) => Some(DraftServerMessage::WinstonNextRound {
                current_player: draft.current_player()?,
                current_pile: draft.current_pile(),
                piles: draft.piles().to_vec(),
                remaining_cards: draft.remaining_cards(),
            }),
            DraftState::Grid(draft) => Some(DraftServerMessage::GridNextRound {
                current_player: draft.current_player()?,
                round: draft.progress().0,
                grid: draft.grid().to_vec(),
            }),
            DraftState::Rochester(draft) => {
                let (booster_number, pick_number) = draft.progress();
                Some(DraftServerMessage::RochesterNextPick {
                    current_player: draft.current_player()?,
                    booster: draft.current_booster()?.clone(),
                    booster_number,
                    pick_number,
                })
            }
        }
    }

    fn broadcast_turn(&self) {
        if let Some(msg) = self.turn_message() {
            self.broadcast(|| msg.clone());
        }
    }

    fn winston_turn(&mut self, user: Uuid) -> Result<&mut WinstonDraft, Ack> {
        self.check_member(user)?;
        let Some(DraftState::Winston(draft)) = &mut self.state else {
            return Err(Ack::new(AckCode::NotDrafting, "No Winston draft in progress."));
        };
        if draft.current_player() != Some(user) {
            return Err(Ack::new(AckCode::NotYourTurn, "Not your turn."));
        }
        Ok(draft)
    }

    /// Bring a (re)connected user up to date.
    fn send_state(&self, user: Uuid) {
        let pool = self
            .state
            .as_ref()
            .and_then(|s| s.pools().get(&user))
            .cloned()
            .unwrap_or_default();
        self.send_to(
            user,
            DraftServerMessage::Connected {
                session: self.id,
                user,
                owner: self.owner == Some(user),
                pool,
            },
        );
        self.send_to(user, DraftServerMessage::SessionOptions(self.options.clone()));

        let Some(state) = &self.state else {
            return;
        };
        self.send_to(user, DraftServerMessage::DraftStarted { variant: state.variant() });
        if self.paused {
            self.send_to(user, DraftServerMessage::Paused);
        }
        match state {
            DraftState::Standard(draft) => {
                if let (Some(booster), Some((picks, burns))) =
                    (draft.current_pack(user), draft.expected_counts(user))
                {
                    let (round, pick) = draft.progress();
                    self.send_to(
                        user,
                        DraftServerMessage::NewPack {
                            booster: booster.clone(),
                            picks,
                            burns,
                            round,
                            pick,
                        },
                    );
                }
            }
            _ => {
                if let Some(msg) = self.turn_message() {
                    self.send_to(user, msg);
                }
            }
        }
    }

    fn check_member(&self, user: Uuid) -> Action {
        if self.clients.iter().any(|c| c.id == user) {
            Ok(())
        } else {
            Err(Ack::new(AckCode::NoSession, "Not in session."))
        }
    }

    fn check_owner(&self, user: Uuid) -> Action {
        self.check_member(user)?;
        if self.owner == Some(user) {
            Ok(())
        } else {
            Err(Ack::internal("Only the session owner can do this."))
        }
    }

    fn check_not_drafting(&self) -> Action {
        if self.is_drafting() {
            Err(Ack::internal("A draft is already in progress."))
        } else {
            Ok(())
        }
    }

    /// Show a message to the user and refuse the action.
    fn refuse(&self, user: Uuid, message: MessageError) -> Ack {
        let ack = Ack::internal(&message.text);
        self.send_to(user, DraftServerMessage::Message(message));
        ack
    }

    fn report_error(&self, user: Uuid, e: DraftError) -> Ack {
        match &e {
            DraftError::Internal(_) => tracing::error!(session = %self.id, "Session action failed: {e}"),
            _ => tracing::warn!(session = %self.id, "Session action failed: {e}"),
        }
        self.refuse(user, e.into_message())
    }

    fn send_to(&self, user: Uuid, msg: DraftServerMessage) {
        if let Some(client) = self.clients.iter().find(|c| c.id == user) {
            client.send(msg);
        }
    }

    fn broadcast<F: Fn() -> DraftServerMessage>(&self, msg: F) {
        for client in &self.clients {
            client.send(msg());
        }
    }

    fn broadcast_users(&self) {
        let users: Vec<UserInfo> = self
            .clients
            .iter()
            .map(|c| UserInfo {
                id: c.id,
                name: c.name.clone(),
                connected: c.connected(),
                collection: c.collection.is_some(),
            })
            .collect();
        let owner = self.owner;
        self.broadcast(|| DraftServerMessage::SessionUsers {
            owner,
            users: users.clone(),
        });
    }

    fn broadcast_options(&self) {
        self.broadcast(|| DraftServerMessage::SessionOptions(self.options.clone()));
    }
}
