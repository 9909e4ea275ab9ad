//! Transactions over the root document.
//!
//! Every change a client makes is expressed as one [`Transaction`]: either a
//! [`Patch`] naming the top-level fields it replaces, or a full replacement of
//! the document. Compound changes (a draw, a history reset) always travel as a
//! single patch so no reader sees, say, a cleared winners list next to stale
//! prize counters.

use crate::{
    backup::{
        self,
        BackupError,
    },
    integrity::{
        IntegrityError,
        check_unique_ids,
    },
    state::{
        AppState,
        Participant,
        Prize,
        SiteConfig,
        Winner,
    },
};
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::{
    HashMap,
    HashSet,
};

/// Shallow update of the root document: each present field replaces the remote
/// field of the same name wholesale, absent fields are left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participants: Option<Vec<Participant>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prizes: Option<Vec<Prize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winners: Option<Vec<Winner>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_config: Option<SiteConfig>,
}

impl Patch {
    pub fn participants(participants: Vec<Participant>) -> Self {
        Self {
            participants: Some(participants),
            ..Self::default()
        }
    }

    pub fn prizes(prizes: Vec<Prize>) -> Self {
        Self {
            prizes: Some(prizes),
            ..Self::default()
        }
    }

    pub fn site_config(site_config: SiteConfig) -> Self {
        Self {
            site_config: Some(site_config),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Wire names of the fields this patch replaces.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.participants.is_some() {
            fields.push("participants");
        }
        if self.prizes.is_some() {
            fields.push("prizes");
        }
        if self.winners.is_some() {
            fields.push("winners");
        }
        if self.site_config.is_some() {
            fields.push("siteConfig");
        }
        fields
    }

    /// New document with the named fields replaced.
    pub fn apply_to(&self, state: &AppState) -> AppState {
        AppState {
            participants: self
                .participants
                .clone()
                .unwrap_or_else(|| state.participants.clone()),
            prizes: self.prizes.clone().unwrap_or_else(|| state.prizes.clone()),
            winners: self.winners.clone().unwrap_or_else(|| state.winners.clone()),
            site_config: self
                .site_config
                .clone()
                .unwrap_or_else(|| state.site_config.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transaction {
    Patch(Patch),
    Replace(AppState),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DrawError {
    #[error("a draw needs at least one winner")]
    EmptyBatch,
    #[error("a draw awards a single prize, got `{first}` and `{other}`")]
    MixedPrizes { first: String, other: String },
    #[error("prize `{0}` does not exist")]
    UnknownPrize(String),
    #[error("prize `{prize_id}` has {remaining} left but {requested} were drawn")]
    QuotaExceeded {
        prize_id: String,
        remaining: u32,
        requested: usize,
    },
    #[error("participant `{0}` does not exist")]
    UnknownParticipant(String),
    #[error("participant `{0}` has already won")]
    AlreadyWinner(String),
    #[error("participant `{0}` appears more than once in the batch")]
    DuplicateParticipant(String),
    #[error("id `{0}` is already in use")]
    IdInUse(String),
}

/// Patch awarding `new_winners` their prize: appends the winners, flags the
/// participants and bumps the prize counter, all in one patch.
pub fn apply_draw(
    current: &AppState,
    new_winners: &[Winner],
) -> Result<Patch, DrawError> {
    let first = new_winners.first().ok_or(DrawError::EmptyBatch)?;
    let prize_id = first.prize_id.as_str();
    if let Some(other) = new_winners.iter().find(|w| w.prize_id != prize_id) {
        return Err(DrawError::MixedPrizes {
            first: prize_id.to_string(),
            other: other.prize_id.clone(),
        });
    }

    let prize = current
        .prize(prize_id)
        .ok_or_else(|| DrawError::UnknownPrize(prize_id.to_string()))?;
    if new_winners.len() > prize.remaining() as usize {
        return Err(DrawError::QuotaExceeded {
            prize_id: prize_id.to_string(),
            remaining: prize.remaining(),
            requested: new_winners.len(),
        });
    }

    let taken = current.ids();
    let mut batch_ids = HashSet::new();
    let mut awarded = HashSet::new();
    for winner in new_winners {
        if taken.contains(winner.id.as_str()) || !batch_ids.insert(winner.id.as_str()) {
            return Err(DrawError::IdInUse(winner.id.clone()));
        }
        let participant = current
            .participant(&winner.participant_id)
            .ok_or_else(|| DrawError::UnknownParticipant(winner.participant_id.clone()))?;
        if participant.is_winner {
            return Err(DrawError::AlreadyWinner(participant.id.clone()));
        }
        if !awarded.insert(winner.participant_id.as_str()) {
            return Err(DrawError::DuplicateParticipant(
                winner.participant_id.clone(),
            ));
        }
    }

    let winners = current
        .winners
        .iter()
        .chain(new_winners)
        .cloned()
        .collect();
    let participants = current
        .participants
        .iter()
        .map(|p| Participant {
            is_winner: p.is_winner || awarded.contains(p.id.as_str()),
            ..p.clone()
        })
        .collect();
    let drawn = new_winners.len() as u32;
    let prizes = current
        .prizes
        .iter()
        .map(|p| {
            if p.id == prize_id {
                Prize {
                    drawn_count: p.drawn_count + drawn,
                    ..p.clone()
                }
            } else {
                p.clone()
            }
        })
        .collect();

    Ok(Patch {
        participants: Some(participants),
        prizes: Some(prizes),
        winners: Some(winners),
        site_config: None,
    })
}

/// Patch clearing every award: no winners, nobody flagged, all counters zero.
pub fn reset_history(current: &AppState) -> Patch {
    Patch {
        participants: Some(
            current
                .participants
                .iter()
                .map(|p| Participant {
                    is_winner: false,
                    ..p.clone()
                })
                .collect(),
        ),
        prizes: Some(
            current
                .prizes
                .iter()
                .map(|p| Prize {
                    drawn_count: 0,
                    ..p.clone()
                })
                .collect(),
        ),
        winners: Some(Vec::new()),
        site_config: None,
    }
}

/// Replaces the roster. Winner flags are recomputed from the winners list so
/// an edit can never put an awarded participant back into the pool.
pub fn update_roster(
    current: &AppState,
    participants: Vec<Participant>,
) -> Result<Patch, IntegrityError> {
    let awarded: HashSet<&str> = current
        .winners
        .iter()
        .map(|w| w.participant_id.as_str())
        .collect();
    let participants: Vec<Participant> = participants
        .into_iter()
        .map(|p| Participant {
            is_winner: awarded.contains(p.id.as_str()),
            ..p
        })
        .collect();
    let candidate = AppState {
        participants,
        ..current.clone()
    };
    check_unique_ids(&candidate)?;
    Ok(Patch::participants(candidate.participants))
}

/// Replaces the prize list. Counters of prizes already in the document are
/// carried over and new prizes start at zero, so only draws and resets move
/// `drawn_count`.
pub fn update_prizes(
    current: &AppState,
    prizes: Vec<Prize>,
) -> Result<Patch, IntegrityError> {
    let drawn: HashMap<&str, u32> = current
        .prizes
        .iter()
        .map(|p| (p.id.as_str(), p.drawn_count))
        .collect();
    let prizes: Vec<Prize> = prizes
        .into_iter()
        .map(|p| Prize {
            drawn_count: drawn.get(p.id.as_str()).copied().unwrap_or(0),
            ..p
        })
        .collect();
    if let Some(prize) = prizes.iter().find(|p| p.drawn_count > p.count) {
        return Err(IntegrityError::QuotaOverflow {
            prize_id: prize.id.clone(),
            drawn_count: prize.drawn_count,
            count: prize.count,
        });
    }
    let candidate = AppState {
        prizes,
        ..current.clone()
    };
    check_unique_ids(&candidate)?;
    Ok(Patch::prizes(candidate.prizes))
}

pub fn update_site_config(site_config: SiteConfig) -> Patch {
    Patch::site_config(site_config)
}

/// What a view may ask of the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    UpdateRoster(Vec<Participant>),
    UpdatePrizes(Vec<Prize>),
    UpdateSiteConfig(SiteConfig),
    CompleteDraw(Vec<Winner>),
    ClearHistory { confirmed: bool },
    ImportFullState { document: String, confirmed: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntentError {
    #[error("no snapshot has been delivered yet")]
    NotLoaded,
    #[error("this action is destructive and must be confirmed")]
    ConfirmationRequired,
    #[error(transparent)]
    Draw(#[from] DrawError),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
    #[error(transparent)]
    Backup(#[from] BackupError),
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::UpdateRoster(_) => "update-roster",
            Intent::UpdatePrizes(_) => "update-prizes",
            Intent::UpdateSiteConfig(_) => "update-site-config",
            Intent::CompleteDraw(_) => "complete-draw",
            Intent::ClearHistory { .. } => "clear-history",
            Intent::ImportFullState { .. } => "import-full-state",
        }
    }

    pub fn into_transaction(
        self,
        current: &AppState,
    ) -> Result<Transaction, IntentError> {
        let transaction = match self {
            Intent::UpdateRoster(participants) => {
                Transaction::Patch(update_roster(current, participants)?)
            }
            Intent::UpdatePrizes(prizes) => {
                Transaction::Patch(update_prizes(current, prizes)?)
            }
            Intent::UpdateSiteConfig(site_config) => {
                Transaction::Patch(update_site_config(site_config))
            }
            Intent::CompleteDraw(winners) => {
                Transaction::Patch(apply_draw(current, &winners)?)
            }
            Intent::ClearHistory { confirmed } => {
                if !confirmed {
                    return Err(IntentError::ConfirmationRequired);
                }
                Transaction::Patch(reset_history(current))
            }
            Intent::ImportFullState {
                document,
                confirmed,
            } => {
                let state = backup::decode_for_import(&document)?;
                if !confirmed {
                    return Err(IntentError::ConfirmationRequired);
                }
                Transaction::Replace(state)
            }
        };
        Ok(transaction)
    }
}
