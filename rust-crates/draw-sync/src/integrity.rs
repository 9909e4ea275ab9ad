use crate::state::AppState;
use std::collections::{
    HashMap,
    HashSet,
};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("id `{0}` is used by more than one entity")]
    DuplicateId(String),
    #[error("prize `{prize_id}` has drawn {drawn_count} of a quota of {count}")]
    QuotaOverflow {
        prize_id: String,
        drawn_count: u32,
        count: u32,
    },
    #[error("participant `{0}` has won but is still in the available pool")]
    WinnerInPool(String),
    #[error("participant `{0}` is flagged as a winner without a winner record")]
    FlaggedWithoutRecord(String),
    #[error("prize `{prize_id}` counts {drawn_count} drawn but has {recorded} winners")]
    DrawnCountMismatch {
        prize_id: String,
        drawn_count: u32,
        recorded: u32,
    },
}

impl AppState {
    /// Checks every global invariant of the document. Winners pointing at a
    /// participant or prize that has since been removed are allowed; roster
    /// and prize edits leave them behind.
    pub fn check_integrity(&self) -> Result<(), IntegrityError> {
        check_unique_ids(self)?;
        check_quotas(self)?;
        check_winner_flags(self)?;
        Ok(())
    }
}

pub(crate) fn check_unique_ids(state: &AppState) -> Result<(), IntegrityError> {
    let mut seen = HashSet::new();
    let ids = state
        .participants
        .iter()
        .map(|p| &p.id)
        .chain(state.prizes.iter().map(|p| &p.id))
        .chain(state.winners.iter().map(|w| &w.id));
    for id in ids {
        if !seen.insert(id.as_str()) {
            return Err(IntegrityError::DuplicateId(id.clone()));
        }
    }
    Ok(())
}

fn check_quotas(state: &AppState) -> Result<(), IntegrityError> {
    let mut recorded: HashMap<&str, u32> = HashMap::new();
    for winner in &state.winners {
        *recorded.entry(winner.prize_id.as_str()).or_default() += 1;
    }
    for prize in &state.prizes {
        if prize.drawn_count > prize.count {
            return Err(IntegrityError::QuotaOverflow {
                prize_id: prize.id.clone(),
                drawn_count: prize.drawn_count,
                count: prize.count,
            });
        }
        let recorded = recorded.get(prize.id.as_str()).copied().unwrap_or(0);
        if prize.drawn_count != recorded {
            return Err(IntegrityError::DrawnCountMismatch {
                prize_id: prize.id.clone(),
                drawn_count: prize.drawn_count,
                recorded,
            });
        }
    }
    Ok(())
}

fn check_winner_flags(state: &AppState) -> Result<(), IntegrityError> {
    let awarded: HashSet<&str> = state
        .winners
        .iter()
        .map(|w| w.participant_id.as_str())
        .collect();
    for participant in &state.participants {
        let has_record = awarded.contains(participant.id.as_str());
        match (participant.is_winner, has_record) {
            (false, true) => {
                return Err(IntegrityError::WinnerInPool(participant.id.clone()));
            }
            (true, false) => {
                return Err(IntegrityError::FlaggedWithoutRecord(
                    participant.id.clone(),
                ));
            }
            _ => {}
        }
    }
    Ok(())
}
