use rand::Rng;
use serde::{
    Deserialize,
    Serialize,
};
use std::collections::{
    HashMap,
    HashSet,
};

/// Milliseconds since the unix epoch.
pub type Timestamp = i64;

pub const UNKNOWN_PARTICIPANT: &str = "Unknown participant";
pub const UNKNOWN_PRIZE: &str = "Unknown prize";
const MISSING_FIELD: &str = "---";

const ID_LENGTH: usize = 9;
const ID_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub department: String,
    #[serde(default)]
    pub is_winner: bool,
}

impl Participant {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        code: impl Into<String>,
        department: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            code: code.into(),
            department: department.into(),
            is_winner: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prize {
    pub id: String,
    pub name: String,
    pub count: u32,
    #[serde(default)]
    pub drawn_count: u32,
    #[serde(default)]
    pub description: String,
    // decorative only
    #[serde(default)]
    pub image: String,
}

impl Prize {
    pub fn new(id: impl Into<String>, name: impl Into<String>, count: u32) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            count,
            drawn_count: 0,
            description: String::new(),
            image: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn remaining(&self) -> u32 {
        self.count.saturating_sub(self.drawn_count)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Winner {
    pub id: String,
    pub participant_id: String,
    pub prize_id: String,
    pub timestamp: Timestamp,
}

impl Winner {
    pub fn new(
        id: impl Into<String>,
        participant_id: impl Into<String>,
        prize_id: impl Into<String>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            id: id.into(),
            participant_id: participant_id.into(),
            prize_id: prize_id.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfig {
    pub brand_name: String,
    pub event_name: String,
    #[serde(default)]
    pub logo_url: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        SiteConfig {
            brand_name: "CYPRESSTEL".to_string(),
            event_name: "Annual Gala 2025".to_string(),
            logo_url: String::new(),
        }
    }
}

/// The root document. Stores may drop empty collections, so every field reads
/// as its default when absent.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppState {
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub prizes: Vec<Prize>,
    #[serde(default)]
    pub winners: Vec<Winner>,
    #[serde(default)]
    pub site_config: SiteConfig,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Document written when the remote store holds nothing yet.
    pub fn seed() -> Self {
        AppState {
            participants: Vec::new(),
            prizes: starter_prizes(),
            winners: Vec::new(),
            site_config: SiteConfig::default(),
        }
    }

    pub fn available_pool(&self) -> impl Iterator<Item = &Participant> {
        self.participants.iter().filter(|p| !p.is_winner)
    }

    pub fn available_pool_count(&self) -> usize {
        self.available_pool().count()
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn prize(&self, id: &str) -> Option<&Prize> {
        self.prizes.iter().find(|p| p.id == id)
    }

    /// Every id in use anywhere in the document.
    pub fn ids(&self) -> HashSet<&str> {
        self.participants
            .iter()
            .map(|p| p.id.as_str())
            .chain(self.prizes.iter().map(|p| p.id.as_str()))
            .chain(self.winners.iter().map(|w| w.id.as_str()))
            .collect()
    }

    /// Random id not yet used by any entity of this document.
    pub fn fresh_id(&self) -> String {
        let taken = self.ids();
        loop {
            let id = generate_id();
            if !taken.contains(id.as_str()) {
                return id;
            }
        }
    }

    pub fn read_model(&self) -> ReadModel {
        ReadModel {
            participants: self.participants.clone(),
            prizes: self.prizes.clone(),
            winners: self.winners.clone(),
            site_config: self.site_config.clone(),
            available_pool_count: self.available_pool_count(),
        }
    }

    /// Winners joined with their participant and prize, newest first.
    /// Dangling references are shown as unknown, never repaired.
    pub fn history(&self) -> Vec<HistoryEntry> {
        let participants: HashMap<&str, &Participant> = self
            .participants
            .iter()
            .map(|p| (p.id.as_str(), p))
            .collect();
        let prizes: HashMap<&str, &Prize> =
            self.prizes.iter().map(|p| (p.id.as_str(), p)).collect();

        let mut entries: Vec<HistoryEntry> = self
            .winners
            .iter()
            .map(|winner| {
                let participant = participants.get(winner.participant_id.as_str());
                let prize = prizes.get(winner.prize_id.as_str());
                HistoryEntry {
                    winner_id: winner.id.clone(),
                    participant_id: winner.participant_id.clone(),
                    prize_id: winner.prize_id.clone(),
                    timestamp: winner.timestamp,
                    participant_name: participant
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| UNKNOWN_PARTICIPANT.to_string()),
                    participant_code: participant
                        .map(|p| p.code.clone())
                        .unwrap_or_else(|| MISSING_FIELD.to_string()),
                    department: participant
                        .map(|p| p.department.clone())
                        .unwrap_or_else(|| MISSING_FIELD.to_string()),
                    prize_name: prize
                        .map(|p| p.name.clone())
                        .unwrap_or_else(|| UNKNOWN_PRIZE.to_string()),
                }
            })
            .collect();
        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries
    }
}

/// What the views render. `available_pool_count` is the only derived value
/// they are given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadModel {
    pub participants: Vec<Participant>,
    pub prizes: Vec<Prize>,
    pub winners: Vec<Winner>,
    pub site_config: SiteConfig,
    pub available_pool_count: usize,
}

impl ReadModel {
    pub fn into_state(self) -> AppState {
        AppState {
            participants: self.participants,
            prizes: self.prizes,
            winners: self.winners,
            site_config: self.site_config,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub winner_id: String,
    pub participant_id: String,
    pub prize_id: String,
    pub timestamp: Timestamp,
    pub participant_name: String,
    pub participant_code: String,
    pub department: String,
    pub prize_name: String,
}

pub fn starter_prizes() -> Vec<Prize> {
    vec![
        Prize::new("1", "Grand Prize", 1)
            .with_description("Mystery award")
            .with_image("🎁"),
        Prize::new("2", "First Prize", 3)
            .with_description("New smartphone")
            .with_image("📱"),
        Prize::new("3", "Second Prize", 10)
            .with_description("Noise-cancelling headphones")
            .with_image("🎧"),
    ]
}

/// Nine random lowercase base-36 characters.
pub fn generate_id() -> String {
    let mut rng = rand::rng();
    (0..ID_LENGTH)
        .map(|_| ID_ALPHABET[rng.random_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;

    #[test]
    fn seed__has_starter_prizes_and_nothing_else() {
        // when
        let seed = AppState::seed();

        // then
        assert!(seed.participants.is_empty());
        assert!(seed.winners.is_empty());
        assert_eq!(seed.site_config, SiteConfig::default());
        let quotas: Vec<(&str, u32, u32)> = seed
            .prizes
            .iter()
            .map(|p| (p.id.as_str(), p.count, p.drawn_count))
            .collect();
        assert_eq!(quotas, vec![("1", 1, 0), ("2", 3, 0), ("3", 10, 0)]);
    }

    #[test]
    fn available_pool_count__counts_only_non_winners() {
        // given
        let mut winner = Participant::new("p1", "Ada", "E001", "R&D");
        winner.is_winner = true;
        let state = AppState {
            participants: vec![
                winner,
                Participant::new("p2", "Grace", "E002", "Ops"),
                Participant::new("p3", "Linus", "E003", "Ops"),
            ],
            ..AppState::default()
        };

        // when
        let count = state.available_pool_count();

        // then
        assert_eq!(count, 2);
        assert_eq!(state.read_model().available_pool_count, 2);
    }

    #[test]
    fn deserialize__missing_collections_read_as_empty() {
        // given
        let json = r#"{ "prizes": [ { "id": "1", "name": "Cup", "count": 2 } ] }"#;

        // when
        let state: AppState = serde_json::from_str(json).unwrap();

        // then
        assert!(state.participants.is_empty());
        assert!(state.winners.is_empty());
        assert_eq!(state.prizes, vec![Prize::new("1", "Cup", 2)]);
        assert_eq!(state.site_config, SiteConfig::default());
    }

    #[test]
    fn serialize__uses_camel_case_wire_names() {
        // given
        let state = AppState {
            participants: vec![Participant::new("p1", "Ada", "E001", "R&D")],
            prizes: vec![Prize::new("2", "First Prize", 3)],
            winners: vec![Winner::new("w1", "p1", "2", 7)],
            site_config: SiteConfig::default(),
        };

        // when
        let value = serde_json::to_value(&state).unwrap();

        // then
        assert_eq!(value["participants"][0]["isWinner"], false);
        assert_eq!(value["prizes"][0]["drawnCount"], 0);
        assert_eq!(value["winners"][0]["participantId"], "p1");
        assert_eq!(value["winners"][0]["prizeId"], "2");
        assert_eq!(value["siteConfig"]["brandName"], "CYPRESSTEL");
        assert_eq!(value["siteConfig"]["logoUrl"], "");
    }

    #[test]
    fn history__newest_first_with_unknown_for_dangling_references() {
        // given
        let state = AppState {
            participants: vec![Participant::new("p1", "Ada", "E001", "R&D")],
            prizes: vec![Prize::new("2", "First Prize", 3)],
            winners: vec![
                Winner::new("w1", "p1", "2", 100),
                Winner::new("w2", "gone", "removed", 200),
            ],
            ..AppState::default()
        };

        // when
        let history = state.history();

        // then
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].winner_id, "w2");
        assert_eq!(history[0].participant_name, UNKNOWN_PARTICIPANT);
        assert_eq!(history[0].participant_code, "---");
        assert_eq!(history[0].prize_name, UNKNOWN_PRIZE);
        assert_eq!(history[1].participant_name, "Ada");
        assert_eq!(history[1].department, "R&D");
        assert_eq!(history[1].prize_name, "First Prize");
        // the document itself is untouched
        assert_eq!(state.winners[1].participant_id, "gone");
    }

    #[test]
    fn generate_id__nine_base36_characters() {
        // when
        let id = generate_id();

        // then
        assert_eq!(id.len(), 9);
        assert!(
            id.chars()
                .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase())
        );
    }

    #[test]
    fn fresh_id__never_returns_an_id_in_use() {
        // given
        let state = AppState::seed();

        // when
        let ids: Vec<String> = (0..50).map(|_| state.fresh_id()).collect();

        // then
        let taken = state.ids();
        assert!(ids.iter().all(|id| !taken.contains(id.as_str())));
    }
}
