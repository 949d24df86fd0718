//! MLB Stats API client.
//!
//! Talks to the public `statsapi.mlb.com` endpoints. No API key required.

use std::time::Duration;

use async_trait::async_trait;
use bullpen_types::{
    config::FeedConfig,
    game::{
        AtBatOutcome, Bases, Count, GameStatePayload, GameStatus, InningHalf, PlayRecord, Score,
    },
    stats::{GameLogLine, Metric, PlayerRole, StatKind, StatPayload},
    BullpenError, FeedError, GameId, PlayerId, Result,
};
use chrono::{DateTime, Datelike, Utc};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::RemoteFeed;

// ── Live feed deserialization structs ───────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveFeedResponse {
    game_data: LiveGameData,
    live_data: LiveData,
}

#[derive(Debug, Deserialize)]
struct LiveGameData {
    status: LiveStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LiveStatus {
    abstract_game_state: String,
}

#[derive(Debug, Deserialize)]
struct LiveData {
    #[serde(default)]
    linescore: Linescore,
    #[serde(default)]
    plays: Plays,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Linescore {
    current_inning: Option<u8>,
    inning_half: Option<String>,
    outs: Option<u8>,
    balls: Option<u8>,
    strikes: Option<u8>,
    #[serde(default)]
    offense: Offense,
    #[serde(default)]
    teams: LinescoreTeams,
}

#[derive(Debug, Default, Deserialize)]
struct Offense {
    first: Option<PersonRef>,
    second: Option<PersonRef>,
    third: Option<PersonRef>,
}

#[derive(Debug, Default, Deserialize)]
struct LinescoreTeams {
    #[serde(default)]
    home: TeamLine,
    #[serde(default)]
    away: TeamLine,
}

#[derive(Debug, Default, Deserialize)]
struct TeamLine {
    runs: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Plays {
    #[serde(default)]
    all_plays: Vec<Play>,
    current_play: Option<Play>,
}

#[derive(Debug, Deserialize)]
struct Play {
    about: PlayAbout,
    #[serde(default)]
    result: PlayResult,
    matchup: PlayMatchup,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayAbout {
    at_bat_index: u64,
    #[serde(default)]
    is_complete: bool,
    start_time: Option<DateTime<Utc>>,
    end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayResult {
    event_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlayMatchup {
    batter: PersonRef,
    pitcher: PersonRef,
}

#[derive(Debug, Deserialize)]
struct PersonRef {
    id: PlayerId,
}

// ── Stats deserialization structs ───────────────────────────────

#[derive(Debug, Deserialize)]
struct StatsResponse {
    #[serde(default)]
    stats: Vec<StatGroup>,
}

#[derive(Debug, Deserialize)]
struct StatGroup {
    #[serde(rename = "type")]
    kind: Option<StatType>,
    #[serde(default)]
    splits: Vec<StatSplit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatType {
    display_name: String,
}

#[derive(Debug, Deserialize)]
struct StatSplit {
    #[serde(default)]
    stat: Map<String, Value>,
}

const HITTING_FIELDS: &[(&str, Metric)] = &[
    ("gamesPlayed", Metric::Games),
    ("plateAppearances", Metric::PlateAppearances),
    ("atBats", Metric::AtBats),
    ("hits", Metric::Hits),
    ("doubles", Metric::Doubles),
    ("triples", Metric::Triples),
    ("homeRuns", Metric::HomeRuns),
    ("baseOnBalls", Metric::Walks),
    ("intentionalWalks", Metric::IntentionalWalks),
    ("hitByPitch", Metric::HitByPitch),
    ("sacFlies", Metric::SacFlies),
    ("strikeOuts", Metric::Strikeouts),
    ("totalBases", Metric::TotalBases),
    ("rbi", Metric::Rbi),
    ("avg", Metric::Avg),
    ("obp", Metric::Obp),
    ("slg", Metric::Slg),
    ("ops", Metric::Ops),
];

const PITCHING_FIELDS: &[(&str, Metric)] = &[
    ("gamesPlayed", Metric::Games),
    ("inningsPitched", Metric::InningsPitched),
    ("strikeOuts", Metric::Strikeouts),
    ("baseOnBalls", Metric::Walks),
    ("intentionalWalks", Metric::IntentionalWalks),
    ("hitBatsmen", Metric::HitByPitch),
    ("homeRuns", Metric::HomeRuns),
    ("hits", Metric::Hits),
    ("earnedRuns", Metric::EarnedRuns),
    ("battersFaced", Metric::BattersFaced),
    ("era", Metric::Era),
    ("whip", Metric::Whip),
];

// ── Client ──────────────────────────────────────────────────────

/// HTTP-backed [`RemoteFeed`] for the MLB Stats API.
pub struct MlbStatsFeed {
    http: reqwest::Client,
    base_url: String,
}

impl MlbStatsFeed {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|err| {
                BullpenError::Configuration(format!("failed to build http client: {err}"))
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, FeedError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(transport_error)?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(FeedError::NotFound(url));
        }
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(FeedError::RateLimited);
        }
        if status.is_server_error() {
            return Err(FeedError::Upstream5xx(status.as_u16()));
        }
        if !status.is_success() {
            return Err(FeedError::Transport(format!("unexpected status {status} from {url}")));
        }

        resp.json::<T>()
            .await
            .map_err(|err| FeedError::Malformed(format!("{url}: {err}")))
    }

    async fn person_stats(
        &self,
        player_id: PlayerId,
        query: &[(&str, String)],
    ) -> Result<StatsResponse, FeedError> {
        self.get_json(&format!("/api/v1/people/{player_id}/stats"), query)
            .await
    }

    fn parse_live_feed(
        game_id: GameId,
        feed: LiveFeedResponse,
    ) -> Result<GameStatePayload, FeedError> {
        let status = match feed.game_data.status.abstract_game_state.as_str() {
            "Preview" => GameStatus::Scheduled,
            "Live" => GameStatus::Live,
            "Final" => GameStatus::Final,
            other => {
                return Err(FeedError::Malformed(format!(
                    "unknown game state {other:?} for game {game_id}"
                )))
            }
        };

        let line = &feed.live_data.linescore;
        let inning_half = match line.inning_half.as_deref() {
            Some(half) if half.eq_ignore_ascii_case("bottom") => InningHalf::Bottom,
            _ => InningHalf::Top,
        };

        let plays: Vec<PlayRecord> = feed
            .live_data
            .plays
            .all_plays
            .iter()
            .filter(|p| p.about.is_complete)
            .map(|p| PlayRecord {
                event_id: p.about.at_bat_index + 1,
                batter_id: p.matchup.batter.id,
                pitcher_id: p.matchup.pitcher.id,
                outcome: Self::outcome(p.result.event_type.as_deref()),
                timestamp: p
                    .about
                    .end_time
                    .or(p.about.start_time)
                    .unwrap_or_else(Utc::now),
            })
            .collect();
        let last_event_id = plays.iter().map(|p| p.event_id).max().unwrap_or(0);

        let (batter, pitcher) = match (&feed.live_data.plays.current_play, status) {
            (Some(play), GameStatus::Live) => {
                (Some(play.matchup.batter.id), Some(play.matchup.pitcher.id))
            }
            _ => (None, None),
        };

        // The upstream briefly reports 3 outs / 4 balls while a half inning or
        // plate appearance closes out.
        let outs = if status == GameStatus::Live {
            line.outs.unwrap_or(0).min(2)
        } else {
            0
        };

        Ok(GameStatePayload {
            game_id,
            status,
            inning: line.current_inning.unwrap_or(0),
            inning_half,
            outs,
            bases: Bases::new(
                line.offense.first.is_some(),
                line.offense.second.is_some(),
                line.offense.third.is_some(),
            ),
            count: Count {
                balls: line.balls.unwrap_or(0).min(3),
                strikes: line.strikes.unwrap_or(0).min(2),
            },
            score: Score {
                home: line.teams.home.runs.unwrap_or(0),
                away: line.teams.away.runs.unwrap_or(0),
            },
            current_batter_id: batter,
            current_pitcher_id: pitcher,
            last_event_id,
            plays,
        })
    }

    fn outcome(event_type: Option<&str>) -> AtBatOutcome {
        match event_type {
            Some("single") => AtBatOutcome::Single,
            Some("double") => AtBatOutcome::Double,
            Some("triple") => AtBatOutcome::Triple,
            Some("home_run") => AtBatOutcome::HomeRun,
            Some("walk") => AtBatOutcome::Walk,
            Some("intent_walk") => AtBatOutcome::IntentionalWalk,
            Some("hit_by_pitch") => AtBatOutcome::HitByPitch,
            Some("strikeout") | Some("strikeout_double_play") => AtBatOutcome::Strikeout,
            Some("field_out") | Some("force_out") => AtBatOutcome::FieldOut,
            Some("grounded_into_double_play") | Some("double_play") | Some("triple_play") => {
                AtBatOutcome::DoublePlay
            }
            Some("fielders_choice") | Some("fielders_choice_out") => AtBatOutcome::FieldersChoice,
            Some("sac_fly") => AtBatOutcome::SacFly,
            Some("sac_bunt") => AtBatOutcome::SacBunt,
            Some("field_error") => AtBatOutcome::ReachedOnError,
            Some(other) => AtBatOutcome::Other(other.to_string()),
            None => AtBatOutcome::Unrecorded,
        }
    }

    /// Map a raw stat object onto typed metrics. Unparseable values are skipped.
    fn metrics(stat: &Map<String, Value>, fields: &[(&str, Metric)]) -> StatPayload {
        fields
            .iter()
            .filter_map(|(field, metric)| {
                let raw = stat.get(*field)?;
                let value = if *metric == Metric::InningsPitched {
                    Self::innings(raw)?
                } else {
                    Self::number(raw)?
                };
                Some((*metric, value))
            })
            .collect()
    }

    fn number(raw: &Value) -> Option<f64> {
        match raw {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.replace(',', "").parse().ok(),
            _ => None,
        }
    }

    /// "45.1" means 45⅓ innings.
    fn innings(raw: &Value) -> Option<f64> {
        let text = match raw {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        let (whole, outs) = text.split_once('.').unwrap_or((text.as_str(), "0"));
        let whole: f64 = whole.parse().ok()?;
        let outs: f64 = outs.parse().ok()?;
        Some(whole + outs / 3.0)
    }

    /// Zero-filled payload for a player with no line in the requested split.
    fn empty_line(kind: &StatKind) -> StatPayload {
        kind.required_metrics().iter().map(|m| (*m, 0.0)).collect()
    }

    fn first_split(response: &StatsResponse, display_name: Option<&str>) -> Option<Map<String, Value>> {
        response
            .stats
            .iter()
            .filter(|group| match display_name {
                Some(name) => group.kind.as_ref().map(|k| k.display_name.as_str()) == Some(name),
                None => true,
            })
            .find_map(|group| group.splits.first())
            .map(|split| split.stat.clone())
    }

    fn parse_game_log(response: &StatsResponse, games: usize) -> Vec<GameLogLine> {
        let splits = response
            .stats
            .first()
            .map(|group| group.splits.as_slice())
            .unwrap_or_default();
        let skip = splits.len().saturating_sub(games);
        splits[skip..]
            .iter()
            .map(|split| {
                let count = |field: &str| {
                    split
                        .stat
                        .get(field)
                        .and_then(Self::number)
                        .map(|v| v.max(0.0) as u32)
                        .unwrap_or(0)
                };
                GameLogLine {
                    at_bats: count("atBats"),
                    hits: count("hits"),
                    walks: count("baseOnBalls"),
                    hit_by_pitch: count("hitByPitch"),
                    sac_flies: count("sacFlies"),
                    total_bases: count("totalBases"),
                    home_runs: count("homeRuns"),
                    strikeouts: count("strikeOuts"),
                }
            })
            .collect()
    }
}

fn transport_error(err: reqwest::Error) -> FeedError {
    if err.is_timeout() {
        FeedError::Timeout
    } else {
        FeedError::Transport(err.to_string())
    }
}

fn current_season() -> String {
    Utc::now().year().to_string()
}

#[async_trait]
impl RemoteFeed for MlbStatsFeed {
    async fn fetch_game_state(&self, game_id: GameId) -> Result<GameStatePayload, FeedError> {
        let feed: LiveFeedResponse = self
            .get_json(&format!("/api/v1.1/game/{game_id}/feed/live"), &[])
            .await?;
        let payload = Self::parse_live_feed(game_id, feed)?;
        debug!(
            game_id,
            last_event_id = payload.last_event_id,
            "MLB: fetched live feed"
        );
        Ok(payload)
    }

    async fn fetch_player_season_stats(
        &self,
        player_id: PlayerId,
        role: PlayerRole,
    ) -> Result<StatPayload, FeedError> {
        let (group, fields) = match role {
            PlayerRole::Batter => ("hitting", HITTING_FIELDS),
            PlayerRole::Pitcher => ("pitching", PITCHING_FIELDS),
        };
        let response = self
            .person_stats(
                player_id,
                &[
                    ("stats", "season".into()),
                    ("season", current_season()),
                    ("group", group.into()),
                ],
            )
            .await?;
        Ok(match Self::first_split(&response, None) {
            Some(stat) => Self::metrics(&stat, fields),
            None => Self::empty_line(&StatKind::Season(role)),
        })
    }

    async fn fetch_recent_games(
        &self,
        player_id: PlayerId,
        games: usize,
    ) -> Result<Vec<GameLogLine>, FeedError> {
        let response = self
            .person_stats(
                player_id,
                &[
                    ("stats", "gameLog".into()),
                    ("season", current_season()),
                    ("gameType", "S,R".into()),
                    ("group", "hitting".into()),
                ],
            )
            .await?;
        Ok(Self::parse_game_log(&response, games))
    }

    async fn fetch_head_to_head(
        &self,
        batter_id: PlayerId,
        pitcher_id: PlayerId,
    ) -> Result<StatPayload, FeedError> {
        let response = self
            .person_stats(
                batter_id,
                &[
                    ("stats", "vsPlayer".into()),
                    ("group", "hitting".into()),
                    ("opposingPlayerId", pitcher_id.to_string()),
                ],
            )
            .await?;
        let kind = StatKind::HeadToHead {
            batter_id,
            pitcher_id,
        };
        Ok(match Self::first_split(&response, Some("vsPlayerTotal")) {
            Some(stat) => Self::metrics(&stat, HITTING_FIELDS)
                .iter()
                .filter(|(metric, _)| kind.allows(*metric))
                .collect(),
            None => Self::empty_line(&kind),
        })
    }
}
