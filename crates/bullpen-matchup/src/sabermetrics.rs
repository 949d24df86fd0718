//! Derived metrics computed from raw payloads.
//!
//! Every function is pure and returns [`MetricValue::NotAvailable`] when its
//! denominator is zero or its inputs are inconsistent.
//!
//! | Metric | Inputs |
//! |---|---|
//! | BABIP | H, HR, AB, K, SF |
//! | wOBA | AB, H, 2B, 3B, HR, BB, IBB (optional), HBP, SF |
//! | wRC+ | wOBA inputs, PA |
//! | batter WAR | wOBA inputs, PA |
//! | FIP | IP, HR, BB, HBP, K |
//! | FIP- | FIP inputs |
//! | pitcher WAR | FIP inputs |
//! | OPS | AB, H, BB, HBP, SF and TB (or 2B, 3B, HR) |
//!
//! Park, league and positional adjustments are not applied.

use bullpen_types::{
    matchup::{DerivedMetrics, MetricValue},
    stats::{Metric, StatPayload},
};

/// Season-level run environment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeagueConstants {
    pub w_bb: f64,
    pub w_hbp: f64,
    pub w_1b: f64,
    pub w_2b: f64,
    pub w_3b: f64,
    pub w_hr: f64,
    pub woba: f64,
    pub woba_scale: f64,
    pub runs_per_pa: f64,
    pub fip_constant: f64,
    pub fip: f64,
    pub replacement_fip: f64,
    /// Replacement-level batting runs per 600 plate appearances.
    pub replacement_runs_per_600: f64,
    pub runs_per_win: f64,
}

impl Default for LeagueConstants {
    /// 2023 MLB values.
    fn default() -> Self {
        Self {
            w_bb: 0.696,
            w_hbp: 0.726,
            w_1b: 0.883,
            w_2b: 1.244,
            w_3b: 1.569,
            w_hr: 2.004,
            woba: 0.318,
            woba_scale: 1.204,
            runs_per_pa: 0.122,
            fip_constant: 3.255,
            fip: 4.33,
            replacement_fip: 5.40,
            replacement_runs_per_600: 20.0,
            runs_per_win: 9.9,
        }
    }
}

fn available(value: f64) -> MetricValue {
    if value.is_finite() {
        MetricValue::Value(value)
    } else {
        MetricValue::NotAvailable
    }
}

fn get(payload: &StatPayload, metric: Metric) -> f64 {
    payload.get_or_zero(metric)
}

pub fn babip(batting: &StatPayload) -> MetricValue {
    let h = get(batting, Metric::Hits);
    let hr = get(batting, Metric::HomeRuns);
    let balls_in_play = get(batting, Metric::AtBats) - get(batting, Metric::Strikeouts) - hr
        + get(batting, Metric::SacFlies);
    if balls_in_play <= 0.0 {
        return MetricValue::NotAvailable;
    }
    available((h - hr) / balls_in_play)
}

pub fn woba(batting: &StatPayload, league: &LeagueConstants) -> MetricValue {
    let h = get(batting, Metric::Hits);
    let doubles = get(batting, Metric::Doubles);
    let triples = get(batting, Metric::Triples);
    let hr = get(batting, Metric::HomeRuns);
    let singles = h - doubles - triples - hr;
    let ibb = get(batting, Metric::IntentionalWalks);
    let ubb = get(batting, Metric::Walks) - ibb;
    let hbp = get(batting, Metric::HitByPitch);
    let denominator =
        get(batting, Metric::AtBats) + ubb + get(batting, Metric::SacFlies) + hbp;
    if denominator <= 0.0 || singles < 0.0 || ubb < 0.0 {
        return MetricValue::NotAvailable;
    }
    available(
        (league.w_bb * ubb
            + league.w_hbp * hbp
            + league.w_1b * singles
            + league.w_2b * doubles
            + league.w_3b * triples
            + league.w_hr * hr)
            / denominator,
    )
}

/// Batting runs above average.
fn wraa(batting: &StatPayload, league: &LeagueConstants) -> Option<(f64, f64)> {
    let pa = get(batting, Metric::PlateAppearances);
    let woba = woba(batting, league).value()?;
    (pa > 0.0).then(|| ((woba - league.woba) / league.woba_scale * pa, pa))
}

pub fn wrc_plus(batting: &StatPayload, league: &LeagueConstants) -> MetricValue {
    match wraa(batting, league) {
        Some((wraa, pa)) => available((wraa / pa + league.runs_per_pa) / league.runs_per_pa * 100.0),
        None => MetricValue::NotAvailable,
    }
}

pub fn batter_war(batting: &StatPayload, league: &LeagueConstants) -> MetricValue {
    match wraa(batting, league) {
        Some((wraa, pa)) => {
            let replacement = league.replacement_runs_per_600 * pa / 600.0;
            available((wraa + replacement) / league.runs_per_win)
        }
        None => MetricValue::NotAvailable,
    }
}

pub fn fip(pitching: &StatPayload, league: &LeagueConstants) -> MetricValue {
    let ip = get(pitching, Metric::InningsPitched);
    if ip <= 0.0 {
        return MetricValue::NotAvailable;
    }
    let hr = get(pitching, Metric::HomeRuns);
    let bb = get(pitching, Metric::Walks);
    let hbp = get(pitching, Metric::HitByPitch);
    let k = get(pitching, Metric::Strikeouts);
    available((13.0 * hr + 3.0 * (bb + hbp) - 2.0 * k) / ip + league.fip_constant)
}

pub fn fip_minus(pitching: &StatPayload, league: &LeagueConstants) -> MetricValue {
    match fip(pitching, league).value() {
        Some(fip) if league.fip > 0.0 => available(100.0 * fip / league.fip),
        _ => MetricValue::NotAvailable,
    }
}

pub fn pitcher_war(pitching: &StatPayload, league: &LeagueConstants) -> MetricValue {
    match fip(pitching, league).value() {
        Some(fip) => {
            let ip = get(pitching, Metric::InningsPitched);
            available((league.replacement_fip - fip) * ip / 9.0 / league.runs_per_win)
        }
        None => MetricValue::NotAvailable,
    }
}

/// OPS from counting stats, preferring a reported value when present.
pub fn ops(batting: &StatPayload) -> MetricValue {
    let ab = get(batting, Metric::AtBats);
    let bb = get(batting, Metric::Walks);
    let hbp = get(batting, Metric::HitByPitch);
    let sf = get(batting, Metric::SacFlies);
    let on_base_chances = ab + bb + hbp + sf;
    if on_base_chances <= 0.0 {
        return MetricValue::NotAvailable;
    }
    if let Some(reported) = batting.get(Metric::Ops) {
        return available(reported);
    }
    if ab <= 0.0 {
        return MetricValue::NotAvailable;
    }
    let h = get(batting, Metric::Hits);
    let total_bases = batting.get(Metric::TotalBases).unwrap_or_else(|| {
        h + get(batting, Metric::Doubles)
            + 2.0 * get(batting, Metric::Triples)
            + 3.0 * get(batting, Metric::HomeRuns)
    });
    available((h + bb + hbp) / on_base_chances + total_bases / ab)
}

pub fn derive(
    batter_season: &StatPayload,
    pitcher_season: &StatPayload,
    recent_form: &StatPayload,
    head_to_head: &StatPayload,
    league: &LeagueConstants,
) -> DerivedMetrics {
    DerivedMetrics {
        babip: babip(batter_season),
        woba: woba(batter_season, league),
        wrc_plus: wrc_plus(batter_season, league),
        batter_war: batter_war(batter_season, league),
        fip: fip(pitcher_season, league),
        fip_minus: fip_minus(pitcher_season, league),
        pitcher_war: pitcher_war(pitcher_season, league),
        recent_ops: ops(recent_form),
        head_to_head_ops: ops(head_to_head),
    }
}
