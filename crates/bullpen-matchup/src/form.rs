use bullpen_types::stats::{GameLogLine, Metric, StatPayload};

/// Collapse per-game lines into a recent-form payload.
///
/// Rate stats use the usual definitions; any zero denominator yields 0.
pub fn aggregate(lines: &[GameLogLine]) -> StatPayload {
    let total = lines.iter().fold(GameLogLine::default(), |acc, line| GameLogLine {
        at_bats: acc.at_bats + line.at_bats,
        hits: acc.hits + line.hits,
        walks: acc.walks + line.walks,
        hit_by_pitch: acc.hit_by_pitch + line.hit_by_pitch,
        sac_flies: acc.sac_flies + line.sac_flies,
        total_bases: acc.total_bases + line.total_bases,
        home_runs: acc.home_runs + line.home_runs,
        strikeouts: acc.strikeouts + line.strikeouts,
    });
    summarize(lines.len(), &total)
}

pub(crate) fn summarize(games: usize, total: &GameLogLine) -> StatPayload {
    let ab = f64::from(total.at_bats);
    let h = f64::from(total.hits);
    let bb = f64::from(total.walks);
    let hbp = f64::from(total.hit_by_pitch);
    let sf = f64::from(total.sac_flies);
    let tb = f64::from(total.total_bases);

    let avg = ratio(h, ab);
    let obp = ratio(h + bb + hbp, ab + bb + hbp + sf);
    let slg = ratio(tb, ab);

    StatPayload::new()
        .with(Metric::Games, games as f64)
        .with(Metric::PlateAppearances, ab + bb + hbp + sf)
        .with(Metric::AtBats, ab)
        .with(Metric::Hits, h)
        .with(Metric::Walks, bb)
        .with(Metric::HitByPitch, hbp)
        .with(Metric::SacFlies, sf)
        .with(Metric::TotalBases, tb)
        .with(Metric::HomeRuns, f64::from(total.home_runs))
        .with(Metric::Strikeouts, f64::from(total.strikeouts))
        .with(Metric::Avg, avg)
        .with(Metric::Obp, obp)
        .with(Metric::Slg, slg)
        .with(Metric::Ops, obp + slg)
}

fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        numerator / denominator
    } else {
        0.0
    }
}
