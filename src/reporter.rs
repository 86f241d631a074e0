//! Aggregation reporter: read-only values for dashboards.
//!
//! Everything is re-derived from persisted rows; nothing here shares state
//! with the ledger or writes to the database.

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use crate::db::queries;
use crate::error::{EngineError, EngineResult};
use crate::ledger::{Allowance, Scope, WeightLedger};

/// Difference (in points) between the last two periods that counts as a move.
pub const TREND_DELTA: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AchievementStatus {
    Tercapai,
    #[serde(rename = "Tidak Tercapai")]
    TidakTercapai,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Achievement {
    pub status: AchievementStatus,
    pub target: f64,
    pub actual: f64,
    /// Share (0-100) of students at or above the per-student pass threshold.
    pub pass_percentage: f64,
    pub students: usize,
    pub students_passed: usize,
}

/// `Tercapai` iff `actual >= target`. The pass percentage uses the
/// separate per-student threshold and never the target.
pub fn achievement_status(target: f64, actual: f64, student_scores: &[f64], pass_threshold: f64) -> Achievement {
    let status = if actual >= target { AchievementStatus::Tercapai } else { AchievementStatus::TidakTercapai };
    let students = student_scores.len();
    let students_passed = student_scores.iter().filter(|s| **s >= pass_threshold).count();
    let pass_percentage = if students == 0 { 0.0 } else { students_passed as f64 * 100.0 / students as f64 };
    Achievement { status, target, actual, pass_percentage, students, students_passed }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Trend {
    Naik,
    Turun,
    Stabil,
}

/// Direction between the last two ordered period scores.
pub fn trend(ordered_scores: &[f64]) -> Trend {
    match ordered_scores {
        [.., prev, last] => {
            let diff = last - prev;
            if diff > TREND_DELTA {
                Trend::Naik
            } else if diff < -TREND_DELTA {
                Trend::Turun
            } else {
                Trend::Stabil
            }
        }
        _ => Trend::Stabil,
    }
}

/// Mean of `values`; 0 for an empty slice.
pub fn average_or_zero(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Weighted mean of (score, weight) parts. None when no weight is present.
pub fn weighted_score(parts: &[(f64, f64)]) -> Option<f64> {
    let total_weight: f64 = parts.iter().map(|(_, w)| w).sum();
    if total_weight <= 0.0 {
        return None;
    }
    Some(parts.iter().map(|(s, w)| s * w).sum::<f64>() / total_weight)
}

/// Numeric-aware comparison: "CPL-2" < "CPL-10", case-insensitive text.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ca), Some(cb)) if ca.is_ascii_digit() && cb.is_ascii_digit() => {
                let mut na = String::new();
                while let Some(c) = ai.peek().copied().filter(|c| c.is_ascii_digit()) {
                    na.push(c);
                    ai.next();
                }
                let mut nb = String::new();
                while let Some(c) = bi.peek().copied().filter(|c| c.is_ascii_digit()) {
                    nb.push(c);
                    bi.next();
                }
                let ta = na.trim_start_matches('0');
                let tb = nb.trim_start_matches('0');
                let ord = ta.len().cmp(&tb.len()).then_with(|| ta.cmp(tb));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            (Some(ca), Some(cb)) => {
                let ord = ca.to_ascii_lowercase().cmp(&cb.to_ascii_lowercase());
                if ord != Ordering::Equal {
                    return ord;
                }
                ai.next();
                bi.next();
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredEntry {
    pub id: i64,
    pub code: String,
    pub score: f64,
}

/// Highest scores first; equal scores ordered naturally by code.
pub fn top_n(mut entries: Vec<ScoredEntry>, n: usize) -> Vec<ScoredEntry> {
    entries.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| natural_cmp(&a.code, &b.code))
    });
    entries.truncate(n);
    entries
}

/// Optional filters applied to grade records.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportScope {
    #[serde(default)]
    pub program_id: Option<i64>,
    #[serde(default)]
    pub course_id: Option<i64>,
    #[serde(default)]
    pub period: Option<String>,
}

/// Per-student CPL scores: each CPMK score (mean of the student's grades)
/// weighted by its CPMK->CPL bobot. Students without grades are absent.
pub fn student_outcome_scores(conn: &Connection, outcome_id: i64, scope: &ReportScope) -> EngineResult<Vec<(i64, f64)>> {
    let mut stmt = conn.prepare(
        "SELECT g.student_id, AVG(g.score), m.weight
         FROM grade_records g
         JOIN outcome_mappings m ON m.course_outcome_id = g.course_outcome_id
         JOIN course_outcomes co ON co.id = g.course_outcome_id
         JOIN courses c ON c.id = co.course_id
         WHERE m.outcome_id = ?1
           AND (?2 IS NULL OR c.program_id = ?2)
           AND (?3 IS NULL OR c.id = ?3)
           AND (?4 IS NULL OR g.period = ?4)
         GROUP BY g.student_id, g.course_outcome_id",
    )?;
    let rows = stmt.query_map(
        params![outcome_id, scope.program_id, scope.course_id, scope.period],
        |r| Ok((r.get::<_, i64>(0)?, r.get::<_, f64>(1)?, r.get::<_, f64>(2)?)),
    )?;

    let mut parts: BTreeMap<i64, Vec<(f64, f64)>> = BTreeMap::new();
    for r in rows {
        let (student, score, weight) = r?;
        parts.entry(student).or_default().push((score, weight));
    }
    Ok(parts
        .into_iter()
        .filter_map(|(student, p)| weighted_score(&p).map(|s| (student, s)))
        .collect())
}

/// Achievement of one CPL in `scope`: actual is the mean student score.
pub fn outcome_achievement(conn: &Connection, outcome_id: i64, scope: &ReportScope, pass_threshold: f64) -> EngineResult<Achievement> {
    let outcome = queries::get_outcome(conn, outcome_id)?
        .filter(|o| o.is_active)
        .ok_or_else(|| EngineError::NotFound(format!("CPL {}", outcome_id)))?;
    let scores: Vec<f64> = student_outcome_scores(conn, outcome_id, scope)?.into_iter().map(|(_, s)| s).collect();
    let actual = average_or_zero(&scores);
    Ok(achievement_status(outcome.target, actual, &scores, pass_threshold))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodScore {
    pub period: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendReport {
    pub outcome_id: i64,
    pub periods: Vec<PeriodScore>,
    pub trend: Trend,
}

/// Mean CPL score per period, periods in natural order, plus the trend.
pub fn outcome_trend(conn: &Connection, outcome_id: i64, program_id: Option<i64>) -> EngineResult<TrendReport> {
    let mut stmt = conn.prepare(
        "SELECT DISTINCT g.period FROM grade_records g
         JOIN outcome_mappings m ON m.course_outcome_id = g.course_outcome_id
         WHERE m.outcome_id = ?1",
    )?;
    let mut periods: Vec<String> = stmt
        .query_map(params![outcome_id], |r| r.get::<_, String>(0))?
        .collect::<Result<_, _>>()?;
    periods.sort_by(|a, b| natural_cmp(a, b));

    let mut out = Vec::with_capacity(periods.len());
    for period in periods {
        let scope = ReportScope { program_id, course_id: None, period: Some(period.clone()) };
        let scores: Vec<f64> = student_outcome_scores(conn, outcome_id, &scope)?.into_iter().map(|(_, s)| s).collect();
        if scores.is_empty() {
            continue;
        }
        out.push(PeriodScore { period, score: average_or_zero(&scores) });
    }
    let series: Vec<f64> = out.iter().map(|p| p.score).collect();
    Ok(TrendReport { outcome_id, trend: trend(&series), periods: out })
}

/// Mean of the student's scores over the profile's CPL that have a score;
/// 0 when none of them do.
pub fn profile_achievement(conn: &Connection, profile_id: i64, student_id: i64) -> EngineResult<f64> {
    let profile = queries::get_profile(conn, profile_id)?
        .ok_or_else(|| EngineError::NotFound(format!("profile {}", profile_id)))?;
    let mut scores = Vec::new();
    for outcome_id in &profile.outcome_ids {
        let per_student = student_outcome_scores(conn, *outcome_id, &ReportScope::default())?;
        if let Some((_, s)) = per_student.into_iter().find(|(sid, _)| *sid == student_id) {
            scores.push(s);
        }
    }
    Ok(average_or_zero(&scores))
}

/// Top `n` active CPL of a program by mean student score.
pub fn top_outcomes(conn: &Connection, program_id: i64, n: usize) -> EngineResult<Vec<ScoredEntry>> {
    let scope = ReportScope { program_id: Some(program_id), ..Default::default() };
    let mut entries = Vec::new();
    for outcome in queries::list_outcomes(conn, program_id)? {
        let scores: Vec<f64> = student_outcome_scores(conn, outcome.id, &scope)?.into_iter().map(|(_, s)| s).collect();
        entries.push(ScoredEntry { id: outcome.id, code: outcome.code, score: average_or_zero(&scores) });
    }
    Ok(top_n(entries, n))
}

/// "Total bobot" of one CPMK across its three weighted child kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightSummary {
    pub course_outcome_id: i64,
    pub cpl: Allowance,
    pub techniques: Allowance,
    pub sub_outcomes: Allowance,
    /// Remaining bobot per Sub-CPMK id.
    pub sub_outcome_remaining: HashMap<i64, f64>,
}

pub fn weight_summary(conn: &Connection, course_outcome_id: i64) -> EngineResult<WeightSummary> {
    queries::get_course_outcome(conn, course_outcome_id)?
        .filter(|c| c.is_active)
        .ok_or_else(|| EngineError::NotFound(format!("CPMK {}", course_outcome_id)))?;
    let ledger = WeightLedger::new(conn);
    let mut sub_outcome_remaining = HashMap::new();
    for sub in queries::list_sub_outcomes(conn, course_outcome_id)? {
        sub_outcome_remaining.insert(sub.id, ledger.remaining(Scope::SubOutcomeAssessments(sub.id), None)?);
    }
    Ok(WeightSummary {
        course_outcome_id,
        cpl: ledger.allowance(Scope::CplMappings(course_outcome_id), None)?,
        techniques: ledger.allowance(Scope::Techniques(course_outcome_id), None)?,
        sub_outcomes: ledger.allowance(Scope::SubOutcomes(course_outcome_id), None)?,
        sub_outcome_remaining,
    })
}
