//! The per-user passport ledger.
//!
//! `log_exposure` is the only write path that touches points and streaks:
//! it scores the event, applies the day-boundary streak transition, awards
//! points, and persists the event plus the updated profile in one IMMEDIATE
//! transaction. A crash can therefore never leave points moved without the
//! event recorded, or the reverse.
//!
//! Streak calendar dates are always computed in UTC. One fixed zone
//! system-wide keeps day boundaries identical across every code path.

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use haze_map_geo::GeoPoint;
use haze_map_passport_models::{
    DailyInsight, ExposureEvent, InsightsSummary, LogOutcome, Passport, PollutantReadings,
    Profile, RiskLevel, ScoreBreakdown, TravelMode,
};
use rusqlite::{Connection, Row, TransactionBehavior, params};

use crate::{LedgerError, db, scoring};

/// Flat points awarded for every logged event.
const BASE_POINTS: u64 = 10;

/// Size of the insights rolling window.
const INSIGHTS_WINDOW_DAYS: u32 = 7;

/// One exposure log request, before scoring.
#[derive(Debug, Clone)]
pub struct ExposureLog {
    /// Owning user.
    pub user_key: String,
    /// Where the exposure happened.
    pub location: GeoPoint,
    /// Human-readable place label.
    pub location_name: String,
    /// Supplied pollutant readings.
    pub readings: PollutantReadings,
    /// Travel mode at log time.
    pub mode: TravelMode,
    /// When the exposure happened; `None` means "now".
    pub recorded_at: Option<DateTime<Utc>>,
}

/// Durable per-user passport state over SQLite.
pub struct PassportLedger {
    conn: Mutex<Connection>,
}

impl PassportLedger {
    /// Opens (or creates) the ledger database at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the file or schema cannot be created.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        Ok(Self {
            conn: Mutex::new(db::open(path)?),
        })
    }

    /// Opens a fresh in-memory ledger.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, LedgerError> {
        Ok(Self {
            conn: Mutex::new(db::open_in_memory()?),
        })
    }

    /// Scores and records one exposure event, applying the streak and
    /// points transitions.
    ///
    /// A busy/locked conflict is retried internally once with a fresh
    /// read; a second conflict surfaces as [`LedgerError::Conflict`].
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on storage failure or unresolved conflict.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn log_exposure(&self, log: &ExposureLog) -> Result<LogOutcome, LedgerError> {
        let recorded_at = log.recorded_at.unwrap_or_else(Utc::now);
        let breakdown = scoring::score_exposure(&log.readings);

        let mut retried = false;
        loop {
            match self.try_log(log, recorded_at, &breakdown) {
                Err(LedgerError::Sqlite(e)) if is_busy(&e) => {
                    if retried {
                        return Err(LedgerError::Conflict);
                    }
                    log::warn!(
                        "passport write conflict for {}, retrying once",
                        log.user_key
                    );
                    retried = true;
                }
                other => return other,
            }
        }
    }

    fn try_log(
        &self,
        log: &ExposureLog,
        recorded_at: DateTime<Utc>,
        breakdown: &ScoreBreakdown,
    ) -> Result<LogOutcome, LedgerError> {
        let mut conn = self.conn.lock().expect("ledger lock poisoned");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut profile = load_profile(&tx, &log.user_key)?
            .unwrap_or_else(|| Profile::new(log.user_key.clone()));

        let today = event_date(recorded_at);
        profile.streak = next_streak(profile.last_active_date, profile.streak, today);
        profile.best_streak = profile.best_streak.max(profile.streak);
        profile.last_active_date = Some(today);
        profile.points += BASE_POINTS + points_bonus(breakdown.score);

        let event = ExposureEvent {
            id: uuid::Uuid::new_v4().to_string(),
            user_key: log.user_key.clone(),
            location: log.location,
            location_name: log.location_name.clone(),
            readings: log.readings,
            mode: log.mode,
            recorded_at,
            score: breakdown.score,
            risk_level: breakdown.risk_level,
            tips: breakdown.tips.clone(),
        };

        upsert_profile(&tx, &profile)?;
        insert_event(&tx, &event)?;
        tx.commit()?;

        Ok(LogOutcome {
            score: breakdown.score,
            risk_level: breakdown.risk_level,
            tips: breakdown.tips.clone(),
            streak: profile.streak,
            best_streak: profile.best_streak,
            points: profile.points,
        })
    }

    /// Returns the profile plus the `limit` most recent events, newest
    /// first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownUser`] if no profile exists.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn passport(&self, user_key: &str, limit: usize) -> Result<Passport, LedgerError> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        let profile = load_profile(&conn, user_key)?.ok_or_else(|| LedgerError::UnknownUser {
            user_key: user_key.to_string(),
        })?;

        let mut stmt = conn.prepare(
            "SELECT id, user_key, lat, lon, location_name, pm25, no2, co, mode,
                    recorded_at, score, risk_level, tips
             FROM exposure_events
             WHERE user_key = ?1
             ORDER BY recorded_at DESC
             LIMIT ?2",
        )?;
        let mut rows = stmt.query(params![user_key, i64::try_from(limit).unwrap_or(i64::MAX)])?;

        let mut recent_events = Vec::new();
        while let Some(row) = rows.next()? {
            recent_events.push(event_from_row(row)?);
        }

        Ok(Passport {
            profile,
            recent_events,
        })
    }

    /// Creates the profile if absent and updates its identity fields.
    /// Points, streaks, and history are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on storage failure.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn ensure_profile(
        &self,
        user_key: &str,
        nickname: Option<&str>,
        home_city: Option<&str>,
    ) -> Result<Profile, LedgerError> {
        let mut conn = self.conn.lock().expect("ledger lock poisoned");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut profile = load_profile(&tx, user_key)?
            .unwrap_or_else(|| Profile::new(user_key.to_string()));
        if let Some(nickname) = nickname {
            profile.nickname = Some(nickname.to_string());
        }
        if let Some(home_city) = home_city {
            profile.home_city = Some(home_city.to_string());
        }

        upsert_profile(&tx, &profile)?;
        tx.commit()?;
        Ok(profile)
    }

    /// Rolling aggregation over the last [`INSIGHTS_WINDOW_DAYS`] days of
    /// history, evaluated against the current time.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownUser`] if no profile exists.
    pub fn insights(&self, user_key: &str) -> Result<InsightsSummary, LedgerError> {
        self.insights_at(user_key, Utc::now())
    }

    /// [`PassportLedger::insights`] with an explicit evaluation time.
    /// A pure aggregation over persisted events; no side effects.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::UnknownUser`] if no profile exists.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn insights_at(
        &self,
        user_key: &str,
        now: DateTime<Utc>,
    ) -> Result<InsightsSummary, LedgerError> {
        let conn = self.conn.lock().expect("ledger lock poisoned");
        if load_profile(&conn, user_key)?.is_none() {
            return Err(LedgerError::UnknownUser {
                user_key: user_key.to_string(),
            });
        }

        let since = now - chrono::Duration::days(i64::from(INSIGHTS_WINDOW_DAYS));
        let mut stmt = conn.prepare(
            "SELECT recorded_at, score FROM exposure_events
             WHERE user_key = ?1 AND recorded_at >= ?2
             ORDER BY recorded_at ASC",
        )?;
        let mut rows = stmt.query(params![user_key, format_timestamp(since)])?;

        let mut by_day: std::collections::BTreeMap<NaiveDate, (f64, u64)> =
            std::collections::BTreeMap::new();
        let mut total_score = 0.0;
        let mut event_count: u64 = 0;

        while let Some(row) = rows.next()? {
            let recorded_at = parse_timestamp(&row.get::<_, String>(0)?)?;
            let score: f64 = row.get(1)?;
            let entry = by_day.entry(event_date(recorded_at)).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
            total_score += score;
            event_count += 1;
        }

        let daily = by_day
            .into_iter()
            .map(|(date, (sum, count))| {
                #[allow(clippy::cast_precision_loss)]
                let average_score = sum / count as f64;
                DailyInsight {
                    date,
                    average_score,
                    event_count: count,
                }
            })
            .collect();

        #[allow(clippy::cast_precision_loss)]
        let average_score = (event_count > 0).then(|| total_score / event_count as f64);

        Ok(InsightsSummary {
            window_days: INSIGHTS_WINDOW_DAYS,
            event_count,
            average_score,
            risk_level: average_score.map(RiskLevel::from_score),
            daily,
        })
    }

    /// Administrative reset: deletes the profile and its whole history.
    /// Idempotent for unknown users.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] on storage failure.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    pub fn reset_profile(&self, user_key: &str) -> Result<(), LedgerError> {
        let mut conn = self.conn.lock().expect("ledger lock poisoned");
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "DELETE FROM exposure_events WHERE user_key = ?1",
            params![user_key],
        )?;
        tx.execute("DELETE FROM profiles WHERE user_key = ?1", params![user_key])?;
        tx.commit()?;
        Ok(())
    }
}

/// Calendar date of an event for streak purposes. Always UTC.
fn event_date(recorded_at: DateTime<Utc>) -> NaiveDate {
    recorded_at.date_naive()
}

/// The day-boundary streak transition.
///
/// Same day again: unchanged. Exactly yesterday: extend. A gap of two or
/// more days, or no prior activity: reset to 1.
fn next_streak(last_active: Option<NaiveDate>, streak: u32, today: NaiveDate) -> u32 {
    match last_active {
        Some(last) if last == today => streak,
        Some(last) if today.pred_opt() == Some(last) => streak + 1,
        _ => 1,
    }
}

/// Bonus points scaled to the exposure score: cleaner air, bigger reward.
fn points_bonus(score: f64) -> u64 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let bonus = (score.clamp(0.0, 100.0) / 10.0).round() as u64;
    bonus
}

fn format_timestamp(ts: DateTime<Utc>) -> String {
    // Fixed-width micros so lexicographic TEXT comparisons in SQL match
    // chronological order.
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, LedgerError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| LedgerError::Corrupt {
            message: format!("bad timestamp {raw:?}: {e}"),
        })
}

fn parse_date(raw: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|e| LedgerError::Corrupt {
        message: format!("bad date {raw:?}: {e}"),
    })
}

fn is_busy(error: &rusqlite::Error) -> bool {
    matches!(
        error.sqlite_error_code(),
        Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked)
    )
}

fn load_profile(conn: &Connection, user_key: &str) -> Result<Option<Profile>, LedgerError> {
    let mut stmt = conn.prepare(
        "SELECT user_key, nickname, home_city, points, streak, best_streak, last_active_date
         FROM profiles WHERE user_key = ?1",
    )?;
    let mut rows = stmt.query(params![user_key])?;
    match rows.next()? {
        Some(row) => Ok(Some(profile_from_row(row)?)),
        None => Ok(None),
    }
}

fn profile_from_row(row: &Row<'_>) -> Result<Profile, LedgerError> {
    let points: i64 = row.get(3)?;
    let last_active_date = row
        .get::<_, Option<String>>(6)?
        .map(|raw| parse_date(&raw))
        .transpose()?;

    Ok(Profile {
        user_key: row.get(0)?,
        nickname: row.get(1)?,
        home_city: row.get(2)?,
        points: u64::try_from(points).map_err(|_| LedgerError::Corrupt {
            message: format!("negative points {points}"),
        })?,
        streak: row.get(4)?,
        best_streak: row.get(5)?,
        last_active_date,
    })
}

fn upsert_profile(conn: &Connection, profile: &Profile) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO profiles
            (user_key, nickname, home_city, points, streak, best_streak, last_active_date)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(user_key) DO UPDATE SET
            nickname = excluded.nickname,
            home_city = excluded.home_city,
            points = excluded.points,
            streak = excluded.streak,
            best_streak = excluded.best_streak,
            last_active_date = excluded.last_active_date",
        params![
            profile.user_key,
            profile.nickname,
            profile.home_city,
            i64::try_from(profile.points).unwrap_or(i64::MAX),
            profile.streak,
            profile.best_streak,
            profile.last_active_date.map(|d| d.to_string()),
        ],
    )?;
    Ok(())
}

fn insert_event(conn: &Connection, event: &ExposureEvent) -> Result<(), LedgerError> {
    conn.execute(
        "INSERT INTO exposure_events
            (id, user_key, lat, lon, location_name, pm25, no2, co, mode,
             recorded_at, score, risk_level, tips)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            event.id,
            event.user_key,
            event.location.lat,
            event.location.lon,
            event.location_name,
            event.readings.pm25,
            event.readings.no2,
            event.readings.co,
            event.mode.to_string(),
            format_timestamp(event.recorded_at),
            event.score,
            event.risk_level.to_string(),
            serde_json::to_string(&event.tips)?,
        ],
    )?;
    Ok(())
}

fn event_from_row(row: &Row<'_>) -> Result<ExposureEvent, LedgerError> {
    let lat: f64 = row.get(2)?;
    let lon: f64 = row.get(3)?;
    let location = GeoPoint::new(lat, lon).map_err(|e| LedgerError::Corrupt {
        message: e.to_string(),
    })?;

    let mode: String = row.get(8)?;
    let risk_level: String = row.get(11)?;
    let tips: String = row.get(12)?;

    Ok(ExposureEvent {
        id: row.get(0)?,
        user_key: row.get(1)?,
        location,
        location_name: row.get(4)?,
        readings: PollutantReadings {
            pm25: row.get(5)?,
            no2: row.get(6)?,
            co: row.get(7)?,
        },
        mode: mode.parse().unwrap_or(TravelMode::Unknown),
        recorded_at: parse_timestamp(&row.get::<_, String>(9)?)?,
        score: row.get(10)?,
        risk_level: risk_level.parse().map_err(|_| LedgerError::Corrupt {
            message: format!("bad risk level {risk_level:?}"),
        })?,
        tips: serde_json::from_str(&tips)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone as _;

    use super::*;

    fn ledger() -> PassportLedger {
        PassportLedger::open_in_memory().unwrap()
    }

    fn log_at(day: u32, hour: u32) -> ExposureLog {
        ExposureLog {
            user_key: "u1".to_string(),
            location: GeoPoint::new(3.139, 101.6869).unwrap(),
            location_name: "Jalan Ampang".to_string(),
            readings: PollutantReadings {
                pm25: Some(10.0),
                no2: None,
                co: None,
            },
            mode: TravelMode::Walk,
            recorded_at: Some(Utc.with_ymd_and_hms(2026, 8, day, hour, 0, 0).unwrap()),
        }
    }

    #[test]
    fn streak_extends_daily_and_resets_after_a_gap() {
        let ledger = ledger();

        let day1 = ledger.log_exposure(&log_at(1, 9)).unwrap();
        assert_eq!(day1.streak, 1);
        assert_eq!(day1.best_streak, 1);

        let day2 = ledger.log_exposure(&log_at(2, 9)).unwrap();
        assert_eq!(day2.streak, 2);
        assert_eq!(day2.best_streak, 2);

        // Day 3 skipped entirely.
        let day4 = ledger.log_exposure(&log_at(4, 9)).unwrap();
        assert_eq!(day4.streak, 1);
        assert_eq!(day4.best_streak, 2);
    }

    #[test]
    fn same_day_logs_award_points_but_not_streak() {
        let ledger = ledger();

        let first = ledger.log_exposure(&log_at(1, 9)).unwrap();
        let second = ledger.log_exposure(&log_at(1, 18)).unwrap();

        assert_eq!(first.streak, 1);
        assert_eq!(second.streak, 1);
        assert!(second.points > first.points);
        // pm25=10 scores 95, bonus 10: two logs of 20 points each.
        assert_eq!(second.points, 40);
    }

    #[test]
    fn points_only_increase() {
        let ledger = ledger();
        let mut last = 0;
        for day in 1..=5 {
            let outcome = ledger.log_exposure(&log_at(day, 12)).unwrap();
            assert!(outcome.points > last);
            last = outcome.points;
        }
    }

    #[test]
    fn event_and_profile_commit_together() {
        let ledger = ledger();
        ledger.log_exposure(&log_at(1, 9)).unwrap();

        let passport = ledger.passport("u1", 10).unwrap();
        assert_eq!(passport.profile.points, 20);
        assert_eq!(passport.recent_events.len(), 1);

        let event = &passport.recent_events[0];
        assert_eq!(event.user_key, "u1");
        assert_eq!(event.location_name, "Jalan Ampang");
        assert_eq!(event.readings.pm25, Some(10.0));
        assert_eq!(event.mode, TravelMode::Walk);
        assert!((event.score - 95.0).abs() < 1e-9);
        assert_eq!(event.risk_level, RiskLevel::Low);
        assert!(!event.tips.is_empty());
    }

    #[test]
    fn passport_returns_newest_first_up_to_limit() {
        let ledger = ledger();
        for day in 1..=4 {
            ledger.log_exposure(&log_at(day, 9)).unwrap();
        }

        let passport = ledger.passport("u1", 2).unwrap();
        assert_eq!(passport.recent_events.len(), 2);
        assert!(
            passport.recent_events[0].recorded_at > passport.recent_events[1].recorded_at
        );
    }

    #[test]
    fn unknown_user_is_an_explicit_error() {
        let ledger = ledger();
        assert!(matches!(
            ledger.passport("ghost", 10),
            Err(LedgerError::UnknownUser { .. })
        ));
        assert!(matches!(
            ledger.insights("ghost"),
            Err(LedgerError::UnknownUser { .. })
        ));
    }

    #[test]
    fn ensure_profile_creates_and_updates_identity_only() {
        let ledger = ledger();

        let created = ledger.ensure_profile("u2", Some("Aina"), None).unwrap();
        assert_eq!(created.nickname.as_deref(), Some("Aina"));
        assert_eq!(created.points, 0);

        let updated = ledger
            .ensure_profile("u2", None, Some("Kuala Lumpur"))
            .unwrap();
        assert_eq!(updated.nickname.as_deref(), Some("Aina"));
        assert_eq!(updated.home_city.as_deref(), Some("Kuala Lumpur"));
        assert_eq!(updated.points, 0);
    }

    #[test]
    fn insights_cover_only_the_rolling_window() {
        let ledger = ledger();
        ledger.log_exposure(&log_at(1, 9)).unwrap(); // outside the window
        ledger.log_exposure(&log_at(9, 9)).unwrap();
        ledger.log_exposure(&log_at(9, 15)).unwrap();
        ledger.log_exposure(&log_at(10, 9)).unwrap();

        let now = Utc.with_ymd_and_hms(2026, 8, 10, 12, 0, 0).unwrap();
        let insights = ledger.insights_at("u1", now).unwrap();

        assert_eq!(insights.window_days, 7);
        assert_eq!(insights.event_count, 3);
        assert_eq!(insights.daily.len(), 2);
        assert_eq!(insights.daily[0].event_count, 2);
        assert_eq!(insights.daily[1].event_count, 1);
        // Every log scores 95 here.
        assert_eq!(insights.average_score, Some(95.0));
        assert_eq!(insights.risk_level, Some(RiskLevel::Low));
    }

    #[test]
    fn reset_profile_removes_state_and_history() {
        let ledger = ledger();
        ledger.log_exposure(&log_at(1, 9)).unwrap();

        ledger.reset_profile("u1").unwrap();
        assert!(matches!(
            ledger.passport("u1", 10),
            Err(LedgerError::UnknownUser { .. })
        ));

        // Idempotent for unknown users.
        ledger.reset_profile("u1").unwrap();
    }

    #[test]
    fn streak_transition_table() {
        let today = NaiveDate::from_ymd_opt(2026, 8, 7).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2026, 8, 6).unwrap();
        let last_week = NaiveDate::from_ymd_opt(2026, 7, 31).unwrap();

        assert_eq!(next_streak(None, 0, today), 1);
        assert_eq!(next_streak(Some(yesterday), 3, today), 4);
        assert_eq!(next_streak(Some(today), 3, today), 3);
        assert_eq!(next_streak(Some(last_week), 9, today), 1);
    }

    #[test]
    fn bonus_scales_with_score() {
        assert_eq!(points_bonus(100.0), 10);
        assert_eq!(points_bonus(95.0), 10);
        assert_eq!(points_bonus(72.0), 7);
        assert_eq!(points_bonus(0.0), 0);
    }
}
