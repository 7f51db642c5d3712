use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};

use crate::db::{
    helpers::{ms_to_seconds, parse_datetime, seconds_to_ms, to_i64, to_u64},
    models::StoredSession,
    Database,
};
use crate::models::{IntervalRuntimeState, PositionSample, SessionSummary};

fn row_to_stored_session(row: &Row) -> Result<StoredSession> {
    let started_at: String = row.get("started_at")?;
    let stopped_at: String = row.get("stopped_at")?;
    let active_ms: i64 = row.get("active_ms")?;
    let sample_count: i64 = row.get("sample_count")?;

    Ok(StoredSession {
        id: row.get("id")?,
        started_at: parse_datetime(&started_at, "started_at")?,
        stopped_at: parse_datetime(&stopped_at, "stopped_at")?,
        duration_seconds: ms_to_seconds(to_u64(active_ms, "active_ms")?),
        distance_meters: row.get("distance_meters")?,
        average_pace_seconds_per_km: row.get("average_pace_s_per_km")?,
        sample_count: to_u64(sample_count, "sample_count")?,
        notes: row.get("notes")?,
    })
}

fn row_to_sample(row: &Row) -> rusqlite::Result<PositionSample> {
    Ok(PositionSample {
        latitude: row.get("latitude")?,
        longitude: row.get("longitude")?,
        captured_at_millis: row.get("captured_at_ms")?,
        accuracy_meters: row.get("accuracy_meters")?,
    })
}

impl Database {
    /// Writes a finished session and its accepted samples in one transaction.
    pub async fn insert_session_summary(&self, summary: &SessionSummary) -> Result<()> {
        let record = summary.clone();
        self.execute(move |conn| {
            let interval_json = record
                .interval
                .as_ref()
                .map(serde_json::to_string)
                .transpose()
                .context("failed to encode interval state")?;

            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO sessions (id, started_at, stopped_at, active_ms, paused_ms, distance_meters,
                                       average_pace_s_per_km, rejected_samples, notes, interval_json, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.id,
                    record.started_at.to_rfc3339(),
                    record.stopped_at.to_rfc3339(),
                    to_i64(seconds_to_ms(record.duration_seconds))?,
                    to_i64(seconds_to_ms(record.paused_seconds))?,
                    record.distance_meters,
                    record.average_pace_seconds_per_km,
                    to_i64(record.rejected_samples)?,
                    record.notes,
                    interval_json,
                    Utc::now().to_rfc3339(),
                ],
            )
            .with_context(|| format!("failed to insert session {}", record.id))?;

            {
                let mut stmt = tx.prepare(
                    "INSERT INTO session_samples (session_id, seq, latitude, longitude, captured_at_ms, accuracy_meters)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )?;
                for (seq, sample) in record.samples.iter().enumerate() {
                    stmt.execute(params![
                        record.id,
                        seq as i64,
                        sample.latitude,
                        sample.longitude,
                        sample.captured_at_millis,
                        sample.accuracy_meters,
                    ])?;
                }
            }

            tx.commit().context("failed to commit session insert")?;
            Ok(())
        })
        .await
    }

    pub async fn list_sessions(&self) -> Result<Vec<StoredSession>> {
        self.execute(|conn| {
            let mut stmt = conn.prepare(
                "SELECT s.id, s.started_at, s.stopped_at, s.active_ms, s.distance_meters,
                        s.average_pace_s_per_km, s.notes,
                        (SELECT COUNT(*) FROM session_samples p WHERE p.session_id = s.id) AS sample_count
                 FROM sessions s
                 ORDER BY s.started_at DESC",
            )?;

            let mut rows = stmt.query([])?;
            let mut sessions = Vec::new();
            while let Some(row) = rows.next()? {
                sessions.push(row_to_stored_session(row)?);
            }
            Ok(sessions)
        })
        .await
    }

    /// Reassembles the full summary, samples included.
    pub async fn get_session_summary(&self, session_id: &str) -> Result<Option<SessionSummary>> {
        let session_id = session_id.to_string();
        self.execute(move |conn| {
            let header = conn
                .query_row(
                    "SELECT id, started_at, stopped_at, active_ms, paused_ms, distance_meters,
                            average_pace_s_per_km, rejected_samples, notes, interval_json
                     FROM sessions
                     WHERE id = ?1",
                    params![session_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, i64>(4)?,
                            row.get::<_, f64>(5)?,
                            row.get::<_, Option<f64>>(6)?,
                            row.get::<_, i64>(7)?,
                            row.get::<_, Option<String>>(8)?,
                            row.get::<_, Option<String>>(9)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, started_at, stopped_at, active_ms, paused_ms, distance, pace, rejected, notes, interval_json)) =
                header
            else {
                return Ok(None);
            };

            let mut stmt = conn.prepare(
                "SELECT latitude, longitude, captured_at_ms, accuracy_meters
                 FROM session_samples
                 WHERE session_id = ?1
                 ORDER BY seq ASC",
            )?;
            let samples = stmt
                .query_map(params![id], row_to_sample)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let interval = interval_json
                .map(|raw| serde_json::from_str::<IntervalRuntimeState>(&raw))
                .transpose()
                .map_err(|err| anyhow!("invalid interval_json for session {id}: {err}"))?;

            Ok(Some(SessionSummary {
                started_at: parse_datetime(&started_at, "started_at")?,
                stopped_at: parse_datetime(&stopped_at, "stopped_at")?,
                duration_seconds: ms_to_seconds(to_u64(active_ms, "active_ms")?),
                paused_seconds: ms_to_seconds(to_u64(paused_ms, "paused_ms")?),
                distance_meters: distance,
                average_pace_seconds_per_km: pace,
                rejected_samples: to_u64(rejected, "rejected_samples")?,
                samples,
                interval,
                notes,
                id,
            }))
        })
        .await
    }
}
