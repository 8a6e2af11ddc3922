//! [`SqliteStore`], the SQLite implementation of [`HoldStore`].

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;
use venuehold_core::{
  queue::{QueueStatus, WaitingQueueEntry},
  reservation::{ConfirmedBooking, ConversionRecord, TemporaryReservation},
  score::VendorActivity,
  slot::SlotKey,
  store::{HoldStore, QueueQuery, QueueTransition, ReservationQuery, ReservationTransition},
};

use crate::{
  encode::{
    decode_dt, decode_uuid, encode_dt, encode_slot, encode_uuid, slot_columns, RawBooking,
    RawQueueEntry, RawReservation, SlotColumns, QUEUE_COLUMNS, RESERVATION_COLUMNS, SLOT_MATCH,
  },
  schema::SCHEMA,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A venuehold store backed by a single SQLite file.
///
/// Clones share one reference-counted connection.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Collaborator-owned rows ───────────────────────────────────────────────

  /// Insert or update a vendor account. Vendors are managed by the wider
  /// CRM; the engine only reads their creation date for scoring.
  pub async fn upsert_vendor(
    &self,
    vendor_id:  Uuid,
    name:       &str,
    created_at: DateTime<Utc>,
  ) -> Result<()> {
    let id_str = encode_uuid(vendor_id);
    let name   = name.to_owned();
    let at_str = encode_dt(created_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO vendors (vendor_id, name, created_at) VALUES (?1, ?2, ?3)
           ON CONFLICT (vendor_id) DO UPDATE SET name = excluded.name,
                                                 created_at = excluded.created_at",
          rusqlite::params![id_str, name, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Record a confirmed booking. Bookings are managed by the wider CRM.
  pub async fn insert_confirmed_booking(&self, booking: &ConfirmedBooking) -> Result<()> {
    let id_str = encode_uuid(booking.booking_id);
    let slot   = encode_slot(&booking.slot);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO confirmed_bookings
             (booking_id, space_id, date_start, date_end, time_start, time_end)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          rusqlite::params![
            id_str,
            slot.space_id,
            slot.date_start,
            slot.date_end,
            slot.time_start,
            slot.time_end,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// The audit row written when `reservation_id` was converted, if any.
  pub async fn conversion_for(&self, reservation_id: Uuid) -> Result<Option<ConversionRecord>> {
    let id_str = encode_uuid(reservation_id);

    let raw: Option<(String, String, String, String, String, f64)> = self
      .conn
      .call(move |conn| {
        let row = conn
          .query_row(
            "SELECT conversion_id, reservation_id, proposal_id, vendor_id,
                    converted_at, conversion_time_hours
             FROM reservation_conversions WHERE reservation_id = ?1",
            rusqlite::params![id_str],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?, r.get(4)?, r.get(5)?)),
          )
          .optional()?;
        Ok(row)
      })
      .await?;

    raw
      .map(|(cid, rid, proposal_id, vid, at, hours)| {
        Ok(ConversionRecord {
          conversion_id: decode_uuid(&cid)?,
          reservation_id: decode_uuid(&rid)?,
          proposal_id,
          vendor_id: decode_uuid(&vid)?,
          converted_at: decode_dt(&at)?,
          conversion_time_hours: hours,
        })
      })
      .transpose()
  }
}

/// Build a `WHERE` clause from `AND`-ed conditions; empty when unfiltered.
/// Leave the slot of reservation `?2` pending, freed at `?1`. An existing
/// record keeps its original time.
const MARK_PENDING: &str = "
  INSERT OR IGNORE INTO pending_slot_notifications
    (space_id, date_start, date_end, time_start, time_end, freed_at)
  SELECT space_id, date_start, date_end, time_start, time_end, ?1
  FROM temporary_reservations WHERE reservation_id = ?2";

/// Settle the pending record for the slot of queue entry `?1`.
const SETTLE_FOR_ENTRY: &str = "
  DELETE FROM pending_slot_notifications
  WHERE (space_id, date_start, date_end, time_start, time_end) = (
    SELECT space_id, date_start, date_end, time_start, time_end
    FROM waiting_queue_entries WHERE entry_id = ?1
  )";

fn where_clause(conds: &[String]) -> String {
  if conds.is_empty() {
    String::new()
  } else {
    format!("WHERE {}", conds.join(" AND "))
  }
}

// ─── HoldStore impl ──────────────────────────────────────────────────────────

impl HoldStore for SqliteStore {
  type Error = crate::Error;

  // ── Reservations ──────────────────────────────────────────────────────────

  async fn insert_reservation(&self, r: TemporaryReservation) -> Result<bool> {
    let id_str       = encode_uuid(r.id);
    let client_str   = encode_uuid(r.client_id);
    let vendor_str   = encode_uuid(r.vendor_id);
    let slot         = encode_slot(&r.slot);
    let value_str    = r.estimated_value.to_string();
    let status_str   = r.status.as_ref().to_owned();
    let expires_str  = encode_dt(r.expires_at);
    let created_str  = encode_dt(r.created_at);
    let resolved_str = r.resolved_at.map(encode_dt);
    let observations = r.observations;
    let proposal_id  = r.converted_proposal_id;
    let conv_hours   = r.conversion_time_hours;

    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO temporary_reservations (
             reservation_id, client_id, vendor_id,
             space_id, date_start, date_end, time_start, time_end,
             estimated_value, observations, status, expires_at, created_at,
             resolved_at, converted_proposal_id, conversion_time_hours
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
          rusqlite::params![
            id_str,
            client_str,
            vendor_str,
            slot.space_id,
            slot.date_start,
            slot.date_end,
            slot.time_start,
            slot.time_end,
            value_str,
            observations,
            status_str,
            expires_str,
            created_str,
            resolved_str,
            proposal_id,
            conv_hours,
          ],
        )?;
        Ok(n)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn get_reservation(&self, id: Uuid) -> Result<Option<TemporaryReservation>> {
    let id_str = encode_uuid(id);
    let sql = format!(
      "SELECT {RESERVATION_COLUMNS} FROM temporary_reservations WHERE reservation_id = ?1"
    );

    let raw: Option<RawReservation> = self
      .conn
      .call(move |conn| {
        let row = conn
          .query_row(&sql, rusqlite::params![id_str], RawReservation::from_row)
          .optional()?;
        Ok(row)
      })
      .await?;

    raw.map(RawReservation::into_reservation).transpose()
  }

  async fn list_reservations(&self, query: ReservationQuery) -> Result<Vec<TemporaryReservation>> {
    let mut conds: Vec<String> = vec![];
    let mut params: Vec<String> = vec![];

    if let Some(vendor_id) = query.vendor_id {
      conds.push("vendor_id = ?".into());
      params.push(encode_uuid(vendor_id));
    }
    if let Some(slot) = query.slot {
      conds.push(SLOT_MATCH.into());
      params.extend(encode_slot(&slot).as_params().map(str::to_owned));
    }
    if let Some(status) = query.status {
      conds.push("status = ?".into());
      params.push(status.as_ref().to_owned());
    }

    let limit = query.limit.map(|l| format!(" LIMIT {l}")).unwrap_or_default();
    let sql = format!(
      "SELECT {RESERVATION_COLUMNS} FROM temporary_reservations {}
       ORDER BY created_at, reservation_id{limit}",
      where_clause(&conds),
    );

    let raws: Vec<RawReservation> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawReservation::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReservation::into_reservation).collect()
  }

  async fn transition_reservation(&self, t: ReservationTransition) -> Result<bool> {
    let id_str     = encode_uuid(t.id);
    let to_str     = t.to.as_ref().to_owned();
    let at_str     = encode_dt(t.at);
    let conversion = t.conversion;
    let frees_slot = t.frees_slot;

    let applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let proposal_id = conversion.as_ref().map(|c| c.proposal_id.clone());
        let hours = conversion.as_ref().map(|c| c.conversion_time_hours);
        let changed = tx.execute(
          "UPDATE temporary_reservations
           SET status                = ?1,
               resolved_at           = ?2,
               converted_proposal_id = COALESCE(?3, converted_proposal_id),
               conversion_time_hours = COALESCE(?4, conversion_time_hours)
           WHERE reservation_id = ?5 AND status = 'active'",
          rusqlite::params![to_str, at_str, proposal_id, hours, id_str],
        )?;
        if changed == 0 {
          return Ok(false);
        }

        if frees_slot {
          tx.execute(MARK_PENDING, rusqlite::params![at_str, id_str])?;
        }

        if let Some(c) = conversion {
          tx.execute(
            "INSERT INTO reservation_conversions (
               conversion_id, reservation_id, proposal_id, vendor_id,
               converted_at, conversion_time_hours
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
              encode_uuid(c.conversion_id),
              encode_uuid(c.reservation_id),
              c.proposal_id,
              encode_uuid(c.vendor_id),
              encode_dt(c.converted_at),
              c.conversion_time_hours,
            ],
          )?;
        }

        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(applied)
  }

  async fn expire_reservations(&self, ids: Vec<Uuid>, now: DateTime<Utc>) -> Result<Vec<Uuid>> {
    if ids.is_empty() {
      return Ok(vec![]);
    }
    let id_strs: Vec<String> = ids.into_iter().map(encode_uuid).collect();
    let now_str = encode_dt(now);

    let expired: Vec<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut expired = Vec::new();
        {
          let mut stmt = tx.prepare(
            "UPDATE temporary_reservations
             SET status = 'expired', resolved_at = ?1
             WHERE reservation_id = ?2 AND status = 'active' AND expires_at <= ?1",
          )?;
          let mut mark = tx.prepare(MARK_PENDING)?;
          for id in id_strs {
            if stmt.execute(rusqlite::params![now_str, id])? == 1 {
              mark.execute(rusqlite::params![now_str, id])?;
              expired.push(id);
            }
          }
        }
        tx.commit()?;
        Ok(expired)
      })
      .await?;

    expired.iter().map(|s| decode_uuid(s)).collect()
  }

  async fn overlapping_bookings(&self, slot: SlotKey) -> Result<Vec<ConfirmedBooking>> {
    let cols = encode_slot(&slot);

    let raws: Vec<RawBooking> = self
      .conn
      .call(move |conn| {
        // Coarse date filter here; the time window is checked in Rust.
        let mut stmt = conn.prepare(
          "SELECT booking_id, space_id, date_start, date_end, time_start, time_end
           FROM confirmed_bookings
           WHERE space_id = ?1 AND date_start <= ?2 AND date_end >= ?3",
        )?;
        let rows = stmt
          .query_map(
            rusqlite::params![cols.space_id, cols.date_end, cols.date_start],
            |row| {
              Ok(RawBooking {
                booking_id: row.get(0)?,
                slot:       slot_columns(row, 1)?,
              })
            },
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let bookings = raws
      .into_iter()
      .map(RawBooking::into_booking)
      .collect::<Result<Vec<_>>>()?;
    Ok(bookings.into_iter().filter(|b| b.slot.overlaps(&slot)).collect())
  }

  // ── Queue entries ─────────────────────────────────────────────────────────

  async fn insert_queue_entry(&self, e: WaitingQueueEntry) -> Result<bool> {
    let id_str      = encode_uuid(e.id);
    let vendor_str  = encode_uuid(e.vendor_id);
    let slot        = encode_slot(&e.slot);
    let position    = e.position.map(i64::from);
    let score       = e.score;
    let status_str  = e.status.as_ref().to_owned();
    let created_str = encode_dt(e.created_at);
    let notified    = e.notified_at.map(encode_dt);
    let removed     = e.removed_at.map(encode_dt);

    let changed = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "INSERT OR IGNORE INTO waiting_queue_entries (
             entry_id, vendor_id,
             space_id, date_start, date_end, time_start, time_end,
             position, score_base, score_performance, score_tenure, score_total,
             status, created_at, notified_at, removed_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
          rusqlite::params![
            id_str,
            vendor_str,
            slot.space_id,
            slot.date_start,
            slot.date_end,
            slot.time_start,
            slot.time_end,
            position,
            score.base,
            score.performance_bonus,
            score.tenure_bonus,
            score.total,
            status_str,
            created_str,
            notified,
            removed,
          ],
        )?;
        Ok(n)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn get_queue_entry(&self, id: Uuid) -> Result<Option<WaitingQueueEntry>> {
    let id_str = encode_uuid(id);
    let sql = format!("SELECT {QUEUE_COLUMNS} FROM waiting_queue_entries WHERE entry_id = ?1");

    let raw: Option<RawQueueEntry> = self
      .conn
      .call(move |conn| {
        let row = conn
          .query_row(&sql, rusqlite::params![id_str], RawQueueEntry::from_row)
          .optional()?;
        Ok(row)
      })
      .await?;

    raw.map(RawQueueEntry::into_entry).transpose()
  }

  async fn list_queue_entries(&self, query: QueueQuery) -> Result<Vec<WaitingQueueEntry>> {
    let mut conds: Vec<String> = vec![];
    let mut params: Vec<String> = vec![];

    if let Some(vendor_id) = query.vendor_id {
      conds.push("vendor_id = ?".into());
      params.push(encode_uuid(vendor_id));
    }
    if let Some(slot) = query.slot {
      conds.push(SLOT_MATCH.into());
      params.extend(encode_slot(&slot).as_params().map(str::to_owned));
    }
    if !query.statuses.is_empty() {
      let marks = vec!["?"; query.statuses.len()].join(", ");
      conds.push(format!("status IN ({marks})"));
      params.extend(query.statuses.iter().map(|s| s.as_ref().to_owned()));
    }

    let sql = format!(
      "SELECT {QUEUE_COLUMNS} FROM waiting_queue_entries {}
       ORDER BY position IS NULL, position, created_at, entry_id",
      where_clause(&conds),
    );

    let raws: Vec<RawQueueEntry> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params_from_iter(params.iter()), RawQueueEntry::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawQueueEntry::into_entry).collect()
  }

  async fn transition_queue_entry(&self, t: QueueTransition) -> Result<bool> {
    if t.from.is_empty() {
      return Ok(false);
    }
    let to_live = t.to.is_live();
    let marks = (0..t.from.len())
      .map(|i| format!("?{}", i + 4))
      .collect::<Vec<_>>()
      .join(", ");
    // ?1 status, ?2 timestamp, ?3 id, ?4.. accepted source statuses.
    let sql = format!(
      "UPDATE waiting_queue_entries
       SET status      = ?1,
           notified_at = CASE WHEN ?1 = 'notified' THEN ?2 ELSE notified_at END,
           removed_at  = CASE WHEN ?1 = 'removed'  THEN ?2 ELSE removed_at END,
           position    = {}
       WHERE entry_id = ?3 AND status IN ({marks})",
      if to_live { "position" } else { "NULL" },
    );

    let settles = t.to == QueueStatus::Notified;
    let id_str  = encode_uuid(t.id);
    let mut params: Vec<String> = vec![t.to.as_ref().to_owned(), encode_dt(t.at), id_str.clone()];
    params.extend(t.from.iter().map(|s| s.as_ref().to_owned()));

    let changed = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let n = tx.execute(&sql, rusqlite::params_from_iter(params.iter()))?;
        if n == 1 && settles {
          tx.execute(SETTLE_FOR_ENTRY, rusqlite::params![id_str])?;
        }
        tx.commit()?;
        Ok(n)
      })
      .await?;

    Ok(changed == 1)
  }

  async fn apply_positions(&self, slot: SlotKey, ranking: Vec<(Uuid, u32)>) -> Result<bool> {
    let cols = encode_slot(&slot);
    let ranking: Vec<(String, i64)> = ranking
      .into_iter()
      .map(|(id, pos)| (encode_uuid(id), i64::from(pos)))
      .collect();
    let live_sql = format!(
      "SELECT entry_id FROM waiting_queue_entries
       WHERE {SLOT_MATCH} AND status IN ('active', 'notified')"
    );

    let applied = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut live: Vec<String> = {
          let mut stmt = tx.prepare(&live_sql)?;
          stmt
            .query_map(rusqlite::params_from_iter(cols.as_params()), |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        let mut ranked: Vec<String> = ranking.iter().map(|(id, _)| id.clone()).collect();
        live.sort();
        ranked.sort();
        if live != ranked {
          return Ok(false);
        }

        {
          let mut stmt =
            tx.prepare("UPDATE waiting_queue_entries SET position = ?1 WHERE entry_id = ?2")?;
          for (id, pos) in &ranking {
            stmt.execute(rusqlite::params![pos, id])?;
          }
        }
        tx.commit()?;
        Ok(true)
      })
      .await?;

    Ok(applied)
  }

  // ── Pending notifications ─────────────────────────────────────────────────

  async fn pending_notifications(&self) -> Result<Vec<SlotKey>> {
    let raws: Vec<SlotColumns> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT space_id, date_start, date_end, time_start, time_end
           FROM pending_slot_notifications
           ORDER BY freed_at, space_id, date_start, time_start",
        )?;
        let rows = stmt
          .query_map([], |row| slot_columns(row, 0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(SlotColumns::into_slot).collect()
  }

  async fn settle_notification(&self, slot: SlotKey) -> Result<()> {
    let cols = encode_slot(&slot);
    let sql = format!("DELETE FROM pending_slot_notifications WHERE {SLOT_MATCH}");

    self
      .conn
      .call(move |conn| {
        conn.execute(&sql, rusqlite::params_from_iter(cols.as_params()))?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Vendors ───────────────────────────────────────────────────────────────

  async fn vendor_activity(
    &self,
    vendor_id: Uuid,
    since:     DateTime<Utc>,
    until:     DateTime<Utc>,
  ) -> Result<Option<VendorActivity>> {
    let id_str    = encode_uuid(vendor_id);
    let since_str = encode_dt(since);
    let until_str = encode_dt(until);

    let raw: Option<(String, i64, i64)> = self
      .conn
      .call(move |conn| {
        let created: Option<String> = conn
          .query_row(
            "SELECT created_at FROM vendors WHERE vendor_id = ?1",
            rusqlite::params![id_str],
            |r| r.get(0),
          )
          .optional()?;
        let Some(created) = created else {
          return Ok(None);
        };

        let (holds, conversions): (i64, i64) = conn.query_row(
          "SELECT COUNT(*), COALESCE(SUM(status = 'converted'), 0)
           FROM temporary_reservations
           WHERE vendor_id = ?1 AND created_at >= ?2 AND created_at <= ?3",
          rusqlite::params![id_str, since_str, until_str],
          |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(Some((created, holds, conversions)))
      })
      .await?;

    raw
      .map(|(created, holds, conversions)| {
        Ok(VendorActivity {
          account_created_at:   decode_dt(&created)?,
          reservations_created: holds as u32,
          conversions:          conversions as u32,
        })
      })
      .transpose()
  }
}
