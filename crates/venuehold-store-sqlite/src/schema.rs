//! SQL schema for the venuehold SQLite store.
//!
//! Executed once at connection startup. Timestamps are fixed-width RFC 3339
//! UTC strings (microsecond precision, `Z` suffix), dates `YYYY-MM-DD`, times
//! `HH:MM`, so lexical comparison in SQL matches chronological order.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Owned by the wider CRM; read here for scoring only.
CREATE TABLE IF NOT EXISTS vendors (
    vendor_id   TEXT PRIMARY KEY,
    name        TEXT NOT NULL,
    created_at  TEXT NOT NULL
);

-- Owned by the wider CRM; read here to keep holds off sold slots.
CREATE TABLE IF NOT EXISTS confirmed_bookings (
    booking_id  TEXT PRIMARY KEY,
    space_id    TEXT NOT NULL,
    date_start  TEXT NOT NULL,
    date_end    TEXT NOT NULL,
    time_start  TEXT NOT NULL,
    time_end    TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS temporary_reservations (
    reservation_id        TEXT PRIMARY KEY,
    client_id             TEXT NOT NULL,
    vendor_id             TEXT NOT NULL,
    space_id              TEXT NOT NULL,
    date_start            TEXT NOT NULL,
    date_end              TEXT NOT NULL,
    time_start            TEXT NOT NULL,
    time_end              TEXT NOT NULL,
    estimated_value       TEXT NOT NULL,   -- decimal as text
    observations          TEXT,
    status                TEXT NOT NULL,   -- 'active' | 'expired' | 'converted' | 'released' | 'cancelled'
    expires_at            TEXT NOT NULL,
    created_at            TEXT NOT NULL,
    resolved_at           TEXT,
    converted_proposal_id TEXT,
    conversion_time_hours REAL
);

-- One active hold per vendor and slot.
CREATE UNIQUE INDEX IF NOT EXISTS reservations_one_active_idx
    ON temporary_reservations(vendor_id, space_id, date_start, date_end, time_start, time_end)
    WHERE status = 'active';

CREATE INDEX IF NOT EXISTS reservations_status_expiry_idx
    ON temporary_reservations(status, expires_at);
CREATE INDEX IF NOT EXISTS reservations_vendor_idx
    ON temporary_reservations(vendor_id, created_at);

-- Append-only audit of hold -> proposal conversions.
CREATE TABLE IF NOT EXISTS reservation_conversions (
    conversion_id         TEXT PRIMARY KEY,
    reservation_id        TEXT NOT NULL REFERENCES temporary_reservations(reservation_id),
    proposal_id           TEXT NOT NULL,
    vendor_id             TEXT NOT NULL,
    converted_at          TEXT NOT NULL,
    conversion_time_hours REAL NOT NULL,
    UNIQUE (reservation_id)
);

-- Rows are never deleted; removed entries keep their history.
CREATE TABLE IF NOT EXISTS waiting_queue_entries (
    entry_id          TEXT PRIMARY KEY,
    vendor_id         TEXT NOT NULL,
    space_id          TEXT NOT NULL,
    date_start        TEXT NOT NULL,
    date_end          TEXT NOT NULL,
    time_start        TEXT NOT NULL,
    time_end          TEXT NOT NULL,
    position          INTEGER,         -- NULL once removed
    score_base        INTEGER NOT NULL,
    score_performance INTEGER NOT NULL,
    score_tenure      INTEGER NOT NULL,
    score_total       INTEGER NOT NULL,
    status            TEXT NOT NULL,   -- 'active' | 'notified' | 'removed'
    created_at        TEXT NOT NULL,
    notified_at       TEXT,
    removed_at        TEXT
);

-- One live entry per vendor and slot.
CREATE UNIQUE INDEX IF NOT EXISTS queue_one_live_idx
    ON waiting_queue_entries(vendor_id, space_id, date_start, date_end, time_start, time_end)
    WHERE status IN ('active', 'notified');

CREATE INDEX IF NOT EXISTS queue_slot_idx
    ON waiting_queue_entries(space_id, date_start, date_end, time_start, time_end, status);

-- Slots freed by a release or expiry whose waiting queue has not been
-- consulted yet. Written with the freeing status change, deleted with the
-- queue entry it notifies.
CREATE TABLE IF NOT EXISTS pending_slot_notifications (
    space_id    TEXT NOT NULL,
    date_start  TEXT NOT NULL,
    date_end    TEXT NOT NULL,
    time_start  TEXT NOT NULL,
    time_end    TEXT NOT NULL,
    freed_at    TEXT NOT NULL,
    PRIMARY KEY (space_id, date_start, date_end, time_start, time_end)
);

PRAGMA user_version = 2;
";
