use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rusqlite::{params, Connection};

use crate::models::{Booking, BookingStatus, Calendar, TimeSlot};
use crate::services::conflict::ExistingBooking;

const DATE_FMT: &str = "%Y-%m-%d";
const TIME_FMT: &str = "%H:%M:%S";
const DATETIME_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn now_str() -> String {
    Utc::now().naive_utc().format(DATETIME_FMT).to_string()
}

fn parse_date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, DATE_FMT)
        .unwrap_or_else(|_| Utc::now().naive_utc().date())
}

fn parse_time(s: &str) -> NaiveTime {
    NaiveTime::parse_from_str(s, TIME_FMT)
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .unwrap_or_else(|_| NaiveTime::from_hms_opt(0, 0, 0).expect("midnight"))
}

fn parse_datetime(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, DATETIME_FMT).unwrap_or_else(|_| Utc::now().naive_utc())
}

// ── Calendars ──

pub fn create_calendar(conn: &Connection, calendar: &Calendar) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO calendars (id, owner_id, title, description, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            calendar.id,
            calendar.owner_id,
            calendar.title,
            calendar.description,
            calendar.is_active as i32,
            calendar.created_at.format(DATETIME_FMT).to_string(),
            calendar.updated_at.format(DATETIME_FMT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn update_calendar(
    conn: &Connection,
    id: &str,
    title: &str,
    description: Option<&str>,
    is_active: bool,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE calendars SET title = ?1, description = ?2, is_active = ?3, updated_at = ?4
         WHERE id = ?5",
        params![title, description, is_active as i32, now_str(), id],
    )?;
    Ok(count > 0)
}

pub fn get_calendar(conn: &Connection, id: &str) -> anyhow::Result<Option<Calendar>> {
    let result = conn.query_row(
        "SELECT id, owner_id, title, description, is_active, created_at, updated_at
         FROM calendars WHERE id = ?1",
        params![id],
        parse_calendar_row,
    );

    match result {
        Ok(calendar) => Ok(Some(calendar)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_active_calendar(conn: &Connection, id: &str) -> anyhow::Result<Option<Calendar>> {
    Ok(get_calendar(conn, id)?.filter(|c| c.is_active))
}

pub fn list_calendars(conn: &Connection) -> anyhow::Result<Vec<Calendar>> {
    let mut stmt = conn.prepare(
        "SELECT id, owner_id, title, description, is_active, created_at, updated_at
         FROM calendars ORDER BY created_at ASC",
    )?;
    let rows = stmt.query_map([], parse_calendar_row)?;

    let mut calendars = vec![];
    for row in rows {
        calendars.push(row?);
    }
    Ok(calendars)
}

/// Cascades to the calendar's templates and booking history.
pub fn delete_calendar(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM calendars WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Future confirmed bookings referencing a calendar. Deletion is
/// blocked while this is non-zero.
pub fn count_future_confirmed_for_calendar(
    conn: &Connection,
    calendar_id: &str,
    now: NaiveDateTime,
) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE calendar_id = ?1 AND status = 'confirmed'
           AND booking_date || ' ' || start_time > ?2",
        params![calendar_id, now.format(DATETIME_FMT).to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn parse_calendar_row(row: &rusqlite::Row) -> rusqlite::Result<Calendar> {
    let created_at: String = row.get(5)?;
    let updated_at: String = row.get(6)?;
    Ok(Calendar {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        description: row.get(3)?,
        is_active: row.get::<_, i32>(4)? != 0,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

// ── Time slot templates ──

pub fn create_time_slot(conn: &Connection, slot: &TimeSlot) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO time_slots (id, calendar_id, day_of_week, start_time, end_time,
                                 duration_minutes, buffer_minutes, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            slot.id,
            slot.calendar_id,
            slot.day_of_week,
            slot.start_time.format(TIME_FMT).to_string(),
            slot.end_time.format(TIME_FMT).to_string(),
            slot.duration_minutes,
            slot.buffer_minutes,
            slot.is_active as i32,
            slot.created_at.format(DATETIME_FMT).to_string(),
            slot.updated_at.format(DATETIME_FMT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn update_time_slot(conn: &Connection, slot: &TimeSlot) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE time_slots SET day_of_week = ?1, start_time = ?2, end_time = ?3,
                duration_minutes = ?4, buffer_minutes = ?5, is_active = ?6, updated_at = ?7
         WHERE id = ?8 AND calendar_id = ?9",
        params![
            slot.day_of_week,
            slot.start_time.format(TIME_FMT).to_string(),
            slot.end_time.format(TIME_FMT).to_string(),
            slot.duration_minutes,
            slot.buffer_minutes,
            slot.is_active as i32,
            now_str(),
            slot.id,
            slot.calendar_id,
        ],
    )?;
    Ok(count > 0)
}

pub fn get_time_slot(conn: &Connection, id: &str) -> anyhow::Result<Option<TimeSlot>> {
    let result = conn.query_row(
        "SELECT id, calendar_id, day_of_week, start_time, end_time, duration_minutes,
                buffer_minutes, is_active, created_at, updated_at
         FROM time_slots WHERE id = ?1",
        params![id],
        parse_time_slot_row,
    );

    match result {
        Ok(slot) => Ok(Some(slot)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_active_time_slot(conn: &Connection, id: &str) -> anyhow::Result<Option<TimeSlot>> {
    Ok(get_time_slot(conn, id)?.filter(|s| s.is_active))
}

pub fn list_time_slots(conn: &Connection, calendar_id: &str) -> anyhow::Result<Vec<TimeSlot>> {
    let mut stmt = conn.prepare(
        "SELECT id, calendar_id, day_of_week, start_time, end_time, duration_minutes,
                buffer_minutes, is_active, created_at, updated_at
         FROM time_slots WHERE calendar_id = ?1
         ORDER BY day_of_week ASC, start_time ASC",
    )?;
    let rows = stmt.query_map(params![calendar_id], parse_time_slot_row)?;

    let mut slots = vec![];
    for row in rows {
        slots.push(row?);
    }
    Ok(slots)
}

pub fn delete_time_slot(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM time_slots WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

/// Future confirmed bookings referencing a template. Deletion is
/// blocked while this is non-zero; historical bookings keep their
/// reference.
pub fn count_future_confirmed_for_slot(
    conn: &Connection,
    time_slot_id: &str,
    now: NaiveDateTime,
) -> anyhow::Result<i64> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM bookings
         WHERE time_slot_id = ?1 AND status = 'confirmed'
           AND booking_date || ' ' || start_time > ?2",
        params![time_slot_id, now.format(DATETIME_FMT).to_string()],
        |row| row.get(0),
    )?;
    Ok(count)
}

fn parse_time_slot_row(row: &rusqlite::Row) -> rusqlite::Result<TimeSlot> {
    let start_time: String = row.get(3)?;
    let end_time: String = row.get(4)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(TimeSlot {
        id: row.get(0)?,
        calendar_id: row.get(1)?,
        day_of_week: row.get::<_, i64>(2)? as u8,
        start_time: parse_time(&start_time),
        end_time: parse_time(&end_time),
        duration_minutes: row.get(5)?,
        buffer_minutes: row.get(6)?,
        is_active: row.get::<_, i32>(7)? != 0,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}

// ── Bookings ──

/// Insert a booking row. The partial unique index on
/// (calendar_id, booking_date, start_time) WHERE status = 'confirmed'
/// makes this the serialization point for concurrent admissions; the
/// raw rusqlite error is surfaced so the admission controller can tell
/// a lost race from a transient failure.
pub fn insert_booking(conn: &Connection, booking: &Booking) -> Result<(), rusqlite::Error> {
    conn.execute(
        "INSERT INTO bookings (id, calendar_id, time_slot_id, booking_date, start_time, end_time,
                               guest_name, guest_email, notes, status, cancellation_token,
                               created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            booking.id,
            booking.calendar_id,
            booking.time_slot_id,
            booking.booking_date.format(DATE_FMT).to_string(),
            booking.start_time.format(TIME_FMT).to_string(),
            booking.end_time.format(TIME_FMT).to_string(),
            booking.guest_name,
            booking.guest_email,
            booking.notes,
            booking.status.as_str(),
            booking.cancellation_token,
            booking.created_at.format(DATETIME_FMT).to_string(),
            booking.updated_at.format(DATETIME_FMT).to_string(),
        ],
    )?;
    Ok(())
}

const BOOKING_COLS: &str = "id, calendar_id, time_slot_id, booking_date, start_time, end_time, \
     guest_name, guest_email, notes, status, cancellation_token, created_at, updated_at";

pub fn get_booking_by_id(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLS} FROM bookings WHERE id = ?1"),
        params![id],
        parse_booking_row,
    );

    match result {
        Ok(booking) => Ok(Some(booking)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_booking_by_token(conn: &Connection, token: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {BOOKING_COLS} FROM bookings WHERE cancellation_token = ?1"),
        params![token],
        parse_booking_row,
    );

    match result {
        Ok(booking) => Ok(Some(booking)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Confirmed bookings on one date, each carrying the buffer its
/// template requires. Templateless guest bookings get buffer 0 here so
/// the conflict detector never sees a null.
pub fn list_confirmed_on_date(
    conn: &Connection,
    calendar_id: &str,
    date: NaiveDate,
) -> anyhow::Result<Vec<ExistingBooking>> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.start_time, b.end_time, COALESCE(ts.buffer_minutes, 0)
         FROM bookings b
         LEFT JOIN time_slots ts ON b.time_slot_id = ts.id
         WHERE b.calendar_id = ?1 AND b.booking_date = ?2 AND b.status = 'confirmed'
         ORDER BY b.start_time ASC",
    )?;

    let rows = stmt.query_map(
        params![calendar_id, date.format(DATE_FMT).to_string()],
        |row| {
            let start: String = row.get(1)?;
            let end: String = row.get(2)?;
            Ok(ExistingBooking {
                id: row.get(0)?,
                start: parse_time(&start),
                end: parse_time(&end),
                buffer_minutes: row.get(3)?,
            })
        },
    )?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

/// Minute-normalized (date, start) pairs of confirmed bookings inside
/// an inclusive date window, for the slot expander's exclusion set.
pub fn confirmed_starts_in_range(
    conn: &Connection,
    calendar_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> anyhow::Result<Vec<(NaiveDate, NaiveTime)>> {
    let mut stmt = conn.prepare(
        "SELECT booking_date, start_time FROM bookings
         WHERE calendar_id = ?1 AND booking_date >= ?2 AND booking_date <= ?3
           AND status = 'confirmed'
         ORDER BY booking_date ASC, start_time ASC",
    )?;

    let rows = stmt.query_map(
        params![
            calendar_id,
            from.format(DATE_FMT).to_string(),
            to.format(DATE_FMT).to_string()
        ],
        |row| {
            let date: String = row.get(0)?;
            let start: String = row.get(1)?;
            Ok((parse_date(&date), parse_time(&start)))
        },
    )?;

    let mut starts = vec![];
    for row in rows {
        starts.push(row?);
    }
    Ok(starts)
}

pub fn list_bookings(
    conn: &Connection,
    calendar_id: Option<&str>,
    status_filter: Option<&str>,
    limit: i64,
) -> anyhow::Result<Vec<Booking>> {
    let mut sql = format!("SELECT {BOOKING_COLS} FROM bookings WHERE 1=1");
    let mut params_vec: Vec<Box<dyn rusqlite::types::ToSql>> = vec![];

    if let Some(calendar_id) = calendar_id {
        params_vec.push(Box::new(calendar_id.to_string()));
        sql.push_str(&format!(" AND calendar_id = ?{}", params_vec.len()));
    }
    if let Some(status) = status_filter {
        params_vec.push(Box::new(status.to_string()));
        sql.push_str(&format!(" AND status = ?{}", params_vec.len()));
    }
    params_vec.push(Box::new(limit));
    sql.push_str(&format!(
        " ORDER BY booking_date DESC, start_time DESC LIMIT ?{}",
        params_vec.len()
    ));

    let mut stmt = conn.prepare(&sql)?;
    let params_refs: Vec<&dyn rusqlite::types::ToSql> =
        params_vec.iter().map(|p| p.as_ref()).collect();
    let rows = stmt.query_map(params_refs.as_slice(), parse_booking_row)?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row?);
    }
    Ok(bookings)
}

/// Conditional status transition: flips status only when the row is
/// currently in `from`, so each transition is a single independent
/// guarded update. Restoring to `confirmed` can trip the double-booking
/// index, so the raw rusqlite error is surfaced.
pub fn transition_booking_status(
    conn: &Connection,
    id: &str,
    from: BookingStatus,
    to: BookingStatus,
) -> Result<bool, rusqlite::Error> {
    let count = conn.execute(
        "UPDATE bookings SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        params![to.as_str(), now_str(), id, from.as_str()],
    )?;
    Ok(count > 0)
}

fn parse_booking_row(row: &rusqlite::Row) -> rusqlite::Result<Booking> {
    let booking_date: String = row.get(3)?;
    let start_time: String = row.get(4)?;
    let end_time: String = row.get(5)?;
    let status: String = row.get(9)?;
    let created_at: String = row.get(11)?;
    let updated_at: String = row.get(12)?;

    Ok(Booking {
        id: row.get(0)?,
        calendar_id: row.get(1)?,
        time_slot_id: row.get(2)?,
        booking_date: parse_date(&booking_date),
        start_time: parse_time(&start_time),
        end_time: parse_time(&end_time),
        guest_name: row.get(6)?,
        guest_email: row.get(7)?,
        notes: row.get(8)?,
        status: BookingStatus::parse(&status),
        cancellation_token: row.get(10)?,
        created_at: parse_datetime(&created_at),
        updated_at: parse_datetime(&updated_at),
    })
}
