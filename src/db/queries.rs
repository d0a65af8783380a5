use anyhow::Context;
use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::models::{
    Booking, BookingStatus, FuelType, MechanicApplication, MechanicProfile, RepairUpdate,
    Transmission, User, UserType,
};

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const REPAIR_COLUMNS: &str = "id, user_id, mechanic_id, reg_number, postcode, make, model, year, \
     transmission, fuel_type, mileage, work_types, full_name, phone, email, address1, address2, \
     city, state, country, problem_description, availability, status, created_at, updated_at";

pub fn now_timestamp() -> String {
    Utc::now().naive_utc().format(TIMESTAMP_FORMAT).to_string()
}

// ── Repairs ──

pub fn insert_repair(conn: &Connection, booking: &Booking) -> anyhow::Result<()> {
    let work_types = serde_json::to_string(&booking.work_types)?;
    let availability = serde_json::to_string(&booking.availability)?;
    let created_at = booking.created_at.format(TIMESTAMP_FORMAT).to_string();
    let updated_at = booking.updated_at.format(TIMESTAMP_FORMAT).to_string();

    conn.execute(
        &format!(
            "INSERT INTO repairs ({REPAIR_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25)"
        ),
        params![
            booking.id,
            booking.user_id,
            booking.mechanic_id,
            booking.reg_number,
            booking.postcode,
            booking.make,
            booking.model,
            booking.year,
            booking.transmission.as_str(),
            booking.fuel_type.as_str(),
            booking.mileage,
            work_types,
            booking.full_name,
            booking.phone,
            booking.email,
            booking.address1,
            booking.address2,
            booking.city,
            booking.state,
            booking.country,
            booking.problem_description,
            availability,
            booking.status.as_str(),
            created_at,
            updated_at,
        ],
    )
    .context("failed to insert repair")?;
    Ok(())
}

pub fn get_repair(conn: &Connection, id: &str) -> anyhow::Result<Option<Booking>> {
    let result = conn.query_row(
        &format!("SELECT {REPAIR_COLUMNS} FROM repairs WHERE id = ?1"),
        params![id],
        |row| Ok(parse_repair_row(row)),
    );

    match result {
        Ok(booking) => Ok(Some(booking?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Optional constraints for repair listings; all set constraints must match.
#[derive(Debug, Default, Clone)]
pub struct RepairFilter<'a> {
    pub user_id: Option<&'a str>,
    pub mechanic_id: Option<&'a str>,
    pub unassigned: bool,
}

/// Lists repairs newest-first.
pub fn list_repairs(conn: &Connection, filter: &RepairFilter) -> anyhow::Result<Vec<Booking>> {
    let mut clauses: Vec<String> = vec![];
    let mut values: Vec<&dyn rusqlite::types::ToSql> = vec![];

    if let Some(user_id) = &filter.user_id {
        values.push(user_id);
        clauses.push(format!("user_id = ?{}", values.len()));
    }
    if let Some(mechanic_id) = &filter.mechanic_id {
        values.push(mechanic_id);
        clauses.push(format!("mechanic_id = ?{}", values.len()));
    }
    if filter.unassigned {
        clauses.push("mechanic_id IS NULL".to_string());
    }

    let where_sql = if clauses.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", clauses.join(" AND "))
    };
    let sql = format!(
        "SELECT {REPAIR_COLUMNS} FROM repairs{where_sql} ORDER BY created_at DESC, rowid DESC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(values.as_slice(), |row| Ok(parse_repair_row(row)))?;

    let mut bookings = vec![];
    for row in rows {
        bookings.push(row??);
    }
    Ok(bookings)
}

/// Applies the owner-editable fields, only while the repair is still pending
/// and owned by `user_id`. Returns whether a row changed.
pub fn update_repair_fields(
    conn: &Connection,
    id: &str,
    user_id: &str,
    fields: &RepairUpdate,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE repairs SET
           full_name = COALESCE(?1, full_name),
           phone = COALESCE(?2, phone),
           problem_description = COALESCE(?3, problem_description),
           year = COALESCE(?4, year),
           updated_at = ?5
         WHERE id = ?6 AND user_id = ?7 AND status = 'pending'",
        params![
            fields.full_name,
            fields.phone,
            fields.problem_description,
            fields.year,
            now_timestamp(),
            id,
            user_id,
        ],
    )?;
    Ok(count > 0)
}

/// Deletes a pending repair owned by `user_id`. Returns whether a row was removed.
pub fn delete_repair(conn: &Connection, id: &str, user_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "DELETE FROM repairs WHERE id = ?1 AND user_id = ?2 AND status = 'pending'",
        params![id, user_id],
    )?;
    Ok(count > 0)
}

/// Moves a pending repair to accepted and records the mechanic in the same
/// statement. Returns false when the repair is no longer pending.
pub fn assign_mechanic(conn: &Connection, id: &str, mechanic_id: &str) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE repairs SET status = 'accepted', mechanic_id = ?1, updated_at = ?2
         WHERE id = ?3 AND status = 'pending'",
        params![mechanic_id, now_timestamp(), id],
    )?;
    Ok(count > 0)
}

/// Changes status `from -> to` for a repair held by `mechanic_id`, conditioned
/// on the current status still being `from`.
pub fn transition_status(
    conn: &Connection,
    id: &str,
    mechanic_id: &str,
    from: BookingStatus,
    to: BookingStatus,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE repairs SET status = ?1, updated_at = ?2
         WHERE id = ?3 AND mechanic_id = ?4 AND status = ?5",
        params![to.as_str(), now_timestamp(), id, mechanic_id, from.as_str()],
    )?;
    Ok(count > 0)
}

pub fn has_repair_with_mechanic(
    conn: &Connection,
    user_id: &str,
    mechanic_id: &str,
) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM repairs WHERE user_id = ?1 AND mechanic_id = ?2",
        params![user_id, mechanic_id],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn parse_repair_row(row: &rusqlite::Row) -> anyhow::Result<Booking> {
    let transmission: String = row.get(8)?;
    let fuel_type: String = row.get(9)?;
    let work_types_json: String = row.get(11)?;
    let availability_json: String = row.get(21)?;
    let status: String = row.get(22)?;
    let created_at: String = row.get(23)?;
    let updated_at: String = row.get(24)?;

    Ok(Booking {
        id: row.get(0)?,
        user_id: row.get(1)?,
        mechanic_id: row.get(2)?,
        reg_number: row.get(3)?,
        postcode: row.get(4)?,
        make: row.get(5)?,
        model: row.get(6)?,
        year: row.get(7)?,
        transmission: Transmission::parse(&transmission)
            .with_context(|| format!("unknown transmission: {transmission}"))?,
        fuel_type: FuelType::parse(&fuel_type)
            .with_context(|| format!("unknown fuel type: {fuel_type}"))?,
        mileage: row.get(10)?,
        work_types: serde_json::from_str(&work_types_json).context("corrupt work_types column")?,
        full_name: row.get(12)?,
        phone: row.get(13)?,
        email: row.get(14)?,
        address1: row.get(15)?,
        address2: row.get(16)?,
        city: row.get(17)?,
        state: row.get(18)?,
        country: row.get(19)?,
        problem_description: row.get(20)?,
        availability: serde_json::from_str(&availability_json)
            .context("corrupt availability column")?,
        status: BookingStatus::parse(&status)
            .with_context(|| format!("unknown status: {status}"))?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn parse_timestamp(s: &str) -> anyhow::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .with_context(|| format!("invalid timestamp: {s}"))
}

// ── Users ──

pub fn get_user(conn: &Connection, id: &str) -> anyhow::Result<Option<User>> {
    let result = conn.query_row(
        "SELECT id, email, first_name, last_name, avatar_url, type FROM users WHERE id = ?1",
        params![id],
        |row| {
            let user_type: Option<String> = row.get(5)?;
            Ok(User {
                id: row.get(0)?,
                email: row.get(1)?,
                first_name: row.get(2)?,
                last_name: row.get(3)?,
                avatar_url: row.get(4)?,
                user_type: user_type.as_deref().and_then(UserType::parse),
            })
        },
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn get_user_type(conn: &Connection, id: &str) -> anyhow::Result<Option<UserType>> {
    let user_type: Option<Option<String>> = conn
        .query_row("SELECT type FROM users WHERE id = ?1", params![id], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(user_type.flatten().as_deref().and_then(UserType::parse))
}

/// Mirrors an identity-provider profile. The role column is owned by this
/// service and is never overwritten here.
pub fn upsert_user(
    conn: &Connection,
    user: &User,
    created_at: &str,
    updated_at: &str,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, email, first_name, last_name, avatar_url, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
         ON CONFLICT(id) DO UPDATE SET
           email = excluded.email,
           first_name = excluded.first_name,
           last_name = excluded.last_name,
           avatar_url = excluded.avatar_url,
           updated_at = excluded.updated_at",
        params![
            user.id,
            user.email,
            user.first_name,
            user.last_name,
            user.avatar_url,
            created_at,
            updated_at,
        ],
    )?;
    Ok(())
}

pub fn delete_user(conn: &Connection, id: &str) -> anyhow::Result<bool> {
    let count = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(count > 0)
}

// ── Mechanic Applications ──

pub fn insert_application(conn: &Connection, app: &MechanicApplication) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO apply_to_be_a_mechanic
           (id, user_id, first_name, last_name, email, phone, postcode, address, police_report, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            app.id,
            app.user_id,
            app.first_name,
            app.last_name,
            app.email,
            app.phone,
            app.postcode,
            app.address,
            app.police_report,
            app.created_at.format(TIMESTAMP_FORMAT).to_string(),
        ],
    )
    .context("failed to insert mechanic application")?;
    Ok(())
}

pub fn get_application_by_user(
    conn: &Connection,
    user_id: &str,
) -> anyhow::Result<Option<MechanicApplication>> {
    let result = conn.query_row(
        "SELECT id, user_id, first_name, last_name, email, phone, postcode, address, police_report, created_at
         FROM apply_to_be_a_mechanic WHERE user_id = ?1",
        params![user_id],
        |row| Ok(parse_application_row(row)),
    );

    match result {
        Ok(app) => Ok(Some(app?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn parse_application_row(row: &rusqlite::Row) -> anyhow::Result<MechanicApplication> {
    let created_at: String = row.get(9)?;
    Ok(MechanicApplication {
        id: row.get(0)?,
        user_id: row.get(1)?,
        first_name: row.get(2)?,
        last_name: row.get(3)?,
        email: row.get(4)?,
        phone: row.get(5)?,
        postcode: row.get(6)?,
        address: row.get(7)?,
        police_report: row.get(8)?,
        created_at: parse_timestamp(&created_at)?,
    })
}

pub fn get_mechanic_profile(
    conn: &Connection,
    mechanic_id: &str,
) -> anyhow::Result<Option<MechanicProfile>> {
    let result = conn.query_row(
        "SELECT a.user_id, u.first_name, u.last_name, u.email, u.avatar_url,
                a.postcode, a.phone, a.police_report, a.address
         FROM apply_to_be_a_mechanic a
         LEFT JOIN users u ON u.id = a.user_id
         WHERE a.user_id = ?1",
        params![mechanic_id],
        |row| {
            Ok(MechanicProfile {
                id: row.get(0)?,
                first_name: row.get(1)?,
                last_name: row.get(2)?,
                email: row.get(3)?,
                avatar_url: row.get(4)?,
                postcode: row.get(5)?,
                phone: row.get(6)?,
                police_report: row.get(7)?,
                address: row.get(8)?,
            })
        },
    );

    match result {
        Ok(profile) => Ok(Some(profile)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
