use chrono::Timelike;
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::db::queries::{self, RepairFilter};
use crate::errors::AppError;
use crate::models::{Booking, BookingStatus, ChangeEvent, NewRepair, RepairUpdate, Row};
use crate::services::validation::{self, RepairForm};
use crate::state::AppState;

/// Which bookings a mechanic listing returns.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MechanicScope {
    /// Every booking in the system.
    #[default]
    All,
    /// Bookings no mechanic has accepted yet.
    Open,
    /// Bookings accepted by the calling mechanic.
    Assigned,
}

pub fn create(state: &AppState, caller: &AuthUser, form: &RepairForm) -> Result<Booking, AppError> {
    let repair = validation::validate_form(form).map_err(AppError::Validation)?;
    create_validated(state, caller, repair)
}

pub fn create_validated(
    state: &AppState,
    caller: &AuthUser,
    repair: NewRepair,
) -> Result<Booking, AppError> {
    let now = chrono::Utc::now().naive_utc();
    // Stored timestamps have second precision.
    let now = now.with_nanosecond(0).unwrap_or(now);

    let booking = Booking {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: caller.id.clone(),
        mechanic_id: None,
        reg_number: repair.reg_number,
        postcode: repair.postcode,
        make: repair.make,
        model: repair.model,
        year: repair.year,
        transmission: repair.transmission,
        fuel_type: repair.fuel_type,
        mileage: repair.mileage,
        work_types: repair.work_types,
        full_name: repair.full_name,
        phone: repair.phone,
        email: repair.email,
        address1: repair.address1,
        address2: repair.address2,
        city: repair.city,
        state: repair.state,
        country: repair.country,
        problem_description: repair.problem_description,
        availability: repair.availability,
        status: BookingStatus::Pending,
        created_at: now,
        updated_at: now,
    };

    {
        let db = state.conn();
        queries::insert_repair(&db, &booking)?;
    }

    tracing::info!(booking_id = %booking.id, user_id = %caller.id, "repair booked");
    state
        .changes
        .publish(ChangeEvent::inserted(Row::Repair(Box::new(booking.clone()))));
    Ok(booking)
}

/// The caller's own bookings, newest first.
pub fn list(state: &AppState, caller: &AuthUser) -> Result<Vec<Booking>, AppError> {
    let db = state.conn();
    let bookings = queries::list_repairs(
        &db,
        &RepairFilter {
            user_id: Some(&caller.id),
            ..Default::default()
        },
    )?;
    Ok(bookings)
}

pub fn list_for_mechanic(
    state: &AppState,
    caller: &AuthUser,
    scope: MechanicScope,
) -> Result<Vec<Booking>, AppError> {
    caller.require_mechanic()?;

    let filter = match scope {
        MechanicScope::All => RepairFilter::default(),
        MechanicScope::Open => RepairFilter {
            unassigned: true,
            ..Default::default()
        },
        MechanicScope::Assigned => RepairFilter {
            mechanic_id: Some(&caller.id),
            ..Default::default()
        },
    };

    let db = state.conn();
    Ok(queries::list_repairs(&db, &filter)?)
}

/// Owners see their own bookings; mechanics see any booking.
pub fn get_by_id(state: &AppState, caller: &AuthUser, id: &str) -> Result<Booking, AppError> {
    let booking = load(state, id)?;
    if booking.user_id != caller.id && !caller.is_mechanic() {
        return Err(AppError::Forbidden("not the owner of this repair".into()));
    }
    Ok(booking)
}

pub fn update(
    state: &AppState,
    caller: &AuthUser,
    id: &str,
    fields: &RepairUpdate,
) -> Result<Booking, AppError> {
    let before = load_owned(state, caller, id)?;
    if fields.is_empty() {
        return Err(AppError::BadRequest("no editable fields supplied".into()));
    }
    let fields = validation::validate_update(fields, validation::current_year())
        .map_err(AppError::Validation)?;

    let after = {
        let db = state.conn();
        if !queries::update_repair_fields(&db, id, &caller.id, &fields)? {
            return Err(not_editable(queries::get_repair(&db, id)?.as_ref()));
        }
        queries::get_repair(&db, id)?
            .ok_or_else(|| AppError::NotFound(format!("repair {id}")))?
    };

    tracing::info!(booking_id = %id, "repair details updated");
    state.changes.publish(ChangeEvent::updated(
        Row::Repair(Box::new(before)),
        Row::Repair(Box::new(after.clone())),
    ));
    Ok(after)
}

pub fn delete(state: &AppState, caller: &AuthUser, id: &str) -> Result<(), AppError> {
    let before = load_owned(state, caller, id)?;
    {
        let db = state.conn();
        if !queries::delete_repair(&db, id, &caller.id)? {
            return Err(not_editable(queries::get_repair(&db, id)?.as_ref()));
        }
    }

    tracing::info!(booking_id = %id, "repair deleted");
    state
        .changes
        .publish(ChangeEvent::deleted(Row::Repair(Box::new(before))));
    Ok(())
}

/// Accepts a pending booking for the calling mechanic. Only one caller can
/// win: the write is conditioned on the row still being pending.
pub fn assign_mechanic(state: &AppState, caller: &AuthUser, id: &str) -> Result<Booking, AppError> {
    caller.require_mechanic()?;

    let (before, after) = {
        let db = state.conn();
        let before = queries::get_repair(&db, id)?
            .ok_or_else(|| AppError::NotFound(format!("repair {id}")))?;
        if before.status != BookingStatus::Pending {
            return Err(already_taken(&before));
        }
        if !queries::assign_mechanic(&db, id, &caller.id)? {
            tracing::info!(booking_id = %id, mechanic_id = %caller.id, "lost race to accept repair");
            return Err(AppError::State("repair has already been accepted".into()));
        }
        let after = queries::get_repair(&db, id)?
            .ok_or_else(|| AppError::NotFound(format!("repair {id}")))?;
        (before, after)
    };

    tracing::info!(booking_id = %id, mechanic_id = %caller.id, "repair accepted");
    state.changes.publish(ChangeEvent::updated(
        Row::Repair(Box::new(before)),
        Row::Repair(Box::new(after.clone())),
    ));
    Ok(after)
}

/// Moves a booking along the status machine. The only transition allowed
/// here is accepted -> completed, by the assigned mechanic.
pub fn advance_status(
    state: &AppState,
    caller: &AuthUser,
    id: &str,
    target: BookingStatus,
) -> Result<Booking, AppError> {
    caller.require_mechanic()?;

    let (before, after) = {
        let db = state.conn();
        let before = queries::get_repair(&db, id)?
            .ok_or_else(|| AppError::NotFound(format!("repair {id}")))?;

        // pending -> accepted only happens through assign_mechanic.
        if target == BookingStatus::Accepted || before.status.next() != Some(target) {
            return Err(AppError::State(format!(
                "cannot move repair from {} to {}",
                before.status.as_str(),
                target.as_str()
            )));
        }
        if before.mechanic_id.as_deref() != Some(caller.id.as_str()) {
            return Err(AppError::Forbidden(
                "repair is assigned to another mechanic".into(),
            ));
        }
        if !queries::transition_status(&db, id, &caller.id, before.status, target)? {
            return Err(AppError::State("repair status changed concurrently".into()));
        }
        let after = queries::get_repair(&db, id)?
            .ok_or_else(|| AppError::NotFound(format!("repair {id}")))?;
        (before, after)
    };

    tracing::info!(
        booking_id = %id,
        from = before.status.as_str(),
        to = after.status.as_str(),
        "repair status advanced"
    );
    state.changes.publish(ChangeEvent::updated(
        Row::Repair(Box::new(before)),
        Row::Repair(Box::new(after.clone())),
    ));
    Ok(after)
}

fn load(state: &AppState, id: &str) -> Result<Booking, AppError> {
    let db = state.conn();
    queries::get_repair(&db, id)?.ok_or_else(|| AppError::NotFound(format!("repair {id}")))
}

fn load_owned(state: &AppState, caller: &AuthUser, id: &str) -> Result<Booking, AppError> {
    let booking = load(state, id)?;
    if booking.user_id != caller.id {
        return Err(AppError::Forbidden("not the owner of this repair".into()));
    }
    if booking.status != BookingStatus::Pending {
        return Err(not_editable(Some(&booking)));
    }
    Ok(booking)
}

fn not_editable(current: Option<&Booking>) -> AppError {
    match current {
        Some(b) => AppError::State(format!(
            "repair is {} and can no longer be changed",
            b.status.as_str()
        )),
        None => AppError::NotFound("repair".into()),
    }
}

fn already_taken(booking: &Booking) -> AppError {
    AppError::State(format!(
        "repair is already {}",
        booking.status.as_str()
    ))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::{ChangeKind, Table, WorkType};
    use crate::services::testing::{repair_form, test_state};

    fn customer() -> AuthUser {
        AuthUser::customer("user_customer")
    }

    fn mechanic(id: &str) -> AuthUser {
        AuthUser::mechanic(id)
    }

    #[test]
    fn test_create_persists_pending_booking() {
        let state = test_state();
        let booking = create(&state, &customer(), &repair_form()).unwrap();

        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.mechanic_id, None);
        assert_eq!(booking.user_id, "user_customer");
        assert_eq!(booking.work_types, vec![WorkType::Diagnostics]);

        let fetched = get_by_id(&state, &customer(), &booking.id).unwrap();
        assert_eq!(fetched, booking);
    }

    #[test]
    fn test_create_rejects_invalid_form() {
        let state = test_state();
        let mut form = repair_form();
        form.reg_number = "abc-123de".to_string();
        match create(&state, &customer(), &form) {
            Err(AppError::Validation(fields)) => assert!(fields.contains_key("regNumber")),
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(list(&state, &customer()).unwrap().is_empty());
    }

    #[test]
    fn test_list_only_returns_own_bookings_newest_first() {
        let state = test_state();
        let first = create(&state, &customer(), &repair_form()).unwrap();
        let second = create(&state, &customer(), &repair_form()).unwrap();
        create(&state, &AuthUser::customer("someone_else"), &repair_form()).unwrap();

        let ids: Vec<String> = list(&state, &customer())
            .unwrap()
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn test_mechanic_listing_scopes() {
        let state = test_state();
        let open = create(&state, &customer(), &repair_form()).unwrap();
        let taken = create(&state, &customer(), &repair_form()).unwrap();
        assign_mechanic(&state, &mechanic("mech_1"), &taken.id).unwrap();

        let all = list_for_mechanic(&state, &mechanic("mech_2"), MechanicScope::All).unwrap();
        assert_eq!(all.len(), 2);

        let open_only = list_for_mechanic(&state, &mechanic("mech_2"), MechanicScope::Open).unwrap();
        assert_eq!(open_only.len(), 1);
        assert_eq!(open_only[0].id, open.id);

        let mine = list_for_mechanic(&state, &mechanic("mech_1"), MechanicScope::Assigned).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, taken.id);

        assert!(matches!(
            list_for_mechanic(&state, &customer(), MechanicScope::All),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_get_by_id_access() {
        let state = test_state();
        let booking = create(&state, &customer(), &repair_form()).unwrap();

        assert!(get_by_id(&state, &mechanic("mech_1"), &booking.id).is_ok());
        assert!(matches!(
            get_by_id(&state, &AuthUser::customer("stranger"), &booking.id),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            get_by_id(&state, &customer(), "missing"),
            Err(AppError::NotFound(_))
        ));
    }

    #[test]
    fn test_owner_update() {
        let state = test_state();
        let booking = create(&state, &customer(), &repair_form()).unwrap();

        let updated = update(
            &state,
            &customer(),
            &booking.id,
            &RepairUpdate {
                phone: Some("08098765432".to_string()),
                year: Some(2020),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(updated.phone, "08098765432");
        assert_eq!(updated.year, 2020);
        assert_eq!(updated.full_name, booking.full_name);
        assert_eq!(updated.reg_number, booking.reg_number);
    }

    #[test]
    fn test_update_rules() {
        let state = test_state();
        let booking = create(&state, &customer(), &repair_form()).unwrap();
        let change = RepairUpdate {
            full_name: Some("Someone Else".to_string()),
            ..Default::default()
        };
        let bad_phone = RepairUpdate {
            phone: Some("123".to_string()),
            ..Default::default()
        };

        assert!(matches!(
            update(&state, &AuthUser::customer("stranger"), &booking.id, &change),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            update(&state, &customer(), "missing", &change),
            Err(AppError::NotFound(_))
        ));
        // ownership is settled before the payload is looked at
        assert!(matches!(
            update(&state, &AuthUser::customer("stranger"), &booking.id, &bad_phone),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            update(&state, &AuthUser::customer("stranger"), &booking.id, &RepairUpdate::default()),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            update(&state, &customer(), "missing", &bad_phone),
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            update(&state, &customer(), &booking.id, &RepairUpdate::default()),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            update(&state, &customer(), &booking.id, &bad_phone),
            Err(AppError::Validation(_))
        ));

        assign_mechanic(&state, &mechanic("mech_1"), &booking.id).unwrap();
        assert!(matches!(
            update(&state, &customer(), &booking.id, &change),
            Err(AppError::State(_))
        ));
    }

    #[test]
    fn test_delete_rules() {
        let state = test_state();
        let booking = create(&state, &customer(), &repair_form()).unwrap();

        assert!(matches!(
            delete(&state, &AuthUser::customer("stranger"), &booking.id),
            Err(AppError::Forbidden(_))
        ));
        delete(&state, &customer(), &booking.id).unwrap();
        assert!(matches!(
            delete(&state, &customer(), &booking.id),
            Err(AppError::NotFound(_))
        ));

        let accepted = create(&state, &customer(), &repair_form()).unwrap();
        assign_mechanic(&state, &mechanic("mech_1"), &accepted.id).unwrap();
        assert!(matches!(
            delete(&state, &customer(), &accepted.id),
            Err(AppError::State(_))
        ));
    }

    #[test]
    fn test_full_lifecycle() {
        let state = test_state();
        let booking = create(&state, &customer(), &repair_form()).unwrap();

        let accepted = assign_mechanic(&state, &mechanic("mech_1"), &booking.id).unwrap();
        assert_eq!(accepted.status, BookingStatus::Accepted);
        assert_eq!(accepted.mechanic_id.as_deref(), Some("mech_1"));

        let completed =
            advance_status(&state, &mechanic("mech_1"), &booking.id, BookingStatus::Completed)
                .unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        assert_eq!(completed.mechanic_id.as_deref(), Some("mech_1"));

        assert!(matches!(
            advance_status(&state, &mechanic("mech_1"), &booking.id, BookingStatus::Completed),
            Err(AppError::State(_))
        ));
        assert!(matches!(
            assign_mechanic(&state, &mechanic("mech_2"), &booking.id),
            Err(AppError::State(_))
        ));
    }

    #[test]
    fn test_illegal_transitions() {
        let state = test_state();
        let booking = create(&state, &customer(), &repair_form()).unwrap();

        // pending -> completed skips accepted
        assert!(matches!(
            advance_status(&state, &mechanic("mech_1"), &booking.id, BookingStatus::Completed),
            Err(AppError::State(_))
        ));
        // pending -> accepted only through assignment
        assert!(matches!(
            advance_status(&state, &mechanic("mech_1"), &booking.id, BookingStatus::Accepted),
            Err(AppError::State(_))
        ));

        assign_mechanic(&state, &mechanic("mech_1"), &booking.id).unwrap();
        assert!(matches!(
            advance_status(&state, &mechanic("mech_1"), &booking.id, BookingStatus::Pending),
            Err(AppError::State(_))
        ));
        assert!(matches!(
            advance_status(&state, &mechanic("mech_1"), &booking.id, BookingStatus::Accepted),
            Err(AppError::State(_))
        ));
        assert!(matches!(
            advance_status(&state, &mechanic("mech_2"), &booking.id, BookingStatus::Completed),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            advance_status(&state, &customer(), &booking.id, BookingStatus::Completed),
            Err(AppError::Forbidden(_))
        ));
    }

    #[test]
    fn test_assign_requires_mechanic_and_existing_booking() {
        let state = test_state();
        let booking = create(&state, &customer(), &repair_form()).unwrap();
        assert!(matches!(
            assign_mechanic(&state, &customer(), &booking.id),
            Err(AppError::Forbidden(_))
        ));
        assert!(matches!(
            assign_mechanic(&state, &mechanic("mech_1"), "missing"),
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_assign_has_single_winner() {
        let state = Arc::new(test_state());
        let booking = create(&state, &customer(), &repair_form()).unwrap();

        let mut handles = vec![];
        for i in 0..8 {
            let state = Arc::clone(&state);
            let id = booking.id.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                assign_mechanic(&state, &mechanic(&format!("mech_{i}")), &id)
            }));
        }

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(AppError::State(_)) => {}
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert_eq!(winners, 1);

        let stored = get_by_id(&state, &customer(), &booking.id).unwrap();
        assert_eq!(stored.status, BookingStatus::Accepted);
        assert!(stored.mechanic_id.is_some());
    }

    #[tokio::test]
    async fn test_mutations_publish_changes() {
        let state = test_state();
        let mut sub = state.changes.subscribe(Table::Repairs, vec![]);

        let booking = create(&state, &customer(), &repair_form()).unwrap();
        assign_mechanic(&state, &mechanic("mech_1"), &booking.id).unwrap();

        let created = sub.recv().await.unwrap();
        assert_eq!(created.kind, ChangeKind::Insert);
        assert!(created.old.is_none());

        let accepted = sub.recv().await.unwrap();
        assert_eq!(accepted.kind, ChangeKind::Update);
        assert_eq!(
            accepted.old.as_ref().and_then(|r| r.column("status")),
            Some(Some("pending"))
        );
        assert_eq!(
            accepted.new.as_ref().and_then(|r| r.column("mechanic_id")),
            Some(Some("mech_1"))
        );
    }
}
