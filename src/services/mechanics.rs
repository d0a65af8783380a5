use chrono::Timelike;

use crate::auth::AuthUser;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{ChangeEvent, MechanicApplication, MechanicProfile, Row};
use crate::services::validation::{self, MechanicForm};
use crate::state::AppState;

/// An uploaded police report, as received from the client.
#[derive(Debug, Clone)]
pub struct ReportUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Storage path for a police report: `{user}/reports/{first name}/{millis}-{file}`.
/// The name segments are reduced to `[A-Za-z0-9._-]`, anything else becomes `_`.
pub fn report_path(user_id: &str, first_name: &str, millis: i64, file_name: &str) -> String {
    // Only the final path segment of the client's file name is kept.
    let file_name = file_name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("police-report.pdf");
    format!(
        "{user_id}/reports/{}/{millis}-{}",
        path_segment(first_name),
        path_segment(file_name)
    )
}

fn path_segment(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Records a mechanic application. The report is uploaded first and the row
/// is only written once the upload returned a stored path. Applying does not
/// grant the mechanic role.
pub async fn submit_application(
    state: &AppState,
    caller: &AuthUser,
    form: MechanicForm,
    report: Option<ReportUpload>,
) -> Result<MechanicApplication, AppError> {
    validation::validate_mechanic_form(
        &form,
        report.as_ref().map(|r| r.content_type.as_str()),
        report.as_ref().map_or(0, |r| r.bytes.len()),
    )
    .map_err(AppError::Validation)?;
    let report = report.ok_or_else(|| {
        AppError::invalid_field("policeReport", "Police report is required")
    })?;

    {
        let db = state.conn();
        if queries::get_application_by_user(&db, &caller.id)?.is_some() {
            return Err(AppError::State("application already submitted".into()));
        }
    }

    let first_name = form.first_name.trim().to_string();
    let now = chrono::Utc::now();
    let path = report_path(&caller.id, &first_name, now.timestamp_millis(), &report.file_name);

    let stored_path = state
        .storage
        .upload(
            &state.config.police_report_bucket,
            &path,
            &report.content_type,
            report.bytes,
        )
        .await
        .map_err(|e| AppError::Upstream(format!("police report upload failed: {e:#}")))?;

    let application = MechanicApplication {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: caller.id.clone(),
        first_name,
        last_name: form.last_name.trim().to_string(),
        email: form.email.trim().to_string(),
        phone: form.phone.trim().to_string(),
        postcode: form.postcode.trim().to_string(),
        address: form
            .address
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        police_report: stored_path,
        created_at: now.naive_utc().with_nanosecond(0).unwrap_or(now.naive_utc()),
    };

    {
        let db = state.conn();
        // Another request may have inserted between the check and the upload.
        if queries::get_application_by_user(&db, &caller.id)?.is_some() {
            return Err(AppError::State("application already submitted".into()));
        }
        queries::insert_application(&db, &application)?;
    }

    tracing::info!(user_id = %caller.id, "mechanic application submitted");
    state.changes.publish(ChangeEvent::inserted(Row::MechanicApplication(
        Box::new(application.clone()),
    )));
    Ok(application)
}

pub fn my_application(state: &AppState, caller: &AuthUser) -> Result<MechanicApplication, AppError> {
    let db = state.conn();
    queries::get_application_by_user(&db, &caller.id)?
        .ok_or_else(|| AppError::NotFound("mechanic application".into()))
}

/// A mechanic's profile is visible to the mechanic and to customers who have a
/// booking assigned to them.
pub fn profile(
    state: &AppState,
    caller: &AuthUser,
    mechanic_id: &str,
) -> Result<MechanicProfile, AppError> {
    let db = state.conn();
    if caller.id != mechanic_id && !queries::has_repair_with_mechanic(&db, &caller.id, mechanic_id)? {
        return Err(AppError::Forbidden(
            "no booking with this mechanic".into(),
        ));
    }
    queries::get_mechanic_profile(&db, mechanic_id)?
        .ok_or_else(|| AppError::NotFound(format!("mechanic {mechanic_id}")))
}

/// Signed, time-limited link to the mechanic's police report.
pub async fn police_report_url(
    state: &AppState,
    caller: &AuthUser,
    mechanic_id: &str,
) -> Result<String, AppError> {
    let path = profile(state, caller, mechanic_id)?.police_report;
    state
        .storage
        .signed_url(
            &state.config.police_report_bucket,
            &path,
            state.config.signed_url_ttl_secs,
        )
        .await
        .map_err(|e| AppError::Upstream(format!("failed to sign police report url: {e:#}")))
}
