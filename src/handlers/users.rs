use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use crate::auth::AuthUser;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::User;
use crate::state::AppState;

// GET /api/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
) -> Result<Json<User>, AppError> {
    let user = {
        let db = state.conn();
        queries::get_user(&db, &caller.id)?
    };

    // Identity-provider users the webhook has not mirrored yet still get a
    // minimal profile.
    Ok(Json(user.unwrap_or(User {
        id: caller.id,
        email: None,
        first_name: None,
        last_name: None,
        avatar_url: None,
        user_type: caller.role,
    })))
}
