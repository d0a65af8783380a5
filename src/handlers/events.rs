use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::response::sse::{Event, Sse};
use serde::Deserialize;
use tokio_stream::StreamExt;

use crate::auth::AuthUser;
use crate::errors::AppError;
use crate::models::Table;
use crate::services::realtime::ChangeFilter;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct RealtimeQuery {
    pub filter: Option<String>,
}

/// Filters a subscription gets. Customers only ever see their own rows, and
/// applications are only visible to their author.
pub fn subscription_filters(
    caller: &AuthUser,
    table: Table,
    requested: Option<&str>,
) -> Result<Vec<ChangeFilter>, AppError> {
    let mut filters = vec![];
    if let Some(raw) = requested.filter(|s| !s.is_empty()) {
        filters.push(ChangeFilter::parse(table, raw).map_err(AppError::BadRequest)?);
    }
    if !caller.is_mechanic() || table == Table::MechanicApplications {
        filters.push(ChangeFilter::eq("user_id", &caller.id));
    }
    Ok(filters)
}

// GET /api/realtime/:table?filter=mechanic_id=is.null (SSE)
pub async fn change_stream(
    State(state): State<Arc<AppState>>,
    caller: AuthUser,
    Path(table): Path<String>,
    Query(query): Query<RealtimeQuery>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>, AppError> {
    let table =
        Table::parse(&table).ok_or_else(|| AppError::NotFound(format!("table {table}")))?;
    let filters = subscription_filters(&caller, table, query.filter.as_deref())?;

    tracing::debug!(user_id = %caller.id, table = table.as_str(), "realtime subscriber connected");

    let live_stream = state
        .changes
        .subscribe(table, filters)
        .into_stream()
        .map(|event| {
            let data = serde_json::to_string(&event).unwrap_or_default();
            Ok::<_, Infallible>(Event::default().data(data).event("change"))
        });

    let keepalive_stream = tokio_stream::StreamExt::map(
        tokio_stream::wrappers::IntervalStream::new(tokio::time::interval(Duration::from_secs(30))),
        |_| Ok(Event::default().comment("keepalive")),
    );

    Ok(Sse::new(StreamExt::merge(live_stream, keepalive_stream)))
}
