use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::models::{ChangeEvent, Row, Table};

/// In-process change feed. Every committed mutation is published once;
/// subscribers see only events for their table that pass their filter.
pub struct ChangeFeed {
    tx: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: ChangeEvent) {
        // No receivers is not an error: nobody is watching right now.
        let delivered = self.tx.send(event).unwrap_or(0);
        tracing::debug!(receivers = delivered, "published change event");
    }

    /// Subscribes to `table`. A row passes when it satisfies every filter.
    pub fn subscribe(&self, table: Table, filters: Vec<ChangeFilter>) -> Subscription {
        Subscription {
            rx: self.tx.subscribe(),
            table,
            filters,
        }
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(256)
    }
}

/// Row filter in the `column=eq.value` / `column=is.null` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeFilter {
    Eq { column: String, value: String },
    IsNull { column: String },
}

impl ChangeFilter {
    pub fn eq(column: &str, value: &str) -> Self {
        ChangeFilter::Eq {
            column: column.to_string(),
            value: value.to_string(),
        }
    }

    pub fn parse(table: Table, s: &str) -> Result<Self, String> {
        let (column, op) = s
            .split_once('=')
            .ok_or_else(|| format!("malformed filter: {s}"))?;

        if !filterable_columns(table).contains(&column) {
            return Err(format!(
                "column {column} cannot be filtered on {}",
                table.as_str()
            ));
        }

        if let Some(value) = op.strip_prefix("eq.") {
            if value.is_empty() {
                return Err(format!("missing value in filter: {s}"));
            }
            Ok(ChangeFilter::eq(column, value))
        } else if op == "is.null" {
            Ok(ChangeFilter::IsNull {
                column: column.to_string(),
            })
        } else {
            Err(format!("unsupported filter operator: {op}"))
        }
    }

    pub fn column(&self) -> &str {
        match self {
            ChangeFilter::Eq { column, .. } | ChangeFilter::IsNull { column } => column,
        }
    }

    pub fn matches(&self, row: &Row) -> bool {
        match self {
            ChangeFilter::Eq { column, value } => {
                row.column(column) == Some(Some(value.as_str()))
            }
            ChangeFilter::IsNull { column } => row.column(column) == Some(None),
        }
    }
}

fn filterable_columns(table: Table) -> &'static [&'static str] {
    match table {
        Table::Repairs => &["id", "user_id", "mechanic_id", "status"],
        Table::MechanicApplications => &["id", "user_id"],
    }
}

/// A live subscription. Dropping it (or calling `unsubscribe`) detaches it
/// from the feed.
pub struct Subscription {
    rx: broadcast::Receiver<ChangeEvent>,
    table: Table,
    filters: Vec<ChangeFilter>,
}

impl Subscription {
    pub fn matches(&self, event: &ChangeEvent) -> bool {
        event_matches(self.table, &self.filters, event)
    }

    /// Waits for the next matching event. Returns `None` once the feed is gone.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if self.matches(&event) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "realtime subscriber lagged, events dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    pub fn into_stream(self) -> impl Stream<Item = ChangeEvent> {
        let Subscription { rx, table, filters } = self;
        BroadcastStream::new(rx).filter_map(move |result| match result {
            Ok(event) if event_matches(table, &filters, &event) => Some(event),
            Ok(_) => None,
            Err(tokio_stream::wrappers::errors::BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "realtime stream lagged, events dropped");
                None
            }
        })
    }

    pub fn unsubscribe(self) {}
}

fn event_matches(table: Table, filters: &[ChangeFilter], event: &ChangeEvent) -> bool {
    event.table == table && event.rows().any(|row| filters.iter().all(|f| f.matches(row)))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::models::{
        AvailabilitySlot, Booking, BookingStatus, FuelType, MechanicApplication, Transmission,
        WorkType,
    };

    fn epoch() -> NaiveDateTime {
        chrono::NaiveDate::from_ymd_opt(2025, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn repair(id: &str, user_id: &str, mechanic_id: Option<&str>) -> Row {
        let now = epoch();
        Row::Repair(Box::new(Booking {
            id: id.to_string(),
            user_id: user_id.to_string(),
            mechanic_id: mechanic_id.map(str::to_string),
            reg_number: "ABC-123DE".to_string(),
            postcode: "100001".to_string(),
            make: "Honda".to_string(),
            model: "Civic".to_string(),
            year: 2012,
            transmission: Transmission::Manual,
            fuel_type: FuelType::Petrol,
            mileage: None,
            work_types: vec![WorkType::Repair],
            full_name: "Chidi Okafor".to_string(),
            phone: "08012345678".to_string(),
            email: "chidi@example.com".to_string(),
            address1: "3 Broad Street".to_string(),
            address2: None,
            city: "Lagos".to_string(),
            state: "Lagos".to_string(),
            country: "Nigeria".to_string(),
            problem_description: "Brakes squeal on every stop".to_string(),
            availability: vec![AvailabilitySlot {
                date: chrono::NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
                start: "09:00".to_string(),
                end: "10:00".to_string(),
            }],
            status: if mechanic_id.is_some() {
                BookingStatus::Accepted
            } else {
                BookingStatus::Pending
            },
            created_at: now,
            updated_at: now,
        }))
    }

    #[test]
    fn test_parse_filters() {
        assert_eq!(
            ChangeFilter::parse(Table::Repairs, "user_id=eq.u1").unwrap(),
            ChangeFilter::eq("user_id", "u1")
        );
        assert_eq!(
            ChangeFilter::parse(Table::Repairs, "mechanic_id=is.null").unwrap(),
            ChangeFilter::IsNull {
                column: "mechanic_id".to_string()
            }
        );
        assert!(ChangeFilter::parse(Table::Repairs, "phone=eq.0801").is_err());
        assert!(ChangeFilter::parse(Table::Repairs, "user_id=neq.u1").is_err());
        assert!(ChangeFilter::parse(Table::Repairs, "user_id=eq.").is_err());
        assert!(ChangeFilter::parse(Table::Repairs, "user_id").is_err());
        assert!(ChangeFilter::parse(Table::MechanicApplications, "mechanic_id=is.null").is_err());
    }

    #[test]
    fn test_filter_matches_rows() {
        let open = repair("r1", "u1", None);
        let taken = repair("r2", "u1", Some("m1"));

        let unassigned = ChangeFilter::parse(Table::Repairs, "mechanic_id=is.null").unwrap();
        assert!(unassigned.matches(&open));
        assert!(!unassigned.matches(&taken));

        let mine = ChangeFilter::eq("mechanic_id", "m1");
        assert!(mine.matches(&taken));
        assert!(!mine.matches(&open));
    }

    #[tokio::test]
    async fn test_subscription_receives_matching_events_only() {
        let feed = ChangeFeed::new(16);
        let mut sub = feed.subscribe(Table::Repairs, vec![ChangeFilter::eq("user_id", "u1")]);

        feed.publish(ChangeEvent::inserted(repair("r0", "u2", None)));
        feed.publish(ChangeEvent::inserted(repair("r1", "u1", None)));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.new.as_ref().and_then(|r| r.column("id")), Some(Some("r1")));
    }

    #[tokio::test]
    async fn test_update_matches_on_old_row() {
        let feed = ChangeFeed::new(16);
        let mut sub = feed.subscribe(
            Table::Repairs,
            vec![ChangeFilter::parse(Table::Repairs, "mechanic_id=is.null").unwrap()],
        );

        feed.publish(ChangeEvent::updated(
            repair("r1", "u1", None),
            repair("r1", "u1", Some("m1")),
        ));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.kind, crate::models::ChangeKind::Update);
    }

    #[tokio::test]
    async fn test_other_tables_are_ignored() {
        let feed = ChangeFeed::new(16);
        let mut sub = feed.subscribe(Table::MechanicApplications, vec![]);

        feed.publish(ChangeEvent::inserted(repair("r1", "u1", None)));
        feed.publish(ChangeEvent::inserted(Row::MechanicApplication(Box::new(
            MechanicApplication {
                id: "a1".to_string(),
                user_id: "u1".to_string(),
                first_name: "Tunde".to_string(),
                last_name: "Bello".to_string(),
                email: "t@example.com".to_string(),
                phone: "08011112222".to_string(),
                postcode: "100001".to_string(),
                address: None,
                police_report: "u1/reports/Tunde/1-r.pdf".to_string(),
                created_at: epoch(),
            },
        ))));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.table, Table::MechanicApplications);
    }

    #[tokio::test]
    async fn test_all_filters_must_match() {
        let feed = ChangeFeed::new(16);
        let mut sub = feed.subscribe(
            Table::Repairs,
            vec![ChangeFilter::eq("user_id", "u1"), ChangeFilter::eq("id", "r2")],
        );

        feed.publish(ChangeEvent::inserted(repair("r1", "u1", None)));
        feed.publish(ChangeEvent::inserted(repair("r2", "u2", None)));
        feed.publish(ChangeEvent::inserted(repair("r2", "u1", None)));

        let event = sub.recv().await.unwrap();
        assert_eq!(
            event.new.as_ref().and_then(|r| r.column("user_id")),
            Some(Some("u1"))
        );
        assert_eq!(event.new.as_ref().and_then(|r| r.column("id")), Some(Some("r2")));
    }

    #[tokio::test]
    async fn test_unsubscribe_detaches() {
        let feed = ChangeFeed::new(16);
        let sub = feed.subscribe(Table::Repairs, vec![]);
        assert_eq!(feed.tx.receiver_count(), 1);
        sub.unsubscribe();
        assert_eq!(feed.tx.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_filters_events() {
        let feed = ChangeFeed::new(16);
        let stream = feed
            .subscribe(Table::Repairs, vec![ChangeFilter::eq("user_id", "u1")])
            .into_stream();
        tokio::pin!(stream);

        feed.publish(ChangeEvent::inserted(repair("r0", "u2", None)));
        feed.publish(ChangeEvent::deleted(repair("r1", "u1", None)));

        let event = stream.next().await.unwrap();
        assert_eq!(event.kind, crate::models::ChangeKind::Delete);
    }
}
