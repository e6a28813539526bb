use crate::schema::{availability, events, participants};
use crate::{
    backend::{AvailabilityBackend, StoreError},
    live::{ChangeNotifier, Subscription},
    types::{
        Event, NewEvent, NewParticipant, Participant, ParticipantRef, PresenceEntry,
        SlotCoordinate,
    },
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use diesel::{
    dsl::exists, select, Connection, ConnectionError, ExpressionMethods, Insertable,
    OptionalExtension, PgConnection, QueryDsl, Queryable, RunQueryDsl,
};
use std::{
    collections::HashSet,
    sync::{Arc, Mutex},
};
use tracing::error;
use uuid::Uuid;

#[derive(Queryable, Insertable, Clone)]
#[diesel(table_name = events)]
struct EventRow {
    id: Uuid,
    name: String,
    password: Option<String>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    created_at: DateTime<Utc>,
}

impl From<Event> for EventRow {
    fn from(event: Event) -> Self {
        Self {
            id: event.id,
            name: event.name,
            password: event.password,
            start_date: event.start_date,
            end_date: event.end_date,
            start_time: event.start_time,
            end_time: event.end_time,
            created_at: event.created_at,
        }
    }
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            password: row.password,
            start_date: row.start_date,
            end_date: row.end_date,
            start_time: row.start_time,
            end_time: row.end_time,
            created_at: row.created_at,
        }
    }
}

#[derive(Queryable, Insertable, Clone)]
#[diesel(table_name = participants)]
struct ParticipantRow {
    id: Uuid,
    event_id: Uuid,
    name: String,
    creator: bool,
    created_at: DateTime<Utc>,
}

impl From<Participant> for ParticipantRow {
    fn from(participant: Participant) -> Self {
        Self {
            id: participant.id,
            event_id: participant.event_id,
            name: participant.name,
            creator: participant.creator,
            created_at: participant.created_at,
        }
    }
}

impl From<ParticipantRow> for Participant {
    fn from(row: ParticipantRow) -> Self {
        Self {
            id: row.id,
            event_id: row.event_id,
            name: row.name,
            creator: row.creator,
            created_at: row.created_at,
        }
    }
}

#[derive(Insertable)]
#[diesel(table_name = availability)]
struct NewPresence {
    id: Uuid,
    event_id: Uuid,
    participant_id: Uuid,
    date: NaiveDate,
    time: NaiveTime,
    created_at: DateTime<Utc>,
}

fn storage_error(err: diesel::result::Error) -> StoreError {
    error!(%err, "Database query failed");
    StoreError::Storage(err.to_string())
}

fn event_exists(connection: &mut PgConnection, event_id: Uuid) -> Result<bool, StoreError> {
    select(exists(events::table.find(event_id)))
        .get_result(connection)
        .map_err(storage_error)
}

fn check_membership(
    connection: &mut PgConnection,
    event_id: Uuid,
    participant_id: Uuid,
) -> Result<(), StoreError> {
    if !event_exists(connection, event_id)? {
        return Err(StoreError::EventNotFound(event_id));
    }
    let member: bool = select(exists(
        participants::table
            .find(participant_id)
            .filter(participants::event_id.eq(event_id)),
    ))
    .get_result(connection)
    .map_err(storage_error)?;
    if !member {
        return Err(StoreError::ParticipantNotFound(participant_id));
    }
    Ok(())
}

#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
    notifier: ChangeNotifier,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, ConnectionError> {
        let connection = Self::establish_connection(database_url)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
            notifier: ChangeNotifier::default(),
        })
    }

    fn establish_connection(database_url: &str) -> Result<PgConnection, ConnectionError> {
        PgConnection::establish(database_url)
    }

    /// Runs blocking diesel calls off the async runtime.
    async fn run<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let connection = self.connection.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = connection
                .lock()
                .map_err(|_| StoreError::Storage("Database connection poisoned".into()))?;
            query(&mut connection)
        })
        .await
        .map_err(|err| StoreError::Storage(err.to_string()))?
    }

    #[cfg(test)]
    fn remove_all(&self) {
        let mut connection = self.connection.lock().unwrap();
        diesel::delete(events::table)
            .execute(&mut *connection)
            .unwrap();
    }
}

#[async_trait]
impl AvailabilityBackend for DatabaseInterface {
    async fn create_event(&self, new_event: NewEvent) -> Result<Event, StoreError> {
        let row = EventRow::from(new_event.into_event());
        self.run(move |connection| {
            diesel::insert_into(events::table)
                .values(&row)
                .execute(connection)
                .map_err(storage_error)?;
            Ok(row.into())
        })
        .await
    }

    async fn create_participant(
        &self,
        new_participant: NewParticipant,
    ) -> Result<Participant, StoreError> {
        let row = ParticipantRow::from(new_participant.into_participant());
        self.run(move |connection| {
            if !event_exists(connection, row.event_id)? {
                return Err(StoreError::EventNotFound(row.event_id));
            }
            diesel::insert_into(participants::table)
                .values(&row)
                .execute(connection)
                .map_err(storage_error)?;
            Ok(row.into())
        })
        .await
    }

    async fn event(&self, event_id: Uuid) -> Result<Event, StoreError> {
        self.run(move |connection| {
            events::table
                .find(event_id)
                .first::<EventRow>(connection)
                .optional()
                .map_err(storage_error)?
                .map(Event::from)
                .ok_or(StoreError::EventNotFound(event_id))
        })
        .await
    }

    async fn participant(&self, participant_id: Uuid) -> Result<Participant, StoreError> {
        self.run(move |connection| {
            participants::table
                .find(participant_id)
                .first::<ParticipantRow>(connection)
                .optional()
                .map_err(storage_error)?
                .map(Participant::from)
                .ok_or(StoreError::ParticipantNotFound(participant_id))
        })
        .await
    }

    async fn participants(&self, event_id: Uuid) -> Result<Vec<Participant>, StoreError> {
        self.run(move |connection| {
            if !event_exists(connection, event_id)? {
                return Err(StoreError::EventNotFound(event_id));
            }
            let rows = participants::table
                .filter(participants::event_id.eq(event_id))
                .order(participants::created_at.asc())
                .load::<ParticipantRow>(connection)
                .map_err(storage_error)?;
            Ok(rows.into_iter().map(Participant::from).collect())
        })
        .await
    }

    async fn count_participants(&self, event_id: Uuid) -> Result<usize, StoreError> {
        self.run(move |connection| {
            let count: i64 = participants::table
                .filter(participants::event_id.eq(event_id))
                .count()
                .get_result(connection)
                .map_err(storage_error)?;
            Ok(count as usize)
        })
        .await
    }

    async fn record_presence(
        &self,
        event_id: Uuid,
        participant_id: Uuid,
        coordinate: SlotCoordinate,
    ) -> Result<(), StoreError> {
        let inserted = self
            .run(move |connection| {
                check_membership(connection, event_id, participant_id)?;
                let presence = NewPresence {
                    id: Uuid::new_v4(),
                    event_id,
                    participant_id,
                    date: coordinate.date,
                    time: coordinate.time,
                    created_at: Utc::now(),
                };
                diesel::insert_into(availability::table)
                    .values(&presence)
                    .on_conflict_do_nothing()
                    .execute(connection)
                    .map_err(storage_error)
            })
            .await?;
        if inserted > 0 {
            self.notifier.notify(event_id);
        }
        Ok(())
    }

    async fn clear_presence(
        &self,
        event_id: Uuid,
        participant_id: Uuid,
        coordinate: SlotCoordinate,
    ) -> Result<(), StoreError> {
        let removed = self
            .run(move |connection| {
                check_membership(connection, event_id, participant_id)?;
                diesel::delete(
                    availability::table
                        .filter(availability::event_id.eq(event_id))
                        .filter(availability::participant_id.eq(participant_id))
                        .filter(availability::date.eq(coordinate.date))
                        .filter(availability::time.eq(coordinate.time)),
                )
                .execute(connection)
                .map_err(storage_error)
            })
            .await?;
        if removed > 0 {
            self.notifier.notify(event_id);
        }
        Ok(())
    }

    async fn presence_for_participant(
        &self,
        event_id: Uuid,
        participant_id: Uuid,
    ) -> Result<HashSet<SlotCoordinate>, StoreError> {
        self.run(move |connection| {
            check_membership(connection, event_id, participant_id)?;
            let rows = availability::table
                .filter(availability::event_id.eq(event_id))
                .filter(availability::participant_id.eq(participant_id))
                .select((availability::date, availability::time))
                .load::<(NaiveDate, NaiveTime)>(connection)
                .map_err(storage_error)?;
            Ok(rows
                .into_iter()
                .map(|(date, time)| SlotCoordinate::new(date, time))
                .collect())
        })
        .await
    }

    async fn presence_for_event(&self, event_id: Uuid) -> Result<Vec<PresenceEntry>, StoreError> {
        self.run(move |connection| {
            if !event_exists(connection, event_id)? {
                return Err(StoreError::EventNotFound(event_id));
            }
            let rows = availability::table
                .inner_join(participants::table)
                .filter(availability::event_id.eq(event_id))
                .order(availability::created_at.asc())
                .select((
                    availability::date,
                    availability::time,
                    participants::id,
                    participants::name,
                ))
                .load::<(NaiveDate, NaiveTime, Uuid, String)>(connection)
                .map_err(storage_error)?;
            Ok(rows
                .into_iter()
                .map(|(date, time, id, name)| PresenceEntry {
                    coordinate: SlotCoordinate::new(date, time),
                    participant: ParticipantRef { id, name },
                })
                .collect())
        })
        .await
    }

    fn subscribe(&self, event_id: Uuid) -> Subscription {
        self.notifier.subscribe(event_id)
    }
}
