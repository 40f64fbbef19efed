use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Weekday};
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::data::DataRow;
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::SharedPasswordAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

/// Who is on the other end of a connection.
struct Session {
    engine: Arc<Engine>,
    user: String,
    admin: bool,
}

pub struct SpacebookHandler {
    tenant_manager: Arc<TenantManager>,
    admins: Arc<HashSet<String>>,
    query_parser: Arc<SpacebookQueryParser>,
}

impl SpacebookHandler {
    pub fn new(tenant_manager: Arc<TenantManager>, admins: Arc<HashSet<String>>) -> Self {
        Self {
            tenant_manager,
            admins,
            query_parser: Arc::new(SpacebookQueryParser),
        }
    }

    fn session<C: ClientInfo>(&self, client: &C) -> PgWireResult<Session> {
        let metadata = client.metadata();
        let db = metadata
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        let user = metadata.get("user").cloned().unwrap_or_default();
        let engine = self.tenant_manager.get_or_create(&db).map_err(|e| {
            user_error("08006", format!("tenant error: {e}"))
        })?;
        Ok(Session {
            engine,
            admin: self.admins.contains(&user),
            user,
        })
    }

    /// Run one command, recording RED metrics for it.
    async fn execute(&self, session: &Session, cmd: Command) -> PgWireResult<Response> {
        let label = observability::command_label(&cmd);
        let start = Instant::now();
        let result = self.execute_command(session, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        result
    }

    async fn execute_command(&self, session: &Session, cmd: Command) -> PgWireResult<Response> {
        let engine = &session.engine;
        let user = session.user.as_str();
        match cmd {
            Command::InsertSpace(req) => {
                require_admin(session)?;
                engine.create_space(req).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateSpace { id, changes } => {
                require_admin(session)?;
                engine.update_space(id, changes).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteSpace { id } => {
                require_admin(session)?;
                engine.delete_space(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectSpaces(mut filter) => {
                // Inactive spaces are an administrator's concern.
                if !session.admin && filter.active.is_none() {
                    filter.active = Some(true);
                }
                let spaces = engine.list_spaces(&filter).await;
                space_rows(&spaces)
            }
            Command::SelectSpaceTypes => {
                let schema = Arc::new(space_types_schema());
                let rows: Vec<PgWireResult<DataRow>> = engine
                    .space_types()
                    .await
                    .into_iter()
                    .map(|kind| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&kind)?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::InsertBooking(req) => {
                engine.create_booking(user, req).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("INSERT").with_rows(1)))
            }
            Command::UpdateBooking { id, changes } => {
                engine
                    .update_booking(id, user, changes)
                    .await
                    .map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::CancelBooking { id } => {
                engine.cancel_booking(id, user).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::ConfirmBooking { id } => {
                require_admin(session)?;
                engine.confirm_booking(id).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("UPDATE").with_rows(1)))
            }
            Command::DeleteBooking { id } => {
                engine.delete_booking(id, user).await.map_err(engine_err)?;
                Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
            }
            Command::SelectBooking { id } => {
                let detail = engine.get_owned_booking(id, user).await.map_err(engine_err)?;
                booking_rows(std::slice::from_ref(&detail))
            }
            Command::SelectUserBookings(filter) => {
                let bookings = engine.list_user_bookings(user, &filter).await;
                booking_rows(&bookings)
            }
            Command::SelectSpaceBookings { space_id, from, to } => {
                let bookings = engine
                    .space_bookings(space_id, from, to)
                    .await
                    .map_err(engine_err)?;
                booking_rows(&bookings)
            }
            Command::SelectAvailability {
                space_id,
                date,
                slot: Some(slot),
                ..
            } => {
                let conflict = engine
                    .check_availability(space_id, date, slot)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(slot_check_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&space_id.to_string())?;
                encoder.encode_field(&fmt_date(date))?;
                encoder.encode_field(&fmt_time(slot.start))?;
                encoder.encode_field(&fmt_time(slot.end))?;
                encoder.encode_field(&conflict.is_none())?;
                encoder.encode_field(&conflict.map(|id| id.to_string()))?;
                let rows = vec![Ok(encoder.take_row())];
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
            Command::SelectAvailability {
                space_id,
                date,
                slot: None,
                min_duration,
            } => {
                let windows = engine
                    .availability(space_id, date, min_duration)
                    .await
                    .map_err(engine_err)?;
                let schema = Arc::new(availability_schema());
                let sid = space_id.to_string();
                let day = fmt_date(date);
                let rows: Vec<PgWireResult<DataRow>> = windows
                    .into_iter()
                    .map(|w| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&sid)?;
                        encoder.encode_field(&day)?;
                        encoder.encode_field(&fmt_time(w.start))?;
                        encoder.encode_field(&fmt_time(w.end))?;
                        encoder.encode_field(&w.duration_minutes())?;
                        Ok(encoder.take_row())
                    })
                    .collect();
                Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
            }
        }
    }
}

fn require_admin(session: &Session) -> PgWireResult<()> {
    if session.admin {
        return Ok(());
    }
    Err(user_error(
        "42501",
        format!("user {:?} is not an administrator", session.user),
    ))
}

// ── Row rendering ────────────────────────────────────────────────

const DAY_NAMES: [(Weekday, &str); 7] = [
    (Weekday::Mon, "monday"),
    (Weekday::Tue, "tuesday"),
    (Weekday::Wed, "wednesday"),
    (Weekday::Thu, "thursday"),
    (Weekday::Fri, "friday"),
    (Weekday::Sat, "saturday"),
    (Weekday::Sun, "sunday"),
];

fn fmt_date(d: NaiveDate) -> String {
    d.format("%Y-%m-%d").to_string()
}

fn fmt_time(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

fn fmt_timestamp(ts: NaiveDateTime) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Same shape `available_hours` is written in.
fn hours_json(hours: &WeeklyHours) -> String {
    let mut map = serde_json::Map::new();
    for (day, name) in DAY_NAMES {
        if let Some(w) = hours.get(day) {
            map.insert(
                name.to_string(),
                serde_json::json!({ "start": fmt_time(w.start), "end": fmt_time(w.end) }),
            );
        }
    }
    serde_json::Value::Object(map).to_string()
}

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn typed_field(name: &str, ty: Type) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, ty, FieldFormat::Text)
}

fn space_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("name"),
        text_field("description"),
        text_field("type"),
        typed_field("capacity", Type::INT8),
        text_field("photos"),
        text_field("available_hours"),
        typed_field("active", Type::BOOL),
        text_field("created_at"),
        text_field("updated_at"),
    ]
}

fn space_types_schema() -> Vec<FieldInfo> {
    vec![text_field("type")]
}

fn booking_schema() -> Vec<FieldInfo> {
    vec![
        text_field("id"),
        text_field("space_id"),
        text_field("space_name"),
        text_field("owner"),
        text_field("date"),
        text_field("start_time"),
        text_field("end_time"),
        typed_field("duration_minutes", Type::INT8),
        typed_field("attendees", Type::INT8),
        text_field("purpose"),
        text_field("notes"),
        text_field("status"),
        text_field("created_at"),
        text_field("updated_at"),
    ]
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        text_field("space_id"),
        text_field("date"),
        text_field("start_time"),
        text_field("end_time"),
        typed_field("duration_minutes", Type::INT8),
    ]
}

fn slot_check_schema() -> Vec<FieldInfo> {
    vec![
        text_field("space_id"),
        text_field("date"),
        text_field("start_time"),
        text_field("end_time"),
        typed_field("available", Type::BOOL),
        text_field("conflicting_booking_id"),
    ]
}

fn space_rows(spaces: &[Space]) -> PgWireResult<Response> {
    let schema = Arc::new(space_schema());
    let rows: Vec<PgWireResult<DataRow>> = spaces
        .iter()
        .map(|s| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&s.id.to_string())?;
            encoder.encode_field(&s.name)?;
            encoder.encode_field(&s.description)?;
            encoder.encode_field(&s.kind)?;
            encoder.encode_field(&i64::from(s.capacity))?;
            encoder.encode_field(&serde_json::to_string(&s.photos).unwrap_or_default())?;
            encoder.encode_field(&s.hours.as_ref().map(hours_json))?;
            encoder.encode_field(&s.active)?;
            encoder.encode_field(&fmt_timestamp(s.created_at))?;
            encoder.encode_field(&fmt_timestamp(s.updated_at))?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn booking_rows(details: &[BookingDetail]) -> PgWireResult<Response> {
    let schema = Arc::new(booking_schema());
    let rows: Vec<PgWireResult<DataRow>> = details
        .iter()
        .map(|d| {
            let b = &d.booking;
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&b.id.to_string())?;
            encoder.encode_field(&b.space_id.to_string())?;
            encoder.encode_field(&d.space.name)?;
            encoder.encode_field(&b.owner)?;
            encoder.encode_field(&fmt_date(b.date))?;
            encoder.encode_field(&fmt_time(b.slot.start))?;
            encoder.encode_field(&fmt_time(b.slot.end))?;
            encoder.encode_field(&b.duration_minutes())?;
            encoder.encode_field(&i64::from(b.attendees))?;
            encoder.encode_field(&b.purpose)?;
            encoder.encode_field(&b.notes)?;
            encoder.encode_field(&d.effective_status.as_str().to_string())?;
            encoder.encode_field(&fmt_timestamp(b.created_at))?;
            encoder.encode_field(&fmt_timestamp(b.updated_at))?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

/// Result columns for a statement, known before its parameters are bound.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let mut words = sql.split_whitespace();
    let is_select = words
        .next()
        .is_some_and(|w| w.eq_ignore_ascii_case("select"));
    if !is_select {
        return vec![];
    }
    let table = words
        .skip_while(|w| !w.eq_ignore_ascii_case("from"))
        .nth(1)
        .map(|t| t.trim_end_matches(';').to_lowercase());
    match table.as_deref() {
        Some("spaces") => space_schema(),
        Some("space_types") => space_types_schema(),
        Some("bookings") => booking_schema(),
        Some("availability") if sql.to_lowercase().contains("start_time") => slot_check_schema(),
        Some("availability") => availability_schema(),
        _ => vec![],
    }
}

#[async_trait]
impl SimpleQueryHandler for SpacebookHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let session = self.session(client)?;
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        Ok(vec![self.execute(&session, cmd).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SpacebookQueryParser;

#[async_trait]
impl QueryParser for SpacebookQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SpacebookHandler {
    type Statement = String;
    type QueryParser = SpacebookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let session = self.session(client)?;
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        self.execute(&session, cmd).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement),
        ))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
        )))
    }
}

/// Highest `$N` placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Substitute `$1, $2, ...` with bound parameter values (text format),
/// highest first so `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut result = portal.statement.statement.to_string();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let placeholder = format!("${}", i + 1);
        let value = match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        };
        result = result.replace(&placeholder, &value);
    }
    result
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SpacebookFactory {
    handler: Arc<SpacebookHandler>,
    auth_handler: Arc<
        CleartextPasswordAuthStartupHandler<SharedPasswordAuthSource, DefaultServerParameterProvider>,
    >,
    noop: Arc<NoopHandler>,
}

impl SpacebookFactory {
    pub fn new(
        tenant_manager: Arc<TenantManager>,
        password: String,
        admins: HashSet<String>,
    ) -> Self {
        let auth_source = SharedPasswordAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(SpacebookHandler::new(tenant_manager, Arc::new(admins))),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SpacebookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<SpacebookFactory>,
    tls: Option<TlsAcceptor>,
) -> std::io::Result<()> {
    pgwire::tokio::process_socket(socket, tls, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn user_error(code: &str, message: String) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        message,
    )))
}

fn engine_err(e: EngineError) -> PgWireError {
    user_error(e.sqlstate(), e.to_string())
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    user_error("42601", e.to_string())
}
