use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::Sink;
use futures::stream;
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
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;
use tokio::time::Instant;

use crate::auth::AvaildAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::AvailabilityRecord;
use crate::sql::{self, Command};
use crate::tenant::TenantManager;

pub struct AvaildHandler {
    tenant_manager: Arc<TenantManager>,
    query_parser: Arc<AvaildQueryParser>,
    statement_timeout: Option<Duration>,
}

impl AvaildHandler {
    pub fn new(tenant_manager: Arc<TenantManager>, statement_timeout: Option<Duration>) -> Self {
        Self {
            tenant_manager,
            query_parser: Arc::new(AvaildQueryParser),
            statement_timeout,
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    fn deadline(&self) -> Option<Instant> {
        self.statement_timeout.map(|t| Instant::now() + t)
    }

    async fn execute_command(
        &self,
        engine: &Engine,
        cmd: Command,
        updated_by: Option<&str>,
    ) -> PgWireResult<Vec<Response>> {
        let label = crate::observability::command_label(&cmd);
        let start = std::time::Instant::now();
        let result = self.dispatch_command(engine, cmd, updated_by).await;
        metrics::histogram!(crate::observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(start.elapsed().as_secs_f64());
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(
            crate::observability::QUERIES_TOTAL,
            "command" => label,
            "status" => status
        )
        .increment(1);
        result
    }

    async fn dispatch_command(
        &self,
        engine: &Engine,
        cmd: Command,
        updated_by: Option<&str>,
    ) -> PgWireResult<Vec<Response>> {
        match cmd {
            Command::UpsertCell {
                unit_id,
                date,
                status,
                notes,
            } => {
                engine
                    .upsert_one(unit_id, date, status, notes, updated_by)
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(Tag::new("INSERT").with_rows(1))])
            }
            Command::UpsertCells { cells } => {
                let applied = engine
                    .upsert_many(cells, updated_by, self.deadline())
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(
                    Tag::new("INSERT").with_rows(applied.len()),
                )])
            }
            Command::BulkUpdate {
                unit_ids,
                dates,
                status,
                notes,
            } => {
                let applied = engine
                    .bulk_apply(
                        &unit_ids,
                        &dates,
                        status,
                        notes.as_deref(),
                        updated_by,
                        self.deadline(),
                    )
                    .await
                    .map_err(engine_err)?;
                Ok(vec![Response::Execution(
                    Tag::new("UPDATE").with_rows(applied.len()),
                )])
            }
            Command::SelectRange { unit_ids, from, to } => {
                let records = engine
                    .query_range(&unit_ids, from, to, self.deadline())
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(availability_schema());
                let rows: Vec<PgWireResult<_>> = records
                    .into_iter()
                    .map(|record| encode_record(&schema, &record))
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectAvailableCount { date, unit_ids } => {
                let available = engine
                    .available_count(date, &unit_ids, self.deadline())
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(available_count_schema());
                let mut encoder = DataRowEncoder::new(schema.clone());
                encoder.encode_field(&date.to_string())?;
                encoder.encode_field(&(available as i64))?;
                let rows = vec![Ok(encoder.take_row())];

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::SelectStatusCounts { date, unit_ids } => {
                let counts = engine
                    .count_by_status(date, &unit_ids, self.deadline())
                    .await
                    .map_err(engine_err)?;

                let schema = Arc::new(status_counts_schema());
                let date_str = date.to_string();
                let rows: Vec<PgWireResult<_>> = counts
                    .into_iter()
                    .map(|(status, count)| {
                        let mut encoder = DataRowEncoder::new(schema.clone());
                        encoder.encode_field(&date_str)?;
                        encoder.encode_field(&status.token())?;
                        encoder.encode_field(&(count as i64))?;
                        Ok(encoder.take_row())
                    })
                    .collect();

                Ok(vec![Response::Query(QueryResponse::new(
                    schema,
                    stream::iter(rows),
                ))])
            }
            Command::ClearCell { unit_id, date } => {
                let removed = engine.clear(unit_id, date).await.map_err(engine_err)?;
                Ok(vec![Response::Execution(
                    Tag::new("DELETE").with_rows(usize::from(removed)),
                )])
            }
        }
    }
}

fn availability_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("unit_id".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("date".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("status".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("notes".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new(
            "updated_by".into(),
            None,
            None,
            Type::VARCHAR,
            FieldFormat::Text,
        ),
        FieldInfo::new("updated_at".into(), None, None, Type::INT8, FieldFormat::Text),
    ]
}

fn available_count_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("date".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("available".into(), None, None, Type::INT8, FieldFormat::Text),
    ]
}

fn status_counts_schema() -> Vec<FieldInfo> {
    vec![
        FieldInfo::new("date".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("status".into(), None, None, Type::VARCHAR, FieldFormat::Text),
        FieldInfo::new("count".into(), None, None, Type::INT8, FieldFormat::Text),
    ]
}

fn encode_record(
    schema: &Arc<Vec<FieldInfo>>,
    record: &AvailabilityRecord,
) -> PgWireResult<pgwire::messages::data::DataRow> {
    let mut encoder = DataRowEncoder::new(schema.clone());
    encoder.encode_field(&record.unit_id.to_string())?;
    encoder.encode_field(&record.date.to_string())?;
    encoder.encode_field(&record.status.token())?;
    encoder.encode_field(&record.notes)?;
    encoder.encode_field(&record.updated_by)?;
    encoder.encode_field(&record.updated_at)?;
    Ok(encoder.take_row())
}

#[async_trait]
impl SimpleQueryHandler for AvaildHandler {
    async fn do_query<C>(&self, client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let engine = self.resolve_engine(client)?;
        let updated_by = client.metadata().get("user").cloned();
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        self.execute_command(&engine, cmd, updated_by.as_deref())
            .await
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct AvaildQueryParser;

#[async_trait]
impl QueryParser for AvaildQueryParser {
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
        Ok(result_schema_for(stmt))
    }
}

/// Sniff the result schema from the statement text. SELECTs against the
/// three virtual tables are the only row-returning commands.
fn result_schema_for(sql: &str) -> Vec<FieldInfo> {
    let upper = sql.to_uppercase();
    if !upper.contains("SELECT") {
        return vec![];
    }
    if upper.contains("STATUS_COUNTS") {
        status_counts_schema()
    } else if upper.contains("AVAILABLE_COUNT") {
        available_count_schema()
    } else if upper.contains("AVAILABILITY") {
        availability_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl ExtendedQueryHandler for AvaildHandler {
    type Statement = String;
    type QueryParser = AvaildQueryParser;

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
        let engine = self.resolve_engine(client)?;
        let updated_by = client.metadata().get("user").cloned();
        let sql = substitute_params(portal);
        let cmd = sql::parse_sql(&sql).map_err(sql_err)?;
        let mut responses = self
            .execute_command(&engine, cmd, updated_by.as_deref())
            .await?;
        Ok(responses.remove(0))
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
            result_schema_for(&target.statement),
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
        Ok(DescribePortalResponse::new(result_schema_for(
            &target.statement.statement,
        )))
    }
}

/// Count the highest $N parameter placeholder in the SQL string.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            i += 1;
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            if i > start
                && let Ok(n) = sql[start..i].parse::<usize>()
                && n > max
            {
                max = n;
            }
        } else {
            i += 1;
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values
/// (text format).
fn substitute_params(portal: &Portal<String>) -> String {
    let sql = portal.statement.statement.to_string();
    let params = &portal.parameters;
    let mut result = sql;

    for (i, param) in params.iter().enumerate().rev() {
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

pub struct AvaildFactory {
    handler: Arc<AvaildHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<AvaildAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl AvaildFactory {
    pub fn new(
        tenant_manager: Arc<TenantManager>,
        password: String,
        statement_timeout: Option<Duration>,
    ) -> Self {
        let auth_source = AvaildAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(AvaildHandler::new(tenant_manager, statement_timeout)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for AvaildFactory {
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

/// Serve one client connection to completion.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    tls: Option<TlsAcceptor>,
    statement_timeout: Option<Duration>,
) -> Result<(), io::Error> {
    let factory = AvaildFactory::new(tenant_manager, password, statement_timeout);
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn engine_err(e: EngineError) -> PgWireError {
    let code = match &e {
        EngineError::Validation(_) => "22000",
        EngineError::InvalidRequest(_) => "22023",
        EngineError::BulkWrite { .. } => "22000",
        EngineError::LimitExceeded(_) => "54000",
        EngineError::Storage(_) => "08006",
        EngineError::Cancelled => "57014",
    };
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        code.into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}
