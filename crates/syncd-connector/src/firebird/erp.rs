//! Synchronous Firebird access, isolated behind `spawn_blocking` calls so the
//! async loops in [`super::ingestor`], [`super::status`] and
//! [`super::updater`] never block the runtime on driver I/O (§5: "Database
//! work runs on a worker pool").

use chrono::{DateTime, Utc};
use rsfbclient::{Connection, ConnectionBuilder, Queryable, Transaction};
use syncd_config::ErpConfig;

use crate::error::ConnectorError;

#[derive(Debug, Clone)]
pub struct LogRow {
    pub id: i64,
    pub sale_id: String,
    pub action: String,
    pub log_date: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SaleDetail {
    pub sale_id: String,
    pub customer_name: String,
    pub address: String,
    pub customer_contact: Option<String>,
    pub address2: Option<String>,
    pub neighbourhood: Option<String>,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub fn connect(cfg: &ErpConfig) -> Result<Connection, ConnectorError> {
    ConnectionBuilder::default()
        .host(&cfg.host)
        .db_name(&cfg.file)
        .user(&cfg.user)
        .pass(&cfg.password)
        .connect()
        .map_err(|e| ConnectorError::ErpIo(format!("connect: {e}")))
}

/// Installs the schema triplet (sequence, log table, triggers) if absent.
/// Idempotent: every statement is catalog-guarded, matching the invariant
/// that running setup twice is a no-op after the first (§8).
pub fn install_schema(conn: &mut Connection) -> Result<(), ConnectorError> {
    let sequence_exists: Vec<(i32,)> = conn
        .query(
            "SELECT 1 FROM RDB$GENERATORS WHERE RDB$GENERATOR_NAME = 'DELIVERYLOG_ID_AUTOINCREMENT'",
            (),
        )
        .map_err(|e| ConnectorError::SchemaInstall(e.to_string()))?;
    if sequence_exists.is_empty() {
        conn.execute("CREATE SEQUENCE DELIVERYLOG_ID_AUTOINCREMENT", ())
            .map_err(|e| ConnectorError::SchemaInstall(e.to_string()))?;
    }

    let table_exists: Vec<(i32,)> = conn
        .query(
            "SELECT 1 FROM RDB$RELATIONS WHERE RDB$RELATION_NAME = 'DELIVERYLOG'",
            (),
        )
        .map_err(|e| ConnectorError::SchemaInstall(e.to_string()))?;
    if table_exists.is_empty() {
        conn.execute(
            "CREATE TABLE DELIVERYLOG (
                Id INTEGER NOT NULL PRIMARY KEY,
                CD_VENDA DOUBLE PRECISION,
                Action VARCHAR(20) NOT NULL,
                LogDate TIMESTAMP DEFAULT CURRENT_TIMESTAMP NOT NULL
            )",
            (),
        )
        .map_err(|e| ConnectorError::SchemaInstall(e.to_string()))?;
    }

    let before_insert_exists: Vec<(i32,)> = conn
        .query(
            "SELECT 1 FROM RDB$TRIGGERS WHERE RDB$TRIGGER_NAME = 'DELIVERYLOG_BI'",
            (),
        )
        .map_err(|e| ConnectorError::SchemaInstall(e.to_string()))?;
    if before_insert_exists.is_empty() {
        conn.execute(
            "CREATE TRIGGER DELIVERYLOG_BI FOR DELIVERYLOG
             ACTIVE BEFORE INSERT POSITION 0
             AS BEGIN
                IF (NEW.Id IS NULL) THEN
                    NEW.Id = NEXT VALUE FOR DELIVERYLOG_ID_AUTOINCREMENT;
             END",
            (),
        )
        .map_err(|e| ConnectorError::SchemaInstall(e.to_string()))?;
    }

    let after_trigger_exists: Vec<(i32,)> = conn
        .query(
            "SELECT 1 FROM RDB$TRIGGERS WHERE RDB$TRIGGER_NAME = 'DELIVERIES_AIUD'",
            (),
        )
        .map_err(|e| ConnectorError::SchemaInstall(e.to_string()))?;
    if after_trigger_exists.is_empty() {
        conn.execute(
            "CREATE TRIGGER DELIVERIES_AIUD FOR DELIVERIES
             ACTIVE AFTER INSERT OR UPDATE OR DELETE POSITION 0
             AS BEGIN
                IF (INSERTING) THEN
                    INSERT INTO DELIVERYLOG (CD_VENDA, Action) VALUES (NEW.CD_VENDA, 'INSERT');
                ELSE IF (UPDATING) THEN
                    INSERT INTO DELIVERYLOG (CD_VENDA, Action) VALUES (NEW.CD_VENDA, 'UPDATE');
                ELSE IF (DELETING) THEN
                    INSERT INTO DELIVERYLOG (CD_VENDA, Action) VALUES (OLD.CD_VENDA, 'DELETE');
             END",
            (),
        )
        .map_err(|e| ConnectorError::SchemaInstall(e.to_string()))?;
    }

    Ok(())
}

pub fn fetch_logs_since_time(
    conn: &mut Connection,
    since: DateTime<Utc>,
) -> Result<Vec<LogRow>, ConnectorError> {
    let rows: Vec<(i64, f64, String, DateTime<Utc>)> = conn
        .query(
            "SELECT Id, CD_VENDA, Action, LogDate FROM DELIVERYLOG
             WHERE LogDate >= ? ORDER BY Id ASC",
            (since,),
        )
        .map_err(|e| ConnectorError::ErpIo(e.to_string()))?;
    Ok(rows
        .into_iter()
        .map(|(id, sale_id, action, log_date)| LogRow {
            id,
            sale_id: (sale_id as i64).to_string(),
            action,
            log_date,
        })
        .collect())
}

pub fn fetch_logs_since_id(
    conn: &mut Connection,
    last_id: i64,
) -> Result<Vec<LogRow>, ConnectorError> {
    let rows: Vec<(i64, f64, String, DateTime<Utc>)> = conn
        .query(
            "SELECT Id, CD_VENDA, Action, LogDate FROM DELIVERYLOG
             WHERE Id > ? ORDER BY Id ASC",
            (last_id,),
        )
        .map_err(|e| ConnectorError::ErpIo(e.to_string()))?;
    Ok(rows
        .into_iter()
        .map(|(id, sale_id, action, log_date)| LogRow {
            id,
            sale_id: (sale_id as i64).to_string(),
            action,
            log_date,
        })
        .collect())
}

pub fn fetch_sale_details(
    conn: &mut Connection,
    sale_ids: &[String],
) -> Result<Vec<SaleDetail>, ConnectorError> {
    let mut out = Vec::with_capacity(sale_ids.len());
    for sale_id in sale_ids {
        let rows: Vec<(
            f64,
            String,
            String,
            Option<String>,
            Option<String>,
            Option<String>,
            Option<String>,
            DateTime<Utc>,
        )> = conn
            .query(
                "SELECT d.CD_VENDA, c.NOME, d.ENDERECO, c.TELEFONE, d.COMPLEMENTO, d.BAIRRO, d.REFERENCIA, v.DATA
                 FROM DELIVERIES d
                 JOIN SALES v ON v.CD_VENDA = d.CD_VENDA
                 JOIN CUSTOMERS c ON c.CD_CLIENTE = v.CD_CLIENTE
                 WHERE d.CD_VENDA = ?",
                (sale_id.parse::<f64>().unwrap_or(0.0),),
            )
            .map_err(|e| ConnectorError::ErpIo(e.to_string()))?;
        if let Some((cd_venda, nome, endereco, telefone, complemento, bairro, referencia, data)) =
            rows.into_iter().next()
        {
            out.push(SaleDetail {
                sale_id: (cd_venda as i64).to_string(),
                customer_name: nome,
                address: endereco,
                customer_contact: telefone,
                address2: complemento,
                neighbourhood: bairro,
                reference: referencia,
                created_at: data,
            });
        }
    }
    Ok(out)
}

/// Returns (sale_id, status_code) for every id in `sale_ids`, batched in a
/// single `IN (...)`-less loop to keep the query portable — the status
/// tracker already caps batch size at the configuration layer (default 50).
pub fn fetch_status_codes(
    conn: &mut Connection,
    sale_ids: &[String],
) -> Result<Vec<(String, String)>, ConnectorError> {
    let mut out = Vec::with_capacity(sale_ids.len());
    for sale_id in sale_ids {
        let rows: Vec<(String,)> = conn
            .query(
                "SELECT STATUS FROM DELIVERIES WHERE CD_VENDA = ?",
                (sale_id.parse::<f64>().unwrap_or(0.0),),
            )
            .map_err(|e| ConnectorError::ErpIo(e.to_string()))?;
        if let Some((status,)) = rows.into_iter().next() {
            out.push((sale_id.clone(), status));
        }
    }
    Ok(out)
}

pub fn set_in_route(
    conn: &mut Connection,
    sale_id: &str,
    driver_name: &str,
) -> Result<(), ConnectorError> {
    conn.execute(
        "UPDATE DELIVERIES SET MOTORISTA = ?, SAIDA = CURRENT_TIMESTAMP, STATUS = 'R'
         WHERE CD_VENDA = ?",
        (driver_name, sale_id.parse::<f64>().unwrap_or(0.0)),
    )
    .map_err(|e| ConnectorError::ErpIo(e.to_string()))?;
    Ok(())
}

pub fn set_done(conn: &mut Connection, sale_id: &str) -> Result<(), ConnectorError> {
    let sale_id_f = sale_id.parse::<f64>().unwrap_or(0.0);
    conn.with_transaction(|tr: &mut Transaction| {
        tr.execute(
            "UPDATE DELIVERIES SET CHEGADA = CURRENT_TIMESTAMP, STATUS = 'F' WHERE CD_VENDA = ?",
            (sale_id_f,),
        )?;
        tr.execute(
            "UPDATE SALES SET STATUS = 'F' WHERE CD_VENDA = ?",
            (sale_id_f,),
        )?;
        Ok(())
    })
    .map_err(|e: rsfbclient::FbError| ConnectorError::ErpIo(e.to_string()))?;
    Ok(())
}
