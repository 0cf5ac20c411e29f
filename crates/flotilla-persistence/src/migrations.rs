//! Runner de migraciones embebidas.
//!
//! Las migraciones viven en `migrations/` de este crate, numeradas, y se
//! embeben en el binario. Se aplican en orden al arrancar, cada una en su
//! propia transacción y bajo un advisory lock para que dos controladores
//! arrancando a la vez no compitan. Al terminar se publica la versión en el
//! canal `schema_migrations`; los demás procesos conectados reinician su pool
//! para re-preparar el catálogo contra el esquema nuevo.

use log::{debug, info};
use sqlx::{Connection, PgConnection, Row};

use crate::error::PersistenceError;

/// Canal NOTIFY por el que se anuncian migraciones aplicadas.
pub const MIGRATION_CHANNEL: &str = "schema_migrations";

// Clave del advisory lock de migración (constante arbitraria, estable).
const MIGRATION_LOCK_KEY: i64 = 0x666c_6f74_696c_6c61;

/// `(versión, sql)` en orden de aplicación.
pub const MIGRATIONS: &[(&str, &str)] = &[("0001_controller", include_str!("../migrations/0001_controller.sql")),
                                          ("0002_que_jobs", include_str!("../migrations/0002_que_jobs.sql"))];

/// Aplica las migraciones pendientes. Devuelve las versiones aplicadas en
/// esta llamada (vacío si el esquema ya estaba al día).
pub async fn run_pending_migrations(conn: &mut PgConnection) -> Result<Vec<String>, PersistenceError> {
    sqlx::raw_sql("CREATE TABLE IF NOT EXISTS schema_migrations (version text PRIMARY KEY, \
                   applied_at timestamptz NOT NULL DEFAULT now())").execute(&mut *conn)
                                                                   .await?;
    let mut applied = Vec::new();
    for (version, sql) in MIGRATIONS {
        let mut tx = conn.begin().await?;
        sqlx::query("SELECT pg_advisory_xact_lock($1)").bind(MIGRATION_LOCK_KEY)
                                                        .execute(&mut *tx)
                                                        .await?;
        let done: bool = sqlx::query("SELECT EXISTS (SELECT 1 FROM schema_migrations WHERE version = $1)")
            .bind(*version)
            .fetch_one(&mut *tx)
            .await?
            .try_get(0)?;
        if done {
            debug!("migration:skip version={version}");
            tx.commit().await?;
            continue;
        }
        info!("migration:apply version={version}");
        sqlx::raw_sql(sql).execute(&mut *tx)
                          .await
                          .map_err(|e| PersistenceError::Unknown(format!("migration {version}: {e}")))?;
        sqlx::query("INSERT INTO schema_migrations (version) VALUES ($1)").bind(*version)
                                                                          .execute(&mut *tx)
                                                                          .await?;
        sqlx::query("SELECT pg_notify($1, $2)").bind(MIGRATION_CHANNEL)
                                                .bind(*version)
                                                .execute(&mut *tx)
                                                .await?;
        tx.commit().await?;
        applied.push((*version).to_string());
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_are_numbered_in_order() {
        let versions: Vec<&str> = MIGRATIONS.iter().map(|(v, _)| *v).collect();
        let mut sorted = versions.clone();
        sorted.sort();
        assert_eq!(versions, sorted);
        assert!(MIGRATIONS.iter().all(|(_, sql)| !sql.trim().is_empty()));
    }
}
