//! Catálogo de consultas con nombre.
//!
//! Cada conexión física prepara el catálogo completo al abrirse (ver
//! `db::Db::connect`), de modo que una consulta inválida contra el esquema
//! falla al arrancar y no en la primera petición.

pub const APP_INSERT: &str = "INSERT INTO apps (app_id, name, meta, strategy, deploy_timeout) VALUES ($1, $2, $3, $4, $5) \
                              RETURNING app_id, name, meta, strategy, release_id, deploy_timeout, created_at, updated_at";
pub const APP_SELECT_BY_ID: &str = "SELECT app_id, name, meta, strategy, release_id, deploy_timeout, created_at, updated_at \
                                    FROM apps WHERE app_id = $1 AND deleted_at IS NULL";
pub const APP_SELECT_BY_NAME: &str = "SELECT app_id, name, meta, strategy, release_id, deploy_timeout, created_at, updated_at \
                                      FROM apps WHERE name = $1 AND deleted_at IS NULL";
pub const APP_SELECT_BY_ID_FOR_UPDATE: &str = "SELECT app_id, name, meta, strategy, release_id, deploy_timeout, created_at, updated_at \
                                               FROM apps WHERE app_id = $1 AND deleted_at IS NULL FOR UPDATE";
pub const APP_LIST: &str = "SELECT app_id, name, meta, strategy, release_id, deploy_timeout, created_at, updated_at \
                            FROM apps WHERE deleted_at IS NULL ORDER BY updated_at DESC, app_id DESC";
pub const APP_LIST_PAGE: &str = "SELECT app_id, name, meta, strategy, release_id, deploy_timeout, created_at, updated_at \
                                 FROM apps WHERE deleted_at IS NULL \
                                 AND ($1::timestamptz IS NULL OR (updated_at, app_id) < ($1, $2::uuid)) \
                                 ORDER BY updated_at DESC, app_id DESC LIMIT $3";
pub const APP_UPDATE: &str = "UPDATE apps SET name = $2, meta = $3, strategy = $4, deploy_timeout = $5, updated_at = now() \
                              WHERE app_id = $1 AND deleted_at IS NULL \
                              RETURNING app_id, name, meta, strategy, release_id, deploy_timeout, created_at, updated_at";
pub const APP_UPDATE_RELEASE: &str = "UPDATE apps SET release_id = $2, updated_at = now() WHERE app_id = $1 AND deleted_at IS NULL";
pub const APP_DELETE: &str = "UPDATE apps SET deleted_at = now() WHERE app_id = $1 AND deleted_at IS NULL";

pub const ARTIFACT_INSERT: &str = "INSERT INTO artifacts (artifact_id, type, uri, meta, hashes, size, manifest, layer_url_template) \
                                   VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
                                   RETURNING artifact_id, type, uri, meta, hashes, size, manifest, layer_url_template, created_at";
pub const ARTIFACT_SELECT: &str = "SELECT artifact_id, type, uri, meta, hashes, size, manifest, layer_url_template, created_at \
                                   FROM artifacts WHERE artifact_id = $1 AND deleted_at IS NULL";
pub const ARTIFACT_SELECT_BY_TYPE_AND_URI: &str = "SELECT artifact_id, type, uri, meta, hashes, size, manifest, layer_url_template, \
                                                   created_at FROM artifacts WHERE type = $1 AND uri = $2 AND deleted_at IS NULL";
pub const ARTIFACT_LIST: &str = "SELECT artifact_id, type, uri, meta, hashes, size, manifest, layer_url_template, created_at \
                                 FROM artifacts WHERE deleted_at IS NULL ORDER BY created_at DESC";
pub const ARTIFACT_LIST_IDS: &str = "SELECT artifact_id, type, uri, meta, hashes, size, manifest, layer_url_template, created_at \
                                     FROM artifacts WHERE artifact_id = ANY($1) AND deleted_at IS NULL";

pub const RELEASE_INSERT: &str = "INSERT INTO releases (release_id, app_id, env, processes, meta) VALUES ($1, $2, $3, $4, $5) \
                                  RETURNING created_at";
pub const RELEASE_ARTIFACT_INSERT: &str = "INSERT INTO release_artifacts (release_id, artifact_id, position) VALUES ($1, $2, $3)";
pub const RELEASE_SELECT: &str = "SELECT r.release_id, r.app_id, r.env, r.processes, r.meta, r.created_at, \
                                  ARRAY(SELECT ra.artifact_id FROM release_artifacts ra \
                                        WHERE ra.release_id = r.release_id ORDER BY ra.position) AS artifact_ids \
                                  FROM releases r WHERE r.release_id = $1 AND r.deleted_at IS NULL";
pub const RELEASE_EXISTS: &str = "SELECT EXISTS (SELECT 1 FROM releases WHERE release_id = $1)";
pub const RELEASE_LIST: &str = "SELECT r.release_id, r.app_id, r.env, r.processes, r.meta, r.created_at, \
                                ARRAY(SELECT ra.artifact_id FROM release_artifacts ra \
                                      WHERE ra.release_id = r.release_id ORDER BY ra.position) AS artifact_ids \
                                FROM releases r WHERE r.deleted_at IS NULL ORDER BY r.created_at DESC";
pub const RELEASE_APP_LIST: &str = "SELECT r.release_id, r.app_id, r.env, r.processes, r.meta, r.created_at, \
                                    ARRAY(SELECT ra.artifact_id FROM release_artifacts ra \
                                          WHERE ra.release_id = r.release_id ORDER BY ra.position) AS artifact_ids \
                                    FROM releases r WHERE r.app_id = $1 AND r.deleted_at IS NULL ORDER BY r.created_at DESC";
pub const RELEASE_DELETE: &str = "UPDATE releases SET deleted_at = now() WHERE release_id = $1 AND deleted_at IS NULL";
pub const RELEASE_DELETE_BY_APP: &str = "UPDATE releases SET deleted_at = now() WHERE app_id = $1 AND deleted_at IS NULL \
                                         RETURNING release_id";
pub const RELEASE_ATTACH: &str = "UPDATE releases SET app_id = $2 WHERE release_id = $1 AND app_id IS NULL";

pub const FORMATION_UPSERT: &str = "INSERT INTO formations (app_id, release_id, processes, tags) VALUES ($1, $2, $3, $4) \
                                    ON CONFLICT (app_id, release_id) DO UPDATE \
                                    SET processes = EXCLUDED.processes, tags = EXCLUDED.tags, updated_at = now(), deleted_at = NULL \
                                    RETURNING created_at, updated_at";
pub const FORMATION_SELECT: &str = "SELECT app_id, release_id, processes, tags, created_at, updated_at FROM formations \
                                    WHERE app_id = $1 AND release_id = $2 AND deleted_at IS NULL";
pub const FORMATION_SELECT_ANY: &str = "SELECT app_id, release_id, processes, tags, created_at, updated_at, deleted_at \
                                        FROM formations WHERE app_id = $1 AND release_id = $2";
pub const FORMATION_LIST_BY_APP: &str = "SELECT app_id, release_id, processes, tags, created_at, updated_at FROM formations \
                                         WHERE app_id = $1 AND deleted_at IS NULL ORDER BY updated_at DESC";
pub const FORMATION_LIST_BY_RELEASE: &str = "SELECT app_id, release_id, processes, tags, created_at, updated_at FROM formations \
                                             WHERE release_id = $1 AND deleted_at IS NULL";
pub const FORMATION_LIST_ACTIVE: &str = "SELECT f.app_id, f.release_id, f.processes, f.tags, f.created_at, f.updated_at \
                                         FROM formations f JOIN apps a USING (app_id) \
                                         WHERE f.deleted_at IS NULL AND a.deleted_at IS NULL \
                                         AND EXISTS (SELECT 1 FROM jsonb_each_text(f.processes) p WHERE p.value::int > 0) \
                                         ORDER BY f.updated_at DESC";
pub const FORMATION_DELETE: &str = "UPDATE formations SET deleted_at = now(), processes = '{}'::jsonb \
                                    WHERE app_id = $1 AND release_id = $2 AND deleted_at IS NULL";
pub const FORMATION_DELETE_BY_APP: &str = "UPDATE formations SET deleted_at = now(), processes = '{}'::jsonb \
                                           WHERE app_id = $1 AND deleted_at IS NULL";

pub const SCALE_REQUEST_INSERT: &str = "INSERT INTO scale_requests \
                                        (scale_request_id, app_id, release_id, state, old_processes, new_processes, old_tags, new_tags) \
                                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING created_at, updated_at";
pub const SCALE_REQUEST_CANCEL: &str = "UPDATE scale_requests SET state = 'cancelled', updated_at = now() \
                                        WHERE app_id = $1 AND release_id = $2 AND state = 'pending' \
                                        RETURNING scale_request_id, app_id, release_id, state, old_processes, new_processes, \
                                        old_tags, new_tags, created_at, updated_at";
pub const SCALE_REQUEST_UPDATE: &str = "UPDATE scale_requests SET state = $2, updated_at = now() WHERE scale_request_id = $1 \
                                        RETURNING scale_request_id, app_id, release_id, state, old_processes, new_processes, \
                                        old_tags, new_tags, created_at, updated_at";
pub const SCALE_REQUEST_SELECT: &str = "SELECT scale_request_id, app_id, release_id, state, old_processes, new_processes, old_tags, \
                                        new_tags, created_at, updated_at FROM scale_requests WHERE scale_request_id = $1";
pub const SCALE_REQUEST_SELECT_PENDING: &str = "SELECT scale_request_id, app_id, release_id, state, old_processes, new_processes, \
                                                old_tags, new_tags, created_at, updated_at FROM scale_requests \
                                                WHERE app_id = $1 AND release_id = $2 AND state = 'pending'";
pub const SCALE_REQUEST_LIST_BY_APP: &str = "SELECT scale_request_id, app_id, release_id, state, old_processes, new_processes, \
                                             old_tags, new_tags, created_at, updated_at FROM scale_requests \
                                             WHERE app_id = $1 ORDER BY created_at DESC";

pub const DEPLOYMENT_INSERT: &str = "INSERT INTO deployments \
                                     (deployment_id, app_id, old_release_id, new_release_id, strategy, processes, tags, deploy_timeout) \
                                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING created_at";
pub const DEPLOYMENT_SELECT: &str = "SELECT deployment_id, app_id, old_release_id, new_release_id, strategy, processes, tags, \
                                     deploy_timeout, status, created_at, finished_at FROM deployments WHERE deployment_id = $1";
pub const DEPLOYMENT_LIST_BY_APP: &str = "SELECT deployment_id, app_id, old_release_id, new_release_id, strategy, processes, tags, \
                                          deploy_timeout, status, created_at, finished_at FROM deployments \
                                          WHERE app_id = $1 ORDER BY created_at DESC";
pub const DEPLOYMENT_UPDATE_STATUS: &str = "UPDATE deployments SET status = $2 WHERE deployment_id = $1 AND finished_at IS NULL";
pub const DEPLOYMENT_FINISH: &str = "UPDATE deployments SET status = $2, finished_at = now() \
                                     WHERE deployment_id = $1 AND finished_at IS NULL";

pub const JOB_SELECT: &str = "SELECT job_id, cluster_id, host_id, app_id, release_id, process_type, state, args, meta, exit_status, \
                              host_error, run_at, restarts, created_at, updated_at FROM job_cache WHERE job_id = $1";
pub const JOB_SELECT_FOR_UPDATE: &str = "SELECT state FROM job_cache WHERE job_id = $1 FOR UPDATE";
pub const JOB_UPSERT: &str = "INSERT INTO job_cache \
                              (job_id, cluster_id, host_id, app_id, release_id, process_type, state, args, meta, exit_status, \
                               host_error, run_at, restarts) \
                              VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13) \
                              ON CONFLICT (job_id) DO UPDATE SET cluster_id = EXCLUDED.cluster_id, host_id = EXCLUDED.host_id, \
                              state = EXCLUDED.state, exit_status = EXCLUDED.exit_status, host_error = EXCLUDED.host_error, \
                              run_at = EXCLUDED.run_at, restarts = EXCLUDED.restarts, meta = EXCLUDED.meta, updated_at = now() \
                              RETURNING created_at, updated_at";
pub const JOB_LIST_BY_APP: &str = "SELECT job_id, cluster_id, host_id, app_id, release_id, process_type, state, args, meta, \
                                   exit_status, host_error, run_at, restarts, created_at, updated_at FROM job_cache \
                                   WHERE app_id = $1 ORDER BY updated_at DESC";
pub const JOB_LIST_ACTIVE: &str = "SELECT job_id, cluster_id, host_id, app_id, release_id, process_type, state, args, meta, \
                                   exit_status, host_error, run_at, restarts, created_at, updated_at FROM job_cache \
                                   WHERE state IN ('pending', 'starting', 'up', 'stopping') ORDER BY updated_at DESC";

pub const PROVIDER_INSERT: &str = "INSERT INTO providers (provider_id, name, url) VALUES ($1, $2, $3) RETURNING created_at, updated_at";
pub const PROVIDER_SELECT_BY_ID: &str = "SELECT provider_id, name, url, created_at, updated_at FROM providers \
                                         WHERE provider_id = $1 AND deleted_at IS NULL";
pub const PROVIDER_SELECT_BY_NAME: &str = "SELECT provider_id, name, url, created_at, updated_at FROM providers \
                                           WHERE name = $1 AND deleted_at IS NULL";
pub const PROVIDER_LIST: &str = "SELECT provider_id, name, url, created_at, updated_at FROM providers \
                                 WHERE deleted_at IS NULL ORDER BY created_at DESC";

pub const RESOURCE_INSERT: &str = "INSERT INTO resources (resource_id, provider_id, external_id, env) VALUES ($1, $2, $3, $4) \
                                   RETURNING created_at";
pub const RESOURCE_SELECT: &str = "SELECT r.resource_id, r.provider_id, r.external_id, r.env, r.created_at, \
                                   ARRAY(SELECT a.app_id FROM app_resources a \
                                         WHERE a.resource_id = r.resource_id AND a.deleted_at IS NULL ORDER BY a.created_at) AS apps \
                                   FROM resources r WHERE r.resource_id = $1 AND r.deleted_at IS NULL";
pub const RESOURCE_LIST: &str = "SELECT r.resource_id, r.provider_id, r.external_id, r.env, r.created_at, \
                                 ARRAY(SELECT a.app_id FROM app_resources a \
                                       WHERE a.resource_id = r.resource_id AND a.deleted_at IS NULL ORDER BY a.created_at) AS apps \
                                 FROM resources r WHERE r.deleted_at IS NULL ORDER BY r.created_at DESC";
pub const RESOURCE_LIST_BY_PROVIDER: &str = "SELECT r.resource_id, r.provider_id, r.external_id, r.env, r.created_at, \
                                             ARRAY(SELECT a.app_id FROM app_resources a \
                                                   WHERE a.resource_id = r.resource_id AND a.deleted_at IS NULL \
                                                   ORDER BY a.created_at) AS apps \
                                             FROM resources r WHERE r.provider_id = $1 AND r.deleted_at IS NULL \
                                             ORDER BY r.created_at DESC";
pub const RESOURCE_LIST_BY_APP: &str = "SELECT r.resource_id, r.provider_id, r.external_id, r.env, r.created_at, \
                                        ARRAY(SELECT a.app_id FROM app_resources a \
                                              WHERE a.resource_id = r.resource_id AND a.deleted_at IS NULL \
                                              ORDER BY a.created_at) AS apps \
                                        FROM resources r JOIN app_resources ar USING (resource_id) \
                                        WHERE ar.app_id = $1 AND ar.deleted_at IS NULL AND r.deleted_at IS NULL \
                                        ORDER BY r.created_at DESC";
pub const RESOURCE_DELETE: &str = "UPDATE resources SET deleted_at = now() WHERE resource_id = $1 AND deleted_at IS NULL";
pub const APP_RESOURCE_INSERT: &str = "INSERT INTO app_resources (app_id, resource_id) VALUES ($1, $2) \
                                       ON CONFLICT (app_id, resource_id) DO UPDATE SET deleted_at = NULL";
pub const APP_RESOURCE_DELETE: &str = "UPDATE app_resources SET deleted_at = now() \
                                       WHERE app_id = $1 AND resource_id = $2 AND deleted_at IS NULL";
pub const APP_RESOURCE_DELETE_BY_APP: &str = "UPDATE app_resources SET deleted_at = now() WHERE app_id = $1 AND deleted_at IS NULL \
                                              RETURNING resource_id";
pub const APP_RESOURCE_DELETE_BY_RESOURCE: &str = "UPDATE app_resources SET deleted_at = now() \
                                                   WHERE resource_id = $1 AND deleted_at IS NULL";

pub const SINK_INSERT: &str = "INSERT INTO sinks (sink_id, kind, config) VALUES ($1, $2, $3) RETURNING created_at, updated_at";
pub const SINK_SELECT: &str = "SELECT sink_id, kind, config, created_at, updated_at FROM sinks WHERE sink_id = $1 AND deleted_at IS NULL";
pub const SINK_LIST: &str = "SELECT sink_id, kind, config, created_at, updated_at FROM sinks WHERE deleted_at IS NULL \
                             ORDER BY updated_at DESC";
pub const SINK_DELETE: &str = "UPDATE sinks SET deleted_at = now() WHERE sink_id = $1 AND deleted_at IS NULL";

pub const VOLUME_UPSERT: &str = "INSERT INTO volumes \
                                 (volume_id, host_id, app_id, release_id, job_id, job_type, state, type, path, delete_on_stop, meta) \
                                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                                 ON CONFLICT (volume_id) DO UPDATE SET job_id = EXCLUDED.job_id, state = EXCLUDED.state, \
                                 meta = EXCLUDED.meta, updated_at = now() \
                                 RETURNING created_at, updated_at, decommissioned_at";
pub const VOLUME_SELECT: &str = "SELECT volume_id, host_id, app_id, release_id, job_id, job_type, state, type, path, delete_on_stop, \
                                 meta, created_at, updated_at, decommissioned_at FROM volumes WHERE volume_id = $1";
pub const VOLUME_LIST: &str = "SELECT volume_id, host_id, app_id, release_id, job_id, job_type, state, type, path, delete_on_stop, \
                               meta, created_at, updated_at, decommissioned_at FROM volumes ORDER BY updated_at DESC";
pub const VOLUME_LIST_BY_APP: &str = "SELECT volume_id, host_id, app_id, release_id, job_id, job_type, state, type, path, \
                                      delete_on_stop, meta, created_at, updated_at, decommissioned_at FROM volumes \
                                      WHERE app_id = $1 ORDER BY updated_at DESC";
pub const VOLUME_DECOMMISSION: &str = "UPDATE volumes SET decommissioned_at = now(), updated_at = now() \
                                       WHERE volume_id = $1 AND app_id = $2 AND decommissioned_at IS NULL \
                                       RETURNING decommissioned_at";

pub const KEY_INSERT: &str = "INSERT INTO keys (key_id, key, comment) VALUES ($1, $2, $3) \
                              ON CONFLICT (key_id) DO UPDATE SET comment = EXCLUDED.comment, deleted_at = NULL \
                              RETURNING created_at";
pub const KEY_SELECT: &str = "SELECT key_id, key, comment, created_at FROM keys WHERE key_id = $1 AND deleted_at IS NULL";
pub const KEY_LIST: &str = "SELECT key_id, key, comment, created_at FROM keys WHERE deleted_at IS NULL ORDER BY created_at DESC";
pub const KEY_DELETE: &str = "UPDATE keys SET deleted_at = now() WHERE key_id = $1 AND deleted_at IS NULL";

pub const BACKUP_INSERT: &str = "INSERT INTO backups (backup_id, status) VALUES ($1, $2) RETURNING created_at, updated_at";
pub const BACKUP_UPDATE: &str = "UPDATE backups SET status = $2, sha512 = $3, size = $4, error = $5, updated_at = now(), \
                                 completed_at = CASE WHEN $2 <> 'running' THEN now() ELSE completed_at END \
                                 WHERE backup_id = $1 RETURNING updated_at, completed_at";
pub const BACKUP_SELECT: &str = "SELECT backup_id, status, sha512, size, error, created_at, updated_at, completed_at \
                                 FROM backups WHERE backup_id = $1";
pub const BACKUP_SELECT_LATEST: &str = "SELECT backup_id, status, sha512, size, error, created_at, updated_at, completed_at \
                                        FROM backups ORDER BY created_at DESC LIMIT 1";

pub const DOMAIN_MIGRATION_INSERT: &str = "INSERT INTO domain_migrations (migration_id, old_domain, domain) VALUES ($1, $2, $3) \
                                           RETURNING created_at";
pub const DOMAIN_MIGRATION_SELECT: &str = "SELECT migration_id, old_domain, domain, created_at, finished_at FROM domain_migrations \
                                           WHERE migration_id = $1";
pub const DOMAIN_MIGRATION_SELECT_LATEST: &str = "SELECT migration_id, old_domain, domain, created_at, finished_at \
                                                  FROM domain_migrations ORDER BY created_at DESC LIMIT 1";
pub const DOMAIN_MIGRATION_FINISH: &str = "UPDATE domain_migrations SET finished_at = now() WHERE migration_id = $1 \
                                           RETURNING finished_at";

pub const EVENT_INSERT: &str = "INSERT INTO events (app_id, object_id, object_type, op, data) VALUES ($1, $2, $3, $4, $5) \
                                RETURNING event_id, created_at";
pub const EVENT_INSERT_UNIQUE: &str = "INSERT INTO events (app_id, object_id, unique_id, object_type, op, data) \
                                       VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (unique_id) DO NOTHING \
                                       RETURNING event_id, created_at";
pub const EVENT_SELECT: &str = "SELECT event_id, app_id, object_id, object_type, op, data, created_at FROM events WHERE event_id = $1";

pub const QUE_INSERT_JOB: &str = "INSERT INTO que_jobs (queue, priority, run_at, job_class, args) \
                                  VALUES ($1, $2, coalesce($3, now()), $4, $5) RETURNING job_id";
pub const QUE_LOCK_JOB: &str = "SELECT queue, priority, run_at, job_id, job_class, args::jsonb AS args, error_count, last_error \
                                FROM que_jobs WHERE queue = $1 AND run_at <= now() AND job_id <> ALL($2) \
                                ORDER BY priority, run_at, job_id LIMIT 1 FOR UPDATE SKIP LOCKED";
pub const QUE_ADVISORY_LOCK: &str = "SELECT pg_try_advisory_lock($1)";
pub const QUE_CHECK_JOB: &str = "SELECT EXISTS (SELECT 1 FROM que_jobs WHERE queue = $1 AND priority = $2 AND run_at = $3 AND job_id = $4)";
pub const QUE_DESTROY_JOB: &str = "DELETE FROM que_jobs WHERE queue = $1 AND priority = $2 AND run_at = $3 AND job_id = $4";
pub const QUE_SET_ERROR: &str = "UPDATE que_jobs SET error_count = $1, run_at = now() + $2 * interval '1 second', last_error = $3 \
                                 WHERE queue = $4 AND priority = $5 AND run_at = $6 AND job_id = $7";
pub const QUE_ADVISORY_UNLOCK: &str = "SELECT pg_advisory_unlock($1)";

/// Catálogo completo `(nombre, sql)`.
pub const CATALOG: &[(&str, &str)] = &[("app_insert", APP_INSERT),
                                       ("app_select_by_id", APP_SELECT_BY_ID),
                                       ("app_select_by_name", APP_SELECT_BY_NAME),
                                       ("app_select_by_id_for_update", APP_SELECT_BY_ID_FOR_UPDATE),
                                       ("app_list", APP_LIST),
                                       ("app_list_page", APP_LIST_PAGE),
                                       ("app_update", APP_UPDATE),
                                       ("app_update_release", APP_UPDATE_RELEASE),
                                       ("app_delete", APP_DELETE),
                                       ("artifact_insert", ARTIFACT_INSERT),
                                       ("artifact_select", ARTIFACT_SELECT),
                                       ("artifact_select_by_type_and_uri", ARTIFACT_SELECT_BY_TYPE_AND_URI),
                                       ("artifact_list", ARTIFACT_LIST),
                                       ("artifact_list_ids", ARTIFACT_LIST_IDS),
                                       ("release_insert", RELEASE_INSERT),
                                       ("release_artifact_insert", RELEASE_ARTIFACT_INSERT),
                                       ("release_select", RELEASE_SELECT),
                                       ("release_exists", RELEASE_EXISTS),
                                       ("release_list", RELEASE_LIST),
                                       ("release_app_list", RELEASE_APP_LIST),
                                       ("release_delete", RELEASE_DELETE),
                                       ("release_delete_by_app", RELEASE_DELETE_BY_APP),
                                       ("release_attach", RELEASE_ATTACH),
                                       ("formation_upsert", FORMATION_UPSERT),
                                       ("formation_select", FORMATION_SELECT),
                                       ("formation_select_any", FORMATION_SELECT_ANY),
                                       ("formation_list_by_app", FORMATION_LIST_BY_APP),
                                       ("formation_list_by_release", FORMATION_LIST_BY_RELEASE),
                                       ("formation_list_active", FORMATION_LIST_ACTIVE),
                                       ("formation_delete", FORMATION_DELETE),
                                       ("formation_delete_by_app", FORMATION_DELETE_BY_APP),
                                       ("scale_request_insert", SCALE_REQUEST_INSERT),
                                       ("scale_request_cancel", SCALE_REQUEST_CANCEL),
                                       ("scale_request_update", SCALE_REQUEST_UPDATE),
                                       ("scale_request_select", SCALE_REQUEST_SELECT),
                                       ("scale_request_select_pending", SCALE_REQUEST_SELECT_PENDING),
                                       ("scale_request_list_by_app", SCALE_REQUEST_LIST_BY_APP),
                                       ("deployment_insert", DEPLOYMENT_INSERT),
                                       ("deployment_select", DEPLOYMENT_SELECT),
                                       ("deployment_list_by_app", DEPLOYMENT_LIST_BY_APP),
                                       ("deployment_update_status", DEPLOYMENT_UPDATE_STATUS),
                                       ("deployment_finish", DEPLOYMENT_FINISH),
                                       ("job_select", JOB_SELECT),
                                       ("job_select_for_update", JOB_SELECT_FOR_UPDATE),
                                       ("job_upsert", JOB_UPSERT),
                                       ("job_list_by_app", JOB_LIST_BY_APP),
                                       ("job_list_active", JOB_LIST_ACTIVE),
                                       ("provider_insert", PROVIDER_INSERT),
                                       ("provider_select_by_id", PROVIDER_SELECT_BY_ID),
                                       ("provider_select_by_name", PROVIDER_SELECT_BY_NAME),
                                       ("provider_list", PROVIDER_LIST),
                                       ("resource_insert", RESOURCE_INSERT),
                                       ("resource_select", RESOURCE_SELECT),
                                       ("resource_list", RESOURCE_LIST),
                                       ("resource_list_by_provider", RESOURCE_LIST_BY_PROVIDER),
                                       ("resource_list_by_app", RESOURCE_LIST_BY_APP),
                                       ("resource_delete", RESOURCE_DELETE),
                                       ("app_resource_insert", APP_RESOURCE_INSERT),
                                       ("app_resource_delete", APP_RESOURCE_DELETE),
                                       ("app_resource_delete_by_app", APP_RESOURCE_DELETE_BY_APP),
                                       ("app_resource_delete_by_resource", APP_RESOURCE_DELETE_BY_RESOURCE),
                                       ("sink_insert", SINK_INSERT),
                                       ("sink_select", SINK_SELECT),
                                       ("sink_list", SINK_LIST),
                                       ("sink_delete", SINK_DELETE),
                                       ("volume_upsert", VOLUME_UPSERT),
                                       ("volume_select", VOLUME_SELECT),
                                       ("volume_list", VOLUME_LIST),
                                       ("volume_list_by_app", VOLUME_LIST_BY_APP),
                                       ("volume_decommission", VOLUME_DECOMMISSION),
                                       ("key_insert", KEY_INSERT),
                                       ("key_select", KEY_SELECT),
                                       ("key_list", KEY_LIST),
                                       ("key_delete", KEY_DELETE),
                                       ("backup_insert", BACKUP_INSERT),
                                       ("backup_update", BACKUP_UPDATE),
                                       ("backup_select", BACKUP_SELECT),
                                       ("backup_select_latest", BACKUP_SELECT_LATEST),
                                       ("domain_migration_insert", DOMAIN_MIGRATION_INSERT),
                                       ("domain_migration_select", DOMAIN_MIGRATION_SELECT),
                                       ("domain_migration_select_latest", DOMAIN_MIGRATION_SELECT_LATEST),
                                       ("domain_migration_finish", DOMAIN_MIGRATION_FINISH),
                                       ("event_insert", EVENT_INSERT),
                                       ("event_insert_unique", EVENT_INSERT_UNIQUE),
                                       ("event_select", EVENT_SELECT),
                                       ("que_insert_job", QUE_INSERT_JOB),
                                       ("que_lock_job", QUE_LOCK_JOB),
                                       ("que_advisory_lock", QUE_ADVISORY_LOCK),
                                       ("que_check_job", QUE_CHECK_JOB),
                                       ("que_destroy_job", QUE_DESTROY_JOB),
                                       ("que_set_error", QUE_SET_ERROR),
                                       ("que_advisory_unlock", QUE_ADVISORY_UNLOCK)];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalog_names_are_unique() {
        let mut names: Vec<&str> = CATALOG.iter().map(|(n, _)| *n).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), CATALOG.len());
    }

    #[test]
    fn queue_lock_uses_skip_locked() {
        assert!(QUE_LOCK_JOB.contains("FOR UPDATE SKIP LOCKED"));
        assert!(QUE_LOCK_JOB.contains("ORDER BY priority, run_at, job_id"));
    }
}
