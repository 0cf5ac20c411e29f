//! Constantes del core.
//!
//! Valores por defecto de buffers y esperas compartidos entre el listener de
//! eventos, el motor de despliegues y la cola de trabajos.

use std::time::Duration;

/// Capacidad del buffer por suscriptor. Si se llena, el suscriptor se cierra
/// con `SubscriptionError::BufferOverflow`.
pub const EVENT_BUFFER_SIZE: usize = 1000;

/// Espera por defecto de cada paso de un despliegue.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(60);

/// Espera de sincronización de réplicas en la estrategia sirenia.
pub const REPL_SYNC_TIMEOUT: Duration = Duration::from_secs(3 * 60);

/// Espera para capturar la metadata de servicio (estrategia discoverd-meta).
pub const META_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Espera del evento `current` al abrir un watcher de discovery.
pub const DISCOVERY_CURRENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Cola por defecto del job queue.
pub const DEFAULT_QUEUE: &str = "";

/// Prioridad por defecto de un trabajo encolado.
pub const DEFAULT_PRIORITY: i16 = 100;
