use flotilla_domain::{Event, EventType};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Filtro de suscripción `(app, tipos, object_id)`. Campos vacíos aceptan
/// cualquier valor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub app_id: Option<Uuid>,
    pub object_types: Vec<EventType>,
    pub object_id: Option<String>,
}

impl EventFilter {
    pub fn app(app_id: Uuid) -> Self {
        Self { app_id: Some(app_id),
               ..Self::default() }
    }

    pub fn with_types(mut self, types: &[EventType]) -> Self {
        self.object_types = types.to_vec();
        self
    }

    pub fn with_object_id(mut self, object_id: impl Into<String>) -> Self {
        self.object_id = Some(object_id.into());
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        let app_ok = match self.app_id {
            None => true,
            Some(app) => event.app_id == Some(app),
        };
        let type_ok = self.object_types.is_empty() || self.object_types.contains(&event.object_type);
        let object_ok = match &self.object_id {
            None => true,
            Some(id) => id.is_empty() || *id == event.object_id,
        };
        app_ok && type_ok && object_ok
    }
}

/// Consulta paginada sobre el log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub filter: EventFilter,
    /// Sólo eventos con id estrictamente mayor.
    pub since_id: Option<i64>,
    /// Sólo eventos con id estrictamente menor.
    pub before_id: Option<i64>,
    pub count: Option<i64>,
    /// Orden ascendente por id (replay). Por defecto descendente.
    pub ascending: bool,
}

impl EventQuery {
    pub fn replay(filter: EventFilter, since_id: Option<i64>) -> Self {
        Self { filter,
               since_id,
               ascending: true,
               ..Self::default() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flotilla_domain::EventOp;

    fn event(app: Option<Uuid>, typ: EventType, object_id: &str) -> Event {
        Event { id: 1,
                app_id: app,
                object_id: object_id.to_string(),
                object_type: typ,
                op: EventOp::Create,
                data: serde_json::Value::Null,
                created_at: Utc::now() }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = EventFilter::default();
        assert!(f.matches(&event(None, EventType::Key, "k")));
        assert!(f.matches(&event(Some(Uuid::new_v4()), EventType::Job, "j")));
    }

    #[test]
    fn filter_is_a_conjunction() {
        let app = Uuid::new_v4();
        let f = EventFilter::app(app).with_types(&[EventType::Job]).with_object_id("j1");
        assert!(f.matches(&event(Some(app), EventType::Job, "j1")));
        assert!(!f.matches(&event(Some(app), EventType::Job, "j2")));
        assert!(!f.matches(&event(Some(app), EventType::Release, "j1")));
        assert!(!f.matches(&event(None, EventType::Job, "j1")));
    }
}
