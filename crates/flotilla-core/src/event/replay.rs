use flotilla_domain::Event;

use super::{EventFilter, EventQuery, EventSource, EventStore, EventSubscriber};
use crate::errors::CoreError;

/// Abre una suscripción y devuelve además el historial que coincide con el
/// filtro (ids > `since_id`, ascendente).
///
/// La suscripción se abre ANTES de leer el historial; después se le indica
/// que descarte todo id ≤ al último reproducido, así un evento que caiga en
/// la costura aparece una sola vez.
pub async fn subscribe_with_history<S, L>(store: &S,
                                          source: &L,
                                          filter: EventFilter,
                                          since_id: Option<i64>,
                                          count: Option<i64>)
                                          -> Result<(Vec<Event>, EventSubscriber), CoreError>
    where S: EventStore + ?Sized,
          L: EventSource + ?Sized
{
    let mut sub = source.subscribe(filter.clone()).await?;
    let mut query = EventQuery::replay(filter, since_id);
    query.count = count;
    let history = store.list(&query).await?;
    let last = history.last().map(|e| e.id).or(since_id);
    if let Some(id) = last {
        sub.skip_through(id);
    }
    Ok((history, sub))
}
