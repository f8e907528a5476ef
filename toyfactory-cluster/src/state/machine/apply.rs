//! Command application logic.

use toyfactory_core::{Command, Entity, EntityId, Event, OwnerId, Status};

use super::state::FactoryState;
use super::types::{ApplyContext, MachineConfig};

/// Apply a command to the factory state.
///
/// The only inputs are the state, the command and the entry's commit
/// timestamp, so every replica computes the same event. Missing entities
/// yield `NotFound`; nothing here can fail half way.
pub(crate) fn apply_command(
    state: &mut FactoryState,
    cmd: Command,
    ctx: ApplyContext,
    config: MachineConfig,
) -> Event {
    match cmd {
        Command::Create { owner_id } => apply_create(state, owner_id, ctx.timestamp_ms),

        Command::UpdateStatus { entity_id, status } => {
            apply_update_status(state, entity_id, status, ctx.timestamp_ms, config)
        }

        Command::Get { entity_id } => apply_get(state, entity_id),
    }
}

fn apply_create(state: &mut FactoryState, owner_id: OwnerId, at_ms: u64) -> Event {
    let id = state.allocate_id();
    let entity = Entity::new(id, owner_id, at_ms);
    let event = Event::Created {
        entity_id: id,
        owner_id,
        status: entity.status,
        created_at_ms: entity.created_at_ms,
    };
    state.store.insert(entity);
    event
}

fn apply_update_status(
    state: &mut FactoryState,
    entity_id: EntityId,
    status: Status,
    at_ms: u64,
    config: MachineConfig,
) -> Event {
    let Some(entity) = state.store.get_mut(entity_id) else {
        return Event::NotFound { entity_id };
    };

    if config.enforce_status_progress && status <= entity.status {
        return Event::StatusRegressed {
            entity_id,
            current: entity.status,
            requested: status,
        };
    }

    entity.set_status(status, at_ms);
    Event::Updated {
        entity_id,
        status,
        updated_at_ms: at_ms,
    }
}

fn apply_get(state: &FactoryState, entity_id: EntityId) -> Event {
    match state.store.get(entity_id) {
        Some(entity) => Event::Info {
            entity: entity.clone(),
        },
        None => Event::NotFound { entity_id },
    }
}
