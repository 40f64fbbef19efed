use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use tokio::sync::RwLock;
use tracing::info;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::validate_text;
use super::{Engine, EngineError};

fn validate_name(name: &str) -> Result<(), EngineError> {
    if name.trim().is_empty() {
        return Err(EngineError::Validation("name is required".into()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("space name too long"));
    }
    Ok(())
}

fn validate_kind(kind: &str) -> Result<(), EngineError> {
    if kind.trim().is_empty() {
        return Err(EngineError::Validation("type is required".into()));
    }
    if kind.chars().count() > MAX_KIND_LEN {
        return Err(EngineError::LimitExceeded("space type too long"));
    }
    Ok(())
}

fn validate_capacity(capacity: u32) -> Result<(), EngineError> {
    if capacity == 0 {
        return Err(EngineError::Validation("capacity must be at least 1".into()));
    }
    Ok(())
}

fn validate_photos(photos: &[String]) -> Result<(), EngineError> {
    if photos.len() > MAX_PHOTOS {
        return Err(EngineError::LimitExceeded("too many photos"));
    }
    for url in photos {
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(EngineError::Validation(format!(
                "photo must be an http(s) URL: {url}"
            )));
        }
    }
    Ok(())
}

fn validate_hours(hours: Option<&WeeklyHours>) -> Result<(), EngineError> {
    let Some(hours) = hours else { return Ok(()) };
    if hours.days.iter().flatten().any(|w| w.end <= w.start) {
        return Err(EngineError::Validation(
            "opening hours must close after they open".into(),
        ));
    }
    Ok(())
}

impl Engine {
    /// Add a space to the catalog. Administrators only; the caller checks.
    pub async fn create_space(&self, req: NewSpace) -> Result<Space, EngineError> {
        let result = self.try_create_space(req).await;
        self.observe("create_space", &result);
        result
    }

    async fn try_create_space(&self, req: NewSpace) -> Result<Space, EngineError> {
        if self.spaces.len() >= MAX_SPACES_PER_TENANT {
            return Err(EngineError::LimitExceeded("too many spaces"));
        }
        validate_name(&req.name)?;
        validate_kind(&req.kind)?;
        validate_text(Some(&req.description), MAX_DESCRIPTION_LEN, "description")?;
        validate_capacity(req.capacity)?;
        validate_photos(&req.photos)?;
        validate_hours(req.hours.as_ref())?;

        let _gate = self.catalog_gate.read().await;
        let now = self.clock.now();
        let space = Space {
            id: req.id,
            name: req.name,
            description: req.description,
            kind: req.kind,
            capacity: req.capacity,
            photos: req.photos,
            hours: req.hours,
            active: req.active,
            created_at: now,
            updated_at: now,
        };
        // Publish the space already write-locked: readers wait until it is
        // durable, and the id is claimed atomically.
        let ss = Arc::new(RwLock::new(SpaceState::new(space.clone())));
        let guard = ss.clone().write_owned().await;
        match self.spaces.entry(space.id) {
            Entry::Occupied(_) => return Err(EngineError::AlreadyExists(space.id)),
            Entry::Vacant(v) => {
                v.insert(ss);
            }
        }

        let event = Event::SpaceCreated {
            space: space.clone(),
        };
        if let Err(e) = self.wal_append(&event).await {
            self.spaces.remove(&space.id);
            return Err(e);
        }
        drop(guard);
        info!("space {} created: {} ({})", space.id, space.name, space.kind);
        Ok(space)
    }

    /// Edit a space. Existing bookings are kept even if the new capacity or
    /// hours no longer fit them.
    pub async fn update_space(&self, id: Ulid, changes: SpaceChanges) -> Result<Space, EngineError> {
        let result = self.try_update_space(id, changes).await;
        self.observe("update_space", &result);
        result
    }

    async fn try_update_space(&self, id: Ulid, changes: SpaceChanges) -> Result<Space, EngineError> {
        if let Some(name) = &changes.name {
            validate_name(name)?;
        }
        if let Some(kind) = &changes.kind {
            validate_kind(kind)?;
        }
        validate_text(changes.description.as_deref(), MAX_DESCRIPTION_LEN, "description")?;
        if let Some(capacity) = changes.capacity {
            validate_capacity(capacity)?;
        }
        if let Some(photos) = &changes.photos {
            validate_photos(photos)?;
        }
        if let Some(hours) = &changes.hours {
            validate_hours(hours.as_ref())?;
        }

        let ss = self.space_state(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = ss.write().await;
        if !self.spaces.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }

        let current = guard.space.clone();
        let space = Space {
            name: changes.name.unwrap_or(current.name),
            description: changes.description.unwrap_or(current.description),
            kind: changes.kind.unwrap_or(current.kind),
            capacity: changes.capacity.unwrap_or(current.capacity),
            photos: changes.photos.unwrap_or(current.photos),
            hours: changes.hours.unwrap_or(current.hours),
            active: changes.active.unwrap_or(current.active),
            updated_at: self.clock.now(),
            ..current
        };
        let event = Event::SpaceUpdated {
            space: space.clone(),
        };
        self.persist_and_apply(&mut guard, &event).await?;
        info!("space {id} updated");
        Ok(space)
    }

    /// Remove a space with everything booked on it. Refused while any
    /// non-cancelled booking has not yet ended.
    pub async fn delete_space(&self, id: Ulid) -> Result<(), EngineError> {
        let result = self.try_delete_space(id).await;
        self.observe("delete_space", &result);
        result
    }

    async fn try_delete_space(&self, id: Ulid) -> Result<(), EngineError> {
        let ss = self.space_state(&id).ok_or(EngineError::NotFound(id))?;
        let guard = ss.write().await;
        if !self.spaces.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }

        let now = self.clock.now();
        if guard
            .bookings
            .iter()
            .any(|b| !b.is_cancelled() && !b.has_ended(now))
        {
            return Err(EngineError::SpaceHasBookings(id));
        }

        let event = Event::SpaceDeleted { id };
        self.wal_append(&event).await?;
        // Removed while still holding the write lock, so waiters see the
        // space gone once they acquire it.
        self.spaces.remove(&id);
        for b in &guard.bookings {
            self.booking_to_space.remove(&b.id);
        }
        info!(
            "space {id} deleted with {} past or cancelled bookings",
            guard.bookings.len()
        );
        Ok(())
    }
}
