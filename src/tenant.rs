use std::path::PathBuf;
use std::sync::Arc;

use dashmap::DashMap;

use crate::clock::Clock;
use crate::compactor;
use crate::engine::{BookingWorkflow, Engine};
use crate::limits::*;

/// Manages per-tenant engines. Each tenant gets its own Engine + WAL +
/// compactor. Tenant = database name from the pgwire connection.
pub struct TenantManager {
    engines: DashMap<String, Arc<Engine>>,
    data_dir: PathBuf,
    compact_threshold: u64,
    clock: Arc<dyn Clock>,
    workflow: BookingWorkflow,
}

impl TenantManager {
    pub fn new(
        data_dir: PathBuf,
        compact_threshold: u64,
        clock: Arc<dyn Clock>,
        workflow: BookingWorkflow,
    ) -> Self {
        Self {
            engines: DashMap::new(),
            data_dir,
            compact_threshold,
            clock,
            workflow,
        }
    }

    /// Get or lazily create an engine for the given tenant.
    pub fn get_or_create(&self, tenant: &str) -> std::io::Result<Arc<Engine>> {
        if let Some(engine) = self.engines.get(tenant) {
            return Ok(engine.value().clone());
        }
        if tenant.len() > MAX_TENANT_NAME_LEN {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "tenant name too long",
            ));
        }
        if self.engines.len() >= MAX_TENANTS {
            return Err(std::io::Error::other("too many tenants"));
        }

        // Sanitize tenant name to prevent path traversal
        let safe_name: String = tenant
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '_' || *c == '-')
            .collect();
        if safe_name.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "empty tenant name",
            ));
        }

        // Two connections may race to open the same tenant; only one engine
        // may own the WAL file.
        let entry = self.engines.entry(tenant.to_string());
        if let dashmap::mapref::entry::Entry::Occupied(e) = &entry {
            return Ok(e.get().clone());
        }

        let wal_path = self.data_dir.join(format!("{safe_name}.wal"));
        let engine = Arc::new(Engine::new(wal_path, self.clock.clone(), self.workflow)?);

        let compactor_engine = engine.clone();
        let threshold = self.compact_threshold;
        tokio::spawn(async move {
            compactor::run_compactor(compactor_engine, threshold).await;
        });

        entry.or_insert(engine.clone());
        metrics::gauge!(crate::observability::TENANTS_ACTIVE).set(self.engines.len() as f64);
        tracing::info!("tenant {tenant} loaded");
        Ok(engine)
    }

    pub fn tenant_count(&self) -> usize {
        self.engines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::model::*;
    use chrono::{NaiveDate, NaiveTime};
    use std::fs;
    use ulid::Ulid;

    fn test_data_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("spacebook_test_tenant").join(name);
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn manager(dir: PathBuf) -> TenantManager {
        let now = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        TenantManager::new(dir, 1000, Arc::new(FixedClock::new(now)), BookingWorkflow::Direct)
    }

    fn room(id: Ulid) -> NewSpace {
        NewSpace {
            id,
            name: "Room".into(),
            description: String::new(),
            kind: "meeting_room".into(),
            capacity: 6,
            photos: vec![],
            hours: None,
            active: true,
        }
    }

    #[tokio::test]
    async fn tenant_isolation() {
        let tm = manager(test_data_dir("isolation"));

        let eng_a = tm.get_or_create("tenant_a").unwrap();
        let eng_b = tm.get_or_create("tenant_b").unwrap();

        // Same space id in both tenants.
        let sid = Ulid::new();
        eng_a.create_space(room(sid)).await.unwrap();
        eng_b.create_space(room(sid)).await.unwrap();

        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        eng_a
            .create_booking(
                "alice",
                NewBooking {
                    id: Ulid::new(),
                    space_id: sid,
                    date,
                    start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                    end: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                    attendees: None,
                    purpose: None,
                    notes: None,
                },
            )
            .await
            .unwrap();

        let a = eng_a.space_bookings(sid, date, date).await.unwrap();
        let b = eng_b.space_bookings(sid, date, date).await.unwrap();
        assert_eq!(a.len(), 1);
        assert!(b.is_empty());
    }

    #[tokio::test]
    async fn tenant_lazy_creation() {
        let dir = test_data_dir("lazy");
        let tm = manager(dir.clone());

        assert_eq!(fs::read_dir(&dir).unwrap().count(), 0);
        let _eng = tm.get_or_create("my_db").unwrap();
        assert!(dir.join("my_db.wal").exists());
        assert_eq!(tm.tenant_count(), 1);
    }

    #[tokio::test]
    async fn tenant_same_engine_returned() {
        let tm = manager(test_data_dir("same_eng"));
        let eng1 = tm.get_or_create("foo").unwrap();
        let eng2 = tm.get_or_create("foo").unwrap();
        assert!(Arc::ptr_eq(&eng1, &eng2));
    }

    #[tokio::test]
    async fn tenant_name_sanitized() {
        let dir = test_data_dir("sanitize");
        let tm = manager(dir.clone());

        let _eng = tm.get_or_create("../evil").unwrap();
        assert!(dir.join("evil.wal").exists());
        assert!(tm.get_or_create("../..").is_err());
    }

    #[tokio::test]
    async fn tenant_name_too_long() {
        let tm = manager(test_data_dir("name_too_long"));
        let long_name = "x".repeat(MAX_TENANT_NAME_LEN + 1);
        let err = tm.get_or_create(&long_name).err().unwrap();
        assert!(err.to_string().contains("tenant name too long"));
    }

    #[tokio::test]
    async fn tenant_count_limit() {
        let tm = manager(test_data_dir("count_limit"));
        for i in 0..MAX_TENANTS {
            tm.get_or_create(&format!("t{i}")).unwrap();
        }
        let err = tm.get_or_create("one_more").err().unwrap();
        assert!(err.to_string().contains("too many tenants"));
    }
}
