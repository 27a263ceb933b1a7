//! Catalog of discovered audio devices.

use rusqlite::{OptionalExtension, Row, params};
use tracing::debug;

use patchbay_core::pipeline::NodeId;
use patchbay_core::{AudioDevice, DeviceHandle, DeviceType, KnownDevice};

use crate::{Database, DbError, DbResult, parse_column};

fn known_device_from_row(row: &Row<'_>) -> rusqlite::Result<KnownDevice> {
    let device_type: String = row.get(4)?;
    Ok(KnownDevice {
        id: row.get(0)?,
        device: AudioDevice {
            backend: row.get(1)?,
            name: row.get(2)?,
            nice_name: row.get(3)?,
            device_type: parse_column(4, &device_type, DeviceType::parse)?,
            format: row.get(5)?,
            sample_rate: row.get(6)?,
            channels: row.get(7)?,
        },
        active: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

impl Database {
    /// Record one discovery round for a backend.
    ///
    /// Listed devices are inserted or refreshed and marked active; devices of
    /// the same backend that were not listed are marked inactive.
    pub fn sync_devices(&self, backend: &str, devices: &[AudioDevice]) -> DbResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("UPDATE known_devices SET active = FALSE WHERE backend = ?", [backend])?;
        for device in devices {
            tx.execute(
                r"INSERT INTO known_devices
                    (backend, name, nice_name, device_type, format, sample_rate, channels, active)
                  VALUES (?, ?, ?, ?, ?, ?, ?, TRUE)
                  ON CONFLICT(backend, name) DO UPDATE SET
                    nice_name = excluded.nice_name,
                    device_type = excluded.device_type,
                    format = excluded.format,
                    sample_rate = excluded.sample_rate,
                    channels = excluded.channels,
                    active = TRUE,
                    updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    backend,
                    device.name,
                    device.nice_name,
                    device.device_type.as_str(),
                    device.format,
                    device.sample_rate,
                    device.channels,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// List known devices, active ones first.
    pub fn list_devices(&self) -> DbResult<Vec<KnownDevice>> {
        let mut stmt = self.conn.prepare(
            r"SELECT id, backend, name, nice_name, device_type, format, sample_rate, channels, active, updated_at
              FROM known_devices
              ORDER BY active DESC, backend, name",
        )?;
        let devices = stmt.query_map([], known_device_from_row)?.collect::<Result<Vec<_>, _>>()?;
        Ok(devices)
    }

    /// Remove a device from the catalog.
    ///
    /// # Errors
    /// Returns [`DbError::NotFound`] for an unknown id and [`DbError::Conflict`]
    /// while a node is bound to the device.
    pub fn delete_device(&self, id: i64) -> DbResult<()> {
        let deleted = self
            .conn
            .execute("DELETE FROM known_devices WHERE id = ?", [id])
            .map_err(|e| DbError::conflict_on_constraint(e, || format!("device {id} is used by a node")))?;
        if deleted == 0 {
            return Err(DbError::NotFound(format!("device {id}")));
        }
        Ok(())
    }

    /// Point a node at the catalog entry of the device it uses.
    ///
    /// A device that has not been discovered yet leaves the node unbound.
    /// Returns the bound catalog id.
    pub fn bind_node_device(&self, node: NodeId, device: Option<&DeviceHandle>) -> DbResult<Option<i64>> {
        let device_id: Option<i64> = match device {
            Some(handle) => self
                .conn
                .query_row(
                    "SELECT id FROM known_devices WHERE backend = ? AND name = ?",
                    params![handle.backend, handle.name],
                    |row| row.get(0),
                )
                .optional()?,
            None => None,
        };
        self.conn.execute("UPDATE nodes SET device_id = ? WHERE id = ?", params![device_id, node])?;
        debug!(node_id = node, ?device_id, "Bound node device");
        Ok(device_id)
    }

    /// Whether discovery should query a backend. Backends are enabled until
    /// switched off.
    pub fn backend_enabled(&self, backend: &str) -> DbResult<bool> {
        let enabled: Option<bool> = self
            .conn
            .query_row("SELECT enabled FROM backend_preferences WHERE name = ?", [backend], |row| row.get(0))
            .optional()?;
        Ok(enabled.unwrap_or(true))
    }

    /// Switch discovery for a backend on or off.
    pub fn set_backend_enabled(&self, backend: &str, enabled: bool) -> DbResult<()> {
        self.conn.execute(
            r"INSERT INTO backend_preferences (name, enabled) VALUES (?, ?)
              ON CONFLICT(name) DO UPDATE SET
                enabled = excluded.enabled,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
            params![backend, enabled],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn device(name: &str, device_type: DeviceType) -> AudioDevice {
        AudioDevice {
            backend: "pulseaudio".into(),
            name: name.into(),
            nice_name: name.into(),
            device_type,
            format: "s16le".into(),
            sample_rate: 44100,
            channels: 2,
        }
    }

    #[test]
    fn test_sync_marks_missing_devices_inactive() {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.sync_devices("pulseaudio", &[device("mic", DeviceType::Capture), device("speakers", DeviceType::Playback)])
            .expect("Failed to sync devices");
        db.sync_devices("pulseaudio", &[device("speakers", DeviceType::Playback)]).unwrap();

        let devices = db.list_devices().unwrap();
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].device.name, "speakers");
        assert!(devices[0].active);
        assert_eq!(devices[1].device.name, "mic");
        assert!(!devices[1].active);
    }

    #[test]
    fn test_bound_device_cannot_be_deleted() {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.sync_devices("pulseaudio", &[device("mic", DeviceType::Capture), device("speakers", DeviceType::Playback)])
            .unwrap();
        let pipeline = db.create_pipeline("studio", "", true).unwrap();
        let node = db.create_node(pipeline.id, "pulseaudio.device", &serde_json::Map::new()).unwrap();
        let handle = DeviceHandle { backend: "pulseaudio".into(), name: "mic".into() };

        let mic = db.bind_node_device(node.id, Some(&handle)).expect("Failed to bind device");
        let mic = mic.expect("Device should be in the catalog");
        let speakers = db.list_devices().unwrap().into_iter().find(|d| d.device.name == "speakers").unwrap();

        assert_matches!(db.delete_device(mic), Err(DbError::Conflict(_)));
        db.delete_device(speakers.id).expect("Failed to delete unused device");
        assert_matches!(db.delete_device(speakers.id), Err(DbError::NotFound(_)));

        db.bind_node_device(node.id, None).unwrap();
        db.delete_device(mic).expect("Failed to delete unbound device");
    }

    #[test]
    fn test_undiscovered_device_leaves_node_unbound() {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let pipeline = db.create_pipeline("studio", "", true).unwrap();
        let node = db.create_node(pipeline.id, "pulseaudio.device", &serde_json::Map::new()).unwrap();
        let handle = DeviceHandle { backend: "pulseaudio".into(), name: "usb-mic".into() };

        assert_eq!(db.bind_node_device(node.id, Some(&handle)).unwrap(), None);
    }

    #[test]
    fn test_backend_preferences() {
        let db = Database::open_in_memory().expect("Failed to create test database");
        assert!(db.backend_enabled("pulseaudio").unwrap());

        db.set_backend_enabled("pulseaudio", false).unwrap();
        assert!(!db.backend_enabled("pulseaudio").unwrap());
        db.set_backend_enabled("pulseaudio", true).unwrap();
        assert!(db.backend_enabled("pulseaudio").unwrap());
    }

    #[test]
    fn test_sync_refreshes_existing_device() {
        let db = Database::open_in_memory().expect("Failed to create test database");
        db.sync_devices("pulseaudio", &[device("mic", DeviceType::Capture)]).unwrap();
        let mut changed = device("mic", DeviceType::Capture);
        changed.sample_rate = 48000;
        db.sync_devices("pulseaudio", &[changed]).unwrap();

        let devices = db.list_devices().unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].device.sample_rate, 48000);
    }
}
