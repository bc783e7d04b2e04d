//! Persisted set of rooms the bot should sit in.

use redb::ReadableTable;
use tracing::info;

use crate::store::{ROOMS, Store, StoreError, open_read, open_write};

fn normalize(room: &str) -> String {
    room.trim().to_lowercase()
}

/// Track a room. Returns `false` when it was already tracked.
pub fn join(store: &Store, room: &str) -> Result<bool, StoreError> {
    let room = normalize(room);
    let added = store.write(|txn| {
        let mut table = open_write(txn, ROOMS)?;
        let previous = table.insert(room.as_str(), 1u8)?;
        Ok::<_, StoreError>(previous.is_none())
    })?;
    info!(room = %room, added, "room joined");
    Ok(added)
}

/// Stop tracking a room. Returns `false` when it was not tracked.
pub fn part(store: &Store, room: &str) -> Result<bool, StoreError> {
    let room = normalize(room);
    let removed = store.write(|txn| {
        let mut table = open_write(txn, ROOMS)?;
        let previous = table.remove(room.as_str())?;
        Ok::<_, StoreError>(previous.is_some())
    })?;
    info!(room = %room, removed, "room parted");
    Ok(removed)
}

/// Tracked rooms in name order.
pub fn list(store: &Store) -> Result<Vec<String>, StoreError> {
    store.read(|txn| {
        let table = open_read(txn, ROOMS)?;
        let mut rooms = Vec::new();
        for item in table.iter()? {
            let (key, _) = item?;
            rooms.push(key.value().to_string());
        }
        Ok(rooms)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_part_list() {
        let store = Store::in_memory().unwrap();
        assert!(join(&store, "Lobby").unwrap());
        assert!(!join(&store, "lobby").unwrap());
        assert!(join(&store, "ads").unwrap());
        assert_eq!(list(&store).unwrap(), vec!["ads", "lobby"]);

        assert!(part(&store, "LOBBY").unwrap());
        assert!(!part(&store, "lobby").unwrap());
        assert_eq!(list(&store).unwrap(), vec!["ads"]);
    }
}
