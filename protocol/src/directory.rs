//! Per-client session directory (§4.6 of the expanded spec): maps session ids to
//! the ratchet sessions a client owns. Each session is single-writer (§5); distinct
//! sessions are independent and need no coordination between them, so this
//! directory does no internal locking beyond whatever serializes its owner's calls.

use std::collections::HashMap;

use uuid::Uuid;

use crate::ratchet::Ratchet;

/// Owns every ratchet session for one client process. Destroyed with the client.
#[derive(Default)]
pub struct SessionDirectory {
    sessions: HashMap<Uuid, Ratchet>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
        }
    }

    pub fn insert(&mut self, session_id: Uuid, ratchet: Ratchet) {
        self.sessions.insert(session_id, ratchet);
    }

    pub fn get_mut(&mut self, session_id: &Uuid) -> Option<&mut Ratchet> {
        self.sessions.get_mut(session_id)
    }

    pub fn remove(&mut self, session_id: &Uuid) -> Option<Ratchet> {
        self.sessions.remove(session_id)
    }

    pub fn contains(&self, session_id: &Uuid) -> bool {
        self.sessions.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_and_remove_round_trip() {
        let mut dir = SessionDirectory::new();
        let ratchet = Ratchet::init_responder(
            b"ad".to_vec(),
            b"info".to_vec(),
            None,
            ([1u8; 32], [2u8; 32], [3u8; 32]),
        );
        let id = Uuid::new_v4();

        dir.insert(id, ratchet);
        assert!(dir.contains(&id));
        assert_eq!(dir.len(), 1);
        assert!(dir.get_mut(&id).is_some());
        assert!(dir.remove(&id).is_some());
        assert!(!dir.contains(&id));
    }
}
