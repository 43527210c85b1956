//! Deterministic identities and record builders.
//!
//! Everything goes through the real validation pipeline, so fixture
//! records are exactly what a node would accept over sync.

use chrono::{DateTime, Utc};

use axon_core::{
    clearsign, seal, Bulletin, Fingerprint, Keypair, Message, NewBulletin, NewMessage, NewUser,
    PublicKey, User,
};
use axon_store::MemoryStore;
use axon_store::Store;

/// A deterministic identity derived from a one-byte seed.
#[derive(Clone)]
pub struct Identity {
    keypair: Keypair,
}

impl Identity {
    pub fn from_seed(seed: u8) -> Self {
        Self {
            keypair: Keypair::from_seed(&[seed; 32]),
        }
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    pub fn fingerprint(&self) -> Fingerprint {
        self.keypair.fingerprint()
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key()
    }

    /// A validated user record for this identity.
    pub fn user(&self, created_at: &str) -> User {
        let created_at = parse_time(created_at);
        NewUser {
            public_key: self.public_key().to_armored(),
            fingerprint: None,
            created_at: Some(created_at),
        }
        .validate(created_at)
        .expect("fixture user must validate")
    }

    /// A validated sealed+signed message to the given recipients.
    pub fn message_to(&self, recipients: &[&Identity], body: &str, created_at: &str) -> Message {
        self.message_to_at(recipients, body, parse_time(created_at))
    }

    /// [`Identity::message_to`] with an already-parsed timestamp, for
    /// loops that seed many records.
    pub fn message_to_at(
        &self,
        recipients: &[&Identity],
        body: &str,
        created_at: DateTime<Utc>,
    ) -> Message {
        let keys: Vec<PublicKey> = recipients.iter().map(|r| r.public_key()).collect();
        let content = seal(body.as_bytes(), Some(&self.keypair), &keys)
            .expect("fixture message must seal");
        NewMessage {
            content,
            sender: None,
            recipients: Vec::new(),
            created_at: Some(created_at),
        }
        .validate(created_at)
        .expect("fixture message must validate")
    }

    /// A validated clearsigned bulletin, optionally threaded under a
    /// parent.
    pub fn bulletin(
        &self,
        topic: &str,
        body: &str,
        parent: Option<&Bulletin>,
        created_at: &str,
    ) -> Bulletin {
        let created_at = parse_time(created_at);
        let content = clearsign(body, &self.keypair);
        NewBulletin {
            topic: parent.map(|p| p.topic.clone()).unwrap_or_else(|| topic.to_string()),
            content,
            parent_id: parent.map(|p| p.id.clone()),
            sender: None,
            created_at: Some(created_at),
        }
        .validate(created_at)
        .expect("fixture bulletin must validate")
    }
}

fn parse_time(s: &str) -> DateTime<Utc> {
    s.parse().unwrap_or_else(|_| panic!("bad fixture timestamp: {s}"))
}

/// A memory store preloaded with validated records.
pub async fn seeded_store(
    users: &[User],
    messages: &[Message],
    bulletins: &[Bulletin],
) -> MemoryStore {
    let store = MemoryStore::new();
    for user in users {
        store.insert_user(user).await.expect("seed user");
    }
    for message in messages {
        store.insert_message(message).await.expect("seed message");
    }
    for bulletin in bulletins {
        store.insert_bulletin(bulletin).await.expect("seed bulletin");
    }
    store
}
