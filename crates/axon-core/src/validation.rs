//! The shared validate→derive→hash pipeline.
//!
//! Every insert path runs the same steps: analyze the armored content,
//! enforce the per-kind crypto policy, require supplied metadata to
//! match content-derived metadata (rejects tampering during sync),
//! assign derived values otherwise, and recompute the id. Supplied ids
//! are never trusted.

use chrono::{DateTime, Utc};

use crate::envelope::{self, PublicKey};
use crate::error::ValidationError;
use crate::record::{Bulletin, Message, User};
use crate::types::Fingerprint;

/// A message candidate, from the local API (no metadata) or sync ingest
/// (supplied metadata that must match the content).
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub content: String,
    pub sender: Option<Fingerprint>,
    pub recipients: Vec<Fingerprint>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewMessage {
    /// A locally authored message: all metadata derived from content.
    pub fn from_content(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// A message received over sync: metadata supplied, id recomputed.
    pub fn from_wire(message: &Message) -> Self {
        Self {
            content: message.content.clone(),
            sender: Some(message.sender.clone()),
            recipients: message.recipients.clone(),
            created_at: Some(message.created_at),
        }
    }

    /// Run the pipeline. Messages must be signed AND encrypted.
    pub fn validate(self, now: DateTime<Utc>) -> Result<Message, ValidationError> {
        let analysis = envelope::analyze(&self.content)?;

        if !analysis.signed {
            return Err(ValidationError::MissingSignature);
        }
        if !analysis.encrypted {
            return Err(ValidationError::MissingEncryption);
        }
        let derived_sender = analysis.sender.ok_or(ValidationError::MissingSignature)?;

        let sender = match self.sender {
            Some(supplied) if supplied != derived_sender => {
                return Err(ValidationError::SenderMismatch {
                    supplied: supplied.to_string(),
                    derived: derived_sender.to_string(),
                });
            }
            Some(supplied) => supplied,
            None => derived_sender,
        };

        // Supplied recipients must be the same set as the derived ones.
        // The supplied order is kept: it is the order the author hashed.
        let recipients = if self.recipients.is_empty() {
            analysis.recipients
        } else {
            let same_set = self.recipients.len() == analysis.recipients.len()
                && self.recipients.iter().all(|r| analysis.recipients.contains(r))
                && analysis.recipients.iter().all(|r| self.recipients.contains(r));
            if !same_set {
                return Err(ValidationError::RecipientsMismatch);
            }
            self.recipients
        };

        let created_at = self.created_at.unwrap_or(now);
        let id = Message::compute_id(&sender, &recipients, &self.content, created_at);

        Ok(Message {
            id,
            sender,
            recipients,
            content: self.content,
            created_at,
        })
    }
}

/// A bulletin candidate. Parent existence is checked at the store, where
/// the parent can be looked up.
#[derive(Debug, Clone, Default)]
pub struct NewBulletin {
    pub topic: String,
    pub content: String,
    pub parent_id: Option<crate::types::RecordId>,
    pub sender: Option<Fingerprint>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewBulletin {
    pub fn from_content(topic: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn from_wire(bulletin: &Bulletin) -> Self {
        Self {
            topic: bulletin.topic.clone(),
            content: bulletin.content.clone(),
            parent_id: bulletin.parent_id.clone(),
            sender: Some(bulletin.sender.clone()),
            created_at: Some(bulletin.created_at),
        }
    }

    /// Run the pipeline. Bulletins must be signed, NOT encrypted, and
    /// have no recipients. The clearsigned form is the usual carrier.
    pub fn validate(self, now: DateTime<Utc>) -> Result<Bulletin, ValidationError> {
        let analysis = envelope::analyze(&self.content)?;

        if !analysis.signed {
            return Err(ValidationError::MissingSignature);
        }
        if analysis.encrypted {
            return Err(ValidationError::UnexpectedEncryption);
        }
        if !analysis.recipients.is_empty() {
            return Err(ValidationError::UnexpectedRecipients);
        }
        let derived_sender = analysis.sender.ok_or(ValidationError::MissingSignature)?;

        let sender = match self.sender {
            Some(supplied) if supplied != derived_sender => {
                return Err(ValidationError::SenderMismatch {
                    supplied: supplied.to_string(),
                    derived: derived_sender.to_string(),
                });
            }
            Some(supplied) => supplied,
            None => derived_sender,
        };

        let created_at = self.created_at.unwrap_or(now);
        let id = Bulletin::compute_id(&sender, &self.topic, &self.content, created_at);

        Ok(Bulletin {
            id,
            sender,
            topic: self.topic,
            content: self.content,
            parent_id: self.parent_id,
            created_at,
        })
    }
}

/// A user candidate: an armored public key, with an optional supplied
/// fingerprint that must match the canonical derivation.
#[derive(Debug, Clone, Default)]
pub struct NewUser {
    pub public_key: String,
    pub fingerprint: Option<Fingerprint>,
    pub created_at: Option<DateTime<Utc>>,
}

impl NewUser {
    pub fn from_public_key(public_key: impl Into<String>) -> Self {
        Self {
            public_key: public_key.into(),
            ..Self::default()
        }
    }

    pub fn from_wire(user: &User) -> Self {
        Self {
            public_key: user.public_key.clone(),
            fingerprint: Some(user.fingerprint.clone()),
            created_at: Some(user.created_at),
        }
    }

    /// Run the pipeline. The only canonical fingerprint is the
    /// encryption-subkey key-ID; a supplied fingerprint that matches the
    /// signing key-ID instead is rejected like any other mismatch.
    pub fn validate(self, now: DateTime<Utc>) -> Result<User, ValidationError> {
        let key = PublicKey::from_armored(&self.public_key)?;
        let derived = key.fingerprint()?;

        let fingerprint = match self.fingerprint {
            Some(supplied) if supplied != derived => {
                return Err(ValidationError::FingerprintMismatch {
                    supplied: supplied.to_string(),
                    derived: derived.to_string(),
                });
            }
            Some(supplied) => supplied,
            None => derived,
        };

        Ok(User {
            fingerprint,
            public_key: self.public_key,
            created_at: self.created_at.unwrap_or(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::{clearsign, seal, Keypair};

    fn now() -> DateTime<Utc> {
        "2025-06-15T12:00:00Z".parse().unwrap()
    }

    fn alice() -> Keypair {
        Keypair::from_seed(&[0x11; 32])
    }

    fn bob() -> Keypair {
        Keypair::from_seed(&[0x22; 32])
    }

    #[test]
    fn message_derives_metadata_from_content() {
        let sealed = seal(b"hi", Some(&alice()), &[bob().public_key()]).unwrap();
        let message = NewMessage::from_content(sealed).validate(now()).unwrap();

        assert_eq!(message.sender, alice().fingerprint());
        assert_eq!(message.recipients, vec![bob().fingerprint()]);
        assert_eq!(message.created_at, now());
        assert_eq!(
            message.id,
            Message::compute_id(
                &message.sender,
                &message.recipients,
                &message.content,
                message.created_at
            )
        );
    }

    #[test]
    fn message_rejects_unsigned_content() {
        let sealed = seal(b"hi", None, &[bob().public_key()]).unwrap();
        let result = NewMessage::from_content(sealed).validate(now());
        assert!(matches!(result, Err(ValidationError::MissingSignature)));
    }

    #[test]
    fn message_rejects_unencrypted_content() {
        let content = clearsign("plain", &alice());
        let result = NewMessage::from_content(content).validate(now());
        assert!(matches!(result, Err(ValidationError::MissingEncryption)));
    }

    #[test]
    fn message_rejects_tampered_sender() {
        let sealed = seal(b"hi", Some(&alice()), &[bob().public_key()]).unwrap();
        let mut candidate = NewMessage::from_content(sealed);
        candidate.sender = Some(bob().fingerprint());
        let result = candidate.validate(now());
        assert!(matches!(result, Err(ValidationError::SenderMismatch { .. })));
    }

    #[test]
    fn message_rejects_tampered_recipients() {
        let sealed = seal(b"hi", Some(&alice()), &[bob().public_key()]).unwrap();
        let mut candidate = NewMessage::from_content(sealed);
        candidate.recipients = vec![alice().fingerprint()];
        let result = candidate.validate(now());
        assert!(matches!(result, Err(ValidationError::RecipientsMismatch)));
    }

    #[test]
    fn wire_roundtrip_preserves_identity() {
        let sealed = seal(b"hi", Some(&alice()), &[bob().public_key()]).unwrap();
        let original = NewMessage::from_content(sealed).validate(now()).unwrap();
        let reingested = NewMessage::from_wire(&original).validate(now()).unwrap();
        assert_eq!(original, reingested);
    }

    #[test]
    fn bulletin_accepts_clearsigned_content() {
        let content = clearsign("a post", &alice());
        let bulletin = NewBulletin {
            topic: "general".into(),
            content,
            ..Default::default()
        }
        .validate(now())
        .unwrap();

        assert_eq!(bulletin.sender, alice().fingerprint());
        assert_eq!(bulletin.topic, "general");
    }

    #[test]
    fn bulletin_rejects_encrypted_content() {
        let sealed = seal(b"post", Some(&alice()), &[bob().public_key()]).unwrap();
        let result = NewBulletin {
            topic: "general".into(),
            content: sealed,
            ..Default::default()
        }
        .validate(now());
        assert!(matches!(result, Err(ValidationError::UnexpectedEncryption)));
    }

    #[test]
    fn user_derives_fingerprint_from_key() {
        let armored = alice().public_key().to_armored();
        let user = NewUser::from_public_key(armored).validate(now()).unwrap();
        assert_eq!(user.fingerprint, alice().fingerprint());
    }

    #[test]
    fn user_rejects_signing_key_id_as_fingerprint() {
        let public = alice().public_key();
        let mut candidate = NewUser::from_public_key(public.to_armored());
        // The signing key-ID is 16 lowercase hex chars too, but it is not
        // the canonical fingerprint and must not be accepted.
        candidate.fingerprint = Some(Fingerprint::parse(&public.signing_key_id()).unwrap());
        let result = candidate.validate(now());
        assert!(matches!(
            result,
            Err(ValidationError::FingerprintMismatch { .. })
        ));
    }

    #[test]
    fn user_rejects_tampered_fingerprint() {
        let mut candidate = NewUser::from_public_key(alice().public_key().to_armored());
        candidate.fingerprint = Some(bob().fingerprint());
        let result = candidate.validate(now());
        assert!(matches!(
            result,
            Err(ValidationError::FingerprintMismatch { .. })
        ));
    }
}
