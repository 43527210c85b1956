//! The armored envelope format: keys, sealed messages, clearsigned text.
//!
//! An identity is an Ed25519 signing key plus an ordered list of X25519
//! encryption subkeys. Sealing encrypts a payload under a fresh content
//! key with ChaCha20-Poly1305 and wraps that key to each recipient via
//! ephemeral X25519 agreement. Clearsigning leaves the text visible and
//! appends an armored signature block.
//!
//! The node core never decrypts anything. What it needs from a blob is
//! [`analyze`]: which key-IDs the content is encrypted to, which key-ID
//! signed it, and whether it is signed/encrypted at all. [`open`] and
//! [`verify_clearsigned`] exist for clients that hold the keys.
//!
//! A key-ID is the first 8 bytes of SHA-256 over a subkey's public bytes,
//! rendered as 16 lowercase hex characters. The canonical fingerprint of
//! an identity is the key-ID of its first encryption subkey, which is
//! exactly the recipient key-ID that sealing a message to the key emits.
//! Signature blocks carry the signer's canonical fingerprint so that
//! senders join against stored users.

use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use ed25519_dalek::{Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, PublicKey as X25519Public, StaticSecret};

use crate::armor;
use crate::error::CoreError;
use crate::types::Fingerprint;

/// Armor label for public key blocks.
pub const PUBLIC_KEY_LABEL: &str = "PUBLIC KEY";
/// Armor label for sealed message blocks.
pub const MESSAGE_LABEL: &str = "MESSAGE";
/// Armor label for detached signature blocks inside clearsigned text.
pub const SIGNATURE_LABEL: &str = "SIGNATURE";
/// Header line opening a clearsigned message.
pub const SIGNED_MESSAGE_HEADER: &str = "-----BEGIN AXON SIGNED MESSAGE-----";
const SIGNATURE_HEADER: &str = "-----BEGIN AXON SIGNATURE-----";

const KEY_ID_DOMAIN: &[u8] = b"axon-keyid-v1:";
const WRAP_CONTEXT: &str = "axon-envelope-v1 key wrap";
const SUBKEY_CONTEXT: &str = "axon-identity-v1 encryption subkey";

/// Derive the key-ID of a public subkey: first 8 bytes of SHA-256,
/// lowercase hex.
fn key_id(subkey: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(KEY_ID_DOMAIN);
    hasher.update(subkey);
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// What content analysis reveals about an armored blob without any keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Analysis {
    /// Canonical fingerprint of the signer, if the blob is signed.
    pub sender: Option<Fingerprint>,
    /// Encryption-recipient key-IDs, in sealing order.
    pub recipients: Vec<Fingerprint>,
    pub signed: bool,
    pub encrypted: bool,
}

/// A full identity: signing key plus one encryption subkey.
#[derive(Clone)]
pub struct Keypair {
    signing: SigningKey,
    encryption: StaticSecret,
}

impl Keypair {
    /// Generate a random identity.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let signing = SigningKey::generate(&mut rng);
        let mut seed = [0u8; 32];
        rng.fill_bytes(&mut seed);
        Self {
            signing,
            encryption: StaticSecret::from(seed),
        }
    }

    /// Deterministic identity from a 32-byte seed. The encryption subkey
    /// is derived from the seed with domain separation, so one seed
    /// yields one stable identity.
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing = SigningKey::from_bytes(seed);
        let mut hasher = blake3::Hasher::new_derive_key(SUBKEY_CONTEXT);
        hasher.update(seed);
        let subkey_seed = *hasher.finalize().as_bytes();
        Self {
            signing,
            encryption: StaticSecret::from(subkey_seed),
        }
    }

    /// The public half of this identity.
    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            signing: self.signing.verifying_key().to_bytes(),
            subkeys: vec![X25519Public::from(&self.encryption).to_bytes()],
        }
    }

    /// Canonical fingerprint of this identity.
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::from_derived(key_id(X25519Public::from(&self.encryption).as_bytes()))
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Keypair({})", self.fingerprint())
    }
}

/// The public half of an identity, armorable as an `AXON PUBLIC KEY` block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey {
    signing: [u8; 32],
    subkeys: Vec<[u8; 32]>,
}

#[derive(Serialize, Deserialize)]
struct KeyPacket {
    signing: Vec<u8>,
    subkeys: Vec<Vec<u8>>,
}

impl PublicKey {
    /// Encode as an armored public key block.
    pub fn to_armored(&self) -> String {
        let packet = KeyPacket {
            signing: self.signing.to_vec(),
            subkeys: self.subkeys.iter().map(|s| s.to_vec()).collect(),
        };
        let mut buf = Vec::new();
        ciborium::into_writer(&packet, &mut buf).unwrap_or_default();
        armor::encode(PUBLIC_KEY_LABEL, &buf)
    }

    /// Parse an armored public key block.
    pub fn from_armored(input: &str) -> Result<Self, CoreError> {
        let bytes = armor::decode_labeled(input, PUBLIC_KEY_LABEL)?;
        let packet: KeyPacket = ciborium::from_reader(bytes.as_slice())
            .map_err(|e| CoreError::MalformedPacket(e.to_string()))?;
        let signing: [u8; 32] = packet
            .signing
            .try_into()
            .map_err(|_| CoreError::MalformedPacket("signing key must be 32 bytes".into()))?;
        let mut subkeys = Vec::with_capacity(packet.subkeys.len());
        for sub in packet.subkeys {
            let sub: [u8; 32] = sub
                .try_into()
                .map_err(|_| CoreError::MalformedPacket("subkey must be 32 bytes".into()))?;
            subkeys.push(sub);
        }
        Ok(Self { signing, subkeys })
    }

    /// The canonical fingerprint: key-ID of the first encryption subkey.
    ///
    /// This is the only accepted fingerprint for a user record. The
    /// signing key-ID (see [`PublicKey::signing_key_id`]) is a distinct
    /// value and must be rejected where a fingerprint is expected.
    pub fn fingerprint(&self) -> Result<Fingerprint, CoreError> {
        let first = self.subkeys.first().ok_or(CoreError::NoEncryptionSubkey)?;
        Ok(Fingerprint::from_derived(key_id(first)))
    }

    /// Key-ID of the primary (signing) key. Never a valid fingerprint.
    pub fn signing_key_id(&self) -> String {
        key_id(&self.signing)
    }

    fn verifying_key(&self) -> Result<VerifyingKey, CoreError> {
        VerifyingKey::from_bytes(&self.signing).map_err(|_| CoreError::InvalidPublicKey)
    }
}

#[derive(Serialize, Deserialize)]
struct RecipientStub {
    key_id: String,
    ephemeral: Vec<u8>,
    nonce: Vec<u8>,
    wrapped_key: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct MessagePacket {
    recipients: Vec<RecipientStub>,
    signer: Option<String>,
    signature: Option<Vec<u8>>,
    nonce: Vec<u8>,
    ciphertext: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct SignaturePacket {
    signer: String,
    signature: Vec<u8>,
}

fn derive_wrap_key(shared: &[u8; 32], recipient_key_id: &str) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(WRAP_CONTEXT);
    hasher.update(shared);
    hasher.update(recipient_key_id.as_bytes());
    *hasher.finalize().as_bytes()
}

fn chacha_encrypt(key: &[u8; 32], nonce: &[u8; 12], plaintext: &[u8]) -> Result<Vec<u8>, CoreError> {
    let cipher = ChaCha20Poly1305::new_from_slice(key)
        .map_err(|e| CoreError::EncryptFailed(e.to_string()))?;
    cipher
        .encrypt(Nonce::from_slice(nonce), plaintext)
        .map_err(|e| CoreError::EncryptFailed(e.to_string()))
}

fn chacha_decrypt(key: &[u8; 32], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CoreError> {
    if nonce.len() != 12 {
        return Err(CoreError::DecryptFailed);
    }
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| CoreError::DecryptFailed)?;
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| CoreError::DecryptFailed)
}

/// Seal a payload to a set of recipients, optionally signing it.
///
/// Returns an armored `AXON MESSAGE` block. The recipient key-IDs it
/// carries are the canonical fingerprints of the recipient keys.
pub fn seal(
    plaintext: &[u8],
    signer: Option<&Keypair>,
    recipients: &[PublicKey],
) -> Result<String, CoreError> {
    let mut rng = rand::thread_rng();

    let mut content_key = [0u8; 32];
    rng.fill_bytes(&mut content_key);
    let mut nonce = [0u8; 12];
    rng.fill_bytes(&mut nonce);
    let ciphertext = chacha_encrypt(&content_key, &nonce, plaintext)?;

    let mut stubs = Vec::with_capacity(recipients.len());
    for key in recipients {
        let subkey = key.subkeys.first().ok_or(CoreError::NoEncryptionSubkey)?;
        let recipient_id = key_id(subkey);

        let ephemeral = EphemeralSecret::random_from_rng(rand::thread_rng());
        let ephemeral_public = X25519Public::from(&ephemeral);
        let shared = ephemeral.diffie_hellman(&X25519Public::from(*subkey));
        let wrap_key = derive_wrap_key(shared.as_bytes(), &recipient_id);

        let mut wrap_nonce = [0u8; 12];
        rng.fill_bytes(&mut wrap_nonce);
        let wrapped = chacha_encrypt(&wrap_key, &wrap_nonce, &content_key)?;

        stubs.push(RecipientStub {
            key_id: recipient_id,
            ephemeral: ephemeral_public.as_bytes().to_vec(),
            nonce: wrap_nonce.to_vec(),
            wrapped_key: wrapped,
        });
    }

    let (signer_id, signature) = match signer {
        Some(keypair) => {
            let sig = keypair.signing.sign(&ciphertext);
            (
                Some(keypair.fingerprint().as_str().to_string()),
                Some(sig.to_bytes().to_vec()),
            )
        }
        None => (None, None),
    };

    let packet = MessagePacket {
        recipients: stubs,
        signer: signer_id,
        signature,
        nonce: nonce.to_vec(),
        ciphertext,
    };
    let mut buf = Vec::new();
    ciborium::into_writer(&packet, &mut buf)
        .map_err(|e| CoreError::EncryptFailed(e.to_string()))?;
    Ok(armor::encode(MESSAGE_LABEL, &buf))
}

/// Decrypt a sealed message for a holder of one of its recipient subkeys.
pub fn open(content: &str, keypair: &Keypair) -> Result<Vec<u8>, CoreError> {
    let packet = parse_message_packet(content)?;
    let our_id = keypair.fingerprint();

    let stub = packet
        .recipients
        .iter()
        .find(|stub| stub.key_id == our_id.as_str())
        .ok_or(CoreError::NotRecipient)?;

    let ephemeral: [u8; 32] = stub
        .ephemeral
        .clone()
        .try_into()
        .map_err(|_| CoreError::MalformedPacket("ephemeral key must be 32 bytes".into()))?;
    let shared = keypair
        .encryption
        .diffie_hellman(&X25519Public::from(ephemeral));
    let wrap_key = derive_wrap_key(shared.as_bytes(), &stub.key_id);

    let content_key: [u8; 32] = chacha_decrypt(&wrap_key, &stub.nonce, &stub.wrapped_key)?
        .try_into()
        .map_err(|_| CoreError::DecryptFailed)?;

    chacha_decrypt(&content_key, &packet.nonce, &packet.ciphertext)
}

/// Clearsign text: the message stays readable and an armored signature
/// block is appended.
pub fn clearsign(text: &str, signer: &Keypair) -> String {
    let sig = signer.signing.sign(text.as_bytes());
    let packet = SignaturePacket {
        signer: signer.fingerprint().as_str().to_string(),
        signature: sig.to_bytes().to_vec(),
    };
    let mut buf = Vec::new();
    ciborium::into_writer(&packet, &mut buf).unwrap_or_default();

    let mut out = String::new();
    out.push_str(SIGNED_MESSAGE_HEADER);
    out.push_str("\n\n");
    out.push_str(text);
    out.push('\n');
    out.push_str(&armor::encode(SIGNATURE_LABEL, &buf));
    out
}

/// Verify a clearsigned message against the claimed signer's public key.
pub fn verify_clearsigned(content: &str, signer_key: &PublicKey) -> Result<(), CoreError> {
    let (text, packet) = parse_clearsigned(content)?;

    let expected = signer_key.fingerprint()?;
    if packet.signer != expected.as_str() {
        return Err(CoreError::SignatureInvalid);
    }

    let sig_bytes: [u8; 64] = packet
        .signature
        .try_into()
        .map_err(|_| CoreError::MalformedPacket("signature must be 64 bytes".into()))?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig_bytes);
    signer_key
        .verifying_key()?
        .verify(text.as_bytes(), &signature)
        .map_err(|_| CoreError::SignatureInvalid)
}

/// Analyze an armored blob without any keys: derived sender, derived
/// recipients, and the signed/encrypted flags.
pub fn analyze(content: &str) -> Result<Analysis, CoreError> {
    let trimmed = content.trim_start();
    if trimmed.starts_with(SIGNED_MESSAGE_HEADER) {
        let (_, packet) = parse_clearsigned(content)?;
        let sender = Fingerprint::parse(&packet.signer)?;
        return Ok(Analysis {
            sender: Some(sender),
            recipients: Vec::new(),
            signed: true,
            encrypted: false,
        });
    }

    let packet = parse_message_packet(content)?;
    let mut recipients = Vec::with_capacity(packet.recipients.len());
    for stub in &packet.recipients {
        recipients.push(Fingerprint::parse(&stub.key_id)?);
    }
    let sender = match &packet.signer {
        Some(id) => Some(Fingerprint::parse(id)?),
        None => None,
    };
    Ok(Analysis {
        signed: sender.is_some(),
        encrypted: !recipients.is_empty(),
        sender,
        recipients,
    })
}

fn parse_message_packet(content: &str) -> Result<MessagePacket, CoreError> {
    let bytes = armor::decode_labeled(content, MESSAGE_LABEL)?;
    ciborium::from_reader(bytes.as_slice()).map_err(|e| CoreError::MalformedPacket(e.to_string()))
}

/// Split a clearsigned message into its text and signature packet.
fn parse_clearsigned(content: &str) -> Result<(String, SignaturePacket), CoreError> {
    let trimmed = content.trim_start();
    let rest = trimmed
        .strip_prefix(SIGNED_MESSAGE_HEADER)
        .ok_or_else(|| CoreError::MalformedArmor("missing clearsign header".into()))?;

    let sig_start = rest
        .find(SIGNATURE_HEADER)
        .ok_or_else(|| CoreError::MalformedArmor("missing signature block".into()))?;

    let text = rest[..sig_start]
        .trim_start_matches(['\r', '\n'])
        .trim_end_matches(['\r', '\n'])
        .to_string();

    let bytes = armor::decode_labeled(&rest[sig_start..], SIGNATURE_LABEL)?;
    let packet: SignaturePacket = ciborium::from_reader(bytes.as_slice())
        .map_err(|e| CoreError::MalformedPacket(e.to_string()))?;
    Ok((text, packet))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_key_armor_roundtrip() {
        let keypair = Keypair::from_seed(&[0x42; 32]);
        let armored = keypair.public_key().to_armored();
        let parsed = PublicKey::from_armored(&armored).unwrap();
        assert_eq!(parsed, keypair.public_key());
    }

    #[test]
    fn fingerprint_is_deterministic_and_canonical() {
        let a = Keypair::from_seed(&[0x01; 32]);
        let b = Keypair::from_seed(&[0x01; 32]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert!(Fingerprint::is_canonical(a.fingerprint().as_str()));
    }

    #[test]
    fn fingerprint_differs_from_signing_key_id() {
        let keypair = Keypair::from_seed(&[0x07; 32]);
        let public = keypair.public_key();
        assert_ne!(
            public.fingerprint().unwrap().as_str(),
            public.signing_key_id()
        );
    }

    #[test]
    fn sealed_message_analysis() {
        let alice = Keypair::from_seed(&[0x11; 32]);
        let bob = Keypair::from_seed(&[0x22; 32]);

        let sealed = seal(b"hello bob", Some(&alice), &[bob.public_key()]).unwrap();
        let analysis = analyze(&sealed).unwrap();

        assert!(analysis.signed);
        assert!(analysis.encrypted);
        assert_eq!(analysis.sender, Some(alice.fingerprint()));
        assert_eq!(analysis.recipients, vec![bob.fingerprint()]);
    }

    #[test]
    fn sealed_message_opens_for_recipient_only() {
        let alice = Keypair::from_seed(&[0x11; 32]);
        let bob = Keypair::from_seed(&[0x22; 32]);
        let carol = Keypair::from_seed(&[0x33; 32]);

        let sealed = seal(b"secret", Some(&alice), &[bob.public_key()]).unwrap();

        assert_eq!(open(&sealed, &bob).unwrap(), b"secret");
        assert!(matches!(open(&sealed, &carol), Err(CoreError::NotRecipient)));
    }

    #[test]
    fn sealed_message_multiple_recipients() {
        let alice = Keypair::from_seed(&[0x11; 32]);
        let bob = Keypair::from_seed(&[0x22; 32]);
        let carol = Keypair::from_seed(&[0x33; 32]);

        let sealed = seal(
            b"to both",
            Some(&alice),
            &[bob.public_key(), carol.public_key()],
        )
        .unwrap();

        assert_eq!(open(&sealed, &bob).unwrap(), b"to both");
        assert_eq!(open(&sealed, &carol).unwrap(), b"to both");

        let analysis = analyze(&sealed).unwrap();
        assert_eq!(
            analysis.recipients,
            vec![bob.fingerprint(), carol.fingerprint()]
        );
    }

    #[test]
    fn unsigned_sealed_message() {
        let bob = Keypair::from_seed(&[0x22; 32]);
        let sealed = seal(b"anon", None, &[bob.public_key()]).unwrap();
        let analysis = analyze(&sealed).unwrap();
        assert!(!analysis.signed);
        assert!(analysis.encrypted);
        assert_eq!(analysis.sender, None);
    }

    #[test]
    fn clearsigned_analysis() {
        let alice = Keypair::from_seed(&[0x11; 32]);
        let content = clearsign("a public post", &alice);
        let analysis = analyze(&content).unwrap();

        assert!(analysis.signed);
        assert!(!analysis.encrypted);
        assert!(analysis.recipients.is_empty());
        assert_eq!(analysis.sender, Some(alice.fingerprint()));
    }

    #[test]
    fn clearsigned_verification() {
        let alice = Keypair::from_seed(&[0x11; 32]);
        let bob = Keypair::from_seed(&[0x22; 32]);
        let content = clearsign("signed text", &alice);

        assert!(verify_clearsigned(&content, &alice.public_key()).is_ok());
        assert!(verify_clearsigned(&content, &bob.public_key()).is_err());
    }

    #[test]
    fn clearsigned_tamper_detection() {
        let alice = Keypair::from_seed(&[0x11; 32]);
        let content = clearsign("original", &alice);
        let tampered = content.replace("original", "modified");
        assert!(verify_clearsigned(&tampered, &alice.public_key()).is_err());
    }

    #[test]
    fn analyze_rejects_garbage() {
        assert!(analyze("not an envelope").is_err());
        assert!(analyze("").is_err());
    }
}
