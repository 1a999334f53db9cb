//! Message encryption for the relay
//!
//! Application messages are sealed to the server's public key: the client
//! generates an ephemeral X25519 keypair per message, derives a shared
//! secret against the server key, hashes it with Blake3 into a
//! ChaCha20-Poly1305 key, and encrypts. The server reverses the exchange
//! with its static secret.
//!
//! The server holds the only copy of the private half; the public half is
//! published once at startup as a hex string for out-of-band retrieval.

use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret as X25519StaticSecret};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// An encrypted frame: ciphertext plus the metadata needed to decrypt it
#[derive(Clone, Debug)]
pub struct EncryptedMessage {
    /// Ephemeral public key for key exchange
    pub ephemeral_public_key: [u8; 32],
    /// Nonce for ChaCha20-Poly1305
    pub nonce: [u8; 12],
    /// Ciphertext including authentication tag
    pub ciphertext: Vec<u8>,
}

impl EncryptedMessage {
    /// Serialize the encrypted frame to wire bytes
    ///
    /// Format: \[ephemeral_public_key (32)\]\[nonce (12)\]\[ciphertext_len (4, LE)\]\[ciphertext\]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 + 12 + 4 + self.ciphertext.len());
        bytes.extend_from_slice(&self.ephemeral_public_key);
        bytes.extend_from_slice(&self.nonce);
        bytes.extend_from_slice(&(self.ciphertext.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&self.ciphertext);
        bytes
    }

    /// Deserialize an encrypted frame from wire bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() < 32 + 12 + 4 {
            return Err(CryptoError::InvalidEncryptedData {
                context: "Encrypted frame too short".to_string(),
            });
        }

        let mut ephemeral_public_key = [0u8; 32];
        ephemeral_public_key.copy_from_slice(&data[0..32]);

        let mut nonce = [0u8; 12];
        nonce.copy_from_slice(&data[32..44]);

        let ciphertext_len = u32::from_le_bytes([data[44], data[45], data[46], data[47]]) as usize;

        if data.len() < 48 + ciphertext_len {
            return Err(CryptoError::InvalidEncryptedData {
                context: "Incomplete ciphertext".to_string(),
            });
        }

        let ciphertext = data[48..48 + ciphertext_len].to_vec();

        Ok(Self {
            ephemeral_public_key,
            nonce,
            ciphertext,
        })
    }
}

/// The server's asymmetric keypair, generated once at process start
///
/// The private half never leaves this struct; clients only ever see the
/// published [`PublicKey`].
pub struct ServerKeypair {
    secret: X25519StaticSecret,
}

impl ServerKeypair {
    /// Generate a fresh keypair from the system CSPRNG
    pub fn generate() -> Self {
        Self {
            secret: X25519StaticSecret::random_from_rng(OsRng),
        }
    }

    /// Deterministic keypair from a 32-byte seed (tests and tooling)
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            secret: X25519StaticSecret::from(seed),
        }
    }

    /// The shareable public half
    pub fn public_key(&self) -> PublicKey {
        PublicKey(X25519PublicKey::from(&self.secret))
    }

    /// Decrypt a frame sealed to this keypair
    ///
    /// Fails if the authentication tag does not verify (wrong key or
    /// tampered ciphertext).
    pub fn decrypt(&self, encrypted: &EncryptedMessage) -> Result<Vec<u8>, CryptoError> {
        let ephemeral_public = X25519PublicKey::from(encrypted.ephemeral_public_key);
        let shared_secret = self.secret.diffie_hellman(&ephemeral_public);

        // Derive the cipher key from the shared secret using Blake3
        let key_hash = blake3::hash(shared_secret.as_bytes());
        let mut cipher_key = [0u8; 32];
        cipher_key.copy_from_slice(key_hash.as_bytes());

        let cipher = ChaCha20Poly1305::new(&cipher_key.into());
        let nonce = Nonce::from_slice(&encrypted.nonce);
        let plaintext = cipher
            .decrypt(nonce, encrypted.ciphertext.as_ref())
            .map_err(|_| CryptoError::DecryptionFailed);

        cipher_key.zeroize();

        plaintext
    }
}

impl std::fmt::Debug for ServerKeypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the secret
        f.debug_struct("ServerKeypair")
            .field("public_key", &self.public_key().to_hex())
            .finish()
    }
}

/// Public key that can be safely shared with clients
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(X25519PublicKey);

impl PublicKey {
    /// Serialize to raw bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Deserialize from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, CryptoError> {
        let bytes: [u8; 32] = data.try_into().map_err(|_| CryptoError::InvalidKeyLength {
            expected: 32,
            got: data.len(),
        })?;
        Ok(Self(X25519PublicKey::from(bytes)))
    }

    /// Encode as lowercase hex, the format of the published key file
    pub fn to_hex(&self) -> String {
        self.to_bytes()
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect()
    }

    /// Decode from the hex contents of the published key file
    pub fn from_hex(hex: &str) -> Result<Self, CryptoError> {
        let hex = hex.trim();
        if hex.len() != 64 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 32,
                got: hex.len() / 2,
            });
        }
        let mut bytes = [0u8; 32];
        for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
            let pair = std::str::from_utf8(chunk).map_err(|_| CryptoError::InvalidEncryptedData {
                context: "Non-ASCII hex in key file".to_string(),
            })?;
            bytes[i] = u8::from_str_radix(pair, 16).map_err(|_| {
                CryptoError::InvalidEncryptedData {
                    context: "Invalid hex in key file".to_string(),
                }
            })?;
        }
        Self::from_bytes(&bytes)
    }

    fn as_x25519(&self) -> &X25519PublicKey {
        &self.0
    }
}

/// Seal a plaintext to the server's public key
///
/// This is the client-side half of the scheme; the server crate exposes it
/// for front-ends and for tests.
pub fn encrypt(
    server_public_key: &PublicKey,
    plaintext: &[u8],
) -> Result<EncryptedMessage, CryptoError> {
    // Ephemeral keypair for this one message
    let ephemeral_secret = X25519StaticSecret::random_from_rng(OsRng);
    let ephemeral_public = X25519PublicKey::from(&ephemeral_secret);

    let shared_secret = ephemeral_secret.diffie_hellman(server_public_key.as_x25519());

    let key_hash = blake3::hash(shared_secret.as_bytes());
    let mut cipher_key = [0u8; 32];
    cipher_key.copy_from_slice(key_hash.as_bytes());

    let cipher = ChaCha20Poly1305::new(&cipher_key.into());

    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| CryptoError::EncryptionFailed {
            reason: format!("ChaCha20-Poly1305 encryption failed: {}", e),
        })?;

    cipher_key.zeroize();

    Ok(EncryptedMessage {
        ephemeral_public_key: ephemeral_public.to_bytes(),
        nonce: nonce_bytes,
        ciphertext,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let keypair = ServerKeypair::generate();
        let public_key = keypair.public_key();

        let plaintext = b"hello relay";
        let encrypted = encrypt(&public_key, plaintext).unwrap();
        let decrypted = keypair.decrypt(&encrypted).unwrap();

        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn test_decrypt_fails_with_wrong_key() {
        let keypair_a = ServerKeypair::generate();
        let keypair_b = ServerKeypair::generate();

        let encrypted = encrypt(&keypair_a.public_key(), b"secret").unwrap();
        assert!(keypair_b.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_decrypt_fails_with_modified_ciphertext() {
        let keypair = ServerKeypair::generate();
        let mut encrypted = encrypt(&keypair.public_key(), b"secret").unwrap();

        encrypted.ciphertext[0] ^= 0xFF;

        assert!(keypair.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_wire_roundtrip() {
        let keypair = ServerKeypair::generate();
        let encrypted = encrypt(&keypair.public_key(), b"framed").unwrap();

        let bytes = encrypted.to_bytes();
        let parsed = EncryptedMessage::from_bytes(&bytes).unwrap();

        assert_eq!(keypair.decrypt(&parsed).unwrap(), b"framed");
    }

    #[test]
    fn test_from_bytes_rejects_truncation() {
        let keypair = ServerKeypair::generate();
        let bytes = encrypt(&keypair.public_key(), b"framed").unwrap().to_bytes();

        assert!(EncryptedMessage::from_bytes(&bytes[..20]).is_err());
        assert!(EncryptedMessage::from_bytes(&bytes[..bytes.len() - 1]).is_err());
    }

    #[test]
    fn test_public_key_hex_roundtrip() {
        let keypair = ServerKeypair::from_seed([7u8; 32]);
        let public_key = keypair.public_key();

        let hex = public_key.to_hex();
        assert_eq!(hex.len(), 64);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));

        let parsed = PublicKey::from_hex(&hex).unwrap();
        assert_eq!(parsed, public_key);

        // A trailing newline from the key file is tolerated
        let parsed = PublicKey::from_hex(&format!("{}\n", hex)).unwrap();
        assert_eq!(parsed, public_key);
    }

    #[test]
    fn test_public_key_hex_rejects_garbage() {
        assert!(PublicKey::from_hex("not hex").is_err());
        assert!(PublicKey::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_seeded_keypair_deterministic() {
        let a = ServerKeypair::from_seed([3u8; 32]);
        let b = ServerKeypair::from_seed([3u8; 32]);
        assert_eq!(a.public_key(), b.public_key());
    }
}
