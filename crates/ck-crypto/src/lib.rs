use anyhow::{Result, anyhow};
use ed25519_dalek::{Signature, Signer as DalekSigner, SigningKey, Verifier};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

/// Prefixed to every signed payload.
const DOMAIN_TAG: &[u8] = b"connectkit:v1:message:";
const CHECKSUM_LEN: usize = 4;

pub trait Signer: Send + Sync {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Key held on this device by the local (guest) wallet.
pub struct DeviceKey {
    signing_key: SigningKey,
}

impl DeviceKey {
    pub fn generate() -> Self {
        let mut rng = OsRng;
        Self {
            signing_key: SigningKey::generate(&mut rng),
        }
    }

    pub fn from_secret_key_bytes(secret_key: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&secret_key),
        }
    }

    pub fn secret_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// `0x` followed by the first 20 bytes of the public key's SHA-256 digest.
    pub fn address(&self) -> String {
        let digest = Sha256::digest(self.public_key_bytes());
        format!("0x{}", to_hex(&digest[..20]))
    }

    pub fn verify(&self, payload: &[u8], signature: &[u8]) -> Result<bool> {
        let signature =
            Signature::from_slice(signature).map_err(|err| anyhow!("invalid signature: {err}"))?;
        let input = signing_input(payload);
        Ok(self.signing_key.verifying_key().verify(&input, &signature).is_ok())
    }
}

impl Signer for DeviceKey {
    fn sign(&self, payload: &[u8]) -> Result<Vec<u8>> {
        if payload.is_empty() {
            return Err(anyhow!("payload cannot be empty"));
        }

        let signature: Signature = self.signing_key.sign(&signing_input(payload));
        Ok(signature.to_bytes().to_vec())
    }
}

fn signing_input(payload: &[u8]) -> Vec<u8> {
    let mut input = Vec::with_capacity(DOMAIN_TAG.len() + payload.len());
    input.extend_from_slice(DOMAIN_TAG);
    input.extend_from_slice(payload);
    input
}

pub fn to_hex(input: &[u8]) -> String {
    let mut output = String::with_capacity(input.len() * 2);
    for byte in input {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

/// Encrypts a secret key with a password; the output carries a short checksum
/// so a wrong password is detected on decryption.
pub fn encrypt_key_material(secret_key: &[u8; 32], password: &str) -> Result<Vec<u8>> {
    if password.trim().is_empty() {
        return Err(anyhow!("password cannot be empty"));
    }

    let mut key_stream = derive_key_stream(password, secret_key.len());
    let mut encrypted = Vec::with_capacity(secret_key.len() + CHECKSUM_LEN);
    for (index, byte) in secret_key.iter().enumerate() {
        encrypted.push(byte ^ key_stream[index]);
    }
    key_stream.zeroize();
    encrypted.extend_from_slice(&checksum(secret_key));
    Ok(encrypted)
}

pub fn decrypt_key_material(encrypted: &[u8], password: &str) -> Result<[u8; 32]> {
    if password.trim().is_empty() {
        return Err(anyhow!("password cannot be empty"));
    }

    if encrypted.len() != 32 + CHECKSUM_LEN {
        return Err(anyhow!("invalid encrypted key length"));
    }

    let (body, expected) = encrypted.split_at(32);
    let mut key_stream = derive_key_stream(password, body.len());
    let mut decrypted = [0_u8; 32];
    for (index, byte) in body.iter().enumerate() {
        decrypted[index] = byte ^ key_stream[index];
    }
    key_stream.zeroize();

    if checksum(&decrypted) != expected {
        decrypted.zeroize();
        return Err(anyhow!("incorrect password"));
    }

    Ok(decrypted)
}

fn checksum(secret_key: &[u8; 32]) -> [u8; CHECKSUM_LEN] {
    let digest = Sha256::digest(secret_key);
    let mut out = [0_u8; CHECKSUM_LEN];
    out.copy_from_slice(&digest[..CHECKSUM_LEN]);
    out
}

fn derive_key_stream(seed: &str, len: usize) -> Vec<u8> {
    let mut stream = Vec::with_capacity(len);
    let mut counter: u64 = 0;
    while stream.len() < len {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(counter.to_le_bytes());
        let block = hasher.finalize();
        for byte in block {
            if stream.len() == len {
                break;
            }
            stream.push(byte);
        }
        counter += 1;
    }
    stream
}
