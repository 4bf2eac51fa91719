//! Encryption collaborator
//!
//! The engine only needs a per-object key and a cipher. [`SecurityHandler`]
//! is that seam; [`StandardSecurity`] implements the password-based
//! standard handler with RC4 and AES-128.

use std::fmt;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use md5::{Digest, Md5};

use crate::error::{Error, Result};
use crate::pdf::object::{Dictionary, Name, ObjRef, Object, PdfString};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

/// Password padding string.
const PADDING: [u8; 32] = [
    0x28, 0xBF, 0x4E, 0x5E, 0x4E, 0x75, 0x8A, 0x41, 0x64, 0x00, 0x4E, 0x56, 0xFF, 0xFA, 0x01, 0x08,
    0x2E, 0x2E, 0x00, 0xB6, 0xD0, 0x68, 0x3E, 0x80, 0x2F, 0x0C, 0xA9, 0xFE, 0x64, 0x53, 0x69, 0x7A,
];

/// Appended to the key derivation when metadata stays in clear text.
const NO_METADATA: [u8; 4] = [0xFF; 4];

/// Key derivation and cipher applied to strings and stream payloads.
pub trait SecurityHandler: Send + Sync + fmt::Debug {
    fn derive_object_key(&self, id: ObjRef) -> Vec<u8>;
    fn encrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;
    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>>;

    /// Whether a `/Type /Metadata` stream is encrypted.
    fn encrypts_metadata(&self) -> bool {
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptMethod {
    /// RC4 with a 40 to 128 bit key
    Rc4 { key_bits: u16 },
    Aes128,
}

impl CryptMethod {
    pub fn key_length(self) -> usize {
        match self {
            Self::Rc4 { key_bits } => usize::from(key_bits / 8).clamp(5, 16),
            Self::Aes128 => 16,
        }
    }

    fn version_and_revision(self) -> (i64, i64) {
        match self {
            Self::Rc4 { key_bits: 40 } => (1, 2),
            Self::Rc4 { .. } => (2, 3),
            Self::Aes128 => (4, 4),
        }
    }
}

/// Standard password security handler.
#[derive(Clone)]
pub struct StandardSecurity {
    method: CryptMethod,
    key: Vec<u8>,
    encrypt_metadata: bool,
}

impl fmt::Debug for StandardSecurity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StandardSecurity")
            .field("method", &self.method)
            .field("key_length", &self.key.len())
            .finish_non_exhaustive()
    }
}

/// Parameters read from or written to an `/Encrypt` dictionary.
struct Params {
    revision: i64,
    key_length: usize,
    owner: Vec<u8>,
    permissions: i32,
    encrypt_metadata: bool,
}

impl StandardSecurity {
    /// Handler with a known file key.
    pub fn with_key(method: CryptMethod, key: Vec<u8>) -> Self {
        Self {
            method,
            key,
            encrypt_metadata: true,
        }
    }

    pub fn method(&self) -> CryptMethod {
        self.method
    }

    pub fn file_key(&self) -> &[u8] {
        &self.key
    }

    /// Authenticate `password` as the user password against an
    /// `/Encrypt` dictionary.
    pub fn open(encrypt: &Dictionary, password: &[u8], document_id: &[u8]) -> Result<Self> {
        if encrypt.get_name("Filter").is_some_and(|f| f != "Standard") {
            return Err(Error::unsupported("only the Standard security handler is supported"));
        }
        let version = encrypt.get_int("V").unwrap_or(0);
        let revision = encrypt.get_int("R").unwrap_or(2);
        let method = match version {
            1 => CryptMethod::Rc4 { key_bits: 40 },
            2 | 3 => CryptMethod::Rc4 {
                key_bits: encrypt
                    .get_int("Length")
                    .and_then(|l| u16::try_from(l).ok())
                    .unwrap_or(40),
            },
            4 if uses_aes(encrypt) => CryptMethod::Aes128,
            4 => CryptMethod::Rc4 { key_bits: 128 },
            other => return Err(Error::unsupported(format!("encryption version {other}"))),
        };
        let string = |key: &str| -> Result<Vec<u8>> {
            encrypt
                .get_string(key)
                .map(|s| s.as_bytes().to_vec())
                .ok_or_else(|| Error::encryption(format!("Encrypt dictionary lacks {key}")))
        };
        let params = Params {
            revision,
            key_length: method.key_length(),
            owner: string("O")?,
            permissions: encrypt.get_int("P").unwrap_or(-1) as i32,
            encrypt_metadata: encrypt
                .get("EncryptMetadata")
                .and_then(Object::as_bool)
                .unwrap_or(true),
        };
        let user = string("U")?;

        let key = file_key(password, &params, document_id);
        let expected = user_entry(&key, params.revision, document_id);
        let compared = if params.revision >= 3 { 16 } else { 32 };
        if user.len() < compared || user[..compared] != expected[..compared] {
            return Err(Error::encryption("incorrect password"));
        }
        Ok(Self {
            method,
            key,
            encrypt_metadata: params.encrypt_metadata,
        })
    }

    /// New handler plus the `/Encrypt` dictionary describing it.
    pub fn create(
        method: CryptMethod,
        user_password: &[u8],
        owner_password: &[u8],
        permissions: i32,
        document_id: &[u8],
    ) -> (Self, Dictionary) {
        let (version, revision) = method.version_and_revision();
        let key_length = method.key_length();
        let owner = owner_entry(owner_password, user_password, revision, key_length);
        let params = Params {
            revision,
            key_length,
            owner,
            permissions,
            encrypt_metadata: true,
        };
        let key = file_key(user_password, &params, document_id);
        let user = user_entry(&key, revision, document_id);

        let mut dict = Dictionary::new()
            .with("Filter", Name::new("Standard"))
            .with("V", version)
            .with("R", revision)
            .with("Length", (key_length * 8) as i64)
            .with("O", PdfString::new(params.owner))
            .with("U", PdfString::new(user))
            .with("P", i64::from(permissions));
        if method == CryptMethod::Aes128 {
            let filter = Dictionary::new()
                .with("CFM", Name::new("AESV2"))
                .with("Length", 16)
                .with("AuthEvent", Name::new("DocOpen"));
            dict.insert("CF", Dictionary::new().with("StdCF", filter));
            dict.insert("StmF", Name::new("StdCF"));
            dict.insert("StrF", Name::new("StdCF"));
        }
        (Self::with_key(method, key), dict)
    }
}

fn uses_aes(encrypt: &Dictionary) -> bool {
    let filter = encrypt.get_name("StmF").map_or("Identity", Name::as_str);
    encrypt
        .get_dict("CF")
        .and_then(|cf| cf.get_dict(filter))
        .and_then(|f| f.get_name("CFM"))
        .is_some_and(|cfm| cfm == "AESV2")
}

fn pad_password(password: &[u8]) -> [u8; 32] {
    let mut out = PADDING;
    let len = password.len().min(32);
    out[..len].copy_from_slice(&password[..len]);
    out[len..].copy_from_slice(&PADDING[..32 - len]);
    out
}

fn md5(parts: &[&[u8]]) -> [u8; 16] {
    let mut hasher = Md5::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

/// File key from the user password.
fn file_key(password: &[u8], params: &Params, document_id: &[u8]) -> Vec<u8> {
    let padded = pad_password(password);
    let permissions = params.permissions.to_le_bytes();
    let mut parts: Vec<&[u8]> = vec![&padded[..], &params.owner[..], &permissions[..], document_id];
    if params.revision >= 4 && !params.encrypt_metadata {
        parts.push(&NO_METADATA);
    }
    let mut hash = md5(&parts);
    if params.revision >= 3 {
        for _ in 0..50 {
            hash = md5(&[&hash[..params.key_length]]);
        }
    }
    hash[..params.key_length].to_vec()
}

/// `/O` entry.
fn owner_entry(owner: &[u8], user: &[u8], revision: i64, key_length: usize) -> Vec<u8> {
    let source = if owner.is_empty() { user } else { owner };
    let mut hash = md5(&[&pad_password(source)[..]]);
    let length = if revision >= 3 {
        for _ in 0..50 {
            hash = md5(&[&hash[..]]);
        }
        key_length
    } else {
        5
    };
    let key = &hash[..length];
    let mut out = rc4(key, &pad_password(user));
    if revision >= 3 {
        for i in 1..=19u8 {
            let round: Vec<u8> = key.iter().map(|b| b ^ i).collect();
            out = rc4(&round, &out);
        }
    }
    out
}

/// `/U` entry for a given file key.
fn user_entry(key: &[u8], revision: i64, document_id: &[u8]) -> Vec<u8> {
    if revision < 3 {
        return rc4(key, &PADDING);
    }
    let mut out = rc4(key, &md5(&[&PADDING[..], document_id]));
    for i in 1..=19u8 {
        let round: Vec<u8> = key.iter().map(|b| b ^ i).collect();
        out = rc4(&round, &out);
    }
    out.resize(32, 0);
    out
}

fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut s: [u8; 256] = std::array::from_fn(|i| i as u8);
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j.wrapping_add(s[i]).wrapping_add(key[i % key.len()]);
        s.swap(i, j as usize);
    }
    let (mut i, mut j) = (0u8, 0u8);
    data.iter()
        .map(|&byte| {
            i = i.wrapping_add(1);
            j = j.wrapping_add(s[i as usize]);
            s.swap(i as usize, j as usize);
            byte ^ s[s[i as usize].wrapping_add(s[j as usize]) as usize]
        })
        .collect()
}

impl SecurityHandler for StandardSecurity {
    fn derive_object_key(&self, id: ObjRef) -> Vec<u8> {
        let num = id.num.to_le_bytes();
        let generation = id.generation.to_le_bytes();
        let mut parts: Vec<&[u8]> = vec![&self.key[..], &num[..3], &generation[..2]];
        if self.method == CryptMethod::Aes128 {
            parts.push(&b"sAlT"[..]);
        }
        let hash = md5(&parts);
        hash[..(self.key.len() + 5).min(16)].to_vec()
    }

    fn encrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self.method {
            CryptMethod::Rc4 { .. } => Ok(rc4(key, data)),
            CryptMethod::Aes128 => {
                // deterministic IV so identical input saves identically
                let iv = md5(&[key, data]);
                let cipher = Aes128CbcEnc::new_from_slices(key, &iv)
                    .map_err(|e| Error::encryption(format!("AES key/IV: {e}")))?;
                let mut out = vec![0u8; data.len() + 16 - data.len() % 16];
                let written = cipher
                    .encrypt_padded_b2b_mut::<Pkcs7>(data, &mut out)
                    .map_err(|e| Error::encryption(format!("AES encrypt: {e}")))?
                    .len();
                out.truncate(written);
                let mut result = iv.to_vec();
                result.extend_from_slice(&out);
                Ok(result)
            }
        }
    }

    fn decrypt(&self, key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
        match self.method {
            CryptMethod::Rc4 { .. } => Ok(rc4(key, data)),
            CryptMethod::Aes128 => {
                if data.len() < 16 || data.len() % 16 != 0 {
                    return Err(Error::encryption("AES payload is not a whole number of blocks"));
                }
                let (iv, encrypted) = data.split_at(16);
                if encrypted.is_empty() {
                    return Ok(Vec::new());
                }
                let cipher = Aes128CbcDec::new_from_slices(key, iv)
                    .map_err(|e| Error::encryption(format!("AES key/IV: {e}")))?;
                let mut out = vec![0u8; encrypted.len()];
                let written = cipher
                    .decrypt_padded_b2b_mut::<Pkcs7>(encrypted, &mut out)
                    .map_err(|e| Error::encryption(format!("AES decrypt: {e}")))?
                    .len();
                out.truncate(written);
                Ok(out)
            }
        }
    }

    fn encrypts_metadata(&self) -> bool {
        self.encrypt_metadata
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Encrypt,
    Decrypt,
}

/// Apply the handler to every string inside `object` and to its stream
/// payload. Stream payloads are taken in encoded form.
pub fn apply(
    handler: &dyn SecurityHandler,
    id: ObjRef,
    object: &mut Object,
    direction: Direction,
) -> Result<()> {
    let key = handler.derive_object_key(id);
    let cipher = |data: &[u8]| match direction {
        Direction::Encrypt => handler.encrypt(&key, data),
        Direction::Decrypt => handler.decrypt(&key, data),
    };
    if let Object::Stream(stream) = object {
        let skip = stream.dict().is_type("XRef")
            || (stream.dict().is_type("Metadata") && !handler.encrypts_metadata());
        if skip {
            return Ok(());
        }
        let payload = match stream.encoded_data() {
            Some(data) => data.to_vec(),
            None => stream.encode()?.to_vec(),
        };
        stream.set_encoded(cipher(&payload)?);
    }
    map_strings(object, &cipher)
}

fn map_strings(object: &mut Object, f: &dyn Fn(&[u8]) -> Result<Vec<u8>>) -> Result<()> {
    match object {
        Object::String(s) => {
            *s = PdfString::new(f(s.as_bytes())?);
            Ok(())
        }
        Object::Array(array) => {
            for i in 0..array.len() {
                array.update(i, |item| map_strings(item, f)).unwrap_or(Ok(()))?;
            }
            Ok(())
        }
        Object::Dict(_) | Object::Stream(_) => {
            let Some(dict) = object.dict_mut() else {
                return Ok(());
            };
            for key in dict.key_list() {
                dict.update(key.as_str(), |value| map_strings(value, f)).unwrap_or(Ok(()))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
