use serde::{Deserialize, Serialize};
use std::fmt;

/// VRF Worker Error Types
///
/// Structured errors for every failure path of the VRF engine and the
/// Shamir 3-pass engine. None of these trigger retries inside the worker;
/// callers decide what is recoverable.

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum VrfWorkerError {
    /// No VRF session is active (keypair locked or never loaded)
    SessionInactive,

    /// The active session belongs to a different account
    AccountMismatch { expected: String, actual: String },

    /// HKDF key derivation failed
    KdfFailed(HkdfError),

    /// AEAD (ChaCha20-Poly1305) encryption/decryption errors
    AeadFailed(AeadError),

    /// Invalid IV/nonce length for ChaCha20-Poly1305
    InvalidIvLength { expected: usize, actual: usize },

    /// PRF output is empty or the wrong size
    InvalidPrfOutput(String),

    /// Serialization/deserialization errors
    Serialization(SerializationError),

    /// Shamir 3-pass protocol errors
    Shamir(ShamirError),

    /// WrapKeySeed session expired before dispensing
    SessionExpired,

    /// WrapKeySeed session has no remaining uses
    SessionExhausted,

    /// Worker message parsing errors
    MessageParsing(MessageError),

    /// Missing required data in worker messages
    MissingRequiredData(String),

    /// Invalid worker message format
    InvalidMessageFormat(String),

    /// Relay/RPC request failed
    Http(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HkdfError {
    KeyDerivationFailed,
    VrfSeedDerivationFailed,
    WrapKeySeedDerivationFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AeadError {
    EncryptionFailed(String),
    DecryptionFailed(String),
    NonceGenerationFailed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SerializationError {
    VrfPublicKeySerialization(String),
    VrfKeypairSerialization(String),
    KeypairDataSerialization(String),
    KeypairDataDeserialization(String),
    VrfKeypairDeserialization(String),
    Base64Error(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ShamirError {
    InvalidPrime(String),
    PrimeTooSmall { bits: usize, min_bits: usize },
    /// A relay reported a group prime that differs from the compiled-in one.
    /// This is fatal: the engine refuses to run rather than preferring either.
    PrimeMismatch,
    ModularInverseNotFound,
    RandomGenerationFailed,
    EncryptionFailed(String),
    DecryptionFailed(String),
    /// The relay does not know the presented keyId (neither active nor grace)
    UnknownKeyId(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MessageError {
    StringifyFailed,
    NotString,
    JsonParsingFailed(String),
    UnknownRequestType(String),
}

impl fmt::Display for VrfWorkerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VrfWorkerError::SessionInactive => {
                write!(f, "VRF session inactive - unlock a VRF keypair first")
            }
            VrfWorkerError::AccountMismatch { expected, actual } => {
                write!(
                    f,
                    "VRF session account mismatch - session holds {}, request names {}",
                    expected, actual
                )
            }
            VrfWorkerError::KdfFailed(err) => write!(f, "KDF failed: {}", err),
            VrfWorkerError::AeadFailed(err) => write!(f, "AEAD operation failed: {}", err),
            VrfWorkerError::InvalidIvLength { expected, actual } => {
                write!(
                    f,
                    "Invalid nonce length for ChaCha20-Poly1305: expected {} bytes, got {}",
                    expected, actual
                )
            }
            VrfWorkerError::InvalidPrfOutput(msg) => write!(f, "Invalid PRF output: {}", msg),
            VrfWorkerError::Serialization(err) => write!(f, "Serialization error: {}", err),
            VrfWorkerError::Shamir(err) => write!(f, "Shamir 3-pass error: {}", err),
            VrfWorkerError::SessionExpired => write!(f, "WrapKeySeed session expired"),
            VrfWorkerError::SessionExhausted => {
                write!(f, "WrapKeySeed session has no remaining uses")
            }
            VrfWorkerError::MessageParsing(err) => write!(f, "Message parsing error: {}", err),
            VrfWorkerError::MissingRequiredData(field) => {
                write!(f, "Missing required data: {}", field)
            }
            VrfWorkerError::InvalidMessageFormat(msg) => {
                write!(f, "Invalid message format: {}", msg)
            }
            VrfWorkerError::Http(msg) => write!(f, "HTTP request failed: {}", msg),
        }
    }
}

impl fmt::Display for HkdfError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HkdfError::KeyDerivationFailed => write!(f, "HKDF key derivation failed"),
            HkdfError::VrfSeedDerivationFailed => write!(f, "HKDF VRF seed derivation failed"),
            HkdfError::WrapKeySeedDerivationFailed => {
                write!(f, "HKDF WrapKeySeed derivation failed")
            }
        }
    }
}

impl fmt::Display for AeadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AeadError::EncryptionFailed(msg) => write!(f, "Encryption failed: {}", msg),
            AeadError::DecryptionFailed(msg) => write!(f, "Decryption failed: {}", msg),
            AeadError::NonceGenerationFailed(msg) => {
                write!(f, "Failed to generate secure nonce: {}", msg)
            }
        }
    }
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SerializationError::VrfPublicKeySerialization(msg) => {
                write!(f, "Failed to serialize VRF public key: {}", msg)
            }
            SerializationError::VrfKeypairSerialization(msg) => {
                write!(f, "Failed to serialize VRF keypair: {}", msg)
            }
            SerializationError::KeypairDataSerialization(msg) => {
                write!(f, "Failed to serialize VRF keypair data: {}", msg)
            }
            SerializationError::KeypairDataDeserialization(msg) => {
                write!(f, "Failed to deserialize keypair data: {}", msg)
            }
            SerializationError::VrfKeypairDeserialization(msg) => {
                write!(f, "Failed to deserialize VRF keypair: {}", msg)
            }
            SerializationError::Base64Error(msg) => {
                write!(f, "Base64 encoding/decoding error: {}", msg)
            }
        }
    }
}

impl fmt::Display for ShamirError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShamirError::InvalidPrime(msg) => write!(f, "Invalid prime: {}", msg),
            ShamirError::PrimeTooSmall { bits, min_bits } => {
                write!(f, "Prime too small: {} bits, minimum {}", bits, min_bits)
            }
            ShamirError::PrimeMismatch => {
                write!(f, "Relay group prime differs from the compiled-in prime")
            }
            ShamirError::ModularInverseNotFound => write!(f, "Modular inverse not found"),
            ShamirError::RandomGenerationFailed => write!(f, "Random exponent generation failed"),
            ShamirError::EncryptionFailed(msg) => write!(f, "KEK encryption failed: {}", msg),
            ShamirError::DecryptionFailed(msg) => write!(f, "KEK decryption failed: {}", msg),
            ShamirError::UnknownKeyId(key_id) => {
                write!(f, "Unknown Shamir keyId: {}", key_id)
            }
        }
    }
}

impl fmt::Display for MessageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageError::StringifyFailed => write!(f, "Failed to stringify message"),
            MessageError::NotString => write!(f, "Message is not a string"),
            MessageError::JsonParsingFailed(msg) => write!(f, "Failed to parse message: {}", msg),
            MessageError::UnknownRequestType(t) => write!(f, "Unknown request type: {}", t),
        }
    }
}

impl std::error::Error for VrfWorkerError {}
impl std::error::Error for HkdfError {}
impl std::error::Error for AeadError {}
impl std::error::Error for SerializationError {}
impl std::error::Error for ShamirError {}
impl std::error::Error for MessageError {}

impl From<serde_json::Error> for VrfWorkerError {
    fn from(err: serde_json::Error) -> Self {
        VrfWorkerError::MessageParsing(MessageError::JsonParsingFailed(err.to_string()))
    }
}

impl From<bincode::Error> for VrfWorkerError {
    fn from(err: bincode::Error) -> Self {
        VrfWorkerError::Serialization(SerializationError::VrfKeypairSerialization(err.to_string()))
    }
}

impl From<ShamirError> for VrfWorkerError {
    fn from(err: ShamirError) -> Self {
        VrfWorkerError::Shamir(err)
    }
}

impl From<hkdf::InvalidLength> for VrfWorkerError {
    fn from(_: hkdf::InvalidLength) -> Self {
        VrfWorkerError::KdfFailed(HkdfError::KeyDerivationFailed)
    }
}

impl From<String> for VrfWorkerError {
    fn from(err: String) -> Self {
        VrfWorkerError::InvalidMessageFormat(err)
    }
}

pub type VrfResult<T> = Result<T, VrfWorkerError>;

impl VrfWorkerError {
    pub fn empty_prf_output() -> Self {
        VrfWorkerError::InvalidPrfOutput("PRF output cannot be empty".to_string())
    }

    pub fn missing_field(field: &str) -> Self {
        VrfWorkerError::MissingRequiredData(field.to_string())
    }

    pub fn invalid_format(msg: &str) -> Self {
        VrfWorkerError::InvalidMessageFormat(msg.to_string())
    }

    pub fn account_mismatch(expected: &str, actual: &str) -> Self {
        VrfWorkerError::AccountMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}
