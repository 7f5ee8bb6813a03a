//! Serde helpers for fixed-size byte arrays. JSON has no native fixed arrays,
//! so 32/64-byte values round-trip as number arrays with length checks.

macro_rules! serde_byte_array {
    ($name:ident, $len:expr) => {
        pub mod $name {
            use serde::de::Error;
            use serde::{Deserialize, Deserializer, Serializer};

            pub fn serialize<S>(bytes: &[u8; $len], serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.collect_seq(bytes.iter())
            }

            pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; $len], D::Error>
            where
                D: Deserializer<'de>,
            {
                let vec = Vec::<u8>::deserialize(deserializer)?;
                let len = vec.len();
                vec.try_into().map_err(|_| {
                    D::Error::custom(format!("expected {} bytes, got {}", $len, len))
                })
            }
        }
    };
}

serde_byte_array!(serde_array_32, 32);
serde_byte_array!(serde_array_64, 64);
