use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::transport::MAX_FRAME_LEN;

/// Bincode codec for binary serialization
///
/// Fixed-width integers, and decoding refuses to allocate past the frame limit.
#[derive(Debug, Clone, Copy, Default)]
pub struct BincodeCodec;

impl BincodeCodec {
    fn options() -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(MAX_FRAME_LEN as u64)
    }
}

impl Codec for BincodeCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        Self::options()
            .serialize(value)
            .map_err(|e| Error::Codec(e.to_string()))
    }

    fn decode<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T> {
        Self::options()
            .deserialize(bytes)
            .map_err(|e| Error::Codec(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pair {
        a: i64,
        b: String,
    }

    #[test]
    fn decode_rejects_truncated_input() {
        let bytes = BincodeCodec
            .encode(&Pair {
                a: 1,
                b: "two".to_string(),
            })
            .unwrap();

        let result: Result<Pair> = BincodeCodec.decode(&bytes[..bytes.len() - 1]);
        assert!(matches!(result, Err(Error::Codec(_))));
    }

    #[test]
    fn decode_rejects_type_mismatch() {
        let bytes = BincodeCodec.encode(&7u8).unwrap();
        let result: Result<Pair> = BincodeCodec.decode(&bytes);
        assert!(result.is_err());
    }
}
