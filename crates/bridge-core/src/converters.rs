// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Address display conversions. MultiversX addresses render as bech32
//! with the `erd` prefix, Ethereum addresses as 0x-prefixed hex. The
//! displayable forms are used only for logging.

use bech32::{FromBase32, ToBase32, Variant};
use mvx_bridge_relayer_utils::{Error, Result};

use crate::MVX_ADDRESS_LEN;

/// The human-readable part of MultiversX bech32 addresses.
pub const MVX_ADDRESS_HRP: &str = "erd";

/// Encodes the raw address bytes as a bech32 string.
pub fn to_bech32_string(address_bytes: &[u8]) -> Result<String> {
    if address_bytes.len() != MVX_ADDRESS_LEN {
        return Err(Error::InvalidAddressBytes(hex::encode(address_bytes)));
    }

    bech32::encode(MVX_ADDRESS_HRP, address_bytes.to_base32(), Variant::Bech32)
        .map_err(|_| Error::InvalidAddressBytes(hex::encode(address_bytes)))
}

/// Encodes the raw address bytes as a bech32 string, falling back to the
/// hex rendering when the bytes are not a valid address. Used by display
/// paths that must never fail.
pub fn to_bech32_string_silent(address_bytes: &[u8]) -> String {
    to_bech32_string(address_bytes)
        .unwrap_or_else(|_| hex::encode(address_bytes))
}

/// Decodes a bech32 address string into its raw 32 bytes.
pub fn from_bech32_string(address: &str) -> Result<Vec<u8>> {
    let (hrp, data, _) = bech32::decode(address)
        .map_err(|_| Error::InvalidAddressBytes(address.to_string()))?;
    if hrp != MVX_ADDRESS_HRP {
        return Err(Error::InvalidAddressBytes(address.to_string()));
    }
    let bytes = Vec::<u8>::from_base32(&data)
        .map_err(|_| Error::InvalidAddressBytes(address.to_string()))?;
    if bytes.len() != MVX_ADDRESS_LEN {
        return Err(Error::InvalidAddressBytes(address.to_string()));
    }

    Ok(bytes)
}

/// Encodes arbitrary bytes as 0x-prefixed hex.
pub fn to_hex_string(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bech32_round_trip() {
        let bytes = vec![7u8; MVX_ADDRESS_LEN];
        let encoded = to_bech32_string(&bytes).unwrap();
        assert!(encoded.starts_with("erd1"));
        assert_eq!(from_bech32_string(&encoded).unwrap(), bytes);
    }

    #[test]
    fn wrong_length_is_rejected_but_silent_conversion_falls_back_to_hex() {
        let bytes = vec![1u8, 2, 3];
        assert!(matches!(
            to_bech32_string(&bytes),
            Err(Error::InvalidAddressBytes(_))
        ));
        assert_eq!(to_bech32_string_silent(&bytes), "010203");
    }

    #[test]
    fn foreign_prefixes_are_rejected() {
        let bytes = vec![9u8; MVX_ADDRESS_LEN];
        let foreign =
            bech32::encode("btc", bytes.to_base32(), Variant::Bech32).unwrap();
        assert!(from_bech32_string(&foreign).is_err());
    }

    #[test]
    fn hex_rendering_is_prefixed() {
        assert_eq!(to_hex_string(&[0xde, 0xad]), "0xdead");
    }
}
