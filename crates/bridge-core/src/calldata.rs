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

//! The binary call-data format attached to deposits that carry an SC-call
//! instruction. The wire layout must remain stable across implementations:
//!
//! ```text
//! byte0           : marker  (0x00 -> no data, 0x01 -> data follows)
//!   if 0x01:
//!   bytes1..4     : function length        (u32, big-endian)
//!   bytesN        : function (UTF-8)
//!   next 8 bytes  : gas limit              (u64, big-endian)
//!   next 4 bytes  : argument count         (u32, big-endian)
//!   for each argument:
//!     4 bytes     : argument length        (u32, big-endian)
//!     L bytes     : argument (UTF-8)
//! ```

use mvx_bridge_relayer_utils::{Error, Result};

use crate::{DATA_PRESENT_PROTOCOL_MARKER, MISSING_DATA_PROTOCOL_MARKER};

const U32_ARG_BYTES: usize = 4;
const U64_ARG_BYTES: usize = 8;

/// The decoded form of a deposit's SC-call instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallData {
    /// The endpoint to call on the destination contract.
    pub function: String,
    /// The gas limit provided for the execution of the call.
    pub gas_limit: u64,
    /// The arguments for the call.
    pub arguments: Vec<String>,
}

impl CallData {
    /// Serializes the call data. `None` serializes to the single
    /// missing-data marker byte.
    pub fn encode(data: Option<&CallData>) -> Vec<u8> {
        let call_data = match data {
            None => return vec![MISSING_DATA_PROTOCOL_MARKER],
            Some(call_data) => call_data,
        };

        let mut buff = vec![DATA_PRESENT_PROTOCOL_MARKER];
        push_string(&mut buff, &call_data.function);
        buff.extend_from_slice(&call_data.gas_limit.to_be_bytes());
        buff.extend_from_slice(&(call_data.arguments.len() as u32).to_be_bytes());
        for argument in &call_data.arguments {
            push_string(&mut buff, argument);
        }

        buff
    }

    /// Deserializes a call-data buffer. A buffer starting with the
    /// missing-data marker decodes to `None`; any marker other than
    /// `0x00`/`0x01` is rejected.
    pub fn decode(buff: &[u8]) -> Result<Option<CallData>> {
        let (marker, mut buff) = match buff.split_first() {
            None => return Err(Error::BufferTooShortForMarker),
            Some((marker, rest)) => (*marker, rest),
        };

        match marker {
            MISSING_DATA_PROTOCOL_MARKER => Ok(None),
            DATA_PRESENT_PROTOCOL_MARKER => {
                let (rest, function) = extract_string(buff)?;
                buff = rest;

                if buff.len() < U64_ARG_BYTES {
                    return Err(Error::BufferTooShortForGasLimit);
                }
                let gas_limit =
                    u64::from_be_bytes(buff[..U64_ARG_BYTES].try_into().expect("8 bytes"));
                buff = &buff[U64_ARG_BYTES..];

                if buff.len() < U32_ARG_BYTES {
                    return Err(Error::BufferTooShortForNumArgs);
                }
                let num_arguments =
                    u32::from_be_bytes(buff[..U32_ARG_BYTES].try_into().expect("4 bytes"));
                buff = &buff[U32_ARG_BYTES..];

                let mut arguments = Vec::with_capacity(num_arguments as usize);
                for _ in 0..num_arguments {
                    let (rest, argument) = extract_string(buff)?;
                    buff = rest;
                    arguments.push(argument);
                }

                Ok(Some(CallData {
                    function,
                    gas_limit,
                    arguments,
                }))
            }
            unexpected => Err(Error::UnexpectedMarker(unexpected)),
        }
    }
}

fn push_string(buff: &mut Vec<u8>, value: &str) {
    buff.extend_from_slice(&(value.len() as u32).to_be_bytes());
    buff.extend_from_slice(value.as_bytes());
}

fn extract_string(buff: &[u8]) -> Result<(&[u8], String)> {
    if buff.len() < U32_ARG_BYTES {
        return Err(Error::BufferTooShortForLength);
    }
    let length =
        u32::from_be_bytes(buff[..U32_ARG_BYTES].try_into().expect("4 bytes")) as usize;
    let buff = &buff[U32_ARG_BYTES..];

    if buff.len() < length {
        return Err(Error::BufferTooShortForString);
    }
    let value = String::from_utf8_lossy(&buff[..length]).into_owned();

    Ok((&buff[length..], value))
}
