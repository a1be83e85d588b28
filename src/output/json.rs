//! JSON block format: an array of objects with the same fields, in the same
//! order, as the XML attributes.

use crate::error::ReadError;
use crate::models::BlockRecord;

pub fn to_bytes(records: &[BlockRecord]) -> Result<Vec<u8>, serde_json::Error> {
    let mut bytes = serde_json::to_vec_pretty(records)?;
    bytes.push(b'\n');
    Ok(bytes)
}

pub fn read_blocks(json: &str) -> Result<Vec<BlockRecord>, ReadError> {
    Ok(serde_json::from_str(json)?)
}
