use std::io::Write;

use serde::Serialize;

use crate::error::BioClientsError;

pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, BioClientsError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Writes `value` as indented JSON followed by a newline.
pub fn write_pretty<T: Serialize, W: Write + ?Sized>(
    out: &mut W,
    value: &T,
) -> Result<(), BioClientsError> {
    let text = to_pretty(value)?;
    out.write_all(text.as_bytes())?;
    out.write_all(b"\n")?;
    Ok(())
}
