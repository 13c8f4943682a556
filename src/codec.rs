//! Binary codec for [`ApplicationRecord`].
//!
//! A buffer is a fixed-width version tag followed by the fields of that
//! version, in a fixed order. Text fields are length-prefixed so user text
//! can contain any character.

use crate::error::{SaveError, SaveResult};
use crate::record::ApplicationRecord;
use crate::version::{RecordFormat, RECORD_TAG_LEN};

/// Result of decoding a slot's bytes.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// The slot was never written.
    NewSlot,
    Record(ApplicationRecord),
}

/// What [`decode_into`] did to its target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeOutcome {
    NewSlot,
    Loaded,
}

/// Encodes a record using the current layout.
pub fn encode(record: &ApplicationRecord) -> SaveResult<Vec<u8>> {
    let message = record.message.as_bytes();
    let message_len = length_prefix(message.len())?;
    let mut output = Vec::with_capacity(RECORD_TAG_LEN + 4 + 4 + message.len() + 4);
    output.extend_from_slice(RecordFormat::CURRENT.tag());
    output.extend_from_slice(&record.numeric_value.to_le_bytes());
    output.extend_from_slice(&message_len.to_le_bytes());
    output.extend_from_slice(message);
    output.extend_from_slice(&record.counter.to_le_bytes());
    Ok(output)
}

fn length_prefix(len: usize) -> SaveResult<u32> {
    u32::try_from(len).map_err(|_| SaveError::RecordTooLarge { len })
}

/// Decodes a slot buffer.
pub fn decode(input: &[u8]) -> SaveResult<Decoded> {
    if input.is_empty() {
        return Ok(Decoded::NewSlot);
    }
    let tag = input.get(..RECORD_TAG_LEN).unwrap_or(input);
    let format = RecordFormat::from_tag(tag)
        .ok_or_else(|| SaveError::UnsupportedVersion(String::from_utf8_lossy(tag).into_owned()))?;

    let mut reader = Reader::new(&input[RECORD_TAG_LEN..]);
    let record = match format {
        RecordFormat::V1 => read_v1(&mut reader)?,
    };
    reader.finish()?;
    Ok(Decoded::Record(record))
}

/// Decodes into an existing record. The target is only touched when a full
/// record was read.
pub fn decode_into(target: &mut ApplicationRecord, input: &[u8]) -> SaveResult<DecodeOutcome> {
    match decode(input)? {
        Decoded::NewSlot => Ok(DecodeOutcome::NewSlot),
        Decoded::Record(record) => {
            *target = record;
            Ok(DecodeOutcome::Loaded)
        }
    }
}

fn read_v1(reader: &mut Reader<'_>) -> SaveResult<ApplicationRecord> {
    let numeric_value = f32::from_le_bytes(reader.array("numeric value")?);
    let message = reader.string("message")?;
    let counter = i32::from_le_bytes(reader.array("counter")?);
    Ok(ApplicationRecord {
        numeric_value,
        message,
        counter,
    })
}

struct Reader<'a> {
    input: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self { input, offset: 0 }
    }

    fn take(&mut self, len: usize, field: &str) -> SaveResult<&'a [u8]> {
        let end = self
            .offset
            .checked_add(len)
            .filter(|end| *end <= self.input.len())
            .ok_or_else(|| {
                SaveError::MalformedPayload(format!(
                    "truncated {field}: needed {len} bytes, {} left",
                    self.input.len() - self.offset
                ))
            })?;
        let bytes = &self.input[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    fn array<const N: usize>(&mut self, field: &str) -> SaveResult<[u8; N]> {
        let bytes = self.take(N, field)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn string(&mut self, field: &str) -> SaveResult<String> {
        let len = u32::from_le_bytes(self.array(field)?) as usize;
        let bytes = self.take(len, field)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|err| SaveError::MalformedPayload(format!("{field} is not utf-8: {err}")))
    }

    fn finish(&self) -> SaveResult<()> {
        let left = self.input.len() - self.offset;
        if left != 0 {
            return Err(SaveError::MalformedPayload(format!(
                "{left} trailing bytes after record"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/codec_tests.rs"]
mod tests;
