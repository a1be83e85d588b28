//! XML block format.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <document>
//!   <block index="0" left="290" top="23" width="164" height="124" isImage="true" data="..."/>
//! </document>
//! ```

use quick_xml::escape::escape;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::{Reader, Writer};

use crate::error::ReadError;
use crate::models::BlockRecord;

const ROOT: &str = "document";
const BLOCK: &str = "block";

/// Serialize records in the given order. Attribute values are escaped.
pub fn to_bytes(records: &[BlockRecord]) -> Result<Vec<u8>, quick_xml::Error> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;
    writer.write_event(Event::Start(BytesStart::new(ROOT)))?;

    for record in records {
        let index = record.index.to_string();
        let left = record.left.to_string();
        let top = record.top.to_string();
        let width = record.width.to_string();
        let height = record.height.to_string();
        let is_image = if record.is_image { "true" } else { "false" };

        let data = attribute_value(&record.data);

        let mut block = BytesStart::new(BLOCK).with_attributes([
            ("index", index.as_str()),
            ("left", left.as_str()),
            ("top", top.as_str()),
            ("width", width.as_str()),
            ("height", height.as_str()),
            ("isImage", is_image),
        ]);
        // Already escaped; the byte form is written as is.
        block.push_attribute(("data".as_bytes(), data.as_bytes()));
        writer.write_event(Event::Empty(block))?;
    }

    writer.write_event(Event::End(BytesEnd::new(ROOT)))?;

    let mut bytes = writer.into_inner();
    bytes.push(b'\n');
    Ok(bytes)
}

/// Escape `value` for a double-quoted attribute.
///
/// Readers normalize raw tabs and line breaks in attribute values to spaces,
/// so those go out as character references. Characters XML 1.0 cannot carry
/// at all are replaced with U+FFFD.
fn attribute_value(value: &str) -> String {
    let sanitized: String = value
        .chars()
        .map(|c| if is_xml_char(c) { c } else { char::REPLACEMENT_CHARACTER })
        .collect();

    escape(&sanitized)
        .replace('\t', "&#9;")
        .replace('\n', "&#10;")
        .replace('\r', "&#13;")
}

fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

/// Parse `<block>` elements back into records, in document order.
pub fn read_blocks(xml: &str) -> Result<Vec<BlockRecord>, ReadError> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut blocks = Vec::new();
    loop {
        match reader.read_event() {
            Ok(Event::Start(e) | Event::Empty(e)) if e.name().as_ref() == BLOCK.as_bytes() => {
                blocks.push(parse_block(&e, blocks.len())?);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(ReadError::Xml {
                    position: reader.buffer_position(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(blocks)
}

#[derive(Default)]
struct Fields {
    index: Option<usize>,
    left: Option<u32>,
    top: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    is_image: Option<bool>,
    data: Option<String>,
}

fn parse_block(element: &BytesStart<'_>, block: usize) -> Result<BlockRecord, ReadError> {
    let mut fields = Fields::default();

    for attr in element.attributes() {
        let attr = attr.map_err(|e| ReadError::Xml {
            position: 0,
            reason: e.to_string(),
        })?;
        let value = attr.unescape_value().map_err(|e| ReadError::Xml {
            position: 0,
            reason: e.to_string(),
        })?;

        match attr.key.as_ref() {
            b"index" => fields.index = Some(number(block, "index", &value)?),
            b"left" => fields.left = Some(number(block, "left", &value)?),
            b"top" => fields.top = Some(number(block, "top", &value)?),
            b"width" => fields.width = Some(number(block, "width", &value)?),
            b"height" => fields.height = Some(number(block, "height", &value)?),
            b"isImage" => fields.is_image = Some(flag(block, &value)?),
            b"data" => fields.data = Some(value.into_owned()),
            _ => {}
        }
    }

    let missing = |name| ReadError::MissingAttribute { block, name };
    Ok(BlockRecord {
        index: fields.index.ok_or_else(|| missing("index"))?,
        left: fields.left.ok_or_else(|| missing("left"))?,
        top: fields.top.ok_or_else(|| missing("top"))?,
        width: fields.width.ok_or_else(|| missing("width"))?,
        height: fields.height.ok_or_else(|| missing("height"))?,
        is_image: fields.is_image.ok_or_else(|| missing("isImage"))?,
        data: fields.data.ok_or_else(|| missing("data"))?,
    })
}

fn number<T: std::str::FromStr>(block: usize, name: &'static str, value: &str) -> Result<T, ReadError> {
    value.parse().map_err(|_| ReadError::InvalidValue {
        block,
        name,
        value: value.to_string(),
    })
}

// Older files were written with capitalised booleans.
fn flag(block: usize, value: &str) -> Result<bool, ReadError> {
    match value {
        "true" | "True" => Ok(true),
        "false" | "False" => Ok(false),
        _ => Err(ReadError::InvalidValue {
            block,
            name: "isImage",
            value: value.to_string(),
        }),
    }
}
