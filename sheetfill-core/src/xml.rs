//! Small quick-xml helpers shared by the part readers

use crate::error::{Result, xml_err};
use quick_xml::Reader;
use quick_xml::escape::partial_escape;
use quick_xml::events::{BytesStart, BytesText, Event};

/// Part of a qualified name after the prefix (`r:id` -> `id`)
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    match name.iter().position(|b| *b == b':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Prefix of a qualified name including the colon (`x:row` -> `x:`), empty if none
pub(crate) fn prefix_of(name: &[u8]) -> String {
    match name.iter().position(|b| *b == b':') {
        Some(pos) => String::from_utf8_lossy(&name[..=pos]).into_owned(),
        None => String::new(),
    }
}

/// Unescaped value of the attribute whose full key is `key`
pub(crate) fn attr_value(e: &BytesStart, key: &[u8], part: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_err(part, err))?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(|err| xml_err(part, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Unescaped value of the first attribute whose local name is `local`, any prefix
pub(crate) fn attr_value_local(e: &BytesStart, local: &[u8], part: &str) -> Result<Option<String>> {
    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_err(part, err))?;
        let key = attr.key.as_ref();
        if key != b"xmlns" && !key.starts_with(b"xmlns:") && local_name(key) == local {
            let value = attr.unescape_value().map_err(|err| xml_err(part, err))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// Read text content up to the end of the current element.
///
/// Nested elements contribute their text too; used for `<f>` and `<v>`.
pub(crate) fn read_text_node(reader: &mut Reader<&[u8]>, part: &str) -> Result<String> {
    let mut text = String::new();
    let mut depth = 0usize;
    loop {
        match reader.read_event().map_err(|err| xml_err(part, err))? {
            Event::Text(e) => text.push_str(&e.unescape().map_err(|err| xml_err(part, err))?),
            Event::CData(e) => text.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    break;
                }
                depth -= 1;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

/// Text event for an element body. `\r` is written as `&#13;` so readers
/// that normalize line endings still see it.
pub(crate) fn text_event(text: &str) -> BytesText<'static> {
    BytesText::from_escaped(partial_escape(text).replace('\r', "&#13;"))
}

/// True for characters XML 1.0 cannot carry at all, not even as references
pub(crate) fn is_forbidden_char(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}

/// True when leading or trailing whitespace must survive (`xml:space="preserve"`)
pub(crate) fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace)
}
