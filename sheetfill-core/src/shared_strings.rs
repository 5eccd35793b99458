//! Deduplicated shared-string pool (`xl/sharedStrings.xml`)

use crate::error::{Result, xml_err};
use crate::package::Package;
use crate::relationships::shared_strings_path;
use crate::xml::{local_name, needs_space_preserve, prefix_of, read_text_node, text_event};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;

const MAIN_NS: &str = "http://schemas.openxmlformats.org/spreadsheetml/2006/main";

#[derive(Debug, Clone)]
struct Entry {
    text: String,
    /// Original `<si>` markup; `None` for entries appended by this table
    raw: Option<Vec<u8>>,
}

/// Ordered string pool where a position is the reference index.
///
/// New text is only ever appended, so indices already referenced by
/// worksheets stay valid. Lookup goes by the concatenated run text of an
/// entry, first occurrence wins.
#[derive(Debug, Clone, Default)]
pub struct SharedStringTable {
    part: Option<String>,
    entries: Vec<Entry>,
    lookup: HashMap<String, usize>,
    prefix: String,
    root_attrs: Vec<(Vec<u8>, Vec<u8>)>,
    modified: bool,
}

impl SharedStringTable {
    /// Load the package's shared strings.
    ///
    /// A package without a shared-strings part yields an empty table that
    /// reports [`is_present`](Self::is_present) as false.
    pub fn load(package: &mut Package) -> Result<Self> {
        match shared_strings_path(package)? {
            Some(path) => {
                let xml = package.read_part(&path)?;
                Self::parse(&xml, &path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse a shared-strings part
    pub fn parse(xml: &[u8], part: &str) -> Result<Self> {
        let mut table = Self {
            part: Some(part.to_string()),
            ..Self::default()
        };

        let mut reader = Reader::from_reader(xml);
        reader.config_mut().trim_text(false);

        let mut si_start: Option<usize> = None;
        let mut rph_depth = 0usize;
        let mut current = String::new();
        loop {
            let before = reader.buffer_position() as usize;
            match reader.read_event().map_err(|e| xml_err(part, e))? {
                Event::Start(e) => match e.local_name().as_ref() {
                    b"sst" => {
                        table.prefix = prefix_of(e.name().as_ref());
                        table.root_attrs = root_attributes(&e, part)?;
                    }
                    b"si" => {
                        si_start = Some(before);
                        current.clear();
                    }
                    b"rPh" => rph_depth += 1,
                    b"t" if si_start.is_some() => {
                        let text = read_text_node(&mut reader, part)?;
                        if rph_depth == 0 {
                            current.push_str(&text);
                        }
                    }
                    _ => {}
                },
                Event::Empty(e) => match e.local_name().as_ref() {
                    b"sst" => {
                        table.prefix = prefix_of(e.name().as_ref());
                        table.root_attrs = root_attributes(&e, part)?;
                    }
                    b"si" => {
                        let end = reader.buffer_position() as usize;
                        table.push_original(String::new(), xml[before..end].to_vec());
                    }
                    _ => {}
                },
                Event::End(e) => match e.local_name().as_ref() {
                    b"si" => {
                        let end = reader.buffer_position() as usize;
                        if let Some(start) = si_start.take() {
                            let text = std::mem::take(&mut current);
                            table.push_original(text, xml[start..end].to_vec());
                        }
                    }
                    b"rPh" => rph_depth = rph_depth.saturating_sub(1),
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Ok(table)
    }

    fn push_original(&mut self, text: String, raw: Vec<u8>) {
        let index = self.entries.len();
        self.lookup.entry(text.clone()).or_insert(index);
        self.entries.push(Entry {
            text,
            raw: Some(raw),
        });
    }

    /// Index of `text`, appending it when it is not in the pool yet
    pub fn index_of(&mut self, text: &str) -> usize {
        if let Some(&index) = self.lookup.get(text) {
            return index;
        }
        let index = self.entries.len();
        self.entries.push(Entry {
            text: text.to_string(),
            raw: None,
        });
        self.lookup.insert(text.to_string(), index);
        self.modified = true;
        index
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.text.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True when the package actually has a shared-strings part
    pub fn is_present(&self) -> bool {
        self.part.is_some()
    }

    /// Path of the part this table was loaded from
    pub fn part_path(&self) -> Option<&str> {
        self.part.as_deref()
    }

    /// True once a new distinct string has been appended
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Serialize the pool as a complete shared-strings part.
    ///
    /// `count` and `uniqueCount` are both set to the pool length. Entries
    /// loaded from the package are written back exactly as they were read.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let part = self.part.as_deref().unwrap_or("xl/sharedStrings.xml");
        let mut writer = Writer::new(Vec::new());
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
        writer.get_mut().extend_from_slice(b"\n");

        let root_name = format!("{}sst", self.prefix);
        let mut root = BytesStart::new(root_name.as_str());
        if self.root_attrs.is_empty() {
            root.push_attribute(("xmlns", MAIN_NS));
        }
        for (key, value) in &self.root_attrs {
            root.push_attribute((key.as_slice(), value.as_slice()));
        }
        let count = self.entries.len().to_string();
        root.push_attribute(("count", count.as_str()));
        root.push_attribute(("uniqueCount", count.as_str()));
        writer.write_event(Event::Start(root))?;

        let si_name = format!("{}si", self.prefix);
        let t_name = format!("{}t", self.prefix);
        for entry in &self.entries {
            match &entry.raw {
                Some(raw) => writer.get_mut().extend_from_slice(raw),
                None => {
                    writer.write_event(Event::Start(BytesStart::new(si_name.as_str())))?;
                    let mut t = BytesStart::new(t_name.as_str());
                    if needs_space_preserve(&entry.text) {
                        t.push_attribute(("xml:space", "preserve"));
                    }
                    writer.write_event(Event::Start(t))?;
                    writer.write_event(Event::Text(text_event(&entry.text)))?;
                    writer.write_event(Event::End(BytesEnd::new(t_name.as_str())))?;
                    writer.write_event(Event::End(BytesEnd::new(si_name.as_str())))?;
                }
            }
        }

        writer.write_event(Event::End(BytesEnd::new(root_name.as_str())))?;
        log::debug!("Serialized {} shared strings for '{}'", self.entries.len(), part);
        Ok(writer.into_inner())
    }
}

/// Root attributes to carry over, minus the counts that get recomputed
fn root_attributes(e: &BytesStart, part: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut attrs = Vec::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|err| xml_err(part, err))?;
        let key = attr.key.as_ref();
        if matches!(local_name(key), b"count" | b"uniqueCount") && !key.starts_with(b"xmlns") {
            continue;
        }
        attrs.push((key.to_vec(), attr.value.to_vec()));
    }
    Ok(attrs)
}
